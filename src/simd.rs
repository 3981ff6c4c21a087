//! SIMD numeric tokenizers.
//!
//! The whole-number parser consumes a digit run of up to 16 bytes in a
//! constant number of instructions by right-aligning it inside a 32-byte
//! lane, subtracting `'0'` per byte, and collapsing the lane with pairwise
//! weighted horizontal adds. Floats reuse the whole-number parser for the
//! integer and fractional parts and scalar parsing for the (short, rare)
//! exponent.
//!
//! On targets without the required 32-byte masked load the parsers fall back
//! to the scalar implementations with identical semantics, as do digit runs
//! too close to the start of the buffer for the backward-reaching load.

use crate::parse::{parse_integer, parse_whole};
use crate::scan::find_next_non_digit;

/// Negative powers of ten for scaling the fractional part.
const POW10_NEG: [f64; 21] = [
    1.0, 1e-1, 1e-2, 1e-3, 1e-4, 1e-5, 1e-6, 1e-7, 1e-8, 1e-9, 1e-10, 1e-11, 1e-12, 1e-13, 1e-14,
    1e-15, 1e-16, 1e-17, 1e-18, 1e-19, 1e-20,
];

/// Parse an unsigned whole number from a digit run.
///
/// Matches [`parse_whole`] on runs of at most 16 digits; longer runs are
/// delegated to the scalar parser.
#[inline]
pub fn parse_whole_simd(data: &[u8], i: usize, end: usize) -> (u64, usize) {
    let de = find_next_non_digit(data, i, end);
    let n = de - i;
    if n == 0 {
        return (0, i);
    }
    // The vector load reads the 32 bytes ending at the digit run; runs inside
    // the first 32 bytes of the buffer take the scalar path instead.
    if n > 16 || de < 32 {
        return parse_whole(data, i, end);
    }
    #[cfg(target_arch = "x86_64")]
    if std::arch::is_x86_feature_detected!("avx2") {
        return (unsafe { x86::whole_from_digit_run(data, de, n) }, de);
    }
    parse_whole(data, i, end)
}

/// Parse a floating point number, SIMD-accelerating the digit runs.
///
/// Semantics match [`crate::parse::parse_float`]: optional sign, whole part,
/// optional `.` fraction, optional `e`/`E` exponent.
#[inline]
pub fn parse_float_simd(data: &[u8], mut i: usize, end: usize) -> (f64, usize) {
    if i == end {
        return (0.0, i);
    }
    let neg = data[i] == b'-';
    if neg || data[i] == b'+' {
        i += 1;
    }
    let (u, mut i) = parse_whole_simd(data, i, end);
    let mut v = 0u64;
    let mut d = 0i32;
    let mut e = 0i64;
    if i < end && data[i] == b'.' {
        let id = i + 1;
        let (frac, ni) = parse_whole_simd(data, id, end);
        v = frac;
        d = (ni - id) as i32;
        i = ni;
    }
    if i < end && (data[i] == b'e' || data[i] == b'E') {
        let (exp, ni) = parse_integer(data, i + 1, end);
        e = exp;
        i = ni;
    }
    let frac = if v != 0 {
        if (d as usize) < POW10_NEG.len() {
            v as f64 * POW10_NEG[d as usize]
        } else {
            v as f64 * 10f64.powi(-d)
        }
    } else {
        0.0
    };
    let mut a = u as f64 + frac;
    if e != 0 {
        a *= 10f64.powi(e as i32);
    }
    (if neg { -a } else { a }, i)
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::*;

    // 32 zero bytes followed by 32 set bytes; an unaligned load at offset `n`
    // yields a lane whose last `n` bytes are set.
    const LOAD_MASK: [u8; 64] = {
        let mut m = [0u8; 64];
        let mut k = 32;
        while k < 64 {
            m[k] = 0xFF;
            k += 1;
        }
        m
    };

    /// Collapse the digit run `data[de - n .. de]` into its value.
    ///
    /// # Safety
    ///
    /// Requires `de >= 32`, `de <= data.len()`, `1 <= n <= 16`, and that the
    /// `n` bytes before `de` are ASCII digits. Caller must have verified
    /// AVX2 support.
    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn whole_from_digit_run(data: &[u8], de: usize, n: usize) -> u64 {
        debug_assert!(de >= 32 && de <= data.len() && n >= 1 && n <= 16);
        // Right-align the run in a 32-byte lane, zeroing the stale prefix.
        let xc = _mm256_loadu_si256(data.as_ptr().add(de - 32) as *const __m256i);
        let mask = _mm256_loadu_si256(LOAD_MASK.as_ptr().add(n) as *const __m256i);
        let xd = _mm256_and_si256(_mm256_sub_epi8(xc, _mm256_set1_epi8(b'0' as i8)), mask);
        // Pairs of bytes -> 16-bit values weighted (10, 1).
        let p1 = _mm256_setr_epi8(
            10, 1, 10, 1, 10, 1, 10, 1, 10, 1, 10, 1, 10, 1, 10, 1, 10, 1, 10, 1, 10, 1, 10, 1,
            10, 1, 10, 1, 10, 1, 10, 1,
        );
        let x2_16 = _mm256_maddubs_epi16(xd, p1);
        // Narrow the 16-bit values to bytes (each < 100 so this is lossless);
        // the per-lane pack needs a cross-lane shuffle to become contiguous.
        let packed = _mm256_packus_epi16(x2_16, x2_16);
        let x2_08 = _mm256_castsi256_si128(_mm256_permute4x64_epi64(packed, 0x08));
        // Pairs of bytes -> 16-bit values weighted (100, 1).
        let p2 = _mm_setr_epi8(100, 1, 100, 1, 100, 1, 100, 1, 100, 1, 100, 1, 100, 1, 100, 1);
        let x4_16 = _mm_maddubs_epi16(x2_08, p2);
        // Pairs of 16-bit -> 32-bit values weighted (10000, 1).
        let p4 = _mm_setr_epi16(10000, 1, 10000, 1, 10000, 1, 10000, 1);
        let x8_32 = _mm_madd_epi16(x4_16, p4);
        // Three 32-bit lanes hold the last, middle, and leading 8 digits.
        let low = _mm_extract_epi32(x8_32, 3) as u32 as u64;
        let mid = _mm_extract_epi32(x8_32, 2) as u32 as u64;
        let high = _mm_extract_epi32(x8_32, 1) as u32 as u64;
        low + mid * 100_000_000 + high * 10_000_000_000_000_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    // Pad digit strings away from the buffer start so the vector load is
    // exercised rather than the near-start fallback.
    fn padded(s: &str) -> Vec<u8> {
        let mut v = vec![b' '; 40];
        v.extend_from_slice(s.as_bytes());
        v.push(b'\n');
        v
    }

    fn simd_at_40(v: &[u8]) -> (u64, usize) {
        parse_whole_simd(v, 40, v.len())
    }

    #[test]
    fn matches_scalar_on_known_values() {
        for s in [
            "0",
            "7",
            "42",
            "999",
            "12345678",
            "123456789",
            "9999999999999999",
            "1000000000000000",
            "0000000000000001",
        ] {
            let v = padded(s);
            let (scalar, sc) = parse_whole(&v, 40, v.len());
            let (simd, ic) = simd_at_40(&v);
            assert_eq!(simd, scalar, "value mismatch for {s:?}");
            assert_eq!(ic, sc, "cursor mismatch for {s:?}");
        }
    }

    #[test]
    fn matches_scalar_on_random_runs() {
        let mut rng = rand::rng();
        for _ in 0..2000 {
            let n = rng.random_range(1..=16);
            let s: String = (0..n)
                .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
                .collect();
            let v = padded(&s);
            let (scalar, _) = parse_whole(&v, 40, v.len());
            let (simd, _) = simd_at_40(&v);
            assert_eq!(simd, scalar, "mismatch for digit run {s:?}");
        }
    }

    #[test]
    fn near_buffer_start_falls_back() {
        // Run ends before byte 32: must still parse correctly.
        let v = b"123 ".to_vec();
        assert_eq!(parse_whole_simd(&v, 0, v.len()), (123, 3));
    }

    #[test]
    fn empty_run_returns_cursor_unchanged() {
        let v = padded("x");
        assert_eq!(parse_whole_simd(&v, 40, v.len()), (0, 40));
    }

    #[test]
    fn long_runs_delegate_to_scalar() {
        let s = "12345678901234567890"; // 20 digits
        let v = padded(s);
        let (scalar, sc) = parse_whole(&v, 40, v.len());
        let (simd, ic) = simd_at_40(&v);
        assert_eq!((simd, ic), (scalar, sc));
    }

    #[test]
    fn float_matches_scalar() {
        use crate::parse::parse_float;
        for s in [
            "3.25",
            "-12.5",
            "0.0001",
            "1234.56789",
            "2e4",
            "6.02e23",
            "-1.5E-3",
            "12345678.87654321",
            "42",
        ] {
            let v = padded(s);
            let (scalar, sc) = parse_float(&v, 40, v.len());
            let (simd, ic) = parse_float_simd(&v, 40, v.len());
            assert_eq!(ic, sc, "cursor mismatch for {s:?}");
            assert!(
                (simd - scalar).abs() <= scalar.abs() * 1e-15,
                "value mismatch for {s:?}: {simd} vs {scalar}"
            );
        }
    }
}
