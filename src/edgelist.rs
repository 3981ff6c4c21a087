//! Per-block edge-list readers and the line-aligned block splitter.
//!
//! Both reader strategies share the emit contract `fb(u, v, w)`: one call per
//! record, a second mirrored call when the input is symmetric and `u != v`.
//! Vertex ids are rebased before emission when the file counts from 1, and
//! the weight defaults to `1.0` for unweighted inputs.

use crate::error::LoadError;
use crate::scan::{
    comma_blank, find_next_digit, find_next_line, find_next_non_blank, is_comment, is_digit,
    is_newline,
};
use crate::simd::{parse_float_simd, parse_whole_simd};

/// Align the block `[b, b + block_size)` onto line boundaries.
///
/// The returned range `[bb, be)` starts at `b` when `b` is already a line
/// start and at the next line start otherwise; the end is rounded forward to
/// the next line boundary unless the block already ends the buffer. A block
/// that falls entirely inside one line yields an empty range. Together these
/// rules hand every line of the buffer to exactly one block.
pub fn block_range(data: &[u8], b: usize, block_size: usize) -> (usize, usize) {
    let len = data.len();
    if b >= len {
        return (len, len);
    }
    let bb = if b == 0 || is_newline(data[b - 1]) {
        b
    } else {
        find_next_line(data, b, len)
    };
    let e = b.saturating_add(block_size);
    let be = if e >= len {
        len
    } else if is_newline(data[e - 1]) {
        e
    } else {
        find_next_line(data, e, len)
    };
    (bb, be)
}

/// Parse a vertex id as a signed 64-bit integer, rejecting a non-numeric
/// leading byte. Signed so that negative inputs survive long enough to be
/// reported instead of wrapping.
#[inline]
fn parse_id_checked(data: &[u8], i: usize, end: usize) -> Result<(i64, usize), LoadError> {
    let mut j = i;
    let neg = j < end && data[j] == b'-';
    if j < end && (data[j] == b'-' || data[j] == b'+') {
        j += 1;
    }
    if j >= end || !is_digit(data[j]) {
        return Err(LoadError::BadBody { offset: i });
    }
    let (a, nj) = parse_whole_simd(data, j, end);
    Ok((if neg { -(a as i64) } else { a as i64 }, nj))
}

/// Parse a weight, rejecting a non-numeric leading byte.
#[inline]
fn parse_weight_checked(data: &[u8], i: usize, end: usize) -> Result<(f64, usize), LoadError> {
    if i >= end {
        return Err(LoadError::BadBody { offset: i });
    }
    let c = data[i];
    if !(is_digit(c) || c == b'-' || c == b'+' || c == b'.') {
        return Err(LoadError::BadBody { offset: i });
    }
    Ok(parse_float_simd(data, i, end))
}

/// Read records in `[begin, end)`, validating as it goes.
///
/// Accepts space, tab, and comma separators; `%` and `#` open comments both
/// at line starts and inline. Body errors carry the byte offset (relative to
/// `data`) of the offending token, or of the record for range violations.
/// Extra numeric columns after the expected ones are parsed and discarded so
/// that real-valued bodies can be read as unweighted and complex bodies as
/// weighted; non-numeric trailing bytes are an error.
pub fn read_block_checked<const WEIGHTED: bool, F: FnMut(u64, u64, f64)>(
    data: &[u8],
    begin: usize,
    end: usize,
    symmetric: bool,
    base: i64,
    dims: Option<(i64, i64)>,
    fb: &mut F,
) -> Result<(), LoadError> {
    let mut i = begin;
    loop {
        i = find_next_non_blank(data, i, end, comma_blank);
        if i >= end {
            return Ok(());
        }
        let c = data[i];
        if is_newline(c) {
            i += 1;
            continue;
        }
        if is_comment(c) {
            i = find_next_line(data, i, end);
            continue;
        }
        let il = i;
        let (iu, ni) = parse_id_checked(data, i, end)?;
        i = find_next_non_blank(data, ni, end, comma_blank);
        let (iv, nv) = parse_id_checked(data, i, end)?;
        i = nv;
        let mut w = 1.0f64;
        if WEIGHTED {
            i = find_next_non_blank(data, i, end, comma_blank);
            let (wv, nw) = parse_weight_checked(data, i, end)?;
            w = wv;
            i = nw;
        }
        // Drain the rest of the record: numeric extras are discarded,
        // anything else is malformed.
        loop {
            i = find_next_non_blank(data, i, end, comma_blank);
            if i >= end {
                break;
            }
            let c = data[i];
            if is_newline(c) || is_comment(c) {
                i = find_next_line(data, i, end);
                break;
            }
            let (_, ni) = parse_weight_checked(data, i, end)?;
            i = ni;
        }
        let u = iu - base;
        let v = iv - base;
        if u < 0 || v < 0 {
            return Err(LoadError::BadBody { offset: il });
        }
        if let Some((rows, cols)) = dims {
            if u >= rows || v >= cols {
                return Err(LoadError::BadBody { offset: il });
            }
        }
        fb(u as u64, v as u64, w);
        if symmetric && u != v {
            fb(v as u64, u as u64, w);
        }
    }
}

/// Read records in `[begin, end)` without validation.
///
/// Seeks digit runs directly: ids are parsed as unsigned wholes, the weight
/// (when requested) as a float with its sign. Terminates when no digit
/// remains. Malformed input yields undefined records, never an error.
pub fn read_block_unchecked<const WEIGHTED: bool, F: FnMut(u64, u64, f64)>(
    data: &[u8],
    begin: usize,
    end: usize,
    symmetric: bool,
    base: u64,
    fb: &mut F,
) {
    let mut i = begin;
    loop {
        i = find_next_digit(data, i, end);
        if i >= end {
            return;
        }
        let (u, ni) = parse_whole_simd(data, i, end);
        i = find_next_digit(data, ni, end);
        if i >= end {
            return;
        }
        let (v, nv) = parse_whole_simd(data, i, end);
        i = nv;
        let mut w = 1.0f64;
        if WEIGHTED {
            i = find_next_non_blank(data, i, end, comma_blank);
            let (wv, nw) = parse_float_simd(data, i, end);
            w = wv;
            i = nw;
        }
        let u = u.wrapping_sub(base);
        let v = v.wrapping_sub(base);
        fb(u, v, w);
        if symmetric && u != v {
            fb(v, u, w);
        }
    }
}
