//! Banner and size-triple readers for MTX and COO inputs.
//!
//! The header scanner consumes leading comment lines, captures the
//! MatrixMarket banner when present, and stops at the first non-comment,
//! non-blank line, which must be the `rows cols nnz` size triple.

use crate::error::LoadError;
use crate::parse::parse_whole;
use crate::scan::{
    find_next_line, find_next_non_blank, find_next_whitespace, is_digit, no_extra_blank,
};

/// What the header of an input file declared.
///
/// `declared_size` is informational only; the loader derives the real edge
/// count from what it parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub symmetric: bool,
    pub rows: u64,
    pub cols: u64,
    pub declared_size: u64,
}

const BANNER: &[u8] = b"%%MatrixMarket";

/// Read a MatrixMarket coordinate header.
///
/// Returns the header and its byte length so the caller can advance past it
/// to the body.
pub fn read_mtx_header(data: &[u8]) -> Result<(Header, usize), LoadError> {
    let len = data.len();
    let mut i = 0;
    let mut symmetric: Option<bool> = None;
    while i < len {
        let le = line_end(data, i);
        let next = find_next_line(data, i, len);
        let t = find_next_non_blank(data, i, le, no_extra_blank);
        if t >= le {
            i = next; // blank line
            continue;
        }
        match data[t] {
            b'%' => {
                if data[t..le].starts_with(BANNER) {
                    symmetric = Some(parse_banner(data, t, le)?);
                }
                i = next;
            }
            b'#' => i = next,
            _ => {
                let symmetric = symmetric
                    .ok_or_else(|| LoadError::BadHeader("missing MatrixMarket banner".into()))?;
                let (rows, cols, declared_size) = parse_size_triple(data, t, le)?;
                return Ok((
                    Header {
                        symmetric,
                        rows,
                        cols,
                        declared_size,
                    },
                    next,
                ));
            }
        }
    }
    Err(LoadError::BadHeader(
        "unexpected end of input before size line".into(),
    ))
}

/// Read a COO header: comment lines (`%` or `#`), then the size triple. No
/// banner is expected and the input is taken to be unsymmetric.
pub fn read_coo_header(data: &[u8]) -> Result<(Header, usize), LoadError> {
    let len = data.len();
    let mut i = 0;
    while i < len {
        let le = line_end(data, i);
        let next = find_next_line(data, i, len);
        let t = find_next_non_blank(data, i, le, no_extra_blank);
        if t >= le || data[t] == b'%' || data[t] == b'#' {
            i = next;
            continue;
        }
        let (rows, cols, declared_size) = parse_size_triple(data, t, le)?;
        return Ok((
            Header {
                symmetric: false,
                rows,
                cols,
                declared_size,
            },
            next,
        ));
    }
    Err(LoadError::BadHeader(
        "unexpected end of input before size line".into(),
    ))
}

/// End of the current line, excluding the terminator.
#[inline]
fn line_end(data: &[u8], mut i: usize) -> usize {
    while i < data.len() && data[i] != b'\n' {
        i += 1;
    }
    i
}

/// Validate `%%MatrixMarket matrix coordinate <field> <symmetry>` and return
/// whether the symmetry token implies mirroring.
fn parse_banner(data: &[u8], i: usize, le: usize) -> Result<bool, LoadError> {
    let mut toks: [&[u8]; 5] = [b""; 5];
    let mut c = i;
    for tok in toks.iter_mut() {
        let tb = find_next_non_blank(data, c, le, no_extra_blank);
        if tb >= le {
            return Err(LoadError::BadHeader("malformed banner".into()));
        }
        let te = find_next_whitespace(data, tb, le, |_| false);
        *tok = &data[tb..te];
        c = te;
    }
    if !toks[0].eq_ignore_ascii_case(BANNER)
        || !toks[1].eq_ignore_ascii_case(b"matrix")
        || !toks[2].eq_ignore_ascii_case(b"coordinate")
    {
        return Err(LoadError::BadHeader(
            "only 'matrix coordinate' inputs are supported".into(),
        ));
    }
    let field_ok = [b"pattern" as &[u8], b"real", b"integer", b"complex", b"double"]
        .iter()
        .any(|f| toks[3].eq_ignore_ascii_case(f));
    if !field_ok {
        return Err(LoadError::BadHeader("unknown banner field".into()));
    }
    if toks[4].eq_ignore_ascii_case(b"symmetric") || toks[4].eq_ignore_ascii_case(b"skew-symmetric")
    {
        Ok(true)
    } else if toks[4].eq_ignore_ascii_case(b"general") || toks[4].eq_ignore_ascii_case(b"hermitian")
    {
        Ok(false)
    } else {
        Err(LoadError::BadHeader("unknown banner symmetry".into()))
    }
}

/// Parse `rows cols nnz` from a single line.
fn parse_size_triple(data: &[u8], i: usize, le: usize) -> Result<(u64, u64, u64), LoadError> {
    let mut vals = [0u64; 3];
    let mut c = i;
    for v in vals.iter_mut() {
        let tb = find_next_non_blank(data, c, le, no_extra_blank);
        if tb >= le || !is_digit(data[tb]) {
            return Err(LoadError::BadHeader("bad size triple".into()));
        }
        let (a, tc) = parse_whole(data, tb, le);
        *v = a;
        c = tc;
    }
    Ok((vals[0], vals[1], vals[2]))
}
