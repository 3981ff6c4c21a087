//! Streaming (non-mmap) fallback readers.
//!
//! Line-by-line variants for environments where memory mapping is
//! unavailable. They share the tokenizer and the CSR builder with the mapped
//! path but not the block splitter or the parallel scheduler, and they are
//! not expected to match the mapped path's throughput.

use std::io::BufRead;

use crate::csr::{build_csr, degrees_from_edges, Csr, EdgeSlice};
use crate::edgelist::{read_block_checked, read_block_unchecked};
use crate::error::LoadError;
use crate::header::{read_coo_header, read_mtx_header, Header};
use crate::load::{resolve_body_options, FileFormat, LoadOptions};
use crate::scan::{find_next_non_blank, is_comment, is_newline, no_extra_blank};
use crate::{VertexId, Weight};

#[inline]
fn read_failed(e: std::io::Error) -> LoadError {
    LoadError::ResourceExhausted(format!("stream read failed: {e}"))
}

/// Read the header from a stream by buffering lines until the first
/// significant one, then delegating to the byte-range header readers.
///
/// Returns the header (when the format has one) and the bytes consumed.
fn stream_header<R: BufRead>(
    reader: &mut R,
    format: FileFormat,
) -> Result<(Option<Header>, usize), LoadError> {
    if format == FileFormat::EdgeList {
        return Ok((None, 0));
    }
    let mut buf = Vec::new();
    loop {
        let start = buf.len();
        let n = reader.read_until(b'\n', &mut buf).map_err(read_failed)?;
        if n == 0 {
            return Err(LoadError::BadHeader(
                "unexpected end of input before size line".into(),
            ));
        }
        let line = &buf[start..];
        let t = find_next_non_blank(line, 0, line.len(), no_extra_blank);
        if t < line.len() && !is_newline(line[t]) && !is_comment(line[t]) {
            // size line reached; the buffer now holds the whole header
            let (h, consumed) = match format {
                FileFormat::Mtx => read_mtx_header(&buf)?,
                FileFormat::Coo => read_coo_header(&buf)?,
                FileFormat::EdgeList => unreachable!(),
            };
            debug_assert_eq!(consumed, buf.len());
            return Ok((Some(h), buf.len()));
        }
    }
}

/// Stream body records line by line into `fb`.
///
/// `offset` is the byte count already consumed ahead of the body so that
/// checked errors carry stream offsets.
pub fn read_edgelist_stream<R: BufRead, F: FnMut(u64, u64, f64)>(
    reader: &mut R,
    weighted: bool,
    checked: bool,
    symmetric: bool,
    base: u64,
    dims: Option<(u64, u64)>,
    mut offset: usize,
    fb: &mut F,
) -> Result<(), LoadError> {
    let bounds = dims.map(|(r, c)| (r as i64, c as i64));
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).map_err(read_failed)?;
        if n == 0 {
            return Ok(());
        }
        let end = line.len();
        let r = match (checked, weighted) {
            (true, false) => {
                read_block_checked::<false, _>(&line, 0, end, symmetric, base as i64, bounds, fb)
            }
            (true, true) => {
                read_block_checked::<true, _>(&line, 0, end, symmetric, base as i64, bounds, fb)
            }
            (false, false) => {
                read_block_unchecked::<false, _>(&line, 0, end, symmetric, base, fb);
                Ok(())
            }
            (false, true) => {
                read_block_unchecked::<true, _>(&line, 0, end, symmetric, base, fb);
                Ok(())
            }
        };
        r.map_err(|e| e.offset_by(offset))?;
        offset += n;
    }
}

/// Single-threaded stream load sharing the CSR builder with the mapped path.
pub fn load_stream<Ix: VertexId, W: Weight, R: BufRead>(
    mut reader: R,
    options: &LoadOptions,
) -> Result<Csr<Ix, W>, LoadError> {
    let format = options.format.unwrap_or(FileFormat::EdgeList);
    let (header, consumed) = stream_header(&mut reader, format)?;
    let (symmetric, base, dims) = resolve_body_options(format, options, header);
    if let Some((r, c)) = dims {
        if r.max(c) > Ix::max_value() {
            return Err(LoadError::ResourceExhausted(format!(
                "declared dimensions {r}x{c} exceed the index type"
            )));
        }
    }

    let mut sources: Vec<Ix> = Vec::new();
    let mut targets: Vec<Ix> = Vec::new();
    let mut weights: Vec<W> = Vec::new();
    let mut max_s = 0u64;
    let mut max_t = 0u64;
    {
        let weighted = options.weighted;
        let checked = options.checked;
        let mut emit = |u: u64, v: u64, w: f64| {
            if !checked {
                if let Some((r, c)) = dims {
                    if u >= r || v >= c {
                        return;
                    }
                }
            }
            sources.push(Ix::new(u));
            targets.push(Ix::new(v));
            if weighted {
                weights.push(W::from_f64(w));
            }
            if u > max_s {
                max_s = u;
            }
            if v > max_t {
                max_t = v;
            }
        };
        read_edgelist_stream(
            &mut reader,
            weighted,
            checked,
            symmetric,
            base,
            dims,
            consumed,
            &mut emit,
        )?;
    }

    let (rows, cols) = match dims {
        Some((r, c)) => (r as usize, c as usize),
        None if sources.is_empty() => (0, 0),
        None => {
            let top = max_s.max(max_t);
            if top > Ix::max_value().saturating_sub(1) {
                return Err(LoadError::ResourceExhausted(format!(
                    "vertex id {top} exceeds the index type"
                )));
            }
            ((top + 1) as usize, (top + 1) as usize)
        }
    };

    let views = [EdgeSlice {
        sources: sources.as_slice(),
        targets: targets.as_slice(),
        weights: if options.weighted {
            Some(weights.as_slice())
        } else {
            None
        },
    }];
    let degrees = degrees_from_edges(&views, rows, 1)?;
    build_csr(rows, cols, &views, &degrees, options.weighted, 1)
}
