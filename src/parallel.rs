//! Block-parallel edge-list reading.
//!
//! The body of the mapped file is divided into fixed-size byte blocks.
//! Workers pull block indices from a shared atomic counter (dynamic, grain
//! 1), align each block on line boundaries, and parse it into their private
//! append-only scratch. The only shared mutable state is the degree
//! histogram (relaxed atomic increments) and a first-error slot installed by
//! compare-and-set: workers observe it at block entry and drain without
//! taking further work.

use crossbeam::thread;
use portable_atomic::{AtomicUsize, Ordering};
use static_assertions::const_assert;
use std::sync::OnceLock;

use crate::csr::{DegreeTable, EdgeSlice};
use crate::edgelist::{block_range, read_block_checked, read_block_unchecked};
use crate::error::LoadError;
use crate::shared_slice::AnonArray;
use crate::{VertexId, Weight};

/// Unit of parallel work over the mapped body, sized to amortize dispatch
/// against L2.
pub const BLOCK_SIZE: usize = 256 * 1024;

const_assert!(BLOCK_SIZE.is_power_of_two());
// Prefix sums and cursors accumulate edge counts in usize.
const_assert!(std::mem::size_of::<usize>() >= std::mem::size_of::<u64>());

/// One worker's append-only parse output.
///
/// The arrays are conservatively sized for the whole body (any worker may end
/// up with most of the blocks under dynamic scheduling); they are anonymous
/// zero-backed pages, so untouched tails cost address space only.
#[derive(Debug)]
pub struct WorkerScratch<Ix, W> {
    pub sources: AnonArray<Ix>,
    pub targets: AnonArray<Ix>,
    pub weights: Option<AnonArray<W>>,
    /// Edges written by this worker.
    pub count: usize,
    pub max_source: u64,
    pub max_target: u64,
}

impl<Ix: VertexId, W: Weight> WorkerScratch<Ix, W> {
    fn with_capacity(cap: usize, weighted: bool) -> Result<Self, LoadError> {
        Ok(Self {
            sources: AnonArray::zeroed(cap)?,
            targets: AnonArray::zeroed(cap)?,
            weights: if weighted {
                Some(AnonArray::zeroed(cap)?)
            } else {
                None
            },
            count: 0,
            max_source: 0,
            max_target: 0,
        })
    }

    /// View of the edges actually written.
    pub fn edges(&self) -> EdgeSlice<'_, Ix, W> {
        EdgeSlice {
            sources: &self.sources.as_slice()[..self.count],
            targets: &self.targets.as_slice()[..self.count],
            weights: self.weights.as_ref().map(|w| &w.as_slice()[..self.count]),
        }
    }
}

/// What the parallel reader hands back: per-worker edge streams plus the
/// degree histogram when the dimensions were known up front.
#[derive(Debug)]
pub struct ReadOutcome<Ix, W> {
    pub scratch: Vec<WorkerScratch<Ix, W>>,
    pub degrees: Option<DegreeTable>,
}

impl<Ix, W> ReadOutcome<Ix, W> {
    /// Total edges emitted across workers.
    pub fn edges_written(&self) -> u64 {
        self.scratch.iter().map(|s| s.count as u64).sum()
    }
}

/// The smallest well-formed record, `"1 2\n"`, is four bytes; symmetric
/// inputs emit at most twice per record.
fn scratch_capacity(span: usize, symmetric: bool) -> usize {
    (span / 4 + 2) * if symmetric { 2 } else { 1 } + 8
}

/// Read the body `[begin, end)` of `data` with `threads` workers.
///
/// `dims` carries the declared `(rows, cols)` when the format has a header;
/// with dimensions in hand the degree histogram is filled during the parse
/// (`partitions`-way sharded), otherwise it is left to the builder. In
/// checked mode the first error aborts the read; in unchecked mode records
/// falling outside known dimensions are dropped rather than corrupting the
/// histogram.
pub fn read_edgelist_blocks<Ix, W, const WEIGHTED: bool, const CHECKED: bool>(
    data: &[u8],
    body: (usize, usize),
    dims: Option<(u64, u64)>,
    symmetric: bool,
    base: u64,
    threads: usize,
    partitions: usize,
) -> Result<ReadOutcome<Ix, W>, LoadError>
where
    Ix: VertexId,
    W: Weight,
{
    let (body_begin, body_end) = body;
    debug_assert!(body_begin <= body_end && body_end <= data.len());
    let body_slice = &data[body_begin..body_end];
    let span = body_slice.len();

    let nblocks = span.div_ceil(BLOCK_SIZE).max(1);
    let threads = threads.clamp(1, nblocks);
    debug_assert!(partitions >= 1 && partitions.is_power_of_two() && partitions <= 8);

    let degrees = match dims {
        Some((rows, _)) => Some(DegreeTable::new(rows as usize, partitions)?),
        None => None,
    };

    let cap = scratch_capacity(span, symmetric);
    let mut scratch = Vec::with_capacity(threads);
    for _ in 0..threads {
        scratch.push(WorkerScratch::<Ix, W>::with_capacity(cap, WEIGHTED)?);
    }

    let next = AtomicUsize::new(0);
    let mut first_error: OnceLock<LoadError> = OnceLock::new();

    thread::scope(|s| {
        for (t, ws) in scratch.iter_mut().enumerate() {
            let next = &next;
            let first_error = &first_error;
            let degrees = degrees.as_ref();
            let shard = t % partitions;
            s.spawn(move |_| {
                let mut i = 0usize;
                let mut max_s = 0u64;
                let mut max_t = 0u64;
                let mut srcs = ws.sources.shared_slice();
                let mut tgts = ws.targets.shared_slice();
                let mut wgts = ws.weights.as_ref().map(|w| w.shared_slice());
                loop {
                    if first_error.get().is_some() {
                        break;
                    }
                    let bi = next.fetch_add(1, Ordering::Relaxed);
                    if bi >= nblocks {
                        break;
                    }
                    let b = bi * BLOCK_SIZE;
                    let (bb, be) = block_range(body_slice, b, BLOCK_SIZE);
                    let mut emit = |u: u64, v: u64, w: f64| {
                        if !CHECKED {
                            if let Some((rows, cols)) = dims {
                                if u >= rows || v >= cols {
                                    return;
                                }
                            }
                        }
                        srcs.write(i, Ix::new(u));
                        tgts.write(i, Ix::new(v));
                        if WEIGHTED {
                            if let Some(w_out) = wgts.as_mut() {
                                w_out.write(i, W::from_f64(w));
                            }
                        }
                        if let Some(d) = degrees {
                            d.part(shard).get(u as usize).add(1, Ordering::Relaxed);
                        }
                        if u > max_s {
                            max_s = u;
                        }
                        if v > max_t {
                            max_t = v;
                        }
                        i += 1;
                    };
                    if CHECKED {
                        let bounds = dims.map(|(r, c)| (r as i64, c as i64));
                        if let Err(e) = read_block_checked::<WEIGHTED, _>(
                            body_slice,
                            bb,
                            be,
                            symmetric,
                            base as i64,
                            bounds,
                            &mut emit,
                        ) {
                            let _ = first_error.set(e.offset_by(body_begin));
                            break;
                        }
                    } else {
                        read_block_unchecked::<WEIGHTED, _>(
                            body_slice,
                            bb,
                            be,
                            symmetric,
                            base,
                            &mut emit,
                        );
                    }
                }
                ws.count = i;
                ws.max_source = max_s;
                ws.max_target = max_t;
            });
        }
    })
    .map_err(|e| LoadError::ResourceExhausted(format!("parser worker panicked: {e:?}")))?;

    if let Some(e) = first_error.take() {
        return Err(e);
    }
    Ok(ReadOutcome { scratch, degrees })
}
