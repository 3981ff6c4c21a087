//! CSR assembly from per-worker edge streams.
//!
//! The builder runs two sub-phases: an exclusive prefix sum over the degree
//! histogram produces the offsets array, then a concurrent scatter claims a
//! slot per edge with an atomic fetch-add on per-vertex cursors. With more
//! than one degree partition, each partition assembles its own intermediate
//! arrays free of cross-partition contention and a final parallel gather
//! interleaves them in source-major order.

use crossbeam::thread;
use portable_atomic::{AtomicUsize, Ordering};
use smallvec::SmallVec;

use crate::error::LoadError;
use crate::shared_slice::AnonArray;
use crate::{VertexId, Weight};

/// Out-degree histogram, sharded into `P` partitions so concurrent counting
/// and scattering contend only within a partition. `P` is a small power of
/// two; workers map to partitions by `t mod P`.
#[derive(Debug)]
pub struct DegreeTable {
    parts: SmallVec<[AnonArray<AtomicUsize>; 8]>,
    rows: usize,
}

impl DegreeTable {
    pub fn new(rows: usize, partitions: usize) -> Result<Self, LoadError> {
        debug_assert!(partitions >= 1 && partitions <= 8 && partitions.is_power_of_two());
        let mut parts = SmallVec::new();
        for _ in 0..partitions {
            parts.push(AnonArray::<AtomicUsize>::zeroed(rows)?);
        }
        Ok(Self { parts, rows })
    }

    #[inline(always)]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline(always)]
    pub fn partitions(&self) -> usize {
        self.parts.len()
    }

    #[inline(always)]
    pub fn part(&self, p: usize) -> &AnonArray<AtomicUsize> {
        &self.parts[p]
    }

    /// Total degree of `u` across partitions, with the 2/4/8-way reductions
    /// unrolled.
    #[inline]
    pub fn total(&self, u: usize) -> u64 {
        let ld = |a: &AnonArray<AtomicUsize>| a.get(u).load(Ordering::Relaxed) as u64;
        match self.parts.as_slice() {
            [a] => ld(a),
            [a, b] => ld(a) + ld(b),
            [a, b, c, d] => (ld(a) + ld(b)) + (ld(c) + ld(d)),
            [a, b, c, d, e, f, g, h] => {
                ((ld(a) + ld(b)) + (ld(c) + ld(d))) + ((ld(e) + ld(f)) + (ld(g) + ld(h)))
            }
            parts => parts.iter().map(ld).sum(),
        }
    }
}

/// Borrowed view over one worker's parsed edges.
#[derive(Clone, Copy)]
pub struct EdgeSlice<'a, Ix, W> {
    pub sources: &'a [Ix],
    pub targets: &'a [Ix],
    pub weights: Option<&'a [W]>,
}

impl<'a, Ix, W> EdgeSlice<'a, Ix, W> {
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// A compressed sparse row graph owned by the caller.
///
/// `offsets` has length `rows + 1` with `offsets[0] == 0` and
/// `offsets[rows]` equal to the number of edges written; `edge_keys` holds
/// the neighbor ids packed per source vertex; `edge_values` is present only
/// for weighted loads. Neighbor order inside a vertex is unspecified.
#[derive(Debug)]
pub struct Csr<Ix: VertexId, W: Weight> {
    rows: usize,
    cols: usize,
    offsets: AnonArray<u64>,
    keys: AnonArray<Ix>,
    values: Option<AnonArray<W>>,
}

impl<Ix: VertexId, W: Weight> Csr<Ix, W> {
    #[inline(always)]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline(always)]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of edges written, i.e. `offsets[rows]`.
    #[inline(always)]
    pub fn edge_count(&self) -> u64 {
        *self.offsets.get(self.rows)
    }

    #[inline(always)]
    pub fn offsets(&self) -> &[u64] {
        self.offsets.as_slice()
    }

    #[inline(always)]
    pub fn edge_keys(&self) -> &[Ix] {
        self.keys.as_slice()
    }

    #[inline(always)]
    pub fn edge_values(&self) -> Option<&[W]> {
        self.values.as_ref().map(|v| v.as_slice())
    }

    #[inline(always)]
    pub fn degree(&self, u: usize) -> u64 {
        *self.offsets.get(u + 1) - *self.offsets.get(u)
    }

    #[inline]
    pub fn neighbors(&self, u: usize) -> &[Ix] {
        let b = *self.offsets.get(u) as usize;
        let e = *self.offsets.get(u + 1) as usize;
        &self.keys.as_slice()[b..e]
    }

    #[inline]
    pub fn neighbor_weights(&self, u: usize) -> Option<&[W]> {
        let b = *self.offsets.get(u) as usize;
        let e = *self.offsets.get(u + 1) as usize;
        self.values.as_ref().map(|v| &v.as_slice()[b..e])
    }

    /// All edges as `(source, target)` pairs, per-vertex order unspecified.
    pub fn iter_edges(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        (0..self.rows).flat_map(move |u| {
            self.neighbors(u)
                .iter()
                .map(move |v| (u as u64, v.index() as u64))
        })
    }
}

/// Count degrees from already-parsed edge streams.
///
/// Used when the input declares no dimensions (plain edge lists), where the
/// histogram cannot be sized during the parse itself.
pub fn degrees_from_edges<Ix: VertexId, W: Weight>(
    parts: &[EdgeSlice<'_, Ix, W>],
    rows: usize,
    partitions: usize,
) -> Result<DegreeTable, LoadError> {
    let table = DegreeTable::new(rows, partitions)?;
    thread::scope(|s| {
        for (t, part) in parts.iter().enumerate() {
            let part = *part;
            let shard = table.part(t % partitions);
            s.spawn(move |_| {
                for src in part.sources {
                    shard.get(src.index()).add(1, Ordering::Relaxed);
                }
            });
        }
    })
    .map_err(|e| LoadError::ResourceExhausted(format!("degree counting failed: {e:?}")))?;
    Ok(table)
}

/// Assemble the final CSR from per-worker edge streams and their degree
/// histogram. Dispatches on the partition count of `degrees`.
pub fn build_csr<Ix: VertexId, W: Weight>(
    rows: usize,
    cols: usize,
    parts: &[EdgeSlice<'_, Ix, W>],
    degrees: &DegreeTable,
    weighted: bool,
    threads: usize,
) -> Result<Csr<Ix, W>, LoadError> {
    debug_assert_eq!(degrees.rows(), rows);
    if degrees.partitions() == 1 {
        build_direct(rows, cols, parts, degrees, weighted)
    } else {
        build_partitioned(rows, cols, parts, degrees, weighted, threads)
    }
}

/// Exclusive prefix sum of per-vertex degrees into `offsets[0..=rows]`,
/// returning the total.
fn prefix_offsets(
    offsets: &mut AnonArray<u64>,
    rows: usize,
    degree_of: impl Fn(usize) -> u64,
) -> u64 {
    let out = offsets.as_mut_slice();
    let mut sum = 0u64;
    for (u, slot) in out.iter_mut().take(rows).enumerate() {
        *slot = sum;
        sum += degree_of(u);
    }
    out[rows] = sum;
    sum
}

/// Per-vertex atomic cursors primed with the offsets.
fn cursors_from(offsets: &AnonArray<u64>, rows: usize) -> Result<AnonArray<AtomicUsize>, LoadError> {
    let cursors = AnonArray::<AtomicUsize>::zeroed(rows)?;
    for u in 0..rows {
        cursors
            .get(u)
            .store(*offsets.get(u) as usize, Ordering::Relaxed);
    }
    Ok(cursors)
}

fn build_direct<Ix: VertexId, W: Weight>(
    rows: usize,
    cols: usize,
    parts: &[EdgeSlice<'_, Ix, W>],
    degrees: &DegreeTable,
    weighted: bool,
) -> Result<Csr<Ix, W>, LoadError> {
    let mut offsets = AnonArray::<u64>::zeroed(rows + 1)?;
    let m = prefix_offsets(&mut offsets, rows, |u| degrees.total(u));
    debug_assert_eq!(m, parts.iter().map(|p| p.len() as u64).sum::<u64>());

    let cursors = cursors_from(&offsets, rows)?;
    let keys = AnonArray::<Ix>::zeroed(m as usize)?;
    let values = if weighted {
        Some(AnonArray::<W>::zeroed(m as usize)?)
    } else {
        None
    };

    thread::scope(|s| {
        for part in parts {
            let part = *part;
            let cursors = &cursors;
            let mut kdst = keys.shared_slice();
            let vdst = values.as_ref().map(|v| v.shared_slice());
            s.spawn(move |_| match (part.weights, vdst) {
                (Some(wsrc), Some(mut wdst)) => {
                    for i in 0..part.sources.len() {
                        let u = part.sources[i].index();
                        let j = cursors.get(u).fetch_add(1, Ordering::Relaxed);
                        kdst.write(j, part.targets[i]);
                        wdst.write(j, wsrc[i]);
                    }
                }
                _ => {
                    for i in 0..part.sources.len() {
                        let u = part.sources[i].index();
                        let j = cursors.get(u).fetch_add(1, Ordering::Relaxed);
                        kdst.write(j, part.targets[i]);
                    }
                }
            });
        }
    })
    .map_err(|e| LoadError::ResourceExhausted(format!("scatter failed: {e:?}")))?;

    Ok(Csr {
        rows,
        cols,
        offsets,
        keys,
        values,
    })
}

fn build_partitioned<Ix: VertexId, W: Weight>(
    rows: usize,
    cols: usize,
    parts: &[EdgeSlice<'_, Ix, W>],
    degrees: &DegreeTable,
    weighted: bool,
    threads: usize,
) -> Result<Csr<Ix, W>, LoadError> {
    let pcount = degrees.partitions();

    // Per-partition exclusive prefix sums and intermediates.
    let mut poffsets = Vec::with_capacity(pcount);
    let mut pkeys = Vec::with_capacity(pcount);
    let mut pvalues = Vec::with_capacity(pcount);
    let mut pcursors = Vec::with_capacity(pcount);
    for p in 0..pcount {
        let mut offs = AnonArray::<u64>::zeroed(rows + 1)?;
        let pm = prefix_offsets(&mut offs, rows, |u| {
            degrees.part(p).get(u).load(Ordering::Relaxed) as u64
        });
        pcursors.push(cursors_from(&offs, rows)?);
        pkeys.push(AnonArray::<Ix>::zeroed(pm as usize)?);
        pvalues.push(if weighted {
            Some(AnonArray::<W>::zeroed(pm as usize)?)
        } else {
            None
        });
        poffsets.push(offs);
    }

    // Scatter each worker's stream into its partition; only the workers
    // sharing a partition contend on its cursors.
    thread::scope(|s| {
        for (t, part) in parts.iter().enumerate() {
            let part = *part;
            let p = t % pcount;
            let cursors = &pcursors[p];
            let mut kdst = pkeys[p].shared_slice();
            let vdst = pvalues[p].as_ref().map(|v| v.shared_slice());
            s.spawn(move |_| match (part.weights, vdst) {
                (Some(wsrc), Some(mut wdst)) => {
                    for i in 0..part.sources.len() {
                        let u = part.sources[i].index();
                        let j = cursors.get(u).fetch_add(1, Ordering::Relaxed);
                        kdst.write(j, part.targets[i]);
                        wdst.write(j, wsrc[i]);
                    }
                }
                _ => {
                    for i in 0..part.sources.len() {
                        let u = part.sources[i].index();
                        let j = cursors.get(u).fetch_add(1, Ordering::Relaxed);
                        kdst.write(j, part.targets[i]);
                    }
                }
            });
        }
    })
    .map_err(|e| LoadError::ResourceExhausted(format!("scatter failed: {e:?}")))?;

    // Reduce-and-scan over per-partition degrees gives the global offsets.
    let mut offsets = AnonArray::<u64>::zeroed(rows + 1)?;
    let m = prefix_offsets(&mut offsets, rows, |u| degrees.total(u));

    let keys = AnonArray::<Ix>::zeroed(m as usize)?;
    let values = if weighted {
        Some(AnonArray::<W>::zeroed(m as usize)?)
    } else {
        None
    };

    // Gather the partitioned intermediates in source-major order, statically
    // scheduled over vertex ranges.
    let threads = threads.max(1);
    let chunk = rows.div_ceil(threads).max(1);
    thread::scope(|s| {
        for t in 0..threads {
            let lo = (t * chunk).min(rows);
            let hi = (lo + chunk).min(rows);
            let offv = offsets.shared_slice();
            let kdst = keys.shared_slice();
            let vdst = values.as_ref().map(|v| v.shared_slice());
            let poffsets = &poffsets;
            let pkeys = &pkeys;
            let pvalues = &pvalues;
            s.spawn(move |_| {
                for u in lo..hi {
                    let mut dst = *offv.get(u) as usize;
                    for p in 0..pcount {
                        let src = *poffsets[p].get(u) as usize;
                        let cnt = degrees.part(p).get(u).load(Ordering::Relaxed);
                        unsafe {
                            std::ptr::copy_nonoverlapping(
                                pkeys[p].shared_slice().ptr_at(src),
                                kdst.ptr_at(dst),
                                cnt,
                            );
                        }
                        if let (Some(wdst), Some(wsrc)) = (vdst, pvalues[p].as_ref()) {
                            unsafe {
                                std::ptr::copy_nonoverlapping(
                                    wsrc.shared_slice().ptr_at(src),
                                    wdst.ptr_at(dst),
                                    cnt,
                                );
                            }
                        }
                        dst += cnt;
                    }
                }
            });
        }
    })
    .map_err(|e| LoadError::ResourceExhausted(format!("merge failed: {e:?}")))?;

    Ok(Csr {
        rows,
        cols,
        offsets,
        keys,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn views<'a>(
        parts: &'a [(Vec<u32>, Vec<u32>, Option<Vec<f32>>)],
    ) -> Vec<EdgeSlice<'a, u32, f32>> {
        parts
            .iter()
            .map(|(s, t, w)| EdgeSlice {
                sources: s,
                targets: t,
                weights: w.as_deref(),
            })
            .collect()
    }

    fn sorted_pairs(csr: &Csr<u32, f32>) -> Vec<(u64, u64)> {
        let mut v: Vec<_> = csr.iter_edges().collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn offsets_are_canonical() {
        let parts = vec![(vec![0u32, 1, 1, 2], vec![1u32, 0, 2, 1], None)];
        let views = views(&parts);
        let degrees = degrees_from_edges(&views, 3, 1).expect("degrees");
        let csr = build_csr(3, 3, &views, &degrees, false, 1).expect("build");
        assert_eq!(csr.offsets(), &[0, 1, 3, 4]);
        assert_eq!(csr.edge_count(), 4);
        assert_eq!(csr.degree(1), 2);
        assert_eq!(
            sorted_pairs(&csr),
            vec![(0, 1), (1, 0), (1, 2), (2, 1)]
        );
    }

    #[test]
    fn multiple_streams_interleave() {
        let parts = vec![
            (vec![0u32, 2], vec![1u32, 0], None),
            (vec![0u32, 1], vec![2u32, 0], None),
        ];
        let views = views(&parts);
        let degrees = degrees_from_edges(&views, 3, 1).expect("degrees");
        let csr = build_csr(3, 3, &views, &degrees, false, 2).expect("build");
        assert_eq!(csr.offsets(), &[0, 2, 3, 4]);
        assert_eq!(sorted_pairs(&csr), vec![(0, 1), (0, 2), (1, 0), (2, 0)]);
    }

    #[test]
    fn weights_travel_with_their_keys() {
        let parts = vec![(
            vec![0u32, 0, 1],
            vec![1u32, 2, 0],
            Some(vec![0.5f32, 0.25, 1.5]),
        )];
        let views = views(&parts);
        let degrees = degrees_from_edges(&views, 2, 1).expect("degrees");
        let csr = build_csr(2, 3, &views, &degrees, true, 1).expect("build");
        let mut triples: Vec<(u64, u64, f32)> = (0..csr.rows())
            .flat_map(|u| {
                csr.neighbors(u)
                    .iter()
                    .zip(csr.neighbor_weights(u).unwrap())
                    .map(move |(v, w)| (u as u64, *v as u64, *w))
                    .collect::<Vec<_>>()
            })
            .collect();
        triples.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(
            triples,
            vec![(0, 1, 0.5), (0, 2, 0.25), (1, 0, 1.5)]
        );
    }

    #[test]
    fn partitioned_matches_direct() {
        // Four worker streams over 8 vertices with repeated sources.
        let parts: Vec<(Vec<u32>, Vec<u32>, Option<Vec<f32>>)> = (0..4)
            .map(|t| {
                let sources: Vec<u32> = (0..50u32).map(|i| (i * 7 + t) % 8).collect();
                let targets: Vec<u32> = (0..50u32).map(|i| (i * 3 + t) % 8).collect();
                (sources, targets, None)
            })
            .collect();
        let views = views(&parts);
        let direct = {
            let degrees = degrees_from_edges(&views, 8, 1).expect("degrees");
            build_csr(8, 8, &views, &degrees, false, 4).expect("direct")
        };
        for pcount in [2usize, 4] {
            let degrees = degrees_from_edges(&views, 8, pcount).expect("degrees");
            let csr = build_csr(8, 8, &views, &degrees, false, 4).expect("partitioned");
            assert_eq!(csr.offsets(), direct.offsets(), "P={pcount}");
            assert_eq!(sorted_pairs(&csr), sorted_pairs(&direct), "P={pcount}");
        }
    }

    #[test]
    fn partitioned_weighted_matches_direct() {
        let parts: Vec<(Vec<u32>, Vec<u32>, Option<Vec<f32>>)> = (0..4)
            .map(|t| {
                let sources: Vec<u32> = (0..40u32).map(|i| (i * 5 + t) % 6).collect();
                let targets: Vec<u32> = (0..40u32).map(|i| (i + t) % 6).collect();
                let weights: Vec<f32> = (0..40u32).map(|i| (i + t * 100) as f32).collect();
                (sources, targets, Some(weights))
            })
            .collect();
        let views = views(&parts);
        let collect = |csr: &Csr<u32, f32>| {
            let mut v: Vec<(u64, u64, u32)> = (0..csr.rows())
                .flat_map(|u| {
                    csr.neighbors(u)
                        .iter()
                        .zip(csr.neighbor_weights(u).unwrap())
                        .map(move |(t, w)| (u as u64, *t as u64, *w as u32))
                        .collect::<Vec<_>>()
                })
                .collect();
            v.sort_unstable();
            v
        };
        let direct = {
            let degrees = degrees_from_edges(&views, 6, 1).expect("degrees");
            build_csr(6, 6, &views, &degrees, true, 4).expect("direct")
        };
        let degrees = degrees_from_edges(&views, 6, 2).expect("degrees");
        let part = build_csr(6, 6, &views, &degrees, true, 4).expect("partitioned");
        assert_eq!(collect(&part), collect(&direct));
    }

    #[test]
    fn empty_input_builds_empty_csr() {
        let parts: Vec<(Vec<u32>, Vec<u32>, Option<Vec<f32>>)> =
            vec![(Vec::new(), Vec::new(), None)];
        let views = views(&parts);
        let degrees = degrees_from_edges(&views, 4, 1).expect("degrees");
        let csr = build_csr(4, 4, &views, &degrees, false, 1).expect("build");
        assert_eq!(csr.offsets(), &[0, 0, 0, 0, 0]);
        assert_eq!(csr.edge_count(), 0);
        assert!(csr.edge_keys().is_empty());
        assert!(csr.edge_values().is_none());
    }

    #[test]
    fn zero_rows() {
        let parts: Vec<(Vec<u32>, Vec<u32>, Option<Vec<f32>>)> = vec![];
        let views = views(&parts);
        let degrees = degrees_from_edges(&views, 0, 1).expect("degrees");
        let csr = build_csr(0, 0, &views, &degrees, false, 1).expect("build");
        assert_eq!(csr.offsets(), &[0]);
        assert_eq!(csr.edge_count(), 0);
    }
}
