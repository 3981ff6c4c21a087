//! Shared fixtures for the unit tests.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Small MatrixMarket sample: 3x3 symmetric pattern, two stored entries.
pub(crate) const MTX_SYMMETRIC: &str =
    "%%MatrixMarket matrix coordinate pattern symmetric\n3 3 2\n1 2\n2 3\n";

/// 2x2 general real matrix with weights.
pub(crate) const MTX_WEIGHTED: &str =
    "%%MatrixMarket matrix coordinate real general\n2 2 2\n1 2 0.5\n2 1 1.5\n";

/// Comma-separated edge list with a comment and a stray third column.
pub(crate) const CSV_EDGELIST: &str = "# sample\n1,2\n2,3,3.14\n";

/// Unique temp file path (pid + nanos, no extra crates).
pub(crate) fn temp_path(name: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    let pid = std::process::id();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    p.push(format!("csrload_{pid}_{nanos}_{name}"));
    p
}

pub(crate) fn write_file(path: &Path, bytes: &[u8]) {
    let mut f = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)
        .expect("create temp file");
    f.write_all(bytes).expect("write bytes");
    f.sync_all().ok();
}
