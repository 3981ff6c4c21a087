//! Read-only memory mapping of input files.

use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use crate::error::LoadError;

/// A read-only, private mapping of an input file.
///
/// The mapping is advised for sequential access and released when the value
/// is dropped. The byte view it hands out is freely shared across workers.
#[derive(Debug)]
pub struct MappedFile {
    mmap: Mmap,
}

impl MappedFile {
    /// Map `path` read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let file = File::open(path.as_ref()).map_err(LoadError::NotFound)?;
        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|e| {
            LoadError::ResourceExhausted(format!(
                "mapping {} failed: {e}",
                path.as_ref().display()
            ))
        })?;
        #[cfg(unix)]
        {
            // Parsing walks the file front to back exactly once.
            let _ = mmap.advise(memmap2::Advice::Sequential);
            let _ = mmap.advise(memmap2::Advice::WillNeed);
        }
        Ok(Self { mmap })
    }

    #[inline(always)]
    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.mmap.len() == 0
    }
}

impl Deref for MappedFile {
    type Target = [u8];

    #[inline(always)]
    fn deref(&self) -> &[u8] {
        &self.mmap
    }
}
