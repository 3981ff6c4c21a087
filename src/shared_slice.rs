//! Shared raw-slice views and anonymous page-backed arrays.
//!
//! Worker scratch and CSR output arrays are large, short-lived, and written
//! concurrently through disjoint or atomically-claimed indices. They are
//! allocated as anonymous read-write pages so they bypass the small-object
//! allocator, arrive zeroed, and are released wholesale on drop.

use memmap2::MmapMut;
use std::mem::size_of;

use crate::error::LoadError;

/// An unchecked mutable view over a shared allocation.
///
/// `Copy`able so each worker captures its own view; all index discipline
/// lives with the callers (exclusive per-worker ranges, or slots claimed by
/// atomic fetch-add).
#[derive(Debug)]
pub struct SharedSliceMut<T> {
    ptr: *mut T,
    len: usize,
}

unsafe impl<T> Send for SharedSliceMut<T> {}
unsafe impl<T> Sync for SharedSliceMut<T> {}

impl<T> Clone for SharedSliceMut<T> {
    #[inline(always)]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SharedSliceMut<T> {}

impl<T> SharedSliceMut<T> {
    #[inline(always)]
    pub(crate) fn new(ptr: *mut T, len: usize) -> Self {
        Self { ptr, len }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub fn get(&self, idx: usize) -> &T {
        debug_assert!(idx < self.len);
        unsafe { &*self.ptr.add(idx) }
    }

    #[inline(always)]
    pub fn get_mut(&mut self, idx: usize) -> &mut T {
        debug_assert!(idx < self.len);
        unsafe { &mut *self.ptr.add(idx) }
    }

    #[inline(always)]
    pub fn write(&mut self, idx: usize, val: T) {
        debug_assert!(idx < self.len);
        unsafe { self.ptr.add(idx).write(val) };
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Raw pointer to element `idx`, for bulk copies during the CSR merge.
    #[inline(always)]
    pub(crate) fn ptr_at(&self, idx: usize) -> *mut T {
        debug_assert!(idx <= self.len);
        unsafe { self.ptr.add(idx) }
    }
}

/// A typed array over anonymous zero-initialized pages.
///
/// The mapping is page-aligned, which satisfies the alignment of every
/// element type used here. Dropping the array unmaps the whole range.
#[derive(Debug)]
pub struct AnonArray<T> {
    slice: SharedSliceMut<T>,
    _mmap: MmapMut,
}

impl<T> AnonArray<T> {
    /// Allocate `len` zeroed elements.
    pub fn zeroed(len: usize) -> Result<Self, LoadError> {
        let bytes = len
            .checked_mul(size_of::<T>())
            .ok_or_else(|| LoadError::ResourceExhausted("buffer size overflow".to_string()))?
            .max(1);
        let mut mmap = MmapMut::map_anon(bytes).map_err(|e| {
            LoadError::ResourceExhausted(format!("anonymous mapping of {bytes} bytes failed: {e}"))
        })?;
        let slice = SharedSliceMut::new(mmap.as_mut_ptr() as *mut T, len);
        Ok(Self { slice, _mmap: mmap })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.slice.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.slice.is_empty()
    }

    #[inline(always)]
    pub fn shared_slice(&self) -> SharedSliceMut<T> {
        self.slice
    }

    #[inline(always)]
    pub fn get(&self, idx: usize) -> &T {
        self.slice.get(idx)
    }

    #[inline(always)]
    pub fn get_mut(&mut self, idx: usize) -> &mut T {
        self.slice.get_mut(idx)
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[T] {
        self.slice.as_slice()
    }

    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.slice.ptr, self.slice.len) }
    }
}
