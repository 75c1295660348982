//! # Checked Size Arithmetic
//!
//! The only place allocation sizes are computed. Overflow is reported as
//! [`SizeOverflow`], never saturated or wrapped.

use core::fmt;
use core::mem::size_of;

use npu_core::OutOfMemory;

/// Size computation overflowed `usize`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeOverflow;

impl fmt::Display for SizeOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "allocation size overflow")
    }
}

impl From<SizeOverflow> for OutOfMemory {
    fn from(_: SizeOverflow) -> Self {
        OutOfMemory::SizeOverflow
    }
}

/// `a * b`
#[inline]
pub const fn size_mul(a: usize, b: usize) -> Result<usize, SizeOverflow> {
    match a.checked_mul(b) {
        Some(v) => Ok(v),
        None => Err(SizeOverflow),
    }
}

/// `a + b`
#[inline]
pub const fn size_add(a: usize, b: usize) -> Result<usize, SizeOverflow> {
    match a.checked_add(b) {
        Some(v) => Ok(v),
        None => Err(SizeOverflow),
    }
}

/// Bytes for `count` elements of `T`
#[inline]
pub const fn array_size<T>(count: usize) -> Result<usize, SizeOverflow> {
    size_mul(size_of::<T>(), count)
}

/// Bytes for a header `H` followed by `count` trailing `E` elements
#[inline]
pub const fn struct_size<H, E>(count: usize) -> Result<usize, SizeOverflow> {
    match array_size::<E>(count) {
        Ok(tail) => size_add(size_of::<H>(), tail),
        Err(e) => Err(e),
    }
}
