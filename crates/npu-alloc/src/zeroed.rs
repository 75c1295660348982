//! # Zeroing Allocators
//!
//! Fixed-object and array allocation with a caller-chosen backing policy.

use alloc::boxed::Box;
use core::alloc::Layout;
use core::mem::{align_of, size_of, MaybeUninit};
use core::ptr::{self, NonNull};

use bytemuck::Zeroable;
use npu_core::OutOfMemory;

use crate::size::array_size;

// =============================================================================
// BACKING POLICY
// =============================================================================

/// Largest request the physically contiguous path will serve (4 MiB)
pub const MAX_CONTIGUOUS_SIZE: usize = 4 << 20;

/// Backing strategy for an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Contiguity {
    /// Physically contiguous; bounded by [`MAX_CONTIGUOUS_SIZE`]
    #[default]
    Physical,
    /// Virtually contiguous; falls back from the contiguous path for large
    /// requests
    Virtual,
}

impl Contiguity {
    /// Whether this policy can serve `size` bytes
    pub const fn admits(self, size: usize) -> bool {
        match self {
            Contiguity::Physical => size <= MAX_CONTIGUOUS_SIZE,
            Contiguity::Virtual => true,
        }
    }
}

// =============================================================================
// RAW ALLOCATION
// =============================================================================

pub(crate) fn allocate(layout: Layout, contiguity: Contiguity, zeroed: bool) -> Result<NonNull<u8>, OutOfMemory> {
    let size = layout.size();
    debug_assert!(size != 0);

    if !contiguity.admits(size) {
        log::warn!("alloc: {} bytes exceeds the {:?} backing limit", size, contiguity);
        return Err(OutOfMemory::Exhausted { size });
    }

    // SAFETY: layout has a non-zero size
    let raw = unsafe {
        if zeroed {
            alloc::alloc::alloc_zeroed(layout)
        } else {
            alloc::alloc::alloc(layout)
        }
    };

    NonNull::new(raw).ok_or_else(|| {
        log::warn!("alloc: allocator refused {} bytes", size);
        OutOfMemory::Exhausted { size }
    })
}

/// Slice of `count` elements occupying no memory
///
/// Only valid when `count * size_of::<T>()` is zero and a zeroed `T` is a
/// valid `T` (or `T` needs no initialisation).
fn empty_array<T>(count: usize) -> Box<[T]> {
    debug_assert!(size_of::<T>() == 0 || count == 0);
    let slice = ptr::slice_from_raw_parts_mut(NonNull::<T>::dangling().as_ptr(), count);
    // SAFETY: a zero-byte slice needs no allocation, a dangling aligned
    // pointer is valid for it and Box never deallocates zero-sized layouts
    unsafe { Box::from_raw(slice) }
}

fn array_layout<T>(size: usize) -> Result<Layout, OutOfMemory> {
    Layout::from_size_align(size, align_of::<T>()).map_err(|_| OutOfMemory::Exhausted { size })
}

// =============================================================================
// PUBLIC HELPERS
// =============================================================================

/// Allocate one zeroed `T`
pub fn alloc_obj<T: Zeroable>() -> Result<Box<T>, OutOfMemory> {
    if size_of::<T>() == 0 {
        return Ok(Box::new(T::zeroed()));
    }

    let layout = Layout::new::<T>();
    let ptr = allocate(layout, Contiguity::Physical, true)?;

    // SAFETY: ptr was allocated with T's layout and all-zero bytes are a
    // valid T
    Ok(unsafe { Box::from_raw(ptr.as_ptr().cast::<T>()) })
}

/// Allocate `count` zeroed `T`s
pub fn alloc_array<T: Zeroable>(count: usize, contiguity: Contiguity) -> Result<Box<[T]>, OutOfMemory> {
    let size = array_size::<T>(count)?;
    if size == 0 {
        return Ok(empty_array(count));
    }

    let layout = array_layout::<T>(size)?;
    let ptr = allocate(layout, contiguity, true)?;
    let slice = ptr::slice_from_raw_parts_mut(ptr.as_ptr().cast::<T>(), count);

    // SAFETY: the slice covers exactly `layout` and zeroed Ts are valid
    Ok(unsafe { Box::from_raw(slice) })
}

/// Allocate `count` uninitialised `T`s
pub fn alloc_array_uninit<T>(
    count: usize,
    contiguity: Contiguity,
) -> Result<Box<[MaybeUninit<T>]>, OutOfMemory> {
    let size = array_size::<T>(count)?;
    if size == 0 {
        return Ok(empty_array(count));
    }

    let layout = array_layout::<T>(size)?;
    let ptr = allocate(layout, contiguity, false)?;
    let slice = ptr::slice_from_raw_parts_mut(ptr.as_ptr().cast::<MaybeUninit<T>>(), count);

    // SAFETY: MaybeUninit<T> has T's layout and needs no initialisation
    Ok(unsafe { Box::from_raw(slice) })
}
