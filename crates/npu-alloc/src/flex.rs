//! # Flexible-Tail Objects
//!
//! A header type that ends in a zero-length array member (`[E; 0]`), allocated
//! together with `count` trailing elements in one zeroed block:
//!
//! ```text
//!  ┌──────────────────────────┬───────┬───────┬─────┬─────────┐
//!  │ header H (.., tail: [E;0])│ E[0]  │ E[1]  │ ... │ E[n-1]  │
//!  └──────────────────────────┴───────┴───────┴─────┴─────────┘
//!  |<------ size_of::<H>() ------>|<--- size_of::<E>() * n --->|
//! ```
//!
//! The tail member is named at the call site with [`alloc_flex!`].

use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::mem::{align_of, size_of};
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};
use core::slice;

use bytemuck::Zeroable;
use npu_core::OutOfMemory;

use crate::size::struct_size;
use crate::zeroed::{allocate, Contiguity};

/// Allocate a zeroed `$ty` whose trailing `$member: [E; 0]` holds `$count`
/// elements.
///
/// ```ignore
/// #[repr(C)]
/// struct CmdList {
///     count: u32,
///     _pad: u32,
///     entries: [u64; 0],
/// }
///
/// let list = alloc_flex!(CmdList, entries, 16)?;
/// assert_eq!(list.tail().len(), 16);
/// ```
#[macro_export]
macro_rules! alloc_flex {
    ($ty:ty, $member:ident, $count:expr $(,)?) => {
        $crate::alloc_flex_with::<$ty, _, _>(|obj: &$ty| &obj.$member, $count)
    };
}

/// Owned header-plus-tail allocation
pub struct FlexBox<H, E> {
    ptr: NonNull<H>,
    layout: Layout,
    tail_offset: usize,
    len: usize,
    _marker: PhantomData<(H, E)>,
}

/// Allocate a zeroed `H` with `count` trailing `E`s
///
/// `tail` selects the zero-length array member that marks where the elements
/// start. It must return a field of the header it is given; anything else is
/// refused with [`OutOfMemory::Exhausted`] before allocating.
#[doc(hidden)]
pub fn alloc_flex_with<H, E, F>(tail: F, count: usize) -> Result<FlexBox<H, E>, OutOfMemory>
where
    H: Zeroable,
    E: Zeroable,
    F: Fn(&H) -> &[E; 0],
{
    let size = struct_size::<H, E>(count)?;

    let tail_offset = {
        let sample = H::zeroed();
        let base = ptr::addr_of!(sample) as usize;
        (tail(&sample).as_ptr() as usize).wrapping_sub(base)
    };
    if tail_offset > size_of::<H>() || tail_offset % align_of::<E>() != 0 {
        log::warn!("alloc: flexible member at offset {:#x} is not a header field", tail_offset);
        return Err(OutOfMemory::Exhausted { size });
    }

    let layout = Layout::from_size_align(size, align_of::<H>().max(align_of::<E>()))
        .map_err(|_| OutOfMemory::Exhausted { size })?;

    let ptr = if size == 0 {
        NonNull::dangling()
    } else {
        allocate(layout, Contiguity::Physical, true)?.cast::<H>()
    };

    Ok(FlexBox {
        ptr,
        layout,
        tail_offset,
        len: count,
        _marker: PhantomData,
    })
}

impl<H, E> FlexBox<H, E> {
    /// Number of tail elements
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tail is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total allocation size in bytes
    pub fn size_bytes(&self) -> usize {
        self.layout.size()
    }

    fn tail_ptr(&self) -> *mut E {
        // SAFETY: tail_offset lies inside the header, which lies inside the
        // allocation
        unsafe { self.ptr.as_ptr().cast::<u8>().add(self.tail_offset).cast::<E>() }
    }

    /// Trailing elements
    pub fn tail(&self) -> &[E] {
        // SAFETY: the allocation holds `len` zero-initialised Es past
        // tail_offset
        unsafe { slice::from_raw_parts(self.tail_ptr(), self.len) }
    }

    /// Trailing elements, mutable
    pub fn tail_mut(&mut self) -> &mut [E] {
        // SAFETY: as in `tail`, and &mut self guarantees uniqueness
        unsafe { slice::from_raw_parts_mut(self.tail_ptr(), self.len) }
    }
}

impl<H, E> Deref for FlexBox<H, E> {
    type Target = H;

    fn deref(&self) -> &H {
        // SAFETY: ptr is valid and zero-initialised for H
        unsafe { self.ptr.as_ref() }
    }
}

impl<H, E> DerefMut for FlexBox<H, E> {
    fn deref_mut(&mut self) -> &mut H {
        // SAFETY: ptr is valid and uniquely owned
        unsafe { self.ptr.as_mut() }
    }
}

impl<H, E> Drop for FlexBox<H, E> {
    fn drop(&mut self) {
        // SAFETY: header and tail were initialised at allocation and are
        // dropped exactly once here
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.tail_ptr(), self.len));
            ptr::drop_in_place(self.ptr.as_ptr());
            if self.layout.size() != 0 {
                alloc::alloc::dealloc(self.ptr.as_ptr().cast::<u8>(), self.layout);
            }
        }
    }
}

// SAFETY: FlexBox owns its header and elements
unsafe impl<H: Send, E: Send> Send for FlexBox<H, E> {}
// SAFETY: shared access only hands out shared references
unsafe impl<H: Sync, E: Sync> Sync for FlexBox<H, E> {}

impl<H: fmt::Debug, E: fmt::Debug> fmt::Debug for FlexBox<H, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlexBox")
            .field("header", &**self)
            .field("tail", &self.tail())
            .finish()
    }
}
