//! # NPU Typed Allocation
//!
//! Size-correct, zero-initialised allocation for driver structures.
//!
//! ## Helpers
//!
//! | Helper                    | Shape                         | Size                        |
//! |---------------------------|-------------------------------|-----------------------------|
//! | [`alloc_obj`]             | one fixed object              | `size_of::<T>()`            |
//! | [`alloc_flex!`]           | header + trailing array       | `size_of::<H>() + size_of::<E>() * n` |
//! | [`alloc_array`]           | `n` objects, zeroed           | `size_of::<T>() * n`        |
//! | [`alloc_array_uninit`]    | `n` objects, not zeroed       | `size_of::<T>() * n`        |
//!
//! Every size goes through the checked primitives in [`size`] before the
//! allocator is touched, so an overflowing request fails with
//! [`OutOfMemory::SizeOverflow`](npu_core::OutOfMemory::SizeOverflow) and
//! never allocates a wrapped size.
//!
//! Zero-validity is a type bound: the zeroing helpers only accept
//! [`bytemuck::Zeroable`] types.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod flex;
pub mod size;
pub mod zeroed;

// Re-exports
pub use flex::{alloc_flex_with, FlexBox};
pub use size::{array_size, size_add, size_mul, struct_size, SizeOverflow};
pub use zeroed::{alloc_array, alloc_array_uninit, alloc_obj, Contiguity, MAX_CONTIGUOUS_SIZE};
