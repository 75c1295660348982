//! # NPU Buffer Mapping
//!
//! CPU mappings for device buffer objects.
//!
//! ```text
//!              map_object / unmap_object
//!                        │
//!          ┌─────────────┴──────────────┐
//!          │ GemObjectFuncs present?    │
//!          └──────┬──────────────┬──────┘
//!             yes │              │ no
//!      ┌──────────▼─────┐  ┌─────▼──────────────────┐
//!      │ funcs.vmap()   │  │ ShmemObject::vmap()    │
//!      │ funcs.vunmap() │  │  pages + VmapArena     │
//!      └──────────┬─────┘  └─────┬──────────────────┘
//!                 └──── IoSysMap ┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod compat;
pub mod iosys;
pub mod object;
pub mod shmem;
pub mod vmap;

// Re-exports
pub use compat::{map_object, unmap_object};
pub use iosys::IoSysMap;
pub use object::{GemObject, GemObjectFuncs};
pub use shmem::{Page, ShmemObject};
pub use vmap::{ArenaStats, VaRange, VmapArena, VMAP_BASE, VMAP_SIZE};
