//! # NPU Compat Core
//!
//! Error taxonomy and fundamental types shared by every layer of the
//! compatibility core.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        npu-core                             │
//! │  ┌─────────────────────────┐  ┌──────────────────────────┐  │
//! │  │          Types          │  │          Error           │  │
//! │  │ (VirtAddr, Handle,      │  │ (platform Error, OOM,    │  │
//! │  │  PAGE_SIZE)             │  │  Init/Admission/Map)     │  │
//! │  └─────────────────────────┘  └──────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "std")]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod error;
pub mod types;

// Re-exports for convenience
pub use error::{AdmissionError, Error, InitError, MapError, OutOfMemory, Result};
pub use types::*;
