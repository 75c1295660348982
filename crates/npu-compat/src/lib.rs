//! # NPU Compatibility Core
//!
//! The interface a driver links against to allocate its structures, stand
//! up schedulers, submit jobs and map buffers, independent of which platform
//! revision it is built for.
//!
//! ## Surface
//!
//! | Operation                       | Result                            |
//! |---------------------------------|-----------------------------------|
//! | [`init_scheduler`]              | [`GpuScheduler`] / [`InitError`]  |
//! | [`submit_job`]                  | `()` / [`AdmissionError`]         |
//! | [`map_object`]                  | [`IoSysMap`] / [`MapError`]       |
//! | [`unmap_object`]                | `()`                              |
//! | [`alloc_obj`]                   | `Box<T>` / [`OutOfMemory`]        |
//! | [`alloc_flex!`]                 | [`FlexBox`] / [`OutOfMemory`]     |
//! | [`alloc_array`]                 | `Box<[T]>` / [`OutOfMemory`]      |
//!
//! ## Platform Revision
//!
//! Enable the `legacy-platform` feature to build against the positional
//! platform revision. Nothing else changes for callers.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

// Errors and shared types
pub use npu_core::{
    AdmissionError, EntityId, Error, InitError, JobId, MapError, ObjectId, OutOfMemory, Result, VirtAddr,
    PAGE_SIZE,
};

// Allocation
pub use bytemuck::Zeroable;
pub use npu_alloc::{
    alloc_array, alloc_array_uninit, alloc_flex, alloc_flex_with, alloc_obj, array_size, size_add, size_mul,
    struct_size, Contiguity, FlexBox, SizeOverflow, MAX_CONTIGUOUS_SIZE,
};

// Scheduling
pub use npu_sched::{
    init_scheduler, submit_job, ActiveRevision, Device, Entity, GpuScheduler, Job, JobState, OwnerTag, Priority,
    Revision, RevisionCaps, SchedJob, SchedStat, SchedStats, SchedulerConfig, SchedulerInfo, SchedulerOps,
    SCHED_STAT_RESET,
};

// Mapping
pub use npu_mem::{map_object, unmap_object, GemObject, GemObjectFuncs, IoSysMap, VaRange, VmapArena};

/// Name of the platform revision this build targets
pub const fn platform_revision() -> &'static str {
    <ActiveRevision as Revision>::NAME
}
