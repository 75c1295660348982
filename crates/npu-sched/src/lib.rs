//! # NPU Scheduling
//!
//! Credit-limited job scheduling for accelerator work queues, and the
//! adapters that keep its contract identical across the two platform
//! revisions.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                         Driver code                               │
//! └───────────────┬───────────────────────────────┬───────────────────┘
//!                 │ init_scheduler                │ submit_job
//! ┌───────────────▼───────────────────────────────▼───────────────────┐
//! │                       compat (adapters)                           │
//! │            written once against the Revision trait                │
//! └───────────────┬───────────────────────────────┬───────────────────┘
//!                 │ Structured                    │ Positional
//! ┌───────────────▼──────────────┐ ┌──────────────▼───────────────────┐
//! │ platform::current            │ │ platform::legacy                 │
//! │  sched_init(&SchedInitArgs)  │ │  sched_init(ops, rqs, credits,   │
//! │  job_init(.., client_id)     │ │    hang_limit, timeout, ..)      │
//! │                              │ │  job_init(.., owner)             │
//! └───────────────┬──────────────┘ └──────────────┬───────────────────┘
//!                 └──────────────┬────────────────┘
//!                 ┌──────────────▼───────────────┐
//!                 │  platform engine (SchedCore) │
//!                 │  run queues · credits ·      │
//!                 │  timeouts · entities         │
//!                 └──────────────────────────────┘
//! ```
//!
//! The revision backing [`compat::init_scheduler`] and
//! [`compat::submit_job`] is chosen at build time: the `legacy-platform`
//! feature selects the positional revision, otherwise the structured one is
//! used. Both are always compiled and can be driven explicitly through
//! [`compat::init_scheduler_on`] and [`compat::submit_job_on`].
//!
//! ## Worker Model
//!
//! The scheduler does not own a thread. The host's worker calls
//! [`GpuScheduler::run`] with a monotonic timestamp; it scans for timed-out
//! jobs and dispatches as much queued work as the credit limit allows.
//! Hardware completion is reported with [`GpuScheduler::job_done`].

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod compat;
pub mod config;
pub mod device;
pub mod entity;
pub mod job;
pub mod platform;
pub mod revision;

// Re-exports
pub use compat::{init_scheduler, init_scheduler_on, submit_job, submit_job_on, SCHED_STAT_RESET};
pub use config::{Priority, SchedStat, SchedulerConfig, SchedulerOps};
pub use device::{Device, SchedulerInfo};
pub use entity::Entity;
pub use job::{Job, JobState, OwnerTag, SchedJob};
pub use platform::{GpuScheduler, SchedStats};
pub use revision::{ActiveRevision, Positional, Revision, RevisionCaps, Structured};
