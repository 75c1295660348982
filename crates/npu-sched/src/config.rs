//! # Scheduler Configuration
//!
//! The revision-independent description of a scheduler, and the operation
//! table the driver plugs into it.

use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;
use core::time::Duration;

use npu_core::Result;

use crate::device::Device;
use crate::job::SchedJob;

// =============================================================================
// DEFAULTS
// =============================================================================

/// Maximum number of run queues (one per [`Priority`])
pub const MAX_RUN_QUEUES: u32 = Priority::COUNT as u32;

/// Default credit limit
pub const DEFAULT_CREDIT_LIMIT: u32 = 64;

/// Default job timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

// =============================================================================
// PRIORITY
// =============================================================================

/// Entity priority; each maps to one run queue, `Kernel` first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Priority {
    /// Kernel-internal work
    Kernel = 0,
    /// High priority
    High   = 1,
    /// Normal priority
    #[default]
    Normal = 2,
    /// Low priority
    Low    = 3,
}

impl Priority {
    /// Number of priority levels
    pub const COUNT: usize = 4;

    /// Run queue index
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Priority for a run queue index
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Kernel),
            1 => Some(Self::High),
            2 => Some(Self::Normal),
            3 => Some(Self::Low),
            _ => None,
        }
    }
}

// =============================================================================
// TIMEOUT STATUS
// =============================================================================

/// Status a timeout handler reports back to the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedStat {
    /// Nothing special to report
    None,
    /// The hardware was reset and the job is gone
    Reset,
    /// The device is gone; the scheduler stops dispatching
    NoDevice,
}

// =============================================================================
// OPERATION TABLE
// =============================================================================

/// Driver callbacks invoked by the scheduler
///
/// Callbacks are made without scheduler locks held, so they may call back
/// into the scheduler (for example [`GpuScheduler::job_done`] from
/// `run_job`).
///
/// [`GpuScheduler::job_done`]: crate::GpuScheduler::job_done
pub trait SchedulerOps: Send + Sync {
    /// Hand a job to the hardware. An error fails the job.
    fn run_job(&self, job: &SchedJob) -> Result<()>;

    /// A dispatched job exceeded the scheduler timeout
    fn timedout_job(&self, job: &SchedJob) -> SchedStat;

    /// The job reached a terminal state; release driver resources
    fn free_job(&self, job: SchedJob);
}

// =============================================================================
// SCHEDULER CONFIGURATION
// =============================================================================

/// Scheduler configuration
///
/// `timeout` of zero disables timeout handling.
#[derive(Clone)]
pub struct SchedulerConfig {
    /// Driver operation table
    pub ops: Arc<dyn SchedulerOps>,
    /// Number of run queues (1..=[`MAX_RUN_QUEUES`])
    pub num_rqs: u32,
    /// Maximum credits in flight, must be non-zero
    pub credit_limit: u32,
    /// Per-job execution timeout
    pub timeout: Duration,
    /// Diagnostic name, unique per device
    pub name: String,
    /// Owning device
    pub dev: Arc<Device>,
}

impl SchedulerConfig {
    /// Configuration with default run queues, credits and timeout
    pub fn new(name: impl Into<String>, ops: Arc<dyn SchedulerOps>, dev: Arc<Device>) -> Self {
        Self {
            ops,
            num_rqs: MAX_RUN_QUEUES,
            credit_limit: DEFAULT_CREDIT_LIMIT,
            timeout: DEFAULT_TIMEOUT,
            name: name.into(),
            dev,
        }
    }

    /// Set the run queue count
    pub fn with_run_queues(mut self, num_rqs: u32) -> Self {
        self.num_rqs = num_rqs;
        self
    }

    /// Set the credit limit
    pub fn with_credit_limit(mut self, credit_limit: u32) -> Self {
        self.credit_limit = credit_limit;
        self
    }

    /// Set the job timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("name", &self.name)
            .field("num_rqs", &self.num_rqs)
            .field("credit_limit", &self.credit_limit)
            .field("timeout", &self.timeout)
            .field("dev", &self.dev.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::tests::NullOps;

    #[test]
    fn test_priority_index_roundtrip() {
        for i in 0..Priority::COUNT {
            assert_eq!(Priority::from_index(i).unwrap().index(), i);
        }
        assert!(Priority::from_index(Priority::COUNT).is_none());
    }

    #[test]
    fn test_config_defaults() {
        let dev = Device::new("npu");
        let config = SchedulerConfig::new("npu0", Arc::new(NullOps::default()), dev);
        assert_eq!(config.num_rqs, MAX_RUN_QUEUES);
        assert_eq!(config.credit_limit, DEFAULT_CREDIT_LIMIT);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);

        let config = config.with_run_queues(2).with_credit_limit(8).with_timeout(Duration::ZERO);
        assert_eq!(config.num_rqs, 2);
        assert_eq!(config.credit_limit, 8);
        assert!(config.timeout.is_zero());
    }
}
