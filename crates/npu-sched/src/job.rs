//! # Jobs
//!
//! A [`Job`] is the caller-owned slot that job initialization fills in. Once
//! admitted, the scheduler tracks the work through [`SchedJob`] handles that
//! share the same state.

use alloc::sync::{Arc, Weak};
use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use npu_core::{EntityId, Error, JobId, Result};

use crate::entity::EntityState;

// =============================================================================
// OWNER / STATE
// =============================================================================

/// Opaque owner tag carried with a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OwnerTag(pub usize);

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    /// Not yet initialized
    Uninitialized = 0,
    /// Admitted, waiting in its entity queue
    Queued        = 1,
    /// Dispatched to hardware
    Running       = 2,
    /// Hardware signalled completion
    Completed     = 3,
    /// Exceeded the scheduler timeout
    TimedOut      = 4,
    /// `run_job` reported an error
    Failed        = 5,
    /// Dropped before dispatch (entity torn down or guilty)
    Cancelled     = 6,
}

impl JobState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Queued,
            2 => Self::Running,
            3 => Self::Completed,
            4 => Self::TimedOut,
            5 => Self::Failed,
            6 => Self::Cancelled,
            _ => Self::Uninitialized,
        }
    }

    /// Whether the job has left the scheduler for good
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Failed | Self::Cancelled)
    }
}

// =============================================================================
// SHARED JOB STATE
// =============================================================================

pub(crate) struct JobInner {
    id: JobId,
    entity_id: EntityId,
    entity: Weak<EntityState>,
    credits: u32,
    owner: OwnerTag,
    client_id: Option<u64>,
    seqno: u64,
    state: AtomicU8,
    karma: AtomicU32,
}

impl JobInner {
    pub(crate) fn new(
        id: JobId,
        entity: &Arc<EntityState>,
        credits: u32,
        owner: OwnerTag,
        client_id: Option<u64>,
        seqno: u64,
    ) -> Self {
        Self {
            id,
            entity_id: entity.id,
            entity: Arc::downgrade(entity),
            credits,
            owner,
            client_id,
            seqno,
            state: AtomicU8::new(JobState::Queued as u8),
            karma: AtomicU32::new(0),
        }
    }
}

// =============================================================================
// CALLER SLOT
// =============================================================================

/// Caller-owned job slot
///
/// Starts uninitialized; a successful submission fills it in. A failed
/// submission leaves it untouched.
#[derive(Default)]
pub struct Job {
    inner: Option<Arc<JobInner>>,
}

impl Job {
    /// Empty job slot
    pub const fn new() -> Self {
        Self { inner: None }
    }

    /// Whether the job has been admitted
    pub fn is_initialized(&self) -> bool {
        self.inner.is_some()
    }

    /// Job id, once admitted
    pub fn id(&self) -> Option<JobId> {
        self.inner.as_ref().map(|i| i.id)
    }

    /// Credit cost, once admitted
    pub fn credits(&self) -> Option<u32> {
        self.inner.as_ref().map(|i| i.credits)
    }

    /// Owner tag, once admitted
    pub fn owner(&self) -> Option<OwnerTag> {
        self.inner.as_ref().map(|i| i.owner)
    }

    /// Client id, if one was recorded
    pub fn client_id(&self) -> Option<u64> {
        self.inner.as_ref().and_then(|i| i.client_id)
    }

    /// Current lifecycle state
    pub fn state(&self) -> JobState {
        match &self.inner {
            Some(i) => JobState::from_u8(i.state.load(Ordering::Acquire)),
            None => JobState::Uninitialized,
        }
    }

    /// Scheduler handle for an admitted job
    pub fn sched_job(&self) -> Option<SchedJob> {
        self.inner.clone().map(|inner| SchedJob { inner })
    }

    pub(crate) fn attach(&mut self, inner: Arc<JobInner>) -> Result<()> {
        if self.inner.is_some() {
            return Err(Error::InvalidState);
        }
        self.inner = Some(inner);
        Ok(())
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sched_job() {
            Some(job) => fmt::Debug::fmt(&job, f),
            None => f.write_str("Job(uninitialized)"),
        }
    }
}

// =============================================================================
// SCHEDULER HANDLE
// =============================================================================

/// Scheduler-side job handle, passed to [`SchedulerOps`] callbacks
///
/// [`SchedulerOps`]: crate::SchedulerOps
#[derive(Clone)]
pub struct SchedJob {
    inner: Arc<JobInner>,
}

impl SchedJob {
    pub(crate) fn from_inner(inner: Arc<JobInner>) -> Self {
        Self { inner }
    }

    /// Job id
    pub fn id(&self) -> JobId {
        self.inner.id
    }

    /// Submitting entity
    pub fn entity_id(&self) -> EntityId {
        self.inner.entity_id
    }

    /// Credit cost
    pub fn credits(&self) -> u32 {
        self.inner.credits
    }

    /// Owner tag
    pub fn owner(&self) -> OwnerTag {
        self.inner.owner
    }

    /// Client id, if one was recorded
    pub fn client_id(&self) -> Option<u64> {
        self.inner.client_id
    }

    /// Submission sequence number
    pub fn seqno(&self) -> u64 {
        self.inner.seqno
    }

    /// Current lifecycle state
    pub fn state(&self) -> JobState {
        JobState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Number of times this job timed out
    pub fn karma(&self) -> u32 {
        self.inner.karma.load(Ordering::Relaxed)
    }

    pub(crate) fn set_state(&self, state: JobState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn bump_karma(&self) -> u32 {
        self.inner.karma.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn entity(&self) -> Option<Arc<EntityState>> {
        self.inner.entity.upgrade()
    }
}

impl fmt::Debug for SchedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedJob")
            .field("id", &self.inner.id)
            .field("entity", &self.inner.entity_id)
            .field("credits", &self.inner.credits)
            .field("seqno", &self.inner.seqno)
            .field("state", &self.state())
            .finish()
    }
}

static_assertions::assert_impl_all!(SchedJob: Send, Sync, Clone);
static_assertions::assert_impl_all!(Job: Send, Sync);
