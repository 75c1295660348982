//! # Scheduler Entities
//!
//! An entity is a submission context: it owns a FIFO of admitted jobs and
//! sits on the run queue matching its priority. Dropping the entity takes it
//! off the run queue and cancels whatever it still has queued; jobs already
//! on the hardware run to completion.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use spin::Mutex;

use npu_core::EntityId;

use crate::config::Priority;
use crate::job::SchedJob;
use crate::platform::SchedCore;

pub(crate) struct EntityState {
    pub(crate) id: EntityId,
    pub(crate) priority: Priority,
    pub(crate) queue: Mutex<VecDeque<SchedJob>>,
    /// Credits admitted through this entity and not yet retired
    pub(crate) reserved: AtomicU64,
    pub(crate) guilty: Option<Arc<AtomicBool>>,
    pub(crate) stopped: AtomicBool,
}

impl EntityState {
    pub(crate) fn new(id: EntityId, priority: Priority, guilty: Option<Arc<AtomicBool>>) -> Self {
        Self {
            id,
            priority,
            queue: Mutex::new(VecDeque::new()),
            reserved: AtomicU64::new(0),
            guilty,
            stopped: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_guilty(&self) -> bool {
        self.guilty.as_ref().is_some_and(|g| g.load(Ordering::Acquire))
    }

    /// Sequence number of the oldest queued job
    pub(crate) fn head_seqno(&self) -> Option<u64> {
        self.queue.lock().front().map(SchedJob::seqno)
    }
}

/// Submission context bound to one scheduler
pub struct Entity {
    state: Arc<EntityState>,
    sched: Arc<SchedCore>,
}

impl Entity {
    pub(crate) fn new(state: Arc<EntityState>, sched: Arc<SchedCore>) -> Self {
        Self { state, sched }
    }

    /// Entity id
    pub fn id(&self) -> EntityId {
        self.state.id
    }

    /// Effective priority (after clamping to the scheduler's run queues)
    pub fn priority(&self) -> Priority {
        self.state.priority
    }

    /// Credit limit of the owning scheduler
    pub fn credit_limit(&self) -> u32 {
        self.sched.credit_limit()
    }

    /// Name of the owning scheduler
    pub fn scheduler_name(&self) -> &str {
        self.sched.name()
    }

    /// Credits admitted through this entity and not yet retired
    pub fn reserved_credits(&self) -> u64 {
        self.state.reserved.load(Ordering::Acquire)
    }

    /// Jobs waiting for dispatch
    pub fn queued_jobs(&self) -> usize {
        self.state.queue.lock().len()
    }

    /// Whether a timeout marked this entity guilty
    pub fn is_guilty(&self) -> bool {
        self.state.is_guilty()
    }

    pub(crate) fn state(&self) -> &Arc<EntityState> {
        &self.state
    }

    pub(crate) fn core(&self) -> &Arc<SchedCore> {
        &self.sched
    }
}

impl Drop for Entity {
    fn drop(&mut self) {
        self.sched.remove_entity(&self.state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.state.id)
            .field("priority", &self.state.priority)
            .field("scheduler", &self.sched.name())
            .field("reserved", &self.reserved_credits())
            .finish()
    }
}

static_assertions::assert_impl_all!(Entity: Send, Sync);
