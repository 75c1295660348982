//! # Platform Scheduler
//!
//! The scheduling engine both platform revisions drive, plus the revision
//! specific entry points in [`current`] and [`legacy`].
//!
//! ## Dispatch
//!
//! Run queues are scanned from `Kernel` down. Within the first queue that
//! has ready work, the entity whose head job was submitted first wins. The
//! head job is dispatched only if its credits fit under the limit; if they
//! don't, dispatch stops until credits are returned.
//!
//! ## Credits
//!
//! - `reserved`: credits admitted and not yet retired
//! - `credit_count`: credits of jobs on the hardware, never above the limit

pub mod current;
pub mod legacy;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use core::time::Duration;

use spin::Mutex;

use npu_core::{EntityId, Error, JobId, Result};

use crate::config::{Priority, SchedStat, SchedulerOps, MAX_RUN_QUEUES};
use crate::device::{Device, SchedulerInfo};
use crate::entity::{Entity, EntityState};
use crate::job::{Job, JobInner, JobState, OwnerTag, SchedJob};

// =============================================================================
// STATISTICS
// =============================================================================

/// Scheduler statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedStats {
    /// Jobs admitted
    pub submitted: u64,
    /// Jobs handed to `run_job`
    pub dispatched: u64,
    /// Jobs completed by the hardware
    pub completed: u64,
    /// Jobs that exceeded the timeout
    pub timed_out: u64,
    /// Jobs whose `run_job` failed
    pub failed: u64,
    /// Jobs dropped before dispatch
    pub cancelled: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    dispatched: AtomicU64,
    completed: AtomicU64,
    timed_out: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SchedStats {
        SchedStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Creation parameters shared by both revisions
pub(crate) struct CoreParams {
    pub ops: Arc<dyn SchedulerOps>,
    pub num_rqs: u32,
    pub credit_limit: u32,
    pub hang_limit: u32,
    pub timeout: Duration,
    pub score: Option<Arc<AtomicU32>>,
    pub name: String,
    pub dev: Arc<Device>,
}

struct InFlight {
    job: SchedJob,
    started: Duration,
}

pub(crate) struct SchedCore {
    ops: Arc<dyn SchedulerOps>,
    name: String,
    dev: Arc<Device>,
    num_rqs: u32,
    credit_limit: u32,
    hang_limit: u32,
    timeout: Duration,
    run_queues: Vec<Mutex<Vec<Arc<EntityState>>>>,
    pending: Mutex<Vec<InFlight>>,
    credit_count: AtomicU32,
    reserved: AtomicU64,
    score: Arc<AtomicU32>,
    ready: AtomicBool,
    torn_down: AtomicBool,
    next_job: AtomicU64,
    next_entity: AtomicU64,
    next_seqno: AtomicU64,
    counters: Counters,
}

impl SchedCore {
    pub(crate) fn create(params: CoreParams) -> Result<GpuScheduler> {
        let CoreParams {
            ops,
            num_rqs,
            credit_limit,
            hang_limit,
            timeout,
            score,
            name,
            dev,
        } = params;

        if num_rqs == 0 || num_rqs > MAX_RUN_QUEUES {
            log::warn!("{}: invalid run queue count {}", name, num_rqs);
            return Err(Error::InvalidParameter);
        }
        if credit_limit == 0 {
            log::warn!("{}: credit limit must be non-zero", name);
            return Err(Error::InvalidParameter);
        }
        if name.is_empty() {
            log::warn!("{}: scheduler name must not be empty", dev.name());
            return Err(Error::InvalidParameter);
        }

        let mut run_queues = Vec::new();
        run_queues
            .try_reserve_exact(num_rqs as usize)
            .map_err(|_| Error::OutOfMemory)?;
        run_queues.extend((0..num_rqs).map(|_| Mutex::new(Vec::new())));

        let core = Arc::new(SchedCore {
            ops,
            name,
            dev,
            num_rqs,
            credit_limit,
            hang_limit,
            timeout,
            run_queues,
            pending: Mutex::new(Vec::new()),
            credit_count: AtomicU32::new(0),
            reserved: AtomicU64::new(0),
            score: score.unwrap_or_default(),
            ready: AtomicBool::new(true),
            torn_down: AtomicBool::new(false),
            next_job: AtomicU64::new(1),
            next_entity: AtomicU64::new(1),
            next_seqno: AtomicU64::new(0),
            counters: Counters::default(),
        });

        // Registration is the last fallible step
        core.dev.register(&core)?;

        log::info!(
            "{}: scheduler up on {} ({} rqs, {} credits, timeout {:?})",
            core.name,
            core.dev.name(),
            core.num_rqs,
            core.credit_limit,
            core.timeout
        );

        Ok(GpuScheduler { core })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn credit_limit(&self) -> u32 {
        self.credit_limit
    }

    pub(crate) fn info(&self) -> SchedulerInfo {
        SchedulerInfo {
            name: self.name.clone(),
            num_rqs: self.num_rqs,
            credit_limit: self.credit_limit,
            hang_limit: self.hang_limit,
            timeout: self.timeout,
            credits_in_flight: self.credit_count.load(Ordering::Acquire),
            reserved_credits: self.reserved.load(Ordering::Acquire),
            ready: self.ready.load(Ordering::Acquire),
        }
    }

    // -------------------------------------------------------------------------
    // Entities
    // -------------------------------------------------------------------------

    fn add_entity(self: &Arc<Self>, priority: Priority, guilty: Option<Arc<AtomicBool>>) -> Result<Entity> {
        let priority = if priority.index() >= self.num_rqs as usize {
            let clamped = Priority::from_index(self.num_rqs as usize - 1).unwrap_or(Priority::Kernel);
            log::warn!(
                "{}: priority {:?} beyond {} run queues, using {:?}",
                self.name,
                priority,
                self.num_rqs,
                clamped
            );
            clamped
        } else {
            priority
        };

        let id = EntityId::new(self.next_entity.fetch_add(1, Ordering::Relaxed));
        let state = Arc::new(EntityState::new(id, priority, guilty));

        {
            let mut rq = self.run_queues[priority.index()].lock();
            rq.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
            rq.push(state.clone());
        }
        self.score.fetch_add(1, Ordering::AcqRel);

        log::debug!("{}: entity {:?} at {:?}", self.name, id, priority);
        Ok(Entity::new(state, self.clone()))
    }

    pub(crate) fn remove_entity(&self, state: &Arc<EntityState>) {
        self.run_queues[state.priority.index()]
            .lock()
            .retain(|e| !Arc::ptr_eq(e, state));
        self.score.fetch_sub(1, Ordering::AcqRel);

        let cancelled: Vec<SchedJob> = {
            let mut queue = state.queue.lock();
            state.stopped.store(true, Ordering::Release);
            queue.drain(..).collect()
        };

        if !cancelled.is_empty() {
            log::debug!(
                "{}: entity {:?} torn down, cancelling {} queued jobs",
                self.name,
                state.id,
                cancelled.len()
            );
        }
        for job in cancelled {
            self.retire(job, JobState::Cancelled, false);
        }
    }

    // -------------------------------------------------------------------------
    // Admission
    // -------------------------------------------------------------------------

    /// Validate and queue a job; `job` is only filled in on success
    pub(crate) fn admit(
        &self,
        job: &mut Job,
        entity: &Arc<EntityState>,
        credits: u32,
        owner: OwnerTag,
        client_id: Option<u64>,
    ) -> Result<()> {
        if job.is_initialized() {
            return Err(Error::InvalidState);
        }
        if credits > self.credit_limit {
            log::debug!(
                "{}: job needs {} credits, limit {}",
                self.name,
                credits,
                self.credit_limit
            );
            return Err(Error::CreditLimitExceeded);
        }

        let mut queue = entity.queue.lock();
        if entity.stopped.load(Ordering::Acquire) {
            return Err(Error::InvalidState);
        }
        if self.torn_down.load(Ordering::Acquire) {
            log::debug!("{}: scheduler is down, job rejected", self.name);
            return Err(Error::InvalidState);
        }
        queue.try_reserve(1).map_err(|_| Error::OutOfMemory)?;

        let id = JobId::new(self.next_job.fetch_add(1, Ordering::Relaxed));
        let seqno = self.next_seqno.fetch_add(1, Ordering::AcqRel);
        let inner = Arc::new(JobInner::new(id, entity, credits, owner, client_id, seqno));

        job.attach(inner.clone())?;
        queue.push_back(SchedJob::from_inner(inner));
        entity.reserved.fetch_add(u64::from(credits), Ordering::AcqRel);
        self.reserved.fetch_add(u64::from(credits), Ordering::AcqRel);
        drop(queue);

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        log::debug!("{}: job {:?} queued on {:?} ({} credits)", self.name, id, entity.id, credits);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    /// Entity holding the next job to run
    fn select_entity(&self) -> Option<Arc<EntityState>> {
        for rq in &self.run_queues {
            let rq = rq.lock();
            let best = rq
                .iter()
                .filter(|e| !e.stopped.load(Ordering::Acquire))
                .filter_map(|e| e.head_seqno().map(|seq| (seq, e)))
                .min_by_key(|(seq, _)| *seq);
            if let Some((_, entity)) = best {
                return Some(entity.clone());
            }
        }
        None
    }

    /// Add `credits` to the in-flight count if the limit allows it
    fn take_credits(&self, credits: u32) -> bool {
        let limit = self.credit_limit;
        self.credit_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_add(credits).filter(|&n| n <= limit)
            })
            .is_ok()
    }

    /// Pop the entity's head job if its credits fit
    fn pop_if_fits(&self, entity: &EntityState) -> Option<SchedJob> {
        let mut queue = entity.queue.lock();
        let credits = queue.front()?.credits();
        if !self.take_credits(credits) {
            return None;
        }
        queue.pop_front()
    }

    fn run(&self, now: Duration) -> usize {
        if self.ready.load(Ordering::Acquire) {
            self.check_timeouts(now);
        }

        let mut dispatched = 0;
        while self.ready.load(Ordering::Acquire) {
            let Some(entity) = self.select_entity() else {
                break;
            };
            let Some(job) = self.pop_if_fits(&entity) else {
                break;
            };

            if entity.is_guilty() {
                log::debug!("{}: dropping job {:?} from guilty entity", self.name, job.id());
                self.retire(job, JobState::Cancelled, true);
                continue;
            }

            job.set_state(JobState::Running);
            self.pending.lock().push(InFlight {
                job: job.clone(),
                started: now,
            });
            self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

            match self.ops.run_job(&job) {
                Ok(()) => dispatched += 1,
                Err(e) => {
                    log::warn!("{}: run_job failed for {:?}: {}", self.name, job.id(), e);
                    if self.take_pending(job.id()).is_some() {
                        self.retire(job, JobState::Failed, true);
                    }
                },
            }
        }
        dispatched
    }

    // -------------------------------------------------------------------------
    // Completion and timeouts
    // -------------------------------------------------------------------------

    fn take_pending(&self, id: JobId) -> Option<SchedJob> {
        let mut pending = self.pending.lock();
        let index = pending.iter().position(|p| p.job.id() == id)?;
        Some(pending.remove(index).job)
    }

    fn job_done(&self, id: JobId) -> Result<()> {
        let job = self.take_pending(id).ok_or(Error::NotFound)?;
        self.retire(job, JobState::Completed, true);
        Ok(())
    }

    /// Expire overdue jobs; a stopped scheduler keeps its jobs untouched
    fn check_timeouts(&self, now: Duration) -> usize {
        if self.timeout.is_zero() || !self.ready.load(Ordering::Acquire) {
            return 0;
        }

        let expired: Vec<SchedJob> = {
            let mut pending = self.pending.lock();
            let mut expired = Vec::new();
            pending.retain(|p| {
                if now.saturating_sub(p.started) >= self.timeout {
                    expired.push(p.job.clone());
                    false
                } else {
                    true
                }
            });
            expired
        };

        let count = expired.len();
        for job in expired {
            log::warn!("{}: job {:?} timed out after {:?}", self.name, job.id(), self.timeout);

            if job.bump_karma() > self.hang_limit {
                if let Some(guilty) = job.entity().and_then(|e| e.guilty.clone()) {
                    guilty.store(true, Ordering::Release);
                    log::warn!("{}: entity {:?} marked guilty", self.name, job.entity_id());
                }
            }

            match self.ops.timedout_job(&job) {
                SchedStat::None => {},
                SchedStat::Reset => log::info!("{}: hardware reset after {:?}", self.name, job.id()),
                SchedStat::NoDevice => {
                    self.ready.store(false, Ordering::Release);
                    log::error!("{}: {}, dispatch stopped", self.name, Error::DeviceLost);
                },
            }

            self.retire(job, JobState::TimedOut, true);
        }
        count
    }

    /// Stop for good: later admissions fail and queued jobs are cancelled
    fn teardown(&self) {
        self.ready.store(false, Ordering::Release);
        // Admissions check the flag under the entity queue lock, so anything
        // queued before it was set is drained below.
        self.torn_down.store(true, Ordering::Release);

        let mut cancelled: Vec<SchedJob> = Vec::new();
        for rq in &self.run_queues {
            let rq = rq.lock();
            for entity in rq.iter() {
                cancelled.extend(entity.queue.lock().drain(..));
            }
        }

        if !cancelled.is_empty() {
            log::debug!("{}: cancelling {} queued jobs", self.name, cancelled.len());
        }
        for job in cancelled {
            self.retire(job, JobState::Cancelled, false);
        }
    }

    /// Return a job's credits and hand it back to the driver
    fn retire(&self, job: SchedJob, state: JobState, in_flight: bool) {
        let credits = job.credits();
        if in_flight {
            self.credit_count.fetch_sub(credits, Ordering::AcqRel);
        }
        self.reserved.fetch_sub(u64::from(credits), Ordering::AcqRel);
        if let Some(entity) = job.entity() {
            entity.reserved.fetch_sub(u64::from(credits), Ordering::AcqRel);
        }

        job.set_state(state);
        let counter = match state {
            JobState::Completed => &self.counters.completed,
            JobState::TimedOut => &self.counters.timed_out,
            JobState::Failed => &self.counters.failed,
            _ => &self.counters.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.ops.free_job(job);
    }
}

// =============================================================================
// PUBLIC HANDLE
// =============================================================================

/// A live scheduler
///
/// Dropping the handle stops dispatch, cancels queued jobs, rejects further
/// submissions and removes the scheduler from its device's registry.
pub struct GpuScheduler {
    core: Arc<SchedCore>,
}

impl GpuScheduler {
    /// Scheduler name
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Owning device
    pub fn device(&self) -> &Arc<Device> {
        &self.core.dev
    }

    /// Run queue count
    pub fn num_rqs(&self) -> u32 {
        self.core.num_rqs
    }

    /// Credit limit
    pub fn credit_limit(&self) -> u32 {
        self.core.credit_limit
    }

    /// Hang limit
    pub fn hang_limit(&self) -> u32 {
        self.core.hang_limit
    }

    /// Job timeout; zero means none
    pub fn timeout(&self) -> Duration {
        self.core.timeout
    }

    /// Credits of jobs on the hardware
    pub fn credits_in_flight(&self) -> u32 {
        self.core.credit_count.load(Ordering::Acquire)
    }

    /// Credits admitted and not yet retired
    pub fn reserved_credits(&self) -> u64 {
        self.core.reserved.load(Ordering::Acquire)
    }

    /// Jobs on the hardware
    pub fn jobs_in_flight(&self) -> usize {
        self.core.pending.lock().len()
    }

    /// Load score (live entities); may be shared between schedulers
    pub fn score(&self) -> u32 {
        self.core.score.load(Ordering::Acquire)
    }

    /// Whether the scheduler is dispatching
    pub fn is_ready(&self) -> bool {
        self.core.ready.load(Ordering::Acquire)
    }

    /// Statistics snapshot
    pub fn stats(&self) -> SchedStats {
        self.core.counters.snapshot()
    }

    /// Registry view of this scheduler
    pub fn info(&self) -> SchedulerInfo {
        self.core.info()
    }

    /// Create an entity at `priority`
    ///
    /// Priorities beyond the configured run queues are clamped to the lowest
    /// one. If `guilty` is given it is set when one of the entity's jobs
    /// times out more than `hang_limit` times; queued jobs of a guilty entity
    /// are cancelled instead of dispatched.
    pub fn create_entity(&self, priority: Priority, guilty: Option<Arc<AtomicBool>>) -> Result<Entity> {
        self.core.add_entity(priority, guilty)
    }

    /// Worker step: expire timed-out jobs, then dispatch what fits
    ///
    /// Returns the number of jobs handed to the hardware.
    pub fn run(&self, now: Duration) -> usize {
        self.core.run(now)
    }

    /// Expire jobs dispatched at least one timeout before `now`
    pub fn check_timeouts(&self, now: Duration) -> usize {
        self.core.check_timeouts(now)
    }

    /// Hardware completion for a dispatched job
    pub fn job_done(&self, id: JobId) -> Result<()> {
        self.core.job_done(id)
    }

    /// Pause dispatch; queued and in-flight jobs are kept
    pub fn stop(&self) {
        self.core.ready.store(false, Ordering::Release);
        log::debug!("{}: stopped", self.core.name);
    }

    /// Resume dispatch
    pub fn start(&self) {
        self.core.ready.store(true, Ordering::Release);
        log::debug!("{}: started", self.core.name);
    }
}

impl Drop for GpuScheduler {
    fn drop(&mut self) {
        self.core.teardown();
        self.core.dev.unregister(&self.core);
        log::info!("{}: scheduler down", self.core.name);
    }
}

impl fmt::Debug for GpuScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuScheduler")
            .field("name", &self.core.name)
            .field("num_rqs", &self.core.num_rqs)
            .field("credit_limit", &self.core.credit_limit)
            .field("timeout", &self.core.timeout)
            .field("in_flight", &self.credits_in_flight())
            .finish()
    }
}

impl fmt::Debug for SchedCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedCore").field("name", &self.name).finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(GpuScheduler: Send, Sync);

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::thread;

    /// Ops that accept everything and record callbacks
    #[derive(Default)]
    pub(crate) struct NullOps {
        pub ran: StdMutex<Vec<JobId>>,
        pub freed: StdMutex<Vec<(JobId, JobState)>>,
        pub timed_out: StdMutex<Vec<JobId>>,
        pub fail_run: AtomicBool,
        pub timeout_stat: StdMutex<Option<SchedStat>>,
    }

    impl SchedulerOps for NullOps {
        fn run_job(&self, job: &SchedJob) -> Result<()> {
            if self.fail_run.load(Ordering::Relaxed) {
                return Err(Error::InvalidState);
            }
            self.ran.lock().unwrap().push(job.id());
            Ok(())
        }

        fn timedout_job(&self, job: &SchedJob) -> SchedStat {
            self.timed_out.lock().unwrap().push(job.id());
            self.timeout_stat.lock().unwrap().unwrap_or(SchedStat::None)
        }

        fn free_job(&self, job: SchedJob) {
            self.freed.lock().unwrap().push((job.id(), job.state()));
        }
    }

    fn sched_with(ops: Arc<NullOps>, num_rqs: u32, credit_limit: u32, hang_limit: u32) -> GpuScheduler {
        SchedCore::create(CoreParams {
            ops,
            num_rqs,
            credit_limit,
            hang_limit,
            timeout: Duration::from_millis(100),
            score: None,
            name: "test".into(),
            dev: Device::new("npu"),
        })
        .unwrap()
    }

    fn submit(entity: &Entity, credits: u32) -> Job {
        let mut job = Job::new();
        entity
            .core()
            .admit(&mut job, entity.state(), credits, OwnerTag(0), None)
            .unwrap();
        job
    }

    #[test]
    fn test_create_validates() {
        let ops = Arc::new(NullOps::default());
        let dev = Device::new("npu");
        let params = |num_rqs, credit_limit, name: &str| CoreParams {
            ops: ops.clone(),
            num_rqs,
            credit_limit,
            hang_limit: 0,
            timeout: Duration::ZERO,
            score: None,
            name: name.into(),
            dev: dev.clone(),
        };

        assert_eq!(SchedCore::create(params(0, 8, "a")).unwrap_err(), Error::InvalidParameter);
        assert_eq!(SchedCore::create(params(5, 8, "a")).unwrap_err(), Error::InvalidParameter);
        assert_eq!(SchedCore::create(params(4, 0, "a")).unwrap_err(), Error::InvalidParameter);
        assert_eq!(SchedCore::create(params(4, 8, "")).unwrap_err(), Error::InvalidParameter);
        assert!(dev.scheduler_names().is_empty());

        let first = SchedCore::create(params(4, 8, "a")).unwrap();
        assert_eq!(SchedCore::create(params(4, 8, "a")).unwrap_err(), Error::AlreadyExists);
        assert_eq!(dev.scheduler_names(), ["a"]);

        drop(first);
        assert!(dev.scheduler_names().is_empty());
        assert!(SchedCore::create(params(4, 8, "a")).is_ok());
    }

    #[test]
    fn test_fifo_within_entity() {
        let ops = Arc::new(NullOps::default());
        let sched = sched_with(ops.clone(), 4, 64, 0);
        let entity = sched.create_entity(Priority::Normal, None).unwrap();

        let jobs: Vec<Job> = (0..5).map(|_| submit(&entity, 1)).collect();
        assert_eq!(sched.run(Duration::ZERO), 5);

        let expected: Vec<JobId> = jobs.iter().map(|j| j.id().unwrap()).collect();
        assert_eq!(*ops.ran.lock().unwrap(), expected);
        assert!(jobs.iter().all(|j| j.state() == JobState::Running));
    }

    #[test]
    fn test_fifo_across_entities_and_priority() {
        let ops = Arc::new(NullOps::default());
        let sched = sched_with(ops.clone(), 4, 64, 0);
        let low_a = sched.create_entity(Priority::Low, None).unwrap();
        let low_b = sched.create_entity(Priority::Low, None).unwrap();
        let high = sched.create_entity(Priority::High, None).unwrap();

        let a1 = submit(&low_a, 1);
        let b1 = submit(&low_b, 1);
        let a2 = submit(&low_a, 1);
        let h1 = submit(&high, 1);

        sched.run(Duration::ZERO);
        let order: Vec<JobId> = [&h1, &a1, &b1, &a2].iter().map(|j| j.id().unwrap()).collect();
        assert_eq!(*ops.ran.lock().unwrap(), order);
    }

    #[test]
    fn test_credit_gating_head_of_line() {
        let ops = Arc::new(NullOps::default());
        let sched = sched_with(ops.clone(), 4, 10, 0);
        let entity = sched.create_entity(Priority::Normal, None).unwrap();

        let big = submit(&entity, 8);
        let next = submit(&entity, 4);
        let _small = submit(&entity, 1);

        assert_eq!(sched.run(Duration::ZERO), 1);
        assert_eq!(sched.credits_in_flight(), 8);
        assert_eq!(sched.reserved_credits(), 13);
        assert_eq!(next.state(), JobState::Queued);

        sched.job_done(big.id().unwrap()).unwrap();
        assert_eq!(big.state(), JobState::Completed);
        assert_eq!(sched.credits_in_flight(), 0);

        assert_eq!(sched.run(Duration::ZERO), 2);
        assert_eq!(sched.credits_in_flight(), 5);
        assert_eq!(entity.reserved_credits(), 5);
    }

    #[test]
    fn test_job_done_unknown() {
        let sched = sched_with(Arc::new(NullOps::default()), 1, 4, 0);
        assert_eq!(sched.job_done(JobId::new(42)).unwrap_err(), Error::NotFound);
    }

    #[test]
    fn test_priority_clamped() {
        let sched = sched_with(Arc::new(NullOps::default()), 2, 4, 0);
        let entity = sched.create_entity(Priority::Low, None).unwrap();
        assert_eq!(entity.priority(), Priority::High);
        assert_eq!(sched.score(), 1);
        drop(entity);
        assert_eq!(sched.score(), 0);
    }

    #[test]
    fn test_timeout_marks_guilty() {
        let ops = Arc::new(NullOps::default());
        let sched = sched_with(ops.clone(), 4, 8, 0);
        let guilty = Arc::new(AtomicBool::new(false));
        let entity = sched.create_entity(Priority::Normal, Some(guilty.clone())).unwrap();

        let first = submit(&entity, 2);
        let second = submit(&entity, 8);
        assert_eq!(sched.run(Duration::ZERO), 1);

        assert_eq!(sched.check_timeouts(Duration::from_millis(99)), 0);
        assert_eq!(sched.run(Duration::from_millis(100)), 0);

        assert_eq!(first.state(), JobState::TimedOut);
        assert_eq!(first.sched_job().unwrap().karma(), 1);
        assert!(guilty.load(Ordering::Acquire));
        assert!(entity.is_guilty());
        // queued work of a guilty entity is dropped
        assert_eq!(second.state(), JobState::Cancelled);
        assert_eq!(sched.credits_in_flight(), 0);
        assert_eq!(sched.reserved_credits(), 0);
        assert_eq!(*ops.timed_out.lock().unwrap(), [first.id().unwrap()]);
        assert_eq!(sched.stats().timed_out, 1);
        assert_eq!(sched.stats().cancelled, 1);
    }

    #[test]
    fn test_hang_limit_tolerates_timeouts() {
        let sched = sched_with(Arc::new(NullOps::default()), 4, 8, 1);
        let guilty = Arc::new(AtomicBool::new(false));
        let entity = sched.create_entity(Priority::Normal, Some(guilty.clone())).unwrap();

        let _job = submit(&entity, 1);
        sched.run(Duration::ZERO);
        sched.check_timeouts(Duration::from_secs(1));
        assert!(!guilty.load(Ordering::Acquire));
    }

    #[test]
    fn test_no_device_stops_dispatch() {
        let ops = Arc::new(NullOps::default());
        *ops.timeout_stat.lock().unwrap() = Some(SchedStat::NoDevice);
        let sched = sched_with(ops.clone(), 4, 8, 0);
        let entity = sched.create_entity(Priority::Normal, None).unwrap();

        let _a = submit(&entity, 1);
        sched.run(Duration::ZERO);
        let b = submit(&entity, 1);

        assert_eq!(sched.run(Duration::from_secs(1)), 0);
        assert!(!sched.is_ready());
        assert_eq!(b.state(), JobState::Queued);

        sched.start();
        assert_eq!(sched.run(Duration::from_secs(1)), 1);
    }

    #[test]
    fn test_stop_start() {
        let sched = sched_with(Arc::new(NullOps::default()), 4, 8, 0);
        let entity = sched.create_entity(Priority::Kernel, None).unwrap();
        let _job = submit(&entity, 1);

        sched.stop();
        assert_eq!(sched.run(Duration::ZERO), 0);
        sched.start();
        assert_eq!(sched.run(Duration::ZERO), 1);
    }

    #[test]
    fn test_stop_suspends_timeouts() {
        let ops = Arc::new(NullOps::default());
        let sched = sched_with(ops.clone(), 4, 8, 0);
        let entity = sched.create_entity(Priority::Normal, None).unwrap();
        let job = submit(&entity, 1);
        assert_eq!(sched.run(Duration::ZERO), 1);

        sched.stop();
        assert_eq!(sched.run(Duration::from_secs(10)), 0);
        assert_eq!(sched.check_timeouts(Duration::from_secs(10)), 0);
        assert_eq!(job.state(), JobState::Running);
        assert!(ops.timed_out.lock().unwrap().is_empty());

        sched.start();
        assert_eq!(sched.check_timeouts(Duration::from_secs(10)), 1);
        assert_eq!(job.state(), JobState::TimedOut);
    }

    #[test]
    fn test_dropped_scheduler_rejects_and_cancels() {
        let ops = Arc::new(NullOps::default());
        let sched = sched_with(ops.clone(), 4, 8, 0);
        let entity = sched.create_entity(Priority::Normal, None).unwrap();
        let queued = submit(&entity, 3);

        drop(sched);
        assert_eq!(queued.state(), JobState::Cancelled);
        assert_eq!(*ops.freed.lock().unwrap(), [(queued.id().unwrap(), JobState::Cancelled)]);
        assert_eq!(entity.reserved_credits(), 0);

        let mut late = Job::new();
        let err = entity
            .core()
            .admit(&mut late, entity.state(), 1, OwnerTag(0), None)
            .unwrap_err();
        assert_eq!(err, Error::InvalidState);
        assert!(!late.is_initialized());
        assert_eq!(entity.core().reserved.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_run_job_failure_returns_credits() {
        let ops = Arc::new(NullOps::default());
        ops.fail_run.store(true, Ordering::Relaxed);
        let sched = sched_with(ops.clone(), 4, 8, 0);
        let entity = sched.create_entity(Priority::Normal, None).unwrap();

        let job = submit(&entity, 3);
        assert_eq!(sched.run(Duration::ZERO), 0);
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(sched.credits_in_flight(), 0);
        assert_eq!(sched.reserved_credits(), 0);
        assert_eq!(sched.jobs_in_flight(), 0);
        assert_eq!(*ops.freed.lock().unwrap(), [(job.id().unwrap(), JobState::Failed)]);
    }

    #[test]
    fn test_entity_teardown_cancels_queued() {
        let ops = Arc::new(NullOps::default());
        let sched = sched_with(ops.clone(), 4, 2, 0);
        let entity = sched.create_entity(Priority::Normal, None).unwrap();

        let running = submit(&entity, 2);
        let queued = submit(&entity, 2);
        sched.run(Duration::ZERO);
        drop(entity);

        assert_eq!(queued.state(), JobState::Cancelled);
        assert_eq!(running.state(), JobState::Running);
        assert_eq!(sched.reserved_credits(), 2);

        sched.job_done(running.id().unwrap()).unwrap();
        assert_eq!(sched.reserved_credits(), 0);
        assert_eq!(sched.credits_in_flight(), 0);
    }

    #[test]
    fn test_reinit_rejected() {
        let sched = sched_with(Arc::new(NullOps::default()), 4, 8, 0);
        let entity = sched.create_entity(Priority::Normal, None).unwrap();
        let mut job = submit(&entity, 1);
        let id = job.id();

        let err = entity
            .core()
            .admit(&mut job, entity.state(), 1, OwnerTag(0), None)
            .unwrap_err();
        assert_eq!(err, Error::InvalidState);
        assert_eq!(job.id(), id);
        assert_eq!(sched.reserved_credits(), 1);
    }

    #[test]
    fn test_concurrent_submission_respects_limit() {
        let ops = Arc::new(NullOps::default());
        let sched = Arc::new(sched_with(ops.clone(), 4, 16, 0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let sched = sched.clone();
                thread::spawn(move || {
                    let entity = sched.create_entity(Priority::Normal, None).unwrap();
                    let jobs: Vec<Job> = (0..50).map(|_| submit(&entity, 3)).collect();
                    (entity, jobs)
                })
            })
            .collect();

        let dispatcher = {
            let sched = sched.clone();
            let ops = ops.clone();
            thread::spawn(move || {
                let mut done = 0;
                while done < 200 {
                    sched.run(Duration::ZERO);
                    assert!(sched.credits_in_flight() <= 16);
                    let ran: Vec<JobId> = ops.ran.lock().unwrap().drain(..).collect();
                    for id in ran {
                        sched.job_done(id).unwrap();
                        done += 1;
                    }
                    thread::yield_now();
                }
            })
        };

        let submitted: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        dispatcher.join().unwrap();

        assert_eq!(sched.stats().completed, 200);
        assert_eq!(sched.credits_in_flight(), 0);
        assert_eq!(sched.reserved_credits(), 0);
        drop(submitted);
    }
}
