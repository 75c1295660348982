//! # Scheduler Adapters
//!
//! Driver-facing scheduler creation and job submission. The contract is the
//! same whichever platform revision backs it; inputs a revision cannot
//! express are dropped, never rejected.

use npu_core::{AdmissionError, Error, InitError};

use crate::config::{SchedStat, SchedulerConfig};
use crate::entity::Entity;
use crate::job::{Job, OwnerTag};
use crate::platform::GpuScheduler;
use crate::revision::{ActiveRevision, Revision, RevisionCaps};

/// "Hardware was reset" status for timeout handlers in this build
///
/// Resolves to [`SchedStat::None`] on revisions without a reset status.
pub const SCHED_STAT_RESET: SchedStat = <ActiveRevision as Revision>::STAT_RESET;

/// Create a scheduler on the active platform revision
pub fn init_scheduler(config: &SchedulerConfig) -> Result<GpuScheduler, InitError> {
    init_scheduler_on::<ActiveRevision>(config)
}

/// Create a scheduler on revision `R`
pub fn init_scheduler_on<R: Revision>(config: &SchedulerConfig) -> Result<GpuScheduler, InitError> {
    let sched = R::sched_init(config).map_err(|e| {
        log::warn!("{}: scheduler init failed on {} revision: {}", config.name, R::NAME, e);
        InitError(e)
    })?;

    log::debug!("{}: backed by {} revision", config.name, R::NAME);
    Ok(sched)
}

/// Admit `job` on `entity` through the active platform revision
///
/// `job` is left untouched on failure.
pub fn submit_job(
    job: &mut Job,
    entity: &Entity,
    credits: u32,
    owner: OwnerTag,
    client_id: Option<u64>,
) -> Result<(), AdmissionError> {
    submit_job_on::<ActiveRevision>(job, entity, credits, owner, client_id)
}

/// Admit `job` on `entity` through revision `R`
pub fn submit_job_on<R: Revision>(
    job: &mut Job,
    entity: &Entity,
    credits: u32,
    owner: OwnerTag,
    client_id: Option<u64>,
) -> Result<(), AdmissionError> {
    if client_id.is_some() && !R::CAPS.contains(RevisionCaps::CLIENT_ID) {
        log::trace!("{}: client id not recorded on {} revision", entity.scheduler_name(), R::NAME);
    }

    R::job_init(job, entity, credits, owner, client_id).map_err(|e| match e {
        Error::CreditLimitExceeded => AdmissionError::CreditsExceeded {
            credits,
            limit: entity.credit_limit(),
        },
        other => AdmissionError::Platform(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use core::time::Duration;

    use crate::config::{Priority, DEFAULT_CREDIT_LIMIT, DEFAULT_TIMEOUT};
    use crate::device::Device;
    use crate::job::JobState;
    use crate::platform::tests::NullOps;
    use crate::revision::{Positional, Structured};

    fn config(name: &str, dev: &Arc<Device>) -> SchedulerConfig {
        SchedulerConfig::new(name, Arc::new(NullOps::default()), dev.clone())
    }

    #[test]
    fn test_both_revisions_build_identical_schedulers() {
        let dev = Device::new("npu");
        let a = init_scheduler_on::<Structured>(&config("npu-s", &dev)).unwrap();
        let b = init_scheduler_on::<Positional>(&config("npu-p", &dev)).unwrap();

        for sched in [&a, &b] {
            assert_eq!(sched.num_rqs(), 4);
            assert_eq!(sched.credit_limit(), DEFAULT_CREDIT_LIMIT);
            assert_eq!(sched.timeout(), DEFAULT_TIMEOUT);
            assert_eq!(sched.hang_limit(), 0);
        }
        assert_eq!(dev.scheduler_names(), ["npu-p", "npu-s"]);

        let info = dev.scheduler_info("npu-p").unwrap();
        assert_eq!(info.credit_limit, 64);
        assert_eq!(info.timeout, Duration::from_millis(5000));
        assert!(info.ready);
    }

    #[test]
    fn test_both_revisions_identical_non_default() {
        let dev = Device::new("npu");
        let tuned = |name| {
            config(name, &dev)
                .with_run_queues(2)
                .with_credit_limit(8)
                .with_timeout(Duration::ZERO)
        };
        let a = init_scheduler_on::<Structured>(&tuned("npu-s")).unwrap();
        let b = init_scheduler_on::<Positional>(&tuned("npu-p")).unwrap();

        for sched in [&a, &b] {
            assert_eq!(sched.num_rqs(), 2);
            assert_eq!(sched.credit_limit(), 8);
            assert!(sched.timeout().is_zero());
            assert_eq!(sched.hang_limit(), 0);
        }
        let (s, p) = (dev.scheduler_info("npu-s").unwrap(), dev.scheduler_info("npu-p").unwrap());
        assert_eq!((s.num_rqs, s.credit_limit, s.timeout), (p.num_rqs, p.credit_limit, p.timeout));
    }

    #[test]
    fn test_init_rejects_bad_config() {
        let dev = Device::new("npu");
        let err = init_scheduler(&config("npu0", &dev).with_credit_limit(0)).unwrap_err();
        assert_eq!(err, InitError(Error::InvalidParameter));

        let err = init_scheduler(&config("npu0", &dev).with_run_queues(9)).unwrap_err();
        assert_eq!(err.cause(), Error::InvalidParameter);
        assert!(dev.scheduler_names().is_empty());
    }

    #[test]
    fn test_init_rejects_duplicate_name() {
        let dev = Device::new("npu");
        let _first = init_scheduler(&config("npu0", &dev)).unwrap();
        let err = init_scheduler_on::<Positional>(&config("npu0", &dev)).unwrap_err();
        assert_eq!(err, InitError(Error::AlreadyExists));
    }

    #[test]
    fn test_submit_over_limit() {
        let dev = Device::new("npu");
        let sched = init_scheduler(&config("npu0", &dev)).unwrap();
        let entity = sched.create_entity(Priority::Normal, None).unwrap();

        for_each_revision(|submit| {
            let mut job = Job::new();
            let err = submit(&mut job, &entity, 100).unwrap_err();
            assert_eq!(err, AdmissionError::CreditsExceeded { credits: 100, limit: 64 });
            assert!(!job.is_initialized());
        });
        assert_eq!(entity.reserved_credits(), 0);
        assert_eq!(sched.reserved_credits(), 0);
        assert_eq!(sched.stats().submitted, 0);
    }

    #[test]
    fn test_submit_within_limit() {
        let dev = Device::new("npu");
        let sched = init_scheduler(&config("npu0", &dev)).unwrap();
        let entity = sched.create_entity(Priority::Normal, None).unwrap();

        let mut jobs = alloc::vec::Vec::new();
        for_each_revision(|submit| {
            let mut job = Job::new();
            submit(&mut job, &entity, 64).unwrap();
            assert_eq!(job.state(), JobState::Queued);
            assert_eq!(job.credits(), Some(64));
            jobs.push(job);

            let mut zero = Job::new();
            submit(&mut zero, &entity, 0).unwrap();
            jobs.push(zero);
        });
        assert_eq!(entity.reserved_credits(), 128);
        assert_eq!(entity.queued_jobs(), 4);
    }

    #[test]
    fn test_client_id_per_revision() {
        let dev = Device::new("npu");
        let sched = init_scheduler(&config("npu0", &dev)).unwrap();
        let entity = sched.create_entity(Priority::Normal, None).unwrap();

        let mut with_client = Job::new();
        submit_job_on::<Structured>(&mut with_client, &entity, 1, OwnerTag(7), Some(42)).unwrap();
        assert_eq!(with_client.client_id(), Some(42));
        assert_eq!(with_client.owner(), Some(OwnerTag(7)));

        let mut client_zero = Job::new();
        submit_job_on::<Structured>(&mut client_zero, &entity, 1, OwnerTag(7), Some(0)).unwrap();
        assert_eq!(client_zero.client_id(), Some(0));
        assert_eq!(client_zero.sched_job().unwrap().client_id(), Some(0));

        let mut no_client = Job::new();
        submit_job_on::<Structured>(&mut no_client, &entity, 1, OwnerTag(7), None).unwrap();
        assert_eq!(no_client.client_id(), None);

        let mut dropped = Job::new();
        submit_job_on::<Positional>(&mut dropped, &entity, 1, OwnerTag(7), Some(42)).unwrap();
        assert_eq!(dropped.client_id(), None);
        assert_eq!(dropped.owner(), Some(OwnerTag(7)));
    }

    #[test]
    fn test_submit_after_device_dropped_scheduler() {
        let dev = Device::new("npu");
        let sched = init_scheduler(&config("npu0", &dev)).unwrap();
        let entity = sched.create_entity(Priority::Normal, None).unwrap();
        let mut queued = Job::new();
        submit_job(&mut queued, &entity, 4, OwnerTag(0), None).unwrap();
        drop(sched);

        assert!(dev.scheduler_info("npu0").is_none());
        assert_eq!(queued.state(), JobState::Cancelled);
        assert_eq!(entity.reserved_credits(), 0);

        for_each_revision(|submit| {
            let mut job = Job::new();
            let err = submit(&mut job, &entity, 1).unwrap_err();
            assert_eq!(err, AdmissionError::Platform(Error::InvalidState));
            assert!(!job.is_initialized());
        });
        assert_eq!(entity.queued_jobs(), 0);
    }

    fn for_each_revision(mut f: impl FnMut(&dyn Fn(&mut Job, &Entity, u32) -> Result<(), AdmissionError>)) {
        f(&|job, entity, credits| submit_job_on::<Structured>(job, entity, credits, OwnerTag(1), Some(3)));
        f(&|job, entity, credits| submit_job_on::<Positional>(job, entity, credits, OwnerTag(1), Some(3)));
    }
}
