//! # Platform Revisions
//!
//! Each revision is a zero-sized marker implementing [`Revision`], which
//! maps the revision-independent inputs onto that revision's entry points.
//! [`ActiveRevision`] is the one selected for this build.

use bitflags::bitflags;
use cfg_if::cfg_if;

use npu_core::Result;

use crate::config::{SchedStat, SchedulerConfig};
use crate::entity::Entity;
use crate::job::{Job, OwnerTag};
use crate::platform::{current, legacy, GpuScheduler};

/// Hang limit passed to the platform on scheduler creation
pub const HANG_LIMIT_DEFAULT: u32 = 0;

bitflags! {
    /// What a platform revision supports
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RevisionCaps: u32 {
        /// Scheduler creation takes an argument record
        const STRUCTURED_INIT = 1 << 0;
        /// Job initialization records a client id
        const CLIENT_ID       = 1 << 1;
        /// Timeout handlers can report a hardware reset
        const STAT_RESET      = 1 << 2;
    }
}

/// A platform revision
pub trait Revision {
    /// Revision name, for diagnostics
    const NAME: &'static str;
    /// Supported features
    const CAPS: RevisionCaps;
    /// Timeout status meaning "hardware was reset"
    const STAT_RESET: SchedStat;

    /// Create a scheduler from `config`
    fn sched_init(config: &SchedulerConfig) -> Result<GpuScheduler>;

    /// Admit `job` on `entity`
    fn job_init(
        job: &mut Job,
        entity: &Entity,
        credits: u32,
        owner: OwnerTag,
        client_id: Option<u64>,
    ) -> Result<()>;
}

/// Structured-argument revision
#[derive(Debug)]
pub enum Structured {}

impl Revision for Structured {
    const NAME: &'static str = "structured";
    const CAPS: RevisionCaps = RevisionCaps::STRUCTURED_INIT
        .union(RevisionCaps::CLIENT_ID)
        .union(RevisionCaps::STAT_RESET);
    const STAT_RESET: SchedStat = SchedStat::Reset;

    fn sched_init(config: &SchedulerConfig) -> Result<GpuScheduler> {
        let args = current::SchedInitArgs {
            ops: config.ops.clone(),
            num_rqs: config.num_rqs,
            credit_limit: config.credit_limit,
            hang_limit: HANG_LIMIT_DEFAULT,
            timeout: config.timeout,
            score: None,
            name: config.name.clone(),
            dev: config.dev.clone(),
        };
        current::sched_init(&args)
    }

    fn job_init(
        job: &mut Job,
        entity: &Entity,
        credits: u32,
        owner: OwnerTag,
        client_id: Option<u64>,
    ) -> Result<()> {
        current::job_init(job, entity, credits, owner, client_id)
    }
}

/// Positional-argument revision
#[derive(Debug)]
pub enum Positional {}

impl Revision for Positional {
    const NAME: &'static str = "positional";
    const CAPS: RevisionCaps = RevisionCaps::empty();
    // No reset status on this revision
    const STAT_RESET: SchedStat = SchedStat::None;

    fn sched_init(config: &SchedulerConfig) -> Result<GpuScheduler> {
        legacy::sched_init(
            config.ops.clone(),
            config.num_rqs,
            config.credit_limit,
            HANG_LIMIT_DEFAULT,
            config.timeout,
            None,
            &config.name,
            config.dev.clone(),
        )
    }

    fn job_init(
        job: &mut Job,
        entity: &Entity,
        credits: u32,
        owner: OwnerTag,
        _client_id: Option<u64>,
    ) -> Result<()> {
        legacy::job_init(job, entity, credits, owner)
    }
}

cfg_if! {
    if #[cfg(feature = "legacy-platform")] {
        /// Revision backing the adapters in this build
        pub type ActiveRevision = Positional;
    } else {
        /// Revision backing the adapters in this build
        pub type ActiveRevision = Structured;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps() {
        assert!(Structured::CAPS.contains(RevisionCaps::STRUCTURED_INIT | RevisionCaps::CLIENT_ID));
        assert!(Structured::CAPS.contains(RevisionCaps::STAT_RESET));
        assert!(Positional::CAPS.is_empty());
    }

    #[test]
    fn test_stat_reset_substitution() {
        assert_eq!(Structured::STAT_RESET, SchedStat::Reset);
        assert_eq!(Positional::STAT_RESET, SchedStat::None);
    }

    #[test]
    fn test_active_revision() {
        if cfg!(feature = "legacy-platform") {
            assert_eq!(ActiveRevision::NAME, Positional::NAME);
        } else {
            assert_eq!(ActiveRevision::NAME, Structured::NAME);
        }
    }
}
