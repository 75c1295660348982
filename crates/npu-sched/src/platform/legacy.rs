//! Positional platform revision: every scheduler parameter is an argument,
//! and jobs carry no client id.

use alloc::sync::Arc;
use core::sync::atomic::AtomicU32;
use core::time::Duration;

use npu_core::Result;

use super::{CoreParams, GpuScheduler, SchedCore};
use crate::config::SchedulerOps;
use crate::device::Device;
use crate::entity::Entity;
use crate::job::{Job, OwnerTag};

/// Create a scheduler
#[allow(clippy::too_many_arguments)]
pub fn sched_init(
    ops: Arc<dyn SchedulerOps>,
    num_rqs: u32,
    credit_limit: u32,
    hang_limit: u32,
    timeout: Duration,
    score: Option<Arc<AtomicU32>>,
    name: &str,
    dev: Arc<Device>,
) -> Result<GpuScheduler> {
    SchedCore::create(CoreParams {
        ops,
        num_rqs,
        credit_limit,
        hang_limit,
        timeout,
        score,
        name: name.into(),
        dev,
    })
}

/// Admit `job` on `entity`
pub fn job_init(job: &mut Job, entity: &Entity, credits: u32, owner: OwnerTag) -> Result<()> {
    entity.core().admit(job, entity.state(), credits, owner, None)
}
