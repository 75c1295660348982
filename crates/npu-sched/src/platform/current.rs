//! Structured platform revision: scheduler creation takes an argument
//! record, and job initialization records the submitting client.

use alloc::string::String;
use alloc::sync::Arc;
use core::sync::atomic::AtomicU32;
use core::time::Duration;

use npu_core::Result;

use super::{CoreParams, GpuScheduler, SchedCore};
use crate::config::SchedulerOps;
use crate::device::Device;
use crate::entity::Entity;
use crate::job::{Job, OwnerTag};

/// Scheduler creation arguments
#[derive(Clone)]
pub struct SchedInitArgs {
    /// Driver operation table
    pub ops: Arc<dyn SchedulerOps>,
    /// Run queue count
    pub num_rqs: u32,
    /// Credit limit
    pub credit_limit: u32,
    /// Timeouts tolerated before an entity is marked guilty
    pub hang_limit: u32,
    /// Job timeout; zero disables it
    pub timeout: Duration,
    /// Load score shared with other schedulers, or a private one if `None`
    pub score: Option<Arc<AtomicU32>>,
    /// Scheduler name
    pub name: String,
    /// Owning device
    pub dev: Arc<Device>,
}

/// Create a scheduler from `args`
pub fn sched_init(args: &SchedInitArgs) -> Result<GpuScheduler> {
    SchedCore::create(CoreParams {
        ops: args.ops.clone(),
        num_rqs: args.num_rqs,
        credit_limit: args.credit_limit,
        hang_limit: args.hang_limit,
        timeout: args.timeout,
        score: args.score.clone(),
        name: args.name.clone(),
        dev: args.dev.clone(),
    })
}

/// Admit `job` on `entity`, recording `client_id` if given
pub fn job_init(
    job: &mut Job,
    entity: &Entity,
    credits: u32,
    owner: OwnerTag,
    client_id: Option<u64>,
) -> Result<()> {
    entity.core().admit(job, entity.state(), credits, owner, client_id)
}
