//! # Device Registry
//!
//! Schedulers register under their name on the owning device. Names are
//! unique per device; a scheduler leaves the registry when dropped.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::time::Duration;

use spin::Mutex;

use npu_core::{Error, Result};

use crate::platform::SchedCore;

/// Point-in-time view of a registered scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerInfo {
    /// Scheduler name
    pub name: String,
    /// Run queue count
    pub num_rqs: u32,
    /// Credit limit
    pub credit_limit: u32,
    /// Hang limit
    pub hang_limit: u32,
    /// Job timeout
    pub timeout: Duration,
    /// Credits currently on the hardware
    pub credits_in_flight: u32,
    /// Credits admitted and not yet retired
    pub reserved_credits: u64,
    /// Whether the scheduler is dispatching
    pub ready: bool,
}

/// Device owning one or more schedulers
#[derive(Debug)]
pub struct Device {
    name: String,
    schedulers: Mutex<BTreeMap<String, Weak<SchedCore>>>,
}

impl Device {
    /// Create a device
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            schedulers: Mutex::new(BTreeMap::new()),
        })
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of live schedulers, sorted
    pub fn scheduler_names(&self) -> Vec<String> {
        self.schedulers
            .lock()
            .iter()
            .filter(|(_, core)| core.strong_count() > 0)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Snapshot of the named scheduler
    pub fn scheduler_info(&self, name: &str) -> Option<SchedulerInfo> {
        let core = self.schedulers.lock().get(name)?.upgrade()?;
        Some(core.info())
    }

    pub(crate) fn register(&self, core: &Arc<SchedCore>) -> Result<()> {
        let mut schedulers = self.schedulers.lock();
        if let Some(existing) = schedulers.get(core.name()) {
            if existing.strong_count() > 0 {
                log::warn!("{}: scheduler {} already registered", self.name, core.name());
                return Err(Error::AlreadyExists);
            }
        }
        schedulers.insert(core.name().to_string(), Arc::downgrade(core));
        Ok(())
    }

    pub(crate) fn unregister(&self, core: &SchedCore) {
        let mut schedulers = self.schedulers.lock();
        let ours = schedulers
            .get(core.name())
            .is_some_and(|w| core::ptr::eq(w.as_ptr(), core));
        if ours {
            schedulers.remove(core.name());
        }
    }
}

static_assertions::assert_impl_all!(Device: Send, Sync);
