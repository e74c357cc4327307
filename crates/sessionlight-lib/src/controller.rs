//! One invocation's pipeline: lock → registry → arbiter → devices → dim.
//!
//! The controller is decoupled from process concerns (argv, logging sinks,
//! spawning) so the whole flow runs in tests against an [`InProcessLock`],
//! mock adapters and a recording scheduler.
//!
//! [`InProcessLock`]: crate::lock::InProcessLock

use std::time::Duration;

use crate::arbiter::effective_mode;
use crate::config::Config;
use crate::dim::DimScheduler;
use crate::lock::{FileLock, LockGuard, SessionLock};
use crate::mode::ModeTag;
use crate::registry::{ApplyOutcome, DeviceRegistry};
use crate::state::{SessionRegistry, SessionStore, now_millis};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The report was recorded and the effective mode pushed to the devices.
    Reported {
        effective: ModeTag,
        devices: ApplyOutcome,
        dim_scheduled: bool,
    },
    /// The lock could not be taken in time; the report was dropped.
    LockTimeout,
    /// The tag cannot be a session's own mode.
    NotReportable(ModeTag),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimOutcome {
    Applied { mode: ModeTag, devices: ApplyOutcome },
    /// State moved on since the dim was scheduled.
    Skipped { current: ModeTag },
    LockTimeout,
    /// The tag is not a dim variant.
    NotDim(ModeTag),
}

pub struct Controller {
    store: SessionStore,
    lock: Box<dyn SessionLock>,
    devices: DeviceRegistry,
    scheduler: Option<Box<dyn DimScheduler>>,
    lock_timeout: Duration,
    dim_delay: Duration,
}

impl Controller {
    pub fn new(store: SessionStore, lock: Box<dyn SessionLock>, devices: DeviceRegistry) -> Self {
        let timing = crate::config::Timing::default();
        Controller {
            store,
            lock,
            devices,
            scheduler: None,
            lock_timeout: timing.lock_timeout(),
            dim_delay: timing.dim_delay(),
        }
    }

    /// Build from a validated config. `scheduler` is ignored when dimming is
    /// disabled.
    pub fn from_config(
        config: &Config,
        scheduler: Option<Box<dyn DimScheduler>>,
    ) -> crate::error::Result<Self> {
        let timing = &config.timing;
        let store = SessionStore::new(config.state_path(), timing.stale_timeout());
        let lock = FileLock::new(config.lock_path(), timing.lock_stale());
        let devices = DeviceRegistry::from_config(config)?;
        let mut controller = Controller::new(store, Box::new(lock), devices)
            .with_lock_timeout(timing.lock_timeout());
        if timing.dim_enabled
            && let Some(scheduler) = scheduler
        {
            controller = controller.with_dim(scheduler, timing.dim_delay());
        }
        Ok(controller)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_dim(mut self, scheduler: Box<dyn DimScheduler>, delay: Duration) -> Self {
        self.scheduler = Some(scheduler);
        self.dim_delay = delay;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Record `mode` for `session_id` and update the indicators.
    pub fn report(&mut self, session_id: &str, mode: ModeTag) -> ReportOutcome {
        self.report_at(session_id, mode, now_millis())
    }

    pub fn report_at(&mut self, session_id: &str, mode: ModeTag, now_ms: u64) -> ReportOutcome {
        if !mode.is_reportable() {
            log::warn!("{mode} cannot be reported by a session");
            return ReportOutcome::NotReportable(mode);
        }

        let Some(guard) = LockGuard::acquire(self.lock.as_ref(), self.lock_timeout) else {
            log::warn!("could not acquire lock for {mode} (session {session_id})");
            return ReportOutcome::LockTimeout;
        };
        log::debug!("lock acquired for {mode}");

        let registry = self.store.upsert_and_sweep(session_id, mode, now_ms);
        let effective = effective_mode(&registry, Some(mode));
        log::info!(
            "effective mode: {effective} (session {session_id}: {mode}, {} live)",
            registry.len()
        );
        let devices = self.devices.apply_mode(effective);
        drop(guard);

        let dim_scheduled = devices.is_success() && self.schedule_dim(effective);
        ReportOutcome::Reported {
            effective,
            devices,
            dim_scheduled,
        }
    }

    fn schedule_dim(&self, effective: ModeTag) -> bool {
        let (Some(dim), Some(scheduler)) = (effective.dim_variant(), &self.scheduler) else {
            return false;
        };
        match scheduler.schedule(dim, self.dim_delay) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("could not schedule {dim}: {e}");
                false
            }
        }
    }

    /// Wait `delay`, then apply `requested` if the state is still settled in
    /// the same family.
    pub fn dim_check(&mut self, requested: ModeTag, delay: Duration) -> DimOutcome {
        if !delay.is_zero() {
            log::debug!("waiting {}ms before {requested}", delay.as_millis());
            std::thread::sleep(delay);
        }
        self.dim_check_at(requested, now_millis())
    }

    /// There is no reporter here, so live `working` sessions read as `split`:
    /// a pending `dim-split` still applies after its ready session resumed.
    pub fn dim_check_at(&mut self, requested: ModeTag, now_ms: u64) -> DimOutcome {
        if !requested.is_dim() {
            log::warn!("{requested} is not a dim mode");
            return DimOutcome::NotDim(requested);
        }

        let Some(_guard) = LockGuard::acquire(self.lock.as_ref(), self.lock_timeout) else {
            log::warn!("could not acquire lock for {requested}");
            return DimOutcome::LockTimeout;
        };

        let registry = self.store.read_swept(now_ms);
        let current = effective_mode(&registry, None);
        if current.dim_variant() != Some(requested) {
            log::info!("dim skipped, current mode is {current}");
            return DimOutcome::Skipped { current };
        }
        let devices = self.devices.apply_mode(requested);
        log::info!("dim complete ({requested})");
        DimOutcome::Applied {
            mode: requested,
            devices,
        }
    }

    /// Show `mode` on every device under the lock, leaving session state
    /// alone. `None` if the lock could not be taken.
    pub fn show(&mut self, mode: ModeTag) -> Option<ApplyOutcome> {
        let _guard = LockGuard::acquire(self.lock.as_ref(), self.lock_timeout)?;
        Some(self.devices.apply_mode(mode))
    }

    /// Turn every device off under the lock.
    pub fn clear(&mut self) -> Option<ApplyOutcome> {
        let _guard = LockGuard::acquire(self.lock.as_ref(), self.lock_timeout)?;
        Some(self.devices.clear_all())
    }

    /// Swept registry and its effective mode, read under the lock.
    pub fn snapshot(&self) -> Option<(SessionRegistry, ModeTag)> {
        self.snapshot_at(now_millis())
    }

    pub fn snapshot_at(&self, now_ms: u64) -> Option<(SessionRegistry, ModeTag)> {
        let _guard = LockGuard::acquire(self.lock.as_ref(), self.lock_timeout)?;
        let registry = self.store.read_swept(now_ms);
        let effective = effective_mode(&registry, None);
        Some((registry, effective))
    }
}
