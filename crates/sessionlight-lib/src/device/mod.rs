//! Indicator devices: adapter trait + per-family backends.
//!
//! Every family implements [`DeviceAdapter`]. Adapters never raise on a
//! transient failure: `apply` retries internally and reports `false` once the
//! attempts are exhausted. Discovery results are cached on the adapter and
//! dropped after a write failure so the next call re-probes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::led::{RenderOptions, Rgb};

pub mod blink1;
pub mod blinkstick;
pub mod retry;
pub mod serial;

pub use blink1::Blink1Adapter;
pub use blinkstick::BlinkStickAdapter;
pub use retry::RetryPolicy;
pub use serial::SerialAdapter;

// ── Error type ──

/// Device communication errors.
///
/// String payloads follow the convention **"context: details"**, e.g.
/// `"USB open: permission denied"`.
#[derive(Debug)]
pub enum DeviceError {
    NotFound,
    OpenFailed(String),
    WriteFailed(String),
    CommandFailed(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotFound => write!(f, "Indicator device not found"),
            DeviceError::OpenFailed(e) => write!(f, "Failed to open device: {e}"),
            DeviceError::WriteFailed(e) => write!(f, "Device write failed: {e}"),
            DeviceError::CommandFailed(e) => write!(f, "Device command failed: {e}"),
        }
    }
}

impl std::error::Error for DeviceError {}

impl DeviceError {
    /// `NotFound` ends a retry loop immediately.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DeviceError::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;

// ── Families ──

/// Closed set of supported device families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    BlinkStick,
    Serial,
    Blink1,
}

impl AdapterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterKind::BlinkStick => "blinkstick",
            AdapterKind::Serial => "serial",
            AdapterKind::Blink1 => "blink1",
        }
    }

    /// Retry policy used when the device config does not set one.
    pub fn default_retry(self) -> RetryPolicy {
        match self {
            AdapterKind::BlinkStick => RetryPolicy::default(),
            AdapterKind::Serial => RetryPolicy::new(3, std::time::Duration::from_millis(100)),
            AdapterKind::Blink1 => RetryPolicy::once(),
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Adapter trait ──

/// One physical indicator.
///
/// Implementations must be `Send`: the registry applies to every adapter on
/// its own scoped thread.
pub trait DeviceAdapter: Send {
    /// Configured device name, used in logs and outcomes.
    fn name(&self) -> &str;

    fn kind(&self) -> AdapterKind;

    /// Whether the device is currently reachable. May populate the
    /// discovery cache.
    fn probe(&mut self) -> bool;

    /// Show `color`. Retries transient failures; `false` once exhausted.
    fn apply(&mut self, color: Rgb, render: &RenderOptions) -> bool;

    /// Turn the indicator off.
    fn clear(&mut self) -> bool {
        self.apply(Rgb::OFF, &RenderOptions::default())
    }

    /// Drop any cached handle. Idempotent.
    fn release(&mut self) {}
}

/// In-memory adapter for unit and integration tests.
///
/// Always compiled, hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Shared, inspectable record of what a [`MockAdapter`] was asked to do.
    #[derive(Debug, Default)]
    pub struct MockLog {
        pub applied: Vec<(Rgb, RenderOptions)>,
        pub probes: usize,
        pub releases: usize,
    }

    /// Recording adapter. Clone the [`MockAdapter::log`] handle before boxing
    /// the adapter to inspect calls afterwards.
    pub struct MockAdapter {
        name: String,
        pub present: bool,
        /// If true, `apply` reports failure (but is still recorded).
        pub fail_apply: bool,
        /// Time `apply` takes, standing in for a slow device.
        pub apply_delay: std::time::Duration,
        log: Arc<Mutex<MockLog>>,
    }

    impl MockAdapter {
        pub fn new(name: &str) -> Self {
            MockAdapter {
                name: name.to_string(),
                present: true,
                fail_apply: false,
                apply_delay: std::time::Duration::ZERO,
                log: Arc::new(Mutex::new(MockLog::default())),
            }
        }

        pub fn absent(name: &str) -> Self {
            MockAdapter {
                present: false,
                ..Self::new(name)
            }
        }

        pub fn failing(name: &str) -> Self {
            MockAdapter {
                fail_apply: true,
                ..Self::new(name)
            }
        }

        pub fn log(&self) -> Arc<Mutex<MockLog>> {
            Arc::clone(&self.log)
        }
    }

    impl DeviceAdapter for MockAdapter {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> AdapterKind {
            AdapterKind::Serial
        }

        fn probe(&mut self) -> bool {
            if let Ok(mut log) = self.log.lock() {
                log.probes += 1;
            }
            self.present
        }

        fn apply(&mut self, color: Rgb, render: &RenderOptions) -> bool {
            std::thread::sleep(self.apply_delay);
            if let Ok(mut log) = self.log.lock() {
                log.applied.push((color, *render));
            }
            self.present && !self.fail_apply
        }

        fn release(&mut self) {
            if let Ok(mut log) = self.log.lock() {
                log.releases += 1;
            }
        }
    }
}
