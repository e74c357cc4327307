//! The set of indicators lit by one invocation.
//!
//! Renderings are resolved from the config up front, so a mode can always be
//! applied once the registry exists. `apply_mode` probes and applies on every
//! adapter concurrently (one scoped thread each) and succeeds if at least one
//! device took the color. Adapters are released when the registry is dropped.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{Config, DeviceConfig};
use crate::device::{
    AdapterKind, Blink1Adapter, BlinkStickAdapter, DeviceAdapter, SerialAdapter,
};
use crate::led::Rendering;
use crate::mode::ModeTag;

/// Result of pushing one mode to every device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// At least one device shows the mode. Names of those that do.
    Applied(Vec<String>),
    /// No configured device was present.
    NoDeviceFound,
    /// Devices were present, but every apply failed.
    AllFailed(Vec<String>),
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ApplyOutcome::Applied(_))
    }
}

/// Probe result for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub name: String,
    pub adapter: AdapterKind,
    pub present: bool,
}

enum DeviceResult {
    Absent,
    Applied,
    Failed,
}

struct Registered {
    adapter: Box<dyn DeviceAdapter>,
    renderings: BTreeMap<ModeTag, Rendering>,
}

#[derive(Default)]
pub struct DeviceRegistry {
    devices: Vec<Registered>,
}

/// Construct the adapter for a configured device.
pub fn build_adapter(name: &str, config: &DeviceConfig) -> Box<dyn DeviceAdapter> {
    let retry = config.retry_policy();
    match config.adapter {
        AdapterKind::BlinkStick => {
            Box::new(BlinkStickAdapter::new(name, config.total_leds, retry))
        }
        AdapterKind::Serial => Box::new(SerialAdapter::new(
            name,
            config.port_pattern.as_deref(),
            config.dev_dir.as_deref(),
            retry,
        )),
        AdapterKind::Blink1 => Box::new(Blink1Adapter::new(name, config.tool.as_deref(), retry)),
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One adapter per enabled device, with every rendering resolved.
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        let mut registry = Self::new();
        for (name, device) in config.enabled_devices() {
            let mut renderings = BTreeMap::new();
            for mode in ModeTag::ALL {
                renderings.insert(mode, config.rendering(name, mode)?);
            }
            registry.add(build_adapter(name, device), renderings);
        }
        Ok(registry)
    }

    pub fn add(&mut self, adapter: Box<dyn DeviceAdapter>, renderings: BTreeMap<ModeTag, Rendering>) {
        self.devices.push(Registered {
            adapter,
            renderings,
        });
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.devices
            .iter()
            .map(|d| d.adapter.name().to_string())
            .collect()
    }

    /// Probe every device.
    pub fn detect(&mut self) -> Vec<DeviceStatus> {
        self.devices
            .iter_mut()
            .map(|d| DeviceStatus {
                name: d.adapter.name().to_string(),
                adapter: d.adapter.kind(),
                present: d.adapter.probe(),
            })
            .collect()
    }

    /// Show `mode` on every present device.
    pub fn apply_mode(&mut self, mode: ModeTag) -> ApplyOutcome {
        self.fan_out(|device| match device.renderings.get(&mode) {
            Some(r) => {
                let ok = device.adapter.apply(r.color, &r.options);
                if ok {
                    log::info!("{}: set {mode} ({})", device.adapter.name(), r.color);
                }
                ok
            }
            None => {
                log::warn!("{}: no rendering for {mode}", device.adapter.name());
                false
            }
        })
    }

    /// Turn every present device off.
    pub fn clear_all(&mut self) -> ApplyOutcome {
        self.fan_out(|device| {
            let ok = device.adapter.clear();
            if ok {
                log::info!("{}: cleared", device.adapter.name());
            }
            ok
        })
    }

    fn fan_out<F>(&mut self, op: F) -> ApplyOutcome
    where
        F: Fn(&mut Registered) -> bool + Sync,
    {
        let op = &op;
        let results: Vec<(String, DeviceResult)> = std::thread::scope(|s| {
            let handles: Vec<_> = self
                .devices
                .iter_mut()
                .map(|device| {
                    let name = device.adapter.name().to_string();
                    let handle = s.spawn(move || {
                        if !device.adapter.probe() {
                            log::debug!("{}: not present", device.adapter.name());
                            return DeviceResult::Absent;
                        }
                        if op(device) {
                            DeviceResult::Applied
                        } else {
                            DeviceResult::Failed
                        }
                    });
                    (name, handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(name, h)| {
                    let result = h.join().unwrap_or_else(|_| {
                        log::error!("{name}: apply thread panicked");
                        DeviceResult::Failed
                    });
                    (name, result)
                })
                .collect()
        });

        let mut applied = Vec::new();
        let mut failed = Vec::new();
        for (name, result) in results {
            match result {
                DeviceResult::Applied => applied.push(name),
                DeviceResult::Failed => failed.push(name),
                DeviceResult::Absent => {}
            }
        }
        if !applied.is_empty() {
            ApplyOutcome::Applied(applied)
        } else if !failed.is_empty() {
            log::warn!("every present device failed: {}", failed.join(", "));
            ApplyOutcome::AllFailed(failed)
        } else {
            log::info!("no LED devices found");
            ApplyOutcome::NoDeviceFound
        }
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        for device in &mut self.devices {
            device.adapter.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockAdapter;
    use crate::led::{RenderOptions, Rgb};
    use std::time::{Duration, Instant};

    /// Renderings where each mode's red channel is its index, for easy checks.
    fn palette() -> BTreeMap<ModeTag, Rendering> {
        ModeTag::ALL
            .into_iter()
            .enumerate()
            .map(|(i, mode)| {
                (
                    mode,
                    Rendering {
                        color: Rgb::new(i as u8 + 1, 0, 0),
                        options: RenderOptions {
                            led_count: Some(i as u8),
                        },
                    },
                )
            })
            .collect()
    }

    #[test]
    fn applies_rendering_to_every_present_device() {
        let a = MockAdapter::new("a");
        let b = MockAdapter::new("b");
        let (log_a, log_b) = (a.log(), b.log());
        let mut reg = DeviceRegistry::new();
        reg.add(Box::new(a), palette());
        reg.add(Box::new(b), palette());

        let outcome = reg.apply_mode(ModeTag::Question);
        assert_eq!(outcome, ApplyOutcome::Applied(vec!["a".into(), "b".into()]));
        assert!(outcome.is_success());

        let expected = palette()[&ModeTag::Question];
        for log in [log_a, log_b] {
            let log = log.lock().unwrap();
            assert_eq!(log.applied, vec![(expected.color, expected.options)]);
        }
    }

    #[test]
    fn absent_devices_are_skipped() {
        let here = MockAdapter::new("here");
        let gone = MockAdapter::absent("gone");
        let gone_log = gone.log();
        let mut reg = DeviceRegistry::new();
        reg.add(Box::new(here), palette());
        reg.add(Box::new(gone), palette());

        assert_eq!(
            reg.apply_mode(ModeTag::Ready),
            ApplyOutcome::Applied(vec!["here".into()])
        );
        assert!(gone_log.lock().unwrap().applied.is_empty());
    }

    #[test]
    fn no_present_device_is_no_device_found() {
        let mut reg = DeviceRegistry::new();
        reg.add(Box::new(MockAdapter::absent("x")), palette());
        let outcome = reg.apply_mode(ModeTag::Ready);
        assert_eq!(outcome, ApplyOutcome::NoDeviceFound);
        assert!(!outcome.is_success());
    }

    #[test]
    fn empty_registry_is_no_device_found() {
        assert_eq!(
            DeviceRegistry::new().apply_mode(ModeTag::Working),
            ApplyOutcome::NoDeviceFound
        );
    }

    #[test]
    fn all_failures_reported() {
        let mut reg = DeviceRegistry::new();
        reg.add(Box::new(MockAdapter::failing("f1")), palette());
        reg.add(Box::new(MockAdapter::failing("f2")), palette());
        reg.add(Box::new(MockAdapter::absent("gone")), palette());
        assert_eq!(
            reg.apply_mode(ModeTag::Split),
            ApplyOutcome::AllFailed(vec!["f1".into(), "f2".into()])
        );
    }

    #[test]
    fn one_success_is_enough() {
        let mut reg = DeviceRegistry::new();
        reg.add(Box::new(MockAdapter::failing("bad")), palette());
        reg.add(Box::new(MockAdapter::new("good")), palette());
        assert_eq!(
            reg.apply_mode(ModeTag::Working),
            ApplyOutcome::Applied(vec!["good".into()])
        );
    }

    #[test]
    fn slow_devices_are_driven_concurrently() {
        let mut reg = DeviceRegistry::new();
        for name in ["slow1", "slow2"] {
            let mut dev = MockAdapter::new(name);
            dev.apply_delay = Duration::from_millis(200);
            reg.add(Box::new(dev), palette());
        }

        let started = Instant::now();
        let outcome = reg.apply_mode(ModeTag::Ready);
        let elapsed = started.elapsed();

        assert_eq!(
            outcome,
            ApplyOutcome::Applied(vec!["slow1".into(), "slow2".into()])
        );
        assert!(
            elapsed < Duration::from_millis(350),
            "two 200ms devices took {elapsed:?}"
        );
    }

    #[test]
    fn clear_all_applies_off() {
        let dev = MockAdapter::new("d");
        let log = dev.log();
        let mut reg = DeviceRegistry::new();
        reg.add(Box::new(dev), palette());
        assert!(reg.clear_all().is_success());
        assert!(log.lock().unwrap().applied[0].0.is_off());
    }

    #[test]
    fn detect_reports_presence() {
        let mut reg = DeviceRegistry::new();
        reg.add(Box::new(MockAdapter::new("on")), palette());
        reg.add(Box::new(MockAdapter::absent("off")), palette());
        let status = reg.detect();
        assert_eq!(status.len(), 2);
        assert!(status[0].present);
        assert!(!status[1].present);
        assert_eq!(status[1].name, "off");
    }

    #[test]
    fn drop_releases_every_adapter() {
        let a = MockAdapter::new("a");
        let b = MockAdapter::absent("b");
        let (log_a, log_b) = (a.log(), b.log());
        {
            let mut reg = DeviceRegistry::new();
            reg.add(Box::new(a), palette());
            reg.add(Box::new(b), palette());
            reg.apply_mode(ModeTag::Ready);
        }
        assert_eq!(log_a.lock().unwrap().releases, 1);
        assert_eq!(log_b.lock().unwrap().releases, 1);
    }

    #[test]
    fn from_config_builds_enabled_devices_only() {
        let mut config = Config::example();
        // example(): blinkstick + statusb enabled, blink1 disabled
        let reg = DeviceRegistry::from_config(&config).unwrap();
        assert_eq!(reg.names(), vec!["blinkstick".to_string(), "statusb".to_string()]);

        config.devices.get_mut("blink1").unwrap().enabled = true;
        let reg = DeviceRegistry::from_config(&config).unwrap();
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn from_config_fails_on_missing_rendering() {
        let mut config = Config::example();
        config.modes.remove("dim-split");
        assert!(matches!(
            DeviceRegistry::from_config(&config),
            Err(crate::SessionlightError::Config(_))
        ));
    }

    #[test]
    fn from_config_serial_device_writes_port() {
        let dir = tempfile::tempdir().unwrap();
        let port = dir.path().join("ttyFAKE0");
        std::fs::write(&port, "").unwrap();

        let mut config = Config::default();
        config.devices.insert(
            "stat".into(),
            DeviceConfig {
                port_pattern: Some("ttyFAKE".into()),
                dev_dir: Some(dir.path().to_path_buf()),
                ..DeviceConfig::new(AdapterKind::Serial)
            },
        );
        for mode in ModeTag::ALL {
            let mut table = BTreeMap::new();
            table.insert("stat".to_string(), crate::config::ModeRendering::new("#0000FF"));
            config.modes.insert(mode.to_string(), table);
        }

        let mut reg = DeviceRegistry::from_config(&config).unwrap();
        assert!(reg.apply_mode(ModeTag::Ready).is_success());
        assert_eq!(std::fs::read_to_string(&port).unwrap(), "#0000FF\n");
    }
}
