//! Application configuration: TOML-based, platform-aware paths.
//!
//! ```toml
//! [timing]
//! dim_delay_ms = 5000
//!
//! [devices.strip]
//! adapter = "blinkstick"
//! total_leds = 8
//!
//! [modes.working.strip]
//! color = "#FF8000"
//! ```
//!
//! Every enabled device needs a rendering for every [`ModeTag`]; a config
//! that fails [`Config::validate`] is rejected before any session state is
//! touched.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::AdapterKind;
use crate::device::blinkstick::MAX_LEDS;
use crate::led::{RenderOptions, Rendering};
use crate::mode::ModeTag;

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str = "# sessionlight configuration.\n\
# Every enabled device needs a [modes.<mode>.<device>] entry for each of:\n\
# working, ready, question, split, dim-green, dim-split, dim-question.\n\n";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for the session registry, lock token and log.
    /// Default: `$XDG_RUNTIME_DIR/sessionlight` or `<tmp>/sessionlight`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    #[serde(default)]
    pub timing: Timing,

    /// Configured indicators, keyed by device name.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceConfig>,

    /// Renderings: mode tag → device name → rendering.
    #[serde(default)]
    pub modes: BTreeMap<String, BTreeMap<String, ModeRendering>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Sessions silent for longer than this are evicted.
    pub stale_timeout_ms: u64,
    /// How long an invocation waits for the lock before dropping its report.
    pub lock_timeout_ms: u64,
    /// A lock token older than this is reclaimed.
    pub lock_stale_ms: u64,
    pub dim_delay_ms: u64,
    pub dim_enabled: bool,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            stale_timeout_ms: 30_000,
            lock_timeout_ms: 2_000,
            lock_stale_ms: 3_000,
            dim_delay_ms: 5_000,
            dim_enabled: true,
        }
    }
}

impl Timing {
    pub fn stale_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_stale(&self) -> Duration {
        Duration::from_millis(self.lock_stale_ms)
    }

    pub fn dim_delay(&self) -> Duration {
        Duration::from_millis(self.dim_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub adapter: AdapterKind,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// LEDs on the strip (blinkstick). Default: 8.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_leds: Option<u8>,

    /// Attempts per apply, including the first. Default depends on the family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    /// Base backoff; attempt `n` waits `n * retry_delay_ms`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,

    /// Port name prefix (serial), e.g. `"ttyACM"` or `"cu.usbmodem*"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_pattern: Option<String>,

    /// Directory scanned for ports (serial). Default: `/dev`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_dir: Option<PathBuf>,

    /// CLI program (blink1). Default: `blink1-tool`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl DeviceConfig {
    pub fn new(adapter: AdapterKind) -> Self {
        DeviceConfig {
            adapter,
            enabled: true,
            total_leds: None,
            retries: None,
            retry_delay_ms: None,
            port_pattern: None,
            dev_dir: None,
            tool: None,
        }
    }

    pub fn retry_policy(&self) -> crate::device::RetryPolicy {
        let default = self.adapter.default_retry();
        crate::device::RetryPolicy::new(
            self.retries.unwrap_or(default.attempts),
            self.retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(default.base_delay),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeRendering {
    /// Hex (`#RRGGBB`) or a color name.
    pub color: String,
    /// LEDs to light on multi-LED devices. Default: all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub led_count: Option<u8>,
}

impl ModeRendering {
    pub fn new(color: &str) -> Self {
        ModeRendering {
            color: color.to_string(),
            led_count: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// No device is enabled.
    NoEnabledDevices,
    /// A `[modes.<tag>]` table uses a tag that is not a mode.
    UnknownMode(String),
    /// Two `[modes]` tables name the same mode in different case.
    DuplicateMode { tag: String, mode: ModeTag },
    /// A rendering refers to a device missing from `[devices]`.
    UnknownDevice { mode: String, device: String },
    /// An enabled device has no rendering for a mode.
    MissingRendering { device: String, mode: ModeTag },
    InvalidColor {
        device: String,
        mode: String,
        reason: String,
    },
    InvalidLedCount { device: String, reason: String },
    InvalidTiming(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NoEnabledDevices => write!(f, "No enabled devices configured"),
            ValidationError::UnknownMode(tag) => write!(f, "Unknown mode in [modes]: {tag}"),
            ValidationError::DuplicateMode { tag, mode } => {
                write!(f, "modes.{tag}: mode {mode} is already configured")
            }
            ValidationError::UnknownDevice { mode, device } => {
                write!(f, "modes.{mode}.{device}: no such device in [devices]")
            }
            ValidationError::MissingRendering { device, mode } => {
                write!(f, "Device {device} has no rendering for mode {mode}")
            }
            ValidationError::InvalidColor {
                device,
                mode,
                reason,
            } => write!(f, "modes.{mode}.{device}: {reason}"),
            ValidationError::InvalidLedCount { device, reason } => {
                write!(f, "Invalid LED count for {device}: {reason}")
            }
            ValidationError::InvalidTiming(e) => write!(f, "Invalid timing: {e}"),
        }
    }
}

/// Default directory for runtime state.
pub fn default_state_dir() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("sessionlight")
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("sessionlight"))
    }

    /// Full path to the default config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(default_state_dir)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join("state.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir().join("state.lock")
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir().join("sessionlight.log")
    }

    /// Load config from an explicit path. A missing or unparsable file is an
    /// error: there is nothing sensible to light without device definitions.
    pub fn load_from(path: &Path) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                crate::SessionlightError::Config(format!(
                    "config file not found: {} (create one with `sessionlight config --init`)",
                    path.display()
                ))
            } else {
                crate::SessionlightError::Config(format!("{}: {e}", path.display()))
            }
        })?;
        toml::from_str(&contents)
            .map_err(|e| crate::SessionlightError::Config(format!("{}: {e}", path.display())))
    }

    /// Load and validate. All validation problems are folded into one error.
    pub fn load_validated(path: &Path) -> crate::error::Result<Self> {
        let config = Self::load_from(path)?;
        config.validate().map_err(|errors| {
            let lines: Vec<String> = errors.iter().map(|e| format!("  - {e}")).collect();
            crate::SessionlightError::Config(format!(
                "{} is invalid:\n{}",
                path.display(),
                lines.join("\n")
            ))
        })?;
        Ok(config)
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    ///
    /// A header comment lists the modes every device must cover.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Names of enabled devices, sorted.
    pub fn enabled_devices(&self) -> impl Iterator<Item = (&str, &DeviceConfig)> {
        self.devices
            .iter()
            .filter(|(_, d)| d.enabled)
            .map(|(n, d)| (n.as_str(), d))
    }

    fn mode_table(&self, mode: ModeTag) -> Option<&BTreeMap<String, ModeRendering>> {
        self.modes
            .iter()
            .find(|(tag, _)| tag.parse::<ModeTag>().ok() == Some(mode))
            .map(|(_, table)| table)
    }

    /// Resolve the rendering of `mode` on `device`.
    pub fn rendering(&self, device: &str, mode: ModeTag) -> crate::error::Result<Rendering> {
        let entry = self
            .mode_table(mode)
            .and_then(|t| t.get(device))
            .ok_or_else(|| {
                crate::SessionlightError::Config(format!(
                    "device {device} has no rendering for mode {mode}"
                ))
            })?;
        Ok(Rendering {
            color: crate::led::parse_color(&entry.color)?,
            options: RenderOptions {
                led_count: entry.led_count,
            },
        })
    }

    /// Validate the entire config, collecting all errors.
    ///
    /// Returns `Ok(())` if valid, or `Err(Vec<ValidationError>)` with all problems found.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.timing.stale_timeout_ms == 0 {
            errors.push(ValidationError::InvalidTiming(
                "stale_timeout_ms must be positive".into(),
            ));
        }
        if self.timing.lock_stale_ms == 0 {
            errors.push(ValidationError::InvalidTiming(
                "lock_stale_ms must be positive".into(),
            ));
        }

        if self.enabled_devices().next().is_none() {
            errors.push(ValidationError::NoEnabledDevices);
        }

        for (name, device) in &self.devices {
            if let Some(total) = device.total_leds
                && (total == 0 || total > MAX_LEDS)
            {
                errors.push(ValidationError::InvalidLedCount {
                    device: name.clone(),
                    reason: format!("total_leds must be 1..={MAX_LEDS}, got {total}"),
                });
            }
        }

        let mut seen = BTreeSet::new();
        for (tag, table) in &self.modes {
            match tag.parse::<ModeTag>() {
                Ok(mode) if !seen.insert(mode) => {
                    errors.push(ValidationError::DuplicateMode {
                        tag: tag.clone(),
                        mode,
                    });
                }
                Ok(_) => {}
                Err(_) => errors.push(ValidationError::UnknownMode(tag.clone())),
            }
            for (device, rendering) in table {
                let Some(device_config) = self.devices.get(device) else {
                    errors.push(ValidationError::UnknownDevice {
                        mode: tag.clone(),
                        device: device.clone(),
                    });
                    continue;
                };
                if let Err(e) = crate::led::parse_color(&rendering.color) {
                    errors.push(ValidationError::InvalidColor {
                        device: device.clone(),
                        mode: tag.clone(),
                        reason: e.to_string(),
                    });
                }
                let total = device_config
                    .total_leds
                    .unwrap_or(crate::device::blinkstick::DEFAULT_TOTAL_LEDS);
                if let Some(count) = rendering.led_count
                    && count > total
                {
                    errors.push(ValidationError::InvalidLedCount {
                        device: device.clone(),
                        reason: format!("modes.{tag}: led_count {count} exceeds total_leds {total}"),
                    });
                }
            }
        }

        for (name, _) in self.enabled_devices() {
            for mode in ModeTag::ALL {
                if self.mode_table(mode).and_then(|t| t.get(name)).is_none() {
                    errors.push(ValidationError::MissingRendering {
                        device: name.to_string(),
                        mode,
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Example configuration covering every mode, written by `config --init`.
    pub fn example() -> Self {
        let mut devices = BTreeMap::new();
        devices.insert(
            "blinkstick".to_string(),
            DeviceConfig {
                total_leds: Some(8),
                ..DeviceConfig::new(AdapterKind::BlinkStick)
            },
        );
        devices.insert(
            "statusb".to_string(),
            DeviceConfig {
                port_pattern: Some(crate::device::serial::DEFAULT_PORT_PATTERN.to_string()),
                ..DeviceConfig::new(AdapterKind::Serial)
            },
        );
        devices.insert(
            "blink1".to_string(),
            DeviceConfig {
                enabled: false,
                ..DeviceConfig::new(AdapterKind::Blink1)
            },
        );

        let palette: [(ModeTag, &str, Option<u8>); 7] = [
            (ModeTag::Working, "#FF8000", None),
            (ModeTag::Ready, "#00FF00", None),
            (ModeTag::Question, "#FF1493", None),
            (ModeTag::Split, "#FFC000", Some(4)),
            (ModeTag::DimGreen, "#002000", None),
            (ModeTag::DimSplit, "#201800", Some(4)),
            (ModeTag::DimQuestion, "#200010", None),
        ];
        let mut modes = BTreeMap::new();
        for (mode, color, strip_leds) in palette {
            let mut table = BTreeMap::new();
            for name in devices.keys() {
                let led_count = if name == "blinkstick" { strip_leds } else { None };
                table.insert(
                    name.clone(),
                    ModeRendering {
                        color: color.to_string(),
                        led_count,
                    },
                );
            }
            modes.insert(mode.as_str().to_string(), table);
        }

        Config {
            state_dir: None,
            timing: Timing::default(),
            devices,
            modes,
        }
    }
}
