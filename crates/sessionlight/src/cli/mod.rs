//! CLI subcommands: session reports, dim follow-ups, and device tooling.

mod config_cmd;
mod devices;
mod off;
mod report;
mod status;
mod test_cmd;

use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;

pub(super) use sessionlight_lib::ModeTag;
pub(super) use sessionlight_lib::SessionlightError;
pub(super) use sessionlight_lib::config::Config;
pub(super) use sessionlight_lib::controller::Controller;
pub(super) use sessionlight_lib::device::AdapterKind;
pub(super) use sessionlight_lib::error::Result;
pub(super) use sessionlight_lib::registry::{ApplyOutcome, DeviceRegistry};

/// Session id used when none is passed on the command line.
pub(super) const SESSION_ID_ENV: &str = "SESSIONLIGHT_SESSION_ID";

/// Settings shared by every command.
pub struct Context {
    /// Explicit `--config`/`SESSIONLIGHT_CONFIG`, else the platform default.
    pub config_path: Option<PathBuf>,
    pub json: bool,
}

impl Context {
    pub(super) fn config_path(&self) -> Result<&Path> {
        self.config_path.as_deref().ok_or_else(|| {
            SessionlightError::Config("no config directory on this platform; pass --config".into())
        })
    }

    pub(super) fn load_config(&self) -> Result<Config> {
        Config::load_validated(self.config_path()?)
    }
}

pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    println!("{text}");
    Ok(())
}

/// Pick the session id: argument, then environment, then the parent pid.
pub(super) fn session_id_from(arg: Option<String>, env: Option<String>, ppid: u32) -> String {
    arg.into_iter()
        .chain(env)
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| format!("session-{ppid}"))
}

pub(super) fn resolve_session_id(arg: Option<String>) -> String {
    session_id_from(arg, std::env::var(SESSION_ID_ENV).ok(), parent_pid())
}

#[cfg(unix)]
fn parent_pid() -> u32 {
    std::os::unix::process::parent_id()
}

#[cfg(not(unix))]
fn parent_pid() -> u32 {
    std::process::id()
}

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w.saturating_sub(2));
}

/// Error for commands that need the lock and could not get it in time.
pub(super) fn lock_busy() -> SessionlightError {
    SessionlightError::State("state is locked by another invocation, try again".into())
}

/// One-line human summary of a device fan-out.
pub(super) fn describe_apply(outcome: &ApplyOutcome) -> String {
    match outcome {
        ApplyOutcome::Applied(names) => format!("shown on {}", names.join(", ")),
        ApplyOutcome::NoDeviceFound => "no device found".to_string(),
        ApplyOutcome::AllFailed(names) => format!("failed on {}", names.join(", ")),
    }
}

// ── JSON output structs ──

#[derive(Debug, Serialize)]
pub(super) struct ApplyJson {
    /// `applied`, `no-device` or `failed`.
    pub result: &'static str,
    pub devices: Vec<String>,
}

impl From<&ApplyOutcome> for ApplyJson {
    fn from(outcome: &ApplyOutcome) -> Self {
        match outcome {
            ApplyOutcome::Applied(names) => ApplyJson {
                result: "applied",
                devices: names.clone(),
            },
            ApplyOutcome::NoDeviceFound => ApplyJson {
                result: "no-device",
                devices: Vec::new(),
            },
            ApplyOutcome::AllFailed(names) => ApplyJson {
                result: "failed",
                devices: names.clone(),
            },
        }
    }
}

#[derive(Serialize)]
pub(super) struct ReportOutput {
    pub session_id: String,
    pub mode: ModeTag,
    /// `reported` or `lock-timeout`.
    pub outcome: &'static str,
    pub effective: Option<ModeTag>,
    pub devices: Option<ApplyJson>,
    pub dim_scheduled: bool,
}

#[derive(Serialize)]
pub(super) struct DimOutput {
    pub mode: ModeTag,
    /// `applied`, `skipped` or `lock-timeout`.
    pub outcome: &'static str,
    pub current: Option<ModeTag>,
    pub devices: Option<ApplyJson>,
}

#[derive(Serialize)]
pub(super) struct StatusOutput {
    pub version: String,
    pub effective_mode: ModeTag,
    pub state_file: String,
    pub sessions: Vec<SessionJson>,
}

#[derive(Serialize)]
pub(super) struct SessionJson {
    pub id: String,
    pub mode: ModeTag,
    pub age_ms: u64,
}

#[derive(Serialize)]
pub(super) struct DevicesOutput {
    pub count: usize,
    pub devices: Vec<DeviceJson>,
}

#[derive(Serialize)]
pub(super) struct DeviceJson {
    pub name: String,
    pub adapter: AdapterKind,
    pub enabled: bool,
    /// `None` for disabled devices, which are not probed.
    pub present: Option<bool>,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub valid: bool,
    pub errors: Vec<String>,
    pub state_dir: Option<String>,
    pub settings: Option<Config>,
}

#[derive(Serialize)]
pub(super) struct TestStepJson {
    pub mode: ModeTag,
    pub devices: ApplyJson,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show live sessions and the effective mode
    Status,

    /// Probe every configured device
    Devices,

    /// Show the config file and its validation result
    Config {
        /// Write an example config covering every mode
        #[arg(long)]
        init: bool,
        /// Overwrite an existing file with --init
        #[arg(long, requires = "init")]
        force: bool,
    },

    /// Show a mode, or a bright/dim pair (green, yellow, pink), without
    /// recording a session
    Test {
        /// Mode name or pair name
        target: String,
        /// Pause between the bright and dim half of a pair
        #[arg(long, default_value_t = test_cmd::PAIR_PAUSE_MS, value_name = "MS")]
        pause: u64,
    },

    /// Turn every device off
    Off,

    /// Apply a dim mode if the shared state still calls for it
    #[command(hide = true)]
    Dim {
        /// Dim mode scheduled by an earlier report
        mode: ModeTag,
    },
}

impl Command {
    /// Commands spawned by hooks rather than typed at a terminal.
    pub fn is_background(&self) -> bool {
        matches!(self, Command::Dim { .. })
    }
}

/// `sessionlight <MODE> [SESSION_ID]`. Dim tags go straight to the dim path.
pub fn run_mode(mode: ModeTag, session_id: Option<String>, ctx: &Context) -> Result<()> {
    if mode.is_dim() {
        if session_id.is_some() {
            log::debug!("session id ignored for {mode}");
        }
        return report::cmd_dim(mode, sessionlight_lib::dim::delay_from_env(), ctx);
    }
    report::cmd_report(mode, session_id, ctx)
}

pub fn run(cmd: Command, ctx: &Context) -> Result<()> {
    match cmd {
        Command::Status => status::cmd_status(ctx),
        Command::Devices => devices::cmd_devices(ctx),
        Command::Config { init, force } => {
            if init {
                config_cmd::cmd_config_init(ctx, force)
            } else {
                config_cmd::cmd_config(ctx)
            }
        }
        Command::Test { target, pause } => {
            test_cmd::cmd_test(&target, std::time::Duration::from_millis(pause), ctx)
        }
        Command::Off => off::cmd_off(ctx),
        Command::Dim { mode } => {
            report::cmd_dim(mode, sessionlight_lib::dim::delay_from_env(), ctx)
        }
    }
}
