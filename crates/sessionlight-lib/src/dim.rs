//! Delayed dimming of settled modes.
//!
//! After a settled mode is shown, a detached copy of the current executable is
//! started as `sessionlight [--config <path>] dim <dim-tag>` with
//! [`DIM_DELAY_ENV`] set. The child sleeps, then re-checks the shared state
//! under the lock before dimming (see `Controller::dim_check`). The parent
//! never waits for it.

use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::mode::ModeTag;

/// Milliseconds the dim follow-up sleeps before checking state.
pub const DIM_DELAY_ENV: &str = "SESSIONLIGHT_DIM_DELAY";

pub trait DimScheduler {
    /// Arrange for `dim` to be checked and applied after `delay`.
    fn schedule(&self, dim: ModeTag, delay: Duration) -> io::Result<()>;
}

/// Re-invokes the running executable in the background.
#[derive(Debug, Clone)]
pub struct ProcessDimScheduler {
    exe: PathBuf,
    config_path: Option<PathBuf>,
}

impl ProcessDimScheduler {
    pub fn new(exe: impl Into<PathBuf>, config_path: Option<PathBuf>) -> Self {
        ProcessDimScheduler {
            exe: exe.into(),
            config_path,
        }
    }

    /// Scheduler for the currently running binary.
    pub fn current(config_path: Option<PathBuf>) -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, config_path))
    }

    pub fn command(&self, dim: ModeTag, delay: Duration) -> Command {
        let mut cmd = Command::new(&self.exe);
        if let Some(path) = &self.config_path {
            cmd.arg("--config").arg(path);
        }
        cmd.arg("dim")
            .arg(dim.as_str())
            .env(DIM_DELAY_ENV, delay.as_millis().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Detach from the caller's process group
            cmd.process_group(0);
        }
        cmd
    }
}

impl DimScheduler for ProcessDimScheduler {
    fn schedule(&self, dim: ModeTag, delay: Duration) -> io::Result<()> {
        let child = self.command(dim, delay).spawn()?;
        log::info!("scheduled {dim} in {}ms (pid {})", delay.as_millis(), child.id());
        Ok(())
    }
}

/// Delay requested by the parent via [`DIM_DELAY_ENV`]. Zero when unset or
/// unparsable.
pub fn delay_from_env() -> Duration {
    std::env::var(DIM_DELAY_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::ZERO)
}

/// Recording scheduler for unit and integration tests.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Default)]
    pub struct RecordingScheduler {
        pub calls: Arc<Mutex<Vec<(ModeTag, Duration)>>>,
        /// If true, `schedule` returns an error (still recorded).
        pub fail: bool,
    }

    impl RecordingScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn scheduled(&self) -> Vec<(ModeTag, Duration)> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }
    }

    impl DimScheduler for RecordingScheduler {
        fn schedule(&self, dim: ModeTag, delay: Duration) -> io::Result<()> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((dim, delay));
            }
            if self.fail {
                Err(io::Error::other("spawn refused"))
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_without_config() {
        let s = ProcessDimScheduler::new("/usr/bin/sessionlight", None);
        let cmd = s.command(ModeTag::DimGreen, Duration::from_millis(5000));
        assert_eq!(cmd.get_program(), "/usr/bin/sessionlight");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, vec!["dim", "dim-green"]);
        let env: Vec<_> = cmd.get_envs().collect();
        assert!(env.contains(&(
            std::ffi::OsStr::new(DIM_DELAY_ENV),
            Some(std::ffi::OsStr::new("5000"))
        )));
    }

    #[test]
    fn command_line_forwards_config_path() {
        let s = ProcessDimScheduler::new("sl", Some(PathBuf::from("/etc/sl.toml")));
        let cmd = s.command(ModeTag::DimQuestion, Duration::from_millis(10));
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, vec!["--config", "/etc/sl.toml", "dim", "dim-question"]);
    }

    #[test]
    fn schedule_missing_exe_is_error() {
        let s = ProcessDimScheduler::new("/nonexistent/sessionlight-test-bin", None);
        assert!(s.schedule(ModeTag::DimSplit, Duration::ZERO).is_err());
    }

    #[test]
    fn recording_scheduler_records() {
        let s = mock::RecordingScheduler::new();
        s.schedule(ModeTag::DimGreen, Duration::from_secs(5)).unwrap();
        assert_eq!(
            s.scheduled(),
            vec![(ModeTag::DimGreen, Duration::from_secs(5))]
        );
    }
}
