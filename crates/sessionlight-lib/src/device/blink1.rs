//! blink(1) indicators, driven through the `blink1-tool` CLI.
//!
//! - presence: `blink1-tool --list` prints a `serialnum:` line per device
//! - set: `blink1-tool --rgb '#RRGGBB' -m 0`
//! - off: `blink1-tool --off -m 0`
//!
//! Every invocation is bounded by [`TOOL_TIMEOUT`]; an overrunning tool is
//! killed and counted as a failure.

use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use super::{AdapterKind, DeviceAdapter, DeviceError, Result, RetryPolicy};
use crate::led::{RenderOptions, Rgb};

pub const DEFAULT_TOOL: &str = "blink1-tool";

pub const TOOL_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval while waiting for the tool to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    /// Combined stdout and stderr.
    pub output: String,
}

/// Run `program args...`, killing it if it is still running after `timeout`.
/// Output is drained while the tool runs so a chatty tool cannot stall on a
/// full pipe.
pub fn run_tool(program: &str, args: &[&str], timeout: Duration) -> io::Result<ToolOutput> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    std::thread::scope(|s| {
        let out = s.spawn(move || drain(stdout));
        let err = s.spawn(move || drain(stderr));

        let max_polls = (timeout.as_millis() / POLL_INTERVAL.as_millis()).max(1) as u64;
        let mut status = None;
        for _ in 0..max_polls {
            match child.try_wait()? {
                Some(exit) => {
                    status = Some(exit);
                    break;
                }
                None => std::thread::sleep(POLL_INTERVAL),
            }
        }

        let status = match status {
            Some(exit) => exit,
            None => {
                log::warn!("{program} timed out after {timeout:?}, killing");
                let _ = child.kill();
                child.wait()?
            }
        };

        let mut output = out.join().unwrap_or_default();
        output.push_str(&err.join().unwrap_or_default());
        Ok(ToolOutput { status, output })
    })
}

fn drain(pipe: Option<impl Read>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf);
    }
    buf
}

pub struct Blink1Adapter {
    name: String,
    tool: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl Blink1Adapter {
    pub fn new(name: &str, tool: Option<&str>, retry: RetryPolicy) -> Self {
        Blink1Adapter {
            name: name.to_string(),
            tool: tool.unwrap_or(DEFAULT_TOOL).to_string(),
            timeout: TOOL_TIMEOUT,
            retry,
        }
    }

    /// Arguments for showing `color`.
    pub fn color_args(color: Rgb) -> Vec<String> {
        if color.is_off() {
            vec!["--off".into(), "-m".into(), "0".into()]
        } else {
            vec!["--rgb".into(), color.to_string(), "-m".into(), "0".into()]
        }
    }

    fn invoke(&self, args: &[&str]) -> Result<ToolOutput> {
        let out = run_tool(&self.tool, args, self.timeout).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                DeviceError::NotFound
            } else {
                DeviceError::CommandFailed(format!("{}: {e}", self.tool))
            }
        })?;
        if out.status.success() {
            Ok(out)
        } else {
            Err(DeviceError::CommandFailed(format!(
                "{} {}: {}",
                self.tool,
                args.join(" "),
                out.status
            )))
        }
    }
}

impl DeviceAdapter for Blink1Adapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Blink1
    }

    fn probe(&mut self) -> bool {
        match self.invoke(&["--list"]) {
            Ok(out) => out.output.contains("serialnum:"),
            Err(e) => {
                log::debug!("{}: probe failed: {e}", self.name);
                false
            }
        }
    }

    fn apply(&mut self, color: Rgb, _render: &RenderOptions) -> bool {
        let args = Self::color_args(color);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let label = format!("{}: set {color}", self.name);
        self.retry
            .run(&label, |_| self.invoke(&args).map(|_| ()))
            .is_ok()
    }
}
