//! Hook entry points: report a session's mode, or run a scheduled dim.
//!
//! Neither fails on a missing device or a busy lock; both are logged and the
//! process exits 0 so the calling hook never sees an error.

use std::time::Duration;

use sessionlight_lib::controller::{DimOutcome, ReportOutcome};
use sessionlight_lib::dim::{DimScheduler, ProcessDimScheduler};

use super::{
    ApplyJson, Context, Controller, DimOutput, ModeTag, ReportOutput, Result, SessionlightError,
    print_json, resolve_session_id,
};

pub(super) fn cmd_report(mode: ModeTag, session_id: Option<String>, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let scheduler: Option<Box<dyn DimScheduler>> =
        match ProcessDimScheduler::current(ctx.config_path.clone()) {
            Ok(s) => Some(Box::new(s)),
            Err(e) => {
                log::warn!("dimming unavailable, cannot locate own executable: {e}");
                None
            }
        };
    let mut controller = Controller::from_config(&config, scheduler)?;
    let session_id = resolve_session_id(session_id);

    let output = match controller.report(&session_id, mode) {
        ReportOutcome::Reported {
            effective,
            devices,
            dim_scheduled,
        } => {
            log::info!(
                "{session_id}: {mode} -> {effective}, {}",
                super::describe_apply(&devices)
            );
            ReportOutput {
                session_id,
                mode,
                outcome: "reported",
                effective: Some(effective),
                devices: Some(ApplyJson::from(&devices)),
                dim_scheduled,
            }
        }
        ReportOutcome::LockTimeout => ReportOutput {
            session_id,
            mode,
            outcome: "lock-timeout",
            effective: None,
            devices: None,
            dim_scheduled: false,
        },
        ReportOutcome::NotReportable(tag) => {
            return Err(SessionlightError::Config(format!(
                "{tag} is derived from other sessions and cannot be reported"
            )));
        }
    };

    if ctx.json {
        print_json(&output)?;
    }
    Ok(())
}

pub(super) fn cmd_dim(mode: ModeTag, delay: Duration, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let mut controller = Controller::from_config(&config, None)?;

    let output = match controller.dim_check(mode, delay) {
        DimOutcome::Applied { mode, devices } => {
            log::info!("{mode}: {}", super::describe_apply(&devices));
            DimOutput {
                mode,
                outcome: "applied",
                current: Some(mode),
                devices: Some(ApplyJson::from(&devices)),
            }
        }
        DimOutcome::Skipped { current } => DimOutput {
            mode,
            outcome: "skipped",
            current: Some(current),
            devices: None,
        },
        DimOutcome::LockTimeout => DimOutput {
            mode,
            outcome: "lock-timeout",
            current: None,
            devices: None,
        },
        DimOutcome::NotDim(tag) => {
            return Err(SessionlightError::Config(format!("{tag} is not a dim mode")));
        }
    };

    if ctx.json {
        print_json(&output)?;
    }
    Ok(())
}
