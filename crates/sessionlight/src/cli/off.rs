//! `off` subcommand.

use super::{
    ApplyJson, ApplyOutcome, Context, Controller, Result, describe_apply, lock_busy, print_json,
};

pub(super) fn cmd_off(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let outcome = Controller::from_config(&config, None)?
        .clear()
        .ok_or_else(lock_busy)?;

    if ctx.json {
        return print_json(&ApplyJson::from(&outcome));
    }
    match &outcome {
        ApplyOutcome::Applied(names) => println!("Cleared {}", names.join(", ")),
        other => println!("{}", describe_apply(other)),
    }
    Ok(())
}
