//! `status` subcommand: live sessions and the effective mode.

use sessionlight_lib::state::now_millis;

use super::{
    Context, Controller, Result, SessionJson, StatusOutput, kv, kv_indent, kv_width, lock_busy,
    print_json,
};

pub(super) fn cmd_status(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let controller = Controller::from_config(&config, None)?;
    let now = now_millis();
    let (registry, effective) = controller.snapshot_at(now).ok_or_else(lock_busy)?;

    let sessions: Vec<SessionJson> = registry
        .sessions
        .iter()
        .map(|(id, s)| SessionJson {
            id: id.clone(),
            mode: s.mode,
            age_ms: s.age_ms(now),
        })
        .collect();
    let state_file = controller.store().path().display().to_string();

    if ctx.json {
        return print_json(&StatusOutput {
            version: env!("CARGO_PKG_VERSION").to_string(),
            effective_mode: effective,
            state_file,
            sessions,
        });
    }

    let ids: Vec<String> = sessions.iter().map(|s| format!("{}:", s.id)).collect();
    let id_keys: Vec<&str> = ids.iter().map(String::as_str).collect();
    let w = kv_width(&["Version:", "Effective mode:", "State file:"], &id_keys);

    kv("Version:", env!("CARGO_PKG_VERSION"), w);
    kv("Effective mode:", effective, w);
    kv("State file:", &state_file, w);
    println!();

    if sessions.is_empty() {
        println!("No live sessions.");
        return Ok(());
    }
    println!("Sessions ({}):", sessions.len());
    for (key, s) in id_keys.iter().zip(&sessions) {
        kv_indent(key, format_args!("{:<9} {} ago", s.mode.as_str(), format_age(s.age_ms)), w);
    }
    Ok(())
}

fn format_age(ms: u64) -> String {
    match ms / 1000 {
        0 => format!("{ms}ms"),
        s if s < 60 => format!("{s}s"),
        s => format!("{}m{:02}s", s / 60, s % 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_formatting() {
        assert_eq!(format_age(250), "250ms");
        assert_eq!(format_age(12_400), "12s");
        assert_eq!(format_age(75_000), "1m15s");
    }
}
