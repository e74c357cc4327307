//! `config` subcommand: show the config file and its validation result, or
//! write an example.

use super::{Config, ConfigOutput, Context, Result, SessionlightError, kv, kv_indent, kv_width, print_json};

pub(super) fn cmd_config(ctx: &Context) -> Result<()> {
    let path = ctx.config_path.as_deref();
    let exists = path.is_some_and(|p| p.exists());

    let (settings, errors) = match path {
        Some(p) if exists => match Config::load_from(p) {
            Ok(config) => {
                let errors: Vec<String> = config
                    .validate()
                    .err()
                    .unwrap_or_default()
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                (Some(config), errors)
            }
            Err(e) => (None, vec![e.to_string()]),
        },
        _ => (None, Vec::new()),
    };
    let state_dir = settings.as_ref().map(|c| c.state_dir());

    if ctx.json {
        print_json(&ConfigOutput {
            config_file: path.map(|p| p.display().to_string()),
            config_file_exists: exists,
            valid: exists && errors.is_empty(),
            errors: errors.clone(),
            state_dir: state_dir.as_ref().map(|d| d.display().to_string()),
            settings: settings.clone(),
        })?;
    } else {
        let w = kv_width(
            &["Config file:", "State dir:", "Validation:"],
            &["stale_timeout_ms:", "lock_timeout_ms:", "lock_stale_ms:"],
        );
        match path {
            Some(p) if exists => kv("Config file:", format_args!("{} (loaded)", p.display()), w),
            Some(p) => kv(
                "Config file:",
                format_args!(
                    "{} (not found, create it with `sessionlight config --init`)",
                    p.display()
                ),
                w,
            ),
            None => kv("Config file:", "(no config directory)", w),
        }

        if let Some(config) = &settings {
            print_settings(config, w);
        }

        if exists {
            println!();
            if errors.is_empty() {
                kv("Validation:", "ok", w);
            } else {
                kv("Validation:", format_args!("{} problem(s)", errors.len()), w);
                for e in &errors {
                    println!("  - {e}");
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(SessionlightError::Config(format!(
            "{} problem(s) in config",
            errors.len()
        )))
    }
}

fn print_settings(config: &Config, w: usize) {
    kv("State dir:", config.state_dir().display(), w);
    println!();

    println!("Timing:");
    let t = &config.timing;
    kv_indent("stale_timeout_ms:", t.stale_timeout_ms, w);
    kv_indent("lock_timeout_ms:", t.lock_timeout_ms, w);
    kv_indent("lock_stale_ms:", t.lock_stale_ms, w);
    kv_indent("dim_delay_ms:", t.dim_delay_ms, w);
    kv_indent("dim_enabled:", t.dim_enabled, w);
    println!();

    println!("Devices:");
    if config.devices.is_empty() {
        println!("  (none)");
    }
    for (name, dev) in &config.devices {
        let state = if dev.enabled { "enabled" } else { "disabled" };
        kv_indent(&format!("{name}:"), format_args!("{} ({state})", dev.adapter), w);
    }
}

pub(super) fn cmd_config_init(ctx: &Context, force: bool) -> Result<()> {
    let path = ctx.config_path()?;
    if path.exists() && !force {
        return Err(SessionlightError::Config(format!(
            "{} already exists (pass --force to overwrite)",
            path.display()
        )));
    }
    Config::example().save_to(path)?;
    log::info!("wrote example config to {}", path.display());

    if ctx.json {
        return print_json(&serde_json::json!({
            "config_file": path.display().to_string(),
            "written": true,
        }));
    }
    println!("Wrote example config to {}", path.display());
    Ok(())
}
