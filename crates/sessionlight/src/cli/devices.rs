//! `devices` subcommand: probe every configured indicator.

use super::{Context, DeviceJson, DeviceRegistry, DevicesOutput, Result, kv_indent, kv_width, print_json};

pub(super) fn cmd_devices(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let detected = DeviceRegistry::from_config(&config)?.detect();

    let devices: Vec<DeviceJson> = config
        .devices
        .iter()
        .map(|(name, dc)| DeviceJson {
            name: name.clone(),
            adapter: dc.adapter,
            enabled: dc.enabled,
            present: detected
                .iter()
                .find(|d| &d.name == name)
                .map(|d| d.present),
        })
        .collect();

    if ctx.json {
        return print_json(&DevicesOutput {
            count: devices.len(),
            devices,
        });
    }

    if devices.is_empty() {
        println!("No devices configured.");
        return Ok(());
    }

    println!(
        "{} device{} configured:",
        devices.len(),
        if devices.len() == 1 { "" } else { "s" }
    );
    let keys: Vec<String> = devices.iter().map(|d| format!("{}:", d.name)).collect();
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let w = kv_width(&[], &key_refs);
    for (key, dev) in key_refs.iter().zip(&devices) {
        let presence = match dev.present {
            Some(true) => "present",
            Some(false) => "not found",
            None => "disabled",
        };
        kv_indent(key, format_args!("{:<11}{presence}", dev.adapter.as_str()), w);
    }
    Ok(())
}
