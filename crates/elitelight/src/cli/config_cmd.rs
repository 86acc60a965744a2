//! `config` subcommand: show current configuration and file paths.

use std::path::Path;

use super::{Config, ConfigOutput, Result, kv, kv_indent, kv_width, load_config, print_json};

pub(super) fn cmd_config(json: bool, custom_path: Option<&Path>, init: bool) -> Result<()> {
    let config_path = custom_path.map(|p| p.to_path_buf()).or_else(Config::path);

    if init && let Some(path) = &config_path {
        if path.exists() {
            log::warn!("{} already exists, leaving it alone", path.display());
        } else {
            Config::default().save_to(path)?;
            if !json {
                println!("Wrote default config to {}", path.display());
            }
        }
    }

    let config = load_config(custom_path);
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let problems: Vec<String> = match config.validate() {
        Ok(()) => vec![],
        Err(errors) => errors.iter().map(ToString::to_string).collect(),
    };

    if json {
        return print_json(&ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            settings: config.redacted(),
            problems,
        });
    }

    // Human-readable output
    let w = kv_width(
        &["Config file:"],
        &[
            "device_id:",
            "device_host:",
            "local_key:",
            "protocol_version:",
            "device_port:",
            "probe:",
            "backoff:",
            "write_timeout:",
            "dedupe_repeats:",
            "transport_command:",
            "on_change_command:",
        ],
    );

    match &config_path {
        Some(p) if config_exists => kv("Config file:", format_args!("{} (loaded)", p.display()), w),
        Some(p) => kv(
            "Config file:",
            format_args!("{} (not found, using defaults)", p.display()),
            w,
        ),
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    let or_unset = |s: &str| {
        if s.trim().is_empty() {
            "(not set)".to_string()
        } else {
            s.to_string()
        }
    };

    println!("Device:");
    kv_indent("device_id:", or_unset(&config.device_id), w);
    kv_indent("device_host:", or_unset(&config.device_host), w);
    let key_label = if config.local_key.is_empty() {
        "(not set)"
    } else {
        "(set)"
    };
    kv_indent("local_key:", key_label, w);
    kv_indent("protocol_version:", &config.protocol_version, w);
    kv_indent("device_port:", config.device_port, w);
    println!();

    println!("Timing:");
    kv_indent(
        "probe:",
        format_args!(
            "{} ms timeout, cached {} ms",
            config.probe_timeout_ms, config.probe_cache_ms
        ),
        w,
    );
    kv_indent(
        "backoff:",
        format_args!(
            "{} ms x{} up to {} ms",
            config.backoff_initial_ms, config.backoff_multiplier, config.backoff_max_ms
        ),
        w,
    );
    kv_indent(
        "write_timeout:",
        format_args!("{} ms", config.write_timeout_ms),
        w,
    );
    kv_indent("dedupe_repeats:", config.dedupe_repeats, w);
    println!();

    println!("Commands:");
    kv_indent("transport_command:", or_unset(&config.transport_command), w);
    kv_indent("on_change_command:", or_unset(&config.on_change_command), w);
    println!();

    println!("Events:");
    let mut events: Vec<_> = config.events.iter().collect();
    events.sort_by(|a, b| a.0.cmp(b.0));
    let ew = events.iter().map(|(k, _)| k.len() + 1).max().unwrap_or(0) + 4;
    for (event, entry) in events {
        let shown = match entry.to_state() {
            Ok(state) => state.to_string(),
            Err(_) => format!("{} (invalid)", entry.color),
        };
        kv_indent(&format!("{event}:"), shown, ew);
    }

    if !problems.is_empty() {
        println!();
        println!("Problems:");
        for p in &problems {
            println!("  - {p}");
        }
    }
    Ok(())
}
