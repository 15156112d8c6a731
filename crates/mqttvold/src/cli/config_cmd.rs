//! `config` subcommand: show current configuration and file paths.

use std::path::Path;

use super::{Config, ConfigOutput, Result, kv, kv_indent, kv_width};

pub(super) fn cmd_config(
    config: &Config,
    custom_path: Option<&Path>,
    init: bool,
    json: bool,
) -> Result<()> {
    let config_path = custom_path.map(|p| p.to_path_buf()).or_else(Config::path);
    let mut config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let log_path = Config::log_path();

    if init {
        match &config_path {
            Some(p) if !config_exists => {
                Config::default().save_to(p)?;
                config_exists = true;
                if !json {
                    println!("Wrote default config to {}", p.display());
                }
            }
            Some(p) => log::warn!("config file already exists, not overwriting: {}", p.display()),
            None => log::warn!("no config directory, cannot write config file"),
        }
    }

    if json {
        return super::print_json(&ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            log_file: log_path.as_ref().map(|p| p.display().to_string()),
            settings: config.clone(),
        });
    }

    // Human-readable output
    let w = kv_width(
        &["Config file:"],
        &[
            "mqtt_server:",
            "topics:",
            "reconnect_delay_secs:",
            "command_timeout_ms:",
            "query_on_start:",
            "Log file:",
        ],
    );

    match &config_path {
        Some(p) => {
            if config_exists {
                kv("Config file:", format_args!("{} (loaded)", p.display()), w);
            } else {
                kv(
                    "Config file:",
                    format_args!("{} (not found, using defaults)", p.display()),
                    w,
                );
            }
        }
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    println!("MQTT:");
    kv_indent("mqtt_server:", &config.mqtt_server, w);
    kv_indent("mqtt_port:", config.mqtt_port, w);
    kv_indent("topics:", config.topics.join(", "), w);
    let client_id = if config.client_id.trim().is_empty() {
        "(mqttvold_<pid>)"
    } else {
        config.client_id.as_str()
    };
    kv_indent("client_id:", client_id, w);
    kv_indent("keep_alive_secs:", config.keep_alive_secs, w);
    kv_indent("reconnect_delay_secs:", config.reconnect_delay_secs, w);
    println!();

    println!("Audio:");
    kv_indent("wpctl_path:", &config.wpctl_path, w);
    kv_indent("sink:", &config.sink, w);
    kv_indent("command_timeout_ms:", config.command_timeout_ms, w);
    kv_indent("query_on_start:", config.query_on_start, w);
    if !config.query_on_start {
        kv_indent("initial_volume:", format_args!("{}%", config.initial_volume), w);
    }
    println!();

    println!("Actions:");
    kv_indent("step_up:", &config.actions.step_up, w);
    kv_indent("step_down:", &config.actions.step_down, w);
    kv_indent("toggle:", &config.actions.toggle, w);
    println!();

    println!("Logging:");
    kv_indent("log_level:", &config.log_level, w);
    match &log_path {
        Some(p) => {
            let state = if config.log_file { "enabled" } else { "disabled" };
            kv_indent("Log file:", format_args!("{} ({state})", p.display()), w);
        }
        None => kv_indent("Log file:", "(no state directory)", w),
    }

    if let Err(errors) = config.validate() {
        println!();
        println!("Problems:");
        for e in errors {
            println!("  {e}");
        }
    }
    Ok(())
}
