//! CLI subcommands: daemon, sink status, one-shot volume control, config.

mod config_cmd;
mod oneshot;
mod run;
mod status;

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use mqttvold_lib::config::Config;
pub(super) use mqttvold_lib::error::Result;
pub(super) use mqttvold_lib::host::{AudioBackend, WpctlBackend};
pub(super) use mqttvold_lib::volume::{VolumeEngine, VolumeState};
use mqttvold_lib::MqttvoldError;

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
    println!("  {key:<width$}{value}", width = w - 2);
}

/// Pretty-print a JSON document to stdout.
pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    println!("{text}");
    Ok(())
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct StatusOutput {
    pub version: String,
    pub sink: String,
    pub volume: Option<u8>,
    pub muted: Option<bool>,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub log_file: Option<String>,
    pub settings: Config,
}

// ── Command-line overrides ──

/// Flags that override values from the config file.
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Name or IP of the MQTT server
    #[arg(long, global = true, value_name = "HOST")]
    mqtt_server: Option<String>,

    /// Port of the MQTT server
    #[arg(long, global = true, value_name = "PORT")]
    mqtt_port: Option<u16>,

    /// Log level [DEBUG, INFO, WARNING, ERROR, CRITICAL]
    #[arg(long, global = true, value_name = "LEVEL")]
    loglevel: Option<String>,

    /// Also log into a rotating log file
    #[arg(long, global = true)]
    logfile: bool,

    /// MQTT topic to subscribe (repeatable, replaces configured topics)
    #[arg(long = "topic", global = true, value_name = "TOPIC")]
    topics: Vec<String>,

    /// Path to an alternative config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Overrides {
    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }

    /// Apply the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref server) = self.mqtt_server {
            config.mqtt_server = server.clone();
        }
        if let Some(port) = self.mqtt_port {
            config.mqtt_port = port;
        }
        if let Some(ref level) = self.loglevel {
            config.log_level = level.clone();
        }
        if self.logfile {
            config.log_file = true;
        }
        if !self.topics.is_empty() {
            config.topics = self.topics.clone();
        }
    }
}

/// Load config from the custom path or the default location, then apply
/// command-line overrides. Returns parse warnings for logging once the
/// logger is up.
pub fn load_config(overrides: &Overrides) -> (Config, Vec<String>) {
    let (mut config, warnings) = match overrides.config_path() {
        Some(path) => Config::load_from(path),
        None => Config::load_with_warnings(),
    };
    overrides.apply(&mut config);
    (config, warnings)
}

/// Reject a config that would make the daemon misbehave.
pub(super) fn validate(config: &Config) -> Result<()> {
    config.validate().map_err(|errors| {
        let msg = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        MqttvoldError::Config(msg)
    })
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the daemon: apply rotary events from MQTT to the sink volume (default)
    Run,

    /// Show sink volume and mute state
    Status,

    /// Show current configuration and file paths
    Config {
        /// Write a config file with default settings if none exists
        #[arg(long)]
        init: bool,
    },

    /// Adjust the volume once by a raw rotary step (halved, like dial events)
    Adjust {
        /// Step size; negative values lower the volume
        #[arg(allow_hyphen_values = true)]
        step: i64,
    },

    /// Toggle sink mute once
    Toggle,
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, config: &Config, config_path: Option<&Path>, json: bool) -> Result<()> {
    match cmd {
        Command::Run => {
            if json {
                warn_json_unsupported("run");
            }
            run::cmd_run(config)
        }
        Command::Status => status::cmd_status(config, json),
        Command::Config { init } => config_cmd::cmd_config(config, config_path, init, json),
        Command::Adjust { step } => {
            if json {
                warn_json_unsupported("adjust");
            }
            oneshot::cmd_adjust(config, step)
        }
        Command::Toggle => {
            if json {
                warn_json_unsupported("toggle");
            }
            oneshot::cmd_toggle(config)
        }
    }
}


#[cfg(test)]
mod override_tests {
    use super::*;

    #[test]
    fn empty_overrides_keep_config() {
        let mut config = Config::default();
        Overrides::default().apply(&mut config);
        assert_eq!(config.mqtt_server, "localhost");
        assert_eq!(config.topics, Config::default().topics);
        assert!(!config.log_file);
    }

    #[test]
    fn overrides_replace_values() {
        let overrides = Overrides {
            mqtt_server: Some("broker.lan".into()),
            mqtt_port: Some(1884),
            loglevel: Some("DEBUG".into()),
            logfile: true,
            topics: vec!["a/b".into(), "c/d".into()],
            config: None,
        };
        let mut config = Config::default();
        overrides.apply(&mut config);
        assert_eq!(config.mqtt_server, "broker.lan");
        assert_eq!(config.mqtt_port, 1884);
        assert_eq!(config.log_level, "DEBUG");
        assert!(config.log_file);
        assert_eq!(config.topics, vec!["a/b".to_string(), "c/d".to_string()]);
    }

    #[test]
    fn load_config_from_custom_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "mqtt_port = 2000\nsink = \"55\"\n").unwrap();
        let overrides = Overrides {
            config: Some(path),
            mqtt_port: Some(3000),
            ..Overrides::default()
        };
        let (config, warnings) = load_config(&overrides);
        assert!(warnings.is_empty());
        assert_eq!(config.sink, "55");
        assert_eq!(config.mqtt_port, 3000);
    }

    #[test]
    fn validate_reports_all_problems() {
        let config = Config {
            mqtt_port: 0,
            topics: vec![],
            ..Config::default()
        };
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.starts_with("Config error: "));
        assert!(err.contains("MQTT port cannot be 0"));
        assert!(err.contains("no topics configured"));
    }
}

#[cfg(test)]
mod json_struct_tests {
    use super::*;

    #[test]
    fn status_output_serializes_nulls() {
        let out = StatusOutput {
            version: "0.3.0".into(),
            sink: "@DEFAULT_AUDIO_SINK@".into(),
            volume: None,
            muted: None,
            error: Some("wpctl not found".into()),
        };
        let json: serde_json::Value = serde_json::to_value(&out).unwrap();
        assert!(json["volume"].is_null());
        assert_eq!(json["error"], "wpctl not found");
    }

    #[test]
    fn config_output_embeds_settings() {
        let out = ConfigOutput {
            config_file: None,
            config_file_exists: false,
            log_file: None,
            settings: Config::default(),
        };
        let json: serde_json::Value = serde_json::to_value(&out).unwrap();
        assert_eq!(json["settings"]["mqtt_port"], 1883);
        assert_eq!(json["settings"]["actions"]["toggle"], "toggle");
    }
}
