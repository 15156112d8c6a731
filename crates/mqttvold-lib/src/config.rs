//! Application configuration: TOML-based, platform-aware paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# mqttvold configuration. Command-line flags override values set here.\n\n";

/// Inbound `action` strings mapped to engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionNames {
    #[serde(default = "default_step_up")]
    pub step_up: String,
    #[serde(default = "default_step_down")]
    pub step_down: String,
    #[serde(default = "default_toggle")]
    pub toggle: String,
}

fn default_step_up() -> String {
    "brightness_step_up".into()
}
fn default_step_down() -> String {
    "brightness_step_down".into()
}
fn default_toggle() -> String {
    "toggle".into()
}

impl Default for ActionNames {
    fn default() -> Self {
        ActionNames {
            step_up: default_step_up(),
            step_down: default_step_down(),
            toggle: default_toggle(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// MQTT broker host name or IP.
    #[serde(default = "default_mqtt_server")]
    pub mqtt_server: String,

    /// MQTT broker port.
    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    /// Topics carrying rotary events. All are re-subscribed on every connect.
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,

    /// MQTT client id. Empty = `mqttvold_<pid>`.
    #[serde(default)]
    pub client_id: String,

    /// MQTT keep-alive interval in seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Fixed delay before reconnecting after a broker connection error.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Path or name of the `wpctl` binary.
    #[serde(default = "default_wpctl_path")]
    pub wpctl_path: String,

    /// Sink selector passed to `wpctl`.
    #[serde(default = "default_sink")]
    pub sink: String,

    /// Host commands still running after this many milliseconds are killed.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Read the live sink state before the first adjustment. When false, start
    /// from `initial_volume`, unmuted.
    #[serde(default = "default_true")]
    pub query_on_start: bool,

    /// Starting volume when `query_on_start` is false.
    #[serde(default = "default_initial_volume")]
    pub initial_volume: u8,

    /// Log level: DEBUG, INFO, WARNING, ERROR or CRITICAL.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Also log to a size-rotated file.
    #[serde(default)]
    pub log_file: bool,

    /// Action names sent by the rotary device.
    #[serde(default)]
    pub actions: ActionNames,
}

fn default_mqtt_server() -> String {
    "localhost".into()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_topics() -> Vec<String> {
    vec!["z2m_DG/buero_rotary".into()]
}
fn default_keep_alive_secs() -> u64 {
    10
}
fn default_reconnect_delay_secs() -> u64 {
    crate::reconnect::DEFAULT_RECONNECT_DELAY.as_secs()
}
fn default_wpctl_path() -> String {
    "wpctl".into()
}
fn default_sink() -> String {
    "@DEFAULT_AUDIO_SINK@".into()
}
fn default_command_timeout_ms() -> u64 {
    2000
}
fn default_initial_volume() -> u8 {
    crate::volume::DEFAULT_VOLUME
}
fn default_log_level() -> String {
    "ERROR".into()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mqtt_server: default_mqtt_server(),
            mqtt_port: default_mqtt_port(),
            topics: default_topics(),
            client_id: String::new(),
            keep_alive_secs: default_keep_alive_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            wpctl_path: default_wpctl_path(),
            sink: default_sink(),
            command_timeout_ms: default_command_timeout_ms(),
            query_on_start: true,
            initial_volume: default_initial_volume(),
            log_level: default_log_level(),
            log_file: false,
            actions: ActionNames::default(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `mqtt_server` is empty or whitespace-only.
    EmptyServer,
    /// `mqtt_port` is 0.
    InvalidPort,
    /// No topics, or a topic that is empty or contains wildcards in the wrong place.
    InvalidTopics(String),
    /// `initial_volume` is above 100.
    InvalidInitialVolume(u8),
    /// `log_level` is not a recognized level name.
    InvalidLogLevel(String),
    /// `wpctl_path` or `sink` is empty.
    EmptyHostSetting(&'static str),
    /// `command_timeout_ms` or `keep_alive_secs` is 0.
    ZeroDuration(&'static str),
    /// Two action names are identical or one is empty.
    InvalidActions(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyServer => write!(f, "MQTT server cannot be empty"),
            ValidationError::InvalidPort => write!(f, "MQTT port cannot be 0"),
            ValidationError::InvalidTopics(e) => write!(f, "Invalid topics: {e}"),
            ValidationError::InvalidInitialVolume(v) => {
                write!(f, "Invalid initial volume: {v} (must be 0-100)")
            }
            ValidationError::InvalidLogLevel(l) => write!(f, "Invalid log level: {l}"),
            ValidationError::EmptyHostSetting(field) => write!(f, "{field} cannot be empty"),
            ValidationError::ZeroDuration(field) => write!(f, "{field} must be greater than 0"),
            ValidationError::InvalidActions(e) => write!(f, "Invalid actions: {e}"),
        }
    }
}

/// Parse a log level name. Accepts the Python-style names the daemon has
/// always used (`WARNING`, `CRITICAL`) as well as `log` crate names.
pub fn parse_log_level(level: &str) -> Option<log::LevelFilter> {
    match level.trim().to_ascii_uppercase().as_str() {
        "WARNING" => Some(log::LevelFilter::Warn),
        "CRITICAL" | "FATAL" => Some(log::LevelFilter::Error),
        other => log::LevelFilter::from_str(other).ok(),
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mqttvold"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Full path to the rotating log file.
    pub fn log_path() -> Option<PathBuf> {
        dirs::state_dir()
            .or_else(dirs::cache_dir)
            .map(|d| d.join("mqttvold").join("mqttvold.log"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Save config to the default platform path.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config directory",
            ));
        };
        self.save_to(&path)
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// MQTT client id, falling back to `mqttvold_<pid>`.
    pub fn effective_client_id(&self) -> String {
        let id = self.client_id.trim();
        if id.is_empty() {
            format!("mqttvold_{}", std::process::id())
        } else {
            id.to_string()
        }
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.mqtt_server.trim().is_empty() {
            errors.push(ValidationError::EmptyServer);
        }
        if self.mqtt_port == 0 {
            errors.push(ValidationError::InvalidPort);
        }

        if self.topics.is_empty() {
            errors.push(ValidationError::InvalidTopics("no topics configured".into()));
        }
        for topic in &self.topics {
            if let Err(e) = validate_topic_filter(topic) {
                errors.push(ValidationError::InvalidTopics(e));
            }
        }

        if self.initial_volume > crate::volume::MAX_VOLUME {
            errors.push(ValidationError::InvalidInitialVolume(self.initial_volume));
        }
        if parse_log_level(&self.log_level).is_none() {
            errors.push(ValidationError::InvalidLogLevel(self.log_level.clone()));
        }

        if self.wpctl_path.trim().is_empty() {
            errors.push(ValidationError::EmptyHostSetting("wpctl_path"));
        }
        if self.sink.trim().is_empty() {
            errors.push(ValidationError::EmptyHostSetting("sink"));
        }
        if self.command_timeout_ms == 0 {
            errors.push(ValidationError::ZeroDuration("command_timeout_ms"));
        }
        if self.keep_alive_secs == 0 {
            errors.push(ValidationError::ZeroDuration("keep_alive_secs"));
        }

        let a = &self.actions;
        let names = [&a.step_up, &a.step_down, &a.toggle];
        if names.iter().any(|n| n.trim().is_empty()) {
            errors.push(ValidationError::InvalidActions(
                "action names cannot be empty".into(),
            ));
        } else if a.step_up == a.step_down || a.step_up == a.toggle || a.step_down == a.toggle {
            errors.push(ValidationError::InvalidActions(
                "action names must be distinct".into(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Check an MQTT topic filter: non-empty, `#` only as the last level,
/// `+` only as a whole level.
fn validate_topic_filter(topic: &str) -> std::result::Result<(), String> {
    if topic.is_empty() {
        return Err("topic cannot be empty".into());
    }
    let levels: Vec<&str> = topic.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || i != levels.len() - 1) {
            return Err(format!("'#' must be the last level: {topic}"));
        }
        if level.contains('+') && *level != "+" {
            return Err(format!("'+' must occupy a whole level: {topic}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Config defaults ──

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.mqtt_server, "localhost");
        assert_eq!(c.mqtt_port, 1883);
        assert_eq!(c.topics, vec!["z2m_DG/buero_rotary".to_string()]);
        assert_eq!(c.keep_alive_secs, 10);
        assert_eq!(c.reconnect_delay_secs, 30);
        assert_eq!(c.sink, "@DEFAULT_AUDIO_SINK@");
        assert!(c.query_on_start);
        assert_eq!(c.initial_volume, 80);
        assert_eq!(c.log_level, "ERROR");
        assert!(!c.log_file);
        assert_eq!(c.actions.step_up, "brightness_step_up");
        assert_eq!(c.actions.step_down, "brightness_step_down");
        assert_eq!(c.actions.toggle, "toggle");
    }

    #[test]
    fn defaults_are_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = "mqtt_server = \"broker.lan\"\n[actions]\ntoggle = \"single\"";
        let c: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(c.mqtt_server, "broker.lan");
        assert_eq!(c.mqtt_port, 1883);
        assert_eq!(c.actions.toggle, "single");
        assert_eq!(c.actions.step_up, "brightness_step_up");
    }

    #[test]
    fn serialize_roundtrip() {
        let c = Config {
            mqtt_server: "10.0.0.2".into(),
            topics: vec!["a/b".into(), "c/+".into()],
            query_on_start: false,
            initial_volume: 40,
            ..Config::default()
        };
        let toml_str = toml::to_string_pretty(&c).unwrap();
        let c2: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(c2.mqtt_server, "10.0.0.2");
        assert_eq!(c2.topics, c.topics);
        assert!(!c2.query_on_start);
        assert_eq!(c2.initial_volume, 40);
    }

    // ── Load / save ──

    #[test]
    fn load_from_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (c, warnings) = Config::load_from(&dir.path().join("nope.toml"));
        assert!(warnings.is_empty());
        assert_eq!(c.mqtt_port, 1883);
    }

    #[test]
    fn load_from_invalid_file_warns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "mqtt_port = \"not a number\"").unwrap();
        let (c, warnings) = Config::load_from(&path);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("config parse error"));
        assert_eq!(c.mqtt_port, 1883);
    }

    #[test]
    fn save_to_then_load_from() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");
        let c = Config {
            mqtt_port: 8883,
            ..Config::default()
        };
        c.save_to(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# mqttvold configuration"));
        assert!(!path.with_extension("toml.tmp").exists());
        let (loaded, warnings) = Config::load_from(&path);
        assert!(warnings.is_empty());
        assert_eq!(loaded.mqtt_port, 8883);
    }

    // ── Client id ──

    #[test]
    fn client_id_falls_back_to_pid() {
        let c = Config::default();
        assert_eq!(
            c.effective_client_id(),
            format!("mqttvold_{}", std::process::id())
        );
    }

    #[test]
    fn client_id_configured() {
        let c = Config {
            client_id: " office-dial ".into(),
            ..Config::default()
        };
        assert_eq!(c.effective_client_id(), "office-dial");
    }

    // ── Log levels ──

    #[test]
    fn parse_log_levels() {
        assert_eq!(parse_log_level("DEBUG"), Some(log::LevelFilter::Debug));
        assert_eq!(parse_log_level("info"), Some(log::LevelFilter::Info));
        assert_eq!(parse_log_level("WARNING"), Some(log::LevelFilter::Warn));
        assert_eq!(parse_log_level("warn"), Some(log::LevelFilter::Warn));
        assert_eq!(parse_log_level("ERROR"), Some(log::LevelFilter::Error));
        assert_eq!(parse_log_level("CRITICAL"), Some(log::LevelFilter::Error));
        assert_eq!(parse_log_level("loud"), None);
    }

    // ── Validation ──

    #[test]
    fn validate_collects_all_errors() {
        let c = Config {
            mqtt_server: " ".into(),
            mqtt_port: 0,
            topics: vec![],
            initial_volume: 101,
            log_level: "chatty".into(),
            wpctl_path: String::new(),
            command_timeout_ms: 0,
            ..Config::default()
        };
        let errors = c.validate().unwrap_err();
        assert!(errors.contains(&ValidationError::EmptyServer));
        assert!(errors.contains(&ValidationError::InvalidPort));
        assert!(errors.contains(&ValidationError::InvalidInitialVolume(101)));
        assert!(errors.contains(&ValidationError::InvalidLogLevel("chatty".into())));
        assert!(errors.contains(&ValidationError::EmptyHostSetting("wpctl_path")));
        assert!(errors.contains(&ValidationError::ZeroDuration("command_timeout_ms")));
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::InvalidTopics(_)))
        );
    }

    #[test]
    fn validate_topic_wildcards() {
        assert!(validate_topic_filter("z2m/+/action").is_ok());
        assert!(validate_topic_filter("z2m/#").is_ok());
        assert!(validate_topic_filter("#").is_ok());
        assert!(validate_topic_filter("z2m/#/x").is_err());
        assert!(validate_topic_filter("z2m/a+").is_err());
        assert!(validate_topic_filter("").is_err());
    }

    #[test]
    fn validate_duplicate_actions() {
        let c = Config {
            actions: ActionNames {
                step_up: "rotate".into(),
                step_down: "rotate".into(),
                toggle: "toggle".into(),
            },
            ..Config::default()
        };
        let errors = c.validate().unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::InvalidActions(
                "action names must be distinct".into()
            )]
        );
    }

    #[test]
    fn display_validation_errors() {
        assert_eq!(
            ValidationError::InvalidInitialVolume(120).to_string(),
            "Invalid initial volume: 120 (must be 0-100)"
        );
        assert_eq!(
            ValidationError::ZeroDuration("keep_alive_secs").to_string(),
            "keep_alive_secs must be greater than 0"
        );
    }
}
