//! Application configuration: TOML-based, platform-aware paths.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffConfig;
use crate::controller::ControlSettings;
use crate::endpoint::{DEFAULT_PORT, DEFAULT_PROTOCOL_VERSION, DeviceEndpoint};
use crate::mapping::{self, EventEntry, EventMapping};
use crate::probe::ProbeConfig;

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# EliteLight configuration — changes made outside the app may be overwritten.\n\n";

/// Stands in for the device key in displayed configs.
pub const REDACTED_KEY: &str = "<redacted>";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Tuya device id of the strip.
    #[serde(default)]
    pub device_id: String,

    /// IP address of the strip on the local network (host names are rejected).
    #[serde(default)]
    pub device_host: String,

    /// Local key used by the device protocol.
    #[serde(default)]
    pub local_key: String,

    /// Device protocol version. Default: "3.3".
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,

    /// TCP port probed for reachability. Default: 6668.
    #[serde(default = "default_device_port")]
    pub device_port: u16,

    /// Upper bound for one reachability probe, in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// How long a probe result is reused, in milliseconds.
    #[serde(default = "default_probe_cache_ms")]
    pub probe_cache_ms: u64,

    /// First cooldown after a failed probe, in milliseconds.
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Longest cooldown between probes, in milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Cooldown growth factor per consecutive failure.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound for one write to the strip, in milliseconds.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Skip writes that repeat the last applied state.
    #[serde(default)]
    pub dedupe_repeats: bool,

    /// Bridge program that talks to the strip. Empty = not configured.
    #[serde(default)]
    pub transport_command: String,

    /// Command to run after each confirmed change. Empty = disabled.
    #[serde(default)]
    pub on_change_command: String,

    /// Game event name to LED state.
    /// Example in TOML: `[events.Docked]` / `color = "white"`
    #[serde(default = "mapping::default_entries")]
    pub events: HashMap<String, EventEntry>,
}

fn default_protocol_version() -> String {
    DEFAULT_PROTOCOL_VERSION.into()
}
fn default_device_port() -> u16 {
    DEFAULT_PORT
}
fn default_probe_timeout_ms() -> u64 {
    300
}
fn default_probe_cache_ms() -> u64 {
    5_000
}
fn default_backoff_initial_ms() -> u64 {
    1_000
}
fn default_backoff_max_ms() -> u64 {
    30_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_write_timeout_ms() -> u64 {
    2_000
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_id: String::new(),
            device_host: String::new(),
            local_key: String::new(),
            protocol_version: default_protocol_version(),
            device_port: DEFAULT_PORT,
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_cache_ms: default_probe_cache_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            write_timeout_ms: default_write_timeout_ms(),
            dedupe_repeats: false,
            transport_command: String::new(),
            on_change_command: String::new(),
            events: mapping::default_entries(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The device endpoint fields do not form a usable endpoint.
    InvalidEndpoint(String),
    /// An `events` entry has a colour or speed that does not parse.
    InvalidEvent { event: String, reason: String },
    /// A timing field is zero (`field` names it).
    ZeroDuration { field: &'static str },
    /// `backoff_multiplier` is below 1 or not a number.
    InvalidMultiplier(f64),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidEndpoint(e) => write!(f, "Invalid device: {e}"),
            ValidationError::InvalidEvent { event, reason } => {
                write!(f, "Invalid events.{event}: {reason}")
            }
            ValidationError::ZeroDuration { field } => write!(f, "{field} must be greater than 0"),
            ValidationError::InvalidMultiplier(m) => {
                write!(f, "backoff_multiplier must be at least 1.0, got {m}")
            }
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        #[cfg(windows)]
        {
            dirs::config_dir().map(|p| p.join("EliteLight"))
        }
        #[cfg(not(windows))]
        {
            dirs::config_dir().map(|p| p.join("elitelight"))
        }
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Write the config to `path`, creating parent directories.
    ///
    /// The file is replaced atomically and starts with a header comment.
    pub fn save_to(&self, path: &Path) -> crate::error::Result<()> {
        let body = toml::to_string_pretty(self)
            .map_err(|e| crate::ElitelightError::Config(format!("cannot encode config: {e}")))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_replacing(path, &format!("{CONFIG_HEADER}{body}"))?;
        Ok(())
    }

    /// Read the config at `path`.
    ///
    /// Never fails: a missing file yields the defaults silently, an unreadable
    /// or malformed one yields the defaults plus a warning for the caller to
    /// report.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return (Self::default(), Vec::new()),
            Err(e) => {
                let warning = format!("cannot read {} ({e}), using defaults", path.display());
                return (Self::default(), vec![warning]);
            }
        };
        toml::from_str(&text).map_or_else(
            |e| {
                let warning = format!("config parse error in {}, using defaults: {e}", path.display());
                (Self::default(), vec![warning])
            },
            |config| (config, Vec::new()),
        )
    }

    /// [`Config::load_from`] on the platform config path.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => (Self::default(), Vec::new()),
        }
    }

    /// Copy for display: a set `local_key` is replaced by [`REDACTED_KEY`].
    /// Only [`Config::save_to`] ever sees the real key.
    pub fn redacted(&self) -> Self {
        let mut shown = self.clone();
        if !shown.local_key.is_empty() {
            shown.local_key = REDACTED_KEY.to_string();
        }
        shown
    }

    /// Build the device endpoint. Fails before any I/O if a field is bad.
    pub fn endpoint(&self) -> crate::error::Result<DeviceEndpoint> {
        DeviceEndpoint::new(
            &self.device_id,
            &self.device_host,
            &self.local_key,
            &self.protocol_version,
            self.device_port,
        )
    }

    pub fn event_mapping(&self) -> crate::error::Result<EventMapping> {
        EventMapping::from_entries(&self.events)
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            timeout: Duration::from_millis(self.probe_timeout_ms),
            cache_ttl: Duration::from_millis(self.probe_cache_ms),
            backoff: BackoffConfig {
                initial_delay: Duration::from_millis(self.backoff_initial_ms),
                max_delay: Duration::from_millis(self.backoff_max_ms),
                multiplier: self.backoff_multiplier,
            },
        }
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn control_settings(&self) -> ControlSettings {
        ControlSettings {
            probe: self.probe_config(),
            write_timeout: self.write_timeout(),
            dedupe_repeats: self.dedupe_repeats,
        }
    }

    /// Validate the entire config, collecting all errors.
    ///
    /// Returns `Ok(())` if valid, or `Err(Vec<ValidationError>)` with all problems found.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.endpoint() {
            let reason = match e {
                crate::ElitelightError::Config(msg) => msg,
                other => other.to_string(),
            };
            errors.push(ValidationError::InvalidEndpoint(reason));
        }

        let mut events: Vec<_> = self.events.iter().collect();
        events.sort_by(|a, b| a.0.cmp(b.0));
        for (event, entry) in events {
            if let Err(e) = entry.to_state() {
                errors.push(ValidationError::InvalidEvent {
                    event: event.clone(),
                    reason: e.to_string(),
                });
            }
        }

        for (field, value) in [
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("backoff_initial_ms", self.backoff_initial_ms),
            ("backoff_max_ms", self.backoff_max_ms),
            ("write_timeout_ms", self.write_timeout_ms),
        ] {
            if value == 0 {
                errors.push(ValidationError::ZeroDuration { field });
            }
        }

        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            errors.push(ValidationError::InvalidMultiplier(self.backoff_multiplier));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Write `contents` next to `path`, then rename over it.
fn write_replacing(path: &Path, contents: &str) -> io::Result<()> {
    let staging = path.with_extension("toml.tmp");
    fs::write(&staging, contents)?;
    if fs::rename(&staging, path).is_ok() {
        return Ok(());
    }
    // Some filesystems refuse the rename; fall back to a plain write.
    let direct = fs::write(path, contents);
    let _ = fs::remove_file(&staging);
    direct
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::led::{LedState, Rgb, Speed};

    fn configured() -> Config {
        Config {
            device_id: "bf0123456789abcdef".into(),
            device_host: "192.168.1.50".into(),
            local_key: "0123456789abcdef".into(),
            ..Config::default()
        }
    }

    // ── Config defaults ──

    #[test]
    fn redacted_hides_key_but_keeps_the_rest() {
        let c = configured();
        let shown = c.redacted();
        assert_eq!(shown.local_key, REDACTED_KEY);
        assert_eq!(shown.device_id, c.device_id);
        assert_eq!(c.local_key, "0123456789abcdef");
        let json = serde_json::to_string(&shown).unwrap();
        assert!(!json.contains("\"0123456789abcdef\""), "{json}");
    }

    #[test]
    fn redacted_leaves_unset_key_empty() {
        assert_eq!(Config::default().redacted().local_key, "");
    }

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.protocol_version, "3.3");
        assert_eq!(c.device_port, 6668);
        assert_eq!(c.probe_timeout_ms, 300);
        assert_eq!(c.write_timeout_ms, 2000);
        assert!(!c.dedupe_repeats);
        assert_eq!(c.events.len(), 9);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = "device_host = \"10.0.0.7\"";
        let c: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(c.device_host, "10.0.0.7");
        // Missing fields get defaults
        assert_eq!(c.protocol_version, "3.3");
        assert_eq!(c.backoff_max_ms, 30_000);
        assert!(c.events.contains_key("Docked"));
    }

    #[test]
    fn events_section_replaces_defaults() {
        let toml_str = r##"
[events.Docked]
color = "green"

[events.UnderAttack]
color = "orange_alert"
speed = "slow"
"##;
        let c: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(c.events.len(), 2);
        let m = c.event_mapping().unwrap();
        assert_eq!(
            m.get("Docked"),
            Some(LedState::SolidColor(Rgb::new(0, 255, 0)))
        );
        assert!(m.get("StartJump").is_none());
        assert_eq!(c.events["UnderAttack"].speed, Some(Speed::Slow));
    }

    #[test]
    fn wrong_type_toml_is_error() {
        let result: std::result::Result<Config, _> = toml::from_str("device_port = \"high\"");
        assert!(result.is_err());
    }

    #[test]
    fn config_path_ends_with_toml() {
        let Some(path) = Config::path() else {
            return; // no home directory in this environment
        };
        assert_eq!(path.file_name().unwrap(), "config.toml");
    }

    // ── Runtime types ──

    #[test]
    fn endpoint_from_config() {
        let ep = configured().endpoint().unwrap();
        assert_eq!(ep.host(), "192.168.1.50");
        assert_eq!(ep.port(), 6668);
        assert_eq!(ep.protocol_version(), "3.3");
    }

    #[test]
    fn control_settings_from_config() {
        let c = Config {
            probe_timeout_ms: 150,
            backoff_initial_ms: 500,
            backoff_multiplier: 3.0,
            write_timeout_ms: 1500,
            dedupe_repeats: true,
            ..configured()
        };
        let s = c.control_settings();
        assert_eq!(s.probe.timeout, Duration::from_millis(150));
        assert_eq!(s.probe.cache_ttl, Duration::from_secs(5));
        assert_eq!(s.probe.backoff.initial_delay, Duration::from_millis(500));
        assert_eq!(s.probe.backoff.multiplier, 3.0);
        assert_eq!(s.write_timeout, Duration::from_millis(1500));
        assert!(s.dedupe_repeats);
    }

    // ── Validation ──

    #[test]
    fn validate_configured_ok() {
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn validate_default_reports_missing_device() {
        let errors = Config::default().validate().unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidEndpoint(_)));
    }

    #[test]
    fn validate_bad_protocol_version() {
        let c = Config {
            protocol_version: "three".into(),
            ..configured()
        };
        let errors = c.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("protocol"), "{}", errors[0]);
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut c = Config {
            probe_timeout_ms: 0,
            write_timeout_ms: 0,
            backoff_multiplier: 0.5,
            ..configured()
        };
        c.events
            .insert("Docked".into(), EventEntry::new("ultraviolet", None));
        let errors = c.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ZeroDuration {
            field: "probe_timeout_ms"
        }));
        assert!(errors.contains(&ValidationError::ZeroDuration {
            field: "write_timeout_ms"
        }));
        assert!(errors.contains(&ValidationError::InvalidMultiplier(0.5)));
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::InvalidEvent { event, .. } if event == "Docked"))
        );
    }

    #[test]
    fn validate_nan_multiplier() {
        let c = Config {
            backoff_multiplier: f64::NAN,
            ..configured()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn validation_error_display() {
        assert_eq!(
            ValidationError::ZeroDuration {
                field: "write_timeout_ms"
            }
            .to_string(),
            "write_timeout_ms must be greater than 0"
        );
        assert_eq!(
            ValidationError::InvalidEvent {
                event: "Docked".into(),
                reason: "bad".into()
            }
            .to_string(),
            "Invalid events.Docked: bad"
        );
    }

    #[test]
    fn load_ignores_header_comment() {
        let toml_str = r##"# EliteLight configuration — changes made outside the app may be overwritten.

device_id = "abc"
device_host = "10.0.0.2"
local_key = "k"
"##;
        let c: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(c.device_id, "abc");
        assert_eq!(c.device_host, "10.0.0.2");
    }

    // ── save_to / load_from ──

    #[test]
    fn save_to_load_from_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config {
            device_port: 7000,
            backoff_multiplier: 1.5,
            dedupe_repeats: true,
            transport_command: "python3 bridge.py".into(),
            on_change_command: "echo changed".into(),
            ..configured()
        };
        config.events.insert(
            "Interdicted".into(),
            EventEntry::new("orange_alert", Some(Speed::Fast)),
        );
        config.save_to(&path).unwrap();

        let (loaded, warnings) = Config::load_from(&path);
        assert!(warnings.is_empty());
        assert_eq!(loaded, config);
    }

    #[test]
    fn saved_file_has_header_and_no_staging_leftover() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        configured().save_to(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(CONFIG_HEADER), "header missing:\n{text}");
        assert!(text.contains("[events.UnderAttack]"));
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn missing_file_is_silent_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warnings) = Config::load_from(&dir.path().join("absent.toml"));
        assert!(warnings.is_empty());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn malformed_file_warns_and_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "device_port = \"not a number\"\n").unwrap();

        let (config, warnings) = Config::load_from(&path);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("config parse error"), "{}", warnings[0]);
        assert_eq!(config.device_port, 6668);
    }

    #[test]
    fn unreadable_path_warns() {
        // A directory cannot be read as a file.
        let dir = tempfile::tempdir().unwrap();
        let (config, warnings) = Config::load_from(dir.path());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("cannot read"), "{}", warnings[0]);
        assert_eq!(config, Config::default());
    }
}
