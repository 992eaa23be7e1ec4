//! Configuration for the Privacy Origin agent.

use crate::core::coalescer::CoalescingConfig;
use crate::core::report::TipThresholds;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for persisted state and the transparency log
    pub data_path: PathBuf,

    /// Per-category event log capacity
    pub log_capacity: usize,

    /// Quiet period before a burst of form input is reported
    pub form_input_debounce_ms: i64,

    /// Reads reported per canvas element before suppression
    pub canvas_report_limit: u32,

    /// Font checks per page before enumeration is reported
    pub font_check_threshold: u32,

    /// Trackers listed in the global report
    pub report_list_limit: usize,

    /// Third-party cookie tip fires above this count
    pub third_party_cookie_tip_threshold: usize,

    /// High-volume tip fires above this many third-party requests
    pub third_party_request_tip_threshold: usize,

    /// How often dirty state is written back
    #[serde(with = "duration_serde")]
    pub persist_interval: Duration,

    /// IANA time zone for histogram labels
    pub timezone: String,

    /// Inbound messages buffered before producers see `QueueFull`
    pub ingest_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("privacy-origin");
        let coalescing = CoalescingConfig::default();
        let tips = TipThresholds::default();

        Self {
            data_path: data_dir,
            log_capacity: crate::core::DEFAULT_LOG_CAPACITY,
            form_input_debounce_ms: coalescing.form_input_debounce_ms,
            canvas_report_limit: coalescing.canvas_report_limit,
            font_check_threshold: coalescing.font_check_threshold,
            report_list_limit: 20,
            third_party_cookie_tip_threshold: tips.third_party_cookies,
            third_party_request_tip_threshold: tips.third_party_requests,
            persist_interval: Duration::from_secs(1),
            timezone: "UTC".to_string(),
            ingest_queue_capacity: 10_000,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("privacy-origin")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(self.state_dir())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Directory holding one JSON file per persisted key.
    pub fn state_dir(&self) -> PathBuf {
        self.data_path.join("state")
    }

    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency.json")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tz()?;
        if self.log_capacity == 0 {
            return Err(ConfigError::Invalid("log_capacity must be at least 1".to_string()));
        }
        if self.form_input_debounce_ms < 0 {
            return Err(ConfigError::Invalid(
                "form_input_debounce_ms must not be negative".to_string(),
            ));
        }
        if self.ingest_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "ingest_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured time zone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))
    }

    pub fn coalescing(&self) -> CoalescingConfig {
        CoalescingConfig {
            form_input_debounce_ms: self.form_input_debounce_ms,
            canvas_report_limit: self.canvas_report_limit,
            font_check_threshold: self.font_check_threshold,
        }
    }

    pub fn tip_thresholds(&self) -> TipThresholds {
        TipThresholds {
            third_party_cookies: self.third_party_cookie_tip_threshold,
            third_party_requests: self.third_party_request_tip_threshold,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    UnknownTimezone(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::UnknownTimezone(tz) => write!(f, "Unknown time zone: {tz}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
