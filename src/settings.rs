use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::sequencer::DEFAULT_INTER_TEST_DELAY;
use crate::serial::interface::{
    DEFAULT_LINE_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_RESPONSE_LEN, DEFAULT_RESPONSE_TIMEOUT,
};
use crate::serial::{TransportOptions, DEFAULT_BAUD_RATE};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed settings file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Bench station settings, loaded from JSON with every field optional
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchSettings {
    pub port_name: Option<String>,
    pub baud_rate: u32,
    pub line_timeout_secs: u64,
    pub response_timeout_secs: u64,
    pub expected_response_len: usize,
    pub poll_interval_ms: u64,
    pub inter_test_delay_ms: u64,
    pub log_level: String,
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self {
            port_name: None,
            baud_rate: DEFAULT_BAUD_RATE,
            line_timeout_secs: DEFAULT_LINE_TIMEOUT.as_secs(),
            response_timeout_secs: DEFAULT_RESPONSE_TIMEOUT.as_secs(),
            expected_response_len: DEFAULT_RESPONSE_LEN,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            inter_test_delay_ms: DEFAULT_INTER_TEST_DELAY.as_millis() as u64,
            log_level: "info".to_string(),
        }
    }
}

impl BenchSettings {
    /// Read and validate settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let settings: BenchSettings = serde_json::from_str(&content)?;
        settings.validate()?;

        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(SettingsError::Invalid {
                field: "baud_rate",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(SettingsError::Invalid {
                field: "poll_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.expected_response_len == 0 {
            return Err(SettingsError::Invalid {
                field: "expected_response_len",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.response_timeout_secs == 0 {
            return Err(SettingsError::Invalid {
                field: "response_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn line_timeout(&self) -> Duration {
        Duration::from_secs(self.line_timeout_secs)
    }

    pub fn inter_test_delay(&self) -> Duration {
        Duration::from_millis(self.inter_test_delay_ms)
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            expected_response_len: self.expected_response_len,
            response_timeout: Duration::from_secs(self.response_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}
