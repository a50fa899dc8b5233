//! Process configuration.
//!
//! The configuration is a JSON document with a `chords` section (where and
//! as whom to deliver), an `airq` section (sensor bus layout and cadence) and
//! optional `delivery` and `status` sections. It is loaded once at startup
//! and passed by reference to the components that need it.

use crate::chords::{ApiCredentials, DeliveryMetadata, FieldRenameTable};
use crate::delivery::RetryPolicy;
use crate::error::{AirqError, Result};
use crate::web::StatusConfig;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration used when no document is given on the command line.
pub const DEFAULT_CONFIG: &str = r#"
{
    "chords": {
        "skey":    "secret_key",
        "host":    "chords_host.com",
        "enabled": true,
        "inst_id": "1",
        "test":    false
    },
    "airq": {
        "ccs811_i2c": 91,
        "bme280_i2c": 119,
        "tmp117_i2c": 72,
        "ccs811_n_samples": 60,
        "report_interval": 60
    }
}
"#;

/// Longest accepted delivery expiry (one year).
pub const MAX_EXPIRY_MINUTES: u64 = 366 * 24 * 60;

/// Longest accepted collection interval, retry delay or request timeout (one day).
pub const MAX_WAIT_SECS: u64 = 24 * 60 * 60;

/// Complete process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chords: ChordsConfig,
    pub airq: AirqConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub status: Option<StatusConfig>,
}

/// Remote portal identity and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChordsConfig {
    /// Portal host, optionally with scheme
    pub host: String,
    /// Instrument id on the portal
    #[serde(deserialize_with = "string_or_number")]
    pub inst_id: String,
    /// Mark submissions as test data
    pub test: bool,
    /// When false, readings are still collected and printed but not delivered
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Sensor cluster layout and collection cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirqConfig {
    pub ccs811_i2c: u16,
    pub bme280_i2c: u16,
    pub tmp117_i2c: u16,
    pub ccs811_n_samples: u32,
    /// Pause between consecutive CCS811 samples; the sensor updates once a second
    #[serde(default = "default_sample_period_ms")]
    pub ccs811_sample_period_ms: u64,
    /// Seconds between collection cycles
    #[serde(alias = "chords_report_interval")]
    pub report_interval: u64,
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u32,
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
    #[serde(default = "default_wireless_interface")]
    pub wireless_interface: String,
    /// Replaces the built-in reading-to-wire field table when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_map: Option<BTreeMap<String, String>>,
}

/// Delivery queue tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Minutes a submission may stay undelivered before it is dropped
    pub expiry_minutes: u64,
    pub retry_initial_secs: u64,
    pub retry_max_secs: u64,
    pub request_timeout_secs: u64,
    pub max_backlog: usize,
}

impl Default for AirqConfig {
    fn default() -> Self {
        Self {
            ccs811_i2c: 0x5b,
            bme280_i2c: 0x77,
            tmp117_i2c: 0x48,
            ccs811_n_samples: 60,
            ccs811_sample_period_ms: default_sample_period_ms(),
            report_interval: crate::DEFAULT_REPORT_INTERVAL_SECS,
            i2c_bus: default_i2c_bus(),
            sysfs_root: default_sysfs_root(),
            wireless_interface: default_wireless_interface(),
            field_map: None,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            expiry_minutes: crate::DEFAULT_EXPIRY_MINUTES,
            retry_initial_secs: 5,
            retry_max_secs: 60,
            request_timeout_secs: 30,
            max_backlog: crate::DEFAULT_EXPIRY_MINUTES as usize,
        }
    }
}

impl Config {
    /// The built-in configuration.
    pub fn builtin() -> Result<Self> {
        Self::from_json(DEFAULT_CONFIG)
    }

    /// Parse and validate a configuration document.
    pub fn from_json(document: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|e| {
            AirqError::config_error(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&document)
    }

    /// Check the settings that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.chords.host.trim().is_empty() {
            return Err(AirqError::config_error("chords.host is empty"));
        }
        if self.chords.inst_id.trim().is_empty() {
            return Err(AirqError::config_error("chords.inst_id is empty"));
        }
        if self.chords.api_email.is_some() != self.chords.api_key.is_some() {
            tracing::warn!("only one of chords.api_email/api_key is set; API credentials will not be sent");
        }
        if self.airq.report_interval == 0 || self.airq.report_interval > MAX_WAIT_SECS {
            return Err(AirqError::config_error(format!(
                "airq.report_interval must be between 1 and {} seconds",
                MAX_WAIT_SECS
            )));
        }
        if self.airq.ccs811_n_samples == 0 {
            return Err(AirqError::config_error("airq.ccs811_n_samples must be positive"));
        }
        let sampling_ms = u64::from(self.airq.ccs811_n_samples - 1)
            .saturating_mul(self.airq.ccs811_sample_period_ms);
        if sampling_ms >= self.airq.report_interval.saturating_mul(1000) {
            return Err(AirqError::config_error(
                "airq: ccs811_n_samples spaced by ccs811_sample_period_ms must fit within report_interval",
            ));
        }

        let delivery = &self.delivery;
        if delivery.expiry_minutes == 0 || delivery.expiry_minutes > MAX_EXPIRY_MINUTES {
            return Err(AirqError::config_error(format!(
                "delivery.expiry_minutes must be between 1 and {}",
                MAX_EXPIRY_MINUTES
            )));
        }
        if delivery.retry_initial_secs == 0
            || delivery.retry_max_secs < delivery.retry_initial_secs
            || delivery.retry_max_secs > MAX_WAIT_SECS
        {
            return Err(AirqError::config_error(format!(
                "delivery retry interval must satisfy 0 < retry_initial_secs <= retry_max_secs <= {}",
                MAX_WAIT_SECS
            )));
        }
        if delivery.request_timeout_secs == 0 || delivery.request_timeout_secs > MAX_WAIT_SECS {
            return Err(AirqError::config_error(format!(
                "delivery.request_timeout_secs must be between 1 and {}",
                MAX_WAIT_SECS
            )));
        }
        if delivery.max_backlog == 0 {
            return Err(AirqError::config_error("delivery.max_backlog must be positive"));
        }

        self.rename_table()?;
        Ok(())
    }

    /// The reading-to-wire field table in effect.
    pub fn rename_table(&self) -> Result<FieldRenameTable> {
        match &self.airq.field_map {
            Some(map) => FieldRenameTable::new(map.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            None => Ok(crate::chords::DEFAULT_RENAME_TABLE.clone()),
        }
    }

    /// Top-level metadata attached to every wire record.
    pub fn metadata(&self) -> DeliveryMetadata {
        let chords = &self.chords;
        let api = match (&chords.api_email, &chords.api_key) {
            (Some(email), Some(key)) => Some(ApiCredentials {
                email: email.clone(),
                key: key.clone(),
            }),
            _ => None,
        };
        DeliveryMetadata {
            inst_id: chords.inst_id.clone(),
            test: chords.test,
            skey: chords.skey.clone(),
            api,
        }
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.airq.report_interval)
    }

    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.delivery.expiry_minutes.saturating_mul(60))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_secs(self.delivery.retry_initial_secs),
            max_backoff: Duration::from_secs(self.delivery.retry_max_secs),
            request_timeout: Duration::from_secs(self.delivery.request_timeout_secs),
            max_backlog: self.delivery.max_backlog,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sample_period_ms() -> u64 {
    1000
}

fn default_i2c_bus() -> u32 {
    1
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys/bus/i2c/devices")
}

fn default_wireless_interface() -> String {
    "wlan0".to_string()
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}
