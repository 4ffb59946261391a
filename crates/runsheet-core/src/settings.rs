//! TOML settings for workers and producers.
//!
//! ```toml
//! [table]
//! path = "runs.csv"
//! comma_decimal = false
//!
//! [claim]
//! settle_interval_ms = 2000
//! retry_budget = 3
//!
//! [worker]
//! highlight = true
//! poll_interval_ms = 30000
//! ```
//!
//! Every field is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::claim::ClaimPolicy;
use crate::domain::DecimalFormat;

pub const DEFAULT_TABLE_PATH: &str = "runs.csv";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read settings file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunsheetSettings {
    pub table: TableSettings,
    pub claim: ClaimSettings,
    pub worker: WorkerSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableSettings {
    pub path: PathBuf,
    /// Cells use `,` as the decimal separator.
    pub comma_decimal: bool,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_TABLE_PATH),
            comma_decimal: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClaimSettings {
    pub settle_interval_ms: u64,
    pub retry_budget: u32,
}

impl Default for ClaimSettings {
    fn default() -> Self {
        let policy = ClaimPolicy::default();
        Self {
            settle_interval_ms: policy.settle_interval.as_millis() as u64,
            retry_budget: policy.retry_budget,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerSettings {
    pub highlight: bool,
    /// How often a running worker reconciles its config.
    pub poll_interval_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            highlight: true,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl RunsheetSettings {
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn claim_policy(&self) -> ClaimPolicy {
        ClaimPolicy::new(
            Duration::from_millis(self.claim.settle_interval_ms),
            self.claim.retry_budget,
        )
    }

    pub fn decimal_format(&self) -> DecimalFormat {
        DecimalFormat::from_comma_flag(self.table.comma_decimal)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker.poll_interval_ms)
    }
}
