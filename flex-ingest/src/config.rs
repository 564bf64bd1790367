use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use time::macros::date;

use crate::sources::DateRange;

pub const CONFIG_ENV: &str = "FLEX_INGEST_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "flex-ingest.toml";

/// Largest page either upstream API accepts.
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} is not set; it must hold the UKPN API key")]
    MissingApiKey(String),
    #[error("http.page_size must be between 1 and 100, got {0}")]
    InvalidPageSize(usize),
    #[error("ukpn.date_ranges: range {0} is empty, start must be before end")]
    EmptyRange(DateRange),
    #[error("ukpn.date_ranges: {0} overlaps {1}")]
    OverlappingRanges(DateRange, DateRange),
    #[error("ukpn.offset_ceiling {ceiling} is smaller than http.page_size {page_size}")]
    CeilingBelowPageSize { ceiling: usize, page_size: usize },
}

/// What to do when a source's output table already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefetchPolicy {
    Always,
    Never,
    #[default]
    IfMissing,
}

impl RefetchPolicy {
    pub fn should_fetch(self, output_exists: bool) -> bool {
        match self {
            RefetchPolicy::Always => true,
            RefetchPolicy::Never => false,
            RefetchPolicy::IfMissing => !output_exists,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub request_delay_ms: u64,
    pub page_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            request_delay_ms: 100,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UkpnConfig {
    pub enabled: bool,
    pub base_url: String,
    pub dataset_id: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Deepest offset the API serves; `None` disables the cap.
    pub offset_ceiling: Option<usize>,
    pub date_field: String,
    /// Fetched one at a time; leave empty for a single unfiltered fetch.
    pub date_ranges: Vec<DateRange>,
    pub output_path: String,
}

impl Default for UkpnConfig {
    fn default() -> Self {
        let bounds = [
            date!(2023 - 01 - 01),
            date!(2024 - 01 - 01),
            date!(2024 - 07 - 01),
            date!(2025 - 01 - 01),
            date!(2025 - 07 - 01),
            date!(2026 - 01 - 01),
            date!(2026 - 07 - 01),
            date!(2027 - 01 - 01),
        ];
        Self {
            enabled: true,
            base_url: "https://ukpowernetworks.opendatasoft.com/api/v2/catalog/datasets".to_string(),
            dataset_id: "ukpn-flexibility-dispatches".to_string(),
            api_key_env: "UKPN_API_KEY".to_string(),
            offset_ceiling: Some(10_000),
            date_field: "start_time_local".to_string(),
            date_ranges: bounds.windows(2).map(|w| DateRange::new(w[0], w[1])).collect(),
            output_path: "ukpn_flexibility_dispatches.csv".to_string(),
        }
    }
}

impl UkpnConfig {
    pub fn records_url(&self) -> String {
        self.dataset_records_url(&self.dataset_id)
    }

    /// Records endpoint of another dataset in the same catalog.
    pub fn dataset_records_url(&self, dataset_id: &str) -> String {
        format!(
            "{}/{}/records",
            self.base_url.trim_end_matches('/'),
            dataset_id
        )
    }

    pub fn api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey(self.api_key_env.clone()))
    }
}

/// Distinct tender zones, fetched from the same catalog with the `[ukpn]`
/// base URL, API key and offset ceiling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UkpnTendersConfig {
    pub enabled: bool,
    pub dataset_id: String,
    pub output_path: String,
}

impl Default for UkpnTendersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dataset_id: "ukpn-flexibility-tender-data".to_string(),
            output_path: "ukpn_flexibility_tenders.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GopacsConfig {
    pub enabled: bool,
    pub base_url: String,
    pub output_path: String,
}

impl Default for GopacsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://public-reporting.gopacs-services.eu/clearedbuckets".to_string(),
            output_path: "gopacs_cleared_buckets.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub refetch: RefetchPolicy,
    pub http: HttpConfig,
    pub ukpn: UkpnConfig,
    pub ukpn_tenders: UkpnTendersConfig,
    pub gopacs: GopacsConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    /// Load from `$FLEX_INGEST_CONFIG`, or from `flex-ingest.toml` when that
    /// variable is unset. A missing default file means built-in defaults; a
    /// missing explicitly named file is an error.
    pub fn load() -> anyhow::Result<Self> {
        let cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_path(&path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_path(DEFAULT_CONFIG_PATH)?
            }
            Err(_) => {
                tracing::info!("no {DEFAULT_CONFIG_PATH} found, using built-in defaults");
                Self::default()
            }
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    /// Structural checks. The API key is resolved separately, since only the
    /// UKPN pipeline needs it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let page_size = self.http.page_size;
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::InvalidPageSize(page_size));
        }

        if let Some(ceiling) = self.ukpn.offset_ceiling {
            if ceiling < page_size {
                return Err(ConfigError::CeilingBelowPageSize { ceiling, page_size });
            }
        }

        let mut ranges = self.ukpn.date_ranges.clone();
        if let Some(r) = ranges.iter().find(|r| r.start >= r.end) {
            return Err(ConfigError::EmptyRange(*r));
        }
        ranges.sort_by_key(|r| r.start);
        for pair in ranges.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(ConfigError::OverlappingRanges(pair[0], pair[1]));
            }
        }

        Ok(())
    }
}
