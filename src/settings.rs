//! Run configuration: a TOML file plus `METPREP_` environment overrides.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::archive::RetryPolicy;
use crate::error::{ProcessingError, Result};
use crate::models::{DataFormat, DatasetKind, SiteCharacteristics, StationRequest};
use crate::processors::CorrectionConfig;
use crate::utils::constants::{
    DEFAULT_AREA_BUFFER, DEFAULT_CALM_THRESHOLD, DEFAULT_DATA_DIR, DEFAULT_INITIAL_BACKOFF_SECS,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_SECS, DEFAULT_MAX_CONCURRENT_REQUESTS,
    DEFAULT_MAX_REJECTED_FRACTION, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
};

const ENV_PREFIX: &str = "METPREP";

/// One `[[stations]]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub elevation: f64,
    pub start_year: i32,
    pub end_year: Option<i32>,
    #[serde(default = "all_kinds")]
    pub datasets: Vec<DatasetKind>,
    pub ua_id: Option<String>,
    pub surf_id: Option<String>,
    pub site: Option<SiteCharacteristics>,
    #[serde(default = "default_area_buffer")]
    pub area_buffer: f64,
}

fn all_kinds() -> Vec<DatasetKind> {
    DatasetKind::ALL.to_vec()
}

fn default_area_buffer() -> f64 {
    DEFAULT_AREA_BUFFER
}

impl StationConfig {
    pub fn to_request(&self) -> Result<StationRequest> {
        let mut builder = StationRequest::builder(self.id.clone())
            .coordinates(self.latitude, self.longitude)
            .elevation(self.elevation)
            .years(self.start_year, self.end_year.unwrap_or(self.start_year))
            .kinds(self.datasets.clone())
            .area_buffer(self.area_buffer);
        if let Some(id) = &self.ua_id {
            builder = builder.ua_id(id.clone());
        }
        if let Some(id) = &self.surf_id {
            builder = builder.surf_id(id.clone());
        }
        if let Some(site) = self.site {
            builder = builder.site(site);
        }
        builder.build()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_backoff"))]
pub struct RetrievalSettings {
    #[validate(range(min = 1, max = 64))]
    pub max_concurrent_requests: usize,

    #[validate(range(min = 1, max = 20))]
    pub max_attempts: u32,

    pub initial_backoff_secs: u64,

    pub max_backoff_secs: u64,

    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    /// Seconds between job status checks
    #[validate(range(min = 1, max = 600))]
    pub poll_interval_secs: u64,

    pub format: DataFormat,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_secs: DEFAULT_INITIAL_BACKOFF_SECS,
            max_backoff_secs: DEFAULT_MAX_BACKOFF_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            format: DataFormat::default(),
        }
    }
}

fn validate_backoff(settings: &RetrievalSettings) -> std::result::Result<(), ValidationError> {
    if settings.initial_backoff_secs > settings.max_backoff_secs {
        return Err(ValidationError::new("initial_backoff_exceeds_max"));
    }
    Ok(())
}

impl RetrievalSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_secs(self.initial_backoff_secs),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ProcessingSettings {
    /// Rayon pool size; CPU count when unset
    #[validate(range(min = 1, max = 512))]
    pub max_workers: Option<usize>,

    #[validate(range(min = 0.0, max = 5.0))]
    pub calm_threshold: f64,

    #[validate(range(min = 0.0, max = 1.0))]
    pub max_rejected_fraction: f64,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            max_workers: None,
            calm_threshold: DEFAULT_CALM_THRESHOLD,
            max_rejected_fraction: DEFAULT_MAX_REJECTED_FRACTION,
        }
    }
}

impl ProcessingSettings {
    pub fn workers(&self) -> usize {
        self.max_workers.unwrap_or_else(num_cpus::get)
    }

    pub fn correction_config(&self) -> CorrectionConfig {
        CorrectionConfig {
            calm_threshold: self.calm_threshold,
            max_rejected_fraction: self.max_rejected_fraction,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CdsSettings {
    pub url: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Settings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub stations: Vec<StationConfig>,

    #[serde(default)]
    #[validate(nested)]
    pub retrieval: RetrievalSettings,

    #[serde(default)]
    #[validate(nested)]
    pub processing: ProcessingSettings,

    #[serde(default)]
    pub cds: CdsSettings,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            stations: Vec::new(),
            retrieval: RetrievalSettings::default(),
            processing: ProcessingSettings::default(),
            cds: CdsSettings::default(),
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Settings {
    /// Load `path` (optional unless `required`) with environment overrides
    /// on top, then validate.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        if required && !path.exists() {
            return Err(ProcessingError::Config(format!(
                "config file {} not found",
                path.display()
            )));
        }

        let settings: Settings = Config::builder()
            .add_source(File::from(path).required(required))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        settings.check_format()?;
        Ok(settings)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        settings.check_format()?;
        Ok(settings)
    }

    /// Refuse a format this build cannot decode before anything is downloaded
    fn check_format(&self) -> Result<()> {
        let format = self.retrieval.format;
        if format.is_decodable() {
            return Ok(());
        }
        Err(ProcessingError::Config(format!(
            "retrieval.format = {} needs a build with the `{}` feature",
            format.as_str(),
            format.as_str()
        )))
    }

    /// Validated station requests, rejecting duplicate ids
    pub fn station_requests(&self) -> Result<Vec<StationRequest>> {
        if self.stations.is_empty() {
            return Err(ProcessingError::Config(
                "no [[stations]] declared".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        self.stations
            .iter()
            .map(|station| {
                if !seen.insert(station.id.as_str()) {
                    return Err(ProcessingError::Config(format!(
                        "station '{}' declared twice",
                        station.id
                    )));
                }
                station.to_request()
            })
            .collect()
    }
}
