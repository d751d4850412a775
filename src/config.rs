//! `caravan.toml` loading.
//!
//! ```toml
//! [settings]
//! output_dir = "caravan_maribyrnong"
//! region = "ausvic"
//!
//! [[gauges]]
//! gauge_id = "ausvic_230200"
//! ...
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::gauges::{self, GaugeLocation};
use crate::model::PipelineError;

/// Environment variable naming the config file; read after `.env` is loaded.
pub const CONFIG_ENV_VAR: &str = "CARAVAN_CONFIG";

/// Config file used when neither `--config` nor `CARAVAN_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "caravan.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaravanConfig {
    #[serde(default)]
    pub settings: Settings,

    /// Gauge registry.
    #[serde(default)]
    pub gauges: Vec<GaugeLocation>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Root of the Caravan-format output tree.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Region prefix used in directory and attribute file names.
    #[serde(default = "default_region")]
    pub region: String,
    /// First year of ERA5-Land data requested.
    #[serde(default = "default_era5_start_year")]
    pub era5_start_year: i32,
    /// Last year of ERA5-Land data requested; the current year if unset.
    #[serde(default)]
    pub era5_end_year: Option<i32>,
    /// Directory holding `<gauge_id>_<year>.json` hourly exports.
    #[serde(default = "default_era5_dir")]
    pub era5_dir: PathBuf,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Attempts per streamflow request.
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_wait_secs")]
    pub retry_wait_secs: u64,
    /// Climate indices are computed over this period.
    #[serde(default = "default_caravan_start")]
    pub caravan_start: NaiveDate,
    #[serde(default = "default_caravan_end")]
    pub caravan_end: NaiveDate,
    /// Gauge metadata fields shared by every gauge in the region.
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_basin_name")]
    pub basin_name: String,
    #[serde(default = "default_license")]
    pub license: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("caravan_output")
}
fn default_region() -> String {
    "ausvic".to_string()
}
fn default_era5_start_year() -> i32 {
    1981
}
fn default_era5_dir() -> PathBuf {
    PathBuf::from("era5land")
}
fn default_http_timeout_secs() -> u64 {
    60
}
fn default_retries() -> u32 {
    3
}
fn default_retry_wait_secs() -> u64 {
    2
}
fn default_caravan_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(1981, 1, 1).unwrap_or_default()
}
fn default_caravan_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 12, 31).unwrap_or_default()
}
fn default_country() -> String {
    "AUS".to_string()
}
fn default_basin_name() -> String {
    "Maribyrnong".to_string()
}
fn default_license() -> String {
    "Creative Commons Attribution 4.0".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            region: default_region(),
            era5_start_year: default_era5_start_year(),
            era5_end_year: None,
            era5_dir: default_era5_dir(),
            http_timeout_secs: default_http_timeout_secs(),
            retries: default_retries(),
            retry_wait_secs: default_retry_wait_secs(),
            caravan_start: default_caravan_start(),
            caravan_end: default_caravan_end(),
            country: default_country(),
            basin_name: default_basin_name(),
            license: default_license(),
        }
    }
}

impl Settings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_secs(self.retry_wait_secs)
    }

    /// `<output_dir>/timeseries/csv/<region>`
    pub fn timeseries_dir(&self) -> PathBuf {
        self.output_dir.join("timeseries").join("csv").join(&self.region)
    }

    /// `<output_dir>/attributes/<region>`
    pub fn attributes_dir(&self) -> PathBuf {
        self.output_dir.join("attributes").join(&self.region)
    }

    /// Daily table for one gauge.
    pub fn timeseries_path(&self, gauge_id: &str) -> PathBuf {
        self.timeseries_dir().join(format!("{}.csv", gauge_id))
    }

    /// Gauge metadata table, `attributes_other_<region>.csv`.
    pub fn attributes_other_path(&self) -> PathBuf {
        self.attributes_dir()
            .join(format!("attributes_other_{}.csv", self.region))
    }

    /// Climate index table, `attributes_caravan_<region>.csv`.
    pub fn attributes_caravan_path(&self) -> PathBuf {
        self.attributes_dir()
            .join(format!("attributes_caravan_{}.csv", self.region))
    }
}

impl CaravanConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, PipelineError> {
        let config: CaravanConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        let s = &self.settings;
        if s.region.is_empty() {
            return Err(PipelineError::Config("settings.region must not be empty".to_string()));
        }
        if s.retries == 0 {
            return Err(PipelineError::Config("settings.retries must be at least 1".to_string()));
        }
        if s.caravan_end < s.caravan_start {
            return Err(PipelineError::Config(format!(
                "caravan_end {} precedes caravan_start {}",
                s.caravan_end, s.caravan_start
            )));
        }
        if let Some(end) = s.era5_end_year {
            if end < s.era5_start_year {
                return Err(PipelineError::Config(format!(
                    "era5_end_year {} precedes era5_start_year {}",
                    end, s.era5_start_year
                )));
            }
        }
        gauges::validate_gauges(&self.gauges)
    }
}

/// Resolves the config path: an explicit path wins, then `CARAVAN_CONFIG`
/// (after loading `.env`), then `caravan.toml` in the working directory.
pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    dotenv::dotenv().ok();
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}
