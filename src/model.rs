//! Core data types for the Caravan forcing pipeline.
//!
//! This module defines the shared domain model imported by all other modules:
//! the ERA5-Land band catalogue, hourly and daily records, the streamflow
//! series and the crate error type. It contains no I/O.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};

// ---------------------------------------------------------------------------
// ERA5-Land bands
// ---------------------------------------------------------------------------

/// Number of ERA5-Land bands carried by every hourly record.
pub const VARIABLE_COUNT: usize = 14;

/// Number of bands reported as daily mean/min/max.
pub const DAILY_STAT_COUNT: usize = 12;

/// Numeric fields of a daily record: three per stats band plus three sums.
pub const DAILY_VALUE_COUNT: usize = DAILY_STAT_COUNT * 3 + 3;

/// Output column for the ERA5-Land potential evaporation daily total.
pub const PET_ERA5_LAND_COLUMN: &str = "potential_evaporation_sum_ERA5_LAND";

/// Output column for the FAO-56 Penman-Monteith reference ET.
pub const PET_FAO_PM_COLUMN: &str = "potential_evaporation_sum_FAO_PENMAN_MONTEITH";

/// Output column for the daily precipitation total.
pub const PRECIPITATION_SUM_COLUMN: &str = "total_precipitation_sum";

/// One ERA5-Land hourly band, named as in `ECMWF/ERA5_LAND/HOURLY`.
///
/// The first ten are instantaneous state variables; the last four are
/// accumulated since 00 UTC and must be de-accumulated before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variable {
    Temperature2m,
    DewpointTemperature2m,
    SurfacePressure,
    UComponentOfWind10m,
    VComponentOfWind10m,
    SnowDepthWaterEquivalent,
    VolumetricSoilWaterLayer1,
    VolumetricSoilWaterLayer2,
    VolumetricSoilWaterLayer3,
    VolumetricSoilWaterLayer4,
    TotalPrecipitation,
    SurfaceNetSolarRadiation,
    SurfaceNetThermalRadiation,
    PotentialEvaporation,
}

impl Variable {
    /// All bands, in column order of an hourly record.
    pub const ALL: [Variable; VARIABLE_COUNT] = [
        Variable::Temperature2m,
        Variable::DewpointTemperature2m,
        Variable::SurfacePressure,
        Variable::UComponentOfWind10m,
        Variable::VComponentOfWind10m,
        Variable::SnowDepthWaterEquivalent,
        Variable::VolumetricSoilWaterLayer1,
        Variable::VolumetricSoilWaterLayer2,
        Variable::VolumetricSoilWaterLayer3,
        Variable::VolumetricSoilWaterLayer4,
        Variable::TotalPrecipitation,
        Variable::SurfaceNetSolarRadiation,
        Variable::SurfaceNetThermalRadiation,
        Variable::PotentialEvaporation,
    ];

    /// Bands accumulated since the forecast reference hour.
    pub const ACCUMULATED: [Variable; 4] = [
        Variable::TotalPrecipitation,
        Variable::SurfaceNetSolarRadiation,
        Variable::SurfaceNetThermalRadiation,
        Variable::PotentialEvaporation,
    ];

    /// Bands reported as daily mean/min/max, in output column order.
    pub const DAILY_STATS: [Variable; DAILY_STAT_COUNT] = [
        Variable::SnowDepthWaterEquivalent,
        Variable::SurfaceNetSolarRadiation,
        Variable::SurfaceNetThermalRadiation,
        Variable::SurfacePressure,
        Variable::Temperature2m,
        Variable::DewpointTemperature2m,
        Variable::UComponentOfWind10m,
        Variable::VComponentOfWind10m,
        Variable::VolumetricSoilWaterLayer1,
        Variable::VolumetricSoilWaterLayer2,
        Variable::VolumetricSoilWaterLayer3,
        Variable::VolumetricSoilWaterLayer4,
    ];

    /// Bands reported as daily totals.
    pub const DAILY_SUMS: [Variable; 2] = [Variable::TotalPrecipitation, Variable::PotentialEvaporation];

    /// ERA5-Land band name.
    pub fn name(self) -> &'static str {
        match self {
            Variable::Temperature2m => "temperature_2m",
            Variable::DewpointTemperature2m => "dewpoint_temperature_2m",
            Variable::SurfacePressure => "surface_pressure",
            Variable::UComponentOfWind10m => "u_component_of_wind_10m",
            Variable::VComponentOfWind10m => "v_component_of_wind_10m",
            Variable::SnowDepthWaterEquivalent => "snow_depth_water_equivalent",
            Variable::VolumetricSoilWaterLayer1 => "volumetric_soil_water_layer_1",
            Variable::VolumetricSoilWaterLayer2 => "volumetric_soil_water_layer_2",
            Variable::VolumetricSoilWaterLayer3 => "volumetric_soil_water_layer_3",
            Variable::VolumetricSoilWaterLayer4 => "volumetric_soil_water_layer_4",
            Variable::TotalPrecipitation => "total_precipitation",
            Variable::SurfaceNetSolarRadiation => "surface_net_solar_radiation",
            Variable::SurfaceNetThermalRadiation => "surface_net_thermal_radiation",
            Variable::PotentialEvaporation => "potential_evaporation",
        }
    }

    /// Parses an ERA5-Land band name. Unregistered names are an error, never
    /// a pass-through.
    pub fn from_name(name: &str) -> Result<Self, PipelineError> {
        Variable::ALL
            .into_iter()
            .find(|v| v.name() == name)
            .ok_or_else(|| PipelineError::UnknownVariable(name.to_string()))
    }

    /// Position of this band in an hourly record.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Position of this band among the daily mean/min/max columns.
    pub fn stats_index(self) -> Option<usize> {
        Variable::DAILY_STATS.iter().position(|&v| v == self)
    }

    pub fn is_accumulated(self) -> bool {
        Variable::ACCUMULATED.contains(&self)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Hourly records
// ---------------------------------------------------------------------------

/// One ERA5-Land observation instant at a gauge location.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyRecord {
    /// UTC, hour resolution.
    pub timestamp: DateTime<Utc>,
    values: [Option<f64>; VARIABLE_COUNT],
}

impl HourlyRecord {
    /// A record with every band missing.
    pub fn missing(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: [None; VARIABLE_COUNT],
        }
    }

    pub fn from_values(timestamp: DateTime<Utc>, values: [Option<f64>; VARIABLE_COUNT]) -> Self {
        Self { timestamp, values }
    }

    /// Returns a copy of this record with one band replaced.
    pub fn with_value(mut self, variable: Variable, value: Option<f64>) -> Self {
        self.values[variable.index()] = value;
        self
    }

    pub fn get(&self, variable: Variable) -> Option<f64> {
        self.values[variable.index()]
    }
}

/// A contiguous hourly series: one row per UTC hour, stored column-wise.
///
/// Rows are kept in a timestamp vector parallel to one column per band, so
/// every transformation is plain index arithmetic. Hours absent from the
/// input are present here as all-missing rows.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlySeries {
    timestamps: Vec<DateTime<Utc>>,
    columns: [Vec<Option<f64>>; VARIABLE_COUNT],
    filled_gaps: usize,
}

impl HourlySeries {
    pub fn empty() -> Self {
        Self {
            timestamps: Vec::new(),
            columns: std::array::from_fn(|_| Vec::new()),
            filled_gaps: 0,
        }
    }

    /// Builds a contiguous series from records in any order.
    ///
    /// Timestamps must sit exactly on the hour and be unique. Missing hours
    /// between the first and last record are inserted as all-missing rows.
    pub fn from_records(mut records: Vec<HourlyRecord>) -> Result<Self, PipelineError> {
        records.sort_by_key(|r| r.timestamp);

        let mut timestamps: Vec<DateTime<Utc>> = Vec::with_capacity(records.len());
        let mut columns: [Vec<Option<f64>>; VARIABLE_COUNT] =
            std::array::from_fn(|_| Vec::with_capacity(records.len()));
        let mut filled_gaps = 0;

        for record in records {
            let ts = record.timestamp;
            if ts.minute() != 0 || ts.second() != 0 || ts.nanosecond() != 0 {
                return Err(PipelineError::UnalignedTimestamp(ts));
            }

            if let Some(&last) = timestamps.last() {
                if ts == last {
                    return Err(PipelineError::DuplicateTimestamp(ts));
                }
                let mut next = last + Duration::hours(1);
                while next < ts {
                    timestamps.push(next);
                    for column in columns.iter_mut() {
                        column.push(None);
                    }
                    filled_gaps += 1;
                    next += Duration::hours(1);
                }
            }

            timestamps.push(ts);
            for (column, value) in columns.iter_mut().zip(record.values) {
                column.push(value);
            }
        }

        Ok(Self {
            timestamps,
            columns,
            filled_gaps,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn column(&self, variable: Variable) -> &[Option<f64>] {
        &self.columns[variable.index()]
    }

    /// Number of hours that were missing from the input and filled in.
    pub fn filled_gaps(&self) -> usize {
        self.filled_gaps
    }

    /// Replaces one column, reusing every other column buffer.
    pub fn with_column(mut self, variable: Variable, values: Vec<Option<f64>>) -> Self {
        debug_assert_eq!(values.len(), self.len(), "column length must match series length");
        self.columns[variable.index()] = values;
        self
    }

    /// Applies `f` in place to every present value of one column.
    pub fn map_column(mut self, variable: Variable, f: impl Fn(f64) -> f64) -> Self {
        for value in self.columns[variable.index()].iter_mut().flatten() {
            *value = f(*value);
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Daily records
// ---------------------------------------------------------------------------

/// Mean, minimum and maximum of one band over one local day.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyStats {
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// One local calendar day (fixed offset) of forcing for one gauge.
///
/// Built from exactly 24 hourly rows spanning [01:00, 01:00 next day).
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRecord {
    pub date: NaiveDate,
    /// Indexed like [`Variable::DAILY_STATS`].
    pub stats: [DailyStats; DAILY_STAT_COUNT],
    pub total_precipitation_sum: Option<f64>,
    pub potential_evaporation_sum_era5_land: Option<f64>,
    pub potential_evaporation_sum_fao_pm: Option<f64>,
}

impl DailyRecord {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            stats: [DailyStats::default(); DAILY_STAT_COUNT],
            total_precipitation_sum: None,
            potential_evaporation_sum_era5_land: None,
            potential_evaporation_sum_fao_pm: None,
        }
    }

    /// Daily statistics for a band, or `None` for the two summed bands.
    pub fn stats(&self, variable: Variable) -> Option<&DailyStats> {
        variable.stats_index().map(|i| &self.stats[i])
    }

    pub fn mean(&self, variable: Variable) -> Option<f64> {
        self.stats(variable).and_then(|s| s.mean)
    }

    /// The 39 numeric fields in output column order.
    pub fn values(&self) -> Vec<Option<f64>> {
        let mut out = Vec::with_capacity(DAILY_VALUE_COUNT);
        for s in &self.stats {
            out.extend([s.mean, s.min, s.max]);
        }
        out.push(self.total_precipitation_sum);
        out.push(self.potential_evaporation_sum_era5_land);
        out.push(self.potential_evaporation_sum_fao_pm);
        out
    }

    /// Rebuilds a record from fields in [`values`](Self::values) order.
    /// Returns `None` for a slice of the wrong length.
    pub fn from_values(date: NaiveDate, values: &[Option<f64>]) -> Option<Self> {
        if values.len() != DAILY_VALUE_COUNT {
            return None;
        }
        let mut record = Self::empty(date);
        for (s, chunk) in record.stats.iter_mut().zip(values.chunks(3)) {
            *s = DailyStats {
                mean: chunk[0],
                min: chunk[1],
                max: chunk[2],
            };
        }
        let sums = &values[DAILY_STAT_COUNT * 3..];
        record.total_precipitation_sum = sums[0];
        record.potential_evaporation_sum_era5_land = sums[1];
        record.potential_evaporation_sum_fao_pm = sums[2];
        Some(record)
    }

    /// Returns a copy with every field rounded to `decimals` places.
    pub fn rounded(&self, decimals: i32) -> Self {
        let r = |v: Option<f64>| v.map(|x| round_to(x, decimals));
        let mut stats = self.stats;
        for s in stats.iter_mut() {
            *s = DailyStats {
                mean: r(s.mean),
                min: r(s.min),
                max: r(s.max),
            };
        }
        Self {
            date: self.date,
            stats,
            total_precipitation_sum: r(self.total_precipitation_sum),
            potential_evaporation_sum_era5_land: r(self.potential_evaporation_sum_era5_land),
            potential_evaporation_sum_fao_pm: r(self.potential_evaporation_sum_fao_pm),
        }
    }
}

/// Names of the 39 numeric daily columns, in output order.
pub fn daily_columns() -> Vec<String> {
    let mut cols: Vec<String> = Variable::DAILY_STATS
        .iter()
        .flat_map(|v| ["mean", "min", "max"].map(|s| format!("{}_{}", v.name(), s)))
        .collect();
    cols.push(PRECIPITATION_SUM_COLUMN.to_string());
    cols.push(PET_ERA5_LAND_COLUMN.to_string());
    cols.push(PET_FAO_PM_COLUMN.to_string());
    cols
}

/// Rounds half-to-even at the given number of decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round_ties_even() / scale
}

// ---------------------------------------------------------------------------
// Streamflow
// ---------------------------------------------------------------------------

/// Daily streamflow depth (mm/d) keyed by date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamflowSeries {
    values: BTreeMap<NaiveDate, f64>,
}

impl StreamflowSeries {
    /// Builds a series from unordered points. When a date repeats, the first
    /// occurrence (after a stable sort by date) wins.
    pub fn from_points(mut points: Vec<(NaiveDate, f64)>) -> Self {
        points.sort_by_key(|(d, _)| *d);
        let mut values = BTreeMap::new();
        for (date, value) in points {
            values.entry(date).or_insert(value);
        }
        Self { values }
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.values.get(&date).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.values.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.values.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.values.iter().map(|(d, v)| (*d, *v))
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise while loading, fetching or transforming gauge data.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A band name outside the ERA5-Land catalogue.
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    /// Two hourly records share a timestamp.
    #[error("Duplicate hourly timestamp: {0}")]
    DuplicateTimestamp(DateTime<Utc>),
    /// An hourly timestamp that does not sit on the hour.
    #[error("Timestamp not aligned to the hour: {0}")]
    UnalignedTimestamp(DateTime<Utc>),
    #[error("Configuration error: {0}")]
    Config(String),
    /// A response or file body could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(String),
    /// The remote API answered with an error payload or status.
    #[error("API error: {0}")]
    Api(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
