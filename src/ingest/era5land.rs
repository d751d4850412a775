/// ERA5-Land hourly point data.
///
/// The pipeline reads hourly records through the [`HourlySource`] trait. The
/// bundled implementation, [`RegionFileSource`], reads Earth Engine
/// `ImageCollection.getRegion` exports of `ECMWF/ERA5_LAND/HOURLY` at the
/// gauge point, saved one calendar year per file:
///
/// ```text
/// [["id", "longitude", "latitude", "time", "temperature_2m", ...],
///  ["20200101T00", 144.84, -37.73, 1577836800000, 290.1, ...],
///  ...]
/// ```
///
/// `time` is epoch milliseconds (UTC). Bands may appear in any order; `null`
/// cells are missing values.

use std::fs;
use std::path::PathBuf;

use chrono::DateTime;
use serde_json::Value;

use crate::gauges::GaugeLocation;
use crate::logging::{self, DataSource};
use crate::model::{HourlyRecord, PipelineError, Variable};

/// `getRegion` columns that are not ERA5-Land bands.
pub const NON_BAND_COLUMNS: [&str; 4] = ["id", "longitude", "latitude", "time"];

/// Source of one gauge's raw hourly records, one calendar year at a time.
pub trait HourlySource {
    /// Raw hourly records for `year`. A year with no data is an empty vector,
    /// not an error.
    fn fetch_year(&self, gauge: &GaugeLocation, year: i32) -> Result<Vec<HourlyRecord>, PipelineError>;
}

// ============================================================================
// getRegion export parsing
// ============================================================================

/// Parses a `getRegion` export into hourly records.
///
/// Every header column other than [`NON_BAND_COLUMNS`] must be an ERA5-Land
/// band name; anything else is `PipelineError::UnknownVariable`.
pub fn parse_region_json(text: &str) -> Result<Vec<HourlyRecord>, PipelineError> {
    let table: Vec<Vec<Value>> = serde_json::from_str(text)?;
    let Some((header, rows)) = table.split_first() else {
        return Ok(Vec::new());
    };

    let mut time_col = None;
    let mut bands: Vec<(usize, Variable)> = Vec::new();
    for (i, cell) in header.iter().enumerate() {
        let name = cell
            .as_str()
            .ok_or_else(|| PipelineError::Parse(format!("header column {} is not a string", i)))?;
        if name == "time" {
            time_col = Some(i);
        } else if !NON_BAND_COLUMNS.contains(&name) {
            bands.push((i, Variable::from_name(name)?));
        }
    }
    let time_col = time_col.ok_or_else(|| PipelineError::Parse("no 'time' column in header".to_string()))?;

    rows.iter()
        .enumerate()
        .map(|(r, row)| {
            let ms = row
                .get(time_col)
                .and_then(Value::as_f64)
                .ok_or_else(|| PipelineError::Parse(format!("row {} has no numeric time", r + 1)))?;
            let timestamp = DateTime::from_timestamp_millis(ms as i64)
                .ok_or_else(|| PipelineError::Parse(format!("row {} time {} out of range", r + 1, ms)))?;

            let record = bands.iter().fold(HourlyRecord::missing(timestamp), |rec, &(col, var)| {
                rec.with_value(var, row.get(col).and_then(Value::as_f64))
            });
            Ok(record)
        })
        .collect()
}

// ============================================================================
// File-backed source
// ============================================================================

/// Reads `<dir>/<gauge_id>_<year>.json` exports.
#[derive(Debug, Clone)]
pub struct RegionFileSource {
    dir: PathBuf,
}

impl RegionFileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, gauge_id: &str, year: i32) -> PathBuf {
        self.dir.join(format!("{}_{}.json", gauge_id, year))
    }
}

impl HourlySource for RegionFileSource {
    fn fetch_year(&self, gauge: &GaugeLocation, year: i32) -> Result<Vec<HourlyRecord>, PipelineError> {
        let path = self.path_for(&gauge.gauge_id, year);
        if !path.exists() {
            logging::debug(
                DataSource::Era5Land,
                Some(&gauge.gauge_id),
                &format!("No export for {} at {}", year, path.display()),
            );
            return Ok(Vec::new());
        }

        let text = fs::read_to_string(&path)?;
        let records = parse_region_json(&text)?;
        logging::debug(
            DataSource::Era5Land,
            Some(&gauge.gauge_id),
            &format!("{}: {} hourly records", year, records.len()),
        );
        Ok(records)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gauges::StreamflowApi;
    use chrono::{NaiveDate, TimeZone, Utc};

    const EXPORT: &str = r#"[
        ["id", "longitude", "latitude", "time", "temperature_2m", "total_precipitation"],
        ["20200101T00", 144.84, -37.73, 1577836800000, 290.15, 0.0],
        ["20200101T01", 144.84, -37.73, 1577840400000, null, 0.0005]
    ]"#;

    fn gauge() -> GaugeLocation {
        GaugeLocation {
            gauge_id: "ausvic_230200".to_string(),
            station_id: "230200".to_string(),
            name: "Keilor".to_string(),
            lat: -37.73,
            lon: 144.84,
            area_km2: 1305.4,
            api: StreamflowApi::Hydstra,
            fetch_start: NaiveDate::from_ymd_opt(1907, 5, 20).unwrap(),
            timezone: None,
            notes: None,
        }
    }

    #[test]
    fn test_parse_region_export() {
        let records = parse_region_json(EXPORT).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(records[1].timestamp, Utc.with_ymd_and_hms(2020, 1, 1, 1, 0, 0).unwrap());
        assert_eq!(records[0].get(Variable::Temperature2m), Some(290.15));
        assert_eq!(records[1].get(Variable::Temperature2m), None, "null is missing");
        assert_eq!(records[1].get(Variable::TotalPrecipitation), Some(0.0005));
        assert_eq!(records[0].get(Variable::SurfacePressure), None, "absent band is missing");
    }

    #[test]
    fn test_unknown_band_is_rejected() {
        let text = r#"[["time", "skin_temperature"], [1577836800000, 290.0]]"#;
        assert!(matches!(
            parse_region_json(text),
            Err(PipelineError::UnknownVariable(ref n)) if n == "skin_temperature"
        ));
    }

    #[test]
    fn test_missing_time_column_is_parse_error() {
        let text = r#"[["temperature_2m"], [290.0]]"#;
        assert!(matches!(parse_region_json(text), Err(PipelineError::Parse(_))));
    }

    #[test]
    fn test_empty_export_gives_no_records() {
        assert!(parse_region_json("[]").unwrap().is_empty());
    }

    #[test]
    fn test_file_source_reads_named_file_and_tolerates_missing_years() {
        let dir = tempfile::tempdir().unwrap();
        let source = RegionFileSource::new(dir.path());
        fs::write(source.path_for("ausvic_230200", 2020), EXPORT).unwrap();

        assert_eq!(source.fetch_year(&gauge(), 2020).unwrap().len(), 2);
        assert!(source.fetch_year(&gauge(), 2019).unwrap().is_empty());
    }
}
