//! Caravan CSV files: daily timeseries tables, streamflow-only tables and
//! per-region attribute tables.
//!
//! Missing values are written as empty cells and read back as `None`.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use crate::analysis::climate_indices::ClimateIndices;
use crate::config::Settings;
use crate::gauges::{GaugeLocation, StreamflowApi};
use crate::model::{daily_columns, round_to, DailyRecord, PipelineError, StreamflowSeries, DAILY_VALUE_COUNT};
use crate::pipeline::{CaravanRow, OUTPUT_DECIMALS};

/// Decimal places of streamflow values.
pub const STREAMFLOW_DECIMALS: usize = 4;

pub const DATE_COLUMN: &str = "date";
pub const STREAMFLOW_COLUMN: &str = "streamflow";

/// Full header of a daily timeseries table.
pub fn timeseries_header() -> Vec<String> {
    let mut header = vec![DATE_COLUMN.to_string(), STREAMFLOW_COLUMN.to_string()];
    header.extend(daily_columns());
    header
}

fn format_value(value: Option<f64>, decimals: usize) -> String {
    match value {
        // -0.00 would otherwise survive formatting
        Some(v) if v == 0.0 => format!("{:.*}", decimals, 0.0),
        Some(v) => format!("{:.*}", decimals, v),
        None => String::new(),
    }
}

fn parse_value(cell: &str, path: &Path) -> Result<Option<f64>, PipelineError> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(Some)
        .map_err(|_| PipelineError::Parse(format!("{}: bad number '{}'", path.display(), cell)))
}

fn parse_date(cell: &str, path: &Path) -> Result<NaiveDate, PipelineError> {
    NaiveDate::parse_from_str(cell.trim(), "%Y-%m-%d")
        .map_err(|_| PipelineError::Parse(format!("{}: bad date '{}'", path.display(), cell)))
}

fn create_parent(path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Daily timeseries table
// ---------------------------------------------------------------------------

/// Writes the 41-column daily table, overwriting any existing file.
pub fn write_daily_table(path: &Path, rows: &[CaravanRow]) -> Result<(), PipelineError> {
    create_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(timeseries_header())?;

    let forcing_decimals = OUTPUT_DECIMALS as usize;
    for row in rows {
        let mut record = Vec::with_capacity(DAILY_VALUE_COUNT + 2);
        record.push(row.date.format("%Y-%m-%d").to_string());
        record.push(format_value(row.streamflow, STREAMFLOW_DECIMALS));
        match &row.forcing {
            Some(day) => record.extend(day.values().into_iter().map(|v| format_value(v, forcing_decimals))),
            None => record.extend(std::iter::repeat_n(String::new(), DAILY_VALUE_COUNT)),
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a daily table by column name.
///
/// Forcing columns absent from the header read as missing; a row whose
/// forcing cells are all empty has no forcing.
pub fn read_daily_table(path: &Path) -> Result<Vec<CaravanRow>, PipelineError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let position = |name: &str| headers.iter().position(|h| h == name);

    let date_col = position(DATE_COLUMN)
        .ok_or_else(|| PipelineError::Parse(format!("{}: no '{}' column", path.display(), DATE_COLUMN)))?;
    let flow_col = position(STREAMFLOW_COLUMN);
    let forcing_cols: Vec<Option<usize>> = daily_columns().iter().map(|c| position(c.as_str())).collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let cell = |col: Option<usize>| col.and_then(|c| record.get(c)).unwrap_or("");

        let date = parse_date(cell(Some(date_col)), path)?;
        let streamflow = parse_value(cell(flow_col), path)?;
        let values = forcing_cols
            .iter()
            .map(|&col| parse_value(cell(col), path))
            .collect::<Result<Vec<_>, _>>()?;

        let forcing = if values.iter().all(Option::is_none) {
            None
        } else {
            DailyRecord::from_values(date, &values)
        };
        rows.push(CaravanRow {
            date,
            streamflow,
            forcing,
        });
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Streamflow-only table
// ---------------------------------------------------------------------------

/// Writes `date,streamflow` with four decimals.
pub fn write_streamflow_csv(path: &Path, series: &StreamflowSeries) -> Result<(), PipelineError> {
    create_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([DATE_COLUMN, STREAMFLOW_COLUMN])?;
    for (date, value) in series.iter() {
        writer.write_record([
            date.format("%Y-%m-%d").to_string(),
            format_value(Some(value), STREAMFLOW_DECIMALS),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads the streamflow of any timeseries table. Empty cells are skipped and
/// other columns ignored; a missing file is an empty series.
pub fn read_streamflow_csv(path: &Path) -> Result<StreamflowSeries, PipelineError> {
    if !path.exists() {
        return Ok(StreamflowSeries::default());
    }
    let points = read_daily_table(path)?
        .into_iter()
        .filter_map(|row| Some((row.date, row.streamflow?)))
        .collect();
    Ok(StreamflowSeries::from_points(points))
}

// ---------------------------------------------------------------------------
// Attribute tables
// ---------------------------------------------------------------------------

/// One row of `attributes_other_<region>.csv`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeMetadata {
    pub gauge_id: String,
    pub gauge_name: String,
    pub gauge_lat: f64,
    pub gauge_lon: f64,
    pub country: String,
    pub basin_name: String,
    pub area: f64,
    pub unit_area: String,
    /// `first/last` observed date.
    pub streamflow_period: String,
    /// Fraction of days in the period without a value, four decimals.
    pub streamflow_missing: f64,
    pub streamflow_units: String,
    pub source: String,
    pub license: String,
    pub note: String,
}

impl GaugeMetadata {
    /// Metadata for a gauge with a non-empty streamflow record.
    pub fn from_streamflow(gauge: &GaugeLocation, series: &StreamflowSeries, settings: &Settings) -> Option<Self> {
        let first = series.first_date()?;
        let last = series.last_date()?;
        let expected_days = (last - first).num_days() + 1;
        let missing = 1.0 - series.len() as f64 / expected_days as f64;

        let source = match gauge.api {
            StreamflowApi::MelbWater => format!(
                "Melbourne Water (api.melbournewater.com.au), Station {}",
                gauge.station_id
            ),
            StreamflowApi::Hydstra => format!(
                "Victorian Water Monitoring (data.water.vic.gov.au), Station {}",
                gauge.station_id
            ),
        };

        Some(Self {
            gauge_id: gauge.gauge_id.clone(),
            gauge_name: gauge.name.clone(),
            gauge_lat: gauge.lat,
            gauge_lon: gauge.lon,
            country: settings.country.clone(),
            basin_name: settings.basin_name.clone(),
            area: gauge.area_km2,
            unit_area: "km2".to_string(),
            streamflow_period: format!("{}/{}", first, last),
            streamflow_missing: round_to(missing, 4),
            streamflow_units: "mm/d".to_string(),
            source,
            license: settings.license.clone(),
            note: gauge.notes.clone().unwrap_or_default(),
        })
    }
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), PipelineError> {
    create_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_gauge_metadata(path: &Path, rows: &[GaugeMetadata]) -> Result<(), PipelineError> {
    write_rows(path, rows)
}

pub fn write_climate_indices(path: &Path, rows: &[ClimateIndices]) -> Result<(), PipelineError> {
    write_rows(path, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Variable;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn gauge() -> GaugeLocation {
        GaugeLocation {
            gauge_id: "ausvic_230104".to_string(),
            station_id: "230104A".to_string(),
            name: "Maribyrnong River at Sunbury".to_string(),
            lat: -37.5833,
            lon: 144.742,
            area_km2: 406.7,
            api: StreamflowApi::MelbWater,
            fetch_start: d(1996, 1, 1),
            timezone: None,
            notes: Some("Flow only recorded above ~1 m".to_string()),
        }
    }

    #[test]
    fn test_header_has_41_columns() {
        let header = timeseries_header();
        assert_eq!(header.len(), 41);
        assert_eq!(header[0], "date");
        assert_eq!(header[1], "streamflow");
        assert_eq!(header[40], "potential_evaporation_sum_FAO_PENMAN_MONTEITH");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Some(1.5), 2), "1.50");
        assert_eq!(format_value(Some(-0.0), 2), "0.00");
        assert_eq!(format_value(Some(0.12345), 4), "0.1235");
        assert_eq!(format_value(None, 2), "");
    }

    #[test]
    fn test_daily_table_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timeseries/csv/ausvic/ausvic_230104.csv");

        let mut forcing = DailyRecord::empty(d(2020, 1, 2));
        forcing.stats[Variable::Temperature2m.stats_index().unwrap()].mean = Some(18.25);
        forcing.total_precipitation_sum = Some(0.0);
        let rows = vec![
            CaravanRow {
                date: d(2020, 1, 1),
                streamflow: Some(0.1234),
                forcing: None,
            },
            CaravanRow {
                date: d(2020, 1, 2),
                streamflow: None,
                forcing: Some(forcing),
            },
        ];
        write_daily_table(&path, &rows).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("2020-01-01,0.1234,,"), "got {}", lines[1]);
        assert_eq!(lines[1].split(',').count(), 41);

        assert_eq!(read_daily_table(&path).unwrap(), rows);
    }

    #[test]
    fn test_streamflow_csv_is_read_from_full_table_or_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.csv");
        let series = StreamflowSeries::from_points(vec![(d(2020, 1, 1), 1.23456), (d(2020, 1, 3), 0.5)]);
        write_streamflow_csv(&path, &series).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "date,streamflow\n2020-01-01,1.2346\n2020-01-03,0.5000\n"
        );
        let back = read_streamflow_csv(&path).unwrap();
        assert_eq!(back.get(d(2020, 1, 1)), Some(1.2346));
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn test_missing_streamflow_file_is_empty_series() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_streamflow_csv(&dir.path().join("absent.csv")).unwrap().is_empty());
    }

    #[test]
    fn test_bad_number_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "date,streamflow\n2020-01-01,abc\n").unwrap();
        assert!(matches!(read_streamflow_csv(&path), Err(PipelineError::Parse(_))));
    }

    #[test]
    fn test_gauge_metadata_period_and_missing_fraction() {
        // 3 of 4 days present
        let series = StreamflowSeries::from_points(vec![(d(2020, 1, 1), 1.0), (d(2020, 1, 2), 1.0), (d(2020, 1, 4), 1.0)]);
        let meta = GaugeMetadata::from_streamflow(&gauge(), &series, &Settings::default()).unwrap();
        assert_eq!(meta.streamflow_period, "2020-01-01/2020-01-04");
        assert_eq!(meta.streamflow_missing, 0.25);
        assert_eq!(meta.country, "AUS");
        assert!(meta.source.starts_with("Melbourne Water"));
        assert!(GaugeMetadata::from_streamflow(&gauge(), &StreamflowSeries::default(), &Settings::default()).is_none());
    }

    #[test]
    fn test_gauge_metadata_csv_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attributes_other_ausvic.csv");
        let series = StreamflowSeries::from_points(vec![(d(2020, 1, 1), 1.0)]);
        let meta = GaugeMetadata::from_streamflow(&gauge(), &series, &Settings::default()).unwrap();
        write_gauge_metadata(&path, &[meta]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(
            "gauge_id,gauge_name,gauge_lat,gauge_lon,country,basin_name,area,unit_area,\
             streamflow_period,streamflow_missing,streamflow_units,source,license,note\n"
        ));
    }
}
