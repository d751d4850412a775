//! Per-gauge orchestration: hourly ERA5-Land in, merged daily Caravan rows out.
//!
//! Stage order is fixed:
//!
//! 1. flip the sign of potential evaporation
//! 2. de-accumulate the four accumulated bands
//! 3. floor precipitation and snow at zero
//! 4. convert to reporting units
//! 5. shift by the fixed local offset and aggregate whole local days
//! 6. add FAO-56 reference ET
//! 7. round every value to two decimals
//!
//! Gauges are processed one at a time; each run owns its series.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use chrono::NaiveDate;

use crate::gauges::GaugeLocation;
use crate::ingest::era5land::HourlySource;
use crate::logging::{self, DataSource};
use crate::model::{DailyRecord, HourlySeries, PipelineError, StreamflowSeries};
use crate::transform::timezone::{LocalOffset, TimezoneResolver};
use crate::transform::{daily, deaccumulate, pet, units};

/// Decimal places of every daily forcing value.
pub const OUTPUT_DECIMALS: i32 = 2;

/// Runs the pure transform stages over one gauge's hourly series.
///
/// An empty series, or one without a whole local day, yields no rows.
pub fn process_hourly(series: &HourlySeries, utc_minus_local_hours: i64) -> Vec<DailyRecord> {
    let flipped = deaccumulate::flip_potential_evaporation(series);
    let increments = deaccumulate::deaccumulate(&flipped);
    let clipped = daily::clip_negative(&increments);
    let converted = units::convert_series(&clipped);
    let days = daily::aggregate_daily(&converted, utc_minus_local_hours);

    pet::with_reference_et(days)
        .iter()
        .map(|day| day.rounded(OUTPUT_DECIMALS))
        .collect()
}

/// Result of the forcing pipeline for one gauge.
#[derive(Debug, Clone)]
pub struct GaugeForcing {
    pub gauge_id: String,
    pub offset: LocalOffset,
    pub hourly_rows: usize,
    /// Hours absent from the source, filled as missing.
    pub filled_gaps: usize,
    pub days: Vec<DailyRecord>,
}

/// Loads `years` of hourly data for `gauge` into one contiguous series.
pub fn load_hourly(
    source: &impl HourlySource,
    gauge: &GaugeLocation,
    years: RangeInclusive<i32>,
) -> Result<HourlySeries, PipelineError> {
    let mut records = Vec::new();
    for year in years {
        records.extend(source.fetch_year(gauge, year)?);
    }
    HourlySeries::from_records(records)
}

/// Fetches, transforms and aggregates ERA5-Land forcing for one gauge.
pub fn run_gauge(
    source: &impl HourlySource,
    resolver: &TimezoneResolver,
    gauge: &GaugeLocation,
    years: RangeInclusive<i32>,
) -> Result<GaugeForcing, PipelineError> {
    let id = gauge.gauge_id.as_str();
    let series = load_hourly(source, gauge, years.clone())?;

    if series.is_empty() {
        logging::warn(
            DataSource::Era5Land,
            Some(id),
            &format!("No hourly data for {}..={}", years.start(), years.end()),
        );
    } else if series.filled_gaps() > 0 {
        logging::warn(
            DataSource::Era5Land,
            Some(id),
            &format!("{} missing hours filled as gaps", series.filled_gaps()),
        );
    }

    let offset = resolver.resolve(id, gauge.lat, gauge.lon, gauge.timezone.as_deref());
    let days = process_hourly(&series, offset.utc_minus_local_hours);

    logging::info(
        DataSource::Pipeline,
        Some(id),
        &format!(
            "{} hourly rows -> {} days (UTC - local = {} h)",
            series.len(),
            days.len(),
            offset.utc_minus_local_hours
        ),
    );

    Ok(GaugeForcing {
        gauge_id: gauge.gauge_id.clone(),
        offset,
        hourly_rows: series.len(),
        filled_gaps: series.filled_gaps(),
        days,
    })
}

// ---------------------------------------------------------------------------
// Merge with streamflow
// ---------------------------------------------------------------------------

/// One row of the final daily table.
#[derive(Debug, Clone, PartialEq)]
pub struct CaravanRow {
    pub date: NaiveDate,
    pub streamflow: Option<f64>,
    pub forcing: Option<DailyRecord>,
}

/// Joins daily forcing and streamflow on date.
///
/// The result covers the union of both date sets in ascending order: forcing
/// days without flow have empty streamflow, and flow dates outside the
/// forcing range keep their flow with empty forcing. No date is dropped.
pub fn merge_streamflow(days: &[DailyRecord], streamflow: &StreamflowSeries) -> Vec<CaravanRow> {
    let mut rows: BTreeMap<NaiveDate, CaravanRow> = BTreeMap::new();

    for day in days {
        rows.insert(
            day.date,
            CaravanRow {
                date: day.date,
                streamflow: None,
                forcing: Some(day.clone()),
            },
        );
    }
    for (date, flow) in streamflow.iter() {
        rows.entry(date)
            .or_insert(CaravanRow {
                date,
                streamflow: None,
                forcing: None,
            })
            .streamflow = Some(flow);
    }

    rows.into_values().collect()
}
