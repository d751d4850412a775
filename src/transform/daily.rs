//! Hourly UTC series to fixed-offset local daily statistics.
//!
//! Days run from 01:00 to 01:00 local, matching the ERA5-Land convention that
//! the 00:00 value closes out the previous day. The series is shifted by a
//! fixed offset (no daylight saving), trimmed to whole days, and every day is
//! reduced from exactly 24 rows.

use chrono::{Duration, NaiveDateTime, Timelike};

use crate::model::{DailyRecord, DailyStats, HourlySeries, Variable};

pub const HOURS_PER_DAY: usize = 24;

/// Local hour at which a daily bin opens.
pub const DAY_START_HOUR: u32 = 1;

/// Bands floored at zero before aggregation.
pub const NON_NEGATIVE: [Variable; 2] = [Variable::TotalPrecipitation, Variable::SnowDepthWaterEquivalent];

/// Floors precipitation and snow depth water equivalent at zero.
pub fn clip_negative(series: &HourlySeries) -> HourlySeries {
    NON_NEGATIVE
        .into_iter()
        .fold(series.clone(), |acc, v| acc.map_column(v, |x| x.max(0.0)))
}

/// Shifts UTC timestamps into fixed-offset local time: `local = utc − offset`.
pub fn local_times(series: &HourlySeries, utc_minus_local_hours: i64) -> Vec<NaiveDateTime> {
    let shift = Duration::hours(utc_minus_local_hours);
    series.timestamps().iter().map(|ts| ts.naive_utc() - shift).collect()
}

/// Row range covering whole local days: from the first row at local 01:00
/// through the last row at local 00:00. `None` when no whole day exists.
pub fn whole_day_window(local: &[NaiveDateTime]) -> Option<std::ops::Range<usize>> {
    let start = local.iter().position(|t| t.hour() == DAY_START_HOUR)?;
    let end = local.iter().rposition(|t| t.hour() == 0)?;
    if end < start {
        return None;
    }
    Some(start..end + 1)
}

fn stats_of(values: &[Option<f64>]) -> DailyStats {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return DailyStats::default();
    }
    let sum: f64 = present.iter().sum();
    DailyStats {
        mean: Some(sum / present.len() as f64),
        min: present.iter().copied().reduce(f64::min),
        max: present.iter().copied().reduce(f64::max),
    }
}

fn sum_of(values: &[Option<f64>]) -> Option<f64> {
    values.iter().flatten().copied().reduce(|a, b| a + b)
}

/// Aggregates a converted, de-accumulated hourly series into local days.
///
/// The FAO reference ET field is left empty; see [`crate::transform::pet`].
pub fn aggregate_daily(series: &HourlySeries, utc_minus_local_hours: i64) -> Vec<DailyRecord> {
    let local = local_times(series, utc_minus_local_hours);
    let Some(window) = whole_day_window(&local) else {
        return Vec::new();
    };

    let day_starts = (window.start..window.end).step_by(HOURS_PER_DAY);
    day_starts
        .filter(|&start| start + HOURS_PER_DAY <= window.end)
        .map(|start| {
            let rows = start..start + HOURS_PER_DAY;
            let mut record = DailyRecord::empty(local[start].date());
            for (i, v) in Variable::DAILY_STATS.into_iter().enumerate() {
                record.stats[i] = stats_of(&series.column(v)[rows.clone()]);
            }
            let [precipitation, evaporation] =
                Variable::DAILY_SUMS.map(|v| sum_of(&series.column(v)[rows.clone()]));
            record.total_precipitation_sum = precipitation;
            record.potential_evaporation_sum_era5_land = evaporation;
            record
        })
        .collect()
}
