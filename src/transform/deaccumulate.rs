//! Recovers per-hour increments from ERA5-Land accumulated bands.
//!
//! ERA5-Land accumulates precipitation, net radiation and potential
//! evaporation from 00 UTC. The value stamped 01 UTC already is the first
//! hour's increment; the value stamped 00 UTC closes out the previous day.
//! A plain first difference is therefore right everywhere except at 01 UTC
//! (and at the first row, which has no predecessor).

use chrono::{DateTime, Timelike, Utc};

use crate::model::{HourlySeries, Variable};

/// UTC hour whose raw value is already a one-hour increment.
pub const FIRST_ACCUMULATED_HOUR: u32 = 1;

/// Flips potential evaporation so that evaporation is positive.
///
/// Must run before [`deaccumulate`].
pub fn flip_potential_evaporation(series: &HourlySeries) -> HourlySeries {
    series.clone().map_column(Variable::PotentialEvaporation, |v| -v)
}

/// De-accumulates one column against its UTC timestamps.
pub fn deaccumulate_column(timestamps: &[DateTime<Utc>], raw: &[Option<f64>]) -> Vec<Option<f64>> {
    raw.iter()
        .enumerate()
        .map(|(i, &value)| {
            if i == 0 || timestamps[i].hour() == FIRST_ACCUMULATED_HOUR {
                return value;
            }
            match (value, raw[i - 1]) {
                (Some(cur), Some(prev)) => Some(cur - prev),
                _ => None,
            }
        })
        .collect()
}

/// De-accumulates the four accumulated bands; other columns are untouched.
pub fn deaccumulate(series: &HourlySeries) -> HourlySeries {
    Variable::ACCUMULATED.into_iter().fold(series.clone(), |acc, v| {
        let values = deaccumulate_column(series.timestamps(), series.column(v));
        acc.with_column(v, values)
    })
}
