/// Caravan climate indices for one gauge.
///
/// All indices are computed over a fixed standard period (1981-2020 unless
/// configured otherwise) so they are comparable across datasets. Each daily
/// series drops its own missing days before use; monthly statistics group
/// by calendar month across all years.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::model::{round_to, DailyRecord, Variable};
use crate::pipeline::CaravanRow;

/// Decimal places of every published index.
pub const INDEX_DECIMALS: i32 = 4;

/// Days with at least this multiple of mean precipitation are "high".
pub const HIGH_PRECIP_FACTOR: f64 = 5.0;

/// Days below this precipitation (mm/d) are "low".
pub const LOW_PRECIP_MM: f64 = 1.0;

/// One row of `attributes_caravan_<region>.csv`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClimateIndices {
    pub gauge_id: String,
    pub p_mean: f64,
    #[serde(rename = "pet_mean_ERA5_LAND")]
    pub pet_mean_era5_land: f64,
    #[serde(rename = "pet_mean_FAO_PM")]
    pub pet_mean_fao_pm: f64,
    /// `None` when mean precipitation is not positive.
    #[serde(rename = "aridity_ERA5_LAND")]
    pub aridity_era5_land: Option<f64>,
    #[serde(rename = "aridity_FAO_PM")]
    pub aridity_fao_pm: Option<f64>,
    pub frac_snow: f64,
    #[serde(rename = "moisture_index_ERA5_LAND")]
    pub moisture_index_era5_land: f64,
    #[serde(rename = "seasonality_ERA5_LAND")]
    pub seasonality_era5_land: f64,
    #[serde(rename = "moisture_index_FAO_PM")]
    pub moisture_index_fao_pm: f64,
    #[serde(rename = "seasonality_FAO_PM")]
    pub seasonality_fao_pm: f64,
    pub high_prec_freq: f64,
    pub high_prec_dur: f64,
    pub low_prec_freq: f64,
    pub low_prec_dur: f64,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type DailySeries = Vec<(NaiveDate, f64)>;

/// Present values of one forcing field, in row order.
fn extract(rows: &[&CaravanRow], field: impl Fn(&DailyRecord) -> Option<f64>) -> DailySeries {
    rows.iter()
        .filter_map(|r| Some((r.date, field(r.forcing.as_ref()?)?)))
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Mean for each calendar month (index 0 = January); `None` for months
/// without data.
pub fn monthly_means(series: &[(NaiveDate, f64)]) -> [Option<f64>; 12] {
    std::array::from_fn(|m| {
        mean(
            series
                .iter()
                .filter(|(d, _)| d.month0() as usize == m)
                .map(|(_, v)| *v),
        )
    })
}

/// Lengths of consecutive runs of `true`.
pub fn run_lengths(mask: &[bool]) -> Vec<usize> {
    let mut runs = Vec::new();
    let mut count = 0;
    for &flag in mask {
        if flag {
            count += 1;
        } else if count > 0 {
            runs.push(count);
            count = 0;
        }
    }
    if count > 0 {
        runs.push(count);
    }
    runs
}

/// Knoben monthly moisture index: `1 - pet/p` in wet months, `p/pet - 1` in
/// dry months, `0` when they balance.
fn monthly_moisture_index(p: f64, pet: f64) -> f64 {
    if p > pet {
        1.0 - pet / p
    } else if p < pet {
        p / pet - 1.0
    } else {
        0.0
    }
}

/// Annual moisture index (mean of monthly indices) and seasonality (their
/// range). Months without both precipitation and PET are skipped.
pub fn moisture_and_seasonality(precip: &[(NaiveDate, f64)], pet: &[(NaiveDate, f64)]) -> (f64, f64) {
    let mmp = monthly_means(precip);
    let mmpet = monthly_means(pet);
    let monthly: Vec<f64> = mmp
        .iter()
        .zip(mmpet.iter())
        .filter_map(|(p, e)| Some(monthly_moisture_index((*p)?, (*e)?)))
        .collect();

    let annual = mean(monthly.iter().copied()).unwrap_or(0.0);
    let max = monthly.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let min = monthly.iter().copied().reduce(f64::min).unwrap_or(0.0);
    (annual, max - min)
}

/// Share of mean monthly precipitation falling in months whose mean
/// temperature is below 0 °C.
pub fn snow_fraction(precip: &[(NaiveDate, f64)], temperature: &[(NaiveDate, f64)]) -> f64 {
    let mmp = monthly_means(precip);
    let mmt = monthly_means(temperature);
    let total: f64 = mmp.iter().flatten().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let snow: f64 = mmp
        .iter()
        .zip(mmt.iter())
        .filter_map(|(p, t)| match (p, t) {
            (Some(p), Some(t)) if *t < 0.0 => Some(*p),
            _ => None,
        })
        .sum();
    snow / total
}

/// Frequency and mean run length of days matching `mask`.
fn frequency_and_duration(mask: &[bool]) -> (f64, f64) {
    if mask.is_empty() {
        return (0.0, 0.0);
    }
    let hits = mask.iter().filter(|&&m| m).count();
    let runs = run_lengths(mask);
    let duration = mean(runs.iter().map(|&r| r as f64)).unwrap_or(0.0);
    (hits as f64 / mask.len() as f64, duration)
}

// ---------------------------------------------------------------------------
// Index calculation
// ---------------------------------------------------------------------------

/// Computes the climate indices of one gauge over `[start, end]`.
///
/// Returns `None` when the period holds no rows, or when precipitation,
/// either PET or mean temperature has no values in it.
pub fn calculate_climate_indices(
    gauge_id: &str,
    rows: &[CaravanRow],
    start: NaiveDate,
    end: NaiveDate,
) -> Option<ClimateIndices> {
    let in_period: Vec<&CaravanRow> = rows.iter().filter(|r| r.date >= start && r.date <= end).collect();
    if in_period.is_empty() {
        return None;
    }

    let precip = extract(&in_period, |d| d.total_precipitation_sum);
    let pet_era5 = extract(&in_period, |d| d.potential_evaporation_sum_era5_land);
    let pet_fao = extract(&in_period, |d| d.potential_evaporation_sum_fao_pm);
    let temp = extract(&in_period, |d| d.mean(Variable::Temperature2m));

    if precip.is_empty() || pet_era5.is_empty() || pet_fao.is_empty() || temp.is_empty() {
        return None;
    }

    let p_mean = mean(precip.iter().map(|(_, v)| *v))?;
    let pet_mean_era5 = mean(pet_era5.iter().map(|(_, v)| *v))?;
    let pet_mean_fao = mean(pet_fao.iter().map(|(_, v)| *v))?;
    let aridity = |pet: f64| (p_mean > 0.0).then(|| pet / p_mean);

    let (mi_era5, seas_era5) = moisture_and_seasonality(&precip, &pet_era5);
    let (mi_fao, seas_fao) = moisture_and_seasonality(&precip, &pet_fao);

    let high: Vec<bool> = precip.iter().map(|(_, v)| *v >= HIGH_PRECIP_FACTOR * p_mean).collect();
    let low: Vec<bool> = precip.iter().map(|(_, v)| *v < LOW_PRECIP_MM).collect();
    let (high_freq, high_dur) = frequency_and_duration(&high);
    let (low_freq, low_dur) = frequency_and_duration(&low);

    let r = |v: f64| round_to(v, INDEX_DECIMALS);
    Some(ClimateIndices {
        gauge_id: gauge_id.to_string(),
        p_mean: r(p_mean),
        pet_mean_era5_land: r(pet_mean_era5),
        pet_mean_fao_pm: r(pet_mean_fao),
        aridity_era5_land: aridity(pet_mean_era5).map(r),
        aridity_fao_pm: aridity(pet_mean_fao).map(r),
        frac_snow: r(snow_fraction(&precip, &temp)),
        moisture_index_era5_land: r(mi_era5),
        seasonality_era5_land: r(seas_era5),
        moisture_index_fao_pm: r(mi_fao),
        seasonality_fao_pm: r(seas_fao),
        high_prec_freq: r(high_freq),
        high_prec_dur: r(high_dur),
        low_prec_freq: r(low_freq),
        low_prec_dur: r(low_dur),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::Duration;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn row(date: NaiveDate, precip: f64, pet: f64, temp: f64) -> CaravanRow {
        let mut f = DailyRecord::empty(date);
        f.total_precipitation_sum = Some(precip);
        f.potential_evaporation_sum_era5_land = Some(pet);
        f.potential_evaporation_sum_fao_pm = Some(pet * 2.0);
        f.stats[Variable::Temperature2m.stats_index().unwrap()].mean = Some(temp);
        CaravanRow {
            date,
            streamflow: None,
            forcing: Some(f),
        }
    }

    #[test]
    fn test_run_lengths() {
        assert_eq!(run_lengths(&[true, true, false, true, false, false, true]), vec![2, 1, 1]);
        assert!(run_lengths(&[false, false]).is_empty());
        assert!(run_lengths(&[]).is_empty());
    }

    #[test]
    fn test_moisture_index_signs() {
        assert_eq!(monthly_moisture_index(4.0, 1.0), 0.75);
        assert_eq!(monthly_moisture_index(1.0, 4.0), -0.75);
        assert_eq!(monthly_moisture_index(2.0, 2.0), 0.0);
    }

    #[test]
    fn test_seasonality_is_range_of_monthly_indices() {
        let precip = vec![(d(2000, 1, 1), 4.0), (d(2000, 7, 1), 1.0)];
        let pet = vec![(d(2000, 1, 1), 1.0), (d(2000, 7, 1), 4.0)];
        let (mi, seasonality) = moisture_and_seasonality(&precip, &pet);
        assert_abs_diff_eq!(mi, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(seasonality, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_snow_fraction_counts_freezing_months() {
        let precip = vec![(d(2000, 1, 1), 3.0), (d(2000, 7, 1), 1.0)];
        let temp = vec![(d(2000, 1, 1), -5.0), (d(2000, 7, 1), 15.0)];
        assert_eq!(snow_fraction(&precip, &temp), 0.75);
        assert_eq!(snow_fraction(&[(d(2000, 1, 1), 0.0)], &temp), 0.0, "no precipitation");
    }

    #[test]
    fn test_indices_over_constant_record() {
        let rows: Vec<CaravanRow> = (0..10)
            .map(|i| row(d(1990, 1, 1) + Duration::days(i), 2.0, 1.0, 10.0))
            .collect();
        let idx = calculate_climate_indices("ausvic_230200", &rows, d(1981, 1, 1), d(2020, 12, 31)).unwrap();
        assert_eq!(idx.p_mean, 2.0);
        assert_eq!(idx.pet_mean_era5_land, 1.0);
        assert_eq!(idx.pet_mean_fao_pm, 2.0);
        assert_eq!(idx.aridity_era5_land, Some(0.5));
        assert_eq!(idx.aridity_fao_pm, Some(1.0));
        assert_eq!(idx.moisture_index_era5_land, 0.5);
        assert_eq!(idx.moisture_index_fao_pm, 0.0);
        assert_eq!(idx.seasonality_era5_land, 0.0);
        assert_eq!(idx.frac_snow, 0.0);
        assert_eq!(idx.high_prec_freq, 0.0);
        assert_eq!(idx.high_prec_dur, 0.0);
        assert_eq!(idx.low_prec_freq, 0.0);
    }

    #[test]
    fn test_precipitation_extremes() {
        // p_mean = 1.2: one day of 10 mm is high, the nine dry days are low
        let mut rows: Vec<CaravanRow> = (0..10)
            .map(|i| row(d(1990, 1, 1) + Duration::days(i), 0.2, 1.0, 10.0))
            .collect();
        rows[4] = row(d(1990, 1, 5), 10.2, 1.0, 10.0);
        let idx = calculate_climate_indices("ausvic_230200", &rows, d(1981, 1, 1), d(2020, 12, 31)).unwrap();
        assert_eq!(idx.high_prec_freq, 0.1);
        assert_eq!(idx.high_prec_dur, 1.0);
        assert_eq!(idx.low_prec_freq, 0.9);
        assert_eq!(idx.low_prec_dur, 4.5, "runs of 4 and 5 dry days");
    }

    #[test]
    fn test_dry_record_has_no_aridity() {
        let rows = vec![row(d(1990, 1, 1), 0.0, 1.0, 10.0)];
        let idx = calculate_climate_indices("ausvic_230200", &rows, d(1981, 1, 1), d(2020, 12, 31)).unwrap();
        assert_eq!(idx.aridity_era5_land, None);
        assert_eq!(idx.aridity_fao_pm, None);
    }

    #[test]
    fn test_rows_outside_period_are_ignored() {
        let rows = vec![row(d(1975, 1, 1), 2.0, 1.0, 10.0), row(d(2021, 1, 1), 2.0, 1.0, 10.0)];
        assert!(calculate_climate_indices("ausvic_230200", &rows, d(1981, 1, 1), d(2020, 12, 31)).is_none());
    }

    #[test]
    fn test_streamflow_only_rows_give_no_indices() {
        let rows = vec![CaravanRow {
            date: d(1990, 1, 1),
            streamflow: Some(1.0),
            forcing: None,
        }];
        assert!(calculate_climate_indices("ausvic_230200", &rows, d(1981, 1, 1), d(2020, 12, 31)).is_none());
    }
}
