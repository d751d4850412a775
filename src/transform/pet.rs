//! FAO-56 Penman-Monteith reference evapotranspiration at a daily step.
//!
//! Inputs are daily means already in reporting units (kPa, °C, m/s, W/m2).
//! Soil heat flux is taken as zero, as FAO-56 allows for daily steps.

use crate::model::{DailyRecord, Variable};

/// Specific heat of air at constant pressure, MJ kg-1 °C-1.
pub const SPECIFIC_HEAT_AIR: f64 = 1.013e-3;
/// Ratio of molecular weights of water vapour and dry air.
pub const MOLECULAR_WEIGHT_RATIO: f64 = 0.622;
/// Latent heat of vaporisation, MJ kg-1.
pub const LATENT_HEAT_VAPORISATION: f64 = 2.45;

const SECONDS_PER_DAY: f64 = 86400.0;
const JOULES_PER_MEGAJOULE: f64 = 1e6;
const WIND_MEASUREMENT_HEIGHT_M: f64 = 10.0;

/// Daily inputs to the reference ET formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PetInputs {
    pub surface_pressure_kpa: f64,
    pub temperature_c: f64,
    pub dewpoint_c: f64,
    pub u_wind_10m: f64,
    pub v_wind_10m: f64,
    pub net_solar_radiation_wm2: f64,
    pub net_thermal_radiation_wm2: f64,
}

impl PetInputs {
    /// Collects the daily means needed for reference ET; `None` if any is missing.
    pub fn from_daily(record: &DailyRecord) -> Option<Self> {
        Some(Self {
            surface_pressure_kpa: record.mean(Variable::SurfacePressure)?,
            temperature_c: record.mean(Variable::Temperature2m)?,
            dewpoint_c: record.mean(Variable::DewpointTemperature2m)?,
            u_wind_10m: record.mean(Variable::UComponentOfWind10m)?,
            v_wind_10m: record.mean(Variable::VComponentOfWind10m)?,
            net_solar_radiation_wm2: record.mean(Variable::SurfaceNetSolarRadiation)?,
            net_thermal_radiation_wm2: record.mean(Variable::SurfaceNetThermalRadiation)?,
        })
    }
}

/// Log-profile factor taking 10 m wind speed down to 2 m.
pub fn wind_height_factor() -> f64 {
    4.87 / (67.8 * WIND_MEASUREMENT_HEIGHT_M - 5.42).ln()
}

/// Wind speed at 2 m from the 10 m components.
pub fn wind_speed_2m(u_wind_10m: f64, v_wind_10m: f64) -> f64 {
    (u_wind_10m.powi(2) + v_wind_10m.powi(2)).sqrt() * wind_height_factor()
}

/// Mean W/m2 over a day to MJ/m2/day.
pub fn daily_energy_mj(mean_wm2: f64) -> f64 {
    mean_wm2 * SECONDS_PER_DAY / JOULES_PER_MEGAJOULE
}

/// Psychrometric constant, kPa/°C.
pub fn psychrometric_constant(pressure_kpa: f64) -> f64 {
    SPECIFIC_HEAT_AIR * pressure_kpa / (MOLECULAR_WEIGHT_RATIO * LATENT_HEAT_VAPORISATION)
}

/// Saturation vapour pressure, kPa.
pub fn saturation_vapour_pressure(temperature_c: f64) -> f64 {
    0.6108 * (17.27 * temperature_c / (temperature_c + 237.3)).exp()
}

/// Slope of the saturation vapour pressure curve, kPa/°C.
pub fn vapour_pressure_slope(temperature_c: f64) -> f64 {
    4098.0 * saturation_vapour_pressure(temperature_c) / (temperature_c + 237.3).powi(2)
}

/// Reference ET in mm/day, floored at zero.
pub fn reference_et(inputs: &PetInputs) -> f64 {
    let t = inputs.temperature_c;
    let u2 = wind_speed_2m(inputs.u_wind_10m, inputs.v_wind_10m);
    let net_radiation = daily_energy_mj(inputs.net_solar_radiation_wm2 + inputs.net_thermal_radiation_wm2);
    let soil_heat_flux = 0.0;

    let gamma = psychrometric_constant(inputs.surface_pressure_kpa);
    let svp = saturation_vapour_pressure(t);
    let delta = vapour_pressure_slope(t);
    let avp = saturation_vapour_pressure(inputs.dewpoint_c);
    let deficit = svp - avp;

    let radiation_term = 0.408 * delta * (net_radiation - soil_heat_flux);
    let aerodynamic_term = gamma * (900.0 / (t + 273.0)) * u2 * deficit;
    let et0 = (radiation_term + aerodynamic_term) / (delta + gamma * (1.0 + 0.34 * u2));

    et0.max(0.0)
}

/// Reference ET for one day, or `None` if any input is missing.
pub fn daily_reference_et(record: &DailyRecord) -> Option<f64> {
    PetInputs::from_daily(record).map(|inputs| reference_et(&inputs))
}

/// Fills the FAO reference ET field of every record.
pub fn with_reference_et(records: Vec<DailyRecord>) -> Vec<DailyRecord> {
    records
        .into_iter()
        .map(|mut r| {
            r.potential_evaporation_sum_fao_pm = daily_reference_et(&r);
            r
        })
        .collect()
}
