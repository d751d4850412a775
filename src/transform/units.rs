//! ERA5-Land native units to Caravan reporting units.
//!
//! Conversions are fixed per band. Potential evaporation arrives with upward
//! flux negative; its sign is flipped before de-accumulation, never here.

use crate::model::{HourlySeries, PipelineError, Variable};

/// 0 °C in kelvin.
pub const KELVIN_OFFSET: f64 = 273.15;

const PA_PER_KPA: f64 = 1000.0;
const MM_PER_M: f64 = 1000.0;
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Converts one present value of `variable` to its reporting unit.
pub fn convert_value(variable: Variable, value: f64) -> f64 {
    match variable {
        // K -> degC
        Variable::Temperature2m | Variable::DewpointTemperature2m => value - KELVIN_OFFSET,
        // Pa -> kPa
        Variable::SurfacePressure => value / PA_PER_KPA,
        // m -> mm
        Variable::SnowDepthWaterEquivalent
        | Variable::TotalPrecipitation
        | Variable::PotentialEvaporation => value * MM_PER_M,
        // J/m2 per hour -> W/m2
        Variable::SurfaceNetSolarRadiation | Variable::SurfaceNetThermalRadiation => {
            value / SECONDS_PER_HOUR
        }
        // m/s and m3/m3 are already reporting units
        Variable::UComponentOfWind10m
        | Variable::VComponentOfWind10m
        | Variable::VolumetricSoilWaterLayer1
        | Variable::VolumetricSoilWaterLayer2
        | Variable::VolumetricSoilWaterLayer3
        | Variable::VolumetricSoilWaterLayer4 => value,
    }
}

/// Converts a possibly-missing value; missing stays missing.
pub fn convert(variable: Variable, value: Option<f64>) -> Option<f64> {
    value.map(|v| convert_value(variable, v))
}

/// String-keyed conversion for callers holding raw band names.
pub fn convert_named(name: &str, value: Option<f64>) -> Result<Option<f64>, PipelineError> {
    Ok(convert(Variable::from_name(name)?, value))
}

/// Converts every band of a series.
pub fn convert_series(series: &HourlySeries) -> HourlySeries {
    Variable::ALL
        .into_iter()
        .fold(series.clone(), |acc, v| acc.map_column(v, |x| convert_value(v, x)))
}
