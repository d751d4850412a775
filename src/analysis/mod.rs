/// Derived statistics over the merged daily tables.
///
/// Submodules:
/// - `climate_indices`: Caravan climate attributes (aridity, moisture index,
///   seasonality, snow fraction and precipitation extremes) per gauge.

pub mod climate_indices;
