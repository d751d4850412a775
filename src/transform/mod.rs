//! Pure numerical stages of the ERA5-Land hourly-to-daily pipeline.
//!
//! Submodules, in pipeline order:
//! - `deaccumulate`: PET sign flip and per-hour increments for accumulated bands.
//! - `units`: native ERA5-Land units to reporting units.
//! - `timezone`: fixed summer-time UTC offset for a gauge.
//! - `daily`: clipping, local-day trimming and daily statistics.
//! - `pet`: FAO-56 Penman-Monteith reference ET.
//!
//! None of these perform I/O.

pub mod daily;
pub mod deaccumulate;
pub mod pet;
pub mod timezone;
pub mod units;
