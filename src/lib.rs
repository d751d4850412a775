//! Caravan forcing: ERA5-Land hourly reanalysis to local-time daily forcing,
//! merged with gauge streamflow in the Caravan dataset layout.

pub mod analysis;
pub mod config;
pub mod gauges;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod transform;
pub mod validate;
