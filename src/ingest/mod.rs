//! Data acquisition: ERA5-Land hourly exports and gauge streamflow.
//!
//! Everything here performs I/O. The transform stages downstream receive
//! plain in-memory series and never see a file handle or HTTP client.

pub mod era5land;
pub mod streamflow;
