//! Fixed summer-time UTC offset for a gauge.
//!
//! A single UTC offset is used for the whole record, so daily bins never
//! jump across daylight-saving transitions. The offset is read on a
//! reference date in the local summer of the gauge's hemisphere: January in
//! the south, August in the north. Where daylight saving applies this is the
//! summer offset (AEDT for Melbourne), not standard time.

use chrono::{NaiveDate, NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;
use tzf_rs::DefaultFinder;

use crate::logging::{self, DataSource};

const SECONDS_PER_HOUR: i64 = 3600;

/// Local-summer reference instant for a latitude (southern hemisphere when
/// `latitude <= 0`).
pub fn reference_datetime(latitude: f64) -> NaiveDateTime {
    let (month, day) = if latitude <= 0.0 { (1, 15) } else { (8, 15) };
    NaiveDate::from_ymd_opt(2020, month, day)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap_or_default()
}

/// `UTC − local` in whole hours for an IANA zone at the reference date of
/// `latitude`. Returns `None` if the zone name is not recognised.
///
/// Offsets that are not whole hours are rounded up. On hourly rows this
/// selects the same 24 hours as the exact half-hour shift: the first row of a
/// local day is the first one at or after local 01:00.
pub fn fixed_offset_hours(zone: &str, latitude: f64) -> Option<i64> {
    let tz: Tz = zone.parse().ok()?;
    let local = tz.from_local_datetime(&reference_datetime(latitude)).earliest()?;
    let local_minus_utc = i64::from(local.offset().fix().local_minus_utc());
    // ceil(-x / h) == -floor(x / h)
    Some(-local_minus_utc.div_euclid(SECONDS_PER_HOUR))
}

/// The resolved zone and fixed offset for one gauge.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalOffset {
    /// IANA zone name, or `None` when the UTC fallback was used.
    pub zone: Option<String>,
    /// `UTC − local`, in hours.
    pub utc_minus_local_hours: i64,
}

impl LocalOffset {
    pub fn utc() -> Self {
        Self {
            zone: None,
            utc_minus_local_hours: 0,
        }
    }
}

/// Maps coordinates to a fixed UTC offset.
///
/// Holds the point-in-polygon finder so its boundary data are loaded once
/// per run.
pub struct TimezoneResolver {
    finder: DefaultFinder,
}

impl TimezoneResolver {
    pub fn new() -> Self {
        Self {
            finder: DefaultFinder::new(),
        }
    }

    /// IANA zone name containing the point, if any.
    pub fn zone_name(&self, latitude: f64, longitude: f64) -> Option<String> {
        let name = self.finder.get_tz_name(longitude, latitude);
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    /// Resolves the offset for a gauge. An explicit `zone_override` takes
    /// precedence over the coordinate lookup. Falls back to UTC (with a
    /// warning) when no zone can be determined.
    pub fn resolve(
        &self,
        site_id: &str,
        latitude: f64,
        longitude: f64,
        zone_override: Option<&str>,
    ) -> LocalOffset {
        let zone = zone_override
            .map(str::to_string)
            .or_else(|| self.zone_name(latitude, longitude));

        let Some(zone) = zone else {
            logging::warn(
                DataSource::Pipeline,
                Some(site_id),
                &format!("No timezone found at ({}, {}); using UTC", latitude, longitude),
            );
            return LocalOffset::utc();
        };

        match fixed_offset_hours(&zone, latitude) {
            Some(hours) => {
                logging::debug(
                    DataSource::Pipeline,
                    Some(site_id),
                    &format!("Timezone {} -> UTC - local = {} h", zone, hours),
                );
                LocalOffset {
                    zone: Some(zone),
                    utc_minus_local_hours: hours,
                }
            }
            None => {
                logging::warn(
                    DataSource::Pipeline,
                    Some(site_id),
                    &format!("Unrecognised timezone '{}'; using UTC", zone),
                );
                LocalOffset::utc()
            }
        }
    }
}

impl Default for TimezoneResolver {
    fn default() -> Self {
        Self::new()
    }
}
