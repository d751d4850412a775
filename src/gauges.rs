/// Gauge registry for the Caravan extension.
///
/// Gauges are declared in the `[[gauges]]` tables of `caravan.toml` and
/// validated once at load time. Every other module takes a `GaugeLocation`
/// from here rather than carrying coordinates or station ids of its own.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::model::PipelineError;

// ---------------------------------------------------------------------------
// Gauge metadata
// ---------------------------------------------------------------------------

/// Which streamflow service publishes a gauge's daily flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamflowApi {
    /// Victorian Water Measurement Information System (Hydstra web service).
    Hydstra,
    /// Melbourne Water river-flow API.
    MelbWater,
}

/// Metadata for one gauge.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GaugeLocation {
    /// Caravan id, `<region>_<station number>`.
    pub gauge_id: String,
    /// Station id as the streamflow API knows it.
    pub station_id: String,
    pub name: String,
    /// WGS84 latitude.
    pub lat: f64,
    /// WGS84 longitude.
    pub lon: f64,
    /// Catchment area in km².
    pub area_km2: f64,
    pub api: StreamflowApi,
    /// First date requested from the streamflow API.
    pub fetch_start: NaiveDate,
    /// IANA zone overriding the coordinate lookup.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl GaugeLocation {
    /// The region prefix of the gauge id (`ausvic` for `ausvic_230200`).
    pub fn region(&self) -> &str {
        self.gauge_id.split('_').next().unwrap_or("")
    }
}

/// Caravan gauge ids have exactly two parts: a lowercase alphanumeric region
/// prefix and an alphanumeric station part, joined by one underscore.
pub fn is_valid_gauge_id(gauge_id: &str) -> bool {
    let parts: Vec<&str> = gauge_id.split('_').collect();
    if parts.len() != 2 {
        return false;
    }
    let (prefix, station) = (parts[0], parts[1]);
    !prefix.is_empty()
        && !station.is_empty()
        && prefix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && station.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Checks ids, coordinates and areas across the whole registry.
pub fn validate_gauges(gauges: &[GaugeLocation]) -> Result<(), PipelineError> {
    let mut seen = HashSet::new();
    for gauge in gauges {
        let id = &gauge.gauge_id;
        if !is_valid_gauge_id(id) {
            return Err(PipelineError::Config(format!(
                "gauge id '{}' must look like <region>_<station>",
                id
            )));
        }
        if !seen.insert(id.as_str()) {
            return Err(PipelineError::Config(format!("duplicate gauge id '{}'", id)));
        }
        if !(-90.0..=90.0).contains(&gauge.lat) {
            return Err(PipelineError::Config(format!(
                "gauge '{}' latitude {} out of range",
                id, gauge.lat
            )));
        }
        if !(-180.0..=180.0).contains(&gauge.lon) {
            return Err(PipelineError::Config(format!(
                "gauge '{}' longitude {} out of range",
                id, gauge.lon
            )));
        }
        if !(gauge.area_km2 > 0.0) {
            return Err(PipelineError::Config(format!(
                "gauge '{}' area must be positive, got {}",
                id, gauge.area_km2
            )));
        }
    }
    Ok(())
}

/// Looks up a gauge by id. Returns `None` if not found.
pub fn find_gauge<'a>(gauges: &'a [GaugeLocation], gauge_id: &str) -> Option<&'a GaugeLocation> {
    gauges.iter().find(|g| g.gauge_id == gauge_id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn keilor() -> GaugeLocation {
        GaugeLocation {
            gauge_id: "ausvic_230200".to_string(),
            station_id: "230200".to_string(),
            name: "Maribyrnong River at Keilor".to_string(),
            lat: -37.727706090,
            lon: 144.836476100,
            area_km2: 1305.4,
            api: StreamflowApi::Hydstra,
            fetch_start: NaiveDate::from_ymd_opt(1907, 5, 20).unwrap(),
            timezone: None,
            notes: None,
        }
    }

    #[test]
    fn test_gauge_id_format() {
        assert!(is_valid_gauge_id("ausvic_230200"));
        assert!(is_valid_gauge_id("camels_01013500"));
        assert!(!is_valid_gauge_id("ausvic230200"), "missing separator");
        assert!(!is_valid_gauge_id("aus_vic_230200"), "three parts");
        assert!(!is_valid_gauge_id("AusVic_230200"), "uppercase prefix");
        assert!(!is_valid_gauge_id("ausvic_"), "empty station part");
    }

    #[test]
    fn test_region_is_id_prefix() {
        assert_eq!(keilor().region(), "ausvic");
    }

    #[test]
    fn test_valid_registry_passes() {
        let mut sunbury = keilor();
        sunbury.gauge_id = "ausvic_230104".to_string();
        assert!(validate_gauges(&[keilor(), sunbury]).is_ok());
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let err = validate_gauges(&[keilor(), keilor()]).unwrap_err();
        assert!(err.to_string().contains("duplicate"), "got: {}", err);
    }

    #[test]
    fn test_out_of_range_coordinates_are_rejected() {
        let mut g = keilor();
        g.lat = -137.7;
        assert!(validate_gauges(&[g]).is_err(), "latitude beyond -90 must fail");

        let mut g = keilor();
        g.lon = 244.8;
        assert!(validate_gauges(&[g]).is_err(), "longitude beyond 180 must fail");
    }

    #[test]
    fn test_non_positive_area_is_rejected() {
        let mut g = keilor();
        g.area_km2 = 0.0;
        assert!(validate_gauges(&[g]).is_err());

        let mut g = keilor();
        g.area_km2 = f64::NAN;
        assert!(validate_gauges(&[g]).is_err(), "NaN area must fail");
    }

    #[test]
    fn test_find_gauge_returns_correct_entry() {
        let gauges = vec![keilor()];
        let gauge = find_gauge(&gauges, "ausvic_230200").expect("Keilor should be in registry");
        assert_eq!(gauge.station_id, "230200");
        assert!(find_gauge(&gauges, "ausvic_000000").is_none());
    }

    #[test]
    fn test_api_names_deserialize_lowercase() {
        let api: StreamflowApi = toml::from_str::<std::collections::HashMap<String, StreamflowApi>>(
            "a = \"melbwater\"\nb = \"hydstra\"",
        )
        .unwrap()["a"];
        assert_eq!(api, StreamflowApi::MelbWater);
    }
}
