//! Pre-submission checks.
//!
//! Re-checks the gauge registry and confirms that every table this crate
//! writes is present under the output directory. Checks never stop at the
//! first failure; the report lists every one.

use std::path::PathBuf;

use crate::config::Settings;
use crate::gauges::{self, GaugeLocation};
use crate::logging::{self, DataSource};

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub label: String,
    pub status: CheckStatus,
    /// Required paths that do not exist.
    pub missing: Vec<PathBuf>,
    pub error_message: Option<String>,
}

impl CheckResult {
    fn passed(label: &str) -> Self {
        Self {
            label: label.to_string(),
            status: CheckStatus::Passed,
            missing: Vec::new(),
            error_message: None,
        }
    }

    fn failed(label: &str, message: String) -> Self {
        Self {
            label: label.to_string(),
            status: CheckStatus::Failed,
            missing: Vec::new(),
            error_message: Some(message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmissionReport {
    pub checks: Vec<CheckResult>,
}

impl SubmissionReport {
    pub fn failures(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Failed)
            .count()
    }

    pub fn is_ready(&self) -> bool {
        self.failures() == 0
    }
}

// ============================================================================
// Checks
// ============================================================================

/// Registry rules: at least one gauge, valid unique ids and coordinates, and
/// every id prefixed with the configured region.
pub fn check_gauge_ids(settings: &Settings, gauges: &[GaugeLocation]) -> CheckResult {
    const LABEL: &str = "gauge ids are unique, two-part and in the region";

    if gauges.is_empty() {
        return CheckResult::failed(LABEL, "no gauges configured".to_string());
    }
    if let Err(e) = gauges::validate_gauges(gauges) {
        return CheckResult::failed(LABEL, e.to_string());
    }
    let foreign: Vec<&str> = gauges
        .iter()
        .filter(|g| g.region() != settings.region)
        .map(|g| g.gauge_id.as_str())
        .collect();
    if !foreign.is_empty() {
        return CheckResult::failed(
            LABEL,
            format!("not in region '{}': {}", settings.region, foreign.join(", ")),
        );
    }
    CheckResult::passed(LABEL)
}

/// Every file the `streamflow`, `forcing` and `attributes` commands write.
pub fn required_output_files(settings: &Settings, gauges: &[GaugeLocation]) -> Vec<PathBuf> {
    gauges
        .iter()
        .map(|g| settings.timeseries_path(&g.gauge_id))
        .chain([settings.attributes_other_path(), settings.attributes_caravan_path()])
        .collect()
}

pub fn check_output_files(settings: &Settings, gauges: &[GaugeLocation]) -> CheckResult {
    const LABEL: &str = "required output files are present";

    let required = required_output_files(settings, gauges);
    let missing: Vec<PathBuf> = required.iter().filter(|p| !p.exists()).cloned().collect();
    if missing.is_empty() {
        return CheckResult::passed(LABEL);
    }
    let message = format!("{} of {} paths missing", missing.len(), required.len());
    CheckResult {
        missing,
        ..CheckResult::failed(LABEL, message)
    }
}

pub fn validate_submission(settings: &Settings, gauges: &[GaugeLocation]) -> SubmissionReport {
    SubmissionReport {
        checks: vec![check_gauge_ids(settings, gauges), check_output_files(settings, gauges)],
    }
}

/// Logs one line per check and one per missing path.
pub fn log_report(report: &SubmissionReport) {
    for check in &report.checks {
        match check.status {
            CheckStatus::Passed => logging::info(DataSource::Filesystem, None, &format!("[OK]   {}", check.label)),
            CheckStatus::Failed => {
                logging::error(
                    DataSource::Filesystem,
                    None,
                    &format!(
                        "[FAIL] {}: {}",
                        check.label,
                        check.error_message.as_deref().unwrap_or("unknown")
                    ),
                );
                for path in &check.missing {
                    logging::error(DataSource::Filesystem, None, &format!("       missing: {}", path.display()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gauges::StreamflowApi;
    use chrono::NaiveDate;
    use std::fs;

    fn gauge(id: &str) -> GaugeLocation {
        GaugeLocation {
            gauge_id: id.to_string(),
            station_id: id.split('_').nth(1).unwrap_or("").to_string(),
            name: format!("Gauge {}", id),
            lat: -37.7,
            lon: 144.8,
            area_km2: 100.0,
            api: StreamflowApi::Hydstra,
            fetch_start: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            timezone: None,
            notes: None,
        }
    }

    fn settings_in(dir: &std::path::Path) -> Settings {
        Settings {
            output_dir: dir.to_path_buf(),
            ..Settings::default()
        }
    }

    #[test]
    fn test_gauge_ids_pass_for_valid_registry() {
        let settings = Settings::default();
        let check = check_gauge_ids(&settings, &[gauge("ausvic_230200"), gauge("ausvic_230104")]);
        assert_eq!(check.status, CheckStatus::Passed, "{:?}", check.error_message);
    }

    #[test]
    fn test_gauge_ids_fail_for_empty_duplicate_or_foreign() {
        let settings = Settings::default();
        assert_eq!(check_gauge_ids(&settings, &[]).status, CheckStatus::Failed);

        let dup = check_gauge_ids(&settings, &[gauge("ausvic_230200"), gauge("ausvic_230200")]);
        assert_eq!(dup.status, CheckStatus::Failed);
        assert!(dup.error_message.unwrap().contains("duplicate"));

        let foreign = check_gauge_ids(&settings, &[gauge("ausnsw_210001")]);
        assert_eq!(foreign.status, CheckStatus::Failed);
        assert!(foreign.error_message.unwrap().contains("ausnsw_210001"));
    }

    #[test]
    fn test_required_files_cover_every_gauge_and_both_attribute_tables() {
        let settings = settings_in(std::path::Path::new("out"));
        let files = required_output_files(&settings, &[gauge("ausvic_230200"), gauge("ausvic_230104")]);
        assert_eq!(
            files,
            vec![
                PathBuf::from("out/timeseries/csv/ausvic/ausvic_230200.csv"),
                PathBuf::from("out/timeseries/csv/ausvic/ausvic_230104.csv"),
                PathBuf::from("out/attributes/ausvic/attributes_other_ausvic.csv"),
                PathBuf::from("out/attributes/ausvic/attributes_caravan_ausvic.csv"),
            ]
        );
    }

    #[test]
    fn test_missing_outputs_are_all_listed() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let gauges = [gauge("ausvic_230200"), gauge("ausvic_230104")];

        fs::create_dir_all(settings.timeseries_dir()).unwrap();
        fs::write(settings.timeseries_path("ausvic_230200"), "date,streamflow\n").unwrap();

        let check = check_output_files(&settings, &gauges);
        assert_eq!(check.status, CheckStatus::Failed);
        assert_eq!(
            check.missing,
            vec![
                settings.timeseries_path("ausvic_230104"),
                settings.attributes_other_path(),
                settings.attributes_caravan_path(),
            ]
        );
        assert_eq!(check.error_message.as_deref(), Some("3 of 4 paths missing"));
    }

    #[test]
    fn test_complete_tree_is_ready() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let gauges = [gauge("ausvic_230200")];

        fs::create_dir_all(settings.timeseries_dir()).unwrap();
        fs::create_dir_all(settings.attributes_dir()).unwrap();
        for path in required_output_files(&settings, &gauges) {
            fs::write(path, "").unwrap();
        }

        let report = validate_submission(&settings, &gauges);
        assert!(report.is_ready(), "{:?}", report.checks);
        assert_eq!(report.failures(), 0);
    }
}
