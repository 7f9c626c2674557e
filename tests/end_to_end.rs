use diskrx::config::Config;
use diskrx::error::TrackerError;
use diskrx::health::evaluator::{evaluate_all, RawAttribute};
use diskrx::health::tracker::{OverrideMode, TestKind};
use diskrx::models::device::Device;
use diskrx::models::pass::AttemptOutcome;
use diskrx::models::severity::Severity;
use diskrx::recovery::controller::{CancelToken, PassController, RecoveryConfig};
use diskrx::recovery::progress::RemainingTime;
use diskrx::recovery::stage::{ControllerState, Stage};
use diskrx::recovery::tool::Ddrescue;
use diskrx::report;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

fn device_with(mode: OverrideMode, model: &str, attrs: &[(&str, &str, &str)]) -> Device {
    let cfg = Config::default();
    let table = cfg.threshold_table().unwrap();
    let mut dev = Device::new("sdb", mode);
    dev.model = Some(model.to_string());
    let raw = attrs.iter().map(|(id, name, raw)| RawAttribute::new(*id, *name, *raw));
    dev.apply_attributes(evaluate_all(raw, model, &table)).unwrap();
    dev
}

#[test]
fn blocking_attribute_at_error_threshold_stays_failed() {
    for mode in [OverrideMode::Limited, OverrideMode::Forced] {
        let mut dev = device_with(mode, "ST1000DM010", &[
            ("197", "Current_Pending_Sector", "1"),
            ("199", "UDMA_CRC_Error_Count", "0"),
        ]);
        assert_eq!(dev.severity(), Severity::Fail, "{:?}", mode);

        let err = dev.tests.override_result(TestKind::DiskAttributes, "customer accepts risk").unwrap_err();
        assert!(matches!(err, TrackerError::Blocking { .. }), "{:?}", mode);
        assert_eq!(dev.severity(), Severity::Fail, "{:?}", mode);
        assert!(dev.verdict().reason().unwrap().contains("Current_Pending_Sector = 1 (≥ error threshold 1)"));
    }
}

#[test]
fn model_overlay_tightens_reallocated_sectors() {
    let attrs = [("5", "Reallocated_Sector_Ct", "1")];
    let generic = device_with(OverrideMode::Limited, "WDC WD10EZEX", &attrs);
    assert_eq!(generic.severity(), Severity::Warn);
    let crucial = device_with(OverrideMode::Limited, "CT500MX500SSD1", &attrs);
    assert_eq!(crucial.severity(), Severity::Fail);
    let json = report::device_json(&crucial);
    assert!(json["attributes"][0]["source"].as_str().unwrap().starts_with("overlay"));
}

#[test]
fn limited_override_clears_a_non_blocking_failure() {
    let mut dev = device_with(OverrideMode::Limited, "WDC WD10EZEX", &[("198", "Offline_Uncorrectable", "4")]);
    assert_eq!(dev.severity(), Severity::Fail);
    dev.tests.override_result(TestKind::DiskAttributes, "known firmware counter bug").unwrap();
    assert_eq!(dev.severity(), Severity::Warn);

    let mut none = device_with(OverrideMode::None, "WDC WD10EZEX", &[("198", "Offline_Uncorrectable", "4")]);
    assert_eq!(
        none.tests.override_result(TestKind::DiskAttributes, "x").unwrap_err(),
        TrackerError::OverridesDisabled
    );
}

/// Stand-in for ddrescue: prints a status block whose percentage depends on
/// which phase switches it was given.
const FAKE_DDRESCUE: &str = r#"#!/bin/sh
case "$*" in
  *--no-trim*)   pct="96.00";  rem="1m 5s" ;;
  *--no-scrape*) pct="99.50";  rem="n/a" ;;
  *)             pct="100.00"; rem="n/a" ;;
esac
printf '     ipos:    1048 MB, non-trimmed:        0 B,  current rate:   2048 kB/s\r\n'
printf 'pct rescued:   %s%%, read errors:        3,  remaining time:  %s\r\n' "$pct" "$rem"
exit 0
"#;

fn install_fake(dir: &Path) -> String {
    let path = dir.join("fake-ddrescue");
    fs::write(&path, FAKE_DDRESCUE).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn recovery_runs_all_stages_against_a_real_process() {
    let tmp = tempfile::tempdir().unwrap();
    let tool = Ddrescue {
        binary: install_fake(tmp.path()),
        source: "/dev/null".into(),
        dest:   tmp.path().join("disk.img"),
        map:    tmp.path().join("disk.map"),
        force:  false,
    };
    let cfg = RecoveryConfig { poll_interval_ms: 20, kill_grace_secs: 1, ..RecoveryConfig::default() };
    cfg.validate().unwrap();

    let report = PassController::new("null", &tool, &cfg).run(&CancelToken::new()).unwrap();

    use ControllerState::*;
    assert_eq!(report.trace, vec![Trim, Trim, Scrape, Done]);
    assert_eq!(report.final_pct, 100.0);
    assert_eq!(report.verdict().severity(), Severity::Pass);

    let first = &report.passes[0];
    assert_eq!(first.stage, Stage::Read);
    assert_eq!(first.completion_pct, 96.0);
    assert_eq!(first.outcome, AttemptOutcome::Completed);
    assert_eq!(first.last_rate, Some(2_048_000.0));
    assert_eq!(first.read_errors, Some(3));
    assert_eq!(first.remaining, Some(RemainingTime::Estimate(std::time::Duration::from_secs(65))));
    assert_eq!(report.passes[1].remaining, Some(RemainingTime::NotAvailable));

    let mut dev = Device::new("null", OverrideMode::None);
    dev.apply_recovery(report).unwrap();
    assert_eq!(dev.severity(), Severity::Pass);
    let text = report::device_text(&dev, &Config::default(), false);
    assert!(text.contains("trace: TRIM -> TRIM -> SCRAPE -> DONE"), "{}", text);
}
