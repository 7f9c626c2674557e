use crate::error::TrackerError;
use crate::health::evaluator::AttributeAssessment;
use crate::health::thermal::ThermalSummary;
use crate::health::tracker::{OverrideMode, TestKind, TestTracker};
use crate::models::sample::SampleSequence;
use crate::models::severity::{Severity, Verdict};
use crate::models::status::TestStatus;
use crate::recovery::controller::RecoveryReport;
use crate::recovery::stage::ControllerState;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DeviceType {
    NVMe,
    SSD,
    HDD,
    Virtual,
    Unknown,
}

impl DeviceType {
    pub fn label(&self) -> &'static str {
        match self {
            DeviceType::NVMe    => "NVMe",
            DeviceType::SSD     => "SSD",
            DeviceType::HDD     => "HDD",
            DeviceType::Virtual => "VRT",
            DeviceType::Unknown => "?",
        }
    }

    /// Guess the kind from the kernel name, transport and rotation flag.
    pub fn infer(name: &str, transport: Option<&str>, rotational: Option<bool>) -> DeviceType {
        let tran = transport.unwrap_or("").to_lowercase();
        if tran == "nvme" || name.starts_with("nvme") {
            DeviceType::NVMe
        } else if rotational == Some(true) {
            DeviceType::HDD
        } else if name.starts_with("md")
            || name.starts_with("dm-")
            || name.starts_with("loop")
            || name.starts_with("zram")
        {
            DeviceType::Virtual
        } else if rotational == Some(false) {
            DeviceType::SSD
        } else {
            DeviceType::Unknown
        }
    }
}

/// One device under test: everything the assessment learned about it.
///
/// The test tracker and the recovery pass records are written only by the
/// thread that owns this value.
#[derive(Debug, Clone)]
pub struct Device {
    pub name:           String,
    pub model:          Option<String>,
    pub serial:         Option<String>,
    pub dev_type:       DeviceType,
    pub capacity_bytes: u64,
    pub attributes:     AttributeAssessment,
    pub samples:        Option<SampleSequence>,
    pub bench_verdict:  Option<Verdict>,
    pub thermal:        Option<ThermalSummary>,
    pub tests:          TestTracker,
    pub recovery:       Option<RecoveryReport>,
}

impl Device {
    pub fn new(name: impl Into<String>, mode: OverrideMode) -> Self {
        Self {
            name:           name.into(),
            model:          None,
            serial:         None,
            dev_type:       DeviceType::Unknown,
            capacity_bytes: 0,
            attributes:     AttributeAssessment::default(),
            samples:        None,
            bench_verdict:  None,
            thermal:        None,
            tests:          TestTracker::new(mode),
            recovery:       None,
        }
    }

    pub fn model_str(&self) -> &str {
        self.model.as_deref().unwrap_or("")
    }

    /// Record the attribute evaluation. Error-tier attributes fail the
    /// attribute test; blocking ones are attached so no override clears them.
    pub fn apply_attributes(&mut self, assessment: AttributeAssessment) -> Result<(), TrackerError> {
        for e in assessment.blocking_failures() {
            let reason = e.reason.clone().unwrap_or_else(|| e.name.clone());
            self.tests.record_blocking(TestKind::DiskAttributes, reason);
        }
        let fails: Vec<&str> = assessment.failures().filter_map(|e| e.reason.as_deref()).collect();
        let result = if fails.is_empty() {
            let n = assessment.evaluations.len();
            self.tests.set_result_with_detail(
                TestKind::DiskAttributes,
                TestStatus::Cs,
                Some(format!("{} attribute(s) checked", n)),
            )
        } else if self.tests.status(TestKind::DiskAttributes) == Some(TestStatus::Error) {
            // record_blocking already created the failed entry
            Ok(())
        } else {
            self.tests.set_result_with_detail(TestKind::DiskAttributes, TestStatus::Error, Some(fails.join("; ")))
        };
        self.attributes = assessment;
        result
    }

    pub fn apply_self_test(&mut self, status: TestStatus) -> Result<(), TrackerError> {
        self.tests.set_result(TestKind::DiskSelfTest, status)
    }

    /// Store the benchmark run. A WARN verdict still completes the test; its
    /// reason surfaces through [`verdict`](Self::verdict).
    pub fn apply_benchmark(&mut self, samples: SampleSequence, verdict: Verdict) -> Result<(), TrackerError> {
        let status = status_for(&verdict);
        let detail = verdict.reason().map(str::to_string);
        self.samples = Some(samples);
        self.bench_verdict = Some(verdict);
        self.tests.set_result_with_detail(TestKind::DiskBenchmark, status, detail)
    }

    pub fn apply_thermal(&mut self, summary: ThermalSummary) -> Result<(), TrackerError> {
        let status = status_for(&summary.verdict);
        let detail = summary.verdict.reason().map(str::to_string);
        self.thermal = Some(summary);
        self.tests.set_result_with_detail(TestKind::CpuCooling, status, detail)
    }

    /// Fold a finished (or cancelled) recovery run into the test record.
    pub fn apply_recovery(&mut self, report: RecoveryReport) -> Result<(), TrackerError> {
        let status = match report.final_state {
            ControllerState::Done   => TestStatus::Cs,
            ControllerState::Failed => TestStatus::Error,
            _ if report.cancelled   => TestStatus::Aborted,
            _                       => TestStatus::Unknown,
        };
        let detail = report.verdict().reason().map(str::to_string);
        self.recovery = Some(report);
        self.tests.set_result_with_detail(TestKind::DiskRecovery, status, detail)
    }

    /// Worst of the test results (after overrides) and any advisory
    /// warnings that did not fail a test.
    pub fn verdict(&self) -> Verdict {
        let mut v = self.tests.verdict().worst(self.attributes.warnings());
        for advisory in [self.bench_verdict.as_ref(), self.thermal.as_ref().map(|t| &t.verdict)] {
            if let Some(w @ Verdict::Warn(_)) = advisory {
                v = v.worst(w.clone());
            }
        }
        v
    }

    pub fn severity(&self) -> Severity {
        self.verdict().severity()
    }
}

fn status_for(verdict: &Verdict) -> TestStatus {
    match verdict.severity() {
        Severity::Fail => TestStatus::Error,
        _              => TestStatus::Cs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::evaluator::{default_overlays, default_thresholds, evaluate_all, RawAttribute, ThresholdTable};

    fn table() -> ThresholdTable {
        ThresholdTable::new(&default_thresholds(), &default_overlays()).unwrap()
    }

    fn assess(attrs: &[(&str, &str, &str)]) -> AttributeAssessment {
        evaluate_all(attrs.iter().map(|(i, n, r)| RawAttribute::new(*i, *n, *r)), "WDC WD10EZEX", &table())
    }

    #[test]
    fn infer_type() {
        assert_eq!(DeviceType::infer("nvme0n1", None, None), DeviceType::NVMe);
        assert_eq!(DeviceType::infer("sda", Some("sata"), Some(true)), DeviceType::HDD);
        assert_eq!(DeviceType::infer("sdb", Some("usb"), Some(false)), DeviceType::SSD);
        assert_eq!(DeviceType::infer("dm-0", None, None), DeviceType::Virtual);
        assert_eq!(DeviceType::infer("sdz", None, None), DeviceType::Unknown);
    }

    #[test]
    fn non_blocking_failure_can_be_overridden_in_limited_mode() {
        let mut d = Device::new("sda", OverrideMode::Limited);
        d.apply_attributes(assess(&[("199", "UDMA_CRC_Error_Count", "500")])).unwrap();
        assert_eq!(d.severity(), Severity::Fail);
        d.tests.override_result(TestKind::DiskAttributes, "cable replaced").unwrap();
        assert_eq!(d.severity(), Severity::Warn);
        let reason = d.verdict().reason().unwrap().to_string();
        assert!(reason.contains("OVERRIDE (was ERROR: cable replaced)"), "{}", reason);
    }

    #[test]
    fn blocking_failure_fails_device_and_refuses_override() {
        let mut d = Device::new("sda", OverrideMode::Forced);
        d.apply_attributes(assess(&[("197", "Current_Pending_Sector", "1"), ("9", "Power_On_Hours", "100")]))
            .unwrap();
        assert_eq!(d.severity(), Severity::Fail);
        assert!(matches!(
            d.tests.override_result(TestKind::DiskAttributes, "looks fine"),
            Err(TrackerError::Blocking { .. })
        ));
        assert!(d.verdict().reason().unwrap().contains("Current_Pending_Sector = 1"));
    }

    #[test]
    fn warnings_and_malformed_fields_warn_without_failing() {
        let mut d = Device::new("sda", OverrideMode::None);
        d.apply_attributes(assess(&[("5", "Reallocated_Sector_Ct", "3"), ("9", "Power_On_Hours", "n/a")]))
            .unwrap();
        assert_eq!(d.tests.status(TestKind::DiskAttributes), Some(TestStatus::Cs));
        assert_eq!(d.severity(), Severity::Warn);
    }

    #[test]
    fn benchmark_warning_is_advisory() {
        let mut d = Device::new("sda", OverrideMode::None);
        d.apply_attributes(assess(&[])).unwrap();
        let samples: SampleSequence = [1e8, 1e8].into_iter().collect();
        d.apply_benchmark(samples, Verdict::Warn("average 95.37 MB/s".into())).unwrap();
        assert_eq!(d.tests.status(TestKind::DiskBenchmark), Some(TestStatus::Cs));
        assert_eq!(d.verdict(), Verdict::Warn("average 95.37 MB/s".into()));
    }
}
