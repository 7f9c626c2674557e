//! Per-device test status bookkeeping and the technician override policy.

use crate::error::TrackerError;
use crate::models::severity::{Severity, Verdict};
use crate::models::status::TestStatus;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    CpuCooling,
    DiskAttributes,
    DiskSelfTest,
    DiskBenchmark,
    DiskRecovery,
}

impl TestKind {
    pub fn label(&self) -> &'static str {
        match self {
            TestKind::CpuCooling     => "CPU & Cooling",
            TestKind::DiskAttributes => "Disk Attributes",
            TestKind::DiskSelfTest   => "Disk Self-Test",
            TestKind::DiskBenchmark  => "Disk I/O Benchmark",
            TestKind::DiskRecovery   => "Disk Recovery",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideMode {
    #[default]
    None,
    /// Only attribute-derived failures without a blocking attribute.
    Limited,
    /// Any failure except blocking attributes. Technician judgement only.
    Forced,
}

/// `[overrides]` section.
///
/// ```toml
/// [overrides]
/// mode = "limited"   # "none", "limited" or "forced"; wins over the flags below
/// limited = true
/// forced  = false    # USE WITH EXTREME CAUTION
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode:    Option<OverrideMode>,
    #[serde(default)]
    pub limited: bool,
    #[serde(default)]
    pub forced:  bool,
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self { mode: None, limited: true, forced: false }
    }
}

impl OverrideConfig {
    /// An explicit `mode` wins. Otherwise Limited beats Forced when both
    /// flags are set; Forced has to be the only flag to take effect.
    pub fn resolve(&self) -> OverrideMode {
        if let Some(mode) = self.mode {
            return mode;
        }
        match (self.limited, self.forced) {
            (true, _)      => OverrideMode::Limited,
            (false, true)  => OverrideMode::Forced,
            (false, false) => OverrideMode::None,
        }
    }
}

/// Audit trail for one override; the original status is never lost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverrideRecord {
    pub original: TestStatus,
    pub reason:   String,
    pub mode:     OverrideMode,
    pub at:       DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestEntry {
    pub status:     TestStatus,
    pub detail:     Option<String>,
    pub overridden: Option<OverrideRecord>,
    /// Reasons of blocking attribute failures attached to this test.
    pub blocking:   Vec<String>,
}

impl TestEntry {
    fn new(status: TestStatus, detail: Option<String>) -> Self {
        Self { status, detail, overridden: None, blocking: Vec::new() }
    }

    pub fn severity(&self) -> Severity {
        if !self.blocking.is_empty() { Severity::Fail } else { self.status.severity() }
    }

    fn verdict(&self, kind: TestKind) -> Verdict {
        if !self.blocking.is_empty() {
            return Verdict::Fail(format!("{}: blocking {}", kind, self.blocking.join(", ")));
        }
        let mut text = format!("{}: {}", kind, self.status);
        if let Some(o) = &self.overridden {
            text.push_str(&format!(" (was {}: {})", o.original, o.reason));
        } else if let Some(d) = &self.detail {
            text.push_str(&format!(" ({})", d));
        }
        match self.status.severity() {
            Severity::Pass => Verdict::Pass,
            Severity::Warn => Verdict::Warn(text),
            Severity::Fail => Verdict::Fail(text),
        }
    }
}

/// Test results for one device. Only the device's control thread writes it.
#[derive(Debug, Clone)]
pub struct TestTracker {
    mode:    OverrideMode,
    entries: BTreeMap<TestKind, TestEntry>,
}

impl TestTracker {
    pub fn new(mode: OverrideMode) -> Self {
        Self { mode, entries: BTreeMap::new() }
    }

    pub fn mode(&self) -> OverrideMode { self.mode }

    pub fn set_result(&mut self, kind: TestKind, status: TestStatus) -> Result<(), TrackerError> {
        self.set_result_with_detail(kind, status, None)
    }

    /// Record a status. CS and FAIL-tier results are final unless overridden,
    /// and an overridden result is final too.
    pub fn set_result_with_detail(
        &mut self,
        kind:   TestKind,
        status: TestStatus,
        detail: Option<String>,
    ) -> Result<(), TrackerError> {
        if let Some(entry) = self.entries.get_mut(&kind) {
            if let Some(o) = &entry.overridden {
                return Err(TrackerError::Overridden { kind: kind.to_string(), original: o.original });
            }
            if entry.status.is_terminal() {
                return Err(TrackerError::Terminal { kind: kind.to_string(), status: entry.status });
            }
            let blocking = std::mem::take(&mut entry.blocking);
            *entry = TestEntry::new(status, detail);
            entry.blocking = blocking;
            return Ok(());
        }
        self.entries.insert(kind, TestEntry::new(status, detail));
        Ok(())
    }

    /// Attach a blocking attribute failure; it fails the test for good.
    pub fn record_blocking(&mut self, kind: TestKind, reason: impl Into<String>) {
        let entry = self.entries
            .entry(kind)
            .or_insert_with(|| TestEntry::new(TestStatus::Error, None));
        entry.blocking.push(reason.into());
    }

    pub fn entry(&self, kind: TestKind) -> Option<&TestEntry> {
        self.entries.get(&kind)
    }

    pub fn entries(&self) -> impl Iterator<Item = (TestKind, &TestEntry)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn status(&self, kind: TestKind) -> Option<TestStatus> {
        self.entries.get(&kind).map(|e| e.status)
    }

    /// Severity of one test; a test that never ran counts as N/A.
    pub fn severity(&self, kind: TestKind) -> Severity {
        self.entries
            .get(&kind)
            .map(|e| e.severity())
            .unwrap_or_else(|| TestStatus::NotApplicable.severity())
    }

    /// Turn a failed result into OVERRIDE, keeping the original for audit.
    pub fn override_result(
        &mut self,
        kind:   TestKind,
        reason: impl Into<String>,
    ) -> Result<&OverrideRecord, TrackerError> {
        let mode = self.mode;
        if mode == OverrideMode::None {
            return Err(TrackerError::OverridesDisabled);
        }
        let entry = self.entries.get_mut(&kind).ok_or(TrackerError::NotFailed {
            kind:   kind.to_string(),
            status: TestStatus::NotApplicable,
        })?;
        if !entry.blocking.is_empty() {
            return Err(TrackerError::Blocking { kind: kind.to_string(), reasons: entry.blocking.join(", ") });
        }
        if entry.status.severity() != Severity::Fail {
            return Err(TrackerError::NotFailed { kind: kind.to_string(), status: entry.status });
        }
        if mode == OverrideMode::Limited && kind != TestKind::DiskAttributes {
            return Err(TrackerError::NotOverridable { kind: kind.to_string() });
        }

        let record = OverrideRecord {
            original: entry.status,
            reason:   reason.into(),
            mode,
            at:       Local::now(),
        };
        tracing::warn!(test = %kind, original = %record.original, reason = %record.reason, "result overridden");
        entry.status = TestStatus::Override;
        Ok(&*entry.overridden.insert(record))
    }

    /// Worst result across all tests, after overrides. Blocking failures
    /// always fail.
    pub fn verdict(&self) -> Verdict {
        self.entries
            .iter()
            .map(|(k, e)| e.verdict(*k))
            .fold(Verdict::Pass, Verdict::worst)
    }
}
