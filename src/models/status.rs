use crate::models::severity::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed status vocabulary for one test on one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestStatus {
    #[serde(rename = "CS")]
    Cs,
    Aborted,
    Denied,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "N/A")]
    NotApplicable,
    #[serde(rename = "NS")]
    Ns,
    #[serde(rename = "OVERRIDE")]
    Override,
    TimedOut,
    Unknown,
    Working,
}

impl TestStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TestStatus::Cs            => "CS",
            TestStatus::Aborted       => "Aborted",
            TestStatus::Denied        => "Denied",
            TestStatus::Error         => "ERROR",
            TestStatus::NotApplicable => "N/A",
            TestStatus::Ns            => "NS",
            TestStatus::Override      => "OVERRIDE",
            TestStatus::TimedOut      => "TimedOut",
            TestStatus::Unknown       => "Unknown",
            TestStatus::Working       => "Working",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            TestStatus::Cs => Severity::Pass,
            TestStatus::Aborted
            | TestStatus::NotApplicable
            | TestStatus::Override
            | TestStatus::Unknown
            | TestStatus::Working => Severity::Warn,
            TestStatus::Denied
            | TestStatus::Error
            | TestStatus::Ns
            | TestStatus::TimedOut => Severity::Fail,
        }
    }

    /// CS and every FAIL-tier status end the test.
    pub fn is_terminal(&self) -> bool {
        *self == TestStatus::Cs || self.severity() == Severity::Fail
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_mapping_is_fixed() {
        assert_eq!(TestStatus::Cs.severity(), Severity::Pass);
        for s in [TestStatus::Aborted, TestStatus::NotApplicable, TestStatus::Override,
                  TestStatus::Unknown, TestStatus::Working] {
            assert_eq!(s.severity(), Severity::Warn, "{}", s);
            assert!(!s.is_terminal());
        }
        for s in [TestStatus::Denied, TestStatus::Error, TestStatus::Ns, TestStatus::TimedOut] {
            assert_eq!(s.severity(), Severity::Fail, "{}", s);
            assert!(s.is_terminal());
        }
    }

    #[test]
    fn serializes_with_short_labels() {
        assert_eq!(serde_json::to_string(&TestStatus::NotApplicable).unwrap(), "\"N/A\"");
        assert_eq!(serde_json::to_string(&TestStatus::Cs).unwrap(), "\"CS\"");
    }
}
