use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute-level classification. Later variants win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttrSeverity {
    Ok,
    Warning,
    Error,
    MaximumExceeded,
}

impl AttrSeverity {
    pub fn label(&self) -> &'static str {
        match self {
            AttrSeverity::Ok              => "OK",
            AttrSeverity::Warning         => "WARNING",
            AttrSeverity::Error           => "ERROR",
            AttrSeverity::MaximumExceeded => "MAXIMUM_EXCEEDED",
        }
    }

    /// Test-level tier this attribute result contributes.
    pub fn severity(&self) -> Severity {
        match self {
            AttrSeverity::Ok      => Severity::Pass,
            AttrSeverity::Warning => Severity::Warn,
            AttrSeverity::Error | AttrSeverity::MaximumExceeded => Severity::Fail,
        }
    }
}

/// Test / device level tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Pass,
    Warn,
    Fail,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Pass => "PASS",
            Severity::Warn => "WARN",
            Severity::Fail => "FAIL",
        }
    }

    /// Process exit code in the nagios/cron convention.
    pub fn exit_code(&self) -> i32 {
        match self {
            Severity::Pass => 0,
            Severity::Warn => 1,
            Severity::Fail => 2,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of an evaluator or controller decision. Non-pass outcomes always
/// say why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    Warn(String),
    Fail(String),
}

impl Verdict {
    pub fn severity(&self) -> Severity {
        match self {
            Verdict::Pass    => Severity::Pass,
            Verdict::Warn(_) => Severity::Warn,
            Verdict::Fail(_) => Severity::Fail,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Pass => None,
            Verdict::Warn(r) | Verdict::Fail(r) => Some(r),
        }
    }

    /// Combine two verdicts, keeping the worse one. Reasons of equal
    /// severity are joined.
    pub fn worst(self, other: Verdict) -> Verdict {
        match self.severity().cmp(&other.severity()) {
            std::cmp::Ordering::Greater => self,
            std::cmp::Ordering::Less    => other,
            std::cmp::Ordering::Equal   => match (self, other) {
                (Verdict::Warn(a), Verdict::Warn(b)) => Verdict::Warn(join_reasons(a, b)),
                (Verdict::Fail(a), Verdict::Fail(b)) => Verdict::Fail(join_reasons(a, b)),
                (v, _) => v,
            },
        }
    }
}

fn join_reasons(a: String, b: String) -> String {
    if a.is_empty() { b }
    else if b.is_empty() || a == b { a }
    else { format!("{}; {}", a, b) }
}
