//! Attribute evaluation: one raw SMART / NVMe counter against a threshold
//! table, with model-specific overlays consulted first.

use crate::error::{ConfigError, MalformedAttributeError};
use crate::models::severity::{AttrSeverity, Verdict};
use crate::util::human::fmt_num;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How the raw counter is turned into the value compared against thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conversion {
    /// Compare the raw counter directly.
    #[default]
    Raw,
    /// Raw is a remaining-life percentage; compare `100 - raw` (life used).
    PercentRemaining,
    /// Any non-zero raw value is the error condition.
    Flag,
}

/// Per-attribute limits.
///
/// Example in diskrx.toml:
/// ```toml
/// [[thresholds]]
/// id       = "5"
/// name     = "Reallocated_Sector_Ct"
/// blocking = true
/// warning  = 1
/// error    = 10
/// maximum  = 10000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeThreshold {
    /// ATA attribute id as decimal text ("5", "197") or NVMe log field name.
    pub id:         String,
    #[serde(default)]
    pub name:       String,
    /// A failure of this attribute fails the device and cannot be overridden.
    #[serde(default)]
    pub blocking:   bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning:    Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error:      Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum:    Option<f64>,
    #[serde(default)]
    pub conversion: Conversion,
}

impl AttributeThreshold {
    fn invalid(&self, detail: impl Into<String>) -> ConfigError {
        ConfigError::InvalidThreshold { id: self.id.clone(), detail: detail.into() }
    }

    /// Reject tables the evaluator cannot classify monotonically.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(self.invalid("empty attribute id"));
        }
        for (label, v) in [("warning", self.warning), ("error", self.error), ("maximum", self.maximum)] {
            if let Some(v) = v {
                if !v.is_finite() || v < 0.0 {
                    return Err(self.invalid(format!("{} must be a non-negative number, got {}", label, v)));
                }
            }
        }
        if self.conversion == Conversion::Flag {
            if self.warning.is_some() || self.maximum.is_some() {
                return Err(self.invalid("flag attributes only take an error threshold"));
            }
            return Ok(());
        }
        if self.warning.is_none() && self.error.is_none() && self.maximum.is_none() {
            return Err(self.invalid("no warning, error or maximum threshold"));
        }
        let ordered: Vec<(&str, f64)> = [("warning", self.warning), ("error", self.error), ("maximum", self.maximum)]
            .into_iter()
            .filter_map(|(l, v)| v.map(|v| (l, v)))
            .collect();
        for pair in ordered.windows(2) {
            let ((lo_l, lo), (hi_l, hi)) = (pair[0], pair[1]);
            if lo >= hi {
                return Err(self.invalid(format!("{} ({}) must be below {} ({})",
                    lo_l, fmt_num(lo), hi_l, fmt_num(hi))));
            }
        }
        if self.conversion == Conversion::PercentRemaining {
            if let Some((l, v)) = ordered.iter().find(|(_, v)| *v > 100.0) {
                return Err(self.invalid(format!("{} ({}) exceeds 100%", l, fmt_num(*v))));
            }
        }
        Ok(())
    }

    /// Raw counter -> compared value.
    pub fn convert(&self, id: &str, raw: f64) -> Result<f64, MalformedAttributeError> {
        match self.conversion {
            Conversion::Raw | Conversion::Flag => Ok(raw),
            Conversion::PercentRemaining => {
                if raw > 100.0 {
                    return Err(MalformedAttributeError {
                        id:     id.to_string(),
                        raw:    fmt_num(raw),
                        reason: "remaining-life percentage above 100".into(),
                    });
                }
                Ok(100.0 - raw)
            }
        }
    }

    /// Classify an already converted value. Maximum beats error beats warning.
    pub fn classify(&self, value: f64) -> AttrSeverity {
        if self.conversion == Conversion::Flag {
            return if value != 0.0 { AttrSeverity::Error } else { AttrSeverity::Ok };
        }
        if self.maximum.is_some_and(|m| value >= m) {
            AttrSeverity::MaximumExceeded
        } else if self.error.is_some_and(|e| value >= e) {
            AttrSeverity::Error
        } else if self.warning.is_some_and(|w| value >= w) {
            AttrSeverity::Warning
        } else {
            AttrSeverity::Ok
        }
    }

    /// The limit a given severity crossed, for reason strings.
    fn limit_for(&self, severity: AttrSeverity) -> Option<(&'static str, f64)> {
        match severity {
            AttrSeverity::MaximumExceeded => self.maximum.map(|v| ("maximum", v)),
            AttrSeverity::Error if self.conversion == Conversion::Flag => Some(("flag", 0.0)),
            AttrSeverity::Error   => self.error.map(|v| ("error threshold", v)),
            AttrSeverity::Warning => self.warning.map(|v| ("warning threshold", v)),
            AttrSeverity::Ok      => None,
        }
    }
}

/// Thresholds for one model family, selected by a regex on the model string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOverlay {
    pub pattern:    String,
    #[serde(default)]
    pub thresholds: Vec<AttributeThreshold>,
}

/// Where a threshold came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "table", content = "pattern", rename_all = "snake_case")]
pub enum ThresholdSource {
    Generic,
    Overlay(String),
}

#[derive(Debug)]
struct CompiledOverlay {
    pattern:    String,
    regex:      Regex,
    thresholds: HashMap<String, AttributeThreshold>,
}

/// Validated, lookup-ready threshold tables.
#[derive(Debug)]
pub struct ThresholdTable {
    generic:  HashMap<String, AttributeThreshold>,
    overlays: Vec<CompiledOverlay>,
}

fn index(table: &[AttributeThreshold], name: &str) -> Result<HashMap<String, AttributeThreshold>, ConfigError> {
    let mut map = HashMap::with_capacity(table.len());
    for t in table {
        t.validate()?;
        if map.insert(t.id.clone(), t.clone()).is_some() {
            return Err(ConfigError::DuplicateThreshold { id: t.id.clone(), table: name.to_string() });
        }
    }
    Ok(map)
}

impl ThresholdTable {
    pub fn new(generic: &[AttributeThreshold], overlays: &[ModelOverlay]) -> Result<Self, ConfigError> {
        let generic = index(generic, "generic table")?;
        let overlays = overlays.iter().map(|o| {
            let regex = Regex::new(&o.pattern).map_err(|source| ConfigError::BadOverlayPattern {
                pattern: o.pattern.clone(),
                source,
            })?;
            Ok(CompiledOverlay {
                pattern:    o.pattern.clone(),
                regex,
                thresholds: index(&o.thresholds, &format!("overlay {:?}", o.pattern))?,
            })
        }).collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self { generic, overlays })
    }

    /// First matching overlay wins, then the generic table.
    pub fn lookup(&self, model: &str, id: &str) -> Option<(&AttributeThreshold, ThresholdSource)> {
        for o in &self.overlays {
            if o.regex.is_match(model) {
                if let Some(t) = o.thresholds.get(id) {
                    return Some((t, ThresholdSource::Overlay(o.pattern.clone())));
                }
            }
        }
        self.generic.get(id).map(|t| (t, ThresholdSource::Generic))
    }
}

/// One raw attribute as reported by the query tool.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAttribute {
    pub id:   String,
    pub name: String,
    pub raw:  String,
}

impl RawAttribute {
    pub fn new(id: impl Into<String>, name: impl Into<String>, raw: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), raw: raw.into() }
    }
}

/// Result of evaluating one attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub id:           String,
    pub name:         String,
    pub raw:          f64,
    /// Value after conversion; equals `raw` for raw and flag attributes.
    pub value:        f64,
    pub severity:     AttrSeverity,
    pub blocking:     bool,
    /// No table had an entry for this id.
    pub unclassified: bool,
    pub source:       Option<ThresholdSource>,
    pub reason:       Option<String>,
}

/// Parse a raw counter: decimal or `0x` hex, non-negative and finite.
pub fn parse_raw(id: &str, raw: &str) -> Result<f64, MalformedAttributeError> {
    let malformed = |reason: &str| MalformedAttributeError {
        id:     id.to_string(),
        raw:    raw.to_string(),
        reason: reason.to_string(),
    };
    let text = raw.trim();
    if text.is_empty() {
        return Err(malformed("empty value"));
    }
    let value = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map(|v| v as f64).map_err(|_| malformed("not a hex number"))?
    } else {
        text.parse::<f64>().map_err(|_| malformed("not a number"))?
    };
    if !value.is_finite() {
        return Err(malformed("not finite"));
    }
    if value < 0.0 {
        return Err(malformed("negative counter"));
    }
    Ok(value)
}

/// Classify one attribute for `model`. Pure.
pub fn evaluate(
    id:    &str,
    name:  &str,
    raw:   &str,
    model: &str,
    table: &ThresholdTable,
) -> Result<Evaluation, MalformedAttributeError> {
    let raw_value = parse_raw(id, raw)?;

    let Some((thr, source)) = table.lookup(model, id) else {
        return Ok(Evaluation {
            id:           id.to_string(),
            name:         if name.is_empty() { id.to_string() } else { name.to_string() },
            raw:          raw_value,
            value:        raw_value,
            severity:     AttrSeverity::Ok,
            blocking:     false,
            unclassified: true,
            source:       None,
            reason:       None,
        });
    };

    let value    = thr.convert(id, raw_value)?;
    let severity = thr.classify(value);
    let name = if !thr.name.is_empty() { thr.name.clone() }
               else if !name.is_empty() { name.to_string() }
               else { id.to_string() };
    let reason = thr.limit_for(severity).map(|(label, limit)| {
        if label == "flag" {
            format!("{} = {} (flag set)", name, fmt_num(value))
        } else {
            format!("{} = {} (≥ {} {})", name, fmt_num(value), label, fmt_num(limit))
        }
    });

    Ok(Evaluation {
        id: id.to_string(),
        name,
        raw: raw_value,
        value,
        severity,
        blocking: thr.blocking,
        unclassified: false,
        source: Some(source),
        reason,
    })
}

/// Every attribute of one device, bad fields recorded instead of aborting.
#[derive(Debug, Clone, Default)]
pub struct AttributeAssessment {
    pub evaluations: Vec<Evaluation>,
    pub malformed:   Vec<MalformedAttributeError>,
}

impl AttributeAssessment {
    pub fn worst(&self) -> AttrSeverity {
        self.evaluations.iter().map(|e| e.severity).max().unwrap_or(AttrSeverity::Ok)
    }

    /// Blocking attributes at or past their error threshold.
    pub fn blocking_failures(&self) -> impl Iterator<Item = &Evaluation> {
        self.evaluations.iter().filter(|e| e.blocking && e.severity >= AttrSeverity::Error)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Evaluation> {
        self.evaluations.iter().filter(|e| e.severity >= AttrSeverity::Error)
    }

    pub fn unclassified(&self) -> impl Iterator<Item = &Evaluation> {
        self.evaluations.iter().filter(|e| e.unclassified)
    }

    /// Fail on any error-tier attribute, warn on warnings and unreadable fields.
    pub fn verdict(&self) -> Verdict {
        let fails: Vec<&str> = self.failures().filter_map(|e| e.reason.as_deref()).collect();
        if !fails.is_empty() {
            return Verdict::Fail(fails.join("; "));
        }
        self.warnings()
    }

    /// Warning-tier attributes and unreadable fields only. Error-tier
    /// results are left to whoever tracks the attribute test's status.
    pub fn warnings(&self) -> Verdict {
        let mut warns: Vec<String> = self.evaluations.iter()
            .filter(|e| e.severity == AttrSeverity::Warning)
            .filter_map(|e| e.reason.clone())
            .collect();
        warns.extend(self.malformed.iter().map(|m| m.to_string()));
        if warns.is_empty() { Verdict::Pass } else { Verdict::Warn(warns.join("; ")) }
    }
}

pub fn evaluate_all<I>(attributes: I, model: &str, table: &ThresholdTable) -> AttributeAssessment
where
    I: IntoIterator<Item = RawAttribute>,
{
    let mut out = AttributeAssessment::default();
    for attr in attributes {
        match evaluate(&attr.id, &attr.name, &attr.raw, model, table) {
            Ok(e)    => out.evaluations.push(e),
            Err(err) => {
                tracing::warn!(attribute = %attr.id, "skipping malformed attribute: {}", err);
                out.malformed.push(err);
            }
        }
    }
    out
}

/// Built-in generic table for ATA and NVMe attributes.
pub fn default_thresholds() -> Vec<AttributeThreshold> {
    fn t(id: &str, name: &str, blocking: bool, w: Option<f64>, e: Option<f64>, m: Option<f64>) -> AttributeThreshold {
        AttributeThreshold {
            id: id.into(), name: name.into(), blocking,
            warning: w, error: e, maximum: m, conversion: Conversion::Raw,
        }
    }
    vec![
        t("5",   "Reallocated_Sector_Ct",   true,  Some(1.0),  Some(10.0), Some(10_000.0)),
        t("9",   "Power_On_Hours",          false, Some(12_000.0), Some(18_000.0), Some(100_000.0)),
        t("10",  "Spin_Retry_Count",        false, None,       Some(1.0),  Some(10_000.0)),
        t("184", "End-to-End_Error",        false, None,       Some(1.0),  Some(10_000.0)),
        t("187", "Reported_Uncorrect",      false, Some(1.0),  Some(10.0), Some(10_000.0)),
        t("188", "Command_Timeout",         false, Some(100.0), None,      None),
        t("197", "Current_Pending_Sector",  true,  None,       Some(1.0),  Some(10_000.0)),
        t("198", "Offline_Uncorrectable",   false, None,       Some(1.0),  Some(10_000.0)),
        t("199", "UDMA_CRC_Error_Count",    false, Some(1.0),  Some(100.0), None),
        AttributeThreshold {
            id: "critical_warning".into(), name: "Critical Warning".into(), blocking: true,
            warning: None, error: Some(1.0), maximum: None, conversion: Conversion::Flag,
        },
        t("media_errors", "Media Errors", false, None, Some(1.0), Some(10_000.0)),
        AttributeThreshold {
            id: "available_spare".into(), name: "Available Spare (used)".into(), blocking: false,
            warning: Some(50.0), error: Some(90.0), maximum: None, conversion: Conversion::PercentRemaining,
        },
        t("percentage_used", "Percentage Used", false, Some(75.0), Some(90.0), Some(255.0)),
        t("warning_temp_time", "Warning Temp Time", false, Some(1.0), Some(60.0), None),
    ]
}

/// Built-in model overlays.
pub fn default_overlays() -> Vec<ModelOverlay> {
    vec![ModelOverlay {
        // Crucial MX/BX SATA SSDs remap early; any reallocation is an error.
        pattern:    r"(?i)^(crucial_)?ct\d+(mx|bx)\d+".into(),
        thresholds: vec![AttributeThreshold {
            id: "5".into(), name: "Reallocated_Sector_Ct".into(), blocking: true,
            warning: None, error: Some(1.0), maximum: Some(10_000.0), conversion: Conversion::Raw,
        }],
    }]
}
