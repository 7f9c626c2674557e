use crate::error::ConfigError;
use crate::models::severity::{Severity, Verdict};
use serde::{Deserialize, Serialize};

/// CPU cooling limits and sampling cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalConfig {
    pub warn_c:      f64,
    pub fail_c:      f64,
    /// How long `diskrx cpu` samples for.
    pub sample_secs: u64,
    pub interval_ms: u64,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self { warn_c: 90.0, fail_c: 99.0, sample_secs: 60, interval_ms: 1000 }
    }
}

impl ThermalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.warn_c < self.fail_c) || self.interval_ms == 0 {
            return Err(ConfigError::InvalidThermal(format!(
                "warn_c ({}) must be below fail_c ({}) and interval_ms > 0",
                self.warn_c, self.fail_c)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThermalSummary {
    pub samples: usize,
    pub peak_c:  f64,
    pub avg_c:   f64,
    pub verdict: Verdict,
}

/// Classify temperature samples (°C) by their peak.
pub fn classify_temps(samples_c: &[f64], cfg: &ThermalConfig) -> ThermalSummary {
    let valid: Vec<f64> = samples_c.iter().copied().filter(|t| t.is_finite()).collect();
    if valid.is_empty() {
        return ThermalSummary {
            samples: 0, peak_c: 0.0, avg_c: 0.0,
            verdict: Verdict::Warn("no temperature samples".into()),
        };
    }
    let peak = valid.iter().copied().fold(f64::MIN, f64::max);
    let avg  = valid.iter().sum::<f64>() / valid.len() as f64;
    let verdict = if peak >= cfg.fail_c {
        Verdict::Fail(format!("peak {:.0}°C ≥ limit {:.0}°C", peak, cfg.fail_c))
    } else if peak >= cfg.warn_c {
        Verdict::Warn(format!("peak {:.0}°C ≥ warning {:.0}°C", peak, cfg.warn_c))
    } else {
        Verdict::Pass
    };
    ThermalSummary { samples: valid.len(), peak_c: peak, avg_c: avg, verdict }
}

impl ThermalSummary {
    pub fn severity(&self) -> Severity { self.verdict.severity() }
}
