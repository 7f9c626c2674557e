//! Throughput classification and sample reduction for the benchmark graph.

use crate::error::ConfigError;
use crate::models::device::DeviceType;
use crate::models::severity::{Severity, Verdict};
use crate::util::human::fmt_rate;
use serde::{Deserialize, Serialize};

const MB: f64 = 1_048_576.0;

/// Rate bands for one device class, in MB/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateBand {
    pub fail_below_mbs:  f64,
    pub warn_below_mbs:  f64,
    pub great_above_mbs: f64,
}

impl RateBand {
    fn validate(&self, kind: &str) -> Result<(), ConfigError> {
        let ok = self.fail_below_mbs >= 0.0
            && self.fail_below_mbs < self.warn_below_mbs
            && self.warn_below_mbs < self.great_above_mbs
            && self.great_above_mbs.is_finite();
        if ok { Ok(()) } else {
            Err(ConfigError::InvalidBand {
                kind:   kind.to_string(),
                detail: format!("need 0 <= fail ({}) < warn ({}) < great ({})",
                    self.fail_below_mbs, self.warn_below_mbs, self.great_above_mbs),
            })
        }
    }
}

/// Power-law graph scale: `boundary(i) = 2^(k*(i+1)) + c*(i+1)` MB/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphScale {
    /// 8, 16 or 32 steps; every 8 steps is one more graph row.
    pub steps: u8,
    pub k:     f64,
    pub c:     f64,
}

impl GraphScale {
    pub fn boundary_mbs(&self, i: usize) -> f64 {
        let n = (i + 1) as f64;
        2f64.powf(self.k * n) + self.c * n
    }

    pub fn rows(&self) -> usize { (self.steps / 8) as usize }

    fn validate(&self) -> Result<(), ConfigError> {
        if ![8, 16, 32].contains(&self.steps) {
            return Err(ConfigError::InvalidScale(format!("steps must be 8, 16 or 32, got {}", self.steps)));
        }
        if !(self.k > 0.0 && self.k.is_finite()) || !(self.c >= 0.0 && self.c.is_finite()) {
            return Err(ConfigError::InvalidScale(format!("k must be > 0 and c >= 0 (k={}, c={})", self.k, self.c)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThroughputConfig {
    pub hdd:    RateBand,
    /// Used for SSD, NVMe and virtual devices.
    pub ssd:    RateBand,
    pub scales: Vec<GraphScale>,
}

impl Default for ThroughputConfig {
    fn default() -> Self {
        Self {
            hdd: RateBand { fail_below_mbs: 65.0,  warn_below_mbs: 135.0, great_above_mbs: 750.0 },
            ssd: RateBand { fail_below_mbs: 135.0, warn_below_mbs: 250.0, great_above_mbs: 750.0 },
            scales: vec![
                GraphScale { steps: 8,  k: 1.2, c: 16.0 },
                GraphScale { steps: 16, k: 0.6, c: 8.0 },
                GraphScale { steps: 32, k: 0.3, c: 4.0 },
            ],
        }
    }
}

impl ThroughputConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.hdd.validate("hdd")?;
        self.ssd.validate("ssd")?;
        for s in &self.scales { s.validate()?; }
        Ok(())
    }

    pub fn band(&self, kind: &DeviceType) -> &RateBand {
        match kind {
            DeviceType::HDD | DeviceType::Unknown => &self.hdd,
            DeviceType::SSD | DeviceType::NVMe | DeviceType::Virtual => &self.ssd,
        }
    }

    pub fn scale(&self, steps: u8) -> Option<&GraphScale> {
        self.scales.iter().find(|s| s.steps == steps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateClass {
    Slow,
    Marginal,
    Good,
    Great,
}

impl RateClass {
    pub fn severity(&self) -> Severity {
        match self {
            RateClass::Slow     => Severity::Fail,
            RateClass::Marginal => Severity::Warn,
            RateClass::Good | RateClass::Great => Severity::Pass,
        }
    }
}

pub fn classify(rate_bytes_per_sec: f64, kind: &DeviceType, cfg: &ThroughputConfig) -> RateClass {
    let band = cfg.band(kind);
    let mbs = rate_bytes_per_sec / MB;
    if mbs < band.fail_below_mbs      { RateClass::Slow }
    else if mbs < band.warn_below_mbs { RateClass::Marginal }
    else if mbs > band.great_above_mbs { RateClass::Great }
    else                              { RateClass::Good }
}

/// Run-level verdict: the average decides, and any sample in the fail band
/// fails the run on its own.
pub fn assess_samples(samples: &[f64], kind: &DeviceType, cfg: &ThroughputConfig) -> Verdict {
    if samples.is_empty() {
        return Verdict::Warn("no throughput samples".into());
    }
    let avg = samples.iter().sum::<f64>() / samples.len() as f64;
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let band = cfg.band(kind);

    let by_avg = match classify(avg, kind, cfg).severity() {
        Severity::Pass => Verdict::Pass,
        Severity::Warn => Verdict::Warn(format!("average {} below {} MB/s", fmt_rate(avg), band.warn_below_mbs)),
        Severity::Fail => Verdict::Fail(format!("average {} below {} MB/s", fmt_rate(avg), band.fail_below_mbs)),
    };
    let by_min = if classify(min, kind, cfg) == RateClass::Slow {
        Verdict::Fail(format!("slowest sample {} below {} MB/s", fmt_rate(min), band.fail_below_mbs))
    } else {
        Verdict::Pass
    };
    by_avg.worst(by_min)
}

/// Reduce `samples` to exactly `width` entries by averaging equal contiguous
/// slices of `floor(len / width)` samples.
///
/// Remainder samples at the tail are dropped rather than redistributed, so
/// the last `len % width` observations never reach the graph. Shorter inputs
/// are returned unchanged. The input is never modified.
pub fn merge_samples(samples: &[f64], width: usize) -> Vec<f64> {
    if width == 0 {
        return Vec::new();
    }
    if samples.len() < width {
        return samples.to_vec();
    }
    let slice = samples.len() / width;
    samples
        .chunks_exact(slice)
        .take(width)
        .map(|c| c.iter().sum::<f64>() / slice as f64)
        .collect()
}

/// Discrete graph step for a rate: 0 for no data, otherwise
/// `1 + #{boundaries below the rate}`, capped at `scale.steps`.
pub fn rate_to_step(rate_bytes_per_sec: f64, scale: &GraphScale) -> u8 {
    if !(rate_bytes_per_sec > 0.0) {
        return 0;
    }
    let mbs = rate_bytes_per_sec / MB;
    let below = (0..scale.steps as usize)
        .take_while(|&i| scale.boundary_mbs(i) < mbs)
        .count();
    (1 + below).min(scale.steps as usize) as u8
}
