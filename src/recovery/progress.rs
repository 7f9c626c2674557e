//! Tolerant parsing of the imaging tool's live status screen.
//!
//! ddrescue redraws a block like this about once a second:
//!
//! ```text
//!      ipos:    1048 MB, non-trimmed:        0 B,  current rate:  80740 kB/s
//! pct rescued:    0.20%, read errors:        0,  remaining time:      1h 27m
//!                               time since last successful read:         n/a
//! ```

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Duration;

/// Longest partial line kept while waiting for its newline.
const MAX_PARTIAL: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "secs", rename_all = "snake_case")]
pub enum RemainingTime {
    /// The tool printed its "not available" marker: no usable estimate yet.
    NotAvailable,
    Estimate(#[serde(with = "secs")] Duration),
}

mod secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
}

/// Latest values seen so far. Fields stay `None` until first reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    pub pct_rescued:  Option<f64>,
    /// Bytes per second.
    pub current_rate: Option<f64>,
    pub remaining:    Option<RemainingTime>,
    pub read_errors:  Option<u64>,
}

fn ansi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("static regex"))
}

fn pct_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"pct rescued:\s*([0-9]+(?:\.[0-9]+)?)\s*%").expect("static regex"))
}

fn rate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"current rate:\s*([0-9]+(?:\.[0-9]+)?)\s*([kKMGT]?i?B)/s").expect("static regex")
    })
}

fn errors_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"read errors:\s*([0-9]+)").expect("static regex"))
}

fn remaining_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"remaining time:\s*([^,\r\n]*)").expect("static regex"))
}

fn dhms_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(\d+)\s*d)?\s*(?:(\d+)\s*h)?\s*(?:(\d+)\s*m)?\s*(?:(\d+)\s*s)?$").expect("static regex")
    })
}

/// Parse the value after `remaining time:`. Every d/h/m/s component is
/// optional but at least one must be present; `n/a` means no estimate.
pub fn parse_remaining(text: &str) -> Option<RemainingTime> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("n/a") {
        return Some(RemainingTime::NotAvailable);
    }
    let caps = dhms_re().captures(text)?;
    let mut secs = 0u64;
    let mut seen = false;
    for (idx, unit) in [(1, 86_400u64), (2, 3_600), (3, 60), (4, 1)] {
        if let Some(m) = caps.get(idx) {
            secs = secs.saturating_add(m.as_str().parse::<u64>().ok()?.saturating_mul(unit));
            seen = true;
        }
    }
    seen.then(|| RemainingTime::Estimate(Duration::from_secs(secs)))
}

fn rate_unit(unit: &str) -> f64 {
    match unit {
        "B"             => 1.0,
        "kB" | "KB"     => 1e3,
        "MB"            => 1e6,
        "GB"            => 1e9,
        "TB"            => 1e12,
        "KiB" | "kiB"   => 1024.0,
        "MiB"           => 1_048_576.0,
        "GiB"           => 1_073_741_824.0,
        "TiB"           => 1_099_511_627_776.0,
        _               => 1.0,
    }
}

/// Incremental parser over raw output chunks; only complete lines count.
#[derive(Debug, Default)]
pub struct ProgressParser {
    partial: Vec<u8>,
    latest:  Progress,
}

impl ProgressParser {
    pub fn new() -> Self { Self::default() }

    pub fn latest(&self) -> &Progress { &self.latest }

    /// Feed raw bytes. Returns true if any field changed.
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        self.partial.extend_from_slice(chunk);
        let Some(end) = self.partial.iter().rposition(|&b| b == b'\n' || b == b'\r') else {
            if self.partial.len() > MAX_PARTIAL {
                self.partial.clear();
            }
            return false;
        };
        let bytes: Vec<u8> = self.partial.drain(..=end).collect();
        let complete = String::from_utf8_lossy(&bytes);
        let mut changed = false;
        for line in complete.split(['\n', '\r']) {
            changed |= self.parse_line(line);
        }
        changed
    }

    /// Parse whatever is left once the stream has ended.
    pub fn finish(&mut self) -> bool {
        let rest = std::mem::take(&mut self.partial);
        self.parse_line(&String::from_utf8_lossy(&rest))
    }

    fn parse_line(&mut self, raw: &str) -> bool {
        if raw.trim().is_empty() {
            return false;
        }
        let line = ansi_re().replace_all(raw, "");
        let before = self.latest.clone();

        if let Some(c) = pct_re().captures(&line) {
            if let Ok(p) = c[1].parse::<f64>() {
                self.latest.pct_rescued = Some(p.clamp(0.0, 100.0));
            }
        }
        if let Some(c) = rate_re().captures(&line) {
            if let Ok(v) = c[1].parse::<f64>() {
                self.latest.current_rate = Some(v * rate_unit(&c[2]));
            }
        }
        if let Some(c) = errors_re().captures(&line) {
            if let Ok(v) = c[1].parse::<u64>() {
                self.latest.read_errors = Some(v);
            }
        }
        if let Some(c) = remaining_re().captures(&line) {
            if let Some(r) = parse_remaining(&c[1]) {
                self.latest.remaining = Some(r);
            }
        }
        self.latest != before
    }
}
