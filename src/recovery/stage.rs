use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One phase of the escalating recovery sequence, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Read,
    Trim,
    Scrape,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Read, Stage::Trim, Stage::Scrape];

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Read   => "read",
            Stage::Trim   => "trim",
            Stage::Scrape => "scrape",
        }
    }

    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Read   => Some(Stage::Trim),
            Stage::Trim   => Some(Stage::Scrape),
            Stage::Scrape => None,
        }
    }

    /// ddrescue switches that confine a run to this phase.
    pub fn phase_args(&self) -> &'static [&'static str] {
        match self {
            Stage::Read   => &["--no-trim", "--no-scrape"],
            Stage::Trim   => &["--no-scrape"],
            Stage::Scrape => &[],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerState {
    Read,
    Trim,
    Scrape,
    Done,
    Failed,
}

impl ControllerState {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ControllerState::Read   => Some(Stage::Read),
            ControllerState::Trim   => Some(Stage::Trim),
            ControllerState::Scrape => Some(Stage::Scrape),
            ControllerState::Done | ControllerState::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool { self.stage().is_none() }

    pub fn label(&self) -> &'static str {
        match self {
            ControllerState::Read   => "READ",
            ControllerState::Trim   => "TRIM",
            ControllerState::Scrape => "SCRAPE",
            ControllerState::Done   => "DONE",
            ControllerState::Failed => "FAILED",
        }
    }
}

impl From<Stage> for ControllerState {
    fn from(s: Stage) -> Self {
        match s {
            Stage::Read   => ControllerState::Read,
            Stage::Trim   => ControllerState::Trim,
            Stage::Scrape => ControllerState::Scrape,
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Imaging tool parameters swapped in when a stage starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageParams {
    /// Read the source backwards.
    pub reverse:         bool,
    /// Bypass the kernel cache on the source.
    pub direct:          bool,
    pub reopen_on_error: bool,
    /// Skip areas slower than this, e.g. "64KiB".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_read_rate:   Option<String>,
    /// Throttle, e.g. "10MB".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_read_rate:   Option<String>,
    pub retry_passes:    u32,
    pub extra_args:      Vec<String>,
}

impl StageParams {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.direct          { args.push("--idirect".to_string()); }
        if self.reverse         { args.push("--reverse".to_string()); }
        if self.reopen_on_error { args.push("--reopen-on-error".to_string()); }
        if let Some(r) = &self.min_read_rate { args.push(format!("--min-read-rate={}", r)); }
        if let Some(r) = &self.max_read_rate { args.push(format!("--max-read-rate={}", r)); }
        if self.retry_passes > 0 { args.push(format!("--retry-passes={}", self.retry_passes)); }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageConfig {
    /// Completion needed to leave the stage. Must be unset for scrape.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_pct: Option<f64>,
    /// Attempts the stage runs before its threshold is checked.
    pub min_attempts:  u32,
    /// Wall-clock limit per attempt; unset = unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs:  Option<u64>,
    pub params:        StageParams,
}

/// `[recovery.stages]` as written in the file. Every key is optional and
/// lands on top of that stage's built-in settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StageSetFile {
    read:   StageFile,
    trim:   StageFile,
    scrape: StageFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StageFile {
    threshold_pct: Option<f64>,
    min_attempts:  Option<u32>,
    timeout_secs:  Option<u64>,
    params:        ParamsFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ParamsFile {
    reverse:         Option<bool>,
    direct:          Option<bool>,
    reopen_on_error: Option<bool>,
    min_read_rate:   Option<String>,
    max_read_rate:   Option<String>,
    retry_passes:    Option<u32>,
    extra_args:      Option<Vec<String>>,
}

impl StageFile {
    fn apply(self, to: &mut StageConfig) {
        if self.threshold_pct.is_some() { to.threshold_pct = self.threshold_pct; }
        if let Some(n) = self.min_attempts { to.min_attempts = n; }
        if self.timeout_secs.is_some() { to.timeout_secs = self.timeout_secs; }
        let (p, to) = (self.params, &mut to.params);
        if let Some(v) = p.reverse         { to.reverse = v; }
        if let Some(v) = p.direct          { to.direct = v; }
        if let Some(v) = p.reopen_on_error { to.reopen_on_error = v; }
        if p.min_read_rate.is_some()       { to.min_read_rate = p.min_read_rate; }
        if p.max_read_rate.is_some()       { to.max_read_rate = p.max_read_rate; }
        if let Some(v) = p.retry_passes    { to.retry_passes = v; }
        if let Some(v) = p.extra_args      { to.extra_args = v; }
    }
}

impl From<StageSetFile> for StageSet {
    fn from(file: StageSetFile) -> Self {
        let mut set = StageSet::default();
        file.read.apply(&mut set.read);
        file.trim.apply(&mut set.trim);
        file.scrape.apply(&mut set.scrape);
        set
    }
}

/// Per-stage settings. Trim runs twice before its threshold counts, so a
/// single trim pass that lands at 99% still gets a second one; set
/// `min_attempts = 1` under `[recovery.stages.trim]` to skip it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StageSetFile")]
pub struct StageSet {
    pub read:   StageConfig,
    pub trim:   StageConfig,
    pub scrape: StageConfig,
}

impl Default for StageSet {
    fn default() -> Self {
        Self {
            read: StageConfig {
                threshold_pct: Some(95.0),
                min_attempts:  1,
                timeout_secs:  None,
                params: StageParams {
                    direct:        true,
                    min_read_rate: Some("64KiB".into()),
                    ..StageParams::default()
                },
            },
            trim: StageConfig {
                threshold_pct: Some(98.0),
                min_attempts:  2,
                timeout_secs:  None,
                params: StageParams { direct: true, ..StageParams::default() },
            },
            scrape: StageConfig {
                threshold_pct: None,
                min_attempts:  1,
                timeout_secs:  None,
                params: StageParams {
                    direct:          true,
                    reopen_on_error: true,
                    retry_passes:    1,
                    ..StageParams::default()
                },
            },
        }
    }
}

impl StageSet {
    pub fn get(&self, stage: Stage) -> &StageConfig {
        match stage {
            Stage::Read   => &self.read,
            Stage::Trim   => &self.trim,
            Stage::Scrape => &self.scrape,
        }
    }

    pub fn validate(&self, max_retries: u32) -> Result<(), ConfigError> {
        let bad = |s: Stage, d: String| Err(ConfigError::InvalidRecovery(format!("{} stage: {}", s, d)));
        for stage in Stage::ALL {
            let c = self.get(stage);
            match (stage, c.threshold_pct) {
                (Stage::Scrape, Some(t)) => {
                    return bad(stage, format!("scrape never advances on percentage, remove threshold_pct = {}", t));
                }
                (Stage::Scrape, None) => {}
                (_, None) => return bad(stage, "threshold_pct is required".into()),
                (_, Some(t)) if !(0.0..=100.0).contains(&t) => {
                    return bad(stage, format!("threshold_pct {} outside 0..=100", t));
                }
                _ => {}
            }
            if c.min_attempts == 0 || c.min_attempts > max_retries + 1 {
                return bad(stage, format!("min_attempts {} must be within 1..={}", c.min_attempts, max_retries + 1));
            }
            if c.timeout_secs == Some(0) {
                return bad(stage, "timeout_secs must be > 0".into());
            }
        }
        Ok(())
    }
}
