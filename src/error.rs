//! Error types for diskrx.

use crate::models::status::TestStatus;
use crate::recovery::stage::Stage;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A single raw attribute value could not be interpreted.
///
/// Device assembly catches this per attribute; it never aborts the
/// assessment of the rest of the device.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("malformed attribute {id}: {raw:?} ({reason})")]
pub struct MalformedAttributeError {
    pub id:     String,
    pub raw:    String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid threshold for attribute {id}: {detail}")]
    InvalidThreshold { id: String, detail: String },

    #[error("duplicate threshold for attribute {id} in {table}")]
    DuplicateThreshold { id: String, table: String },

    #[error("bad model overlay pattern {pattern:?}: {source}")]
    BadOverlayPattern {
        pattern: String,
        #[source]
        source:  regex::Error,
    },

    #[error("invalid throughput band for {kind}: {detail}")]
    InvalidBand { kind: String, detail: String },

    #[error("invalid graph scale: {0}")]
    InvalidScale(String),

    #[error("invalid recovery settings: {0}")]
    InvalidRecovery(String),

    #[error("invalid thermal limits: {0}")]
    InvalidThermal(String),

    #[error("could not read {path}: {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {path}: {source}")]
    Parse {
        path:   PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error("{kind} already finished with {status}; override it first")]
    Terminal { kind: String, status: TestStatus },

    #[error("{kind} was overridden (originally {original}); its record is final")]
    Overridden { kind: String, original: TestStatus },

    #[error("{kind} has not failed (status {status}); nothing to override")]
    NotFailed { kind: String, status: TestStatus },

    #[error("{kind} failed on blocking attribute(s): {reasons}")]
    Blocking { kind: String, reasons: String },

    #[error("overrides are disabled")]
    OverridesDisabled,

    #[error("{kind} cannot be overridden in limited mode")]
    NotOverridable { kind: String },
}

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("failed to launch {tool}: {source}")]
    ToolLaunch {
        tool:   String,
        #[source]
        source: std::io::Error,
    },

    #[error("stream error: {0}")]
    Stream(#[from] std::io::Error),

    #[error("{stage} stage stalled at {pct:.2}% after {attempts} attempt(s)")]
    StageRetryExhausted { stage: Stage, pct: f64, attempts: u32 },

    #[error("{stage} attempt timed out after {}s", .after.as_secs())]
    TimeoutExpired { stage: Stage, after: Duration },
}
