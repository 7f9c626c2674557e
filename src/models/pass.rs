use crate::recovery::progress::RemainingTime;
use crate::recovery::stage::Stage;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::time::Duration;

/// How one imaging attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The tool exited with status 0.
    Completed,
    /// Non-zero exit; counts against the stage's retry budget.
    ToolError { code: i32 },
    /// Hit the per-attempt wall-clock limit; counts against the retry budget.
    TimedOut,
    /// Aborted by the user. Map and image stay valid for a later resume.
    Cancelled,
}

impl AttemptOutcome {
    pub fn label(&self) -> String {
        match self {
            AttemptOutcome::Completed        => "completed".into(),
            AttemptOutcome::ToolError { code } => format!("exit {}", code),
            AttemptOutcome::TimedOut         => "timed out".into(),
            AttemptOutcome::Cancelled        => "cancelled".into(),
        }
    }
}

/// One attempt of one recovery stage. Written only by the pass controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassRecord {
    pub stage:          Stage,
    /// 1-based attempt number within the stage.
    pub attempt:        u32,
    pub completion_pct: f64,
    pub elapsed:        Duration,
    /// Last reported read rate, bytes/s.
    pub last_rate:      Option<f64>,
    pub remaining:      Option<RemainingTime>,
    pub read_errors:    Option<u64>,
    pub last_error:     Option<String>,
    pub outcome:        AttemptOutcome,
    pub started_at:     DateTime<Local>,
}

impl PassRecord {
    pub fn is_cancelled(&self) -> bool {
        self.outcome == AttemptOutcome::Cancelled
    }
}
