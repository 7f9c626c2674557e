//! Staged recovery pass controller: read -> trim -> scrape, escalating on
//! completion percentage with a bounded retry budget per stage.

use crate::error::{ConfigError, RecoveryError};
use crate::models::pass::{AttemptOutcome, PassRecord};
use crate::models::severity::Verdict;
use crate::recovery::progress::ProgressParser;
use crate::recovery::reader::StreamReader;
use crate::recovery::stage::{ControllerState, Stage, StageSet};
use crate::recovery::tool::{ImagingTool, ToolProcess};
use crate::util::human::fmt_pct;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Longest stderr text kept per attempt.
const STDERR_KEEP: usize = 4096;

/// Upper bound on collecting buffered output after the tool exits.
const DRAIN_WAIT: Duration = Duration::from_secs(2);

/// `[recovery]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Imaging tool binary.
    pub tool:             String,
    /// Extra attempts per stage after the first.
    pub max_retries:      u32,
    /// How long one poll of the output queue may block.
    pub poll_interval_ms: u64,
    /// SIGTERM -> SIGKILL grace period.
    pub kill_grace_secs:  u64,
    /// Pass --force (destination is a block device).
    pub force:            bool,
    /// Trim defaults to two attempts before its threshold counts.
    pub stages:           StageSet,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            tool:             "ddrescue".into(),
            max_retries:      3,
            poll_interval_ms: 250,
            kill_grace_secs:  10,
            force:            false,
            stages:           StageSet::default(),
        }
    }
}

impl RecoveryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tool.trim().is_empty() {
            return Err(ConfigError::InvalidRecovery("tool must not be empty".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidRecovery("poll_interval_ms must be > 0".into()));
        }
        self.stages.validate(self.max_retries)
    }

    fn poll(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }

    fn grace(&self) -> Duration { Duration::from_secs(self.kill_grace_secs) }
}

/// Shared abort flag for one or more running controllers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self { Self::default() }

    pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }

    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

/// Next state after an attempt in `state` that reached `pct`, given how many
/// attempts the stage has now run.
///
/// Read and trim advance once `pct >= threshold` and the stage has run its
/// `min_attempts`. Scrape never advances on percentage; a clean tool exit
/// ends the run. Anything else retries until the budget of
/// `max_retries + 1` attempts is spent. Cancelled attempts never move the
/// state.
pub fn decide(
    state:    ControllerState,
    pct:      f64,
    attempts: u32,
    outcome:  AttemptOutcome,
    cfg:      &RecoveryConfig,
) -> ControllerState {
    let Some(stage) = state.stage() else { return state };
    if outcome == AttemptOutcome::Cancelled {
        return state;
    }
    let sc = cfg.stages.get(stage);
    match stage.next() {
        Some(next) => {
            let reached = sc.threshold_pct.is_some_and(|t| pct >= t);
            if reached && attempts >= sc.min_attempts {
                return next.into();
            }
        }
        None => {
            if outcome == AttemptOutcome::Completed {
                return ControllerState::Done;
            }
        }
    }
    if attempts > cfg.max_retries {
        ControllerState::Failed
    } else {
        state
    }
}

/// Everything the reporting layer needs about one device's recovery run.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub device:      String,
    pub final_state: ControllerState,
    pub final_pct:   f64,
    pub passes:      Vec<PassRecord>,
    pub trace:       Vec<ControllerState>,
    pub cancelled:   bool,
    /// Set when the run ended in FAILED.
    pub failure:     Option<String>,
}

impl RecoveryReport {
    pub fn verdict(&self) -> Verdict {
        match self.final_state {
            ControllerState::Done if self.final_pct >= 100.0 => Verdict::Pass,
            ControllerState::Done => Verdict::Warn(format!("recovered {}", fmt_pct(self.final_pct))),
            ControllerState::Failed => Verdict::Fail(
                self.failure.clone().unwrap_or_else(|| format!("failed at {}", fmt_pct(self.final_pct))),
            ),
            s => Verdict::Warn(format!(
                "{} in {} stage at {}",
                if self.cancelled { "cancelled" } else { "stopped" },
                s.label().to_lowercase(),
                fmt_pct(self.final_pct),
            )),
        }
    }
}

/// Drives one device through the stage sequence. Owns the device's pass
/// records; nothing else writes them.
pub struct PassController<'a> {
    device:   String,
    tool:     &'a dyn ImagingTool,
    cfg:      &'a RecoveryConfig,
    state:    ControllerState,
    attempts: u32,
    last_pct: f64,
    records:  Vec<PassRecord>,
    trace:    Vec<ControllerState>,
    failure:  Option<RecoveryError>,
    cancelled: bool,
}

impl<'a> PassController<'a> {
    pub fn new(device: impl Into<String>, tool: &'a dyn ImagingTool, cfg: &'a RecoveryConfig) -> Self {
        Self {
            device: device.into(),
            tool,
            cfg,
            state: ControllerState::Read,
            attempts: 0,
            last_pct: 0.0,
            records: Vec::new(),
            trace: Vec::new(),
            failure: None,
            cancelled: false,
        }
    }

    pub fn state(&self) -> ControllerState { self.state }

    pub fn records(&self) -> &[PassRecord] { &self.records }

    /// State after each attempt, in order.
    pub fn trace(&self) -> &[ControllerState] { &self.trace }

    /// Run until DONE, FAILED or cancellation. Only a launch failure or an
    /// unrecoverable stream error comes back as `Err`.
    pub fn run(mut self, cancel: &CancelToken) -> Result<RecoveryReport, RecoveryError> {
        info!(device = %self.device, tool = self.tool.name(), "recovery starting");
        while !self.state.is_terminal() && !self.cancelled {
            self.run_attempt(cancel)?;
        }
        Ok(self.into_report())
    }

    /// Run one attempt of the current stage and apply the transition.
    /// Returns `None` when the controller is already terminal.
    pub fn run_attempt(&mut self, cancel: &CancelToken) -> Result<Option<&PassRecord>, RecoveryError> {
        let Some(stage) = self.state.stage() else { return Ok(None) };
        let sc = self.cfg.stages.get(stage);
        self.attempts += 1;
        info!(device = %self.device, %stage, attempt = self.attempts, "pass starting");

        let started_at = chrono::Local::now();
        let t0 = Instant::now();
        let mut process = self.tool.launch(stage, &sc.params)?;
        let watched = Watched::start(process.as_mut());
        let mut watched = match watched {
            Ok(w) => w,
            Err(e) => {
                let _ = process.terminate(self.cfg.grace());
                return Err(e.into());
            }
        };

        let timeout = sc.timeout_secs.map(Duration::from_secs);
        let (outcome, last_error) = loop {
            if cancel.is_cancelled() {
                watched.stop();
                process.terminate(self.cfg.grace())?;
                break (AttemptOutcome::Cancelled, Some("cancelled by user".to_string()));
            }
            if let Some(limit) = timeout {
                if t0.elapsed() >= limit {
                    warn!(device = %self.device, %stage, "attempt timed out");
                    watched.stop();
                    process.terminate(self.cfg.grace())?;
                    let err = RecoveryError::TimeoutExpired { stage, after: limit };
                    break (AttemptOutcome::TimedOut, Some(err.to_string()));
                }
            }

            watched.poll(self.cfg.poll());

            let exited = match process.try_wait() {
                Ok(code) => code,
                Err(e) => {
                    watched.stop();
                    let _ = process.terminate(self.cfg.grace());
                    return Err(RecoveryError::Stream(e));
                }
            };
            if let Some(code) = exited {
                watched.drain(DRAIN_WAIT);
                if code == 0 {
                    break (AttemptOutcome::Completed, None);
                }
                let msg = watched.last_stderr_line().unwrap_or_else(|| format!("exit status {}", code));
                warn!(device = %self.device, %stage, code, "pass exited with error: {}", msg);
                break (AttemptOutcome::ToolError { code }, Some(msg));
            }
        };

        let progress = watched.parser.latest().clone();
        let pct = progress.pct_rescued.unwrap_or(self.last_pct);
        self.last_pct = pct;
        self.records.push(PassRecord {
            stage,
            attempt: self.attempts,
            completion_pct: pct,
            elapsed: t0.elapsed(),
            last_rate: progress.current_rate,
            remaining: progress.remaining,
            read_errors: progress.read_errors,
            last_error,
            outcome,
            started_at,
        });
        self.apply(stage, pct, outcome);
        Ok(self.records.last())
    }

    fn apply(&mut self, stage: Stage, pct: f64, outcome: AttemptOutcome) {
        if outcome == AttemptOutcome::Cancelled {
            info!(device = %self.device, %stage, pct, "cancelled; map and image remain resumable");
            self.cancelled = true;
            self.trace.push(self.state);
            return;
        }
        let next = decide(self.state, pct, self.attempts, outcome, self.cfg);
        match next {
            ControllerState::Failed => {
                let err = RecoveryError::StageRetryExhausted { stage, pct, attempts: self.attempts };
                warn!(device = %self.device, "{}", err);
                self.failure = Some(err);
            }
            ControllerState::Done => {
                info!(device = %self.device, pct, "recovery done");
            }
            s if s != self.state => {
                info!(device = %self.device, from = %self.state, to = %s, pct, "advancing stage");
                self.attempts = 0;
            }
            _ => {}
        }
        self.state = next;
        self.trace.push(next);
    }

    fn into_report(self) -> RecoveryReport {
        RecoveryReport {
            device:      self.device,
            final_state: self.state,
            final_pct:   self.last_pct,
            passes:      self.records,
            trace:       self.trace,
            cancelled:   self.cancelled,
            failure:     self.failure.map(|e| e.to_string()),
        }
    }
}

/// Readers over a running attempt's stdout/stderr.
struct Watched {
    stdout: Option<StreamReader>,
    stderr: Option<StreamReader>,
    parser: ProgressParser,
    stderr_text: String,
}

impl Watched {
    fn start(process: &mut dyn ToolProcess) -> std::io::Result<Self> {
        let stdout = process.take_stdout().map(StreamReader::start).transpose()?;
        let stderr = process.take_stderr().map(StreamReader::start).transpose()?;
        Ok(Self { stdout, stderr, parser: ProgressParser::new(), stderr_text: String::new() })
    }

    /// Block at most `wait` on stdout, then pick up any stderr.
    fn poll(&mut self, wait: Duration) {
        match self.stdout.as_mut() {
            Some(out) if !out.is_exhausted() => {
                if let Some(chunk) = out.read(wait) {
                    self.parser.feed(&chunk);
                }
            }
            _ => thread::sleep(wait),
        }
        if let Some(err) = self.stderr.as_mut() {
            while let Some(chunk) = err.try_read() {
                keep_tail(&mut self.stderr_text, &chunk);
            }
        }
    }

    fn drain(&mut self, timeout: Duration) {
        if let Some(out) = self.stdout.as_mut() {
            let rest = out.drain(timeout);
            self.parser.feed(&rest);
        }
        self.parser.finish();
        if let Some(err) = self.stderr.as_mut() {
            let rest = err.drain(timeout);
            keep_tail(&mut self.stderr_text, &rest);
        }
    }

    fn last_stderr_line(&self) -> Option<String> {
        self.stderr_text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .map(str::to_string)
    }

    fn stop(&mut self) {
        if let Some(r) = self.stdout.as_mut() { r.stop(); }
        if let Some(r) = self.stderr.as_mut() { r.stop(); }
    }
}

/// Append `chunk` to `text`, keeping only the last `STDERR_KEEP` bytes.
fn keep_tail(text: &mut String, chunk: &[u8]) {
    text.push_str(&String::from_utf8_lossy(chunk));
    if text.len() > STDERR_KEEP {
        let cut = text.len() - STDERR_KEEP;
        let cut = (cut..text.len()).find(|&i| text.is_char_boundary(i)).unwrap_or(text.len());
        text.drain(..cut);
    }
}

/// Recover several devices at once, one controller thread each. A failure
/// on one device never stops the others.
pub fn run_many<T>(
    jobs:   Vec<(String, T)>,
    cfg:    &RecoveryConfig,
    cancel: &CancelToken,
) -> Vec<(String, Result<RecoveryReport, RecoveryError>)>
where
    T: ImagingTool + Send,
{
    thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|(device, tool)| {
                let cancel = cancel.clone();
                let name = device.clone();
                let handle = scope.spawn(move || PassController::new(device, &tool, cfg).run(&cancel));
                (name, handle)
            })
            .collect();
        handles
            .into_iter()
            .map(|(name, h)| {
                let result = h.join().unwrap_or_else(|_| {
                    Err(RecoveryError::Stream(std::io::Error::other("controller thread panicked")))
                });
                (name, result)
            })
            .collect()
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::recovery::reader::Source;
    use crate::recovery::stage::StageParams;
    use std::collections::VecDeque;
    use std::io::{self, Cursor};
    use std::sync::Mutex;

    /// One scripted attempt: what the tool prints and how it ends.
    #[derive(Clone)]
    pub(crate) struct Script {
        pub stdout: Vec<u8>,
        pub stderr: Vec<u8>,
        /// `None` keeps the process alive until terminated.
        pub exit:   Option<i32>,
    }

    impl Script {
        pub fn pct(pct: f64, exit: i32) -> Self {
            Self {
                stdout: format!("pct rescued: {:.2}%, read errors: 0, remaining time: n/a\n", pct).into_bytes(),
                stderr: Vec::new(),
                exit:   Some(exit),
            }
        }
    }

    pub(crate) struct ScriptedTool {
        scripts:  Mutex<VecDeque<Script>>,
        pub launched: Mutex<Vec<(Stage, Vec<String>)>>,
        fail_launch: bool,
    }

    impl ScriptedTool {
        pub fn new(scripts: Vec<Script>) -> Self {
            Self { scripts: Mutex::new(scripts.into()), launched: Mutex::new(Vec::new()), fail_launch: false }
        }

        pub fn unlaunchable() -> Self {
            Self { fail_launch: true, ..Self::new(Vec::new()) }
        }
    }

    struct FakeProcess {
        stdout:     Option<Cursor<Vec<u8>>>,
        stderr:     Option<Cursor<Vec<u8>>>,
        exit:       Option<i32>,
        terminated: bool,
    }

    impl ToolProcess for FakeProcess {
        fn take_stdout(&mut self) -> Option<Box<dyn Source>> {
            self.stdout.take().map(|c| Box::new(c) as Box<dyn Source>)
        }
        fn take_stderr(&mut self) -> Option<Box<dyn Source>> {
            self.stderr.take().map(|c| Box::new(c) as Box<dyn Source>)
        }
        fn try_wait(&mut self) -> io::Result<Option<i32>> {
            if self.terminated { Ok(Some(143)) } else { Ok(self.exit) }
        }
        fn terminate(&mut self, _grace: Duration) -> io::Result<()> {
            self.terminated = true;
            Ok(())
        }
    }

    impl ImagingTool for ScriptedTool {
        fn name(&self) -> &str { "scripted" }

        fn launch(&self, stage: Stage, params: &StageParams) -> Result<Box<dyn ToolProcess>, RecoveryError> {
            if self.fail_launch {
                return Err(RecoveryError::ToolLaunch {
                    tool:   "scripted".into(),
                    source: io::Error::new(io::ErrorKind::NotFound, "no such tool"),
                });
            }
            self.launched.lock().unwrap().push((stage, params.to_args()));
            let s = self.scripts.lock().unwrap().pop_front().unwrap_or_else(|| Script::pct(100.0, 0));
            Ok(Box::new(FakeProcess {
                stdout:     Some(Cursor::new(s.stdout)),
                stderr:     Some(Cursor::new(s.stderr)),
                exit:       s.exit,
                terminated: false,
            }))
        }
    }

    pub(crate) fn fast_cfg() -> RecoveryConfig {
        RecoveryConfig { poll_interval_ms: 5, kill_grace_secs: 0, max_retries: 5, ..RecoveryConfig::default() }
    }

    #[test]
    fn stderr_tail_is_bounded_on_char_boundaries() {
        let mut text = String::new();
        keep_tail(&mut text, "é".repeat(STDERR_KEEP).as_bytes());
        keep_tail(&mut text, b"\nddrescue: Input/output error\n");
        assert!(text.len() <= STDERR_KEEP);
        assert!(text.ends_with("ddrescue: Input/output error\n"));
    }

    #[test]
    fn decide_follows_documented_trace() {
        let cfg = fast_cfg();
        let mut state = ControllerState::Read;
        let mut attempts = 0;
        let mut trace = Vec::new();
        for pct in [60.0, 70.0, 96.0, 99.0, 100.0] {
            attempts += 1;
            let next = decide(state, pct, attempts, AttemptOutcome::Completed, &cfg);
            if next != state { attempts = 0; }
            state = next;
            trace.push(state);
        }
        use ControllerState::*;
        assert_eq!(trace, vec![Read, Read, Trim, Trim, Scrape]);
    }

    #[test]
    fn decide_edges() {
        let cfg = fast_cfg();
        use ControllerState::*;
        // exactly at threshold advances
        assert_eq!(decide(Read, 95.0, 1, AttemptOutcome::Completed, &cfg), Trim);
        assert_eq!(decide(Read, 94.99, 1, AttemptOutcome::Completed, &cfg), Read);
        // tool errors still advance when the map says the stage is done
        assert_eq!(decide(Read, 97.0, 1, AttemptOutcome::ToolError { code: 1 }, &cfg), Trim);
        // scrape never advances on percentage alone
        assert_eq!(decide(Scrape, 100.0, 1, AttemptOutcome::TimedOut, &cfg), Scrape);
        assert_eq!(decide(Scrape, 99.0, 1, AttemptOutcome::Completed, &cfg), Done);
        // budget: max_retries + 1 attempts
        assert_eq!(decide(Trim, 50.0, 6, AttemptOutcome::Completed, &cfg), Failed);
        assert_eq!(decide(Trim, 50.0, 5, AttemptOutcome::Completed, &cfg), Trim);
        assert_eq!(decide(Read, 10.0, 9, AttemptOutcome::Cancelled, &cfg), Read);
        assert_eq!(decide(Done, 10.0, 1, AttemptOutcome::Completed, &cfg), Done);
    }

    #[test]
    fn controller_runs_scripted_sequence_to_done() {
        let tool = ScriptedTool::new(vec![
            Script::pct(60.0, 0),
            Script::pct(70.0, 0),
            Script::pct(96.0, 0),
            Script::pct(99.0, 0),
            Script::pct(100.0, 0),
            Script::pct(100.0, 0),
        ]);
        let cfg = fast_cfg();
        let report = PassController::new("sdb", &tool, &cfg).run(&CancelToken::new()).unwrap();
        use ControllerState::*;
        assert_eq!(report.trace, vec![Read, Read, Trim, Trim, Scrape, Done]);
        assert_eq!(report.final_state, Done);
        assert_eq!(report.final_pct, 100.0);
        assert_eq!(report.verdict(), Verdict::Pass);

        let stages: Vec<Stage> = report.passes.iter().map(|p| p.stage).collect();
        assert_eq!(stages, vec![Stage::Read, Stage::Read, Stage::Read, Stage::Trim, Stage::Trim, Stage::Scrape]);
        let attempts: Vec<u32> = report.passes.iter().map(|p| p.attempt).collect();
        assert_eq!(attempts, vec![1, 2, 3, 1, 2, 1]);

        // stage parameter sets are swapped in per stage
        let launched = tool.launched.lock().unwrap();
        assert!(launched[0].1.contains(&"--min-read-rate=64KiB".to_string()));
        assert!(launched[5].1.contains(&"--retry-passes=1".to_string()));
    }

    #[test]
    fn nonzero_exit_counts_as_failed_attempt_not_abort() {
        let mut err = Script::pct(40.0, 1);
        err.stderr = b"ddrescue: Input/output error\n".to_vec();
        let tool = ScriptedTool::new(vec![err, Script::pct(96.0, 0)]);
        let cfg = fast_cfg();
        let mut c = PassController::new("sdb", &tool, &cfg);
        let cancel = CancelToken::new();
        let first = c.run_attempt(&cancel).unwrap().unwrap().clone();
        assert_eq!(first.outcome, AttemptOutcome::ToolError { code: 1 });
        assert_eq!(first.last_error.as_deref(), Some("ddrescue: Input/output error"));
        assert_eq!(c.state(), ControllerState::Read);
        c.run_attempt(&cancel).unwrap();
        assert_eq!(c.state(), ControllerState::Trim);
    }

    #[test]
    fn retries_exhausted_ends_in_failed_with_reason() {
        let tool = ScriptedTool::new(vec![Script::pct(50.0, 1); 10]);
        let cfg = RecoveryConfig { max_retries: 2, ..fast_cfg() };
        let report = PassController::new("sdc", &tool, &cfg).run(&CancelToken::new()).unwrap();
        assert_eq!(report.final_state, ControllerState::Failed);
        assert_eq!(report.passes.len(), 3);
        assert_eq!(report.final_pct, 50.0);
        let v = report.verdict();
        assert_eq!(v.severity(), crate::models::severity::Severity::Fail);
        assert_eq!(v.reason(), Some("read stage stalled at 50.00% after 3 attempt(s)"));
    }

    #[test]
    fn timeout_terminates_and_counts_against_budget() {
        let hang = Script { stdout: b"pct rescued: 12.00%\n".to_vec(), stderr: Vec::new(), exit: None };
        let tool = ScriptedTool::new(vec![hang.clone(), hang]);
        let mut cfg = RecoveryConfig { max_retries: 1, ..fast_cfg() };
        cfg.stages.read.timeout_secs = Some(1);
        let report = PassController::new("sdd", &tool, &cfg).run(&CancelToken::new()).unwrap();
        assert_eq!(report.final_state, ControllerState::Failed);
        assert!(report.passes.iter().all(|p| p.outcome == AttemptOutcome::TimedOut));
        assert_eq!(report.passes[0].completion_pct, 12.0);
        assert!(report.passes[0].last_error.as_deref().unwrap().contains("timed out"));
    }

    #[test]
    fn cancellation_records_a_cancelled_pass_and_keeps_stage() {
        let hang = Script { stdout: b"pct rescued: 33.00%\n".to_vec(), stderr: Vec::new(), exit: None };
        let tool = ScriptedTool::new(vec![hang]);
        let cfg = fast_cfg();
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });
        let report = PassController::new("sde", &tool, &cfg).run(&cancel).unwrap();
        t.join().unwrap();
        assert!(report.cancelled);
        assert_eq!(report.final_state, ControllerState::Read);
        assert_eq!(report.passes.len(), 1);
        assert!(report.passes[0].is_cancelled());
        assert_eq!(report.passes[0].completion_pct, 33.0);
        assert_eq!(report.verdict().severity(), crate::models::severity::Severity::Warn);
    }

    #[test]
    fn launch_failure_is_fatal() {
        let tool = ScriptedTool::unlaunchable();
        let cfg = fast_cfg();
        let r = PassController::new("sdf", &tool, &cfg).run(&CancelToken::new());
        assert!(matches!(r, Err(RecoveryError::ToolLaunch { .. })));
    }

    #[test]
    fn one_device_failing_does_not_stop_others() {
        let cfg = fast_cfg();
        let jobs = vec![
            ("good".to_string(), ScriptedTool::new(vec![])),
            ("gone".to_string(), ScriptedTool::unlaunchable()),
            ("bad".to_string(), ScriptedTool::new(vec![Script::pct(10.0, 1); 10])),
        ];
        let results = run_many(jobs, &cfg, &CancelToken::new());
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].1.as_ref().unwrap().final_state, ControllerState::Done);
        assert!(results[1].1.is_err());
        assert_eq!(results[2].1.as_ref().unwrap().final_state, ControllerState::Failed);
    }

    #[test]
    fn config_validation() {
        assert!(RecoveryConfig::default().validate().is_ok());
        let cfg = RecoveryConfig { poll_interval_ms: 0, ..RecoveryConfig::default() };
        assert!(cfg.validate().is_err());
    }
}
