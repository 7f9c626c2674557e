//! The external imaging tool, behind a trait so the controller can be
//! driven by a scripted stand-in in tests.

use crate::error::RecoveryError;
use crate::recovery::reader::Source;
use crate::recovery::stage::{Stage, StageParams};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::ffi::OsString;
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// A running tool invocation.
pub trait ToolProcess {
    fn take_stdout(&mut self) -> Option<Box<dyn Source>>;
    fn take_stderr(&mut self) -> Option<Box<dyn Source>>;
    /// Exit code once the process has ended; signals map to `128 + signo`.
    fn try_wait(&mut self) -> io::Result<Option<i32>>;
    /// SIGTERM, then SIGKILL if it is still alive after `grace`.
    fn terminate(&mut self, grace: Duration) -> io::Result<()>;
}

/// Something that can start one imaging attempt for a stage.
pub trait ImagingTool {
    fn name(&self) -> &str;
    fn launch(&self, stage: Stage, params: &StageParams) -> Result<Box<dyn ToolProcess>, RecoveryError>;
}

/// GNU ddrescue against one source/destination/map triple.
#[derive(Debug, Clone)]
pub struct Ddrescue {
    pub binary: String,
    pub source: PathBuf,
    pub dest:   PathBuf,
    pub map:    PathBuf,
    /// Needed when the destination is a block device.
    pub force:  bool,
}

impl Ddrescue {
    pub fn args(&self, stage: Stage, params: &StageParams) -> Vec<OsString> {
        let mut args: Vec<OsString> = stage.phase_args().iter().map(OsString::from).collect();
        if self.force {
            args.push("--force".into());
        }
        args.extend(params.to_args().into_iter().map(OsString::from));
        args.push(self.source.clone().into_os_string());
        args.push(self.dest.clone().into_os_string());
        args.push(self.map.clone().into_os_string());
        args
    }
}

impl ImagingTool for Ddrescue {
    fn name(&self) -> &str { &self.binary }

    fn launch(&self, stage: Stage, params: &StageParams) -> Result<Box<dyn ToolProcess>, RecoveryError> {
        let args = self.args(stage, params);
        tracing::debug!(tool = %self.binary, ?args, "spawning");
        let child = Command::new(&self.binary)
            .args(&args)
            .env("LC_ALL", "C")
            // terminal SIGINT must not reach the tool directly
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RecoveryError::ToolLaunch { tool: self.binary.clone(), source })?;
        Ok(Box::new(ChildProcess { child }))
    }
}

pub struct ChildProcess {
    child: Child,
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().or_else(|| status.signal().map(|s| 128 + s)).unwrap_or(-1)
}

impl ToolProcess for ChildProcess {
    fn take_stdout(&mut self) -> Option<Box<dyn Source>> {
        self.child.stdout.take().map(|s| Box::new(s) as Box<dyn Source>)
    }

    fn take_stderr(&mut self) -> Option<Box<dyn Source>> {
        self.child.stderr.take().map(|s| Box::new(s) as Box<dyn Source>)
    }

    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.child.try_wait()?.map(exit_code))
    }

    fn terminate(&mut self, grace: Duration) -> io::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        let pid = Pid::from_raw(self.child.id() as i32);
        match kill(pid, Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => return Err(io::Error::from(e)),
        }
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if self.child.try_wait()?.is_some() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(50));
        }
        tracing::warn!(pid = self.child.id(), "tool ignored SIGTERM, killing");
        self.child.kill()?;
        self.child.wait()?;
        Ok(())
    }
}
