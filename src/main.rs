use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use diskrx::collectors::{bench, smart as smart_collector, thermal as thermal_collector};
use diskrx::config::Config;
use diskrx::health::evaluator::ThresholdTable;
use diskrx::health::thermal::classify_temps;
use diskrx::health::throughput::assess_samples;
use diskrx::health::tracker::{OverrideMode, TestKind};
use diskrx::models::device::{Device, DeviceType};
use diskrx::models::severity::{Severity, Verdict};
use diskrx::models::status::TestStatus;
use diskrx::recovery::controller::{run_many, CancelToken};
use diskrx::recovery::tool::Ddrescue;
use diskrx::report;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "diskrx", about = "Device health assessment and staged ddrescue recovery", version)]
struct Cli {
    /// Config file (default: ~/.config/diskrx/diskrx.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of a text report
    #[arg(long, global = true)]
    json: bool,

    /// Plain output without ANSI colour
    #[arg(long, global = true)]
    no_color: bool,

    /// More log output on stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate SMART/NVMe attributes and self-test results; exit 0=PASS, 1=WARN, 2=FAIL
    Assess {
        /// Block devices, e.g. /dev/sda
        #[arg(required = true)]
        devices: Vec<String>,

        /// Also run the read benchmark on each device
        #[arg(long)]
        bench: bool,

        /// Override a failed test: TEST:REASON (tests: attributes, self-test, benchmark)
        #[arg(long = "override", value_parser = parse_override)]
        overrides: Vec<(TestKind, String)>,
    },
    /// Timed direct-read benchmark with a throughput graph
    Bench {
        device: String,
        #[arg(long)]
        samples: Option<usize>,
    },
    /// Sample CPU thermal zones and check the cooling
    Cpu {
        /// Sampling duration in seconds
        #[arg(long)]
        secs: Option<u64>,
    },
    /// Staged recovery: SRC DEST MAP [SRC DEST MAP ...], one controller per source
    Rescue {
        #[arg(required = true, num_args = 3..)]
        triples: Vec<PathBuf>,

        /// Destination is a block device
        #[arg(long)]
        force: bool,

        #[arg(long)]
        max_retries: Option<u32>,
    },
    /// Print the config path and effective settings
    Config,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OverrideTest {
    Attributes,
    SelfTest,
    Benchmark,
    Cooling,
    Recovery,
}

fn parse_override(s: &str) -> Result<(TestKind, String), String> {
    let (test, reason) = s.split_once(':').ok_or("expected TEST:REASON")?;
    let reason = reason.trim();
    if reason.is_empty() {
        return Err("an override needs a reason".into());
    }
    let kind = match OverrideTest::from_str(test.trim(), true)? {
        OverrideTest::Attributes => TestKind::DiskAttributes,
        OverrideTest::SelfTest   => TestKind::DiskSelfTest,
        OverrideTest::Benchmark  => TestKind::DiskBenchmark,
        OverrideTest::Cooling    => TestKind::CpuCooling,
        OverrideTest::Recovery   => TestKind::DiskRecovery,
    };
    Ok((kind, reason.to_string()))
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT/SIGTERM into `cancel` so a running rescue stops cleanly.
fn install_cancel_handler(cancel: &CancelToken) -> Result<()> {
    let action = SigAction::new(SigHandler::Handler(on_sigint), SaFlags::SA_RESTART, SigSet::empty());
    // SAFETY: the handler only stores to an atomic.
    unsafe {
        sigaction(Signal::SIGINT, &action).context("installing SIGINT handler")?;
        sigaction(Signal::SIGTERM, &action).context("installing SIGTERM handler")?;
    }
    let cancel = cancel.clone();
    thread::Builder::new().name("signal-watch".into()).spawn(move || loop {
        if INTERRUPTED.load(Ordering::SeqCst) {
            tracing::warn!("interrupt received, stopping after the current pass is terminated");
            cancel.cancel();
            return;
        }
        thread::sleep(Duration::from_millis(100));
    })?;
    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "diskrx", &mut io::stdout());
        return Ok(());
    }

    let cfg = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let out = Output { json: cli.json, color: !cli.no_color };

    let severity = match cli.command {
        Command::Assess { devices, bench, overrides } => run_assess(&cfg, &devices, bench, &overrides, out)?,
        Command::Bench { device, samples }            => run_bench(&cfg, &device, samples, out)?,
        Command::Cpu { secs }                         => run_cpu(&cfg, secs, out)?,
        Command::Rescue { triples, force, max_retries } => run_rescue(&cfg, &triples, force, max_retries, out)?,
        Command::Config => {
            run_print_config(&cfg, cli.config.as_deref())?;
            Severity::Pass
        }
        Command::Completions { .. } => Severity::Pass,
    };
    std::process::exit(severity.exit_code());
}

#[derive(Clone, Copy)]
struct Output {
    json:  bool,
    color: bool,
}

fn print_devices(devices: &[Device], cfg: &Config, out: Output) -> Result<()> {
    if out.json {
        let v: Vec<serde_json::Value> = devices.iter().map(report::device_json).collect();
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({
            "diskrx_version": env!("CARGO_PKG_VERSION"),
            "timestamp":      chrono::Local::now().to_rfc3339(),
            "devices":        v,
        }))?);
    } else {
        for d in devices {
            print!("{}", report::device_text(d, cfg, out.color));
        }
    }
    Ok(())
}

fn worst(devices: &[Device]) -> Severity {
    devices.iter().map(Device::severity).max().unwrap_or(Severity::Pass)
}

fn device_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn bench_device(dev: &mut Device, path: &Path, cfg: &Config, samples: Option<usize>) {
    let opts = bench::BenchOptions {
        samples:   samples.unwrap_or(cfg.general.bench_samples),
        block_kib: cfg.general.bench_block_kib,
        direct:    cfg.general.bench_direct,
    };
    let result = match bench::run_benchmark(path, &opts) {
        Ok(run) => {
            let mut verdict = assess_samples(run.samples.as_slice(), &dev.dev_type, &cfg.throughput);
            if run.read_errors > 0 {
                verdict = verdict.worst(Verdict::Fail(format!("{} unreadable block(s)", run.read_errors)));
            }
            dev.apply_benchmark(run.samples, verdict)
        }
        Err(e) => {
            tracing::warn!(device = %path.display(), "benchmark failed: {}", e);
            dev.tests.set_result_with_detail(TestKind::DiskBenchmark, TestStatus::Error, Some(e.to_string()))
        }
    };
    if let Err(e) = result {
        tracing::warn!(device = %dev.name, "{}", e);
    }
}

fn assess_one(path: &str, cfg: &Config, table: &ThresholdTable, with_bench: bool) -> Device {
    let name = device_name(path);
    let mode = cfg.overrides.resolve();
    let mut dev = match smart_collector::poll_device(&cfg.general.smartctl, path) {
        Some(raw) => raw.into_device(name, table, mode),
        None => {
            let mut d = Device::new(name, mode);
            let _ = d.tests.set_result_with_detail(
                TestKind::DiskAttributes,
                TestStatus::Unknown,
                Some("no SMART data".into()),
            );
            d
        }
    };
    if with_bench {
        if dev.dev_type == DeviceType::Unknown {
            dev.dev_type = DeviceType::infer(name, None, None);
        }
        bench_device(&mut dev, Path::new(path), cfg, None);
    }
    dev
}

fn run_assess(
    cfg:       &Config,
    paths:     &[String],
    with_bench: bool,
    overrides: &[(TestKind, String)],
    out:       Output,
) -> Result<Severity> {
    let table = cfg.threshold_table()?;
    let mut devices: Vec<Device> = thread::scope(|s| {
        let handles: Vec<_> = paths
            .iter()
            .map(|p| {
                let table = &table;
                s.spawn(move || assess_one(p, cfg, table, with_bench))
            })
            .collect();
        handles.into_iter().filter_map(|h| h.join().ok()).collect()
    });
    if devices.len() != paths.len() {
        bail!("assessment thread panicked");
    }

    for dev in &mut devices {
        for (kind, reason) in overrides {
            match dev.tests.override_result(*kind, reason.as_str()) {
                Ok(_) => {}
                Err(e) => tracing::warn!(device = %dev.name, "override refused: {}", e),
            }
        }
    }

    print_devices(&devices, cfg, out)?;
    Ok(worst(&devices))
}

fn run_bench(cfg: &Config, path: &str, samples: Option<usize>, out: Output) -> Result<Severity> {
    let name = device_name(path);
    let mut dev = Device::new(name, OverrideMode::None);
    dev.dev_type = DeviceType::infer(name, None, sysfs_rotational(name));
    bench_device(&mut dev, Path::new(path), cfg, samples);
    print_devices(std::slice::from_ref(&dev), cfg, out)?;
    Ok(dev.severity())
}

fn sysfs_rotational(name: &str) -> Option<bool> {
    let text = std::fs::read_to_string(format!("/sys/block/{}/queue/rotational", name)).ok()?;
    Some(text.trim() == "1")
}

fn run_cpu(cfg: &Config, secs: Option<u64>, out: Output) -> Result<Severity> {
    let duration = Duration::from_secs(secs.unwrap_or(cfg.thermal.sample_secs));
    let interval = Duration::from_millis(cfg.thermal.interval_ms);
    tracing::info!(secs = duration.as_secs(), "sampling thermal zones");
    let samples = thermal_collector::sample(Path::new(thermal_collector::THERMAL_ROOT), duration, interval, || false);
    let mut dev = Device::new("cpu", OverrideMode::None);
    dev.apply_thermal(classify_temps(&samples, &cfg.thermal))?;
    print_devices(std::slice::from_ref(&dev), cfg, out)?;
    Ok(dev.severity())
}

fn run_rescue(
    cfg:         &Config,
    triples:     &[PathBuf],
    force:       bool,
    max_retries: Option<u32>,
    out:         Output,
) -> Result<Severity> {
    if triples.len() % 3 != 0 {
        bail!("rescue takes SRC DEST MAP triples, got {} path(s)", triples.len());
    }
    let mut rcfg = cfg.recovery.clone();
    rcfg.force |= force;
    if let Some(n) = max_retries {
        rcfg.max_retries = n;
    }
    rcfg.validate()?;

    let jobs: Vec<(String, Ddrescue)> = triples
        .chunks_exact(3)
        .map(|t| {
            let tool = Ddrescue {
                binary: rcfg.tool.clone(),
                source: t[0].clone(),
                dest:   t[1].clone(),
                map:    t[2].clone(),
                force:  rcfg.force,
            };
            (t[0].display().to_string(), tool)
        })
        .collect();

    let cancel = CancelToken::new();
    install_cancel_handler(&cancel)?;

    let mut worst = Severity::Pass;
    let mut reports = Vec::new();
    for (source, result) in run_many(jobs, &rcfg, &cancel) {
        match result {
            Ok(r) => {
                worst = worst.max(r.verdict().severity());
                reports.push(r);
            }
            Err(e) => {
                tracing::error!(device = %source, "recovery aborted: {}", e);
                worst = Severity::Fail;
            }
        }
    }

    if out.json {
        let v: Vec<serde_json::Value> = reports.iter().map(report::recovery_json).collect();
        println!("{}", serde_json::to_string_pretty(&v)?);
    } else {
        for r in &reports {
            print!("{}", report::recovery_text(r));
        }
    }
    Ok(worst)
}

fn run_print_config(cfg: &Config, explicit: Option<&Path>) -> Result<()> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(Config::config_path)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "(unknown)".to_string());
    println!("# Config: {}", path);
    println!("# Effective override mode: {:?}", cfg.overrides.resolve());
    println!();
    print!("{}", cfg.to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_argument_parsing() {
        assert_eq!(
            parse_override("attributes:cable reseated").unwrap(),
            (TestKind::DiskAttributes, "cable reseated".to_string())
        );
        assert_eq!(parse_override("self-test: ok").unwrap().0, TestKind::DiskSelfTest);
        assert!(parse_override("attributes:").is_err());
        assert!(parse_override("nonsense:x").is_err());
        assert!(parse_override("attributes").is_err());
    }

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }
}
