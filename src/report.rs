//! Text and JSON reports. Every field is listed explicitly; nothing is
//! dumped by reflection.

use crate::config::Config;
use crate::health::evaluator::{Evaluation, ThresholdSource};
use crate::health::tracker::TestEntry;
use crate::models::device::Device;
use crate::models::pass::PassRecord;
use crate::models::severity::Verdict;
use crate::recovery::controller::RecoveryReport;
use crate::recovery::progress::RemainingTime;
use crate::ui::graph;
use crate::ui::theme::{Theme, ThemeVariant};
use crate::util::human::{fmt_bytes, fmt_duration, fmt_num, fmt_pct, fmt_rate};
use serde_json::{json, Value};

const RULE: &str = "═══════════════════════════════════════════════";

fn section(out: &mut String, title: &str) {
    let pad = 46usize.saturating_sub(title.chars().count() + 4);
    out.push_str(&format!("── {} {}\n", title, "─".repeat(pad)));
}

/// "CS", "ERROR (reason)", "OVERRIDE (was ERROR: reason)".
pub fn entry_text(entry: &TestEntry) -> String {
    if !entry.blocking.is_empty() {
        return format!("{} [blocking: {}]", entry.status, entry.blocking.join(", "));
    }
    match (&entry.overridden, &entry.detail) {
        (Some(o), _)    => format!("{} (was {}: {})", entry.status, o.original, o.reason),
        (None, Some(d)) => format!("{} ({})", entry.status, d),
        (None, None)    => entry.status.to_string(),
    }
}

fn verdict_line(v: &Verdict) -> String {
    match v.reason() {
        Some(r) => format!("{}: {}", v.severity(), r),
        None    => v.severity().to_string(),
    }
}

fn source_text(e: &Evaluation) -> String {
    match &e.source {
        Some(ThresholdSource::Generic)    => "generic".into(),
        Some(ThresholdSource::Overlay(p)) => format!("overlay {}", p),
        None                              => "-".into(),
    }
}

/// Human-readable report for one device. `color` switches the throughput
/// graph between ANSI and plain block characters.
pub fn device_text(dev: &Device, cfg: &Config, color: bool) -> String {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let variant = if color { ThemeVariant::from_name(&cfg.general.theme) } else { ThemeVariant::Mono };
    let theme = Theme::for_variant(variant);
    let paint = |text: String, style| if color { graph::paint(&text, style) } else { text };
    let mut out = String::new();
    out.push_str(&format!("{}\n  diskrx report: {}  {}\n{}\n\n", RULE, dev.name, now, RULE));

    out.push_str(&format!(
        "  Model: {}  Serial: {}  Type: {}  Capacity: {}\n\n",
        dev.model.as_deref().unwrap_or("Unknown"),
        dev.serial.as_deref().unwrap_or("-"),
        dev.dev_type.label(),
        fmt_bytes(dev.capacity_bytes),
    ));

    section(&mut out, "Tests");
    for (kind, entry) in dev.tests.entries() {
        let status = paint(entry_text(entry), theme.status_style(entry.status));
        out.push_str(&format!("  {:<20} {}\n", kind.label(), status));
    }
    out.push('\n');

    if !dev.attributes.evaluations.is_empty() || !dev.attributes.malformed.is_empty() {
        section(&mut out, &format!("Attributes ({})", dev.attributes.evaluations.len()));
        for e in &dev.attributes.evaluations {
            let flag = if e.unclassified { "  [unclassified]" } else { "" };
            out.push_str(&format!(
                "  {:>17} {:<26} {:>12}  {:<16} {}{}\n",
                e.id, e.name, fmt_num(e.raw), e.severity.label(), source_text(e), flag,
            ));
            if let Some(r) = &e.reason {
                out.push_str(&format!("  {:>17} {}\n", "", r));
            }
        }
        for m in &dev.attributes.malformed {
            out.push_str(&format!("  {}\n", m));
        }
        out.push('\n');
    }

    if let Some(samples) = &dev.samples {
        section(&mut out, "Benchmark");
        if let (Some(avg), Some(min), Some(max)) = (samples.average(), samples.min(), samples.max()) {
            out.push_str(&format!(
                "  {} samples  avg {}  min {}  max {}\n",
                samples.len(), fmt_rate(avg), fmt_rate(min), fmt_rate(max),
            ));
        }
        match graph::render(
            samples.as_slice(), &dev.dev_type, cfg.general.graph_width, cfg.general.graph_steps,
            &cfg.throughput, &theme,
        ) {
            Ok(lines) => {
                let body = if color { graph::to_ansi(&lines) } else { graph::to_plain(&lines) };
                for l in body.lines() {
                    out.push_str(&format!("  {}\n", l));
                }
            }
            Err(e) => out.push_str(&format!("  (no graph: {})\n", e)),
        }
        if let Some(v) = &dev.bench_verdict {
            out.push_str(&format!("  {}\n", verdict_line(v)));
        }
        out.push('\n');
    }

    if let Some(t) = &dev.thermal {
        section(&mut out, "Thermal");
        out.push_str(&format!(
            "  {} samples  peak {:.1}°C  avg {:.1}°C  {}\n\n",
            t.samples, t.peak_c, t.avg_c, verdict_line(&t.verdict),
        ));
    }

    if let Some(r) = &dev.recovery {
        out.push_str(&recovery_body(r));
        out.push('\n');
    }

    let verdict = dev.verdict();
    let line = paint(verdict_line(&verdict), theme.severity_style(verdict.severity()));
    out.push_str(&format!("  VERDICT  {}\n{}\n", line, RULE));
    out
}

fn pass_line(p: &PassRecord) -> String {
    let remaining = match p.remaining {
        Some(RemainingTime::Estimate(d))  => fmt_duration(d),
        Some(RemainingTime::NotAvailable) => "n/a".into(),
        None                              => "-".into(),
    };
    let mut line = format!(
        "  {:<6} #{:<2} {:>8}  {:>10}  {:>12}  left {:<12} {}",
        p.stage.label(),
        p.attempt,
        fmt_pct(p.completion_pct),
        fmt_duration(p.elapsed),
        p.last_rate.map(fmt_rate).unwrap_or_else(|| "-".into()),
        remaining,
        p.outcome.label(),
    );
    if let Some(e) = &p.last_error {
        line.push_str(&format!("  ({})", e));
    }
    line
}

fn recovery_body(r: &RecoveryReport) -> String {
    let mut out = String::new();
    section(&mut out, &format!("Recovery {}", r.device));
    for p in &r.passes {
        out.push_str(&pass_line(p));
        out.push('\n');
    }
    let trace: Vec<&str> = r.trace.iter().map(|s| s.label()).collect();
    out.push_str(&format!("  trace: {}\n", trace.join(" -> ")));
    out.push_str(&format!(
        "  final: {} at {}{}\n",
        r.final_state,
        fmt_pct(r.final_pct),
        if r.cancelled { " (cancelled, resumable)" } else { "" },
    ));
    out.push_str(&format!("  {}\n", verdict_line(&r.verdict())));
    out
}

pub fn recovery_text(r: &RecoveryReport) -> String {
    format!("{}\n{}{}\n", RULE, recovery_body(r), RULE)
}

fn verdict_json(v: &Verdict) -> Value {
    json!({ "severity": v.severity().label(), "reason": v.reason() })
}

fn evaluation_json(e: &Evaluation) -> Value {
    json!({
        "id":           e.id,
        "name":         e.name,
        "raw":          e.raw,
        "value":        e.value,
        "severity":     e.severity.label(),
        "blocking":     e.blocking,
        "unclassified": e.unclassified,
        "source":       source_text(e),
        "reason":       e.reason,
    })
}

fn pass_json(p: &PassRecord) -> Value {
    let remaining_secs = match p.remaining {
        Some(RemainingTime::Estimate(d)) => Some(d.as_secs()),
        _                                => None,
    };
    json!({
        "stage":          p.stage.label(),
        "attempt":        p.attempt,
        "completion_pct": p.completion_pct,
        "elapsed_secs":   p.elapsed.as_secs_f64(),
        "last_rate":      p.last_rate,
        "remaining_secs": remaining_secs,
        "read_errors":    p.read_errors,
        "last_error":     p.last_error,
        "outcome":        p.outcome.label(),
        "started_at":     p.started_at.to_rfc3339(),
    })
}

pub fn recovery_json(r: &RecoveryReport) -> Value {
    json!({
        "device":      r.device,
        "final_state": r.final_state.label(),
        "final_pct":   r.final_pct,
        "cancelled":   r.cancelled,
        "failure":     r.failure,
        "trace":       r.trace.iter().map(|s| s.label()).collect::<Vec<_>>(),
        "passes":      r.passes.iter().map(pass_json).collect::<Vec<_>>(),
        "verdict":     verdict_json(&r.verdict()),
    })
}

pub fn device_json(dev: &Device) -> Value {
    let tests: Vec<Value> = dev.tests.entries().map(|(kind, e)| {
        json!({
            "test":     kind.label(),
            "status":   e.status.label(),
            "severity": e.severity().label(),
            "detail":   e.detail,
            "blocking": e.blocking,
            "override": e.overridden.as_ref().map(|o| json!({
                "original": o.original.label(),
                "reason":   o.reason,
                "mode":     o.mode,
                "at":       o.at.to_rfc3339(),
            })),
        })
    }).collect();

    let benchmark = dev.samples.as_ref().map(|s| json!({
        "samples": s.as_slice(),
        "average": s.average(),
        "min":     s.min(),
        "max":     s.max(),
        "verdict": dev.bench_verdict.as_ref().map(verdict_json),
    }));

    let thermal = dev.thermal.as_ref().map(|t| json!({
        "samples": t.samples,
        "peak_c":  t.peak_c,
        "avg_c":   t.avg_c,
        "verdict": verdict_json(&t.verdict),
    }));

    json!({
        "name":           dev.name,
        "model":          dev.model,
        "serial":         dev.serial,
        "type":           dev.dev_type.label(),
        "capacity_bytes": dev.capacity_bytes,
        "tests":          tests,
        "attributes":     dev.attributes.evaluations.iter().map(evaluation_json).collect::<Vec<_>>(),
        "malformed":      dev.attributes.malformed.iter().map(|m| m.to_string()).collect::<Vec<_>>(),
        "benchmark":      benchmark,
        "thermal":        thermal,
        "recovery":       dev.recovery.as_ref().map(recovery_json),
        "verdict":        verdict_json(&dev.verdict()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::evaluator::{evaluate_all, RawAttribute};
    use crate::health::tracker::{OverrideMode, TestKind};

    fn failing_device() -> (Device, Config) {
        let cfg = Config::default();
        let table = cfg.threshold_table().unwrap();
        let mut dev = Device::new("sda", OverrideMode::Limited);
        dev.model = Some("WDC WD10EZEX".into());
        let attrs = vec![
            RawAttribute::new("199", "UDMA_CRC_Error_Count", "250"),
            RawAttribute::new("240", "Head_Flying_Hours", "12"),
            RawAttribute::new("9", "Power_On_Hours", "-4"),
        ];
        dev.apply_attributes(evaluate_all(attrs, "WDC WD10EZEX", &table)).unwrap();
        (dev, cfg)
    }

    #[test]
    fn text_report_lists_reasons_and_flags() {
        let (dev, cfg) = failing_device();
        let text = device_text(&dev, &cfg, false);
        assert!(text.contains("UDMA_CRC_Error_Count = 250 (≥ error threshold 100)"));
        assert!(text.contains("[unclassified]"));
        assert!(text.contains("malformed attribute 9"));
        assert!(text.contains("VERDICT  FAIL"));
    }

    #[test]
    fn override_is_shown_with_original_status() {
        let (mut dev, cfg) = failing_device();
        dev.tests.override_result(TestKind::DiskAttributes, "cable reseated").unwrap();
        let text = device_text(&dev, &cfg, false);
        assert!(text.contains("OVERRIDE (was ERROR: cable reseated)"), "{}", text);
        let v = device_json(&dev);
        assert_eq!(v["tests"][0]["status"], "OVERRIDE");
        assert_eq!(v["tests"][0]["override"]["original"], "ERROR");
        assert_eq!(v["verdict"]["severity"], "WARN");
    }

    #[test]
    fn json_has_explicit_fields() {
        let (dev, _) = failing_device();
        let v = device_json(&dev);
        assert_eq!(v["name"], "sda");
        assert_eq!(v["attributes"].as_array().unwrap().len(), 2);
        assert_eq!(v["attributes"][1]["unclassified"], true);
        assert_eq!(v["malformed"].as_array().unwrap().len(), 1);
        assert!(v["benchmark"].is_null());
    }
}
