use std::time::Duration;

/// Format bytes/s into a human-readable string: "12.5 MB/s"
pub fn fmt_rate(bytes_per_sec: f64) -> String {
    fmt_bytes_f(bytes_per_sec) + "/s"
}

/// Format a raw byte count into a human-readable string: "12.5 MB"
pub fn fmt_bytes(bytes: u64) -> String {
    fmt_bytes_f(bytes as f64)
}

fn fmt_bytes_f(b: f64) -> String {
    const TB: f64 = 1_099_511_627_776.0;
    const GB: f64 = 1_073_741_824.0;
    const MB: f64 = 1_048_576.0;
    const KB: f64 = 1_024.0;
    if b >= TB      { format!("{:.1} TB", b / TB) }
    else if b >= GB { format!("{:.1} GB", b / GB) }
    else if b >= MB { format!("{:.1} MB", b / MB) }
    else if b >= KB { format!("{:.1} KB", b / KB) }
    else            { format!("{:.0} B",  b) }
}

/// Counters print without a fraction, gauges with up to two decimals: "12", "0.5"
pub fn fmt_num(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        let s = format!("{:.2}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Format a percentage with two decimals: "98.51%"
pub fn fmt_pct(pct: f64) -> String {
    format!("{:.2}%", pct)
}

/// Compact duration: "1d 2h 3m 4s", "45s"
pub fn fmt_duration(d: Duration) -> String {
    let mut secs = d.as_secs();
    let days  = secs / 86_400; secs %= 86_400;
    let hours = secs / 3_600;  secs %= 3_600;
    let mins  = secs / 60;     secs %= 60;
    let mut parts = Vec::new();
    if days  > 0 { parts.push(format!("{}d", days)); }
    if hours > 0 { parts.push(format!("{}h", hours)); }
    if mins  > 0 { parts.push(format!("{}m", mins)); }
    if secs  > 0 || parts.is_empty() { parts.push(format!("{}s", secs)); }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers() {
        assert_eq!(fmt_num(12.0), "12");
        assert_eq!(fmt_num(0.5), "0.5");
        assert_eq!(fmt_num(98.126), "98.13");
        assert_eq!(fmt_rate(1_048_576.0 * 150.0), "150.0 MB/s");
    }

    #[test]
    fn durations() {
        assert_eq!(fmt_duration(Duration::from_secs(0)), "0s");
        assert_eq!(fmt_duration(Duration::from_secs(93_784)), "1d 2h 3m 4s");
        assert_eq!(fmt_duration(Duration::from_secs(3_600)), "1h");
    }
}
