use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

pub const THERMAL_ROOT: &str = "/sys/class/thermal";

/// Hottest zone under `root` right now, in °C. Zones report millidegrees.
pub fn read_max_temp(root: &Path) -> Option<f64> {
    let entries = fs::read_dir(root).ok()?;
    entries
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("thermal_zone"))
        .filter_map(|e| fs::read_to_string(e.path().join("temp")).ok())
        .filter_map(|s| s.trim().parse::<i64>().ok())
        .map(|milli| milli as f64 / 1000.0)
        .reduce(f64::max)
}

/// Poll `root` every `interval` for `duration`, keeping one peak reading
/// per poll. `stop` is checked between polls.
pub fn sample(root: &Path, duration: Duration, interval: Duration, stop: impl Fn() -> bool) -> Vec<f64> {
    let start = Instant::now();
    let mut out = Vec::new();
    loop {
        if let Some(t) = read_max_temp(root) {
            tracing::debug!(temp_c = t, "thermal sample");
            out.push(t);
        }
        if stop() || start.elapsed() + interval > duration {
            break;
        }
        thread::sleep(interval);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(root: &Path, name: &str, temp: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("temp"), temp).unwrap();
    }

    #[test]
    fn hottest_zone_wins() {
        let tmp = tempfile::tempdir().unwrap();
        zone(tmp.path(), "thermal_zone0", "45000\n");
        zone(tmp.path(), "thermal_zone1", "52500\n");
        zone(tmp.path(), "thermal_zone2", "garbage");
        zone(tmp.path(), "cooling_device0", "99000\n");
        assert_eq!(read_max_temp(tmp.path()), Some(52.5));
    }

    #[test]
    fn no_zones() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(read_max_temp(tmp.path()), None);
        assert_eq!(read_max_temp(&tmp.path().join("missing")), None);
    }

    #[test]
    fn sampling_stops_when_asked() {
        let tmp = tempfile::tempdir().unwrap();
        zone(tmp.path(), "thermal_zone0", "61000");
        let got = sample(tmp.path(), Duration::from_secs(60), Duration::from_millis(1), || true);
        assert_eq!(got, vec![61.0]);
        let got = sample(tmp.path(), Duration::from_millis(30), Duration::from_millis(5), || false);
        assert!(got.len() >= 2 && got.iter().all(|&t| t == 61.0));
    }
}
