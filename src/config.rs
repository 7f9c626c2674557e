use crate::error::ConfigError;
use crate::health::evaluator::{default_overlays, default_thresholds, AttributeThreshold, ModelOverlay, ThresholdTable};
use crate::health::thermal::ThermalConfig;
use crate::health::throughput::ThroughputConfig;
use crate::health::tracker::OverrideConfig;
use crate::recovery::controller::RecoveryConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    /// Generic attribute table. Replaces the built-in table when present.
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<AttributeThreshold>,

    /// Model-specific tables, consulted in order before the generic one.
    #[serde(default = "default_overlays")]
    pub overlays: Vec<ModelOverlay>,

    #[serde(default)]
    pub throughput: ThroughputConfig,

    #[serde(default)]
    pub thermal: ThermalConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub overrides: OverrideConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// smartctl binary (name on PATH or absolute path)
    pub smartctl:        String,
    /// Reads per benchmark run
    pub bench_samples:   usize,
    /// Size of each benchmark read in KiB
    pub bench_block_kib: usize,
    /// Bypass the page cache while benchmarking
    pub bench_direct:    bool,
    /// Columns in the throughput graph
    pub graph_width:     usize,
    /// Graph resolution: 8, 16 or 32 steps
    pub graph_steps:     u8,
    /// "default", "dracula", "gruvbox", "nord" or "mono"
    pub theme:           String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            smartctl:        "smartctl".into(),
            bench_samples:   100,
            bench_block_kib: 1024,
            bench_direct:    true,
            graph_width:     50,
            graph_steps:     8,
            theme:           "default".into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general:    GeneralConfig::default(),
            thresholds: default_thresholds(),
            overlays:   default_overlays(),
            throughput: ThroughputConfig::default(),
            thermal:    ThermalConfig::default(),
            recovery:   RecoveryConfig::default(),
            overrides:  OverrideConfig::default(),
        }
    }
}

impl Config {
    /// Load from `explicit` if given, otherwise from the per-user config
    /// file, writing the defaults there on first run.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match Config::config_path() {
                Some(p) if p.exists() => p,
                _ => {
                    // best-effort; a read-only home is fine
                    if let Err(e) = try_write_defaults() {
                        tracing::debug!("could not write default config: {}", e);
                    }
                    return Ok(Config::default());
                }
            },
        };
        let cfg = Self::from_file(&path)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let cfg: Config = toml::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("diskrx").join("diskrx.toml"))
    }

    /// Reject anything the evaluator or controller could not honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.threshold_table()?;
        self.throughput.validate()?;
        if self.throughput.scale(self.general.graph_steps).is_none() {
            return Err(ConfigError::InvalidScale(format!(
                "general.graph_steps = {} has no matching [[throughput.scales]] entry",
                self.general.graph_steps)));
        }
        if self.general.graph_width == 0 || self.general.bench_samples == 0 || self.general.bench_block_kib == 0 {
            return Err(ConfigError::InvalidScale(
                "graph_width, bench_samples and bench_block_kib must be > 0".into()));
        }
        self.thermal.validate()?;
        self.recovery.validate()
    }

    pub fn threshold_table(&self) -> Result<ThresholdTable, ConfigError> {
        ThresholdTable::new(&self.thresholds, &self.overlays)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn try_write_defaults() -> Result<()> {
    let path = Config::config_path().ok_or_else(|| anyhow::anyhow!("no config dir"))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = Config::default().to_toml()?;
    fs::write(&path, format!("# diskrx configuration\n# Generated on first run, edit freely\n\n{}", text))?;
    tracing::info!(path = %path.display(), "wrote default configuration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::tracker::OverrideMode;
    use std::io::Write;

    fn write(text: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(text.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults_validate_and_round_trip() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        let text = cfg.to_toml().unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let f = write(r#"
            [overrides]
            mode = "forced"

            [recovery]
            max_retries = 5

            [recovery.stages.scrape]
            timeout_secs = 3600
        "#);
        let cfg = Config::load(Some(f.path())).unwrap();
        assert_eq!(cfg.overrides.resolve(), OverrideMode::Forced);
        assert_eq!(cfg.recovery.max_retries, 5);
        assert_eq!(cfg.recovery.tool, "ddrescue");
        assert_eq!(cfg.recovery.stages.scrape.timeout_secs, Some(3600));
        assert_eq!(cfg.recovery.stages.trim.min_attempts, 2);
        assert_eq!(cfg.thresholds, default_thresholds());
        assert_eq!(cfg.general.graph_steps, 8);
    }

    #[test]
    fn stage_timeout_alone_loads() {
        let f = write("[recovery.stages.read]\ntimeout_secs = 600\n");
        let cfg = Config::load(Some(f.path())).unwrap();
        assert_eq!(cfg.recovery.stages.read.timeout_secs, Some(600));
        assert_eq!(cfg.recovery.stages.read.threshold_pct, Some(95.0));
        assert_eq!(cfg.recovery.stages.read.params.min_read_rate.as_deref(), Some("64KiB"));
    }

    #[test]
    fn misordered_threshold_is_rejected() {
        let f = write(r#"
            [[thresholds]]
            id = "5"
            warning = 10
            error = 5
        "#);
        assert!(matches!(Config::load(Some(f.path())), Err(ConfigError::InvalidThreshold { .. })));
    }

    #[test]
    fn bad_overlay_regex_is_rejected() {
        let f = write(r#"
            [[overlays]]
            pattern = "(unclosed"
        "#);
        assert!(matches!(Config::load(Some(f.path())), Err(ConfigError::BadOverlayPattern { .. })));
    }

    #[test]
    fn scrape_threshold_is_rejected() {
        let f = write(r#"
            [recovery.stages.scrape]
            threshold_pct = 99.0
        "#);
        assert!(matches!(Config::load(Some(f.path())), Err(ConfigError::InvalidRecovery(_))));
    }

    #[test]
    fn io_and_parse_errors() {
        let missing = Path::new("/nonexistent/diskrx-test.toml");
        assert!(matches!(Config::load(Some(missing)), Err(ConfigError::Io { .. })));
        let f = write("[general\nbroken");
        assert!(matches!(Config::load(Some(f.path())), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn graph_steps_need_a_scale() {
        let f = write("[general]\ngraph_steps = 12\n");
        assert!(matches!(Config::load(Some(f.path())), Err(ConfigError::InvalidScale(_))));
    }
}
