//! Pipeline configuration
//!
//! Every heuristic constant of the pipeline lives here as a named field.
//! Configuration is layered: built-in defaults, then TOML files, then
//! `OPTIPULSE_*` environment variables.

use crate::calibration::CalibrationConfig;
use crate::dsp::{FilterConfig, QualityConfig, SmootherConfig, SpectralConfig};
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Environment variable error: {0}")]
    EnvVar(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PulseConfig {
    pub rppg: RppgConfig,
    pub filter: FilterConfig,
    pub spectral: SpectralConfig,
    pub quality: QualityConfig,
    pub smoother: SmootherConfig,
    pub session: SessionConfig,
    pub calibration: CalibrationConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RppgConfig {
    /// Frames per second of the incoming samples
    pub sample_rate: f64,
    /// Rolling window capacity (samples)
    pub buffer_capacity: usize,
    /// Most recent seconds fed to fusion and spectral analysis
    pub analysis_seconds: f64,
}

impl Default for RppgConfig {
    fn default() -> Self {
        Self {
            sample_rate: 30.0,
            buffer_capacity: 300,
            analysis_seconds: 10.0,
        }
    }
}

/// Periodic per-tick diagnostic line, emitted at `debug` level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    /// Emit on every n-th processed tick
    pub every_n_ticks: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            every_n_ticks: 30,
        }
    }
}

impl PulseConfig {
    /// Samples handed to fusion per tick.
    pub fn analysis_samples(&self) -> usize {
        (self.rppg.sample_rate * self.rppg.analysis_seconds).max(1.0) as usize
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PulseConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    /// Example: `OPTIPULSE_RPPG_SAMPLE_RATE=60`
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load with priority: environment, user file, default file, built-ins.
    /// Missing files are skipped.
    pub fn load_layered(
        default_path: Option<&Path>,
        user_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut config = PulseConfig::default();

        if let Some(path) = default_path {
            if path.exists() {
                config = Self::from_file(path)?;
            }
        }

        // Later files replace whole sections they mention; omitted keys
        // within a section take built-in defaults
        if let Some(path) = user_path {
            if path.exists() {
                config = Self::from_file(path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the process environment in
    /// production).
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let o = Overrides { lookup: &lookup };

        o.apply("OPTIPULSE_RPPG_SAMPLE_RATE", &mut self.rppg.sample_rate)?;
        o.apply("OPTIPULSE_RPPG_BUFFER_CAPACITY", &mut self.rppg.buffer_capacity)?;
        o.apply("OPTIPULSE_RPPG_ANALYSIS_SECONDS", &mut self.rppg.analysis_seconds)?;

        o.apply("OPTIPULSE_FILTER_ORDER", &mut self.filter.order)?;
        o.apply("OPTIPULSE_FILTER_LOW_HZ", &mut self.filter.low_hz)?;
        o.apply("OPTIPULSE_FILTER_HIGH_HZ", &mut self.filter.high_hz)?;

        o.apply("OPTIPULSE_QUALITY_LOW_SIGNAL_CONFIDENCE", &mut self.quality.low_signal_confidence)?;
        o.apply("OPTIPULSE_QUALITY_VALID_BPM_MIN", &mut self.quality.valid_bpm_min)?;
        o.apply("OPTIPULSE_QUALITY_VALID_BPM_MAX", &mut self.quality.valid_bpm_max)?;

        o.apply("OPTIPULSE_SMOOTHER_HISTORY_SIZE", &mut self.smoother.history_size)?;
        o.apply("OPTIPULSE_SMOOTHER_MAX_JUMP_BPM", &mut self.smoother.max_jump_bpm)?;

        o.apply("OPTIPULSE_SESSION_WARMUP_TICKS", &mut self.session.warmup_ticks)?;
        o.apply("OPTIPULSE_SESSION_MIN_CONFIDENCE", &mut self.session.min_confidence)?;

        o.apply("OPTIPULSE_CALIBRATION_SECONDS", &mut self.calibration.calibration_seconds)?;

        o.apply("OPTIPULSE_DIAGNOSTICS_ENABLED", &mut self.diagnostics.enabled)?;
        o.apply("OPTIPULSE_DIAGNOSTICS_EVERY_N_TICKS", &mut self.diagnostics.every_n_ticks)?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn fail(msg: &str) -> Result<(), ConfigError> {
            Err(ConfigError::Validation(msg.to_string()))
        }

        let rppg = &self.rppg;
        if !rppg.sample_rate.is_finite() || rppg.sample_rate <= 0.0 {
            return fail("rppg.sample_rate must be positive");
        }
        if rppg.buffer_capacity == 0 {
            return fail("rppg.buffer_capacity must be at least 1");
        }
        if rppg.analysis_seconds <= 0.0 {
            return fail("rppg.analysis_seconds must be positive");
        }

        // Band edges beyond Nyquist are not rejected here: the filter
        // reports itself degraded instead
        if !(1..=10).contains(&self.filter.order) {
            return fail("filter.order must be in 1..=10");
        }
        if self.filter.low_hz <= 0.0 || self.filter.low_hz >= self.filter.high_hz {
            return fail("filter band must satisfy 0 < low_hz < high_hz");
        }

        let spectral = &self.spectral;
        if spectral.max_segment_len < 2 {
            return fail("spectral.max_segment_len must be at least 2");
        }
        if !(0.0..=0.9).contains(&spectral.overlap_fraction) {
            return fail("spectral.overlap_fraction must be in [0, 0.9]");
        }
        if spectral.min_freq < 0.0 || spectral.min_freq >= spectral.max_freq {
            return fail("spectral band must satisfy 0 <= min_freq < max_freq");
        }

        let quality = &self.quality;
        if quality.min_window_seconds < 0.0 {
            return fail("quality.min_window_seconds must be non-negative");
        }
        if quality.valid_bpm_min >= quality.valid_bpm_max {
            return fail("quality.valid_bpm_min must be < valid_bpm_max");
        }
        if !(0.0..=100.0).contains(&quality.low_signal_confidence) {
            return fail("quality.low_signal_confidence must be in [0, 100]");
        }
        if !(0.0..=1.0).contains(&quality.blend_new_weight) {
            return fail("quality.blend_new_weight must be in [0, 1]");
        }
        if quality.max_snr_db <= 0.0 {
            return fail("quality.max_snr_db must be positive");
        }

        let smoother = &self.smoother;
        if smoother.history_size == 0 || smoother.trend_window == 0 {
            return fail("smoother.history_size and trend_window must be at least 1");
        }
        if smoother.max_jump_bpm <= 0.0 {
            return fail("smoother.max_jump_bpm must be positive");
        }
        if smoother.weight_oldest < 0.0 || smoother.weight_newest < 0.0 {
            return fail("smoother weights must be non-negative");
        }
        if smoother.valid_min_bpm >= smoother.valid_max_bpm {
            return fail("smoother.valid_min_bpm must be < valid_max_bpm");
        }

        if self.session.bradycardia_below > self.session.tachycardia_above {
            return fail("session.bradycardia_below must be <= tachycardia_above");
        }

        if self.calibration.calibration_seconds <= 0.0 || self.calibration.default_fps <= 0.0 {
            return fail("calibration.calibration_seconds and default_fps must be positive");
        }

        if self.diagnostics.every_n_ticks == 0 {
            return fail("diagnostics.every_n_ticks must be at least 1");
        }

        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}

struct Overrides<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Overrides<'_, F> {
    fn apply<T: FromStr>(&self, key: &str, slot: &mut T) -> Result<(), ConfigError> {
        if let Some(raw) = (self.lookup)(key) {
            *slot = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::EnvVar(format!("invalid {key}={raw}")))?;
            log::debug!("config override from {key}");
        }
        Ok(())
    }
}
