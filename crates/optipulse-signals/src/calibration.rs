//! Baseline colour calibration
//!
//! Averages the first few seconds of whole-frame colour to derive a baseline
//! red/green ratio and brightness, then places the risk thresholds used by
//! downstream classifiers as fixed fractions of that baseline. Bright or
//! strongly red footage is treated as a fingertip recording.

use crate::source::{FrameEvent, FrameSource, TraceSource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalibrationMode {
    Face,
    Finger,
}

impl fmt::Display for CalibrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationMode::Face => f.write_str("FACE"),
            CalibrationMode::Finger => f.write_str("FINGER"),
        }
    }
}

/// Calibrated thresholds, all in R/G ratio units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub mode: CalibrationMode,
    pub baseline_rg: f64,
    pub baseline_brightness: f64,
    pub optimal_min: f64,
    pub optimal_max: f64,
    pub low_threshold: f64,
    pub moderate_threshold: f64,
    pub high_threshold: f64,
    pub is_calibrated: bool,
}

/// Threshold fractions of the baseline ratio for one mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdFractions {
    pub optimal_min: f64,
    pub optimal_max: f64,
    pub low: f64,
    pub moderate: f64,
    pub high: f64,
    /// Absolute floor for the optimal band (face footage only).
    pub optimal_floor: Option<f64>,
    /// Absolute ceiling for the optimal band (face footage only).
    pub optimal_ceiling: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Seconds of footage averaged for the baseline.
    pub calibration_seconds: f64,
    /// Frame rate assumed when the source reports none.
    pub default_fps: f64,
    /// Brightness above which footage is a fingertip recording.
    pub finger_brightness: f64,
    /// R/G ratio above which footage is a fingertip recording.
    pub finger_rg_ratio: f64,
    /// Ratio used when the green mean is not positive.
    pub fallback_rg: f64,
    pub finger: ThresholdFractions,
    pub face: ThresholdFractions,
    /// Returned when calibration data is unavailable.
    pub default_calibration: Calibration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            calibration_seconds: 3.0,
            default_fps: 30.0,
            finger_brightness: 150.0,
            finger_rg_ratio: 1.8,
            fallback_rg: 2.5,
            finger: ThresholdFractions {
                optimal_min: 0.85,
                optimal_max: 1.15,
                low: 0.7,
                moderate: 1.2,
                high: 1.35,
                optimal_floor: None,
                optimal_ceiling: None,
            },
            face: ThresholdFractions {
                optimal_min: 0.9,
                optimal_max: 1.1,
                low: 0.75,
                moderate: 1.15,
                high: 1.3,
                optimal_floor: Some(0.8),
                optimal_ceiling: Some(1.5),
            },
            default_calibration: Calibration {
                mode: CalibrationMode::Finger,
                baseline_rg: 2.5,
                baseline_brightness: 100.0,
                optimal_min: 2.0,
                optimal_max: 3.0,
                low_threshold: 1.8,
                moderate_threshold: 3.0,
                high_threshold: 3.5,
                is_calibrated: false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Baseline {
    rg_ratio: f64,
    brightness: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Calibrator {
    config: CalibrationConfig,
    baseline: Option<Baseline>,
}

impl Calibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            baseline: None,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.baseline.is_some()
    }

    /// Calibrate from the first `calibration_seconds` of a source.
    ///
    /// `fps` overrides the source's own rate; non-positive rates fall back
    /// to `default_fps`. A source with no colour frames leaves the
    /// calibrator untouched and yields the default calibration.
    pub fn calibrate(&mut self, source: &mut dyn FrameSource, fps: Option<f64>) -> Calibration {
        let fps = fps
            .or_else(|| source.frame_rate())
            .filter(|f| f.is_finite() && *f > 0.0)
            .unwrap_or(self.config.default_fps);
        let frames_to_analyze = (fps * self.config.calibration_seconds).max(0.0) as usize;

        let (mut sum_r, mut sum_g, mut sum_b) = (0.0, 0.0, 0.0);
        let mut used = 0usize;
        for _ in 0..frames_to_analyze {
            match source.next_event() {
                FrameEvent::Sample(s) if s.is_finite() => {
                    sum_r += s.r;
                    sum_g += s.g;
                    sum_b += s.b;
                    used += 1;
                }
                FrameEvent::Sample(_) | FrameEvent::NoRegion => {}
                FrameEvent::EndOfStream => break,
            }
        }

        if used == 0 {
            log::warn!("no frames analyzed, using default calibration");
            return self.config.default_calibration.clone();
        }

        let n = used as f64;
        let (r, g, b) = (sum_r / n, sum_g / n, sum_b / n);
        let rg_ratio = if g > 0.0 { r / g } else { self.config.fallback_rg };
        let brightness = (r + g + b) / 3.0;
        self.baseline = Some(Baseline {
            rg_ratio,
            brightness,
        });

        let calibration = self.get_calibration();
        log::info!(
            "calibrated over {used} frames: R/G {:.3}, brightness {:.1}, mode {}",
            rg_ratio,
            brightness,
            calibration.mode
        );
        log::debug!(
            "thresholds: low {:.2} moderate {:.2} high {:.2}, optimal {:.2}-{:.2}",
            calibration.low_threshold,
            calibration.moderate_threshold,
            calibration.high_threshold,
            calibration.optimal_min,
            calibration.optimal_max
        );
        calibration
    }

    /// Calibrate from a trace file; an unreadable file yields the default.
    pub fn calibrate_path<P: AsRef<Path>>(&mut self, path: P, fps: Option<f64>) -> Calibration {
        match TraceSource::open(path.as_ref()) {
            Ok(mut source) => self.calibrate(&mut source, fps),
            Err(e) => {
                log::warn!("could not open source for calibration: {e}");
                self.config.default_calibration.clone()
            }
        }
    }

    /// Thresholds derived from the stored baseline, or the default.
    pub fn get_calibration(&self) -> Calibration {
        match self.baseline {
            Some(baseline) => self.thresholds(baseline),
            None => self.config.default_calibration.clone(),
        }
    }

    fn thresholds(&self, baseline: Baseline) -> Calibration {
        let rg = baseline.rg_ratio;
        let is_finger = baseline.brightness > self.config.finger_brightness
            || rg > self.config.finger_rg_ratio;
        let (mode, fractions) = if is_finger {
            (CalibrationMode::Finger, &self.config.finger)
        } else {
            (CalibrationMode::Face, &self.config.face)
        };

        let mut optimal_min = rg * fractions.optimal_min;
        let mut optimal_max = rg * fractions.optimal_max;
        if let Some(floor) = fractions.optimal_floor {
            optimal_min = optimal_min.max(floor);
        }
        if let Some(ceiling) = fractions.optimal_ceiling {
            optimal_max = optimal_max.min(ceiling);
        }

        Calibration {
            mode,
            baseline_rg: rg,
            baseline_brightness: baseline.brightness,
            optimal_min,
            optimal_max,
            low_threshold: rg * fractions.low,
            moderate_threshold: rg * fractions.moderate,
            high_threshold: rg * fractions.high,
            is_calibrated: true,
        }
    }
}
