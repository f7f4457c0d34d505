//! Reading quality: confidence, SNR and status
//!
//! Confidence is the share of in-band power held by the dominant bin; SNR
//! compares that bin against the rest of the band. Status is derived from
//! buffer fill, the reported BPM and confidence. The scorer also owns the
//! light in-pipeline blend that steadies consecutive per-tick estimates.

use super::processor::EPSILON;
use super::spectral::SpectralResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-tick reading status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadingStatus {
    /// Valid reading
    Ok,
    /// Dominant peak holds too little of the band power
    LowSignal,
    /// BPM outside the plausible resting range
    OutOfRange,
    /// Not enough samples buffered yet
    Calibrating,
    /// No region located this tick, or the estimate failed
    NoFace,
}

impl ReadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::Ok => "OK",
            ReadingStatus::LowSignal => "LOW_SIGNAL",
            ReadingStatus::OutOfRange => "OUT_OF_RANGE",
            ReadingStatus::Calibrating => "CALIBRATING",
            ReadingStatus::NoFace => "NO_FACE",
        }
    }
}

impl fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityConfig {
    /// Seconds of samples required before a reading is attempted
    pub min_window_seconds: f64,
    /// Lowest BPM reported as in range
    pub valid_bpm_min: f64,
    /// Highest BPM reported as in range
    pub valid_bpm_max: f64,
    /// Confidence (%) below which a reading is LOW_SIGNAL
    pub low_signal_confidence: f64,
    /// Consecutive estimates closer than this (BPM) are blended
    pub blend_max_delta: f64,
    /// Weight of the new estimate in a blend (0-1)
    pub blend_new_weight: f64,
    /// Upper clip for reported SNR (dB)
    pub max_snr_db: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_window_seconds: 1.0,
            valid_bpm_min: 48.0,
            valid_bpm_max: 120.0,
            low_signal_confidence: 25.0,
            blend_max_delta: 20.0,
            blend_new_weight: 0.8,
            max_snr_db: 30.0,
        }
    }
}

/// Confidence and SNR of one spectrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityScore {
    /// Peak share of band power (0-100)
    pub confidence: f64,
    /// Peak against remaining band power (0-30 dB)
    pub snr_db: f64,
}

/// Quality scorer with in-pipeline blending state.
#[derive(Debug, Clone)]
pub struct QualityScorer {
    config: QualityConfig,
    sample_rate: f64,
    previous_bpm: Option<f64>,
}

impl QualityScorer {
    pub fn new(sample_rate: f64, config: QualityConfig) -> Self {
        Self {
            config,
            sample_rate,
            previous_bpm: None,
        }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Samples required before the pipeline runs (`fps × min_window_seconds`).
    pub fn min_samples(&self) -> usize {
        (self.sample_rate * self.config.min_window_seconds).max(0.0) as usize
    }

    /// Last blended BPM, if any tick produced one.
    pub fn previous_bpm(&self) -> Option<f64> {
        self.previous_bpm
    }

    pub fn score(&self, spectrum: &SpectralResult) -> QualityScore {
        let peak = spectrum.peak_power.max(0.0);
        let total = spectrum.total_band_power.max(0.0);

        let confidence = sanitize(100.0 * peak / (total + EPSILON)).clamp(0.0, 100.0);

        let ratio = peak / ((total - peak).max(0.0) + EPSILON);
        let snr_db = if ratio > 0.0 {
            sanitize(10.0 * ratio.log10()).clamp(0.0, self.config.max_snr_db)
        } else {
            0.0
        };

        QualityScore { confidence, snr_db }
    }

    /// Blend a raw estimate with the previous one when they are close.
    ///
    /// The returned value becomes the new previous estimate.
    pub fn blend(&mut self, bpm_raw: f64) -> f64 {
        let bpm = match self.previous_bpm {
            Some(prev) if prev > 0.0 && (bpm_raw - prev).abs() < self.config.blend_max_delta => {
                let w = self.config.blend_new_weight.clamp(0.0, 1.0);
                w * bpm_raw + (1.0 - w) * prev
            }
            _ => bpm_raw,
        };
        self.previous_bpm = Some(bpm);
        bpm
    }

    /// Status precedence: calibrating, out of range, low signal, ok.
    pub fn status(&self, buffered: usize, bpm: f64, confidence: f64) -> ReadingStatus {
        if buffered < self.min_samples() {
            ReadingStatus::Calibrating
        } else if !(self.config.valid_bpm_min..=self.config.valid_bpm_max).contains(&bpm) {
            ReadingStatus::OutOfRange
        } else if confidence < self.config.low_signal_confidence {
            ReadingStatus::LowSignal
        } else {
            ReadingStatus::Ok
        }
    }
}

fn sanitize(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v
    }
}
