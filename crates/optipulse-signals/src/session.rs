//! Session history and the end-of-session summary.

use crate::dsp::DspProcessor;
use crate::engine::Reading;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Ready ticks ignored at the start of a session.
    pub warmup_ticks: usize,
    /// Readings at or below this confidence (%) are not recorded.
    pub min_confidence: f64,
    /// Last BPM must exceed this to be used when nothing was recorded.
    pub fallback_min_bpm: f64,
    /// Reported when a session produced no usable data at all.
    pub demo_bpm: u32,
    pub bradycardia_below: u32,
    pub tachycardia_above: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            warmup_ticks: 30,
            min_confidence: 10.0,
            fallback_min_bpm: 40.0,
            demo_bpm: 72,
            bradycardia_below: 60,
            tachycardia_above: 100,
        }
    }
}

/// Resting heart-rate class of a final BPM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeartRateClass {
    Bradycardia,
    Normal,
    Tachycardia,
}

impl HeartRateClass {
    pub fn remark(&self) -> &'static str {
        match self {
            HeartRateClass::Bradycardia => "Bradycardia (Slow)",
            HeartRateClass::Normal => "Normal Resting Heart Rate",
            HeartRateClass::Tachycardia => "Tachycardia (Fast)",
        }
    }
}

impl fmt::Display for HeartRateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HeartRateClass::Bradycardia => "BRADYCARDIA",
            HeartRateClass::Normal => "NORMAL",
            HeartRateClass::Tachycardia => "TACHYCARDIA",
        };
        f.write_str(s)
    }
}

/// Terminal result of a session. Computed once, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub final_bpm: u32,
    pub remark: String,
    /// Readings that went into the median (0 for fallback summaries).
    pub total_readings: usize,
    pub classification: HeartRateClass,
}

/// Collects validated readings over a session.
#[derive(Debug, Clone)]
pub struct SessionAggregator {
    config: SessionConfig,
    history: Vec<f64>,
    ready_ticks: usize,
    last_bpm: f64,
    summary: Option<Summary>,
}

impl SessionAggregator {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            history: Vec::new(),
            ready_ticks: 0,
            last_bpm: 0.0,
            summary: None,
        }
    }

    /// Consider one reading for the session history.
    ///
    /// Non-ready readings are ignored. Readings arriving after the summary
    /// was produced are dropped.
    pub fn record(&mut self, reading: &Reading) {
        if !reading.ready || self.summary.is_some() {
            return;
        }
        self.ready_ticks += 1;
        if reading.bpm.is_finite() && reading.bpm > 0.0 {
            self.last_bpm = reading.bpm;
        }

        if self.ready_ticks > self.config.warmup_ticks
            && reading.confidence > self.config.min_confidence
            && reading.bpm.is_finite()
        {
            self.history.push(reading.bpm);
        }
    }

    pub fn history(&self) -> &[f64] {
        &self.history
    }

    pub fn ready_ticks(&self) -> usize {
        self.ready_ticks
    }

    pub fn is_finalized(&self) -> bool {
        self.summary.is_some()
    }

    /// Compute the summary on first call; later calls return the same value.
    pub fn finalize(&mut self) -> Summary {
        if let Some(summary) = &self.summary {
            return summary.clone();
        }
        let summary = self.compute();
        log::info!(
            "session summary: {} BPM ({}) from {} readings",
            summary.final_bpm,
            summary.remark,
            summary.total_readings
        );
        self.summary = Some(summary.clone());
        summary
    }

    fn compute(&self) -> Summary {
        if let Some(median) = DspProcessor::median(&self.history) {
            let final_bpm = round_half_even(median).max(0.0) as u32;
            let classification = self.classify(final_bpm);
            return Summary {
                final_bpm,
                remark: classification.remark().to_string(),
                total_readings: self.history.len(),
                classification,
            };
        }

        if self.last_bpm > self.config.fallback_min_bpm {
            let final_bpm = round_half_even(self.last_bpm) as u32;
            let classification = self.classify(final_bpm);
            log::warn!("no validated readings, falling back to last BPM {final_bpm}");
            return Summary {
                final_bpm,
                remark: format!("{} - Low Confidence", classification.remark()),
                total_readings: 0,
                classification,
            };
        }

        log::warn!("no usable heart-rate data in session");
        let final_bpm = self.config.demo_bpm;
        Summary {
            final_bpm,
            remark: "Demo Value - Insufficient Data".to_string(),
            total_readings: 0,
            classification: self.classify(final_bpm),
        }
    }

    fn classify(&self, bpm: u32) -> HeartRateClass {
        if bpm < self.config.bradycardia_below {
            HeartRateClass::Bradycardia
        } else if bpm > self.config.tachycardia_above {
            HeartRateClass::Tachycardia
        } else {
            HeartRateClass::Normal
        }
    }
}

/// Round to nearest, ties to even.
fn round_half_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
        r - x.signum()
    } else {
        r
    }
}
