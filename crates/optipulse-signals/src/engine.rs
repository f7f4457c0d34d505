//! Per-session heart-rate engine
//!
//! One [`Engine`] owns every piece of mutable session state: the sample
//! window, the designed filter, the blend and smoother history and the
//! session aggregator. Starting a new session means building a new engine;
//! nothing is carried over.
//!
//! Per tick the pipeline runs
//! `SampleBuffer -> PosFusion -> BandpassFilter -> SpectralEstimator ->
//! QualityScorer -> BpmSmoother` and returns one [`Reading`]. Failures inside
//! a tick come back as sentinel readings, never as errors.

use crate::config::{DiagnosticsConfig, PulseConfig};
use crate::dsp::{
    BandpassFilter, BpmSmoother, DspProcessor, QualityScorer, ReadingStatus, Sample,
    SampleBuffer, SpectralEstimator,
};
use crate::rppg::PosFusion;
use crate::session::{SessionAggregator, Summary};
use crate::source::FrameEvent;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Stable values kept for the stability score.
const STABILITY_WINDOW: usize = 10;

/// Result of one tick. Fields are always present; sentinel readings carry
/// zeros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Blended per-tick estimate
    pub bpm: f64,
    /// Peak share of band power (0-100)
    pub confidence: f64,
    pub status: ReadingStatus,
    /// 0-30 dB
    pub snr_db: f64,
    /// Signal quality index, currently equal to confidence
    pub sqi: f64,
    /// Whether the pipeline produced an estimate this tick
    pub ready: bool,
    /// Outlier-rejected session-level BPM
    pub stable_bpm: f64,
    /// Timestamp of the newest buffered sample (s)
    pub timestamp: f64,
}

impl Reading {
    fn sentinel(status: ReadingStatus, stable_bpm: f64, timestamp: f64) -> Self {
        Self {
            bpm: 0.0,
            confidence: 0.0,
            status,
            snr_db: 0.0,
            sqi: 0.0,
            ready: false,
            stable_bpm,
            timestamp,
        }
    }

    /// Not enough samples buffered yet.
    pub fn calibrating(timestamp: f64) -> Self {
        Self::sentinel(ReadingStatus::Calibrating, 0.0, timestamp)
    }

    /// No region this tick, or the spectral step failed. The stable BPM is
    /// carried through unchanged.
    pub fn no_face(stable_bpm: f64, timestamp: f64) -> Self {
        Self::sentinel(ReadingStatus::NoFace, stable_bpm, timestamp)
    }

    pub fn is_ok(&self) -> bool {
        self.ready && self.status == ReadingStatus::Ok
    }
}

/// What a source event turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Reading(Reading),
    /// The source is exhausted and the session summary is final.
    Finished(Summary),
}

pub struct Engine {
    buffer: SampleBuffer,
    filter: BandpassFilter,
    estimator: SpectralEstimator,
    scorer: QualityScorer,
    smoother: BpmSmoother,
    session: SessionAggregator,
    diagnostics: DiagnosticsConfig,
    analysis_samples: usize,
    stable_history: VecDeque<f64>,
    waveform: Vec<f64>,
    last_reading: Option<Reading>,
    ticks: u64,
    processed: u64,
}

impl Engine {
    pub fn new(config: &PulseConfig) -> Self {
        let fs = config.rppg.sample_rate;
        let filter = BandpassFilter::new(fs, &config.filter);
        if !filter.is_degraded() {
            log::debug!(
                "engine: {} Hz, {}-{} Hz bandpass (order {}), window {} samples",
                fs,
                config.filter.low_hz,
                config.filter.high_hz,
                config.filter.order,
                config.rppg.buffer_capacity
            );
        }

        Self {
            buffer: SampleBuffer::new(config.rppg.buffer_capacity),
            filter,
            estimator: SpectralEstimator::new(fs, config.spectral.clone()),
            scorer: QualityScorer::new(fs, config.quality.clone()),
            smoother: BpmSmoother::with_config(config.smoother.clone()),
            session: SessionAggregator::new(config.session.clone()),
            diagnostics: config.diagnostics.clone(),
            analysis_samples: config.analysis_samples(),
            stable_history: VecDeque::with_capacity(STABILITY_WINDOW),
            waveform: Vec::new(),
            last_reading: None,
            ticks: 0,
            processed: 0,
        }
    }

    /// Buffer a sample without processing. `None` is a no-op.
    pub fn add_sample(&mut self, sample: Option<Sample>) {
        self.buffer.add(sample);
    }

    /// Run the pipeline over the current window.
    pub fn process(&mut self) -> Reading {
        let timestamp = self.buffer.latest().map_or(0.0, |s| s.timestamp);
        let buffered = self.buffer.len();
        if buffered < self.scorer.min_samples() || buffered == 0 {
            return Reading::calibrating(timestamp);
        }

        let window = self.buffer.latest_channels(self.analysis_samples);
        let pulse = PosFusion::fuse(&window);
        let filtered = self.filter.apply(&pulse);

        let spectrum = match self.estimator.estimate(&filtered) {
            Ok(spectrum) => spectrum,
            Err(e) => {
                log::debug!("spectral estimate failed: {e}");
                return Reading::no_face(self.smoother.current(), timestamp);
            }
        };

        let bpm = self.scorer.blend(spectrum.bpm());
        let quality = self.scorer.score(&spectrum);
        let status = self.scorer.status(buffered, bpm, quality.confidence);
        let stable_bpm = self.smoother.update(Some(bpm), Some(quality.snr_db));

        if stable_bpm > 0.0 {
            if self.stable_history.len() == STABILITY_WINDOW {
                self.stable_history.pop_front();
            }
            self.stable_history.push_back(stable_bpm);
        }
        self.waveform = filtered.to_vec();
        self.processed += 1;

        let reading = Reading {
            bpm,
            confidence: quality.confidence,
            status,
            snr_db: quality.snr_db,
            sqi: quality.confidence,
            ready: true,
            stable_bpm,
            timestamp,
        };
        self.emit_diagnostics(&reading);
        reading
    }

    /// One full tick: buffer, process and record into the session.
    ///
    /// An absent sample yields `NO_FACE` without touching the window.
    pub fn tick(&mut self, sample: Option<Sample>) -> Reading {
        self.ticks += 1;
        let reading = match sample {
            Some(sample) => {
                self.buffer.add(Some(sample));
                self.process()
            }
            None => {
                let timestamp = self.buffer.latest().map_or(0.0, |s| s.timestamp);
                Reading::no_face(self.smoother.current(), timestamp)
            }
        };
        self.session.record(&reading);
        self.last_reading = Some(reading.clone());
        reading
    }

    pub fn handle(&mut self, event: FrameEvent) -> TickOutcome {
        match event {
            FrameEvent::Sample(sample) => TickOutcome::Reading(self.tick(Some(sample))),
            FrameEvent::NoRegion => TickOutcome::Reading(self.tick(None)),
            FrameEvent::EndOfStream => TickOutcome::Finished(self.finalize()),
        }
    }

    /// The session summary. Computed once; later calls return the same one.
    pub fn finalize(&mut self) -> Summary {
        self.session.finalize()
    }

    pub fn filter_degraded(&self) -> bool {
        self.filter.is_degraded()
    }

    /// 0-100 score from the spread of the last ten stable values; 50 until
    /// ten are available.
    pub fn stability(&self) -> f64 {
        if self.stable_history.len() < STABILITY_WINDOW {
            return 50.0;
        }
        let recent = Array1::from_iter(self.stable_history.iter().copied());
        (100.0 - DspProcessor::std(&recent) * 10.0).clamp(0.0, 100.0)
    }

    /// Filtered pulse signal of the last processed tick.
    pub fn pulse_waveform(&self) -> &[f64] {
        &self.waveform
    }

    pub fn last_reading(&self) -> Option<&Reading> {
        self.last_reading.as_ref()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn session(&self) -> &SessionAggregator {
        &self.session
    }

    fn emit_diagnostics(&self, reading: &Reading) {
        if !self.diagnostics.enabled || self.processed % self.diagnostics.every_n_ticks.max(1) != 0 {
            return;
        }
        log::debug!(
            "[tick {}] {:.1} BPM (stable {:.1}) | confidence {:.1}% | SNR {:.1} dB | {} | buffer {}/{}",
            self.processed,
            reading.bpm,
            reading.stable_bpm,
            reading.confidence,
            reading.snr_db,
            reading.status,
            self.buffer.len(),
            self.buffer.capacity()
        );
    }
}
