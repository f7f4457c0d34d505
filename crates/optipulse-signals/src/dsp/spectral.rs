//! Spectral estimation for heart-rate extraction
//!
//! Welch's method: the filtered pulse signal is split into 50 %-overlapping
//! Hann-windowed segments (at most 256 samples), each segment's periodogram is
//! averaged into a one-sided power spectral density, and the strongest bin in
//! the physiological band is taken as the dominant pulse frequency.

use super::processor::DspProcessor;
use ndarray::Array1;
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Configuration for spectral estimation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpectralConfig {
    /// Longest Welch segment in samples
    pub max_segment_len: usize,
    /// Segment overlap (0.0-0.9)
    pub overlap_fraction: f64,
    /// Minimum candidate frequency (Hz)
    pub min_freq: f64,
    /// Maximum candidate frequency (Hz)
    pub max_freq: f64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            max_segment_len: 256,
            overlap_fraction: 0.5,
            min_freq: 0.7, // 42 BPM
            max_freq: 3.0, // 180 BPM
        }
    }
}

/// Spectral estimation failure. Callers turn this into a sentinel reading.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpectralError {
    #[error("signal too short for spectral estimation ({0} samples)")]
    TooShort(usize),

    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(f64),

    #[error("no frequency bins between {min_hz} and {max_hz} Hz")]
    EmptyBand { min_hz: f64, max_hz: f64 },

    #[error("power spectrum contains non-finite values")]
    NonFinite,
}

/// Dominant in-band component of a pulse signal.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralResult {
    /// Frequency of the strongest in-band bin (Hz)
    pub dominant_freq_hz: f64,
    /// PSD value at the dominant bin
    pub peak_power: f64,
    /// Sum of PSD values over the band
    pub total_band_power: f64,
    /// Full one-sided PSD
    pub psd: Vec<f64>,
    /// Frequency axis matching `psd` (Hz)
    pub freqs: Vec<f64>,
}

impl SpectralResult {
    /// Dominant frequency in beats per minute.
    pub fn bpm(&self) -> f64 {
        self.dominant_freq_hz * 60.0
    }
}

/// Welch PSD estimator with band-limited peak search.
///
/// Plans are cached per segment length; the window grows sample by sample
/// until it reaches the maximum segment length.
pub struct SpectralEstimator {
    config: SpectralConfig,
    sample_rate: f64,
    plans: HashMap<usize, Arc<dyn Fft<f64>>>,
}

impl SpectralEstimator {
    pub fn new(sample_rate: f64, config: SpectralConfig) -> Self {
        Self {
            config,
            sample_rate,
            plans: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SpectralConfig {
        &self.config
    }

    /// One-sided Welch PSD. Returns `(freqs, psd)`.
    pub fn welch(&mut self, signal: &Array1<f64>) -> Result<(Vec<f64>, Vec<f64>), SpectralError> {
        let fs = self.sample_rate;
        if !fs.is_finite() || fs <= 0.0 {
            return Err(SpectralError::InvalidSampleRate(fs));
        }

        let len = signal.len();
        let nperseg = len.min(self.config.max_segment_len.max(2));
        if nperseg < 2 {
            return Err(SpectralError::TooShort(len));
        }

        let overlap = (nperseg as f64 * self.config.overlap_fraction.clamp(0.0, 0.9)) as usize;
        let step = (nperseg - overlap).max(1);
        let num_segments = (len - nperseg) / step + 1;

        let window = DspProcessor::hann_window(nperseg);
        let window_power: f64 = window.iter().map(|w| w * w).sum();
        let fft = Arc::clone(
            self.plans
                .entry(nperseg)
                .or_insert_with(|| FftPlanner::new().plan_fft_forward(nperseg)),
        );

        let nfreq = nperseg / 2 + 1;
        let mut accum = vec![0.0f64; nfreq];
        let mut buffer = vec![Complex64::new(0.0, 0.0); nperseg];

        for seg in 0..num_segments {
            let segment = signal.slice(ndarray::s![seg * step..seg * step + nperseg]);
            let mean = segment.mean().unwrap_or(0.0);

            for ((slot, &x), &w) in buffer.iter_mut().zip(segment.iter()).zip(window.iter()) {
                *slot = Complex64::new((x - mean) * w, 0.0);
            }
            fft.process(&mut buffer);

            for (acc, c) in accum.iter_mut().zip(buffer.iter()) {
                *acc += c.norm_sqr();
            }
        }

        // Density scaling, averaged over segments, folded to one side
        let scale = 1.0 / (fs * window_power * num_segments as f64);
        let last_doubled = if nperseg % 2 == 0 { nfreq - 1 } else { nfreq };
        let psd: Vec<f64> = accum
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let one_sided = if i > 0 && i < last_doubled { 2.0 } else { 1.0 };
                p * scale * one_sided
            })
            .collect();

        if psd.iter().any(|p| !p.is_finite()) {
            return Err(SpectralError::NonFinite);
        }

        let freqs = (0..nfreq).map(|i| i as f64 * fs / nperseg as f64).collect();
        Ok((freqs, psd))
    }

    /// Estimate the dominant in-band frequency of `signal`.
    pub fn estimate(&mut self, signal: &Array1<f64>) -> Result<SpectralResult, SpectralError> {
        let (freqs, psd) = self.welch(signal)?;

        let mut peak: Option<(usize, f64)> = None;
        let mut total_band_power = 0.0;
        for (i, (&f, &p)) in freqs.iter().zip(psd.iter()).enumerate() {
            if f < self.config.min_freq || f > self.config.max_freq {
                continue;
            }
            total_band_power += p;
            match peak {
                Some((_, best)) if best >= p => {}
                _ => peak = Some((i, p)),
            }
        }

        let (peak_bin, peak_power) = peak.ok_or(SpectralError::EmptyBand {
            min_hz: self.config.min_freq,
            max_hz: self.config.max_freq,
        })?;

        Ok(SpectralResult {
            dominant_freq_hz: freqs[peak_bin],
            peak_power,
            total_band_power,
            psd,
            freqs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn tone(freq_hz: f64, fs: f64, n: usize) -> Array1<f64> {
        Array1::from_iter((0..n).map(|i| (2.0 * PI * freq_hz * i as f64 / fs).sin()))
    }

    #[test]
    fn test_bin_centred_tone() {
        let fs = 30.0;
        // Bin 10 of a 256-point segment
        let f = 10.0 * fs / 256.0;
        let mut estimator = SpectralEstimator::new(fs, SpectralConfig::default());

        let result = estimator.estimate(&tone(f, fs, 300)).unwrap();
        assert_relative_eq!(result.dominant_freq_hz, f, epsilon = 1e-9);
        assert_relative_eq!(result.bpm(), f * 60.0, epsilon = 1e-9);
        assert!(result.peak_power <= result.total_band_power);
        assert_eq!(result.psd.len(), 129);
        assert_eq!(result.freqs.len(), 129);
    }

    #[test]
    fn test_welch_parseval() {
        // Integrated density of a unit sine is ~0.5 (its variance)
        let fs = 30.0;
        let mut estimator = SpectralEstimator::new(fs, SpectralConfig::default());
        let (freqs, psd) = estimator.welch(&tone(10.0 * fs / 256.0, fs, 1024)).unwrap();
        let df = freqs[1] - freqs[0];
        let power: f64 = psd.iter().sum::<f64>() * df;
        assert_relative_eq!(power, 0.5, epsilon = 0.02);
    }

    #[test]
    fn test_short_segment_uses_whole_signal() {
        let fs = 30.0;
        let mut estimator = SpectralEstimator::new(fs, SpectralConfig::default());
        let (freqs, psd) = estimator.welch(&tone(1.0, fs, 60)).unwrap();
        assert_eq!(psd.len(), 31);
        assert_relative_eq!(freqs[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_band() {
        // 8 samples at 30 Hz: bins at 0 and 3.75 Hz, none inside 0.7-3.0
        let mut estimator = SpectralEstimator::new(30.0, SpectralConfig::default());
        let err = estimator.estimate(&tone(1.0, 30.0, 8)).unwrap_err();
        assert!(matches!(err, SpectralError::EmptyBand { .. }));
    }

    #[test]
    fn test_too_short_and_bad_rate() {
        let mut estimator = SpectralEstimator::new(30.0, SpectralConfig::default());
        assert_eq!(
            estimator.estimate(&Array1::from(vec![1.0])).unwrap_err(),
            SpectralError::TooShort(1)
        );

        let mut broken = SpectralEstimator::new(0.0, SpectralConfig::default());
        assert!(matches!(
            broken.estimate(&tone(1.0, 30.0, 64)).unwrap_err(),
            SpectralError::InvalidSampleRate(_)
        ));
    }

    #[test]
    fn test_non_finite_input() {
        let mut estimator = SpectralEstimator::new(30.0, SpectralConfig::default());
        let mut signal = tone(1.0, 30.0, 64);
        signal[10] = f64::NAN;
        assert_eq!(estimator.estimate(&signal).unwrap_err(), SpectralError::NonFinite);
    }

    #[test]
    fn test_zero_power_band() {
        let mut estimator = SpectralEstimator::new(30.0, SpectralConfig::default());
        let result = estimator.estimate(&Array1::zeros(120)).unwrap();
        assert_eq!(result.peak_power, 0.0);
        assert_eq!(result.total_band_power, 0.0);
        assert!(result.dominant_freq_hz >= 0.7);
    }
}
