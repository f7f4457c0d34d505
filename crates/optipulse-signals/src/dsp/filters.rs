//! Zero-phase Butterworth bandpass for rPPG signals
//!
//! Isolates the physiological band (0.7-3.0 Hz, 42-180 BPM). The filter is a
//! cascade of an order-N Butterworth low-pass at the upper edge and an order-N
//! high-pass at the lower edge, each realised as second-order sections via the
//! bilinear transform. Filtering runs forward then backward so peak timing is
//! preserved.
//!
//! If the design is impossible for the given sampling rate the filter drops
//! to an explicit pass-through mode that callers can observe.

use ndarray::Array1;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

const MAX_ORDER: usize = 10;

/// Bandpass configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    /// Butterworth order of each edge (4-5 is typical)
    pub order: usize,
    /// Lower band edge in Hz (0.7 Hz = 42 BPM)
    pub low_hz: f64,
    /// Upper band edge in Hz (3.0 Hz = 180 BPM)
    pub high_hz: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            order: 4,
            low_hz: 0.7,
            high_hz: 3.0,
        }
    }
}

/// Why a bandpass could not be designed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterDesignError {
    #[error("invalid sampling rate: {0} Hz")]
    InvalidSampleRate(f64),

    #[error("invalid filter order {0} (expected 1..=10)")]
    InvalidOrder(usize),

    #[error("band {low_hz}-{high_hz} Hz does not fit below Nyquist ({nyquist_hz} Hz)")]
    InvalidBand {
        low_hz: f64,
        high_hz: f64,
        nyquist_hz: f64,
    },

    #[error("designed filter is unstable")]
    Unstable,
}

/// A single second-order section.
///
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2),
/// run in Direct Form II Transposed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
}

impl Biquad {
    pub fn new(b: [f64; 3], a: [f64; 2]) -> Self {
        Self { b, a }
    }

    pub fn numerator(&self) -> &[f64; 3] {
        &self.b
    }

    pub fn denominator(&self) -> &[f64; 2] {
        &self.a
    }

    /// Poles strictly inside the unit circle.
    pub fn is_stable(&self) -> bool {
        self.a[1].abs() < 1.0 && self.a[0].abs() < 1.0 + self.a[1]
    }

    fn is_finite(&self) -> bool {
        self.b.iter().chain(self.a.iter()).all(|c| c.is_finite())
    }

    /// Gain at 0 Hz.
    pub fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1] + self.b[2]) / (1.0 + self.a[0] + self.a[1])
    }

    /// State that makes a constant input `x` produce a constant output.
    fn steady_state(&self, x: f64) -> [f64; 2] {
        let y = self.dc_gain() * x;
        let s1 = self.b[2] * x - self.a[1] * y;
        let s0 = s1 + self.b[1] * x - self.a[0] * y;
        [s0, s1]
    }

    fn run(&self, data: &mut [f64], mut state: [f64; 2]) {
        for v in data.iter_mut() {
            let x = *v;
            let y = self.b[0] * x + state[0];
            state[0] = self.b[1] * x - self.a[0] * y + state[1];
            state[1] = self.b[2] * x - self.a[1] * y;
            *v = y;
        }
    }
}

/// Designed coefficients, or the pass-through fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterState {
    Designed { sections: Vec<Biquad> },
    Degraded { reason: FilterDesignError },
}

/// Zero-phase Butterworth bandpass.
#[derive(Debug, Clone)]
pub struct BandpassFilter {
    state: FilterState,
    sample_rate: f64,
}

impl BandpassFilter {
    /// Design the filter, falling back to pass-through on failure.
    pub fn new(sample_rate: f64, config: &FilterConfig) -> Self {
        match Self::try_new(sample_rate, config) {
            Ok(filter) => filter,
            Err(reason) => {
                log::warn!(
                    "bandpass design failed ({}); filtering disabled, signal passes through",
                    reason
                );
                Self {
                    state: FilterState::Degraded { reason },
                    sample_rate,
                }
            }
        }
    }

    /// Design the filter, reporting failure instead of degrading.
    pub fn try_new(sample_rate: f64, config: &FilterConfig) -> Result<Self, FilterDesignError> {
        let sections = design_bandpass(sample_rate, config)?;
        log::debug!(
            "bandpass designed: order {} {}-{} Hz @ {} Hz ({} sections)",
            config.order,
            config.low_hz,
            config.high_hz,
            sample_rate,
            sections.len()
        );
        Ok(Self {
            state: FilterState::Designed { sections },
            sample_rate,
        })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.state, FilterState::Degraded { .. })
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Forward-backward filter the signal (pass-through when degraded).
    pub fn apply(&self, signal: &Array1<f64>) -> Array1<f64> {
        match &self.state {
            FilterState::Designed { sections } => {
                Array1::from(filtfilt(sections, &signal.to_vec()))
            }
            FilterState::Degraded { .. } => signal.clone(),
        }
    }
}

// ============================================================================
// Zero-phase filtering
// ============================================================================

/// Forward-backward filtering with odd-extension padding and steady-state
/// initial conditions, so edges start without a step transient.
fn filtfilt(sections: &[Biquad], x: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n < 2 || sections.is_empty() {
        return x.to_vec();
    }

    let padlen = (3 * (2 * sections.len() + 1)).min(n - 1);
    let first = x[0];
    let last = x[n - 1];

    let mut ext = Vec::with_capacity(n + 2 * padlen);
    for i in (1..=padlen).rev() {
        ext.push(2.0 * first - x[i]);
    }
    ext.extend_from_slice(x);
    for i in 1..=padlen {
        ext.push(2.0 * last - x[n - 1 - i]);
    }

    let x0 = ext[0];
    run_cascade(sections, &mut ext, x0);
    ext.reverse();
    let y0 = ext[0];
    run_cascade(sections, &mut ext, y0);
    ext.reverse();

    ext[padlen..padlen + n].to_vec()
}

fn run_cascade(sections: &[Biquad], data: &mut [f64], initial: f64) {
    let mut level = initial;
    for section in sections {
        section.run(data, section.steady_state(level));
        level *= section.dc_gain();
    }
}

// ============================================================================
// Design Functions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeKind {
    Lowpass,
    Highpass,
}

fn design_bandpass(sample_rate: f64, config: &FilterConfig) -> Result<Vec<Biquad>, FilterDesignError> {
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return Err(FilterDesignError::InvalidSampleRate(sample_rate));
    }
    if config.order == 0 || config.order > MAX_ORDER {
        return Err(FilterDesignError::InvalidOrder(config.order));
    }

    let nyquist_hz = sample_rate / 2.0;
    let band_ok = config.low_hz.is_finite()
        && config.high_hz.is_finite()
        && config.low_hz > 0.0
        && config.low_hz < config.high_hz
        && config.high_hz < nyquist_hz;
    if !band_ok {
        return Err(FilterDesignError::InvalidBand {
            low_hz: config.low_hz,
            high_hz: config.high_hz,
            nyquist_hz,
        });
    }

    let mut sections = butterworth_sections(config.order, config.high_hz, sample_rate, EdgeKind::Lowpass);
    sections.extend(butterworth_sections(
        config.order,
        config.low_hz,
        sample_rate,
        EdgeKind::Highpass,
    ));

    if sections.iter().any(|s| !s.is_finite() || !s.is_stable()) {
        return Err(FilterDesignError::Unstable);
    }
    Ok(sections)
}

/// Pre-warp frequency for bilinear transform.
fn prewarp(freq_hz: f64, sample_rate: f64) -> f64 {
    2.0 * sample_rate * (PI * freq_hz / sample_rate).tan()
}

/// Analog prototype poles: one per conjugate pair (upper half plane), plus
/// the real pole at -1 for odd orders.
fn butterworth_poles(order: usize) -> Vec<Complex64> {
    let mut poles = Vec::with_capacity(order / 2 + 1);
    for k in 0..order / 2 {
        let theta = PI * (2 * k + 1 + order) as f64 / (2 * order) as f64;
        poles.push(Complex64::new(theta.cos(), theta.sin()));
    }
    if order % 2 == 1 {
        poles.push(Complex64::new(-1.0, 0.0));
    }
    poles
}

fn butterworth_sections(order: usize, cutoff_hz: f64, sample_rate: f64, kind: EdgeKind) -> Vec<Biquad> {
    let wc = prewarp(cutoff_hz, sample_rate);
    let k = 2.0 * sample_rate;

    butterworth_poles(order)
        .into_iter()
        .map(|p| {
            let p = p * wc;
            let (b, a) = if p.im.abs() < 1e-12 {
                bilinear_1pole(p.re, k, kind)
            } else {
                bilinear_2pole(p, k, kind)
            };
            Biquad::new(b, a)
        })
        .collect()
}

/// Bilinear transform for a single real pole.
fn bilinear_1pole(p: f64, k: f64, kind: EdgeKind) -> ([f64; 3], [f64; 2]) {
    let alpha = k - p;
    let a1 = -(k + p) / alpha;
    match kind {
        EdgeKind::Lowpass => ([-p / alpha, -p / alpha, 0.0], [a1, 0.0]),
        EdgeKind::Highpass => ([k / alpha, -k / alpha, 0.0], [a1, 0.0]),
    }
}

/// Bilinear transform for a complex conjugate pole pair.
fn bilinear_2pole(p: Complex64, k: f64, kind: EdgeKind) -> ([f64; 3], [f64; 2]) {
    let mag_sq = p.norm_sqr();
    let k2 = k * k;
    let d = k2 - 2.0 * k * p.re + mag_sq;

    let a1 = 2.0 * (mag_sq - k2) / d;
    let a2 = (k2 + 2.0 * k * p.re + mag_sq) / d;

    let b = match kind {
        EdgeKind::Lowpass => [mag_sq / d, 2.0 * mag_sq / d, mag_sq / d],
        EdgeKind::Highpass => [k2 / d, -2.0 * k2 / d, k2 / d],
    };
    (b, [a1, a2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tone(freq_hz: f64, fs: f64, n: usize) -> Array1<f64> {
        Array1::from_iter((0..n).map(|i| (2.0 * PI * freq_hz * i as f64 / fs).sin()))
    }

    fn rms(values: &[f64]) -> f64 {
        (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
    }

    #[test]
    fn test_design_section_count() {
        let filter = BandpassFilter::try_new(30.0, &FilterConfig::default()).unwrap();
        match filter.state() {
            FilterState::Designed { sections } => assert_eq!(sections.len(), 4),
            other => panic!("expected designed filter, got {:?}", other),
        }

        let odd = FilterConfig {
            order: 5,
            ..FilterConfig::default()
        };
        let filter = BandpassFilter::try_new(30.0, &odd).unwrap();
        match filter.state() {
            FilterState::Designed { sections } => {
                assert_eq!(sections.len(), 6);
                assert!(sections.iter().all(|s| s.is_stable()));
            }
            other => panic!("expected designed filter, got {:?}", other),
        }
    }

    #[test]
    fn test_edge_gains() {
        let lp = butterworth_sections(4, 3.0, 30.0, EdgeKind::Lowpass);
        let hp = butterworth_sections(4, 0.7, 30.0, EdgeKind::Highpass);
        let lp_dc: f64 = lp.iter().map(|s| s.dc_gain()).product();
        let hp_dc: f64 = hp.iter().map(|s| s.dc_gain()).product();
        assert_relative_eq!(lp_dc, 1.0, epsilon = 1e-9);
        assert_relative_eq!(hp_dc, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_stopband_attenuation() {
        let filter = BandpassFilter::new(30.0, &FilterConfig::default());
        let input = tone(10.0, 30.0, 300);
        let output = filter.apply(&input);

        let ratio = rms(&output.to_vec()[50..250]) / rms(&input.to_vec()[50..250]);
        assert!(ratio < 0.1, "10 Hz tone should be attenuated >= 20 dB, ratio {}", ratio);
    }

    #[test]
    fn test_passband_zero_phase() {
        let filter = BandpassFilter::new(30.0, &FilterConfig::default());
        let input = tone(1.5, 30.0, 300);
        let output = filter.apply(&input);

        assert_eq!(output.len(), input.len());
        for i in 100..200 {
            assert!(
                (output[i] - input[i]).abs() < 0.15,
                "sample {} drifted: in {} out {}",
                i,
                input[i],
                output[i]
            );
        }
    }

    #[test]
    fn test_degraded_passthrough() {
        // Nyquist (2 Hz) sits below the upper band edge
        let filter = BandpassFilter::new(4.0, &FilterConfig::default());
        assert!(filter.is_degraded());
        assert!(matches!(
            filter.state(),
            FilterState::Degraded {
                reason: FilterDesignError::InvalidBand { .. }
            }
        ));

        let input = tone(1.0, 4.0, 40);
        assert_eq!(filter.apply(&input), input);
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(
            BandpassFilter::try_new(0.0, &FilterConfig::default()).unwrap_err(),
            FilterDesignError::InvalidSampleRate(0.0)
        );
        let zero_order = FilterConfig {
            order: 0,
            ..FilterConfig::default()
        };
        assert_eq!(
            BandpassFilter::try_new(30.0, &zero_order).unwrap_err(),
            FilterDesignError::InvalidOrder(0)
        );
        let inverted = FilterConfig {
            low_hz: 3.0,
            high_hz: 0.7,
            ..FilterConfig::default()
        };
        assert!(BandpassFilter::try_new(30.0, &inverted).is_err());
    }

    #[test]
    fn test_short_and_flat_signals() {
        let filter = BandpassFilter::new(30.0, &FilterConfig::default());
        let single = Array1::from(vec![5.0]);
        assert_eq!(filter.apply(&single), single);

        let flat = Array1::from_elem(60, 0.0);
        assert!(filter.apply(&flat).iter().all(|v| *v == 0.0));
    }
}
