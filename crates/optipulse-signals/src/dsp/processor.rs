//! Window statistics shared by the fusion and spectral stages.

use ndarray::Array1;
use std::f64::consts::PI;

/// Guard added to every divisor that can reach zero on flat input.
pub const EPSILON: f64 = 1e-6;

/// Digital Signal Processor
pub struct DspProcessor;

impl DspProcessor {
    /// Periodic Hann window, the form used for averaged periodograms.
    pub fn hann_window(size: usize) -> Array1<f64> {
        if size < 2 {
            return Array1::ones(size);
        }
        Array1::from_iter(
            (0..size).map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / size as f64).cos()),
        )
    }

    /// Arithmetic mean, `0.0` for an empty array.
    pub fn mean(arr: &Array1<f64>) -> f64 {
        arr.mean().unwrap_or(0.0)
    }

    /// Population standard deviation.
    pub fn std(arr: &Array1<f64>) -> f64 {
        let mean = Self::mean(arr);
        let variance = arr.mapv(|x| (x - mean).powi(2)).mean().unwrap_or(0.0);
        variance.sqrt()
    }

    /// Remove the least-squares line from the signal.
    ///
    /// Removes slow illumination drift before standardisation.
    pub fn detrend(signal: &Array1<f64>) -> Array1<f64> {
        let n = signal.len();
        if n < 2 {
            return Array1::zeros(n);
        }

        let t_mean = (n - 1) as f64 / 2.0;
        let x_mean = Self::mean(signal);

        let mut num = 0.0;
        let mut den = 0.0;
        for (i, &x) in signal.iter().enumerate() {
            let dt = i as f64 - t_mean;
            num += dt * (x - x_mean);
            den += dt * dt;
        }
        let slope = if den > 0.0 { num / den } else { 0.0 };
        let intercept = x_mean - slope * t_mean;

        Array1::from_iter(
            signal
                .iter()
                .enumerate()
                .map(|(i, &x)| x - (intercept + slope * i as f64)),
        )
    }

    /// Zero mean, unit variance. A zero-variance input maps to all zeros.
    pub fn standardize(arr: &Array1<f64>) -> Array1<f64> {
        let mean = Self::mean(arr);
        let std = Self::std(arr) + EPSILON;
        arr.mapv(|x| (x - mean) / std)
    }

    /// Median of a slice; even lengths average the two middle values.
    pub fn median(values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            Some(sorted[mid])
        }
    }
}
