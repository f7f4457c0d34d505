//! POS chrominance fusion
//!
//! Each channel is detrended and standardised, then projected onto the plane
//! orthogonal to the skin tone:
//!
//! ```text
//! X = Rn - Gn
//! Y = Rn + Gn - 2 Bn
//! S = X - alpha * Y,   alpha = std(X) / (std(Y) + eps)
//! ```

use crate::dsp::{ChannelWindow, DspProcessor, EPSILON};
use ndarray::Array1;

/// Stateless POS fusion over a channel window.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosFusion;

impl PosFusion {
    /// Fuse the window into a pulse signal of the same length.
    ///
    /// A flat channel standardises to zeros and never faults.
    pub fn fuse(window: &ChannelWindow) -> Array1<f64> {
        if window.is_empty() {
            return Array1::zeros(0);
        }

        let rn = Self::normalize(&window.r);
        let gn = Self::normalize(&window.g);
        let bn = Self::normalize(&window.b);

        let x = &rn - &gn;
        let y = &rn + &gn - &(&bn * 2.0);

        let alpha = DspProcessor::std(&x) / (DspProcessor::std(&y) + EPSILON);
        &x - &(&y * alpha)
    }

    fn normalize(channel: &Array1<f64>) -> Array1<f64> {
        DspProcessor::standardize(&DspProcessor::detrend(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn window(n: usize, f: impl Fn(usize) -> (f64, f64, f64)) -> ChannelWindow {
        let (mut r, mut g, mut b) = (Vec::new(), Vec::new(), Vec::new());
        for i in 0..n {
            let (ri, gi, bi) = f(i);
            r.push(ri);
            g.push(gi);
            b.push(bi);
        }
        ChannelWindow {
            r: Array1::from(r),
            g: Array1::from(g),
            b: Array1::from(b),
        }
    }

    #[test]
    fn test_flat_channels_do_not_fault() {
        let flat = window(90, |_| (120.0, 100.0, 80.0));
        let s = PosFusion::fuse(&flat);
        assert_eq!(s.len(), 90);
        assert!(s.iter().all(|v| v.is_finite() && *v == 0.0));

        // One flat channel among live ones
        let partial = window(90, |i| {
            let p = (2.0 * PI * i as f64 / 30.0).sin();
            (120.0 + p, 100.0, 80.0 - p)
        });
        assert!(PosFusion::fuse(&partial).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_pulse_survives_fusion() {
        let fs = 30.0;
        let f = 1.2;
        let w = window(300, |i| {
            let t = 2.0 * PI * f * i as f64 / fs;
            (
                140.0 + 2.0 * t.sin(),
                110.0 + 2.0 * (t + 2.0 * PI / 3.0).sin(),
                90.0 + 2.0 * (t + 4.0 * PI / 3.0).sin(),
            )
        });
        let s = PosFusion::fuse(&w);
        assert_eq!(s.len(), 300);
        assert!(DspProcessor::std(&s) > 0.5);
        assert_relative_eq!(DspProcessor::mean(&s), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_linear_drift_removed() {
        // Pure illumination ramp carries no pulse
        let w = window(120, |i| {
            let d = i as f64 * 0.1;
            (100.0 + d, 90.0 + 2.0 * d, 80.0 + 0.5 * d)
        });
        let s = PosFusion::fuse(&w);
        assert!(s.iter().all(|v| v.abs() < 1e-3));
    }

    #[test]
    fn test_empty_window() {
        let w = window(0, |_| (0.0, 0.0, 0.0));
        assert_eq!(PosFusion::fuse(&w).len(), 0);
    }
}
