//! Outlier-rejecting weighted BPM smoother.
//!
//! Keeps a short history of accepted estimates and reports a weighted mean
//! that favours recent values. Candidates that jump too far from the history
//! are parked in a small pending queue; once enough of them agree on a new
//! level the whole run is committed, so genuine heart-rate changes get through
//! while single spikes do not.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SmootherConfig {
    /// Accepted estimates kept for the weighted mean.
    pub history_size: usize,
    /// Largest jump from the history mean accepted outright (BPM).
    pub max_jump_bpm: f64,
    /// SNR above which the jump limit is relaxed (dB).
    pub high_snr_db: f64,
    /// Multiplier applied to the jump limit at high SNR.
    pub jump_relax_factor: f64,
    /// SNR above which a non-trending jump is still accepted (dB).
    pub snr_override_db: f64,
    /// SNR above which the newest value gets extra weight (dB).
    pub boost_snr_db: f64,
    /// Extra weight for the newest value at high SNR.
    pub latest_boost: f64,
    /// Recent values averaged for the trend check; also the pending capacity.
    pub trend_window: usize,
    /// History length below which the raw value is returned.
    pub min_weighted: usize,
    /// Weight of the oldest history entry.
    pub weight_oldest: f64,
    /// Weight of the newest history entry.
    pub weight_newest: f64,
    /// Candidates outside this range are treated as absent.
    pub valid_min_bpm: f64,
    pub valid_max_bpm: f64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            history_size: 10,
            max_jump_bpm: 12.0,
            high_snr_db: 10.0,
            jump_relax_factor: 1.5,
            snr_override_db: 8.0,
            boost_snr_db: 12.0,
            latest_boost: 1.5,
            trend_window: 3,
            min_weighted: 3,
            weight_oldest: 0.5,
            weight_newest: 1.0,
            valid_min_bpm: 45.0,
            valid_max_bpm: 180.0,
        }
    }
}

/// Why an out-of-limit candidate was, or was not, accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JumpVerdict {
    /// Recent values agree with the candidate
    Trend,
    /// No trend, but the spectrum is clean enough to trust it
    SnrOverride,
    Reject,
}

#[derive(Debug, Clone)]
pub struct BpmSmoother {
    cfg: SmootherConfig,
    history: VecDeque<f64>,
    pending: VecDeque<f64>,
    current: f64,
}

impl Default for BpmSmoother {
    fn default() -> Self {
        Self::new()
    }
}

impl BpmSmoother {
    pub fn new() -> Self {
        Self::with_config(SmootherConfig::default())
    }

    pub fn with_config(cfg: SmootherConfig) -> Self {
        let history_size = cfg.history_size.max(1);
        Self {
            history: VecDeque::with_capacity(history_size),
            pending: VecDeque::with_capacity(cfg.trend_window.max(1)),
            current: 0.0,
            cfg,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::with_config(self.cfg.clone());
    }

    pub fn config(&self) -> &SmootherConfig {
        &self.cfg
    }

    /// Current stable BPM, `0.0` until the first accepted value.
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Accepted history, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &f64> {
        self.history.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed one estimate and its SNR; returns the stable BPM.
    pub fn update(&mut self, bpm: Option<f64>, snr_db: Option<f64>) -> f64 {
        let bpm = match bpm {
            Some(v) if v.is_finite() && v > 0.0 => v,
            _ => return self.current,
        };
        if bpm < self.cfg.valid_min_bpm || bpm > self.cfg.valid_max_bpm {
            log::trace!("smoother: {bpm:.1} BPM outside valid range, ignored");
            return self.current;
        }
        let snr = snr_db.filter(|s| s.is_finite());

        if self.history.is_empty() {
            self.push_history(bpm);
            self.current = bpm;
            return bpm;
        }

        let mut max_jump = self.cfg.max_jump_bpm;
        if snr.map_or(false, |s| s > self.cfg.high_snr_db) {
            max_jump *= self.cfg.jump_relax_factor;
        }

        let mean = self.history.iter().sum::<f64>() / self.history.len() as f64;
        if (bpm - mean).abs() > max_jump {
            match self.judge_jump(bpm, max_jump, snr) {
                JumpVerdict::Reject => {
                    self.park(bpm);
                    return self.current;
                }
                // Confirmed level change: the parked run belongs to it
                JumpVerdict::Trend => {
                    while let Some(v) = self.pending.pop_front() {
                        self.push_history(v);
                    }
                }
                // Only this reading is vouched for; parked values are dropped
                JumpVerdict::SnrOverride => {}
            }
        }
        self.pending.clear();
        self.push_history(bpm);

        if self.history.len() < self.cfg.min_weighted {
            self.current = bpm;
            return bpm;
        }

        self.current = self.weighted_mean(snr);
        self.current
    }

    fn judge_jump(&self, bpm: f64, max_jump: f64, snr: Option<f64>) -> JumpVerdict {
        let window = self.cfg.trend_window.max(1);
        if self.history.len() + self.pending.len() < window {
            return JumpVerdict::Reject;
        }

        let recent: Vec<f64> = self
            .history
            .iter()
            .chain(self.pending.iter())
            .rev()
            .take(window)
            .copied()
            .collect();
        let trend = recent.iter().sum::<f64>() / recent.len() as f64;

        if (bpm - trend).abs() < max_jump {
            log::debug!("smoother: level change to {bpm:.1} BPM accepted (trend {trend:.1})");
            return JumpVerdict::Trend;
        }
        if snr.map_or(false, |s| s > self.cfg.snr_override_db) {
            JumpVerdict::SnrOverride
        } else {
            JumpVerdict::Reject
        }
    }

    fn park(&mut self, bpm: f64) {
        if self.pending.len() >= self.cfg.trend_window.max(1) {
            self.pending.pop_front();
        }
        self.pending.push_back(bpm);
    }

    fn push_history(&mut self, bpm: f64) {
        if self.history.len() >= self.cfg.history_size.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(bpm);
    }

    fn weighted_mean(&self, snr: Option<f64>) -> f64 {
        let n = self.history.len();
        let span = self.cfg.weight_newest - self.cfg.weight_oldest;
        let mut weights: Vec<f64> = (0..n)
            .map(|i| {
                if n == 1 {
                    self.cfg.weight_oldest
                } else {
                    self.cfg.weight_oldest + span * i as f64 / (n - 1) as f64
                }
            })
            .collect();

        if snr.map_or(false, |s| s > self.cfg.boost_snr_db) {
            if let Some(last) = weights.last_mut() {
                *last *= self.cfg.latest_boost;
            }
        }

        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return self.history.back().copied().unwrap_or(self.current);
        }
        self.history
            .iter()
            .zip(weights.iter())
            .map(|(v, w)| v * w)
            .sum::<f64>()
            / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn feed(smoother: &mut BpmSmoother, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| smoother.update(Some(*v), None)).collect()
    }

    #[test]
    fn test_first_value_seeds() {
        let mut smoother = BpmSmoother::new();
        assert_eq!(smoother.current(), 0.0);
        assert_eq!(smoother.update(Some(72.0), None), 72.0);
        assert_eq!(smoother.current(), 72.0);
    }

    #[test]
    fn test_absent_and_invalid_keep_current() {
        let mut smoother = BpmSmoother::new();
        assert_eq!(smoother.update(None, None), 0.0);
        smoother.update(Some(70.0), None);

        assert_eq!(smoother.update(None, Some(20.0)), 70.0);
        assert_eq!(smoother.update(Some(0.0), None), 70.0);
        assert_eq!(smoother.update(Some(-5.0), None), 70.0);
        assert_eq!(smoother.update(Some(f64::NAN), None), 70.0);
        assert_eq!(smoother.update(Some(200.0), None), 70.0);
        assert_eq!(smoother.history().count(), 1);
    }

    #[test]
    fn test_single_spike_rejected() {
        let mut smoother = BpmSmoother::new();
        let out = feed(&mut smoother, &[60.0, 60.0, 60.0, 60.0, 90.0]);
        assert_relative_eq!(out[4], 60.0, epsilon = 1e-9);
        assert_eq!(smoother.pending_len(), 1);
        assert!(smoother.history().all(|v| *v == 60.0));
    }

    #[test]
    fn test_level_change_accepted_on_third_reading() {
        let mut smoother = BpmSmoother::new();
        let out = feed(&mut smoother, &[60.0, 60.0, 60.0, 88.0, 90.0, 91.0]);

        // First two confirming readings are held back
        assert_relative_eq!(out[3], 60.0, epsilon = 1e-9);
        assert_relative_eq!(out[4], 60.0, epsilon = 1e-9);

        // Third one commits the run: weights 0.5..1.0 over [60,60,60,88,90,91]
        assert_relative_eq!(out[5], 350.4 / 4.5, epsilon = 1e-9);
        assert_eq!(smoother.pending_len(), 0);
        assert_eq!(smoother.history().count(), 6);

        // The new level is now the reference
        let next = smoother.update(Some(90.0), None);
        assert!(next > out[5]);
    }

    #[test]
    fn test_snr_override_accepts_jump() {
        let mut smoother = BpmSmoother::new();
        feed(&mut smoother, &[60.0, 60.0, 60.0]);

        // 30 BPM jump exceeds even the relaxed limit (18) but SNR > 8 dB
        let out = smoother.update(Some(90.0), Some(9.0));
        assert!(out > 60.0);
        assert_eq!(smoother.history().count(), 4);
    }

    #[test]
    fn test_snr_override_drops_parked_spike() {
        let mut smoother = BpmSmoother::new();
        feed(&mut smoother, &[60.0, 60.0, 60.0]);

        // Spike at low SNR is parked, not recorded
        assert_relative_eq!(smoother.update(Some(95.0), Some(5.0)), 60.0, epsilon = 1e-9);
        assert_eq!(smoother.pending_len(), 1);

        // 85 misses the trend (mean of 60, 60, 95 is 13.3 away) and passes
        // on SNR alone: the parked 95 must not follow it into history
        let out = smoother.update(Some(85.0), Some(9.0));
        let history: Vec<f64> = smoother.history().copied().collect();
        assert_eq!(history, vec![60.0, 60.0, 60.0, 85.0]);
        assert_eq!(smoother.pending_len(), 0);
        // Weights 0.5, 0.667, 0.833, 1.0
        assert_relative_eq!(out, 205.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_high_snr_relaxes_jump() {
        let mut smoother = BpmSmoother::new();
        feed(&mut smoother, &[60.0, 60.0, 60.0]);

        // 15 BPM: rejected at low SNR
        assert_relative_eq!(smoother.update(Some(75.0), Some(5.0)), 60.0, epsilon = 1e-9);

        // Accepted once the limit is 18 (SNR > 10 dB)
        let mut relaxed = BpmSmoother::new();
        feed(&mut relaxed, &[60.0, 60.0, 60.0]);
        assert!(relaxed.update(Some(75.0), Some(11.0)) > 60.0);
    }

    #[test]
    fn test_short_history_returns_raw() {
        let mut smoother = BpmSmoother::new();
        smoother.update(Some(70.0), None);
        assert_eq!(smoother.update(Some(74.0), None), 74.0);
        // Third value switches to the weighted mean: (0.5*70 + 0.75*74 + 1.0*72) / 2.25
        let expected = (0.5 * 70.0 + 0.75 * 74.0 + 72.0) / 2.25;
        assert_relative_eq!(smoother.update(Some(72.0), None), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_latest_boost() {
        let mut plain = BpmSmoother::new();
        let mut boosted = BpmSmoother::new();
        feed(&mut plain, &[60.0, 62.0]);
        feed(&mut boosted, &[60.0, 62.0]);

        let a = plain.update(Some(70.0), None);
        let b = boosted.update(Some(70.0), Some(13.0));
        assert!(b > a);
    }

    #[test]
    fn test_history_bounded() {
        let mut smoother = BpmSmoother::new();
        for i in 0..50 {
            smoother.update(Some(70.0 + (i % 3) as f64), None);
        }
        assert_eq!(smoother.history().count(), 10);

        smoother.reset();
        assert_eq!(smoother.current(), 0.0);
        assert_eq!(smoother.history().count(), 0);
    }
}
