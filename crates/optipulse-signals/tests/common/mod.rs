//! Synthetic colour traces shared by the integration tests.

#![allow(dead_code)]

use optipulse_signals::Sample;
use std::f64::consts::PI;

/// Frequency of FFT bin `k` for a 256-sample segment.
pub fn bin_freq(k: usize, fs: f64) -> f64 {
    k as f64 * fs / 256.0
}

/// Deterministic uniform noise in [-0.5, 0.5).
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64 - 0.5
    }
}

/// Skin-like colour samples pulsing at `freq_hz`, with the three channels a
/// third of a cycle apart and ~0.1 std of noise on each.
pub fn pulse_trace(freq_hz: f64, fs: f64, n: usize, seed: u64) -> Vec<Sample> {
    let mut noise = Lcg::new(seed);
    (0..n)
        .map(|i| {
            let t = i as f64 / fs;
            let phase = 2.0 * PI * freq_hz * t;
            Sample::new(
                140.0 + 2.0 * phase.sin() + 0.35 * noise.next(),
                110.0 + 2.0 * (phase + 2.0 * PI / 3.0).sin() + 0.35 * noise.next(),
                90.0 + 2.0 * (phase + 4.0 * PI / 3.0).sin() + 0.35 * noise.next(),
                t,
            )
        })
        .collect()
}

/// CSV trace text with header `timestamp,r,g,b`; `None` rows are blank.
pub fn trace_csv(rows: &[Option<Sample>], fs: f64) -> String {
    let mut out = String::from("timestamp,r,g,b\n");
    for (i, row) in rows.iter().enumerate() {
        match row {
            Some(s) => out.push_str(&format!("{},{},{},{}\n", s.timestamp, s.r, s.g, s.b)),
            None => out.push_str(&format!("{},,,\n", i as f64 / fs)),
        }
    }
    out
}
