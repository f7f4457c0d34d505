//! # optipulse-signals
//!
//! Heart-rate estimation from per-frame skin colour averages (rPPG).
//!
//! This crate provides:
//! - **DSP**: rolling sample buffer, zero-phase Butterworth bandpass, Welch PSD,
//!   quality scoring and outlier-rejecting BPM smoothing
//! - **rPPG**: POS (Plane-Orthogonal-to-Skin) chrominance fusion
//! - **Session**: per-session [`Engine`], end-of-session [`Summary`], and a
//!   lock-guarded [`LiveMonitor`] for concurrent readers
//! - **Calibration**: baseline colour ratio / brightness thresholds
//!
//! ## Example
//!
//! ```ignore
//! use optipulse_signals::{Engine, PulseConfig, Sample};
//!
//! let mut engine = Engine::new(&PulseConfig::default());
//!
//! for frame in roi_averages {
//!     let reading = engine.tick(frame.map(|(r, g, b, t)| Sample::new(r, g, b, t)));
//!     if reading.ready {
//!         println!("{:.1} BPM ({:.0}% confidence, {})", reading.bpm, reading.confidence, reading.status);
//!     }
//! }
//!
//! let summary = engine.finalize();
//! println!("{} BPM: {}", summary.final_bpm, summary.remark);
//! ```

pub mod batch;
pub mod calibration;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod live;
pub mod rppg;
pub mod session;
pub mod source;

pub use batch::{analyze_trace, run_session, BatchOutcome};
pub use calibration::{Calibration, CalibrationConfig, CalibrationMode, Calibrator};
pub use config::{ConfigError, DiagnosticsConfig, PulseConfig, RppgConfig};
pub use dsp::{
    BandpassFilter, BpmSmoother, FilterConfig, QualityScorer, ReadingStatus, Sample,
    SampleBuffer, SmootherConfig, SpectralEstimator, SpectralResult,
};
pub use engine::{Engine, Reading, TickOutcome};
pub use live::{LiveClassification, LiveMonitor, LiveSnapshot};
pub use rppg::PosFusion;
pub use session::{HeartRateClass, SessionAggregator, SessionConfig, Summary};
pub use source::{FrameEvent, FrameSource, SourceError, TraceSource, VecSource};
