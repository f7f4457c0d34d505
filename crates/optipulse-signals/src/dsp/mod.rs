//! DSP (Digital Signal Processing) module
//!
//! Signal processing stages of the heart-rate pipeline, leaf-first:
//!
//! - `SampleBuffer` - fixed-capacity FIFO of colour samples
//! - `DspProcessor` - window statistics (detrend, standardise, median)
//! - `BandpassFilter` - zero-phase Butterworth bandpass with pass-through fallback
//! - `SpectralEstimator` - Welch PSD and in-band peak search
//! - `QualityScorer` - confidence / SNR / status derivation
//! - `BpmSmoother` - outlier-rejecting weighted smoother

mod bpm_smoother;
mod buffer;
mod filters;
mod processor;
mod quality_score;
mod spectral;

pub use bpm_smoother::{BpmSmoother, SmootherConfig};
pub use buffer::{ChannelWindow, Sample, SampleBuffer};
pub use filters::{BandpassFilter, Biquad, FilterConfig, FilterDesignError, FilterState};
pub use processor::{DspProcessor, EPSILON};
pub use quality_score::{QualityConfig, QualityScore, QualityScorer, ReadingStatus};
pub use spectral::{SpectralConfig, SpectralError, SpectralEstimator, SpectralResult};
