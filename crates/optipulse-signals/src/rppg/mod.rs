//! Remote Photoplethysmography (rPPG) algorithms
//!
//! Turns a window of per-frame skin colour averages into a single pulse
//! signal. Only POS (Plane-Orthogonal-to-Skin, Wang et al. 2017) is used by
//! the pipeline.

mod pos;

pub use pos::PosFusion;
