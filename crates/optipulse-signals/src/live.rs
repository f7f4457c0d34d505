//! Live monitoring with concurrent readers.
//!
//! One producer advances the engine tick by tick; any number of readers
//! fetch the latest published [`LiveSnapshot`]. Snapshots are replaced
//! whole, so a reader sees either the previous tick or the current one,
//! never a mix.
//!
//! # Example
//! ```rust
//! use optipulse_signals::{FrameEvent, LiveMonitor, PulseConfig, Sample};
//!
//! let monitor = LiveMonitor::new(PulseConfig::default());
//! monitor.submit(FrameEvent::Sample(Sample::new(140.0, 110.0, 90.0, 0.0)));
//!
//! let snapshot = monitor.snapshot();
//! assert_eq!(snapshot.tick, 1);
//! ```

use crate::config::PulseConfig;
use crate::engine::{Engine, Reading, TickOutcome};
use crate::session::{HeartRateClass, Summary};
use crate::source::{FrameEvent, FrameSource};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Snapshot
// ============================================================================

/// Display class of the live BPM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiveClassification {
    /// No reading yet
    Unknown,
    Bradycardia,
    Normal,
    /// Plausible but outside the resting range
    Monitor,
    Tachycardia,
}

impl LiveClassification {
    /// Per-tick class of a ready reading's BPM (whole beats).
    pub fn from_bpm(bpm: f64) -> Self {
        let bpm = bpm.trunc();
        if bpm < 48.0 {
            LiveClassification::Bradycardia
        } else if bpm > 120.0 {
            LiveClassification::Tachycardia
        } else if (60.0..=100.0).contains(&bpm) {
            LiveClassification::Normal
        } else {
            LiveClassification::Monitor
        }
    }
}

impl From<HeartRateClass> for LiveClassification {
    fn from(class: HeartRateClass) -> Self {
        match class {
            HeartRateClass::Bradycardia => LiveClassification::Bradycardia,
            HeartRateClass::Normal => LiveClassification::Normal,
            HeartRateClass::Tachycardia => LiveClassification::Tachycardia,
        }
    }
}

/// Everything a reader may show for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    pub reading: Reading,
    pub classification: LiveClassification,
    /// 0-100 stability of the stable BPM
    pub stability: f64,
    pub filter_degraded: bool,
    pub pulse_waveform: Vec<f64>,
    /// Present once the source reported end of stream
    pub summary: Option<Summary>,
    pub session_id: u64,
    /// Ticks consumed by this session
    pub tick: u64,
}

impl LiveSnapshot {
    fn initial(session_id: u64, filter_degraded: bool) -> Self {
        Self {
            reading: Reading::calibrating(0.0),
            classification: LiveClassification::Unknown,
            stability: 0.0,
            filter_degraded,
            pulse_waveform: Vec::new(),
            summary: None,
            session_id,
            tick: 0,
        }
    }
}

// ============================================================================
// Monitor
// ============================================================================

struct Session {
    id: u64,
    engine: Engine,
}

pub struct LiveMonitor {
    config: PulseConfig,
    session: Mutex<Session>,
    published: RwLock<Arc<LiveSnapshot>>,
}

impl std::fmt::Debug for LiveMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("LiveMonitor")
            .field("session_id", &snapshot.session_id)
            .field("tick", &snapshot.tick)
            .field("status", &snapshot.reading.status)
            .finish()
    }
}

impl LiveMonitor {
    pub fn new(config: PulseConfig) -> Self {
        let engine = Engine::new(&config);
        let initial = LiveSnapshot::initial(1, engine.filter_degraded());
        Self {
            config,
            session: Mutex::new(Session { id: 1, engine }),
            published: RwLock::new(Arc::new(initial)),
        }
    }

    /// Advance the engine by one event and publish the result.
    pub fn submit(&self, event: FrameEvent) -> Arc<LiveSnapshot> {
        let mut session = self.session.lock();
        let previous = self.snapshot();

        let outcome = session.engine.handle(event);
        let engine = &session.engine;
        let snapshot = match outcome {
            TickOutcome::Reading(reading) => {
                let classification = if reading.ready {
                    LiveClassification::from_bpm(reading.bpm)
                } else {
                    previous.classification
                };
                LiveSnapshot {
                    classification,
                    stability: engine.stability(),
                    filter_degraded: engine.filter_degraded(),
                    pulse_waveform: engine.pulse_waveform().to_vec(),
                    summary: None,
                    session_id: session.id,
                    tick: engine.ticks(),
                    reading,
                }
            }
            TickOutcome::Finished(summary) => {
                let mut reading = previous.reading.clone();
                reading.bpm = summary.final_bpm as f64;
                LiveSnapshot {
                    reading,
                    classification: summary.classification.into(),
                    stability: engine.stability(),
                    filter_degraded: engine.filter_degraded(),
                    pulse_waveform: engine.pulse_waveform().to_vec(),
                    summary: Some(summary),
                    session_id: session.id,
                    tick: engine.ticks(),
                }
            }
        };

        let snapshot = Arc::new(snapshot);
        *self.published.write() = Arc::clone(&snapshot);
        snapshot
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<LiveSnapshot> {
        Arc::clone(&self.published.read())
    }

    /// Discard the current session and start a fresh one. Returns the new
    /// session id.
    pub fn reset(&self) -> u64 {
        let mut session = self.session.lock();
        let id = session.id + 1;
        *session = Session {
            id,
            engine: Engine::new(&self.config),
        };
        *self.published.write() =
            Arc::new(LiveSnapshot::initial(id, session.engine.filter_degraded()));
        log::info!("live session reset, now session {id}");
        id
    }

    /// Drive the monitor from a source until it is exhausted.
    pub fn run(&self, source: &mut dyn FrameSource) -> Summary {
        loop {
            let snapshot = self.submit(source.next_event());
            if let Some(summary) = &snapshot.summary {
                return summary.clone();
            }
        }
    }
}
