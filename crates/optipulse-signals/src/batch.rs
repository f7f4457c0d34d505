//! Offline analysis: run a source to exhaustion, single-threaded.

use crate::config::PulseConfig;
use crate::engine::{Engine, TickOutcome};
use crate::session::{SessionAggregator, Summary};
use crate::source::{FrameEvent, FrameSource, TraceSource};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Summary of a batch run plus counters for the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub summary: Summary,
    /// Ticks consumed, including ticks without a region
    pub frames: usize,
    pub no_region_ticks: usize,
    pub ready_readings: usize,
    pub filter_degraded: bool,
    /// The source could not be opened; `summary` is the default one
    pub source_failed: bool,
}

/// Run a session over `source` until it reports end of stream.
pub fn run_session(source: &mut dyn FrameSource, config: &PulseConfig) -> BatchOutcome {
    let mut engine = Engine::new(config);
    let mut frames = 0;
    let mut no_region_ticks = 0;
    let mut ready_readings = 0;

    let summary = loop {
        let event = source.next_event();
        if event == FrameEvent::NoRegion {
            no_region_ticks += 1;
        }
        match engine.handle(event) {
            TickOutcome::Reading(reading) => {
                frames += 1;
                if reading.ready {
                    ready_readings += 1;
                }
            }
            TickOutcome::Finished(summary) => break summary,
        }
    };

    log::info!(
        "analyzed {frames} frames ({ready_readings} readings, {no_region_ticks} without region)"
    );

    BatchOutcome {
        summary,
        frames,
        no_region_ticks,
        ready_readings,
        filter_degraded: engine.filter_degraded(),
        source_failed: false,
    }
}

/// Analyze a trace file. An unopenable file is reported with a warning and
/// resolves to the default summary with `source_failed` set.
pub fn analyze_trace<P: AsRef<Path>>(path: P, config: &PulseConfig) -> BatchOutcome {
    let path = path.as_ref();
    match TraceSource::open(path) {
        Ok(source) => {
            let mut source = source.with_frame_rate(config.rppg.sample_rate);
            run_session(&mut source, config)
        }
        Err(e) => {
            log::warn!("{e}");
            let summary = SessionAggregator::new(config.session.clone()).finalize();
            BatchOutcome {
                summary,
                frames: 0,
                no_region_ticks: 0,
                ready_readings: 0,
                filter_degraded: false,
                source_failed: true,
            }
        }
    }
}
