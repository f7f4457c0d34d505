//! Frame sources
//!
//! A source yields one [`FrameEvent`] per tick: a colour sample from the
//! located region, a tick where no region was found, or end of stream.
//! Video decoding and region localisation live upstream; this crate only
//! sees their per-frame averages. [`TraceSource`] replays such averages from
//! a CSV trace with header `timestamp,r,g,b`, where blank colour fields mark
//! a tick without a region.

use crate::dsp::Sample;
use serde::Deserialize;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("trace format error: {0}")]
    Csv(#[from] csv::Error),
}

/// One tick from a frame source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameEvent {
    Sample(Sample),
    /// No region located this tick; the window is not advanced.
    NoRegion,
    /// Terminal. Triggers the session summary.
    EndOfStream,
}

impl FrameEvent {
    /// The sample, if any. `None` for both non-sample events.
    pub fn sample(&self) -> Option<Sample> {
        match self {
            FrameEvent::Sample(s) => Some(*s),
            _ => None,
        }
    }
}

/// Producer of per-frame colour averages.
pub trait FrameSource {
    /// Next tick. Must keep returning `EndOfStream` once exhausted.
    fn next_event(&mut self) -> FrameEvent;

    /// Nominal frame rate, when the source knows it.
    fn frame_rate(&self) -> Option<f64> {
        None
    }
}

/// In-memory source, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    events: VecDeque<Option<Sample>>,
    fps: Option<f64>,
}

impl VecSource {
    pub fn new(events: impl IntoIterator<Item = Option<Sample>>) -> Self {
        Self {
            events: events.into_iter().collect(),
            fps: None,
        }
    }

    pub fn from_samples(samples: impl IntoIterator<Item = Sample>) -> Self {
        Self::new(samples.into_iter().map(Some))
    }

    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl FrameSource for VecSource {
    fn next_event(&mut self) -> FrameEvent {
        match self.events.pop_front() {
            Some(Some(sample)) => FrameEvent::Sample(sample),
            Some(None) => FrameEvent::NoRegion,
            None => FrameEvent::EndOfStream,
        }
    }

    fn frame_rate(&self) -> Option<f64> {
        self.fps
    }
}

#[derive(Debug, Deserialize)]
struct TraceRow {
    timestamp: f64,
    r: Option<f64>,
    g: Option<f64>,
    b: Option<f64>,
}

/// CSV trace replay.
pub struct TraceSource {
    rows: csv::DeserializeRecordsIntoIter<Box<dyn Read>, TraceRow>,
    fps: Option<f64>,
    line: usize,
    finished: bool,
}

impl TraceSource {
    /// Open a trace file. Failure here is the one error surfaced to operators.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("opened trace {}", path.display());
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read + 'static>(reader: R) -> Result<Self, SourceError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(Box::new(reader) as Box<dyn Read>);
        // Reject files without the expected columns up front
        let headers = csv_reader.headers()?.clone();
        for column in ["timestamp", "r", "g", "b"] {
            if !headers.iter().any(|h| h == column) {
                return Err(SourceError::Csv(csv::Error::from(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("missing column '{column}'"),
                ))));
            }
        }

        Ok(Self {
            rows: csv_reader.into_deserialize(),
            fps: None,
            line: 1,
            finished: false,
        })
    }

    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }
}

impl FrameSource for TraceSource {
    fn next_event(&mut self) -> FrameEvent {
        if self.finished {
            return FrameEvent::EndOfStream;
        }
        self.line += 1;

        match self.rows.next() {
            None => {
                self.finished = true;
                FrameEvent::EndOfStream
            }
            Some(Ok(TraceRow {
                timestamp,
                r: Some(r),
                g: Some(g),
                b: Some(b),
            })) => FrameEvent::Sample(Sample::new(r, g, b, timestamp)),
            Some(Ok(_)) => FrameEvent::NoRegion,
            Some(Err(e)) if e.is_io_error() => {
                log::warn!("trace read failed at line {}: {e}", self.line);
                self.finished = true;
                FrameEvent::EndOfStream
            }
            Some(Err(e)) => {
                log::warn!("skipping malformed trace line {}: {e}", self.line);
                FrameEvent::NoRegion
            }
        }
    }

    fn frame_rate(&self) -> Option<f64> {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn trace(text: &str) -> TraceSource {
        TraceSource::from_reader(Cursor::new(text.to_string())).unwrap()
    }

    #[test]
    fn test_vec_source() {
        let s = Sample::new(1.0, 2.0, 3.0, 0.0);
        let mut source = VecSource::new([Some(s), None]).with_frame_rate(15.0);
        assert_eq!(source.frame_rate(), Some(15.0));
        assert_eq!(source.next_event(), FrameEvent::Sample(s));
        assert_eq!(source.next_event(), FrameEvent::NoRegion);
        assert_eq!(source.next_event(), FrameEvent::EndOfStream);
        assert_eq!(source.next_event(), FrameEvent::EndOfStream);
    }

    #[test]
    fn test_trace_rows() {
        let mut source = trace("timestamp,r,g,b\n0.0,120,100,80\n0.033,,,\n0.066, 121.5 ,101,81\n");
        assert_eq!(
            source.next_event(),
            FrameEvent::Sample(Sample::new(120.0, 100.0, 80.0, 0.0))
        );
        assert_eq!(source.next_event(), FrameEvent::NoRegion);
        assert_eq!(source.next_event().sample().map(|s| s.r), Some(121.5));
        assert_eq!(source.next_event(), FrameEvent::EndOfStream);
        assert_eq!(source.next_event(), FrameEvent::EndOfStream);
    }

    #[test]
    fn test_partial_row_is_no_region() {
        let mut source = trace("timestamp,r,g,b\n0.0,120,,80\n");
        assert_eq!(source.next_event(), FrameEvent::NoRegion);
    }

    #[test]
    fn test_malformed_row_skipped() {
        let mut source = trace("timestamp,r,g,b\n0.0,abc,100,80\n0.1,1,2,3\n");
        assert_eq!(source.next_event(), FrameEvent::NoRegion);
        assert!(matches!(source.next_event(), FrameEvent::Sample(_)));
    }

    #[test]
    fn test_missing_column_rejected() {
        let err = TraceSource::from_reader(Cursor::new("timestamp,r,g\n0,1,2\n".to_string()));
        assert!(matches!(err, Err(SourceError::Csv(_))));
    }

    #[test]
    fn test_open_missing_file() {
        let err = TraceSource::open("/definitely/not/here.csv").err().unwrap();
        assert!(matches!(err, SourceError::Io { .. }));
        assert!(err.to_string().contains("not/here.csv"));
    }
}
