mod common;

use common::{bin_freq, pulse_trace, trace_csv};
use optipulse_signals::{
    analyze_trace, run_session, FrameEvent, FrameSource, HeartRateClass, PulseConfig,
    TraceSource, VecSource,
};
use std::io::Cursor;
use tempfile::NamedTempFile;

#[test]
fn twenty_second_session_summary() {
    let fs = 30.0;
    let f = bin_freq(10, fs);
    let mut source = VecSource::from_samples(pulse_trace(f, fs, 600, 5));

    let outcome = run_session(&mut source, &PulseConfig::default());
    let summary = &outcome.summary;

    assert!((66..=74).contains(&summary.final_bpm), "final {}", summary.final_bpm);
    assert_eq!(summary.remark, "Normal Resting Heart Rate");
    assert_eq!(summary.classification, HeartRateClass::Normal);
    // 571 ready ticks minus the 30 warm-up ticks, less any below the floor
    assert!(summary.total_readings > 400 && summary.total_readings <= 541);
    assert_eq!(outcome.frames, 600);
    assert_eq!(outcome.ready_readings, 571);
    assert!(!outcome.source_failed);
}

#[test]
fn short_session_falls_back_to_demo_value() {
    let mut source = VecSource::from_samples(pulse_trace(1.2, 30.0, 20, 1));
    let outcome = run_session(&mut source, &PulseConfig::default());
    assert_eq!(outcome.summary.final_bpm, 72);
    assert!(outcome.summary.remark.contains("Demo Value"));
    assert_eq!(outcome.summary.total_readings, 0);
}

#[test]
fn blank_trace_rows_are_no_region_ticks() {
    let fs = 30.0;
    let samples = pulse_trace(1.2, fs, 40, 9);
    let mut rows: Vec<_> = samples.iter().copied().map(Some).collect();
    for i in [5, 6, 7, 20] {
        rows[i] = None;
    }
    let text = trace_csv(&rows, fs);

    // Event level
    let mut source = TraceSource::from_reader(Cursor::new(text.clone())).unwrap();
    let events: Vec<FrameEvent> = (0..41).map(|_| source.next_event()).collect();
    assert_eq!(events.iter().filter(|e| **e == FrameEvent::NoRegion).count(), 4);
    assert_eq!(events[40], FrameEvent::EndOfStream);

    // Session level: the window only holds the 36 real samples
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), text).unwrap();
    let outcome = analyze_trace(file.path(), &PulseConfig::default());
    assert_eq!(outcome.frames, 40);
    assert_eq!(outcome.no_region_ticks, 4);
    assert_eq!(outcome.ready_readings, 7);
    assert!(!outcome.source_failed);
}

#[test]
fn missing_trace_reports_source_failure() {
    let outcome = analyze_trace("/no/such/dir/trace.csv", &PulseConfig::default());
    assert!(outcome.source_failed);
    assert_eq!(outcome.frames, 0);
    assert_eq!(outcome.summary.final_bpm, 72);
    assert!(outcome.summary.remark.contains("Demo Value"));
}

#[test]
fn end_of_stream_is_sticky() {
    let mut source = TraceSource::from_reader(Cursor::new("timestamp,r,g,b\n".to_string())).unwrap();
    assert_eq!(source.next_event(), FrameEvent::EndOfStream);
    assert_eq!(source.next_event(), FrameEvent::EndOfStream);
}
