//! Log output of the hot path: repeated zones must not flood the warn level.

mod common;

use std::sync::Mutex;

use common::profiler;
use gpuzones::{CallSite, zone};
use log::{Level, LevelFilter, Log, Metadata, Record};

static RECORDS: Mutex<Vec<(Level, String)>> = Mutex::new(Vec::new());

struct Capture;

impl Log for Capture {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if record.target().starts_with("gpuzones") {
            let mut records = RECORDS.lock().unwrap();
            records.push((record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

static LOGGER: Capture = Capture;

// Single test in this binary; the logger is process-wide.
#[test]
fn zones_in_a_loop_log_below_warn() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Trace);

    let mut p = profiler(common::small_config());
    for _ in 0..3 {
        p.begin_frame("loop").unwrap();
        {
            let mut frame = zone!(p, "frame");
            for _ in 0..8 {
                let _item = frame.scope(CallSite::from_raw(7), "item");
            }
        }
        p.end_frame().unwrap();
        p.collect();
    }
    assert_eq!(p.diagnostics().duplicate_entries, 3 * 7);

    let records = RECORDS.lock().unwrap();
    assert!(
        records.iter().any(|(_, msg)| msg.contains("entered 8 times")),
        "{records:#?}"
    );
    let warnings: Vec<_> = records
        .iter()
        .filter(|(level, _)| *level <= Level::Warn)
        .collect();
    assert!(warnings.is_empty(), "{warnings:#?}");
}
