//! Console output

use crate::correlator::RstIntervals;
use chrono::{DateTime, Local};
use protocol::Detection;
use std::time::Duration;

fn format_interval(interval: Option<Duration>) -> String {
    match interval {
        Some(duration) => format!("{:.3} ms", duration.as_secs_f64() * 1000.0),
        None => "missing".to_string(),
    }
}

/// Report of one run: both intervals, the signed delta and the verdict.
pub fn format_report(at: DateTime<Local>, intervals: &RstIntervals, detection: &Detection) -> String {
    format!(
        "[{}] low {} | high {} | delta {:+.3} ms -> {}",
        at.format("%Y-%m-%d %H:%M:%S"),
        format_interval(intervals.low),
        format_interval(intervals.high),
        detection.delta_ms,
        detection.verdict
    )
}

pub fn print_report(intervals: &RstIntervals, detection: &Detection) {
    println!("{}", format_report(Local::now(), intervals, detection));
}
