//! Aggregate views over stored detection records.

use crate::store::LogRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics, Statistics};
use std::collections::BTreeMap;

/// Number of detections on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub detections: usize,
}

/// Duration statistics over closed intervals, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationSummary {
    pub intervals: usize,
    pub total_secs: f64,
    pub mean_secs: f64,
    pub median_secs: f64,
    pub max_secs: f64,
}

/// Everything the analysis view shows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub per_day: Vec<DailyCount>,
    pub durations: Option<DurationSummary>,
    pub open_intervals: usize,
}

/// Count detections per calendar day, oldest first.
pub fn detections_per_day(records: &[LogRecord]) -> Vec<DailyCount> {
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.date).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(date, detections)| DailyCount { date, detections })
        .collect()
}

/// Descriptions recorded on `date`, in detection order.
pub fn descriptions_on(records: &[LogRecord], date: NaiveDate) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.date == date)
        .map(|r| r.description.clone())
        .collect()
}

/// Duration statistics of closed records, or `None` if none are closed.
pub fn duration_summary(records: &[LogRecord]) -> Option<DurationSummary> {
    let durations: Vec<f64> = records.iter().filter_map(|r| r.duration_secs()).collect();
    if durations.is_empty() {
        return None;
    }

    let total_secs: f64 = durations.iter().sum();
    let mean_secs = durations.iter().mean();
    let max_secs = Statistics::max(durations.iter());
    let median_secs = Data::new(durations.clone()).median();

    Some(DurationSummary {
        intervals: durations.len(),
        total_secs,
        mean_secs,
        median_secs,
        max_secs,
    })
}

/// Build the full analysis report.
pub fn analyze(records: &[LogRecord]) -> AnalysisReport {
    AnalysisReport {
        per_day: detections_per_day(records),
        durations: duration_summary(records),
        open_intervals: records.iter().filter(|r| r.is_open()).count(),
    }
}
