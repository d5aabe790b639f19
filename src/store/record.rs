//! Persisted form of detection intervals.

use crate::core::tracker::DetectionInterval;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Time-of-day format used for `detection_time` and `close_time`.
pub const TIME_OF_DAY_FORMAT: &str = "%H:%M:%S";

/// One detection interval as stored in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Interval identifier, captured at insert time
    pub id: Uuid,
    /// Calendar date of the detection (station timezone)
    pub date: NaiveDate,
    /// Time of day the interval opened (HH:MM:SS)
    pub detection_time: String,
    /// Time of day the interval closed; null while open
    pub close_time: Option<String>,
    /// Classifier output recorded for the interval
    pub description: String,
    /// Recorded clip, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_filename: Option<String>,
    /// Hostname of the capturing machine
    pub station: String,
    /// Exact open instant
    pub opened_at: DateTime<Utc>,
    /// Exact close instant
    pub closed_at: Option<DateTime<Utc>>,
}

impl LogRecord {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    /// Duration of a closed record in seconds.
    pub fn duration_secs(&self) -> Option<f64> {
        self.closed_at
            .map(|closed| (closed - self.opened_at).num_milliseconds() as f64 / 1000.0)
    }
}

/// Converts tracker intervals into log records for one station.
#[derive(Debug, Clone)]
pub struct RecordMapper {
    tz: Tz,
    station: String,
}

impl RecordMapper {
    pub fn new(tz: Tz, station: impl Into<String>) -> Self {
        Self {
            tz,
            station: station.into(),
        }
    }

    /// Mapper for this machine, using its hostname as the station id.
    pub fn for_local_station(tz: Tz) -> Self {
        let station = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self::new(tz, station)
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    /// Format an instant as time of day in the station timezone.
    pub fn time_of_day(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.tz)
            .format(TIME_OF_DAY_FORMAT)
            .to_string()
    }

    /// Record for a freshly opened interval (close fields null).
    pub fn opened_record(&self, interval: &DetectionInterval) -> LogRecord {
        LogRecord {
            id: interval.id,
            date: interval.date(self.tz),
            detection_time: self.time_of_day(interval.open_time),
            close_time: None,
            description: interval.description.clone(),
            video_filename: interval.video_reference.clone(),
            station: self.station.clone(),
            opened_at: interval.open_time,
            closed_at: None,
        }
    }

    /// Full record for an interval, including close fields when closed.
    pub fn record(&self, interval: &DetectionInterval) -> LogRecord {
        let mut record = self.opened_record(interval);
        record.closed_at = interval.close_time;
        record.close_time = interval.close_time.map(|c| self.time_of_day(c));
        record
    }
}
