//! Detection session tracking.
//!
//! The tracker converts a per-frame presence signal into discrete detection
//! intervals. At most one interval is open at any moment. Opening and closing
//! are reported as events; persisting them is the caller's job.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Which classifier description an open interval keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DescriptionPolicy {
    /// Keep the description seen when the interval opened
    #[default]
    KeepFirst,
    /// Overwrite with every description observed while open
    KeepLatest,
}

impl DescriptionPolicy {
    /// Parse a policy name (`keep-first` or `keep-latest`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "keep-first" | "first" => Some(Self::KeepFirst),
            "keep-latest" | "latest" => Some(Self::KeepLatest),
            _ => None,
        }
    }
}

impl std::fmt::Display for DescriptionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DescriptionPolicy::KeepFirst => write!(f, "keep-first"),
            DescriptionPolicy::KeepLatest => write!(f, "keep-latest"),
        }
    }
}

/// One continuous period during which the presence signal was true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionInterval {
    /// Identifier assigned at open time, used to match the stored record
    pub id: Uuid,
    /// Timestamp of the frame that opened the interval
    pub open_time: DateTime<Utc>,
    /// Timestamp of the frame (or shutdown) that closed it; `None` while open
    pub close_time: Option<DateTime<Utc>>,
    /// Classifier output recorded for the interval
    pub description: String,
    /// Path of the recorded clip, if a video sink is attached
    pub video_reference: Option<String>,
}

impl DetectionInterval {
    fn open(open_time: DateTime<Utc>, description: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            open_time,
            close_time: None,
            description: description.to_string(),
            video_reference: None,
        }
    }

    /// Whether the interval is still open.
    pub fn is_open(&self) -> bool {
        self.close_time.is_none()
    }

    /// Calendar date of the interval in the given timezone.
    pub fn date(&self, tz: Tz) -> NaiveDate {
        self.open_time.with_timezone(&tz).date_naive()
    }

    /// Length of a closed interval.
    pub fn duration(&self) -> Option<Duration> {
        self.close_time.map(|close| close - self.open_time)
    }
}

/// Session boundary emitted by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "interval", rename_all = "snake_case")]
pub enum TrackerEvent {
    IntervalOpened(DetectionInterval),
    IntervalClosed(DetectionInterval),
}

impl TrackerEvent {
    /// The interval snapshot carried by this event.
    pub fn interval(&self) -> &DetectionInterval {
        match self {
            TrackerEvent::IntervalOpened(i) | TrackerEvent::IntervalClosed(i) => i,
        }
    }

    /// Timestamp at which the boundary happened.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TrackerEvent::IntervalOpened(i) => i.open_time,
            // Closed intervals always carry a close time.
            TrackerEvent::IntervalClosed(i) => i.close_time.unwrap_or(i.open_time),
        }
    }

    pub fn is_opened(&self) -> bool {
        matches!(self, TrackerEvent::IntervalOpened(_))
    }
}

/// Tracker contract violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// Frames were delivered out of time order
    InvalidTimestamp {
        previous: DateTime<Utc>,
        received: DateTime<Utc>,
    },
    /// The operation needs an open interval
    NotOpen,
}

impl std::fmt::Display for TrackerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerError::InvalidTimestamp { previous, received } => write!(
                f,
                "Invalid timestamp: {} is not after previous frame at {}",
                received.to_rfc3339(),
                previous.to_rfc3339()
            ),
            TrackerError::NotOpen => write!(f, "No detection interval is open"),
        }
    }
}

impl std::error::Error for TrackerError {}

/// Two-state (CLOSED / OPEN) detection session tracker.
///
/// The tracker does no I/O and is not internally synchronized; share it
/// through [`SharedTracker`] when several threads need it.
#[derive(Debug, Default)]
pub struct SessionTracker {
    /// How descriptions are recorded while open
    policy: DescriptionPolicy,
    /// The open interval, if any
    current: Option<DetectionInterval>,
    /// Timestamp of the last accepted call
    last_timestamp: Option<DateTime<Utc>>,
}

impl SessionTracker {
    /// Create a closed tracker with the given description policy.
    pub fn new(policy: DescriptionPolicy) -> Self {
        Self {
            policy,
            current: None,
            last_timestamp: None,
        }
    }

    /// Feed the presence signal for one frame.
    ///
    /// Returns `IntervalOpened` on a false→true transition, `IntervalClosed`
    /// on true→false, and `None` otherwise. Timestamps must be strictly
    /// increasing; a rejected call leaves the tracker untouched.
    pub fn observe(
        &mut self,
        signal: bool,
        description: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<TrackerEvent>, TrackerError> {
        if let Some(previous) = self.last_timestamp {
            if timestamp <= previous {
                return Err(TrackerError::InvalidTimestamp {
                    previous,
                    received: timestamp,
                });
            }
        }
        self.last_timestamp = Some(timestamp);

        let event = match (self.current.take(), signal) {
            (None, true) => {
                let interval = DetectionInterval::open(timestamp, description);
                self.current = Some(interval.clone());
                Some(TrackerEvent::IntervalOpened(interval))
            }
            (Some(mut interval), true) => {
                if self.policy == DescriptionPolicy::KeepLatest {
                    interval.description = description.to_string();
                }
                self.current = Some(interval);
                None
            }
            (Some(mut interval), false) => {
                interval.close_time = Some(timestamp);
                Some(TrackerEvent::IntervalClosed(interval))
            }
            (None, false) => None,
        };

        Ok(event)
    }

    /// Force-close the open interval at `timestamp`.
    ///
    /// A closed tracker ignores the call. The shutdown timestamp may equal
    /// the last frame's timestamp but not precede it.
    pub fn shutdown(
        &mut self,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<TrackerEvent>, TrackerError> {
        if self.current.is_none() {
            return Ok(None);
        }
        if let Some(previous) = self.last_timestamp {
            if timestamp < previous {
                return Err(TrackerError::InvalidTimestamp {
                    previous,
                    received: timestamp,
                });
            }
        }

        self.last_timestamp = Some(timestamp);
        Ok(self.current.take().map(|mut interval| {
            interval.close_time = Some(timestamp);
            TrackerEvent::IntervalClosed(interval)
        }))
    }

    /// Record the clip path for the open interval.
    pub fn attach_video_reference(&mut self, reference: String) -> Result<(), TrackerError> {
        match self.current.as_mut() {
            Some(interval) => {
                interval.video_reference = Some(reference);
                Ok(())
            }
            None => Err(TrackerError::NotOpen),
        }
    }

    /// Whether an interval is currently open.
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Snapshot of the open interval.
    pub fn current(&self) -> Option<&DetectionInterval> {
        self.current.as_ref()
    }

    /// Timestamp of the last accepted call.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp
    }

    pub fn policy(&self) -> DescriptionPolicy {
        self.policy
    }
}

/// Tracker shared between the capture pipeline and query handlers.
pub type SharedTracker = Arc<Mutex<SessionTracker>>;

/// Create a new shared tracker.
pub fn create_shared_tracker(policy: DescriptionPolicy) -> SharedTracker {
    Arc::new(Mutex::new(SessionTracker::new(policy)))
}
