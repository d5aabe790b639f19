//! Frame types shared by the capture and inference stages.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;

/// One captured, JPEG-encoded frame.
#[derive(Clone)]
pub struct Frame {
    /// Position in the capture sequence, starting at 0
    pub sequence: u64,
    /// Capture instant
    pub timestamp: DateTime<Utc>,
    /// Encoded image
    pub jpeg: Arc<[u8]>,
}

impl Frame {
    pub fn new(sequence: u64, timestamp: DateTime<Utc>, jpeg: impl Into<Arc<[u8]>>) -> Self {
        Self {
            sequence,
            timestamp,
            jpeg: jpeg.into(),
        }
    }

    /// Whether the payload starts with a JPEG SOI marker.
    pub fn is_jpeg(&self) -> bool {
        self.jpeg.starts_with(&[0xFF, 0xD8])
    }

    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.jpeg.len())
            .finish()
    }
}

/// Wall clock that never repeats or goes backwards.
///
/// Frames stamped by one clock are strictly increasing in time, which the
/// session tracker requires.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Option<DateTime<Utc>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time, nudged forward by a microsecond if needed.
    pub fn now(&mut self) -> DateTime<Utc> {
        self.advance(Utc::now())
    }

    fn advance(&mut self, candidate: DateTime<Utc>) -> DateTime<Utc> {
        let next = match self.last {
            Some(last) if candidate <= last => last + Duration::microseconds(1),
            _ => candidate,
        };
        self.last = Some(next);
        next
    }
}

/// Latest captured frame, for the live view.
pub type LiveFeed = Arc<watch::Sender<Option<Frame>>>;

/// Subscriber side of the live view.
pub type LiveFeedReceiver = watch::Receiver<Option<Frame>>;

/// Create an empty live feed.
pub fn create_live_feed() -> LiveFeed {
    let (sender, _) = watch::channel(None);
    Arc::new(sender)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_jpeg_marker() {
        let frame = Frame::new(0, Utc::now(), vec![0xFF, 0xD8, 0xFF, 0xE0]);
        assert!(frame.is_jpeg());
        assert_eq!(frame.len(), 4);

        let frame = Frame::new(1, Utc::now(), vec![0x89, 0x50]);
        assert!(!frame.is_jpeg());
    }

    #[test]
    fn test_monotonic_clock_never_repeats() {
        let mut clock = MonotonicClock::new();
        let t = Utc.with_ymd_and_hms(2025, 3, 13, 0, 0, 0).unwrap();

        let a = clock.advance(t);
        let b = clock.advance(t);
        let c = clock.advance(t - Duration::seconds(1));
        assert!(a < b && b < c);

        let later = t + Duration::seconds(5);
        assert_eq!(clock.advance(later), later);
    }

    #[test]
    fn test_live_feed_publishes_latest() {
        let feed = create_live_feed();
        let rx = feed.subscribe();
        feed.send_replace(Some(Frame::new(7, Utc::now(), vec![0xFF, 0xD8])));
        assert_eq!(rx.borrow().as_ref().map(|f| f.sequence), Some(7));
    }
}
