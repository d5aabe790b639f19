//! Properties of the detection session tracker over long signal sequences.

use chrono::{DateTime, Duration, TimeZone, Utc};
use wildwatch_agent::core::{DescriptionPolicy, SessionTracker, TrackerError, TrackerEvent};

/// Small deterministic generator so failures are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next_bool(&mut self) -> bool {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) & 1 == 1
    }
}

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 13, 18, 0, 0).unwrap()
}

fn run_sequence(seed: u64, len: usize, policy: DescriptionPolicy) -> Vec<TrackerEvent> {
    let mut rng = Lcg(seed);
    let mut tracker = SessionTracker::new(policy);
    let mut events = Vec::new();

    for i in 0..len {
        let signal = rng.next_bool();
        let ts = base() + Duration::milliseconds(100 * i as i64);
        if let Some(event) = tracker.observe(signal, &format!("frame {i}"), ts).unwrap() {
            events.push(event);
        }
        // At most one interval open, and only while the tracker says so
        assert_eq!(tracker.is_open(), tracker.current().is_some());
    }
    if let Some(event) = tracker.shutdown(base() + Duration::hours(1)).unwrap() {
        events.push(event);
    }
    assert!(!tracker.is_open());
    events
}

#[test]
fn test_events_alternate_starting_with_open() {
    for seed in 1..50 {
        let events = run_sequence(seed, 500, DescriptionPolicy::KeepFirst);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.is_opened(), i % 2 == 0, "seed {seed}, event {i}");
        }
        // Shutdown leaves nothing open, so the list ends with a close
        assert!(events.len() % 2 == 0);
    }
}

#[test]
fn test_event_timestamps_strictly_increase() {
    for seed in 1..50 {
        let events = run_sequence(seed, 300, DescriptionPolicy::KeepLatest);
        for pair in events.windows(2) {
            assert!(pair[0].timestamp() < pair[1].timestamp(), "seed {seed}");
        }
    }
}

#[test]
fn test_closed_intervals_are_well_formed() {
    for seed in 1..50 {
        let events = run_sequence(seed, 300, DescriptionPolicy::KeepFirst);
        for pair in events.chunks(2) {
            let (opened, closed) = (pair[0].interval(), pair[1].interval());
            assert_eq!(opened.id, closed.id);
            assert!(opened.close_time.is_none());

            let close = closed.close_time.unwrap();
            assert!(closed.open_time <= close);
            // Keep-first: the description is the one from the opening frame
            assert_eq!(opened.description, closed.description);
        }
    }
}

#[test]
fn test_intervals_never_overlap() {
    let events = run_sequence(7, 2000, DescriptionPolicy::KeepFirst);
    let closed: Vec<_> = events
        .iter()
        .filter(|e| !e.is_opened())
        .map(|e| e.interval().clone())
        .collect();

    for pair in closed.windows(2) {
        assert!(pair[0].close_time.unwrap() < pair[1].open_time);
    }
}

#[test]
fn test_rejected_timestamp_leaves_state_untouched() {
    let mut rng = Lcg(42);
    let mut tracker = SessionTracker::new(DescriptionPolicy::KeepLatest);

    for i in 0..200 {
        let ts = base() + Duration::seconds(i);
        tracker.observe(rng.next_bool(), "frame", ts).unwrap();

        let open_before = tracker.is_open();
        let current_before = tracker.current().cloned();

        let stale = base() + Duration::seconds(i - 1);
        let err = tracker.observe(rng.next_bool(), "stale", stale).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidTimestamp { .. }));

        assert_eq!(tracker.is_open(), open_before);
        assert_eq!(tracker.current().cloned(), current_before);
    }
}

#[test]
fn test_constant_signal_opens_at_most_once() {
    let mut tracker = SessionTracker::new(DescriptionPolicy::KeepFirst);
    let mut opened = 0;
    for i in 0..100 {
        if let Some(event) = tracker
            .observe(true, "people", base() + Duration::seconds(i))
            .unwrap()
        {
            assert!(event.is_opened());
            opened += 1;
        }
    }
    assert_eq!(opened, 1);
    assert!(tracker.is_open());
}
