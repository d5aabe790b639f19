//! Detection pipeline.
//!
//! ```text
//! FrameSource ──▶ Collector ──▶ FrameQueue ──▶ InferenceService ──▶ SignalExtractor
//!  (thread)        │ live feed   (drop-oldest)                            │
//!                  ▼                                                      ▼
//!              /video_feed                  LogStore ◀── pending ◀── SessionTracker
//!                                                         writes          │
//!                                                                         ▼
//!                                                                     VideoSink
//! ```
//!
//! Capture runs on its own thread; inference, tracking and persistence run
//! on the thread that calls [`Pipeline::run`], one frame at a time, so the
//! tracker sees frames in timestamp order. Store writes are queued and
//! retried in order until they succeed; a failed write never re-runs the
//! tracker.

use crate::collector::{
    create_live_feed, Collector, CollectorConfig, CollectorError, Frame, FrameQueue, FrameSource,
    LiveFeed,
};
use crate::config::Config;
use crate::core::signal::{Debouncer, SignalExtractor};
use crate::core::tracker::{DescriptionPolicy, SharedTracker, TrackerError, TrackerEvent};
use crate::inference::{InferenceError, InferenceService};
use crate::recorder::VideoSink;
use crate::stats::{create_shared_stats, SharedStats};
use crate::store::{RecordMapper, SharedLogStore, StoreError};
use chrono::{DateTime, Utc};
use crossbeam_channel::RecvTimeoutError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum time between captured frames
    pub frame_interval: Duration,
    /// Frames buffered between capture and inference
    pub queue_capacity: usize,
    /// Consecutive positive frames needed to open an interval
    pub debounce_open_frames: u32,
    /// Consecutive negative frames needed to close an interval
    pub debounce_close_frames: u32,
    /// How long the worker waits for a frame before checking its flags
    pub idle_poll: Duration,
    /// Extra attempts for pending writes when the pipeline stops
    pub final_flush_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(50),
            queue_capacity: 4,
            debounce_open_frames: 1,
            debounce_close_frames: 1,
            idle_poll: Duration::from_millis(100),
            final_flush_attempts: 3,
        }
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            frame_interval: config.frame_interval,
            queue_capacity: config.queue_capacity,
            debounce_open_frames: config.debounce_open_frames,
            debounce_close_frames: config.debounce_close_frames,
            ..Self::default()
        }
    }
}

/// Flags the caller uses to steer a running pipeline.
#[derive(Debug, Clone)]
pub struct PipelineControl {
    /// Cleared to stop the pipeline
    pub running: Arc<AtomicBool>,
    /// Set to suspend detection (open interval is closed, frames discarded)
    pub paused: Arc<AtomicBool>,
}

impl PipelineControl {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

impl Default for PipelineControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from a single pipeline step.
#[derive(Debug)]
pub enum PipelineError {
    Inference(InferenceError),
    Tracker(TrackerError),
    Collector(CollectorError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Inference(e) => write!(f, "{e}"),
            PipelineError::Tracker(e) => write!(f, "{e}"),
            PipelineError::Collector(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<InferenceError> for PipelineError {
    fn from(e: InferenceError) -> Self {
        PipelineError::Inference(e)
    }
}

impl From<TrackerError> for PipelineError {
    fn from(e: TrackerError) -> Self {
        PipelineError::Tracker(e)
    }
}

impl From<CollectorError> for PipelineError {
    fn from(e: CollectorError) -> Self {
        PipelineError::Collector(e)
    }
}

/// The capture → inference → tracking → persistence loop.
pub struct Pipeline {
    config: PipelineConfig,
    tracker: SharedTracker,
    extractor: Box<dyn SignalExtractor>,
    debouncer: Debouncer,
    inference: Box<dyn InferenceService>,
    store: SharedLogStore,
    mapper: RecordMapper,
    policy: DescriptionPolicy,
    sink: Option<Box<dyn VideoSink>>,
    stats: SharedStats,
    live: LiveFeed,
    queue: FrameQueue,
    /// Events whose store write has not succeeded yet, oldest first
    pending: VecDeque<TrackerEvent>,
    paused: bool,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        tracker: SharedTracker,
        extractor: Box<dyn SignalExtractor>,
        inference: Box<dyn InferenceService>,
        store: SharedLogStore,
        mapper: RecordMapper,
    ) -> Self {
        let debouncer = Debouncer::new(config.debounce_open_frames, config.debounce_close_frames);
        let queue = FrameQueue::new(config.queue_capacity);
        let policy = tracker.lock().unwrap_or_else(|e| e.into_inner()).policy();
        Self {
            config,
            tracker,
            extractor,
            debouncer,
            inference,
            store,
            mapper,
            policy,
            sink: None,
            stats: create_shared_stats(),
            live: create_live_feed(),
            queue,
            pending: VecDeque::new(),
            paused: false,
        }
    }

    /// Record footage of open intervals into `sink`.
    pub fn with_video_sink(mut self, sink: Box<dyn VideoSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Count into shared statistics instead of private ones.
    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = stats;
        self
    }

    /// Publish captured frames to an existing live feed.
    pub fn with_live_feed(mut self, live: LiveFeed) -> Self {
        self.live = live;
        self
    }

    pub fn shared_tracker(&self) -> SharedTracker {
        self.tracker.clone()
    }

    pub fn stats(&self) -> SharedStats {
        self.stats.clone()
    }

    pub fn live_feed(&self) -> LiveFeed {
        self.live.clone()
    }

    pub fn store(&self) -> SharedLogStore {
        self.store.clone()
    }

    /// Number of events still waiting for a successful store write.
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Run one frame through inference, signal extraction and the tracker.
    ///
    /// Any resulting event is queued for persistence and written before
    /// returning if the store accepts it. An inference failure skips the
    /// frame without touching the tracker.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<Option<TrackerEvent>, PipelineError> {
        let description = match self.inference.classify(frame) {
            Ok(description) => description,
            Err(e) => {
                self.stats.record_inference_failure();
                self.flush_pending();
                return Err(e.into());
            }
        };
        self.stats.record_frame_classified();
        tracing::debug!("Frame {} description: {}", frame.sequence, description);

        let raw = self.extractor.extract(&description);
        let debounced = self.debouncer.clone();
        let signal = self.debouncer.update(raw);

        let (event, recording) = {
            let mut tracker = self.tracker.lock().unwrap_or_else(|e| e.into_inner());
            let mut event = match tracker.observe(signal, &description, frame.timestamp) {
                Ok(event) => event,
                Err(e) => {
                    // A rejected frame must not count towards the debounce run
                    self.debouncer = debounced;
                    return Err(e.into());
                }
            };

            if let (Some(TrackerEvent::IntervalOpened(interval)), Some(sink)) =
                (event.as_mut(), self.sink.as_mut())
            {
                match sink.begin(interval) {
                    Ok(reference) => {
                        tracker.attach_video_reference(reference.clone())?;
                        interval.video_reference = Some(reference);
                    }
                    Err(e) => tracing::warn!("Could not start footage for interval: {e}"),
                }
            }
            let recording = tracker
                .current()
                .map(|i| i.video_reference.is_some())
                .unwrap_or(false);
            (event, recording)
        };

        if let Some(sink) = self.sink.as_mut() {
            if recording {
                if let Err(e) = sink.write_frame(frame) {
                    tracing::warn!("Could not write frame {} to footage: {e}", frame.sequence);
                }
            } else if matches!(event, Some(TrackerEvent::IntervalClosed(_))) {
                if let Err(e) = sink.finish() {
                    tracing::warn!("Could not finalize footage: {e}");
                }
            }
        }

        if let Some(ref event) = event {
            self.enqueue(event.clone());
        }
        self.flush_pending();
        Ok(event)
    }

    /// Force-close any open interval at `timestamp` and persist the close.
    pub fn shutdown(&mut self, timestamp: DateTime<Utc>) -> Result<Option<TrackerEvent>, PipelineError> {
        let event = {
            let mut tracker = self.tracker.lock().unwrap_or_else(|e| e.into_inner());
            tracker.shutdown(timestamp)?
        };
        self.debouncer.reset();

        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.finish() {
                tracing::warn!("Could not finalize footage: {e}");
            }
        }

        if let Some(ref event) = event {
            self.enqueue(event.clone());
        }
        self.flush_pending();
        Ok(event)
    }

    /// Shutdown timestamp that never precedes the last observed frame.
    fn shutdown_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let tracker = self.tracker.lock().unwrap_or_else(|e| e.into_inner());
        tracker.last_timestamp().map_or(now, |last| last.max(now))
    }

    fn enqueue(&mut self, event: TrackerEvent) {
        let interval = event.interval();
        match &event {
            TrackerEvent::IntervalOpened(_) => {
                self.stats.record_interval_opened();
                tracing::info!(
                    "Detection started at {}: {}",
                    self.mapper.time_of_day(interval.open_time),
                    interval.description
                );
            }
            TrackerEvent::IntervalClosed(_) => {
                self.stats.record_interval_closed();
                tracing::info!(
                    "Detection ended at {} ({}s)",
                    self.mapper.time_of_day(event.timestamp()),
                    interval.duration().map(|d| d.num_seconds()).unwrap_or(0)
                );
            }
        }
        self.pending.push_back(event);
    }

    /// Write pending events in order, stopping at the first failure.
    ///
    /// Returns the number of events still pending.
    pub fn flush_pending(&mut self) -> usize {
        while let Some(event) = self.pending.front() {
            match self.persist(event) {
                Ok(()) => {
                    self.pending.pop_front();
                }
                Err(e) => {
                    self.stats.record_persistence_failure();
                    tracing::warn!(
                        "Store write failed, {} event(s) queued for retry: {e}",
                        self.pending.len()
                    );
                    break;
                }
            }
        }
        self.pending.len()
    }

    fn persist(&self, event: &TrackerEvent) -> Result<(), StoreError> {
        match event {
            TrackerEvent::IntervalOpened(interval) => {
                self.store.insert(&self.mapper.opened_record(interval))
            }
            TrackerEvent::IntervalClosed(interval) => {
                if self.policy == DescriptionPolicy::KeepLatest {
                    self.store.set_description(interval.id, &interval.description)?;
                }
                let closed_at = event.timestamp();
                self.store.close(
                    interval.id,
                    closed_at,
                    &self.mapper.time_of_day(closed_at),
                )
            }
        }
    }

    fn apply_pause(&mut self, paused: bool) {
        if paused == self.paused {
            return;
        }
        self.paused = paused;

        if paused {
            tracing::info!("Detection paused");
            let timestamp = self.shutdown_timestamp();
            if let Err(e) = self.shutdown(timestamp) {
                tracing::error!("Could not close interval on pause: {e}");
            }
            self.queue.clear();
        } else {
            tracing::info!("Detection resumed");
        }
    }

    /// Capture from `source` and process frames until stopped.
    ///
    /// Returns when `control.running` is cleared or the source is exhausted
    /// and the queue drained. The open interval, if any, is closed at the
    /// end and pending writes get a few final attempts.
    pub fn run(
        &mut self,
        source: Box<dyn FrameSource>,
        control: &PipelineControl,
    ) -> Result<(), PipelineError> {
        let mut collector = Collector::new(
            CollectorConfig {
                frame_interval: self.config.frame_interval,
            },
            self.queue.clone(),
            self.live.clone(),
            self.stats.clone(),
        );
        collector.start(source)?;
        tracing::info!("Detection pipeline started");

        while control.is_running() {
            self.apply_pause(control.is_paused());
            if self.paused {
                self.queue.clear();
                if !collector.is_running() {
                    break;
                }
                std::thread::sleep(self.config.idle_poll);
                continue;
            }

            match self.queue.recv_timeout(self.config.idle_poll) {
                Ok(frame) => {
                    if let Err(e) = self.process_frame(&frame) {
                        tracing::warn!("Skipping frame {}: {e}", frame.sequence);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if !collector.is_running() && self.queue.is_empty() {
                        tracing::info!("Frame source finished");
                        break;
                    }
                    self.flush_pending();
                }
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::error!("Frame queue disconnected unexpectedly");
                    break;
                }
            }
        }

        collector.stop();

        let timestamp = self.shutdown_timestamp();
        self.shutdown(timestamp)?;

        for _ in 0..self.config.final_flush_attempts {
            if self.flush_pending() == 0 {
                break;
            }
            std::thread::sleep(self.config.idle_poll);
        }
        if !self.pending.is_empty() {
            tracing::error!(
                "{} detection event(s) could not be stored before exit",
                self.pending.len()
            );
        }

        tracing::info!("Detection pipeline stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signal::KeywordExtractor;
    use crate::core::tracker::{create_shared_tracker, DescriptionPolicy};
    use crate::inference::ScriptedInference;
    use crate::store::{LogStore, MemoryLogStore};
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn frame(secs: i64) -> Frame {
        let t = Utc.with_ymd_and_hms(2025, 3, 13, 20, 0, 0).unwrap() + ChronoDuration::seconds(secs);
        Frame::new(secs as u64, t, vec![0xFF, 0xD8])
    }

    fn pipeline(script: Vec<&str>, store: Arc<MemoryLogStore>) -> Pipeline {
        Pipeline::new(
            PipelineConfig::default(),
            create_shared_tracker(DescriptionPolicy::KeepFirst),
            Box::new(KeywordExtractor::default()),
            Box::new(ScriptedInference::descriptions(script)),
            store,
            RecordMapper::new(chrono_tz::UTC, "test"),
        )
    }

    #[test]
    fn test_frames_become_records() {
        let store = Arc::new(MemoryLogStore::new());
        let mut pipeline = pipeline(
            vec!["an empty field", "a person walking", "a person", "a deer"],
            store.clone(),
        );

        let events: Vec<Option<TrackerEvent>> =
            (0..4).map(|i| pipeline.process_frame(&frame(i)).unwrap()).collect();
        assert!(events[0].is_none());
        assert!(events[1].as_ref().unwrap().is_opened());
        assert!(events[2].is_none());
        assert!(!events[3].as_ref().unwrap().is_opened());

        let records = store.all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].detection_time, "20:00:01");
        assert_eq!(records[0].close_time.as_deref(), Some("20:00:03"));
        assert_eq!(records[0].description, "a person walking");
        assert_eq!(pipeline.stats().snapshot().frames_classified, 4);
    }

    #[test]
    fn test_debounced_pipeline() {
        let store = Arc::new(MemoryLogStore::new());
        let config = PipelineConfig {
            debounce_open_frames: 2,
            ..PipelineConfig::default()
        };
        let mut pipeline = Pipeline::new(
            config,
            create_shared_tracker(DescriptionPolicy::KeepFirst),
            Box::new(KeywordExtractor::default()),
            Box::new(ScriptedInference::descriptions(vec![
                "a person", "nothing", "a person", "people",
            ])),
            store.clone(),
            RecordMapper::new(chrono_tz::UTC, "test"),
        );

        for i in 0..4 {
            pipeline.process_frame(&frame(i)).unwrap();
        }
        let records = store.all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].detection_time, "20:00:03");
        assert_eq!(records[0].description, "people");
    }

    #[test]
    fn test_shutdown_closes_record() {
        let store = Arc::new(MemoryLogStore::new());
        let mut pipeline = pipeline(vec!["a person"], store.clone());

        pipeline.process_frame(&frame(0)).unwrap();
        let closing = frame(9).timestamp;
        let event = pipeline.shutdown(closing).unwrap().unwrap();
        assert_eq!(event.interval().close_time, Some(closing));

        assert!(store.open_records().unwrap().is_empty());
        assert!(pipeline.shutdown(closing).unwrap().is_none());
    }

    #[test]
    fn test_stale_frame_does_not_advance_debouncer() {
        let store = Arc::new(MemoryLogStore::new());
        let config = PipelineConfig {
            debounce_close_frames: 3,
            ..PipelineConfig::default()
        };
        let mut pipeline = Pipeline::new(
            config,
            create_shared_tracker(DescriptionPolicy::KeepFirst),
            Box::new(KeywordExtractor::default()),
            Box::new(ScriptedInference::descriptions(vec![
                "nothing", "a person", "nothing",
            ])),
            store.clone(),
            RecordMapper::new(chrono_tz::UTC, "test"),
        );

        assert!(pipeline.process_frame(&frame(10)).unwrap().is_none());

        let err = pipeline.process_frame(&frame(5)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Tracker(TrackerError::InvalidTimestamp { .. })
        ));
        assert!(!pipeline.debouncer.state());

        // Without a keyword nothing may open
        assert!(pipeline.process_frame(&frame(11)).unwrap().is_none());
        assert!(store.all().unwrap().is_empty());
        assert!(!pipeline.shared_tracker().lock().unwrap().is_open());
    }

    #[test]
    fn test_pause_closes_interval_and_resume_opens_a_new_one() {
        let store = Arc::new(MemoryLogStore::new());
        let mut pipeline = pipeline(
            vec!["a person", "a person", "a person"],
            store.clone(),
        );
        // Ahead of the wall clock, so the pause closes at the last frame
        let base = Utc::now() + ChronoDuration::hours(1);
        let at = |secs: i64| {
            Frame::new(secs as u64, base + ChronoDuration::seconds(secs), vec![0xFF, 0xD8])
        };

        pipeline.process_frame(&at(0)).unwrap();
        pipeline.process_frame(&at(1)).unwrap();
        pipeline.queue.push(at(2));

        pipeline.apply_pause(true);
        assert!(pipeline.queue.is_empty());
        assert!(!pipeline.debouncer.state());
        assert!(!pipeline.shared_tracker().lock().unwrap().is_open());

        let records = store.all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].closed_at, Some(base + ChronoDuration::seconds(1)));

        // Already paused: nothing more to close
        pipeline.apply_pause(true);
        assert_eq!(pipeline.stats().snapshot().intervals_closed, 1);

        pipeline.apply_pause(false);
        let reopened = pipeline.process_frame(&at(3)).unwrap().unwrap();
        assert!(reopened.is_opened());

        let records = store.all().unwrap();
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].id, records[1].id);
        assert!(!records[0].is_open());
        assert!(records[1].is_open());
    }

    #[test]
    fn test_pause_control_flags() {
        let control = PipelineControl::new();
        assert!(control.is_running());
        control.set_paused(true);
        assert!(control.is_paused());
        control.stop();
        assert!(!control.is_running());
    }
}
