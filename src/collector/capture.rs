//! Capture stage: pulls frames from a source on a background thread.

use crate::collector::queue::FrameQueue;
use crate::collector::source::{CollectorError, FrameSource};
use crate::collector::types::LiveFeed;
use crate::stats::SharedStats;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Capture stage configuration.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Minimum time between two frames
    pub frame_interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(50),
        }
    }
}

/// Runs a [`FrameSource`] on its own thread and feeds a [`FrameQueue`].
///
/// Every frame is also published to the live feed, whether or not it later
/// survives the queue.
pub struct Collector {
    config: CollectorConfig,
    queue: FrameQueue,
    live: LiveFeed,
    stats: SharedStats,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl Collector {
    pub fn new(config: CollectorConfig, queue: FrameQueue, live: LiveFeed, stats: SharedStats) -> Self {
        Self {
            config,
            queue,
            live,
            stats,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Start capturing from `source` in a background thread.
    pub fn start(&mut self, mut source: Box<dyn FrameSource>) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        // Reap a thread that ended on its own.
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let queue = self.queue.clone();
        let live = self.live.clone();
        let stats = self.stats.clone();
        let interval = self.config.frame_interval;

        let handle = thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                let tick = Instant::now();
                match source.next_frame() {
                    Ok(Some(frame)) => {
                        stats.record_frame_captured();
                        live.send_replace(Some(frame.clone()));
                        for _ in 0..queue.push(frame) {
                            stats.record_frame_dropped();
                        }
                    }
                    Ok(None) => {
                        tracing::info!("Frame source exhausted");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Frame capture failed: {e}");
                        break;
                    }
                }

                if let Some(rest) = interval.checked_sub(tick.elapsed()) {
                    thread::sleep(rest);
                }
            }
            running.store(false, Ordering::SeqCst);
        });

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop capturing and wait for the capture thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    /// Whether the capture thread is still producing frames.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn queue(&self) -> &FrameQueue {
        &self.queue
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{create_live_feed, Frame, MonotonicClock};
    use crate::stats::create_shared_stats;

    struct CountingSource {
        remaining: u64,
        sequence: u64,
        clock: MonotonicClock,
    }

    impl FrameSource for CountingSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, CollectorError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            let frame = Frame::new(self.sequence, self.clock.now(), vec![0xFF, 0xD8]);
            self.sequence += 1;
            Ok(Some(frame))
        }
    }

    #[test]
    fn test_capture_until_exhausted() {
        let stats = create_shared_stats();
        let live = create_live_feed();
        let config = CollectorConfig {
            frame_interval: Duration::from_millis(1),
        };
        let mut collector = Collector::new(config, FrameQueue::new(2), live.clone(), stats.clone());

        collector
            .start(Box::new(CountingSource {
                remaining: 5,
                sequence: 0,
                clock: MonotonicClock::new(),
            }))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while collector.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        collector.stop();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_captured, 5);
        assert_eq!(snapshot.frames_dropped, 3);
        assert_eq!(collector.queue().len(), 2);
        assert_eq!(live.borrow().as_ref().map(|f| f.sequence), Some(4));
    }

    #[test]
    fn test_double_start_rejected() {
        let mut collector = Collector::new(
            CollectorConfig {
                frame_interval: Duration::from_secs(1),
            },
            FrameQueue::new(1),
            create_live_feed(),
            create_shared_stats(),
        );
        let source = || {
            Box::new(CountingSource {
                remaining: u64::MAX,
                sequence: 0,
                clock: MonotonicClock::new(),
            })
        };

        collector.start(source()).unwrap();
        assert!(matches!(
            collector.start(source()),
            Err(CollectorError::AlreadyRunning)
        ));
        collector.stop();
        assert!(!collector.is_running());
    }
}
