//! Pipeline counters.
//!
//! Tracks how many frames flowed through each stage and how many intervals
//! were opened, closed and persisted. Counters can be persisted so the
//! `status` command can report cumulative numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current run.
#[derive(Debug)]
pub struct PipelineStats {
    /// Frames delivered by the frame source
    frames_captured: AtomicU64,
    /// Frames discarded by the drop-oldest queue
    frames_dropped: AtomicU64,
    /// Frames the inference service described
    frames_classified: AtomicU64,
    /// Inference calls that failed
    inference_failures: AtomicU64,
    /// Intervals opened
    intervals_opened: AtomicU64,
    /// Intervals closed
    intervals_closed: AtomicU64,
    /// Store writes that failed and were queued for retry
    persistence_failures: AtomicU64,
    /// Run start time
    started_at: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            frames_captured: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            frames_classified: AtomicU64::new(0),
            inference_failures: AtomicU64::new(0),
            intervals_opened: AtomicU64::new(0),
            intervals_closed: AtomicU64::new(0),
            persistence_failures: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create counters that continue from the totals saved at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("Could not load previous pipeline stats: {e}");
        }

        stats
    }

    pub fn record_frame_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_classified(&self) {
        self.frames_classified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference_failure(&self) {
        self.inference_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_interval_opened(&self) {
        self.intervals_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_interval_closed(&self) {
        self.intervals_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_classified: self.frames_classified.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
            intervals_opened: self.intervals_opened.load(Ordering::Relaxed),
            intervals_closed: self.intervals_closed.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Run Statistics:\n\
             - Frames captured: {}\n\
             - Frames dropped (queue full): {}\n\
             - Frames classified: {}\n\
             - Inference failures: {}\n\
             - Intervals opened: {}\n\
             - Intervals closed: {}\n\
             - Store write failures: {}\n\
             - Uptime: {} seconds",
            stats.frames_captured,
            stats.frames_dropped,
            stats.frames_classified,
            stats.inference_failures,
            stats.intervals_opened,
            stats.intervals_closed,
            stats.persistence_failures,
            stats.uptime_secs
        )
    }

    /// Save counters to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.snapshot();
            let persisted = PersistedStats {
                frames_captured: stats.frames_captured,
                frames_dropped: stats.frames_dropped,
                frames_classified: stats.frames_classified,
                inference_failures: stats.inference_failures,
                intervals_opened: stats.intervals_opened,
                intervals_closed: stats.intervals_closed,
                persistence_failures: stats.persistence_failures,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.frames_captured
                    .store(persisted.frames_captured, Ordering::Relaxed);
                self.frames_dropped
                    .store(persisted.frames_dropped, Ordering::Relaxed);
                self.frames_classified
                    .store(persisted.frames_classified, Ordering::Relaxed);
                self.inference_failures
                    .store(persisted.inference_failures, Ordering::Relaxed);
                self.intervals_opened
                    .store(persisted.intervals_opened, Ordering::Relaxed);
                self.intervals_closed
                    .store(persisted.intervals_closed, Ordering::Relaxed);
                self.persistence_failures
                    .store(persisted.persistence_failures, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub frames_classified: u64,
    pub inference_failures: u64,
    pub intervals_opened: u64,
    pub intervals_closed: u64,
    pub persistence_failures: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// On-disk format.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    frames_captured: u64,
    frames_dropped: u64,
    frames_classified: u64,
    inference_failures: u64,
    intervals_opened: u64,
    intervals_closed: u64,
    persistence_failures: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared counters.
pub type SharedStats = Arc<PipelineStats>;

pub fn create_shared_stats() -> SharedStats {
    Arc::new(PipelineStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedStats {
    Arc::new(PipelineStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = PipelineStats::new();
        stats.record_frame_captured();
        stats.record_frame_captured();
        stats.record_frame_dropped();
        stats.record_interval_opened();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_captured, 2);
        assert_eq!(snapshot.frames_dropped, 1);
        assert_eq!(snapshot.intervals_opened, 1);
        assert_eq!(snapshot.intervals_closed, 0);
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("wildwatch-stats-{}", uuid::Uuid::new_v4()))
            .join("stats.json");

        let stats = PipelineStats::with_persistence(path.clone());
        stats.record_frame_classified();
        stats.record_inference_failure();
        stats.save().unwrap();

        let reloaded = PipelineStats::with_persistence(path.clone());
        let snapshot = reloaded.snapshot();
        assert_eq!(snapshot.frames_classified, 1);
        assert_eq!(snapshot.inference_failures, 1);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_summary_format() {
        let summary = PipelineStats::new().summary();
        assert!(summary.contains("Frames captured"));
        assert!(summary.contains("Intervals closed"));
    }
}
