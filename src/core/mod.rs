//! Core functionality for the wildwatch agent.
//!
//! This module contains:
//! - Presence signal extraction from classifier descriptions
//! - The detection session tracker
//! - Aggregate analysis over stored detections

pub mod analysis;
pub mod signal;
pub mod tracker;

// Re-export commonly used types
pub use analysis::{analyze, AnalysisReport, DailyCount, DurationSummary};
pub use signal::{Debouncer, KeywordExtractor, SignalExtractor};
pub use tracker::{
    create_shared_tracker, DescriptionPolicy, DetectionInterval, SessionTracker, SharedTracker,
    TrackerError, TrackerEvent,
};
