//! Wildwatch Agent - camera-side detection logging.
//!
//! This library turns a stream of camera frames into logged detection
//! intervals. Each frame is described by a vision model, the description is
//! reduced to a yes/no presence signal, and a session tracker converts the
//! signal into intervals with open and close timestamps.
//!
//! # Guarantees
//!
//! - **One open interval**: a tracker never has more than one interval open
//! - **Ordered events**: opened and closed events strictly alternate
//! - **No lost closes**: store writes are retried until they succeed
//! - **Bounded memory**: capture drops the oldest frame when inference lags
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Wildwatch Agent                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │  Collector  │──▶│ FrameQueue  │──▶│  Inference  │             │
//! │  │  (thread)   │   │(drop-oldest)│   │  (Ollama)   │             │
//! │  └─────────────┘   └─────────────┘   └─────────────┘             │
//! │         │                                   │                    │
//! │         ▼                                   ▼                    │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │  Live feed  │   │  LogStore   │◀──│   Tracker   │──▶ Footage  │
//! │  │ /video_feed │   │   (JSONL)   │   │  + Signal   │             │
//! │  └─────────────┘   └─────────────┘   └─────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use wildwatch_agent::core::{DescriptionPolicy, SessionTracker, TrackerEvent};
//!
//! let mut tracker = SessionTracker::new(DescriptionPolicy::KeepFirst);
//! let t0 = Utc.with_ymd_and_hms(2025, 3, 13, 21, 0, 0).unwrap();
//! let t1 = Utc.with_ymd_and_hms(2025, 3, 13, 21, 0, 5).unwrap();
//!
//! let opened = tracker.observe(true, "a person", t0).unwrap();
//! assert!(matches!(opened, Some(TrackerEvent::IntervalOpened(_))));
//!
//! let closed = tracker.observe(false, "empty trail", t1).unwrap();
//! assert_eq!(closed.unwrap().interval().close_time, Some(t1));
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod inference;
pub mod pipeline;
pub mod recorder;
pub mod stats;
pub mod store;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use collector::{Collector, CollectorConfig, CollectorError, DirectorySource, Frame, FrameSource};
pub use config::{Config, ConfigError, InferenceConfig};
pub use core::{
    DescriptionPolicy, DetectionInterval, KeywordExtractor, SessionTracker, SignalExtractor,
    TrackerError, TrackerEvent,
};
pub use inference::{FixedInference, InferenceError, InferenceService};
pub use pipeline::{Pipeline, PipelineConfig, PipelineControl, PipelineError};
pub use recorder::{MjpegFileSink, SinkError, VideoSink};
pub use stats::{PipelineStats, SharedStats, StatsSnapshot};
pub use store::{JsonlLogStore, LogRecord, LogStore, MemoryLogStore, RecordMapper, StoreError};

// Ollama re-exports (when enabled)
#[cfg(feature = "ollama")]
pub use inference::{BlockingOllamaClient, OllamaClient};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
