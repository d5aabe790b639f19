//! Frame collection for the wildwatch agent.
//!
//! This module provides frame sources, the bounded drop-oldest queue that
//! decouples capture from inference, and the capture thread that connects
//! the two.

pub mod capture;
pub mod queue;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use capture::{Collector, CollectorConfig};
pub use queue::FrameQueue;
pub use source::{CollectorError, DirectorySource, FrameSource, NoopSource};
pub use types::{create_live_feed, Frame, LiveFeed, LiveFeedReceiver, MonotonicClock};
