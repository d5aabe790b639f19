//! Run statistics for the wildwatch agent.

pub mod counters;

pub use counters::{
    create_shared_stats, create_shared_stats_with_persistence, PipelineStats, SharedStats,
    StatsSnapshot,
};
