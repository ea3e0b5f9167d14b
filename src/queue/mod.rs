//! Bucketed matchmaking queues
//!
//! One bucket per (playlist, region), ordered oldest join first, plus the MMR
//! window policy that widens acceptable skill gaps over time.

pub mod bucket;
pub mod manager;
pub mod window;

pub use bucket::{Bucket, QueueEntry};
pub use manager::{
    EnqueueOutcome, PositionReport, QueueApplicant, QueueManager, QueueRequest, QueueStats,
};
pub use window::MmrWindowPolicy;
