//! Arena Room - matchmaking and match lifecycle for a real-time team arena game
//!
//! This crate queues parties by playlist and region, forms balanced teams
//! within a widening MMR window, confirms them with ready checks, hosts
//! authoritative match rooms with bot backfill and reconnection, and settles
//! rating changes when a match ends.

pub mod config;
pub mod error;
pub mod gateway;
pub mod matching;
pub mod metrics;
pub mod notifier;
pub mod persistence;
pub mod protocol;
pub mod queue;
pub mod rating;
pub mod ready_check;
pub mod reconnect;
pub mod room;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use notifier::{ChannelNotifier, ClientNotifier, RecordingNotifier};
pub use persistence::PersistenceGateway;
pub use protocol::{ClientEvent, ServerEvent};
pub use room::{EngineFactory, SimulationEngine};
pub use service::{ArenaCore, CoreStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
