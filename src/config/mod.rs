//! Configuration management for the arena-room service
//!
//! This module handles configuration loading from TOML files and environment
//! variables, validation, and default values for the matchmaking service.

pub mod app;
pub mod matchmaking;
pub mod playlist;
pub mod rating;
pub mod room;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, PersistenceBackend, PersistenceSettings, ServiceSettings};
pub use matchmaking::{MatchmakingConfig, MmrWindowConfig};
pub use playlist::PlaylistConfig;
pub use rating::RatingConfig;
pub use room::RoomConfig;
