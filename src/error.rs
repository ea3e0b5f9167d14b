//! Error types for the arena matchmaking service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

use crate::types::{ConnectionId, MatchId, RoomId};

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Connection {connection_id} is already queued or playing")]
    AlreadyEngaged { connection_id: ConnectionId },

    #[error("Connection {connection_id} is not queued")]
    NotQueued { connection_id: ConnectionId },

    #[error("Ready-check not found: {match_id}")]
    MatchNotFound { match_id: MatchId },

    #[error("Room not found: {room_id}")]
    RoomNotFound { room_id: RoomId },

    #[error("Player not found: {player_id}")]
    PlayerNotFound { player_id: String },

    #[error("Rating calculation failed: {reason}")]
    RatingCalculationFailed { reason: String },

    #[error("Persistence failed: {message}")]
    PersistenceFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
