//! Rating settlement using the Elo system
//!
//! This module provides the two-team rating calculator and the settlement
//! service that turns a match outcome into per-member rating changes.

pub mod calculator;
pub mod service;

// Re-export commonly used types
pub use calculator::{EloRatingCalculator, RatingCalculator};
pub use service::{RatingService, SettlementMember};
