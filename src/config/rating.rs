//! Rating system configuration

use crate::error::{MatchmakingError, Result};
use serde::{Deserialize, Serialize};

/// Elo settlement parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    /// Rating assigned to newly created players
    pub default_rating: f64,
    /// Elo K-factor
    pub k_factor: f64,
    /// Extra rating removed from a member who abandoned
    pub abandon_penalty: f64,
    pub rating_floor: f64,
    pub rating_ceiling: f64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            default_rating: 1000.0,
            k_factor: 32.0,
            abandon_penalty: 15.0,
            rating_floor: 100.0,
            rating_ceiling: 4000.0,
        }
    }
}

impl RatingConfig {
    /// Clamp a rating into the configured bounds
    pub fn clamp(&self, rating: f64) -> f64 {
        rating.clamp(self.rating_floor, self.rating_ceiling)
    }

    pub fn validate(&self) -> Result<()> {
        if self.k_factor <= 0.0 {
            return Err(MatchmakingError::ConfigurationError {
                message: "k_factor must be positive".to_string(),
            }
            .into());
        }
        if self.abandon_penalty < 0.0 {
            return Err(MatchmakingError::ConfigurationError {
                message: "abandon_penalty must be non-negative".to_string(),
            }
            .into());
        }
        if self.rating_floor >= self.rating_ceiling {
            return Err(MatchmakingError::ConfigurationError {
                message: "rating_floor must be below rating_ceiling".to_string(),
            }
            .into());
        }
        if self.default_rating < self.rating_floor || self.default_rating > self.rating_ceiling {
            return Err(MatchmakingError::ConfigurationError {
                message: "default_rating must be within floor/ceiling".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
