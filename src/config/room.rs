//! Room simulation and lifetime configuration

use crate::error::{MatchmakingError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by every live room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    pub tick_rate_hz: u32,
    /// Snapshot broadcast rate, at most the tick rate
    pub snapshot_rate_hz: u32,
    /// Input older than this is replaced by neutral input
    pub input_staleness_ms: u64,
    pub fire_cooldown_ms: u64,
    pub score_limit: u32,
    pub max_duration_seconds: u64,
    /// How long a disconnected member may come back before counting as abandoned
    pub reconnect_grace_seconds: u64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            snapshot_rate_hz: 20,
            input_staleness_ms: 250,
            fire_cooldown_ms: 400,
            score_limit: 7,
            max_duration_seconds: 300,
            reconnect_grace_seconds: 30,
        }
    }
}

impl RoomConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz.max(1) as f64)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.snapshot_rate_hz.max(1) as f64)
    }

    pub fn input_staleness(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.input_staleness_ms as i64)
    }

    pub fn fire_cooldown(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.fire_cooldown_ms as i64)
    }

    pub fn max_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_duration_seconds as i64)
    }

    pub fn reconnect_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reconnect_grace_seconds as i64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_rate_hz == 0 {
            return Err(MatchmakingError::ConfigurationError {
                message: "tick_rate_hz must be greater than 0".to_string(),
            }
            .into());
        }
        if self.snapshot_rate_hz == 0 || self.snapshot_rate_hz > self.tick_rate_hz {
            return Err(MatchmakingError::ConfigurationError {
                message: "snapshot_rate_hz must be between 1 and tick_rate_hz".to_string(),
            }
            .into());
        }
        if self.score_limit == 0 {
            return Err(MatchmakingError::ConfigurationError {
                message: "score_limit must be greater than 0".to_string(),
            }
            .into());
        }
        if self.max_duration_seconds == 0 {
            return Err(MatchmakingError::ConfigurationError {
                message: "max_duration_seconds must be greater than 0".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
