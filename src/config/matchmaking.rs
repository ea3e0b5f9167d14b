//! Queue, search and ready-check configuration

use crate::error::{MatchmakingError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Growth schedule of an entry's acceptable skill gap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MmrWindowConfig {
    /// Window for an entry that just joined
    pub base: f64,
    /// Growth applied once per elapsed interval
    pub step: f64,
    pub step_interval_seconds: u64,
    /// Hard cap on the window
    pub max: f64,
}

impl Default for MmrWindowConfig {
    fn default() -> Self {
        Self {
            base: 200.0,
            step: 50.0,
            step_interval_seconds: 10,
            max: 600.0,
        }
    }
}

impl MmrWindowConfig {
    /// Widen quickly for low-population regions
    pub fn quick_matches() -> Self {
        Self {
            base: 300.0,
            step: 100.0,
            step_interval_seconds: 5,
            max: 1000.0,
        }
    }

    /// Keep matches tight at the cost of longer waits
    pub fn strict_matching() -> Self {
        Self {
            base: 100.0,
            step: 25.0,
            step_interval_seconds: 15,
            max: 400.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.base < 0.0 || self.step < 0.0 {
            return Err(MatchmakingError::ConfigurationError {
                message: "mmr window base and step must be non-negative".to_string(),
            }
            .into());
        }
        if self.base > self.max {
            return Err(MatchmakingError::ConfigurationError {
                message: "mmr window base must not exceed max".to_string(),
            }
            .into());
        }
        if self.step_interval_seconds == 0 {
            return Err(MatchmakingError::ConfigurationError {
                message: "mmr window step interval must be greater than 0".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Matchmaking settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// Period of the bucket scan timer
    pub scan_interval_ms: u64,
    /// Only the oldest N entries of a bucket are searched
    pub search_window: usize,
    pub ready_check_seconds: u64,
    /// How far back an accepting member's join time is moved on re-queue
    pub requeue_priority_seconds: u64,
    pub latency_probe_interval_seconds: u64,
    /// Bounds applied to the max-ping a client may declare
    pub min_ping_limit_ms: u32,
    pub max_ping_limit_ms: u32,
    /// Region used when a request names none
    pub default_region: String,
    pub mmr_window: MmrWindowConfig,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: 500,
            search_window: 12,
            ready_check_seconds: 15,
            requeue_priority_seconds: 30,
            latency_probe_interval_seconds: 5,
            min_ping_limit_ms: 20,
            max_ping_limit_ms: 1000,
            default_region: "global".to_string(),
            mmr_window: MmrWindowConfig::default(),
        }
    }
}

impl MatchmakingConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn ready_check_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ready_check_seconds as i64)
    }

    pub fn requeue_priority(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.requeue_priority_seconds as i64)
    }

    pub fn latency_probe_interval(&self) -> Duration {
        Duration::from_secs(self.latency_probe_interval_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_ms == 0 {
            return Err(MatchmakingError::ConfigurationError {
                message: "scan_interval_ms must be greater than 0".to_string(),
            }
            .into());
        }
        if self.search_window < 2 {
            return Err(MatchmakingError::ConfigurationError {
                message: "search_window must cover at least 2 entries".to_string(),
            }
            .into());
        }
        if self.ready_check_seconds == 0 {
            return Err(MatchmakingError::ConfigurationError {
                message: "ready_check_seconds must be greater than 0".to_string(),
            }
            .into());
        }
        if self.latency_probe_interval_seconds == 0 {
            return Err(MatchmakingError::ConfigurationError {
                message: "latency_probe_interval_seconds must be greater than 0".to_string(),
            }
            .into());
        }
        if self.min_ping_limit_ms > self.max_ping_limit_ms {
            return Err(MatchmakingError::ConfigurationError {
                message: "min_ping_limit_ms must not exceed max_ping_limit_ms".to_string(),
            }
            .into());
        }
        if self.default_region.trim().is_empty() {
            return Err(MatchmakingError::ConfigurationError {
                message: "default_region cannot be empty".to_string(),
            }
            .into());
        }
        self.mmr_window.validate()
    }
}
