//! Main application configuration
//!
//! This module defines the primary configuration structures for the arena-room
//! service, including TOML and environment variable loading and validation.

use crate::config::{MatchmakingConfig, PlaylistConfig, RatingConfig, RoomConfig};
use crate::types::Playlist;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub matchmaking: MatchmakingConfig,
    pub room: RoomConfig,
    pub rating: RatingConfig,
    pub persistence: PersistenceSettings,
}

/// Service-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Bind address for both HTTP listeners
    pub bind_address: String,
    /// Port for health check and metrics endpoints
    pub health_port: u16,
    /// Port for the client websocket gateway
    pub gateway_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Which durable backend stores players and match records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    Memory,
    File,
}

/// Persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    pub backend: PersistenceBackend,
    /// Directory holding `players.json` and `matches.jsonl`
    pub data_dir: PathBuf,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "arena-room".to_string(),
            log_level: "info".to_string(),
            bind_address: "0.0.0.0".to_string(),
            health_port: 8080,
            gateway_port: 9000,
            shutdown_timeout_seconds: 10,
        }
    }
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::File,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(raw)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(address) = env::var("BIND_ADDRESS") {
            config.service.bind_address = address;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            config.service.health_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HEALTH_PORT value: {}", port))?;
        }
        if let Ok(port) = env::var("GATEWAY_PORT") {
            config.service.gateway_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid GATEWAY_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Matchmaking settings
        if let Ok(interval) = env::var("SCAN_INTERVAL_MS") {
            config.matchmaking.scan_interval_ms = interval
                .parse()
                .map_err(|_| anyhow!("Invalid SCAN_INTERVAL_MS value: {}", interval))?;
        }
        if let Ok(seconds) = env::var("READY_CHECK_SECONDS") {
            config.matchmaking.ready_check_seconds = seconds
                .parse()
                .map_err(|_| anyhow!("Invalid READY_CHECK_SECONDS value: {}", seconds))?;
        }
        if let Ok(seconds) = env::var("REQUEUE_PRIORITY_SECONDS") {
            config.matchmaking.requeue_priority_seconds = seconds
                .parse()
                .map_err(|_| anyhow!("Invalid REQUEUE_PRIORITY_SECONDS value: {}", seconds))?;
        }
        if let Ok(region) = env::var("DEFAULT_REGION") {
            config.matchmaking.default_region = region;
        }

        // Room settings
        if let Ok(rate) = env::var("TICK_RATE_HZ") {
            config.room.tick_rate_hz = rate
                .parse()
                .map_err(|_| anyhow!("Invalid TICK_RATE_HZ value: {}", rate))?;
        }
        if let Ok(rate) = env::var("SNAPSHOT_RATE_HZ") {
            config.room.snapshot_rate_hz = rate
                .parse()
                .map_err(|_| anyhow!("Invalid SNAPSHOT_RATE_HZ value: {}", rate))?;
        }
        if let Ok(limit) = env::var("SCORE_LIMIT") {
            config.room.score_limit = limit
                .parse()
                .map_err(|_| anyhow!("Invalid SCORE_LIMIT value: {}", limit))?;
        }
        if let Ok(grace) = env::var("RECONNECT_GRACE_SECONDS") {
            config.room.reconnect_grace_seconds = grace
                .parse()
                .map_err(|_| anyhow!("Invalid RECONNECT_GRACE_SECONDS value: {}", grace))?;
        }

        // Rating settings
        if let Ok(k) = env::var("RATING_K_FACTOR") {
            config.rating.k_factor = k
                .parse()
                .map_err(|_| anyhow!("Invalid RATING_K_FACTOR value: {}", k))?;
        }

        // Persistence settings
        if let Ok(backend) = env::var("PERSISTENCE_BACKEND") {
            config.persistence.backend = match backend.to_lowercase().as_str() {
                "memory" => PersistenceBackend::Memory,
                "file" => PersistenceBackend::File,
                _ => return Err(anyhow!("Invalid PERSISTENCE_BACKEND value: {}", backend)),
            };
        }
        if let Ok(dir) = env::var("DATA_DIR") {
            config.persistence.data_dir = PathBuf::from(dir);
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Address the health server binds to
    pub fn health_address(&self) -> String {
        format!("{}:{}", self.service.bind_address, self.service.health_port)
    }

    /// Address the client gateway binds to
    pub fn gateway_address(&self) -> String {
        format!("{}:{}", self.service.bind_address, self.service.gateway_port)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.health_port == 0 || config.service.gateway_port == 0 {
        return Err(anyhow!("Ports cannot be 0"));
    }
    if config.service.health_port == config.service.gateway_port {
        return Err(anyhow!("Health and gateway ports must differ"));
    }

    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    if config.persistence.backend == PersistenceBackend::File
        && config.persistence.data_dir.as_os_str().is_empty()
    {
        return Err(anyhow!("Data directory cannot be empty for the file backend"));
    }

    config.matchmaking.validate()?;
    config.room.validate()?;
    config.rating.validate()?;

    for playlist in Playlist::ALL {
        PlaylistConfig::get(playlist).validate()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.health_address(), "0.0.0.0:8080");
        assert_eq!(config.gateway_address(), "0.0.0.0:9000");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let raw = r#"
            [service]
            log_level = "debug"

            [room]
            score_limit = 5

            [persistence]
            backend = "memory"
        "#;
        let config = AppConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.service.log_level, "debug");
        assert_eq!(config.room.score_limit, 5);
        assert_eq!(config.room.tick_rate_hz, 60);
        assert_eq!(config.persistence.backend, PersistenceBackend::Memory);
        assert_eq!(config.matchmaking.mmr_window.max, 600.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.service.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.service.gateway_port = config.service.health_port;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.room.snapshot_rate_hz = 120;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.persistence.data_dir = PathBuf::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_toml_with_invalid_section_rejected() {
        let raw = r#"
            [rating]
            rating_floor = 5000.0
        "#;
        assert!(AppConfig::from_toml_str(raw).is_err());
    }
}
