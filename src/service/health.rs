//! Health check endpoints and monitoring
//!
//! This module provides health check functionality for the arena-room
//! service, including readiness and liveness probes.

use crate::service::app::ServiceHandle;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub connections: usize,
    /// Parties currently waiting
    pub parties_queued: usize,
    pub pending_ready_checks: usize,
    /// Rooms currently running
    pub live_rooms: usize,
    /// Rooms started since service start
    pub matches_started: u64,
    /// Rooms settled since service start
    pub matches_ended: u64,
    pub reconnects_accepted: u64,
    /// Name of the persistence backend in use
    pub persistence_backend: String,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(service: &ServiceHandle) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        let service_check = Self::check_service_running(service);
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        for check in [Self::check_core(service), Self::check_persistence(service)] {
            if check.status == HealthStatus::Unhealthy {
                overall_status = HealthStatus::Unhealthy;
            } else if check.status == HealthStatus::Degraded
                && overall_status == HealthStatus::Healthy
            {
                overall_status = HealthStatus::Degraded;
            }
            checks.push(check);
        }

        let stats = Self::gather_service_stats(service);

        Ok(HealthCheck {
            status: overall_status,
            service: service.name().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(service: &ServiceHandle) -> Result<HealthStatus> {
        if service.is_running() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can take connections
    pub async fn readiness_check(service: &ServiceHandle) -> Result<HealthStatus> {
        if !service.is_running() {
            return Ok(HealthStatus::Unhealthy);
        }
        match Self::check_core(service).status {
            HealthStatus::Unhealthy => Ok(HealthStatus::Unhealthy),
            _ => Ok(Self::check_persistence(service).status),
        }
    }

    fn check_service_running(service: &ServiceHandle) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if service.is_running() {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// The core publishes stats on every scan; an unreadable cell means it crashed mid-write
    fn check_core(service: &ServiceHandle) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match service.stats() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => (HealthStatus::Unhealthy, Some(e.to_string())),
        };

        ComponentCheck {
            name: "arena_core".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_persistence(service: &ServiceHandle) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if service.persistence_degraded() {
            (
                HealthStatus::Degraded,
                Some("Durable storage failed, writing to memory".to_string()),
            )
        } else {
            (HealthStatus::Healthy, None)
        };

        ComponentCheck {
            name: "persistence".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn gather_service_stats(service: &ServiceHandle) -> ServiceStats {
        let backend = service.persistence().backend_name().to_string();
        match service.stats() {
            Ok(stats) => ServiceStats {
                connections: stats.connections,
                parties_queued: stats.parties_queued,
                pending_ready_checks: stats.pending_ready_checks,
                live_rooms: stats.live_rooms,
                matches_started: stats.matches_started,
                matches_ended: stats.matches_ended,
                reconnects_accepted: stats.reconnects_accepted,
                persistence_backend: backend,
            },
            Err(e) => {
                debug!("Failed to read core stats for health check: {}", e);
                ServiceStats {
                    persistence_backend: backend,
                    ..ServiceStats::default()
                }
            }
        }
    }
}

/// Convert health check to JSON string
impl HealthCheck {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryGateway;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn handle() -> ServiceHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        ServiceHandle::new("arena-room", tx, Arc::new(InMemoryGateway::default()), None)
    }

    #[tokio::test]
    async fn test_stopped_service_is_unhealthy() {
        let service = handle();
        let health = HealthCheck::check(&service).await.unwrap();
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(
            HealthCheck::liveness_check(&service).await.unwrap(),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            HealthCheck::readiness_check(&service).await.unwrap(),
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_running_service_is_healthy() {
        let service = handle();
        service.set_running(true);
        let health = HealthCheck::check(&service).await.unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.checks.len(), 3);
        assert_eq!(health.stats.persistence_backend, "memory");

        let json = health.to_json().unwrap();
        assert!(json.contains("\"status\": \"healthy\""));
    }
}
