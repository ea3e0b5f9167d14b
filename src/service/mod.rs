//! Service layer for the arena-room service
//!
//! This module contains the single-owner arena core, the application state
//! that runs it, and health reporting.

pub mod app;
pub mod core;
pub mod health;

pub use self::core::{ArenaCore, CoreStats, Session};
pub use app::{run_core, AppState, CoreCommand, CoreTiming, ServiceError, ServiceHandle};
pub use health::{HealthCheck, HealthStatus};
