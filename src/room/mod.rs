//! Live match rooms
//!
//! This module provides the authoritative match session:
//! - Room instances driving one simulation engine each
//! - Bot backfill for empty or disconnected seats
//! - The room manager that creates, ticks and settles rooms

pub mod bot;
pub mod engine;
pub mod instance;
pub mod manager;

pub use bot::{BotCommand, BotPilot, HeuristicPilot};
pub use engine::{
    DrillEngine, DrillEngineFactory, EngineFactory, ScriptedEngine, ScriptedEngineFactory,
    ScriptedState, SimulationEngine, TickInput, WorldSnapshot,
};
pub use instance::{Room, RoomEnding, RoomMember, RoomState, TickOutcome};
pub use manager::{RoomManager, RoomSettlement, RoomStats};
