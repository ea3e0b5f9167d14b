//! Client gateway
//!
//! Carries the JSON event protocol between clients and the arena core over
//! WebSocket text frames.

pub mod ws;

pub use ws::{router, ConnectParams, GatewayServer, GatewayState};
