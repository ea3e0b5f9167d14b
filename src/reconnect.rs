//! Reconnection into live rooms
//!
//! A member rejoins by presenting its room id and current reconnect token
//! within the grace window. Tokens are single-use: a successful rejoin rotates
//! the token and the new one travels in `match-rejoined`.

use crate::notifier::ClientNotifier;
use crate::protocol::ServerEvent;
use crate::room::{RoomManager, RoomState};
use crate::types::{ConnectionId, RoomId, SeatIndex};
use crate::utils::generate_token;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Why a reconnection attempt was refused; the text is shown to the player
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconnectError {
    #[error("That match is no longer running")]
    RoomNotFound,

    #[error("Reconnect token is not valid for this match")]
    InvalidToken,

    #[error("The reconnect window for this match has closed")]
    GraceExpired,
}

/// A successful rejoin
#[derive(Debug, Clone, PartialEq)]
pub struct Rejoined {
    pub room_id: RoomId,
    pub seats: Vec<SeatIndex>,
    /// Connection that held the member before, now detached
    pub replaced: Option<ConnectionId>,
}

/// Statistics about reconnection attempts
#[derive(Debug, Clone, Default)]
pub struct ReconnectStats {
    pub accepted: u64,
    pub rejected: u64,
}

pub struct ReconnectionManager {
    notifier: Arc<dyn ClientNotifier>,
    stats: ReconnectStats,
}

impl ReconnectionManager {
    pub fn new(notifier: Arc<dyn ClientNotifier>) -> Self {
        Self {
            notifier,
            stats: ReconnectStats::default(),
        }
    }

    pub fn stats(&self) -> &ReconnectStats {
        &self.stats
    }

    /// Validate credentials and reattach the member to `connection_id`
    pub fn attempt(
        &mut self,
        rooms: &mut RoomManager,
        room_id: RoomId,
        token: &str,
        connection_id: ConnectionId,
        now: DateTime<Utc>,
    ) -> std::result::Result<Rejoined, ReconnectError> {
        let result = Self::reattach(rooms, room_id, token, connection_id, now);
        match &result {
            Ok(rejoined) => {
                self.stats.accepted += 1;
                info!(
                    "Connection {} rejoined room {} on seats {:?}",
                    connection_id, room_id, rejoined.seats
                );
            }
            Err(e) => {
                self.stats.rejected += 1;
                warn!(
                    "Reconnection of {} to room {} rejected: {}",
                    connection_id, room_id, e
                );
            }
        }
        result
    }

    fn reattach(
        rooms: &mut RoomManager,
        room_id: RoomId,
        token: &str,
        connection_id: ConnectionId,
        now: DateTime<Utc>,
    ) -> std::result::Result<Rejoined, ReconnectError> {
        let notifier = rooms.notifier().clone();
        let room = rooms
            .room_mut(room_id)
            .filter(|room| room.state() == RoomState::Active)
            .ok_or(ReconnectError::RoomNotFound)?;

        if token.is_empty() {
            return Err(ReconnectError::InvalidToken);
        }
        let index = room
            .member_index_by_token(token)
            .ok_or(ReconnectError::InvalidToken)?;

        let away = room
            .disconnected_for(index, now)
            .unwrap_or_else(chrono::Duration::zero);
        if away > room.grace() {
            return Err(ReconnectError::GraceExpired);
        }

        let fresh_token = generate_token();
        let replaced = room
            .reattach(index, connection_id, fresh_token.clone(), now)
            .ok_or(ReconnectError::InvalidToken)?
            .filter(|previous| *previous != connection_id);

        let seats = room
            .member(index)
            .map(|m| m.seats.clone())
            .unwrap_or_default();

        if let Some(previous) = replaced {
            notifier.send(
                previous,
                ServerEvent::notice("This match was resumed from another connection"),
            );
        }

        notifier.send(
            connection_id,
            ServerEvent::MatchRejoined {
                room_id,
                assigned_seats: seats.clone(),
                reconnect_token: fresh_token,
                roster: room.roster(),
                snapshot: room.latest_snapshot().clone(),
            },
        );
        notifier.broadcast(
            &room.other_connections(index),
            &ServerEvent::Presence {
                seats: seats.clone(),
                connected: true,
            },
        );

        if let Some(previous) = replaced {
            rooms.unbind_connection(previous);
        }
        rooms.bind_connection(connection_id, room_id);

        Ok(Rejoined {
            room_id,
            seats,
            replaced,
        })
    }
}
