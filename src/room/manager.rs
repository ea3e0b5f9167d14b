//! Room manager for the set of live matches
//!
//! Owns every active room: creation from a confirmed ready-check, input
//! routing, ticking, snapshot broadcast, and teardown with rating settlement.
//! Match records go to the persistence writer through a channel so no tick
//! waits on storage.

use crate::config::RoomConfig;
use crate::error::{MatchmakingError, Result};
use crate::notifier::ClientNotifier;
use crate::persistence::{MatchMemberRecord, MatchRecord, PersistenceJob, PersistenceSender};
use crate::protocol::{PlayerInput, ServerEvent};
use crate::rating::RatingService;
use crate::ready_check::ReadyCheck;
use crate::room::bot::HeuristicPilot;
use crate::room::engine::EngineFactory;
use crate::room::instance::{Room, RoomEnding, RoomMember, RoomState};
use crate::types::{ConnectionId, EndReason, MatchTiming, RatingChange, RoomId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Statistics about room manager operations
#[derive(Debug, Clone, Default)]
pub struct RoomStats {
    /// Total number of rooms created
    pub rooms_created: u64,
    /// Total number of rooms ended
    pub rooms_ended: u64,
    /// Members that left or ran out of grace
    pub members_abandoned: u64,
    pub disconnects: u64,
    /// Ticks run across all rooms
    pub ticks: u64,
    pub snapshots_sent: u64,
}

/// Result of tearing down one room
#[derive(Debug, Clone)]
pub struct RoomSettlement {
    pub room_id: RoomId,
    pub record: MatchRecord,
    pub changes: Vec<RatingChange>,
    /// Connections still attached when the room ended
    pub released: Vec<ConnectionId>,
}

pub struct RoomManager {
    rooms: HashMap<RoomId, Room>,
    by_connection: HashMap<ConnectionId, RoomId>,
    config: RoomConfig,
    engines: Arc<dyn EngineFactory>,
    notifier: Arc<dyn ClientNotifier>,
    rating: RatingService,
    persistence: PersistenceSender,
    stats: RoomStats,
}

impl RoomManager {
    pub fn new(
        config: RoomConfig,
        engines: Arc<dyn EngineFactory>,
        notifier: Arc<dyn ClientNotifier>,
        rating: RatingService,
        persistence: PersistenceSender,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            rooms: HashMap::new(),
            by_connection: HashMap::new(),
            config,
            engines,
            notifier,
            rating,
            persistence,
            stats: RoomStats::default(),
        })
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn stats(&self) -> &RoomStats {
        &self.stats
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room(&self, room_id: RoomId) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    pub fn room_mut(&mut self, room_id: RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(&room_id)
    }

    pub fn room_of(&self, connection_id: ConnectionId) -> Option<RoomId> {
        self.by_connection.get(&connection_id).copied()
    }

    /// True when the connection is seated in a live room
    pub fn is_seated(&self, connection_id: ConnectionId) -> bool {
        self.by_connection.contains_key(&connection_id)
    }

    pub fn notifier(&self) -> &Arc<dyn ClientNotifier> {
        &self.notifier
    }

    pub(crate) fn bind_connection(&mut self, connection_id: ConnectionId, room_id: RoomId) {
        self.by_connection.insert(connection_id, room_id);
    }

    pub(crate) fn unbind_connection(&mut self, connection_id: ConnectionId) {
        self.by_connection.remove(&connection_id);
    }

    /// Start a room for a ready-check everyone accepted
    pub fn create_room(&mut self, mut check: ReadyCheck, now: DateTime<Utc>) -> Result<RoomId> {
        if self.rooms.contains_key(&check.id) {
            return Err(MatchmakingError::InvalidRequest {
                reason: format!("room {} already exists", check.id),
            }
            .into());
        }
        if !check.confirm() {
            return Err(MatchmakingError::InvalidRequest {
                reason: format!("ready-check {} is not awaiting a room", check.id),
            }
            .into());
        }

        let room_id = check.id;
        let playlist = check.key.playlist;
        let members: Vec<RoomMember> = check
            .members
            .into_iter()
            .map(|m| RoomMember {
                connection_id: Some(m.entry.connection_id),
                player_id: m.entry.party_id,
                nickname: m.entry.nickname,
                team: m.team,
                seats: m.seats,
                party_size: m.entry.party_size,
                rating: m.entry.rating,
                reconnect_token: Some(m.reconnect_token),
                connected_at: Some(now),
                disconnected_at: None,
                reconnect_count: 0,
                left: false,
            })
            .collect();

        let engine = self.engines.create(check.seed, playlist);
        let mut room = Room::new(
            room_id,
            playlist,
            check.key.region.clone(),
            check.seed,
            members,
            engine,
            Box::new(HeuristicPilot::default()),
            self.config.clone(),
            now,
        );
        room.start(now);

        let roster = room.roster();
        for member in room.members() {
            let Some(connection_id) = member.connection_id else {
                continue;
            };
            self.by_connection.insert(connection_id, room_id);
            self.notifier.send(
                connection_id,
                ServerEvent::MatchFound {
                    room_id,
                    seed: room.seed(),
                    assigned_seats: member.seats.clone(),
                    reconnect_token: member.reconnect_token.clone().unwrap_or_default(),
                    roster: roster.clone(),
                },
            );
        }

        info!(
            "Room {} created for {} with {} members (seed {})",
            room_id,
            check.key,
            room.members().len(),
            room.seed()
        );
        self.rooms.insert(room_id, room);
        self.stats.rooms_created += 1;
        Ok(room_id)
    }

    /// Route a player's input to the room it is seated in
    pub fn submit_input(
        &mut self,
        connection_id: ConnectionId,
        input: &PlayerInput,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(room_id) = self.room_of(connection_id) else {
            return false;
        };
        if room_id != input.room_id {
            debug!(
                "Input from {} names room {} but it is seated in {}",
                connection_id, input.room_id, room_id
            );
            return false;
        }
        self.rooms
            .get_mut(&room_id)
            .map(|room| room.submit_input(connection_id, input, now))
            .unwrap_or(false)
    }

    /// Advance every live room one step, settling the ones that end
    pub fn tick(&mut self, delta_seconds: f64, now: DateTime<Utc>) -> Vec<RoomSettlement> {
        let mut endings = Vec::new();

        for (room_id, room) in self.rooms.iter_mut() {
            let outcome = room.tick(delta_seconds, now);
            self.stats.ticks += 1;

            if let Some((sequence, snapshot)) = outcome.snapshot {
                let connections = room.connected_connections();
                self.stats.snapshots_sent += connections.len() as u64;
                self.notifier.broadcast(
                    &connections,
                    &ServerEvent::WorldSnapshot {
                        room_id: *room_id,
                        snapshot,
                        sequence,
                    },
                );
            }

            if let Some(ending) = outcome.ending {
                endings.push((*room_id, ending));
            }
        }

        endings
            .into_iter()
            .filter_map(|(room_id, ending)| self.finalize(room_id, ending))
            .collect()
    }

    /// A member's connection dropped; the seat goes to a bot until it returns
    pub fn disconnect(&mut self, connection_id: ConnectionId, now: DateTime<Utc>) -> bool {
        let Some(room_id) = self.by_connection.remove(&connection_id) else {
            return false;
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return false;
        };
        let Some((index, seats)) = room.disconnect(connection_id, now) else {
            return false;
        };

        info!(
            "Connection {} dropped from room {}, seats {:?} held for {}s",
            connection_id,
            room_id,
            seats,
            self.config.reconnect_grace_seconds
        );
        self.stats.disconnects += 1;
        self.notifier.broadcast(
            &room.other_connections(index),
            &ServerEvent::Presence {
                seats,
                connected: false,
            },
        );
        true
    }

    /// A member quits: abandoned at once, token revoked, bot takes over
    pub fn leave(&mut self, connection_id: ConnectionId, now: DateTime<Utc>) -> bool {
        let Some(room_id) = self.by_connection.remove(&connection_id) else {
            return false;
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return false;
        };
        let Some((index, seats)) = room.leave(connection_id, now) else {
            return false;
        };

        info!(
            "Connection {} left room {}, seats {:?} go to bots",
            connection_id, room_id, seats
        );
        self.stats.members_abandoned += 1;
        self.notifier.broadcast(
            &room.other_connections(index),
            &ServerEvent::PlayerLeft {
                seats,
                reason: "left".to_string(),
            },
        );
        true
    }

    /// End a room for an outside reason; `None` when it is gone or already ended
    pub fn end_room(
        &mut self,
        room_id: RoomId,
        reason: EndReason,
        now: DateTime<Utc>,
    ) -> Option<RoomSettlement> {
        let room = self.rooms.get_mut(&room_id)?;
        let winner = room.score().leader();
        let ending = room.end(reason, winner, now)?;
        self.finalize(room_id, ending)
    }

    /// Force every live room to end with a server-shutdown reason
    pub fn force_end_all(&mut self, now: DateTime<Utc>) -> Vec<RoomSettlement> {
        let mut ids: Vec<RoomId> = self.rooms.keys().copied().collect();
        ids.sort();
        if !ids.is_empty() {
            warn!("Force-ending {} live rooms", ids.len());
        }
        ids.into_iter()
            .filter_map(|room_id| self.end_room(room_id, EndReason::ServerShutdown, now))
            .collect()
    }

    /// Settle, persist, notify and remove an ended room
    fn finalize(&mut self, room_id: RoomId, ending: RoomEnding) -> Option<RoomSettlement> {
        let room = self.rooms.remove(&room_id)?;
        if room.state() != RoomState::Ended {
            error!("Room {} finalized without ending", room_id);
        }

        let mut released = Vec::new();
        for member in room.members() {
            if let Some(connection_id) = member.connection_id {
                self.by_connection.remove(&connection_id);
                if member.is_connected() {
                    released.push(connection_id);
                }
            }
        }

        // leavers were counted when they left
        let grace = room.grace();
        self.stats.members_abandoned += room
            .members()
            .iter()
            .filter(|m| !m.left && m.is_abandoned(ending.ended_at, grace))
            .count() as u64;

        let settlement_members = room.settlement_members(ending.ended_at);

        let changes = match self.rating.settle(&settlement_members, ending.winner) {
            Ok(changes) => changes,
            Err(e) => {
                error!("Rating settlement failed for room {}: {}", room_id, e);
                Vec::new()
            }
        };

        let record = MatchRecord {
            id: room_id,
            playlist: room.playlist(),
            region: room.region().to_string(),
            seed: room.seed(),
            score: ending.score,
            winner_team: ending.winner,
            end_reason: ending.reason,
            timing: MatchTiming {
                started_at: ending.started_at,
                ended_at: ending.ended_at,
            },
            members: changes
                .iter()
                .map(|change| MatchMemberRecord::from_change(room_id, change))
                .collect(),
        };

        if self
            .persistence
            .send(PersistenceJob::CommitMatch(record.clone()))
            .is_err()
        {
            error!(
                "Persistence writer is gone, match {} was not stored",
                room_id
            );
        }

        self.notifier.broadcast(
            &released,
            &ServerEvent::MatchEnded {
                reason: ending.reason,
                winner_team: ending.winner,
                score: ending.score,
                rating_changes: changes.clone(),
            },
        );

        info!(
            "Room {} ended ({}): score {}, winner {:?}",
            room_id, ending.reason, ending.score, ending.winner
        );
        self.stats.rooms_ended += 1;

        Some(RoomSettlement {
            room_id,
            record,
            changes,
            released,
        })
    }
}
