//! Room instance implementation and lifecycle
//!
//! A room owns one simulation engine, the member table built from a confirmed
//! ready-check, and the per-seat input and cooldown tracking that feeds the
//! engine every tick.

use crate::config::{PlaylistConfig, RoomConfig};
use crate::protocol::PlayerInput;
use crate::rating::SettlementMember;
use crate::room::bot::BotPilot;
use crate::room::engine::{SimulationEngine, TickInput, WorldSnapshot};
use crate::types::{
    ConnectionId, EndReason, PlayerId, Playlist, RoomId, RosterEntry, Score, SeatIndex, Team,
    ENGINE_SEATS,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Possible states of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    /// Built but not ticking yet
    Forming,
    /// Simulation running
    Active,
    /// Finished (terminal state)
    Ended,
}

/// One party seated in a room
#[derive(Debug, Clone, PartialEq)]
pub struct RoomMember {
    pub connection_id: Option<ConnectionId>,
    pub player_id: PlayerId,
    pub nickname: String,
    pub team: Team,
    pub seats: Vec<SeatIndex>,
    pub party_size: usize,
    pub rating: f64,
    /// `None` once revoked by leaving
    pub reconnect_token: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub reconnect_count: u32,
    /// Explicitly left the match
    pub left: bool,
}

impl RoomMember {
    pub fn is_connected(&self) -> bool {
        self.connection_id.is_some() && !self.left
    }

    /// Left, or disconnected continuously for longer than the grace window
    pub fn is_abandoned(&self, now: DateTime<Utc>, grace: chrono::Duration) -> bool {
        if self.left {
            return true;
        }
        match (self.connection_id, self.disconnected_at) {
            (None, Some(since)) => now - since > grace,
            _ => false,
        }
    }

    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            player_id: self.player_id.clone(),
            nickname: self.nickname.clone(),
            team: self.team,
            seats: self.seats.clone(),
            party_size: self.party_size,
            rating: self.rating,
            connected: self.is_connected(),
        }
    }
}

/// How and when a room ended
#[derive(Debug, Clone, PartialEq)]
pub struct RoomEnding {
    pub reason: EndReason,
    pub winner: Option<Team>,
    pub score: Score,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// What one tick produced
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    /// Sequence-numbered snapshot due for broadcast
    pub snapshot: Option<(u64, WorldSnapshot)>,
    pub ending: Option<RoomEnding>,
}

pub struct Room {
    id: RoomId,
    playlist: Playlist,
    region: String,
    seed: u64,
    state: RoomState,
    config: RoomConfig,
    engine: Box<dyn SimulationEngine>,
    pilot: Box<dyn BotPilot>,
    members: Vec<RoomMember>,
    /// Member index owning each seat
    seat_owner: [Option<usize>; ENGINE_SEATS],
    inactive: [bool; ENGINE_SEATS],
    inputs: [Option<(f32, DateTime<Utc>)>; ENGINE_SEATS],
    pending_fires: Vec<SeatIndex>,
    last_fire: [Option<DateTime<Utc>>; ENGINE_SEATS],
    score: Score,
    started_at: DateTime<Utc>,
    sequence: u64,
    snapshot_accumulator: f64,
    latest: WorldSnapshot,
}

impl Room {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: RoomId,
        playlist: Playlist,
        region: String,
        seed: u64,
        members: Vec<RoomMember>,
        mut engine: Box<dyn SimulationEngine>,
        pilot: Box<dyn BotPilot>,
        config: RoomConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let layout = PlaylistConfig::get(playlist);
        let mut inactive = [false; ENGINE_SEATS];
        for seat in layout.inactive_seats() {
            inactive[seat] = true;
            engine.deactivate_seat(seat);
        }

        let mut seat_owner = [None; ENGINE_SEATS];
        for (index, member) in members.iter().enumerate() {
            for &seat in &member.seats {
                if seat < ENGINE_SEATS {
                    seat_owner[seat] = Some(index);
                }
            }
        }

        let latest = engine.current_snapshot();
        Self {
            id,
            playlist,
            region,
            seed,
            state: RoomState::Forming,
            config,
            engine,
            pilot,
            members,
            seat_owner,
            inactive,
            inputs: [None; ENGINE_SEATS],
            pending_fires: Vec::new(),
            last_fire: [None; ENGINE_SEATS],
            score: Score::default(),
            started_at: now,
            sequence: 0,
            snapshot_accumulator: 0.0,
            latest,
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        if self.state == RoomState::Forming {
            self.state = RoomState::Active;
            self.started_at = now;
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn playlist(&self) -> Playlist {
        self.playlist
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn latest_snapshot(&self) -> &WorldSnapshot {
        &self.latest
    }

    pub fn members(&self) -> &[RoomMember] {
        &self.members
    }

    pub fn member(&self, index: usize) -> Option<&RoomMember> {
        self.members.get(index)
    }

    pub fn is_inactive(&self, seat: SeatIndex) -> bool {
        self.inactive.get(seat).copied().unwrap_or(true)
    }

    /// Member index owning a seat
    pub fn seat_owner(&self, seat: SeatIndex) -> Option<usize> {
        self.seat_owner.get(seat).copied().flatten()
    }

    pub fn member_index_by_connection(&self, connection_id: ConnectionId) -> Option<usize> {
        self.members
            .iter()
            .position(|m| m.connection_id == Some(connection_id))
    }

    pub fn member_index_by_token(&self, token: &str) -> Option<usize> {
        self.members
            .iter()
            .position(|m| m.reconnect_token.as_deref() == Some(token))
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.members.iter().map(|m| m.roster_entry()).collect()
    }

    pub fn connected_connections(&self) -> Vec<ConnectionId> {
        self.members
            .iter()
            .filter(|m| m.is_connected())
            .filter_map(|m| m.connection_id)
            .collect()
    }

    /// Connected members except the given one
    pub fn other_connections(&self, member_index: usize) -> Vec<ConnectionId> {
        self.members
            .iter()
            .enumerate()
            .filter(|(i, m)| *i != member_index && m.is_connected())
            .filter_map(|(_, m)| m.connection_id)
            .collect()
    }

    /// Store the latest input from a connected member for the seats it owns
    pub fn submit_input(
        &mut self,
        connection_id: ConnectionId,
        input: &PlayerInput,
        now: DateTime<Utc>,
    ) -> bool {
        if self.state != RoomState::Active || input.room_id != self.id {
            return false;
        }
        let Some(index) = self.member_index_by_connection(connection_id) else {
            return false;
        };
        if !self.members[index].is_connected() {
            return false;
        }

        let owns = |seat: SeatIndex, room: &Room| {
            room.seat_owner(seat) == Some(index) && !room.is_inactive(seat)
        };

        let mut accepted = false;
        for &(seat, axis) in &input.axes {
            if owns(seat, self) {
                self.inputs[seat] = Some((axis, now));
                accepted = true;
            }
        }
        for &seat in &input.fires {
            if owns(seat, self) && !self.pending_fires.contains(&seat) {
                self.pending_fires.push(seat);
                accepted = true;
            }
        }
        accepted
    }

    /// Fire for a seat if its cooldown has elapsed, recording the shot
    fn try_fire(&mut self, seat: SeatIndex, now: DateTime<Utc>) -> bool {
        let ready = match self.last_fire[seat] {
            Some(last) => now - last >= self.config.fire_cooldown(),
            None => true,
        };
        if ready {
            self.last_fire[seat] = Some(now);
        }
        ready
    }

    fn seat_is_human(&self, seat: SeatIndex) -> bool {
        self.seat_owner(seat)
            .and_then(|index| self.members.get(index))
            .map(|m| m.is_connected())
            .unwrap_or(false)
    }

    fn collect_input(&mut self, now: DateTime<Utc>) -> TickInput {
        let mut input = TickInput::default();
        let fires = std::mem::take(&mut self.pending_fires);
        let staleness = self.config.input_staleness();

        for seat in 0..ENGINE_SEATS {
            if self.inactive[seat] {
                continue;
            }
            if self.seat_is_human(seat) {
                input.axes[seat] = match self.inputs[seat] {
                    Some((axis, received)) if now - received <= staleness => axis,
                    _ => 0.0,
                };
                if fires.contains(&seat) && self.try_fire(seat, now) {
                    input.fires.push(seat);
                }
            } else {
                let command = self.pilot.steer(seat, &self.latest);
                input.axes[seat] = command.axis.clamp(-1.0, 1.0);
                if command.fire && self.try_fire(seat, now) {
                    input.fires.push(seat);
                }
            }
        }
        input
    }

    /// Advance the simulation one step
    pub fn tick(&mut self, delta_seconds: f64, now: DateTime<Utc>) -> TickOutcome {
        if self.state != RoomState::Active {
            return TickOutcome::default();
        }

        for seat in 0..ENGINE_SEATS {
            if self.inactive[seat] {
                self.engine.deactivate_seat(seat);
            }
        }

        let input = self.collect_input(now);
        self.latest = self.engine.advance(delta_seconds, &input);
        self.score = self.latest.score;

        let mut outcome = TickOutcome::default();
        let interval = self.config.snapshot_interval().as_secs_f64();
        self.snapshot_accumulator += delta_seconds;
        if self.snapshot_accumulator >= interval {
            self.snapshot_accumulator -= interval;
            if self.snapshot_accumulator >= interval {
                self.snapshot_accumulator = 0.0;
            }
            self.sequence += 1;
            outcome.snapshot = Some((self.sequence, self.latest.clone()));
        }

        if let Some((reason, winner)) = self.evaluate_end(now) {
            outcome.ending = self.end(reason, winner, now);
        }
        outcome
    }

    /// First satisfied end condition: score limit, then time limit, then abandonment
    pub fn evaluate_end(&self, now: DateTime<Utc>) -> Option<(EndReason, Option<Team>)> {
        if self.state == RoomState::Ended {
            return None;
        }

        let limit = self.config.score_limit;
        if self.score.a >= limit || self.score.b >= limit {
            return Some((EndReason::ScoreLimit, self.score.leader()));
        }

        if now - self.started_at > self.config.max_duration() {
            return Some((EndReason::TimeLimit, self.score.leader()));
        }

        let grace = self.config.reconnect_grace();
        let abandoned: Vec<Team> = Team::ALL
            .into_iter()
            .filter(|&team| {
                let mut members = self.members.iter().filter(|m| m.team == team).peekable();
                members.peek().is_some() && members.all(|m| m.is_abandoned(now, grace))
            })
            .collect();
        match abandoned.as_slice() {
            [] => None,
            [team] => Some((EndReason::Abandoned, Some(team.opponent()))),
            _ => Some((EndReason::Abandoned, None)),
        }
    }

    /// Mark the room ended; `None` when it already was
    pub fn end(
        &mut self,
        reason: EndReason,
        winner: Option<Team>,
        now: DateTime<Utc>,
    ) -> Option<RoomEnding> {
        if self.state == RoomState::Ended {
            return None;
        }
        self.state = RoomState::Ended;
        Some(RoomEnding {
            reason,
            winner,
            score: self.score,
            started_at: self.started_at,
            ended_at: now,
        })
    }

    /// Detach a member's connection, returning its seats
    pub fn disconnect(
        &mut self,
        connection_id: ConnectionId,
        now: DateTime<Utc>,
    ) -> Option<(usize, Vec<SeatIndex>)> {
        let index = self.member_index_by_connection(connection_id)?;
        let member = &mut self.members[index];
        member.connection_id = None;
        member.disconnected_at = Some(now);
        Some((index, member.seats.clone()))
    }

    /// A member quits for good: abandoned at once and its token revoked
    pub fn leave(
        &mut self,
        connection_id: ConnectionId,
        now: DateTime<Utc>,
    ) -> Option<(usize, Vec<SeatIndex>)> {
        let index = self.member_index_by_connection(connection_id)?;
        let member = &mut self.members[index];
        member.connection_id = None;
        member.disconnected_at = Some(now);
        member.reconnect_token = None;
        member.left = true;
        for &seat in &member.seats {
            if seat < ENGINE_SEATS {
                self.inputs[seat] = None;
            }
        }
        Some((index, self.members[index].seats.clone()))
    }

    /// Seconds a member has been disconnected, zero when connected
    pub fn disconnected_for(&self, index: usize, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let member = self.members.get(index)?;
        if member.connection_id.is_some() {
            return Some(chrono::Duration::zero());
        }
        member.disconnected_at.map(|since| now - since)
    }

    /// Attach a member to a new connection, returning the connection it replaced
    pub fn reattach(
        &mut self,
        index: usize,
        connection_id: ConnectionId,
        token: String,
        now: DateTime<Utc>,
    ) -> Option<Option<ConnectionId>> {
        let member = self.members.get_mut(index)?;
        let previous = member.connection_id.replace(connection_id);
        member.reconnect_token = Some(token);
        member.disconnected_at = None;
        member.connected_at = Some(now);
        member.reconnect_count += 1;
        Some(previous)
    }

    pub fn grace(&self) -> chrono::Duration {
        self.config.reconnect_grace()
    }

    /// Member view handed to the rating settlement
    pub fn settlement_members(&self, now: DateTime<Utc>) -> Vec<SettlementMember> {
        let grace = self.config.reconnect_grace();
        self.members
            .iter()
            .map(|m| SettlementMember {
                player_id: m.player_id.clone(),
                nickname: m.nickname.clone(),
                team: m.team,
                seats: m.seats.clone(),
                party_size: m.party_size,
                rating: m.rating,
                abandoned: m.is_abandoned(now, grace),
                reconnect_count: m.reconnect_count,
            })
            .collect()
    }
}
