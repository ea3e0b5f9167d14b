//! The single-owner arena core
//!
//! Every piece of matchmaking and room state lives here and is only touched
//! from the service loop, so no handler needs a lock. Inbound client events,
//! the scan timer, the tick timer and the probe timer all funnel into the
//! methods below with an explicit `now`.

use crate::config::{AppConfig, PlaylistConfig};
use crate::error::Result;
use crate::matching::MatchFinder;
use crate::metrics::MetricsCollector;
use crate::notifier::ClientNotifier;
use crate::persistence::{sanitize_nickname, PersistenceJob, PersistenceSender, PlayerIdentity};
use crate::protocol::{join_request, ClientEvent, PlayerInput, ServerEvent};
use crate::queue::{PositionReport, QueueApplicant, QueueManager, QueueRequest};
use crate::rating::RatingService;
use crate::ready_check::{CancelReason, Cancellation, ReadyCheckCoordinator, ReadyOutcome};
use crate::reconnect::ReconnectionManager;
use crate::room::{EngineFactory, RoomManager, RoomSettlement};
use crate::types::{ConnectionId, MatchId, MatchResult, PlayerId, PlayerStats, RoomId};
use crate::utils::elapsed_seconds;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Highest round-trip accepted from a latency probe
const MAX_PROBE_RTT_MS: i64 = 10_000;

/// One transport connection bound to a resolved player
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub player_id: PlayerId,
    pub nickname: String,
    /// Cached rating, updated in memory when a match settles
    pub rating: f64,
    pub stats: PlayerStats,
    /// Last observed probe round-trip
    pub latency_ms: u32,
    pub connected_at: DateTime<Utc>,
}

/// Statistics about the core, published for health and metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoreStats {
    /// Open sessions
    pub connections: usize,
    /// Parties waiting across all buckets
    pub parties_queued: usize,
    /// Ready-checks awaiting answers
    pub pending_ready_checks: usize,
    /// Rooms currently running
    pub live_rooms: usize,
    /// Combinations handed to the ready-check coordinator
    pub matches_proposed: u64,
    /// Rooms started from confirmed checks
    pub matches_started: u64,
    /// Rooms settled
    pub matches_ended: u64,
    pub reconnects_accepted: u64,
    pub reconnects_rejected: u64,
    /// Client messages refused with a notice
    pub messages_rejected: u64,
}

pub struct ArenaCore {
    sessions: HashMap<ConnectionId, Session>,
    queue: QueueManager,
    finder: MatchFinder,
    ready: ReadyCheckCoordinator,
    rooms: RoomManager,
    reconnect: ReconnectionManager,
    notifier: Arc<dyn ClientNotifier>,
    persistence: PersistenceSender,
    metrics: Arc<MetricsCollector>,
    stats: CoreStats,
}

impl ArenaCore {
    pub fn new(
        config: &AppConfig,
        engines: Arc<dyn EngineFactory>,
        notifier: Arc<dyn ClientNotifier>,
        persistence: PersistenceSender,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self> {
        let queue = QueueManager::new(config.matchmaking.clone())?;
        let finder = MatchFinder::new(
            config.matchmaking.search_window,
            queue.window_policy().clone(),
        );
        let ready = ReadyCheckCoordinator::new(
            config.matchmaking.ready_check_duration(),
            notifier.clone(),
        );
        let rooms = RoomManager::new(
            config.room.clone(),
            engines,
            notifier.clone(),
            RatingService::new(config.rating.clone())?,
            persistence.clone(),
        )?;
        let reconnect = ReconnectionManager::new(notifier.clone());

        Ok(Self {
            sessions: HashMap::new(),
            queue,
            finder,
            ready,
            rooms,
            reconnect,
            notifier,
            persistence,
            metrics,
            stats: CoreStats::default(),
        })
    }

    pub fn stats(&self) -> &CoreStats {
        &self.stats
    }

    pub fn session(&self, connection_id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&connection_id)
    }

    pub fn queue(&self) -> &QueueManager {
        &self.queue
    }

    pub fn ready_checks(&self) -> &ReadyCheckCoordinator {
        &self.ready
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    /// Register a connection for a resolved identity, optionally rejoining a room
    pub fn connect(
        &mut self,
        connection_id: ConnectionId,
        identity: PlayerIdentity,
        rejoin: Option<(RoomId, String)>,
        now: DateTime<Utc>,
    ) {
        let player = identity.player;
        info!(
            "Connection {} opened for player '{}' ({}){}",
            connection_id,
            player.id,
            player.nickname,
            if identity.created { ", new player" } else { "" }
        );

        self.notifier.send(
            connection_id,
            ServerEvent::Identity {
                player_id: player.id.clone(),
                session_token: identity.session_token,
                nickname: player.nickname.clone(),
                rating: player.rating,
                stats: player.stats.clone(),
            },
        );
        self.sessions.insert(
            connection_id,
            Session {
                player_id: player.id,
                nickname: player.nickname,
                rating: player.rating,
                stats: player.stats,
                latency_ms: 0,
                connected_at: now,
            },
        );

        if let Some((room_id, token)) = rejoin {
            match self
                .reconnect
                .attempt(&mut self.rooms, room_id, &token, connection_id, now)
            {
                Ok(_) => {
                    self.stats.reconnects_accepted += 1;
                    self.metrics.record_reconnect(true);
                }
                Err(e) => {
                    self.stats.reconnects_rejected += 1;
                    self.metrics.record_reconnect(false);
                    self.notifier
                        .send(connection_id, ServerEvent::notice(e.to_string()));
                }
            }
        }
        self.refresh_stats();
    }

    /// Handle one validated client message
    pub fn handle(&mut self, connection_id: ConnectionId, event: ClientEvent, now: DateTime<Utc>) {
        if !self.sessions.contains_key(&connection_id) {
            debug!("Dropping message from unknown connection {}", connection_id);
            return;
        }

        let kind = match &event {
            ClientEvent::JoinQueue { .. } => "join-queue",
            ClientEvent::LeaveQueue => "leave-queue",
            ClientEvent::ReadyCheckResponse { .. } => "ready-check-response",
            ClientEvent::LeaveMatch => "leave-match",
            ClientEvent::PlayerInput { .. } => "player-input",
            ClientEvent::LatencyProbeResponse { .. } => "latency-probe-response",
        };

        let accepted = match event {
            ClientEvent::JoinQueue {
                nickname,
                party_size,
                playlist,
                region,
                input_mode,
                max_ping_ms,
            } => {
                let request =
                    join_request(nickname, party_size, playlist, region, input_mode, max_ping_ms);
                self.join_queue(connection_id, request, now)
            }
            ClientEvent::LeaveQueue => self.leave_queue(connection_id, now),
            ClientEvent::ReadyCheckResponse { match_id, accept } => {
                self.ready_response(connection_id, match_id, accept, now)
            }
            ClientEvent::LeaveMatch => self.rooms.leave(connection_id, now),
            ClientEvent::PlayerInput {
                room_id,
                axes,
                fires,
            } => {
                let input = PlayerInput::sanitize(room_id, axes, fires);
                self.rooms.submit_input(connection_id, &input, now)
            }
            ClientEvent::LatencyProbeResponse { sent_at } => {
                self.latency_response(connection_id, sent_at, now)
            }
        };

        // inputs arrive every frame; only count them
        if kind != "player-input" {
            self.metrics.record_message(kind, accepted);
        }
        self.refresh_stats();
    }

    fn join_queue(
        &mut self,
        connection_id: ConnectionId,
        mut request: QueueRequest,
        now: DateTime<Utc>,
    ) -> bool {
        if self.queue.is_queued(connection_id)
            || self.ready.is_pending_member(connection_id)
            || self.rooms.is_seated(connection_id)
        {
            self.reject(connection_id, "You are already queued or in a match");
            return false;
        }
        let Some(session) = self.sessions.get_mut(&connection_id) else {
            return false;
        };

        if !request.nickname.trim().is_empty() {
            let nickname = sanitize_nickname(&request.nickname, &session.player_id);
            if nickname != session.nickname {
                debug!(
                    "Player '{}' renamed from '{}' to '{}'",
                    session.player_id, session.nickname, nickname
                );
                session.nickname = nickname.clone();
                let job = PersistenceJob::UpdateNickname {
                    player_id: session.player_id.clone(),
                    nickname,
                };
                if self.persistence.send(job).is_err() {
                    warn!("Persistence writer is gone, nickname change not stored");
                }
            }
        }
        request.nickname = session.nickname.clone();

        let applicant = QueueApplicant {
            connection_id,
            player_id: session.player_id.clone(),
            rating: session.rating,
            latency_ms: session.latency_ms,
        };

        match self.queue.enqueue(applicant, request, now) {
            Ok(outcome) => {
                if let Some((requested, allowed)) = outcome.clamped_party {
                    self.notifier.send(
                        connection_id,
                        ServerEvent::notice(format!(
                            "Party size {} is not allowed in {}, queued as {}",
                            requested, outcome.key.playlist, allowed
                        )),
                    );
                }
                self.metrics.record_enqueue(outcome.key.playlist);
                self.notifier.send(
                    connection_id,
                    ServerEvent::Queued {
                        position: outcome.position,
                        total: outcome.total,
                        mmr: outcome.rating,
                        mmr_window: outcome.mmr_window,
                    },
                );
                true
            }
            Err(e) => {
                self.reject(connection_id, &e.to_string());
                false
            }
        }
    }

    fn leave_queue(&mut self, connection_id: ConnectionId, now: DateTime<Utc>) -> bool {
        match self.queue.withdraw(connection_id, now) {
            Some((_, reports)) => {
                self.metrics.record_withdrawal();
                self.send_positions(reports);
                true
            }
            None => false,
        }
    }

    fn ready_response(
        &mut self,
        connection_id: ConnectionId,
        match_id: MatchId,
        accept: bool,
        now: DateTime<Utc>,
    ) -> bool {
        match self.ready.respond(connection_id, match_id, accept, now) {
            ReadyOutcome::Updated { .. } => true,
            ReadyOutcome::Confirmed(check) => {
                self.metrics.record_ready_check("confirmed");
                let playlist = check.key.playlist;
                match self.rooms.create_room(check, now) {
                    Ok(_) => {
                        self.stats.matches_started += 1;
                        self.metrics.record_room_created(playlist);
                    }
                    Err(e) => error!("Failed to start room for check {}: {}", match_id, e),
                }
                true
            }
            ReadyOutcome::Cancelled(cancellation) => {
                self.apply_cancellation(cancellation, now);
                true
            }
            ReadyOutcome::Ignored => false,
        }
    }

    fn latency_response(
        &mut self,
        connection_id: ConnectionId,
        sent_at: i64,
        now: DateTime<Utc>,
    ) -> bool {
        let rtt = now
            .timestamp_millis()
            .saturating_sub(sent_at)
            .clamp(0, MAX_PROBE_RTT_MS) as u32;
        let Some(session) = self.sessions.get_mut(&connection_id) else {
            return false;
        };
        session.latency_ms = rtt;
        self.queue.update_latency(connection_id, rtt);
        true
    }

    /// Release everything a closed connection held
    pub fn disconnect(&mut self, connection_id: ConnectionId, now: DateTime<Utc>) {
        if let Some((_, reports)) = self.queue.withdraw(connection_id, now) {
            self.metrics.record_withdrawal();
            self.send_positions(reports);
        }
        if let Some(cancellation) = self.ready.disconnect(connection_id) {
            self.apply_cancellation(cancellation, now);
        }
        self.rooms.disconnect(connection_id, now);

        if let Some(session) = self.sessions.remove(&connection_id) {
            info!(
                "Connection {} of player '{}' closed",
                connection_id, session.player_id
            );
        }
        self.refresh_stats();
    }

    /// One matchmaking pass: expire checks, then search every bucket
    pub fn scan(&mut self, now: DateTime<Utc>) -> usize {
        let timer = self.metrics.start_timer();

        for cancellation in self.ready.expire(now) {
            self.apply_cancellation(cancellation, now);
        }

        let mut proposed = 0;
        for key in self.queue.bucket_keys() {
            let playlist = PlaylistConfig::get(key.playlist);
            while let Some(proposal) =
                self.finder
                    .find_match(self.queue.bucket_entries(&key), playlist, now)
            {
                let connections = proposal.connection_ids();
                let removed = self.queue.remove_matched(&key, &connections);
                if removed.len() != connections.len() {
                    warn!(
                        "Proposal in {} lost {} members before removal",
                        key,
                        connections.len() - removed.len()
                    );
                }

                let waits: Vec<f64> = proposal
                    .members
                    .iter()
                    .map(|m| elapsed_seconds(m.entry.enqueued_at, now))
                    .collect();
                self.metrics
                    .record_proposal(key.playlist, proposal.team_gap, &waits);
                self.ready.create(key.clone(), proposal, now);
                proposed += 1;
            }

            let reports = self.queue.position_report(&key, now);
            self.send_positions(reports);
        }

        self.stats.matches_proposed += proposed as u64;
        self.refresh_stats();
        self.metrics.record_scan(timer.stop());
        proposed
    }

    /// Advance every live room; settled rooms update the cached ratings
    pub fn tick(&mut self, delta_seconds: f64, now: DateTime<Utc>) -> usize {
        let timer = self.metrics.start_timer();
        let settlements = self.rooms.tick(delta_seconds, now);
        let ended = settlements.len();
        self.apply_settlements(settlements);
        self.metrics.record_tick(timer.stop());
        if ended > 0 {
            self.refresh_stats();
        }
        ended
    }

    /// Ask every connection to echo a timestamp
    pub fn send_latency_probes(&self, now: DateTime<Utc>) {
        let probe = ServerEvent::LatencyProbe {
            sent_at: now.timestamp_millis(),
        };
        let connections: Vec<ConnectionId> = self.sessions.keys().copied().collect();
        self.notifier.broadcast(&connections, &probe);
    }

    /// Cancel every check, end every room and empty the queue
    pub fn shutdown(&mut self, now: DateTime<Utc>) -> usize {
        let cancelled = self.ready.cancel_all();
        for _ in &cancelled {
            self.metrics.record_ready_check("shutdown");
        }

        let settlements = self.rooms.force_end_all(now);
        let ended = settlements.len();
        self.apply_settlements(settlements);

        let queued: Vec<ConnectionId> = self
            .sessions
            .keys()
            .copied()
            .filter(|c| self.queue.is_queued(*c))
            .collect();
        for connection_id in &queued {
            self.queue.withdraw(*connection_id, now);
        }
        self.notifier.broadcast(
            &queued,
            &ServerEvent::notice("The server is shutting down, you have been removed from the queue"),
        );

        info!(
            "Core shut down: {} checks cancelled, {} rooms ended, {} parties dequeued",
            cancelled.len(),
            ended,
            queued.len()
        );
        self.refresh_stats();
        ended
    }

    fn apply_cancellation(&mut self, cancellation: Cancellation, now: DateTime<Utc>) {
        let outcome = match &cancellation.reason {
            CancelReason::Declined { .. } => "declined",
            CancelReason::Expired => "expired",
            CancelReason::Disconnected { .. } => "disconnected",
            CancelReason::Shutdown => "shutdown",
        };
        self.metrics.record_ready_check(outcome);

        let mut requeued = 0;
        for entry in cancellation.requeue {
            let connection_id = entry.connection_id;
            if !self.sessions.contains_key(&connection_id) {
                continue;
            }
            match self.queue.requeue_with_priority(entry, now) {
                Ok(outcome) => {
                    requeued += 1;
                    self.notifier.send(
                        connection_id,
                        ServerEvent::Queued {
                            position: outcome.position,
                            total: outcome.total,
                            mmr: outcome.rating,
                            mmr_window: outcome.mmr_window,
                        },
                    );
                }
                Err(e) => warn!("Could not re-queue {}: {}", connection_id, e),
            }
        }
        if requeued > 0 {
            self.metrics.record_requeue(requeued);
        }
        debug!(
            "Check {} cancelled ({}): {} re-queued, {} dropped",
            cancellation.match_id,
            outcome,
            requeued,
            cancellation.dropped.len()
        );
    }

    fn apply_settlements(&mut self, settlements: Vec<RoomSettlement>) {
        for settlement in settlements {
            for change in &settlement.changes {
                for session in self
                    .sessions
                    .values_mut()
                    .filter(|s| s.player_id == change.player_id)
                {
                    session.rating = change.rating_after;
                    session.stats.games += 1;
                    match change.result {
                        MatchResult::Win => session.stats.wins += 1,
                        MatchResult::Loss => session.stats.losses += 1,
                        MatchResult::Draw => {}
                    }
                    if change.abandoned {
                        session.stats.abandons += 1;
                    }
                }
            }

            let abandons = settlement.changes.iter().filter(|c| c.abandoned).count();
            self.metrics.record_room_ended(
                settlement.record.end_reason,
                settlement.record.timing.duration_seconds(),
                abandons,
            );
            self.stats.matches_ended += 1;
        }
    }

    fn send_positions(&self, reports: Vec<PositionReport>) {
        for report in reports {
            self.notifier.send(
                report.connection_id,
                ServerEvent::QueueUpdate {
                    position: report.position,
                    total: report.total,
                    wait_seconds: report.wait_seconds,
                    mmr_window: report.mmr_window,
                },
            );
        }
    }

    fn reject(&mut self, connection_id: ConnectionId, message: &str) {
        self.stats.messages_rejected += 1;
        self.notifier
            .send(connection_id, ServerEvent::notice(message));
    }

    fn refresh_stats(&mut self) {
        self.stats.connections = self.sessions.len();
        self.stats.parties_queued = self.queue.total_queued();
        self.stats.pending_ready_checks = self.ready.pending_count();
        self.stats.live_rooms = self.rooms.room_count();
        self.metrics.update_from_core_stats(&self.stats);
    }
}
