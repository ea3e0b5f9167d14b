//! Test fixtures for driving a complete arena core in integration tests

#![allow(dead_code)]

use arena_room::config::AppConfig;
use arena_room::metrics::MetricsCollector;
use arena_room::notifier::RecordingNotifier;
use arena_room::persistence::{
    InMemoryGateway, PersistenceGateway, PersistenceJob, PlayerIdentity,
};
use arena_room::protocol::{ClientEvent, ServerEvent};
use arena_room::room::ScriptedEngineFactory;
use arena_room::service::ArenaCore;
use arena_room::types::{ConnectionId, MatchId, Playlist, RoomId, SeatIndex};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Region every fixture party queues in
pub const REGION: &str = "eu";

/// What a member learns from `match-found`
#[derive(Debug, Clone, PartialEq)]
pub struct SeatGrant {
    pub room_id: RoomId,
    pub seats: Vec<SeatIndex>,
    pub reconnect_token: String,
}

/// An arena core wired to recording collaborators
pub struct TestArena {
    pub core: ArenaCore,
    pub notifier: Arc<RecordingNotifier>,
    pub engines: Arc<ScriptedEngineFactory>,
    pub store: Arc<InMemoryGateway>,
    pub jobs: mpsc::UnboundedReceiver<PersistenceJob>,
    pub now: DateTime<Utc>,
}

impl TestArena {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let notifier = Arc::new(RecordingNotifier::new());
        let engines = Arc::new(ScriptedEngineFactory::new());
        let (tx, jobs) = mpsc::unbounded_channel();
        let core = ArenaCore::new(
            &config,
            engines.clone(),
            notifier.clone(),
            tx,
            Arc::new(MetricsCollector::new().expect("metrics collector")),
        )
        .expect("arena core");

        Self {
            core,
            notifier,
            engines,
            store: Arc::new(InMemoryGateway::new(config.rating.default_rating)),
            jobs,
            now: Utc::now(),
        }
    }

    /// Move the test clock forward
    pub fn advance(&mut self, seconds: i64) {
        self.now += Duration::seconds(seconds);
    }

    /// Create a player with a given rating and open a connection for it
    pub async fn connect_new(&mut self, nickname: &str, rating: f64) -> (ConnectionId, PlayerIdentity) {
        let mut identity = self
            .store
            .get_or_create_player(None, None, nickname.to_string())
            .await
            .expect("player created");
        identity.player.rating = rating;
        self.store
            .insert_player(identity.player.clone())
            .expect("player stored");

        let connection_id = Uuid::new_v4();
        self.core
            .connect(connection_id, identity.clone(), None, self.now);
        (connection_id, identity)
    }

    /// Open a second connection for a known player, optionally rejoining a room
    pub async fn reconnect(
        &mut self,
        identity: &PlayerIdentity,
        rejoin: Option<(RoomId, String)>,
    ) -> ConnectionId {
        let resolved = self
            .store
            .get_or_create_player(
                Some(identity.player.id.clone()),
                Some(identity.session_token.clone()),
                identity.player.nickname.clone(),
            )
            .await
            .expect("player resolved");
        assert!(!resolved.created, "returning player must not be recreated");

        let connection_id = Uuid::new_v4();
        self.core.connect(connection_id, resolved, rejoin, self.now);
        connection_id
    }

    pub fn join(&mut self, connection_id: ConnectionId, playlist: Playlist, party_size: i64) {
        self.core.handle(
            connection_id,
            ClientEvent::JoinQueue {
                nickname: None,
                party_size: Some(party_size),
                playlist: Some(playlist),
                region: Some(REGION.to_string()),
                input_mode: None,
                max_ping_ms: None,
            },
            self.now,
        );
    }

    pub fn respond(&mut self, connection_id: ConnectionId, match_id: MatchId, accept: bool) {
        self.core.handle(
            connection_id,
            ClientEvent::ReadyCheckResponse { match_id, accept },
            self.now,
        );
    }

    /// Match id of the latest ready-check sent to a connection
    pub fn ready_check_id(&self, connection_id: ConnectionId) -> MatchId {
        match self.notifier.kinds_for(connection_id, "ready-check").last() {
            Some(ServerEvent::ReadyCheck { match_id, .. }) => *match_id,
            other => panic!("expected ready-check for {}, got {:?}", connection_id, other),
        }
    }

    /// Accept the current ready-check for every connection
    pub fn accept_all(&mut self, connections: &[ConnectionId]) -> MatchId {
        let match_id = self.ready_check_id(connections[0]);
        for &connection_id in connections {
            self.respond(connection_id, match_id, true);
        }
        match_id
    }

    /// Seats and token from the latest `match-found` or `match-rejoined`
    pub fn seat_grant(&self, connection_id: ConnectionId) -> SeatGrant {
        let events = self.notifier.events_for(connection_id);
        let grant = events.iter().rev().find_map(|event| match event {
            ServerEvent::MatchFound {
                room_id,
                assigned_seats,
                reconnect_token,
                ..
            }
            | ServerEvent::MatchRejoined {
                room_id,
                assigned_seats,
                reconnect_token,
                ..
            } => Some(SeatGrant {
                room_id: *room_id,
                seats: assigned_seats.clone(),
                reconnect_token: reconnect_token.clone(),
            }),
            _ => None,
        });
        grant.unwrap_or_else(|| panic!("no seat grant for {}", connection_id))
    }

    /// Queue, scan and confirm a duel between two fresh connections
    pub async fn start_duel(
        &mut self,
        first: (&str, f64),
        second: (&str, f64),
    ) -> (
        (ConnectionId, PlayerIdentity),
        (ConnectionId, PlayerIdentity),
        RoomId,
    ) {
        let a = self.connect_new(first.0, first.1).await;
        let b = self.connect_new(second.0, second.1).await;
        self.join(a.0, Playlist::Duel, 1);
        self.join(b.0, Playlist::Duel, 1);
        assert_eq!(self.core.scan(self.now), 1, "duel should be proposed");
        let match_id = self.accept_all(&[a.0, b.0]);
        (a, b, match_id)
    }

    pub fn tick(&mut self) -> usize {
        self.core.tick(1.0 / 60.0, self.now)
    }

    /// Run every queued persistence job against the in-memory store
    pub async fn flush_jobs(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(job) = self.jobs.try_recv() {
            let result = match &job {
                PersistenceJob::CommitMatch(record) => self.store.commit_match_result(record).await,
                PersistenceJob::UpdateNickname {
                    player_id,
                    nickname,
                } => self.store.update_nickname(player_id, nickname).await,
            };
            result.expect("persistence job applied");
            applied += 1;
        }
        applied
    }

    /// Every `match-ended` event sent to a connection
    pub fn match_endings(&self, connection_id: ConnectionId) -> Vec<ServerEvent> {
        self.notifier.kinds_for(connection_id, "match-ended")
    }
}
