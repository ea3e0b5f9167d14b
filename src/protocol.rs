//! Client/server event types
//!
//! Every message is a JSON object tagged by `type` (kebab-case) with camelCase
//! fields. Inbound payloads are loosely typed on the wire and are validated and
//! clamped here before anything else sees them.

use crate::error::{MatchmakingError, Result};
use crate::queue::QueueRequest;
use crate::room::engine::WorldSnapshot;
use crate::types::{
    EndReason, InputMode, MatchId, PlayerId, PlayerStats, Playlist, RatingChange, RoomId,
    RosterEntry, Score, SeatIndex, Team, ENGINE_SEATS,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Max ping assumed when a join request names none
pub const DEFAULT_MAX_PING_MS: u32 = 150;

/// Messages sent by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinQueue {
        #[serde(default)]
        nickname: Option<String>,
        #[serde(default)]
        party_size: Option<i64>,
        #[serde(default)]
        playlist: Option<Playlist>,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        input_mode: Option<InputMode>,
        #[serde(default)]
        max_ping_ms: Option<i64>,
    },
    LeaveQueue,
    ReadyCheckResponse {
        match_id: MatchId,
        accept: bool,
    },
    LeaveMatch,
    PlayerInput {
        room_id: RoomId,
        /// Seat index (as a string key) to movement axis
        #[serde(default)]
        axes: HashMap<String, f64>,
        #[serde(default)]
        fires: Vec<i64>,
    },
    LatencyProbeResponse {
        /// Milliseconds since the Unix epoch, echoed from the probe
        sent_at: i64,
    },
}

impl ClientEvent {
    /// Parse one inbound text frame
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| {
            MatchmakingError::InvalidRequest {
                reason: format!("unreadable message: {}", e),
            }
            .into()
        })
    }
}

/// Validated per-tick input from one connection
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInput {
    pub room_id: RoomId,
    pub axes: Vec<(SeatIndex, f32)>,
    pub fires: Vec<SeatIndex>,
}

impl PlayerInput {
    /// Drop unknown seats and non-finite values; clamp axes to [-1, 1]
    pub fn sanitize(room_id: RoomId, axes: HashMap<String, f64>, fires: Vec<i64>) -> Self {
        let mut axes: Vec<(SeatIndex, f32)> = axes
            .into_iter()
            .filter_map(|(seat, value)| {
                let seat: SeatIndex = seat.trim().parse().ok()?;
                if seat >= ENGINE_SEATS || !value.is_finite() {
                    return None;
                }
                Some((seat, value.clamp(-1.0, 1.0) as f32))
            })
            .collect();
        axes.sort_by_key(|(seat, _)| *seat);

        let mut fires: Vec<SeatIndex> = fires
            .into_iter()
            .filter(|seat| (0..ENGINE_SEATS as i64).contains(seat))
            .map(|seat| seat as SeatIndex)
            .collect();
        fires.sort_unstable();
        fires.dedup();

        Self {
            room_id,
            axes,
            fires,
        }
    }
}

/// Build a queue request from raw join-queue fields
///
/// Negative or missing numbers fall back to safe values; playlist limits are
/// applied later by the queue.
pub fn join_request(
    nickname: Option<String>,
    party_size: Option<i64>,
    playlist: Option<Playlist>,
    region: Option<String>,
    input_mode: Option<InputMode>,
    max_ping_ms: Option<i64>,
) -> QueueRequest {
    QueueRequest {
        nickname: nickname.unwrap_or_default(),
        party_size: party_size.unwrap_or(1).clamp(0, 64) as usize,
        playlist: playlist.unwrap_or(Playlist::Doubles),
        region: region.unwrap_or_default(),
        input_mode: input_mode.unwrap_or_default(),
        max_ping_ms: max_ping_ms
            .map(|ms| ms.clamp(0, u32::MAX as i64) as u32)
            .unwrap_or(DEFAULT_MAX_PING_MS),
    }
}

/// Messages sent to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Identity {
        player_id: PlayerId,
        session_token: String,
        nickname: String,
        rating: f64,
        stats: PlayerStats,
    },
    Queued {
        position: usize,
        total: usize,
        mmr: f64,
        mmr_window: f64,
    },
    QueueUpdate {
        position: usize,
        total: usize,
        wait_seconds: f64,
        mmr_window: f64,
    },
    ReadyCheck {
        match_id: MatchId,
        expiry: DateTime<Utc>,
        roster: Vec<RosterEntry>,
    },
    ReadyUpdate {
        accepted_count: usize,
        total: usize,
    },
    ReadyCancelled {
        reason: String,
    },
    MatchFound {
        room_id: RoomId,
        seed: u64,
        assigned_seats: Vec<SeatIndex>,
        reconnect_token: String,
        roster: Vec<RosterEntry>,
    },
    MatchRejoined {
        room_id: RoomId,
        assigned_seats: Vec<SeatIndex>,
        reconnect_token: String,
        roster: Vec<RosterEntry>,
        snapshot: WorldSnapshot,
    },
    WorldSnapshot {
        room_id: RoomId,
        snapshot: WorldSnapshot,
        sequence: u64,
    },
    PlayerLeft {
        seats: Vec<SeatIndex>,
        reason: String,
    },
    Presence {
        seats: Vec<SeatIndex>,
        connected: bool,
    },
    MatchEnded {
        reason: EndReason,
        winner_team: Option<Team>,
        score: Score,
        rating_changes: Vec<RatingChange>,
    },
    ServerNotice {
        message: String,
    },
    LatencyProbe {
        sent_at: i64,
    },
}

impl ServerEvent {
    pub fn notice(message: impl Into<String>) -> Self {
        ServerEvent::ServerNotice {
            message: message.into(),
        }
    }

    /// Wire name of the event type
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Identity { .. } => "identity",
            ServerEvent::Queued { .. } => "queued",
            ServerEvent::QueueUpdate { .. } => "queue-update",
            ServerEvent::ReadyCheck { .. } => "ready-check",
            ServerEvent::ReadyUpdate { .. } => "ready-update",
            ServerEvent::ReadyCancelled { .. } => "ready-cancelled",
            ServerEvent::MatchFound { .. } => "match-found",
            ServerEvent::MatchRejoined { .. } => "match-rejoined",
            ServerEvent::WorldSnapshot { .. } => "world-snapshot",
            ServerEvent::PlayerLeft { .. } => "player-left",
            ServerEvent::Presence { .. } => "presence",
            ServerEvent::MatchEnded { .. } => "match-ended",
            ServerEvent::ServerNotice { .. } => "server-notice",
            ServerEvent::LatencyProbe { .. } => "latency-probe",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_parse_join_queue() {
        let event = ClientEvent::parse(
            r#"{"type":"join-queue","nickname":"Ace","partySize":2,"playlist":"doubles","region":"eu","inputMode":"gamepad","maxPingMs":120}"#,
        )
        .unwrap();
        match event {
            ClientEvent::JoinQueue {
                nickname,
                party_size,
                playlist,
                input_mode,
                max_ping_ms,
                ..
            } => {
                assert_eq!(nickname.as_deref(), Some("Ace"));
                assert_eq!(party_size, Some(2));
                assert_eq!(playlist, Some(Playlist::Doubles));
                assert_eq!(input_mode, Some(InputMode::Gamepad));
                assert_eq!(max_ping_ms, Some(120));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_minimal_join_queue() {
        let event = ClientEvent::parse(r#"{"type":"join-queue"}"#).unwrap();
        let ClientEvent::JoinQueue {
            nickname,
            party_size,
            playlist,
            region,
            input_mode,
            max_ping_ms,
        } = event
        else {
            panic!("expected join-queue");
        };
        let request = join_request(nickname, party_size, playlist, region, input_mode, max_ping_ms);
        assert_eq!(request.party_size, 1);
        assert_eq!(request.playlist, Playlist::Doubles);
        assert_eq!(request.max_ping_ms, DEFAULT_MAX_PING_MS);
    }

    #[test]
    fn test_join_request_clamps_negative_numbers() {
        let request = join_request(None, Some(-3), Some(Playlist::Duel), None, None, Some(-50));
        assert_eq!(request.party_size, 0);
        assert_eq!(request.max_ping_ms, 0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ClientEvent::parse("not json").is_err());
        assert!(ClientEvent::parse(r#"{"type":"teleport"}"#).is_err());
    }

    #[test]
    fn test_player_input_sanitized() {
        let room_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"player-input","roomId":"{}","axes":{{"0":2.5,"1":-0.25,"7":1.0,"x":0.1}},"fires":[3,3,9,-1,0]}}"#,
            room_id
        );
        let ClientEvent::PlayerInput {
            room_id: parsed,
            axes,
            fires,
        } = ClientEvent::parse(&raw).unwrap()
        else {
            panic!("expected player-input");
        };
        let input = PlayerInput::sanitize(parsed, axes, fires);
        assert_eq!(input.room_id, room_id);
        assert_eq!(input.axes, vec![(0, 1.0), (1, -0.25)]);
        assert_eq!(input.fires, vec![0, 3]);
    }

    #[test]
    fn test_server_event_wire_format() {
        let event = ServerEvent::ReadyUpdate {
            accepted_count: 1,
            total: 2,
        };
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "ready-update");
        assert_eq!(json["acceptedCount"], 1);
        assert_eq!(event.kind(), "ready-update");

        let ended = ServerEvent::MatchEnded {
            reason: EndReason::ScoreLimit,
            winner_team: None,
            score: Score::new(3, 3),
            rating_changes: vec![],
        };
        let json: serde_json::Value = serde_json::from_str(&ended.to_json().unwrap()).unwrap();
        assert_eq!(json["reason"], "score_limit");
        assert!(json["winnerTeam"].is_null());
    }
}
