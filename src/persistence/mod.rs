//! Player identity and match history persistence
//!
//! The core only talks to a [`PersistenceGateway`]. Implementations:
//! - [`InMemoryGateway`] keeps everything in process memory
//! - [`FileGateway`] stores players as JSON and appends match records as JSON lines
//! - [`ResilientGateway`] routes to a durable backend and degrades to memory on failure
//!
//! Writes from the core go through [`writer::run_writer`].

pub mod file;
pub mod memory;
pub mod resilient;
pub mod writer;

pub use file::FileGateway;
pub use memory::InMemoryGateway;
pub use resilient::ResilientGateway;
pub use writer::{run_writer, PersistenceJob, PersistenceSender};

use crate::error::Result;
use crate::types::{
    EndReason, MatchId, MatchResult, MatchTiming, PlayerId, PlayerStats, Playlist, RatingChange,
    Score, SeatIndex, Team,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Longest nickname kept after sanitizing
pub const MAX_NICKNAME_LEN: usize = 24;

/// Durable player row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub nickname: String,
    pub rating: f64,
    #[serde(flatten)]
    pub stats: PlayerStats,
    pub session_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of an identity lookup
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerIdentity {
    pub player: PlayerRecord,
    pub session_token: String,
    /// True when no existing player matched and a new one was created
    pub created: bool,
}

/// One member line of a persisted match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchMemberRecord {
    pub match_id: MatchId,
    pub player_id: PlayerId,
    pub team: Team,
    pub seats: Vec<SeatIndex>,
    pub rating_before: f64,
    pub rating_after: f64,
    pub result: MatchResult,
    pub abandoned: bool,
    pub reconnect_count: u32,
    pub party_size: usize,
}

impl MatchMemberRecord {
    pub fn from_change(match_id: MatchId, change: &RatingChange) -> Self {
        Self {
            match_id,
            player_id: change.player_id.clone(),
            team: change.team,
            seats: change.seats.clone(),
            rating_before: change.rating_before,
            rating_after: change.rating_after,
            result: change.result,
            abandoned: change.abandoned,
            reconnect_count: change.reconnect_count,
            party_size: change.party_size,
        }
    }
}

/// A finished match with its member lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub playlist: Playlist,
    pub region: String,
    pub seed: u64,
    pub score: Score,
    pub winner_team: Option<Team>,
    pub end_reason: EndReason,
    pub timing: MatchTiming,
    pub members: Vec<MatchMemberRecord>,
}

/// Narrow storage interface used by the core
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Resolve a returning player by id and session token, or create a new one
    async fn get_or_create_player(
        &self,
        player_id: Option<String>,
        session_token: Option<String>,
        nickname: String,
    ) -> Result<PlayerIdentity>;

    /// Change a player's display name
    async fn update_nickname(&self, player_id: &str, nickname: &str) -> Result<()>;

    /// Store a finished match and apply its rating changes to the player rows
    async fn commit_match_result(&self, record: &MatchRecord) -> Result<()>;

    /// Short backend name for logs and stats
    fn backend_name(&self) -> &'static str;
}

/// Trim a requested nickname, falling back to a generated one
pub fn sanitize_nickname(requested: &str, player_id: &str) -> String {
    let trimmed: String = requested
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NICKNAME_LEN)
        .collect();
    if trimmed.is_empty() {
        let suffix: String = player_id.chars().take(4).collect();
        format!("Player-{}", suffix)
    } else {
        trimmed
    }
}

/// Build a fresh player row
pub(crate) fn new_player(nickname: &str, rating: f64) -> PlayerRecord {
    let id = uuid::Uuid::new_v4().simple().to_string();
    let now = Utc::now();
    PlayerRecord {
        nickname: sanitize_nickname(nickname, &id),
        id,
        rating,
        stats: PlayerStats::default(),
        session_token: crate::utils::generate_token(),
        created_at: now,
        updated_at: now,
    }
}

/// Find a returning player by id (token must match) or by token alone
pub(crate) fn find_player<'a>(
    players: &'a HashMap<PlayerId, PlayerRecord>,
    player_id: Option<&str>,
    session_token: Option<&str>,
) -> Option<&'a PlayerRecord> {
    let token = session_token?;
    match player_id {
        Some(id) => players.get(id).filter(|p| p.session_token == token),
        None => players.values().find(|p| p.session_token == token),
    }
}

/// Apply a match's rating changes and stats to the player rows
pub(crate) fn apply_match(players: &mut HashMap<PlayerId, PlayerRecord>, record: &MatchRecord) {
    let now = Utc::now();
    for member in &record.members {
        let Some(player) = players.get_mut(&member.player_id) else {
            continue;
        };
        player.rating = member.rating_after;
        player.stats.games += 1;
        match member.result {
            MatchResult::Win => player.stats.wins += 1,
            MatchResult::Loss => player.stats.losses += 1,
            MatchResult::Draw => {}
        }
        if member.abandoned {
            player.stats.abandons += 1;
        }
        player.updated_at = now;
    }
}
