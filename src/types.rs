//! Common types used throughout the matchmaking service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Durable player identifier
pub type PlayerId = String;

/// One transport-level client connection
pub type ConnectionId = Uuid;

/// Identifier shared by a ready-check and the room it becomes
pub type MatchId = Uuid;

/// Identifier of a live room
pub type RoomId = Uuid;

/// Index of a seat in the simulation engine
pub type SeatIndex = usize;

/// Seats every engine instance carries, regardless of playlist
pub const ENGINE_SEATS: usize = 4;

/// Matchmaking pool a party queues into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Playlist {
    /// 2-vs-2 on all four seats
    Doubles,
    /// 1-vs-1 on two opposite seats
    Duel,
}

impl Playlist {
    pub const ALL: [Playlist; 2] = [Playlist::Doubles, Playlist::Duel];

    pub fn as_str(&self) -> &'static str {
        match self {
            Playlist::Doubles => "doubles",
            Playlist::Duel => "duel",
        }
    }
}

impl fmt::Display for Playlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of one queue partition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
    pub playlist: Playlist,
    pub region: String,
}

impl BucketKey {
    pub fn new(playlist: Playlist, region: impl Into<String>) -> Self {
        Self {
            playlist,
            region: region.into(),
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.playlist, self.region)
    }
}

/// Input device preference declared when queueing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    #[default]
    Any,
    Keyboard,
    Gamepad,
}

impl InputMode {
    /// A strict preference is only satisfied by the same mode or by `Any`
    pub fn is_compatible_with(self, other: InputMode) -> bool {
        match (self, other) {
            (InputMode::Any, _) | (_, InputMode::Any) => true,
            (a, b) => a == b,
        }
    }
}

/// One side of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    A,
    B,
}

impl Team {
    pub const ALL: [Team; 2] = [Team::A, Team::B];

    pub fn index(self) -> usize {
        match self {
            Team::A => 0,
            Team::B => 1,
        }
    }

    pub fn opponent(self) -> Team {
        match self {
            Team::A => Team::B,
            Team::B => Team::A,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Team::A => write!(f, "A"),
            Team::B => write!(f, "B"),
        }
    }
}

/// Running score of a match, indexed by team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Score {
    pub a: u32,
    pub b: u32,
}

impl Score {
    pub fn new(a: u32, b: u32) -> Self {
        Self { a, b }
    }

    pub fn for_team(&self, team: Team) -> u32 {
        match team {
            Team::A => self.a,
            Team::B => self.b,
        }
    }

    /// Team with the strictly higher score, `None` on a tie
    pub fn leader(&self) -> Option<Team> {
        match self.a.cmp(&self.b) {
            std::cmp::Ordering::Greater => Some(Team::A),
            std::cmp::Ordering::Less => Some(Team::B),
            std::cmp::Ordering::Equal => None,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.a, self.b)
    }
}

/// Outcome of a match from one team's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchResult {
    Win,
    Loss,
    Draw,
}

impl MatchResult {
    /// Realized Elo score for this outcome
    pub fn points(self) -> f64 {
        match self {
            MatchResult::Win => 1.0,
            MatchResult::Loss => 0.0,
            MatchResult::Draw => 0.5,
        }
    }

    /// Result for `team` given the match winner
    pub fn for_team(team: Team, winner: Option<Team>) -> Self {
        match winner {
            None => MatchResult::Draw,
            Some(w) if w == team => MatchResult::Win,
            Some(_) => MatchResult::Loss,
        }
    }
}

/// Why a room ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    ScoreLimit,
    TimeLimit,
    Abandoned,
    ServerShutdown,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::ScoreLimit => write!(f, "score limit reached"),
            EndReason::TimeLimit => write!(f, "time limit reached"),
            EndReason::Abandoned => write!(f, "a team abandoned the match"),
            EndReason::ServerShutdown => write!(f, "server shutdown"),
        }
    }
}

/// Lifetime statistics of a player
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub games: u64,
    pub wins: u64,
    pub losses: u64,
    pub abandons: u64,
}

/// One line of a roster sent with ready-checks and match events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub player_id: PlayerId,
    pub nickname: String,
    pub team: Team,
    pub seats: Vec<SeatIndex>,
    pub party_size: usize,
    pub rating: f64,
    pub connected: bool,
}

/// Rating change information for one room member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingChange {
    pub player_id: PlayerId,
    pub nickname: String,
    pub rating_before: f64,
    pub rating_after: f64,
    pub delta: f64,
    pub result: MatchResult,
    pub abandoned: bool,
    pub reconnect_count: u32,
    pub team: Team,
    pub seats: Vec<SeatIndex>,
    pub party_size: usize,
}

/// Timestamps of a finished match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTiming {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl MatchTiming {
    pub fn duration_seconds(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
