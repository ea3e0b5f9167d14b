//! Ready-check instance and its members

use crate::matching::SeatedEntry;
use crate::queue::QueueEntry;
use crate::types::{BucketKey, ConnectionId, MatchId, RosterEntry, SeatIndex, Team};
use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyCheckState {
    /// Waiting for every member to answer
    Pending,
    /// Everyone accepted; being handed to the room manager
    Confirming,
    /// A room was started for it
    Confirmed,
    Cancelled,
}

/// One party inside a ready-check
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyMember {
    /// Original queue entry, kept for priority re-queue
    pub entry: QueueEntry,
    pub team: Team,
    pub seats: Vec<SeatIndex>,
    /// Single-use token for rejoining the room this check becomes
    pub reconnect_token: String,
    pub accepted: bool,
}

impl ReadyMember {
    pub fn from_seated(seated: SeatedEntry) -> Self {
        Self {
            entry: seated.entry,
            team: seated.team,
            seats: seated.seats,
            reconnect_token: crate::utils::generate_token(),
            accepted: false,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.entry.connection_id
    }

    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            player_id: self.entry.party_id.clone(),
            nickname: self.entry.nickname.clone(),
            team: self.team,
            seats: self.seats.clone(),
            party_size: self.entry.party_size,
            rating: self.entry.rating,
            connected: true,
        }
    }
}

/// Why a ready-check was cancelled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    Declined { nickname: String },
    Expired,
    Disconnected { nickname: String },
    Shutdown,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Declined { nickname } => write!(f, "{} declined the match", nickname),
            CancelReason::Expired => write!(f, "not everyone accepted in time"),
            CancelReason::Disconnected { nickname } => write!(f, "{} disconnected", nickname),
            CancelReason::Shutdown => write!(f, "server shutdown"),
        }
    }
}

/// A found combination awaiting unanimous confirmation
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyCheck {
    pub id: MatchId,
    pub key: BucketKey,
    pub seed: u64,
    pub members: Vec<ReadyMember>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: ReadyCheckState,
}

impl ReadyCheck {
    pub fn member(&self, connection_id: ConnectionId) -> Option<&ReadyMember> {
        self.members
            .iter()
            .find(|m| m.connection_id() == connection_id)
    }

    pub fn member_mut(&mut self, connection_id: ConnectionId) -> Option<&mut ReadyMember> {
        self.members
            .iter_mut()
            .find(|m| m.connection_id() == connection_id)
    }

    pub fn connections(&self) -> Vec<ConnectionId> {
        self.members.iter().map(|m| m.connection_id()).collect()
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.members.iter().map(|m| m.roster_entry()).collect()
    }

    pub fn accepted_count(&self) -> usize {
        self.members.iter().filter(|m| m.accepted).count()
    }

    pub fn all_accepted(&self) -> bool {
        self.members.iter().all(|m| m.accepted)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Finish the hand-off; only a confirming check can be confirmed
    pub fn confirm(&mut self) -> bool {
        if self.state != ReadyCheckState::Confirming {
            return false;
        }
        self.state = ReadyCheckState::Confirmed;
        true
    }
}
