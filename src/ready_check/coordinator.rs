//! Ready-check coordinator
//!
//! Turns a found combination into a confirmed check (handed to the room
//! manager) or a cancelled one (accepting members go back to the queue with
//! priority, everyone else is dropped). Expiry is a deadline swept by the scan
//! timer; removing a check from the pending map is what disarms it.

use crate::matching::MatchProposal;
use crate::notifier::ClientNotifier;
use crate::protocol::ServerEvent;
use crate::queue::QueueEntry;
use crate::ready_check::check::{CancelReason, ReadyCheck, ReadyCheckState, ReadyMember};
use crate::types::{BucketKey, ConnectionId, MatchId};
use crate::utils::{generate_match_id, generate_seed};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A cancelled check and what to do with its members
#[derive(Debug, Clone, PartialEq)]
pub struct Cancellation {
    pub match_id: MatchId,
    pub reason: CancelReason,
    /// Accepting members to re-queue with priority
    pub requeue: Vec<QueueEntry>,
    /// Members released without re-queue
    pub dropped: Vec<ConnectionId>,
}

/// Result of a ready-check response
#[derive(Debug, Clone, PartialEq)]
pub enum ReadyOutcome {
    /// Acceptance recorded, still waiting on others
    Updated { accepted: usize, total: usize },
    /// Everyone accepted; the check is ready to become a room
    Confirmed(ReadyCheck),
    Cancelled(Cancellation),
    /// Unknown check, not a member, or already answered
    Ignored,
}

/// Statistics about ready-check operations
#[derive(Debug, Clone, Default)]
pub struct ReadyCheckStats {
    pub created: u64,
    pub confirmed: u64,
    pub cancelled: u64,
    pub expired: u64,
}

pub struct ReadyCheckCoordinator {
    pending: HashMap<MatchId, ReadyCheck>,
    by_connection: HashMap<ConnectionId, MatchId>,
    duration: chrono::Duration,
    notifier: Arc<dyn ClientNotifier>,
    stats: ReadyCheckStats,
}

impl ReadyCheckCoordinator {
    pub fn new(duration: chrono::Duration, notifier: Arc<dyn ClientNotifier>) -> Self {
        Self {
            pending: HashMap::new(),
            by_connection: HashMap::new(),
            duration,
            notifier,
            stats: ReadyCheckStats::default(),
        }
    }

    pub fn stats(&self) -> &ReadyCheckStats {
        &self.stats
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn get(&self, match_id: MatchId) -> Option<&ReadyCheck> {
        self.pending.get(&match_id)
    }

    pub fn is_pending_member(&self, connection_id: ConnectionId) -> bool {
        self.by_connection.contains_key(&connection_id)
    }

    /// Open a check for a proposal and invite every member
    pub fn create(
        &mut self,
        key: BucketKey,
        proposal: MatchProposal,
        now: DateTime<Utc>,
    ) -> MatchId {
        let check = ReadyCheck {
            id: generate_match_id(),
            key,
            seed: generate_seed(),
            members: proposal
                .members
                .into_iter()
                .map(ReadyMember::from_seated)
                .collect(),
            created_at: now,
            expires_at: now + self.duration,
            state: ReadyCheckState::Pending,
        };
        let match_id = check.id;

        info!(
            "Ready-check {} opened for {} parties in {} (gap {:.1}), expires {}",
            match_id,
            check.members.len(),
            check.key,
            proposal.team_gap,
            check.expires_at
        );

        let invitation = ServerEvent::ReadyCheck {
            match_id,
            expiry: check.expires_at,
            roster: check.roster(),
        };
        let connections = check.connections();
        self.notifier.broadcast(&connections, &invitation);

        for connection_id in connections {
            self.by_connection.insert(connection_id, match_id);
        }
        self.pending.insert(match_id, check);
        self.stats.created += 1;
        match_id
    }

    /// Record an accept or decline
    pub fn respond(
        &mut self,
        connection_id: ConnectionId,
        match_id: MatchId,
        accept: bool,
        now: DateTime<Utc>,
    ) -> ReadyOutcome {
        if self.by_connection.get(&connection_id) != Some(&match_id) {
            debug!(
                "Ignoring ready response from {} for unknown check {}",
                connection_id, match_id
            );
            return ReadyOutcome::Ignored;
        }
        let Some(check) = self.pending.get_mut(&match_id) else {
            return ReadyOutcome::Ignored;
        };

        if check.is_expired(now) {
            self.stats.expired += 1;
            return ReadyOutcome::Cancelled(self.cancel(match_id, CancelReason::Expired, None));
        }

        if !accept {
            let nickname = check
                .member(connection_id)
                .map(|m| m.entry.nickname.clone())
                .unwrap_or_default();
            info!("Ready-check {} declined by {}", match_id, connection_id);
            return ReadyOutcome::Cancelled(self.cancel(
                match_id,
                CancelReason::Declined { nickname },
                Some(connection_id),
            ));
        }

        let Some(member) = check.member_mut(connection_id) else {
            return ReadyOutcome::Ignored;
        };
        if member.accepted {
            return ReadyOutcome::Ignored;
        }
        member.accepted = true;

        let accepted = check.accepted_count();
        let total = check.members.len();
        self.notifier.broadcast(
            &check.connections(),
            &ServerEvent::ReadyUpdate {
                accepted_count: accepted,
                total,
            },
        );
        debug!("Ready-check {}: {}/{} accepted", match_id, accepted, total);

        if !check.all_accepted() {
            return ReadyOutcome::Updated { accepted, total };
        }

        match self.take(match_id) {
            Some(mut check) => {
                check.state = ReadyCheckState::Confirming;
                self.stats.confirmed += 1;
                info!("Ready-check {} confirmed", match_id);
                ReadyOutcome::Confirmed(check)
            }
            None => ReadyOutcome::Ignored,
        }
    }

    /// Cancel every check whose deadline has passed
    pub fn expire(&mut self, now: DateTime<Utc>) -> Vec<Cancellation> {
        let mut due: Vec<(DateTime<Utc>, MatchId)> = self
            .pending
            .values()
            .filter(|c| c.is_expired(now))
            .map(|c| (c.expires_at, c.id))
            .collect();
        due.sort();

        due.into_iter()
            .map(|(_, match_id)| {
                self.stats.expired += 1;
                info!("Ready-check {} expired", match_id);
                self.cancel(match_id, CancelReason::Expired, None)
            })
            .collect()
    }

    /// A member's connection dropped: cancel its check as if it timed out
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Option<Cancellation> {
        let match_id = *self.by_connection.get(&connection_id)?;
        let nickname = self
            .pending
            .get(&match_id)?
            .member(connection_id)
            .map(|m| m.entry.nickname.clone())
            .unwrap_or_default();
        info!(
            "Ready-check {} cancelled, member {} disconnected",
            match_id, connection_id
        );
        Some(self.cancel(
            match_id,
            CancelReason::Disconnected { nickname },
            Some(connection_id),
        ))
    }

    /// Cancel every pending check without re-queueing anyone
    pub fn cancel_all(&mut self) -> Vec<Cancellation> {
        let ids: Vec<MatchId> = self.pending.keys().copied().collect();
        ids.into_iter()
            .map(|match_id| {
                let mut cancellation = self.cancel(match_id, CancelReason::Shutdown, None);
                let requeued = std::mem::take(&mut cancellation.requeue);
                cancellation
                    .dropped
                    .extend(requeued.into_iter().map(|e| e.connection_id));
                cancellation
            })
            .collect()
    }

    fn take(&mut self, match_id: MatchId) -> Option<ReadyCheck> {
        let check = self.pending.remove(&match_id)?;
        for connection_id in check.connections() {
            self.by_connection.remove(&connection_id);
        }
        Some(check)
    }

    /// Remove a check, notify its members, and split them into re-queue and drop
    fn cancel(
        &mut self,
        match_id: MatchId,
        reason: CancelReason,
        excluded: Option<ConnectionId>,
    ) -> Cancellation {
        let Some(mut check) = self.take(match_id) else {
            return Cancellation {
                match_id,
                reason,
                requeue: Vec::new(),
                dropped: Vec::new(),
            };
        };
        check.state = ReadyCheckState::Cancelled;
        self.stats.cancelled += 1;

        self.notifier.broadcast(
            &check.connections(),
            &ServerEvent::ReadyCancelled {
                reason: reason.to_string(),
            },
        );

        let mut requeue = Vec::new();
        let mut dropped = Vec::new();
        for member in check.members {
            let connection_id = member.connection_id();
            if member.accepted && Some(connection_id) != excluded {
                requeue.push(member.entry);
            } else {
                dropped.push(connection_id);
            }
        }

        Cancellation {
            match_id,
            reason,
            requeue,
            dropped,
        }
    }
}
