//! Queue manager for bucketed matchmaking queues
//!
//! This module owns every waiting party, grouped into one bucket per
//! (playlist, region). It handles admission with clamping, withdrawal,
//! priority re-queue after a cancelled ready-check, and position reports.

use crate::config::{MatchmakingConfig, PlaylistConfig};
use crate::error::{MatchmakingError, Result};
use crate::queue::bucket::{Bucket, QueueEntry};
use crate::queue::window::MmrWindowPolicy;
use crate::types::{BucketKey, ConnectionId, InputMode, PlayerId, Playlist};
use crate::utils::elapsed_seconds;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

/// A validated join-queue request
#[derive(Debug, Clone, PartialEq)]
pub struct QueueRequest {
    pub nickname: String,
    pub party_size: usize,
    pub playlist: Playlist,
    pub region: String,
    pub input_mode: InputMode,
    pub max_ping_ms: u32,
}

/// Identity of the connection asking to queue
#[derive(Debug, Clone, PartialEq)]
pub struct QueueApplicant {
    pub connection_id: ConnectionId,
    pub player_id: PlayerId,
    pub rating: f64,
    pub latency_ms: u32,
}

/// Result of a successful admission
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueOutcome {
    pub key: BucketKey,
    /// 1-based rank in the bucket
    pub position: usize,
    pub total: usize,
    pub rating: f64,
    pub mmr_window: f64,
    /// Set when the requested party size was reduced: (requested, allowed)
    pub clamped_party: Option<(usize, usize)>,
}

/// Queue position of one entry
#[derive(Debug, Clone, PartialEq)]
pub struct PositionReport {
    pub connection_id: ConnectionId,
    pub position: usize,
    pub total: usize,
    pub wait_seconds: f64,
    pub mmr_window: f64,
}

/// Statistics about queue operations
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub parties_enqueued: u64,
    pub parties_requeued: u64,
    pub parties_withdrawn: u64,
    pub parties_matched: u64,
}

pub struct QueueManager {
    buckets: HashMap<BucketKey, Bucket>,
    index: HashMap<ConnectionId, BucketKey>,
    window: MmrWindowPolicy,
    config: MatchmakingConfig,
    stats: QueueStats,
}

impl QueueManager {
    pub fn new(config: MatchmakingConfig) -> Result<Self> {
        config.validate()?;
        let window = MmrWindowPolicy::new(config.mmr_window.clone())?;
        Ok(Self {
            buckets: HashMap::new(),
            index: HashMap::new(),
            window,
            config,
            stats: QueueStats::default(),
        })
    }

    pub fn window_policy(&self) -> &MmrWindowPolicy {
        &self.window
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Normalize a region name; empty falls back to the configured default
    pub fn normalize_region(&self, region: &str) -> String {
        let region = region.trim().to_lowercase();
        if region.is_empty() {
            self.config.default_region.clone()
        } else {
            region
        }
    }

    /// Validate, clamp and admit a party
    pub fn enqueue(
        &mut self,
        applicant: QueueApplicant,
        request: QueueRequest,
        now: DateTime<Utc>,
    ) -> Result<EnqueueOutcome> {
        if self.index.contains_key(&applicant.connection_id) {
            return Err(MatchmakingError::AlreadyEngaged {
                connection_id: applicant.connection_id,
            }
            .into());
        }

        let playlist_config = PlaylistConfig::get(request.playlist);
        let requested = request.party_size.max(1);
        let party_size = requested.min(playlist_config.max_party_size);
        let clamped_party = (party_size != request.party_size)
            .then_some((request.party_size, party_size));

        let max_ping_ms = request
            .max_ping_ms
            .clamp(self.config.min_ping_limit_ms, self.config.max_ping_limit_ms);

        let entry = QueueEntry {
            connection_id: applicant.connection_id,
            party_id: applicant.player_id,
            nickname: request.nickname,
            party_size,
            rating: applicant.rating,
            region: self.normalize_region(&request.region),
            playlist: request.playlist,
            input_mode: request.input_mode,
            max_ping_ms,
            latency_ms: applicant.latency_ms,
            joined_at: now,
            enqueued_at: now,
        };

        info!(
            "Enqueue party '{}' ({}) - size: {}, rating: {:.1}, bucket: {}/{}",
            entry.party_id,
            entry.connection_id,
            entry.party_size,
            entry.rating,
            entry.playlist,
            entry.region
        );

        self.stats.parties_enqueued += 1;
        let mut outcome = self.insert(entry, now);
        outcome.clamped_party = clamped_party;
        Ok(outcome)
    }

    /// Put an accepting ready-check member back ahead of new arrivals
    ///
    /// The join time becomes the earlier of its original join time and
    /// `now - requeue_priority`.
    pub fn requeue_with_priority(
        &mut self,
        mut entry: QueueEntry,
        now: DateTime<Utc>,
    ) -> Result<EnqueueOutcome> {
        if self.index.contains_key(&entry.connection_id) {
            return Err(MatchmakingError::AlreadyEngaged {
                connection_id: entry.connection_id,
            }
            .into());
        }

        let priority = now - self.config.requeue_priority();
        entry.joined_at = entry.joined_at.min(priority);
        entry.enqueued_at = now;

        debug!(
            "Re-queue party '{}' with priority join time {}",
            entry.party_id, entry.joined_at
        );

        self.stats.parties_requeued += 1;
        Ok(self.insert(entry, now))
    }

    fn insert(&mut self, entry: QueueEntry, now: DateTime<Utc>) -> EnqueueOutcome {
        let key = entry.bucket_key();
        let connection_id = entry.connection_id;
        let rating = entry.rating;
        let mmr_window = self.window.window_since(entry.joined_at, now);

        let bucket = self.buckets.entry(key.clone()).or_default();
        let index = bucket.insert(entry);
        let total = bucket.len();
        self.index.insert(connection_id, key.clone());

        EnqueueOutcome {
            key,
            position: index + 1,
            total,
            rating,
            mmr_window,
            clamped_party: None,
        }
    }

    /// Remove a waiting party; returns it and position reports for the rest of its bucket
    pub fn withdraw(
        &mut self,
        connection_id: ConnectionId,
        now: DateTime<Utc>,
    ) -> Option<(QueueEntry, Vec<PositionReport>)> {
        let key = self.index.remove(&connection_id)?;
        let bucket = self.buckets.get_mut(&key)?;
        let entry = bucket.remove(connection_id)?;

        info!(
            "Withdrew party '{}' ({}) from {}",
            entry.party_id, connection_id, key
        );

        self.stats.parties_withdrawn += 1;
        if bucket.is_empty() {
            self.buckets.remove(&key);
        }
        Some((entry, self.position_report(&key, now)))
    }

    /// Rank, bucket size, wait and current window of every entry in a bucket
    pub fn position_report(&self, key: &BucketKey, now: DateTime<Utc>) -> Vec<PositionReport> {
        let Some(bucket) = self.buckets.get(key) else {
            return Vec::new();
        };
        let total = bucket.len();
        bucket
            .entries()
            .iter()
            .enumerate()
            .map(|(i, entry)| PositionReport {
                connection_id: entry.connection_id,
                position: i + 1,
                total,
                wait_seconds: elapsed_seconds(entry.enqueued_at, now),
                mmr_window: self.window.window_since(entry.joined_at, now),
            })
            .collect()
    }

    /// Remove the entries of a found combination, in the order given
    pub fn remove_matched(
        &mut self,
        key: &BucketKey,
        connections: &[ConnectionId],
    ) -> Vec<QueueEntry> {
        let Some(bucket) = self.buckets.get_mut(key) else {
            return Vec::new();
        };
        let removed: Vec<QueueEntry> = connections
            .iter()
            .filter_map(|id| {
                let entry = bucket.remove(*id)?;
                self.index.remove(id);
                Some(entry)
            })
            .collect();

        self.stats.parties_matched += removed.len() as u64;
        if bucket.is_empty() {
            self.buckets.remove(key);
        }
        removed
    }

    /// Refresh the observed latency of a queued party
    pub fn update_latency(&mut self, connection_id: ConnectionId, latency_ms: u32) -> bool {
        let Some(key) = self.index.get(&connection_id) else {
            return false;
        };
        match self
            .buckets
            .get_mut(key)
            .and_then(|b| b.get_mut(connection_id))
        {
            Some(entry) => {
                entry.latency_ms = latency_ms;
                true
            }
            None => false,
        }
    }

    pub fn bucket_entries(&self, key: &BucketKey) -> &[QueueEntry] {
        self.buckets.get(key).map(|b| b.entries()).unwrap_or(&[])
    }

    /// Keys of every non-empty bucket, sorted for deterministic scans
    pub fn bucket_keys(&self) -> Vec<BucketKey> {
        let mut keys: Vec<BucketKey> = self.buckets.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn is_queued(&self, connection_id: ConnectionId) -> bool {
        self.index.contains_key(&connection_id)
    }

    pub fn bucket_of(&self, connection_id: ConnectionId) -> Option<&BucketKey> {
        self.index.get(&connection_id)
    }

    /// Total parties waiting across all buckets
    pub fn total_queued(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn manager() -> QueueManager {
        QueueManager::new(MatchmakingConfig::default()).unwrap()
    }

    fn applicant(rating: f64) -> QueueApplicant {
        QueueApplicant {
            connection_id: Uuid::new_v4(),
            player_id: Uuid::new_v4().to_string(),
            rating,
            latency_ms: 40,
        }
    }

    fn request(playlist: Playlist, party_size: usize) -> QueueRequest {
        QueueRequest {
            nickname: "Ace".to_string(),
            party_size,
            playlist,
            region: "EU ".to_string(),
            input_mode: InputMode::Any,
            max_ping_ms: 150,
        }
    }

    #[test]
    fn test_enqueue_normalizes_and_reports() {
        let mut queue = manager();
        let now = Utc::now();
        let outcome = queue
            .enqueue(applicant(1000.0), request(Playlist::Duel, 1), now)
            .unwrap();

        assert_eq!(outcome.key, BucketKey::new(Playlist::Duel, "eu"));
        assert_eq!(outcome.position, 1);
        assert_eq!(outcome.total, 1);
        assert_eq!(outcome.mmr_window, 200.0);
        assert!(outcome.clamped_party.is_none());
        assert_eq!(queue.total_queued(), 1);
    }

    #[test]
    fn test_party_size_clamped_to_playlist() {
        let mut queue = manager();
        let outcome = queue
            .enqueue(applicant(1000.0), request(Playlist::Duel, 2), Utc::now())
            .unwrap();
        assert_eq!(outcome.clamped_party, Some((2, 1)));
        assert_eq!(queue.bucket_entries(&outcome.key)[0].party_size, 1);

        let outcome = queue
            .enqueue(applicant(1000.0), request(Playlist::Doubles, 0), Utc::now())
            .unwrap();
        assert_eq!(outcome.clamped_party, Some((0, 1)));
    }

    #[test]
    fn test_max_ping_clamped() {
        let mut queue = manager();
        let mut req = request(Playlist::Duel, 1);
        req.max_ping_ms = 5;
        let outcome = queue.enqueue(applicant(1000.0), req, Utc::now()).unwrap();
        assert_eq!(queue.bucket_entries(&outcome.key)[0].max_ping_ms, 20);
    }

    #[test]
    fn test_duplicate_enqueue_rejected() {
        let mut queue = manager();
        let who = applicant(1000.0);
        queue
            .enqueue(who.clone(), request(Playlist::Duel, 1), Utc::now())
            .unwrap();
        assert!(queue
            .enqueue(who, request(Playlist::Doubles, 1), Utc::now())
            .is_err());
    }

    #[test]
    fn test_withdraw_reports_remaining() {
        let mut queue = manager();
        let now = Utc::now();
        let a = applicant(1000.0);
        let b = applicant(1000.0);
        let c = applicant(1000.0);
        for (i, who) in [&a, &b, &c].into_iter().enumerate() {
            queue
                .enqueue(
                    who.clone(),
                    request(Playlist::Duel, 1),
                    now + Duration::seconds(i as i64),
                )
                .unwrap();
        }

        let (entry, reports) = queue.withdraw(a.connection_id, now).unwrap();
        assert_eq!(entry.connection_id, a.connection_id);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].connection_id, b.connection_id);
        assert_eq!(reports[0].position, 1);
        assert_eq!(reports[1].total, 2);
        assert!(!queue.is_queued(a.connection_id));
        assert!(queue.withdraw(a.connection_id, now).is_none());
    }

    #[test]
    fn test_empty_bucket_discarded() {
        let mut queue = manager();
        let who = applicant(1000.0);
        queue
            .enqueue(who.clone(), request(Playlist::Duel, 1), Utc::now())
            .unwrap();
        queue.withdraw(who.connection_id, Utc::now());
        assert!(queue.bucket_keys().is_empty());
    }

    #[test]
    fn test_requeue_priority_beats_new_request() {
        let mut queue = manager();
        let now = Utc::now();
        let veteran = applicant(1000.0);
        let outcome = queue
            .enqueue(veteran.clone(), request(Playlist::Duel, 1), now)
            .unwrap();
        let mut entry = queue.remove_matched(&outcome.key, &[veteran.connection_id]);
        let entry = entry.remove(0);

        let later = now + Duration::seconds(20);
        let newcomer = applicant(1000.0);
        queue
            .enqueue(newcomer.clone(), request(Playlist::Duel, 1), later)
            .unwrap();
        let outcome = queue.requeue_with_priority(entry, later).unwrap();

        assert_eq!(outcome.position, 1);
        let entries = queue.bucket_entries(&outcome.key);
        assert_eq!(entries[0].connection_id, veteran.connection_id);
        assert!(entries[0].joined_at < entries[1].joined_at);
        assert_eq!(entries[0].joined_at, later - Duration::seconds(30));
    }

    #[test]
    fn test_update_latency() {
        let mut queue = manager();
        let who = applicant(1000.0);
        let outcome = queue
            .enqueue(who.clone(), request(Playlist::Duel, 1), Utc::now())
            .unwrap();
        assert!(queue.update_latency(who.connection_id, 90));
        assert_eq!(queue.bucket_entries(&outcome.key)[0].latency_ms, 90);
        assert!(!queue.update_latency(Uuid::new_v4(), 10));
    }

    #[test]
    fn test_position_report_window_grows() {
        let mut queue = manager();
        let now = Utc::now();
        let outcome = queue
            .enqueue(applicant(1000.0), request(Playlist::Duel, 1), now)
            .unwrap();
        let reports = queue.position_report(&outcome.key, now + Duration::seconds(25));
        assert_eq!(reports[0].mmr_window, 300.0);
        assert_eq!(reports[0].wait_seconds, 25.0);
    }
}
