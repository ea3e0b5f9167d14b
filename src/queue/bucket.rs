//! Queue entries and the per-(playlist, region) bucket holding them

use crate::types::{BucketKey, ConnectionId, InputMode, PlayerId, Playlist};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One party waiting in a bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub connection_id: ConnectionId,
    /// Player id of the party leader
    pub party_id: PlayerId,
    pub nickname: String,
    pub party_size: usize,
    pub rating: f64,
    pub region: String,
    pub playlist: Playlist,
    pub input_mode: InputMode,
    /// Largest latency this party accepts from anyone it is matched with
    pub max_ping_ms: u32,
    /// Last observed latency of this party
    pub latency_ms: u32,
    /// Ordering key; earlier than `enqueued_at` for priority re-queues
    pub joined_at: DateTime<Utc>,
    /// Wall-clock time the party actually (re)entered the queue
    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn bucket_key(&self) -> BucketKey {
        BucketKey::new(self.playlist, self.region.clone())
    }
}

/// Entries of one bucket, oldest `joined_at` first
#[derive(Debug, Default, Clone)]
pub struct Bucket {
    entries: Vec<QueueEntry>,
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping join order; equal join times keep arrival order
    pub fn insert(&mut self, entry: QueueEntry) -> usize {
        let index = self
            .entries
            .partition_point(|e| e.joined_at <= entry.joined_at);
        self.entries.insert(index, entry);
        index
    }

    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<QueueEntry> {
        let index = self.position_of(connection_id)?;
        Some(self.entries.remove(index))
    }

    /// Zero-based position of a connection
    pub fn position_of(&self, connection_id: ConnectionId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.connection_id == connection_id)
    }

    pub fn get_mut(&mut self, connection_id: ConnectionId) -> Option<&mut QueueEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.connection_id == connection_id)
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn entry(joined_at: DateTime<Utc>) -> QueueEntry {
        QueueEntry {
            connection_id: Uuid::new_v4(),
            party_id: "p".to_string(),
            nickname: "p".to_string(),
            party_size: 1,
            rating: 1000.0,
            region: "eu".to_string(),
            playlist: Playlist::Duel,
            input_mode: InputMode::Any,
            max_ping_ms: 150,
            latency_ms: 0,
            joined_at,
            enqueued_at: joined_at,
        }
    }

    #[test]
    fn test_insert_keeps_join_order() {
        let now = Utc::now();
        let mut bucket = Bucket::new();
        let late = entry(now);
        let early = entry(now - Duration::seconds(30));
        let same = entry(now);

        bucket.insert(late.clone());
        assert_eq!(bucket.insert(early.clone()), 0);
        assert_eq!(bucket.insert(same.clone()), 2);

        let order: Vec<_> = bucket.entries().iter().map(|e| e.connection_id).collect();
        assert_eq!(
            order,
            vec![early.connection_id, late.connection_id, same.connection_id]
        );
    }

    #[test]
    fn test_remove() {
        let mut bucket = Bucket::new();
        let a = entry(Utc::now());
        bucket.insert(a.clone());
        assert!(bucket.remove(Uuid::new_v4()).is_none());
        assert_eq!(bucket.remove(a.connection_id), Some(a));
        assert!(bucket.is_empty());
    }
}
