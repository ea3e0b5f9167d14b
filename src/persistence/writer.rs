//! Background persistence writer
//!
//! The core never awaits storage. It queues jobs on an unbounded channel and
//! this task drains them in order. A failed job is logged and dropped; the
//! in-memory state that produced it is never rolled back.

use crate::metrics::MetricsCollector;
use crate::persistence::{MatchRecord, PersistenceGateway};
use crate::types::PlayerId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Work for the persistence writer
#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceJob {
    CommitMatch(MatchRecord),
    UpdateNickname { player_id: PlayerId, nickname: String },
}

impl PersistenceJob {
    pub fn kind(&self) -> &'static str {
        match self {
            PersistenceJob::CommitMatch(_) => "commit_match",
            PersistenceJob::UpdateNickname { .. } => "update_nickname",
        }
    }
}

/// Sending half handed to the core
pub type PersistenceSender = mpsc::UnboundedSender<PersistenceJob>;

/// Drain jobs until every sender is dropped; returns how many succeeded
pub async fn run_writer(
    gateway: Arc<dyn PersistenceGateway>,
    mut jobs: mpsc::UnboundedReceiver<PersistenceJob>,
    metrics: Arc<MetricsCollector>,
) -> u64 {
    info!(
        "Persistence writer started ({} backend)",
        gateway.backend_name()
    );
    let mut succeeded = 0;

    while let Some(job) = jobs.recv().await {
        let timer = metrics.start_timer();
        let kind = job.kind();
        let result = match &job {
            PersistenceJob::CommitMatch(record) => gateway.commit_match_result(record).await,
            PersistenceJob::UpdateNickname {
                player_id,
                nickname,
            } => gateway.update_nickname(player_id, nickname).await,
        };
        let ok = result.is_ok();
        metrics.record_persistence(kind, ok, timer.stop());

        match result {
            Ok(()) => {
                succeeded += 1;
                match &job {
                    PersistenceJob::CommitMatch(record) => info!(
                        "Match {} stored with {} members",
                        record.id,
                        record.members.len()
                    ),
                    PersistenceJob::UpdateNickname { player_id, .. } => {
                        debug!("Nickname of {} updated", player_id)
                    }
                }
            }
            Err(e) => error!("Persistence job {} failed: {}", kind, e),
        }
    }

    info!(
        "Persistence writer stopped after {} successful jobs",
        succeeded
    );
    succeeded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{InMemoryGateway, MockPersistenceGateway};
    use crate::types::{EndReason, MatchTiming, Playlist, Score};
    use chrono::Utc;
    use uuid::Uuid;

    fn record() -> MatchRecord {
        let now = Utc::now();
        MatchRecord {
            id: Uuid::new_v4(),
            playlist: Playlist::Duel,
            region: "eu".to_string(),
            seed: 1,
            score: Score::new(7, 2),
            winner_team: None,
            end_reason: EndReason::ScoreLimit,
            timing: MatchTiming {
                started_at: now,
                ended_at: now,
            },
            members: vec![],
        }
    }

    #[tokio::test]
    async fn test_writer_commits_in_order() {
        let gateway = Arc::new(InMemoryGateway::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let first = record();
        let second = record();
        tx.send(PersistenceJob::CommitMatch(first.clone())).unwrap();
        tx.send(PersistenceJob::CommitMatch(second.clone())).unwrap();
        drop(tx);

        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let done = run_writer(gateway.clone(), rx, metrics).await;
        assert_eq!(done, 2);
        let stored = gateway.match_records().unwrap();
        assert_eq!(stored, vec![first, second]);
    }

    #[tokio::test]
    async fn test_writer_survives_failures() {
        let mut mock = MockPersistenceGateway::new();
        mock.expect_backend_name().return_const("mock");
        mock.expect_commit_match_result()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("disk full")));
        mock.expect_update_nickname()
            .times(1)
            .returning(|_, _| Ok(()));

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(PersistenceJob::CommitMatch(record())).unwrap();
        tx.send(PersistenceJob::UpdateNickname {
            player_id: "p1".to_string(),
            nickname: "Ace".to_string(),
        })
        .unwrap();
        drop(tx);

        let metrics = Arc::new(MetricsCollector::new().unwrap());
        assert_eq!(run_writer(Arc::new(mock), rx, metrics).await, 1);
    }
}
