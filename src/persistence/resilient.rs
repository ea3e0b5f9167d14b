//! Durable gateway with an in-memory fallback
//!
//! Every call goes to the primary backend first. Any failure is logged, the
//! gateway is flagged degraded, and the same call is served from memory so a
//! match end never blocks on storage.

use super::{InMemoryGateway, MatchRecord, PersistenceGateway, PlayerIdentity};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub struct ResilientGateway {
    primary: Arc<dyn PersistenceGateway>,
    fallback: Arc<InMemoryGateway>,
    degraded: AtomicBool,
    failures: AtomicU64,
}

impl ResilientGateway {
    pub fn new(primary: Arc<dyn PersistenceGateway>, fallback: Arc<InMemoryGateway>) -> Self {
        info!(
            "Persistence routed to '{}' with in-memory fallback",
            primary.backend_name()
        );
        Self {
            primary,
            fallback,
            degraded: AtomicBool::new(false),
            failures: AtomicU64::new(0),
        }
    }

    /// True once any primary call has failed
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Number of primary failures absorbed by the fallback
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn fallback(&self) -> &Arc<InMemoryGateway> {
        &self.fallback
    }

    fn record_failure(&self, operation: &str, error: &anyhow::Error) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(
                "Persistence backend '{}' failed, switching to in-memory fallback",
                self.primary.backend_name()
            );
        }
        warn!("{} failed on primary backend: {:#}", operation, error);
    }
}

#[async_trait]
impl PersistenceGateway for ResilientGateway {
    async fn get_or_create_player(
        &self,
        player_id: Option<String>,
        session_token: Option<String>,
        nickname: String,
    ) -> Result<PlayerIdentity> {
        match self
            .primary
            .get_or_create_player(player_id.clone(), session_token.clone(), nickname.clone())
            .await
        {
            Ok(identity) => {
                // Keep the fallback warm so a later outage still knows this player
                self.fallback.insert_player(identity.player.clone())?;
                Ok(identity)
            }
            Err(e) => {
                self.record_failure("get_or_create_player", &e);
                self.fallback
                    .get_or_create_player(player_id, session_token, nickname)
                    .await
            }
        }
    }

    async fn update_nickname(&self, player_id: &str, nickname: &str) -> Result<()> {
        if let Err(e) = self.primary.update_nickname(player_id, nickname).await {
            self.record_failure("update_nickname", &e);
        }
        // The fallback may not know the player yet; that is not an error here
        let _ = self.fallback.update_nickname(player_id, nickname).await;
        Ok(())
    }

    async fn commit_match_result(&self, record: &MatchRecord) -> Result<()> {
        match self.primary.commit_match_result(record).await {
            Ok(()) => {
                let _ = self.fallback.commit_match_result(record).await;
                Ok(())
            }
            Err(e) => {
                self.record_failure("commit_match_result", &e);
                self.fallback.commit_match_result(record).await
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        if self.is_degraded() {
            "memory-fallback"
        } else {
            self.primary.backend_name()
        }
    }
}
