//! In-memory persistence gateway
//!
//! Used directly for tests and the `memory` backend, and as the degraded
//! fallback behind [`super::ResilientGateway`].

use super::{
    apply_match, find_player, new_player, sanitize_nickname, MatchRecord, PersistenceGateway,
    PlayerIdentity, PlayerRecord,
};
use crate::error::{MatchmakingError, Result};
use crate::types::{MatchId, PlayerId};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Process-memory player and match store
#[derive(Debug)]
pub struct InMemoryGateway {
    players: RwLock<HashMap<PlayerId, PlayerRecord>>,
    matches: RwLock<Vec<MatchRecord>>,
    committed: RwLock<HashSet<MatchId>>,
    default_rating: f64,
}

impl InMemoryGateway {
    pub fn new(default_rating: f64) -> Self {
        Self {
            players: RwLock::new(HashMap::new()),
            matches: RwLock::new(Vec::new()),
            committed: RwLock::new(HashSet::new()),
            default_rating,
        }
    }

    /// Look up a player row
    pub fn player(&self, player_id: &str) -> Result<Option<PlayerRecord>> {
        let players = self
            .players
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire players read lock".to_string(),
            })?;
        Ok(players.get(player_id).cloned())
    }

    /// Insert or replace a player row
    pub fn insert_player(&self, record: PlayerRecord) -> Result<()> {
        let mut players = self
            .players
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire players write lock".to_string(),
            })?;
        players.insert(record.id.clone(), record);
        Ok(())
    }

    /// All committed match records, oldest first
    pub fn match_records(&self) -> Result<Vec<MatchRecord>> {
        let matches = self
            .matches
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire matches read lock".to_string(),
            })?;
        Ok(matches.clone())
    }

    pub fn player_count(&self) -> Result<usize> {
        let players = self
            .players
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire players read lock".to_string(),
            })?;
        Ok(players.len())
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new(1000.0)
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn get_or_create_player(
        &self,
        player_id: Option<String>,
        session_token: Option<String>,
        nickname: String,
    ) -> Result<PlayerIdentity> {
        let mut players = self
            .players
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire players write lock".to_string(),
            })?;

        if let Some(existing) =
            find_player(&players, player_id.as_deref(), session_token.as_deref())
        {
            debug!("Resolved returning player {}", existing.id);
            return Ok(PlayerIdentity {
                session_token: existing.session_token.clone(),
                player: existing.clone(),
                created: false,
            });
        }

        let record = new_player(&nickname, self.default_rating);
        debug!("Created player {} ({})", record.id, record.nickname);
        players.insert(record.id.clone(), record.clone());

        Ok(PlayerIdentity {
            session_token: record.session_token.clone(),
            player: record,
            created: true,
        })
    }

    async fn update_nickname(&self, player_id: &str, nickname: &str) -> Result<()> {
        let mut players = self
            .players
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire players write lock".to_string(),
            })?;

        let player = players
            .get_mut(player_id)
            .ok_or_else(|| MatchmakingError::PlayerNotFound {
                player_id: player_id.to_string(),
            })?;
        player.nickname = sanitize_nickname(nickname, player_id);
        player.updated_at = Utc::now();
        Ok(())
    }

    async fn commit_match_result(&self, record: &MatchRecord) -> Result<()> {
        {
            let mut committed =
                self.committed
                    .write()
                    .map_err(|_| MatchmakingError::InternalError {
                        message: "Failed to acquire committed write lock".to_string(),
                    })?;
            if !committed.insert(record.id) {
                warn!("Match {} already committed, ignoring duplicate", record.id);
                return Ok(());
            }
        }

        {
            let mut players = self
                .players
                .write()
                .map_err(|_| MatchmakingError::InternalError {
                    message: "Failed to acquire players write lock".to_string(),
                })?;
            apply_match(&mut players, record);
        }

        let mut matches = self
            .matches
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire matches write lock".to_string(),
            })?;
        matches.push(record.clone());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
