//! JSON file persistence gateway
//!
//! Layout under the data directory:
//! - `players.json`: every player row, rewritten through a temp file on change
//! - `matches.jsonl`: one match record per line, append-only

use super::{
    apply_match, find_player, new_player, sanitize_nickname, MatchRecord, PersistenceGateway,
    PlayerIdentity, PlayerRecord,
};
use crate::error::{MatchmakingError, Result};
use crate::types::{MatchId, PlayerId};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const PLAYERS_FILE: &str = "players.json";
const MATCHES_FILE: &str = "matches.jsonl";

#[derive(Debug, Default)]
struct FileState {
    players: HashMap<PlayerId, PlayerRecord>,
    committed: HashSet<MatchId>,
}

/// Durable gateway over plain files
#[derive(Debug)]
pub struct FileGateway {
    data_dir: PathBuf,
    state: Mutex<FileState>,
    default_rating: f64,
}

impl FileGateway {
    /// Open (or create) a store in `data_dir`
    pub async fn open(data_dir: impl AsRef<Path>, default_rating: f64) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| MatchmakingError::PersistenceFailed {
                message: format!("cannot create {}: {}", data_dir.display(), e),
            })?;

        let mut state = FileState::default();

        let players_path = data_dir.join(PLAYERS_FILE);
        if fs::try_exists(&players_path).await.unwrap_or(false) {
            let raw = fs::read_to_string(&players_path).await.map_err(|e| {
                MatchmakingError::PersistenceFailed {
                    message: format!("cannot read {}: {}", players_path.display(), e),
                }
            })?;
            if !raw.trim().is_empty() {
                let players: Vec<PlayerRecord> = serde_json::from_str(&raw)?;
                state.players = players.into_iter().map(|p| (p.id.clone(), p)).collect();
            }
        }

        let matches_path = data_dir.join(MATCHES_FILE);
        if fs::try_exists(&matches_path).await.unwrap_or(false) {
            let raw = fs::read_to_string(&matches_path).await.map_err(|e| {
                MatchmakingError::PersistenceFailed {
                    message: format!("cannot read {}: {}", matches_path.display(), e),
                }
            })?;
            for line in raw.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<MatchRecord>(line) {
                    Ok(record) => {
                        state.committed.insert(record.id);
                    }
                    Err(e) => warn!("Skipping unreadable match line: {}", e),
                }
            }
        }

        info!(
            "Opened file store at {} ({} players, {} matches)",
            data_dir.display(),
            state.players.len(),
            state.committed.len()
        );

        Ok(Self {
            data_dir,
            state: Mutex::new(state),
            default_rating,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    async fn write_players(&self, players: &HashMap<PlayerId, PlayerRecord>) -> Result<()> {
        let mut rows: Vec<&PlayerRecord> = players.values().collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let body = serde_json::to_vec_pretty(&rows)?;

        let target = self.data_dir.join(PLAYERS_FILE);
        let temp = self.data_dir.join(format!("{}.tmp", PLAYERS_FILE));
        fs::write(&temp, body)
            .await
            .map_err(|e| MatchmakingError::PersistenceFailed {
                message: format!("cannot write {}: {}", temp.display(), e),
            })?;
        fs::rename(&temp, &target)
            .await
            .map_err(|e| MatchmakingError::PersistenceFailed {
                message: format!("cannot replace {}: {}", target.display(), e),
            })?;
        Ok(())
    }

    async fn append_match(&self, record: &MatchRecord) -> Result<()> {
        let path = self.data_dir.join(MATCHES_FILE);
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| MatchmakingError::PersistenceFailed {
                message: format!("cannot open {}: {}", path.display(), e),
            })?;
        file.write_all(&line)
            .await
            .map_err(|e| MatchmakingError::PersistenceFailed {
                message: format!("cannot append to {}: {}", path.display(), e),
            })?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for FileGateway {
    async fn get_or_create_player(
        &self,
        player_id: Option<String>,
        session_token: Option<String>,
        nickname: String,
    ) -> Result<PlayerIdentity> {
        let mut state = self.state.lock().await;

        if let Some(existing) =
            find_player(&state.players, player_id.as_deref(), session_token.as_deref())
        {
            return Ok(PlayerIdentity {
                session_token: existing.session_token.clone(),
                player: existing.clone(),
                created: false,
            });
        }

        let record = new_player(&nickname, self.default_rating);
        state.players.insert(record.id.clone(), record.clone());
        self.write_players(&state.players).await?;
        debug!("Stored new player {}", record.id);

        Ok(PlayerIdentity {
            session_token: record.session_token.clone(),
            player: record,
            created: true,
        })
    }

    async fn update_nickname(&self, player_id: &str, nickname: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let player =
            state
                .players
                .get_mut(player_id)
                .ok_or_else(|| MatchmakingError::PlayerNotFound {
                    player_id: player_id.to_string(),
                })?;
        player.nickname = sanitize_nickname(nickname, player_id);
        player.updated_at = Utc::now();
        self.write_players(&state.players).await
    }

    async fn commit_match_result(&self, record: &MatchRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.committed.contains(&record.id) {
            warn!("Match {} already committed, ignoring duplicate", record.id);
            return Ok(());
        }

        self.append_match(record).await?;
        state.committed.insert(record.id);
        apply_match(&mut state.players, record);
        self.write_players(&state.players).await
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
