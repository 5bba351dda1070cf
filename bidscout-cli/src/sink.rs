//! Append-only JSONL knowledge sink.
//!
//! One episode per line. Keys already in the file are loaded on open, so a
//! rerun over the same signals appends nothing.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use bidscout_engine::{Episode, EpisodeId, KnowledgeSink, SinkError};

/// A stored line.
#[derive(Debug, Serialize, Deserialize)]
struct EpisodeLine {
    episode_id: EpisodeId,
    #[serde(flatten)]
    episode: Episode,
}

/// Knowledge sink backed by a local JSONL file.
pub struct JsonlKnowledgeSink {
    path: PathBuf,
    index: DashMap<(String, String), EpisodeId>,
    append: Mutex<()>,
}

impl JsonlKnowledgeSink {
    /// Open (or create on first write) the episode log at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let index = DashMap::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                for (n, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<EpisodeLine>(line) {
                        Ok(stored) => {
                            index.insert(stored.episode.key(), stored.episode_id);
                        }
                        Err(e) => warn!(line = n + 1, error = %e, "Skipping unreadable episode line"),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(SinkError::Io(e.to_string())),
        }

        info!(path = %path.display(), episodes = index.len(), "Opened episode log");
        Ok(Self {
            path,
            index,
            append: Mutex::new(()),
        })
    }

    /// Episodes currently in the log.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[async_trait]
impl KnowledgeSink for JsonlKnowledgeSink {
    fn id(&self) -> &str {
        "jsonl"
    }

    async fn write_episode(&self, episode: &Episode) -> Result<EpisodeId, SinkError> {
        let key = episode.key();
        if let Some(existing) = self.index.get(&key) {
            return Ok(existing.clone());
        }

        let _guard = self.append.lock().await;
        if let Some(existing) = self.index.get(&key) {
            return Ok(existing.clone());
        }

        let episode_id = EpisodeId::generate();
        let mut line = serde_json::to_string(&EpisodeLine {
            episode_id: episode_id.clone(),
            episode: episode.clone(),
        })
        .map_err(|e| SinkError::Io(e.to_string()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        file.flush().await.map_err(|e| SinkError::Io(e.to_string()))?;

        debug!(episode_id = %episode_id, signal_id = %episode.signal_id, "Episode appended");
        self.index.insert(key, episode_id.clone());
        Ok(episode_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidscout_model::SignalType;
    use chrono::Utc;

    fn temp_log() -> PathBuf {
        std::env::temp_dir().join(format!("bidscout-{}.jsonl", uuid::Uuid::new_v4()))
    }

    fn episode(signal_id: &str) -> Episode {
        Episode {
            entity_id: "arsenal".to_string(),
            signal_id: signal_id.to_string(),
            signal_type: SignalType::RfpDetected,
            description: "CRM retender".to_string(),
            confidence: 0.82,
            timestamp: Utc::now(),
            metadata: serde_json::json!({ "category": "CRM" }),
        }
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let path = temp_log();
        let sink = JsonlKnowledgeSink::open(&path).await.unwrap();

        let first = sink.write_episode(&episode("sig_1")).await.unwrap();
        let second = sink.write_episode(&episode("sig_1")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(sink.len(), 1);

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 1);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_reopen_keeps_keys() {
        let path = temp_log();
        let first_id = {
            let sink = JsonlKnowledgeSink::open(&path).await.unwrap();
            sink.write_episode(&episode("sig_1")).await.unwrap()
        };

        let reopened = JsonlKnowledgeSink::open(&path).await.unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.write_episode(&episode("sig_1")).await.unwrap(), first_id);
        reopened.write_episode(&episode("sig_2")).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_missing_file_opens_empty() {
        let sink = JsonlKnowledgeSink::open(temp_log()).await.unwrap();
        assert!(sink.is_empty());
    }
}
