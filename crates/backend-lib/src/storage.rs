// ============================
// partyline-backend/src/storage.rs
// ============================
//! Storage abstraction with flat-file implementation.
use crate::error::AppError;
use crate::models::{ChatMessage, PartyRecord};
use async_trait::async_trait;
use partyline_common::PartyId;
use std::{
    fs,
    io::SeekFrom,
    path::{Path, PathBuf},
};
use tokio::{
    fs as tokio_fs,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};

const PARTIES_DIR: &str = "parties";
const PARTY_FILE: &str = "party.json";
const CHAT_LOG: &str = "chat.log";

/// Trait for storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist a party and all of its member rows as one unit
    async fn save_party(&self, record: &PartyRecord) -> Result<(), AppError>;

    /// Read every stored party
    async fn load_parties(&self) -> Result<Vec<PartyRecord>, AppError>;

    /// Append one chat message to the party's log
    async fn append_message(&self, message: &ChatMessage) -> Result<(), AppError>;

    /// Read a party's chat log in append order
    async fn read_messages(&self, party_id: PartyId) -> Result<Vec<ChatMessage>, AppError>;
}

/// Flat-file implementation of the Storage trait
#[derive(Clone)]
pub struct FlatFileStorage {
    root: PathBuf,
}

impl FlatFileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(PARTIES_DIR))?;
        Ok(Self { root })
    }

    fn party_dir(&self, party_id: PartyId) -> PathBuf {
        self.root.join(PARTIES_DIR).join(party_id.to_string())
    }
}

fn write_failure(e: impl std::fmt::Display) -> AppError {
    AppError::PersistenceFailure(e.to_string())
}

#[async_trait]
impl Storage for FlatFileStorage {
    /// Write `party.json` through a temp file + rename so readers never see
    /// a half-written record.
    async fn save_party(&self, record: &PartyRecord) -> Result<(), AppError> {
        let dir = self.party_dir(record.id());
        tokio_fs::create_dir_all(&dir).await.map_err(write_failure)?;

        let json = serde_json::to_vec_pretty(record)?;
        let tmp = dir.join(format!("{PARTY_FILE}.tmp"));
        tokio_fs::write(&tmp, json).await.map_err(write_failure)?;
        tokio_fs::rename(&tmp, dir.join(PARTY_FILE))
            .await
            .map_err(write_failure)?;
        Ok(())
    }

    async fn load_parties(&self) -> Result<Vec<PartyRecord>, AppError> {
        let mut records = Vec::new();
        let mut entries = tokio_fs::read_dir(self.root.join(PARTIES_DIR)).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path().join(PARTY_FILE);
            if !path.exists() {
                continue;
            }
            let content = tokio_fs::read_to_string(&path).await?;
            let record: PartyRecord = serde_json::from_str(&content)?;
            records.push(record);
        }

        Ok(records)
    }

    /// Append a JSON line to `chat.log`.
    ///
    /// A line left without its newline by an earlier failed write is
    /// terminated first, so the new line always starts on its own. A write
    /// that fails part-way is truncated back off.
    async fn append_message(&self, message: &ChatMessage) -> Result<(), AppError> {
        let dir = self.party_dir(message.party_id);
        tokio_fs::create_dir_all(&dir).await.map_err(write_failure)?;

        let mut file = tokio_fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(dir.join(CHAT_LOG))
            .await
            .map_err(write_failure)?;
        let len = file.metadata().await.map_err(write_failure)?.len();

        let mut line = Vec::new();
        if len > 0 {
            file.seek(SeekFrom::End(-1)).await.map_err(write_failure)?;
            let mut last = [0u8; 1];
            file.read_exact(&mut last).await.map_err(write_failure)?;
            if last[0] != b'\n' {
                tracing::warn!(party_id = %message.party_id, "terminating partial chat log line");
                line.push(b'\n');
            }
        }
        line.extend(serde_json::to_vec(message)?);
        line.push(b'\n');

        // appends always land at the end regardless of the read position
        let written = match file.write_all(&line).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(truncate) = file.set_len(len).await {
                tracing::error!(party_id = %message.party_id, error = %truncate, "failed to roll back chat log");
            }
            return Err(write_failure(e));
        }
        Ok(())
    }

    /// Read `chat.log` line by line. Lines that are not valid JSON, including
    /// ones holding broken UTF-8, are skipped.
    async fn read_messages(&self, party_id: PartyId) -> Result<Vec<ChatMessage>, AppError> {
        let path = self.party_dir(party_id).join(CHAT_LOG);

        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = tokio_fs::read(&path).await?;
        let messages = content
            .split(|byte| *byte == b'\n')
            .filter(|line| !line.trim_ascii().is_empty())
            .filter_map(|line| match serde_json::from_slice::<ChatMessage>(line) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!(%party_id, error = %e, "skipping corrupt chat log line");
                    None
                },
            })
            .collect();

        Ok(messages)
    }
}
