// ============================
// partyline-backend/src/chat.rs
// ============================
//! Durable, per-party ordered chat log.
//!
//! Every party has a chat lane: an async mutex holding the last assigned
//! sequence number and the newest `history_limit` messages. Appends take the
//! lane, so the order of `seq` is the order of arrival here. `send` also
//! broadcasts while still holding the lane, which makes delivery order equal
//! persisted order. The log on disk is read once per party, when its lane is
//! first used.
use crate::broadcast::Broadcaster;
use crate::config::ChatSettings;
use crate::error::AppError;
use crate::metrics::CHAT_PERSISTED;
use crate::models::{ChatMessage, User};
use crate::party_store::PartyStore;
use crate::storage::Storage;
use crate::validation::validate_message;
use chrono::Utc;
use dashmap::DashMap;
use metrics::counter;
use partyline_common::{ChatLine, PartyId};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct ChatLane {
    loaded: bool,
    last_seq: u64,
    /// Newest persisted messages, oldest first
    tail: VecDeque<ChatMessage>,
}

pub struct ChatLog {
    storage: Arc<dyn Storage>,
    store: Arc<PartyStore>,
    broadcaster: Arc<Broadcaster>,
    lanes: DashMap<PartyId, Arc<Mutex<ChatLane>>>,
    settings: ChatSettings,
}

impl ChatLog {
    pub fn new(
        storage: Arc<dyn Storage>,
        store: Arc<PartyStore>,
        broadcaster: Arc<Broadcaster>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            storage,
            store,
            broadcaster,
            lanes: DashMap::new(),
            settings,
        }
    }

    pub fn history_limit(&self) -> usize {
        self.settings.history_limit
    }

    fn lane(&self, party_id: PartyId) -> Result<Arc<Mutex<ChatLane>>, AppError> {
        if !self.store.contains(party_id) {
            return Err(AppError::UnknownParty);
        }
        Ok(self.lanes.entry(party_id).or_default().value().clone())
    }

    /// Persist one message at the end of the party's log.
    ///
    /// Nothing is broadcast; see [`ChatLog::send`] for the full chat path.
    pub async fn append(
        &self,
        party_id: PartyId,
        author: &User,
        content: &str,
    ) -> Result<ChatMessage, AppError> {
        let lane = self.lane(party_id)?;
        let mut lane = lane.lock().await;
        self.append_locked(&mut lane, party_id, author, content).await
    }

    /// Validate, persist and relay a chat message from a room member.
    ///
    /// A closed party rejects the message before anything is written. A
    /// message that fails to persist is never broadcast.
    pub async fn send(
        &self,
        party_id: PartyId,
        author: &User,
        content: &str,
    ) -> Result<ChatMessage, AppError> {
        let content = validate_message(content, &self.settings)?;

        let lane = self.lane(party_id)?;
        let mut lane = lane.lock().await;

        let snapshot = self.store.snapshot(party_id, None).await?;
        if !snapshot.status.is_open() || self.broadcaster.is_terminated(party_id) {
            return Err(AppError::PartyClosed);
        }

        let message = self
            .append_locked(&mut lane, party_id, author, content)
            .await?;
        self.broadcaster.chat(party_id, &message);
        Ok(message)
    }

    /// Seed the lane from storage on first use
    async fn load_lane(&self, lane: &mut ChatLane, party_id: PartyId) -> Result<(), AppError> {
        if lane.loaded {
            return Ok(());
        }

        let mut stored = self.storage.read_messages(party_id).await?;
        stored.sort_by_key(|m| m.seq);
        lane.last_seq = stored.last().map_or(0, |m| m.seq);
        let skip = stored.len().saturating_sub(self.settings.history_limit);
        lane.tail = stored.into_iter().skip(skip).collect();
        lane.loaded = true;

        tracing::debug!(%party_id, last_seq = lane.last_seq, cached = lane.tail.len(), "chat lane loaded");
        Ok(())
    }

    async fn append_locked(
        &self,
        lane: &mut ChatLane,
        party_id: PartyId,
        author: &User,
        content: &str,
    ) -> Result<ChatMessage, AppError> {
        self.load_lane(lane, party_id).await?;

        let message = ChatMessage {
            id: Uuid::new_v4(),
            party_id,
            seq: lane.last_seq + 1,
            author_id: author.id,
            author_name: author.nickname.clone(),
            content: content.to_string(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.storage.append_message(&message).await {
            tracing::error!(%party_id, seq = message.seq, error = %e, "failed to persist chat message");
            return Err(e);
        }

        lane.last_seq = message.seq;
        lane.tail.push_back(message.clone());
        while lane.tail.len() > self.settings.history_limit {
            lane.tail.pop_front();
        }

        counter!(CHAT_PERSISTED).increment(1);
        tracing::debug!(%party_id, seq = message.seq, author = %author.id, "chat message persisted");
        Ok(message)
    }

    /// Up to `limit` most recent messages, oldest first. The window never
    /// exceeds the configured `history_limit`.
    ///
    /// Taken under the chat lane, so the result is a prefix of the log that
    /// no in-flight append can interleave with.
    pub async fn recent_history(
        &self,
        party_id: PartyId,
        limit: usize,
    ) -> Result<ChatHistory, AppError> {
        let lane = self.lane(party_id)?;
        let mut lane = lane.lock().await;
        self.load_lane(&mut lane, party_id).await?;

        let skip = lane.tail.len().saturating_sub(limit);
        let messages: Vec<ChatMessage> = lane.tail.iter().skip(skip).cloned().collect();

        Ok(ChatHistory {
            messages: messages.into(),
        })
    }
}

/// A finite window of a party's chat log, oldest first. Iterate it as often
/// as needed; each iteration starts from the oldest message again.
#[derive(Debug, Clone, Default)]
pub struct ChatHistory {
    messages: Arc<[ChatMessage]>,
}

impl ChatHistory {
    pub fn iter(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Sequence number of the newest message in the window
    pub fn last_seq(&self) -> Option<u64> {
        self.messages.last().map(|m| m.seq)
    }

    pub fn lines(&self) -> Vec<ChatLine> {
        self.iter().map(ChatMessage::to_line).collect()
    }
}

impl<'a> IntoIterator for &'a ChatHistory {
    type Item = &'a ChatMessage;
    type IntoIter = std::slice::Iter<'a, ChatMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room_registry::RoomRegistry;
    use crate::storage::FlatFileStorage;
    use partyline_common::PartySpec;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        storage: Arc<dyn Storage>,
        store: Arc<PartyStore>,
        broadcaster: Arc<Broadcaster>,
        chat: ChatLog,
    }

    fn fixture() -> Fixture {
        fixture_with(ChatSettings::default())
    }

    fn fixture_with(settings: ChatSettings) -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(FlatFileStorage::new(dir.path()).unwrap());
        let store = Arc::new(PartyStore::new(storage.clone()));
        let broadcaster = Arc::new(Broadcaster::new(RoomRegistry::new()));
        let chat = ChatLog::new(
            storage.clone(),
            store.clone(),
            broadcaster.clone(),
            settings,
        );
        Fixture {
            _dir: dir,
            storage,
            store,
            broadcaster,
            chat,
        }
    }

    fn spec() -> PartySpec {
        PartySpec {
            activity: "rocket-league".to_string(),
            mode: "2v2".to_string(),
            description: String::new(),
            max_members: 2,
            mic_required: false,
        }
    }

    #[tokio::test]
    async fn test_append_to_unknown_party() {
        let f = fixture();
        assert!(matches!(
            f.chat.append(Uuid::new_v4(), &User::new("a"), "hi").await,
            Err(AppError::UnknownParty)
        ));
    }

    #[tokio::test]
    async fn test_history_window_is_oldest_first_and_restartable() {
        let f = fixture();
        let host = User::new("host");
        let party = f.store.create(&host, spec()).await.unwrap().id();

        for i in 1..=5 {
            f.chat.append(party, &host, &format!("m{i}")).await.unwrap();
        }

        let history = f.chat.recent_history(party, 3).await.unwrap();
        let first: Vec<_> = history.iter().map(|m| m.content.clone()).collect();
        let second: Vec<_> = (&history).into_iter().map(|m| m.content.clone()).collect();
        assert_eq!(first, ["m3", "m4", "m5"]);
        assert_eq!(first, second);
        assert_eq!(history.last_seq(), Some(5));
    }

    #[tokio::test]
    async fn test_sequence_continues_after_restart() {
        let f = fixture();
        let host = User::new("host");
        let party = f.store.create(&host, spec()).await.unwrap().id();
        f.chat.append(party, &host, "before").await.unwrap();

        let restarted = ChatLog::new(
            f.storage.clone(),
            f.store.clone(),
            f.broadcaster.clone(),
            ChatSettings::default(),
        );
        let message = restarted.append(party, &host, "after").await.unwrap();
        assert_eq!(message.seq, 2);
    }

    #[tokio::test]
    async fn test_send_rejects_invalid_content() {
        let f = fixture();
        let host = User::new("host");
        let party = f.store.create(&host, spec()).await.unwrap().id();

        assert!(matches!(
            f.chat.send(party, &host, "   ").await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(f.chat.recent_history(party, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_trims_content() {
        let f = fixture();
        let host = User::new("host");
        let party = f.store.create(&host, spec()).await.unwrap().id();

        let message = f.chat.send(party, &host, "  gg  ").await.unwrap();
        assert_eq!(message.content, "gg");
        assert_eq!(message.author_name, "host");
    }

    #[tokio::test]
    async fn test_history_served_from_bounded_tail() {
        let f = fixture_with(ChatSettings {
            history_limit: 3,
            ..ChatSettings::default()
        });
        let host = User::new("host");
        let party = f.store.create(&host, spec()).await.unwrap().id();

        for i in 1..=6 {
            f.chat.append(party, &host, &format!("m{i}")).await.unwrap();
        }

        // the log stays whole on disk, only the tail is kept in memory
        assert_eq!(f.storage.read_messages(party).await.unwrap().len(), 6);

        let history = f.chat.recent_history(party, 50).await.unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m4", "m5", "m6"]);

        let shorter = f.chat.recent_history(party, 2).await.unwrap();
        assert_eq!(shorter.last_seq(), Some(6));
        assert_eq!(shorter.len(), 2);
    }

    #[tokio::test]
    async fn test_tail_is_seeded_from_storage_after_restart() {
        let f = fixture_with(ChatSettings {
            history_limit: 2,
            ..ChatSettings::default()
        });
        let host = User::new("host");
        let party = f.store.create(&host, spec()).await.unwrap().id();
        for text in ["a", "b", "c"] {
            f.chat.append(party, &host, text).await.unwrap();
        }

        let restarted = ChatLog::new(
            f.storage.clone(),
            f.store.clone(),
            f.broadcaster.clone(),
            ChatSettings {
                history_limit: 2,
                ..ChatSettings::default()
            },
        );
        let history = restarted.recent_history(party, 10).await.unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["b", "c"]);

        restarted.append(party, &host, "d").await.unwrap();
        let history = restarted.recent_history(party, 10).await.unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["c", "d"]);
    }
}
