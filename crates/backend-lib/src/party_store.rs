// ============================
// partyline-backend/src/party_store.rs
// ============================
//! Source of truth for parties and their membership rows.
//!
//! Each party lives behind its own async mutex, so every mutation of one
//! party is serialized while different parties proceed independently. A
//! mutation is applied to a draft copy, persisted, and only then swapped in:
//! a failed write leaves the in-memory state untouched.
use crate::error::AppError;
use crate::metrics::{PARTY_CLOSED, PARTY_CREATED};
use crate::models::{PartyRecord, PartySnapshot, User};
use crate::storage::Storage;
use dashmap::{mapref::entry::Entry, DashMap};
use metrics::counter;
use partyline_common::{MembershipSummary, PartyId, PartySpec, UserId};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Result of a mutation closure: whether the draft must be committed
pub enum Mutation<T> {
    Changed(T),
    Unchanged(T),
}

pub struct PartyStore {
    storage: Arc<dyn Storage>,
    parties: DashMap<PartyId, Arc<Mutex<PartyRecord>>>,
    /// host -> their party that is not closed yet
    hosting: DashMap<UserId, PartyId>,
}

impl PartyStore {
    /// Create an empty store
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            parties: DashMap::new(),
            hosting: DashMap::new(),
        }
    }

    /// Rebuild the store from everything the backend has persisted
    pub async fn load(storage: Arc<dyn Storage>) -> Result<Self, AppError> {
        let store = Self::new(storage);
        let records = store.storage.load_parties().await?;
        let count = records.len();

        for record in records {
            if record.is_open() {
                store.hosting.insert(record.party.host_id, record.id());
            }
            store.parties.insert(record.id(), Arc::new(Mutex::new(record)));
        }

        tracing::info!(parties = count, open = store.hosting.len(), "party store loaded");
        Ok(store)
    }

    fn handle(&self, party_id: PartyId) -> Result<Arc<Mutex<PartyRecord>>, AppError> {
        self.parties
            .get(&party_id)
            .map(|entry| entry.value().clone())
            .ok_or(AppError::UnknownParty)
    }

    pub fn contains(&self, party_id: PartyId) -> bool {
        self.parties.contains_key(&party_id)
    }

    /// The host's party that is still open, if any
    pub fn hosted_by(&self, user_id: UserId) -> Option<PartyId> {
        self.hosting.get(&user_id).map(|entry| *entry.value())
    }

    /// Create a party with its host seeded as the first active member.
    ///
    /// The host slot in the hosting index is reserved before anything is
    /// written, so two racing creates by the same host cannot both succeed.
    /// The party becomes visible only once its record is durable.
    pub async fn create(&self, host: &User, spec: PartySpec) -> Result<PartyRecord, AppError> {
        let record = PartyRecord::open(host, spec);
        let party_id = record.id();

        match self.hosting.entry(host.id) {
            Entry::Occupied(_) => return Err(AppError::AlreadyHosting),
            Entry::Vacant(slot) => {
                slot.insert(party_id);
            },
        }

        if let Err(e) = self.storage.save_party(&record).await {
            self.hosting.remove_if(&host.id, |_, reserved| *reserved == party_id);
            tracing::error!(%party_id, error = %e, "failed to persist new party");
            return Err(e);
        }

        self.parties
            .insert(party_id, Arc::new(Mutex::new(record.clone())));
        counter!(PARTY_CREATED).increment(1);
        tracing::info!(%party_id, host = %host.id, "party created");

        Ok(record)
    }

    /// A consistent copy of one party
    pub async fn get(&self, party_id: PartyId) -> Result<PartyRecord, AppError> {
        let handle = self.handle(party_id)?;
        let record = handle.lock().await;
        Ok(record.clone())
    }

    /// Status and count for a viewer, taken under one lock acquisition
    pub async fn snapshot(
        &self,
        party_id: PartyId,
        viewer: Option<UserId>,
    ) -> Result<PartySnapshot, AppError> {
        let handle = self.handle(party_id)?;
        let record = handle.lock().await;
        Ok(record.snapshot(viewer))
    }

    /// Run `f` against a draft of the party under its lock. A `Changed`
    /// draft gets a new revision, is persisted, then replaces the current
    /// record. Returns the closure's value and the record as it stands when
    /// the lock is released.
    pub async fn mutate<T, F>(&self, party_id: PartyId, f: F) -> Result<(T, PartyRecord), AppError>
    where
        F: FnOnce(&mut PartyRecord) -> Result<Mutation<T>, AppError>,
    {
        let handle = self.handle(party_id)?;
        let mut current = handle.lock().await;

        let mut draft = current.clone();
        let value = match f(&mut draft)? {
            Mutation::Unchanged(value) => return Ok((value, current.clone())),
            Mutation::Changed(value) => value,
        };
        draft.revision = current.revision + 1;

        if let Err(e) = self.storage.save_party(&draft).await {
            tracing::error!(%party_id, error = %e, "failed to persist party mutation");
            return Err(e);
        }

        let was_open = current.is_open();
        *current = draft;

        if was_open && !current.is_open() {
            let host_id = current.party.host_id;
            self.hosting.remove_if(&host_id, |_, hosted| *hosted == party_id);
            counter!(PARTY_CLOSED).increment(1);
        }

        Ok((value, current.clone()))
    }

    /// Open parties, newest first
    pub async fn list_open(&self) -> Vec<PartyRecord> {
        let mut open = Vec::new();
        for handle in self.all_handles() {
            let record = handle.lock().await;
            if record.is_open() {
                open.push(record.clone());
            }
        }
        open.sort_by(|a, b| b.party.created_at.cmp(&a.party.created_at));
        open
    }

    /// The user's memberships, most recently joined first
    pub async fn memberships_of(&self, user_id: UserId, limit: usize) -> Vec<MembershipSummary> {
        let mut found = Vec::new();
        for handle in self.all_handles() {
            let record = handle.lock().await;
            if let Some(member) = record.member(user_id) {
                found.push(record.membership_summary(member));
            }
        }
        found.sort_by(|a, b| b.joined_at.cmp(&a.joined_at));
        found.truncate(limit);
        found
    }

    // Collected up front so no map guard is held across an await
    fn all_handles(&self) -> Vec<Arc<Mutex<PartyRecord>>> {
        self.parties
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
