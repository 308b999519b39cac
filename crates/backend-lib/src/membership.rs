// ============================
// partyline-backend/src/membership.rs
// ============================
//! Membership coordinator.
//!
//! Enforces the capacity, closed-party and host-authority rules on top of the
//! party store. Each rule check and its write run inside one `mutate` call,
//! i.e. under the party's lock. Events are handed to the broadcaster only
//! after that lock is released, carrying the snapshot the mutation committed.
use crate::broadcast::{Broadcaster, Delivery};
use crate::config::Settings;
use crate::error::AppError;
use crate::metrics::{PARTY_JOINED, PARTY_LEFT};
use crate::models::{PartyMember, PartyRecord, PartySnapshot, User};
use crate::party_store::{Mutation, PartyStore};
use crate::validation::{validate_message, validate_party_spec};
use chrono::Utc;
use metrics::counter;
use partyline_common::{
    LeaveOutcome, MembershipChange, MembershipSummary, PartyId, PartySpec, PartyStatus,
    PartySummary, UserId,
};
use std::sync::Arc;

/// Result of a successful join
#[derive(Debug, Clone)]
pub struct Joined {
    pub member: PartyMember,
    pub change: MembershipChange,
    /// State right after the join committed
    pub snapshot: PartySnapshot,
}

/// A party as seen by one viewer
#[derive(Debug, Clone)]
pub struct PartyView {
    pub record: PartyRecord,
    pub snapshot: PartySnapshot,
    /// Whether entering the party reactivated the viewer's membership
    pub reactivated: bool,
}

pub struct MembershipCoordinator {
    store: Arc<PartyStore>,
    broadcaster: Arc<Broadcaster>,
    settings: Arc<Settings>,
}

impl MembershipCoordinator {
    pub fn new(store: Arc<PartyStore>, broadcaster: Arc<Broadcaster>, settings: Arc<Settings>) -> Self {
        Self {
            store,
            broadcaster,
            settings,
        }
    }

    /// Create a party hosted by `host`, who becomes its first active member
    pub async fn create_party(&self, host: &User, spec: PartySpec) -> Result<PartyRecord, AppError> {
        validate_party_spec(&spec, &self.settings.party)?;

        let record = self.store.create(host, spec).await?;
        self.broadcaster
            .count_update(record.id(), &record.snapshot(Some(host.id)));
        Ok(record)
    }

    /// Take a capacity slot in an open party.
    ///
    /// A user who already holds a slot gets `AlreadyActive` and nothing
    /// changes, even when the party is full.
    pub async fn join(&self, party_id: PartyId, user: &User) -> Result<Joined, AppError> {
        let ((member, change), record) = self
            .store
            .mutate(party_id, |record| {
                if !record.is_open() {
                    return Err(AppError::PartyClosed);
                }

                let has_room = record.has_room();
                match record.member_mut(user.id) {
                    Some(member) if member.is_active => Ok(Mutation::Unchanged((
                        member.clone(),
                        MembershipChange::AlreadyActive,
                    ))),
                    _ if !has_room => Err(AppError::PartyFull),
                    Some(member) => {
                        member.is_active = true;
                        Ok(Mutation::Changed((
                            member.clone(),
                            MembershipChange::Reactivated,
                        )))
                    },
                    None => {
                        let member = PartyMember {
                            user_id: user.id,
                            nickname: user.nickname.clone(),
                            is_active: true,
                            joined_at: Utc::now(),
                        };
                        record.members.push(member.clone());
                        Ok(Mutation::Changed((member, MembershipChange::Created)))
                    },
                }
            })
            .await?;

        let snapshot = record.snapshot(Some(user.id));
        if change != MembershipChange::AlreadyActive {
            counter!(PARTY_JOINED).increment(1);
            tracing::info!(
                %party_id,
                user = %user.id,
                ?change,
                count = snapshot.current_member_count,
                "member joined"
            );
            self.broadcaster.count_update(party_id, &snapshot);
        }

        Ok(Joined {
            member,
            change,
            snapshot,
        })
    }

    /// Give up a slot. The host leaving closes the party instead.
    ///
    /// Repeating a leave is a no-op with a descriptive outcome, never an
    /// error.
    pub async fn leave(&self, party_id: PartyId, user: &User) -> Result<LeaveOutcome, AppError> {
        let (outcome, record) = self
            .store
            .mutate(party_id, |record| {
                if record.is_host(user.id) {
                    if !record.is_open() {
                        return Ok(Mutation::Unchanged(LeaveOutcome::AlreadyClosed));
                    }
                    record.party.status = PartyStatus::Closed;
                    return Ok(Mutation::Changed(LeaveOutcome::Closed));
                }

                match record.member_mut(user.id) {
                    Some(member) if member.is_active => {
                        member.is_active = false;
                        Ok(Mutation::Changed(LeaveOutcome::Deactivated))
                    },
                    _ => Ok(Mutation::Unchanged(LeaveOutcome::NotActive)),
                }
            })
            .await?;

        match outcome {
            LeaveOutcome::Closed => {
                tracing::info!(%party_id, host = %user.id, "host closed the party");
                self.broadcaster.party_killed(party_id);
            },
            LeaveOutcome::Deactivated => {
                counter!(PARTY_LEFT).increment(1);
                tracing::info!(%party_id, user = %user.id, "member left");
                if record.is_open() {
                    self.broadcaster
                        .count_update(party_id, &record.snapshot(Some(user.id)));
                }
            },
            LeaveOutcome::AlreadyClosed | LeaveOutcome::NotActive => {},
        }

        Ok(outcome)
    }

    /// Consistent status and count for a viewer
    pub async fn snapshot(
        &self,
        party_id: PartyId,
        viewer: Option<UserId>,
    ) -> Result<PartySnapshot, AppError> {
        self.store.snapshot(party_id, viewer).await
    }

    /// Read-only detail view
    pub async fn view_party(
        &self,
        party_id: PartyId,
        viewer: Option<UserId>,
    ) -> Result<PartyView, AppError> {
        let record = self.store.get(party_id).await?;
        let snapshot = record.snapshot(viewer);
        Ok(PartyView {
            record,
            snapshot,
            reactivated: false,
        })
    }

    /// Open the party for a returning member.
    ///
    /// An inactive membership is reactivated when the party is still open
    /// and has a free slot; everyone else just gets the view.
    pub async fn enter_party(&self, party_id: PartyId, user: &User) -> Result<PartyView, AppError> {
        let (reactivated, record) = self
            .store
            .mutate(party_id, |record| {
                let can_return = record.is_open() && record.has_room();
                match record.member_mut(user.id) {
                    Some(member) if !member.is_active && can_return => {
                        member.is_active = true;
                        Ok(Mutation::Changed(true))
                    },
                    _ => Ok(Mutation::Unchanged(false)),
                }
            })
            .await?;

        let snapshot = record.snapshot(Some(user.id));
        if reactivated {
            counter!(PARTY_JOINED).increment(1);
            tracing::info!(%party_id, user = %user.id, "membership reactivated on entry");
            self.broadcaster.count_update(party_id, &snapshot);
        }

        Ok(PartyView {
            record,
            snapshot,
            reactivated,
        })
    }

    /// Post an informational notice to the room. Host only.
    pub async fn post_notice(
        &self,
        party_id: PartyId,
        user: &User,
        content: &str,
    ) -> Result<Delivery, AppError> {
        let content = validate_message(content, &self.settings.chat)?;
        let snapshot = self.store.snapshot(party_id, Some(user.id)).await?;

        if !snapshot.is_host {
            return Err(AppError::NotHost);
        }
        if !snapshot.status.is_open() {
            return Err(AppError::PartyClosed);
        }

        Ok(self.broadcaster.system(party_id, content))
    }

    /// Open parties, newest first
    pub async fn list_open(&self) -> Vec<PartySummary> {
        self.store
            .list_open()
            .await
            .iter()
            .map(PartyRecord::summary)
            .collect()
    }

    /// The user's most recent memberships, newest first
    pub async fn recent_memberships(&self, user_id: UserId) -> Vec<MembershipSummary> {
        self.store
            .memberships_of(user_id, self.settings.profile.recent_limit)
            .await
    }
}
