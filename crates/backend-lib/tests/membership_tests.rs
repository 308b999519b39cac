//! Membership rules against real flat-file storage.
mod common;

use common::{counts, drain, listen, open_party, setup, spec};
use partyline_backend::{error::AppError, models::User, AppState};
use partyline_common::{LeaveOutcome, MembershipChange, PartyStatus};
use std::sync::Arc;

#[tokio::test]
async fn test_host_is_first_member() {
    let (state, _temp_dir) = setup().await;
    let (host, party_id) = open_party(&state, 4).await;

    let snapshot = state.membership.snapshot(party_id, Some(host.id)).await.unwrap();
    assert_eq!(snapshot.current_member_count, 1);
    assert!(snapshot.is_host);
    assert!(snapshot.is_member);
    assert_eq!(snapshot.status, PartyStatus::Open);
}

#[tokio::test]
async fn test_fill_party_sequentially() {
    let (state, _temp_dir) = setup().await;
    let (_host, party_id) = open_party(&state, 4).await;
    let (_handle, mut rx) = listen(&state, party_id, "watcher");

    for name in ["a", "b", "c"] {
        let joined = state.membership.join(party_id, &User::new(name)).await.unwrap();
        assert_eq!(joined.change, MembershipChange::Created);
    }

    assert!(matches!(
        state.membership.join(party_id, &User::new("d")).await,
        Err(AppError::PartyFull)
    ));
    assert_eq!(counts(&drain(&mut rx)), [2, 3, 4]);
}

#[tokio::test]
async fn test_race_for_last_slot() {
    let (state, _temp_dir) = setup().await;
    let (_host, party_id) = open_party(&state, 3).await;
    state.membership.join(party_id, &User::new("early")).await.unwrap();

    let race = |name: &'static str| {
        let state = state.clone();
        tokio::spawn(async move { state.membership.join(party_id, &User::new(name)).await })
    };
    let (first, second) = tokio::join!(race("left"), race("right"));
    let results = [first.unwrap(), second.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(AppError::PartyFull)))
            .count(),
        1
    );

    let snapshot = state.membership.snapshot(party_id, None).await.unwrap();
    assert_eq!(snapshot.current_member_count, 3);
}

#[tokio::test]
async fn test_many_joiners_never_overshoot_capacity() {
    let (state, _temp_dir) = setup().await;
    let (_host, party_id) = open_party(&state, 5).await;
    for name in ["a", "b", "c"] {
        state.membership.join(party_id, &User::new(name)).await.unwrap();
    }

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let state: Arc<AppState> = state.clone();
            tokio::spawn(async move {
                state
                    .membership
                    .join(party_id, &User::new(format!("racer{i}")))
                    .await
            })
        })
        .collect();

    let mut winners = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => winners += 1,
            Err(AppError::PartyFull) => {},
            Err(e) => panic!("unexpected error {e}"),
        }
    }

    assert_eq!(winners, 1);
    let record = state.parties.get(party_id).await.unwrap();
    assert_eq!(record.active_count(), 5);
}

#[tokio::test]
async fn test_leave_is_idempotent_and_rejoin_reactivates() {
    let (state, _temp_dir) = setup().await;
    let (_host, party_id) = open_party(&state, 4).await;
    let guest = User::new("guest");

    let joined = state.membership.join(party_id, &guest).await.unwrap();
    let first_joined_at = joined.member.joined_at;

    assert_eq!(
        state.membership.leave(party_id, &guest).await.unwrap(),
        LeaveOutcome::Deactivated
    );
    let after_once = state.parties.get(party_id).await.unwrap();
    assert_eq!(
        state.membership.leave(party_id, &guest).await.unwrap(),
        LeaveOutcome::NotActive
    );
    let after_twice = state.parties.get(party_id).await.unwrap();
    assert_eq!(after_once.active_count(), after_twice.active_count());
    assert_eq!(after_once.revision, after_twice.revision);

    let rejoined = state.membership.join(party_id, &guest).await.unwrap();
    assert_eq!(rejoined.change, MembershipChange::Reactivated);
    assert_eq!(rejoined.member.joined_at, first_joined_at);

    let record = state.parties.get(party_id).await.unwrap();
    assert_eq!(record.members.len(), 2);
    assert_eq!(record.active_count(), 2);
}

#[tokio::test]
async fn test_active_member_join_is_noop_even_when_full() {
    let (state, _temp_dir) = setup().await;
    let (host, party_id) = open_party(&state, 2).await;
    let guest = User::new("guest");
    state.membership.join(party_id, &guest).await.unwrap();

    let (_handle, mut rx) = listen(&state, party_id, "watcher");
    let again = state.membership.join(party_id, &guest).await.unwrap();
    assert_eq!(again.change, MembershipChange::AlreadyActive);
    let host_again = state.membership.join(party_id, &host).await.unwrap();
    assert_eq!(host_again.change, MembershipChange::AlreadyActive);

    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_inactive_member_cannot_rejoin_full_party() {
    let (state, _temp_dir) = setup().await;
    let (_host, party_id) = open_party(&state, 2).await;
    let guest = User::new("guest");
    state.membership.join(party_id, &guest).await.unwrap();
    state.membership.leave(party_id, &guest).await.unwrap();
    state.membership.join(party_id, &User::new("other")).await.unwrap();

    assert!(matches!(
        state.membership.join(party_id, &guest).await,
        Err(AppError::PartyFull)
    ));
}

#[tokio::test]
async fn test_host_leave_closes_party() {
    let (state, _temp_dir) = setup().await;
    let (host, party_id) = open_party(&state, 4).await;
    let guest = User::new("guest");
    state.membership.join(party_id, &guest).await.unwrap();

    assert_eq!(
        state.membership.leave(party_id, &host).await.unwrap(),
        LeaveOutcome::Closed
    );
    assert_eq!(
        state.membership.leave(party_id, &host).await.unwrap(),
        LeaveOutcome::AlreadyClosed
    );

    let record = state.parties.get(party_id).await.unwrap();
    assert_eq!(record.party.status, PartyStatus::Closed);
    // rows are kept as they were
    assert_eq!(record.active_count(), 2);

    assert!(matches!(
        state.membership.join(party_id, &User::new("late")).await,
        Err(AppError::PartyClosed)
    ));

    // the host is free to open another party
    assert!(state.membership.create_party(&host, spec(4)).await.is_ok());
}

#[tokio::test]
async fn test_second_open_party_is_rejected() {
    let (state, _temp_dir) = setup().await;
    let (host, _party_id) = open_party(&state, 4).await;

    assert!(matches!(
        state.membership.create_party(&host, spec(2)).await,
        Err(AppError::AlreadyHosting)
    ));
}

#[tokio::test]
async fn test_invalid_spec_creates_nothing() {
    let (state, _temp_dir) = setup().await;
    let host = User::new("host");
    let mut bad = spec(4);
    bad.max_members = 0;

    assert!(matches!(
        state.membership.create_party(&host, bad).await,
        Err(AppError::InvalidInput(_))
    ));
    assert!(state.parties.hosted_by(host.id).is_none());
}

#[tokio::test]
async fn test_enter_party_reactivates_only_with_room() {
    let (state, _temp_dir) = setup().await;
    let (_host, party_id) = open_party(&state, 3).await;
    let guest = User::new("guest");
    state.membership.join(party_id, &guest).await.unwrap();
    state.membership.leave(party_id, &guest).await.unwrap();

    // viewing never mutates
    let viewed = state.membership.view_party(party_id, Some(guest.id)).await.unwrap();
    assert!(!viewed.snapshot.is_member);

    let entered = state.membership.enter_party(party_id, &guest).await.unwrap();
    assert!(entered.reactivated);
    assert!(entered.snapshot.is_member);

    state.membership.leave(party_id, &guest).await.unwrap();
    state.membership.join(party_id, &User::new("b")).await.unwrap();
    state.membership.join(party_id, &User::new("c")).await.unwrap();

    let full = state.membership.enter_party(party_id, &guest).await.unwrap();
    assert!(!full.reactivated);
    assert!(!full.snapshot.is_member);
}

#[tokio::test]
async fn test_stranger_entering_only_views() {
    let (state, _temp_dir) = setup().await;
    let (_host, party_id) = open_party(&state, 3).await;
    let stranger = User::new("stranger");

    let view = state.membership.enter_party(party_id, &stranger).await.unwrap();
    assert!(!view.reactivated);
    assert_eq!(view.snapshot.current_member_count, 1);
}

#[tokio::test]
async fn test_member_leaving_closed_party_emits_nothing() {
    let (state, _temp_dir) = setup().await;
    let (host, party_id) = open_party(&state, 3).await;
    let guest = User::new("guest");
    state.membership.join(party_id, &guest).await.unwrap();
    state.membership.leave(party_id, &host).await.unwrap();

    let (_handle, mut rx) = listen(&state, party_id, "watcher");
    assert_eq!(
        state.membership.leave(party_id, &guest).await.unwrap(),
        LeaveOutcome::Deactivated
    );
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_notice_is_host_only() {
    let (state, _temp_dir) = setup().await;
    let (host, party_id) = open_party(&state, 3).await;
    let (_handle, mut rx) = listen(&state, party_id, "watcher");

    assert!(matches!(
        state
            .membership
            .post_notice(party_id, &User::new("guest"), "hello")
            .await,
        Err(AppError::NotHost)
    ));

    let delivery = state
        .membership
        .post_notice(party_id, &host, "starting in 5")
        .await
        .unwrap();
    assert_eq!(delivery.recipients, 1);
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn test_recent_memberships_newest_first() {
    let (state, _temp_dir) = setup().await;
    let player = User::new("player");

    let mut parties = Vec::new();
    for _ in 0..7 {
        let (_host, party_id) = open_party(&state, 4).await;
        state.membership.join(party_id, &player).await.unwrap();
        parties.push(party_id);
    }

    let recent = state.membership.recent_memberships(player.id).await;
    assert_eq!(recent.len(), 5);
    assert_eq!(recent[0].party_id, parties[6]);
    assert!(recent.windows(2).all(|w| w[0].joined_at >= w[1].joined_at));
}

#[tokio::test]
async fn test_state_survives_restart() {
    let (state, temp_dir) = setup().await;
    let (host, party_id) = open_party(&state, 4).await;
    let guest = User::new("guest");
    state.membership.join(party_id, &guest).await.unwrap();
    drop(state);

    let storage = Arc::new(
        partyline_backend::storage::FlatFileStorage::new(temp_dir.path()).unwrap(),
    );
    let reloaded = common::with_storage(storage, &temp_dir).await;

    let snapshot = reloaded.membership.snapshot(party_id, Some(guest.id)).await.unwrap();
    assert_eq!(snapshot.current_member_count, 2);
    assert!(snapshot.is_member);
    assert!(matches!(
        reloaded.membership.create_party(&host, spec(2)).await,
        Err(AppError::AlreadyHosting)
    ));
}
