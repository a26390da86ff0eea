mod common;

use chrono::{Duration, Utc};
use common::spawn_core;
use identity_service::error::CoreError;
use identity_service::models::{Invite, InviteStatus, Role};
use identity_service::store::IdentityStore;
use identity_service::utils::sha256_hex;

#[tokio::test]
async fn test_invite_accept_scenario() {
    let core = spawn_core();
    let (_, owner_token, org) = core.owner_with_org("alice@example.com", "Acme").await;
    let (bob, bob_token) = core.register_and_login("b@x.com").await;

    let (invite, token) = core
        .identity
        .create_invite(&owner_token, org, "b@x.com", Role::Member)
        .await
        .unwrap();
    assert_eq!(invite.status, InviteStatus::Pending);

    let membership = core.identity.accept_invite(&token, &bob_token).await.unwrap();
    assert_eq!(membership.user_id, bob);
    assert_eq!(membership.role, Role::Member);
    assert_eq!(
        core.identity.graph().role_at(bob, org).await.unwrap(),
        Some(Role::Member)
    );

    let stored = core.store.find_invite(invite.invite_id).await.unwrap().unwrap();
    assert_eq!(stored.status, InviteStatus::Accepted);

    // A second acceptance of the same token fails.
    let replay = core.identity.accept_invite(&token, &bob_token).await;
    assert!(matches!(replay, Err(CoreError::AlreadyResolved)));
}

#[tokio::test]
async fn test_only_one_pending_invite_per_scope_and_email() {
    let core = spawn_core();
    let (_, owner_token, org) = core.owner_with_org("alice@example.com", "Acme").await;

    core.identity
        .create_invite(&owner_token, org, "b@x.com", Role::Member)
        .await
        .unwrap();

    let duplicate = core
        .identity
        .create_invite(&owner_token, org, "B@X.COM", Role::Admin)
        .await;
    assert!(matches!(duplicate, Err(CoreError::DuplicatePending)));

    // A different scope is unaffected.
    let (_, other_token, other_org) = core.owner_with_org("carol@example.com", "Umbrella").await;
    core.identity
        .create_invite(&other_token, other_org, "b@x.com", Role::Member)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_invite_creation_requires_permission() {
    let core = spawn_core();
    let (_, owner_token, org) = core.owner_with_org("alice@example.com", "Acme").await;
    let (_, bob_token) = core.register_and_login("bob@example.com").await;

    let outsider = core
        .identity
        .create_invite(&bob_token, org, "c@x.com", Role::Member)
        .await;
    assert!(matches!(outsider, Err(CoreError::Forbidden)));

    // Members cannot invite either; admins can.
    let invite = core.invite(&owner_token, org, "bob@example.com", Role::Member).await;
    core.identity.accept_invite(&invite, &bob_token).await.unwrap();
    let as_member = core
        .identity
        .create_invite(&bob_token, org, "c@x.com", Role::Member)
        .await;
    assert!(matches!(as_member, Err(CoreError::Forbidden)));
}

#[tokio::test]
async fn test_revoked_invite_cannot_be_accepted() {
    let core = spawn_core();
    let (_, owner_token, org) = core.owner_with_org("alice@example.com", "Acme").await;
    let (_, bob_token) = core.register_and_login("b@x.com").await;

    let (invite, token) = core
        .identity
        .create_invite(&owner_token, org, "b@x.com", Role::Member)
        .await
        .unwrap();
    core.identity
        .revoke_invite(&owner_token, invite.invite_id)
        .await
        .unwrap();

    let result = core.identity.accept_invite(&token, &bob_token).await;
    assert!(matches!(result, Err(CoreError::AlreadyResolved)));

    // Revoking twice reports the terminal state.
    let again = core.identity.revoke_invite(&owner_token, invite.invite_id).await;
    assert!(matches!(again, Err(CoreError::AlreadyResolved)));
}

#[tokio::test]
async fn test_overdue_invite_expires_lazily_on_read() {
    let core = spawn_core();
    let (alice, _, org) = core.owner_with_org("alice@example.com", "Acme").await;
    let (_, bob_token) = core.register_and_login("b@x.com").await;

    let mut invite = Invite::new(
        org,
        "b@x.com".to_string(),
        Role::Member,
        sha256_hex("raw-invite-token"),
        alice,
        168,
    );
    invite.expires_at = Utc::now() - Duration::hours(1);
    core.store.insert_invite(&invite).await.unwrap();

    let result = core.identity.accept_invite("raw-invite-token", &bob_token).await;
    assert!(matches!(result, Err(CoreError::Expired(_))));

    let stored = core.store.find_invite(invite.invite_id).await.unwrap().unwrap();
    assert_eq!(stored.status, InviteStatus::Expired, "expiry is persisted on read");
}

#[tokio::test]
async fn test_accept_by_existing_member_still_closes_the_invite() {
    let core = spawn_core();
    let (_, owner_token, org) = core.owner_with_org("alice@example.com", "Acme").await;
    let (_, bob_token) = core.register_and_login("b@x.com").await;

    let invite = core.invite(&owner_token, org, "b@x.com", Role::Member).await;
    core.identity.accept_invite(&invite, &bob_token).await.unwrap();

    // Bob is a member now; a fresh invite for him can be created and its
    // acceptance surfaces AlreadyMember while the invite still closes out.
    let (second, second_token) = core
        .identity
        .create_invite(&owner_token, org, "b@x.com", Role::Admin)
        .await
        .unwrap();
    let result = core.identity.accept_invite(&second_token, &bob_token).await;
    assert!(matches!(result, Err(CoreError::AlreadyMember)));

    let stored = core.store.find_invite(second.invite_id).await.unwrap().unwrap();
    assert_eq!(stored.status, InviteStatus::Accepted);
}

#[tokio::test]
async fn test_concurrent_accepts_elect_a_single_winner() {
    let core = spawn_core();
    let (_, owner_token, org) = core.owner_with_org("alice@example.com", "Acme").await;
    let (_, bob_token) = core.register_and_login("b@x.com").await;
    let (_, carol_token) = core.register_and_login("c@x.com").await;

    let token = core.invite(&owner_token, org, "b@x.com", Role::Member).await;

    let (a, b) = tokio::join!(
        core.identity.accept_invite(&token, &bob_token),
        core.identity.accept_invite(&token, &carol_token),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent accept may succeed");
    for result in [a, b] {
        if let Err(err) = result {
            assert!(matches!(err, CoreError::AlreadyResolved));
        }
    }

    let members = core.store.list_members_of_scope(org).await.unwrap();
    assert_eq!(members.len(), 2, "owner plus exactly one accepted invitee");
}

#[tokio::test]
async fn test_unknown_invite_token_is_not_found() {
    let core = spawn_core();
    let (_, _, _) = core.owner_with_org("alice@example.com", "Acme").await;
    let (_, bob_token) = core.register_and_login("b@x.com").await;

    let result = core.identity.accept_invite("no-such-token", &bob_token).await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));
}
