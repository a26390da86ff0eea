mod common;

use common::spawn_core;
use identity_service::error::CoreError;
use identity_service::models::{GlobalRole, Permission, Role, ScopeRef};
use identity_service::store::IdentityStore;

#[tokio::test]
async fn test_creator_becomes_owner() {
    let core = spawn_core();
    let (alice, _, org) = core.owner_with_org("alice@example.com", "Acme").await;

    let role = core.identity.graph().role_at(alice, org).await.unwrap();
    assert_eq!(role, Some(Role::Owner));

    let permissions = core
        .identity
        .graph()
        .effective_permissions(alice, org)
        .await
        .unwrap();
    assert!(permissions.contains(&Permission::ManageRoles));
    assert!(permissions.contains(&Permission::DeleteScope));
}

#[tokio::test]
async fn test_non_members_resolve_to_no_permissions() {
    let core = spawn_core();
    let (_, _, org) = core.owner_with_org("alice@example.com", "Acme").await;
    let (bob, _) = core.register_and_login("bob@example.com").await;

    assert_eq!(core.identity.graph().role_at(bob, org).await.unwrap(), None);
    let permissions = core
        .identity
        .graph()
        .effective_permissions(bob, org)
        .await
        .unwrap();
    assert!(permissions.is_empty());
}

#[tokio::test]
async fn test_member_cannot_change_roles() {
    let core = spawn_core();
    let (_, owner_token, org) = core.owner_with_org("alice@example.com", "Acme").await;
    let (bob, bob_token) = core.register_and_login("bob@example.com").await;
    let (carol, carol_token) = core.register_and_login("carol@example.com").await;

    let invite = core.invite(&owner_token, org, "bob@example.com", Role::Member).await;
    core.identity.accept_invite(&invite, &bob_token).await.unwrap();
    let invite = core.invite(&owner_token, org, "carol@example.com", Role::Member).await;
    core.identity.accept_invite(&invite, &carol_token).await.unwrap();

    let result = core
        .identity
        .change_role(&bob_token, carol, org, Role::Admin)
        .await;
    assert!(matches!(result, Err(CoreError::Forbidden)));

    // The owner can.
    core.identity
        .change_role(&owner_token, bob, org, Role::Admin)
        .await
        .unwrap();
    assert_eq!(
        core.identity.graph().role_at(bob, org).await.unwrap(),
        Some(Role::Admin)
    );
}

#[tokio::test]
async fn test_sole_owner_cannot_be_demoted_or_removed() {
    let core = spawn_core();
    let (alice, owner_token, org) = core.owner_with_org("alice@example.com", "Acme").await;

    let demotion = core
        .identity
        .change_role(&owner_token, alice, org, Role::Member)
        .await;
    assert!(matches!(demotion, Err(CoreError::SelfDemotionBlocked)));
    assert_eq!(
        core.identity.graph().role_at(alice, org).await.unwrap(),
        Some(Role::Owner),
        "failed demotion must leave membership unchanged"
    );

    let removal = core.identity.remove_member(&owner_token, alice, org).await;
    assert!(matches!(removal, Err(CoreError::SelfDemotionBlocked)));
}

#[tokio::test]
async fn test_demotion_is_allowed_once_another_owner_exists() {
    let core = spawn_core();
    let (alice, owner_token, org) = core.owner_with_org("alice@example.com", "Acme").await;
    let (bob, bob_token) = core.register_and_login("bob@example.com").await;

    let invite = core.invite(&owner_token, org, "bob@example.com", Role::Member).await;
    core.identity.accept_invite(&invite, &bob_token).await.unwrap();
    core.identity
        .change_role(&owner_token, bob, org, Role::Owner)
        .await
        .unwrap();

    core.identity
        .change_role(&owner_token, alice, org, Role::Member)
        .await
        .unwrap();
    assert_eq!(
        core.identity.graph().role_at(alice, org).await.unwrap(),
        Some(Role::Member)
    );
}

#[tokio::test]
async fn test_members_may_leave_but_the_last_owner_may_not() {
    let core = spawn_core();
    let (_, owner_token, org) = core.owner_with_org("alice@example.com", "Acme").await;
    let (bob, bob_token) = core.register_and_login("bob@example.com").await;

    let invite = core.invite(&owner_token, org, "bob@example.com", Role::Member).await;
    core.identity.accept_invite(&invite, &bob_token).await.unwrap();

    // Self-removal needs no permission.
    core.identity.remove_member(&bob_token, bob, org).await.unwrap();
    assert_eq!(core.identity.graph().role_at(bob, org).await.unwrap(), None);
}

#[tokio::test]
async fn test_workspace_membership_is_independent_of_the_organization() {
    let core = spawn_core();
    let (alice, owner_token, org) = core.owner_with_org("alice@example.com", "Acme").await;
    let (bob, bob_token) = core.register_and_login("bob@example.com").await;

    let invite = core.invite(&owner_token, org, "bob@example.com", Role::Member).await;
    core.identity.accept_invite(&invite, &bob_token).await.unwrap();

    let workspace = core
        .identity
        .create_workspace(&owner_token, org.scope_id, "Platform".to_string())
        .await
        .unwrap();
    let ws = ScopeRef::workspace(workspace.workspace_id);

    // The org owner was materialized as workspace owner; the org member got
    // nothing at the workspace.
    assert_eq!(
        core.identity.graph().role_at(alice, ws).await.unwrap(),
        Some(Role::Owner)
    );
    assert_eq!(core.identity.graph().role_at(bob, ws).await.unwrap(), None);
    assert!(core
        .identity
        .graph()
        .effective_permissions(bob, ws)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_workspace_creation_requires_permission_at_the_org() {
    let core = spawn_core();
    let (_, owner_token, org) = core.owner_with_org("alice@example.com", "Acme").await;
    let (_, bob_token) = core.register_and_login("bob@example.com").await;

    let invite = core.invite(&owner_token, org, "bob@example.com", Role::Member).await;
    core.identity.accept_invite(&invite, &bob_token).await.unwrap();

    let result = core
        .identity
        .create_workspace(&bob_token, org.scope_id, "Shadow".to_string())
        .await;
    assert!(matches!(result, Err(CoreError::Forbidden)));
}

#[tokio::test]
async fn test_global_admin_holds_every_permission_everywhere() {
    let core = spawn_core();
    let (_, _, org) = core.owner_with_org("alice@example.com", "Acme").await;
    let (root, _) = core.register_and_login("root@example.com").await;
    core.store
        .set_global_role(root, GlobalRole::Admin)
        .await
        .unwrap();

    core.identity
        .gate()
        .require(root, org, Permission::ManageRoles)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_list_organizations_reflects_memberships() {
    let core = spawn_core();
    let (_, owner_token, org) = core.owner_with_org("alice@example.com", "Acme").await;
    let (_, bob_token) = core.register_and_login("bob@example.com").await;

    assert!(core
        .identity
        .list_organizations(&bob_token)
        .await
        .unwrap()
        .is_empty());

    let invite = core.invite(&owner_token, org, "bob@example.com", Role::Member).await;
    core.identity.accept_invite(&invite, &bob_token).await.unwrap();

    let orgs = core.identity.list_organizations(&bob_token).await.unwrap();
    assert_eq!(orgs.len(), 1);
    assert_eq!(orgs[0].name, "Acme");
}
