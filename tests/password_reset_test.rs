mod common;

use chrono::{Duration, Utc};
use common::{spawn_core, PASSWORD};
use identity_service::error::CoreError;
use identity_service::models::RecoveryToken;
use identity_service::store::IdentityStore;
use identity_service::utils::sha256_hex;

const EMAIL: &str = "alice@example.com";

#[tokio::test]
async fn test_unknown_email_is_indistinguishable_from_success() {
    let core = spawn_core();

    core.identity
        .request_password_reset("nobody@example.com")
        .await
        .unwrap();

    assert!(
        core.notifier.last_recovery_token("nobody@example.com").is_none(),
        "nothing may be sent for an unknown email"
    );
}

#[tokio::test]
async fn test_reset_flow_installs_password_and_revokes_sessions() {
    let core = spawn_core();
    let (_, session) = core.register_and_login(EMAIL).await;

    core.identity.request_password_reset(EMAIL).await.unwrap();
    let token = core.last_recovery_token(EMAIL);

    core.identity
        .reset_password(&token, "a-brand-new-password")
        .await
        .unwrap();

    assert!(matches!(
        core.identity.current_user(&session).await,
        Err(CoreError::InvalidCredentials)
    ));
    assert!(matches!(
        core.identity.login(EMAIL, PASSWORD).await,
        Err(CoreError::InvalidCredentials)
    ));
    core.identity
        .login(EMAIL, "a-brand-new-password")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_second_request_supersedes_the_first_token() {
    let core = spawn_core();
    core.register(EMAIL).await;

    core.identity.request_password_reset(EMAIL).await.unwrap();
    let first = core.last_recovery_token(EMAIL);

    core.identity.request_password_reset(EMAIL).await.unwrap();
    let second = core.last_recovery_token(EMAIL);
    assert_ne!(first, second);

    let result = core.identity.reset_password(&first, "a-brand-new-password").await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));

    core.identity
        .reset_password(&second, "a-brand-new-password")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_token_is_single_use() {
    let core = spawn_core();
    core.register(EMAIL).await;

    core.identity.request_password_reset(EMAIL).await.unwrap();
    let token = core.last_recovery_token(EMAIL);

    core.identity
        .reset_password(&token, "a-brand-new-password")
        .await
        .unwrap();

    let replay = core.identity.reset_password(&token, "yet-another-password").await;
    assert!(matches!(replay, Err(CoreError::AlreadyConsumed)));
}

#[tokio::test]
async fn test_expired_token_is_rejected_and_discarded() {
    let core = spawn_core();
    core.register(EMAIL).await;

    let mut record = RecoveryToken::new(EMAIL.to_string(), sha256_hex("raw-token"), 60);
    record.expires_at = Utc::now() - Duration::minutes(1);
    core.store.put_recovery_token(&record).await.unwrap();

    let result = core.identity.reset_password("raw-token", "a-brand-new-password").await;
    assert!(matches!(result, Err(CoreError::Expired(_))));

    let result = core.identity.reset_password("raw-token", "a-brand-new-password").await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_concurrent_consumes_elect_a_single_winner() {
    let core = spawn_core();
    core.register(EMAIL).await;

    core.identity.request_password_reset(EMAIL).await.unwrap();
    let token = core.last_recovery_token(EMAIL);

    let (a, b) = tokio::join!(
        core.identity.reset_password(&token, "a-brand-new-password"),
        core.identity.reset_password(&token, "a-different-password"),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent consume may succeed");
    for result in [a, b] {
        if let Err(err) = result {
            assert!(matches!(err, CoreError::AlreadyConsumed));
        }
    }
}
