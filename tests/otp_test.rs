mod common;

use chrono::{Duration, Utc};
use common::spawn_core;
use identity_service::error::CoreError;
use identity_service::models::{OtpChallenge, OtpPurpose};
use identity_service::store::IdentityStore;
use identity_service::utils::sha256_hex;

const EMAIL: &str = "alice@example.com";

#[tokio::test]
async fn test_new_request_supersedes_the_previous_challenge() {
    let core = spawn_core();
    core.register(EMAIL).await;

    core.identity
        .request_otp(EMAIL, OtpPurpose::EmailVerify)
        .await
        .unwrap();
    let old_code = core.last_otp_code(EMAIL, OtpPurpose::EmailVerify);

    core.identity
        .request_otp(EMAIL, OtpPurpose::EmailVerify)
        .await
        .unwrap();
    let new_code = core.last_otp_code(EMAIL, OtpPurpose::EmailVerify);

    let result = core
        .identity
        .verify_otp(EMAIL, OtpPurpose::EmailVerify, &old_code, None)
        .await;
    assert!(
        matches!(result, Err(CoreError::Invalid) | Err(CoreError::NotFound(_))),
        "superseded code must never verify"
    );

    core.identity
        .verify_otp(EMAIL, OtpPurpose::EmailVerify, &new_code, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_purposes_are_isolated() {
    let core = spawn_core();
    core.register(EMAIL).await;

    // Registration issued an email-verify code; request a password-change
    // code and try to replay it for verification.
    core.identity
        .request_otp(EMAIL, OtpPurpose::PasswordChange)
        .await
        .unwrap();
    let change_code = core.last_otp_code(EMAIL, OtpPurpose::PasswordChange);

    let result = core
        .identity
        .verify_otp(EMAIL, OtpPurpose::EmailVerify, &change_code, None)
        .await;
    assert!(matches!(result, Err(CoreError::Invalid)));
}

#[tokio::test]
async fn test_verify_succeeds_exactly_once() {
    let core = spawn_core();
    core.register(EMAIL).await;
    let code = core.last_otp_code(EMAIL, OtpPurpose::EmailVerify);

    core.identity
        .verify_otp(EMAIL, OtpPurpose::EmailVerify, &code, None)
        .await
        .unwrap();

    let replay = core
        .identity
        .verify_otp(EMAIL, OtpPurpose::EmailVerify, &code, None)
        .await;
    assert!(matches!(replay, Err(CoreError::AlreadyConsumed)));
}

#[tokio::test]
async fn test_wrong_guesses_exhaust_the_challenge() {
    let core = spawn_core();
    core.register(EMAIL).await;

    // Plant a challenge with a single attempt left.
    let challenge = OtpChallenge {
        attempts_remaining: 1,
        ..OtpChallenge::new(
            EMAIL.to_string(),
            OtpPurpose::EmailVerify,
            sha256_hex("123456"),
            10,
            5,
        )
    };
    core.store.put_challenge(&challenge).await.unwrap();

    let wrong = core
        .identity
        .verify_otp(EMAIL, OtpPurpose::EmailVerify, "000000", None)
        .await;
    assert!(matches!(wrong, Err(CoreError::Invalid)));

    // The correct code no longer helps: attempts ran out.
    let correct = core
        .identity
        .verify_otp(EMAIL, OtpPurpose::EmailVerify, "123456", None)
        .await;
    assert!(matches!(correct, Err(CoreError::Exhausted)));
}

#[tokio::test]
async fn test_expired_challenge_is_discarded_on_verify() {
    let core = spawn_core();
    core.register(EMAIL).await;

    let mut challenge = OtpChallenge::new(
        EMAIL.to_string(),
        OtpPurpose::EmailVerify,
        sha256_hex("123456"),
        10,
        5,
    );
    challenge.expires_at = Utc::now() - Duration::minutes(1);
    core.store.put_challenge(&challenge).await.unwrap();

    let result = core
        .identity
        .verify_otp(EMAIL, OtpPurpose::EmailVerify, "123456", None)
        .await;
    assert!(matches!(result, Err(CoreError::Expired(_))));

    let result = core
        .identity
        .verify_otp(EMAIL, OtpPurpose::EmailVerify, "123456", None)
        .await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_verify_without_a_challenge_is_not_found() {
    let core = spawn_core();
    core.register(EMAIL).await;

    let result = core
        .identity
        .verify_otp(EMAIL, OtpPurpose::PasswordChange, "123456", Some("new-password-1"))
        .await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_concurrent_verifies_elect_a_single_winner() {
    let core = spawn_core();
    core.register(EMAIL).await;
    let code = core.last_otp_code(EMAIL, OtpPurpose::EmailVerify);

    let (a, b) = tokio::join!(
        core.identity
            .verify_otp(EMAIL, OtpPurpose::EmailVerify, &code, None),
        core.identity
            .verify_otp(EMAIL, OtpPurpose::EmailVerify, &code, None),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent verify may succeed");
    for result in [a, b] {
        if let Err(err) = result {
            assert!(matches!(err, CoreError::AlreadyConsumed));
        }
    }
}
