mod common;

use common::{spawn_core, PASSWORD};
use identity_service::error::CoreError;
use identity_service::models::OtpPurpose;

#[tokio::test]
async fn test_register_issues_verification_code_and_verify_marks_email() {
    let core = spawn_core();
    let (_, token) = core.register_and_login("alice@example.com").await;

    let user = core.identity.current_user(&token).await.unwrap();
    assert!(!user.email_verified);

    let code = core.last_otp_code("alice@example.com", OtpPurpose::EmailVerify);
    core.identity
        .verify_otp("alice@example.com", OtpPurpose::EmailVerify, &code, None)
        .await
        .unwrap();

    let user = core.identity.current_user(&token).await.unwrap();
    assert!(user.email_verified);
}

#[tokio::test]
async fn test_duplicate_registration_is_rejected_case_insensitively() {
    let core = spawn_core();
    core.register("alice@example.com").await;

    let result = core
        .identity
        .register("Alice@Example.COM", PASSWORD, None)
        .await;
    assert!(matches!(result, Err(CoreError::EmailTaken)));
}

#[tokio::test]
async fn test_login_failures_are_uniform() {
    let core = spawn_core();
    core.register("alice@example.com").await;

    let wrong_password = core.identity.login("alice@example.com", "not-it").await;
    assert!(matches!(wrong_password, Err(CoreError::InvalidCredentials)));

    let unknown_user = core.identity.login("nobody@example.com", PASSWORD).await;
    assert!(matches!(unknown_user, Err(CoreError::InvalidCredentials)));
}

#[tokio::test]
async fn test_logout_revokes_the_session_immediately() {
    let core = spawn_core();
    let (_, token) = core.register_and_login("alice@example.com").await;

    assert!(core.identity.current_user(&token).await.is_ok());
    core.identity.logout(&token).await.unwrap();

    let result = core.identity.current_user(&token).await;
    assert!(matches!(result, Err(CoreError::InvalidCredentials)));

    // Logout is idempotent.
    core.identity.logout(&token).await.unwrap();
}

#[tokio::test]
async fn test_change_password_keeps_current_session_and_drops_the_rest() {
    let core = spawn_core();
    let (_, current) = core.register_and_login("alice@example.com").await;
    let other = core.login("alice@example.com").await;

    core.identity
        .change_password(&current, PASSWORD, "a-brand-new-password")
        .await
        .unwrap();

    assert!(core.identity.current_user(&current).await.is_ok());
    assert!(matches!(
        core.identity.current_user(&other).await,
        Err(CoreError::InvalidCredentials)
    ));

    assert!(matches!(
        core.identity.login("alice@example.com", PASSWORD).await,
        Err(CoreError::InvalidCredentials)
    ));
    core.identity
        .login("alice@example.com", "a-brand-new-password")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_change_password_requires_the_current_password() {
    let core = spawn_core();
    let (_, token) = core.register_and_login("alice@example.com").await;

    let result = core
        .identity
        .change_password(&token, "wrong-current", "a-brand-new-password")
        .await;
    assert!(matches!(result, Err(CoreError::InvalidCredentials)));
}

#[tokio::test]
async fn test_otp_password_change_revokes_every_session() {
    let core = spawn_core();
    let (_, session_a) = core.register_and_login("alice@example.com").await;
    let session_b = core.login("alice@example.com").await;

    core.identity
        .request_otp("alice@example.com", OtpPurpose::PasswordChange)
        .await
        .unwrap();
    let code = core.last_otp_code("alice@example.com", OtpPurpose::PasswordChange);
    core.identity
        .verify_otp(
            "alice@example.com",
            OtpPurpose::PasswordChange,
            &code,
            Some("a-brand-new-password"),
        )
        .await
        .unwrap();

    assert!(matches!(
        core.identity.current_user(&session_a).await,
        Err(CoreError::InvalidCredentials)
    ));
    assert!(matches!(
        core.identity.current_user(&session_b).await,
        Err(CoreError::InvalidCredentials)
    ));
    core.identity
        .login("alice@example.com", "a-brand-new-password")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_password_change_purpose_requires_a_new_password() {
    let core = spawn_core();
    core.register("alice@example.com").await;

    core.identity
        .request_otp("alice@example.com", OtpPurpose::PasswordChange)
        .await
        .unwrap();
    let code = core.last_otp_code("alice@example.com", OtpPurpose::PasswordChange);

    let result = core
        .identity
        .verify_otp("alice@example.com", OtpPurpose::PasswordChange, &code, None)
        .await;
    assert!(matches!(result, Err(CoreError::BadRequest(_))));

    // The failed call must not have burned the challenge.
    core.identity
        .verify_otp(
            "alice@example.com",
            OtpPurpose::PasswordChange,
            &code,
            Some("a-brand-new-password"),
        )
        .await
        .unwrap();
}
