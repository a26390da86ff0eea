//! Shared setup for the integration tests.
//!
//! Everything runs against the in-memory store; outbound email is captured
//! by the mock notifier so tests can read back the codes and tokens that
//! would have been delivered.

#![allow(dead_code)]

use std::sync::Arc;

use identity_service::models::{OtpPurpose, Role, ScopeRef};
use identity_service::services::{IdentityService, MockNotifier};
use identity_service::store::MemoryStore;
use uuid::Uuid;

pub const PASSWORD: &str = "correct-horse-battery";

pub struct TestCore {
    pub identity: IdentityService,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<MockNotifier>,
}

pub fn spawn_core() -> TestCore {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(MockNotifier::new());
    let identity = IdentityService::new(store.clone(), notifier.clone(), 24)
        .expect("failed to build identity service");
    TestCore {
        identity,
        store,
        notifier,
    }
}

impl TestCore {
    /// Register a user with the shared test password.
    pub async fn register(&self, email: &str) -> Uuid {
        self.identity
            .register(email, PASSWORD, None)
            .await
            .expect("registration failed")
            .user_id
    }

    /// Log a user in with the shared test password.
    pub async fn login(&self, email: &str) -> String {
        self.identity
            .login(email, PASSWORD)
            .await
            .expect("login failed")
            .0
    }

    pub async fn register_and_login(&self, email: &str) -> (Uuid, String) {
        let user_id = self.register(email).await;
        let token = self.login(email).await;
        (user_id, token)
    }

    /// Register, log in, and create an organization owned by the new user.
    pub async fn owner_with_org(&self, email: &str, org_name: &str) -> (Uuid, String, ScopeRef) {
        let (user_id, token) = self.register_and_login(email).await;
        let org = self
            .identity
            .create_organization(&token, org_name.to_string())
            .await
            .expect("organization creation failed");
        (user_id, token, ScopeRef::organization(org.org_id))
    }

    /// Invite `email` to `scope` and return the raw invite token.
    pub async fn invite(
        &self,
        inviter_token: &str,
        scope: ScopeRef,
        email: &str,
        role: Role,
    ) -> String {
        self.identity
            .create_invite(inviter_token, scope, email, role)
            .await
            .expect("invite creation failed")
            .1
    }

    pub fn last_otp_code(&self, email: &str, purpose: OtpPurpose) -> String {
        self.notifier
            .last_otp_code(email, purpose)
            .expect("no OTP code captured")
    }

    pub fn last_recovery_token(&self, email: &str) -> String {
        self.notifier
            .last_recovery_token(email)
            .expect("no recovery token captured")
    }
}
