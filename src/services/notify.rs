//! Notification dispatch.
//!
//! The core never sends email itself: it produces the message content and
//! hands it to a [`Notifier`]. The SMTP implementation delegates to lettre;
//! tests use [`MockNotifier`] and read captured messages back.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};

use crate::config::SmtpConfig;
use crate::error::CoreError;
use crate::models::{OtpPurpose, Role, ScopeType};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a one-time code. The raw code exists only in this call and in
    /// the recipient's inbox.
    async fn send_otp_code(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<(), CoreError>;

    /// Deliver a password-reset link carrying the raw recovery token.
    async fn send_recovery_link(&self, email: &str, token: &str) -> Result<(), CoreError>;

    /// Deliver an invite link carrying the raw invite token.
    async fn send_invite(
        &self,
        email: &str,
        token: &str,
        scope_type: ScopeType,
        role: Role,
    ) -> Result<(), CoreError>;
}

/// SMTP-backed notifier.
pub struct SmtpNotifier {
    mailer: SmtpTransport,
    from_address: String,
    base_url: String,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig, base_url: String) -> Result<Self, CoreError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| CoreError::Email(e.to_string()))?
            .credentials(creds)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "SMTP notifier initialized");

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            base_url,
        })
    }

    async fn send(&self, to_email: &str, subject: &str, body: String) -> Result<(), CoreError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|e: lettre::address::AddressError| CoreError::Email(e.to_string()))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| CoreError::Email(e.to_string()))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| CoreError::Email(e.to_string()))?;

        // SMTP transport is blocking; keep it off the async runtime.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| CoreError::Internal(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(to = %to_email, error = %e, "Failed to send email");
                Err(CoreError::Email(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_otp_code(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<(), CoreError> {
        let (subject, action) = match purpose {
            OtpPurpose::EmailVerify => ("Verify your email", "verify your email address"),
            OtpPurpose::PasswordChange => ("Change your password", "change your password"),
        };
        let body = format!(
            "Your one-time code to {action} is: {code}\n\n\
             The code expires in 10 minutes. If you did not request it, you can ignore this email.\n"
        );
        self.send(email, subject, body).await
    }

    async fn send_recovery_link(&self, email: &str, token: &str) -> Result<(), CoreError> {
        let link = format!("{}/auth/password-reset/confirm?token={}", self.base_url, token);
        let body = format!(
            "A password reset was requested for this address.\n\n\
             Reset your password: {link}\n\n\
             The link expires in 1 hour. If you did not request it, you can ignore this email.\n"
        );
        self.send(email, "Reset your password", body).await
    }

    async fn send_invite(
        &self,
        email: &str,
        token: &str,
        scope_type: ScopeType,
        role: Role,
    ) -> Result<(), CoreError> {
        let link = format!("{}/invites/{}/accept", self.base_url, token);
        let body = format!(
            "You have been invited to join a {} as {}.\n\n\
             Accept the invite: {link}\n\n\
             The invite expires in 7 days.\n",
            scope_type.as_str(),
            role.as_str(),
        );
        self.send(email, "You have been invited", body).await
    }
}

/// Message captured by [`MockNotifier`].
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    OtpCode {
        email: String,
        code: String,
        purpose: OtpPurpose,
    },
    RecoveryLink {
        email: String,
        token: String,
    },
    Invite {
        email: String,
        token: String,
        scope_type: ScopeType,
        role: Role,
    },
}

/// Captures outbound messages instead of delivering them.
#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }

    /// The most recent OTP code sent to `email` for `purpose`.
    pub fn last_otp_code(&self, email: &str, purpose: OtpPurpose) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find_map(|message| match message {
                OutboundMessage::OtpCode {
                    email: to,
                    code,
                    purpose: p,
                } if to == email && p == purpose => Some(code),
                _ => None,
            })
    }

    /// The most recent recovery token sent to `email`.
    pub fn last_recovery_token(&self, email: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find_map(|message| match message {
                OutboundMessage::RecoveryLink { email: to, token } if to == email => Some(token),
                _ => None,
            })
    }

    /// The most recent invite token sent to `email`.
    pub fn last_invite_token(&self, email: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find_map(|message| match message {
                OutboundMessage::Invite { email: to, token, .. } if to == email => Some(token),
                _ => None,
            })
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_otp_code(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<(), CoreError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(OutboundMessage::OtpCode {
                email: email.to_string(),
                code: code.to_string(),
                purpose,
            });
        Ok(())
    }

    async fn send_recovery_link(&self, email: &str, token: &str) -> Result<(), CoreError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(OutboundMessage::RecoveryLink {
                email: email.to_string(),
                token: token.to_string(),
            });
        Ok(())
    }

    async fn send_invite(
        &self,
        email: &str,
        token: &str,
        scope_type: ScopeType,
        role: Role,
    ) -> Result<(), CoreError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(OutboundMessage::Invite {
                email: email.to_string(),
                token: token.to_string(),
                scope_type,
                role,
            });
        Ok(())
    }
}
