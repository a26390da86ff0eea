pub mod authz;
pub mod credentials;
pub mod identity;
pub mod invites;
pub mod membership;
pub mod notify;
pub mod otp;
pub mod recovery;
pub mod sessions;

pub use authz::AuthorizationGate;
pub use credentials::CredentialStore;
pub use identity::IdentityService;
pub use invites::InviteLifecycleManager;
pub use membership::MembershipGraph;
pub use notify::{MockNotifier, Notifier, OutboundMessage, SmtpNotifier};
pub use otp::OtpChallengeEngine;
pub use recovery::RecoveryTokenEngine;
pub use sessions::SessionTokenManager;
