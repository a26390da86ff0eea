pub mod invite;
pub mod membership;
pub mod organization;
pub mod otp_challenge;
pub mod recovery_token;
pub mod role;
pub mod scope;
pub mod session;
pub mod user;

pub use invite::{Invite, InviteStatus};
pub use membership::Membership;
pub use organization::{Organization, Workspace};
pub use otp_challenge::{OtpChallenge, OtpPurpose};
pub use recovery_token::RecoveryToken;
pub use role::{GlobalRole, Permission, Role};
pub use scope::{ScopeRef, ScopeType};
pub use session::AccessSession;
pub use user::{User, UserResponse};
