//! Account identity: credential policy, sessions, and the master directory.

pub mod directory;
pub mod mailer;
pub mod password;
pub mod session;

pub use directory::{
    AuthenticatedAccount, MasterDirectory, NormalizedEmail, RegisteredAccount, ResetDelivery,
};
pub use mailer::ResetMailer;
pub use session::{SessionClaims, SessionKeys};
