//! Accounts, passwords, tokens, sessions and the audit trail.

pub mod error;
pub mod event;
pub mod hash;
pub mod session;
pub mod token;
pub mod user;

pub use error::AuthError;
pub use event::{EventName, Events};
pub use session::Session;
pub use token::{IssuedToken, TokenKind, Tokens};
pub use user::{NewUser, User, Users};
