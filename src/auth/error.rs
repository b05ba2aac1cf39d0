//! Error taxonomy for the auth domain.
//!
//! Flow handlers match on these variants to pick user-facing messages;
//! anything they do not handle explicitly collapses to an internal error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// No token was presented (empty or missing form field / cookie value).
    #[error("token missing")]
    TokenMissing,

    /// The presented token has no matching row for its kind.
    #[error("token not found")]
    TokenNotFound,

    /// The token row existed but was past its expiry; the row has been removed.
    #[error("token expired")]
    TokenExpired,

    #[error("user not found")]
    UserNotFound,

    #[error("invalid password")]
    InvalidPassword,

    /// Unique constraint violation on registration; the field names which
    /// value collided ("username" or "email").
    #[error("duplicate {0}")]
    Duplicate(&'static str),

    #[error("password hashing failed: {0}")]
    Hash(argon2::password_hash::Error),

    #[error("random generator failure: {0}")]
    Rng(#[from] rand::Error),

    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),
}

impl AuthError {
    /// True for the variants a session binder treats as "no session"
    /// rather than a failure: the cookie should be cleared and the
    /// request continues anonymously.
    #[must_use]
    pub const fn clears_session(&self) -> bool {
        matches!(
            self,
            Self::TokenMissing | Self::TokenNotFound | Self::TokenExpired
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clears_session_only_for_token_kinds() {
        assert!(AuthError::TokenMissing.clears_session());
        assert!(AuthError::TokenNotFound.clears_session());
        assert!(AuthError::TokenExpired.clears_session());
        assert!(!AuthError::UserNotFound.clears_session());
        assert!(!AuthError::InvalidPassword.clears_session());
        assert!(!AuthError::Duplicate("email").clears_session());
    }

    #[test]
    fn display_names_duplicate_field() {
        assert_eq!(
            AuthError::Duplicate("username").to_string(),
            "duplicate username"
        );
    }
}
