//! # Entrata (Form-based Authentication)
//!
//! `entrata` is a small authentication service for server-rendered web
//! applications. It owns the credential and session model, the token
//! lifecycle, and the HTTP middleware that binds per-request identity,
//! logging and request correlation to the handler stack.
//!
//! ## Accounts & Sessions
//!
//! Users register with a username, email and password. Passwords are stored
//! as Argon2id verifiers; they never leave the request handler in plaintext.
//! A session is a non-expired `login` token plus a `login` cookie on the
//! client holding its raw value. The database only ever stores SHA-256
//! digests of tokens, so a database dump cannot be replayed as a cookie.
//!
//! ## Tokens
//!
//! Three token kinds share one table: `login` (session), `confirm` (email
//! confirmation) and `reset` (password reset). Confirm and reset tokens are
//! single use: redeeming one deletes the row, and concurrent redeems are
//! resolved by the delete's affected-row count. Expired tokens are removed
//! the first time they are observed.
//!
//! ## Anti-enumeration
//!
//! The recovery flows never reveal whether an email is registered: unknown
//! addresses receive a "not registered" notice instead of an error, and the
//! forgot-password form always renders its "sent" page.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod mail;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
