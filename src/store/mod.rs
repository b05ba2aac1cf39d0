//! Narrow Postgres adapter: one explicit method per query.
//!
//! Every query is instrumented with a `db.query` span carrying
//! `db.system`, `db.operation` and `db.statement` fields so request traces
//! show exactly which statements ran.

use chrono::{DateTime, Utc};
use sqlx::{
    PgPool, Row,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{Instrument, info_span};

/// The only driver this adapter speaks.
const DRIVER_POSTGRES: &str = "postgres";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unsupported database driver: {0}")]
    UnknownDriver(String),

    #[error("invalid data source name: {source}")]
    InvalidDsn { source: sqlx::Error },

    #[error("failed to connect to database: {source}")]
    Connect { source: sqlx::Error },
}

/// A user row as stored; `auth::User` adds session-derived extras.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub admin: bool,
    pub confirmed: bool,
    pub created: DateTime<Utc>,
}

/// A token row, minus the digest the caller already knows.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub username: String,
    pub expires: DateTime<Utc>,
}

/// An audit event row.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub name: String,
    pub succeeded: bool,
    pub username: String,
    pub message: String,
    pub created: DateTime<Utc>,
}

/// When and from where a user last logged in, derived from the audit trail.
#[derive(Debug, Clone)]
pub struct LastLogin {
    pub at: DateTime<Utc>,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct Store {
    pool: PgPool,
}

fn query_span(operation: &'static str, statement: &str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

impl Store {
    /// Connect to the configured database.
    ///
    /// The driver name is validated before anything touches the network so a
    /// typo in the config fails fast with a clear error.
    ///
    /// # Errors
    /// `UnknownDriver` for anything but `postgres`, `InvalidDsn` when the
    /// DSN does not parse, `Connect` when the pool cannot be established.
    pub async fn connect(driver: &str, dsn: &str) -> Result<Self, StoreError> {
        if driver != DRIVER_POSTGRES {
            return Err(StoreError::UnknownDriver(driver.to_string()));
        }

        let options =
            PgConnectOptions::from_str(dsn).map_err(|source| StoreError::InvalidDsn { source })?;

        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect_with(options)
            .await
            .map_err(|source| StoreError::Connect { source })?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests use a lazy pool here).
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Liveness check used by the health endpoint.
    ///
    /// # Errors
    /// Returns the underlying driver error when a connection cannot be
    /// acquired or the ping fails.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        use sqlx::Connection;

        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;

        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await
    }

    // --- users ---

    pub async fn insert_user(
        &self,
        username: &str,
        hashed_password: &str,
        full_name: &str,
        email: &str,
    ) -> Result<(), sqlx::Error> {
        let query = r"
            INSERT INTO users
                (username, hashed_password, full_name, email, admin, confirmed, created)
            VALUES ($1, $2, $3, $4, false, false, NOW())
        ";
        sqlx::query(query)
            .bind(username)
            .bind(hashed_password)
            .bind(full_name)
            .bind(email)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await?;
        Ok(())
    }

    pub async fn password_for(&self, username: &str) -> Result<Option<String>, sqlx::Error> {
        let query = "SELECT hashed_password FROM users WHERE username = $1";
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;
        Ok(row.map(|row| row.get("hashed_password")))
    }

    pub async fn user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, sqlx::Error> {
        let query = r"
            SELECT username, full_name, email, admin, confirmed, created
            FROM users
            WHERE username = $1
        ";
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;
        Ok(row.map(|row| user_record(&row)))
    }

    /// Join a login token digest to its user; also returns the token expiry
    /// so the caller can enforce (and clean up) expiration.
    pub async fn user_by_login_token(
        &self,
        hashed_value: &str,
        kind: &str,
    ) -> Result<Option<(UserRecord, DateTime<Utc>)>, sqlx::Error> {
        let query = r"
            SELECT users.username, users.full_name, users.email,
                   users.admin, users.confirmed, users.created,
                   tokens.expires
            FROM tokens
            JOIN users ON users.username = tokens.username
            WHERE tokens.hashed_value = $1
              AND tokens.kind = $2
        ";
        let row = sqlx::query(query)
            .bind(hashed_value)
            .bind(kind)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;
        Ok(row.map(|row| (user_record(&row), row.get("expires"))))
    }

    pub async fn username_for_email(&self, email: &str) -> Result<Option<String>, sqlx::Error> {
        let query = "SELECT username FROM users WHERE email = $1";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;
        Ok(row.map(|row| row.get("username")))
    }

    pub async fn user_exists(&self, username: &str) -> Result<bool, sqlx::Error> {
        let query = "SELECT 1 AS present FROM users WHERE username = $1";
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;
        Ok(row.is_some())
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool, sqlx::Error> {
        let query = "SELECT 1 AS present FROM users WHERE email = $1";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;
        Ok(row.is_some())
    }

    /// Flip `confirmed` for a user that is not yet confirmed.
    /// Returns the number of rows changed (0 when already confirmed).
    pub async fn set_confirmed(&self, username: &str) -> Result<u64, sqlx::Error> {
        let query = r"
            UPDATE users
            SET confirmed = true
            WHERE username = $1
              AND NOT confirmed
        ";
        let result = sqlx::query(query)
            .bind(username)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn update_password(
        &self,
        username: &str,
        hashed_password: &str,
    ) -> Result<u64, sqlx::Error> {
        let query = "UPDATE users SET hashed_password = $2 WHERE username = $1";
        let result = sqlx::query(query)
            .bind(username)
            .bind(hashed_password)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_users(&self) -> Result<Vec<UserRecord>, sqlx::Error> {
        let query = r"
            SELECT username, full_name, email, admin, confirmed, created
            FROM users
            ORDER BY username
        ";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;
        Ok(rows.iter().map(user_record).collect())
    }

    // --- tokens ---

    /// Insert a token only when its user exists; a single conditional
    /// statement so there is no lookup/insert window. The affected-row count
    /// tells the caller whether the user was there.
    pub async fn insert_token(
        &self,
        hashed_value: &str,
        kind: &str,
        username: &str,
        expires: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let query = r"
            INSERT INTO tokens (hashed_value, kind, username, expires, created)
            SELECT $1, $2, $3, $4, NOW()
            WHERE EXISTS (SELECT 1 FROM users WHERE username = $3)
        ";
        let result = sqlx::query(query)
            .bind(hashed_value)
            .bind(kind)
            .bind(username)
            .bind(expires)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn token_for(
        &self,
        hashed_value: &str,
        kind: &str,
    ) -> Result<Option<TokenRecord>, sqlx::Error> {
        let query = r"
            SELECT username, expires
            FROM tokens
            WHERE hashed_value = $1
              AND kind = $2
        ";
        let row = sqlx::query(query)
            .bind(hashed_value)
            .bind(kind)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;
        Ok(row.map(|row| TokenRecord {
            username: row.get("username"),
            expires: row.get("expires"),
        }))
    }

    /// Delete a token row. The affected-row count is how single-use redeem
    /// races are decided: whoever deletes the row wins it.
    pub async fn delete_token(&self, hashed_value: &str, kind: &str) -> Result<u64, sqlx::Error> {
        let query = "DELETE FROM tokens WHERE hashed_value = $1 AND kind = $2";
        let result = sqlx::query(query)
            .bind(hashed_value)
            .bind(kind)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await?;
        Ok(result.rows_affected())
    }

    // --- events ---

    pub async fn insert_event(
        &self,
        name: &str,
        succeeded: bool,
        username: &str,
        message: &str,
    ) -> Result<u64, sqlx::Error> {
        let query = r"
            INSERT INTO events (name, succeeded, username, message)
            VALUES ($1, $2, $3, $4)
        ";
        let result = sqlx::query(query)
            .bind(name)
            .bind(succeeded)
            .bind(username)
            .bind(message)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_events(&self) -> Result<Vec<EventRecord>, sqlx::Error> {
        let query = r"
            SELECT name, succeeded, username, message, created
            FROM events
            ORDER BY created DESC
        ";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| EventRecord {
                name: row.get("name"),
                succeeded: row.get("succeeded"),
                username: row.get("username"),
                message: row.get("message"),
                created: row.get("created"),
            })
            .collect())
    }

    /// The login before the current one: the most recent successful `login`
    /// event is the session being served, so skip it.
    pub async fn previous_login_event(
        &self,
        username: &str,
    ) -> Result<Option<LastLogin>, sqlx::Error> {
        let query = r"
            SELECT created, message
            FROM events
            WHERE name = 'login'
              AND succeeded = true
              AND username = $1
            ORDER BY created DESC
            LIMIT 1 OFFSET 1
        ";
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;
        Ok(row.map(|row| LastLogin {
            at: row.get("created"),
            message: row.get("message"),
        }))
    }
}

fn user_record(row: &sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        username: row.get("username"),
        full_name: row.get("full_name"),
        email: row.get("email"),
        admin: row.get("admin"),
        confirmed: row.get("confirmed"),
        created: row.get("created"),
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Name the colliding field of a unique violation from its constraint name.
pub(crate) fn duplicate_field(err: &sqlx::Error) -> Option<&'static str> {
    if !is_unique_violation(err) {
        return None;
    }
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };
    match db_err.constraint() {
        Some(name) if name.contains("email") => Some("email"),
        _ => Some("username"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[tokio::test]
    async fn connect_rejects_unknown_driver() {
        let result = Store::connect("mysql", "mysql://localhost/app").await;
        match result {
            Err(StoreError::UnknownDriver(driver)) => assert_eq!(driver, "mysql"),
            other => panic!("expected UnknownDriver, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_rejects_bad_dsn() {
        let result = Store::connect("postgres", "not a dsn at all").await;
        assert!(matches!(result, Err(StoreError::InvalidDsn { .. })));
    }

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
        constraint: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn constraint(&self) -> Option<&str> {
            self.constraint
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    fn db_error(code: Option<&'static str>, constraint: Option<&'static str>) -> sqlx::Error {
        sqlx::Error::Database(Box::new(TestDbError { code, constraint }))
    }

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        assert!(is_unique_violation(&db_error(Some("23505"), None)));
        assert!(!is_unique_violation(&db_error(Some("99999"), None)));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn duplicate_field_reads_constraint_name() {
        assert_eq!(
            duplicate_field(&db_error(Some("23505"), Some("users_email_key"))),
            Some("email")
        );
        assert_eq!(
            duplicate_field(&db_error(Some("23505"), Some("users_pkey"))),
            Some("username")
        );
        assert_eq!(duplicate_field(&db_error(Some("99999"), None)), None);
        assert_eq!(
            duplicate_field(&db_error(None, Some("users_email_key"))),
            None
        );
        assert_eq!(duplicate_field(&sqlx::Error::RowNotFound), None);
    }
}
