//! Audit events: a closed set of names, written best-effort.

use anyhow::{Context, Result, anyhow};
use tracing::error;

use crate::store::{EventRecord, Store};

/// Every event the system records. The wire names are the `name` column
/// values; the closed enum keeps them inside the column's 10-character
/// limit by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventName {
    Login,
    Logout,
    Register,
    SaveToken,
    ResetPass,
    Confirmed,
}

impl EventName {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Register => "register",
            Self::SaveToken => "save_token",
            Self::ResetPass => "reset_pass",
            Self::Confirmed => "confirmed",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Events {
    store: Store,
}

impl Events {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Append one event row.
    ///
    /// # Errors
    /// Returns an error when the insert fails or affects an unexpected
    /// number of rows (an over-long username, for instance, surfaces here
    /// as the store's length error).
    pub async fn write(
        &self,
        name: EventName,
        succeeded: bool,
        username: &str,
        message: &str,
    ) -> Result<()> {
        let affected = self
            .store
            .insert_event(name.as_str(), succeeded, username, message)
            .await
            .context("failed to insert event")?;
        if affected != 1 {
            return Err(anyhow!(
                "event insert affected {affected} rows, expected 1"
            ));
        }
        Ok(())
    }

    /// Best-effort write: audit must never block the primary flow, so
    /// failures are logged and swallowed.
    pub async fn record(&self, name: EventName, succeeded: bool, username: &str, message: &str) {
        if let Err(err) = self.write(name, succeeded, username, message).await {
            error!("Failed to record {} event: {err}", name.as_str());
        }
    }

    /// All events, most recent first.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub async fn list(&self) -> Result<Vec<EventRecord>> {
        self.store.list_events().await.context("failed to list events")
    }
}
