//! Shared application state, built once at startup and injected into
//! handlers as an `Extension<Arc<App>>`.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::auth::{Events, Tokens, Users};
use crate::config::Settings;
use crate::mail::Mailer;
use crate::store::Store;

use super::pages::Pages;

pub struct App {
    settings: Settings,
    store: Store,
    mailer: Arc<dyn Mailer>,
    pages: Pages,
}

impl App {
    #[must_use]
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }

    #[must_use]
    pub fn pages(&self) -> &Pages {
        &self.pages
    }

    #[must_use]
    pub fn users(&self) -> Users {
        Users::new(self.store.clone())
    }

    #[must_use]
    pub fn tokens(&self) -> Tokens {
        Tokens::new(self.store.clone())
    }

    #[must_use]
    pub fn events(&self) -> Events {
        Events::new(self.store.clone())
    }
}

#[derive(Default)]
pub struct AppBuilder {
    settings: Option<Settings>,
    store: Option<Store>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl AppBuilder {
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// # Errors
    /// Returns an error when a collaborator was not provided.
    pub fn build(self) -> Result<App> {
        let settings = self.settings.context("app state needs settings")?;
        let store = self.store.context("app state needs a store")?;
        let mailer = self.mailer.context("app state needs a mailer")?;
        let pages = Pages::new(settings.app_name());

        Ok(App {
            settings,
            store,
            mailer,
            pages,
        })
    }
}
