use crate::{api, config, mail::LogMailer, store::Store};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub config_path: String,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the configuration is missing or invalid, the
/// database is unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let settings = config::load(Path::new(&args.config_path))
        .with_context(|| format!("Failed to load configuration: {}", args.config_path))?
        .validate()
        .context("Invalid configuration")?;

    debug!("Settings: {:?}", settings);

    let store = Store::connect(settings.driver_name(), settings.data_source_name())
        .await
        .context("Failed to connect to database")?;

    let app = Arc::new(
        api::App::builder()
            .settings(settings)
            .store(store)
            .mailer(Arc::new(LogMailer))
            .build()?,
    );

    api::serve(args.port, app).await
}
