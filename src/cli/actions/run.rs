use super::{Action, server};
use anyhow::Result;

// The match lives here so `mod.rs` stays small as actions are added.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => server::execute(args).await,
    }
}
