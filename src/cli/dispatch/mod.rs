//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action the binary will execute.

use crate::cli::actions::{Action, server::Args};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let config_path = matches
        .get_one::<String>("config")
        .cloned()
        .context("missing required argument: --config")?;

    Ok(Action::Server(Args { port, config_path }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_map_to_a_server_action() {
        temp_env::with_vars(
            [
                ("ENTRATA_CONFIG", None::<&str>),
                ("ENTRATA_PORT", None::<&str>),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["entrata"]);
                let action = handler(&matches).expect("server action");
                let Action::Server(args) = action;
                assert_eq!(args.port, 8080);
                assert_eq!(args.config_path, "config.json");
            },
        );
    }

    #[test]
    fn env_overrides_reach_the_action() {
        temp_env::with_vars(
            [
                ("ENTRATA_CONFIG", Some("/etc/entrata/config.json")),
                ("ENTRATA_PORT", Some("9000")),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["entrata"]);
                let action = handler(&matches).expect("server action");
                let Action::Server(args) = action;
                assert_eq!(args.port, 9000);
                assert_eq!(args.config_path, "/etc/entrata/config.json");
            },
        );
    }
}
