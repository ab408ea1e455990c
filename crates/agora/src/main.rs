// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agora - headless client for the Agora community board.
//!
//! This is the binary entry point. It loads configuration, opens the local
//! state database, and runs one subcommand against the feed engine.

mod account;
mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use agora_client::HttpFeedApi;
use agora_config::AgoraConfig;
use agora_core::{AgoraError, FilterKey, SortMode};
use agora_engine::FeedEngine;
use agora_storage::{Database, SqliteKvStore};
use clap::{Parser, Subcommand};
use tracing::debug;

/// Agora - headless client for the Agora community board.
#[derive(Parser, Debug)]
#[command(name = "agora", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Follow the live feed and print changes as they arrive.
    Watch {
        /// Category to follow.
        #[arg(long, default_value = "all")]
        category: String,
        /// Feed order: latest or popular.
        #[arg(long, default_value = "latest")]
        sort: SortMode,
        /// Only posts matching this term.
        #[arg(long)]
        search: Option<String>,
        /// Pages to load before following.
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Sign in and remember the session.
    Login {
        /// Student id or nickname.
        identifier: String,
    },
    /// Create an account.
    Register {
        nickname: String,
        #[arg(long)]
        student_id: Option<String>,
    },
    /// Sign out and forget the session.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Validate configuration and report problems.
    Check,
    /// Print the effective configuration as TOML.
    Show,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => agora_config::load_and_validate_path(path),
        None => agora_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            agora_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.level);

    if let Err(e) = run(cli.command, config).await {
        eprintln!("agora: {}", e.user_message());
        debug!(error = %e, "command failed");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: AgoraConfig) -> Result<(), AgoraError> {
    if let Commands::Config { action } = &command {
        return match action {
            ConfigAction::Check => {
                println!("configuration is valid");
                Ok(())
            }
            ConfigAction::Show => {
                let text = agora_config::to_toml_string(&config)
                    .map_err(|e| AgoraError::Config(e.to_string()))?;
                print!("{text}");
                Ok(())
            }
        };
    }

    let db = Database::open_with_config(&config.storage).await?;
    let store = Arc::new(SqliteKvStore::new(db.clone()));
    let api = Arc::new(HttpFeedApi::new(&config.api)?);

    // Only `watch` needs live updates.
    let mut engine_config = config.clone();
    engine_config.realtime.enabled =
        config.realtime.enabled && matches!(command, Commands::Watch { .. });
    let engine = Arc::new(
        FeedEngine::builder(api, store)
            .with_config(&engine_config)
            .build()
            .await?,
    );

    let result = match command {
        Commands::Watch {
            category,
            sort,
            search,
            pages,
        } => {
            let mut key = FilterKey::new(category).with_sort(sort);
            if let Some(search) = search {
                key = key.with_search(search);
            }
            watch::run_watch(engine.clone(), key, pages).await
        }
        Commands::Login { identifier } => account::login(&engine, &identifier).await,
        Commands::Register {
            nickname,
            student_id,
        } => account::register(&engine, nickname, student_id).await,
        Commands::Logout => account::logout(&engine).await,
        Commands::Whoami => account::whoami(&engine).await,
        Commands::Config { .. } => Ok(()),
    };

    engine.shutdown().await;
    if let Err(e) = db.close().await {
        debug!(error = %e, "database close failed");
    }
    result
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("agora={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn watch_parses_sort_wire_names() {
        let cli = Cli::try_parse_from(["agora", "watch", "--sort", "popular"]).unwrap();
        match cli.command {
            Commands::Watch { sort, category, .. } => {
                assert_eq!(sort, SortMode::Engagement);
                assert_eq!(category, "all");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
