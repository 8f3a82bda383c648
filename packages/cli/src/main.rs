//! Slugtree command line tool
//!
//! # Usage
//!
//! ```bash
//! slugtree --database site.db init
//! slugtree add "" about
//! slugtree add /about "en=team,nl=ploeg"
//! slugtree --language nl tree /over
//! slugtree paste /about/team /news --copy
//! slugtree export /about about.json
//! ```
//!
//! # Environment Variables
//!
//! - `SLUGTREE_DATABASE`, `SLUGTREE_CONFIG`: defaults for `--database` / `--config`
//! - `SLUGTREE_LANGUAGES`, `SLUGTREE_DEFAULT_LANGUAGE`: used when no config file is given
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")

mod cli;
mod commands;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use slugtree_core::behaviors::ContentTypeRegistry;
use slugtree_core::config::TreeConfig;
use slugtree_core::db::DatabaseService;
use slugtree_core::services::NodeService;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => TreeConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TreeConfig::from_env()?,
    };
    tracing::debug!(
        "Languages {:?}, default '{}'",
        config.languages,
        config.default_language
    );

    let db = Arc::new(
        DatabaseService::new(cli.database.clone())
            .await
            .with_context(|| format!("Failed to open {}", cli.database.display()))?,
    );
    let service = NodeService::new(
        db,
        Arc::new(config),
        Arc::new(ContentTypeRegistry::with_defaults()),
    )?;

    let language = cli.language.as_deref();
    match &cli.command {
        Commands::Init => commands::init(&service).await,
        Commands::Add(args) => commands::add(&service, language, args).await,
        Commands::Tree { path } => commands::tree(&service, language, path).await,
        Commands::Rename {
            path,
            slug,
            all_languages,
        } => commands::rename(&service, language, path, slug, *all_languages).await,
        Commands::Paste {
            source,
            target,
            copy,
        } => commands::paste(&service, language, source, target, *copy).await,
        Commands::Export { path, file } => commands::export(&service, language, path, file).await,
        Commands::Import { path, file } => commands::import(&service, language, path, file).await,
    }
}
