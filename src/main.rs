use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use soulshelf::catalog::CatalogHttpClient;
use soulshelf::config::{AppConfig, CliConfig, FileConfig};
use soulshelf::confirm::NoConfirmation;
use soulshelf::fsops::DiskFileOps;
use soulshelf::naming::AlbumNameCache;
use soulshelf::normalize::EditionPatterns;
use soulshelf::orchestrator::SyncManager;
use soulshelf::placement::PlacementResolver;
use soulshelf::resolver::MetadataResolver;
use soulshelf::server::run_server;
use soulshelf::transfer::HttpTransferClient;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Root directory of the organized music library.
    #[clap(long, value_parser = parse_path)]
    pub music_root: Option<PathBuf>,

    /// Staging directory for in-flight transfers. Defaults to
    /// <music_root>/.staging so final renames stay atomic.
    #[clap(long, value_parser = parse_path)]
    pub staging_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 7720)]
    pub port: u16,

    /// URL of the metadata catalog service.
    #[clap(long)]
    pub catalog_url: Option<String>,

    /// Timeout in seconds for catalog requests.
    #[clap(long, default_value_t = 30)]
    pub catalog_timeout_sec: u64,

    /// URL of the transfer daemon.
    #[clap(long)]
    pub transfer_url: Option<String>,

    /// Timeout in seconds for transfer requests.
    #[clap(long, default_value_t = 600)]
    pub transfer_timeout_sec: u64,

    /// Path to a TOML config file. File values override CLI values.
    #[clap(long)]
    pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };

    let cli_config = CliConfig {
        music_root: cli_args.music_root,
        staging_dir: cli_args.staging_dir,
        port: cli_args.port,
        catalog_url: cli_args.catalog_url,
        catalog_timeout_sec: cli_args.catalog_timeout_sec,
        transfer_url: cli_args.transfer_url,
        transfer_timeout_sec: cli_args.transfer_timeout_sec,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    std::fs::create_dir_all(&config.staging_dir)
        .with_context(|| format!("Failed to create staging dir: {:?}", config.staging_dir))?;

    let patterns = Arc::new(
        EditionPatterns::from_qualifiers(&config.naming.edition_qualifiers)
            .context("Invalid edition-qualifier pattern in config")?,
    );

    info!("Catalog service at {}", config.catalog_url);
    let catalog = Arc::new(CatalogHttpClient::new(
        config.catalog_url.clone(),
        config.catalog_timeout_sec,
    )?);

    info!("Transfer daemon at {}", config.transfer_url);
    let transfer = Arc::new(HttpTransferClient::new(
        config.transfer_url.clone(),
        config.transfer_timeout_sec,
    )?);

    let resolver = Arc::new(MetadataResolver::new(
        catalog,
        config.resolver.clone(),
        patterns.clone(),
    ));
    let album_cache = Arc::new(AlbumNameCache::new(patterns));
    let placement = Arc::new(PlacementResolver::new(
        album_cache,
        config.music_root.clone(),
        config.naming.max_component_len,
    ));

    let shutdown = CancellationToken::new();
    let manager = SyncManager::new(
        resolver,
        placement,
        transfer,
        Arc::new(DiskFileOps),
        Arc::new(NoConfirmation),
        config.organizer.clone(),
        config.staging_dir.clone(),
        shutdown.clone(),
    );

    // Ctrl-c drains workers at their next checkpoint
    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            ctrl_c_token.cancel();
        }
    });

    info!(
        "Organizing into {:?}, staging in {:?}",
        config.music_root, config.staging_dir
    );
    run_server(manager, config.port, shutdown).await
}
