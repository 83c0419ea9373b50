mod board;
mod config;
mod player;
mod shutdown;
mod web;

#[cfg(test)]
mod test_support;

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::board::client::BoardClient;
use crate::board::discovery::DiscoveryIndex;
use crate::board::queue::ClipQueue;
use crate::board::watcher::BoardWatcher;
use crate::config::Config;
use crate::player::cache::DiskCacheIndex;
use crate::player::playback::PlaybackCoordinator;
use crate::player::sessions::SessionStore;
use crate::shutdown::Shutdown;
use crate::web::server::run_player_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    info!("Logging initialized, starting the application");

    let config = Arc::new(Config::from_env()?);

    // Create required directories
    prepare_save_dir(&config.save_path()).await?;
    tokio::fs::create_dir_all(&config.data_path)
        .await
        .context("Failed to create data directory")?;
    let scratch = tempfile::Builder::new()
        .prefix("clipstream")
        .tempdir_in(&config.data_path)
        .context("Failed to create scratch directory")?;
    info!("Using scratch directory {}", scratch.path().display());

    let mut client = BoardClient::new(&config)?;
    if client.auth_token().is_none() {
        if let Err(e) = client.acquire_token(&config.download_url).await {
            error!("Error acquiring auth token: {}", e);
        }
    }

    let queue = Arc::new(ClipQueue::new());
    let discovery = Arc::new(DiscoveryIndex::new());
    let sessions = Arc::new(SessionStore::new());
    let cache = Arc::new(DiskCacheIndex::new(config.save_path()));
    cache.rebuild().await;

    // Create shutdown signal
    let shutdown = Shutdown::new();
    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Ctrl+C received, shutting down");
        ctrl_c_shutdown.trigger();
    });

    // Start background tasks
    let watcher = BoardWatcher::new(config.clone(), client.clone(), queue.clone(), discovery);
    let watcher_handle = tokio::spawn(watcher.run(shutdown.clone()));
    let sweeper_handle = tokio::spawn(sessions.clone().run_sweeper(shutdown.clone()));

    // Serve viewers until shutdown
    let player = PlaybackCoordinator::new(
        config.clone(),
        client,
        queue,
        sessions,
        cache,
        scratch.path().to_path_buf(),
    );
    let server_result = run_player_server(config, player, shutdown.clone()).await;
    shutdown.trigger();
    if let Err(e) = &server_result {
        error!("Player server error: {:#}", e);
        watcher_handle.abort();
        sweeper_handle.abort();
    }

    let _ = tokio::join!(watcher_handle, sweeper_handle);

    info!("Shutdown complete");
    server_result
}

/// Creates the save directory if missing; a file at that path is fatal.
async fn prepare_save_dir(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => bail!(
            "Save directory {} is a file, not a directory",
            path.display()
        ),
        Err(_) => {
            info!("Creating save directory {}", path.display());
            tokio::fs::create_dir_all(path)
                .await
                .with_context(|| format!("Failed to create save directory {}", path.display()))
        }
    }
}
