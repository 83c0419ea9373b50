use anyhow::Result;
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::board::client::{BoardClient, BoardError};
use crate::board::discovery::DiscoveryIndex;
use crate::board::models::{BoardPage, ClipRecord};
use crate::board::queue::ClipQueue;
use crate::config::Config;
use crate::shutdown::Shutdown;

lazy_static! {
    // "webm" spelled loosely, or its Cyrillic keyboard-layout twin.
    static ref CLIP_THREAD_PATTERN: Regex = Regex::new(r"(?i)(web.*m)|(цу[ий].*ь)").unwrap();
    static ref CLIP_FILE_PATTERN: Regex = Regex::new(r"\.webm$").unwrap();
}

pub fn is_clip_thread(comment: &str) -> bool {
    CLIP_THREAD_PATTERN.is_match(comment)
}

pub fn is_clip_file(name: &str) -> bool {
    CLIP_FILE_PATTERN.is_match(name)
}

/// Polls the board and feeds new clips into the queue.
pub struct BoardWatcher {
    client: BoardClient,
    queue: Arc<ClipQueue>,
    discovery: Arc<DiscoveryIndex>,
    config: Arc<Config>,
}

impl BoardWatcher {
    pub fn new(
        config: Arc<Config>,
        client: BoardClient,
        queue: Arc<ClipQueue>,
        discovery: Arc<DiscoveryIndex>,
    ) -> Self {
        Self {
            client,
            queue,
            discovery,
            config,
        }
    }

    /// One full cycle: admit new clip threads, then pull new clips from every
    /// followed thread.
    pub async fn refresh(&self) -> Result<()> {
        let admitted = self.discover_threads().await?;
        let added = self.update_threads().await?;
        let queued = self.queue.len().await;
        info!(admitted, added, queued, "Board refresh complete");
        Ok(())
    }

    async fn discover_threads(&self) -> Result<usize, BoardError> {
        info!("Scanning listing for new clip threads");
        let page: BoardPage = self.client.get_json(&self.config.listing_url).await?;
        Ok(self.admit_threads(&page).await)
    }

    pub async fn admit_threads(&self, page: &BoardPage) -> usize {
        let mut admitted = 0;
        for thread in &page.threads {
            let Some(root) = thread.root_post() else {
                continue;
            };
            let has_clip = root
                .files
                .iter()
                .any(|f| is_clip_file(&f.path) || is_clip_file(&f.name));

            if has_clip
                && is_clip_thread(&root.comment)
                && self.discovery.admit(&thread.thread_num).await
            {
                info!(thread = %thread.thread_num, "Found new clip thread");
                admitted += 1;
            }
        }
        admitted
    }

    async fn update_threads(&self) -> Result<usize, BoardError> {
        let mut added = 0;
        for thread_id in self.discovery.thread_ids().await {
            let url = self.config.thread_url(&thread_id);
            match self.client.get_json::<BoardPage>(&url).await {
                Ok(page) => added += self.ingest_thread(&thread_id, &page).await,
                Err(BoardError::Decode(e)) => return Err(BoardError::Decode(e)),
                Err(e) => {
                    warn!(thread = %thread_id, "Dropping thread: {}", e);
                    self.discovery.forget(&thread_id).await;
                }
            }
        }
        Ok(added)
    }

    pub async fn ingest_thread(&self, thread_id: &str, page: &BoardPage) -> usize {
        let Some(thread) = page.threads.first() else {
            return 0;
        };

        let mut added = 0;
        for post in &thread.posts {
            for file in post.files.iter().filter(|f| is_clip_file(&f.name)) {
                let clip = ClipRecord {
                    name: file.name.clone(),
                    remote_path: file.path.clone(),
                    thread_id: thread_id.to_string(),
                    post_id: post.num.to_string(),
                };
                if self.discovery.record(&self.queue, clip).await {
                    added += 1;
                }
            }
        }
        added
    }

    pub async fn run(self, shutdown: Shutdown) {
        info!("Board watcher started");
        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("Shutdown signal received, stopping board watcher");
                    return;
                }
                _ = self.tick() => {}
            }
        }
    }

    async fn tick(&self) {
        if let Err(e) = self.refresh().await {
            error!("Error refreshing board: {:#}", e);
        }
        tokio::time::sleep(next_delay()).await;
    }
}

// Jittered 2-6 minutes.
fn next_delay() -> Duration {
    Duration::from_secs(120 + rand::thread_rng().gen_range(0..240))
}
