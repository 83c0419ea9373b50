//! Navigation and the cache-fill protocol.
//!
//! A clip is served from the disk cache when present. Otherwise it is fetched
//! from the origin in a background task that writes every chunk to a temp
//! file in the scratch directory and forwards it to the viewer. Only after the
//! body is complete is the file renamed into `<save>/<thread>/<name>` and
//! committed to the cache index.

use actix_web::http::header::HttpDate;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, LAST_MODIFIED};
use reqwest::{Response, StatusCode};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tempfile::TempPath;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::board::client::BoardClient;
use crate::board::models::ClipRecord;
use crate::board::queue::ClipQueue;
use crate::config::Config;
use crate::player::cache::{absolute, DiskCacheIndex};
use crate::player::sessions::{ResolvedSession, SessionStore};

const STREAM_BUFFER_CHUNKS: usize = 16;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("queue is empty")]
    EmptyQueue,
    #[error("clip {0} is gone from the origin")]
    ClipGone(String),
    #[error("origin request failed: {0}")]
    Origin(#[from] reqwest::Error),
    #[error("origin returned {0}")]
    OriginStatus(StatusCode),
    #[error("storage error: {0}")]
    Io(#[from] io::Error),
}

/// Where the bytes of a clip come from for one request.
pub enum ClipSource {
    Cached(PathBuf),
    Origin(OriginStream),
}

/// Body of an in-progress cache fill, chunk by chunk as it arrives.
pub struct OriginStream {
    pub content_type: Option<String>,
    pub last_modified: Option<SystemTime>,
    pub body: mpsc::Receiver<io::Result<Bytes>>,
}

type InFlight = Arc<Mutex<HashMap<String, watch::Receiver<()>>>>;

#[derive(Clone)]
pub struct PlaybackCoordinator {
    config: Arc<Config>,
    client: BoardClient,
    queue: Arc<ClipQueue>,
    sessions: Arc<SessionStore>,
    cache: Arc<DiskCacheIndex>,
    scratch_dir: PathBuf,
    in_flight: InFlight,
}

impl PlaybackCoordinator {
    pub fn new(
        config: Arc<Config>,
        client: BoardClient,
        queue: Arc<ClipQueue>,
        sessions: Arc<SessionStore>,
        cache: Arc<DiskCacheIndex>,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            client,
            queue,
            sessions,
            cache,
            scratch_dir,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn resolve_session(&self, cookie: Option<&str>) -> ResolvedSession {
        let queue_len = self.queue.len().await;
        self.sessions.resolve(cookie, queue_len).await
    }

    /// Moves the session cursor by `delta` and returns the clip to serve.
    pub async fn navigate(
        &self,
        session_id: &str,
        delta: i64,
    ) -> Result<ClipRecord, PlaybackError> {
        // Held across the move so bounds and lookup see the same length.
        let queue = self.queue.read().await;
        if queue.is_empty() {
            return Err(PlaybackError::EmptyQueue);
        }
        let position = self
            .sessions
            .move_cursor(session_id, delta, queue.len())
            .await
            .ok_or(PlaybackError::EmptyQueue)?;

        debug!(session = %session_id, position, "Resolved position");
        queue.get(position).cloned().ok_or(PlaybackError::EmptyQueue)
    }

    pub async fn open_clip(&self, clip: &ClipRecord) -> Result<ClipSource, PlaybackError> {
        loop {
            if let Some(path) = self.cache.lookup(&clip.name).await {
                return Ok(ClipSource::Cached(path));
            }

            let pending = self.claim(&clip.name);
            let guard = match pending {
                Claim::Wait(mut done) => {
                    info!(clip = %clip.name, "Waiting for in-flight download");
                    // Resolves once the filling task drops its sender.
                    let _ = done.changed().await;
                    continue;
                }
                Claim::Owner(guard) => guard,
            };

            // The previous owner may have committed between lookup and claim.
            if let Some(path) = self.cache.lookup(&clip.name).await {
                return Ok(ClipSource::Cached(path));
            }
            return self.start_fill(clip, guard).await;
        }
    }

    fn claim(&self, name: &str) -> Claim {
        let mut in_flight = match self.in_flight.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(done) = in_flight.get(name) {
            return Claim::Wait(done.clone());
        }

        let (done_tx, done_rx) = watch::channel(());
        in_flight.insert(name.to_string(), done_rx);
        Claim::Owner(InFlightGuard {
            in_flight: self.in_flight.clone(),
            name: name.to_string(),
            _done: done_tx,
        })
    }

    async fn start_fill(
        &self,
        clip: &ClipRecord,
        guard: InFlightGuard,
    ) -> Result<ClipSource, PlaybackError> {
        let url = self.config.clip_url(&clip.remote_path);
        info!(clip = %clip.name, "Clip not in cache, requesting {}", url);

        let res = match self.client.get(&url).await {
            Ok(res) => res,
            Err(e) if e.is_builder() => {
                error!(clip = %clip.name, "Error creating outgoing request: {}", e);
                self.queue.remove(&clip.name).await;
                return Err(PlaybackError::ClipGone(clip.name.clone()));
            }
            Err(e) => {
                error!(clip = %clip.name, "Error on outgoing request: {}", e);
                return Err(e.into());
            }
        };

        let status = res.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            warn!(clip = %clip.name, %status, "Clip no longer exists at origin");
            self.queue.remove(&clip.name).await;
            return Err(PlaybackError::ClipGone(clip.name.clone()));
        }
        if !status.is_success() {
            warn!(clip = %clip.name, %status, "Origin refused clip request");
            return Err(PlaybackError::OriginStatus(status));
        }

        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let last_modified = res
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<HttpDate>().ok())
            .map(SystemTime::from);

        let temp = tempfile::Builder::new()
            .prefix("clipfill")
            .tempfile_in(&self.scratch_dir)?;
        let (file, temp_path) = temp.into_parts();
        debug!(clip = %clip.name, "Created temporary file {}", temp_path.display());

        let (tx, rx) = mpsc::channel(STREAM_BUFFER_CHUNKS);
        let fill = CacheFill {
            cache: self.cache.clone(),
            dest_dir: self.cache.root().join(&clip.thread_id),
            name: clip.name.clone(),
            last_modified,
            _guard: guard,
        };
        tokio::spawn(fill.run(res, fs::File::from_std(file), temp_path, tx));

        Ok(ClipSource::Origin(OriginStream {
            content_type,
            last_modified,
            body: rx,
        }))
    }
}

enum Claim {
    Owner(InFlightGuard),
    Wait(watch::Receiver<()>),
}

/// Marks a clip as being downloaded; waiters are released when it drops.
struct InFlightGuard {
    in_flight: InFlight,
    name: String,
    _done: watch::Sender<()>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = match self.in_flight.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        in_flight.remove(&self.name);
    }
}

struct CacheFill {
    cache: Arc<DiskCacheIndex>,
    dest_dir: PathBuf,
    name: String,
    last_modified: Option<SystemTime>,
    _guard: InFlightGuard,
}

impl CacheFill {
    async fn run(
        self,
        mut res: Response,
        mut file: fs::File,
        temp_path: TempPath,
        tx: mpsc::Sender<io::Result<Bytes>>,
    ) {
        let mut viewer = Some(tx);

        match self.copy_body(&mut res, &mut file, &mut viewer).await {
            Ok(bytes) => {
                info!(clip = %self.name, bytes, "Clip downloaded and streamed");
                match self.commit(file, temp_path).await {
                    Ok(path) => info!(clip = %self.name, "Saved clip to {}", path.display()),
                    Err(e) => error!(clip = %self.name, "Error saving clip to cache: {}", e),
                }
            }
            Err(e) => {
                error!(clip = %self.name, "Error while downloading/streaming: {}", e);
                if let Some(tx) = viewer {
                    let _ = tx.send(Err(io::Error::other(e.to_string()))).await;
                }
                // Dropping `temp_path` removes the partial file.
            }
        }
    }

    async fn copy_body(
        &self,
        res: &mut Response,
        file: &mut fs::File,
        viewer: &mut Option<mpsc::Sender<io::Result<Bytes>>>,
    ) -> Result<u64, PlaybackError> {
        let mut written = 0u64;
        while let Some(chunk) = res.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if let Some(tx) = viewer.as_ref() {
                if tx.send(Ok(chunk)).await.is_err() {
                    debug!(clip = %self.name, "Viewer disconnected, finishing download for cache");
                    *viewer = None;
                }
            }
        }
        file.flush().await?;
        Ok(written)
    }

    async fn commit(&self, file: fs::File, temp_path: TempPath) -> Result<PathBuf, PlaybackError> {
        let file = file.into_std().await;
        let last_modified = self.last_modified;
        let dest_dir = self.dest_dir.clone();
        let dest = absolute(&self.dest_dir.join(&self.name));
        let target = dest.clone();

        tokio::task::spawn_blocking(move || -> io::Result<()> {
            file.sync_all()?;
            if let Some(modified) = last_modified {
                file.set_modified(modified)?;
            }
            drop(file);

            std::fs::create_dir_all(&dest_dir)?;
            temp_path.persist(&target).map_err(io::Error::from)?;
            Ok(())
        })
        .await
        .map_err(io::Error::from)??;

        self.cache.commit(&self.name, dest.clone()).await;
        Ok(dest)
    }
}
