//! Viewer sessions and their cursors into the queue.

use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::info;

use crate::shutdown::Shutdown;

/// Sessions older than this are dropped by the sweeper.
pub const SESSION_RETENTION: Duration = Duration::from_secs(12 * 60 * 60);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// New viewers start this far behind the live edge of the queue.
const LIVE_EDGE_OFFSET: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub position: usize,
    pub effective_position: usize,
    pub created_at: Instant,
}

impl Session {
    fn new(queue_len: usize) -> Self {
        let position = queue_len.saturating_sub(LIVE_EDGE_OFFSET);
        Self {
            position,
            effective_position: position,
            created_at: Instant::now(),
        }
    }
}

/// Result of resolving a request cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub id: String,
    /// Set when a fresh session was created and the cookie must be (re)issued.
    pub is_new: bool,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(&self, cookie: Option<&str>, queue_len: usize) -> ResolvedSession {
        let mut sessions = self.sessions.lock().await;

        if let Some(id) = cookie {
            if sessions.contains_key(id) {
                return ResolvedSession {
                    id: id.to_string(),
                    is_new: false,
                };
            }
        }

        let id = loop {
            let candidate = new_session_id();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        sessions.insert(id.clone(), Session::new(queue_len));
        info!(session = %id, "Created new session");

        ResolvedSession { id, is_new: true }
    }

    /// Moves the cursor by `delta` and returns the position to serve.
    ///
    /// A move that leaves `[0, queue_len)` snaps to a uniformly random
    /// position, which also becomes the anchor for later moves. Returns `None`
    /// for an empty queue.
    pub async fn move_cursor(&self, id: &str, delta: i64, queue_len: usize) -> Option<usize> {
        if queue_len == 0 {
            return None;
        }

        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(queue_len));

        let target = session.position as i64 + delta;
        let position = if target < 0 || target >= queue_len as i64 {
            rand::thread_rng().gen_range(0..queue_len)
        } else {
            target as usize
        };

        session.position = position;
        session.effective_position = position;
        Some(session.effective_position)
    }

    #[cfg(test)]
    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.lock().await.get(id).copied()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Drops every session created more than [`SESSION_RETENTION`] before `now`.
    pub async fn sweep(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| now.saturating_duration_since(s.created_at) < SESSION_RETENTION);
        before - sessions.len()
    }

    pub async fn run_sweeper(self: Arc<Self>, shutdown: Shutdown) {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("Shutdown signal received, stopping session sweeper");
                    return;
                }
                _ = interval.tick() => {
                    let removed = self.sweep(Instant::now()).await;
                    if removed > 0 {
                        let remaining = self.len().await;
                        info!(removed, remaining, "Expired sessions swept");
                    }
                }
            }
        }
    }
}

fn new_session_id() -> String {
    format!("{:032x}", rand::thread_rng().gen::<u128>())
}
