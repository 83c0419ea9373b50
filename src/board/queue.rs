//! Shared playback queue.
//!
//! Clips are kept in discovery order. The only removal is for clips the
//! origin reports gone; it is resolved to an index under the write lock so it
//! cannot race a concurrent append. A removed name stays known, so the clip is
//! not queued again when its thread is re-admitted.

use std::collections::HashSet;

use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::info;

use super::models::ClipRecord;

#[derive(Default)]
pub struct QueueState {
    clips: Vec<ClipRecord>,
    // Every name ever queued, removed clips included.
    names: HashSet<String>,
}

impl QueueState {
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&ClipRecord> {
        self.clips.get(position)
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

#[derive(Default)]
pub struct ClipQueue {
    state: RwLock<QueueState>,
}

impl ClipQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a clip unless its name was queued before.
    pub async fn push(&self, clip: ClipRecord) -> bool {
        let mut state = self.state.write().await;
        if !state.names.insert(clip.name.clone()) {
            return false;
        }
        state.clips.push(clip);
        true
    }

    pub async fn remove(&self, name: &str) -> Option<ClipRecord> {
        let mut state = self.state.write().await;
        let position = state.clips.iter().position(|c| c.name == name)?;
        let clip = state.clips.remove(position);
        info!(clip = %name, position, "Removed clip from queue");
        Some(clip)
    }

    /// Read snapshot; length and indexed reads stay consistent while held.
    pub async fn read(&self) -> RwLockReadGuard<'_, QueueState> {
        self.state.read().await
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    #[cfg(test)]
    pub async fn get(&self, position: usize) -> Option<ClipRecord> {
        self.state.read().await.get(position).cloned()
    }
}

#[cfg(test)]
pub fn clip(name: &str, thread: &str) -> ClipRecord {
    ClipRecord {
        name: name.to_string(),
        remote_path: format!("src/{}/{}", thread, name),
        thread_id: thread.to_string(),
        post_id: thread.to_string(),
    }
}
