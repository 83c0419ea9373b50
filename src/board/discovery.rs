use std::collections::{HashMap, HashSet};

use tokio::sync::Mutex;
use tracing::info;

use super::models::ClipRecord;
use super::queue::ClipQueue;

/// Clip threads being followed, with the clip names already queued from each.
#[derive(Default)]
pub struct DiscoveryIndex {
    threads: Mutex<HashMap<String, HashSet<String>>>,
}

impl DiscoveryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts following a thread. Returns false if it was already followed.
    pub async fn admit(&self, thread_id: &str) -> bool {
        let mut threads = self.threads.lock().await;
        if threads.contains_key(thread_id) {
            return false;
        }
        threads.insert(thread_id.to_string(), HashSet::new());
        true
    }

    pub async fn forget(&self, thread_id: &str) -> bool {
        self.threads.lock().await.remove(thread_id).is_some()
    }

    #[cfg(test)]
    pub async fn contains(&self, thread_id: &str) -> bool {
        self.threads.lock().await.contains_key(thread_id)
    }

    pub async fn thread_ids(&self) -> Vec<String> {
        self.threads.lock().await.keys().cloned().collect()
    }

    #[cfg(test)]
    pub async fn seen_count(&self, thread_id: &str) -> usize {
        self.threads
            .lock()
            .await
            .get(thread_id)
            .map_or(0, |seen| seen.len())
    }

    /// Queues `clip` if its thread is followed and the name is unseen there.
    ///
    /// The seen-set and the queue are updated under the index lock, so a name
    /// is only marked once the record is in the queue.
    pub async fn record(&self, queue: &ClipQueue, clip: ClipRecord) -> bool {
        let mut threads = self.threads.lock().await;
        let Some(seen) = threads.get_mut(&clip.thread_id) else {
            return false;
        };
        if seen.contains(&clip.name) {
            return false;
        }

        let name = clip.name.clone();
        let thread_id = clip.thread_id.clone();
        let appended = queue.push(clip).await;
        seen.insert(name.clone());

        if appended {
            info!(clip = %name, thread = %thread_id, "Added new clip to queue");
        }
        appended
    }
}
