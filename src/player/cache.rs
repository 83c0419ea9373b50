use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// In-memory view of the clip files present under the save directory.
///
/// Entries are only ever added for files that are already complete and in
/// their final location.
pub struct DiskCacheIndex {
    root: PathBuf,
    files: RwLock<HashMap<String, PathBuf>>,
}

impl DiskCacheIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Re-reads the save directory. Clips live in per-thread subdirectories;
    /// files directly under the root are indexed too.
    pub async fn rebuild(&self) {
        let files = match scan_dir(&self.root).await {
            Ok(files) => files,
            Err(e) => {
                error!("Error reading save directory {}: {}", self.root.display(), e);
                HashMap::new()
            }
        };

        *self.files.write().await = files;
        info!("Cache index rebuilt with {} clips", self.len().await);
    }

    pub async fn lookup(&self, name: &str) -> Option<PathBuf> {
        self.files.read().await.get(name).cloned()
    }

    pub async fn commit(&self, name: &str, path: PathBuf) {
        self.files.write().await.insert(name.to_string(), path);
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }
}

async fn scan_dir(root: &Path) -> std::io::Result<HashMap<String, PathBuf>> {
    let mut files = HashMap::new();
    let mut entries = fs::read_dir(root).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            if let Err(e) = index_thread_dir(&path, &mut files).await {
                warn!("Skipping cache directory {}: {}", path.display(), e);
            }
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            files.insert(name.to_string(), absolute(&path));
        }
    }

    Ok(files)
}

async fn index_thread_dir(
    dir: &Path,
    files: &mut HashMap<String, PathBuf>,
) -> std::io::Result<()> {
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            files.insert(name.to_string(), absolute(&path));
        }
    }
    Ok(())
}

pub(crate) fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rebuild_walks_thread_dirs() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("100")).unwrap();
        std::fs::write(dir.path().join("100").join("a.webm"), b"aaaa").unwrap();
        std::fs::write(dir.path().join("b.webm"), b"bb").unwrap();

        let cache = DiskCacheIndex::new(dir.path());
        cache.rebuild().await;

        assert_eq!(cache.len().await, 2);
        let a = cache.lookup("a.webm").await.unwrap();
        assert!(a.is_absolute());
        assert_eq!(std::fs::read(a).unwrap(), b"aaaa");
        assert!(cache.lookup("b.webm").await.is_some());
        assert!(cache.lookup("c.webm").await.is_none());
    }

    #[tokio::test]
    async fn test_rebuild_missing_dir_leaves_index_empty() {
        let dir = tempdir().unwrap();
        let cache = DiskCacheIndex::new(dir.path().join("missing"));
        cache.rebuild().await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_commit_overwrites() {
        let cache = DiskCacheIndex::new("/unused");
        cache.commit("a.webm", PathBuf::from("/x/a.webm")).await;
        cache.commit("a.webm", PathBuf::from("/y/a.webm")).await;
        assert_eq!(cache.lookup("a.webm").await.unwrap(), PathBuf::from("/y/a.webm"));
    }
}
