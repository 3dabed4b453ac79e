//! Directory-backed cache store.
//!
//! # Responsibilities
//! - Map cache keys 1:1 to files under a root directory
//! - Replace entries atomically (temp file + rename)
//! - Keep status/meta in a sidecar so hits can replay the original header
//!
//! Sidecars live under `<root>/.meta/`, apart from the bodies, so no key can
//! name another key's sidecar.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::key::CacheKey;
use crate::gemini::Status;

/// Subdirectory holding header sidecars. Keys never start with `.`.
const META_DIR: &str = ".meta";
const META_EXT: &str = "json";

/// Errors from cache store operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Reading an entry failed, including one removed after `exists`.
    #[error("reading cache entry {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache metadata error: {0}")]
    Meta(#[from] serde_json::Error),
}

/// Response header stored next to a cached body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMeta {
    pub status: u8,
    pub meta: String,
}

impl StoredMeta {
    pub fn new(status: Status, meta: impl Into<String>) -> Self {
        Self {
            status: status.code(),
            meta: meta.into(),
        }
    }

    /// Stored status, if it is still a valid code.
    pub fn status(&self) -> Option<Status> {
        Status::from_code(self.status)
    }
}

/// Key-addressed blob store consulted by the request handler.
///
/// `exists` and `read` are not serialized against each other; an entry
/// can disappear between the two calls.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// True iff a regular file exists for `key`.
    async fn exists(&self, key: &CacheKey) -> bool;

    /// Full body for `key`. A missing entry is reported by `exists`; here
    /// it is an I/O failure like any other.
    async fn read(&self, key: &CacheKey) -> Result<Vec<u8>, CacheError>;

    /// Store `body` under `key`, replacing any previous entry.
    async fn write(&self, key: &CacheKey, body: &[u8]) -> Result<(), CacheError>;

    /// Store `body` together with the response header it was served with.
    async fn write_entry(
        &self,
        key: &CacheKey,
        meta: &StoredMeta,
        body: &[u8],
    ) -> Result<(), CacheError>;

    /// Header stored for `key`, if any.
    async fn read_meta(&self, key: &CacheKey) -> Option<StoredMeta>;
}

/// Flat directory of cache entries.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the cache directory if missing.
    pub async fn ensure_root(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.root).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.root, std::fs::Permissions::from_mode(0o700)).await?;
        }
        Ok(())
    }

    /// Path of the body file for `key`.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    fn meta_dir(&self) -> PathBuf {
        self.root.join(META_DIR)
    }

    fn meta_path(&self, key: &CacheKey) -> PathBuf {
        self.meta_dir().join(format!("{}.{META_EXT}", key.as_str()))
    }

    /// Write `bytes` to `dir/name` through a uniquely named temp file in
    /// `dir`. The temp file is removed if anything fails.
    async fn write_atomic(&self, dir: &Path, name: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let dest = dir.join(name);
        let tmp = dir.join(format!(".{name}.{}.tmp", Uuid::new_v4()));

        let result = async {
            let mut options = fs::OpenOptions::new();
            options.write(true).create_new(true);
            #[cfg(unix)]
            options.mode(0o600);

            let mut file = options.open(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);

            fs::rename(&tmp, &dest).await
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    tracing::warn!(path = ?tmp, error = %cleanup, "Failed to remove temp cache file");
                }
            }
            return Err(CacheError::Io(e));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for DirectoryStore {
    async fn exists(&self, key: &CacheKey) -> bool {
        fs::metadata(self.entry_path(key))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn read(&self, key: &CacheKey) -> Result<Vec<u8>, CacheError> {
        fs::read(self.entry_path(key))
            .await
            .map_err(|source| CacheError::Read {
                key: key.to_string(),
                source,
            })
    }

    async fn write(&self, key: &CacheKey, body: &[u8]) -> Result<(), CacheError> {
        self.write_atomic(&self.root, key.as_str(), body).await
    }

    async fn write_entry(
        &self,
        key: &CacheKey,
        meta: &StoredMeta,
        body: &[u8],
    ) -> Result<(), CacheError> {
        // Sidecar first: once the body is visible its header is too.
        let encoded = serde_json::to_vec(meta)?;
        let meta_dir = self.meta_dir();
        fs::create_dir_all(&meta_dir).await?;
        let meta_name = format!("{}.{META_EXT}", key.as_str());
        self.write_atomic(&meta_dir, &meta_name, &encoded).await?;
        self.write(key, body).await
    }

    async fn read_meta(&self, key: &CacheKey) -> Option<StoredMeta> {
        let path = self.meta_path(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(cache_key = %key, error = %e, "Failed to read cache metadata");
                }
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!(cache_key = %key, error = %e, "Ignoring malformed cache metadata");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::sanitize;

    async fn store() -> (tempfile::TempDir, DirectoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("cache"));
        store.ensure_root().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn round_trip() {
        let (_dir, store) = store().await;
        let key = sanitize("gemini://example.org/page");

        assert!(!store.exists(&key).await);
        store.write(&key, b"hello\x00world").await.unwrap();
        assert!(store.exists(&key).await);
        assert_eq!(store.read(&key).await.unwrap(), b"hello\x00world");
    }

    #[tokio::test]
    async fn overwrite_replaces_content() {
        let (_dir, store) = store().await;
        let key = sanitize("k");
        store.write(&key, b"first, longer body").await.unwrap();
        store.write(&key, b"second").await.unwrap();
        assert_eq!(store.read(&key).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn missing_entry_is_a_read_error() {
        let (_dir, store) = store().await;
        let err = store.read(&sanitize("absent")).await.unwrap_err();
        match err {
            CacheError::Read { key, source } => {
                assert_eq!(key, "absent");
                assert_eq!(source.kind(), ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn directory_is_not_an_entry() {
        let (_dir, store) = store().await;
        let key = sanitize("subdir");
        std::fs::create_dir(store.entry_path(&key)).unwrap();
        assert!(!store.exists(&key).await);
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let (_dir, store) = store().await;
        let key = sanitize("gemini://example.org/");
        store
            .write_entry(&key, &StoredMeta::new(Status::SUCCESS, "text/gemini"), b"body")
            .await
            .unwrap();

        let names = |dir: &Path| {
            let mut names: Vec<String> = std::fs::read_dir(dir)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        };
        assert_eq!(names(store.root()), vec![".meta", "gemini---example.org-"]);
        assert_eq!(
            names(&store.root().join(".meta")),
            vec!["gemini---example.org-.json"]
        );
    }

    #[tokio::test]
    async fn sidecar_name_is_not_another_entry() {
        let (_dir, store) = store().await;
        let page = sanitize("gemini://a/x");
        let lookalike = sanitize("gemini://a/x.meta.json");
        store
            .write_entry(&page, &StoredMeta::new(Status::SUCCESS, "text/gemini"), b"page")
            .await
            .unwrap();

        assert!(!store.exists(&lookalike).await);

        store
            .write_entry(&lookalike, &StoredMeta::new(Status::SUCCESS, "text/plain"), b"other")
            .await
            .unwrap();
        store
            .write_entry(&page, &StoredMeta::new(Status::SUCCESS, "text/gemini"), b"page")
            .await
            .unwrap();
        assert_eq!(store.read(&lookalike).await.unwrap(), b"other");
        assert_eq!(store.read_meta(&lookalike).await.unwrap().meta, "text/plain");
    }

    #[tokio::test]
    async fn body_file_holds_only_body_bytes() {
        let (_dir, store) = store().await;
        let key = sanitize("gemini://example.org/page");
        store
            .write_entry(&key, &StoredMeta::new(Status::SUCCESS, "text/gemini"), b"hello")
            .await
            .unwrap();

        assert_eq!(std::fs::read(store.entry_path(&key)).unwrap(), b"hello");
        let meta = store.read_meta(&key).await.unwrap();
        assert_eq!(meta.status(), Some(Status::SUCCESS));
        assert_eq!(meta.meta, "text/gemini");
    }

    #[tokio::test]
    async fn malformed_meta_is_ignored() {
        let (_dir, store) = store().await;
        let key = sanitize("k");
        std::fs::create_dir_all(store.meta_dir()).unwrap();
        std::fs::write(store.meta_path(&key), b"not json").unwrap();
        assert_eq!(store.read_meta(&key).await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn entries_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = store().await;
        let key = sanitize("k");
        store.write(&key, b"x").await.unwrap();
        let mode = std::fs::metadata(store.entry_path(&key))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
