//! Durable storage capabilities consumed by the resource cache.
//!
//! The platform supplies a key-value store and a binary file store. This
//! module defines both as traits and ships SQLite/filesystem implementations
//! for real use plus in-memory ones for ephemeral sessions.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};

/// Durable key-value storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Reference to a materialized binary asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetRef {
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Binary asset storage addressed by derived keys.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn locate(&self, key: &str) -> Result<Option<AssetRef>>;

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.locate(key).await?.is_some())
    }

    /// Store `bytes` under `key`, replacing any previous or partial content.
    async fn write(&self, key: &str, bytes: Vec<u8>) -> Result<AssetRef>;

    async fn remove(&self, key: &str) -> Result<()>;

    async fn list(&self) -> Result<Vec<AssetRef>>;
}

// =============================================================================
// SQLite key-value store
// =============================================================================

const KV_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY NOT NULL,
    value BLOB NOT NULL
)";

/// Key-value store persisted in a single SQLite table.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened sqlite key-value store");
        Self::with_connection(conn)
    }

    /// Store backed by a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(KV_SCHEMA, [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, key: &str, op: F) -> std::result::Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let outcome = tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&guard)
        })
        .await;

        match outcome {
            Ok(result) => result.map_err(|err| err.to_string()),
            Err(join) => Err(format!("storage task for {key} failed: {join}")),
        }
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let owned = key.to_string();
        self.run(key, move |conn| {
            conn.query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![owned],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
        })
        .await
        .map_err(|message| Error::read(key, message))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let owned = key.to_string();
        self.run(key, move |conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![owned, value],
            )
            .map(|_| ())
        })
        .await
        .map_err(|message| Error::write(key, message))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let owned = key.to_string();
        self.run(key, move |conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", params![owned])
                .map(|_| ())
        })
        .await
        .map_err(|message| Error::write(key, message))
    }
}

// =============================================================================
// Filesystem blob store
// =============================================================================

/// Blob store writing one file per key under a root directory.
///
/// Writes go to a temporary file in the same directory and are renamed into
/// place, so an interrupted download never leaves a truncated asset behind.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(sanitize_component(key))
    }
}

fn sanitize_component(raw: &str) -> String {
    let sanitized: String = raw
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    // "", "." and ".." would resolve outside the asset directory.
    if sanitized.chars().all(|c| c == '.') {
        return format!("_{sanitized}");
    }
    sanitized
}

fn write_file_atomic(root: &Path, destination: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::create_dir_all(root)?;
    let mut tmp = NamedTempFile::new_in(root)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    // persist renames over the destination; the old asset stays readable
    // until the new one is in place.
    tmp.persist(destination).map_err(|err| err.error)?;
    Ok(())
}

async fn blocking<T, F>(key: &str, op: F) -> std::result::Result<T, String>
where
    T: Send + 'static,
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(result) => result.map_err(|err| err.to_string()),
        Err(join) => Err(format!("storage task for {key} failed: {join}")),
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn locate(&self, key: &str) -> Result<Option<AssetRef>> {
        let path = self.path_for(key);
        let owned = key.to_string();
        blocking(key, move || match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Some(AssetRef {
                key: owned,
                path,
                size: meta.len(),
            })),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        })
        .await
        .map_err(|message| Error::read(key, message))
    }

    async fn write(&self, key: &str, bytes: Vec<u8>) -> Result<AssetRef> {
        let root = self.root.clone();
        let path = self.path_for(key);
        let owned = key.to_string();
        let size = bytes.len() as u64;
        blocking(key, move || {
            write_file_atomic(&root, &path, &bytes)?;
            Ok(AssetRef {
                key: owned,
                path,
                size,
            })
        })
        .await
        .map_err(|message| Error::write(key, message))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        blocking(key, move || match fs::remove_file(&path) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        })
        .await
        .map_err(|message| Error::write(key, message))
    }

    async fn list(&self) -> Result<Vec<AssetRef>> {
        let root = self.root.clone();
        let label = root.display().to_string();
        blocking(&label, move || {
            let entries = match fs::read_dir(&root) {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(err) => return Err(err),
            };

            let mut assets = Vec::new();
            for entry in entries {
                let entry = entry?;
                let meta = entry.metadata()?;
                let name = entry.file_name().to_string_lossy().to_string();
                // In-flight temp files from NamedTempFile.
                if !meta.is_file() || name.starts_with(".tmp") {
                    continue;
                }
                assets.push(AssetRef {
                    key: name,
                    path: entry.path(),
                    size: meta.len(),
                });
            }
            assets.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(assets)
        })
        .await
        .map_err(|message| Error::read(label, message))
    }
}

// =============================================================================
// In-memory implementations
// =============================================================================

/// Volatile key-value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Volatile blob store; asset paths are virtual and never touch the disk.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn asset(key: &str, size: usize) -> AssetRef {
        AssetRef {
            key: key.to_string(),
            path: Path::new("memory").join(sanitize_component(key)),
            size: size as u64,
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn locate(&self, key: &str) -> Result<Option<AssetRef>> {
        Ok(self.blobs().get(key).map(|bytes| Self::asset(key, bytes.len())))
    }

    async fn write(&self, key: &str, bytes: Vec<u8>) -> Result<AssetRef> {
        let asset = Self::asset(key, bytes.len());
        self.blobs().insert(key.to_string(), bytes);
        Ok(asset)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.blobs().remove(key);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AssetRef>> {
        let mut assets: Vec<AssetRef> = self
            .blobs()
            .iter()
            .map(|(key, bytes)| Self::asset(key, bytes.len()))
            .collect();
        assets.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn sqlite_store_round_trips_and_overwrites() {
        let store = SqliteStore::in_memory().expect("open store");
        assert_eq!(store.get("missing").await.expect("get"), None);

        store.set("k", b"one".to_vec()).await.expect("set");
        store.set("k", b"two".to_vec()).await.expect("overwrite");
        assert_eq!(store.get("k").await.expect("get"), Some(b"two".to_vec()));

        store.remove("k").await.expect("remove");
        assert_eq!(store.get("k").await.expect("get"), None);
    }

    #[tokio::test]
    async fn fs_blob_store_replaces_existing_files() {
        let dir = tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path().join("assets"));

        assert!(store.list().await.expect("list empty").is_empty());
        store.write("node-image-1", vec![1, 2, 3]).await.expect("write");
        let asset = store
            .write("node-image-1", vec![9; 5])
            .await
            .expect("rewrite");

        assert_eq!(asset.size, 5);
        assert_eq!(fs::read(&asset.path).expect("read back"), vec![9; 5]);
        assert!(store.exists("node-image-1").await.expect("exists"));
        assert_eq!(store.list().await.expect("list").len(), 1);

        store.remove("node-image-1").await.expect("remove");
        store.remove("node-image-1").await.expect("remove is idempotent");
        assert!(!store.exists("node-image-1").await.expect("exists"));
    }

    #[test]
    fn atomic_write_replaces_in_place() {
        let dir = tempdir().expect("tempdir");
        let destination = dir.path().join("node-image-7");
        fs::write(&destination, b"old").expect("seed asset");

        write_file_atomic(dir.path(), &destination, b"new image").expect("replace");

        assert_eq!(fs::read(&destination).expect("read"), b"new image");
        let entries = fs::read_dir(dir.path()).expect("list").count();
        assert_eq!(entries, 1, "no temp files left behind");
    }

    #[test]
    fn keys_are_sanitized_for_the_filesystem() {
        assert_eq!(sanitize_component("campus-map/../x"), "campus-map_.._x");
    }
}
