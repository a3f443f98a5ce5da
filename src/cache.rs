//! Persistent Key-Value Cache
//!
//! Small JSON blobs stored under a key. Blobs survive reloads of the storefront but are never
//! shared between devices.

use std::{
    io,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use mockall::automock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Key under which the cart item list is stored.
pub const CART_KEY: &str = "cart";

/// Key under which the checkout step/form/coupon bundle is stored.
pub const CHECKOUT_KEY: &str = "checkout";

/// Key of the durable "payment pending" marker.
pub const PAYMENT_PENDING_KEY: &str = "payment-pending";

/// Whether `key` can be stored by every cache: non-empty, ASCII letters, digits and `-_:.`, and
/// not starting with a dot.
#[must_use]
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        && !key.starts_with('.')
}

/// Errors raised by cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the backing storage failed.
    #[error("cache storage error")]
    Io(#[from] io::Error),

    /// The stored blob was not valid JSON, or a value could not be encoded.
    #[error("cache entry is not valid JSON")]
    Json(#[from] serde_json::Error),

    /// The in-memory store was poisoned by a panicking writer.
    #[error("cache lock poisoned")]
    Poisoned,

    /// Key contains characters that cannot be stored.
    #[error("invalid cache key: {0}")]
    InvalidKey(String),
}

/// Scoped read/write of small JSON blobs.
#[automock]
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Read the blob stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store `value` under `key`, replacing any previous blob.
    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError>;

    /// Delete the blob under `key`. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// Process-local cache.
#[derive(Debug, Default, Clone)]
pub struct MemoryCache {
    entries: Arc<RwLock<FxHashMap<String, Value>>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let entries = self.entries.read().map_err(|_poison| CacheError::Poisoned)?;

        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_poison| CacheError::Poisoned)?;

        entries.insert(key.to_string(), value);

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_poison| CacheError::Poisoned)?;

        entries.remove(key);

        Ok(())
    }
}

/// Cache storing one `<key>.json` file per entry in a directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Use `dir` as the cache directory. It is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the cache files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, CacheError> {
        if !is_valid_key(key) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }

        Ok(self.dir.join(format!("{}.json", key.replace(':', "__"))))
    }
}

#[async_trait]
impl KeyValueCache for FileCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let path = self.path_for(key)?;

        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        Ok(Some(serde_json::from_slice(&contents)?))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        let temp = path.with_extension("json.tmp");

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&temp, serde_json::to_vec(&value)?).await?;
        tokio::fs::rename(&temp, &path).await?;

        debug!(path = %path.display(), "wrote cache entry");

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let path = self.path_for(key)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

/// Prefixes every key with a namespace before delegating to an inner cache.
#[derive(Clone)]
pub struct ScopedCache {
    namespace: String,
    inner: Arc<dyn KeyValueCache>,
}

impl ScopedCache {
    /// Scope `inner` under `namespace`.
    pub fn new(namespace: impl Into<String>, inner: Arc<dyn KeyValueCache>) -> Self {
        Self {
            namespace: namespace.into(),
            inner,
        }
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}:{key}", self.namespace)
    }
}

impl std::fmt::Debug for ScopedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedCache")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyValueCache for ScopedCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.inner.get(&self.scoped(key)).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        self.inner.set(&self.scoped(key), value).await
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.inner.remove(&self.scoped(key)).await
    }
}
