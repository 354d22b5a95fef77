//! Storage engine adapter for `fern`.
//!
//! This crate defines the [`StorageBackend`] trait, an ordered, byte-valued
//! key-value interface that knows nothing about hosted zones or parameters.
//! It offers exactly what the domain engines need from an embedded store:
//! atomic multi-key batches with conditional puts, atomic read-modify-write,
//! ascending prefix scans, and per-key TTL.
//!
//! Three implementations are provided:
//!
//! - [`RocksDbBackend`]: production default, backed by `RocksDB` (feature `rocksdb-backend`)
//! - [`RedbBackend`]: pure-Rust alternative, backed by redb (feature `redb-backend`)
//! - [`MemoryBackend`]: in-memory, for testing only

mod batch;
mod envelope;
mod error;
mod memory;
#[cfg(feature = "redb-backend")]
mod redb_backend;
#[cfg(feature = "rocksdb-backend")]
mod rocksdb_backend;

pub use batch::{PutEntry, WriteBatch, WriteOp};
pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;
#[cfg(feature = "rocksdb-backend")]
pub use rocksdb_backend::RocksDbBackend;

/// Read-modify-write callback passed to [`StorageBackend::update`].
///
/// Receives the current live value (or `None`) and returns the bytes to
/// store. Returning an error aborts the update without writing.
pub type UpdateFn = Box<dyn FnOnce(Option<&[u8]>) -> Result<Vec<u8>, StorageError> + Send>;

/// A key with its decoded value, as yielded by prefix scans.
pub type Entry = (String, Vec<u8>);

/// A pluggable ordered key-value storage backend.
///
/// Keys are UTF-8 strings using `/` as a separator (e.g. `/hostedzone/Z1ABC`,
/// `/recordset/Z1ABC/www/a`). Values are opaque byte arrays. Ordering is plain
/// lexicographic byte order.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Retrieve a live value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist or its TTL has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Commit a batch atomically: either every operation lands or none does.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Rejected`] if a non-overwriting put meets a
    /// live key or a prefix guard finds a key it does not allow, or a
    /// write/transaction error if the engine fails. In both
    /// cases nothing from the batch is visible afterwards.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError>;

    /// Atomically read a key, compute its replacement, and write it.
    ///
    /// No other writer can interleave between the read and the write.
    /// Returns the bytes that were stored.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns (typically [`StorageError::Rejected`]),
    /// or a read/write error from the engine.
    async fn update(&self, key: &str, f: UpdateFn) -> Result<Vec<u8>, StorageError>;

    /// Return every live entry whose key starts with `prefix`, in ascending
    /// key order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Scan`] if iteration fails.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<Entry>, StorageError>;

    /// Count live entries whose key starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Scan`] if iteration fails.
    async fn count_prefix(&self, prefix: &str) -> Result<usize, StorageError>;

    /// List live keys that start with the given prefix, in ascending order.
    ///
    /// The default implementation scans values too; backends may override it
    /// with a key-only iteration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Scan`] if iteration fails.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .scan_prefix(prefix)
            .await?
            .into_iter()
            .map(|(k, _)| k)
            .collect())
    }

    /// Check whether a live value exists at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Write several entries atomically.
    ///
    /// # Errors
    ///
    /// See [`commit`](StorageBackend::commit).
    async fn put_all(&self, entries: Vec<PutEntry>) -> Result<(), StorageError> {
        self.commit(entries.into_iter().collect()).await
    }

    /// Delete several keys atomically. Absent keys are ignored.
    ///
    /// # Errors
    ///
    /// See [`commit`](StorageBackend::commit).
    async fn delete_all(&self, keys: Vec<String>) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        for key in keys {
            batch.delete(key);
        }
        self.commit(batch).await
    }
}
