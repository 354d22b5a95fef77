//! Errors raised by the storage engines.
//!
//! Variants name the key, prefix, or path involved. Only
//! [`StorageError::Rejected`] is an expected, caller-visible outcome;
//! everything else is an engine or I/O fault.

/// Failure of a storage call.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The database at `path` could not be opened or created.
    #[error("failed to open storage at '{path}': {reason}")]
    Open { path: String, reason: String },

    /// A point read failed.
    #[error("failed to read key '{key}': {reason}")]
    Read { key: String, reason: String },

    /// A put, batch, or update could not be written.
    #[error("failed to write key '{key}': {reason}")]
    Write { key: String, reason: String },

    /// A delete could not be applied.
    #[error("failed to delete key '{key}': {reason}")]
    Delete { key: String, reason: String },

    /// A prefix iteration failed part-way.
    #[error("failed to scan keys with prefix '{prefix}': {reason}")]
    Scan { prefix: String, reason: String },

    /// The redb data table could not be opened.
    #[error("missing table '{name}'")]
    MissingTable { name: String },

    /// A transaction could not begin or commit, or a blocking task died.
    #[error("transaction failed: {reason}")]
    Transaction { reason: String },

    /// A key read back from disk is not UTF-8.
    #[error("invalid key encoding: {reason}")]
    InvalidKey { reason: String },

    /// A stored value did not carry a valid expiry envelope.
    #[error("corrupt value at key '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// A conditional write was refused; nothing in the batch was written.
    ///
    /// Raised when a non-overwriting put meets a live key, when a prefix
    /// guard finds a key it does not allow, or when an
    /// [`update`](crate::StorageBackend::update) closure declines to write.
    #[error("write rejected at key '{key}': {reason}")]
    Rejected { key: String, reason: String },
}

impl StorageError {
    /// Whether this error is a refused conditional write rather than a fault.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    #[cfg(any(feature = "rocksdb-backend", feature = "redb-backend"))]
    pub(crate) fn task_panicked(err: &tokio::task::JoinError) -> Self {
        Self::Transaction {
            reason: format!("blocking task panicked: {err}"),
        }
    }
}
