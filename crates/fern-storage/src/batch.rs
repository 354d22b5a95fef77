//! Atomic write batches.
//!
//! A [`WriteBatch`] is an ordered list of puts and deletes that a backend
//! commits all-or-nothing. Puts may be conditional (`overwrite = false`) and
//! may carry a TTL. A batch may also guard a prefix so that it only commits
//! while the prefix holds an expected set of keys. Backends resolve a batch into its final per-key effect with
//! [`plan`] while holding their exclusive write section, then apply the result
//! in a single engine write.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::StorageError;
use crate::envelope;

/// A single key-value write inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutEntry {
    /// Storage key.
    pub key: String,
    /// Value bytes (already encoded by the caller).
    pub value: Vec<u8>,
    /// When `false`, the whole batch fails if the key is already live.
    pub overwrite: bool,
    /// Optional time-to-live; the entry reads as absent once it elapses.
    pub ttl: Option<Duration>,
}

impl PutEntry {
    /// An unconditional put with no expiry.
    #[must_use]
    pub fn new(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value,
            overwrite: true,
            ttl: None,
        }
    }

    /// Refuse the batch if the key already exists.
    #[must_use]
    pub fn create_only(mut self) -> Self {
        self.overwrite = false;
        self
    }

    /// Set whether an existing key may be replaced.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Expire the entry after `ttl`.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// One operation in a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Write a value, optionally conditional and expiring.
    Put(PutEntry),
    /// Remove a key. Removing an absent key is not an error.
    Delete(String),
    /// Remove every key that starts with the prefix.
    DeletePrefix(String),
    /// Refuse the batch if any live key under `prefix` is not in `allowed`.
    ///
    /// Evaluated against the store and the batch's earlier operations.
    OnlyKeys {
        prefix: String,
        allowed: BTreeSet<String>,
    },
}

/// An ordered set of writes committed atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a put.
    pub fn put(&mut self, entry: PutEntry) -> &mut Self {
        self.ops.push(WriteOp::Put(entry));
        self
    }

    /// Append a delete.
    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete(key.into()));
        self
    }

    /// Append a prefix delete.
    pub fn delete_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::DeletePrefix(prefix.into()));
        self
    }

    /// Append a guard that fails the batch unless every live key under
    /// `prefix` is one of `allowed`.
    pub fn only_keys<I, K>(&mut self, prefix: impl Into<String>, allowed: I) -> &mut Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.ops.push(WriteOp::OnlyKeys {
            prefix: prefix.into(),
            allowed: allowed.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Number of operations in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Borrow the operations in order.
    #[must_use]
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub(crate) fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

impl FromIterator<PutEntry> for WriteBatch {
    fn from_iter<I: IntoIterator<Item = PutEntry>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().map(WriteOp::Put).collect(),
        }
    }
}

impl Extend<WriteOp> for WriteBatch {
    fn extend<I: IntoIterator<Item = WriteOp>>(&mut self, iter: I) {
        self.ops.extend(iter);
    }
}

/// Final effect of a batch on one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mutation {
    /// Store these raw (envelope-wrapped) bytes.
    Set(Vec<u8>),
    /// Remove the key.
    Remove,
}

/// Resolve a batch into per-key mutations, enforcing conditional puts.
///
/// `is_live` reports whether a key currently holds an unexpired value in the
/// engine; `keys_with_prefix` lists stored keys under a prefix. Both are
/// consulted only for keys the batch has not already touched, so a batch sees
/// its own earlier writes.
///
/// # Errors
///
/// Returns [`StorageError::Rejected`] on the first non-overwriting put that
/// meets a live key or the first prefix guard that finds a stray key, or
/// whatever the lookups return.
pub(crate) fn plan<L, P>(
    ops: Vec<WriteOp>,
    now: u64,
    mut is_live: L,
    mut keys_with_prefix: P,
) -> Result<BTreeMap<String, Mutation>, StorageError>
where
    L: FnMut(&str) -> Result<bool, StorageError>,
    P: FnMut(&str) -> Result<Vec<String>, StorageError>,
{
    let mut pending: BTreeMap<String, Mutation> = BTreeMap::new();

    for op in ops {
        match op {
            WriteOp::Put(entry) => {
                if !entry.overwrite {
                    let exists = match pending.get(&entry.key) {
                        Some(Mutation::Set(_)) => true,
                        Some(Mutation::Remove) => false,
                        None => is_live(&entry.key)?,
                    };
                    if exists {
                        return Err(StorageError::Rejected {
                            key: entry.key,
                            reason: "key already exists".to_owned(),
                        });
                    }
                }
                let sealed = envelope::seal(&entry.value, envelope::expiry_for(entry.ttl, now));
                pending.insert(entry.key, Mutation::Set(sealed));
            }
            WriteOp::Delete(key) => {
                pending.insert(key, Mutation::Remove);
            }
            WriteOp::DeletePrefix(prefix) => {
                for (_, mutation) in pending
                    .range_mut(prefix.clone()..)
                    .take_while(|(k, _)| k.starts_with(&prefix))
                {
                    *mutation = Mutation::Remove;
                }
                for key in keys_with_prefix(&prefix)? {
                    pending.insert(key, Mutation::Remove);
                }
            }
            WriteOp::OnlyKeys { prefix, allowed } => {
                let mut live: BTreeSet<String> = pending
                    .range(prefix.clone()..)
                    .take_while(|(k, _)| k.starts_with(&prefix))
                    .filter(|(_, m)| matches!(m, Mutation::Set(_)))
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in keys_with_prefix(&prefix)? {
                    if !pending.contains_key(&key) && is_live(&key)? {
                        live.insert(key);
                    }
                }
                if let Some(stray) = live.into_iter().find(|k| !allowed.contains(k)) {
                    return Err(StorageError::Rejected {
                        key: stray,
                        reason: format!("unexpected key under '{prefix}'"),
                    });
                }
            }
        }
    }

    Ok(pending)
}
