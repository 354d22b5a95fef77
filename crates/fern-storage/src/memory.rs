//! Process-local engine.
//!
//! Keeps enveloped values in an ordered map, so scans, TTL expiry, and batch
//! rejection behave exactly as on disk. Nothing survives the process. The
//! engine tests and `--storage memory` use it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::batch::{self, Mutation};
use crate::envelope;
use crate::{Entry, StorageBackend, StorageError, UpdateFn, WriteBatch};

/// Ordered in-memory store. Clones share the same map.
///
/// A write lock is held for the whole of a batch or update, which is what
/// makes them atomic here.
///
/// # Examples
///
/// ```
/// # use fern_storage::{MemoryBackend, PutEntry, StorageBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// backend.put_all(vec![PutEntry::new("/hostedzone/Z1", b"data".to_vec())]).await.unwrap();
/// let val = backend.get("/hostedzone/Z1").await.unwrap();
/// assert_eq!(val, Some(b"data".to_vec()));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn prefixed<'a>(
    data: &'a BTreeMap<String, Vec<u8>>,
    prefix: &'a str,
) -> impl Iterator<Item = (&'a String, &'a Vec<u8>)> + 'a {
    data.range(prefix.to_owned()..)
        .take_while(move |(k, _)| k.starts_with(prefix))
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self.data.read().await;
        match data.get(key) {
            None => Ok(None),
            Some(raw) => Ok(envelope::open(key, raw, envelope::now_ms())?.map(<[u8]>::to_vec)),
        }
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut guard = self.data.write().await;
        let now = envelope::now_ms();

        let planned = {
            let data = &*guard;
            batch::plan(
                batch.into_ops(),
                now,
                |key| match data.get(key) {
                    Some(raw) => envelope::is_live(key, raw, now),
                    None => Ok(false),
                },
                |prefix| Ok(prefixed(data, prefix).map(|(k, _)| k.clone()).collect()),
            )?
        };

        for (key, mutation) in planned {
            match mutation {
                Mutation::Set(raw) => {
                    guard.insert(key, raw);
                }
                Mutation::Remove => {
                    guard.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn update(&self, key: &str, f: UpdateFn) -> Result<Vec<u8>, StorageError> {
        let mut guard = self.data.write().await;
        let now = envelope::now_ms();

        let current = match guard.get(key) {
            Some(raw) => envelope::open(key, raw, now)?,
            None => None,
        };
        let next = f(current)?;
        guard.insert(key.to_owned(), envelope::seal(&next, None));
        Ok(next)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<Entry>, StorageError> {
        let data = self.data.read().await;
        let now = envelope::now_ms();
        let mut out = Vec::new();
        for (key, raw) in prefixed(&data, prefix) {
            if let Some(value) = envelope::open(key, raw, now)? {
                out.push((key.clone(), value.to_vec()));
            }
        }
        Ok(out)
    }

    async fn count_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let data = self.data.read().await;
        let now = envelope::now_ms();
        let mut count = 0usize;
        for (key, raw) in prefixed(&data, prefix) {
            if envelope::is_live(key, raw, now)? {
                count = count.saturating_add(1);
            }
        }
        Ok(count)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let data = self.data.read().await;
        match data.get(key) {
            Some(raw) => envelope::is_live(key, raw, envelope::now_ms()),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::PutEntry;

    async fn seeded() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend
            .put_all(vec![
                PutEntry::new("/recordset/Z1/@/ns", b"ns".to_vec()),
                PutEntry::new("/recordset/Z1/@/soa", b"soa".to_vec()),
                PutEntry::new("/recordset/Z2/@/soa", b"other".to_vec()),
                PutEntry::new("/hostedzone/Z1", b"zone".to_vec()),
            ])
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn get_nonexistent_returns_none() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("does/not/exist").await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_is_ordered_and_prefix_bounded() {
        let backend = seeded().await;
        let keys: Vec<String> = backend
            .scan_prefix("/recordset/Z1/")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["/recordset/Z1/@/ns", "/recordset/Z1/@/soa"]);
        assert_eq!(backend.count_prefix("/recordset/").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn rejected_batch_writes_nothing() {
        let backend = seeded().await;
        let mut batch = WriteBatch::new();
        batch
            .put(PutEntry::new("/change/C1", b"c".to_vec()))
            .put(PutEntry::new("/hostedzone/Z1", b"dup".to_vec()).create_only());

        let err = backend.commit(batch).await.unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(backend.get("/change/C1").await.unwrap(), None);
        assert_eq!(backend.get("/hostedzone/Z1").await.unwrap(), Some(b"zone".to_vec()));
    }

    #[tokio::test]
    async fn delete_prefix_and_delete_all() {
        let backend = seeded().await;
        let mut batch = WriteBatch::new();
        batch.delete_prefix("/recordset/Z1/").delete("/hostedzone/Z1");
        backend.commit(batch).await.unwrap();
        assert_eq!(backend.list("").await.unwrap(), vec!["/recordset/Z2/@/soa"]);

        backend.delete_all(vec!["/recordset/Z2/@/soa".to_owned(), "nope".to_owned()]).await.unwrap();
        assert!(backend.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_entries_disappear() {
        let backend = MemoryBackend::new();
        backend
            .put_all(vec![PutEntry::new("/change/C1", b"c".to_vec()).with_ttl(Duration::from_millis(1))])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(backend.get("/change/C1").await.unwrap(), None);
        assert!(!backend.exists("/change/C1").await.unwrap());
        assert_eq!(backend.count_prefix("/change/").await.unwrap(), 0);

        // An expired key no longer blocks a conditional put.
        backend
            .put_all(vec![PutEntry::new("/change/C1", b"again".to_vec()).create_only()])
            .await
            .unwrap();
        assert_eq!(backend.get("/change/C1").await.unwrap(), Some(b"again".to_vec()));
    }

    #[tokio::test]
    async fn update_sees_current_value() {
        let backend = MemoryBackend::new();
        let first = backend
            .update("counter", Box::new(|cur: Option<&[u8]>| {
                assert!(cur.is_none());
                Ok(b"1".to_vec())
            }))
            .await
            .unwrap();
        assert_eq!(first, b"1".to_vec());

        let second = backend
            .update("counter", Box::new(|cur: Option<&[u8]>| {
                let mut next = cur.unwrap_or_default().to_vec();
                next.push(b'+');
                Ok(next)
            }))
            .await
            .unwrap();
        assert_eq!(second, b"1+".to_vec());
    }

    #[tokio::test]
    async fn update_error_leaves_value_untouched() {
        let backend = seeded().await;
        let err = backend
            .update("/hostedzone/Z1", Box::new(|_: Option<&[u8]>| {
                Err(StorageError::Rejected {
                    key: "/hostedzone/Z1".to_owned(),
                    reason: "declined".to_owned(),
                })
            }))
            .await
            .unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(backend.get("/hostedzone/Z1").await.unwrap(), Some(b"zone".to_vec()));
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let backend = MemoryBackend::new();
        let clone = backend.clone();
        backend.put_all(vec![PutEntry::new("key", b"val".to_vec())]).await.unwrap();
        assert_eq!(clone.get("key").await.unwrap(), Some(b"val".to_vec()));
    }
}
