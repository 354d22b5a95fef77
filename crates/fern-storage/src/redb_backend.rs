//! redb engine (feature `redb-backend`), for builds without a C++ toolchain.
//!
//! redb serializes write transactions itself, so a conditional batch is
//! planned and applied inside a single `begin_write` and needs no extra lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::batch::{self, Mutation};
use crate::envelope;
use crate::{Entry, StorageBackend, StorageError, UpdateFn, WriteBatch};

/// The single table holding every key. Namespacing lives in the key itself.
const DATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("data");

/// One redb file. Every call runs on the blocking pool.
///
/// # Examples
///
/// ```no_run
/// # use fern_storage::RedbBackend;
/// let backend = RedbBackend::open(".fern-data/ssm.redb").unwrap();
/// ```
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn txn_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Transaction {
        reason: e.to_string(),
    }
}

fn table_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::MissingTable {
        name: format!("data: {e}"),
    }
}

impl RedbBackend {
    /// Open the database file at `path`, creating it and its table when absent.
    ///
    /// # Errors
    ///
    /// [`StorageError::Open`] if the file cannot be opened or created, and
    /// [`StorageError::Transaction`] if the table cannot be initialised.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let txn = db.begin_write().map_err(txn_err)?;
        {
            let _table = txn.open_table(DATA_TABLE).map_err(table_err)?;
        }
        txn.commit().map_err(txn_err)?;

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// File this handle was opened on.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_raw<T>(table: &T, key: &str) -> Result<Option<Vec<u8>>, StorageError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    Ok(table
        .get(key)
        .map_err(|e| StorageError::Read {
            key: key.to_owned(),
            reason: e.to_string(),
        })?
        .map(|v| v.value().to_vec()))
}

/// Raw (still enveloped) entries under `prefix`, in key order.
fn scan_raw<T>(table: &T, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let scan_err = |e: &dyn std::fmt::Display| StorageError::Scan {
        prefix: prefix.to_owned(),
        reason: e.to_string(),
    };

    let mut out = Vec::new();
    for item in table.range(prefix..).map_err(|e| scan_err(&e))? {
        let (k, v) = item.map_err(|e| scan_err(&e))?;
        let key = k.value();
        if !key.starts_with(prefix) {
            break;
        }
        out.push((key.to_owned(), v.value().to_vec()));
    }
    Ok(out)
}

impl RedbBackend {
    fn read_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let txn = self.db.begin_read().map_err(txn_err)?;
        let table = txn.open_table(DATA_TABLE).map_err(table_err)?;
        scan_raw(&table, prefix)
    }
}

#[async_trait::async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let db = Arc::clone(&self.db);
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(txn_err)?;
            let table = txn.open_table(DATA_TABLE).map_err(table_err)?;
            match read_raw(&table, &key)? {
                None => Ok(None),
                Some(raw) => Ok(envelope::open(&key, &raw, envelope::now_ms())?.map(<[u8]>::to_vec)),
            }
        })
        .await
        .map_err(|e| StorageError::task_panicked(&e))?
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(txn_err)?;
            {
                let mut table = txn.open_table(DATA_TABLE).map_err(table_err)?;
                let now = envelope::now_ms();

                let planned = batch::plan(
                    batch.into_ops(),
                    now,
                    |key| match read_raw(&table, key)? {
                        Some(raw) => envelope::is_live(key, &raw, now),
                        None => Ok(false),
                    },
                    |prefix| Ok(scan_raw(&table, prefix)?.into_iter().map(|(k, _)| k).collect()),
                )?;

                for (key, mutation) in &planned {
                    match mutation {
                        Mutation::Set(raw) => {
                            table
                                .insert(key.as_str(), raw.as_slice())
                                .map_err(|e| StorageError::Write {
                                    key: key.clone(),
                                    reason: e.to_string(),
                                })?;
                        }
                        Mutation::Remove => {
                            table.remove(key.as_str()).map_err(|e| StorageError::Delete {
                                key: key.clone(),
                                reason: e.to_string(),
                            })?;
                        }
                    }
                }
            }
            // Dropping an uncommitted write txn aborts it, so any early return
            // above leaves the database untouched.
            txn.commit().map_err(txn_err)
        })
        .await
        .map_err(|e| StorageError::task_panicked(&e))?
    }

    async fn update(&self, key: &str, f: UpdateFn) -> Result<Vec<u8>, StorageError> {
        let db = Arc::clone(&self.db);
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(txn_err)?;
            let next = {
                let mut table = txn.open_table(DATA_TABLE).map_err(table_err)?;
                let raw = read_raw(&table, &key)?;
                let current = match raw.as_deref() {
                    Some(raw) => envelope::open(&key, raw, envelope::now_ms())?,
                    None => None,
                };
                let next = f(current)?;
                let sealed = envelope::seal(&next, None);
                table
                    .insert(key.as_str(), sealed.as_slice())
                    .map_err(|e| StorageError::Write {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;
                next
            };
            txn.commit().map_err(txn_err)?;
            Ok(next)
        })
        .await
        .map_err(|e| StorageError::task_panicked(&e))?
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<Entry>, StorageError> {
        let this = self.clone();
        let prefix = prefix.to_owned();
        tokio::task::spawn_blocking(move || {
            let now = envelope::now_ms();
            let mut out = Vec::new();
            for (key, raw) in this.read_prefix(&prefix)? {
                if let Some(value) = envelope::open(&key, &raw, now)? {
                    let value = value.to_vec();
                    out.push((key, value));
                }
            }
            Ok(out)
        })
        .await
        .map_err(|e| StorageError::task_panicked(&e))?
    }

    async fn count_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let this = self.clone();
        let prefix = prefix.to_owned();
        tokio::task::spawn_blocking(move || {
            let now = envelope::now_ms();
            let mut count = 0usize;
            for (key, raw) in this.read_prefix(&prefix)? {
                if envelope::is_live(&key, &raw, now)? {
                    count = count.saturating_add(1);
                }
            }
            Ok(count)
        })
        .await
        .map_err(|e| StorageError::task_panicked(&e))?
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::PutEntry;

    #[tokio::test]
    async fn rejected_batch_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("fern.redb")).unwrap();
        backend.put_all(vec![PutEntry::new("/zonename/example.com.", b"Z1".to_vec())]).await.unwrap();

        let mut batch = WriteBatch::new();
        batch
            .put(PutEntry::new("/hostedzone/Z2", b"zone".to_vec()))
            .put(PutEntry::new("/zonename/example.com.", b"Z2".to_vec()).create_only());
        assert!(backend.commit(batch).await.unwrap_err().is_rejected());
        assert!(!backend.exists("/hostedzone/Z2").await.unwrap());
    }

    #[tokio::test]
    async fn prefix_scan_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("fern.redb")).unwrap();
        backend
            .put_all(vec![
                PutEntry::new("/a/2", b"2".to_vec()),
                PutEntry::new("/a/1", b"1".to_vec()),
                PutEntry::new("/b/1", b"x".to_vec()),
            ])
            .await
            .unwrap();
        assert_eq!(backend.list("/a/").await.unwrap(), vec!["/a/1", "/a/2"]);

        let mut batch = WriteBatch::new();
        batch.delete_prefix("/a/");
        backend.commit(batch).await.unwrap();
        assert_eq!(backend.count_prefix("/").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_persists_result() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("fern.redb")).unwrap();
        backend
            .update("/p", Box::new(|cur: Option<&[u8]>| {
                assert!(cur.is_none());
                Ok(b"v1".to_vec())
            }))
            .await
            .unwrap();
        assert_eq!(backend.get("/p").await.unwrap(), Some(b"v1".to_vec()));
    }
}
