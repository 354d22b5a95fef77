//! `RocksDB` engine, used unless another is selected.
//!
//! Every call runs on [`tokio::task::spawn_blocking`]. Keys are written as
//! their UTF-8 bytes, so `RocksDB`'s bytewise order is the key order the
//! engines paginate by.
//!
//! Reads go straight to the database. Writers are serialized through a
//! process-local mutex so that the existence checks of a conditional batch and
//! the `WriteBatch` that follows them form one atomic step.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rocksdb::{DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options};

use crate::batch::{self, Mutation};
use crate::envelope;
use crate::{Entry, StorageBackend, StorageError, UpdateFn, WriteBatch};

type Db = DBWithThreadMode<MultiThreaded>;

/// One `RocksDB` directory. Clones share the handle and the writer lock.
///
/// # Examples
///
/// ```no_run
/// # use fern_storage::RocksDbBackend;
/// let backend = RocksDbBackend::open(".fern-data/route53").unwrap();
/// ```
#[derive(Clone)]
pub struct RocksDbBackend {
    db: Arc<Db>,
    write_lock: Arc<Mutex<()>>,
    path: PathBuf,
}

impl std::fmt::Debug for RocksDbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RocksDbBackend {
    /// Open the database directory at `path`, creating it when absent.
    ///
    /// # Errors
    ///
    /// [`StorageError::Open`] if the directory cannot be opened, for example
    /// because another process holds its lock.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = Db::open(&opts, path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
            path: path.to_path_buf(),
        })
    }

    /// Directory this handle was opened on.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_raw(db: &Db, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
    db.get(key.as_bytes()).map_err(|e| StorageError::Read {
        key: key.to_owned(),
        reason: e.to_string(),
    })
}

/// Raw (still enveloped) entries under `prefix`, in key order.
fn scan_raw(db: &Db, prefix: &str) -> Result<Vec<(String, Box<[u8]>)>, StorageError> {
    let iter = db.iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));

    let mut out = Vec::new();
    for item in iter {
        let (k, v) = item.map_err(|e| StorageError::Scan {
            prefix: prefix.to_owned(),
            reason: e.to_string(),
        })?;
        let key = String::from_utf8(k.to_vec()).map_err(|e| StorageError::InvalidKey {
            reason: e.to_string(),
        })?;
        if !key.starts_with(prefix) {
            break;
        }
        out.push((key, v));
    }
    Ok(out)
}

fn lock_writers(lock: &Mutex<()>) -> Result<std::sync::MutexGuard<'_, ()>, StorageError> {
    lock.lock().map_err(|_| StorageError::Transaction {
        reason: "writer lock poisoned".to_owned(),
    })
}

#[async_trait::async_trait]
impl StorageBackend for RocksDbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let db = Arc::clone(&self.db);
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || match read_raw(&db, &key)? {
            None => Ok(None),
            Some(raw) => Ok(envelope::open(&key, &raw, envelope::now_ms())?.map(<[u8]>::to_vec)),
        })
        .await
        .map_err(|e| StorageError::task_panicked(&e))?
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let db = Arc::clone(&self.db);
        let lock = Arc::clone(&self.write_lock);
        tokio::task::spawn_blocking(move || {
            let _writer = lock_writers(&lock)?;
            let now = envelope::now_ms();

            let planned = batch::plan(
                batch.into_ops(),
                now,
                |key| match read_raw(&db, key)? {
                    Some(raw) => envelope::is_live(key, &raw, now),
                    None => Ok(false),
                },
                |prefix| Ok(scan_raw(&db, prefix)?.into_iter().map(|(k, _)| k).collect()),
            )?;

            let mut wb = rocksdb::WriteBatch::default();
            for (key, mutation) in &planned {
                match mutation {
                    Mutation::Set(raw) => wb.put(key.as_bytes(), raw),
                    Mutation::Remove => wb.delete(key.as_bytes()),
                }
            }
            db.write(wb).map_err(|e| StorageError::Write {
                key: planned.keys().next().cloned().unwrap_or_default(),
                reason: e.to_string(),
            })
        })
        .await
        .map_err(|e| StorageError::task_panicked(&e))?
    }

    async fn update(&self, key: &str, f: UpdateFn) -> Result<Vec<u8>, StorageError> {
        let db = Arc::clone(&self.db);
        let lock = Arc::clone(&self.write_lock);
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || {
            let _writer = lock_writers(&lock)?;
            let raw = read_raw(&db, &key)?;
            let current = match raw.as_deref() {
                Some(raw) => envelope::open(&key, raw, envelope::now_ms())?,
                None => None,
            };
            let next = f(current)?;
            db.put(key.as_bytes(), envelope::seal(&next, None))
                .map_err(|e| StorageError::Write {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            Ok(next)
        })
        .await
        .map_err(|e| StorageError::task_panicked(&e))?
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<Entry>, StorageError> {
        let db = Arc::clone(&self.db);
        let prefix = prefix.to_owned();
        tokio::task::spawn_blocking(move || {
            let now = envelope::now_ms();
            let mut out = Vec::new();
            for (key, raw) in scan_raw(&db, &prefix)? {
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
        let db = Arc::clone(&self.db);
        let prefix = prefix.to_owned();
        tokio::task::spawn_blocking(move || {
            let now = envelope::now_ms();
            let mut count = 0usize;
            for (key, raw) in scan_raw(&db, &prefix)? {
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
