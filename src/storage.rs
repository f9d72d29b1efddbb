//! RocksDB transaction layer.
//!
//! All account mutations go through a [`UnitOfWork`]: a pessimistic
//! RocksDB transaction that is rolled back on every exit path except an
//! explicit [`UnitOfWork::commit`].

use rocksdb::{
    ErrorKind, Options, Transaction, TransactionDB, TransactionDBOptions, TransactionOptions,
    WriteOptions,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    /// Lock wait timed out, deadlock detected, or the write raced another
    /// transaction. Safe to retry from scratch.
    #[error("Transaction conflict: {0}")]
    Conflict(String),
    #[error("Operation cancelled before commit")]
    Cancelled,
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Codec(String),
}

impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        match err.kind() {
            ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain => {
                StorageError::Conflict(err.into_string())
            }
            _ => StorageError::Database(err.into_string()),
        }
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Codec(err.to_string())
    }
}

/// Caller-controlled abort switch for a unit of work.
///
/// Fires either when [`CancelSignal::cancel`] is called from any clone, or
/// once the optional deadline has passed.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelSignal {
    /// A signal that only fires when cancelled explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_fired(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

pub struct Storage {
    db: TransactionDB,
    lock_timeout_ms: i64,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>, lock_timeout_ms: i64) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(lock_timeout_ms);

        let db = TransactionDB::open(&opts, &txn_db_opts, path.as_ref())?;
        debug!(path = %path.as_ref().display(), lock_timeout_ms, "storage opened");
        Ok(Storage {
            db,
            lock_timeout_ms,
        })
    }

    /// Start a pessimistic transaction with deadlock detection enabled.
    pub fn begin(&self) -> UnitOfWork<'_> {
        let mut txn_opts = TransactionOptions::default();
        txn_opts.set_lock_timeout(self.lock_timeout_ms);
        txn_opts.set_deadlock_detect(true);

        let txn = self.db.transaction_opt(&WriteOptions::default(), &txn_opts);
        UnitOfWork { txn: Some(txn) }
    }

    /// Latest committed value, read without taking locks.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.db.get(key.as_bytes())? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }
}

/// Scoped transaction: dropping it without `commit` rolls back.
pub struct UnitOfWork<'db> {
    txn: Option<Transaction<'db, TransactionDB>>,
}

impl<'db> UnitOfWork<'db> {
    fn txn(&self) -> Result<&Transaction<'db, TransactionDB>, StorageError> {
        self.txn
            .as_ref()
            .ok_or_else(|| StorageError::Database("transaction already finished".to_string()))
    }

    /// Read `key` under an exclusive row lock held until the unit of work ends.
    pub fn get_for_update<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        self.read_locked(key, true)
    }

    /// Read `key` under a shared lock: concurrent readers proceed, writers wait.
    pub fn get_shared<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        self.read_locked(key, false)
    }

    fn read_locked<T: DeserializeOwned>(
        &self,
        key: &str,
        exclusive: bool,
    ) -> Result<Option<T>, StorageError> {
        match self.txn()?.get_for_update(key.as_bytes(), exclusive)? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let serialized = bincode::serialize(value)?;
        self.txn()?.put(key.as_bytes(), serialized)?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.txn()?.delete(key.as_bytes())?;
        Ok(())
    }

    /// Commit unless `cancel` has fired, in which case everything written
    /// in this unit of work is discarded.
    pub fn commit(mut self, cancel: &CancelSignal) -> Result<(), StorageError> {
        if cancel.is_fired() {
            debug!("cancel signal fired before commit, rolling back");
            return Err(StorageError::Cancelled);
        }
        let txn = self
            .txn
            .take()
            .ok_or_else(|| StorageError::Database("transaction already finished".to_string()))?;
        txn.commit()?;
        Ok(())
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if let Some(txn) = self.txn.take() {
            if let Err(e) = txn.rollback() {
                warn!("rollback failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn open_temp(lock_timeout_ms: i64) -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path(), lock_timeout_ms).unwrap();
        (dir, storage)
    }

    #[test]
    fn commit_makes_writes_visible() {
        let (_dir, storage) = open_temp(100);
        let uow = storage.begin();
        uow.put("k", &42u64).unwrap();
        assert_eq!(storage.get::<u64>("k").unwrap(), None);
        uow.commit(&CancelSignal::new()).unwrap();
        assert_eq!(storage.get::<u64>("k").unwrap(), Some(42));
    }

    #[test]
    fn drop_without_commit_rolls_back() {
        let (_dir, storage) = open_temp(100);
        {
            let uow = storage.begin();
            uow.put("k", &1u64).unwrap();
        }
        assert_eq!(storage.get::<u64>("k").unwrap(), None);

        // the lock taken by the dropped unit of work is released
        let uow = storage.begin();
        uow.get_for_update::<u64>("k").unwrap();
        uow.put("k", &2u64).unwrap();
        uow.commit(&CancelSignal::new()).unwrap();
        assert_eq!(storage.get::<u64>("k").unwrap(), Some(2));
    }

    #[test]
    fn fired_signal_discards_writes() {
        let (_dir, storage) = open_temp(100);
        let signal = CancelSignal::new();
        let uow = storage.begin();
        uow.put("k", &7u64).unwrap();
        signal.cancel();
        assert!(matches!(uow.commit(&signal), Err(StorageError::Cancelled)));
        assert_eq!(storage.get::<u64>("k").unwrap(), None);
    }

    #[test]
    fn expired_deadline_fires() {
        let signal = CancelSignal::with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(signal.is_fired());
        let signal = CancelSignal::with_deadline(Instant::now() + Duration::from_secs(60));
        assert!(!signal.is_fired());
        signal.clone().cancel();
        assert!(signal.is_fired());
    }

    #[test]
    fn held_lock_surfaces_as_conflict() {
        let (_dir, storage) = open_temp(20);
        let holder = storage.begin();
        holder.get_for_update::<u64>("row").unwrap();

        let waiter = storage.begin();
        let err = waiter.get_for_update::<u64>("row").unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)), "got {err:?}");
    }

    #[test]
    fn shared_locks_do_not_block_each_other() {
        let (_dir, storage) = open_temp(20);
        let a = storage.begin();
        let b = storage.begin();
        a.get_shared::<u64>("slot").unwrap();
        b.get_shared::<u64>("slot").unwrap();
        assert!(matches!(
            b.get_for_update::<u64>("slot"),
            Err(StorageError::Conflict(_))
        ));
    }
}
