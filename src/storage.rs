use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::BTreeMap,
    path::Path,
    sync::{Arc, Mutex},
};

/// A single mutation inside a committed batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Keyed byte storage backing the marketplace tables.
///
/// `write` must apply the whole batch or nothing.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &[u8]) -> anyhow::Result<Vec<(Vec<u8>, Vec<u8>)>>;

    fn write(&self, ops: Vec<WriteOp>) -> anyhow::Result<()>;
}

/// In-process store, used for tests and ephemeral markets
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }

    pub fn len(&self) -> anyhow::Result<usize> {
        Ok(self.lock()?.len())
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> anyhow::Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.lock()?;
        Ok(entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn write(&self, ops: Vec<WriteOp>) -> anyhow::Result<()> {
        let mut entries = self.lock()?;
        for op in ops {
            match op {
                WriteOp::Put(k, v) => {
                    entries.insert(k, v);
                }
                WriteOp::Delete(k) => {
                    entries.remove(&k);
                }
            }
        }
        Ok(())
    }
}

/// RocksDB-backed store. Batches are committed through a `WriteBatch`.
#[derive(Clone)]
pub struct RocksStore {
    db: Arc<DB>,
}

impl RocksStore {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path.as_ref()).map_err(|e| {
            anyhow::anyhow!("Failed to open DB at {}: {}", path.as_ref().display(), e)
        })?;
        Ok(Self { db: Arc::new(db) })
    }
}

impl KvStore for RocksStore {
    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> anyhow::Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward));
        let mut out = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    fn write(&self, ops: Vec<WriteOp>) -> anyhow::Result<()> {
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                WriteOp::Put(k, v) => batch.put(k, v),
                WriteOp::Delete(k) => batch.delete(k),
            }
        }
        self.db.write(batch)?;
        Ok(())
    }
}

/// Buffered writes over a store.
///
/// Reads observe the pending writes. Nothing reaches the store until
/// [`Transaction::commit`]; dropping the transaction discards it.
pub struct Transaction<'a> {
    store: &'a dyn KvStore,
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> Transaction<'a> {
    pub fn new(store: &'a dyn KvStore) -> Self {
        Self {
            store,
            pending: BTreeMap::new(),
        }
    }

    pub fn get_raw(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        match self.pending.get(key) {
            Some(v) => Ok(v.clone()),
            None => self.store.get(key),
        }
    }

    pub fn scan_raw(&self, prefix: &[u8]) -> anyhow::Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.store.scan_prefix(prefix)?.into_iter().collect();
        for (k, v) in self
            .pending
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match v {
                Some(v) => {
                    merged.insert(k.clone(), v.clone());
                }
                None => {
                    merged.remove(k);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    /// Load a record
    pub fn get<T: DeserializeOwned>(&self, key: &[u8]) -> anyhow::Result<Option<T>> {
        match self.get_raw(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize::<T>(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Load every record under `prefix`
    pub fn scan<T: DeserializeOwned>(&self, prefix: &[u8]) -> anyhow::Result<Vec<T>> {
        self.scan_raw(prefix)?
            .into_iter()
            .map(|(_, v)| bincode::deserialize::<T>(&v).map_err(anyhow::Error::from))
            .collect()
    }

    /// Store a record
    pub fn put<T: Serialize>(&mut self, key: Vec<u8>, value: &T) -> anyhow::Result<()> {
        let bytes = bincode::serialize(value)?;
        self.pending.insert(key, Some(bytes));
        Ok(())
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.pending.insert(key, None);
    }

    /// Allocate the next id from the counter stored at `key`.
    /// Counters only move forward, so deleted ids are never reused.
    pub fn next_id(&mut self, key: Vec<u8>) -> anyhow::Result<u64> {
        let id = self.get::<u64>(&key)?.unwrap_or(0);
        let next = id
            .checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("id space exhausted"))?;
        self.put(key, &next)?;
        Ok(id)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn commit(self) -> anyhow::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let ops = self
            .pending
            .into_iter()
            .map(|(k, v)| match v {
                Some(v) => WriteOp::Put(k, v),
                None => WriteOp::Delete(k),
            })
            .collect();
        self.store.write(ops)
    }
}
