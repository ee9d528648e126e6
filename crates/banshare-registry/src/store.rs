//! Transactional record storage keyed by IP.
//!
//! The registry only needs single-record read-modify-write transactions plus
//! snapshot scans. [`MemoryStore`] shards records across independently locked
//! maps so transactions on different IPs rarely contend.

use async_trait::async_trait;
use banshare_core::{IpRecord, StatusKind};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::StoreError;

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 16;

/// Default time to wait for a shard lock before reporting [`StoreError::Busy`].
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(250);

/// What a transaction does with the record it read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Leave the stored record untouched.
    Keep,
    /// Insert or overwrite the record.
    Put(IpRecord),
    /// Remove the record.
    Delete,
}

impl Mutation {
    /// Mutation that turns `before` into `after`.
    #[must_use]
    pub fn between(before: Option<&IpRecord>, after: Option<IpRecord>) -> Self {
        match after {
            Some(record) if before == Some(&record) => Self::Keep,
            Some(record) => Self::Put(record),
            None if before.is_some() => Self::Delete,
            None => Self::Keep,
        }
    }
}

/// A key-value store of [`IpRecord`]s with per-record atomic updates.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read the record for `ip`, decide a mutation, and apply it atomically.
    ///
    /// Fails with [`StoreError::Busy`] when the record cannot be locked in time.
    async fn transact<F, T>(&self, ip: &str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(Option<&IpRecord>) -> (Mutation, T) + Send,
        T: Send;

    /// IPs of every stored record.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Snapshot of all records with the given status, ordered by IP.
    async fn scan(&self, status: StatusKind) -> Result<Vec<IpRecord>, StoreError>;
}

/// In-memory sharded store.
pub struct MemoryStore {
    shards: Vec<Mutex<HashMap<String, IpRecord>>>,
    lock_timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS, DEFAULT_LOCK_TIMEOUT)
    }
}

impl MemoryStore {
    /// Create a store with `shards` partitions (at least one).
    #[must_use]
    pub fn new(shards: usize, lock_timeout: Duration) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| Mutex::new(HashMap::new())).collect(),
            lock_timeout,
        }
    }

    /// Total number of stored records.
    pub async fn len(&self) -> Result<usize, StoreError> {
        let mut total = 0;
        for index in 0..self.shards.len() {
            total += self.lock_shard(index).await?.len();
        }
        Ok(total)
    }

    /// True when no records are stored.
    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    fn shard_index(&self, ip: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        ip.hash(&mut hasher);
        // Truncation is fine: only the low bits select a shard.
        #[allow(clippy::cast_possible_truncation)]
        let hash = hasher.finish() as usize;
        hash % self.shards.len()
    }

    async fn lock_shard(
        &self,
        index: usize,
    ) -> Result<MutexGuard<'_, HashMap<String, IpRecord>>, StoreError> {
        tokio::time::timeout(self.lock_timeout, self.shards[index].lock())
            .await
            .map_err(|_| StoreError::Busy)
    }

    #[cfg(test)]
    pub(crate) async fn hold_shard_of(&self, ip: &str) -> MutexGuard<'_, HashMap<String, IpRecord>> {
        self.shards[self.shard_index(ip)].lock().await
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn transact<F, T>(&self, ip: &str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(Option<&IpRecord>) -> (Mutation, T) + Send,
        T: Send,
    {
        let mut shard = self.lock_shard(self.shard_index(ip)).await?;
        let (mutation, out) = f(shard.get(ip));
        match mutation {
            Mutation::Keep => {}
            Mutation::Put(record) => {
                shard.insert(ip.to_string(), record);
            }
            Mutation::Delete => {
                shard.remove(ip);
            }
        }
        Ok(out)
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for index in 0..self.shards.len() {
            keys.extend(self.lock_shard(index).await?.keys().cloned());
        }
        keys.sort();
        Ok(keys)
    }

    async fn scan(&self, status: StatusKind) -> Result<Vec<IpRecord>, StoreError> {
        let mut records = Vec::new();
        for index in 0..self.shards.len() {
            let shard = self.lock_shard(index).await?;
            records.extend(shard.values().filter(|r| r.kind() == status).cloned());
        }
        records.sort_by(|a, b| a.ip.cmp(&b.ip));
        Ok(records)
    }
}
