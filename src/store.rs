//! Log data model and operations over the shared substrate.
//!
//! The store holds no local state between calls: every operation re-reads
//! the substrate, which is the single source of truth for the cluster. The
//! central invariant is that offsets within one log are a dense, zero-based
//! sequence — appends must never duplicate and never skip an offset, no
//! matter how concurrent appenders from different nodes interleave.
//!
//! Two interchangeable strategies derive that safety from compare-and-swap
//! alone, see [`Strategy`].

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::keys;
use crate::kv::{KvError, KvStore};
use crate::protocol::Entry;
use crate::retry::RetryPolicy;

/// Entries returned by a single poll when no other cap is configured.
pub const DEFAULT_POLL_BATCH: usize = 10;

const LOCK_FREE: i64 = 0;
const LOCK_HELD: i64 = 1;

/// How appends on the same key are serialized cluster-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Exclusive access through a per-key lock record: CAS `0 → 1` with
    /// create-if-absent, retried on conflict; released by writing `0` on
    /// every exit path. Every operation on the key takes the lock, which
    /// serializes them cluster-wide. A spinning contender has no fairness
    /// guarantee and may starve under adversarial scheduling; a holder that
    /// crashes leaves the record stuck at `1` with no lease to reclaim it.
    LockKey,
    /// Optimistic concurrency: read the full log, append locally, CAS the
    /// old value for the new one, and re-read on conflict. The new value is
    /// always computed from the just-read old value, so any lost race is
    /// detected by the substrate's atomic compare. Reads and commits touch
    /// the substrate directly with no lock. This is the default: it has no
    /// stuck-lock failure mode and contends only on actual writes.
    CasRetry,
}

/// Failures surfaced by log operations.
///
/// Substrate conflicts never appear here: they are consumed by the retry
/// loops, except when a bounded [`RetryPolicy`] runs out of attempts.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("gave up after {attempts} conflicting attempts on '{key}'")]
    RetriesExhausted { key: String, attempts: u32 },
    #[error("malformed record under substrate key '{0}'")]
    BadRecord(String),
    #[error(transparent)]
    Kv(#[from] KvError),
}

/// Append-only per-key logs plus consumer offsets, all owned by the
/// substrate rather than by any single node.
pub struct LogStore<K> {
    kv: Arc<K>,
    strategy: Strategy,
    retry: RetryPolicy,
    poll_batch: usize,
}

impl<K: KvStore> LogStore<K> {
    pub fn new(kv: Arc<K>, strategy: Strategy) -> Self {
        Self {
            kv,
            strategy,
            retry: RetryPolicy::default(),
            poll_batch: DEFAULT_POLL_BATCH,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_batch(mut self, poll_batch: usize) -> Self {
        self.poll_batch = poll_batch;
        self
    }

    /// Appends `msg` to the log named `key` and returns the assigned offset.
    ///
    /// The first append to an unseen key creates the log and returns 0.
    pub async fn append(&self, key: &str, msg: i64) -> Result<u64, LogError> {
        match self.strategy {
            Strategy::LockKey => {
                self.with_lock(key, || self.append_exclusive(key, msg)).await
            }
            Strategy::CasRetry => self.append_optimistic(key, msg).await,
        }
    }

    /// Returns entries of `key` with offset ≥ `from`, in ascending offset
    /// order, at most `poll_batch` of them. An unknown key or a `from`
    /// beyond the end of the log yields an empty batch, not an error.
    pub async fn poll(&self, key: &str, from: u64) -> Result<Vec<Entry>, LogError> {
        match self.strategy {
            Strategy::LockKey => self.with_lock(key, || self.poll_shared(key, from)).await,
            Strategy::CasRetry => self.poll_shared(key, from).await,
        }
    }

    /// Records consumer progress for `key`. Unconditional: a commit to an
    /// older offset than a prior commit overwrites it, mirroring the
    /// externally observed contract.
    pub async fn commit(&self, key: &str, offset: u64) -> Result<(), LogError> {
        match self.strategy {
            Strategy::LockKey => self.with_lock(key, || self.commit_shared(key, offset)).await,
            Strategy::CasRetry => self.commit_shared(key, offset).await,
        }
    }

    /// Returns the last committed offset of `key`, or 0 when nothing was
    /// ever committed.
    pub async fn committed_offset(&self, key: &str) -> Result<u64, LogError> {
        match self.strategy {
            Strategy::LockKey => self.with_lock(key, || self.committed_shared(key)).await,
            Strategy::CasRetry => self.committed_shared(key).await,
        }
    }

    async fn append_optimistic(&self, key: &str, msg: i64) -> Result<u64, LogError> {
        let log_key = keys::log_key(key);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let current = self.read_messages(&log_key).await?;
            let offset = current.len() as u64;
            let mut next = current.clone();
            next.push(msg);

            // An empty `current` covers both a missing key and an empty
            // stored array; create-if-absent makes the CAS valid for either.
            let swap = self
                .kv
                .compare_and_swap(
                    &log_key,
                    Value::from(current),
                    Value::from(next),
                    offset == 0,
                )
                .await;
            match swap {
                Ok(()) => {
                    debug!(key, offset, attempt, "append committed");
                    return Ok(offset);
                }
                Err(KvError::PreconditionFailed) => {
                    debug!(key, attempt, "append lost the race, re-reading");
                    if !self.retry.pause(attempt).await {
                        return Err(LogError::RetriesExhausted {
                            key: key.to_string(),
                            attempts: attempt,
                        });
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn append_exclusive(&self, key: &str, msg: i64) -> Result<u64, LogError> {
        let log_key = keys::log_key(key);
        let mut messages = self.read_messages(&log_key).await?;
        messages.push(msg);
        let offset = messages.len() as u64 - 1;
        self.kv.write(&log_key, Value::from(messages)).await?;
        debug!(key, offset, "append committed under lock");
        Ok(offset)
    }

    async fn poll_shared(&self, key: &str, from: u64) -> Result<Vec<Entry>, LogError> {
        let messages = self.read_messages(&keys::log_key(key)).await?;
        let start = usize::try_from(from).unwrap_or(usize::MAX);
        if start >= messages.len() {
            return Ok(Vec::new());
        }
        Ok(messages[start..]
            .iter()
            .take(self.poll_batch)
            .enumerate()
            .map(|(i, &msg)| Entry {
                offset: from + i as u64,
                msg,
            })
            .collect())
    }

    async fn commit_shared(&self, key: &str, offset: u64) -> Result<(), LogError> {
        self.kv
            .write(&keys::commit_key(key), Value::from(offset))
            .await?;
        Ok(())
    }

    async fn committed_shared(&self, key: &str) -> Result<u64, LogError> {
        match self.kv.read(&keys::commit_key(key)).await {
            Ok(value) => serde_json::from_value(value)
                .map_err(|_| LogError::BadRecord(keys::commit_key(key))),
            Err(KvError::KeyNotFound) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    /// Reads the stored message sequence; a missing key is an empty log.
    async fn read_messages(&self, log_key: &str) -> Result<Vec<i64>, LogError> {
        match self.kv.read(log_key).await {
            Ok(value) => {
                serde_json::from_value(value).map_err(|_| LogError::BadRecord(log_key.to_string()))
            }
            Err(KvError::KeyNotFound) => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Runs `op` while holding the lock record of `key`. The release runs
    /// on every exit path so an operation error cannot strand the lock.
    async fn with_lock<T, F, Fut>(&self, key: &str, op: F) -> Result<T, LogError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, LogError>>,
    {
        self.acquire_lock(key).await?;
        let result = op().await;
        self.release_lock(key).await;
        result
    }

    async fn acquire_lock(&self, key: &str) -> Result<(), LogError> {
        let lock_key = keys::lock_key(key);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let swap = self
                .kv
                .compare_and_swap(&lock_key, Value::from(LOCK_FREE), Value::from(LOCK_HELD), true)
                .await;
            match swap {
                Ok(()) => return Ok(()),
                Err(KvError::PreconditionFailed) => {
                    if !self.retry.pause(attempt).await {
                        return Err(LogError::RetriesExhausted {
                            key: key.to_string(),
                            attempts: attempt,
                        });
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// A failed unlock write is logged rather than propagated so it cannot
    /// mask the result of the operation it follows.
    async fn release_lock(&self, key: &str) {
        if let Err(err) = self
            .kv
            .write(&keys::lock_key(key), Value::from(LOCK_FREE))
            .await
        {
            warn!(key, error = %err, "failed to release lock record");
        }
    }
}
