//! Integration tests racing concurrent appenders against the substrate.
//!
//! The dense-offset invariant must hold under any interleaving, so these
//! tests spawn real tasks on a multi-threaded runtime and also inject
//! forced compare-and-swap conflicts to exercise the retry paths.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use replicated_log::kv::{KvError, KvStore, MemKv};
use replicated_log::retry::RetryPolicy;
use replicated_log::store::{LogError, LogStore, Strategy};
use serde_json::Value;

/// Substrate wrapper that fails the next `remaining` compare-and-swap
/// attempts with `PreconditionFailed` before delegating to the inner store.
struct InjectedConflicts<K> {
    inner: K,
    remaining: AtomicU32,
}

impl<K> InjectedConflicts<K> {
    fn new(inner: K, conflicts: u32) -> Self {
        Self {
            inner,
            remaining: AtomicU32::new(conflicts),
        }
    }
}

impl<K: KvStore> KvStore for InjectedConflicts<K> {
    fn read(&self, key: &str) -> impl Future<Output = Result<Value, KvError>> + Send {
        self.inner.read(key)
    }

    fn write(&self, key: &str, value: Value) -> impl Future<Output = Result<(), KvError>> + Send {
        self.inner.write(key, value)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Value,
        new: Value,
        create_if_absent: bool,
    ) -> impl Future<Output = Result<(), KvError>> + Send {
        let inject = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        async move {
            if inject {
                return Err(KvError::PreconditionFailed);
            }
            self.inner
                .compare_and_swap(key, expected, new, create_if_absent)
                .await
        }
    }
}

/// Backoff keeps spinning contenders from monopolizing worker threads in
/// these tests; the invariant itself must hold with or without it.
fn contended_store<K: KvStore>(kv: Arc<K>, strategy: Strategy) -> Arc<LogStore<K>> {
    Arc::new(
        LogStore::new(kv, strategy)
            .with_retry_policy(RetryPolicy::unbounded().with_backoff(Duration::from_millis(1))),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_appenders_observe_dense_offsets() {
    const TASKS: usize = 8;
    const APPENDS_PER_TASK: usize = 5;

    for strategy in [Strategy::CasRetry, Strategy::LockKey] {
        let store = contended_store(Arc::new(MemKv::new()), strategy);

        let appenders = (0..TASKS).map(|task| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut offsets = Vec::new();
                for i in 0..APPENDS_PER_TASK {
                    let msg = (task * APPENDS_PER_TASK + i) as i64;
                    offsets.push(store.append("queue", msg).await.expect("append"));
                }
                offsets
            })
        });

        let mut offsets: Vec<u64> = join_all(appenders)
            .await
            .into_iter()
            .flat_map(|task| task.expect("appender task"))
            .collect();
        offsets.sort_unstable();

        let expected: Vec<u64> = (0..(TASKS * APPENDS_PER_TASK) as u64).collect();
        assert_eq!(offsets, expected, "strategy {strategy:?} left gaps or duplicates");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn forced_conflict_race_still_yields_distinct_offsets() {
    for strategy in [Strategy::CasRetry, Strategy::LockKey] {
        let kv = Arc::new(InjectedConflicts::new(MemKv::new(), 1));
        let store = contended_store(kv, strategy);

        let racers = [10i64, 20].map(|msg| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.append("queue", msg).await.expect("append") })
        });

        let mut offsets: Vec<u64> = join_all(racers)
            .await
            .into_iter()
            .map(|task| task.expect("racing task"))
            .collect();
        offsets.sort_unstable();
        assert_eq!(offsets, vec![0, 1]);

        // Both messages landed, each exactly once, in offset order.
        let entries = store.poll("queue", 0).await.expect("poll");
        assert_eq!(entries.len(), 2);
        let mut msgs: Vec<i64> = entries.iter().map(|e| e.msg).collect();
        msgs.sort_unstable();
        assert_eq!(msgs, vec![10, 20]);
    }
}

#[tokio::test]
async fn single_conflict_is_retried_invisibly() {
    let kv = Arc::new(InjectedConflicts::new(MemKv::new(), 1));
    let store = LogStore::new(kv, Strategy::CasRetry);

    // The injected conflict is absorbed by the retry loop; the caller only
    // sees the assigned offset.
    assert_eq!(store.append("queue", 10).await.expect("append"), 0);
}

#[tokio::test]
async fn bounded_policy_surfaces_retries_exhausted() {
    for strategy in [Strategy::CasRetry, Strategy::LockKey] {
        let kv = Arc::new(InjectedConflicts::new(MemKv::new(), u32::MAX));
        let store = LogStore::new(kv, strategy)
            .with_retry_policy(RetryPolicy::bounded(NonZeroU32::new(2).unwrap()));

        let err = store.append("queue", 10).await.expect_err("must give up");
        match err {
            LogError::RetriesExhausted { key, attempts } => {
                assert_eq!(key, "queue");
                assert_eq!(attempts, 2);
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn operations_on_different_keys_proceed_independently() {
    let store = contended_store(Arc::new(MemKv::new()), Strategy::LockKey);

    let per_key = ["a", "b", "c"].map(|key| {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            let mut offsets = Vec::new();
            for msg in 0..10i64 {
                offsets.push(store.append(key, msg).await.expect("append"));
            }
            offsets
        })
    });

    for task in join_all(per_key).await {
        let mut offsets = task.expect("per-key appender");
        offsets.sort_unstable();
        let expected: Vec<u64> = (0..10).collect();
        assert_eq!(offsets, expected);
    }
}
