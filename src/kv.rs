//! Contract for the shared key-value substrate.
//!
//! The substrate is the sole shared mutable resource in the system: it holds
//! the logs, the consumer offsets, and the lock records, and its
//! compare-and-swap is the only cross-node coordination primitive the rest
//! of the crate is allowed to assume.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;

/// Failure signals of the substrate, mirrored one-to-one in the service's
/// error taxonomy: `PreconditionFailed` is always retried internally,
/// `KeyNotFound` is translated to a defined default, anything else aborts
/// the single request that hit it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    #[error("key does not exist")]
    KeyNotFound,
    #[error("compare-and-swap precondition failed")]
    PreconditionFailed,
    #[error("substrate unavailable: {0}")]
    Unavailable(String),
}

/// Durable key-value store with linearizable reads, writes, and CAS.
///
/// Methods use RPITIT (`-> impl Future + Send`) so implementations stay
/// object-free and no `async-trait` dependency is needed. Values are JSON so
/// a remote substrate can carry them unchanged.
pub trait KvStore: Send + Sync + 'static {
    /// Returns the current value for `key`, or [`KvError::KeyNotFound`].
    fn read(&self, key: &str) -> impl Future<Output = Result<Value, KvError>> + Send;

    /// Unconditionally stores `value` under `key`.
    fn write(&self, key: &str, value: Value) -> impl Future<Output = Result<(), KvError>> + Send;

    /// Atomically replaces the value under `key` with `new` if the current
    /// value equals `expected`.
    ///
    /// When the key is absent: with `create_if_absent` the swap succeeds and
    /// creates the key holding `new`; without it the call fails with
    /// [`KvError::KeyNotFound`]. A present value that differs from
    /// `expected` fails with [`KvError::PreconditionFailed`].
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Value,
        new: Value,
        create_if_absent: bool,
    ) -> impl Future<Output = Result<(), KvError>> + Send;
}

/// In-process substrate with the same observable semantics as a remote
/// linearizable store.
///
/// The local binary and the tests bind against this where a deployment
/// would bind against the cluster's shared store. A plain `Mutex` is enough:
/// no guard is ever held across an await point.
#[derive(Default)]
pub struct MemKv {
    data: Mutex<HashMap<String, Value>>,
}

impl MemKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemKv {
    fn read(&self, key: &str) -> impl Future<Output = Result<Value, KvError>> + Send {
        let result = self
            .data
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(KvError::KeyNotFound);
        async move { result }
    }

    fn write(&self, key: &str, value: Value) -> impl Future<Output = Result<(), KvError>> + Send {
        self.data.lock().unwrap().insert(key.to_string(), value);
        async move { Ok(()) }
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Value,
        new: Value,
        create_if_absent: bool,
    ) -> impl Future<Output = Result<(), KvError>> + Send {
        let result = {
            let mut data = self.data.lock().unwrap();
            match data.get(key) {
                Some(current) if *current == expected => {
                    data.insert(key.to_string(), new);
                    Ok(())
                }
                Some(_) => Err(KvError::PreconditionFailed),
                None if create_if_absent => {
                    data.insert(key.to_string(), new);
                    Ok(())
                }
                None => Err(KvError::KeyNotFound),
            }
        };
        async move { result }
    }
}
