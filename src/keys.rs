//! Derived substrate key namespaces.
//!
//! A single log key fans out into three substrate records: the entry
//! sequence, the consumer's committed offset, and the mutual-exclusion lock
//! record. Distinct prefixes keep the namespaces from ever colliding.

/// Substrate key holding the entry sequence of `key`.
pub fn log_key(key: &str) -> String {
    format!("logs-{key}")
}

/// Substrate key holding the committed consumer offset of `key`.
pub fn commit_key(key: &str) -> String {
    format!("commit-{key}")
}

/// Substrate key holding the lock record of `key`.
pub fn lock_key(key: &str) -> String {
    format!("lock-{key}")
}
