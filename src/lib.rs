//! Replicated, append-only, per-key log service built on a shared
//! linearizable key-value substrate.
//!
//! The only cluster-wide coordination primitive available is the substrate's
//! compare-and-swap; there is no consensus library and no native distributed
//! log. Multi-writer safety is derived from CAS alone, either through a lock
//! record per key or through optimistic read-modify-CAS retries. Each module
//! focuses on a concrete responsibility:
//!
//! - [`kv`] defines the substrate contract (`read`, `write`,
//!   `compare_and_swap`) plus an in-process implementation used by the
//!   local binary and tests.
//! - [`keys`] derives the substrate key namespaces (`logs-`, `commit-`,
//!   `lock-`) so log data, consumer offsets, and lock records never collide.
//! - [`retry`] makes the conflict-retry loop an explicit, testable policy
//!   instead of an unbounded spin.
//! - [`store`] owns the log data model: append, poll, commit, and committed
//!   offset lookup, with the two interchangeable concurrency strategies.
//! - [`protocol`] is the typed wire vocabulary; log entries serialize as
//!   `[offset, msg]` pairs for interoperability with existing clients.
//! - [`router`] maps one typed request onto one store operation and shapes
//!   the reply.
//! - [`endpoint`] speaks the newline-delimited JSON protocol over any async
//!   reader/writer pair, one spawned task per inbound request.
//! - [`cli`] parses the command-line interface for the serving binary.
//!
//! Integration tests use this crate directly to race concurrent appenders
//! and to exercise the wire protocol end to end.

pub mod cli;
pub mod endpoint;
pub mod keys;
pub mod kv;
pub mod protocol;
pub mod retry;
pub mod router;
pub mod store;
