use std::num::NonZeroU32;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::retry::RetryPolicy;
use crate::store::{Strategy, DEFAULT_POLL_BATCH};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// How appends on the same key are serialized cluster-wide.
    #[arg(long, value_enum, default_value_t = StrategyArg::Cas)]
    pub strategy: StrategyArg,

    /// Maximum entries returned by a single poll.
    #[arg(long, default_value_t = DEFAULT_POLL_BATCH)]
    pub poll_batch: usize,

    /// Give up after this many conflicting attempts instead of retrying
    /// forever.
    #[arg(long)]
    pub max_retries: Option<NonZeroU32>,

    /// Milliseconds to sleep between conflicting attempts.
    #[arg(long, default_value_t = 0)]
    pub retry_backoff_ms: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyArg {
    /// Per-key lock record acquired via CAS before every operation.
    Lock,
    /// Optimistic read-modify-CAS with retry on conflict.
    Cas,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Lock => Strategy::LockKey,
            StrategyArg::Cas => Strategy::CasRetry,
        }
    }
}

impl Cli {
    pub fn retry_policy(&self) -> RetryPolicy {
        let base = match self.max_retries {
            Some(max) => RetryPolicy::bounded(max),
            None => RetryPolicy::unbounded(),
        };
        base.with_backoff(Duration::from_millis(self.retry_backoff_ms))
    }
}
