use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;

use replicated_log::{
    cli::Cli,
    endpoint,
    kv::MemKv,
    router::Router,
    store::LogStore,
};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the wire protocol, so diagnostics go to stderr.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let store = LogStore::new(Arc::new(MemKv::new()), cli.strategy.into())
        .with_poll_batch(cli.poll_batch)
        .with_retry_policy(cli.retry_policy());
    let router = Arc::new(Router::new(Arc::new(store)));

    info!(strategy = ?cli.strategy, poll_batch = cli.poll_batch, "serving log requests on stdin/stdout");
    endpoint::serve(router, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;

    Ok(())
}
