//! Repostguard - near-duplicate image repost detection bot.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use repostguard_core::{MemoryStore, RecordStore, SqliteStore};

use repostguard_bot::config::Config;
use repostguard_bot::fetch::HttpMediaFetcher;
use repostguard_bot::pipeline::{IngestionPipeline, PipelineConfig};
use repostguard_bot::reddit::{RedditNotifier, RedditStream};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    let subreddit = config
        .subreddit
        .clone()
        .context("SUBREDDIT environment variable not set")?;
    let token = config
        .reddit_token
        .clone()
        .context("REDDIT_ACCESS_TOKEN environment variable not set")?;

    let store: Arc<dyn RecordStore> = match &config.database_url {
        Some(url) => Arc::new(
            SqliteStore::connect(url)
                .await
                .with_context(|| format!("failed to open record store at {url}"))?,
        ),
        None => {
            warn!("DATABASE_URL not set, fingerprints will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let stream = RedditStream::new(&subreddit, &config.user_agent, config.poll_interval)
        .context("failed to create submission stream")?;
    let fetcher = HttpMediaFetcher::new(config.fetch_timeout, &config.user_agent)
        .context("failed to create media fetcher")?;
    let notifier =
        RedditNotifier::new(token, &config.user_agent).context("failed to create notifier")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
        }
        let _ = shutdown_tx.send(true);
    });

    info!(%subreddit, "watching for reposts");
    let pipeline = IngestionPipeline::new(
        stream,
        fetcher,
        notifier,
        store,
        PipelineConfig {
            backoff: config.backoff,
            report_reason: config.report_reason.clone(),
        },
        shutdown_rx,
    );
    pipeline.run().await;

    Ok(())
}
