use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use fedimapper_core::config::AppConfig;
use fedimapper_ingest::{IngestContext, IngestProcessor};
use fedimapper_networking::{Fetcher, NetworkProbe};
use fedimapper_scheduler::{QueueRunner, SelectionPolicy};
use fedimapper_storage::Storage;

pub async fn run_crawl(config: AppConfig) -> Result<()> {
    // Every worker holds a connection while writing, plus headroom for the
    // coordinator's selection queries.
    let pool_size = (config.queue.num_processes as u32 + 5).max(10);
    let storage = Storage::with_pool_size(
        &config.database.url,
        config.database.bulk_insert_buffer,
        pool_size,
    )
    .await?;
    storage.run_migrations().await?;

    let fetcher = Arc::new(Fetcher::new(&config.crawler, &config.fetch)?);
    let probe = Arc::new(NetworkProbe::new());

    let ctx = Arc::new(IngestContext {
        storage: storage.clone(),
        fetcher,
        probe,
        config: config.crawler.clone(),
    });

    let selection = SelectionPolicy::new(storage, config.crawler.clone());
    let runner = QueueRunner::new(config.queue.clone(), IngestProcessor::new(ctx));

    info!(
        workers = config.queue.num_processes,
        "starting crawl engine"
    );
    runner.run(selection).await
}
