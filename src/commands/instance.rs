use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use fedimapper_core::config::AppConfig;
use fedimapper_ingest::services::mastodon;
use fedimapper_ingest::{ingest_host, IngestContext};
use fedimapper_networking::{Fetcher, NetworkProbe};
use fedimapper_parser::version;
use fedimapper_storage::Storage;

fn build_fetcher(config: &AppConfig) -> Result<Fetcher> {
    Fetcher::new(&config.crawler, &config.fetch).context("unable to build HTTP client")
}

fn pretty_print(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run_ingest(config: AppConfig, host: &str) -> Result<()> {
    let storage = Storage::new(&config.database.url, config.database.bulk_insert_buffer).await?;
    storage.run_migrations().await?;

    let ctx = IngestContext {
        storage,
        fetcher: Arc::new(build_fetcher(&config)?),
        probe: Arc::new(NetworkProbe::new()),
        config: config.crawler,
    };
    ingest_host(&ctx, host).await?;
    println!("Ingest complete.");
    Ok(())
}

pub async fn show_metadata(config: AppConfig, host: &str) -> Result<()> {
    let fetcher = build_fetcher(&config)?;
    let metadata = mastodon::get_metadata(&fetcher, host)
        .await
        .with_context(|| format!("unable to fetch instance metadata from {host}"))?;
    pretty_print(&metadata)
}

pub async fn show_version(config: AppConfig, host: &str) -> Result<()> {
    let fetcher = build_fetcher(&config)?;
    let metadata = mastodon::get_metadata(&fetcher, host)
        .await
        .with_context(|| format!("unable to fetch instance metadata from {host}"))?;
    let raw = metadata
        .get("version")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();

    let breakdown = version::breakdown(raw);
    pretty_print(&json!({
        "version": raw,
        "software": breakdown.as_ref().map(|b| b.software.clone()),
        "software_version": breakdown.as_ref().and_then(|b| b.software_version.clone()),
        "mastodon_version": breakdown.as_ref().and_then(|b| b.mastodon_version.clone()),
    }))
}

pub async fn show_peers(config: AppConfig, host: &str) -> Result<()> {
    let fetcher = build_fetcher(&config)?;
    let peers = mastodon::get_peers(&fetcher, host)
        .await
        .with_context(|| format!("unable to fetch peer list from {host}"))?;
    pretty_print(&json!(peers))
}

pub async fn show_blocks(config: AppConfig, host: &str) -> Result<()> {
    let fetcher = build_fetcher(&config)?;
    let blocks = mastodon::get_blocked_instances(&fetcher, host)
        .await
        .with_context(|| format!("unable to fetch ban list from {host}"))?;
    let rows: Vec<serde_json::Value> = blocks
        .into_iter()
        .map(|block| {
            json!({
                "domain": block.domain,
                "digest": block.digest,
                "severity": block.severity,
                "comment": block.comment,
            })
        })
        .collect();
    pretty_print(&json!(rows))
}
