use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use fedimapper_core::config::CrawlerConfig;
use fedimapper_core::{FetchError, HostProcessor, IngestStatus};
use fedimapper_networking::{can_access_https, Fetcher, NetworkProbe};
use fedimapper_parser::{asn, fld, sha256_hex};
use fedimapper_storage::{AsnRecord, Storage};

pub mod ingesters;
pub mod services;

pub use ingesters::IngesterKind;

/// Everything one ingest needs: a store handle, the bounded fetcher, the
/// DNS/ASN probe and the crawl policy knobs.
pub struct IngestContext {
    pub storage: Storage,
    pub fetcher: Arc<Fetcher>,
    pub probe: Arc<NetworkProbe>,
    pub config: CrawlerConfig,
}

/// Visit a single host and refresh everything we know about it. Each step
/// commits as it goes; a terminal status is always recorded unless the host
/// was filtered before any side effects.
pub async fn ingest_host(ctx: &IngestContext, host: &str) -> Result<()> {
    let host = host.trim().trim_end_matches('.').to_lowercase();
    info!(host, "ingesting");

    for suffix in &ctx.config.evil_domains {
        if host.ends_with(suffix) {
            info!(host, suffix, "skipping ingest for matching evil pattern");
            return Ok(());
        }
    }

    // Placeholder for redirect resolution; some instances answer on a www
    // or social subdomain and will need the redirect target recorded here.
    let www_host = host.clone();

    // DNS first: it hits external services and shouldn't sit inside any
    // row-level contention window.
    let ip = ctx.probe.resolve(&www_host).await;

    let instance = ctx.storage.get_or_create_instance(&host).await?;
    let digest = instance
        .digest
        .clone()
        .unwrap_or_else(|| sha256_hex(&host));
    ctx.storage
        .touch_instance(&host, &digest, &fld::base_domain(&host), &www_host)
        .await?;

    let Some(ip) = ip else {
        info!(host, "no dns");
        ctx.storage
            .set_ingest_status(&host, IngestStatus::NoDns.as_str())
            .await?;
        return Ok(());
    };

    let mut asn_label = None;
    if let Some(asn_info) = ctx.probe.asn_lookup(ip).await {
        let record = AsnRecord {
            asn: asn_info.asn.clone(),
            cc: asn_info.cc,
            company: asn_info.owner.as_deref().map(asn::clean_company),
            owner: asn_info.owner,
            prefix: asn_info.prefix,
        };
        ctx.storage.upsert_asn(&record).await?;
        asn_label = Some(asn_info.asn);
        debug!(host, "asn saved");
    }
    ctx.storage
        .set_network_info(&host, &ip.to_string(), asn_label.as_deref())
        .await?;

    let https = can_access_https(&ctx.fetcher, &www_host).await;
    if !https.reachable {
        info!(host, status = https.status, "unable to reach host");
        ctx.storage
            .set_ingest_status(&host, IngestStatus::Unreachable.as_str())
            .await?;
        return Ok(());
    }
    if https.status == 530 || body_is_parked(https.body.as_deref()) {
        info!(host, "host no longer has hosting");
        ctx.storage
            .set_ingest_status(&host, IngestStatus::Disabled.as_str())
            .await?;
        return Ok(());
    }

    let nodeinfo = match services::nodeinfo::fetch(&ctx.fetcher, &www_host).await {
        Ok(nodeinfo) => nodeinfo,
        Err(e) => return record_failure(ctx, &host, e.into()).await,
    };
    ctx.storage
        .set_nodeinfo_version(&host, nodeinfo.as_ref().map(|n| n.version.as_str()))
        .await?;

    // Re-read so the ingesters see the www_host and peer stamp just written.
    let instance = ctx.storage.get_or_create_instance(&host).await?;

    let kind = nodeinfo
        .as_ref()
        .and_then(|n| IngesterKind::for_software(&n.software.name))
        .unwrap_or(IngesterKind::Mastodon);

    let mut saved = match kind.save(ctx, &instance, nodeinfo.as_ref()).await {
        Ok(saved) => saved,
        Err(e) => return record_failure(ctx, &host, e).await,
    };

    if !saved && nodeinfo.is_some() && kind != IngesterKind::Nodeinfo {
        saved = match IngesterKind::Nodeinfo
            .save(ctx, &instance, nodeinfo.as_ref())
            .await
        {
            Ok(saved) => saved,
            Err(e) => return record_failure(ctx, &host, e).await,
        };
    }

    if saved {
        ctx.storage.mark_ingest_success(&host).await?;
        info!(host, "successfully processed");
    } else {
        ctx.storage
            .set_ingest_status(&host, IngestStatus::UnknownService.as_str())
            .await?;
        info!(host, "unable to process");
    }
    Ok(())
}

/// Record the terminal status for a failed ingest. Robots denials are an
/// expected outcome; anything else is surfaced to the worker as an error.
async fn record_failure(ctx: &IngestContext, host: &str, error: anyhow::Error) -> Result<()> {
    if matches!(
        error.downcast_ref::<FetchError>(),
        Some(FetchError::RobotsBlocked(_))
    ) {
        info!(host, "blocked by robots policy");
        ctx.storage
            .set_ingest_status(host, IngestStatus::RobotsBlocked.as_str())
            .await?;
        return Ok(());
    }

    ctx.storage
        .set_ingest_status(host, IngestStatus::CrawlError.as_str())
        .await?;
    Err(error)
}

/// Reachable-but-gone hosts: parked domains and dangling tunnel endpoints
/// answer 200 with a tell-tale body.
fn body_is_parked(body: Option<&str>) -> bool {
    let Some(body) = body else {
        return false;
    };
    let body = body.to_lowercase();
    body.contains("domain parking") || body.contains("err_ngrok_3200")
}

/// Queue-runner adapter: one of these is handed to every worker.
#[derive(Clone)]
pub struct IngestProcessor {
    ctx: Arc<IngestContext>,
}

impl IngestProcessor {
    pub fn new(ctx: Arc<IngestContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl HostProcessor for IngestProcessor {
    async fn process(&self, host: &str) -> Result<()> {
        ingest_host(&self.ctx, host).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parked_body_detection() {
        assert!(body_is_parked(Some("This Domain Parking page is free")));
        assert!(body_is_parked(Some("Tunnel error: ERR_NGROK_3200")));
        assert!(!body_is_parked(Some("<html>a mastodon server</html>")));
        assert!(!body_is_parked(None));
    }
}
