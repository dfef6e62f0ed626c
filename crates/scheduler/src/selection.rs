use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::debug;

use fedimapper_core::config::CrawlerConfig;
use fedimapper_core::{HostSource, IngestStatus};
use fedimapper_storage::Storage;

/// Chooses the next hosts to visit, freshest-information-first:
/// never-scanned hosts, then successfully scanned hosts going stale, then
/// previously unreadable hosts on a slower cadence.
pub struct SelectionPolicy {
    storage: Storage,
    crawler: CrawlerConfig,
}

impl SelectionPolicy {
    pub fn new(storage: Storage, mut crawler: CrawlerConfig) -> Self {
        // Instance rows are keyed by lowercase host; a mixed-case bootstrap
        // entry would seed a row no ingest ever resolves to.
        for host in &mut crawler.bootstrap_instances {
            *host = host.trim().to_lowercase();
        }
        Self { storage, crawler }
    }
}

#[async_trait]
impl HostSource for SelectionPolicy {
    async fn next_hosts(&mut self, desired: usize) -> Result<Option<Vec<String>>> {
        // Keep the bootstrap rows present; on a fresh database they are the
        // only thing the first tier can return.
        self.storage
            .bootstrap_instances(&self.crawler.bootstrap_instances)
            .await?;

        let mut hosts: Vec<String> = Vec::with_capacity(desired);
        let mut seen: HashSet<String> = HashSet::with_capacity(desired);
        let mut demand = desired as i64;

        for tier in [Tier::Unscanned, Tier::Stale, Tier::Unreachable] {
            if demand <= 0 {
                break;
            }
            let batch = self.query_tier(tier, demand).await?;
            for host in batch {
                if seen.insert(host.clone()) {
                    hosts.push(host);
                    demand -= 1;
                }
            }
        }

        if hosts.is_empty() {
            debug!("all instances have been crawled recently, nothing available");
        }
        Ok(Some(hosts))
    }
}

#[derive(Clone, Copy)]
enum Tier {
    Unscanned,
    Stale,
    Unreachable,
}

impl SelectionPolicy {
    async fn query_tier(&self, tier: Tier, demand: i64) -> Result<Vec<String>> {
        match tier {
            Tier::Unscanned => self.storage.select_unscanned(demand).await,
            Tier::Stale => {
                let cutoff = Utc::now() - hours(self.crawler.stale_rescan_hours);
                self.storage
                    .select_stale(cutoff, IngestStatus::UNREADABLE, demand)
                    .await
            }
            Tier::Unreachable => {
                let cutoff = Utc::now() - hours(self.crawler.unreachable_rescan_hours);
                self.storage
                    .select_unreachable(cutoff, IngestStatus::UNREADABLE, demand)
                    .await
            }
        }
    }
}

fn hours(value: f64) -> Duration {
    Duration::seconds((value * 3600.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_hours_convert_to_seconds() {
        assert_eq!(hours(0.9), Duration::seconds(3240));
        assert_eq!(hours(6.0), Duration::seconds(21600));
    }
}
