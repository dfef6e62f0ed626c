use std::fmt;

use anyhow::Result;
use async_trait::async_trait;

/// Terminal outcome of one ingest attempt, persisted on the instance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    Success,
    Unreachable,
    UnknownService,
    NoDns,
    Disabled,
    CrawlError,
    RobotsBlocked,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Success => "success",
            IngestStatus::Unreachable => "unreachable",
            IngestStatus::UnknownService => "unknown_service",
            IngestStatus::NoDns => "no_dns",
            IngestStatus::Disabled => "disabled",
            IngestStatus::CrawlError => "crawl_error",
            IngestStatus::RobotsBlocked => "robots_blocked",
        }
    }

    /// Statuses that mean the host could not be read last time around.
    /// The selection policy retries these on the slower rescan cadence.
    pub const UNREADABLE: &'static [&'static str] = &[
        "unreachable",
        "unknown_service",
        "no_dns",
        "disabled",
        "crawl_error",
        "robots_blocked",
    ];
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The reader side of the queue runner: processes a single host.
#[async_trait]
pub trait HostProcessor: Send + Sync + 'static {
    async fn process(&self, host: &str) -> Result<()>;
}

/// The writer side of the queue runner: yields candidate hosts on demand.
///
/// `Ok(None)` signals a drained source; the coordinator then hands every
/// worker a close sentinel and winds the pool down.
#[async_trait]
pub trait HostSource: Send + Sync + 'static {
    async fn next_hosts(&mut self, desired: usize) -> Result<Option<Vec<String>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_set_matches_status_strings() {
        for status in [
            IngestStatus::Unreachable,
            IngestStatus::UnknownService,
            IngestStatus::NoDns,
            IngestStatus::Disabled,
            IngestStatus::CrawlError,
            IngestStatus::RobotsBlocked,
        ] {
            assert!(IngestStatus::UNREADABLE.contains(&status.as_str()));
        }
        assert!(!IngestStatus::UNREADABLE.contains(&IngestStatus::Success.as_str()));
    }
}
