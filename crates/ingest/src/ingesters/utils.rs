use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use fedimapper_core::FetchError;
use fedimapper_parser::fld;

use crate::IngestContext;

/// Outcome of a protocol's primary metadata fetch. Robots denials are not
/// classified here; they bubble up so the orchestrator can record the
/// terminal status.
pub(crate) enum MetadataFetch<T> {
    Data(T),
    NotCompatible,
    Unreachable,
}

pub(crate) fn classify_fetch<T>(
    result: Result<T, FetchError>,
) -> Result<MetadataFetch<T>, FetchError> {
    match result {
        Ok(data) => Ok(MetadataFetch::Data(data)),
        Err(e @ FetchError::RobotsBlocked(_)) => Err(e),
        // Transport failures and blown safety budgets on the primary
        // metadata fetch both mean the host can't be read usefully.
        Err(FetchError::Network(_))
        | Err(FetchError::TooSlow { .. })
        | Err(FetchError::TooLarge { .. }) => Ok(MetadataFetch::Unreachable),
        Err(_) => Ok(MetadataFetch::NotCompatible),
    }
}

/// Registrable domains that account for `threshold` or more entries within
/// a single list. One spammer registering hundreds of subdomains would
/// otherwise flood the instance table through a single peer list.
pub(crate) fn spammer_domains<'a>(
    hosts: impl IntoIterator<Item = &'a str>,
    threshold: usize,
) -> HashSet<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for host in hosts {
        *counts.entry(fld::base_domain(host)).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count >= threshold)
        .map(|(domain, _)| domain)
        .collect()
}

pub(crate) fn is_evil(host: &str, config_evils: &[String], spammers: &HashSet<String>) -> bool {
    config_evils.iter().any(|suffix| host.ends_with(suffix))
        || spammers.iter().any(|suffix| host.ends_with(suffix))
}

/// Persist a freshly observed peer set, replacing whatever the previous
/// ingest left behind.
pub(crate) async fn save_peers(
    ctx: &IngestContext,
    host: &str,
    peers: impl IntoIterator<Item = String>,
) -> Result<()> {
    let normalized: BTreeSet<String> = peers
        .into_iter()
        .map(|peer| peer.trim().to_lowercase())
        .filter(|peer| !peer.is_empty())
        .collect();

    let ingest_id = Uuid::new_v4().to_string();
    let spammers = spammer_domains(
        normalized.iter().map(String::as_str),
        ctx.config.spam_domain_threshold,
    );
    if !spammers.is_empty() {
        info!(host, domains = spammers.len(), "dampening spam domains in peer list");
        let list: Vec<String> = spammers.iter().cloned().collect();
        ctx.storage.insert_evil_domains(&list).await?;
    }

    let kept: Vec<String> = normalized
        .into_iter()
        .filter(|peer| !is_evil(peer, &ctx.config.evil_domains, &spammers))
        .collect();
    ctx.storage.replace_peers(host, &kept, &ingest_id).await
}

pub(crate) fn should_refresh_peers(
    last_ingest_peers: Option<DateTime<Utc>>,
    refresh_hours: f64,
) -> bool {
    peer_refresh_due(last_ingest_peers, refresh_hours, Utc::now(), || {
        rand::thread_rng().gen_range(0..7) == 0
    })
}

/// Refresh when the stamp is missing or past the window; past the half
/// window, refresh with probability 1/7 so lookups spread out instead of
/// landing on the same ingest round.
fn peer_refresh_due(
    last_ingest_peers: Option<DateTime<Utc>>,
    refresh_hours: f64,
    now: DateTime<Utc>,
    jitter: impl FnOnce() -> bool,
) -> bool {
    let Some(last) = last_ingest_peers else {
        return true;
    };
    let age = (now - last).num_seconds() as f64;
    let window = 3600.0 * refresh_hours;
    if age > window {
        return true;
    }
    if age > window / 2.0 {
        return jitter();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn spam_threshold_counts_registrable_domains() {
        let mut hosts: Vec<String> = (0..150)
            .map(|i| format!("node{i}.spammer.example"))
            .collect();
        hosts.extend((0..250).map(|i| format!("legit{i}.example")));

        let spammers = spammer_domains(hosts.iter().map(String::as_str), 100);
        assert!(spammers.contains("spammer.example"));
        assert_eq!(spammers.len(), 1);
    }

    #[test]
    fn below_threshold_is_kept() {
        let hosts: Vec<String> = (0..99).map(|i| format!("n{i}.small.example")).collect();
        let spammers = spammer_domains(hosts.iter().map(String::as_str), 100);
        assert!(spammers.is_empty());
    }

    #[test]
    fn evil_filter_matches_suffixes() {
        let config = vec!["gab.best".to_string()];
        let spammers: HashSet<String> = ["spammer.example".to_string()].into_iter().collect();
        assert!(is_evil("mirror.gab.best", &config, &spammers));
        assert!(is_evil("a.spammer.example", &config, &spammers));
        assert!(!is_evil("mastodon.social", &config, &spammers));
    }

    #[test]
    fn refresh_due_without_stamp() {
        assert!(peer_refresh_due(None, 12.0, Utc::now(), || false));
    }

    #[test]
    fn refresh_due_past_window() {
        let now = Utc::now();
        let last = now - Duration::hours(13);
        assert!(peer_refresh_due(Some(last), 12.0, now, || false));
    }

    #[test]
    fn refresh_in_half_window_uses_jitter() {
        let now = Utc::now();
        let last = now - Duration::hours(7);
        assert!(peer_refresh_due(Some(last), 12.0, now, || true));
        assert!(!peer_refresh_due(Some(last), 12.0, now, || false));
    }

    #[test]
    fn refresh_fresh_stamp_never_due() {
        let now = Utc::now();
        let last = now - Duration::hours(1);
        assert!(!peer_refresh_due(Some(last), 12.0, now, || true));
    }
}
