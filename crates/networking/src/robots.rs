use std::time::{Duration, Instant};

use dashmap::DashMap;
use robotstxt::DefaultMatcher;
use tracing::debug;
use url::Url;

use fedimapper_core::FetchError;

use crate::fetch::{FetchOptions, Fetcher};

const ROBOTS_TTL: Duration = Duration::from_secs(1800);

/// How an origin's robots policy resolved. 401/403 on the file means the
/// operator locked crawlers out; any other 4xx means there is no policy.
#[derive(Debug, Clone)]
enum RobotsPolicy {
    AllowAll,
    DenyAll,
    Rules(String),
}

struct RobotsEntry {
    policy: RobotsPolicy,
    fetched_at: Instant,
}

/// TTL-bounded robots.txt cache keyed by origin (`scheme://host[:port]`).
///
/// Entries live per process. Concurrent misses on the same origin may both
/// fetch; whichever finishes last wins the slot, which is harmless.
pub struct RobotsCache {
    entries: DashMap<String, RobotsEntry>,
    max_entries: usize,
}

impl RobotsCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    pub async fn can_fetch(
        &self,
        fetcher: &Fetcher,
        user_agent: &str,
        url: &str,
    ) -> Result<bool, FetchError> {
        let origin = origin_of(url)?;

        if let Some(entry) = self.entries.get(&origin) {
            if entry.fetched_at.elapsed() < ROBOTS_TTL {
                return Ok(allowed(&entry.policy, user_agent, url));
            }
        }

        let policy = self.fetch_policy(fetcher, &origin).await?;
        let verdict = allowed(&policy, user_agent, url);
        self.entries.insert(
            origin,
            RobotsEntry {
                policy,
                fetched_at: Instant::now(),
            },
        );
        self.evict_over_capacity();
        Ok(verdict)
    }

    async fn fetch_policy(
        &self,
        fetcher: &Fetcher,
        origin: &str,
    ) -> Result<RobotsPolicy, FetchError> {
        // validate_robots stays off here: robots.txt gates everything else,
        // nothing gates robots.txt.
        let options = FetchOptions {
            validate_robots: false,
            ..fetcher.options()
        };
        let response = fetcher
            .fetch_raw(&format!("{origin}/robots.txt"), &options)
            .await?;

        let policy = match response.status {
            401 | 403 => RobotsPolicy::DenyAll,
            400..=499 => RobotsPolicy::AllowAll,
            _ => RobotsPolicy::Rules(response.text().unwrap_or_default()),
        };
        debug!(origin, status = response.status, "cached robots policy");
        Ok(policy)
    }

    fn evict_over_capacity(&self) {
        if self.entries.len() <= self.max_entries {
            return;
        }
        self.entries
            .retain(|_, entry| entry.fetched_at.elapsed() < ROBOTS_TTL);
        while self.entries.len() > self.max_entries {
            let victim = match self.entries.iter().next() {
                Some(entry) => entry.key().clone(),
                None => break,
            };
            self.entries.remove(&victim);
        }
    }
}

fn allowed(policy: &RobotsPolicy, user_agent: &str, url: &str) -> bool {
    match policy {
        RobotsPolicy::AllowAll => true,
        RobotsPolicy::DenyAll => false,
        RobotsPolicy::Rules(body) => {
            DefaultMatcher::default().one_agent_allowed_by_robots(body, user_agent, url)
        }
    }
}

fn origin_of(url: &str) -> Result<String, FetchError> {
    let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;
    match parsed.port() {
        Some(port) => Ok(format!("{}://{}:{}", parsed.scheme(), host, port)),
        None => Ok(format!("{}://{}", parsed.scheme(), host)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_strips_path_and_keeps_port() {
        assert_eq!(
            origin_of("https://example.com/api/v1/instance").unwrap(),
            "https://example.com"
        );
        assert_eq!(
            origin_of("https://example.com:8443/x").unwrap(),
            "https://example.com:8443"
        );
        assert!(origin_of("not a url").is_err());
    }

    #[test]
    fn disallow_all_blocks_everything() {
        let policy = RobotsPolicy::Rules("User-agent: *\nDisallow: /\n".to_string());
        assert!(!allowed(&policy, "fedimapper", "https://example.com/api"));
    }

    #[test]
    fn scoped_disallow_leaves_other_paths() {
        let policy = RobotsPolicy::Rules("User-agent: *\nDisallow: /private\n".to_string());
        assert!(allowed(&policy, "fedimapper", "https://example.com/api"));
        assert!(!allowed(
            &policy,
            "fedimapper",
            "https://example.com/private/x"
        ));
    }

    #[test]
    fn status_policies() {
        assert!(allowed(&RobotsPolicy::AllowAll, "fedimapper", "https://x/y"));
        assert!(!allowed(&RobotsPolicy::DenyAll, "fedimapper", "https://x/y"));
    }
}
