use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use fedimapper_core::config::{CrawlerConfig, FetchLimits};
use fedimapper_core::FetchError;

use crate::robots::RobotsCache;

/// Per-request bounds. Defaults come from the `[fetch]` configuration;
/// individual calls override what they need (the reachability probe drops
/// the time budget, robots fetches drop the robots check).
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub max_bytes: usize,
    pub max_seconds: f64,
    pub validate_robots: bool,
    pub follow_redirects: bool,
}

#[derive(Debug)]
pub struct FetchedResponse {
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// `None` when the advertised Content-Length already exceeded the byte
    /// budget and the body was never read.
    pub body: Option<Vec<u8>>,
}

impl FetchedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|body| String::from_utf8_lossy(body).into_owned())
    }
}

/// HTTP layer every other component goes through. Bounds every request in
/// bytes and wall-clock time and consults the robots cache before touching
/// a third party.
pub struct Fetcher {
    client: reqwest::Client,
    redirect_client: reqwest::Client,
    robots: RobotsCache,
    user_agent: String,
    limits: FetchLimits,
}

impl Fetcher {
    pub fn new(crawler: &CrawlerConfig, limits: &FetchLimits) -> Result<Self, FetchError> {
        let builder = || {
            reqwest::Client::builder()
                .user_agent(crawler.user_agent.clone())
                .connect_timeout(Duration::from_secs_f64(limits.max_seconds))
        };
        let client = builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let redirect_client = builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            client,
            redirect_client,
            robots: RobotsCache::new(crawler.robots_cache_entries),
            user_agent: crawler.user_agent.clone(),
            limits: limits.clone(),
        })
    }

    pub fn options(&self) -> FetchOptions {
        FetchOptions {
            max_bytes: self.limits.max_bytes,
            max_seconds: self.limits.max_seconds,
            validate_robots: true,
            follow_redirects: false,
        }
    }

    pub fn https_check_seconds(&self) -> f64 {
        self.limits.https_check_seconds
    }

    pub async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<FetchedResponse, FetchError> {
        if options.validate_robots
            && !self
                .robots
                .can_fetch(self, &self.user_agent, url)
                .await?
        {
            return Err(FetchError::RobotsBlocked(url.to_string()));
        }
        self.fetch_raw(url, options).await
    }

    /// The fetch itself, robots handling already decided. Also used by the
    /// robots cache to retrieve `/robots.txt` without recursing.
    pub(crate) async fn fetch_raw(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<FetchedResponse, FetchError> {
        let client = if options.follow_redirects {
            &self.redirect_client
        } else {
            &self.client
        };
        let budget = Duration::from_secs_f64(options.max_seconds);
        let started = Instant::now();

        let mut response = client
            .get(url)
            .timeout(budget)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        // An honest oversized Content-Length isn't an error: hand back the
        // headers so the caller can still read the status.
        if let Some(length) = response.content_length() {
            if length as usize > options.max_bytes {
                debug!(url, length, "skipping oversized body");
                return Ok(FetchedResponse {
                    url: url.to_string(),
                    status,
                    headers,
                    body: None,
                });
            }
        }

        let mut body: Vec<u8> = Vec::new();
        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) if e.is_timeout() => {
                    return Err(FetchError::TooSlow {
                        url: url.to_string(),
                        seconds: options.max_seconds,
                    })
                }
                Err(e) => return Err(FetchError::Network(e.to_string())),
            };
            body.extend_from_slice(&chunk);
            if body.len() > options.max_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    limit: options.max_bytes,
                });
            }
            if started.elapsed() >= budget {
                return Err(FetchError::TooSlow {
                    url: url.to_string(),
                    seconds: options.max_seconds,
                });
            }
        }

        Ok(FetchedResponse {
            url: url.to_string(),
            status,
            headers,
            body: Some(body),
        })
    }

    /// Fetch + status check + JSON decode. The bread and butter of the
    /// protocol clients.
    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        let response = self.fetch(url, &self.options()).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }
        let body = response
            .body
            .as_deref()
            .filter(|body| !body.is_empty())
            .ok_or_else(|| FetchError::NoContent(url.to_string()))?;
        serde_json::from_slice(body).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range() {
        let response = FetchedResponse {
            url: "https://example.com".into(),
            status: 204,
            headers: HashMap::new(),
            body: Some(Vec::new()),
        };
        assert!(response.is_success());

        let not_found = FetchedResponse {
            status: 404,
            ..response
        };
        assert!(!not_found.is_success());
    }

    #[test]
    fn text_is_lossy_utf8() {
        let response = FetchedResponse {
            url: "https://example.com".into(),
            status: 200,
            headers: HashMap::new(),
            body: Some(vec![0x68, 0x69, 0xff]),
        };
        assert_eq!(response.text().unwrap(), "hi\u{fffd}");
    }
}
