use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use fedimapper_core::FetchError;
use fedimapper_networking::Fetcher;

/// The nodeinfo document, as much of it as the crawl consumes. Unknown
/// fields are ignored; a document missing software name or version fails
/// deserialization and the host falls back to endpoint probing.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    pub version: String,
    pub software: NodeInfoSoftware,
    #[serde(default)]
    pub usage: NodeInfoUsage,
    #[serde(default, rename = "openRegistrations")]
    pub open_registrations: Option<bool>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfoSoftware {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeInfoUsage {
    #[serde(default)]
    pub users: NodeInfoUsers,
    #[serde(default, rename = "localPosts")]
    pub local_posts: Option<i64>,
    #[serde(default, rename = "localComments")]
    pub local_comments: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeInfoUsers {
    #[serde(default)]
    pub total: Option<i64>,
    #[serde(default, rename = "activeHalfyear")]
    pub active_halfyear: Option<i64>,
    #[serde(default, rename = "activeMonth")]
    pub active_month: Option<i64>,
}

/// Discovery + document fetch. The well-known endpoint lists one link per
/// supported schema version; the last entry is the newest.
///
/// Robots denials propagate so the caller can record the terminal status;
/// every other failure just means "no nodeinfo".
pub async fn fetch(fetcher: &Fetcher, host: &str) -> Result<Option<NodeInfo>, FetchError> {
    let reference = match fetcher
        .fetch_json(&format!("https://{host}/.well-known/nodeinfo"))
        .await
    {
        Ok(value) => value,
        Err(e @ FetchError::RobotsBlocked(_)) => return Err(e),
        Err(e) => {
            debug!(host, error = %e, "no nodeinfo discovery document");
            return Ok(None);
        }
    };

    let Some(href) = reference
        .get("links")
        .and_then(Value::as_array)
        .and_then(|links| links.last())
        .and_then(|link| link.get("href"))
        .and_then(Value::as_str)
    else {
        return Ok(None);
    };

    let document = match fetcher.fetch_json(href).await {
        Ok(value) => value,
        Err(e @ FetchError::RobotsBlocked(_)) => return Err(e),
        Err(e) => {
            debug!(host, error = %e, "nodeinfo document fetch failed");
            return Ok(None);
        }
    };

    match serde_json::from_value::<NodeInfo>(document) {
        Ok(mut nodeinfo) => {
            nodeinfo.software.name = nodeinfo.software.name.to_lowercase();
            Ok(Some(nodeinfo))
        }
        Err(e) => {
            warn!(host, error = %e, "unable to parse nodeinfo");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_document_parses() {
        let document = serde_json::json!({
            "version": "2.0",
            "software": {"name": "Mastodon", "version": "4.1.0"},
            "protocols": ["activitypub"],
            "usage": {
                "users": {"total": 1200, "activeMonth": 300, "activeHalfyear": 500},
                "localPosts": 90000
            },
            "openRegistrations": true,
            "metadata": {"nodeName": "Example"}
        });
        let nodeinfo: NodeInfo = serde_json::from_value(document).unwrap();
        assert_eq!(nodeinfo.software.name, "Mastodon");
        assert_eq!(nodeinfo.usage.users.total, Some(1200));
        assert_eq!(nodeinfo.usage.local_posts, Some(90000));
        assert_eq!(nodeinfo.open_registrations, Some(true));
    }

    #[test]
    fn missing_usage_defaults() {
        let document = serde_json::json!({
            "version": "2.1",
            "software": {"name": "gotosocial", "version": "0.13.1"}
        });
        let nodeinfo: NodeInfo = serde_json::from_value(document).unwrap();
        assert!(nodeinfo.usage.users.total.is_none());
        assert!(nodeinfo.metadata.is_empty());
    }

    #[test]
    fn missing_software_is_an_error() {
        let document = serde_json::json!({"version": "2.0"});
        assert!(serde_json::from_value::<NodeInfo>(document).is_err());
    }
}
