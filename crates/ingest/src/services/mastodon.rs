use serde::Deserialize;
use serde_json::Value;

use fedimapper_core::FetchError;
use fedimapper_networking::Fetcher;

/// One row of `/api/v1/instance/domain_blocks`. The digest is an optional
/// courtesy field; some servers obfuscate the domain and publish only it.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainBlock {
    pub domain: String,
    #[serde(default)]
    pub digest: Option<String>,
    pub severity: String,
    #[serde(default)]
    pub comment: Option<String>,
}

pub async fn get_metadata(fetcher: &Fetcher, host: &str) -> Result<Value, FetchError> {
    fetcher
        .fetch_json(&format!("https://{host}/api/v1/instance"))
        .await
}

pub async fn get_peers(fetcher: &Fetcher, host: &str) -> Result<Vec<String>, FetchError> {
    let url = format!("https://{host}/api/v1/instance/peers");
    let value = fetcher.fetch_json(&url).await?;
    serde_json::from_value(value).map_err(|e| FetchError::Decode {
        url,
        message: e.to_string(),
    })
}

pub async fn get_blocked_instances(
    fetcher: &Fetcher,
    host: &str,
) -> Result<Vec<DomainBlock>, FetchError> {
    let url = format!("https://{host}/api/v1/instance/domain_blocks");
    let value = fetcher.fetch_json(&url).await?;
    serde_json::from_value(value).map_err(|e| FetchError::Decode {
        url,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_block_with_missing_optionals() {
        let block: DomainBlock = serde_json::from_value(serde_json::json!({
            "domain": "spam.example",
            "severity": "suspend"
        }))
        .unwrap();
        assert_eq!(block.domain, "spam.example");
        assert!(block.digest.is_none());
        assert!(block.comment.is_none());
    }

    #[test]
    fn domain_block_full() {
        let block: DomainBlock = serde_json::from_value(serde_json::json!({
            "domain": "bad.example",
            "digest": "abc123",
            "severity": "silence",
            "comment": "spam waves"
        }))
        .unwrap();
        assert_eq!(block.severity, "silence");
        assert_eq!(block.comment.as_deref(), Some("spam waves"));
    }
}
