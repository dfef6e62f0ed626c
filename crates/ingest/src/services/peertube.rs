use serde_json::Value;

use fedimapper_core::FetchError;
use fedimapper_networking::Fetcher;

pub async fn get_metadata(fetcher: &Fetcher, host: &str) -> Result<Value, FetchError> {
    fetcher
        .fetch_json(&format!("https://{host}/api/v1/config"))
        .await
}

pub async fn get_about(fetcher: &Fetcher, host: &str) -> Result<Value, FetchError> {
    fetcher
        .fetch_json(&format!("https://{host}/api/v1/config/about"))
        .await
}

pub async fn get_stats(fetcher: &Fetcher, host: &str) -> Result<Value, FetchError> {
    fetcher
        .fetch_json(&format!("https://{host}/api/v1/server/stats"))
        .await
}

/// Follower relations double as the peer list; entries look like
/// `{"follower": {"host": "..."}}`.
pub async fn get_peers(fetcher: &Fetcher, host: &str) -> Result<Value, FetchError> {
    fetcher
        .fetch_json(&format!("https://{host}/api/v1/server/followers"))
        .await
}

pub fn follower_hosts(followers: &Value) -> Vec<String> {
    followers
        .get("data")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    row.get("follower")
                        .and_then(|follower| follower.get("host"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follower_hosts_extracts_nested_hosts() {
        let followers = serde_json::json!({
            "total": 3,
            "data": [
                {"follower": {"host": "tube-a.example"}},
                {"follower": {"host": "tube-b.example"}},
                {"follower": {}}
            ]
        });
        assert_eq!(
            follower_hosts(&followers),
            vec!["tube-a.example".to_string(), "tube-b.example".to_string()]
        );
    }

    #[test]
    fn follower_hosts_tolerates_missing_data() {
        assert!(follower_hosts(&serde_json::json!({})).is_empty());
    }
}
