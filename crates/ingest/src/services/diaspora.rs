use std::collections::BTreeSet;
use std::net::IpAddr;

use serde_json::Value;

use fedimapper_core::FetchError;
use fedimapper_networking::Fetcher;

/// Pod directory at `/pods.json`: an array of `{"host": "..."}` objects.
/// Raw IP addresses show up in the wild and are rejected, they can't be
/// instance identities.
pub async fn get_peers(fetcher: &Fetcher, host: &str) -> Result<BTreeSet<String>, FetchError> {
    let pods = fetcher
        .fetch_json(&format!("https://{host}/pods.json"))
        .await?;
    Ok(pod_hosts(&pods))
}

pub fn pod_hosts(pods: &Value) -> BTreeSet<String> {
    pods.as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.get("host").and_then(Value::as_str))
                .filter(|host| host.parse::<IpAddr>().is_err())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_literals_are_rejected() {
        let pods = serde_json::json!([
            {"host": "pod.example"},
            {"host": "192.0.2.10"},
            {"host": "2001:db8::1"},
            {"host": "other.example"}
        ]);
        let hosts = pod_hosts(&pods);
        assert!(hosts.contains("pod.example"));
        assert!(hosts.contains("other.example"));
        assert_eq!(hosts.len(), 2);
    }

    #[test]
    fn non_array_is_empty() {
        assert!(pod_hosts(&serde_json::json!({"nope": true})).is_empty());
    }
}
