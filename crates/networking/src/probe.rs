use std::net::IpAddr;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use tracing::debug;

use crate::fetch::{FetchOptions, Fetcher};

/// Routing-level ownership of an address, straight from the Team Cymru
/// DNS interface.
#[derive(Debug, Clone)]
pub struct AsnInfo {
    pub asn: String,
    pub cc: Option<String>,
    pub owner: Option<String>,
    pub prefix: Option<String>,
}

#[derive(Debug)]
pub struct HttpsProbe {
    pub reachable: bool,
    pub status: u16,
    pub body: Option<String>,
}

pub struct NetworkProbe {
    resolver: TokioAsyncResolver,
}

impl NetworkProbe {
    pub fn new() -> Self {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|_| {
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });
        Self { resolver }
    }

    /// Standard A/AAAA lookup. Any failure is "no DNS" as far as the
    /// crawl is concerned.
    pub async fn resolve(&self, host: &str) -> Option<IpAddr> {
        match self.resolver.lookup_ip(host).await {
            Ok(lookup) => lookup.iter().next(),
            Err(e) => {
                debug!(host, error = %e, "dns lookup failed");
                None
            }
        }
    }

    /// Two TXT lookups: origin record for prefix + country, AS record for
    /// the owner string. Failures degrade to None; ASN data is best-effort.
    pub async fn asn_lookup(&self, ip: IpAddr) -> Option<AsnInfo> {
        let origin = self.txt_record(&origin_query(ip)).await?;
        let origin_fields = split_record(&origin);
        let asn = origin_fields
            .first()?
            .split_whitespace()
            .next()?
            .to_string();
        let prefix = origin_fields.get(1).map(|s| s.to_string());
        let mut cc = origin_fields.get(2).map(|s| s.to_string());
        let mut owner = None;

        if let Some(record) = self.txt_record(&format!("AS{asn}.asn.cymru.com")).await {
            let fields = split_record(&record);
            if cc.is_none() {
                cc = fields.get(1).map(|s| s.to_string());
            }
            owner = fields.last().map(|s| s.to_string());
        }

        Some(AsnInfo {
            asn,
            cc,
            owner,
            prefix,
        })
    }

    async fn txt_record(&self, name: &str) -> Option<String> {
        match self.resolver.txt_lookup(name).await {
            Ok(lookup) => lookup.iter().next().map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|part| String::from_utf8_lossy(part).into_owned())
                    .collect::<String>()
            }),
            Err(e) => {
                debug!(name, error = %e, "txt lookup failed");
                None
            }
        }
    }
}

impl Default for NetworkProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn origin_query(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            format!(
                "{}.{}.{}.{}.origin.asn.cymru.com",
                octets[3], octets[2], octets[1], octets[0]
            )
        }
        IpAddr::V6(v6) => {
            let nibbles: Vec<String> = v6
                .octets()
                .iter()
                .flat_map(|byte| [byte >> 4, byte & 0xf])
                .map(|nibble| format!("{nibble:x}"))
                .rev()
                .collect();
            format!("{}.origin6.asn.cymru.com", nibbles.join("."))
        }
    }
}

fn split_record(record: &str) -> Vec<&str> {
    record.split('|').map(str::trim).collect()
}

/// Anonymous GET of `https://host/` with a short budget. Robots stays off:
/// we need to know the service answers at all before we can pull its
/// robots.txt.
pub async fn can_access_https(fetcher: &Fetcher, host: &str) -> HttpsProbe {
    let options = FetchOptions {
        validate_robots: false,
        max_seconds: fetcher.https_check_seconds(),
        ..fetcher.options()
    };
    match fetcher.fetch_raw(&format!("https://{host}/"), &options).await {
        Ok(response) => {
            let unreachable =
                response.status == 404 || (500..=520).contains(&response.status);
            HttpsProbe {
                reachable: !unreachable,
                status: response.status,
                body: response.text(),
            }
        }
        Err(e) => {
            debug!(host, error = %e, "https probe failed");
            HttpsProbe {
                reachable: false,
                status: 0,
                body: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_query_reverses_octets() {
        let ip: IpAddr = "216.90.108.31".parse().unwrap();
        assert_eq!(origin_query(ip), "31.108.90.216.origin.asn.cymru.com");
    }

    #[test]
    fn origin_query_v6_uses_nibbles() {
        let ip: IpAddr = "2001:db8::1".parse().unwrap();
        let query = origin_query(ip);
        assert!(query.ends_with(".origin6.asn.cymru.com"));
        assert!(query.starts_with("1.0.0.0."));
    }

    #[test]
    fn record_fields_are_trimmed() {
        let fields = split_record("23028 | 216.90.108.0/24 | US | arin | 1998-09-25");
        assert_eq!(fields[0], "23028");
        assert_eq!(fields[1], "216.90.108.0/24");
        assert_eq!(fields[2], "US");
    }
}
