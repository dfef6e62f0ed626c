use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// One row of the `instances` table. The host is the identity; everything
/// else is refreshed by ingests.
#[derive(Debug, Clone, FromRow)]
pub struct Instance {
    pub host: String,
    pub digest: Option<String>,
    pub base_domain: Option<String>,
    pub www_host: Option<String>,

    pub last_ingest: Option<DateTime<Utc>>,
    pub last_ingest_status: Option<String>,
    pub last_ingest_success: Option<DateTime<Utc>>,
    pub first_ingest_success: Option<DateTime<Utc>>,
    pub last_ingest_peers: Option<DateTime<Utc>>,

    pub title: Option<String>,
    pub short_description: Option<String>,
    pub email: Option<String>,
    pub thumbnail: Option<String>,

    pub software: Option<String>,
    pub software_version: Option<String>,
    pub mastodon_version: Option<String>,
    pub nodeinfo_version: Option<String>,
    pub version: Option<String>,

    pub current_user_count: Option<i64>,
    pub current_status_count: Option<i64>,
    pub current_domain_count: Option<i64>,

    pub registration_open: Option<bool>,
    pub approval_required: Option<bool>,
    pub has_public_bans: Option<bool>,
    pub has_public_peers: Option<bool>,

    pub ip_address: Option<String>,
    pub asn: Option<String>,
}

/// Everything the Mastodon-compatible metadata endpoint yields in one pass.
#[derive(Debug, Clone, Default)]
pub struct MastodonMetadata {
    pub title: Option<String>,
    pub short_description: Option<String>,
    pub email: Option<String>,
    pub thumbnail: Option<String>,
    pub software: Option<String>,
    pub software_version: Option<String>,
    pub mastodon_version: Option<String>,
    pub version: Option<String>,
    pub current_user_count: Option<i64>,
    pub current_status_count: Option<i64>,
    pub current_domain_count: Option<i64>,
    pub registration_open: Option<bool>,
    pub approval_required: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct PeertubeMetadata {
    pub title: Option<String>,
    pub short_description: Option<String>,
    pub registration_open: Option<bool>,
    pub version: Option<String>,
}

/// Append-only snapshot for the `instance_stats` time series.
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub user_count: Option<i64>,
    pub status_count: Option<i64>,
    pub domain_count: Option<i64>,
    pub active_monthly_users: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AsnRecord {
    pub asn: String,
    pub cc: Option<String>,
    pub owner: Option<String>,
    pub company: Option<String>,
    pub prefix: Option<String>,
}

/// One entry of a published ban list, normalized for persistence.
#[derive(Debug, Clone)]
pub struct BanEntry {
    pub banned_host: String,
    pub digest: Option<String>,
    pub severity: String,
    pub comment: Option<String>,
    pub keywords: Vec<String>,
}
