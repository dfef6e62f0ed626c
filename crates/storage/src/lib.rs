use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use fedimapper_parser::fld;

pub mod models;

pub use models::{
    AsnRecord, BanEntry, Instance, MastodonMetadata, PeertubeMetadata, StatsSnapshot,
};

#[derive(Clone)]
pub struct Storage {
    pool: PgPool,
    /// Rows per insert statement. Poolers in front of Postgres dislike very
    /// large statements, so peer and ban batches are cut into chunks.
    bulk_insert_buffer: usize,
}

impl Storage {
    pub async fn new(database_url: &str, bulk_insert_buffer: usize) -> Result<Self> {
        Self::with_pool_size(database_url, bulk_insert_buffer, 20).await
    }

    pub async fn with_pool_size(
        database_url: &str,
        bulk_insert_buffer: usize,
        max_connections: u32,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!(max_connections, "connected to postgres");
        Ok(Self {
            pool,
            bulk_insert_buffer: bulk_insert_buffer.max(1),
        })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await?;
        info!("migrations complete");
        Ok(())
    }

    pub async fn check_connectivity(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // --- Instance lifecycle ---

    pub async fn get_or_create_instance(&self, host: &str) -> Result<Instance> {
        sqlx::query("INSERT INTO instances (host) VALUES ($1) ON CONFLICT (host) DO NOTHING")
            .bind(host)
            .execute(&self.pool)
            .await?;
        let instance: Instance = sqlx::query_as("SELECT * FROM instances WHERE host = $1")
            .bind(host)
            .fetch_one(&self.pool)
            .await?;
        Ok(instance)
    }

    /// Start-of-ingest bookkeeping: stamp `last_ingest`, set the digest the
    /// first time only, and keep base_domain/www_host current.
    pub async fn touch_instance(
        &self,
        host: &str,
        digest: &str,
        base_domain: &str,
        www_host: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE instances
             SET last_ingest = NOW(),
                 digest = COALESCE(digest, $2),
                 base_domain = $3,
                 www_host = $4
             WHERE host = $1",
        )
        .bind(host)
        .bind(digest)
        .bind(base_domain)
        .bind(www_host)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_ingest_status(&self, host: &str, status: &str) -> Result<()> {
        sqlx::query("UPDATE instances SET last_ingest_status = $2 WHERE host = $1")
            .bind(host)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_ingest_success(&self, host: &str) -> Result<()> {
        sqlx::query(
            "UPDATE instances
             SET last_ingest_status = 'success',
                 last_ingest_success = NOW(),
                 first_ingest_success = COALESCE(first_ingest_success, NOW())
             WHERE host = $1",
        )
        .bind(host)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_network_info(
        &self,
        host: &str,
        ip_address: &str,
        asn: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE instances SET ip_address = $2, asn = $3 WHERE host = $1")
            .bind(host)
            .bind(ip_address)
            .bind(asn)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_nodeinfo_version(&self, host: &str, version: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE instances SET nodeinfo_version = $2 WHERE host = $1")
            .bind(host)
            .bind(version)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // --- Extractor writes ---

    pub async fn save_mastodon_metadata(
        &self,
        host: &str,
        metadata: &MastodonMetadata,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE instances
             SET title = $2, short_description = $3, email = $4, thumbnail = $5,
                 software = $6, software_version = $7, mastodon_version = $8, version = $9,
                 current_user_count = $10, current_status_count = $11,
                 current_domain_count = $12, registration_open = $13, approval_required = $14
             WHERE host = $1",
        )
        .bind(host)
        .bind(&metadata.title)
        .bind(&metadata.short_description)
        .bind(&metadata.email)
        .bind(&metadata.thumbnail)
        .bind(&metadata.software)
        .bind(&metadata.software_version)
        .bind(&metadata.mastodon_version)
        .bind(&metadata.version)
        .bind(metadata.current_user_count)
        .bind(metadata.current_status_count)
        .bind(metadata.current_domain_count)
        .bind(metadata.registration_open)
        .bind(metadata.approval_required)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_peertube_metadata(
        &self,
        host: &str,
        metadata: &PeertubeMetadata,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE instances
             SET software = 'peertube', title = $2, short_description = $3,
                 registration_open = $4, version = $5, software_version = $5
             WHERE host = $1",
        )
        .bind(host)
        .bind(&metadata.title)
        .bind(&metadata.short_description)
        .bind(metadata.registration_open)
        .bind(&metadata.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_software_identity(
        &self,
        host: &str,
        software: &str,
        software_version: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE instances
             SET software = $2, software_version = $3, version = $3
             WHERE host = $1",
        )
        .bind(host)
        .bind(software)
        .bind(software_version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_title(&self, host: &str, title: &str) -> Result<()> {
        sqlx::query("UPDATE instances SET title = $2 WHERE host = $1")
            .bind(host)
            .bind(title)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_email(&self, host: &str, email: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE instances SET email = $2 WHERE host = $1")
            .bind(host)
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_counters(
        &self,
        host: &str,
        user_count: Option<i64>,
        status_count: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE instances SET current_user_count = $2, current_status_count = $3
             WHERE host = $1",
        )
        .bind(host)
        .bind(user_count)
        .bind(status_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_domain_count(&self, host: &str, domain_count: Option<i64>) -> Result<()> {
        sqlx::query("UPDATE instances SET current_domain_count = $2 WHERE host = $1")
            .bind(host)
            .bind(domain_count)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_public_bans(&self, host: &str, has_public_bans: bool) -> Result<()> {
        sqlx::query("UPDATE instances SET has_public_bans = $2 WHERE host = $1")
            .bind(host)
            .bind(has_public_bans)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_public_peers(&self, host: &str, has_public_peers: bool) -> Result<()> {
        sqlx::query("UPDATE instances SET has_public_peers = $2 WHERE host = $1")
            .bind(host)
            .bind(has_public_peers)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Stamp a peer refresh attempt. This moves on failures too, so an
    /// instance with a private list isn't retried every single ingest.
    pub async fn touch_peer_refresh(&self, host: &str) -> Result<()> {
        sqlx::query("UPDATE instances SET last_ingest_peers = NOW() WHERE host = $1")
            .bind(host)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn append_stats(&self, host: &str, stats: &StatsSnapshot) -> Result<()> {
        sqlx::query(
            "INSERT INTO instance_stats
                 (host, user_count, status_count, domain_count, active_monthly_users)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(host)
        .bind(stats.user_count)
        .bind(stats.status_count)
        .bind(stats.domain_count)
        .bind(stats.active_monthly_users)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_asn(&self, record: &AsnRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO asn (asn, cc, owner, company, prefix)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (asn) DO UPDATE SET
                cc = EXCLUDED.cc,
                owner = EXCLUDED.owner,
                company = EXCLUDED.company,
                prefix = EXCLUDED.prefix",
        )
        .bind(&record.asn)
        .bind(&record.cc)
        .bind(&record.owner)
        .bind(&record.company)
        .bind(&record.prefix)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --- Peer and ban replacement ---

    /// Replace the peer set of `host` with exactly `peers`, tagged by
    /// `ingest_id`. Peer hosts become instance rows first so the relation's
    /// foreign keys hold, then stale rows from earlier ingests are dropped.
    pub async fn replace_peers(&self, host: &str, peers: &[String], ingest_id: &str) -> Result<()> {
        self.insert_instance_stubs(peers).await?;

        for chunk in peers.chunks(self.bulk_insert_buffer) {
            sqlx::query(
                "INSERT INTO peers (host, peer_host, ingest_id)
                 SELECT $1, p.peer, $3 FROM UNNEST($2::text[]) AS p(peer)
                 ON CONFLICT (host, peer_host) DO UPDATE SET ingest_id = EXCLUDED.ingest_id",
            )
            .bind(host)
            .bind(chunk)
            .bind(ingest_id)
            .execute(&self.pool)
            .await?;
        }

        let deleted = sqlx::query("DELETE FROM peers WHERE host = $1 AND ingest_id != $2")
            .bind(host)
            .bind(ingest_id)
            .execute(&self.pool)
            .await?;
        debug!(
            host,
            kept = peers.len(),
            dropped = deleted.rows_affected(),
            "replaced peer set"
        );
        Ok(())
    }

    pub async fn replace_bans(&self, host: &str, bans: &[BanEntry], ingest_id: &str) -> Result<()> {
        let banned_hosts: Vec<String> = bans.iter().map(|ban| ban.banned_host.clone()).collect();
        self.insert_instance_stubs(&banned_hosts).await?;

        for chunk in bans.chunks(self.bulk_insert_buffer) {
            let hosts: Vec<String> = chunk.iter().map(|ban| ban.banned_host.clone()).collect();
            let digests: Vec<Option<String>> =
                chunk.iter().map(|ban| ban.digest.clone()).collect();
            let severities: Vec<String> = chunk.iter().map(|ban| ban.severity.clone()).collect();
            let comments: Vec<Option<String>> =
                chunk.iter().map(|ban| ban.comment.clone()).collect();
            let keywords: Vec<serde_json::Value> = chunk
                .iter()
                .map(|ban| serde_json::Value::from(ban.keywords.clone()))
                .collect();

            sqlx::query(
                "INSERT INTO bans (host, banned_host, digest, severity, comment, keywords, ingest_id)
                 SELECT $1, * , $7 FROM UNNEST($2::text[], $3::text[], $4::text[], $5::text[], $6::jsonb[])
                 ON CONFLICT (host, banned_host) DO UPDATE SET
                    digest = EXCLUDED.digest,
                    severity = EXCLUDED.severity,
                    comment = EXCLUDED.comment,
                    keywords = EXCLUDED.keywords,
                    ingest_id = EXCLUDED.ingest_id",
            )
            .bind(host)
            .bind(&hosts)
            .bind(&digests)
            .bind(&severities)
            .bind(&comments)
            .bind(&keywords)
            .bind(ingest_id)
            .execute(&self.pool)
            .await?;
        }

        sqlx::query("DELETE FROM bans WHERE host = $1 AND ingest_id != $2")
            .bind(host)
            .bind(ingest_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_bans(&self, host: &str) -> Result<()> {
        sqlx::query("DELETE FROM bans WHERE host = $1")
            .bind(host)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Make sure every referenced host exists as an instance row, filling
    /// base_domain on the way in. Keyed inserts only; existing rows keep
    /// their data.
    async fn insert_instance_stubs(&self, hosts: &[String]) -> Result<()> {
        for chunk in hosts.chunks(self.bulk_insert_buffer) {
            let base_domains: Vec<String> =
                chunk.iter().map(|host| fld::base_domain(host)).collect();
            sqlx::query(
                "INSERT INTO instances (host, base_domain)
                 SELECT * FROM UNNEST($1::text[], $2::text[])
                 ON CONFLICT (host) DO NOTHING",
            )
            .bind(chunk)
            .bind(&base_domains)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn insert_evil_domains(&self, domains: &[String]) -> Result<()> {
        if domains.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "INSERT INTO evil_domains (domain)
             SELECT * FROM UNNEST($1::text[])
             ON CONFLICT (domain) DO NOTHING",
        )
        .bind(domains)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --- Selection queries ---

    pub async fn bootstrap_instances(&self, hosts: &[String]) -> Result<()> {
        if hosts.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "INSERT INTO instances (host)
             SELECT * FROM UNNEST($1::text[])
             ON CONFLICT (host) DO NOTHING",
        )
        .bind(hosts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn select_unscanned(&self, limit: i64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT host FROM instances WHERE last_ingest IS NULL LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(host,)| host).collect())
    }

    pub async fn select_stale(
        &self,
        cutoff: DateTime<Utc>,
        unreadable: &[&str],
        limit: i64,
    ) -> Result<Vec<String>> {
        let unreadable: Vec<String> = unreadable.iter().map(|s| s.to_string()).collect();
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT host FROM instances
             WHERE last_ingest < $1
               AND last_ingest_status IS NOT NULL
               AND last_ingest_status != ALL($2)
             ORDER BY last_ingest ASC
             LIMIT $3",
        )
        .bind(cutoff)
        .bind(&unreadable)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(host,)| host).collect())
    }

    pub async fn select_unreachable(
        &self,
        cutoff: DateTime<Utc>,
        unreadable: &[&str],
        limit: i64,
    ) -> Result<Vec<String>> {
        let unreadable: Vec<String> = unreadable.iter().map(|s| s.to_string()).collect();
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT host FROM instances
             WHERE last_ingest < $1
               AND (last_ingest_status = ANY($2) OR last_ingest_status IS NULL)
             ORDER BY last_ingest ASC
             LIMIT $3",
        )
        .bind(cutoff)
        .bind(&unreadable)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(host,)| host).collect())
    }

    // --- Maintenance ---

    pub async fn vacuum(&self) -> Result<()> {
        sqlx::raw_sql("VACUUM ANALYZE").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn instance_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM instances")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
