use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use fedimapper_core::IngestStatus;
use fedimapper_parser::{stopwords, version};
use fedimapper_storage::{BanEntry, Instance, MastodonMetadata, StatsSnapshot};

use crate::ingesters::utils::{self, MetadataFetch};
use crate::services::mastodon;
use crate::services::nodeinfo::NodeInfo;
use crate::IngestContext;

pub(crate) async fn save(
    ctx: &IngestContext,
    instance: &Instance,
    nodeinfo: Option<&NodeInfo>,
) -> Result<bool> {
    if !save_metadata(ctx, instance, nodeinfo).await? {
        return Ok(false);
    }
    info!(host = %instance.host, "host identified as mastodon compatible");

    save_blocked_instances(ctx, instance).await?;

    if utils::should_refresh_peers(instance.last_ingest_peers, ctx.config.refresh_peers_hours) {
        save_peered_instances(ctx, instance).await?;
    }

    Ok(true)
}

async fn save_metadata(
    ctx: &IngestContext,
    instance: &Instance,
    nodeinfo: Option<&NodeInfo>,
) -> Result<bool> {
    let www_host = instance.www_host.as_deref().unwrap_or(&instance.host);
    let fetched = utils::classify_fetch(mastodon::get_metadata(&ctx.fetcher, www_host).await)?;
    let payload = match fetched {
        MetadataFetch::Data(payload) => payload,
        MetadataFetch::Unreachable => {
            info!(host = %instance.host, www_host, "unable to reach host");
            ctx.storage
                .set_ingest_status(&instance.host, IngestStatus::Unreachable.as_str())
                .await?;
            return Ok(false);
        }
        MetadataFetch::NotCompatible => {
            debug!(host = %instance.host, "host is not mastodon compatible");
            return Ok(false);
        }
    };

    let mut metadata = MastodonMetadata {
        title: string_field(&payload, "title"),
        short_description: string_field(&payload, "short_description"),
        email: string_field(&payload, "email"),
        thumbnail: string_field(&payload, "thumbnail"),
        registration_open: payload.get("registrations").and_then(Value::as_bool),
        approval_required: payload.get("approval_required").and_then(Value::as_bool),
        ..Default::default()
    };

    // Nodeinfo is the better authority on what the software actually is;
    // the version string still tells us the advertised Mastodon API level.
    if let Some(nodeinfo) = nodeinfo {
        metadata.software = Some(nodeinfo.software.name.clone());
        metadata.software_version = Some(nodeinfo.software.version.clone());
        metadata.version = Some(nodeinfo.software.version.clone());
    }
    if let Some(version_string) = string_field(&payload, "version") {
        if let Some(parsed) = version::breakdown(&version_string) {
            metadata.mastodon_version = parsed.mastodon_version;
            if nodeinfo.is_none() {
                metadata.software = Some(parsed.software);
                metadata.software_version = parsed.software_version;
            }
        }
        metadata.version = Some(version_string);
    }

    let stats = payload.get("stats");
    let nodeinfo_users = nodeinfo.and_then(|n| n.usage.users.total);
    let nodeinfo_posts = nodeinfo.and_then(|n| n.usage.local_posts);
    metadata.current_user_count = stat_field(stats, "user_count").or(nodeinfo_users);
    metadata.current_status_count = stat_field(stats, "status_count").or(nodeinfo_posts);
    metadata.current_domain_count = stat_field(stats, "domain_count");

    ctx.storage
        .save_mastodon_metadata(&instance.host, &metadata)
        .await?;
    ctx.storage
        .append_stats(
            &instance.host,
            &StatsSnapshot {
                user_count: metadata.current_user_count,
                status_count: metadata.current_status_count,
                domain_count: metadata.current_domain_count,
                active_monthly_users: nodeinfo.and_then(|n| n.usage.users.active_month),
            },
        )
        .await?;
    Ok(true)
}

async fn save_blocked_instances(ctx: &IngestContext, instance: &Instance) -> Result<()> {
    let www_host = instance.www_host.as_deref().unwrap_or(&instance.host);
    let blocked = match mastodon::get_blocked_instances(&ctx.fetcher, www_host).await {
        Ok(blocked) => {
            let mut blocked = blocked;
            for block in &mut blocked {
                block.domain = block.domain.trim().to_lowercase();
            }
            blocked
        }
        Err(e) => {
            // Most servers keep the list private; clear anything an older,
            // once-public configuration left behind.
            debug!(host = %instance.host, error = %e, "unable to get instance ban data");
            ctx.storage.set_public_bans(&instance.host, false).await?;
            ctx.storage.delete_bans(&instance.host).await?;
            return Ok(());
        }
    };

    ctx.storage.set_public_bans(&instance.host, true).await?;

    let ingest_id = Uuid::new_v4().to_string();
    let spammers = utils::spammer_domains(
        blocked.iter().map(|block| block.domain.as_str()),
        ctx.config.spam_domain_threshold,
    );
    if !spammers.is_empty() {
        info!(host = %instance.host, domains = spammers.len(), "dampening spam domains in ban list");
        let list: Vec<String> = spammers.iter().cloned().collect();
        ctx.storage.insert_evil_domains(&list).await?;
    }

    let mut entries: Vec<BanEntry> = blocked
        .into_iter()
        .filter(|block| !utils::is_evil(&block.domain, &ctx.config.evil_domains, &spammers))
        .map(|block| BanEntry {
            banned_host: block.domain,
            digest: block.digest,
            severity: block.severity,
            // Ban comments advertise a language in theory, but they're
            // almost always English regardless of the server's locale.
            keywords: block
                .comment
                .as_deref()
                .map(|comment| {
                    stopwords::key_words("en", comment)
                        .into_iter()
                        .collect::<Vec<String>>()
                })
                .unwrap_or_default(),
            comment: block.comment,
        })
        .collect();
    entries.sort_by(|a, b| a.banned_host.cmp(&b.banned_host));
    entries.dedup_by(|a, b| a.banned_host == b.banned_host);

    ctx.storage
        .replace_bans(&instance.host, &entries, &ingest_id)
        .await
}

async fn save_peered_instances(ctx: &IngestContext, instance: &Instance) -> Result<()> {
    info!(host = %instance.host, "attempting to save peers");
    let www_host = instance.www_host.as_deref().unwrap_or(&instance.host);
    ctx.storage.touch_peer_refresh(&instance.host).await?;
    match mastodon::get_peers(&ctx.fetcher, www_host).await {
        Ok(peers) => {
            ctx.storage.set_public_peers(&instance.host, true).await?;
            utils::save_peers(ctx, &instance.host, peers).await
        }
        Err(e) => {
            debug!(host = %instance.host, www_host, error = %e, "unable to get instance peer data");
            ctx.storage.set_public_peers(&instance.host, false).await
        }
    }
}

fn string_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn stat_field(stats: Option<&Value>, key: &str) -> Option<i64> {
    stats?.get(key).and_then(Value::as_i64)
}
