use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info, warn};

use fedimapper_core::IngestStatus;
use fedimapper_storage::{Instance, PeertubeMetadata};

use crate::ingesters::{nodeinfo as nodeinfo_ingester, utils};
use crate::ingesters::utils::MetadataFetch;
use crate::services::nodeinfo::NodeInfo;
use crate::services::peertube;
use crate::IngestContext;

pub(crate) async fn save(
    ctx: &IngestContext,
    instance: &Instance,
    nodeinfo: Option<&NodeInfo>,
) -> Result<bool> {
    if !save_metadata(ctx, instance, nodeinfo).await? {
        return Ok(false);
    }

    if let Some(nodeinfo) = nodeinfo {
        nodeinfo_ingester::save_stats(ctx, &instance.host, nodeinfo).await?;
    }

    info!(host = %instance.host, "host identified as peertube compatible");
    save_followers(ctx, instance).await?;

    // PeerTube has no public ban list API at all.
    ctx.storage.set_public_bans(&instance.host, false).await?;
    Ok(true)
}

async fn save_metadata(
    ctx: &IngestContext,
    instance: &Instance,
    nodeinfo: Option<&NodeInfo>,
) -> Result<bool> {
    let www_host = instance.www_host.as_deref().unwrap_or(&instance.host);
    let fetched = utils::classify_fetch(peertube::get_metadata(&ctx.fetcher, www_host).await)?;
    let payload = match fetched {
        MetadataFetch::Data(payload) => payload,
        MetadataFetch::Unreachable => {
            info!(host = %instance.host, "unable to reach host");
            ctx.storage
                .set_ingest_status(&instance.host, IngestStatus::Unreachable.as_str())
                .await?;
            return Ok(false);
        }
        MetadataFetch::NotCompatible => {
            debug!(host = %instance.host, "host is not peertube compatible");
            return Ok(false);
        }
    };

    let instance_section = payload.get("instance");
    let metadata = PeertubeMetadata {
        title: nested_str(instance_section, "name"),
        short_description: nested_str(instance_section, "shortDescription"),
        registration_open: payload
            .get("signup")
            .and_then(|signup| signup.get("allowed"))
            .and_then(Value::as_bool),
        version: payload
            .get("serverVersion")
            .and_then(Value::as_str)
            .map(str::to_string),
    };
    ctx.storage
        .save_peertube_metadata(&instance.host, &metadata)
        .await?;

    let nodeinfo_users = nodeinfo.and_then(|n| n.usage.users.total);
    let nodeinfo_posts = nodeinfo.and_then(|n| n.usage.local_posts);
    match (nodeinfo_users, nodeinfo_posts) {
        (Some(users), Some(posts)) => {
            ctx.storage
                .set_counters(&instance.host, Some(users), Some(posts))
                .await?;
        }
        _ => match peertube::get_stats(&ctx.fetcher, www_host).await {
            Ok(stats) => {
                ctx.storage
                    .set_counters(
                        &instance.host,
                        stats.get("totalUsers").and_then(Value::as_i64),
                        stats.get("totalVideos").and_then(Value::as_i64),
                    )
                    .await?;
            }
            Err(e) => debug!(host = %instance.host, error = %e, "no peertube stats"),
        },
    }

    match peertube::get_about(&ctx.fetcher, www_host).await {
        Ok(about) => {
            let email = about
                .get("admin")
                .and_then(|admin| admin.get("email"))
                .and_then(Value::as_str);
            ctx.storage.set_email(&instance.host, email).await?;
        }
        Err(e) => debug!(host = %instance.host, error = %e, "no peertube about data"),
    }

    Ok(true)
}

async fn save_followers(ctx: &IngestContext, instance: &Instance) -> Result<()> {
    let www_host = instance.www_host.as_deref().unwrap_or(&instance.host);
    match peertube::get_peers(&ctx.fetcher, www_host).await {
        Ok(followers) => {
            ctx.storage
                .set_domain_count(
                    &instance.host,
                    followers.get("total").and_then(Value::as_i64),
                )
                .await?;
            ctx.storage.set_public_peers(&instance.host, true).await?;
            let peers = peertube::follower_hosts(&followers);
            utils::save_peers(ctx, &instance.host, peers).await
        }
        Err(e) => {
            warn!(host = %instance.host, error = %e, "unable to get instance peer data");
            ctx.storage.set_public_peers(&instance.host, false).await
        }
    }
}

fn nested_str(section: Option<&Value>, key: &str) -> Option<String> {
    section?.get(key).and_then(Value::as_str).map(str::to_string)
}
