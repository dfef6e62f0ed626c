use anyhow::Result;
use serde_json::Value;
use tracing::info;

use fedimapper_storage::StatsSnapshot;

use crate::services::nodeinfo::NodeInfo;
use crate::IngestContext;

// Self-reported totals above these are junk data; a handful of servers
// advertise user counts in the billions.
const MAX_USER_COUNT: i64 = 1_250_000;
const MAX_STATUS_COUNT: i64 = 1_000_000_000;

/// Last-resort ingester: anything that publishes a parseable nodeinfo
/// document gets at least its software identity and usage recorded.
pub(crate) async fn save(
    ctx: &IngestContext,
    host: &str,
    nodeinfo: Option<&NodeInfo>,
) -> Result<bool> {
    let Some(nodeinfo) = nodeinfo else {
        return Ok(false);
    };

    info!(host, software = %nodeinfo.software.name, "host identified as nodeinfo compatible");

    ctx.storage
        .save_software_identity(host, &nodeinfo.software.name, &nodeinfo.software.version)
        .await?;
    ctx.storage.set_public_bans(host, false).await?;
    ctx.storage.set_public_peers(host, false).await?;

    save_stats(ctx, host, nodeinfo).await?;
    Ok(true)
}

pub(crate) async fn save_stats(
    ctx: &IngestContext,
    host: &str,
    nodeinfo: &NodeInfo,
) -> Result<()> {
    if let Some(name) = nodeinfo.metadata.get("nodeName").and_then(Value::as_str) {
        ctx.storage.set_title(host, name).await?;
    }

    let user_count = nodeinfo
        .usage
        .users
        .total
        .filter(|&count| count <= MAX_USER_COUNT);
    let status_count = nodeinfo
        .usage
        .local_posts
        .filter(|&count| count <= MAX_STATUS_COUNT);
    let active_monthly_users = nodeinfo
        .usage
        .users
        .active_month
        .filter(|&count| count <= MAX_USER_COUNT);

    ctx.storage.set_counters(host, user_count, status_count).await?;
    ctx.storage
        .append_stats(
            host,
            &StatsSnapshot {
                user_count,
                status_count,
                domain_count: None,
                active_monthly_users,
            },
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capped(value: i64, cap: i64) -> Option<i64> {
        Some(value).filter(|&v| v <= cap)
    }

    #[test]
    fn user_cap_boundary() {
        assert_eq!(capped(1_250_000, MAX_USER_COUNT), Some(1_250_000));
        assert_eq!(capped(1_250_001, MAX_USER_COUNT), None);
    }

    #[test]
    fn status_cap_boundary() {
        assert_eq!(
            capped(1_000_000_000, MAX_STATUS_COUNT),
            Some(1_000_000_000)
        );
        assert_eq!(capped(1_000_000_001, MAX_STATUS_COUNT), None);
    }
}
