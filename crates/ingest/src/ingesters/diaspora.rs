use anyhow::Result;
use tracing::{debug, info};

use fedimapper_storage::Instance;

use crate::ingesters::{nodeinfo as nodeinfo_ingester, utils};
use crate::services::diaspora;
use crate::services::nodeinfo::NodeInfo;
use crate::IngestContext;

/// Diaspora pods carry a decent nodeinfo document; the only extra the
/// protocol offers is the pod directory.
pub(crate) async fn save(
    ctx: &IngestContext,
    instance: &Instance,
    nodeinfo: Option<&NodeInfo>,
) -> Result<bool> {
    if !nodeinfo_ingester::save(ctx, &instance.host, nodeinfo).await? {
        return Ok(false);
    }

    info!(host = %instance.host, "host identified as diaspora compatible");

    if utils::should_refresh_peers(instance.last_ingest_peers, ctx.config.refresh_peers_hours) {
        info!(host = %instance.host, "attempting to save peers");
        let www_host = instance.www_host.as_deref().unwrap_or(&instance.host);
        ctx.storage.touch_peer_refresh(&instance.host).await?;
        match diaspora::get_peers(&ctx.fetcher, www_host).await {
            Ok(peers) => {
                ctx.storage.set_public_peers(&instance.host, true).await?;
                utils::save_peers(ctx, &instance.host, peers).await?;
            }
            Err(e) => {
                debug!(host = %instance.host, error = %e, "unable to get pod directory");
                ctx.storage.set_public_peers(&instance.host, false).await?;
            }
        }
    }

    Ok(true)
}
