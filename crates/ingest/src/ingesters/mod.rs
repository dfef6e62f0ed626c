use anyhow::Result;

use fedimapper_storage::Instance;

use crate::services::nodeinfo::NodeInfo;
use crate::IngestContext;

mod diaspora;
mod mastodon;
mod nodeinfo;
mod peertube;
pub(crate) mod utils;

/// Protocol strategies in fallback order of usefulness. The nodeinfo
/// ingester is the floor: it only needs the document the orchestrator has
/// already fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngesterKind {
    Mastodon,
    Peertube,
    Diaspora,
    Nodeinfo,
}

impl IngesterKind {
    /// Map a nodeinfo software name onto a strategy. Anything unknown gets
    /// the Mastodon treatment: a large share of fediverse software exposes
    /// Mastodon-compatible informational endpoints.
    pub fn for_software(name: &str) -> Option<Self> {
        match name {
            "diaspora" => Some(IngesterKind::Diaspora),
            "mastodon" => Some(IngesterKind::Mastodon),
            "nodeinfo" => Some(IngesterKind::Nodeinfo),
            "peertube" => Some(IngesterKind::Peertube),
            _ => None,
        }
    }

    /// Returns false when the host doesn't speak this protocol, letting the
    /// orchestrator try the next strategy.
    pub async fn save(
        self,
        ctx: &IngestContext,
        instance: &Instance,
        nodeinfo: Option<&NodeInfo>,
    ) -> Result<bool> {
        match self {
            IngesterKind::Mastodon => mastodon::save(ctx, instance, nodeinfo).await,
            IngesterKind::Peertube => peertube::save(ctx, instance, nodeinfo).await,
            IngesterKind::Diaspora => diaspora::save(ctx, instance, nodeinfo).await,
            IngesterKind::Nodeinfo => nodeinfo::save(ctx, &instance.host, nodeinfo).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_software_dispatches_directly() {
        assert_eq!(
            IngesterKind::for_software("peertube"),
            Some(IngesterKind::Peertube)
        );
        assert_eq!(
            IngesterKind::for_software("diaspora"),
            Some(IngesterKind::Diaspora)
        );
        assert_eq!(
            IngesterKind::for_software("mastodon"),
            Some(IngesterKind::Mastodon)
        );
    }

    #[test]
    fn unknown_software_has_no_direct_strategy() {
        assert_eq!(IngesterKind::for_software("pleroma"), None);
        assert_eq!(IngesterKind::for_software(""), None);
    }
}
