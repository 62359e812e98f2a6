use super::metadata::ClusterMetadata;
use crate::net::{SniConfig, TrustContext};

/// Connection parameters recovered from a secure connect bundle.
#[derive(Debug, Clone)]
pub struct SecureConnectBundle {
    pub contact_points: Vec<String>,
    pub sni: SniConfig,
    pub metadata: ClusterMetadata,
}

impl SecureConnectBundle {
    pub fn local_dc(&self) -> Option<&str> {
        let dc = self.metadata.contact_info.local_dc.as_str();
        (!dc.is_empty()).then_some(dc)
    }
}

/// Combines the fetched metadata with the bootstrap context, which loses
/// its server-name check: per-node certificates presented through the proxy
/// name the node, not the proxy.
pub fn assemble(metadata: ClusterMetadata, strict: TrustContext) -> SecureConnectBundle {
    let sni = SniConfig::new(
        metadata.contact_info.sni_proxy_address.clone(),
        strict.relax(),
    );
    SecureConnectBundle {
        contact_points: metadata.contact_info.contact_points.clone(),
        sni,
        metadata,
    }
}
