use super::descriptor::BundleDescriptor;
use super::error::{BundleError, MetadataError};
use crate::net::{HttpError, HttpsClient, NetError, TrustContext};
use log::info;
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;
use std::time::Duration;

/// Document served by the bundle's metadata endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterMetadata {
    pub version: i64,
    pub region: String,
    pub contact_info: ContactInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactInfo {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "localDC")]
    pub local_dc: String,
    pub contact_points: Vec<String>,
    pub sni_proxy_address: String,
}

impl ClusterMetadata {
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.contact_info.contact_points.is_empty() {
            return Err(MetadataError::NoContactPoints);
        }
        if self.contact_info.sni_proxy_address.trim().is_empty() {
            return Err(MetadataError::MissingProxyAddress);
        }
        Ok(())
    }
}

/// `https://{host}:{port}/metadata`, bracketing IPv6 literals.
pub fn metadata_url(host: &str, port: u16) -> String {
    if host.parse::<Ipv6Addr>().is_ok() {
        format!("https://[{host}]:{port}/metadata")
    } else {
        format!("https://{host}:{port}/metadata")
    }
}

pub fn decode_metadata(body: &[u8]) -> Result<ClusterMetadata, MetadataError> {
    let metadata: ClusterMetadata = serde_json::from_slice(body)?;
    metadata.validate()?;
    Ok(metadata)
}

/// Fetches the cluster metadata over the strict (name-checking) context.
pub fn resolve_metadata(
    descriptor: &BundleDescriptor,
    context: &TrustContext,
    timeout: Duration,
) -> Result<ClusterMetadata, BundleError> {
    let url = metadata_url(&descriptor.host, descriptor.port);
    let tls_config = context
        .client_config()
        .map_err(BundleError::CredentialLoadFailed)?;
    let unreachable = |source: NetError| BundleError::MetadataUnreachable {
        url: url.clone(),
        source,
    };
    let client = HttpsClient::new(&url, tls_config, timeout).map_err(unreachable)?;
    let response = match client.get() {
        Ok(response) => response,
        Err(NetError::Http(HttpError::UnexpectedStatus { status })) => {
            return Err(BundleError::MetadataRequestRejected {
                url: url.clone(),
                status,
            });
        }
        Err(err) => return Err(unreachable(err)),
    };
    let metadata = decode_metadata(&response.body)?;
    info!(
        "resolved {} contact points via {} (region {}, local DC {})",
        metadata.contact_info.contact_points.len(),
        metadata.contact_info.sni_proxy_address,
        metadata.region,
        metadata.contact_info.local_dc
    );
    Ok(metadata)
}
