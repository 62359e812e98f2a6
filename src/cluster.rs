use crate::bundle::{open_secure_connect_bundle_with, BundleError, BundleOptions, SecureConnectBundle};
use crate::net::SniConfig;
use std::path::Path;

/// Connection settings handed to the driver's connection layer.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub hosts: Vec<String>,
    pub sni: Option<SniConfig>,
    pub local_dc: Option<String>,
}

impl ClusterConfig {
    pub fn new(hosts: Vec<String>) -> Self {
        Self {
            hosts,
            sni: None,
            local_dc: None,
        }
    }

    pub fn from_secure_connect_bundle(
        path: impl AsRef<Path>,
        options: &BundleOptions,
    ) -> Result<Self, BundleError> {
        open_secure_connect_bundle_with(path, options).map(Self::from)
    }

    pub fn uses_sni_proxy(&self) -> bool {
        self.sni.is_some()
    }
}

impl From<SecureConnectBundle> for ClusterConfig {
    fn from(bundle: SecureConnectBundle) -> Self {
        let local_dc = bundle.local_dc().map(str::to_string);
        Self {
            hosts: bundle.contact_points,
            sni: Some(bundle.sni),
            local_dc,
        }
    }
}
