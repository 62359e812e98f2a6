use super::archive::{safe_relative_path, StagingArea};
use super::error::{BundleError, DescriptorError, PipelineStage};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Manifest shipped inside the bundle. Fields absent from the document keep
/// their zero value and are rejected by [`BundleDescriptor::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BundleDescriptor {
    pub host: String,
    pub port: u16,
    pub ca_cert_location: String,
    pub key_location: String,
    pub cert_location: String,
}

/// Credential file locations resolved against a staging root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub ca: PathBuf,
}

impl BundleDescriptor {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DescriptorError> {
        let descriptor: BundleDescriptor = serde_json::from_slice(bytes)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.host.trim().is_empty() {
            return Err(DescriptorError::MissingField { field: "host" });
        }
        if self.port == 0 {
            return Err(DescriptorError::MissingField { field: "port" });
        }
        self.credential_paths(Path::new("")).map(|_| ())
    }

    pub fn credential_paths(&self, root: &Path) -> Result<CredentialPaths, DescriptorError> {
        Ok(CredentialPaths {
            cert: root.join(location("certLocation", &self.cert_location)?),
            key: root.join(location("keyLocation", &self.key_location)?),
            ca: root.join(location("caCertLocation", &self.ca_cert_location)?),
        })
    }
}

fn location(field: &'static str, value: &str) -> Result<PathBuf, DescriptorError> {
    if value.is_empty() {
        return Err(DescriptorError::MissingField { field });
    }
    safe_relative_path(value).map_err(|reason| DescriptorError::UnsafeLocation { field, reason })
}

/// Reads and validates the descriptor named `name` from the staging area.
pub fn read_descriptor(staging: &StagingArea, name: &str) -> Result<BundleDescriptor, BundleError> {
    let path = staging.resolve(name).map_err(|reason| {
        BundleError::from(DescriptorError::UnsafeLocation {
            field: "descriptor",
            reason,
        })
    })?;
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(BundleError::DescriptorMissing {
                name: name.to_string(),
            });
        }
        Err(err) => return Err(BundleError::staging_io(PipelineStage::Descriptor, err)),
    };
    let descriptor = BundleDescriptor::from_slice(&bytes)?;
    debug!(
        "bundle descriptor targets {}:{}",
        descriptor.host, descriptor.port
    );
    Ok(descriptor)
}
