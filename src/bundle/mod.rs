//! Secure connect bundle pipeline.
//!
//! A bundle is a zip archive carrying a client certificate, its private key,
//! the cluster CA and a `config.json` descriptor naming the metadata service.
//! [`open_secure_connect_bundle`] unpacks it into a private staging
//! directory, builds a mutual-TLS context from the staged files, asks the
//! metadata service for contact points and the SNI proxy address, and
//! returns them together with a trust context suitable for proxied
//! connections. The staging directory is removed before the call returns.

mod archive;
mod assemble;
mod descriptor;
mod error;
mod metadata;
mod options;

pub use archive::{extract_archive, safe_relative_path, StagedFile, StagingArea};
pub use assemble::{assemble, SecureConnectBundle};
pub use descriptor::{read_descriptor, BundleDescriptor, CredentialPaths};
pub use error::{
    BundleError, DescriptorError, MetadataError, PipelineStage, UnsafeEntryReason,
};
pub use metadata::{decode_metadata, metadata_url, resolve_metadata, ClusterMetadata, ContactInfo};
pub use options::{
    BundleOptions, DEFAULT_DESCRIPTOR_NAME, DEFAULT_MAX_ENTRIES, DEFAULT_MAX_ENTRY_BYTES,
    DEFAULT_METADATA_TIMEOUT_MS,
};

use crate::net::{PeerVerification, TrustContext};
use log::{info, warn};
use std::path::Path;

pub fn open_secure_connect_bundle(path: impl AsRef<Path>) -> Result<SecureConnectBundle, BundleError> {
    open_secure_connect_bundle_with(path, &BundleOptions::default())
}

pub fn open_secure_connect_bundle_with(
    path: impl AsRef<Path>,
    options: &BundleOptions,
) -> Result<SecureConnectBundle, BundleError> {
    let path = path.as_ref();
    let staging = StagingArea::create(options.staging_root.as_deref())
        .map_err(|err| BundleError::staging_io(PipelineStage::Extract, err))?;
    let result = run_stages(path, &staging, options);
    let staged_at = staging.path().to_path_buf();
    match (result, staging.close()) {
        (Ok(bundle), Ok(())) => {
            info!(
                "opened secure connect bundle {} ({} contact points)",
                path.display(),
                bundle.contact_points.len()
            );
            Ok(bundle)
        }
        (Ok(_), Err(err)) => Err(BundleError::staging_io(PipelineStage::Cleanup, err)),
        (Err(err), cleanup) => {
            if let Err(cleanup_err) = cleanup {
                warn!(
                    "failed to remove staging area {}: {cleanup_err}",
                    staged_at.display()
                );
            }
            Err(err)
        }
    }
}

fn run_stages(
    path: &Path,
    staging: &StagingArea,
    options: &BundleOptions,
) -> Result<SecureConnectBundle, BundleError> {
    let staged = extract_archive(path, staging, options)?;
    info!(
        "extracted {} entries from {}",
        staged.len(),
        path.display()
    );
    let descriptor = read_descriptor(staging, &options.descriptor_name)?;
    let credentials = descriptor.credential_paths(staging.path())?;
    let strict = TrustContext::from_pem_files(
        &credentials.cert,
        &credentials.key,
        &credentials.ca,
        PeerVerification::Full,
    )
    .map_err(BundleError::CredentialLoadFailed)?;
    let metadata = resolve_metadata(&descriptor, &strict, options.metadata_timeout())?;
    Ok(assemble(metadata, strict))
}
