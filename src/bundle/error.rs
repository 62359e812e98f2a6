use crate::net::NetError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Extract,
    Descriptor,
    TrustContext,
    Metadata,
    Cleanup,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Extract => write!(f, "extract"),
            PipelineStage::Descriptor => write!(f, "descriptor"),
            PipelineStage::TrustContext => write!(f, "trust-context"),
            PipelineStage::Metadata => write!(f, "metadata"),
            PipelineStage::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Why an archive entry was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsafeEntryReason {
    PathTraversal,
    AbsolutePath,
    InvalidName,
    TooLarge { limit: u64 },
    TooManyEntries { limit: usize },
}

impl fmt::Display for UnsafeEntryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnsafeEntryReason::PathTraversal => write!(f, "path escapes the staging root"),
            UnsafeEntryReason::AbsolutePath => write!(f, "absolute path"),
            UnsafeEntryReason::InvalidName => write!(f, "invalid entry name"),
            UnsafeEntryReason::TooLarge { limit } => {
                write!(f, "decompressed size exceeds {limit} bytes")
            }
            UnsafeEntryReason::TooManyEntries { limit } => {
                write!(f, "archive holds more than {limit} entries")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("required field `{field}` is missing or empty")]
    MissingField { field: &'static str },
    #[error("field `{field}` is not a safe relative path: {reason}")]
    UnsafeLocation {
        field: &'static str,
        reason: UnsafeEntryReason,
    },
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("response lists no contact points")]
    NoContactPoints,
    #[error("response lists no SNI proxy address")]
    MissingProxyAddress,
}

/// Failure of a secure connect bundle pipeline run.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle archive `{path}` is unreadable: {source}")]
    ArchiveUnreadable {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("archive entry `{name}` rejected: {reason}")]
    UnsafeArchiveEntry {
        name: String,
        reason: UnsafeEntryReason,
    },
    #[error("staging area I/O failure during {stage}: {source}")]
    StagingIoFailure {
        stage: PipelineStage,
        #[source]
        source: std::io::Error,
    },
    #[error("bundle descriptor `{name}` not found in archive")]
    DescriptorMissing { name: String },
    #[error("bundle descriptor malformed: {0}")]
    DescriptorMalformed(#[from] DescriptorError),
    #[error("failed to load bundle credentials: {0}")]
    CredentialLoadFailed(#[source] NetError),
    #[error("metadata endpoint `{url}` unreachable: {source}")]
    MetadataUnreachable {
        url: String,
        #[source]
        source: NetError,
    },
    #[error("metadata endpoint `{url}` rejected the request with HTTP {status}")]
    MetadataRequestRejected { url: String, status: u16 },
    #[error("metadata response malformed: {0}")]
    MetadataMalformed(#[from] MetadataError),
}

impl BundleError {
    pub(crate) fn staging_io(stage: PipelineStage, source: std::io::Error) -> Self {
        BundleError::StagingIoFailure { stage, source }
    }

    pub fn stage(&self) -> PipelineStage {
        match self {
            BundleError::ArchiveUnreadable { .. } | BundleError::UnsafeArchiveEntry { .. } => {
                PipelineStage::Extract
            }
            BundleError::StagingIoFailure { stage, .. } => *stage,
            BundleError::DescriptorMissing { .. } | BundleError::DescriptorMalformed(_) => {
                PipelineStage::Descriptor
            }
            BundleError::CredentialLoadFailed(_) => PipelineStage::TrustContext,
            BundleError::MetadataUnreachable { .. }
            | BundleError::MetadataRequestRejected { .. }
            | BundleError::MetadataMalformed(_) => PipelineStage::Metadata,
        }
    }
}
