//! Secure connect bundle support: turns a bundle archive into cluster
//! contact points plus the mutual-TLS settings for the SNI proxy.

pub mod bundle;
pub mod cluster;
pub mod net;

pub use bundle::{
    open_secure_connect_bundle, open_secure_connect_bundle_with, BundleError, BundleOptions,
    ClusterMetadata, PipelineStage, SecureConnectBundle,
};
pub use cluster::ClusterConfig;
pub use net::{NetError, PeerVerification, SniConfig, SniStream, TrustContext};
