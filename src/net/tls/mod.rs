mod context;
mod handshake;
mod identity;
mod trust;

pub use context::{PeerVerification, TrustContext};
pub(crate) use handshake::complete_client_handshake;
pub use handshake::server_name;
pub use identity::{load_identity_from_pem, CertificateSummary, TlsIdentity};
pub use trust::{load_trust_store_from_pem, TlsTrustStore};

use super::{CertificateError, NetError};
