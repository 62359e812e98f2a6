use super::identity::{load_identity_from_pem, TlsIdentity};
use super::trust::{load_trust_store_from_pem, TlsTrustStore};
use super::NetError;
use log::trace;
use rustls::client::{
    verify_server_cert_signed_by_trust_anchor, ServerCertVerified, ServerCertVerifier,
    WebPkiVerifier,
};
use rustls::server::ParsedCertificate;
use rustls::{Certificate, ClientConfig, RootCertStore, ServerName};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// How much of the server's identity a [`TrustContext`] checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerVerification {
    /// Chain must anchor in the bundle CA and name the dialed host.
    Full,
    /// Chain must anchor in the bundle CA; the presented name is not checked.
    SkipPeerName,
}

/// Client TLS material from a bundle plus the verification mode applied to
/// servers.
#[derive(Clone)]
pub struct TrustContext {
    identity: TlsIdentity,
    trust: TlsTrustStore,
    verification: PeerVerification,
}

impl TrustContext {
    pub fn new(identity: TlsIdentity, trust: TlsTrustStore, verification: PeerVerification) -> Self {
        Self {
            identity,
            trust,
            verification,
        }
    }

    pub fn from_pem_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        ca_path: impl AsRef<Path>,
        verification: PeerVerification,
    ) -> Result<Self, NetError> {
        let identity = load_identity_from_pem(cert_path, key_path)?;
        let trust = load_trust_store_from_pem(ca_path)?;
        let context = Self::new(identity, trust, verification);
        // Surface key/cert problems rustls detects now rather than on first dial.
        context.client_config()?;
        Ok(context)
    }

    pub fn verification(&self) -> PeerVerification {
        self.verification
    }

    pub fn identity(&self) -> &TlsIdentity {
        &self.identity
    }

    pub fn trust_store(&self) -> &TlsTrustStore {
        &self.trust
    }

    /// Stops checking the server name; chain validation against the bundle
    /// CA stays in place.
    pub fn relax(self) -> Self {
        Self {
            verification: PeerVerification::SkipPeerName,
            ..self
        }
    }

    pub fn client_config(&self) -> Result<Arc<ClientConfig>, NetError> {
        let verifier = BundleServerVerifier::new(self.trust.roots.clone(), self.verification);
        let config = ClientConfig::builder()
            .with_safe_defaults()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_client_auth_cert(
                self.identity.chain.clone(),
                self.identity.private_key.clone(),
            )?;
        Ok(Arc::new(config))
    }
}

impl fmt::Debug for TrustContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustContext")
            .field("identity", &self.identity)
            .field("trust", &self.trust)
            .field("verification", &self.verification)
            .finish()
    }
}

pub(crate) struct BundleServerVerifier {
    roots: Arc<RootCertStore>,
    full: Option<WebPkiVerifier>,
}

impl BundleServerVerifier {
    pub(crate) fn new(roots: RootCertStore, verification: PeerVerification) -> Self {
        let full = match verification {
            PeerVerification::Full => Some(WebPkiVerifier::new(roots.clone(), None)),
            PeerVerification::SkipPeerName => None,
        };
        Self {
            roots: Arc::new(roots),
            full,
        }
    }
}

impl ServerCertVerifier for BundleServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        server_name: &ServerName,
        scts: &mut dyn Iterator<Item = &[u8]>,
        ocsp_response: &[u8],
        now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if let Some(full) = &self.full {
            return full.verify_server_cert(
                end_entity,
                intermediates,
                server_name,
                scts,
                ocsp_response,
                now,
            );
        }

        let parsed = ParsedCertificate::try_from(end_entity)?;
        verify_server_cert_signed_by_trust_anchor(
            &parsed,
            self.roots.as_ref(),
            intermediates,
            now,
        )?;

        // Consume SCTs/OCSP data so rustls doesn't warn about unused iterators.
        for _ in scts {}
        if !ocsp_response.is_empty() {
            trace!(
                "ignoring OCSP response from peer ({} bytes)",
                ocsp_response.len()
            );
        }

        Ok(ServerCertVerified::assertion())
    }
}
