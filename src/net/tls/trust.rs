use super::{CertificateError, NetError};
use rustls::{Certificate as RustlsCertificate, RootCertStore};
use rustls_pemfile::certs;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// CA material from the bundle, used as the only trust anchors.
#[derive(Clone)]
pub struct TlsTrustStore {
    pub roots: RootCertStore,
    pub ca_certificates: Vec<RustlsCertificate>,
}

impl fmt::Debug for TlsTrustStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsTrustStore")
            .field("anchors", &self.roots.len())
            .finish()
    }
}

pub fn load_trust_store_from_pem(path: impl AsRef<Path>) -> Result<TlsTrustStore, NetError> {
    let mut reader = BufReader::new(File::open(path)?);
    let raw = certs(&mut reader).map_err(|_| CertificateError::TrustBundleRead)?;
    if raw.is_empty() {
        return Err(NetError::from(CertificateError::TrustBundleEmpty));
    }
    let mut store = RootCertStore::empty();
    let (added, _skipped) = store.add_parsable_certificates(&raw);
    if added == 0 {
        return Err(NetError::from(CertificateError::TrustBundleUnparsable));
    }
    Ok(TlsTrustStore {
        roots: store,
        ca_certificates: raw.into_iter().map(RustlsCertificate).collect(),
    })
}
