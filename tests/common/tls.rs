#![cfg(test)]
#![allow(dead_code)]

use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair};
use rustls::server::AllowAnyAuthenticatedClient;
use rustls::{Certificate as RustlsCertificate, PrivateKey, RootCertStore, ServerConfig};
use std::error::Error;
use std::fs;
use std::net::{SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct CertificateAuthority {
    cert: Certificate,
    key: KeyPair,
}

/// Leaf certificate plus key, in both PEM and DER form.
pub struct IssuedIdentity {
    pub chain_pem: String,
    pub key_pem: String,
    pub leaf_der: Vec<u8>,
    pub key_der: Vec<u8>,
    chain_der: Vec<Vec<u8>>,
}

impl CertificateAuthority {
    pub fn new(common_name: &str) -> Result<Self, Box<dyn Error>> {
        let key = KeyPair::generate()?;
        let mut params = CertificateParams::default();
        params.distinguished_name = {
            let mut dn = rcgen::DistinguishedName::new();
            dn.push(DnType::CommonName, common_name);
            dn
        };
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key)?;
        Ok(Self { cert, key })
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    pub fn der(&self) -> Vec<u8> {
        self.cert.der().to_vec()
    }

    pub fn issue(&self, names: &[&str]) -> Result<IssuedIdentity, Box<dyn Error>> {
        let mut params = CertificateParams::new(
            names
                .iter()
                .map(|name| (*name).to_string())
                .collect::<Vec<_>>(),
        )?;
        if let Some(primary) = names.first() {
            params.distinguished_name.push(DnType::CommonName, *primary);
        }
        let key = KeyPair::generate()?;
        let cert = params.signed_by(&key, &self.cert, &self.key)?;
        let mut chain_pem = cert.pem();
        chain_pem.push_str(&self.cert.pem());
        Ok(IssuedIdentity {
            chain_pem,
            key_pem: key.serialize_pem(),
            leaf_der: cert.der().to_vec(),
            key_der: key.serialize_der(),
            chain_der: vec![cert.der().to_vec(), self.der()],
        })
    }

    /// Server config presenting `identity` and requiring a client
    /// certificate issued by this authority.
    pub fn server_config(&self, identity: &IssuedIdentity) -> Result<Arc<ServerConfig>, Box<dyn Error>> {
        let mut roots = RootCertStore::empty();
        roots
            .add(&RustlsCertificate(self.der()))
            .map_err(|err| format!("add client root: {err:?}"))?;
        let verifier = Arc::new(AllowAnyAuthenticatedClient::new(roots));
        let config = ServerConfig::builder()
            .with_safe_defaults()
            .with_client_cert_verifier(verifier)
            .with_single_cert(
                identity
                    .chain_der
                    .iter()
                    .cloned()
                    .map(RustlsCertificate)
                    .collect(),
                PrivateKey(identity.key_der.clone()),
            )?;
        Ok(Arc::new(config))
    }
}

/// Client credentials written to disk the way a staged bundle lays them out.
pub struct ClientFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub ca: PathBuf,
}

pub fn write_client_files(
    dir: &Path,
    ca: &CertificateAuthority,
    client: &IssuedIdentity,
) -> Result<ClientFiles, Box<dyn Error>> {
    let files = ClientFiles {
        cert: dir.join("cert"),
        key: dir.join("key"),
        ca: dir.join("ca.crt"),
    };
    fs::write(&files.cert, &client.chain_pem)?;
    fs::write(&files.key, &client.key_pem)?;
    fs::write(&files.ca, ca.pem())?;
    Ok(files)
}

pub fn next_loopback() -> SocketAddr {
    TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .expect("ephemeral addr")
}
