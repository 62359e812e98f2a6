use super::{CertificateError, NetError};
use log::{debug, warn};
use ring::signature::{self, UnparsedPublicKey, VerificationAlgorithm};
use rustls::sign::any_supported_type;
use rustls::{Certificate as RustlsCertificate, PrivateKey, SignatureScheme};
use rustls_pemfile::{certs, ec_private_keys, pkcs8_private_keys, rsa_private_keys};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;
use std::time::{Duration, SystemTime};
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

/// Client certificate chain and private key presented during mutual TLS.
#[derive(Clone)]
pub struct TlsIdentity {
    pub chain: Vec<RustlsCertificate>,
    pub private_key: PrivateKey,
    pub certificate: CertificateSummary,
}

impl fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsIdentity")
            .field("chain_len", &self.chain.len())
            .field("certificate", &self.certificate)
            .finish_non_exhaustive()
    }
}

/// Identity fields of the leaf certificate, kept for logging and expiry checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub subject: String,
    pub serial: String,
    pub not_before: SystemTime,
    pub not_after: SystemTime,
}

impl CertificateSummary {
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        self.not_before <= now && now <= self.not_after
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyEncoding {
    Pkcs8,
    Pkcs1,
    Sec1,
}

// Schemes tried, in order, when proving the key belongs to the certificate.
// Each pairs a rustls signing scheme with the ring verifier for the same
// algorithm over the certificate's SPKI bits.
static KEY_CHECK_SCHEMES: [(SignatureScheme, &dyn VerificationAlgorithm); 5] = [
    (
        SignatureScheme::ECDSA_NISTP256_SHA256,
        &signature::ECDSA_P256_SHA256_ASN1,
    ),
    (
        SignatureScheme::ECDSA_NISTP384_SHA384,
        &signature::ECDSA_P384_SHA384_ASN1,
    ),
    (SignatureScheme::ED25519, &signature::ED25519),
    (
        SignatureScheme::RSA_PSS_SHA256,
        &signature::RSA_PSS_2048_8192_SHA256,
    ),
    (
        SignatureScheme::RSA_PKCS1_SHA256,
        &signature::RSA_PKCS1_2048_8192_SHA256,
    ),
];

const KEY_CHECK_MESSAGE: &[u8] = b"secure-connect client identity key check";

/// Loads a PEM certificate chain and private key, checking that the key
/// belongs to the leaf certificate.
pub fn load_identity_from_pem(
    cert_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
) -> Result<TlsIdentity, NetError> {
    let chain = load_cert_chain(cert_path)?;
    if chain.is_empty() {
        return Err(NetError::from(CertificateError::IdentityChainEmpty));
    }
    let (private_key, encoding) = load_private_key(key_path)?;
    let (_, leaf) =
        X509Certificate::from_der(&chain[0].0).map_err(|err| CertificateError::X509Parse {
            details: err.to_string(),
        })?;
    debug!("loaded {encoding:?} client key");
    ensure_key_matches(&leaf, &private_key)?;
    let certificate = summarize(&leaf)?;
    if !certificate.is_valid_at(SystemTime::now()) {
        warn!(
            "client certificate `{}` (serial {}) is outside its validity window",
            certificate.subject, certificate.serial
        );
    }
    Ok(TlsIdentity {
        chain,
        private_key,
        certificate,
    })
}

fn load_cert_chain(path: impl AsRef<Path>) -> Result<Vec<RustlsCertificate>, NetError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut chain = Vec::new();
    for cert in certs(&mut reader).map_err(|_| CertificateError::InvalidCertificateChain)? {
        chain.push(RustlsCertificate(cert));
    }
    Ok(chain)
}

fn load_private_key(path: impl AsRef<Path>) -> Result<(PrivateKey, KeyEncoding), NetError> {
    let pem = std::fs::read(path.as_ref())?;

    let mut reader = Cursor::new(&pem);
    let keys = pkcs8_private_keys(&mut reader).map_err(|_| CertificateError::InvalidPkcs8Key)?;
    if let Some(key) = keys.into_iter().next() {
        return Ok((PrivateKey(key), KeyEncoding::Pkcs8));
    }

    let mut reader = Cursor::new(&pem);
    let keys = rsa_private_keys(&mut reader).map_err(|_| CertificateError::InvalidRsaKey)?;
    if let Some(key) = keys.into_iter().next() {
        return Ok((PrivateKey(key), KeyEncoding::Pkcs1));
    }

    let mut reader = Cursor::new(&pem);
    let keys = ec_private_keys(&mut reader).map_err(|_| CertificateError::InvalidEcKey)?;
    if let Some(key) = keys.into_iter().next() {
        return Ok((PrivateKey(key), KeyEncoding::Sec1));
    }

    Err(NetError::from(CertificateError::MissingPrivateKey))
}

/// Signs a fixed message with `key` and verifies it against the leaf's
/// public key. Works for every key encoding rustls can load, so no key
/// skips the check.
fn ensure_key_matches(leaf: &X509Certificate<'_>, key: &PrivateKey) -> Result<(), NetError> {
    let signing_key =
        any_supported_type(key).map_err(|_| CertificateError::UnsupportedKeyAlgorithm)?;
    let public_key = leaf.public_key().subject_public_key.data.as_ref();
    for (scheme, verifier) in KEY_CHECK_SCHEMES.iter() {
        let Some(signer) = signing_key.choose_scheme(&[*scheme]) else {
            continue;
        };
        let signature = signer.sign(KEY_CHECK_MESSAGE)?;
        return UnparsedPublicKey::new(*verifier, public_key)
            .verify(KEY_CHECK_MESSAGE, &signature)
            .map_err(|_| NetError::from(CertificateError::KeyMismatch));
    }
    Err(NetError::from(CertificateError::UnsupportedKeyAlgorithm))
}

fn summarize(cert: &X509Certificate<'_>) -> Result<CertificateSummary, NetError> {
    let validity = cert.validity();
    Ok(CertificateSummary {
        subject: cert.subject().to_string(),
        serial: cert.raw_serial_as_string(),
        not_before: as_system_time(&validity.not_before)?,
        not_after: as_system_time(&validity.not_after)?,
    })
}

fn as_system_time(time: &x509_parser::time::ASN1Time) -> Result<SystemTime, NetError> {
    let dt = time.to_datetime();
    let secs = dt.unix_timestamp();
    let nanos = dt.nanosecond() as u64;
    if secs >= 0 {
        Ok(SystemTime::UNIX_EPOCH + Duration::from_secs(secs as u64) + Duration::from_nanos(nanos))
    } else {
        Err(NetError::from(CertificateError::TimeBeforeUnixEpoch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_self_signed(dir: &TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
        let key = rcgen::KeyPair::generate().expect("key");
        let params = rcgen::CertificateParams::new(vec!["client.test".to_string()]).expect("params");
        let cert = params.self_signed(&key).expect("cert");
        let cert_path = dir.path().join("cert");
        let key_path = dir.path().join("key");
        fs::write(&cert_path, cert.pem()).expect("write cert");
        fs::write(&key_path, key.serialize_pem()).expect("write key");
        (cert_path, key_path)
    }

    #[test]
    fn loads_matching_identity() {
        let dir = TempDir::new().expect("tempdir");
        let (cert_path, key_path) = write_self_signed(&dir);
        let identity = load_identity_from_pem(&cert_path, &key_path).expect("identity");
        assert_eq!(identity.chain.len(), 1);
        assert!(identity.certificate.is_valid_at(SystemTime::now()));
    }

    #[test]
    fn rejects_key_from_another_certificate() {
        let dir = TempDir::new().expect("tempdir");
        let (cert_path, _) = write_self_signed(&dir);
        let other = rcgen::KeyPair::generate().expect("key");
        let other_key = dir.path().join("other-key");
        fs::write(&other_key, other.serialize_pem()).expect("write key");
        let err = load_identity_from_pem(&cert_path, &other_key).expect_err("mismatch");
        assert!(matches!(
            err,
            NetError::Certificate(CertificateError::KeyMismatch)
        ));
    }

    const RSA_PKCS8: &str = include_str!("testdata/rsa-pkcs8.pem");
    const RSA_PKCS1: &str = include_str!("testdata/rsa-pkcs1.pem");
    const EC_PKCS8: &str = include_str!("testdata/ec-pkcs8.pem");
    const EC_SEC1: &str = include_str!("testdata/ec-sec1.pem");

    // Certificate for `cert_key`, with `key_file_pem` written as the key file.
    fn write_pair(
        dir: &TempDir,
        cert_key: &rcgen::KeyPair,
        key_file_pem: &str,
    ) -> (std::path::PathBuf, std::path::PathBuf) {
        let params = rcgen::CertificateParams::new(vec!["client.test".to_string()]).expect("params");
        let cert = params.self_signed(cert_key).expect("cert");
        let cert_path = dir.path().join("cert");
        let key_path = dir.path().join("key");
        fs::write(&cert_path, cert.pem()).expect("write cert");
        fs::write(&key_path, key_file_pem).expect("write key");
        (cert_path, key_path)
    }

    fn assert_mismatch(result: Result<TlsIdentity, NetError>) {
        match result {
            Err(NetError::Certificate(CertificateError::KeyMismatch)) => {}
            other => panic!("expected key mismatch, got {other:?}"),
        }
    }

    #[test]
    fn p384_key_is_checked() {
        let dir = TempDir::new().expect("tempdir");
        let key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384).expect("key");
        let (cert_path, key_path) = write_pair(&dir, &key, &key.serialize_pem());
        load_identity_from_pem(&cert_path, &key_path).expect("matching p384 identity");

        let other = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384).expect("key");
        let (cert_path, key_path) = write_pair(&dir, &key, &other.serialize_pem());
        assert_mismatch(load_identity_from_pem(&cert_path, &key_path));
    }

    #[test]
    fn ed25519_key_is_checked() {
        let dir = TempDir::new().expect("tempdir");
        let key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ED25519).expect("key");
        let (cert_path, key_path) = write_pair(&dir, &key, &key.serialize_pem());
        load_identity_from_pem(&cert_path, &key_path).expect("matching ed25519 identity");

        let other = rcgen::KeyPair::generate_for(&rcgen::PKCS_ED25519).expect("key");
        let (cert_path, key_path) = write_pair(&dir, &key, &other.serialize_pem());
        assert_mismatch(load_identity_from_pem(&cert_path, &key_path));
    }

    #[test]
    fn rsa_key_is_checked_in_both_encodings() {
        let dir = TempDir::new().expect("tempdir");
        let rsa = rcgen::KeyPair::from_pem(RSA_PKCS8).expect("rsa key");
        for pem in [RSA_PKCS8, RSA_PKCS1] {
            let (cert_path, key_path) = write_pair(&dir, &rsa, pem);
            let identity = load_identity_from_pem(&cert_path, &key_path).expect("rsa identity");
            assert_eq!(identity.chain.len(), 1);
        }

        let ec = rcgen::KeyPair::generate().expect("key");
        let (cert_path, key_path) = write_pair(&dir, &ec, RSA_PKCS1);
        assert_mismatch(load_identity_from_pem(&cert_path, &key_path));
        let (cert_path, key_path) = write_pair(&dir, &rsa, &ec.serialize_pem());
        assert_mismatch(load_identity_from_pem(&cert_path, &key_path));
    }

    #[test]
    fn sec1_key_is_checked() {
        let dir = TempDir::new().expect("tempdir");
        let ec = rcgen::KeyPair::from_pem(EC_PKCS8).expect("ec key");
        let (cert_path, key_path) = write_pair(&dir, &ec, EC_SEC1);
        load_identity_from_pem(&cert_path, &key_path).expect("sec1 identity");

        let other = rcgen::KeyPair::generate().expect("key");
        let (cert_path, key_path) = write_pair(&dir, &other, EC_SEC1);
        assert_mismatch(load_identity_from_pem(&cert_path, &key_path));
    }

    #[test]
    fn rejects_file_without_certificates() {
        let dir = TempDir::new().expect("tempdir");
        let (_, key_path) = write_self_signed(&dir);
        let empty = dir.path().join("empty");
        fs::write(&empty, b"not a pem").expect("write");
        let err = load_identity_from_pem(&empty, &key_path).expect_err("empty chain");
        assert!(matches!(
            err,
            NetError::Certificate(CertificateError::IdentityChainEmpty)
        ));
    }

    #[test]
    fn rejects_missing_private_key() {
        let dir = TempDir::new().expect("tempdir");
        let (cert_path, _) = write_self_signed(&dir);
        let err = load_identity_from_pem(&cert_path, &cert_path).expect_err("no key");
        assert!(matches!(
            err,
            NetError::Certificate(CertificateError::MissingPrivateKey)
        ));
    }
}
