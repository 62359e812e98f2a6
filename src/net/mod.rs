use thiserror::Error;

pub mod http;
pub mod sni;
pub mod tls;

pub use http::{HttpResponse, HttpsClient};
pub use sni::{SniConfig, SniStream};
pub use tls::{
    load_identity_from_pem, load_trust_store_from_pem, CertificateSummary, PeerVerification,
    TlsIdentity, TlsTrustStore, TrustContext,
};

/// Errors emitted by the TLS and HTTPS plumbing.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),
    #[error("certificate error: {0}")]
    Certificate(#[from] CertificateError),
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("identity certificate chain empty")]
    IdentityChainEmpty,
    #[error("failed to read trust bundle")]
    TrustBundleRead,
    #[error("trust bundle is empty")]
    TrustBundleEmpty,
    #[error("trust bundle does not contain parsable certificates")]
    TrustBundleUnparsable,
    #[error("invalid DNS name `{host}` for certificate")]
    InvalidDnsName { host: String },
    #[error("invalid certificate chain")]
    InvalidCertificateChain,
    #[error("invalid PKCS#8 private key")]
    InvalidPkcs8Key,
    #[error("invalid RSA private key")]
    InvalidRsaKey,
    #[error("invalid SEC1 EC private key")]
    InvalidEcKey,
    #[error(
        "unsupported or missing private key material (expected PKCS#8, PKCS#1 RSA, or SEC1 EC)"
    )]
    MissingPrivateKey,
    #[error("private key does not match the identity certificate")]
    KeyMismatch,
    #[error("private key algorithm is not supported")]
    UnsupportedKeyAlgorithm,
    #[error("x509 parse error: {details}")]
    X509Parse { details: String },
    #[error("certificate time before UNIX epoch")]
    TimeBeforeUnixEpoch,
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP headers exceed limit")]
    HeadersTooLarge,
    #[error("HTTP request timed out")]
    RequestTimeout,
    #[error("invalid Content-Length header value")]
    InvalidContentLengthValue,
    #[error("HTTP body exceeds limit")]
    BodyTooLarge,
    #[error("endpoint requires https scheme (found {scheme})")]
    UnsupportedScheme { scheme: String },
    #[error("endpoint URL missing host")]
    MissingHost,
    #[error("endpoint returned HTTP {status}")]
    UnexpectedStatus { status: u16 },
    #[error("failed to parse HTTP response")]
    ResponseParse,
    #[error("HTTP response missing status code")]
    MissingStatusCode,
    #[error("invalid Content-Length header")]
    InvalidContentLengthHeader,
    #[error("chunked transfer encoding unsupported")]
    ChunkedEncodingUnsupported,
    #[error("truncated HTTP body")]
    TruncatedBody,
    #[error("no addresses resolved for {target}")]
    NoAddresses { target: String },
}
