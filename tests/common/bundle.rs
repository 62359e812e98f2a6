#![cfg(test)]
#![allow(dead_code)]

#[path = "tls.rs"]
mod tls;

pub use tls::{next_loopback, write_client_files, CertificateAuthority, ClientFiles, IssuedIdentity};

use serde_json::json;
use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::ZipWriter;

/// Archive contents, in entry order. Modes are unix permission bits.
pub struct BundleBuilder {
    entries: Vec<(String, Vec<u8>, u32)>,
}

impl BundleBuilder {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Certificate, key, CA and a descriptor pointing at `host:port`.
    pub fn standard(
        host: &str,
        port: u16,
        ca: &CertificateAuthority,
        client: &IssuedIdentity,
    ) -> Self {
        Self::empty()
            .entry("ca.crt", ca.pem(), 0o644)
            .entry("cert", client.chain_pem.clone(), 0o644)
            .entry("key", client.key_pem.clone(), 0o600)
            .entry("config.json", descriptor_json(host, port), 0o644)
    }

    pub fn entry(mut self, name: &str, bytes: impl Into<Vec<u8>>, mode: u32) -> Self {
        self.entries.retain(|(existing, _, _)| existing != name);
        self.entries.push((name.to_string(), bytes.into(), mode));
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.entries.retain(|(existing, _, _)| existing != name);
        self
    }

    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
        let path = dir.join("secure-connect-test.zip");
        let mut zip = ZipWriter::new(File::create(&path)?);
        for (name, bytes, mode) in &self.entries {
            zip.start_file(name.as_str(), FileOptions::default().unix_permissions(*mode))?;
            zip.write_all(bytes)?;
        }
        zip.finish()?;
        Ok(path)
    }
}

pub fn descriptor_json(host: &str, port: u16) -> String {
    json!({
        "host": host,
        "port": port,
        "keyspace": "ignored",
        "caCertLocation": "./ca.crt",
        "keyLocation": "./key",
        "certLocation": "./cert"
    })
    .to_string()
}

pub fn metadata_json(contact_points: &[&str], proxy: &str) -> String {
    json!({
        "version": 1,
        "region": "us-east1",
        "contact_info": {
            "type": "sni_proxy",
            "localDC": "dc1",
            "contact_points": contact_points,
            "sni_proxy_address": proxy
        }
    })
    .to_string()
}
