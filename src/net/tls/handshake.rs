use super::{CertificateError, NetError};
use crate::net::http::{timeout_aware, RequestDeadline};
use rustls::client::ServerName;
use rustls::ClientConnection;
use std::convert::TryFrom;
use std::io;
use std::net::TcpStream;

/// Drives the TLS handshake to completion, re-arming the socket timeouts
/// from `deadline` before every read and write.
pub(crate) fn complete_client_handshake(
    conn: &mut ClientConnection,
    sock: &mut TcpStream,
    deadline: &RequestDeadline,
) -> Result<(), NetError> {
    loop {
        while conn.wants_write() {
            deadline.arm(sock)?;
            conn.write_tls(sock).map_err(timeout_aware)?;
        }
        if !conn.is_handshaking() {
            return Ok(());
        }
        deadline.arm(sock)?;
        if conn.read_tls(sock).map_err(timeout_aware)? == 0 {
            return Err(NetError::from(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed the connection during the TLS handshake",
            )));
        }
        if let Err(err) = conn.process_new_packets() {
            // Flush the alert so the peer learns why.
            let _ = conn.write_tls(sock);
            return Err(NetError::from(err));
        }
    }
}

/// Converts a host (DNS name or IP literal) into the name sent via SNI.
pub fn server_name(host: &str) -> Result<ServerName, NetError> {
    let trimmed = host.trim_start_matches('[').trim_end_matches(']');
    ServerName::try_from(trimmed).map_err(|_| {
        NetError::from(CertificateError::InvalidDnsName {
            host: host.to_string(),
        })
    })
}
