use crate::net::http::{connect_within, RequestDeadline};
use crate::net::tls::{complete_client_handshake, server_name, TrustContext};
use crate::net::NetError;
use log::debug;
use rustls::{ClientConnection, StreamOwned};
use std::net::TcpStream;
use std::time::Duration;

/// TLS session to a cluster node tunnelled through the SNI proxy.
pub type SniStream = StreamOwned<ClientConnection, TcpStream>;

/// Routing parameters for every connection to the cluster: the proxy all
/// traffic goes through and the TLS material presented to it.
#[derive(Clone, Debug)]
pub struct SniConfig {
    proxy_address: String,
    trust_context: TrustContext,
}

impl SniConfig {
    pub fn new(proxy_address: impl Into<String>, trust_context: TrustContext) -> Self {
        Self {
            proxy_address: proxy_address.into(),
            trust_context,
        }
    }

    pub fn proxy_address(&self) -> &str {
        &self.proxy_address
    }

    pub fn trust_context(&self) -> &TrustContext {
        &self.trust_context
    }

    /// Opens a TLS session to the proxy, sending `target` via SNI so the
    /// proxy can route to the matching node.
    ///
    /// `timeout` bounds resolution, connect and handshake together; the
    /// returned socket has no read/write timeout.
    pub fn dial(&self, target: &str, timeout: Duration) -> Result<SniStream, NetError> {
        let deadline = RequestDeadline::from_timeout(timeout);
        let name = server_name(target)?;
        let mut sock = connect_within(&self.proxy_address, &deadline)?;
        let mut conn = ClientConnection::new(self.trust_context.client_config()?, name)?;
        complete_client_handshake(&mut conn, &mut sock, &deadline)?;
        sock.set_read_timeout(None)?;
        sock.set_write_timeout(None)?;
        debug!("SNI session to `{target}` via {} established", self.proxy_address);
        Ok(StreamOwned::new(conn, sock))
    }
}
