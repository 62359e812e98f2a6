use super::deadline::{timeout_aware, RequestDeadline};
use crate::net::tls::{complete_client_handshake, server_name};
use crate::net::{HttpError, NetError};
use httparse::Status;
use log::debug;
use rustls::client::{ClientConfig, ClientConnection, ServerName};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use url::Url;

const MAX_RESPONSE_HEADER_BYTES: usize = 64 * 1024;
const MAX_RESPONSE_HEADERS: usize = 32;
const MAX_RESPONSE_BODY_BYTES: usize = 4 * 1024 * 1024;
const READ_CHUNK_BYTES: usize = 4 * 1024;
const USER_AGENT: &str = concat!("secure-connect/", env!("CARGO_PKG_VERSION"));

/// Status and body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// One-shot blocking HTTPS GET client over a caller-supplied rustls config.
///
/// Each request opens a fresh connection and sends `Connection: close`. A
/// single deadline bounds resolution, connect, handshake, request write and
/// response read; every socket operation is armed with what is left of it.
pub struct HttpsClient {
    authority: String,
    host: String,
    port: u16,
    target: String,
    tls_config: Arc<ClientConfig>,
    server_name: ServerName,
    timeout: Duration,
}

impl HttpsClient {
    pub fn new(
        url: impl AsRef<str>,
        tls_config: Arc<ClientConfig>,
        timeout: Duration,
    ) -> Result<Self, NetError> {
        let url = Url::parse(url.as_ref())?;
        if url.scheme() != "https" {
            return Err(NetError::from(HttpError::UnsupportedScheme {
                scheme: url.scheme().to_string(),
            }));
        }
        let host = url.host_str().ok_or(HttpError::MissingHost)?.to_string();
        let port = url.port_or_known_default().unwrap_or(443);
        let authority = if port == 443 {
            host.clone()
        } else {
            format!("{host}:{port}")
        };
        let mut target = url.path().to_string();
        if target.is_empty() {
            target.push('/');
        }
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }
        Ok(Self {
            authority,
            server_name: server_name(&host)?,
            host,
            port,
            target,
            tls_config,
            timeout: timeout.max(Duration::from_millis(1)),
        })
    }

    /// Issues the GET and returns the response when the status is 2xx.
    ///
    /// Any other status maps to [`HttpError::UnexpectedStatus`]; running out
    /// of time anywhere maps to [`HttpError::RequestTimeout`].
    pub fn get(&self) -> Result<HttpResponse, NetError> {
        let deadline = RequestDeadline::from_timeout(self.timeout);
        let sock = connect_within(&format!("{}:{}", self.host, self.port), &deadline)?;
        let conn = ClientConnection::new(self.tls_config.clone(), self.server_name.clone())?;
        let mut session = DeadlineSession {
            conn,
            sock,
            deadline,
        };
        complete_client_handshake(&mut session.conn, &mut session.sock, &session.deadline)?;

        debug!("GET https://{}{}", self.authority, self.target);
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nAccept: application/json\r\nUser-Agent: {}\r\nConnection: close\r\n\r\n",
            self.target, self.authority, USER_AGENT
        );
        session.send(request.as_bytes())?;
        let response = read_http_response(&mut session)?;
        debug!(
            "https://{}{} answered HTTP {} ({} bytes)",
            self.authority,
            self.target,
            response.status,
            response.body.len()
        );
        if !(200..300).contains(&response.status) {
            return Err(NetError::from(HttpError::UnexpectedStatus {
                status: response.status,
            }));
        }
        Ok(response)
    }
}

/// Established TLS session whose socket reads and writes are each bounded by
/// the time left on the request deadline.
struct DeadlineSession {
    conn: ClientConnection,
    sock: TcpStream,
    deadline: RequestDeadline,
}

impl DeadlineSession {
    fn send(&mut self, bytes: &[u8]) -> Result<(), NetError> {
        self.conn.writer().write_all(bytes)?;
        while self.conn.wants_write() {
            self.deadline.arm(&self.sock)?;
            self.conn.write_tls(&mut self.sock).map_err(timeout_aware)?;
        }
        Ok(())
    }
}

impl Read for DeadlineSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.conn.reader().read(buf) {
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                done => return done,
            }
            self.deadline
                .arm(&self.sock)
                .map_err(|err| io::Error::new(io::ErrorKind::TimedOut, err))?;
            // EOF is recorded by rustls; the next reader() call reports it.
            if self.conn.read_tls(&mut self.sock)? == 0 {
                continue;
            }
            if let Err(err) = self.conn.process_new_packets() {
                let _ = self.conn.write_tls(&mut self.sock);
                return Err(io::Error::new(io::ErrorKind::InvalidData, err));
            }
        }
    }
}

/// Resolves `target` and connects to the first reachable address, all within
/// `deadline`.
pub(crate) fn connect_within(
    target: &str,
    deadline: &RequestDeadline,
) -> Result<TcpStream, NetError> {
    let addrs = resolve_within(target, deadline)?;
    if addrs.is_empty() {
        return Err(NetError::from(HttpError::NoAddresses {
            target: target.to_string(),
        }));
    }
    let mut last_err = None;
    for addr in addrs {
        let budget = deadline.remaining_duration()?;
        match TcpStream::connect_timeout(&addr, budget) {
            Ok(stream) => {
                deadline.arm(&stream)?;
                return Ok(stream);
            }
            Err(err) => {
                debug!("connect to {addr} failed: {err}");
                last_err = Some(err);
            }
        }
    }
    Err(timeout_aware(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::Other,
            format!("unable to connect to {target}"),
        )
    })))
}

// Name resolution blocks in the OS resolver with no timeout of its own, so
// it runs on a helper thread and is abandoned when the deadline passes.
fn resolve_within(target: &str, deadline: &RequestDeadline) -> Result<Vec<SocketAddr>, NetError> {
    let budget = deadline.remaining_duration()?;
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return Ok(vec![addr]);
    }
    let (tx, rx) = mpsc::channel();
    let owned = target.to_string();
    thread::Builder::new()
        .name("secure-connect-resolve".to_string())
        .spawn(move || {
            let resolved = owned
                .to_socket_addrs()
                .map(|addrs| addrs.collect::<Vec<SocketAddr>>());
            let _ = tx.send(resolved);
        })?;
    match rx.recv_timeout(budget) {
        Ok(resolved) => resolved.map_err(NetError::Io),
        Err(RecvTimeoutError::Timeout) => Err(NetError::from(HttpError::RequestTimeout)),
        Err(RecvTimeoutError::Disconnected) => Err(NetError::from(io::Error::new(
            io::ErrorKind::Other,
            format!("resolver for {target} exited without an answer"),
        ))),
    }
}

enum BodyFraming {
    Length(usize),
    UntilClose,
}

struct ResponseHead {
    status: u16,
    framing: BodyFraming,
    len: usize,
}

fn read_http_response(stream: &mut impl Read) -> Result<HttpResponse, NetError> {
    let mut buffer = Vec::with_capacity(READ_CHUNK_BYTES);
    let mut chunk = [0u8; READ_CHUNK_BYTES];
    let head = loop {
        if let Some(head) = parse_head(&buffer)? {
            break head;
        }
        if buffer.len() >= MAX_RESPONSE_HEADER_BYTES {
            return Err(NetError::from(HttpError::HeadersTooLarge));
        }
        match read_chunk(stream, &mut chunk)? {
            0 => return Err(NetError::from(HttpError::ResponseParse)),
            read => buffer.extend_from_slice(&chunk[..read]),
        }
    };
    let mut body = buffer.split_off(head.len);
    match head.framing {
        BodyFraming::Length(expected) => {
            body.truncate(expected);
            while body.len() < expected {
                match read_chunk(stream, &mut chunk)? {
                    0 => return Err(NetError::from(HttpError::TruncatedBody)),
                    read => {
                        let take = read.min(expected - body.len());
                        body.extend_from_slice(&chunk[..take]);
                    }
                }
            }
        }
        BodyFraming::UntilClose => loop {
            if body.len() > MAX_RESPONSE_BODY_BYTES {
                return Err(NetError::from(HttpError::BodyTooLarge));
            }
            match read_chunk(stream, &mut chunk)? {
                0 => break,
                read => body.extend_from_slice(&chunk[..read]),
            }
        },
    }
    Ok(HttpResponse {
        status: head.status,
        body,
    })
}

// `None` until the header block is complete.
fn parse_head(buffer: &[u8]) -> Result<Option<ResponseHead>, NetError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
    let mut response = httparse::Response::new(&mut headers);
    let len = match response.parse(buffer) {
        Ok(Status::Complete(len)) => len,
        Ok(Status::Partial) => return Ok(None),
        Err(_) => return Err(NetError::from(HttpError::ResponseParse)),
    };
    let status = response.code.ok_or(HttpError::MissingStatusCode)?;
    let mut framing = BodyFraming::UntilClose;
    for header in response.headers.iter() {
        if header.name.eq_ignore_ascii_case("Transfer-Encoding") {
            return Err(NetError::from(HttpError::ChunkedEncodingUnsupported));
        }
        if header.name.eq_ignore_ascii_case("Content-Length") {
            let value = std::str::from_utf8(header.value)
                .map_err(|_| HttpError::InvalidContentLengthHeader)?;
            let expected: usize = value
                .trim()
                .parse()
                .map_err(|_| HttpError::InvalidContentLengthValue)?;
            if expected > MAX_RESPONSE_BODY_BYTES {
                return Err(NetError::from(HttpError::BodyTooLarge));
            }
            framing = BodyFraming::Length(expected);
        }
    }
    Ok(Some(ResponseHead {
        status,
        framing,
        len,
    }))
}

// Zero means the peer is done; a close without close_notify counts too.
fn read_chunk(stream: &mut impl Read, chunk: &mut [u8]) -> Result<usize, NetError> {
    match stream.read(chunk) {
        Ok(read) => Ok(read),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(0),
        Err(err) => Err(timeout_aware(err)),
    }
}
