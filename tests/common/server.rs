#![cfg(test)]
#![allow(dead_code)]

use rustls::{ServerConfig, ServerConnection, StreamOwned};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// What the server saw on one connection that completed a handshake.
#[derive(Debug, Clone)]
pub struct ServedRequest {
    pub sni: Option<String>,
    pub request_line: String,
}

/// Body delivery schedule: `chunk` bytes at a time with `delay` between
/// writes. The header block always goes out at once.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub chunk: usize,
    pub delay: Duration,
}

/// Blocking loopback HTTPS server answering every request with the same
/// canned response. Serves `connections` accepted sockets, then exits.
pub struct CannedServer {
    addr: SocketAddr,
    served: Arc<Mutex<Vec<ServedRequest>>>,
}

impl CannedServer {
    pub fn spawn(
        config: Arc<ServerConfig>,
        status: u16,
        body: impl Into<String>,
        connections: usize,
    ) -> io::Result<Self> {
        Self::spawn_paced(config, status, body, connections, None)
    }

    pub fn spawn_paced(
        config: Arc<ServerConfig>,
        status: u16,
        body: impl Into<String>,
        connections: usize,
        pacing: Option<Pacing>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let served = Arc::new(Mutex::new(Vec::new()));
        let body = body.into();
        let log = served.clone();
        thread::spawn(move || {
            for _ in 0..connections {
                let Ok((sock, _)) = listener.accept() else {
                    return;
                };
                let _ = sock.set_read_timeout(Some(Duration::from_secs(5)));
                let _ = sock.set_write_timeout(Some(Duration::from_secs(5)));
                let Ok(conn) = ServerConnection::new(config.clone()) else {
                    continue;
                };
                let mut tls = StreamOwned::new(conn, sock);
                serve_one(&mut tls, status, &body, pacing, &log);
            }
        });
        Ok(Self { addr, served })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn served(&self) -> Vec<ServedRequest> {
        self.served.lock().expect("served log").clone()
    }
}

fn serve_one(
    tls: &mut StreamOwned<ServerConnection, std::net::TcpStream>,
    status: u16,
    body: &str,
    pacing: Option<Pacing>,
    log: &Mutex<Vec<ServedRequest>>,
) {
    while tls.conn.is_handshaking() {
        if tls.conn.complete_io(&mut tls.sock).is_err() {
            return;
        }
    }
    let sni = tls.conn.server_name().map(str::to_string);
    let mut request: Vec<u8> = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        match tls.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(read) => request.extend_from_slice(&buf[..read]),
        }
    }
    let request_line = String::from_utf8_lossy(&request)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string();
    // Recorded before responding; a client that read the response sees it.
    log.lock()
        .expect("served log")
        .push(ServedRequest { sni, request_line });
    let head = format!(
        "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    if tls.write_all(head.as_bytes()).and_then(|_| tls.flush()).is_err() {
        return;
    }
    let pacing = pacing.unwrap_or(Pacing {
        chunk: body.len().max(1),
        delay: Duration::ZERO,
    });
    for (index, piece) in body.as_bytes().chunks(pacing.chunk.max(1)).enumerate() {
        if index > 0 {
            thread::sleep(pacing.delay);
        }
        if tls.write_all(piece).and_then(|_| tls.flush()).is_err() {
            return;
        }
    }
    tls.conn.send_close_notify();
    let _ = tls.conn.complete_io(&mut tls.sock);
}
