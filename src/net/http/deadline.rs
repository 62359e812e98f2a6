use crate::net::{HttpError, NetError};
use std::io;
use std::net::TcpStream;
use std::time::{Duration, Instant};

/// Tracks the absolute expiration for a single HTTP exchange.
///
/// The deadline covers resolution, connect, handshake and response read; every socket
/// timeout is derived from what remains of it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RequestDeadline {
    expires_at: Instant,
}

impl RequestDeadline {
    pub(crate) fn from_timeout(timeout: Duration) -> Self {
        let bounded = if timeout.is_zero() {
            Duration::from_millis(1)
        } else {
            timeout
        };
        Self {
            expires_at: Instant::now() + bounded,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_deadline(expires_at: Instant) -> Self {
        Self { expires_at }
    }

    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.expires_at.checked_duration_since(Instant::now())
    }

    /// Socket timeout for the next blocking call, or a timeout error when
    /// nothing is left.
    pub(crate) fn remaining_duration(&self) -> Result<Duration, NetError> {
        self.remaining()
            .filter(|duration| !duration.is_zero())
            .ok_or_else(|| NetError::from(HttpError::RequestTimeout))
    }

    /// Sets the socket's read and write timeouts to whatever is left of the
    /// deadline. Called before every blocking socket operation so a peer
    /// trickling bytes cannot extend the exchange.
    pub(crate) fn arm(&self, sock: &TcpStream) -> Result<(), NetError> {
        let budget = self.remaining_duration()?;
        sock.set_read_timeout(Some(budget))?;
        sock.set_write_timeout(Some(budget))?;
        Ok(())
    }
}

/// Maps socket timeouts to [`HttpError::RequestTimeout`]; other I/O errors
/// pass through.
pub(crate) fn timeout_aware(err: io::Error) -> NetError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            NetError::from(HttpError::RequestTimeout)
        }
        _ => NetError::from(err),
    }
}
