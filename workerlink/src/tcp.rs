//! Plain TCP transport to the worker, framed with `workerlink_proto`.
//!
//! Sockets connect lazily: a request sent before the connection exists is
//! queued and flushed by the next poll, and connecting counts against that
//! poll's timeout. If the worker is not listening, or hangs up before
//! answering, the request is simply lost and the poll times out, the same
//! way a message-queue request socket behaves while its peer is away.

use std::io;
use std::mem;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::config::{Config, Endpoint};
use crate::transport::{Connector, Readiness, Socket};

/// Opens [`TcpSocket`]s to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    endpoint: Endpoint,
    io_timeout: Duration,
}

impl TcpConnector {
    /// Creates a connector; `io_timeout` bounds reading a reply once it
    /// has started to arrive.
    pub fn new(endpoint: Endpoint, io_timeout: Duration) -> Self {
        Self {
            endpoint,
            io_timeout,
        }
    }

    /// Creates a connector for the endpoint `config` resolves to.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        Ok(Self::new(config.resolve_endpoint()?, config.request_timeout()))
    }

    /// Peer endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Connector for TcpConnector {
    type Socket = TcpSocket;

    async fn open(&self) -> io::Result<TcpSocket> {
        let addr = tokio::net::lookup_host(self.endpoint.authority())
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("{} resolves to no address", self.endpoint),
                )
            })?;
        let socket = if addr.is_ipv4() {
            tokio::net::TcpSocket::new_v4()?
        } else {
            tokio::net::TcpSocket::new_v6()?
        };
        Ok(TcpSocket {
            addr,
            io_timeout: self.io_timeout,
            state: State::Idle(socket, None),
        })
    }
}

/// Request/reply socket over one TCP connection.
#[derive(Debug)]
pub struct TcpSocket {
    addr: SocketAddr,
    io_timeout: Duration,
    state: State,
}

#[derive(Debug)]
enum State {
    /// Created, not yet connected, with the request waiting to go out.
    Idle(tokio::net::TcpSocket, Option<Vec<u8>>),
    Connected(TcpStream),
    /// The peer could not be reached or hung up; nothing will arrive.
    Lost,
}

impl TcpSocket {
    /// Connects an idle socket and flushes its queued request, both before
    /// `deadline`. Any other state is left untouched.
    async fn establish(&mut self, deadline: Instant) {
        let (socket, queued) = match mem::replace(&mut self.state, State::Lost) {
            State::Idle(socket, queued) => (socket, queued),
            other => {
                self.state = other;
                return;
            }
        };

        let mut stream = match time::timeout_at(deadline, socket.connect(self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!(peer = %self.addr, error = %e, "peer unreachable");
                return;
            }
            Err(_) => {
                debug!(peer = %self.addr, "connect timed out");
                return;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %self.addr, error = %e, "set_nodelay failed");
        }
        debug!(peer = %self.addr, "connected");

        if let Some(request) = queued {
            let sent =
                time::timeout_at(deadline, workerlink_proto::send_frames(&mut stream, &[request]))
                    .await;
            match sent {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(peer = %self.addr, error = %e, "request lost");
                    return;
                }
                Err(_) => {
                    debug!(peer = %self.addr, "send timed out");
                    return;
                }
            }
        }
        self.state = State::Connected(stream);
    }
}

impl Socket for TcpSocket {
    async fn send(&mut self, request: &[u8]) -> io::Result<()> {
        match &mut self.state {
            State::Idle(_, queued) => *queued = Some(request.to_vec()),
            State::Connected(stream) => {
                if let Err(e) = workerlink_proto::send_frames(stream, &[request]).await {
                    if !is_disconnect(&e) {
                        return Err(e);
                    }
                    debug!(peer = %self.addr, error = %e, "peer gone, request lost");
                    self.state = State::Lost;
                }
            }
            State::Lost => {}
        }
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> io::Result<Readiness> {
        let deadline = Instant::now() + timeout;
        self.establish(deadline).await;
        let State::Connected(stream) = &self.state else {
            time::sleep_until(deadline).await;
            return Ok(Readiness::TimedOut);
        };

        let mut probe = [0u8; 1];
        let peeked = time::timeout_at(deadline, stream.peek(&mut probe)).await;
        match peeked {
            Err(_) => Ok(Readiness::TimedOut),
            Ok(Ok(0)) => {
                debug!(peer = %self.addr, "peer hung up before replying");
                self.state = State::Lost;
                time::sleep_until(deadline).await;
                Ok(Readiness::TimedOut)
            }
            Ok(Ok(_)) => Ok(Readiness::Readable),
            Ok(Err(e)) if is_disconnect(&e) => {
                debug!(peer = %self.addr, error = %e, "connection dropped before reply");
                self.state = State::Lost;
                time::sleep_until(deadline).await;
                Ok(Readiness::TimedOut)
            }
            Ok(Err(e)) => Err(e),
        }
    }

    async fn recv(&mut self) -> io::Result<Vec<Vec<u8>>> {
        let State::Connected(stream) = &mut self.state else {
            return Err(io::ErrorKind::NotConnected.into());
        };
        time::timeout(self.io_timeout, workerlink_proto::recv_frames(stream))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "reply truncated"))?
    }

    async fn close(self) {
        if let State::Connected(mut stream) = self.state {
            if let Err(e) = stream.shutdown().await {
                debug!(peer = %self.addr, error = %e, "shutdown failed");
            }
        }
    }
}

/// Errors meaning the peer went away, which lose the request rather than
/// fail the exchange.
fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
    )
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    async fn open(endpoint: &str, timeout: Duration) -> TcpSocket {
        TcpConnector::new(endpoint.parse().unwrap(), timeout)
            .open()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn connected_stream_is_reused_across_exchanges() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            while let Ok(frames) = workerlink_proto::recv_frames(&mut stream).await {
                workerlink_proto::send_frames(&mut stream, frames.as_slice())
                    .await
                    .unwrap();
            }
        });

        let timeout = Duration::from_millis(500);
        let mut socket = open(&format!("tcp://127.0.0.1:{port}"), timeout).await;
        for round in 0..3u8 {
            let started = Instant::now();
            socket.send(&[round]).await.unwrap();
            assert_eq!(socket.poll(timeout).await.unwrap(), Readiness::Readable);
            assert_eq!(socket.recv().await.unwrap(), vec![vec![round]]);
            assert!(started.elapsed() < timeout, "round {round} waited out the timeout");
            assert!(matches!(socket.state, State::Connected(_)));
        }

        socket.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_counts_against_poll_timeout() {
        // Not routable: connecting either fails at once or never completes.
        let timeout = Duration::from_millis(300);
        let mut socket = open("tcp://10.255.255.1:9", timeout).await;

        let started = Instant::now();
        socket.send(b"hello").await.unwrap();
        assert_eq!(socket.poll(timeout).await.unwrap(), Readiness::TimedOut);
        let elapsed = started.elapsed();
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout * 2, "attempt took {elapsed:?}");
    }
}
