//! ZeroMQ REQ transport, the worker's native socket type.
//!
//! Each [`ZmqSocket`] wraps one `zeromq::ReqSocket`. Connecting happens on
//! the first poll and shares that poll's deadline, so an absent worker costs
//! exactly one request timeout per attempt. A REQ socket that timed out
//! waiting for its reply is never used again; the engine closes it and opens
//! a new one.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::debug;
use zeromq::{ReqSocket, Socket as _, SocketRecv as _, SocketSend as _, ZmqMessage};

use crate::config::{Config, Endpoint};
use crate::transport::{Connector, Readiness, Socket};

/// Opens [`ZmqSocket`]s to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct ZmqConnector {
    endpoint: Endpoint,
}

impl ZmqConnector {
    /// Creates a connector for `endpoint`.
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    /// Creates a connector for the endpoint `config` resolves to.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        Ok(Self::new(config.resolve_endpoint()?))
    }

    /// Peer endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Connector for ZmqConnector {
    type Socket = ZmqSocket;

    async fn open(&self) -> io::Result<ZmqSocket> {
        Ok(ZmqSocket {
            endpoint: self.endpoint.to_string(),
            socket: ReqSocket::new(),
            state: State::Idle(None),
            reply: None,
        })
    }
}

/// One REQ socket to the worker.
pub struct ZmqSocket {
    endpoint: String,
    socket: ReqSocket,
    state: State,
    reply: Option<ZmqMessage>,
}

#[derive(Debug)]
enum State {
    /// Not connected yet; holds the request to send once connected.
    Idle(Option<Vec<u8>>),
    Connected,
    /// The request could not be delivered or the peer went away.
    Lost,
}

impl fmt::Debug for ZmqSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZmqSocket")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ZmqSocket {
    /// Connects an idle socket and sends its queued request before
    /// `deadline`.
    async fn establish(&mut self, deadline: Instant) {
        let queued = match &mut self.state {
            State::Idle(queued) => queued.take(),
            State::Connected | State::Lost => return,
        };
        self.state = State::Lost;

        match time::timeout_at(deadline, self.socket.connect(&self.endpoint)).await {
            Ok(Ok(())) => debug!(peer = %self.endpoint, "connected"),
            Ok(Err(e)) => {
                debug!(peer = %self.endpoint, error = %e, "peer unreachable");
                return;
            }
            Err(_) => {
                debug!(peer = %self.endpoint, "connect timed out");
                return;
            }
        }
        self.state = State::Connected;

        if let Some(request) = queued {
            match time::timeout_at(deadline, self.socket.send(ZmqMessage::from(request))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(peer = %self.endpoint, error = %e, "request lost");
                    self.state = State::Lost;
                }
                Err(_) => {
                    debug!(peer = %self.endpoint, "send timed out");
                    self.state = State::Lost;
                }
            }
        }
    }
}

impl Socket for ZmqSocket {
    async fn send(&mut self, request: &[u8]) -> io::Result<()> {
        match &mut self.state {
            State::Idle(queued) => *queued = Some(request.to_vec()),
            State::Connected => {
                if let Err(e) = self.socket.send(ZmqMessage::from(request.to_vec())).await {
                    debug!(peer = %self.endpoint, error = %e, "request lost");
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
        if !matches!(self.state, State::Connected) {
            time::sleep_until(deadline).await;
            return Ok(Readiness::TimedOut);
        }

        match time::timeout_at(deadline, self.socket.recv()).await {
            Ok(Ok(msg)) => {
                self.reply = Some(msg);
                Ok(Readiness::Readable)
            }
            // The REQ socket reports a vanished peer as a receive error;
            // the request is gone either way.
            Ok(Err(e)) => {
                debug!(peer = %self.endpoint, error = %e, "no reply, peer lost");
                self.state = State::Lost;
                time::sleep_until(deadline).await;
                Ok(Readiness::TimedOut)
            }
            Err(_) => Ok(Readiness::TimedOut),
        }
    }

    async fn recv(&mut self) -> io::Result<Vec<Vec<u8>>> {
        let msg = self
            .reply
            .take()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        Ok(msg.into_vec().into_iter().map(|frame| frame.to_vec()).collect())
    }

    async fn close(self) {
        for e in self.socket.close().await {
            debug!(peer = %self.endpoint, error = %e, "close failed");
        }
    }
}
