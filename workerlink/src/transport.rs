//! Request/reply transport seam.
//!
//! A [`Connector`] creates [`Socket`]s bound to one fixed peer. Sockets
//! follow a strict request/reply discipline: one `send`, then `poll`
//! until readable, then one `recv`. A socket that timed out mid-exchange
//! is in an unknown state and is only ever closed, never reused.

use std::future::Future;
use std::io;
use std::time::Duration;

/// Outcome of waiting for a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A reply is ready to be received.
    Readable,
    /// Nothing arrived before the timeout.
    TimedOut,
}

/// Opens sockets to the peer.
pub trait Connector: Send + Sync + 'static {
    /// Socket type produced by this connector.
    type Socket: Socket;

    /// Creates a socket for the peer endpoint.
    ///
    /// Success does not mean the peer is alive; a dead peer shows up as a
    /// poll timeout after the first send.
    fn open(&self) -> impl Future<Output = io::Result<Self::Socket>> + Send;
}

/// One request/reply socket.
pub trait Socket: Send + 'static {
    /// Transmits a request as a single-part message.
    fn send(&mut self, request: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Waits up to `timeout` for the reply to become readable.
    fn poll(&mut self, timeout: Duration) -> impl Future<Output = io::Result<Readiness>> + Send;

    /// Receives every frame of the pending reply.
    fn recv(&mut self) -> impl Future<Output = io::Result<Vec<Vec<u8>>>> + Send;

    /// Releases the socket.
    fn close(self) -> impl Future<Output = ()> + Send;
}
