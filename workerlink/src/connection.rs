//! Connection manager: the single live socket to the worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::transport::{Connector, Readiness, Socket};
use crate::{Error, Result};

/// A live socket plus the generation it was opened as.
///
/// Generations increase by one per [`ConnectionManager::open`], which makes
/// every replacement visible in logs.
#[derive(Debug)]
pub struct Connection<S> {
    socket: S,
    generation: u64,
}

impl<S: Socket> Connection<S> {
    /// Generation number, starting at 1.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) async fn send(&mut self, request: &[u8]) -> std::io::Result<()> {
        self.socket.send(request).await
    }

    pub(crate) async fn poll(&mut self, timeout: Duration) -> std::io::Result<Readiness> {
        self.socket.poll(timeout).await
    }

    pub(crate) async fn recv(&mut self) -> std::io::Result<Vec<Vec<u8>>> {
        self.socket.recv().await
    }
}

/// Opens and closes [`Connection`]s through a [`Connector`].
#[derive(Debug)]
pub struct ConnectionManager<C> {
    connector: C,
    generations: AtomicU64,
}

impl<C: Connector> ConnectionManager<C> {
    /// Wraps a connector.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            generations: AtomicU64::new(0),
        }
    }

    /// Opens a fresh connection to the worker.
    pub async fn open(&self) -> Result<Connection<C::Socket>> {
        let socket = self.connector.open().await.map_err(Error::Connection)?;
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(generation, "connection opened");
        Ok(Connection { socket, generation })
    }

    /// Closes `conn`. Taking it by value rules out a second close.
    pub async fn close(&self, conn: Connection<C::Socket>) {
        let generation = conn.generation;
        conn.socket.close().await;
        debug!(generation, "connection closed");
    }

    /// Replaces `old` with a newly opened connection. The old socket is
    /// closed before the new one is created.
    pub async fn reopen(&self, old: Connection<C::Socket>) -> Result<Connection<C::Socket>> {
        self.close(old).await;
        self.open().await
    }

    /// Number of connections opened so far.
    pub fn opened(&self) -> u64 {
        self.generations.load(Ordering::Relaxed)
    }

    /// The underlying connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }
}
