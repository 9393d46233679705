//! Request/reply protocol engine.
//!
//! [`Client`] turns a single strictly-alternating request/reply socket into
//! a retrying RPC call that any number of tasks may issue concurrently.
//!
//! Each exchange holds the connection lock from first transmission to the
//! final reply or failure, so two exchanges never interleave on the wire.
//! Waiters on [`tokio::sync::Mutex`] are served in arrival order.
//!
//! Per attempt the engine sends, then polls with the request timeout:
//!
//! - **readable**: receive; an empty primary frame is a protocol violation
//!   and fails at once, anything else is decoded and returned.
//! - **timed out**: spend one unit of the [`RetryBudget`]. While budget
//!   remains, the socket is discarded, a new one opened, and the *same
//!   encoded bytes* retransmitted. Once spent, the exchange fails with
//!   [`Error::PeerUnavailable`].
//! - **poll error**: fail with [`Error::Transport`], no retry.

use std::fmt;
use std::mem;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};
use workerlink_proto::{Operation, Request, Service, Value};

use crate::config::Config;
use crate::connection::{Connection, ConnectionManager};
use crate::tcp::TcpConnector;
use crate::transport::{Connector, Readiness};
use crate::zmq::ZmqConnector;
use crate::{Error, Result};

/// Remaining reconnect-and-resend attempts of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
}

impl RetryBudget {
    /// A budget of `retries` attempts.
    pub fn new(retries: u32) -> Self {
        Self { remaining: retries }
    }

    /// Spends one unit after an unanswered attempt. Returns `false` once
    /// the budget is exhausted.
    pub fn spend(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining > 0
    }

    /// Units left.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

/// State of the shared connection.
enum Slot<S> {
    /// No socket; the next exchange opens one.
    Vacant,
    /// The socket the next exchange uses.
    Live(Connection<S>),
    /// Shut down for good.
    Closed,
}

/// Reliable request/reply client for the worker process.
pub struct Client<C: Connector = ZmqConnector> {
    manager: ConnectionManager<C>,
    slot: Mutex<Slot<C::Socket>>,
    timeout: Duration,
    retries: u32,
}

impl Client<ZmqConnector> {
    /// Creates a ZeroMQ client for the endpoint `config` resolves to.
    ///
    /// No connection is opened yet; see [`Client::warm`].
    pub fn connect(config: &Config) -> Result<Self> {
        Self::new(ZmqConnector::from_config(config)?, config)
    }
}

impl Client<TcpConnector> {
    /// Creates a plain-TCP client for the endpoint `config` resolves to.
    pub fn connect_tcp(config: &Config) -> Result<Self> {
        Self::new(TcpConnector::from_config(config)?, config)
    }
}

impl<C: Connector> Client<C> {
    /// Creates a client over an arbitrary transport. Fails with
    /// [`Error::Config`] if `config` does not validate.
    pub fn new(connector: C, config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            manager: ConnectionManager::new(connector),
            slot: Mutex::new(Slot::Vacant),
            timeout: config.request_timeout(),
            retries: config.request_retries,
        })
    }

    /// Opens the connection ahead of the first exchange.
    pub async fn warm(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        if matches!(*slot, Slot::Closed) {
            return Err(Error::Closed);
        }
        if matches!(*slot, Slot::Vacant) {
            *slot = Slot::Live(self.manager.open().await?);
        }
        Ok(())
    }

    /// Sends one request to the worker and returns the decoded result.
    pub async fn send_request(
        &self,
        service: Service,
        operation: Operation,
        data: Option<String>,
    ) -> Result<Value> {
        self.exchange(&Request {
            service,
            operation,
            data,
        })
        .await
    }

    /// Runs one exchange for `req`.
    pub async fn exchange(&self, req: &Request) -> Result<Value> {
        let bytes = workerlink_proto::encode_request(req).map_err(Error::Encode)?;
        debug!(service = ?req.service, operation = ?req.operation, len = bytes.len(), "exchange");

        let frames = {
            let mut slot = self.slot.lock().await;
            self.transact(&mut slot, &bytes).await?
        };
        workerlink_proto::decode_reply(&frames, req.operation).map_err(Error::from_reply)
    }

    /// Drives send → poll → receive-or-retry against the locked slot.
    async fn transact(&self, slot: &mut Slot<C::Socket>, request: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut conn = match mem::replace(slot, Slot::Vacant) {
            Slot::Live(conn) => conn,
            Slot::Vacant => self.manager.open().await?,
            Slot::Closed => {
                *slot = Slot::Closed;
                return Err(Error::Closed);
            }
        };

        let mut budget = RetryBudget::new(self.retries);
        let mut attempts = 1;
        if let Err(e) = conn.send(request).await {
            self.manager.close(conn).await;
            return Err(Error::Transport(e));
        }

        loop {
            match conn.poll(self.timeout).await {
                Ok(Readiness::Readable) => {
                    let frames = match conn.recv().await {
                        Ok(frames) => frames,
                        Err(e) => {
                            self.manager.close(conn).await;
                            return Err(Error::Transport(e));
                        }
                    };
                    *slot = Slot::Live(conn);
                    if frames.first().is_none_or(Vec::is_empty) {
                        warn!(attempts, "worker sent an empty reply");
                        return Err(Error::MalformedReply);
                    }
                    debug!(attempts, frames = frames.len(), "reply received");
                    return Ok(frames);
                }
                Ok(Readiness::TimedOut) => {
                    if !budget.spend() {
                        warn!(attempts, "worker unavailable, abandoning request");
                        // The unanswered socket cannot send again; leave a
                        // fresh one for the next exchange.
                        match self.manager.reopen(conn).await {
                            Ok(fresh) => *slot = Slot::Live(fresh),
                            Err(e) => warn!(error = %e, "reconnect failed"),
                        }
                        return Err(Error::PeerUnavailable { attempts });
                    }
                    warn!(
                        attempts,
                        remaining = budget.remaining(),
                        "no reply from worker, reconnecting"
                    );
                    conn = self.manager.reopen(conn).await?;
                    attempts += 1;
                    if let Err(e) = conn.send(request).await {
                        self.manager.close(conn).await;
                        return Err(Error::Transport(e));
                    }
                }
                Err(e) => {
                    self.manager.close(conn).await;
                    return Err(Error::Transport(e));
                }
            }
        }
    }

    /// Closes the connection and refuses further exchanges.
    ///
    /// Waits for an in-flight exchange to finish first.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if let Slot::Live(conn) = mem::replace(&mut *slot, Slot::Closed) {
            self.manager.close(conn).await;
        }
    }

    /// Whether [`close`](Self::close) has run.
    pub async fn is_closed(&self) -> bool {
        matches!(*self.slot.lock().await, Slot::Closed)
    }

    /// Number of connections opened over the client's lifetime.
    pub fn connections_opened(&self) -> u64 {
        self.manager.opened()
    }

    /// The underlying connector.
    pub fn connector(&self) -> &C {
        self.manager.connector()
    }
}

impl<C: Connector> fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("connections_opened", &self.manager.opened())
            .finish_non_exhaustive()
    }
}
