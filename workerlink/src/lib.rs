//! Reliable request/reply client for a gateway's privileged worker process.
//!
//! The worker owns the real system state and answers requests over a single
//! strictly-alternating request/reply socket (ZeroMQ REQ by default, plain
//! TCP as an alternative). `workerlink` makes that socket safe to share
//! between concurrent callers and retries through worker restarts with a
//! bounded budget (the "lazy pirate" pattern).
//!
//! # Quick start
//!
//! ```no_run
//! use workerlink::{Client, Config, Operation, Service, Supervisor, Value};
//!
//! # async fn demo() -> workerlink::Result<()> {
//! let config = Config::default().apply_env()?;
//! let client = Client::connect(&config)?;
//! let sup = Supervisor::startup(client, config.idle_interval()).await;
//!
//! let reply = sup
//!     .client()
//!     .send_request(Service::Worker, Operation::Info, None)
//!     .await?;
//! if let Value::Info(text) = reply {
//!     println!("worker: {text}");
//! }
//!
//! sup.shutdown().await
//! # }
//! ```

mod client;
mod config;
mod connection;
mod error;
#[cfg(test)]
mod mock;
mod supervisor;
mod tcp;
mod transport;
mod zmq;

pub use client::{Client, RetryBudget};
pub use config::{
    Config, ENV_ENDPOINT, ENV_PORT_FILE, ENV_TRANSPORT, Endpoint, IDLE_INTERVAL_SECS,
    REQUEST_RETRIES, REQUEST_TIMEOUT_MS, TransportKind, read_port_file,
};
pub use connection::{Connection, ConnectionManager};
pub use error::{Error, Result};
pub use supervisor::Supervisor;
pub use tcp::{TcpConnector, TcpSocket};
pub use transport::{Connector, Readiness, Socket};
pub use zmq::{ZmqConnector, ZmqSocket};
pub use workerlink_proto::{Operation, Reply, Request, Service, Session, Value};
