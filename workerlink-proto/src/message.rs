//! Schema types for gateway↔worker messaging.

use serde::{Deserialize, Serialize};

/// Default endpoint of the worker's request/reply socket.
pub const DEFAULT_ENDPOINT: &str = "tcp://localhost:5555";

/// Version byte prepended to every encoded request and reply.
pub const SCHEMA_VERSION: u8 = 1;

/// Subsystem of the worker process a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Service {
    /// Packet-processing daemon: session table and diagnostics.
    Worker,
    /// Reporting daemon: query lifecycle.
    Reports,
}

/// Action requested from a [`Service`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Operation {
    /// Dump the tracked network session table.
    Sessions,
    /// Free-form build/runtime information.
    Info,
    /// Ask the worker to reject the request (exercises the error path).
    TestError,
    /// Create a report query; `data` carries the query definition.
    QueryCreate,
    /// Fetch rows for a query; `data` carries the query id.
    QueryData,
    /// Release a query; `data` carries the query id.
    QueryClose,
}

/// Request sent from the gateway to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Target subsystem.
    pub service: Service,
    /// Requested action.
    pub operation: Operation,
    /// Optional payload (query parameters or a request body).
    pub data: Option<String>,
}

impl Request {
    /// Builds a request without a payload.
    pub fn new(service: Service, operation: Operation) -> Self {
        Self {
            service,
            operation,
            data: None,
        }
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}

/// One tracked network session, as reported by the worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Worker-assigned session id.
    pub id: u64,
    /// IP protocol number (6 = TCP, 17 = UDP).
    pub protocol: u8,
    /// Client address.
    pub client_addr: String,
    /// Client port.
    pub client_port: u16,
    /// Server address.
    pub server_addr: String,
    /// Server port.
    pub server_port: u16,
    /// Bytes sent by the client.
    pub client_bytes: u64,
    /// Bytes sent by the server.
    pub server_bytes: u64,
}

/// Reply sent from the worker to the gateway.
///
/// Exactly one payload field is meaningful per reply, chosen by the
/// [`Operation`] of the request; a non-empty `server_error` overrides all
/// of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Application-level failure reported by the worker (empty = none).
    pub server_error: String,
    /// Payload of [`Operation::Sessions`].
    pub sessions: Vec<Session>,
    /// Payload of [`Operation::Info`].
    pub info: String,
    /// Payload of [`Operation::QueryCreate`].
    pub query_id: u64,
    /// Payload of [`Operation::QueryData`] (rows as JSON text).
    pub query_data: String,
    /// Payload of [`Operation::QueryClose`].
    pub query_status: String,
}

/// Decoded result of one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Session table.
    Sessions(Vec<Session>),
    /// Free-form info string.
    Info(String),
    /// Id of a newly created query.
    QueryId(u64),
    /// Query rows as JSON text.
    QueryData(String),
    /// Query close acknowledgement.
    QueryStatus(String),
    /// The operation carries no payload.
    None,
}
