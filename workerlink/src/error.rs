//! Error types for workerlink operations.

use std::io;

use workerlink_proto::ProtoError;

/// Alias for `Result<T, workerlink::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by workerlink operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The outgoing request could not be encoded.
    #[error("encode request: {0}")]
    Encode(#[source] ProtoError),

    /// Frame 0 of the reply could not be decoded.
    #[error("decode reply: {0}")]
    Decode(#[source] ProtoError),

    /// A socket to the worker could not be created.
    #[error("connection: {0}")]
    Connection(#[source] io::Error),

    /// Sending, polling, or receiving failed at the transport level.
    #[error("transport: {0}")]
    Transport(#[source] io::Error),

    /// The worker answered with neither data nor an error.
    #[error("malformed reply: empty primary frame")]
    MalformedReply,

    /// The worker rejected the request.
    #[error("server error: {0}")]
    Server(String),

    /// The worker did not answer within the retry budget.
    #[error("worker unavailable after {attempts} attempts")]
    PeerUnavailable {
        /// Number of transmissions made.
        attempts: u32,
    },

    /// The client has been shut down.
    #[error("client is shut down")]
    Closed,

    /// Invalid configuration.
    #[error("config: {0}")]
    Config(String),

    /// The idle task panicked or was aborted.
    #[error("idle task: {0}")]
    IdleTask(#[from] tokio::task::JoinError),

    /// An I/O error while loading configuration.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Maps a reply decoding failure, keeping the worker's own rejection
    /// distinct from a garbled reply.
    pub(crate) fn from_reply(err: ProtoError) -> Self {
        match err {
            ProtoError::Server(msg) => Self::Server(msg),
            ProtoError::EmptyReply => Self::MalformedReply,
            other => Self::Decode(other),
        }
    }
}
