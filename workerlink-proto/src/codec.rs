//! Versioned postcard encoding of requests and replies.
//!
//! Each message is `[u8 schema version][postcard payload]`.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::message::{Operation, Reply, Request, SCHEMA_VERSION, Value};

/// Errors produced while encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProtoError {
    /// The message could not be serialized.
    #[error("encode: {0}")]
    Encode(postcard::Error),

    /// Frame 0 is not a valid message.
    #[error("decode: {0}")]
    Decode(postcard::Error),

    /// Frame 0 was written with a different schema version.
    #[error("schema version {found}, expected {SCHEMA_VERSION}")]
    Version {
        /// Version byte found on the wire.
        found: u8,
    },

    /// The reply had no frame 0, or frame 0 was empty.
    #[error("reply carries neither data nor an error")]
    EmptyReply,

    /// The worker rejected the request.
    #[error("server error: {0}")]
    Server(String),
}

/// Encodes a request for transmission.
pub fn encode_request(req: &Request) -> Result<Vec<u8>, ProtoError> {
    encode(req)
}

/// Encodes a reply (worker side).
pub fn encode_reply(reply: &Reply) -> Result<Vec<u8>, ProtoError> {
    encode(reply)
}

/// Decodes a request (worker side).
pub fn decode_request(bytes: &[u8]) -> Result<Request, ProtoError> {
    decode(bytes)
}

/// Decodes frame 0 of a reply and selects the field `op` produced.
///
/// Frames after the first are opaque and ignored.
pub fn decode_reply(frames: &[Vec<u8>], op: Operation) -> Result<Value, ProtoError> {
    let first = frames.first().ok_or(ProtoError::EmptyReply)?;
    if first.is_empty() {
        return Err(ProtoError::EmptyReply);
    }
    let reply: Reply = decode(first)?;
    if !reply.server_error.is_empty() {
        return Err(ProtoError::Server(reply.server_error));
    }
    Ok(match op {
        Operation::Sessions => Value::Sessions(reply.sessions),
        Operation::Info => Value::Info(reply.info),
        Operation::QueryCreate => Value::QueryId(reply.query_id),
        Operation::QueryData => Value::QueryData(reply.query_data),
        Operation::QueryClose => Value::QueryStatus(reply.query_status),
        Operation::TestError => Value::None,
    })
}

fn encode(msg: &impl Serialize) -> Result<Vec<u8>, ProtoError> {
    postcard::to_extend(msg, vec![SCHEMA_VERSION]).map_err(ProtoError::Encode)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtoError> {
    let (&version, payload) = bytes
        .split_first()
        .ok_or(ProtoError::Decode(postcard::Error::DeserializeUnexpectedEnd))?;
    if version != SCHEMA_VERSION {
        return Err(ProtoError::Version { found: version });
    }
    postcard::from_bytes(payload).map_err(ProtoError::Decode)
}
