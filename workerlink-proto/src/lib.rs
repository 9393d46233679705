//! Wire protocol for gateway↔worker request/reply messaging.
//!
//! Requests and replies are serialized with [`postcard`] behind a one-byte
//! schema version. On byte-stream transports each message travels as a
//! multipart frame set: a 4-byte big-endian part count followed by
//! length-prefixed parts (see [`send_frames`] / [`recv_frames`]).

mod codec;
mod frame;
mod message;

pub use codec::{ProtoError, decode_reply, decode_request, encode_reply, encode_request};
pub use frame::{MAX_FRAME, MAX_PARTS, recv_frames, send_frames};
pub use message::{
    DEFAULT_ENDPOINT, Operation, Reply, Request, SCHEMA_VERSION, Service, Session, Value,
};
