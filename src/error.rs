//! Error taxonomy for the ingest core.
//!
//! One enum per failure domain, following the same pattern as the
//! teacher crate's `NdiError` (a single `thiserror::Error` enum per
//! subsystem rather than one crate-wide error type).

use std::io;

use thiserror::Error;

/// A malformed or truncated application message.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("buffer too short: need at least {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("unknown message type 0x{tag:02x}")]
    UnknownMsgType { tag: u8 },

    #[error("unsupported protocol version {0}")]
    UnsupportedProtocolVersion(u8),

    #[error("unsupported status version {0}")]
    UnsupportedStatusVersion(u8),

    #[error("trailing {0} unconsumed bytes after decoding message body")]
    TrailingBytes(usize),

    #[error("stream payload invalid: {0}")]
    Stream(#[from] CodecError),
}

/// A violation of the delta+bitmap stream compression invariants.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("bitmap scan overran payload by {overrun} bytes at offset {offset}")]
    BitmapOverrun { offset: usize, overrun: usize },

    #[error("payload has {remaining} unconsumed bytes after decoding {decoded} values")]
    TrailingPayload { decoded: usize, remaining: usize },

    #[error("residual read at offset {offset} ran past end of payload (len {len})")]
    ResidualOverrun { offset: usize, len: usize },
}

/// A control-protocol request that did not receive a matching response in time.
#[derive(Error, Debug)]
#[error("control request timed out after {0:?}")]
pub struct TimeoutError(pub std::time::Duration);

/// Failure modes of [`crate::control::ControlClient`].
#[derive(Error, Debug)]
pub enum ControlError {
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("{field} must encode to fewer than 16 ASCII bytes, got {len}")]
    AddressTooLong { field: &'static str, len: usize },

    #[error("address is not valid ASCII: {0}")]
    NotAscii(String),

    #[error("malformed SETUP response")]
    MalformedResponse,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A disk I/O failure while reading or writing stream buffer state.
#[derive(Error, Debug)]
#[error("stream buffer I/O error for {path}: {source}")]
pub struct StreamIoError {
    pub path: String,
    #[source]
    pub source: io::Error,
}

/// Configuration that failed validation at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid sink protocol {protocol:?}")]
    UnknownSinkProtocol { protocol: String },

    #[error("invalid rewrite rule: {0}")]
    InvalidRewriteRule(String),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),
}

/// Aggregate error surfaced from Ingestor-level operations.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    StreamIo(#[from] StreamIoError),

    #[error("no stream buffer configured for path {0}")]
    UnknownStreamPath(String),
}
