//! Error types for the protocol and framing layer.

use crate::protocol::CodecType;
use std::io;
use thiserror::Error;

/// Errors raised while framing, encoding or decoding messages.
#[derive(Debug, Error)]
pub enum CodecError {
    /// I/O error on the underlying stream, including end of stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("encode error: {0}")]
    Encode(bitcode::Error),

    #[error("decode error: {0}")]
    Decode(bitcode::Error),

    /// A length prefix exceeded the configured frame limit.
    #[error("frame of {len} bytes exceeds the limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    /// The writer was closed, either explicitly or after a failed write.
    #[error("codec is closed")]
    Closed,

    /// No constructor is registered for the requested codec.
    #[error("invalid codec type {0}")]
    UnsupportedCodec(CodecType),
}

impl CodecError {
    /// True when the stream ended, cleanly or in the middle of a frame.
    pub fn is_eof(&self) -> bool {
        matches!(self, CodecError::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof)
    }
}

/// Errors raised while exchanging the option record. All of them are fatal
/// to the connection.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The record was not a valid JSON option object.
    #[error("malformed option record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// No newline was found within the record size limit.
    #[error("option record exceeds {0} bytes")]
    RecordTooLarge(usize),

    #[error("invalid magic number {0:#x}")]
    InvalidMagicNumber(u64),

    #[error("invalid codec type {0}")]
    UnsupportedCodec(CodecType),
}
