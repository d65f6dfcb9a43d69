//! The option record exchange that precedes framed messages.
//!
//! The record is a single JSON object terminated by a newline. The reading
//! side must hand the *same* buffered reader it parsed the record from to the
//! codec constructor, since bytes after the newline belong to the first
//! framed message and may already sit in the buffer.

use crate::{
    codec::CodecRegistry,
    constants::{MAGIC_NUMBER, MAX_OPTION_RECORD_SIZE},
    error::HandshakeError,
    protocol::RpcOption,
};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Writes `option` as one newline-terminated JSON record and flushes.
pub async fn write_option<W>(writer: &mut W, option: &RpcOption) -> Result<(), HandshakeError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut record = serde_json::to_vec(option)?;
    record.push(b'\n');

    writer.write_all(&record).await?;
    writer.flush().await?;

    Ok(())
}

/// Reads exactly one option record, leaving everything after its newline
/// unread in `reader`.
///
/// The record is parsed but not validated; see [`validate_option`].
pub async fn read_option<R>(reader: &mut R) -> Result<RpcOption, HandshakeError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut record = Vec::new();
    let read = (&mut *reader)
        .take(MAX_OPTION_RECORD_SIZE as u64)
        .read_until(b'\n', &mut record)
        .await?;

    if record.last() != Some(&b'\n') {
        if read >= MAX_OPTION_RECORD_SIZE {
            return Err(HandshakeError::RecordTooLarge(MAX_OPTION_RECORD_SIZE));
        }

        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream ended before the option record was complete",
        )
        .into());
    }

    Ok(serde_json::from_slice(&record)?)
}

/// Checks the magic number and that `registry` can build the requested codec.
pub fn validate_option(option: &RpcOption, registry: &CodecRegistry) -> Result<(), HandshakeError> {
    if option.magic_number != MAGIC_NUMBER {
        return Err(HandshakeError::InvalidMagicNumber(option.magic_number));
    }

    if !registry.contains(&option.codec_type) {
        return Err(HandshakeError::UnsupportedCodec(option.codec_type.clone()));
    }

    Ok(())
}

/// Reads and validates the option record on the accepting side.
pub async fn accept_option<R>(
    reader: &mut R,
    registry: &CodecRegistry,
) -> Result<RpcOption, HandshakeError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let option = read_option(reader).await?;
    validate_option(&option, registry)?;
    Ok(option)
}
