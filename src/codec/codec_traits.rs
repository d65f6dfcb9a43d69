use crate::codec::BodyFormat;
use crate::error::CodecError;
use crate::protocol::RpcHeader;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncWrite};

/// Any bidirectional, ordered byte stream a codec can run over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// The read half of a codec.
///
/// Every message on the stream is a header followed by exactly one body, so
/// a successful [`read_header`](CodecReader::read_header) must be followed
/// by either [`read_body`](CodecReader::read_body) or
/// [`discard_body`](CodecReader::discard_body) before the next header.
#[async_trait::async_trait]
pub trait CodecReader: Send {
    async fn read_header(&mut self) -> Result<RpcHeader, CodecError>;

    /// Reads the next body and returns its encoded bytes.
    async fn read_body(&mut self) -> Result<Vec<u8>, CodecError>;

    /// Consumes the next body without decoding it.
    async fn discard_body(&mut self) -> Result<(), CodecError>;

    fn body_format(&self) -> BodyFormat;
}

/// The write half of a codec.
///
/// A failed write closes the writer before the error is returned; the
/// connection cannot be written to afterwards.
#[async_trait::async_trait]
pub trait CodecWriter: Send {
    /// Writes `header` followed by the already encoded `body`, flushing
    /// before returning.
    async fn write(&mut self, header: &RpcHeader, body: &[u8]) -> Result<(), CodecError>;

    /// Shuts the write side of the stream down. Closing twice is a no-op.
    async fn close(&mut self) -> Result<(), CodecError>;

    fn body_format(&self) -> BodyFormat;
}

/// Encodes `body` with the writer's format and writes it after `header`.
///
/// A body that cannot be encoded is treated like any other write failure:
/// the writer is closed before the error is returned.
pub async fn write_message<W, T>(
    writer: &mut W,
    header: &RpcHeader,
    body: &T,
) -> Result<(), CodecError>
where
    W: CodecWriter + ?Sized,
    T: Serialize + Sync + ?Sized,
{
    let bytes = match writer.body_format().encode(body) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!("rpc codec: error encoding body: {}", err);
            let _ = writer.close().await;
            return Err(err);
        }
    };

    writer.write(header, &bytes).await
}

/// Reads the next body and decodes it as `T`.
pub async fn read_message_body<T, R>(reader: &mut R) -> Result<T, CodecError>
where
    T: DeserializeOwned,
    R: CodecReader + ?Sized,
{
    let bytes = reader.read_body().await?;
    reader.body_format().decode(&bytes)
}
