use crate::{
    codec::{BodyFormat, BoxedStream, CodecPair, CodecReader, CodecWriter},
    constants::{DEFAULT_MAX_FRAME_SIZE, FRAME_LENGTH_FIELD_SIZE},
    error::CodecError,
    protocol::RpcHeader,
};
use bytes::{BufMut, BytesMut};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};

/// The binary codec registered under `application/gob`.
///
/// Each encoded value travels as one frame:
///
/// ```text
/// +----------------------+---------------------------+
/// | length (u32, LE)     | bitcode-encoded value     |
/// +----------------------+---------------------------+
/// ```
///
/// A message is two consecutive frames on the same stream: the header, then
/// the body. Because every value carries its own length, a body can be
/// skipped without understanding it, which keeps the stream aligned when a
/// response has no matching call or a request body fails to decode.
pub struct BinaryCodec;

impl BinaryCodec {
    /// Splits `stream` into a reader and writer using the default frame limit.
    ///
    /// This is the constructor registered in the default
    /// [`CodecRegistry`](crate::codec::CodecRegistry).
    pub fn new_pair(stream: BoxedStream) -> CodecPair {
        Self::new_pair_with_max_frame_size(stream, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Splits `stream` into a reader and writer.
    ///
    /// # Arguments
    ///
    /// * `stream` - The negotiated connection.
    /// * `max_frame_size` - Largest value, in bytes, the reader accepts.
    pub fn new_pair_with_max_frame_size(stream: BoxedStream, max_frame_size: usize) -> CodecPair {
        let (read_half, write_half) = tokio::io::split(stream);

        CodecPair {
            reader: Box::new(BinaryCodecReader {
                inner: read_half,
                max_frame_size,
            }),
            writer: Box::new(BinaryCodecWriter {
                inner: Some(write_half),
            }),
        }
    }
}

pub struct BinaryCodecReader {
    inner: ReadHalf<BoxedStream>,
    max_frame_size: usize,
}

impl BinaryCodecReader {
    async fn read_frame_len(&mut self) -> Result<usize, CodecError> {
        let mut len_bytes = [0u8; FRAME_LENGTH_FIELD_SIZE];
        self.inner.read_exact(&mut len_bytes).await?;
        Ok(u32::from_le_bytes(len_bytes) as usize)
    }

    async fn read_frame_payload(&mut self, len: usize) -> Result<Vec<u8>, CodecError> {
        let mut payload = vec![0u8; len];
        self.inner.read_exact(&mut payload).await?;
        Ok(payload)
    }

    async fn skip(&mut self, len: usize) -> Result<(), CodecError> {
        let mut limited = (&mut self.inner).take(len as u64);
        let skipped = tokio::io::copy(&mut limited, &mut tokio::io::sink()).await?;

        if skipped < len as u64 {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl CodecReader for BinaryCodecReader {
    async fn read_header(&mut self) -> Result<RpcHeader, CodecError> {
        let len = self.read_frame_len().await?;

        // Nothing after a bogus header length can be trusted.
        if len > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                len,
                max: self.max_frame_size,
            });
        }

        let payload = self.read_frame_payload(len).await?;
        BodyFormat::Bitcode.decode(&payload)
    }

    async fn read_body(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_frame_len().await?;

        if len > self.max_frame_size {
            self.skip(len).await?;
            return Err(CodecError::FrameTooLarge {
                len,
                max: self.max_frame_size,
            });
        }

        self.read_frame_payload(len).await
    }

    async fn discard_body(&mut self) -> Result<(), CodecError> {
        let len = self.read_frame_len().await?;
        self.skip(len).await
    }

    fn body_format(&self) -> BodyFormat {
        BodyFormat::Bitcode
    }
}

pub struct BinaryCodecWriter {
    // `None` once closed.
    inner: Option<WriteHalf<BoxedStream>>,
}

impl BinaryCodecWriter {
    async fn write_frames(&mut self, header: &RpcHeader, body: &[u8]) -> Result<(), CodecError> {
        let inner = self.inner.as_mut().ok_or(CodecError::Closed)?;

        let header_bytes = BodyFormat::Bitcode.encode(header)?;

        let mut buf =
            BytesMut::with_capacity(2 * FRAME_LENGTH_FIELD_SIZE + header_bytes.len() + body.len());
        put_frame(&mut buf, &header_bytes)?;
        put_frame(&mut buf, body)?;

        inner.write_all(&buf).await?;
        inner.flush().await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl CodecWriter for BinaryCodecWriter {
    async fn write(&mut self, header: &RpcHeader, body: &[u8]) -> Result<(), CodecError> {
        let result = self.write_frames(header, body).await;

        if let Err(err) = &result {
            if !matches!(err, CodecError::Closed) {
                tracing::error!("rpc codec: error writing message: {}", err);
                let _ = self.close().await;
            }
        }

        result
    }

    async fn close(&mut self) -> Result<(), CodecError> {
        match self.inner.take() {
            Some(mut inner) => Ok(inner.shutdown().await?),
            None => Ok(()),
        }
    }

    fn body_format(&self) -> BodyFormat {
        BodyFormat::Bitcode
    }
}

fn put_frame(buf: &mut BytesMut, payload: &[u8]) -> Result<(), CodecError> {
    let len = u32::try_from(payload.len()).map_err(|_| CodecError::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;

    buf.put_u32_le(len);
    buf.extend_from_slice(payload);

    Ok(())
}
