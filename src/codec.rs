mod binary_codec;
mod body_format;
mod codec_registry;
mod codec_traits;

pub use binary_codec::{BinaryCodec, BinaryCodecReader, BinaryCodecWriter};
pub use body_format::BodyFormat;
pub use codec_registry::{CodecPair, CodecRegistry, NewCodecFn};
pub use codec_traits::{
    AsyncStream, BoxedStream, CodecReader, CodecWriter, read_message_body, write_message,
};
