use crate::error::CodecError;
use serde::{Serialize, de::DeserializeOwned};

/// The value serialization a codec applies to headers and bodies.
///
/// Framing is the codec's concern; turning a typed value into bytes and
/// back is this type's. Call sites stay generic over the value type while
/// the codec they talk to stays object-safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    /// `bitcode` via its serde integration.
    Bitcode,
}

impl BodyFormat {
    pub fn encode<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized,
    {
        match self {
            BodyFormat::Bitcode => bitcode::serialize(value).map_err(CodecError::Encode),
        }
    }

    pub fn decode<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        match self {
            BodyFormat::Bitcode => bitcode::deserialize(bytes).map_err(CodecError::Decode),
        }
    }
}
