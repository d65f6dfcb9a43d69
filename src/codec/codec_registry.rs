use crate::{
    codec::{AsyncStream, BinaryCodec, BoxedStream, CodecReader, CodecWriter},
    error::CodecError,
    protocol::CodecType,
};
use std::collections::HashMap;

/// The two halves a codec constructor produces from one stream.
pub struct CodecPair {
    pub reader: Box<dyn CodecReader>,
    pub writer: Box<dyn CodecWriter>,
}

/// Builds a codec over a negotiated stream.
pub type NewCodecFn = fn(BoxedStream) -> CodecPair;

/// Maps codec identifiers to their constructors.
///
/// Built once at startup and then only read, so one instance can be shared
/// by reference (typically behind an `Arc`) between any number of clients
/// and servers without locking.
///
/// ```rust
/// use minirpc::codec::{BinaryCodec, CodecRegistry};
/// use minirpc::protocol::CodecType;
///
/// let registry = CodecRegistry::default();
/// assert!(registry.contains(&CodecType::Binary));
/// assert!(!registry.contains(&CodecType::Json));
///
/// let custom = CodecRegistry::empty()
///     .with_codec(CodecType::from("application/x-bin"), BinaryCodec::new_pair);
/// assert!(custom.contains(&CodecType::from("application/x-bin")));
/// ```
#[derive(Clone)]
pub struct CodecRegistry {
    constructors: HashMap<CodecType, NewCodecFn>,
}

impl Default for CodecRegistry {
    /// Registers the binary codec only. The JSON identifier stays reserved.
    fn default() -> Self {
        Self::empty().with_codec(CodecType::Binary, BinaryCodec::new_pair)
    }
}

impl CodecRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registers `constructor` under `codec_type`, replacing any previous one.
    pub fn with_codec(mut self, codec_type: CodecType, constructor: NewCodecFn) -> Self {
        self.constructors.insert(codec_type, constructor);
        self
    }

    pub fn contains(&self, codec_type: &CodecType) -> bool {
        self.constructors.contains_key(codec_type)
    }

    /// Builds the codec registered under `codec_type` over `stream`.
    ///
    /// Fails with [`CodecError::UnsupportedCodec`] when nothing is registered
    /// for it; `stream` is dropped in that case.
    pub fn new_codec<S>(&self, codec_type: &CodecType, stream: S) -> Result<CodecPair, CodecError>
    where
        S: AsyncStream + 'static,
    {
        let constructor = self
            .constructors
            .get(codec_type)
            .ok_or_else(|| CodecError::UnsupportedCodec(codec_type.clone()))?;

        Ok(constructor(Box::new(stream)))
    }
}
