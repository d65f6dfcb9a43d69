use crate::constants::MAGIC_NUMBER;
use crate::protocol::CodecType;
use serde::{Deserialize, Serialize};

/// The handshake record sent once, first, before any framed message.
///
/// Serialized as a single JSON object using the field names
/// `MagicNumber` and `CodecType`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RpcOption {
    /// Must equal [`MAGIC_NUMBER`] for the handshake to be accepted.
    pub magic_number: u64,

    /// The codec both sides switch to once the record has been read.
    pub codec_type: CodecType,
}

impl Default for RpcOption {
    fn default() -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            codec_type: CodecType::default(),
        }
    }
}

impl RpcOption {
    pub fn new(codec_type: CodecType) -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            codec_type,
        }
    }

    /// Normalizes an option supplied by a client caller.
    ///
    /// `None` yields the default option. The magic number is always forced to
    /// [`MAGIC_NUMBER`] and an unspecified codec falls back to the default.
    pub fn resolve(option: Option<RpcOption>) -> RpcOption {
        let Some(mut option) = option else {
            return RpcOption::default();
        };

        option.magic_number = MAGIC_NUMBER;
        if option.codec_type.is_unspecified() {
            option.codec_type = CodecType::default();
        }

        option
    }
}
