use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire identifier of the binary codec.
pub const BINARY_CODEC_ID: &str = "application/gob";

/// Wire identifier reserved for a JSON codec. No constructor is registered
/// for it, so selecting it fails the same way an unknown identifier does.
pub const JSON_CODEC_ID: &str = "application/json";

/// Identifies the codec a connection uses once the handshake completes.
///
/// On the wire this is a plain string. Identifiers this build does not know
/// about are preserved in [`CodecType::Other`] so they can be reported and
/// rejected instead of failing to parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CodecType {
    /// Length-prefixed binary framing (`application/gob`).
    #[default]
    Binary,

    /// Reserved (`application/json`).
    Json,

    Other(String),
}

impl CodecType {
    pub fn as_str(&self) -> &str {
        match self {
            CodecType::Binary => BINARY_CODEC_ID,
            CodecType::Json => JSON_CODEC_ID,
            CodecType::Other(id) => id,
        }
    }

    /// True for the empty identifier, which callers use to mean "default".
    pub fn is_unspecified(&self) -> bool {
        self.as_str().is_empty()
    }
}

impl From<&str> for CodecType {
    fn from(id: &str) -> Self {
        match id {
            BINARY_CODEC_ID => CodecType::Binary,
            JSON_CODEC_ID => CodecType::Json,
            other => CodecType::Other(other.to_string()),
        }
    }
}

impl From<String> for CodecType {
    fn from(id: String) -> Self {
        match id.as_str() {
            BINARY_CODEC_ID => CodecType::Binary,
            JSON_CODEC_ID => CodecType::Json,
            _ => CodecType::Other(id),
        }
    }
}

impl From<CodecType> for String {
    fn from(codec_type: CodecType) -> Self {
        match codec_type {
            CodecType::Other(id) => id,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
