use serde::{Deserialize, Serialize};

/// The envelope that precedes every message body on the wire.
///
/// A request header names the target method and carries the caller's
/// sequence number. A response header echoes both back and, when the call
/// failed on the server, carries the error text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcHeader {
    /// Target of the call, in `"Service.Method"` form.
    pub service_method: String,

    /// Correlates a response with its request. Chosen by the client.
    pub seq: u64,

    /// Error text set by the server. Empty means no error.
    pub error: String,
}

impl RpcHeader {
    pub fn new(service_method: impl Into<String>, seq: u64) -> Self {
        Self {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}
