use minirpc::error::CodecError;
use std::sync::Arc;
use thiserror::Error;

/// Errors a caller can observe on a call.
///
/// The type is `Clone` because a single connection failure completes every
/// pending call with the same error.
#[derive(Debug, Clone, Error)]
pub enum RpcClientError {
    /// The client was closed or its connection has gone down.
    #[error("connection is shut down")]
    Shutdown,

    /// The server answered with an error in the response header.
    #[error("{0}")]
    Remote(String),

    /// The response body could not be read or decoded into the reply type.
    #[error("reading body {0}")]
    ReadBody(String),

    /// The receive loop stopped on a header read failure, including EOF.
    #[error("connection error: {0}")]
    Connection(Arc<CodecError>),

    /// The request could not be written.
    #[error("send error: {0}")]
    Send(Arc<CodecError>),

    /// A completion queue was requested with a capacity of zero.
    #[error("completion queue must have a capacity of at least 1")]
    UnbufferedCompletionQueue,
}

impl RpcClientError {
    /// True for the errors that mean the connection is no longer usable.
    pub fn is_shutdown(&self) -> bool {
        matches!(
            self,
            RpcClientError::Shutdown | RpcClientError::Connection(_)
        )
    }
}
