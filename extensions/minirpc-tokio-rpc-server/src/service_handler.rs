use minirpc::protocol::RpcHeader;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Resolves a request to a reply.
///
/// The server decodes each request body as [`Args`](ServiceHandler::Args)
/// before calling [`handle`](ServiceHandler::handle); a body that does not
/// decode is answered with an error and never reaches the handler. Each
/// call runs on its own task, so `handle` may be invoked concurrently.
#[async_trait::async_trait]
pub trait ServiceHandler: Send + Sync + 'static {
    type Args: DeserializeOwned + Debug + Send + 'static;
    type Reply: Serialize + Send + Sync + 'static;

    /// Returns the reply for one request. An `Err` is sent back to the
    /// caller as the response header's error text.
    async fn handle(&self, header: &RpcHeader, args: Self::Args) -> Result<Self::Reply, BoxError>;
}

/// Stands in for real method resolution: accepts a single string argument
/// and answers every request with [`placeholder_reply`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderHandler;

pub fn placeholder_reply(seq: u64) -> String {
    format!("minirpc resp {seq}")
}

#[async_trait::async_trait]
impl ServiceHandler for PlaceholderHandler {
    type Args = String;
    type Reply = String;

    async fn handle(&self, header: &RpcHeader, args: String) -> Result<String, BoxError> {
        tracing::debug!(
            "rpc server: {} (seq {}) args {:?}",
            header.service_method,
            header.seq,
            args
        );

        Ok(placeholder_reply(header.seq))
    }
}
