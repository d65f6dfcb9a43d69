//! A Tokio-based client engine for minirpc.
//!
//! One [`RpcClient`] owns one negotiated connection and lets any number of
//! tasks issue calls over it concurrently. Each call gets the next sequence
//! number, is written as one header/body pair under the send lock, and is
//! completed exactly once: when its response arrives, or when the connection
//! shuts down.

mod call;
mod error;
mod rpc_client;

pub use call::{Call, CompletionReceiver, CompletionSender, PendingCall, completion_queue};
pub use error::RpcClientError;
pub use rpc_client::RpcClient;
