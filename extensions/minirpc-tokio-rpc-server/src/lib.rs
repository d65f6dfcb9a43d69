//! A Tokio-based server dispatcher for minirpc.
//!
//! Note: This `RpcServer` does not include authentication or authorization
//! mechanisms, and it places no bound on how many requests a single
//! connection may have in flight. It is best suited for trusted, internal
//! network communication.

mod rpc_server;
mod service_handler;
pub mod utils;

pub use rpc_server::RpcServer;
pub use service_handler::{BoxError, PlaceholderHandler, ServiceHandler, placeholder_reply};
