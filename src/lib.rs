//! # minirpc
//!
//! Wire protocol and framing layer for a minimal request/response RPC
//! transport.
//!
//! A connection goes through two phases:
//!
//! 1. **Handshake**: the initiating side writes one newline-terminated JSON
//!    [`RpcOption`](protocol::RpcOption) record naming the magic number and
//!    the codec to use for the rest of the stream.
//! 2. **Framed messages**: every message is an [`RpcHeader`](protocol::RpcHeader)
//!    immediately followed by one body, both encoded by the negotiated codec.
//!
//! The client engine and the server dispatcher that drive this protocol live
//! in the `minirpc-tokio-rpc-client` and `minirpc-tokio-rpc-server` crates.

pub mod codec;
pub mod constants;
pub mod error;
pub mod handshake;
pub mod protocol;
