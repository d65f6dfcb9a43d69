mod codec_type;
mod rpc_header;
mod rpc_option;

pub use codec_type::{BINARY_CODEC_ID, CodecType, JSON_CODEC_ID};
pub use rpc_header::RpcHeader;
pub use rpc_option::RpcOption;
