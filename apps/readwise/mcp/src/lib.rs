//! Streaming search over newline-delimited JSON-RPC on raw TCP.
//!
//! A client opens a connection, sends one `search` request and reads one
//! response line per result until the server closes the connection.
//!
//! ```text
//! -> {"jsonrpc":"2.0","method":"search","params":{"q":"ownership","k":2},"id":1}
//! <- {"jsonrpc":"2.0","id":1,"result":{"id":42,"text":"...","score":0.12,...}}
//! <- {"jsonrpc":"2.0","id":1,"result":{"id":7,"text":"...","score":0.19,...}}
//! ```

pub mod framing;
pub mod server;

pub use framing::{JsonRpcCodec, Message, RpcError};
pub use server::{McpServer, handle_connection};
