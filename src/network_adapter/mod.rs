//! Pluggable transports a session runs over.
//!
//! A session only needs to send and receive whole JSON-RPC frames; how those
//! frames travel (pipes, sockets, in-memory duplex streams) is decided by the
//! [`NetworkAdapter`] it is handed. Multi-session servers additionally take a
//! [`Listener`] that yields one adapter per accepted connection.

pub mod listener;
pub mod ndjson;
pub mod r#trait;

pub use listener::{Listener, TcpEndpoint};
pub use ndjson::{NdjsonAdapter, StdioAdapter, TcpAdapter};
pub use r#trait::NetworkAdapter;
