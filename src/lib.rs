//! Per-connection Model Context Protocol server sessions.
//!
//! Register tools, resources, resource templates and prompts on a
//! [`server::Server`], then run it over a single transport (stdio) or a
//! listener (TCP). Each connection gets a [`server::Session`] that performs
//! the capability handshake, answers requests, keeps the client alive with
//! pings and tracks the client's roots.

// Lets `#[derive(ToolArguments)]` expand to `::mcp_session::...` paths inside this crate too.
extern crate self as mcp_session;

pub mod error;
pub mod network_adapter;
pub mod protocol;
pub mod schema;
pub mod server;
pub mod types;
pub mod uri_template;

pub use error::{BoxError, Error, ErrorData, Result, ToolError};
pub use mcp_session_macros::ToolArguments;
pub use schema::{ParameterSchema, ToolArgumentsDescriptor, TypedSchema};

#[cfg(feature = "schema-validation")]
pub use schema::JsonSchema;

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
    pub use serde_json;
}
