//! Defines the public API for the MCP server.
//!
//! A [`Server`] owns the capability [`Registry`] and creates one [`Session`]
//! per connected transport. Each session runs the protocol state machine for
//! its connection: handshake, request dispatch, keep-alive pings and roots
//! tracking.

mod completion;
mod context;
mod events;
mod options;
pub mod registry;
#[allow(clippy::module_inception)]
mod server;
mod session;

use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by handlers, loaders and sleepers.
pub type BoxedFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

pub use context::{Logger, Progress, ToolContext};
pub use events::EventStream;
pub use options::{RetryPolicy, ServerOptions, Sleeper, TokioSleeper};
pub use registry::{
    ArgumentDefinition, LoadedResource, PromptDefinition, Registry, ResourceDefinition,
    ResourcePayload, ResourceTemplateDefinition, ToolDefinition, ToolOutput,
};
pub use server::{Server, ServerEvent};
pub use session::{Session, SessionEvent, SessionState};
