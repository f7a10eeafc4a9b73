//! Defines the main `Server` struct: the registration API and the two ways of
//! running it.

use super::events::{EventBus, EventStream};
use super::options::{ServerOptions, Sleeper, TokioSleeper};
use super::registry::{
    PromptDefinition, Registry, ResourceDefinition, ResourceTemplateDefinition, ToolDefinition,
};
use super::session::Session;
use crate::error::{Error, Result};
use crate::network_adapter::{Listener, NetworkAdapter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Session lifecycle notifications published by a [`Server`].
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A client completed the handshake.
    Connect(Session),
    /// A session closed and was removed from the active list.
    Disconnect(Session),
}

/// State shared between the server handle and its background tasks.
#[derive(Clone)]
struct Shared {
    registry: Arc<Registry>,
    options: Arc<ServerOptions>,
    sleeper: Arc<dyn Sleeper>,
    sessions: Arc<Mutex<Vec<Session>>>,
    events: Arc<EventBus<ServerEvent>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    /// Creates a session for `adapter`, runs the handshake and tracks the
    /// session until it closes.
    async fn establish<A>(&self, adapter: A) -> Result<Session>
    where
        A: NetworkAdapter + 'static,
    {
        let session = Session::with_sleeper(
            Arc::clone(&self.registry),
            Arc::clone(&self.options),
            Arc::clone(&self.sleeper),
        );
        session.connect(adapter).await?;

        lock(&self.sessions).push(session.clone());
        self.events.emit(ServerEvent::Connect(session.clone()));

        let shared = self.clone();
        let watched = session.clone();
        tokio::spawn(async move {
            watched.wait_closed().await;
            let removed = {
                let mut sessions = lock(&shared.sessions);
                let before = sessions.len();
                sessions.retain(|s| s.id() != watched.id());
                before != sessions.len()
            };
            if removed {
                info!(session = watched.id(), "Session disconnected");
                shared.events.emit(ServerEvent::Disconnect(watched));
            }
        });

        Ok(session)
    }
}

/// An MCP server: a registry of tools, resources and prompts served to one
/// or many clients.
///
/// Definitions are registered first; starting the server freezes the
/// registry so every session sees the same immutable set.
///
/// # Example
///
/// ```no_run
/// use mcp_session::network_adapter::TcpEndpoint;
/// use mcp_session::server::{Server, ServerOptions, ToolContext, ToolDefinition};
/// use mcp_session::{Result, ToolError};
/// use serde_json::Value;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let mut server = Server::new(ServerOptions::new("echo-server", "0.1.0"));
///     server.add_tool(
///         ToolDefinition::new("echo", |args: Value, _ctx: ToolContext| async move {
///             Ok::<_, ToolError>(args.to_string())
///         })
///         .with_description("Echoes its arguments"),
///     )?;
///
///     server.start_multi(TcpEndpoint::bind("127.0.0.1:8080").await?)?;
///     tokio::signal::ctrl_c().await?;
///     server.stop();
///     Ok(())
/// }
/// ```
pub struct Server {
    options: Arc<ServerOptions>,
    registry: Registry,
    frozen: Option<Arc<Registry>>,
    sleeper: Arc<dyn Sleeper>,
    sessions: Arc<Mutex<Vec<Session>>>,
    events: Arc<EventBus<ServerEvent>>,
    acceptor: Option<JoinHandle<()>>,
}

impl Server {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options: Arc::new(options),
            registry: Registry::new(),
            frozen: None,
            sleeper: Arc::new(TokioSleeper),
            sessions: Arc::new(Mutex::new(Vec::new())),
            events: Arc::new(EventBus::new()),
            acceptor: None,
        }
    }

    /// Replaces the timer used by sessions for handshake polling and pings.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    fn registry_mut(&mut self) -> Result<&mut Registry> {
        if self.frozen.is_some() {
            return Err(Error::RegistryFrozen);
        }
        Ok(&mut self.registry)
    }

    pub fn add_tool(&mut self, tool: ToolDefinition) -> Result<&mut Self> {
        self.registry_mut()?.add_tool(tool);
        Ok(self)
    }

    pub fn add_resource(&mut self, resource: ResourceDefinition) -> Result<&mut Self> {
        self.registry_mut()?.add_resource(resource);
        Ok(self)
    }

    pub fn add_resource_template(
        &mut self,
        template: ResourceTemplateDefinition,
    ) -> Result<&mut Self> {
        self.registry_mut()?.add_resource_template(template);
        Ok(self)
    }

    pub fn add_prompt(&mut self, prompt: PromptDefinition) -> Result<&mut Self> {
        self.registry_mut()?.add_prompt(prompt);
        Ok(self)
    }

    /// Freezes the registry. Fails if the server was already started.
    fn freeze(&mut self) -> Result<Shared> {
        if self.frozen.is_some() {
            return Err(Error::AlreadyStarted);
        }
        let registry = Arc::new(std::mem::take(&mut self.registry));
        self.frozen = Some(Arc::clone(&registry));
        Ok(Shared {
            registry,
            options: Arc::clone(&self.options),
            sleeper: Arc::clone(&self.sleeper),
            sessions: Arc::clone(&self.sessions),
            events: Arc::clone(&self.events),
        })
    }

    /// Serves exactly one client over `adapter` (typically stdio).
    ///
    /// Returns once the handshake completes. Closing the returned session, or
    /// the client hanging up, fires a disconnect event like in multi mode.
    pub async fn start_single<A>(&mut self, adapter: A) -> Result<Session>
    where
        A: NetworkAdapter + 'static,
    {
        let shared = self.freeze()?;
        info!(server = %self.options.name, "Starting single-session server");
        shared.establish(adapter).await
    }

    /// Accepts connections from `listener` in the background, one session
    /// per connection. Each handshake runs on its own task, so a slow client
    /// never delays the others.
    pub fn start_multi<L: Listener>(&mut self, mut listener: L) -> Result<()> {
        let shared = self.freeze()?;
        info!(server = %self.options.name, "Starting multi-session server");
        let acceptor = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok(Some(adapter)) => {
                        let shared = shared.clone();
                        tokio::spawn(async move {
                            if let Err(e) = shared.establish(adapter).await {
                                warn!(error = %e, "Failed to establish session");
                            }
                        });
                    }
                    Ok(None) => {
                        info!("Listener closed; no more connections");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        break;
                    }
                }
            }
        });
        self.acceptor = Some(acceptor);
        Ok(())
    }

    /// Stops accepting new connections. Established sessions keep running
    /// until they close.
    pub fn stop(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
            info!(server = %self.options.name, "Stopped accepting connections");
        }
    }

    /// Snapshot of the currently active sessions.
    pub fn sessions(&self) -> Vec<Session> {
        lock(&self.sessions).clone()
    }

    pub fn subscribe(&self) -> EventStream<ServerEvent> {
        self.events.subscribe()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::server::ToolContext;
    use serde_json::Value;

    fn echo() -> ToolDefinition {
        ToolDefinition::new("echo", |args: Value, _ctx: ToolContext| async move {
            Ok::<_, ToolError>(args.to_string())
        })
    }

    #[test]
    fn registration_is_chainable() {
        let mut server = Server::new(ServerOptions::new("test-server", "0.0.0"));
        server
            .add_tool(echo())
            .unwrap()
            .add_prompt(PromptDefinition::new("p", |_args| async {
                Ok::<_, crate::BoxError>("hello")
            }))
            .unwrap();

        assert_eq!(server.registry.tools.len(), 1);
        assert_eq!(server.registry.prompts.len(), 1);
        assert!(server.sessions().is_empty());
    }

    #[tokio::test]
    async fn registry_is_frozen_once_started() {
        let mut server = Server::new(ServerOptions::new("test-server", "0.0.0"));
        server.add_tool(echo()).unwrap();

        let endpoint = crate::network_adapter::TcpEndpoint::bind("127.0.0.1:0")
            .await
            .unwrap();
        server.start_multi(endpoint).unwrap();

        assert!(matches!(server.add_tool(echo()), Err(Error::RegistryFrozen)));
        let again = crate::network_adapter::TcpEndpoint::bind("127.0.0.1:0")
            .await
            .unwrap();
        assert!(matches!(server.start_multi(again), Err(Error::AlreadyStarted)));
        server.stop();
    }
}
