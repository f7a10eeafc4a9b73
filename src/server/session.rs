//! Defines the `Session`, which runs the protocol state machine for a single client connection.
//!
//! A session moves through `Disconnected -> Handshaking -> Active -> Closed`.
//! Once a transport is attached, a background loop owns the connection: it
//! reads frames, answers requests (each on its own task, so a slow tool never
//! blocks other traffic) and writes everything queued on the outgoing channel.
//! The public `Session` is a cheap handle onto that shared state.

use super::completion::complete_argument;
use super::context::ToolContext;
use super::events::{EventBus, EventStream};
use super::options::{ServerOptions, Sleeper, TokioSleeper};
use super::registry::{Registry, ResourcePayload, ToolDefinition, ToolOutput};
use crate::error::{Error, ErrorData, Result, ToolError};
use crate::network_adapter::NetworkAdapter;
use crate::protocol::{IncomingMessage, ProtocolConnection};
use crate::types::{
    methods, CallToolParams, CallToolResult, ClientCapabilities, CompleteParams, CompleteResult,
    CompletionReference, Content, EmptyResult, ErrorResponse, GetPromptParams, GetPromptResult,
    Implementation, InitializeRequestParams, InitializeResult, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListRootsResult, ListToolsResult,
    LoggingLevel, Notification, PromptMessage, ReadResourceParams, ReadResourceResult, Request,
    RequestId, ResourceBody, ResourceContents, Response, Role, Root, SetLevelParams,
    LATEST_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Handshaking,
    Active,
    Closed,
}

/// Notifications a session publishes to its subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The client announced a roots change and the refreshed list arrived.
    RootsChanged(Vec<Root>),
    /// A background operation failed (keep-alive ping, roots refresh,
    /// transport I/O). The session itself keeps running unless it closed.
    Error(Arc<Error>),
}

type PendingReply = oneshot::Sender<std::result::Result<Value, ErrorData>>;

/// What the client told us in `initialize`.
#[derive(Debug, Clone)]
struct ClientHandshake {
    protocol_version: String,
    capabilities: ClientCapabilities,
    info: Implementation,
}

#[derive(Default)]
struct Tasks {
    run_loop: Option<JoinHandle<()>>,
    keepalive: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

struct Inner {
    id: u64,
    registry: Arc<Registry>,
    options: Arc<ServerOptions>,
    sleeper: Arc<dyn Sleeper>,
    state: watch::Sender<SessionState>,
    outgoing: mpsc::UnboundedSender<String>,
    outgoing_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    client: RwLock<Option<ClientHandshake>>,
    logging_level: RwLock<LoggingLevel>,
    roots: RwLock<Vec<Root>>,
    pending: DashMap<RequestId, PendingReply>,
    next_request_id: AtomicI64,
    tasks: Mutex<Tasks>,
    events: EventBus<SessionEvent>,
}

/// One client connection.
///
/// Clones share the same underlying session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    pub fn new(registry: Arc<Registry>, options: Arc<ServerOptions>) -> Self {
        Self::with_sleeper(registry, options, Arc::new(TokioSleeper))
    }

    /// Like [`Session::new`], with a custom source of handshake and
    /// keep-alive delays.
    pub fn with_sleeper(
        registry: Arc<Registry>,
        options: Arc<ServerOptions>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                registry,
                options,
                sleeper,
                state,
                outgoing,
                outgoing_rx: Mutex::new(Some(outgoing_rx)),
                client: RwLock::new(None),
                logging_level: RwLock::new(LoggingLevel::default()),
                roots: RwLock::new(Vec::new()),
                pending: DashMap::new(),
                next_request_id: AtomicI64::new(1),
                tasks: Mutex::new(Tasks::default()),
                events: EventBus::new(),
            }),
        }
    }

    /// Process-unique identifier, stable for the session's lifetime.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> EventStream<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// The level last requested through `logging/setLevel`. Defaults to `info`.
    pub fn logging_level(&self) -> LoggingLevel {
        *self
            .inner
            .logging_level
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_logging_level(&self, level: LoggingLevel) {
        *self
            .inner
            .logging_level
            .write()
            .unwrap_or_else(PoisonError::into_inner) = level;
    }

    /// Roots most recently reported by the client.
    pub fn roots(&self) -> Vec<Root> {
        self.inner
            .roots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.handshake().map(|h| h.capabilities)
    }

    pub fn client_info(&self) -> Option<Implementation> {
        self.handshake().map(|h| h.info)
    }

    /// The protocol version agreed during `initialize`.
    pub fn protocol_version(&self) -> Option<String> {
        self.handshake().map(|h| h.protocol_version)
    }

    fn handshake(&self) -> Option<ClientHandshake> {
        self.inner
            .client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_initialized(&self) -> bool {
        self.inner
            .client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Attaches a transport and runs the handshake.
    ///
    /// Resolves once the client has sent `initialize`, the initial roots are
    /// fetched (if the client supports roots) and keep-alive pinging has
    /// started. If the client never initializes within the configured
    /// attempts the session is closed and `Error::Handshake` returned.
    pub async fn connect<A>(&self, adapter: A) -> Result<()>
    where
        A: NetworkAdapter + 'static,
    {
        let mut current = SessionState::Disconnected;
        let accepted = self.inner.state.send_if_modified(|state| {
            current = *state;
            if *state == SessionState::Disconnected {
                *state = SessionState::Handshaking;
                true
            } else {
                false
            }
        });
        if !accepted {
            return Err(match current {
                SessionState::Closed => Error::SessionClosed,
                _ => Error::AlreadyConnected,
            });
        }

        let outgoing = lock(&self.inner.outgoing_rx)
            .take()
            .ok_or(Error::AlreadyConnected)?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let run_loop = tokio::spawn(run_loop(
            self.clone(),
            ProtocolConnection::new(adapter),
            outgoing,
            shutdown_rx,
        ));
        {
            let mut tasks = lock(&self.inner.tasks);
            tasks.run_loop = Some(run_loop);
            tasks.shutdown = Some(shutdown_tx);
        }
        debug!(session = self.id(), "Transport attached, waiting for initialize");

        if let Err(e) = self.await_handshake().await {
            warn!(session = self.id(), error = %e, "Handshake failed");
            self.close().await?;
            return Err(e);
        }

        let wants_roots = self
            .client_capabilities()
            .map_or(false, |caps| caps.roots.is_some());
        if wants_roots {
            match self.refresh_roots().await {
                Ok(roots) => {
                    debug!(session = self.id(), count = roots.len(), "Fetched client roots")
                }
                Err(e) => {
                    warn!(session = self.id(), error = %e, "Failed to fetch client roots");
                    self.emit_error(e);
                }
            }
        }

        let activated = self.inner.state.send_if_modified(|state| {
            if *state == SessionState::Handshaking {
                *state = SessionState::Active;
                true
            } else {
                false
            }
        });
        if !activated {
            return Err(Error::SessionClosed);
        }
        if let Some(interval) = self.inner.options.ping_interval() {
            self.start_keepalive(interval);
        }
        info!(
            session = self.id(),
            client = ?self.client_info().map(|c| c.name),
            "Session active"
        );
        Ok(())
    }

    async fn await_handshake(&self) -> Result<()> {
        let policy = self.inner.options.handshake_policy();
        for attempt in 1..=policy.max_attempts {
            if self.is_initialized() {
                return Ok(());
            }
            if self.state() == SessionState::Closed {
                return Err(Error::Handshake(
                    "transport closed before the client initialized".to_string(),
                ));
            }
            debug!(session = self.id(), attempt, "Client capabilities not yet received");
            self.inner.sleeper.sleep(policy.interval).await;
        }
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::Handshake(format!(
                "client did not initialize after {} attempts",
                policy.max_attempts
            )))
        }
    }

    /// Stops background work and closes the transport. Idempotent.
    pub async fn close(&self) -> Result<()> {
        let (run_loop, shutdown, keepalive) = {
            let mut tasks = lock(&self.inner.tasks);
            (
                tasks.run_loop.take(),
                tasks.shutdown.take(),
                tasks.keepalive.take(),
            )
        };
        if let Some(keepalive) = keepalive {
            keepalive.abort();
        }

        match run_loop {
            Some(handle) => {
                if let Some(shutdown) = shutdown {
                    let _ = shutdown.send(());
                }
                if let Err(e) = handle.await {
                    if e.is_panic() {
                        error!(session = self.id(), "Session loop panicked");
                    }
                    self.finish();
                }
            }
            None if self.state() == SessionState::Disconnected => self.finish(),
            // Another caller is already closing, or the loop has ended.
            None => self.wait_closed().await,
        }
        Ok(())
    }

    /// Resolves once the session reaches `Closed`.
    pub async fn wait_closed(&self) {
        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(|s| *s == SessionState::Closed).await;
    }

    /// Terminal transition; run exactly when the loop ends or a never
    /// connected session is closed.
    fn finish(&self) {
        if let Some(keepalive) = lock(&self.inner.tasks).keepalive.take() {
            keepalive.abort();
        }
        lock(&self.inner.outgoing_rx).take();
        // Dropping the senders fails every outstanding server-initiated request.
        self.inner.pending.clear();
        let previous = self.inner.state.send_replace(SessionState::Closed);
        if previous != SessionState::Closed {
            info!(session = self.id(), "Session closed");
        }
    }

    fn start_keepalive(&self, interval: Duration) {
        let weak = Arc::downgrade(&self.inner);
        let sleeper = Arc::clone(&self.inner.sleeper);
        let handle = tokio::spawn(async move {
            loop {
                sleeper.sleep(interval).await;
                let Some(inner) = weak.upgrade() else { break };
                let session = Session { inner };
                if session.state() != SessionState::Active {
                    break;
                }
                if let Err(e) = session.ping().await {
                    if session.state() == SessionState::Active {
                        warn!(session = session.id(), error = %e, "Keep-alive ping failed");
                        session.emit_error(e);
                    }
                }
            }
        });
        lock(&self.inner.tasks).keepalive = Some(handle);
    }

    /// Sends a `ping` and waits for the acknowledgement.
    pub async fn ping(&self) -> Result<()> {
        self.request::<Value>(methods::PING, json!({})).await?;
        Ok(())
    }

    /// Asks the client for its roots and stores the answer.
    pub async fn refresh_roots(&self) -> Result<Vec<Root>> {
        let result: ListRootsResult = self.request(methods::ROOTS_LIST, json!({})).await?;
        *self
            .inner
            .roots
            .write()
            .unwrap_or_else(PoisonError::into_inner) = result.roots.clone();
        Ok(result.roots)
    }

    fn emit_error(&self, error: Error) {
        self.inner.events.emit(SessionEvent::Error(Arc::new(error)));
    }

    // --- Outgoing traffic ---

    /// Queues a notification for the client.
    pub(crate) fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
        let frame = serde_json::to_string(&Notification::new(method, params))?;
        self.inner.outgoing.send(frame)?;
        Ok(())
    }

    /// Sends a server-initiated request and waits for the matching response.
    async fn request<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R> {
        if self.state() == SessionState::Closed {
            return Err(Error::SessionClosed);
        }
        let id = RequestId::Num(self.inner.next_request_id.fetch_add(1, Ordering::Relaxed));
        let frame = serde_json::to_string(&Request::new(id.clone(), method, params))?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(id.clone(), tx);
        if let Err(e) = self.inner.outgoing.send(frame) {
            self.inner.pending.remove(&id);
            return Err(e.into());
        }

        let outcome = match tokio::time::timeout(self.inner.options.request_timeout(), rx).await {
            Ok(received) => received?,
            Err(elapsed) => {
                self.inner.pending.remove(&id);
                return Err(elapsed.into());
            }
        };
        Ok(serde_json::from_value(outcome?)?)
    }

    fn respond(&self, id: RequestId, outcome: std::result::Result<Value, ErrorData>) {
        let frame = match outcome {
            Ok(result) => serde_json::to_string(&Response::new(id, result)),
            Err(error) => serde_json::to_string(&ErrorResponse::new(Some(id), error)),
        };
        self.queue(frame);
    }

    fn respond_without_id(&self, error: ErrorData) {
        self.queue(serde_json::to_string(&ErrorResponse::new(None, error)));
    }

    fn queue(&self, frame: serde_json::Result<String>) {
        match frame {
            Ok(frame) => {
                if self.inner.outgoing.send(frame).is_err() {
                    debug!(session = self.id(), "Session closed before a reply could be sent");
                }
            }
            Err(e) => error!(session = self.id(), error = %e, "Failed to serialize reply"),
        }
    }

    // --- Incoming traffic ---

    fn handle_frame(&self, frame: Value) {
        match IncomingMessage::parse(frame) {
            Ok(IncomingMessage::Request { id, method, params }) => {
                self.handle_request(id, method, params)
            }
            Ok(IncomingMessage::Notification { method, params }) => {
                self.handle_notification(&method, params)
            }
            Ok(IncomingMessage::Response { id, outcome }) => match self.inner.pending.remove(&id) {
                Some((_, reply)) => {
                    let _ = reply.send(outcome);
                }
                None => warn!(session = self.id(), id = ?id, "Response to unknown request"),
            },
            Err(error) => {
                warn!(session = self.id(), error = %error, "Discarding malformed message");
                self.respond_without_id(error);
            }
        }
    }

    fn handle_request(&self, id: RequestId, method: String, params: Value) {
        match method.as_str() {
            // Handled inline so nothing else can be dispatched before it.
            methods::INITIALIZE => match self.initialize(params) {
                Ok((handshake, result)) => {
                    self.respond(id, to_value(result));
                    *self
                        .inner
                        .client
                        .write()
                        .unwrap_or_else(PoisonError::into_inner) = Some(handshake);
                }
                Err(error) => self.respond(id, Err(error)),
            },
            methods::PING => self.respond(id, Ok(json!({}))),
            _ if !self.is_initialized() => self.respond(
                id,
                Err(ErrorData::invalid_request("Session not initialized")),
            ),
            _ => {
                let session = self.clone();
                tokio::spawn(async move {
                    debug!(session = session.id(), method = %method, "Dispatching request");
                    let uri = params
                        .get("uri")
                        .filter(|_| method == methods::RESOURCES_READ)
                        .cloned();
                    // Handlers run on their own task so a panicking loader
                    // still gets an answer.
                    let worker = session.clone();
                    let name = method.clone();
                    let handled =
                        tokio::spawn(async move { worker.dispatch(&name, params).await }).await;
                    let outcome = handled.unwrap_or_else(|e| {
                        error!(
                            session = session.id(),
                            method = %method,
                            error = %e,
                            "Request handler did not complete"
                        );
                        Err(match uri {
                            Some(uri) => {
                                ErrorData::internal_error(format!("Error reading resource: {}", e))
                                    .with_data(json!({ "uri": uri }))
                            }
                            None => ErrorData::internal_error(format!(
                                "Error handling {}: {}",
                                method, e
                            )),
                        })
                    });
                    session.respond(id, outcome);
                });
            }
        }
    }

    fn handle_notification(&self, method: &str, _params: Value) {
        match method {
            methods::NOTIFY_ROOTS_LIST_CHANGED => {
                let session = self.clone();
                tokio::spawn(async move {
                    match session.refresh_roots().await {
                        Ok(roots) => session.inner.events.emit(SessionEvent::RootsChanged(roots)),
                        Err(e) => {
                            warn!(session = session.id(), error = %e, "Failed to refresh roots");
                            session.emit_error(e);
                        }
                    }
                });
            }
            methods::NOTIFY_INITIALIZED | methods::NOTIFY_CANCELLED => {
                debug!(session = self.id(), method, "Notification received")
            }
            other => debug!(session = self.id(), method = other, "Ignoring unknown notification"),
        }
    }

    fn initialize(
        &self,
        params: Value,
    ) -> std::result::Result<(ClientHandshake, InitializeResult), ErrorData> {
        if self.is_initialized() {
            return Err(ErrorData::invalid_request("Session already initialized"));
        }
        let params: InitializeRequestParams = parse_params(params)?;
        let supported = SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str());
        let protocol_version = if supported {
            params.protocol_version
        } else {
            debug!(
                requested = %params.protocol_version,
                "Unsupported protocol version requested, offering latest"
            );
            LATEST_PROTOCOL_VERSION.to_string()
        };

        let options = &self.inner.options;
        let result = InitializeResult {
            protocol_version: protocol_version.clone(),
            capabilities: self.inner.registry.capabilities(),
            server_info: Implementation {
                name: options.name.clone(),
                version: options.version.clone(),
            },
            instructions: options.instructions.clone(),
        };
        let handshake = ClientHandshake {
            protocol_version,
            capabilities: params.capabilities,
            info: params.client_info,
        };
        Ok((handshake, result))
    }

    async fn dispatch(&self, method: &str, params: Value) -> std::result::Result<Value, ErrorData> {
        let registry = &self.inner.registry;
        match method {
            methods::TOOLS_LIST => to_value(ListToolsResult {
                tools: registry.tools.iter().map(ToolDefinition::describe).collect(),
            }),
            methods::TOOLS_CALL => to_value(self.call_tool(parse_params(params)?).await?),
            methods::RESOURCES_LIST => to_value(ListResourcesResult {
                resources: registry.resources.iter().map(|r| r.describe()).collect(),
            }),
            methods::RESOURCES_TEMPLATES_LIST => to_value(ListResourceTemplatesResult {
                resource_templates: registry.templates.iter().map(|t| t.describe()).collect(),
            }),
            methods::RESOURCES_READ => to_value(self.read_resource(parse_params(params)?).await?),
            methods::PROMPTS_LIST => to_value(ListPromptsResult {
                prompts: registry.prompts.iter().map(|p| p.describe()).collect(),
            }),
            methods::PROMPTS_GET => to_value(self.get_prompt(parse_params(params)?).await?),
            methods::COMPLETION_COMPLETE => to_value(self.complete(parse_params(params)?).await?),
            methods::LOGGING_SET_LEVEL => {
                let params: SetLevelParams = parse_params(params)?;
                self.set_logging_level(params.level);
                to_value(EmptyResult {})
            }
            other => Err(ErrorData::method_not_found(format!(
                "Method '{}' not found",
                other
            ))),
        }
    }

    async fn call_tool(
        &self,
        params: CallToolParams,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let name = params.name;
        let tool = self
            .inner
            .registry
            .find_tool(&name)
            .ok_or_else(|| ErrorData::method_not_found(format!("Unknown tool: {}", name)))?;

        let arguments = params.arguments.unwrap_or_else(|| json!({}));
        let arguments = match &tool.parameters {
            Some(schema) => schema.validate(&arguments).map_err(|errors| {
                debug!(tool = %name, ?errors, "Tool arguments failed validation");
                ErrorData::invalid_params(format!("Invalid {} parameters", name))
                    .with_data(json!({ "errors": errors }))
            })?,
            None => arguments,
        };

        let progress_token = params.meta.and_then(|meta| meta.progress_token);
        let ctx = ToolContext::new(self.clone(), progress_token);
        // Run on its own task so a panicking tool still gets an answer.
        let outcome = match tokio::spawn((tool.execute)(arguments, ctx)).await {
            Ok(result) => result.and_then(ToolOutput::normalize),
            Err(e) => Err(ToolError::msg(format!("tool '{}' did not complete: {}", name, e))),
        };

        Ok(match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!(session = self.id(), tool = %name, error = %e, "Tool execution failed");
                CallToolResult::error(e.render())
            }
        })
    }

    async fn read_resource(
        &self,
        params: ReadResourceParams,
    ) -> std::result::Result<ReadResourceResult, ErrorData> {
        let uri = params.uri;
        let registry = &self.inner.registry;

        let (loaded, contents_uri, name, mime_type) =
            if let Some(resource) = registry.find_resource(&uri) {
                let loaded = (resource.load)().await;
                (loaded, resource.uri.clone(), &resource.name, &resource.mime_type)
            } else if let Some((template, fields)) = registry.match_template(&uri) {
                let loaded = (template.load)(fields).await;
                (loaded, uri.clone(), &template.name, &template.mime_type)
            } else {
                return Err(ErrorData::method_not_found(format!("Unknown resource: {}", uri))
                    .with_data(json!({ "uri": uri })));
            };

        let loaded = loaded.map_err(|e| {
            error!(session = self.id(), uri = %uri, error = %e, "Resource loader failed");
            ErrorData::internal_error(format!("Error reading resource: {}", e))
                .with_data(json!({ "uri": uri }))
        })?;

        let contents = loaded
            .into_payloads()
            .into_iter()
            .map(|payload| ResourceContents {
                uri: contents_uri.clone(),
                name: name.clone(),
                mime_type: mime_type.clone(),
                body: match payload {
                    ResourcePayload::Text(text) => ResourceBody::Text { text },
                    ResourcePayload::Blob(blob) => ResourceBody::Blob { blob },
                },
            })
            .collect();
        Ok(ReadResourceResult { contents })
    }

    async fn get_prompt(
        &self,
        params: GetPromptParams,
    ) -> std::result::Result<GetPromptResult, ErrorData> {
        let prompt = self
            .inner
            .registry
            .find_prompt(&params.name)
            .ok_or_else(|| {
                ErrorData::method_not_found(format!("Unknown prompt: {}", params.name))
            })?;

        let arguments = params.arguments.unwrap_or_default();
        if let Some(missing) = prompt
            .arguments
            .iter()
            .find(|arg| arg.required && !arguments.contains_key(&arg.name))
        {
            return Err(ErrorData::invalid_params(format!(
                "Missing required argument: {}",
                missing.name
            )));
        }

        let text = (prompt.load)(arguments).await.map_err(|e| {
            error!(session = self.id(), prompt = %prompt.name, error = %e, "Prompt loader failed");
            ErrorData::internal_error(format!("Error loading prompt: {}", e))
        })?;

        Ok(GetPromptResult {
            description: prompt.description.clone(),
            messages: vec![PromptMessage {
                role: Role::User,
                content: Content::text(text),
            }],
        })
    }

    async fn complete(
        &self,
        params: CompleteParams,
    ) -> std::result::Result<CompleteResult, ErrorData> {
        let registry = &self.inner.registry;
        let arguments = match &params.reference {
            CompletionReference::Prompt { name } => &registry
                .find_prompt(name)
                .ok_or_else(|| ErrorData::method_not_found(format!("Unknown prompt: {}", name)))?
                .arguments,
            CompletionReference::Resource { uri } => &registry
                .find_template(uri)
                .ok_or_else(|| {
                    ErrorData::method_not_found(format!("Unknown resource template: {}", uri))
                })?
                .arguments,
        };
        let argument = arguments.iter().find(|a| a.name == params.argument.name);

        let completion = complete_argument(
            argument,
            &params.argument.value,
            self.inner.options.completion_page_size,
        )
        .await
        .map_err(|e| ErrorData::internal_error(format!("Error completing argument: {}", e)))?;
        Ok(CompleteResult { completion })
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> std::result::Result<T, ErrorData> {
    serde_json::from_value(params)
        .map_err(|e| ErrorData::invalid_params(format!("Invalid params: {}", e)))
}

fn to_value<T: Serialize>(result: T) -> std::result::Result<Value, ErrorData> {
    serde_json::to_value(result)
        .map_err(|e| ErrorData::internal_error(format!("Failed to serialize result: {}", e)))
}

/// Owns the connection for the lifetime of the session.
async fn run_loop<A: NetworkAdapter>(
    session: Session,
    mut conn: ProtocolConnection<A>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                // Flush what was queued before the close request.
                while let Ok(frame) = outgoing.try_recv() {
                    if conn.send_raw(&frame).await.is_err() {
                        break;
                    }
                }
                debug!(session = session.id(), "Session loop shutting down");
                break;
            }
            Some(frame) = outgoing.recv() => {
                if let Err(e) = conn.send_raw(&frame).await {
                    error!(session = session.id(), error = %e, "Failed to write to transport");
                    session.emit_error(e);
                    break;
                }
            }
            incoming = conn.recv_message::<Value>() => match incoming {
                Ok(Some(frame)) => session.handle_frame(frame),
                Ok(None) => {
                    info!(session = session.id(), "Client disconnected");
                    break;
                }
                Err(e @ (Error::Serialization(_) | Error::InvalidFrame(_))) => {
                    warn!(session = session.id(), error = %e, "Discarding unreadable frame");
                    session.respond_without_id(ErrorData::parse_error(format!(
                        "Parse error: {}",
                        e
                    )));
                }
                Err(e) => {
                    error!(session = session.id(), error = %e, "Failed to read from transport");
                    session.emit_error(e);
                    break;
                }
            }
        }
    }

    if let Err(e) = conn.close().await {
        debug!(session = session.id(), error = %e, "Error while closing transport");
    }
    session.finish();
}
