//! Capability definitions and the registry that holds them.
//!
//! A definition pairs the metadata advertised to clients with the async
//! handler that serves it. Handlers are stored type-erased behind `Arc<dyn Fn>`
//! so the registry can be shared read-only by every session.

use super::context::ToolContext;
use super::BoxedFuture;
use crate::error::{BoxError, ToolError};
use crate::schema::{ParameterSchema, ToolArgumentsDescriptor, TypedSchema};
use crate::types::{
    CallToolResult, Completion, Content, EmptyResult, ListChangedCapability, Prompt,
    PromptArgument, Resource, ResourceTemplate, ServerCapabilities, Tool, ToolAnnotations,
};
use crate::uri_template::{UriTemplate, UriTemplateError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

pub(crate) type ToolHandler =
    Arc<dyn Fn(Value, ToolContext) -> BoxedFuture<Result<ToolOutput, ToolError>> + Send + Sync>;
pub(crate) type ResourceLoader =
    Arc<dyn Fn() -> BoxedFuture<Result<LoadedResource, BoxError>> + Send + Sync>;
pub(crate) type TemplateLoader = Arc<
    dyn Fn(HashMap<String, String>) -> BoxedFuture<Result<LoadedResource, BoxError>> + Send + Sync,
>;
pub(crate) type PromptLoader =
    Arc<dyn Fn(HashMap<String, String>) -> BoxedFuture<Result<String, BoxError>> + Send + Sync>;
pub(crate) type Completer =
    Arc<dyn Fn(String) -> BoxedFuture<Result<Completion, BoxError>> + Send + Sync>;

// --- Tools ---

/// What a tool's `execute` may return. Normalized into a [`CallToolResult`]
/// before it goes on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Content(Content),
    Result(CallToolResult),
    /// Arbitrary JSON: a string, a content object (has `"type"`), or a
    /// complete result envelope.
    Json(Value),
}

impl ToolOutput {
    pub(crate) fn normalize(self) -> Result<CallToolResult, ToolError> {
        match self {
            ToolOutput::Text(text) => Ok(CallToolResult::text(text)),
            ToolOutput::Content(content) => Ok(CallToolResult {
                content: vec![content],
                is_error: false,
            }),
            ToolOutput::Result(result) => Ok(result),
            ToolOutput::Json(Value::String(text)) => Ok(CallToolResult::text(text)),
            ToolOutput::Json(value) if value.get("type").is_some() => {
                let content: Content = serde_json::from_value(value)?;
                Ok(CallToolResult {
                    content: vec![content],
                    is_error: false,
                })
            }
            ToolOutput::Json(value) => Ok(serde_json::from_value(value)?),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        ToolOutput::Text(text.to_string())
    }
}

impl From<Content> for ToolOutput {
    fn from(content: Content) -> Self {
        ToolOutput::Content(content)
    }
}

impl From<CallToolResult> for ToolOutput {
    fn from(result: CallToolResult) -> Self {
        ToolOutput::Result(result)
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        ToolOutput::Json(value)
    }
}

/// A named, invocable operation.
///
/// ```rust
/// use mcp_session::server::{ToolContext, ToolDefinition};
/// use mcp_session::{ToolArguments, ToolError};
/// use serde::Deserialize;
///
/// #[derive(ToolArguments, Deserialize)]
/// struct AddArgs {
///     a: f64,
///     b: f64,
/// }
///
/// let add = ToolDefinition::typed("add", |args: AddArgs, _ctx: ToolContext| async move {
///     Ok::<_, ToolError>((args.a + args.b).to_string())
/// })
/// .with_description("Add two numbers");
/// assert_eq!(add.name(), "add");
/// ```
#[derive(Clone)]
pub struct ToolDefinition {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) parameters: Option<Arc<dyn ParameterSchema>>,
    pub(crate) annotations: Option<ToolAnnotations>,
    pub(crate) execute: ToolHandler,
}

impl ToolDefinition {
    /// A tool receiving its arguments as raw JSON. Without a parameter schema
    /// the arguments are passed through unvalidated.
    pub fn new<F, Fut, O>(name: impl Into<String>, execute: F) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ToolError>> + Send + 'static,
        O: Into<ToolOutput>,
    {
        Self {
            name: name.into(),
            description: None,
            parameters: None,
            annotations: None,
            execute: Arc::new(
                move |args: Value, ctx: ToolContext| -> BoxedFuture<Result<ToolOutput, ToolError>> {
                    let fut = execute(args, ctx);
                    Box::pin(async move { fut.await.map(Into::into) })
                },
            ),
        }
    }

    /// A tool whose arguments are a struct deriving `ToolArguments` and
    /// `Deserialize`. The struct doubles as the tool's parameter schema.
    pub fn typed<Args, F, Fut, O>(name: impl Into<String>, execute: F) -> Self
    where
        Args: ToolArgumentsDescriptor + DeserializeOwned + Send + 'static,
        F: Fn(Args, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ToolError>> + Send + 'static,
        O: Into<ToolOutput>,
    {
        let execute = Arc::new(execute);
        let mut tool = Self::new(name, move |args: Value, ctx: ToolContext| {
            let execute = Arc::clone(&execute);
            async move {
                let typed: Args = serde_json::from_value(args)?;
                execute(typed, ctx).await
            }
        });
        tool.parameters = Some(Arc::new(TypedSchema::<Args>::new()));
        tool
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parameters(mut self, schema: impl ParameterSchema + 'static) -> Self {
        self.parameters = Some(Arc::new(schema));
        self
    }

    pub fn with_annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = Some(annotations);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn describe(&self) -> Tool {
        Tool {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.parameters.as_ref().map(|schema| schema.describe()),
            annotations: self.annotations.clone(),
        }
    }
}

// --- Arguments ---

/// A named argument of a prompt or resource template, with optional
/// completion support.
#[derive(Clone)]
pub struct ArgumentDefinition {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) required: bool,
    pub(crate) enum_values: Option<Vec<String>>,
    pub(crate) complete: Option<Completer>,
}

impl ArgumentDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            required: false,
            enum_values: None,
            complete: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restricts completion suggestions to a fixed set of values.
    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Supplies suggestions from a callback. Takes precedence over `with_enum`.
    pub fn with_completer<F, Fut>(mut self, complete: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Completion, BoxError>> + Send + 'static,
    {
        self.complete = Some(Arc::new(
            move |value: String| -> BoxedFuture<Result<Completion, BoxError>> {
                Box::pin(complete(value))
            },
        ));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> PromptArgument {
        PromptArgument {
            name: self.name.clone(),
            description: self.description.clone(),
            required: Some(self.required),
        }
    }
}

// --- Resources ---

/// One piece of resource content.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourcePayload {
    Text(String),
    /// Base64-encoded binary data.
    Blob(String),
}

/// What a resource loader returns: one payload or several.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedResource {
    Single(ResourcePayload),
    Multiple(Vec<ResourcePayload>),
}

impl LoadedResource {
    pub(crate) fn into_payloads(self) -> Vec<ResourcePayload> {
        match self {
            LoadedResource::Single(payload) => vec![payload],
            LoadedResource::Multiple(payloads) => payloads,
        }
    }
}

impl From<ResourcePayload> for LoadedResource {
    fn from(payload: ResourcePayload) -> Self {
        LoadedResource::Single(payload)
    }
}

impl From<Vec<ResourcePayload>> for LoadedResource {
    fn from(payloads: Vec<ResourcePayload>) -> Self {
        LoadedResource::Multiple(payloads)
    }
}

impl From<String> for LoadedResource {
    fn from(text: String) -> Self {
        LoadedResource::Single(ResourcePayload::Text(text))
    }
}

impl From<&str> for LoadedResource {
    fn from(text: &str) -> Self {
        LoadedResource::Single(ResourcePayload::Text(text.to_string()))
    }
}

/// A resource with a fixed URI.
#[derive(Clone)]
pub struct ResourceDefinition {
    pub(crate) uri: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) mime_type: Option<String>,
    pub(crate) load: ResourceLoader,
}

impl ResourceDefinition {
    pub fn new<F, Fut, O>(uri: impl Into<String>, name: impl Into<String>, load: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, BoxError>> + Send + 'static,
        O: Into<LoadedResource>,
    {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
            load: Arc::new(move || -> BoxedFuture<Result<LoadedResource, BoxError>> {
                let fut = load();
                Box::pin(async move { fut.await.map(Into::into) })
            }),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub(crate) fn describe(&self) -> Resource {
        Resource {
            uri: self.uri.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

/// A family of resources addressed through a URI template.
#[derive(Clone)]
pub struct ResourceTemplateDefinition {
    pub(crate) template: UriTemplate,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) mime_type: Option<String>,
    pub(crate) arguments: Vec<ArgumentDefinition>,
    pub(crate) load: TemplateLoader,
}

impl ResourceTemplateDefinition {
    /// Fails if `uri_template` is not a supported template.
    pub fn new<F, Fut, O>(
        uri_template: &str,
        name: impl Into<String>,
        load: F,
    ) -> Result<Self, UriTemplateError>
    where
        F: Fn(HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, BoxError>> + Send + 'static,
        O: Into<LoadedResource>,
    {
        Ok(Self {
            template: UriTemplate::parse(uri_template)?,
            name: name.into(),
            description: None,
            mime_type: None,
            arguments: Vec::new(),
            load: Arc::new(
                move |fields| -> BoxedFuture<Result<LoadedResource, BoxError>> {
                    let fut = load(fields);
                    Box::pin(async move { fut.await.map(Into::into) })
                },
            ),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Declares completion behaviour for one of the template's variables.
    pub fn with_argument(mut self, argument: ArgumentDefinition) -> Self {
        self.arguments.push(argument);
        self
    }

    pub(crate) fn describe(&self) -> ResourceTemplate {
        ResourceTemplate {
            uri_template: self.template.as_str().to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            arguments: describe_arguments(&self.arguments),
        }
    }
}

fn describe_arguments(arguments: &[ArgumentDefinition]) -> Option<Vec<PromptArgument>> {
    if arguments.is_empty() {
        None
    } else {
        Some(arguments.iter().map(ArgumentDefinition::describe).collect())
    }
}

// --- Prompts ---

/// A named message template rendered into a single user message.
#[derive(Clone)]
pub struct PromptDefinition {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) arguments: Vec<ArgumentDefinition>,
    pub(crate) load: PromptLoader,
}

impl PromptDefinition {
    pub fn new<F, Fut, S>(name: impl Into<String>, load: F) -> Self
    where
        F: Fn(HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, BoxError>> + Send + 'static,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            description: None,
            arguments: Vec::new(),
            load: Arc::new(move |args| -> BoxedFuture<Result<String, BoxError>> {
                let fut = load(args);
                Box::pin(async move { fut.await.map(Into::into) })
            }),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_argument(mut self, argument: ArgumentDefinition) -> Self {
        self.arguments.push(argument);
        self
    }

    pub(crate) fn describe(&self) -> Prompt {
        Prompt {
            name: self.name.clone(),
            description: self.description.clone(),
            arguments: describe_arguments(&self.arguments),
        }
    }
}

// --- Registry ---

/// Everything a server exposes. Lookups are by exact key, first match wins.
#[derive(Clone, Default)]
pub struct Registry {
    pub(crate) tools: Vec<ToolDefinition>,
    pub(crate) resources: Vec<ResourceDefinition>,
    pub(crate) templates: Vec<ResourceTemplateDefinition>,
    pub(crate) prompts: Vec<PromptDefinition>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tool(&mut self, tool: ToolDefinition) -> &mut Self {
        self.tools.push(tool);
        self
    }

    pub fn add_resource(&mut self, resource: ResourceDefinition) -> &mut Self {
        self.resources.push(resource);
        self
    }

    pub fn add_resource_template(&mut self, template: ResourceTemplateDefinition) -> &mut Self {
        self.templates.push(template);
        self
    }

    pub fn add_prompt(&mut self, prompt: PromptDefinition) -> &mut Self {
        self.prompts.push(prompt);
        self
    }

    pub(crate) fn find_tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub(crate) fn find_resource(&self, uri: &str) -> Option<&ResourceDefinition> {
        self.resources.iter().find(|r| r.uri == uri)
    }

    /// First template whose pattern matches `uri`, with the extracted fields.
    pub(crate) fn match_template(
        &self,
        uri: &str,
    ) -> Option<(&ResourceTemplateDefinition, HashMap<String, String>)> {
        self.templates
            .iter()
            .find_map(|t| t.template.match_uri(uri).map(|fields| (t, fields)))
    }

    /// Template looked up by its pattern string, as completion references do.
    pub(crate) fn find_template(&self, uri_template: &str) -> Option<&ResourceTemplateDefinition> {
        self.templates
            .iter()
            .find(|t| t.template.as_str() == uri_template)
    }

    pub(crate) fn find_prompt(&self, name: &str) -> Option<&PromptDefinition> {
        self.prompts.iter().find(|p| p.name == name)
    }

    /// Capabilities advertised in the `initialize` response.
    pub(crate) fn capabilities(&self) -> ServerCapabilities {
        let has_resources = !self.resources.is_empty() || !self.templates.is_empty();
        ServerCapabilities {
            tools: (!self.tools.is_empty()).then(ListChangedCapability::default),
            resources: has_resources.then(ListChangedCapability::default),
            prompts: (!self.prompts.is_empty()).then(ListChangedCapability::default),
            logging: Some(EmptyResult {}),
            completions: (!self.prompts.is_empty() || !self.templates.is_empty())
                .then_some(EmptyResult {}),
        }
    }
}
