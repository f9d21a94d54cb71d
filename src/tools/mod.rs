//! Tool registry: advertises tools to the model and dispatches its calls.

pub mod builtin;
pub mod remote;
pub mod traits;

pub use builtin::{NewsTool, WeatherTool};
pub use remote::RemoteTool;
pub use traits::{ParamSpec, ParamType, Tool, ToolDescriptor};

use crate::config::{NewsbriefConfig, ToolMode};
use crate::providers::{NewsSource, WeatherSource};
use crate::types::{ToolCallRequest, ToolResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: Arc<dyn Tool>,
}

/// Ordered collection of tools keyed by unique name.
///
/// Built once at startup and shared behind an `Arc`.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Returns `false` (and changes nothing) if the name is taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> bool {
        let descriptor = tool.descriptor();
        if self.get(&descriptor.name).is_some() {
            debug!("Tool '{}' already registered, skipping", descriptor.name);
            return false;
        }
        debug!("Registered tool '{}'", descriptor.name);
        self.entries.push(RegisteredTool {
            descriptor,
            handler: tool,
        });
        true
    }

    /// Descriptors in registration order.
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        self.entries.iter().map(|e| &e.descriptor).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.descriptor.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.entries.iter().find(|e| e.descriptor.name == name)
    }

    /// Execute a model-issued call. Never fails; problems come back as `{error}`.
    pub async fn dispatch(&self, call: &ToolCallRequest) -> ToolResult {
        let Some(entry) = self.get(&call.name) else {
            warn!("Model requested unknown tool '{}'", call.name);
            return ToolResult::error(format!("unknown function: {}", call.name));
        };

        let args = match call.arguments.decode() {
            Ok(args) => args,
            Err(e) => {
                warn!("Could not decode arguments for '{}': {}", call.name, e);
                return ToolResult::error(format!("argument parse failure: {e}"));
            }
        };

        info!("Dispatching tool '{}'", call.name);
        let result = entry.handler.call(args).await;
        if let Some(message) = result.error_message() {
            warn!("Tool '{}' returned an error: {}", call.name, message);
        }
        result
    }
}

/// Build the registry for the configured execution mode.
pub fn build_registry(
    config: &NewsbriefConfig,
    news: Arc<NewsSource>,
    weather: Arc<WeatherSource>,
) -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    match config.tools.mode {
        ToolMode::Local => {
            register_local(&mut registry, news, weather);
        }
        ToolMode::Remote => {
            let http = crate::providers::http_client(config.request_timeout())?;
            registry.register(Arc::new(RemoteTool::new(
                builtin::news_descriptor(),
                &config.tools.news_server_url,
                http.clone(),
            )));
            registry.register(Arc::new(RemoteTool::new(
                builtin::weather_descriptor(),
                &config.tools.weather_server_url,
                http,
            )));
        }
    }
    info!("Tool registry ready: {:?}", registry.names());
    Ok(registry)
}

/// Registry of the in-process tools, regardless of configured mode.
pub fn local_registry(news: Arc<NewsSource>, weather: Arc<WeatherSource>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_local(&mut registry, news, weather);
    registry
}

fn register_local(registry: &mut ToolRegistry, news: Arc<NewsSource>, weather: Arc<WeatherSource>) {
    registry.register(Arc::new(NewsTool::new(news)));
    registry.register(Arc::new(WeatherTool::new(weather)));
}
