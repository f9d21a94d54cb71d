//! Tools served by a separately running tool provider server.

use super::traits::{Tool, ToolDescriptor};
use crate::types::ToolResult;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, error};

/// Forwards calls to `GET <endpoint>?<args>` and relays the JSON answer.
pub struct RemoteTool {
    descriptor: ToolDescriptor,
    endpoint: String,
    http: reqwest::Client,
}

impl RemoteTool {
    pub fn new(descriptor: ToolDescriptor, endpoint: &str, http: reqwest::Client) -> Self {
        Self {
            descriptor,
            endpoint: endpoint.to_string(),
            http,
        }
    }

    /// Error payload echoing the call's arguments for context.
    fn failure(message: String, args: &Map<String, Value>) -> ToolResult {
        args.iter().fold(ToolResult::error(message), |acc, (k, v)| {
            if k == "error" {
                acc
            } else {
                acc.with_context(k.clone(), v.clone())
            }
        })
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn descriptor(&self) -> ToolDescriptor {
        self.descriptor.clone()
    }

    async fn call(&self, args: Map<String, Value>) -> ToolResult {
        let params: Vec<(String, String)> = args
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), query_value(v)))
            .collect();

        debug!("Remote tool '{}' -> {}", self.descriptor.name, self.endpoint);

        let resp = match self.http.get(&self.endpoint).query(&params).send().await {
            Ok(resp) => resp,
            Err(e) => {
                error!("Tool server request for '{}' failed: {}", self.descriptor.name, e);
                return Self::failure(
                    format!("{} request to tool server failed: {e}", self.descriptor.name),
                    &args,
                );
            }
        };

        let status = resp.status();
        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => {
                return Self::failure(format!("failed to read tool server response: {e}"), &args)
            }
        };
        let body: Option<Value> = serde_json::from_str(&text).ok();

        match body {
            Some(Value::Object(map)) if status.is_success() || map.contains_key("error") => {
                ToolResult::success(Value::Object(map))
            }
            _ if !status.is_success() => Self::failure(
                format!("tool server returned status {}", status.as_u16()),
                &args,
            )
            .with_context("details", Value::String(text)),
            _ => Self::failure("tool server returned a non-object body".into(), &args)
                .with_context("details", Value::String(text)),
        }
    }
}
