//! In-process tools backed directly by the upstream sources.

use super::traits::{ParamSpec, ParamType, Tool, ToolDescriptor};
use crate::providers::{NewsSource, WeatherSource};
use crate::types::ToolResult;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub fn news_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: "news".into(),
        description: "Fetch the latest Bitcoin news headlines. Returns the list of titles \
                      and their count."
            .into(),
        parameters: Vec::new(),
    }
}

pub fn weather_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: "weather".into(),
        description: "Get current weather for geographic coordinates. Returns temperature, \
                      condition, wind speed and humidity."
            .into(),
        parameters: vec![
            ParamSpec::required(
                "latitude",
                ParamType::Number,
                "Latitude in degrees (-90 to 90)",
            ),
            ParamSpec::required(
                "longitude",
                ParamType::Number,
                "Longitude in degrees (-180 to 180)",
            ),
        ],
    }
}

/// Headlines tool.
pub struct NewsTool {
    source: Arc<NewsSource>,
}

impl NewsTool {
    pub fn new(source: Arc<NewsSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Tool for NewsTool {
    fn descriptor(&self) -> ToolDescriptor {
        news_descriptor()
    }

    async fn call(&self, _args: Map<String, Value>) -> ToolResult {
        match self.source.fetch_titles().await {
            Ok(digest) => match serde_json::to_value(&digest) {
                Ok(value) => ToolResult::success(value),
                Err(e) => ToolResult::error(format!("failed to encode headlines: {e}")),
            },
            Err(e) => e.into_tool_result(),
        }
    }
}

/// Weather tool.
pub struct WeatherTool {
    source: Arc<WeatherSource>,
}

impl WeatherTool {
    pub fn new(source: Arc<WeatherSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn descriptor(&self) -> ToolDescriptor {
        weather_descriptor()
    }

    async fn call(&self, args: Map<String, Value>) -> ToolResult {
        let report = self
            .source
            .report(args.get("latitude"), args.get("longitude"))
            .await;
        match report {
            Ok(report) => match serde_json::to_value(&report) {
                Ok(value) => ToolResult::success(value),
                Err(e) => ToolResult::error(format!("failed to encode weather: {e}")),
            },
            Err(e) => e.into_tool_result(),
        }
    }
}
