//! Shared types used across the newsbrief runtime.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ---------------------------------------------------------------------------
// Pipeline runs
// ---------------------------------------------------------------------------

/// Lifecycle of a single pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Stages are still executing.
    Running,
    /// Every stage finished and the digest was handed to the mailer.
    Succeeded,
    /// A stage failed; nothing after it ran.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl RunStatus {
    /// Parse the persisted form back into a status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Ordered stages of the digest pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    FetchNews,
    Summarize,
    Format,
    Deliver,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchNews => write!(f, "fetch_news"),
            Self::Summarize => write!(f, "summarize"),
            Self::Format => write!(f, "format"),
            Self::Deliver => write!(f, "deliver"),
        }
    }
}

/// A persisted pipeline run as shown by `newsbrief status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub status: RunStatus,
    pub stage: String,
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Conversation types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One turn of the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Tool name, set on tool-role messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Id of the call a tool-role message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls,
        }
    }

    /// Tool-role message carrying the JSON-encoded result of `call`.
    pub fn tool(call: &ToolCallRequest, result: &ToolResult) -> Self {
        Self {
            role: ChatRole::Tool,
            content: result.to_json_string(),
            name: Some(call.name.clone()),
            tool_call_id: call.id.clone(),
            tool_calls: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tool calling
// ---------------------------------------------------------------------------

/// Arguments exactly as the model sent them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawArguments {
    /// A JSON document still to be decoded.
    Encoded(String),
    /// An already-decoded object.
    Decoded(Map<String, Value>),
}

impl RawArguments {
    /// Decode into an argument map. Anything but a JSON object is rejected.
    pub fn decode(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match self {
            Self::Encoded(raw) => serde_json::from_str(raw),
            Self::Decoded(map) => Ok(map.clone()),
        }
    }

    /// Wire form used when echoing a call back to the model.
    pub fn to_encoded(&self) -> String {
        match self {
            Self::Encoded(raw) => raw.clone(),
            Self::Decoded(map) => Value::Object(map.clone()).to_string(),
        }
    }
}

impl Default for RawArguments {
    fn default() -> Self {
        Self::Decoded(Map::new())
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Call id, present in the `tool_calls` wire format only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: RawArguments,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: RawArguments) -> Self {
        Self {
            id: None,
            name: name.into(),
            arguments,
        }
    }
}

/// Normalized outcome of a tool invocation.
///
/// Success and failure are told apart only by the presence of the `error`
/// key; consumers must not look at anything else.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolResult(Map<String, Value>);

impl ToolResult {
    /// Wrap a success payload. A non-object value is stored under `result`.
    pub fn success(payload: Value) -> Self {
        match payload {
            Value::Object(map) => Self(map),
            other => {
                let mut map = Map::new();
                map.insert("result".into(), other);
                Self(map)
            }
        }
    }

    /// Build an error payload carrying only `error`.
    pub fn error(message: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("error".into(), Value::String(message.into()));
        Self(map)
    }

    /// Attach diagnostic context to an error payload.
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Interpret an arbitrary JSON document (e.g. a remote tool response).
    pub fn from_value(value: Value) -> Self {
        Self::success(value)
    }

    pub fn is_error(&self) -> bool {
        self.0.contains_key("error")
    }

    pub fn error_message(&self) -> Option<String> {
        self.0.get("error").map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn to_json_string(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

// ---------------------------------------------------------------------------
// Tool payloads
// ---------------------------------------------------------------------------

/// A validated coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Headlines extracted from the news upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsDigest {
    pub titles: Vec<String>,
    pub total_count: usize,
}

impl NewsDigest {
    pub fn new(titles: Vec<String>) -> Self {
        let total_count = titles.len();
        Self { titles, total_count }
    }
}

/// Current conditions extracted from the weather upstream.
///
/// Fields keep the upstream JSON type (integers stay integers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub temperature: Value,
    pub condition: Value,
    pub wind_speed: Value,
    pub humidity: Value,
}

impl WeatherReport {
    /// True when the upstream yielded none of the four fields.
    pub fn is_empty(&self) -> bool {
        self.temperature.is_null()
            && self.condition.is_null()
            && self.wind_speed.is_null()
            && self.humidity.is_null()
    }
}

// ---------------------------------------------------------------------------
// Model replies
// ---------------------------------------------------------------------------

/// A decoded reply from the conversational model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// The model answered directly.
    PlainAnswer { content: Option<String> },
    /// The model wants tools executed before it answers.
    ToolCallAnswer {
        content: Option<String>,
        calls: Vec<ToolCallRequest>,
    },
}

impl ModelReply {
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::PlainAnswer { content } | Self::ToolCallAnswer { content, .. } => {
                content.as_deref()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encoded_arguments_decode_to_map() {
        let raw = RawArguments::Encoded(r#"{"latitude": 55.7, "longitude": 37.6}"#.into());
        let map = raw.decode().unwrap();
        assert_eq!(map["latitude"], json!(55.7));
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        assert!(RawArguments::Encoded("[1, 2]".into()).decode().is_err());
        assert!(RawArguments::Encoded("{not json".into()).decode().is_err());
    }

    #[test]
    fn raw_arguments_deserialize_from_string_or_object() {
        let s: RawArguments = serde_json::from_value(json!("{}")).unwrap();
        assert_eq!(s, RawArguments::Encoded("{}".into()));
        let o: RawArguments = serde_json::from_value(json!({"a": 1})).unwrap();
        assert!(matches!(o, RawArguments::Decoded(_)));
    }

    #[test]
    fn tool_result_survives_tool_message_encoding() {
        let result = ToolResult::success(json!({"titles": ["A", "B"], "total_count": 2}));
        let call = ToolCallRequest::new("news", RawArguments::default());
        let msg = ChatMessage::tool(&call, &result);

        let decoded: ToolResult = serde_json::from_str(&msg.content).unwrap();
        assert_eq!(decoded, result);
        assert_eq!(msg.name.as_deref(), Some("news"));
    }

    #[test]
    fn error_key_is_the_discriminator() {
        assert!(ToolResult::error("boom").is_error());
        assert!(!ToolResult::success(json!({"temperature": null})).is_error());
        assert!(ToolResult::from_value(json!({"error": null})).is_error());
    }

    #[test]
    fn weather_report_emptiness() {
        let empty = WeatherReport {
            temperature: Value::Null,
            condition: Value::Null,
            wind_speed: Value::Null,
            humidity: Value::Null,
        };
        assert!(empty.is_empty());
        let partial = WeatherReport {
            temperature: json!(3),
            ..empty
        };
        assert!(!partial.is_empty());
    }
}
