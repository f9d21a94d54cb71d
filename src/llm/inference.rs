//! Chat-completions client with tool calling.
//!
//! Speaks both the OpenAI-compatible `tools`/`tool_calls` format and the
//! GigaChat `functions`/`function_call` dialect; replies in either shape
//! are accepted regardless of which one is configured.

use super::{ChatModel, LlmError, TokenProvider};
use crate::config::schema::LlmConfig;
use crate::config::ToolWireFormat;
use crate::tools::ToolDescriptor;
use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Client for the remote conversational model.
#[derive(Debug)]
pub struct ChatClient {
    base_url: String,
    model: String,
    temperature: f64,
    format: ToolWireFormat,
    tokens: TokenProvider,
    http: reqwest::Client,
}

// -- Request types -----------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<MessagePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolPayload<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    functions: Option<Vec<FunctionPayload<'a>>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct MessagePayload {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCallOut>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCallOut>,
}

#[derive(Debug, Serialize)]
struct ToolPayload<'a> {
    r#type: &'static str,
    function: FunctionPayload<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionPayload<'a> {
    name: &'a str,
    description: &'a str,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct ToolCallOut {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    r#type: &'static str,
    function: FunctionCallOut,
}

#[derive(Debug, Serialize)]
struct FunctionCallOut {
    name: String,
    arguments: Value,
}

// -- Response types ----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallIn>,
    #[serde(default)]
    function_call: Option<FunctionCallIn>,
}

#[derive(Debug, Deserialize)]
struct ToolCallIn {
    #[serde(default)]
    id: Option<String>,
    function: FunctionCallIn,
}

#[derive(Debug, Deserialize)]
struct FunctionCallIn {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Arguments arrive as a JSON string or an object; any other shape is kept
/// encoded so dispatch reports it as undecodable.
fn arguments_from_wire(value: Option<Value>) -> RawArguments {
    match value {
        None => RawArguments::default(),
        Some(Value::String(raw)) => RawArguments::Encoded(raw),
        Some(Value::Object(map)) => RawArguments::Decoded(map),
        Some(other) => RawArguments::Encoded(other.to_string()),
    }
}

impl ChatClient {
    pub fn new(
        base_url: &str,
        model: &str,
        temperature: f64,
        format: ToolWireFormat,
        tokens: TokenProvider,
        http: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
            format,
            tokens,
            http,
        }
    }

    /// Build a client (and its credential exchange) from config.
    pub fn from_config(config: &LlmConfig, timeout: Duration) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        let credential = super::Credential::from_config(config)?;
        Ok(Self::new(
            &config.base_url,
            &config.model,
            config.temperature,
            config.tool_format,
            TokenProvider::new(credential, http.clone()),
            http,
        ))
    }

    fn build_request<'a>(
        &'a self,
        messages: &[ChatMessage],
        tools: &'a [&'a ToolDescriptor],
    ) -> ChatRequest<'a> {
        let function_payloads = || {
            tools
                .iter()
                .map(|t| FunctionPayload {
                    name: &t.name,
                    description: &t.description,
                    parameters: t.json_schema(),
                })
                .collect::<Vec<_>>()
        };

        let (tool_payloads, functions) = match (tools.is_empty(), self.format) {
            (true, _) => (None, None),
            (false, ToolWireFormat::Openai) => (
                Some(
                    function_payloads()
                        .into_iter()
                        .map(|function| ToolPayload {
                            r#type: "function",
                            function,
                        })
                        .collect(),
                ),
                None,
            ),
            (false, ToolWireFormat::Functions) => (None, Some(function_payloads())),
        };

        ChatRequest {
            model: &self.model,
            messages: messages.iter().map(|m| self.encode_message(m)).collect(),
            tools: tool_payloads,
            functions,
            temperature: self.temperature,
        }
    }

    fn encode_message(&self, message: &ChatMessage) -> MessagePayload {
        let mut payload = MessagePayload {
            role: match message.role {
                ChatRole::System => "system",
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
                ChatRole::Tool => match self.format {
                    ToolWireFormat::Openai => "tool",
                    ToolWireFormat::Functions => "function",
                },
            },
            content: message.content.clone(),
            name: message.name.clone(),
            tool_call_id: None,
            tool_calls: None,
            function_call: None,
        };

        match self.format {
            ToolWireFormat::Openai => {
                payload.tool_call_id = message.tool_call_id.clone();
                if !message.tool_calls.is_empty() {
                    payload.tool_calls = Some(
                        message
                            .tool_calls
                            .iter()
                            .map(|call| ToolCallOut {
                                id: call.id.clone(),
                                r#type: "function",
                                function: FunctionCallOut {
                                    name: call.name.clone(),
                                    arguments: Value::String(call.arguments.to_encoded()),
                                },
                            })
                            .collect(),
                    );
                }
            }
            ToolWireFormat::Functions => {
                // The dialect carries a single call per assistant message.
                if let Some(call) = message.tool_calls.first() {
                    let arguments = call
                        .arguments
                        .decode()
                        .map(Value::Object)
                        .unwrap_or_else(|_| Value::String(call.arguments.to_encoded()));
                    payload.function_call = Some(FunctionCallOut {
                        name: call.name.clone(),
                        arguments,
                    });
                }
            }
        }

        payload
    }
}

/// Turn the first choice of a wire response into a [`ModelReply`].
fn decode_reply(body: ChatResponse) -> Result<ModelReply, LlmError> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Decode("response contained no choices".into()))?;
    let message = choice.message;

    // Every call gets an id here so tool turns can always reference it.
    let into_call = |i: usize, id: Option<String>, f: FunctionCallIn| ToolCallRequest {
        id: Some(
            id.filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{i}")),
        ),
        name: f.name,
        arguments: arguments_from_wire(f.arguments),
    };

    let mut calls: Vec<ToolCallRequest> = message
        .tool_calls
        .into_iter()
        .enumerate()
        .map(|(i, tc)| into_call(i, tc.id, tc.function))
        .collect();
    if calls.is_empty() {
        if let Some(f) = message.function_call {
            calls.push(into_call(0, None, f));
        }
    }

    if calls.is_empty() {
        Ok(ModelReply::PlainAnswer {
            content: message.content,
        })
    } else {
        Ok(ModelReply::ToolCallAnswer {
            content: message.content,
            calls,
        })
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[&ToolDescriptor],
    ) -> Result<ModelReply, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let token = self.tokens.bearer().await?;
        let request = self.build_request(messages, tools);

        debug!(
            "Chat request to model {} ({} messages, {} tools)",
            self.model,
            messages.len(),
            tools.len()
        );

        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = resp.text().await?;
        let body: ChatResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Decode(e.to_string()))?;
        decode_reply(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Credential;
    use crate::tools::builtin::{news_descriptor, weather_descriptor};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str, format: ToolWireFormat) -> ChatClient {
        ChatClient::new(
            base_url,
            "GigaChat-Pro",
            0.7,
            format,
            TokenProvider::new(Credential::Bearer("tok".into()), reqwest::Client::new()),
            reqwest::Client::new(),
        )
    }

    fn decode(value: Value) -> ModelReply {
        decode_reply(serde_json::from_value(value).unwrap()).unwrap()
    }

    #[test]
    fn plain_content_decodes_as_plain_answer() {
        let reply = decode(json!({"choices": [{"message": {"role": "assistant", "content": "Summary text"}}]}));
        assert_eq!(
            reply,
            ModelReply::PlainAnswer {
                content: Some("Summary text".into())
            }
        );
    }

    #[test]
    fn tool_calls_decode_with_string_arguments() {
        let reply = decode(json!({"choices": [{"message": {
            "content": null,
            "tool_calls": [
                {"id": "c1", "type": "function", "function": {"name": "news", "arguments": "{}"}},
                {"id": "c2", "type": "function", "function": {"name": "weather", "arguments": "{\"latitude\":1}"}}
            ]
        }}]}));

        let ModelReply::ToolCallAnswer { calls, .. } = reply else {
            panic!("expected tool calls");
        };
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id.as_deref(), Some("c1"));
        assert_eq!(calls[1].arguments, RawArguments::Encoded("{\"latitude\":1}".into()));
    }

    #[test]
    fn function_call_decodes_with_object_arguments() {
        let reply = decode(json!({"choices": [{"message": {
            "content": "",
            "function_call": {"name": "weather", "arguments": {"latitude": 55.7, "longitude": 37.6}}
        }}]}));

        let ModelReply::ToolCallAnswer { calls, .. } = reply else {
            panic!("expected tool call");
        };
        assert_eq!(calls[0].name, "weather");
        assert!(matches!(calls[0].arguments, RawArguments::Decoded(_)));
    }

    #[test]
    fn non_object_arguments_stay_undecodable_instead_of_failing_the_reply() {
        for arguments in [json!(5), json!([1, 2]), json!(true)] {
            let reply = decode(json!({"choices": [{"message": {
                "content": "",
                "function_call": {"name": "news", "arguments": arguments.clone()}
            }}]}));

            let ModelReply::ToolCallAnswer { calls, .. } = reply else {
                panic!("expected tool call");
            };
            assert_eq!(calls[0].arguments, RawArguments::Encoded(arguments.to_string()));
            assert!(calls[0].arguments.decode().is_err());
        }
    }

    #[test]
    fn missing_arguments_decode_as_empty_object() {
        let reply = decode(json!({"choices": [{"message": {
            "function_call": {"name": "news"}
        }}]}));

        let ModelReply::ToolCallAnswer { calls, .. } = reply else {
            panic!("expected tool call");
        };
        assert_eq!(calls[0].arguments, RawArguments::default());
    }

    #[test]
    fn calls_without_ids_are_assigned_one() {
        let reply = decode(json!({"choices": [{"message": {
            "tool_calls": [
                {"type": "function", "function": {"name": "news", "arguments": "{}"}},
                {"id": "", "type": "function", "function": {"name": "weather", "arguments": "{}"}},
                {"id": "c7", "type": "function", "function": {"name": "news", "arguments": "{}"}}
            ]
        }}]}));

        let ModelReply::ToolCallAnswer { calls, .. } = reply else {
            panic!("expected tool calls");
        };
        let ids: Vec<_> = calls.iter().map(|c| c.id.as_deref()).collect();
        assert_eq!(ids, vec![Some("call_0"), Some("call_1"), Some("c7")]);
    }

    #[test]
    fn missing_choices_is_a_decode_error() {
        let body: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(decode_reply(body), Err(LlmError::Decode(_))));
    }

    #[test]
    fn functions_format_encodes_tool_turns() {
        let client = client("http://unused", ToolWireFormat::Functions);
        let call = ToolCallRequest::new("news", RawArguments::Encoded("{}".into()));
        let result = ToolResult::success(json!({"titles": ["A"], "total_count": 1}));
        let messages = vec![
            ChatMessage::user("Summarize"),
            ChatMessage::assistant("", vec![call.clone()]),
            ChatMessage::tool(&call, &result),
        ];
        let news = news_descriptor();
        let tools = [&news];

        let request = serde_json::to_value(client.build_request(&messages, &tools)).unwrap();

        assert_eq!(request["functions"][0]["name"], "news");
        assert!(request.get("tools").is_none());
        assert_eq!(request["messages"][1]["function_call"]["name"], "news");
        assert_eq!(request["messages"][1]["function_call"]["arguments"], json!({}));
        assert_eq!(request["messages"][2]["role"], "function");
        assert_eq!(request["messages"][2]["name"], "news");
        let content: Value =
            serde_json::from_str(request["messages"][2]["content"].as_str().unwrap()).unwrap();
        assert_eq!(content, json!({"titles": ["A"], "total_count": 1}));
    }

    #[test]
    fn openai_format_encodes_tool_turns() {
        let client = client("http://unused", ToolWireFormat::Openai);
        let mut call = ToolCallRequest::new("weather", RawArguments::Encoded("{\"latitude\":1}".into()));
        call.id = Some("c9".into());
        let messages = vec![
            ChatMessage::assistant("", vec![call.clone()]),
            ChatMessage::tool(&call, &ToolResult::error("x")),
        ];
        let weather = weather_descriptor();
        let tools = [&weather];

        let request = serde_json::to_value(client.build_request(&messages, &tools)).unwrap();

        assert_eq!(request["tools"][0]["type"], "function");
        assert_eq!(request["tools"][0]["function"]["parameters"]["required"], json!(["latitude", "longitude"]));
        assert_eq!(request["messages"][0]["tool_calls"][0]["id"], "c9");
        assert_eq!(request["messages"][0]["tool_calls"][0]["function"]["arguments"], "{\"latitude\":1}");
        assert_eq!(request["messages"][1]["role"], "tool");
        assert_eq!(request["messages"][1]["tool_call_id"], "c9");
    }

    #[test]
    fn openai_tool_turn_references_an_assigned_id() {
        let client = client("http://unused", ToolWireFormat::Openai);
        let reply = decode(json!({"choices": [{"message": {
            "tool_calls": [{"type": "function", "function": {"name": "news", "arguments": "{}"}}]
        }}]}));
        let ModelReply::ToolCallAnswer { calls, .. } = reply else {
            panic!("expected tool call");
        };
        let messages = vec![
            ChatMessage::assistant("", calls.clone()),
            ChatMessage::tool(&calls[0], &ToolResult::success(json!({"titles": []}))),
        ];

        let request = serde_json::to_value(client.build_request(&messages, &[])).unwrap();

        assert_eq!(request["messages"][0]["tool_calls"][0]["id"], "call_0");
        assert_eq!(request["messages"][1]["tool_call_id"], "call_0");
    }

    #[tokio::test]
    async fn complete_posts_with_bearer_and_temperature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer tok"))
            .and(body_partial_json(json!({"model": "GigaChat-Pro", "temperature": 0.7})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "done"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server.uri(), ToolWireFormat::Functions);
        let reply = client
            .complete(&[ChatMessage::user("hi")], &[])
            .await
            .unwrap();
        assert_eq!(reply.content(), Some("done"));
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = client(&server.uri(), ToolWireFormat::Openai);
        let err = client.complete(&[ChatMessage::user("hi")], &[]).await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 429, .. }));
    }

    #[tokio::test]
    async fn garbage_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = client(&server.uri(), ToolWireFormat::Openai);
        let err = client.complete(&[ChatMessage::user("hi")], &[]).await.unwrap_err();
        assert!(matches!(err, LlmError::Decode(_)));
    }
}
