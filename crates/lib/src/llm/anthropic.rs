//! Anthropic Messages API client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatModel, LlmError};
use crate::backend::ToolDescriptor;

const API_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// One transcript entry. Plain text for seed and final entries, content
/// blocks for assistant tool-use turns and their tool results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: MessageContent::Blocks(blocks),
        }
    }

    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Blocks(blocks),
        }
    }
}

/// The API accepts either a bare string or a list of blocks as `content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// Content block in a message or a response. Block types added by the API
/// after this was written deserialize as `Unknown` and are skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

/// Assistant response: an ordered list of text and tool-use blocks.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec<'a>>,
}

/// Tool shape the Messages API expects; the backend descriptor's schema is
/// passed through under `input_schema`.
#[derive(Serialize)]
struct ToolSpec<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    input_schema: &'a serde_json::Value,
}

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl AnthropicClient {
    /// A missing key is not an error until the first completion call, so the
    /// gateway can start (and health-check) without credentials.
    pub fn new(api_key: Option<String>, model: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatModel for AnthropicClient {
    async fn complete(
        &self,
        system: Option<&str>,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
        max_tokens: u32,
    ) -> Result<MessagesResponse, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::Config("Anthropic API key not configured".to_string()))?;

        let tools: Vec<ToolSpec> = tools
            .iter()
            .map(|t| ToolSpec {
                name: &t.name,
                description: t.description.as_deref(),
                input_schema: &t.input_schema,
            })
            .collect();

        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            system,
            messages,
            tools,
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", API_BASE))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{}: {}", status, body)));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_with_text_block_parses() {
        let json = r#"{
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Hallo!"}],
            "stop_reason": "end_turn"
        }"#;
        let resp: MessagesResponse = serde_json::from_str(json).expect("parse");
        assert_eq!(resp.content.len(), 1);
        assert!(matches!(&resp.content[0], ContentBlock::Text { text } if text == "Hallo!"));
    }

    #[test]
    fn response_with_tool_use_block_parses() {
        let json = r#"{
            "content": [
                {"type": "text", "text": "Sending now."},
                {"type": "tool_use", "id": "toolu_1", "name": "send_message",
                 "input": {"recipient": "491234", "message": "hi"}}
            ]
        }"#;
        let resp: MessagesResponse = serde_json::from_str(json).expect("parse");
        match &resp.content[1] {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "toolu_1");
                assert_eq!(name, "send_message");
                assert_eq!(input["recipient"], "491234");
            }
            other => panic!("expected tool_use, got {:?}", other),
        }
    }

    #[test]
    fn unknown_block_type_tolerated() {
        let json = r#"{"content": [{"type": "thinking", "thinking": "..."}]}"#;
        let resp: MessagesResponse = serde_json::from_str(json).expect("parse");
        assert!(matches!(resp.content[0], ContentBlock::Unknown));
    }

    #[test]
    fn request_serializes_tool_schema_passthrough() {
        let schema = serde_json::json!({"type": "object"});
        let tools = vec![ToolSpec {
            name: "send_message",
            description: Some("Send a message"),
            input_schema: &schema,
        }];
        let messages = vec![ChatMessage::user_text("hi")];
        let request = MessagesRequest {
            model: "claude-sonnet-4-20250514",
            max_tokens: 1000,
            system: None,
            messages: &messages,
            tools,
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["tools"][0]["input_schema"]["type"], "object");
        assert!(json.get("system").is_none());
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[test]
    fn tool_result_block_serializes_with_tool_use_id() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "toolu_1".to_string(),
            content: serde_json::json!("ok"),
        };
        let json = serde_json::to_value(&block).expect("serialize");
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["tool_use_id"], "toolu_1");
    }
}
