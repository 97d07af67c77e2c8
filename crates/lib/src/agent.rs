//! Orchestration loop: one inbound message in, one aggregated text reply out,
//! with the model free to invoke backend tools along the way.

use crate::backend::{BackendError, ToolBackend};
use crate::llm::{ChatMessage, ChatModel, ContentBlock, LlmError};
use crate::message::QueryPayload;

/// Per-completion output cap.
pub const MAX_COMPLETION_TOKENS: u32 = 1000;

/// Maximum number of tool-resolving completion rounds per turn. A turn that
/// still wants tools after this many rounds is truncated, not failed.
pub const MAX_TOOL_ROUNDS: usize = 5;

pub const TOOL_LIMIT_REACHED: &str = "[Tool call limit reached]";

/// Errors that abort a turn. Model and tool failures propagate unrecovered;
/// retry policy belongs to the caller.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("model completion failed: {0}")]
    Model(#[from] LlmError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Run one full turn. The transcript is seeded with the serialized payload so
/// the model sees the routing key and can echo it into tool arguments; tool
/// results are fed back and the model re-queried until it stops requesting
/// tools or the round bound is hit.
pub async fn run_turn(
    model: &dyn ChatModel,
    backend: &dyn ToolBackend,
    system_prompt: Option<&str>,
    payload: &QueryPayload,
) -> Result<String, TurnError> {
    // Fetched fresh every turn; an unavailable catalog degrades the turn to
    // plain conversation rather than failing it.
    let tools = match backend.list_tools().await {
        Ok(tools) => tools,
        Err(e) => {
            log::warn!("tool catalog unavailable, continuing without tools: {}", e);
            Vec::new()
        }
    };

    let mut transcript = vec![ChatMessage::user_text(payload.to_json())];
    let mut out: Vec<String> = Vec::new();
    let mut rounds = 0;

    loop {
        let response = model
            .complete(system_prompt, &transcript, &tools, MAX_COMPLETION_TOKENS)
            .await?;

        let mut used_tools = false;
        for block in response.content {
            match block {
                ContentBlock::Text { text } => {
                    transcript.push(ChatMessage::assistant_blocks(vec![ContentBlock::Text {
                        text: text.clone(),
                    }]));
                    out.push(text);
                }
                ContentBlock::ToolUse { id, name, input } => {
                    used_tools = true;
                    out.push(format!("[Calling tool {} with args {}]", name, input));
                    log::info!("invoking tool {} for round {}", name, rounds + 1);

                    let result = backend.call_tool(&name, input.clone()).await?;
                    let result_content =
                        serde_json::to_value(&result.content).unwrap_or(serde_json::Value::Null);

                    transcript.push(ChatMessage::assistant_blocks(vec![
                        ContentBlock::ToolUse { id: id.clone(), name, input },
                    ]));
                    transcript.push(ChatMessage::user_blocks(vec![ContentBlock::ToolResult {
                        tool_use_id: id,
                        content: result_content,
                    }]));
                }
                ContentBlock::ToolResult { .. } | ContentBlock::Unknown => {}
            }
        }

        if !used_tools {
            break;
        }
        rounds += 1;
        if rounds >= MAX_TOOL_ROUNDS {
            log::warn!("tool round bound reached after {} rounds, truncating", rounds);
            out.push(TOOL_LIMIT_REACHED.to_string());
            break;
        }
    }

    Ok(out.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CallToolResult, ToolContent, ToolDescriptor};
    use crate::llm::{MessageContent, MessagesResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted model: pops one response per completion call and records the
    /// transcript it was shown.
    struct StubModel {
        responses: Mutex<Vec<MessagesResponse>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
        seen_tools: Mutex<Vec<usize>>,
    }

    impl StubModel {
        fn scripted(mut responses: Vec<MessagesResponse>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
                seen_tools: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for StubModel {
        async fn complete(
            &self,
            _system: Option<&str>,
            messages: &[ChatMessage],
            tools: &[ToolDescriptor],
            _max_tokens: u32,
        ) -> Result<MessagesResponse, LlmError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.seen_tools.lock().unwrap().push(tools.len());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| LlmError::Api("script exhausted".to_string()))
        }
    }

    struct StubBackend {
        tools_fail: bool,
        calls: Mutex<Vec<(String, serde_json::Value)>>,
    }

    impl StubBackend {
        fn new() -> Self {
            Self {
                tools_fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn catalog_failing() -> Self {
            Self {
                tools_fail: true,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ToolBackend for StubBackend {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BackendError> {
            if self.tools_fail {
                return Err(BackendError::NotConnected);
            }
            Ok(vec![ToolDescriptor {
                name: "send_message".to_string(),
                description: None,
                input_schema: serde_json::json!({"type": "object"}),
            }])
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: serde_json::Value,
        ) -> Result<CallToolResult, BackendError> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments));
            Ok(CallToolResult {
                content: vec![ToolContent::Text {
                    text: r#"{"success": true}"#.to_string(),
                }],
                is_error: false,
            })
        }
    }

    fn payload() -> QueryPayload {
        QueryPayload {
            sender: "491234".to_string(),
            chat_jid: "491234@s.whatsapp.net".to_string(),
            content: "send hello to X".to_string(),
        }
    }

    fn text(text: &str) -> MessagesResponse {
        MessagesResponse {
            content: vec![ContentBlock::Text {
                text: text.to_string(),
            }],
        }
    }

    fn tool_use(id: &str) -> MessagesResponse {
        MessagesResponse {
            content: vec![ContentBlock::ToolUse {
                id: id.to_string(),
                name: "send_message".to_string(),
                input: serde_json::json!({"recipient": "X", "message": "Hello"}),
            }],
        }
    }

    #[tokio::test]
    async fn plain_reply_needs_one_round() {
        let model = StubModel::scripted(vec![text("Hallo!")]);
        let backend = StubBackend::new();
        let out = run_turn(&model, &backend, Some("sys"), &payload())
            .await
            .unwrap();
        assert_eq!(out, "Hallo!");
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn seed_entry_carries_routing_key() {
        let model = StubModel::scripted(vec![text("ok")]);
        let backend = StubBackend::new();
        run_turn(&model, &backend, None, &payload()).await.unwrap();

        let seen = model.seen.lock().unwrap();
        let first = &seen[0][0];
        assert_eq!(first.role, "user");
        let MessageContent::Text(content) = &first.content else {
            panic!("seed entry is not plain text");
        };
        let parsed: QueryPayload = serde_json::from_str(content).unwrap();
        assert_eq!(parsed, payload());
    }

    #[tokio::test]
    async fn tool_use_traces_and_resolves() {
        let model = StubModel::scripted(vec![tool_use("toolu_1"), text("Sent.")]);
        let backend = StubBackend::new();
        let out = run_turn(&model, &backend, Some("sys"), &payload())
            .await
            .unwrap();

        assert_eq!(
            out,
            "[Calling tool send_message with args {\"recipient\":\"X\",\"message\":\"Hello\"}]\nSent."
        );
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "send_message");

        // Second completion sees seed + assistant(tool_use) + user(tool_result).
        let seen = model.seen.lock().unwrap();
        let second = &seen[1];
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].role, "assistant");
        assert_eq!(second[2].role, "user");
        let MessageContent::Blocks(blocks) = &second[2].content else {
            panic!("tool result entry is not blocks");
        };
        assert!(
            matches!(&blocks[0], ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "toolu_1")
        );
    }

    #[tokio::test]
    async fn nested_tool_rounds_drain_fully() {
        let model = StubModel::scripted(vec![
            tool_use("toolu_1"),
            tool_use("toolu_2"),
            text("All done."),
        ]);
        let backend = StubBackend::new();
        let out = run_turn(&model, &backend, Some("sys"), &payload())
            .await
            .unwrap();

        assert_eq!(backend.calls.lock().unwrap().len(), 2);
        assert!(out.ends_with("All done."));
        assert!(!out.contains(TOOL_LIMIT_REACHED));
    }

    #[tokio::test]
    async fn round_bound_truncates_instead_of_erroring() {
        let responses = (0..MAX_TOOL_ROUNDS)
            .map(|i| tool_use(&format!("toolu_{}", i)))
            .collect();
        let model = StubModel::scripted(responses);
        let backend = StubBackend::new();
        let out = run_turn(&model, &backend, Some("sys"), &payload())
            .await
            .unwrap();

        assert_eq!(backend.calls.lock().unwrap().len(), MAX_TOOL_ROUNDS);
        assert!(out.ends_with(TOOL_LIMIT_REACHED));
    }

    #[tokio::test]
    async fn catalog_failure_degrades_to_no_tools() {
        let model = StubModel::scripted(vec![text("plain answer")]);
        let backend = StubBackend::catalog_failing();
        let out = run_turn(&model, &backend, Some("sys"), &payload())
            .await
            .unwrap();
        assert_eq!(out, "plain answer");
        assert_eq!(*model.seen_tools.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn model_error_propagates() {
        let model = StubModel::scripted(vec![]);
        let backend = StubBackend::new();
        let err = run_turn(&model, &backend, Some("sys"), &payload())
            .await
            .expect_err("script exhausted");
        assert!(matches!(err, TurnError::Model(_)));
    }
}
