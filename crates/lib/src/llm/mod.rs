//! Language-model providers. One provider is implemented (Anthropic Messages
//! API); the `ChatModel` seam keeps the orchestration loop provider-agnostic.

mod anthropic;

pub use anthropic::{
    AnthropicClient, ChatMessage, ContentBlock, MessageContent, MessagesResponse,
};

use async_trait::async_trait;

use crate::backend::ToolDescriptor;

/// Errors from a model completion call.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("model configuration error: {0}")]
    Config(String),
    #[error("model request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Non-success HTTP status from the provider, with the response body.
    #[error("model API error: {0}")]
    Api(String),
}

/// One completion round: the full transcript in, one assistant response out.
/// The caller owns the transcript and the tool loop; implementations are
/// stateless between calls.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        system: Option<&str>,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
        max_tokens: u32,
    ) -> Result<MessagesResponse, LlmError>;
}
