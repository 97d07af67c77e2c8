//! Client side of the tool-execution backend: a tool-server process spawned
//! by us and spoken to over JSON-RPC 2.0 on stdin/stdout.
//!
//! The backend owns the domain tools (contact/chat lookup, message sending,
//! media download); this module only lists and invokes them.

mod client;
mod protocol;
mod transport;

pub use client::{server_command, BackendClient};
pub use protocol::{CallToolResult, ToolContent, ToolDescriptor};
pub use transport::StdioTransport;

use async_trait::async_trait;

/// Errors talking to (or configuring) the tool backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The configured server script is neither a .py nor a .js file.
    #[error("unsupported backend kind: {0} (expected a .py or .js server script)")]
    UnsupportedKind(String),
    #[error("failed to spawn backend process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("backend not connected")]
    NotConnected,
    /// Network/protocol failure on a backend call. Propagated, never retried.
    #[error("backend call failed: {0}")]
    Call(String),
}

/// Seam for the tool catalog and tool invoker: list the remote tools, call one.
///
/// `list_tools` is a pure read with no local cache — the catalog is fetched
/// fresh at the start of every orchestration run. `call_tool` performs exactly
/// one remote call and returns the backend's result verbatim, including
/// backend-reported failure flags.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BackendError>;
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolResult, BackendError>;
}
