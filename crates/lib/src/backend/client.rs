//! Backend client: spawn the tool-server, run the initialize handshake, and
//! expose the tool catalog and tool invocation over the shared transport.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::protocol::{
    CallToolParams, CallToolResult, ClientInfo, InitializeParams, InitializeResult,
    ListToolsResult, ToolDescriptor, PROTOCOL_VERSION,
};
use super::transport::StdioTransport;
use super::{BackendError, ToolBackend};

/// Resolve the interpreter for a tool-server script. Exactly two runtime
/// kinds are recognized; anything else is a configuration error.
pub fn server_command(server_path: &Path) -> Result<&'static str, BackendError> {
    match server_path.extension().and_then(|e| e.to_str()) {
        Some("py") => Ok("python"),
        Some("js") => Ok("node"),
        _ => Err(BackendError::UnsupportedKind(
            server_path.display().to_string(),
        )),
    }
}

/// Handle to the tool backend. Constructed unconnected; `connect` establishes
/// the transport once, after which the handle is read-mostly and shared by
/// all concurrent orchestration runs.
pub struct BackendClient {
    transport: RwLock<Option<Arc<StdioTransport>>>,
}

impl Default for BackendClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendClient {
    pub fn new() -> Self {
        Self {
            transport: RwLock::new(None),
        }
    }

    /// Spawn the server script and perform the initialize handshake.
    pub async fn connect(&self, server_path: &Path) -> Result<(), BackendError> {
        let command = server_command(server_path)?;
        let args = vec![server_path.display().to_string()];
        let transport = StdioTransport::spawn(command, &args).await?;

        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({}),
            client_info: ClientInfo {
                name: "relai".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let params = serde_json::to_value(&params)
            .map_err(|e| BackendError::Call(format!("encoding initialize params: {}", e)))?;

        let result = transport.request("initialize", Some(params)).await?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| BackendError::Call(format!("parsing initialize result: {}", e)))?;
        log::info!(
            "tool backend initialized: {} (protocol {})",
            init.server_info.name,
            init.protocol_version
        );

        transport.notify("notifications/initialized", None).await?;

        *self.transport.write().await = Some(transport);
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.read().await.is_some()
    }

    async fn transport(&self) -> Result<Arc<StdioTransport>, BackendError> {
        self.transport
            .read()
            .await
            .clone()
            .ok_or(BackendError::NotConnected)
    }

    /// Release the transport and kill the server process. Safe to call once
    /// at shutdown; a second call finds no transport and does nothing.
    pub async fn shutdown(&self) {
        if let Some(transport) = self.transport.write().await.take() {
            transport.kill().await;
            log::info!("tool backend stopped");
        } else {
            log::debug!("tool backend shutdown: not connected");
        }
    }
}

#[async_trait]
impl ToolBackend for BackendClient {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BackendError> {
        let transport = self.transport().await?;
        let result = transport.request("tools/list", None).await?;
        let list: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| BackendError::Call(format!("parsing tools/list result: {}", e)))?;
        Ok(list.tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolResult, BackendError> {
        let transport = self.transport().await?;
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let params = serde_json::to_value(&params)
            .map_err(|e| BackendError::Call(format!("encoding tools/call params: {}", e)))?;
        let result = transport.request("tools/call", Some(params)).await?;
        serde_json::from_value(result)
            .map_err(|e| BackendError::Call(format!("parsing tools/call result: {}", e)))
    }
}
