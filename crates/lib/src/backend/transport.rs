//! Stdio transport: spawn the tool-server process and exchange JSON-RPC
//! frames over its stdin/stdout, one frame per line.
//!
//! A single long-lived connection serves all concurrent orchestration runs;
//! responses are correlated to requests by id via a pending map, so callers
//! may interleave freely.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};

use super::protocol::{RpcNotification, RpcRequest, RpcResponse};
use super::BackendError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC transport to a spawned child process.
pub struct StdioTransport {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>>,
    next_id: AtomicU64,
    reader_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl StdioTransport {
    /// Spawn the server process and start the stdout reader loop.
    pub async fn spawn(command: &str, args: &[String]) -> Result<Arc<Self>, BackendError> {
        log::info!("spawning tool backend: {} {:?}", command, args);

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(BackendError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::Call("failed to capture backend stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Call("failed to capture backend stdout".to_string()))?;
        let stderr = child.stderr.take();

        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let transport = Arc::new(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            pending: pending.clone(),
            next_id: AtomicU64::new(1),
            reader_handle: Mutex::new(None),
        });

        // Surface backend diagnostics in our log.
        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let line = line.trim().to_string();
                    if !line.is_empty() {
                        log::warn!("backend stderr: {}", line);
                    }
                }
            });
        }

        let handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<RpcResponse>(line) {
                            Ok(resp) => {
                                let mut map = pending.lock().await;
                                if let Some(tx) = map.remove(&resp.id) {
                                    let _ = tx.send(resp);
                                } else {
                                    log::warn!("backend response for unknown request id {}", resp.id);
                                }
                            }
                            Err(e) => {
                                log::debug!("backend sent non-response line ({}): {}", e, line);
                            }
                        }
                    }
                    Ok(None) => {
                        log::debug!("backend stdout closed");
                        break;
                    }
                    Err(e) => {
                        log::warn!("error reading backend stdout: {}", e);
                        break;
                    }
                }
            }
        });

        *transport.reader_handle.lock().await = Some(handle);
        Ok(transport)
    }

    /// Send a request and await the correlated response. A JSON-RPC error
    /// frame or a timeout maps to `BackendError::Call`.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, BackendError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = RpcRequest::new(id, method, params);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let mut payload = serde_json::to_string(&req)
            .map_err(|e| BackendError::Call(format!("encoding {} request: {}", method, e)))?;
        payload.push('\n');

        let write_result = {
            let mut stdin = self.stdin.lock().await;
            match stdin.write_all(payload.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = write_result {
            self.pending.lock().await.remove(&id);
            return Err(BackendError::Call(format!(
                "writing {} request: {}",
                method, e
            )));
        }

        let resp = match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(_)) => {
                return Err(BackendError::Call(format!(
                    "backend closed while waiting for {} response",
                    method
                )))
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(BackendError::Call(format!(
                    "{} timed out after {}s",
                    method,
                    REQUEST_TIMEOUT.as_secs()
                )));
            }
        };

        if let Some(err) = resp.error {
            return Err(BackendError::Call(format!(
                "{}: code {} {}",
                method, err.code, err.message
            )));
        }
        resp.result
            .ok_or_else(|| BackendError::Call(format!("{} returned no result", method)))
    }

    /// Send a notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), BackendError> {
        let notif = RpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        };
        let mut payload = serde_json::to_string(&notif)
            .map_err(|e| BackendError::Call(format!("encoding {} notification: {}", method, e)))?;
        payload.push('\n');

        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| BackendError::Call(format!("writing {} notification: {}", method, e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| BackendError::Call(format!("flushing {} notification: {}", method, e)))?;
        Ok(())
    }

    pub async fn is_alive(&self) -> bool {
        let mut child = self.child.lock().await;
        matches!(child.try_wait(), Ok(None))
    }

    /// Stop the reader task and kill the child process.
    pub async fn kill(&self) {
        if let Some(handle) = self.reader_handle.lock().await.take() {
            handle.abort();
        }
        let mut child = self.child.lock().await;
        let _ = child.kill().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_nonexistent_command_fails() {
        let result = StdioTransport::spawn("relai-no-such-binary", &[]).await;
        assert!(matches!(result, Err(BackendError::Spawn(_))));
    }

    #[tokio::test]
    async fn request_gets_correlated_response() {
        // A one-shot fake server: read one line, answer request id 1.
        let script = r#"read line; printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}'"#;
        let transport = StdioTransport::spawn("sh", &["-c".to_string(), script.to_string()])
            .await
            .expect("spawn sh");
        let result = transport.request("ping", None).await.expect("response");
        assert_eq!(result["ok"], true);
        transport.kill().await;
    }

    #[tokio::test]
    async fn rpc_error_frame_maps_to_call_error() {
        let script = r#"read line; printf '%s\n' '{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}'"#;
        let transport = StdioTransport::spawn("sh", &["-c".to_string(), script.to_string()])
            .await
            .expect("spawn sh");
        let err = transport.request("nope", None).await.expect_err("error");
        assert!(matches!(err, BackendError::Call(_)));
        assert!(err.to_string().contains("Method not found"));
        transport.kill().await;
    }

    #[tokio::test]
    async fn kill_terminates_child() {
        let transport = StdioTransport::spawn("cat", &[]).await.expect("spawn cat");
        assert!(transport.is_alive().await);
        transport.kill().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!transport.is_alive().await);
    }
}
