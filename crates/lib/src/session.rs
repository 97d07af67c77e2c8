//! Session: the long-lived bundle of backend, model, and transcription
//! clients plus the system prompt, shared by every message in the process.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::agent::{run_turn, TurnError};
use crate::backend::{BackendClient, BackendError, ToolBackend};
use crate::config::{
    load_config, resolve_anthropic_key, resolve_backend_server, resolve_openai_key, Config,
};
use crate::llm::AnthropicClient;
use crate::message::{InboundMessage, QueryPayload};
use crate::normalize::normalize;
use crate::transcribe::TranscribeClient;

const SYSTEM_PROMPT: &str = include_str!("../config/system_prompt.md");

static INSTANCE: OnceCell<Arc<Session>> = OnceCell::const_new();

pub struct Session {
    backend: BackendClient,
    model: AnthropicClient,
    transcriber: TranscribeClient,
    system_prompt: &'static str,
}

impl Session {
    /// Build a session from resolved config. The composition root (the
    /// gateway, or a test) calls this directly and owns the handle.
    pub fn from_config(config: &Config) -> Self {
        let model = AnthropicClient::new(
            resolve_anthropic_key(config),
            config.providers.model.clone(),
        );
        log::debug!("model provider ready: {}", model.model());
        Self {
            backend: BackendClient::new(),
            model,
            transcriber: TranscribeClient::new(
                resolve_openai_key(config),
                config.providers.transcribe_model.clone(),
            ),
            system_prompt: SYSTEM_PROMPT,
        }
    }

    /// Process-wide shared session for callers without a composition root.
    /// Concurrent first callers race on one initializer; everyone gets the
    /// same handle. Loads config from the default path and connects to the
    /// configured backend if one is set.
    pub async fn get_instance() -> anyhow::Result<Arc<Session>> {
        INSTANCE
            .get_or_try_init(|| async {
                let (config, path) = load_config(None)?;
                log::info!("session config loaded from {}", path.display());
                let session = Arc::new(Session::from_config(&config));
                if let Some(server_path) = resolve_backend_server(&config) {
                    session.connect(&server_path).await?;
                } else {
                    log::warn!("no tool backend configured, tools unavailable");
                }
                Ok(session)
            })
            .await
            .cloned()
    }

    /// Connect to the tool backend and log the catalog it advertises.
    pub async fn connect(&self, server_path: &Path) -> Result<(), BackendError> {
        self.backend.connect(server_path).await?;
        match self.backend.list_tools().await {
            Ok(tools) => {
                let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
                log::info!("connected, {} tools available: {:?}", names.len(), names);
            }
            Err(e) => log::warn!("connected, but listing tools failed: {}", e),
        }
        Ok(())
    }

    /// Handle one inbound message end to end: normalize media to text, then
    /// run the orchestration loop.
    pub async fn process(&self, message: &InboundMessage) -> Result<String, TurnError> {
        let content = normalize(&self.backend, &self.transcriber, message).await;
        let payload = QueryPayload {
            sender: message.sender.clone(),
            chat_jid: message.chat_jid.clone(),
            content,
        };
        run_turn(&self.model, &self.backend, Some(self.system_prompt), &payload).await
    }

    pub async fn cleanup(&self) {
        self.backend.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrent_get_instance_shares_one_handle() {
        let (a, b, c) = tokio::join!(
            Session::get_instance(),
            Session::get_instance(),
            Session::get_instance()
        );
        let a = a.unwrap();
        let b = b.unwrap();
        let c = c.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
    }

    #[tokio::test]
    async fn once_cell_initializer_runs_exactly_once() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let cell: OnceCell<usize> = OnceCell::const_new();

        let init = || async {
            COUNTER.fetch_add(1, Ordering::SeqCst);
            Ok::<usize, std::convert::Infallible>(7)
        };
        let (a, b, c) = tokio::join!(
            cell.get_or_try_init(init),
            cell.get_or_try_init(init),
            cell.get_or_try_init(init)
        );
        assert_eq!((a.copied(), b.copied(), c.copied()), (Ok(7), Ok(7), Ok(7)));
        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
    }
}
