//! Webhook gateway: the HTTP surface the messaging platform posts inbound
//! messages to.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::config::{resolve_backend_server, Config};
use crate::message::InboundMessage;
use crate::session::Session;

#[derive(Clone)]
struct GatewayState {
    session: Arc<Session>,
}

#[derive(Serialize)]
struct WebhookResponse {
    status: &'static str,
    message: String,
}

/// Build the session, connect to the backend if one is configured, and serve
/// until SIGINT/SIGTERM. The backend transport is torn down after the server
/// drains.
pub async fn run_gateway(config: Config) -> Result<()> {
    let session = Arc::new(Session::from_config(&config));

    match resolve_backend_server(&config) {
        Some(server_path) => {
            session
                .connect(&server_path)
                .await
                .with_context(|| format!("connecting to backend {}", server_path.display()))?;
        }
        None => log::warn!("no tool backend configured, serving without tools"),
    }

    let state = GatewayState {
        session: session.clone(),
    };
    let app = Router::new()
        .route("/webhook", post(webhook))
        .route("/health", get(health))
        .with_state(state);

    let addr = format!("{}:{}", config.gateway.bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding gateway to {}", addr))?;
    log::info!("gateway listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server error")?;

    session.cleanup().await;
    Ok(())
}

async fn webhook(
    State(state): State<GatewayState>,
    Json(message): Json<InboundMessage>,
) -> (StatusCode, Json<WebhookResponse>) {
    log::info!(
        "webhook message from {} in {} (media: {:?})",
        message.sender,
        message.chat_jid,
        message.media_type
    );

    match state.session.process(&message).await {
        Ok(reply) => {
            log::info!("turn complete for {}: {} chars", message.chat_jid, reply.len());
            (
                StatusCode::OK,
                Json(WebhookResponse {
                    status: "success",
                    message: "Message processed successfully".to_string(),
                }),
            )
        }
        Err(e) => {
            log::error!("turn failed for {}: {}", message.chat_jid, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WebhookResponse {
                    status: "error",
                    message: format!("Error processing message: {}", e),
                }),
            )
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy"}))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install SIGINT handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => log::error!("failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}
