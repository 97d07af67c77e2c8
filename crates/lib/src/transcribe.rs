//! Voice transcription via the OpenAI audio API.

use std::path::Path;

use async_trait::async_trait;

const API_BASE: &str = "https://api.openai.com/v1";

pub const DEFAULT_TRANSCRIBE_MODEL: &str = "gpt-4o-transcribe";

#[derive(Debug, thiserror::Error)]
pub enum TranscribeError {
    #[error("transcription configuration error: {0}")]
    Config(String),
    #[error("failed to read audio file: {0}")]
    Io(#[from] std::io::Error),
    #[error("transcription request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("transcription API error: {0}")]
    Api(String),
}

/// Seam for audio-to-text. The normalizer depends on this, not on a concrete
/// provider, so tests can stub transcription without network access.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscribeError>;
}

pub struct TranscribeClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl TranscribeClient {
    /// A missing key only fails once a voice message actually arrives;
    /// text-only deployments never need one.
    pub fn new(api_key: Option<String>, model: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_TRANSCRIBE_MODEL.to_string()),
        }
    }
}

#[async_trait]
impl Transcriber for TranscribeClient {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscribeError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| TranscribeError::Config("OpenAI API key not configured".to_string()))?;

        let bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.ogg")
            .to_string();

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "text");

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", API_BASE))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TranscribeError::Api(format!("{}: {}", status, body)));
        }
        Ok(body.trim().to_string())
    }
}
