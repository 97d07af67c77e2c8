//! Relai core library — config, tool backend client, model and transcription
//! providers, media normalization, the orchestration loop, and the webhook
//! gateway used by the CLI.

pub mod agent;
pub mod backend;
pub mod config;
pub mod gateway;
pub mod llm;
pub mod message;
pub mod normalize;
pub mod session;
pub mod transcribe;
