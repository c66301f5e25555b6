//! Error types for the guest chat pipeline

use concierge_realtime::RealtimeError;
use concierge_store::DbErr;
use thiserror::Error;

/// Errors returned to callers of [`crate::GuestChat`]
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message cannot be empty")]
    EmptyMessage,
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("Realtime error: {0}")]
    Realtime(#[from] RealtimeError),
}

/// Errors from the message analysis service. These never reach the sender;
/// the detached analysis task logs them.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Analyzer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Analyzer response has neither `result` nor `results.answer`")]
    MissingResult,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to store enrichment: {0}")]
    Database(#[from] DbErr),
    #[error("Analyzer is not configured: {0}")]
    NotConfigured(String),
}
