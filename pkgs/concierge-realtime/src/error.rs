//! Error types for realtime operations

use thiserror::Error;

/// Errors returned while setting up realtime channels.
///
/// Failures of an already-open channel are never returned; they arrive as
/// [`crate::ChannelStatus`] values and are logged by the dispatcher.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Realtime client is closed")]
    Closed,
    #[error("Channel already exists: {0}")]
    DuplicateChannel(String),
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}
