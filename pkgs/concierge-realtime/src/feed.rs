//! Row-level change feed contract and the in-process feed implementation

use crate::error::RealtimeError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Insert => write!(f, "INSERT"),
            ChangeKind::Update => write!(f, "UPDATE"),
            ChangeKind::Delete => write!(f, "DELETE"),
        }
    }
}

/// One committed row change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub table: String,
    #[serde(rename = "eventType")]
    pub kind: ChangeKind,
    pub new: Option<Value>,
    pub old: Option<Value>,
}

impl RowChange {
    pub fn insert(table: impl Into<String>, new: Value) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Insert,
            new: Some(new),
            old: None,
        }
    }

    pub fn update(table: impl Into<String>, old: Option<Value>, new: Value) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Update,
            new: Some(new),
            old,
        }
    }

    pub fn delete(table: impl Into<String>, old: Value) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Delete,
            new: None,
            old: Some(old),
        }
    }

    /// The row a filter applies to: `old` for deletes, `new` otherwise
    pub fn row(&self) -> Option<&Value> {
        match self.kind {
            ChangeKind::Delete => self.old.as_ref(),
            ChangeKind::Insert | ChangeKind::Update => self.new.as_ref(),
        }
    }
}

/// Equality filter in `column=eq.value` form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    pub column: String,
    pub value: String,
}

impl RowFilter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn parse(filter: &str) -> Result<Self, RealtimeError> {
        let (column, rest) = filter
            .split_once('=')
            .ok_or_else(|| RealtimeError::InvalidFilter(filter.to_string()))?;
        let value = rest
            .strip_prefix("eq.")
            .ok_or_else(|| RealtimeError::InvalidFilter(filter.to_string()))?;

        if column.is_empty() || value.is_empty() {
            return Err(RealtimeError::InvalidFilter(filter.to_string()));
        }

        Ok(Self::eq(column, value))
    }

    pub fn matches(&self, row: &Value) -> bool {
        match row.get(&self.column) {
            Some(Value::String(s)) => *s == self.value,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == self.value,
        }
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}

/// Coordinates of a channel to open
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub name: String,
    pub table: String,
    /// `None` covers every row of the table
    pub filter: Option<RowFilter>,
}

/// Transport-level status of a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribed,
    ChannelError(String),
    TimedOut,
    Closed,
}

/// Message delivered on a channel
#[derive(Debug, Clone)]
pub enum FeedMessage {
    Change(RowChange),
    Status(ChannelStatus),
}

/// Server-pushed change feed
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a named channel. Names must be unique per feed.
    async fn join(&self, spec: ChannelSpec) -> Result<mpsc::Receiver<FeedMessage>, RealtimeError>;

    /// Remove a channel; unknown names are ignored
    fn leave(&self, name: &str);
}

struct Registration {
    table: String,
    filter: Option<RowFilter>,
    sender: mpsc::Sender<FeedMessage>,
}

impl Registration {
    fn wants(&self, change: &RowChange) -> bool {
        if self.table != change.table {
            return false;
        }
        match (&self.filter, change.row()) {
            (None, _) => true,
            (Some(filter), Some(row)) => filter.matches(row),
            (Some(_), None) => false,
        }
    }
}

/// In-process change feed. Writers call [`BroadcastFeed::publish`] after a
/// commit; every channel whose table and filter match receives the change.
pub struct BroadcastFeed {
    channels: RwLock<HashMap<String, Registration>>,
    buffer: usize,
}

impl BroadcastFeed {
    pub fn new(buffer: usize) -> Arc<Self> {
        Arc::new(Self {
            channels: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        })
    }

    /// Deliver a change to matching channels. Returns the number of
    /// channels it was delivered to.
    pub fn publish(&self, change: RowChange) -> usize {
        let channels = self.channels.read();
        let mut delivered = 0;

        for (name, registration) in channels.iter() {
            if !registration.wants(&change) {
                continue;
            }
            match registration
                .sender
                .try_send(FeedMessage::Change(change.clone()))
            {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        "Channel {} is lagging, dropped {} {}",
                        name, change.table, change.kind
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Channel {} receiver gone", name);
                }
            }
        }

        delivered
    }

    /// Push a transport status to one channel. A `Closed` status also
    /// removes the channel.
    pub fn report_status(&self, name: &str, status: ChannelStatus) {
        let closing = status == ChannelStatus::Closed;
        {
            let channels = self.channels.read();
            if let Some(registration) = channels.get(name) {
                let _ = registration.sender.try_send(FeedMessage::Status(status));
            }
        }
        if closing {
            self.channels.write().remove(name);
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.read().keys().cloned().collect()
    }
}

#[async_trait]
impl ChangeFeed for BroadcastFeed {
    async fn join(&self, spec: ChannelSpec) -> Result<mpsc::Receiver<FeedMessage>, RealtimeError> {
        let mut channels = self.channels.write();
        if channels.contains_key(&spec.name) {
            return Err(RealtimeError::DuplicateChannel(spec.name));
        }

        let (sender, receiver) = mpsc::channel(self.buffer);
        let _ = sender.try_send(FeedMessage::Status(ChannelStatus::Subscribed));

        info!(
            "Channel {} joined ({} {})",
            spec.name,
            spec.table,
            spec.filter
                .as_ref()
                .map(|f| f.to_string())
                .unwrap_or_else(|| "all".to_string())
        );

        channels.insert(
            spec.name,
            Registration {
                table: spec.table,
                filter: spec.filter,
                sender,
            },
        );

        Ok(receiver)
    }

    fn leave(&self, name: &str) {
        if self.channels.write().remove(name).is_some() {
            info!("Channel {} left", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_filter() {
        let filter = RowFilter::parse("conversation_id=eq.abc-123").unwrap();
        assert_eq!(filter.column, "conversation_id");
        assert_eq!(filter.value, "abc-123");
        assert_eq!(filter.to_string(), "conversation_id=eq.abc-123");

        assert!(RowFilter::parse("conversation_id").is_err());
        assert!(RowFilter::parse("conversation_id=neq.1").is_err());
        assert!(RowFilter::parse("=eq.1").is_err());
    }

    #[test]
    fn test_filter_matches_row_values() {
        let filter = RowFilter::eq("guest_id", "g1");
        assert!(filter.matches(&json!({"guest_id": "g1"})));
        assert!(!filter.matches(&json!({"guest_id": "g2"})));
        assert!(!filter.matches(&json!({"guest_id": null})));
        assert!(!filter.matches(&json!({})));

        assert!(RowFilter::eq("is_read", "false").matches(&json!({"is_read": false})));
    }

    #[test]
    fn test_delete_filters_on_old_row() {
        let change = RowChange::delete("guest_messages", json!({"conversation_id": "c1"}));
        assert_eq!(change.row(), Some(&json!({"conversation_id": "c1"})));
    }
}
