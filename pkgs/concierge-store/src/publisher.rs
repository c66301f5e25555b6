//! Publishes committed row changes to the realtime feed

use concierge_realtime::{BroadcastFeed, RowChange};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Handle the stores use to announce writes. Without a feed, publishing is
/// a no-op.
#[derive(Clone, Default)]
pub struct ChangePublisher {
    feed: Option<Arc<BroadcastFeed>>,
}

impl ChangePublisher {
    pub fn new(feed: Arc<BroadcastFeed>) -> Self {
        Self { feed: Some(feed) }
    }

    pub fn disabled() -> Self {
        Self { feed: None }
    }

    pub(crate) fn inserted<T: Serialize>(&self, table: &str, row: &T) {
        if let Some(new) = self.encode(table, row) {
            self.publish(RowChange::insert(table, new));
        }
    }

    pub(crate) fn updated<T: Serialize>(&self, table: &str, old: &T, new: &T) {
        if let Some(new) = self.encode(table, new) {
            let old = self.encode(table, old);
            self.publish(RowChange::update(table, old, new));
        }
    }

    fn encode<T: Serialize>(&self, table: &str, row: &T) -> Option<serde_json::Value> {
        self.feed.as_ref()?;
        match serde_json::to_value(row) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Failed to encode {} row for change feed: {}", table, e);
                None
            }
        }
    }

    fn publish(&self, change: RowChange) {
        if let Some(feed) = &self.feed {
            let table = change.table.clone();
            let kind = change.kind;
            let delivered = feed.publish(change);
            debug!("Published {} {} to {} channels", table, kind, delivered);
        }
    }
}
