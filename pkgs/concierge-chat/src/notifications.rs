//! Notification badge: open service requests plus unread staff messages

use concierge_realtime::{
    CachePolicy, QueryCache, QueryKey, RealtimeClient, RealtimeError, Subscription,
    SubscriptionHandle,
};
use concierge_store::{DbErr, Store};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

const BADGE_LIMIT: u64 = 99;

/// Everything the guest has not looked at yet
pub fn total_unseen(pending_requests: u64, unread_messages: u64) -> u64 {
    pending_requests.saturating_add(unread_messages)
}

/// What the bell shows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeState {
    pub pending_requests: u64,
    pub unread_messages: u64,
    pub total: u64,
    pub has_activity: bool,
    /// `None` hides the badge; above 99 it reads "99+"
    pub label: Option<String>,
}

impl BadgeState {
    pub fn from_counts(pending_requests: u64, unread_messages: u64) -> Self {
        let total = total_unseen(pending_requests, unread_messages);
        let label = match total {
            0 => None,
            n if n > BADGE_LIMIT => Some(format!("{}+", BADGE_LIMIT)),
            n => Some(n.to_string()),
        };

        Self {
            pending_requests,
            unread_messages,
            total,
            has_activity: total > 0,
            label,
        }
    }
}

/// Computes the badge for one guest from cached counts
#[derive(Clone)]
pub struct NotificationAggregator {
    guest_id: String,
    store: Store,
    cache: QueryCache,
    policy: CachePolicy,
}

impl NotificationAggregator {
    pub fn new(
        guest_id: impl Into<String>,
        store: Store,
        cache: QueryCache,
        policy: CachePolicy,
    ) -> Self {
        Self {
            guest_id: guest_id.into(),
            store,
            cache,
            policy,
        }
    }

    pub fn guest_id(&self) -> &str {
        &self.guest_id
    }

    fn pending_key(&self) -> QueryKey {
        QueryKey::pending_requests(&self.guest_id)
    }

    fn unread_key(&self) -> QueryKey {
        QueryKey::unread_messages(&self.guest_id)
    }

    /// Read both counts (through the cache) and build the badge
    pub async fn refresh(&self) -> Result<BadgeState, DbErr> {
        let requests = self.store.requests().clone();
        let guest = self.guest_id.clone();
        let pending = self
            .cache
            .fetch(&self.pending_key(), self.policy, || async move {
                requests.pending_count(&guest).await
            })
            .await?;

        let messages = self.store.messages().clone();
        let guest = self.guest_id.clone();
        let unread = self
            .cache
            .fetch(&self.unread_key(), self.policy, || async move {
                messages.unread_count_for_guest(&guest).await
            })
            .await?;

        Ok(BadgeState::from_counts(pending, unread))
    }

    /// Open the realtime channels that feed the two counts. The channels
    /// stay open while the returned handles are alive.
    pub async fn subscribe_sources(
        &self,
        realtime: &RealtimeClient,
    ) -> Result<Vec<SubscriptionHandle>, RealtimeError> {
        let filter = format!("guest_id=eq.{}", self.guest_id);
        let requests = realtime
            .subscribe(Subscription::new("service_requests", self.pending_key()).filter(&filter))
            .await?;
        let messages = realtime
            .subscribe(Subscription::new("guest_messages", self.unread_key()).filter(&filter))
            .await?;

        Ok(vec![requests, messages])
    }

    /// Badge that recomputes whenever either count is invalidated. The
    /// background task ends when every receiver is dropped.
    pub fn watch(&self) -> watch::Receiver<BadgeState> {
        let (tx, rx) = watch::channel(BadgeState::default());
        // Subscribe before the first refresh so no invalidation slips through
        let mut events = self.cache.subscribe();
        let aggregator = self.clone();

        tokio::spawn(async move {
            aggregator.publish(&tx).await;

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    event = events.recv() => match event {
                        Ok(key) if aggregator.affected_by(&key) => {
                            debug!("Badge of guest {} invalidated by {}", aggregator.guest_id, key);
                            aggregator.publish(&tx).await;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!("Badge watcher lagged {} invalidations", skipped);
                            aggregator.publish(&tx).await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("Badge watcher for guest {} stopped", aggregator.guest_id);
        });

        rx
    }

    fn affected_by(&self, invalidated: &QueryKey) -> bool {
        [self.pending_key(), self.unread_key()]
            .iter()
            .any(|key| key.starts_with(invalidated))
    }

    async fn publish(&self, tx: &watch::Sender<BadgeState>) {
        match self.refresh().await {
            Ok(badge) => {
                tx.send_if_modified(|current| {
                    if *current == badge {
                        false
                    } else {
                        *current = badge;
                        true
                    }
                });
            }
            Err(e) => warn!("Failed to refresh badge for guest {}: {}", self.guest_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_unseen() {
        assert_eq!(total_unseen(0, 0), 0);
        assert_eq!(total_unseen(2, 3), 5);
        assert_eq!(total_unseen(u64::MAX, 1), u64::MAX);
    }

    #[test]
    fn test_badge_label() {
        let none = BadgeState::from_counts(0, 0);
        assert!(!none.has_activity);
        assert_eq!(none.label, None);

        let some = BadgeState::from_counts(1, 4);
        assert!(some.has_activity);
        assert_eq!(some.total, 5);
        assert_eq!(some.label.as_deref(), Some("5"));

        assert_eq!(BadgeState::from_counts(99, 0).label.as_deref(), Some("99"));
        assert_eq!(BadgeState::from_counts(60, 40).label.as_deref(), Some("99+"));
    }
}
