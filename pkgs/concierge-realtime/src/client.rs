//! Realtime channel manager

use crate::cache::{QueryCache, QueryKey};
use crate::error::RealtimeError;
use crate::feed::{ChangeFeed, ChangeKind, ChannelSpec, ChannelStatus, FeedMessage, RowChange, RowFilter};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Callback for one changed row
pub type RowHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Optional typed handlers; the query key is invalidated whether or not
/// a handler is set
#[derive(Clone, Default)]
pub struct ChangeHandlers {
    pub on_insert: Option<RowHandler>,
    pub on_update: Option<RowHandler>,
    pub on_delete: Option<RowHandler>,
}

impl ChangeHandlers {
    fn call(&self, change: &RowChange) {
        let (handler, row) = match change.kind {
            ChangeKind::Insert => (&self.on_insert, change.new.as_ref()),
            ChangeKind::Update => (&self.on_update, change.new.as_ref()),
            ChangeKind::Delete => (&self.on_delete, change.old.as_ref()),
        };
        if let (Some(handler), Some(row)) = (handler, row) {
            handler(row);
        }
    }
}

/// Subscription request
#[derive(Clone)]
pub struct Subscription {
    pub table: String,
    /// `column=eq.value`; `None` subscribes to the whole table, which is
    /// only reasonable for low-cardinality tables
    pub filter: Option<String>,
    pub query_key: QueryKey,
    pub enabled: bool,
    pub handlers: ChangeHandlers,
}

impl Subscription {
    pub fn new(table: impl Into<String>, query_key: QueryKey) -> Self {
        Self {
            table: table.into(),
            filter: None,
            query_key,
            enabled: true,
            handlers: ChangeHandlers::default(),
        }
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn on_insert(mut self, handler: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.handlers.on_insert = Some(Arc::new(handler));
        self
    }

    pub fn on_update(mut self, handler: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.handlers.on_update = Some(Arc::new(handler));
        self
    }

    pub fn on_delete(mut self, handler: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.handlers.on_delete = Some(Arc::new(handler));
        self
    }

    fn coordinates(&self) -> Coordinates {
        (self.table.clone(), self.filter.clone())
    }
}

type Coordinates = (String, Option<String>);

struct ActiveChannel {
    name: String,
    // false once torn down; dispatch holds a read guard per event
    gate: Arc<RwLock<bool>>,
    task: JoinHandle<()>,
}

impl ActiveChannel {
    fn shutdown(self, feed: &dyn ChangeFeed) {
        // Waits for an in-flight dispatch to finish.
        *self.gate.write() = false;
        self.task.abort();
        feed.leave(&self.name);
        debug!("Channel {} torn down", self.name);
    }
}

struct ClientInner {
    feed: Arc<dyn ChangeFeed>,
    cache: QueryCache,
    channels: Mutex<HashMap<Coordinates, ActiveChannel>>,
    closed: AtomicBool,
}

impl ClientInner {
    fn take_channel(&self, coordinates: &Coordinates, name: &str) -> Option<ActiveChannel> {
        let mut channels = self.channels.lock();
        match channels.get(coordinates) {
            Some(active) if active.name == name => channels.remove(coordinates),
            _ => None,
        }
    }

    fn remove_channel(&self, coordinates: &Coordinates, name: &str) {
        if let Some(active) = self.take_channel(coordinates, name) {
            active.shutdown(self.feed.as_ref());
        }
    }

    /// Drop the entry of a channel the transport already closed. The
    /// dispatch task calling this exits on its own.
    fn forget_channel(&self, coordinates: &Coordinates, name: &str) {
        if let Some(active) = self.take_channel(coordinates, name) {
            *active.gate.write() = false;
            self.feed.leave(&active.name);
        }
    }
}

/// Opens one live channel per `(table, filter)` and keeps the query cache
/// in step with server-side row changes.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

impl RealtimeClient {
    pub fn new(feed: Arc<dyn ChangeFeed>, cache: QueryCache) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                feed,
                cache,
                channels: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    /// Open a channel for `subscription`.
    ///
    /// A disabled subscription yields an inert handle. An existing channel
    /// with the same table and filter is torn down first.
    pub async fn subscribe(
        &self,
        subscription: Subscription,
    ) -> Result<SubscriptionHandle, RealtimeError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(RealtimeError::Closed);
        }

        let coordinates = subscription.coordinates();
        if !subscription.enabled {
            return Ok(SubscriptionHandle::inert(coordinates));
        }

        let filter = subscription
            .filter
            .as_deref()
            .map(RowFilter::parse)
            .transpose()?;

        let stale = self.inner.channels.lock().remove(&coordinates);
        if let Some(stale) = stale {
            warn!(
                "Replacing active channel {} for {}",
                stale.name, subscription.table
            );
            stale.shutdown(self.inner.feed.as_ref());
        }

        let name = channel_name(&subscription.table, subscription.filter.as_deref());
        let receiver = self
            .inner
            .feed
            .join(ChannelSpec {
                name: name.clone(),
                table: subscription.table.clone(),
                filter,
            })
            .await?;

        let replaced = {
            let mut channels = self.inner.channels.lock();
            // close() may have drained the map while the join was pending
            if self.inner.closed.load(Ordering::Acquire) {
                None
            } else {
                let gate = Arc::new(RwLock::new(true));
                let task = tokio::spawn(dispatch(
                    Arc::downgrade(&self.inner),
                    coordinates.clone(),
                    name.clone(),
                    receiver,
                    gate.clone(),
                    subscription.handlers,
                    self.inner.cache.clone(),
                    subscription.query_key,
                ));
                Some(channels.insert(
                    coordinates.clone(),
                    ActiveChannel {
                        name: name.clone(),
                        gate,
                        task,
                    },
                ))
            }
        };

        let Some(replaced) = replaced else {
            self.inner.feed.leave(&name);
            debug!("Client closed while joining {}", name);
            return Err(RealtimeError::Closed);
        };
        // Two subscribes for the same coordinates raced; keep the newest.
        if let Some(replaced) = replaced {
            replaced.shutdown(self.inner.feed.as_ref());
        }

        info!("Subscribed to {} via {}", subscription.table, name);

        Ok(SubscriptionHandle {
            client: Arc::downgrade(&self.inner),
            coordinates,
            name: Some(name),
        })
    }

    /// Tear down `handle` and open `subscription` in its place. Use when
    /// the table, filter or enabled flag of a subscription changes.
    pub async fn resubscribe(
        &self,
        handle: SubscriptionHandle,
        subscription: Subscription,
    ) -> Result<SubscriptionHandle, RealtimeError> {
        handle.unsubscribe();
        self.subscribe(subscription).await
    }

    /// Names of the channels currently open
    pub fn active_channels(&self) -> Vec<String> {
        self.inner
            .channels
            .lock()
            .values()
            .map(|active| active.name.clone())
            .collect()
    }

    /// Remove every channel and refuse new subscriptions
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let drained: Vec<ActiveChannel> = self
            .inner
            .channels
            .lock()
            .drain()
            .map(|(_, active)| active)
            .collect();

        let count = drained.len();
        for active in drained {
            active.shutdown(self.inner.feed.as_ref());
        }
        info!("Realtime client closed ({} channels removed)", count);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// Owner of one subscription; dropping it tears the channel down.
///
/// Must not be dropped from inside one of its own handlers.
pub struct SubscriptionHandle {
    client: Weak<ClientInner>,
    coordinates: Coordinates,
    name: Option<String>,
}

impl SubscriptionHandle {
    fn inert(coordinates: Coordinates) -> Self {
        Self {
            client: Weak::new(),
            coordinates,
            name: None,
        }
    }

    /// Channel name, `None` for a disabled subscription
    pub fn channel_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_active(&self) -> bool {
        match (self.client.upgrade(), &self.name) {
            (Some(client), Some(name)) => client
                .channels
                .lock()
                .get(&self.coordinates)
                .map(|active| &active.name == name)
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let (Some(client), Some(name)) = (self.client.upgrade(), self.name.take()) {
            client.remove_channel(&self.coordinates, &name);
        }
    }
}

fn channel_name(table: &str, filter: Option<&str>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "guest-{}-{}-{}-{}",
        table,
        filter.unwrap_or("all"),
        chrono::Utc::now().timestamp_millis(),
        &suffix[..9]
    )
}

async fn dispatch(
    client: Weak<ClientInner>,
    coordinates: Coordinates,
    name: String,
    mut receiver: mpsc::Receiver<FeedMessage>,
    gate: Arc<RwLock<bool>>,
    handlers: ChangeHandlers,
    cache: QueryCache,
    query_key: QueryKey,
) {
    let table = &coordinates.0;
    while let Some(message) = receiver.recv().await {
        match message {
            FeedMessage::Change(change) => {
                if !deliver(&gate, &handlers, &cache, &query_key, &change) {
                    break;
                }
            }
            FeedMessage::Status(ChannelStatus::Subscribed) => {
                debug!("[Realtime] {} subscribed ({})", table, name);
            }
            FeedMessage::Status(ChannelStatus::ChannelError(reason)) => {
                error!("[Realtime] {} channel error - {}", table, reason);
            }
            FeedMessage::Status(ChannelStatus::TimedOut) => {
                error!("[Realtime] {} timeout", table);
            }
            FeedMessage::Status(ChannelStatus::Closed) => {
                warn!("[Realtime] {} channel {} closed by transport", table, name);
                if let Some(client) = client.upgrade() {
                    client.forget_channel(&coordinates, &name);
                }
                break;
            }
        }
    }
    debug!("Dispatch for {} stopped", name);
}

/// Run handlers and invalidate under the gate; false once torn down.
fn deliver(
    gate: &RwLock<bool>,
    handlers: &ChangeHandlers,
    cache: &QueryCache,
    query_key: &QueryKey,
    change: &RowChange,
) -> bool {
    let open = gate.read();
    if !*open {
        return false;
    }

    debug!("[Realtime] {} {}", change.table, change.kind);
    handlers.call(change);
    cache.invalidate(query_key);
    true
}
