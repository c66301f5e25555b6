//! Guest session: one set of clients per signed-in guest

use crate::analyzer::{Analyzer, HttpAnalyzer};
use crate::config::ConciergeConfig;
use crate::error::ChatError;
use crate::notifications::NotificationAggregator;
use crate::pipeline::GuestChat;
use anyhow::{Context, Result};
use concierge_realtime::{BroadcastFeed, QueryCache, RealtimeClient};
use concierge_store::{ChangePublisher, Conversation, Store};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Who the session acts for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestCredentials {
    pub guest_id: String,
    pub hotel_id: String,
    /// Guest session token; the analyzer falls back to the anon key without one
    pub token: Option<String>,
}

impl GuestCredentials {
    pub fn new(guest_id: impl Into<String>, hotel_id: impl Into<String>) -> Self {
        Self {
            guest_id: guest_id.into(),
            hotel_id: hotel_id.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Owns the store, cache, change feed and clients of one guest. A new token
/// means a new session.
pub struct GuestSession {
    credentials: GuestCredentials,
    config: ConciergeConfig,
    store: Store,
    feed: Arc<BroadcastFeed>,
    realtime: RealtimeClient,
    chat: GuestChat,
    notifications: NotificationAggregator,
    cache_gc: JoinHandle<()>,
}

impl GuestSession {
    /// Open the database, run migrations and build the clients
    pub async fn open(config: ConciergeConfig, credentials: GuestCredentials) -> Result<Self> {
        let feed = BroadcastFeed::new(config.realtime.channel_buffer);
        let store = Store::open(&config.persistence(), ChangePublisher::new(feed.clone()))
            .await
            .context("Failed to open concierge store")?;

        let analyzer: Option<Arc<dyn Analyzer>> = if config.analyzer.is_active() {
            let endpoint = config.analyzer.endpoint.clone().unwrap_or_default();
            let analyzer = HttpAnalyzer::new(
                endpoint,
                config.analyzer.anon_key.clone().unwrap_or_default(),
                credentials.token.clone(),
                config.analyzer.timeout(),
            )
            .context("Failed to create analyzer client")?;
            info!("Message analysis via {}", analyzer.endpoint());
            Some(Arc::new(analyzer) as Arc<dyn Analyzer>)
        } else {
            info!("Message analysis disabled");
            None
        };

        Ok(Self::with_parts(config, credentials, store, feed, analyzer))
    }

    /// Assemble a session from already opened parts. Must be called within
    /// a tokio runtime.
    pub fn with_parts(
        config: ConciergeConfig,
        credentials: GuestCredentials,
        store: Store,
        feed: Arc<BroadcastFeed>,
        analyzer: Option<Arc<dyn Analyzer>>,
    ) -> Self {
        let cache = QueryCache::new();
        let cache_gc = cache.spawn_gc(config.cache.gc_interval());
        let realtime = RealtimeClient::new(feed.clone(), cache.clone());
        let chat = GuestChat::new(
            store.clone(),
            realtime.clone(),
            analyzer,
            config.cache.clone(),
        );
        let notifications = NotificationAggregator::new(
            credentials.guest_id.clone(),
            store.clone(),
            cache,
            config.cache.counts_policy(),
        );

        info!(
            "Guest session opened for {} at hotel {}",
            credentials.guest_id, credentials.hotel_id
        );

        Self {
            credentials,
            config,
            store,
            feed,
            realtime,
            chat,
            notifications,
            cache_gc,
        }
    }

    pub fn credentials(&self) -> &GuestCredentials {
        &self.credentials
    }

    pub fn config(&self) -> &ConciergeConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn feed(&self) -> &Arc<BroadcastFeed> {
        &self.feed
    }

    pub fn realtime(&self) -> &RealtimeClient {
        &self.realtime
    }

    pub fn cache(&self) -> &QueryCache {
        self.realtime.cache()
    }

    pub fn chat(&self) -> &GuestChat {
        &self.chat
    }

    pub fn notifications(&self) -> &NotificationAggregator {
        &self.notifications
    }

    /// The guest's conversation with the session's hotel
    pub async fn conversation(&self) -> Result<Conversation, ChatError> {
        self.chat
            .ensure_conversation(&self.credentials.guest_id, &self.credentials.hotel_id)
            .await
    }

    /// Close every realtime channel, then drop cached data
    pub fn close(&self) {
        self.realtime.close();
        self.cache_gc.abort();
        self.cache().clear();
        info!("Guest session for {} closed", self.credentials.guest_id);
    }
}

impl Drop for GuestSession {
    fn drop(&mut self) {
        self.cache_gc.abort();
    }
}
