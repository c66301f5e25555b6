//! Concierge Realtime - live row subscriptions and query-cache invalidation
//!
//! Two pieces keep what a guest sees in step with the database:
//!
//! - **QueryCache**: key-addressed read-through cache. Producers call
//!   [`QueryCache::invalidate`] with a key prefix; consumers refetch on
//!   their next read or react to the invalidation stream.
//! - **RealtimeClient**: opens one uniquely-named channel per
//!   `(table, filter)` on a [`ChangeFeed`], runs the typed handlers for each
//!   row change and then invalidates the subscription's query key.
//!
//! Channel failures (errors, timeouts, transport closes) are logged and
//! never surfaced; consumers fall back to cache staleness.
//!
//! # Example
//!
//! ```rust,no_run
//! use concierge_realtime::{BroadcastFeed, QueryCache, QueryKey, RealtimeClient, Subscription};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let feed = BroadcastFeed::new(64);
//! let client = RealtimeClient::new(feed.clone(), QueryCache::new());
//!
//! let handle = client
//!     .subscribe(
//!         Subscription::new("guest_messages", QueryKey::guest_messages("c1"))
//!             .filter("conversation_id=eq.c1")
//!             .on_insert(|row| println!("new message: {}", row)),
//!     )
//!     .await?;
//!
//! // ... later, when the view goes away
//! handle.unsubscribe();
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod error;
pub mod feed;

pub use cache::{CachePolicy, CacheStats, QueryCache, QueryKey};
pub use client::{ChangeHandlers, RealtimeClient, RowHandler, Subscription, SubscriptionHandle};
pub use error::RealtimeError;
pub use feed::{
    BroadcastFeed, ChangeFeed, ChangeKind, ChannelSpec, ChannelStatus, FeedMessage, RowChange,
    RowFilter,
};
