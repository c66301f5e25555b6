//! Concierge Chat - the guest side of hotel messaging
//!
//! - **GuestChat**: conversation lookup, message send with detached
//!   analysis, cached message lists and live message channels
//! - **Analyzer**: translation and tagging service (`HttpAnalyzer` over HTTP)
//! - **NotificationAggregator**: bell badge from open requests and unread
//!   staff messages
//! - **GuestSession**: owns all of the above for one signed-in guest
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use concierge_chat::{ConciergeConfig, GuestCredentials, GuestSession, SendMessage};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ConciergeConfig::from_env();
//! let session = GuestSession::open(config, GuestCredentials::new("guest-1", "hotel-1")).await?;
//!
//! let conversation = session.conversation().await?;
//! let _live = session.chat().watch_messages(&conversation.id).await?;
//!
//! session
//!     .chat()
//!     .send_message(SendMessage::new(&conversation, "Could I get extra towels?").languages("English", "es"))
//!     .await?;
//!
//! for message in session.chat().list_messages(&conversation.id).await? {
//!     println!("{}: {}", message.sender_type, message.message_text);
//! }
//!
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod config;
pub mod detached;
pub mod error;
pub mod language;
pub mod notifications;
pub mod pipeline;
pub mod session;

pub use analyzer::{AnalysisRequest, AnalysisResult, Analyzer, HttpAnalyzer};
pub use config::{AnalyzerConfig, CacheConfig, ConciergeConfig, RealtimeConfig, StorageConfig};
pub use detached::{spawn_detached, DetachedPolicy, DetachedTask, TaskFailure};
pub use error::{AnalysisError, ChatError};
pub use language::normalize_language_to_code;
pub use notifications::{total_unseen, BadgeState, NotificationAggregator};
pub use pipeline::{AnalysisEvent, AnalysisState, GuestChat, SendMessage};
pub use session::{GuestCredentials, GuestSession};
