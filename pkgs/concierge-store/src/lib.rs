//! Concierge Store - persistent storage for guest conversations
//!
//! SQLite storage through Sea-ORM for the three tables the guest chat core
//! reads and writes:
//!
//! - `guest_conversation`: one row per guest and hotel, with `last_message_at`
//! - `guest_messages`: guest and staff messages plus analysis enrichment
//! - `service_requests`: room service, housekeeping and similar requests
//!
//! Every committed write is announced on the realtime change feed through a
//! [`ChangePublisher`], so subscribers see inserts and updates the same way
//! they would from a hosted database.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use concierge_store::{ChangePublisher, NewMessage, PersistenceConfig, Store};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PersistenceConfig {
//!     db_path: "concierge.db".into(),
//!     ..Default::default()
//! };
//! let store = Store::open(&config, ChangePublisher::disabled()).await?;
//!
//! let conversation = store.conversations().ensure("guest-1", "hotel-1").await?;
//! store
//!     .messages()
//!     .insert(NewMessage::from_guest(&conversation.id, "guest-1", "hotel-1", "Hello"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod conversation_store;
pub mod entities;
pub mod message_store;
pub mod migration;
pub mod publisher;
pub mod request_store;
pub mod types;

pub use conversation_store::ConversationStore;
pub use message_store::MessageStore;
pub use publisher::ChangePublisher;
pub use request_store::RequestStore;
pub use types::{
    Conversation, Enrichment, GuestMessage, NewMessage, RequestStatus, SenderType,
    ServiceRequest,
};

pub use sea_orm::{DatabaseConnection, DbErr};

use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::MigratorTrait;
use std::path::PathBuf;
use tracing::info;

/// Configuration for persistence layer
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,

    /// Maximum pooled connections (default: 5)
    pub max_connections: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("concierge.db"),
            max_connections: 5,
        }
    }
}

/// All stores over one database connection
#[derive(Clone)]
pub struct Store {
    db: DatabaseConnection,
    conversations: ConversationStore,
    messages: MessageStore,
    requests: RequestStore,
}

impl Store {
    /// Open (or create) the database at `config.db_path` and run migrations
    pub async fn open(config: &PersistenceConfig, publisher: ChangePublisher) -> Result<Self> {
        let db_path_str = config
            .db_path
            .to_str()
            .context("Invalid database path")?
            .replace('\\', "/");

        let db_url = format!("sqlite:{}?mode=rwc", db_path_str);

        let mut options = ConnectOptions::new(db_url);
        options
            .max_connections(config.max_connections)
            .sqlx_logging(false);

        let db = Database::connect(options)
            .await
            .context("Failed to connect to database")?;

        migration::Migrator::up(&db, None)
            .await
            .context("Failed to run migrations")?;

        info!("Concierge store initialized at {}", config.db_path.display());

        Ok(Self::with_connection(db, publisher))
    }

    /// Build the stores over an existing, already migrated connection
    pub fn with_connection(db: DatabaseConnection, publisher: ChangePublisher) -> Self {
        Self {
            conversations: ConversationStore::new(db.clone(), publisher.clone()),
            messages: MessageStore::new(db.clone(), publisher.clone()),
            requests: RequestStore::new(db.clone(), publisher),
            db,
        }
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    pub fn requests(&self) -> &RequestStore {
        &self.requests
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}
