//! Conversation store - one conversation per guest and hotel

use crate::entities::guest_conversation;
use crate::publisher::ChangePublisher;
use crate::types::{now_micros, Conversation};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use tracing::{debug, info};

const TABLE: &str = "guest_conversation";

/// Conversation store
#[derive(Clone)]
pub struct ConversationStore {
    db: DatabaseConnection,
    publisher: ChangePublisher,
}

impl ConversationStore {
    pub fn new(db: DatabaseConnection, publisher: ChangePublisher) -> Self {
        Self { db, publisher }
    }

    /// Look up the conversation for a guest at a hotel
    pub async fn find(&self, guest_id: &str, hotel_id: &str) -> Result<Option<Conversation>, DbErr> {
        let conversation = guest_conversation::Entity::find()
            .filter(guest_conversation::Column::GuestId.eq(guest_id))
            .filter(guest_conversation::Column::HotelId.eq(hotel_id))
            .one(&self.db)
            .await?;

        Ok(conversation.map(Conversation::from))
    }

    /// Get a conversation by ID
    pub async fn get(&self, id: &str) -> Result<Option<Conversation>, DbErr> {
        let conversation = guest_conversation::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;

        Ok(conversation.map(Conversation::from))
    }

    /// Get the guest's conversation with a hotel, creating it if absent.
    ///
    /// A concurrent create for the same pair loses on the unique index and
    /// returns the row the winner inserted.
    pub async fn ensure(&self, guest_id: &str, hotel_id: &str) -> Result<Conversation, DbErr> {
        if let Some(existing) = self.find(guest_id, hotel_id).await? {
            debug!("Found conversation {} for guest {}", existing.id, guest_id);
            return Ok(existing);
        }

        let new_conversation = guest_conversation::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            guest_id: Set(guest_id.to_string()),
            hotel_id: Set(hotel_id.to_string()),
            created_at: Set(now_micros()),
            last_message_at: Set(None),
        };

        match new_conversation.insert(&self.db).await {
            Ok(model) => {
                info!(
                    "Created conversation {} for guest {} at hotel {}",
                    model.id, guest_id, hotel_id
                );
                self.publisher.inserted(TABLE, &model);
                Ok(model.into())
            }
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                info!(
                    "Conversation for guest {} at hotel {} created concurrently, fetching it",
                    guest_id, hotel_id
                );
                self.find(guest_id, hotel_id).await?.ok_or_else(|| {
                    DbErr::RecordNotFound(format!(
                        "conversation for guest {} at hotel {}",
                        guest_id, hotel_id
                    ))
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Record that a message was posted at `at`. The timestamp never moves
    /// backwards, also under concurrent touches: the comparison happens in
    /// the UPDATE itself.
    pub async fn touch_last_message(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<Conversation, DbErr> {
        let before = guest_conversation::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("conversation {}", id)))?;

        let at = at.timestamp_micros();
        let result = guest_conversation::Entity::update_many()
            .col_expr(guest_conversation::Column::LastMessageAt, Expr::value(at))
            .filter(guest_conversation::Column::Id.eq(id))
            .filter(
                Condition::any()
                    .add(guest_conversation::Column::LastMessageAt.is_null())
                    .add(guest_conversation::Column::LastMessageAt.lt(at)),
            )
            .exec(&self.db)
            .await?;

        let after = guest_conversation::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("conversation {}", id)))?;

        if result.rows_affected > 0 {
            debug!("Conversation {} last message at {}", id, at);
            self.publisher.updated(TABLE, &before, &after);
        }
        Ok(after.into())
    }

    /// All conversations of a guest, most recently active first
    pub async fn list_for_guest(&self, guest_id: &str) -> Result<Vec<Conversation>, DbErr> {
        let conversations = guest_conversation::Entity::find()
            .filter(guest_conversation::Column::GuestId.eq(guest_id))
            .order_by_desc(guest_conversation::Column::LastMessageAt)
            .order_by_desc(guest_conversation::Column::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(conversations.into_iter().map(Conversation::from).collect())
    }
}
