//! Message store - guest/staff chat messages

use crate::entities::guest_messages;
use crate::publisher::ChangePublisher;
use crate::types::{now_micros, Enrichment, GuestMessage, NewMessage, SenderType};
use sea_orm::*;
use tracing::{debug, info};

const TABLE: &str = "guest_messages";

/// Message store
#[derive(Clone)]
pub struct MessageStore {
    db: DatabaseConnection,
    publisher: ChangePublisher,
}

impl MessageStore {
    pub fn new(db: DatabaseConnection, publisher: ChangePublisher) -> Self {
        Self { db, publisher }
    }

    /// Insert a message. Enrichment fields start empty and `is_read` false.
    pub async fn insert(&self, message: NewMessage) -> Result<GuestMessage, DbErr> {
        let record = guest_messages::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            conversation_id: Set(message.conversation_id),
            guest_id: Set(message.guest_id),
            hotel_id: Set(message.hotel_id),
            sender_type: Set(message.sender_type.as_str().to_string()),
            message_text: Set(message.message_text),
            translated_text: Set(None),
            is_translated: Set(false),
            original_language: Set(message.original_language),
            target_language: Set(message.target_language),
            sentiment: Set(None),
            urgency: Set(None),
            topic: Set(None),
            subtopic: Set(None),
            is_read: Set(false),
            created_at: Set(now_micros()),
            created_by: Set(message.created_by),
        };

        let model = record.insert(&self.db).await?;
        debug!(
            "Stored {} message {} in conversation {}",
            model.sender_type, model.id, model.conversation_id
        );

        self.publisher.inserted(TABLE, &model);
        Ok(model.into())
    }

    /// Get a message by ID
    pub async fn get(&self, id: &str) -> Result<Option<GuestMessage>, DbErr> {
        let message = guest_messages::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;

        Ok(message.map(GuestMessage::from))
    }

    /// Messages of a conversation in read order: `created_at` ascending,
    /// ties broken by ID
    pub async fn list_for_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<GuestMessage>, DbErr> {
        let messages = guest_messages::Entity::find()
            .filter(guest_messages::Column::ConversationId.eq(conversation_id))
            .order_by_asc(guest_messages::Column::CreatedAt)
            .order_by_asc(guest_messages::Column::Id)
            .all(&self.db)
            .await?;

        Ok(messages.into_iter().map(GuestMessage::from).collect())
    }

    /// Write analysis results onto a message. Only fields present in
    /// `enrichment` are changed.
    pub async fn apply_enrichment(
        &self,
        message_id: &str,
        enrichment: Enrichment,
    ) -> Result<GuestMessage, DbErr> {
        let model = guest_messages::Entity::find_by_id(message_id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("message {}", message_id)))?;

        let mut active: guest_messages::ActiveModel = model.clone().into();
        if let Some(translated) = enrichment.translated_text {
            active.translated_text = Set(Some(translated));
            active.is_translated = Set(true);
        }
        if let Some(sentiment) = enrichment.sentiment {
            active.sentiment = Set(Some(sentiment));
        }
        if let Some(urgency) = enrichment.urgency {
            active.urgency = Set(Some(urgency));
        }
        if let Some(topic) = enrichment.topic {
            active.topic = Set(Some(topic));
        }
        if let Some(subtopic) = enrichment.subtopic {
            active.subtopic = Set(Some(subtopic));
        }

        if !active.is_changed() {
            return Ok(model.into());
        }

        let updated = active.update(&self.db).await?;
        info!("Enriched message {}", message_id);

        self.publisher.updated(TABLE, &model, &updated);
        Ok(updated.into())
    }

    /// Mark every unread message from `sender` in a conversation as read.
    /// Returns the number of messages changed.
    pub async fn mark_read(
        &self,
        conversation_id: &str,
        sender: SenderType,
    ) -> Result<u64, DbErr> {
        let unread = guest_messages::Entity::find()
            .filter(guest_messages::Column::ConversationId.eq(conversation_id))
            .filter(guest_messages::Column::SenderType.eq(sender.as_str()))
            .filter(guest_messages::Column::IsRead.eq(false))
            .all(&self.db)
            .await?;

        let mut changed = 0;
        for model in unread {
            let mut active: guest_messages::ActiveModel = model.clone().into();
            active.is_read = Set(true);
            let updated = active.update(&self.db).await?;
            self.publisher.updated(TABLE, &model, &updated);
            changed += 1;
        }

        if changed > 0 {
            debug!(
                "Marked {} {} messages read in conversation {}",
                changed, sender, conversation_id
            );
        }
        Ok(changed)
    }

    /// Staff messages the guest has not read yet, across all conversations
    pub async fn unread_count_for_guest(&self, guest_id: &str) -> Result<u64, DbErr> {
        guest_messages::Entity::find()
            .filter(guest_messages::Column::GuestId.eq(guest_id))
            .filter(guest_messages::Column::SenderType.eq(SenderType::Staff.as_str()))
            .filter(guest_messages::Column::IsRead.eq(false))
            .count(&self.db)
            .await
    }
}
