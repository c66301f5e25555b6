//! Guest message entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "guest_messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub conversation_id: String,
    pub guest_id: String,
    pub hotel_id: String,
    pub sender_type: String, // "guest" or "staff"
    pub message_text: String,
    pub translated_text: Option<String>,
    pub is_translated: bool,
    pub original_language: String,
    pub target_language: Option<String>,
    pub sentiment: Option<String>,
    pub urgency: Option<String>,
    pub topic: Option<String>,
    pub subtopic: Option<String>,
    pub is_read: bool,
    pub created_at: i64,
    pub created_by: Option<String>, // staff user id, None for guest messages
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::guest_conversation::Entity",
        from = "Column::ConversationId",
        to = "super::guest_conversation::Column::Id",
        on_delete = "Cascade"
    )]
    GuestConversation,
}

impl Related<super::guest_conversation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GuestConversation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
