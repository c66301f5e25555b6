//! Guest conversation entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "guest_conversation")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub guest_id: String, // unique together with hotel_id
    pub hotel_id: String,
    pub created_at: i64,               // microseconds since epoch
    pub last_message_at: Option<i64>, // None until the first message
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::guest_messages::Entity")]
    GuestMessages,
}

impl Related<super::guest_messages::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GuestMessages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
