//! Domain types returned by the stores

use crate::entities::{guest_conversation, guest_messages, service_requests};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub(crate) fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Guest,
    Staff,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::Guest => "guest",
            SenderType::Staff => "staff",
        }
    }
}

impl fmt::Display for SenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SenderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(SenderType::Guest),
            "staff" => Ok(SenderType::Staff),
            other => Err(format!("Unknown sender type: {}", other)),
        }
    }
}

/// Lifecycle of a service request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    /// Still waiting on staff
    pub fn is_open(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::InProgress)
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "in_progress" => Ok(RequestStatus::InProgress),
            "completed" => Ok(RequestStatus::Completed),
            "cancelled" => Ok(RequestStatus::Cancelled),
            other => Err(format!("Unknown request status: {}", other)),
        }
    }
}

/// Thread between one guest and one hotel's staff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub guest_id: String,
    pub hotel_id: String,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl From<guest_conversation::Model> for Conversation {
    fn from(model: guest_conversation::Model) -> Self {
        Self {
            id: model.id,
            guest_id: model.guest_id,
            hotel_id: model.hotel_id,
            created_at: from_micros(model.created_at),
            last_message_at: model.last_message_at.map(from_micros),
        }
    }
}

/// Stored chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestMessage {
    pub id: String,
    pub conversation_id: String,
    pub guest_id: String,
    pub hotel_id: String,
    pub sender_type: SenderType,
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
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

impl From<guest_messages::Model> for GuestMessage {
    fn from(model: guest_messages::Model) -> Self {
        Self {
            id: model.id,
            conversation_id: model.conversation_id,
            guest_id: model.guest_id,
            hotel_id: model.hotel_id,
            // Rows are only written through MessageStore, which stores
            // SenderType::as_str; anything else is staff-side tooling.
            sender_type: model.sender_type.parse().unwrap_or(SenderType::Staff),
            message_text: model.message_text,
            translated_text: model.translated_text,
            is_translated: model.is_translated,
            original_language: model.original_language,
            target_language: model.target_language,
            sentiment: model.sentiment,
            urgency: model.urgency,
            topic: model.topic,
            subtopic: model.subtopic,
            is_read: model.is_read,
            created_at: from_micros(model.created_at),
            created_by: model.created_by,
        }
    }
}

/// Message to insert
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub guest_id: String,
    pub hotel_id: String,
    pub sender_type: SenderType,
    pub message_text: String,
    pub original_language: String,
    pub target_language: Option<String>,
    pub created_by: Option<String>,
}

impl NewMessage {
    pub fn from_guest(
        conversation_id: impl Into<String>,
        guest_id: impl Into<String>,
        hotel_id: impl Into<String>,
        message_text: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            guest_id: guest_id.into(),
            hotel_id: hotel_id.into(),
            sender_type: SenderType::Guest,
            message_text: message_text.into(),
            original_language: "en".to_string(),
            target_language: None,
            created_by: None,
        }
    }

    pub fn from_staff(
        conversation: &Conversation,
        staff_id: impl Into<String>,
        message_text: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation.id.clone(),
            guest_id: conversation.guest_id.clone(),
            hotel_id: conversation.hotel_id.clone(),
            sender_type: SenderType::Staff,
            message_text: message_text.into(),
            original_language: "en".to_string(),
            target_language: None,
            created_by: Some(staff_id.into()),
        }
    }

    pub fn languages(mut self, original: impl Into<String>, target: Option<String>) -> Self {
        self.original_language = original.into();
        self.target_language = target;
        self
    }
}

/// Fields written by asynchronous message analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub translated_text: Option<String>,
    pub sentiment: Option<String>,
    pub urgency: Option<String>,
    pub topic: Option<String>,
    pub subtopic: Option<String>,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.translated_text.is_none()
            && self.sentiment.is_none()
            && self.urgency.is_none()
            && self.topic.is_none()
            && self.subtopic.is_none()
    }
}

/// Guest service request (room service, housekeeping, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: String,
    pub guest_id: String,
    pub hotel_id: String,
    pub request_type: String,
    pub description: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<service_requests::Model> for ServiceRequest {
    fn from(model: service_requests::Model) -> Self {
        Self {
            id: model.id,
            guest_id: model.guest_id,
            hotel_id: model.hotel_id,
            request_type: model.request_type,
            description: model.description,
            status: model.status.parse().unwrap_or(RequestStatus::Pending),
            created_at: from_micros(model.created_at),
            updated_at: from_micros(model.updated_at),
        }
    }
}
