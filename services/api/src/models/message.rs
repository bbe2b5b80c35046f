//! Message and conversation models
//!
//! A conversation is derived, not stored: one per trip the user created
//! or was accepted into. Unread counts are computed at read time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::trip::TripSummary;

/// Message entity, scoped to a trip's conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Message as shown in a conversation, with the sender's name joined in
#[derive(Debug, Clone, Serialize)]
pub struct MessageWithSender {
    #[serde(flatten)]
    pub message: Message,
    pub sender_name: String,
}

/// Message creation payload
#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    pub content: String,
}

/// One entry in the conversation list
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub trip: TripSummary,
    pub last_message: Option<Message>,
    pub unread_count: i64,
}
