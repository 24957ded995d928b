use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JournalEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub sentiment: Option<String>,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateJournalEntryRequest {
    /// Default: "Untitled Entry"
    pub title: Option<String>,
    pub content: String,
    pub sentiment: Option<String>,
    pub is_locked: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateJournalEntryRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub sentiment: Option<String>,
    pub is_locked: Option<bool>,
}
