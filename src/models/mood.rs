use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The fixed mood vocabulary. Capitalized names are the wire format and the
/// Postgres enum labels; everything keyed by mood (greetings, prompts) must
/// match on this exhaustively.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "mood_type")]
pub enum MoodType {
    Happy,
    Sad,
    Angry,
    Depressed,
    Frustrated,
    Disappointed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Mood {
    pub id: Uuid,
    pub user_id: Uuid,
    pub mood_type: MoodType,
    pub intensity: i32,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMoodRequest {
    pub mood_type: MoodType,
    pub intensity: Option<i32>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMoodRequest {
    pub mood_type: Option<MoodType>,
    pub intensity: Option<i32>,
    pub note: Option<String>,
}
