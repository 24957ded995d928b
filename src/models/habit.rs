use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Habit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub color: String,
    pub icon: Option<String>,
    pub target_days: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// At most one row per (habit, completed_date); enforced by a unique
/// constraint, not by application-level convention.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HabitCompletion {
    pub id: Uuid,
    pub habit_id: Uuid,
    pub completed_date: NaiveDate,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Habit with its refreshed completion list, newest date first.
#[derive(Debug, Serialize)]
pub struct HabitDetail {
    #[serde(flatten)]
    pub habit: Habit,
    pub completions: Vec<HabitCompletion>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateHabitRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    pub description: Option<String>,
    /// Hex color code. Default: "#3B82F6"
    pub color: Option<String>,
    pub icon: Option<String>,
    /// Default: 7
    pub target_days: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateHabitRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub target_days: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleCompletionRequest {
    /// Required; Option so a missing field maps to a validation error
    /// instead of a body-rejection.
    pub date: Option<NaiveDate>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ToggleCompletionResponse {
    /// "completion added" or "completion removed"
    pub status: &'static str,
    pub data: HabitDetail,
}
