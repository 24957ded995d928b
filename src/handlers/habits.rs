//! Habit CRUD plus the day-level completion toggle.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::habit::{
    CreateHabitRequest, Habit, HabitCompletion, HabitDetail, ToggleCompletionRequest,
    ToggleCompletionResponse, UpdateHabitRequest,
};
use crate::AppState;

async fn find_habit(db: &PgPool, habit_id: Uuid, user_id: Uuid) -> AppResult<Habit> {
    sqlx::query_as::<_, Habit>("SELECT * FROM habits WHERE id = $1 AND user_id = $2")
        .bind(habit_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound("Habit not found".into()))
}

/// One consistent read of the habit aggregate (habit row + completions),
/// used both for plain reads and as the post-mutation snapshot the toggle
/// returns.
async fn load_habit_detail(db: &PgPool, habit_id: Uuid, user_id: Uuid) -> AppResult<HabitDetail> {
    let habit = find_habit(db, habit_id, user_id).await?;
    let completions = sqlx::query_as::<_, HabitCompletion>(
        "SELECT * FROM habit_completions WHERE habit_id = $1 ORDER BY completed_date DESC",
    )
    .bind(habit_id)
    .fetch_all(db)
    .await?;

    Ok(HabitDetail { habit, completions })
}

pub async fn list_habits(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<HabitDetail>>> {
    let habits = sqlx::query_as::<_, Habit>(
        "SELECT * FROM habits WHERE user_id = $1 ORDER BY created_at ASC",
    )
    .bind(auth_user.id)
    .fetch_all(&state.db)
    .await?;

    let mut result = Vec::with_capacity(habits.len());
    for habit in habits {
        let completions = sqlx::query_as::<_, HabitCompletion>(
            "SELECT * FROM habit_completions WHERE habit_id = $1 ORDER BY completed_date DESC",
        )
        .bind(habit.id)
        .fetch_all(&state.db)
        .await?;
        result.push(HabitDetail { habit, completions });
    }

    Ok(Json(result))
}

pub async fn create_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateHabitRequest>,
) -> AppResult<(StatusCode, Json<HabitDetail>)> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let habit = sqlx::query_as::<_, Habit>(
        r#"
        INSERT INTO habits (id, user_id, title, description, color, icon, target_days)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(&body.title)
    .bind(&body.description)
    .bind(body.color.as_deref().unwrap_or("#3B82F6"))
    .bind(&body.icon)
    .bind(body.target_days.unwrap_or(7))
    .fetch_one(&state.db)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(HabitDetail {
            habit,
            completions: vec![],
        }),
    ))
}

pub async fn get_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
) -> AppResult<Json<HabitDetail>> {
    let detail = load_habit_detail(&state.db, habit_id, auth_user.id).await?;
    Ok(Json(detail))
}

pub async fn update_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
    Json(body): Json<UpdateHabitRequest>,
) -> AppResult<Json<HabitDetail>> {
    sqlx::query_as::<_, Habit>(
        r#"
        UPDATE habits SET
            title = COALESCE($3, title),
            description = COALESCE($4, description),
            color = COALESCE($5, color),
            icon = COALESCE($6, icon),
            target_days = COALESCE($7, target_days),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(habit_id)
    .bind(auth_user.id)
    .bind(&body.title)
    .bind(&body.description)
    .bind(&body.color)
    .bind(&body.icon)
    .bind(body.target_days)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Habit not found".into()))?;

    let detail = load_habit_detail(&state.db, habit_id, auth_user.id).await?;
    Ok(Json(detail))
}

pub async fn delete_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM habits WHERE id = $1 AND user_id = $2")
        .bind(habit_id)
        .bind(auth_user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Habit not found".into()));
    }

    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Toggle a day-level completion: create when absent, delete when present.
/// Calling it twice for the same date cancels itself.
pub async fn toggle_completion(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
    Json(body): Json<ToggleCompletionRequest>,
) -> AppResult<(StatusCode, Json<ToggleCompletionResponse>)> {
    find_habit(&state.db, habit_id, auth_user.id).await?;

    let date = body
        .date
        .ok_or_else(|| AppError::Validation("A valid date is required.".into()))?;

    let existing = sqlx::query_as::<_, HabitCompletion>(
        "SELECT * FROM habit_completions WHERE habit_id = $1 AND completed_date = $2",
    )
    .bind(habit_id)
    .bind(date)
    .fetch_optional(&state.db)
    .await?;

    if let Some(existing) = existing {
        sqlx::query("DELETE FROM habit_completions WHERE id = $1")
            .bind(existing.id)
            .execute(&state.db)
            .await?;

        let data = load_habit_detail(&state.db, habit_id, auth_user.id).await?;
        return Ok((
            StatusCode::OK,
            Json(ToggleCompletionResponse {
                status: "completion removed",
                data,
            }),
        ));
    }

    // A concurrent toggle may have inserted the same (habit, date) between
    // the check above and here; the unique constraint makes the second
    // writer a no-op and the re-read below reflects whichever row won.
    sqlx::query(
        r#"
        INSERT INTO habit_completions (id, habit_id, completed_date, note)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (habit_id, completed_date) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(habit_id)
    .bind(date)
    .bind(&body.note)
    .execute(&state.db)
    .await?;

    let data = load_habit_detail(&state.db, habit_id, auth_user.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(ToggleCompletionResponse {
            status: "completion added",
            data,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_date_is_a_validation_error() {
        let body = ToggleCompletionRequest {
            date: None,
            note: None,
        };
        let err = body
            .date
            .ok_or_else(|| AppError::Validation("A valid date is required.".into()))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_create_habit_request_requires_title() {
        let body = CreateHabitRequest {
            title: String::new(),
            description: None,
            color: None,
            icon: None,
            target_days: None,
        };
        assert!(body.validate().is_err());
    }
}
