use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::mood::{CreateMoodRequest, Mood, UpdateMoodRequest};
use crate::AppState;

pub async fn list_moods(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<Mood>>> {
    let moods = sqlx::query_as::<_, Mood>(
        "SELECT * FROM moods WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(auth_user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(moods))
}

pub async fn create_mood(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateMoodRequest>,
) -> AppResult<(StatusCode, Json<Mood>)> {
    let mood = sqlx::query_as::<_, Mood>(
        r#"
        INSERT INTO moods (id, user_id, mood_type, intensity, note)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(body.mood_type)
    .bind(body.intensity.unwrap_or(3))
    .bind(&body.note)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(mood)))
}

pub async fn get_mood(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(mood_id): Path<Uuid>,
) -> AppResult<Json<Mood>> {
    let mood = sqlx::query_as::<_, Mood>("SELECT * FROM moods WHERE id = $1 AND user_id = $2")
        .bind(mood_id)
        .bind(auth_user.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("Mood not found".into()))?;

    Ok(Json(mood))
}

pub async fn update_mood(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(mood_id): Path<Uuid>,
    Json(body): Json<UpdateMoodRequest>,
) -> AppResult<Json<Mood>> {
    let mood = sqlx::query_as::<_, Mood>(
        r#"
        UPDATE moods SET
            mood_type = COALESCE($3, mood_type),
            intensity = COALESCE($4, intensity),
            note = COALESCE($5, note)
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(mood_id)
    .bind(auth_user.id)
    .bind(body.mood_type)
    .bind(body.intensity)
    .bind(&body.note)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Mood not found".into()))?;

    Ok(Json(mood))
}

pub async fn delete_mood(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(mood_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM moods WHERE id = $1 AND user_id = $2")
        .bind(mood_id)
        .bind(auth_user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Mood not found".into()));
    }

    Ok(Json(serde_json::json!({ "deleted": true })))
}
