//! Conversation flow: seeded greetings, message exchange with the AI
//! companion, and the literal fallback when the companion is unreachable.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::conversation::{
    Conversation, ConversationDetail, CreateConversationRequest, Message, MessageRole,
    PostMessageRequest, UpdateConversationRequest,
};
use crate::models::mood::MoodType;
use crate::services::companion::{ChatTurn, Companion, TurnRole};
use crate::AppState;

/// Returned verbatim when the companion call fails for any reason; the
/// caller always gets a reply.
const FALLBACK_REPLY: &str = "I'm sorry, I'm having a little trouble connecting right now. \
     Please give me a moment and try again.";

const BASE_PERSONA: &str = "You are an empathetic AI companion for students named 'Aura'. \
     Your goal is to provide emotional support, validation, and gentle guidance. \
     Your personality is warm, patient, and encouraging. Keep your responses concise \
     and easy to understand. Use emojis where appropriate to convey warmth. Never give \
     medical advice or diagnoses. Always prioritize listening and validating the user's \
     feelings.";

/// Seeded assistant greeting, one literal per mood plus the neutral default.
fn initial_message(mood: Option<MoodType>) -> &'static str {
    match mood {
        Some(MoodType::Happy) => {
            "That's wonderful to hear! I'm so glad you're feeling happy today. What's bringing you this joy? 😊"
        }
        Some(MoodType::Sad) => {
            "I'm here for you. It's completely okay to feel sad sometimes. Would you like to talk about what's on your mind? 💙"
        }
        Some(MoodType::Angry) => {
            "I understand you're feeling angry. Let's try to work through this together. What's happening that's causing this feeling? 😠"
        }
        Some(MoodType::Depressed) => {
            "I'm really sorry you're going through this. Please know you're not alone. I'm here to listen without judgment whenever you're ready to share. 😔"
        }
        Some(MoodType::Frustrated) => {
            "Frustration can be so tough to deal with. I'm here to help you navigate it. What's causing you to feel this way? 😤"
        }
        Some(MoodType::Disappointed) => {
            "I hear you. Disappointment is a heavy feeling. Let's talk about it. What happened that didn't go as planned? 😞"
        }
        None => "Hello! I'm Aura, your personal companion. How can I support you today?",
    }
}

/// Base persona plus a mood-specific instruction clause; the base alone
/// when no mood is attached.
fn system_prompt(mood: Option<MoodType>) -> String {
    match mood {
        Some(MoodType::Happy) => format!(
            "{BASE_PERSONA} The student is feeling happy. Celebrate their positive emotions, \
             be enthusiastic with them, and encourage them to savor the moment."
        ),
        Some(MoodType::Sad) => format!(
            "{BASE_PERSONA} The student is sad. Be very gentle and compassionate. Offer a \
             listening ear and validate their feelings. Avoid toxic positivity."
        ),
        Some(MoodType::Angry) => format!(
            "{BASE_PERSONA} The student is angry. Help them process their frustration in a \
             calm, non-judgmental way. Help them identify the source without being confrontational."
        ),
        Some(MoodType::Depressed) => format!(
            "{BASE_PERSONA} The student is depressed. Be extremely supportive, patient, and \
             gentle. Remind them they are not alone and that their feelings are valid. Offer \
             simple, low-energy encouragement."
        ),
        Some(MoodType::Frustrated) => format!(
            "{BASE_PERSONA} The student is frustrated. Help them break down challenges into \
             smaller steps and offer encouragement. Validate the difficulty of their situation."
        ),
        Some(MoodType::Disappointed) => format!(
            "{BASE_PERSONA} The student is disappointed. Acknowledge their setback and help \
             them process it with kindness and self-compassion."
        ),
        None => BASE_PERSONA.to_string(),
    }
}

/// Map stored messages to the external client's turn vocabulary.
fn build_history(messages: &[Message]) -> Vec<ChatTurn> {
    messages
        .iter()
        .map(|m| ChatTurn {
            role: match m.role {
                MessageRole::Assistant => TurnRole::Model,
                MessageRole::User => TurnRole::User,
            },
            content: m.content.clone(),
        })
        .collect()
}

/// Ask the companion for a reply; any failure is absorbed into the fallback
/// literal so the caller always receives an assistant message.
async fn generate_reply(
    companion: &dyn Companion,
    prompt: &str,
    history: &[ChatTurn],
    content: &str,
    conversation_id: Uuid,
) -> String {
    match companion.generate(prompt, history, content).await {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(
                conversation_id = %conversation_id,
                error = %e,
                "Companion call failed, substituting fallback reply"
            );
            FALLBACK_REPLY.to_string()
        }
    }
}

async fn find_conversation(
    db: &PgPool,
    conversation_id: Uuid,
    user_id: Uuid,
) -> AppResult<Conversation> {
    sqlx::query_as::<_, Conversation>(
        "SELECT * FROM conversations WHERE id = $1 AND user_id = $2",
    )
    .bind(conversation_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::NotFound("Conversation not found".into()))
}

async fn list_messages(db: &PgPool, conversation_id: Uuid) -> AppResult<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(
        "SELECT * FROM messages WHERE conversation_id = $1 ORDER BY created_at ASC",
    )
    .bind(conversation_id)
    .fetch_all(db)
    .await?;
    Ok(messages)
}

/// Resolve the mood category of a conversation's (weak) mood reference.
async fn conversation_mood(db: &PgPool, conversation: &Conversation) -> AppResult<Option<MoodType>> {
    let Some(mood_id) = conversation.mood_id else {
        return Ok(None);
    };
    let mood_type = sqlx::query_scalar::<_, MoodType>("SELECT mood_type FROM moods WHERE id = $1")
        .bind(mood_id)
        .fetch_optional(db)
        .await?;
    Ok(mood_type)
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<ConversationDetail>>> {
    let conversations = sqlx::query_as::<_, Conversation>(
        "SELECT * FROM conversations WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(auth_user.id)
    .fetch_all(&state.db)
    .await?;

    let mut result = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        let messages = list_messages(&state.db, conversation.id).await?;
        result.push(ConversationDetail {
            conversation,
            messages,
        });
    }

    Ok(Json(result))
}

pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateConversationRequest>,
) -> AppResult<(StatusCode, Json<ConversationDetail>)> {
    // A referenced mood must belong to the caller.
    let mood_type = match body.mood_id {
        Some(mood_id) => Some(
            sqlx::query_scalar::<_, MoodType>(
                "SELECT mood_type FROM moods WHERE id = $1 AND user_id = $2",
            )
            .bind(mood_id)
            .bind(auth_user.id)
            .fetch_optional(&state.db)
            .await?
            .ok_or(AppError::NotFound("Mood not found".into()))?,
        ),
        None => None,
    };

    let conversation = sqlx::query_as::<_, Conversation>(
        r#"
        INSERT INTO conversations (id, user_id, mood_id, title)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(body.mood_id)
    .bind(body.title.as_deref().unwrap_or("New Conversation"))
    .fetch_one(&state.db)
    .await?;

    // Seed the thread with the mood-appropriate greeting.
    let greeting = sqlx::query_as::<_, Message>(
        r#"
        INSERT INTO messages (id, conversation_id, role, content)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(conversation.id)
    .bind(MessageRole::Assistant)
    .bind(initial_message(mood_type))
    .fetch_one(&state.db)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ConversationDetail {
            conversation,
            messages: vec![greeting],
        }),
    ))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<ConversationDetail>> {
    let conversation = find_conversation(&state.db, conversation_id, auth_user.id).await?;
    let messages = list_messages(&state.db, conversation_id).await?;
    Ok(Json(ConversationDetail {
        conversation,
        messages,
    }))
}

pub async fn update_conversation(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<UpdateConversationRequest>,
) -> AppResult<Json<Conversation>> {
    let conversation = sqlx::query_as::<_, Conversation>(
        r#"
        UPDATE conversations SET
            title = COALESCE($3, title),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(conversation_id)
    .bind(auth_user.id)
    .bind(&body.title)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Conversation not found".into()))?;

    Ok(Json(conversation))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id = $2")
        .bind(conversation_id)
        .bind(auth_user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Conversation not found".into()));
    }

    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<Vec<Message>>> {
    find_conversation(&state.db, conversation_id, auth_user.id).await?;
    let messages = list_messages(&state.db, conversation_id).await?;
    Ok(Json(messages))
}

pub async fn post_message(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<PostMessageRequest>,
) -> AppResult<Json<Vec<Message>>> {
    let conversation = find_conversation(&state.db, conversation_id, auth_user.id).await?;

    if body.content.trim().is_empty() {
        return Err(AppError::Validation("Message content cannot be empty.".into()));
    }

    // Persist the user's message first, unconditionally. History must
    // reflect what the user sent even if the companion call fails below.
    let user_message = sqlx::query_as::<_, Message>(
        r#"
        INSERT INTO messages (id, conversation_id, role, content)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(conversation_id)
    .bind(MessageRole::User)
    .bind(&body.content)
    .fetch_one(&state.db)
    .await?;

    // Replay history excluding the message just inserted, by id. Excluding
    // by content would also drop earlier identical messages.
    let prior = sqlx::query_as::<_, Message>(
        r#"
        SELECT * FROM messages
        WHERE conversation_id = $1 AND id <> $2
        ORDER BY created_at ASC
        "#,
    )
    .bind(conversation_id)
    .bind(user_message.id)
    .fetch_all(&state.db)
    .await?;
    let history = build_history(&prior);

    let mood_type = conversation_mood(&state.db, &conversation).await?;
    let prompt = system_prompt(mood_type);

    let reply = generate_reply(
        state.companion.as_ref(),
        &prompt,
        &history,
        &body.content,
        conversation_id,
    )
    .await;

    sqlx::query(
        r#"
        INSERT INTO messages (id, conversation_id, role, content)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(conversation_id)
    .bind(MessageRole::Assistant)
    .bind(&reply)
    .execute(&state.db)
    .await?;

    let messages = list_messages(&state.db, conversation_id).await?;
    Ok(Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::companion::CompanionError;
    use async_trait::async_trait;
    use chrono::Utc;

    struct EchoCompanion;

    #[async_trait]
    impl Companion for EchoCompanion {
        async fn generate(
            &self,
            _system_prompt: &str,
            history: &[ChatTurn],
            new_message: &str,
        ) -> Result<String, CompanionError> {
            Ok(format!("echo({}, turns={})", new_message, history.len()))
        }
    }

    struct FailingCompanion;

    #[async_trait]
    impl Companion for FailingCompanion {
        async fn generate(
            &self,
            _system_prompt: &str,
            _history: &[ChatTurn],
            _new_message: &str,
        ) -> Result<String, CompanionError> {
            Err(CompanionError::Api {
                status: 429,
                body: "quota exceeded".into(),
            })
        }
    }

    fn message(role: MessageRole, content: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_greeting_literals_for_all_moods() {
        let expected = [
            (
                MoodType::Happy,
                "That's wonderful to hear! I'm so glad you're feeling happy today. What's bringing you this joy? 😊",
            ),
            (
                MoodType::Sad,
                "I'm here for you. It's completely okay to feel sad sometimes. Would you like to talk about what's on your mind? 💙",
            ),
            (
                MoodType::Angry,
                "I understand you're feeling angry. Let's try to work through this together. What's happening that's causing this feeling? 😠",
            ),
            (
                MoodType::Depressed,
                "I'm really sorry you're going through this. Please know you're not alone. I'm here to listen without judgment whenever you're ready to share. 😔",
            ),
            (
                MoodType::Frustrated,
                "Frustration can be so tough to deal with. I'm here to help you navigate it. What's causing you to feel this way? 😤",
            ),
            (
                MoodType::Disappointed,
                "I hear you. Disappointment is a heavy feeling. Let's talk about it. What happened that didn't go as planned? 😞",
            ),
        ];
        for (mood, text) in expected {
            assert_eq!(initial_message(Some(mood)), text);
        }
    }

    #[test]
    fn test_neutral_greeting() {
        assert_eq!(
            initial_message(None),
            "Hello! I'm Aura, your personal companion. How can I support you today?"
        );
    }

    #[test]
    fn test_system_prompt_neutral_is_base_persona() {
        assert_eq!(system_prompt(None), BASE_PERSONA);
    }

    #[test]
    fn test_system_prompt_clause_literals() {
        let expected = [
            (
                MoodType::Happy,
                "The student is feeling happy. Celebrate their positive emotions, be enthusiastic with them, and encourage them to savor the moment.",
            ),
            (
                MoodType::Sad,
                "The student is sad. Be very gentle and compassionate. Offer a listening ear and validate their feelings. Avoid toxic positivity.",
            ),
            (
                MoodType::Angry,
                "The student is angry. Help them process their frustration in a calm, non-judgmental way. Help them identify the source without being confrontational.",
            ),
            (
                MoodType::Depressed,
                "The student is depressed. Be extremely supportive, patient, and gentle. Remind them they are not alone and that their feelings are valid. Offer simple, low-energy encouragement.",
            ),
            (
                MoodType::Frustrated,
                "The student is frustrated. Help them break down challenges into smaller steps and offer encouragement. Validate the difficulty of their situation.",
            ),
            (
                MoodType::Disappointed,
                "The student is disappointed. Acknowledge their setback and help them process it with kindness and self-compassion.",
            ),
        ];
        for (mood, clause) in expected {
            assert_eq!(system_prompt(Some(mood)), format!("{BASE_PERSONA} {clause}"));
        }
    }

    #[test]
    fn test_build_history_maps_roles_and_keeps_order() {
        let messages = vec![
            message(MessageRole::Assistant, "greeting"),
            message(MessageRole::User, "hello"),
            message(MessageRole::Assistant, "reply"),
        ];
        let history = build_history(&messages);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, TurnRole::Model);
        assert_eq!(history[0].content, "greeting");
        assert_eq!(history[1].role, TurnRole::User);
        assert_eq!(history[2].role, TurnRole::Model);
    }

    #[tokio::test]
    async fn test_generate_reply_passes_through_success() {
        let history = build_history(&[message(MessageRole::Assistant, "hi")]);
        let reply = generate_reply(
            &EchoCompanion,
            "prompt",
            &history,
            "I failed my exam",
            Uuid::new_v4(),
        )
        .await;
        assert_eq!(reply, "echo(I failed my exam, turns=1)");
    }

    #[tokio::test]
    async fn test_generate_reply_absorbs_failure_into_fallback() {
        let reply = generate_reply(&FailingCompanion, "prompt", &[], "hello", Uuid::new_v4()).await;
        assert_eq!(reply, FALLBACK_REPLY);
    }
}
