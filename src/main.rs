use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod services;

use config::Config;
use services::companion::{Companion, GeminiClient};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub companion: Arc<dyn Companion>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compass_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env());

    // Database
    let db = db::create_pool(&config.database_url).await;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations applied");

    // Companion client is built once at startup; a missing API key already
    // failed fast in Config::from_env.
    let companion: Arc<dyn Companion> = Arc::new(GeminiClient::new(&config));

    let state = AppState {
        db,
        config: config.clone(),
        companion,
    };

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .route("/api/auth/signup", post(handlers::auth::signup))
        .route("/api/auth/login", post(handlers::auth::login));

    let protected_routes = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me))
        // Moods
        .route("/api/moods", get(handlers::moods::list_moods))
        .route("/api/moods", post(handlers::moods::create_mood))
        .route("/api/moods/:id", get(handlers::moods::get_mood))
        .route("/api/moods/:id", put(handlers::moods::update_mood))
        .route("/api/moods/:id", delete(handlers::moods::delete_mood))
        // Conversations
        .route(
            "/api/conversations",
            get(handlers::conversations::list_conversations),
        )
        .route(
            "/api/conversations",
            post(handlers::conversations::create_conversation),
        )
        .route(
            "/api/conversations/:id",
            get(handlers::conversations::get_conversation),
        )
        .route(
            "/api/conversations/:id",
            put(handlers::conversations::update_conversation),
        )
        .route(
            "/api/conversations/:id",
            delete(handlers::conversations::delete_conversation),
        )
        .route(
            "/api/conversations/:id/messages",
            get(handlers::conversations::get_messages),
        )
        .route(
            "/api/conversations/:id/messages",
            post(handlers::conversations::post_message),
        )
        // Habits
        .route("/api/habits", get(handlers::habits::list_habits))
        .route("/api/habits", post(handlers::habits::create_habit))
        .route("/api/habits/:id", get(handlers::habits::get_habit))
        .route("/api/habits/:id", put(handlers::habits::update_habit))
        .route("/api/habits/:id", delete(handlers::habits::delete_habit))
        .route(
            "/api/habits/:id/toggle_completion",
            post(handlers::habits::toggle_completion),
        )
        // Journal
        .route("/api/journal", get(handlers::journal::list_entries))
        .route("/api/journal", post(handlers::journal::create_entry))
        .route("/api/journal/:id", get(handlers::journal::get_entry))
        .route("/api/journal/:id", put(handlers::journal::update_entry))
        .route("/api/journal/:id", delete(handlers::journal::delete_entry))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .frontend_url
                .parse::<axum::http::HeaderValue>()
                .expect("FRONTEND_URL must be a valid origin"),
        )
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
        .allow_credentials(true);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listen address");
    axum::serve(listener, app)
        .await
        .expect("Server error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::services::companion::{ChatTurn, Companion, CompanionError};

    struct NoopCompanion;

    #[async_trait::async_trait]
    impl Companion for NoopCompanion {
        async fn generate(
            &self,
            _system_prompt: &str,
            _history: &[ChatTurn],
            _new_message: &str,
        ) -> Result<String, CompanionError> {
            Ok(String::new())
        }
    }

    fn test_state() -> AppState {
        let config = Config {
            database_url: "postgres://localhost/compass_test".into(),
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: "http://localhost:3000".into(),
            gemini_api_key: "test-key".into(),
            gemini_model: "gemini-2.5-pro".into(),
        };
        AppState {
            // Lazy pool: no connection is made unless a query runs.
            db: PgPool::connect_lazy(&config.database_url).expect("lazy pool"),
            config: Arc::new(config),
            companion: Arc::new(NoopCompanion),
        }
    }

    #[tokio::test]
    async fn test_health_route_reports_service_identity() {
        let app = Router::new()
            .route("/health", get(handlers::health::health_check))
            .with_state(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "compass-api");
    }

    #[tokio::test]
    async fn test_protected_route_rejects_missing_token() {
        let state = test_state();
        let app = Router::new()
            .route("/api/auth/me", get(handlers::auth::me))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                auth::middleware::require_auth,
            ))
            .with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/auth/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
