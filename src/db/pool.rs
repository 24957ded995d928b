use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// One handler blocks on the pool at most 5s before failing the request.
pub async fn create_pool(database_url: &str) -> PgPool {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await
        .expect("Failed to create database pool")
}
