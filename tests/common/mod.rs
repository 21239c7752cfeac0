//! Common test utilities

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

const MIGRATION: &str = include_str!("../../migrations/001_init.sql");

/// Connect to the test database and apply the schema. The migration is
/// idempotent, so every test may call this.
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    for statement in MIGRATION
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("Failed to apply schema");
    }

    pool
}

/// Unique shop domain per test so parallel tests never see each other's
/// rows.
pub fn unique_shop(tag: &str) -> String {
    format!("{}-{}.myshopify.com", tag, Uuid::new_v4().simple())
}
