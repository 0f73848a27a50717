//! Branch database queries

use sqlx::PgPool;
use uuid::Uuid;

use crate::types::Branch;

/// List all branches by name
pub async fn list_branches(pool: &PgPool) -> sqlx::Result<Vec<Branch>> {
    sqlx::query_as::<_, Branch>(
        r#"
        SELECT id, name, created_at
        FROM branches
        ORDER BY name
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Create a branch; `None` if the name is taken
pub async fn create_branch(pool: &PgPool, name: &str) -> sqlx::Result<Option<Branch>> {
    sqlx::query_as::<_, Branch>(
        r#"
        INSERT INTO branches (id, name, created_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (name) DO NOTHING
        RETURNING id, name, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name.trim())
    .fetch_optional(pool)
    .await
}
