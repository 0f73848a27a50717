//! Client database queries

use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{Client, ClientDraft, ClientQuery, UpdateOutcome};

const CLIENT_COLUMNS: &str = "id, name, phone_number, birth_month, birth_day, date_of_birth, branch, created_at, updated_at";

/// Find a client by trimmed phone number, optionally within one branch
/// and ignoring one client id
pub async fn find_client_by_phone(
    pool: &PgPool,
    phone: &str,
    branch: Option<&str>,
    exclude: Option<Uuid>,
) -> sqlx::Result<Option<Uuid>> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT id FROM clients
        WHERE phone_number = $1
          AND ($2::text IS NULL OR branch = $2)
          AND ($3::uuid IS NULL OR id <> $3)
        LIMIT 1
        "#,
    )
    .bind(phone.trim())
    .bind(branch.map(str::trim))
    .bind(exclude)
    .fetch_optional(pool)
    .await
}

pub async fn get_client(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<Client>> {
    let sql = format!("SELECT {} FROM clients WHERE id = $1", CLIENT_COLUMNS);
    sqlx::query_as::<_, Client>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Rewrite a client. A (branch, phone_number) collision with another
/// client is reported as `Duplicate`, not as an error.
pub async fn update_client(
    pool: &PgPool,
    id: Uuid,
    draft: &ClientDraft,
) -> sqlx::Result<UpdateOutcome> {
    let sql = format!(
        r#"
        UPDATE clients
        SET name = $2,
            phone_number = $3,
            birth_month = $4,
            birth_day = $5,
            date_of_birth = $6,
            branch = $7,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        CLIENT_COLUMNS
    );

    let result = sqlx::query_as::<_, Client>(&sql)
        .bind(id)
        .bind(draft.name.trim())
        .bind(draft.phone_number.trim())
        .bind(draft.birth_month as i32)
        .bind(draft.birth_day as i32)
        .bind(draft.date_of_birth)
        .bind(draft.branch.trim())
        .fetch_optional(pool)
        .await;

    match result {
        Ok(Some(client)) => Ok(UpdateOutcome::Updated(client)),
        Ok(None) => Ok(UpdateOutcome::NotFound),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(UpdateOutcome::Duplicate),
        Err(e) => Err(e),
    }
}

/// Delete a client; `false` if it did not exist
pub async fn delete_client(pool: &PgPool, id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM clients WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Insert a client. Returns `None` when (branch, phone_number) already exists.
pub async fn insert_client(pool: &PgPool, draft: &ClientDraft) -> sqlx::Result<Option<Client>> {
    let sql = format!(
        r#"
        INSERT INTO clients (
            id, name, phone_number, birth_month, birth_day, date_of_birth, branch,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
        ON CONFLICT (branch, phone_number) DO NOTHING
        RETURNING {}
        "#,
        CLIENT_COLUMNS
    );

    sqlx::query_as::<_, Client>(&sql)
        .bind(Uuid::new_v4())
        .bind(draft.name.trim())
        .bind(draft.phone_number.trim())
        .bind(draft.birth_month as i32)
        .bind(draft.birth_day as i32)
        .bind(draft.date_of_birth)
        .bind(draft.branch.trim())
        .fetch_optional(pool)
        .await
}

/// List clients matching the query, newest first
pub async fn list_clients(pool: &PgPool, query: &ClientQuery) -> sqlx::Result<Vec<Client>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM clients
        WHERE ($1::text IS NULL OR branch = $1)
          AND ($2::int IS NULL OR (birth_month = $2 AND birth_day = $3))
          AND (
            $4::text IS NULL
            OR strpos(lower(name), lower($4)) > 0
            OR strpos(phone_number, $4) > 0
            OR strpos(to_char(date_of_birth, 'YYYY-MM-DD'), $4) > 0
          )
        ORDER BY created_at DESC
        "#,
        CLIENT_COLUMNS
    );

    let (month, day) = match query.birthday {
        Some((m, d)) => (Some(m as i32), Some(d as i32)),
        None => (None, None),
    };

    sqlx::query_as::<_, Client>(&sql)
        .bind(query.branch.as_deref())
        .bind(month)
        .bind(day)
        .bind(query.search.as_deref())
        .fetch_all(pool)
        .await
}
