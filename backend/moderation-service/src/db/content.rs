//! Queries against the content status table shared with the submission flow

use crate::error::Result;
use crate::models::{ContentItem, ContentKind, ContentStatus};
use sqlx::PgExecutor;

const CONTENT_COLUMNS: &str = "id, kind, owner_id, body_or_media_ref, status";

pub async fn find<'e, E: PgExecutor<'e>>(executor: E, content_id: i64) -> Result<Option<ContentItem>> {
    let item = sqlx::query_as::<_, ContentItem>(&format!(
        "SELECT {} FROM content_items WHERE id = $1",
        CONTENT_COLUMNS
    ))
    .bind(content_id)
    .fetch_optional(executor)
    .await?;

    Ok(item)
}

/// Row-locking read used by every status mutation
pub async fn find_for_update<'e, E: PgExecutor<'e>>(
    executor: E,
    content_id: i64,
) -> Result<Option<ContentItem>> {
    let item = sqlx::query_as::<_, ContentItem>(&format!(
        "SELECT {} FROM content_items WHERE id = $1 FOR UPDATE",
        CONTENT_COLUMNS
    ))
    .bind(content_id)
    .fetch_optional(executor)
    .await?;

    Ok(item)
}

/// Returns the number of rows changed (0 or 1)
pub async fn set_status<'e, E: PgExecutor<'e>>(
    executor: E,
    content_id: i64,
    status: ContentStatus,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE content_items
        SET status = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(content_id)
    .bind(status)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

pub async fn recent_bodies<'e, E: PgExecutor<'e>>(
    executor: E,
    owner_id: i64,
    kind: ContentKind,
    exclude_id: i64,
    limit: i64,
) -> Result<Vec<String>> {
    let bodies = sqlx::query_scalar::<_, String>(
        r#"
        SELECT body_or_media_ref
        FROM content_items
        WHERE owner_id = $1 AND kind = $2 AND id <> $3
        ORDER BY created_at DESC
        LIMIT $4
        "#,
    )
    .bind(owner_id)
    .bind(kind)
    .bind(exclude_id)
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok(bodies)
}
