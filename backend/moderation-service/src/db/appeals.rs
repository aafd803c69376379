//! Database operations for appeals

use crate::error::Result;
use crate::models::{Appeal, AppealStatus, AppealType, NewAppeal};
use sqlx::PgExecutor;

const APPEAL_COLUMNS: &str = "id, user_id, appeal_type, related_id, reason, evidence, status, \
     reviewed_by, review_notes, created_at, resolved_at";

/// Inserts a pending appeal. Returns `None` when another open appeal for the
/// same target already exists (partial unique index over open appeals).
pub async fn insert<'e, E: PgExecutor<'e>>(executor: E, input: &NewAppeal) -> Result<Option<Appeal>> {
    let appeal = sqlx::query_as::<_, Appeal>(&format!(
        r#"
        INSERT INTO appeals (user_id, appeal_type, related_id, reason, evidence, status, created_at)
        VALUES ($1, $2, $3, $4, $5, 'pending', NOW())
        ON CONFLICT (user_id, appeal_type, related_id)
            WHERE status IN ('pending', 'reviewing')
            DO NOTHING
        RETURNING {}
        "#,
        APPEAL_COLUMNS
    ))
    .bind(input.user_id)
    .bind(input.appeal_type)
    .bind(input.related_id)
    .bind(&input.reason)
    .bind(&input.evidence)
    .fetch_optional(executor)
    .await?;

    Ok(appeal)
}

pub async fn find<'e, E: PgExecutor<'e>>(executor: E, appeal_id: i64) -> Result<Option<Appeal>> {
    let appeal = sqlx::query_as::<_, Appeal>(&format!(
        "SELECT {} FROM appeals WHERE id = $1",
        APPEAL_COLUMNS
    ))
    .bind(appeal_id)
    .fetch_optional(executor)
    .await?;

    Ok(appeal)
}

pub async fn find_for_update<'e, E: PgExecutor<'e>>(
    executor: E,
    appeal_id: i64,
) -> Result<Option<Appeal>> {
    let appeal = sqlx::query_as::<_, Appeal>(&format!(
        "SELECT {} FROM appeals WHERE id = $1 FOR UPDATE",
        APPEAL_COLUMNS
    ))
    .bind(appeal_id)
    .fetch_optional(executor)
    .await?;

    Ok(appeal)
}

pub async fn find_open<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: i64,
    appeal_type: AppealType,
    related_id: i64,
) -> Result<Option<Appeal>> {
    let appeal = sqlx::query_as::<_, Appeal>(&format!(
        r#"
        SELECT {}
        FROM appeals
        WHERE user_id = $1
          AND appeal_type = $2
          AND related_id = $3
          AND status IN ('pending', 'reviewing')
        "#,
        APPEAL_COLUMNS
    ))
    .bind(user_id)
    .bind(appeal_type)
    .bind(related_id)
    .fetch_optional(executor)
    .await?;

    Ok(appeal)
}

/// List appeals, newest first, optionally filtered by status
pub async fn list<'e, E: PgExecutor<'e>>(
    executor: E,
    status: Option<AppealStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Appeal>> {
    let appeals = sqlx::query_as::<_, Appeal>(&format!(
        r#"
        SELECT {}
        FROM appeals
        WHERE ($1::appeal_status IS NULL OR status = $1)
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
        APPEAL_COLUMNS
    ))
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await?;

    Ok(appeals)
}

/// Conditional status transition. `None` if the appeal left `expected` meanwhile.
pub async fn update_status<'e, E: PgExecutor<'e>>(
    executor: E,
    appeal_id: i64,
    expected: AppealStatus,
    new_status: AppealStatus,
    reviewed_by: i64,
    notes: Option<&str>,
) -> Result<Option<Appeal>> {
    let appeal = sqlx::query_as::<_, Appeal>(&format!(
        r#"
        UPDATE appeals
        SET status = $3,
            reviewed_by = $4,
            review_notes = COALESCE($5, review_notes),
            resolved_at = CASE WHEN $3 IN ('approved'::appeal_status, 'rejected'::appeal_status)
                               THEN NOW() ELSE resolved_at END
        WHERE id = $1 AND status = $2
        RETURNING {}
        "#,
        APPEAL_COLUMNS
    ))
    .bind(appeal_id)
    .bind(expected)
    .bind(new_status)
    .bind(reviewed_by)
    .bind(notes)
    .fetch_optional(executor)
    .await?;

    Ok(appeal)
}
