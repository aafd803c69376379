//! Database operations for user warnings

use crate::error::Result;
use crate::models::{NewWarning, Warning};
use sqlx::PgExecutor;

const WARNING_COLUMNS: &str = "id, user_id, warning_type, severity, related_content_kind, \
     related_content_id, message, issued_by, created_at";

/// Issue a new warning to a user
pub async fn insert<'e, E: PgExecutor<'e>>(
    executor: E,
    input: &NewWarning,
    issued_by: Option<i64>,
) -> Result<Warning> {
    let warning = sqlx::query_as::<_, Warning>(&format!(
        r#"
        INSERT INTO user_warnings (
            user_id,
            warning_type,
            severity,
            related_content_kind,
            related_content_id,
            message,
            issued_by,
            created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
        RETURNING {}
        "#,
        WARNING_COLUMNS
    ))
    .bind(input.user_id)
    .bind(input.warning_type)
    .bind(input.severity)
    .bind(input.related_content_kind)
    .bind(input.related_content_id)
    .bind(&input.message)
    .bind(issued_by)
    .fetch_one(executor)
    .await?;

    Ok(warning)
}

/// Get warning by ID
pub async fn find<'e, E: PgExecutor<'e>>(executor: E, warning_id: i64) -> Result<Option<Warning>> {
    let warning = sqlx::query_as::<_, Warning>(&format!(
        "SELECT {} FROM user_warnings WHERE id = $1",
        WARNING_COLUMNS
    ))
    .bind(warning_id)
    .fetch_optional(executor)
    .await?;

    Ok(warning)
}

pub async fn find_for_update<'e, E: PgExecutor<'e>>(
    executor: E,
    warning_id: i64,
) -> Result<Option<Warning>> {
    let warning = sqlx::query_as::<_, Warning>(&format!(
        "SELECT {} FROM user_warnings WHERE id = $1 FOR UPDATE",
        WARNING_COLUMNS
    ))
    .bind(warning_id)
    .fetch_optional(executor)
    .await?;

    Ok(warning)
}

/// Get warnings for a user, newest first
pub async fn for_user<'e, E: PgExecutor<'e>>(executor: E, user_id: i64) -> Result<Vec<Warning>> {
    let warnings = sqlx::query_as::<_, Warning>(&format!(
        r#"
        SELECT {}
        FROM user_warnings
        WHERE user_id = $1
        ORDER BY created_at DESC, id DESC
        "#,
        WARNING_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(executor)
    .await?;

    Ok(warnings)
}

pub async fn delete<'e, E: PgExecutor<'e>>(executor: E, warning_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM user_warnings WHERE id = $1")
        .bind(warning_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() == 1)
}
