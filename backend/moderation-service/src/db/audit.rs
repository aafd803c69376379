//! Append-only audit log; rows are only ever inserted

use crate::error::Result;
use crate::models::{AuditAction, AuditLogEntry, AuditSubject};
use sqlx::PgExecutor;

pub async fn append<'e, E: PgExecutor<'e>>(executor: E, entry: &AuditLogEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (
            id, content_type, content_id, actor_id, action, reason, is_automated, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(entry.id)
    .bind(entry.content_type)
    .bind(entry.content_id)
    .bind(entry.actor_id)
    .bind(entry.action)
    .bind(&entry.reason)
    .bind(entry.is_automated)
    .bind(entry.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn for_subject<'e, E: PgExecutor<'e>>(
    executor: E,
    subject: AuditSubject,
    subject_id: i64,
) -> Result<Vec<AuditLogEntry>> {
    let entries = sqlx::query_as::<_, AuditLogEntry>(
        r#"
        SELECT id, content_type, content_id, actor_id, action, reason, is_automated, created_at
        FROM audit_log
        WHERE content_type = $1 AND content_id = $2
        ORDER BY created_at ASC
        "#,
    )
    .bind(subject)
    .bind(subject_id)
    .fetch_all(executor)
    .await?;

    Ok(entries)
}

pub async fn has_action<'e, E: PgExecutor<'e>>(
    executor: E,
    subject: AuditSubject,
    subject_id: i64,
    action: AuditAction,
) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM audit_log
            WHERE content_type = $1 AND content_id = $2 AND action = $3
        )
        "#,
    )
    .bind(subject)
    .bind(subject_id)
    .bind(action)
    .fetch_one(executor)
    .await?;

    Ok(exists)
}
