//! Moderation records, image fingerprints and bulk batch records

use crate::error::Result;
use crate::models::{BulkActionBatch, ContentKind, ImageFingerprint, ModerationRecord, PostingStats};
use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

pub async fn insert_record<'e, E: PgExecutor<'e>>(
    executor: E,
    record: &ModerationRecord,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO moderation_records (
            id, content_kind, content_id, user_id, scores, signals, should_block,
            hard_override, evaluation_complete, status, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(record.id)
    .bind(record.content_kind)
    .bind(record.content_id)
    .bind(record.user_id)
    .bind(&record.scores)
    .bind(&record.signals)
    .bind(record.should_block)
    .bind(record.hard_override)
    .bind(record.evaluation_complete)
    .bind(record.status)
    .bind(record.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn records_for_content<'e, E: PgExecutor<'e>>(
    executor: E,
    kind: ContentKind,
    content_id: i64,
) -> Result<Vec<ModerationRecord>> {
    let records = sqlx::query_as::<_, ModerationRecord>(
        r#"
        SELECT id, content_kind, content_id, user_id, scores, signals, should_block,
               hard_override, evaluation_complete, status, created_at
        FROM moderation_records
        WHERE content_kind = $1 AND content_id = $2
        ORDER BY created_at ASC
        "#,
    )
    .bind(kind)
    .bind(content_id)
    .fetch_all(executor)
    .await?;

    Ok(records)
}

pub async fn insert_fingerprint<'e, E: PgExecutor<'e>>(
    executor: E,
    fingerprint: &ImageFingerprint,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO image_fingerprints (user_id, content_id, hash, created_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (content_id) DO UPDATE SET hash = EXCLUDED.hash, created_at = EXCLUDED.created_at
        "#,
    )
    .bind(fingerprint.user_id)
    .bind(fingerprint.content_id)
    .bind(fingerprint.hash)
    .bind(fingerprint.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn recent_fingerprints<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: i64,
    since: DateTime<Utc>,
) -> Result<Vec<ImageFingerprint>> {
    let fingerprints = sqlx::query_as::<_, ImageFingerprint>(
        r#"
        SELECT user_id, content_id, hash, created_at
        FROM image_fingerprints
        WHERE user_id = $1 AND created_at >= $2
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(since)
    .fetch_all(executor)
    .await?;

    Ok(fingerprints)
}

pub async fn insert_batch<'e, E: PgExecutor<'e>>(executor: E, batch: &BulkActionBatch) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO bulk_action_batches (
            id, action_type, content_kind, item_ids, reason, created_by,
            per_item_results, success_count, failure_count, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(batch.id)
    .bind(batch.action_type)
    .bind(batch.content_kind)
    .bind(&batch.item_ids)
    .bind(&batch.reason)
    .bind(batch.created_by)
    .bind(&batch.per_item_results)
    .bind(batch.success_count)
    .bind(batch.failure_count)
    .bind(batch.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn find_batch<'e, E: PgExecutor<'e>>(
    executor: E,
    batch_id: Uuid,
) -> Result<Option<BulkActionBatch>> {
    let batch = sqlx::query_as::<_, BulkActionBatch>(
        r#"
        SELECT id, action_type, content_kind, item_ids, reason, created_by,
               per_item_results, success_count, failure_count, created_at
        FROM bulk_action_batches
        WHERE id = $1
        "#,
    )
    .bind(batch_id)
    .fetch_optional(executor)
    .await?;

    Ok(batch)
}

pub async fn posting_stats<'e, E: PgExecutor<'e>>(executor: E, user_id: i64) -> Result<PostingStats> {
    let stats = sqlx::query_as::<_, PostingStats>(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE created_at > NOW() - INTERVAL '1 hour') AS posts_last_hour,
            EXTRACT(EPOCH FROM (NOW() - MAX(created_at)))::BIGINT AS seconds_since_last_post
        FROM moderation_records
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(executor)
    .await?;

    Ok(stats)
}
