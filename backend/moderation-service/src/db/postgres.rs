//! PostgreSQL adapter of the storage ports

use super::{appeals, audit, content, records, trust_profiles, warnings};
use super::{ModerationStore, StoreTx};
use crate::error::{ModerationError, Result};
use crate::models::{
    Appeal, AppealStatus, AppealType, AuditAction, AuditLogEntry, AuditSubject, BulkActionBatch,
    ContentItem,
    ContentKind, ContentStatus, ImageFingerprint, LedgerField, ModerationRecord, NewAppeal,
    NewAuditEntry, NewWarning, PostingStats, TrustProfile, Warning,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Connection pool settings
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 20,
            min_connections: 2,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 600,
        }
    }
}

#[derive(Clone)]
pub struct PgModerationStore {
    pool: PgPool,
}

impl PgModerationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, settings: &PoolSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(settings.idle_timeout_secs))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        info!(
            max_connections = settings.max_connections,
            "Database pool created"
        );

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ModerationStore for PgModerationStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn content_item(&self, content_id: i64) -> Result<Option<ContentItem>> {
        content::find(&self.pool, content_id).await
    }

    async fn recent_owner_content(
        &self,
        owner_id: i64,
        kind: ContentKind,
        exclude_id: i64,
        limit: i64,
    ) -> Result<Vec<String>> {
        content::recent_bodies(&self.pool, owner_id, kind, exclude_id, limit).await
    }

    async fn trust_profile(&self, user_id: i64) -> Result<Option<TrustProfile>> {
        trust_profiles::find(&self.pool, user_id).await
    }

    async fn warning(&self, warning_id: i64) -> Result<Option<Warning>> {
        warnings::find(&self.pool, warning_id).await
    }

    async fn user_warnings(&self, user_id: i64) -> Result<Vec<Warning>> {
        warnings::for_user(&self.pool, user_id).await
    }

    async fn appeal(&self, appeal_id: i64) -> Result<Option<Appeal>> {
        appeals::find(&self.pool, appeal_id).await
    }

    async fn list_appeals(
        &self,
        status: Option<AppealStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Appeal>> {
        appeals::list(&self.pool, status, limit, offset).await
    }

    async fn audit_entries(
        &self,
        subject: AuditSubject,
        subject_id: i64,
    ) -> Result<Vec<AuditLogEntry>> {
        audit::for_subject(&self.pool, subject, subject_id).await
    }

    async fn moderation_records(
        &self,
        kind: ContentKind,
        content_id: i64,
    ) -> Result<Vec<ModerationRecord>> {
        records::records_for_content(&self.pool, kind, content_id).await
    }

    async fn bulk_batch(&self, batch_id: Uuid) -> Result<Option<BulkActionBatch>> {
        records::find_batch(&self.pool, batch_id).await
    }

    async fn recent_fingerprints(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<ImageFingerprint>> {
        records::recent_fingerprints(&self.pool, user_id, since).await
    }

    async fn posting_stats(&self, user_id: i64) -> Result<PostingStats> {
        records::posting_stats(&self.pool, user_id).await
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn content_for_update(&mut self, content_id: i64) -> Result<Option<ContentItem>> {
        content::find_for_update(&mut *self.tx, content_id).await
    }

    async fn set_content_status(&mut self, content_id: i64, status: ContentStatus) -> Result<()> {
        let rows = content::set_status(&mut *self.tx, content_id, status).await?;
        if rows == 0 {
            return Err(ModerationError::NotFound(format!(
                "Content {} not found",
                content_id
            )));
        }
        Ok(())
    }

    async fn profile_for_update(&mut self, user_id: i64) -> Result<Option<TrustProfile>> {
        trust_profiles::find_for_update(&mut *self.tx, user_id).await
    }

    async fn apply_violation(
        &mut self,
        user_id: i64,
        trust_decay: i32,
        field: LedgerField,
        amount: i32,
    ) -> Result<TrustProfile> {
        trust_profiles::apply_violation(&mut *self.tx, user_id, trust_decay, field, amount).await
    }

    async fn increment_warning_count(&mut self, user_id: i64) -> Result<TrustProfile> {
        trust_profiles::increment_warning_count(&mut *self.tx, user_id).await
    }

    async fn decrement_warning_count(&mut self, user_id: i64) -> Result<TrustProfile> {
        trust_profiles::decrement_warning_count(&mut *self.tx, user_id).await
    }

    async fn set_suspended(&mut self, user_id: i64, suspended: bool) -> Result<bool> {
        if suspended {
            trust_profiles::set_suspended(&mut *self.tx, user_id).await
        } else {
            trust_profiles::clear_suspended(&mut *self.tx, user_id).await
        }
    }

    async fn set_banned(&mut self, user_id: i64, banned: bool) -> Result<bool> {
        if banned {
            trust_profiles::set_banned(&mut *self.tx, user_id).await
        } else {
            trust_profiles::clear_banned(&mut *self.tx, user_id).await
        }
    }

    async fn insert_warning(
        &mut self,
        input: &NewWarning,
        issued_by: Option<i64>,
    ) -> Result<Warning> {
        warnings::insert(&mut *self.tx, input, issued_by).await
    }

    async fn warning_for_update(&mut self, warning_id: i64) -> Result<Option<Warning>> {
        warnings::find_for_update(&mut *self.tx, warning_id).await
    }

    async fn delete_warning(&mut self, warning_id: i64) -> Result<bool> {
        warnings::delete(&mut *self.tx, warning_id).await
    }

    async fn open_appeal(
        &mut self,
        user_id: i64,
        appeal_type: AppealType,
        related_id: i64,
    ) -> Result<Option<Appeal>> {
        appeals::find_open(&mut *self.tx, user_id, appeal_type, related_id).await
    }

    async fn insert_appeal(&mut self, input: &NewAppeal) -> Result<Appeal> {
        if let Some(appeal) = appeals::insert(&mut *self.tx, input).await? {
            return Ok(appeal);
        }

        // Lost the race against a concurrent submission for the same target
        let existing =
            appeals::find_open(&mut *self.tx, input.user_id, input.appeal_type, input.related_id)
                .await?;
        Err(ModerationError::DuplicateAppeal(
            existing.map(|a| a.id).unwrap_or_default(),
        ))
    }

    async fn appeal_for_update(&mut self, appeal_id: i64) -> Result<Option<Appeal>> {
        appeals::find_for_update(&mut *self.tx, appeal_id).await
    }

    async fn update_appeal_status(
        &mut self,
        appeal_id: i64,
        expected: AppealStatus,
        new_status: AppealStatus,
        reviewed_by: i64,
        notes: Option<&str>,
    ) -> Result<Option<Appeal>> {
        appeals::update_status(
            &mut *self.tx,
            appeal_id,
            expected,
            new_status,
            reviewed_by,
            notes,
        )
        .await
    }

    async fn append_audit(&mut self, entry: NewAuditEntry) -> Result<AuditLogEntry> {
        let entry = entry.into_entry();
        audit::append(&mut *self.tx, &entry).await?;
        Ok(entry)
    }

    async fn has_audit_action(
        &mut self,
        subject: AuditSubject,
        subject_id: i64,
        action: AuditAction,
    ) -> Result<bool> {
        audit::has_action(&mut *self.tx, subject, subject_id, action).await
    }

    async fn insert_moderation_record(&mut self, record: &ModerationRecord) -> Result<()> {
        records::insert_record(&mut *self.tx, record).await
    }

    async fn insert_fingerprint(&mut self, fingerprint: &ImageFingerprint) -> Result<()> {
        records::insert_fingerprint(&mut *self.tx, fingerprint).await
    }

    async fn insert_bulk_batch(&mut self, batch: &BulkActionBatch) -> Result<()> {
        records::insert_batch(&mut *self.tx, batch).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
