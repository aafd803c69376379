//! Storage ports of the moderation core.
//!
//! Every operation that touches more than one record runs inside a
//! [`StoreTx`]. Dropping a transaction without calling [`StoreTx::commit`]
//! rolls back everything it wrote. Counter mutations are single atomic
//! statements that return the updated profile, so callers never
//! read-modify-write counters in application code.

pub mod appeals;
pub mod audit;
pub mod content;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod trust_profiles;
pub mod warnings;

use crate::error::Result;
use crate::models::{
    Appeal, AppealStatus, AppealType, AuditAction, AuditLogEntry, AuditSubject, BulkActionBatch,
    ContentItem,
    ContentKind, ContentStatus, ImageFingerprint, LedgerField, ModerationRecord, NewAppeal,
    NewAuditEntry, NewWarning, PostingStats, TrustProfile, Warning,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::{FailPoint, InMemoryStore};
pub use postgres::PgModerationStore;

/// Pool-level access: reads and transaction creation
#[async_trait]
pub trait ModerationStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    async fn content_item(&self, content_id: i64) -> Result<Option<ContentItem>>;

    /// Bodies of the owner's other content of the same kind, newest first
    async fn recent_owner_content(
        &self,
        owner_id: i64,
        kind: ContentKind,
        exclude_id: i64,
        limit: i64,
    ) -> Result<Vec<String>>;

    async fn trust_profile(&self, user_id: i64) -> Result<Option<TrustProfile>>;

    async fn warning(&self, warning_id: i64) -> Result<Option<Warning>>;

    async fn user_warnings(&self, user_id: i64) -> Result<Vec<Warning>>;

    async fn appeal(&self, appeal_id: i64) -> Result<Option<Appeal>>;

    async fn list_appeals(
        &self,
        status: Option<AppealStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Appeal>>;

    /// Audit entries for one subject, oldest first
    async fn audit_entries(
        &self,
        subject: AuditSubject,
        subject_id: i64,
    ) -> Result<Vec<AuditLogEntry>>;

    /// Moderation records for one content item, oldest first
    async fn moderation_records(
        &self,
        kind: ContentKind,
        content_id: i64,
    ) -> Result<Vec<ModerationRecord>>;

    async fn bulk_batch(&self, batch_id: Uuid) -> Result<Option<BulkActionBatch>>;

    async fn recent_fingerprints(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<ImageFingerprint>>;

    /// Posting frequency of a user, used to build behavioural context
    async fn posting_stats(&self, user_id: i64) -> Result<PostingStats>;

    /// Cheap connectivity probe for readiness checks
    async fn ping(&self) -> Result<()>;
}

/// Transaction-scoped reads and writes
#[async_trait]
pub trait StoreTx: Send {
    async fn content_for_update(&mut self, content_id: i64) -> Result<Option<ContentItem>>;

    async fn set_content_status(&mut self, content_id: i64, status: ContentStatus) -> Result<()>;

    async fn profile_for_update(&mut self, user_id: i64) -> Result<Option<TrustProfile>>;

    /// `total_violations += 1`, `trust_score -= trust_decay` (floor 0),
    /// `field += amount` (cap 100). Creates the profile if missing.
    async fn apply_violation(
        &mut self,
        user_id: i64,
        trust_decay: i32,
        field: LedgerField,
        amount: i32,
    ) -> Result<TrustProfile>;

    /// `warning_count += 1`, creating the profile if missing
    async fn increment_warning_count(&mut self, user_id: i64) -> Result<TrustProfile>;

    /// `warning_count -= 1` with a floor of 0
    async fn decrement_warning_count(&mut self, user_id: i64) -> Result<TrustProfile>;

    /// Returns true only if the flag actually changed
    async fn set_suspended(&mut self, user_id: i64, suspended: bool) -> Result<bool>;

    /// Returns true only if the flag actually changed
    async fn set_banned(&mut self, user_id: i64, banned: bool) -> Result<bool>;

    async fn insert_warning(
        &mut self,
        input: &NewWarning,
        issued_by: Option<i64>,
    ) -> Result<Warning>;

    async fn warning_for_update(&mut self, warning_id: i64) -> Result<Option<Warning>>;

    /// Returns true if a row was deleted
    async fn delete_warning(&mut self, warning_id: i64) -> Result<bool>;

    /// The pending or reviewing appeal for this target, if any
    async fn open_appeal(
        &mut self,
        user_id: i64,
        appeal_type: AppealType,
        related_id: i64,
    ) -> Result<Option<Appeal>>;

    async fn insert_appeal(&mut self, input: &NewAppeal) -> Result<Appeal>;

    async fn appeal_for_update(&mut self, appeal_id: i64) -> Result<Option<Appeal>>;

    /// Conditional transition; `None` when the appeal is no longer in `expected`
    async fn update_appeal_status(
        &mut self,
        appeal_id: i64,
        expected: AppealStatus,
        new_status: AppealStatus,
        reviewed_by: i64,
        notes: Option<&str>,
    ) -> Result<Option<Appeal>>;

    async fn append_audit(&mut self, entry: NewAuditEntry) -> Result<AuditLogEntry>;

    /// True if the subject already carries an audit entry for `action`
    async fn has_audit_action(
        &mut self,
        subject: AuditSubject,
        subject_id: i64,
        action: AuditAction,
    ) -> Result<bool>;

    async fn insert_moderation_record(&mut self, record: &ModerationRecord) -> Result<()>;

    async fn insert_fingerprint(&mut self, fingerprint: &ImageFingerprint) -> Result<()>;

    async fn insert_bulk_batch(&mut self, batch: &BulkActionBatch) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
