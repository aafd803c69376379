//! In-process store for single-node deployments and tests.
//!
//! A transaction holds the state lock for its whole lifetime and mutates a
//! staged copy; `commit` swaps the copy in, dropping the transaction discards
//! it. Transactions are therefore serialised, which gives the same atomicity
//! the Postgres adapter gets from row locks.

use super::{ModerationStore, StoreTx};
use crate::error::{ModerationError, Result};
use crate::models::{
    Appeal, AppealStatus, AppealType, AuditAction, AuditLogEntry, AuditSubject, BulkActionBatch,
    ContentItem,
    ContentKind, ContentStatus, ImageFingerprint, LedgerField, ModerationRecord, NewAppeal,
    NewAuditEntry, NewWarning, PostingStats, TrustProfile, Warning,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Storage operations that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Begin,
    SetContentStatus,
    ApplyViolation,
    IncrementWarningCount,
    DecrementWarningCount,
    SetSuspended,
    SetBanned,
    InsertWarning,
    DeleteWarning,
    InsertAppeal,
    UpdateAppealStatus,
    AppendAudit,
    InsertModerationRecord,
    InsertBulkBatch,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    content: HashMap<i64, ContentItem>,
    profiles: HashMap<i64, TrustProfile>,
    warnings: BTreeMap<i64, Warning>,
    appeals: BTreeMap<i64, Appeal>,
    audit: Vec<AuditLogEntry>,
    records: Vec<ModerationRecord>,
    fingerprints: Vec<ImageFingerprint>,
    batches: Vec<BulkActionBatch>,
    next_warning_id: i64,
    next_appeal_id: i64,
}

impl MemoryState {
    fn profile_mut(&mut self, user_id: i64) -> &mut TrustProfile {
        self.profiles
            .entry(user_id)
            .or_insert_with(|| TrustProfile::new(user_id))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_points: Arc<StdMutex<HashSet<FailPoint>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a content record owned by the submission flow
    pub async fn insert_content(&self, item: ContentItem) {
        self.state.lock().await.content.insert(item.id, item);
    }

    /// Seed a user profile (user store collaborator)
    pub async fn insert_profile(&self, profile: TrustProfile) {
        self.state.lock().await.profiles.insert(profile.user_id, profile);
    }

    /// Make every subsequent call of `point` fail until cleared
    pub fn fail_on(&self, point: FailPoint) {
        if let Ok(mut points) = self.fail_points.lock() {
            points.insert(point);
        }
    }

    pub fn clear_fail_points(&self) {
        if let Ok(mut points) = self.fail_points.lock() {
            points.clear();
        }
    }

    /// Every audit entry in append order
    pub async fn all_audit_entries(&self) -> Vec<AuditLogEntry> {
        self.state.lock().await.audit.clone()
    }

    pub async fn all_bulk_batches(&self) -> Vec<BulkActionBatch> {
        self.state.lock().await.batches.clone()
    }

    fn check(fail_points: &StdMutex<HashSet<FailPoint>>, point: FailPoint) -> Result<()> {
        let armed = fail_points
            .lock()
            .map(|points| points.contains(&point))
            .unwrap_or(false);
        if armed {
            return Err(ModerationError::Persistence(format!(
                "injected failure at {:?}",
                point
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ModerationStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        Self::check(&self.fail_points, FailPoint::Begin)?;
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            staged,
            fail_points: self.fail_points.clone(),
        }))
    }

    async fn content_item(&self, content_id: i64) -> Result<Option<ContentItem>> {
        Ok(self.state.lock().await.content.get(&content_id).cloned())
    }

    async fn recent_owner_content(
        &self,
        owner_id: i64,
        kind: ContentKind,
        exclude_id: i64,
        limit: i64,
    ) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        let mut items: Vec<&ContentItem> = state
            .content
            .values()
            .filter(|c| c.owner_id == owner_id && c.kind == kind && c.id != exclude_id)
            .collect();
        items.sort_by(|a, b| b.id.cmp(&a.id));

        Ok(items
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|c| c.body_or_media_ref.clone())
            .collect())
    }

    async fn trust_profile(&self, user_id: i64) -> Result<Option<TrustProfile>> {
        Ok(self.state.lock().await.profiles.get(&user_id).cloned())
    }

    async fn warning(&self, warning_id: i64) -> Result<Option<Warning>> {
        Ok(self.state.lock().await.warnings.get(&warning_id).cloned())
    }

    async fn user_warnings(&self, user_id: i64) -> Result<Vec<Warning>> {
        let state = self.state.lock().await;
        Ok(state
            .warnings
            .values()
            .rev()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn appeal(&self, appeal_id: i64) -> Result<Option<Appeal>> {
        Ok(self.state.lock().await.appeals.get(&appeal_id).cloned())
    }

    async fn list_appeals(
        &self,
        status: Option<AppealStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Appeal>> {
        let state = self.state.lock().await;
        Ok(state
            .appeals
            .values()
            .rev()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn audit_entries(
        &self,
        subject: AuditSubject,
        subject_id: i64,
    ) -> Result<Vec<AuditLogEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .audit
            .iter()
            .filter(|e| e.content_type == subject && e.content_id == subject_id)
            .cloned()
            .collect())
    }

    async fn moderation_records(
        &self,
        kind: ContentKind,
        content_id: i64,
    ) -> Result<Vec<ModerationRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .filter(|r| r.content_kind == kind && r.content_id == content_id)
            .cloned()
            .collect())
    }

    async fn bulk_batch(&self, batch_id: Uuid) -> Result<Option<BulkActionBatch>> {
        let state = self.state.lock().await;
        Ok(state.batches.iter().find(|b| b.id == batch_id).cloned())
    }

    async fn recent_fingerprints(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<ImageFingerprint>> {
        let state = self.state.lock().await;
        Ok(state
            .fingerprints
            .iter()
            .filter(|f| f.user_id == user_id && f.created_at >= since)
            .cloned()
            .collect())
    }

    async fn posting_stats(&self, user_id: i64) -> Result<PostingStats> {
        let state = self.state.lock().await;
        let now = Utc::now();
        let hour_ago = now - Duration::hours(1);
        let mine = state.records.iter().filter(|r| r.user_id == user_id);

        let posts_last_hour = mine.clone().filter(|r| r.created_at > hour_ago).count() as i64;
        let seconds_since_last_post = mine
            .map(|r| r.created_at)
            .max()
            .map(|last| (now - last).num_seconds());

        Ok(PostingStats {
            posts_last_hour,
            seconds_since_last_post,
        })
    }

    /// Fails while `FailPoint::Begin` is armed, like an unreachable database
    async fn ping(&self) -> Result<()> {
        Self::check(&self.fail_points, FailPoint::Begin)
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    fail_points: Arc<StdMutex<HashSet<FailPoint>>>,
}

impl MemoryTx {
    fn check(&self, point: FailPoint) -> Result<()> {
        InMemoryStore::check(&self.fail_points, point)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn content_for_update(&mut self, content_id: i64) -> Result<Option<ContentItem>> {
        Ok(self.staged.content.get(&content_id).cloned())
    }

    async fn set_content_status(&mut self, content_id: i64, status: ContentStatus) -> Result<()> {
        self.check(FailPoint::SetContentStatus)?;
        let item = self
            .staged
            .content
            .get_mut(&content_id)
            .ok_or_else(|| ModerationError::NotFound(format!("Content {} not found", content_id)))?;
        item.status = status;
        Ok(())
    }

    async fn profile_for_update(&mut self, user_id: i64) -> Result<Option<TrustProfile>> {
        Ok(self.staged.profiles.get(&user_id).cloned())
    }

    async fn apply_violation(
        &mut self,
        user_id: i64,
        trust_decay: i32,
        field: LedgerField,
        amount: i32,
    ) -> Result<TrustProfile> {
        self.check(FailPoint::ApplyViolation)?;
        let now = Utc::now();
        let profile = self.staged.profile_mut(user_id);
        profile.total_violations += 1;
        profile.trust_score = (profile.trust_score - trust_decay).max(0);
        match field {
            LedgerField::Spam => {
                profile.spam_score = (profile.spam_score + amount).min(TrustProfile::MAX_SCORE)
            }
            LedgerField::Abuse => {
                profile.abuse_score = (profile.abuse_score + amount).min(TrustProfile::MAX_SCORE)
            }
        }
        profile.last_violation_at = Some(now);
        profile.updated_at = now;
        Ok(profile.clone())
    }

    async fn increment_warning_count(&mut self, user_id: i64) -> Result<TrustProfile> {
        self.check(FailPoint::IncrementWarningCount)?;
        let profile = self.staged.profile_mut(user_id);
        profile.warning_count += 1;
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn decrement_warning_count(&mut self, user_id: i64) -> Result<TrustProfile> {
        self.check(FailPoint::DecrementWarningCount)?;
        let profile = self.staged.profile_mut(user_id);
        profile.warning_count = (profile.warning_count - 1).max(0);
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn set_suspended(&mut self, user_id: i64, suspended: bool) -> Result<bool> {
        self.check(FailPoint::SetSuspended)?;
        if !suspended && !self.staged.profiles.contains_key(&user_id) {
            return Ok(false);
        }
        let profile = self.staged.profile_mut(user_id);
        if profile.is_suspended == suspended {
            return Ok(false);
        }
        profile.is_suspended = suspended;
        profile.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_banned(&mut self, user_id: i64, banned: bool) -> Result<bool> {
        self.check(FailPoint::SetBanned)?;
        if !banned && !self.staged.profiles.contains_key(&user_id) {
            return Ok(false);
        }
        let profile = self.staged.profile_mut(user_id);
        if profile.is_banned == banned {
            return Ok(false);
        }
        profile.is_banned = banned;
        profile.updated_at = Utc::now();
        Ok(true)
    }

    async fn insert_warning(
        &mut self,
        input: &NewWarning,
        issued_by: Option<i64>,
    ) -> Result<Warning> {
        self.check(FailPoint::InsertWarning)?;
        self.staged.next_warning_id += 1;
        let warning = Warning {
            id: self.staged.next_warning_id,
            user_id: input.user_id,
            warning_type: input.warning_type,
            severity: input.severity,
            related_content_kind: input.related_content_kind,
            related_content_id: input.related_content_id,
            message: input.message.clone(),
            issued_by,
            created_at: Utc::now(),
        };
        self.staged.warnings.insert(warning.id, warning.clone());
        Ok(warning)
    }

    async fn warning_for_update(&mut self, warning_id: i64) -> Result<Option<Warning>> {
        Ok(self.staged.warnings.get(&warning_id).cloned())
    }

    async fn delete_warning(&mut self, warning_id: i64) -> Result<bool> {
        self.check(FailPoint::DeleteWarning)?;
        Ok(self.staged.warnings.remove(&warning_id).is_some())
    }

    async fn open_appeal(
        &mut self,
        user_id: i64,
        appeal_type: AppealType,
        related_id: i64,
    ) -> Result<Option<Appeal>> {
        Ok(self
            .staged
            .appeals
            .values()
            .find(|a| {
                a.user_id == user_id
                    && a.appeal_type == appeal_type
                    && a.related_id == related_id
                    && a.status.is_open()
            })
            .cloned())
    }

    async fn insert_appeal(&mut self, input: &NewAppeal) -> Result<Appeal> {
        self.check(FailPoint::InsertAppeal)?;
        if let Some(existing) = self
            .open_appeal(input.user_id, input.appeal_type, input.related_id)
            .await?
        {
            return Err(ModerationError::DuplicateAppeal(existing.id));
        }
        self.staged.next_appeal_id += 1;
        let appeal = Appeal {
            id: self.staged.next_appeal_id,
            user_id: input.user_id,
            appeal_type: input.appeal_type,
            related_id: input.related_id,
            reason: input.reason.clone(),
            evidence: input.evidence.clone(),
            status: AppealStatus::Pending,
            reviewed_by: None,
            review_notes: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        self.staged.appeals.insert(appeal.id, appeal.clone());
        Ok(appeal)
    }

    async fn appeal_for_update(&mut self, appeal_id: i64) -> Result<Option<Appeal>> {
        Ok(self.staged.appeals.get(&appeal_id).cloned())
    }

    async fn update_appeal_status(
        &mut self,
        appeal_id: i64,
        expected: AppealStatus,
        new_status: AppealStatus,
        reviewed_by: i64,
        notes: Option<&str>,
    ) -> Result<Option<Appeal>> {
        self.check(FailPoint::UpdateAppealStatus)?;
        let Some(appeal) = self.staged.appeals.get_mut(&appeal_id) else {
            return Ok(None);
        };
        if appeal.status != expected {
            return Ok(None);
        }
        appeal.review(reviewed_by, new_status, notes.map(str::to_string))?;
        Ok(Some(appeal.clone()))
    }

    async fn append_audit(&mut self, entry: NewAuditEntry) -> Result<AuditLogEntry> {
        self.check(FailPoint::AppendAudit)?;
        let entry = entry.into_entry();
        self.staged.audit.push(entry.clone());
        Ok(entry)
    }

    async fn has_audit_action(
        &mut self,
        subject: AuditSubject,
        subject_id: i64,
        action: AuditAction,
    ) -> Result<bool> {
        Ok(self.staged.audit.iter().any(|e| {
            e.content_type == subject && e.content_id == subject_id && e.action == action
        }))
    }

    async fn insert_moderation_record(&mut self, record: &ModerationRecord) -> Result<()> {
        self.check(FailPoint::InsertModerationRecord)?;
        self.staged.records.push(record.clone());
        Ok(())
    }

    async fn insert_fingerprint(&mut self, fingerprint: &ImageFingerprint) -> Result<()> {
        self.staged.fingerprints.push(fingerprint.clone());
        Ok(())
    }

    async fn insert_bulk_batch(&mut self, batch: &BulkActionBatch) -> Result<()> {
        self.check(FailPoint::InsertBulkBatch)?;
        self.staged.batches.push(batch.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.check(FailPoint::Commit)?;
        let MemoryTx {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }
}
