//! User enforcement: warnings, violations, suspensions and bans.
//!
//! Every public operation runs in one store transaction. The warning row is
//! written first; if that write fails nothing else runs and the transaction
//! is dropped, so the counters and the auto-suspend check never see a warning
//! that does not exist.

use super::fail_closed;
use super::scoring::ScoreOutcome;
use crate::db::{ModerationStore, StoreTx};
use crate::error::{ModerationError, Result};
use crate::metrics;
use crate::models::{
    Actor, AuditAction, AuditLogEntry, AuditSubject, ContentStatus, EnforcementSummary,
    ModerationRecord, NewAuditEntry, NewWarning, ScoreCategory, TextCategory, TrustProfile,
    Violation, Warning, WarningOutcome, WarningSeverity, WarningType,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Escalation thresholds and ledger parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementPolicy {
    /// Suspend once `warning_count` reaches this value
    pub auto_suspend_warning_limit: i32,
    /// Suspend once `total_violations` reaches this value
    pub auto_suspend_violation_limit: i32,
    pub trust_decay_per_violation: i32,
}

impl Default for EnforcementPolicy {
    fn default() -> Self {
        Self {
            auto_suspend_warning_limit: 3,
            auto_suspend_violation_limit: 5,
            trust_decay_per_violation: 10,
        }
    }
}

impl EnforcementPolicy {
    pub fn requires_suspension(&self, profile: &TrustProfile) -> bool {
        profile.warning_count >= self.auto_suspend_warning_limit
            || profile.total_violations >= self.auto_suspend_violation_limit
    }
}

pub struct EnforcementService {
    store: Arc<dyn ModerationStore>,
    policy: EnforcementPolicy,
}

impl EnforcementService {
    pub fn new(store: Arc<dyn ModerationStore>, policy: EnforcementPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &EnforcementPolicy {
        &self.policy
    }

    /// Issue a warning, then run the auto-suspend check, atomically
    pub async fn issue_warning(&self, input: NewWarning, actor: Actor) -> Result<WarningOutcome> {
        if input.message.trim().is_empty() {
            return Err(ModerationError::Validation(
                "warning message must not be empty".to_string(),
            ));
        }

        let mut tx = self
            .store
            .begin()
            .await
            .map_err(fail_closed("issue_warning"))?;
        let outcome = self
            .warn_in_tx(tx.as_mut(), &input, &actor)
            .await
            .map_err(fail_closed("issue_warning"))?;
        tx.commit().await.map_err(fail_closed("issue_warning"))?;

        info!(
            warning_id = outcome.warning.id,
            user_id = input.user_id,
            warning_type = ?input.warning_type,
            severity = ?input.severity,
            warning_count = outcome.profile.warning_count,
            automated = actor.is_automated(),
            "Warning issued"
        );
        metrics::ENFORCEMENT_ACTIONS_TOTAL
            .with_label_values(&["warn", metrics::origin(actor.is_automated())])
            .inc();
        if outcome.auto_suspended {
            metrics::ENFORCEMENT_ACTIONS_TOTAL
                .with_label_values(&["suspend", metrics::origin(true)])
                .inc();
        }

        Ok(outcome)
    }

    /// Record a confirmed violation (manual report resolution)
    pub async fn record_violation(&self, violation: Violation, actor: Actor) -> Result<TrustProfile> {
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(fail_closed("record_violation"))?;
        let profile = self
            .violation_in_tx(tx.as_mut(), &violation, &actor)
            .await
            .map_err(fail_closed("record_violation"))?;
        tx.commit().await.map_err(fail_closed("record_violation"))?;

        info!(
            user_id = violation.user_id,
            category = violation.category.as_str(),
            total_violations = profile.total_violations,
            trust_score = profile.trust_score,
            "Violation recorded"
        );
        metrics::ENFORCEMENT_ACTIONS_TOTAL
            .with_label_values(&["violation", metrics::origin(actor.is_automated())])
            .inc();

        Ok(profile)
    }

    /// Suspend a user. Returns false if the user was already suspended, in
    /// which case nothing is written.
    pub async fn suspend_user(&self, user_id: i64, reason: &str, actor: Actor) -> Result<bool> {
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(fail_closed("suspend_user"))?;
        let changed = self
            .suspend_in_tx(tx.as_mut(), user_id, reason, &actor)
            .await
            .map_err(fail_closed("suspend_user"))?;
        tx.commit().await.map_err(fail_closed("suspend_user"))?;

        if changed {
            warn!(user_id, automated = actor.is_automated(), reason, "User suspended");
            metrics::ENFORCEMENT_ACTIONS_TOTAL
                .with_label_values(&["suspend", metrics::origin(actor.is_automated())])
                .inc();
        }
        Ok(changed)
    }

    /// Ban a user. Returns false if the user was already banned.
    pub async fn ban_user(&self, user_id: i64, reason: &str, actor: Actor) -> Result<bool> {
        let mut tx = self.store.begin().await.map_err(fail_closed("ban_user"))?;

        let changed = tx
            .set_banned(user_id, true)
            .await
            .map_err(fail_closed("ban_user"))?;
        if changed {
            tx.append_audit(
                NewAuditEntry::new(AuditSubject::User, user_id, AuditAction::Banned, &actor)
                    .reason(reason),
            )
            .await
            .map_err(fail_closed("ban_user"))?;
        }
        tx.commit().await.map_err(fail_closed("ban_user"))?;

        if changed {
            warn!(user_id, automated = actor.is_automated(), reason, "User banned");
            metrics::ENFORCEMENT_ACTIONS_TOTAL
                .with_label_values(&["ban", metrics::origin(actor.is_automated())])
                .inc();
        }
        Ok(changed)
    }

    /// Automated response to a blocked content item, in one transaction:
    /// flag the content, charge the owner a violation, audit it, and for
    /// hard-override categories also issue a warning.
    pub async fn enforce_blocked_content(
        &self,
        record: &ModerationRecord,
        outcome: &ScoreOutcome,
    ) -> Result<EnforcementSummary> {
        let actor = Actor::System;
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(fail_closed("enforce_blocked_content"))?;

        let summary = self
            .enforce_in_tx(tx.as_mut(), record, outcome, &actor)
            .await
            .map_err(fail_closed("enforce_blocked_content"))?;
        tx.commit()
            .await
            .map_err(fail_closed("enforce_blocked_content"))?;

        if !summary.violation_recorded {
            info!(
                content_id = record.content_id,
                content_kind = %record.content_kind,
                user_id = record.user_id,
                "Content already enforced, no new violation"
            );
            return Ok(summary);
        }

        warn!(
            content_id = record.content_id,
            content_kind = %record.content_kind,
            user_id = record.user_id,
            content_flagged = summary.content_flagged,
            warning_id = ?summary.warning_id,
            auto_suspended = summary.auto_suspended,
            "Blocked content enforced"
        );
        metrics::ENFORCEMENT_ACTIONS_TOTAL
            .with_label_values(&["violation", metrics::origin(true)])
            .inc();
        if summary.warning_id.is_some() {
            metrics::ENFORCEMENT_ACTIONS_TOTAL
                .with_label_values(&["warn", metrics::origin(true)])
                .inc();
        }

        Ok(summary)
    }

    /// Current trust profile; users without history get a fresh profile
    pub async fn trust_profile(&self, user_id: i64) -> Result<TrustProfile> {
        Ok(self
            .store
            .trust_profile(user_id)
            .await?
            .unwrap_or_else(|| TrustProfile::new(user_id)))
    }

    /// Warnings still on record for a user, newest first
    pub async fn user_warnings(&self, user_id: i64) -> Result<Vec<Warning>> {
        self.store.user_warnings(user_id).await
    }

    /// Enforcement history of one subject, oldest first
    pub async fn audit_trail(
        &self,
        subject: AuditSubject,
        subject_id: i64,
    ) -> Result<Vec<AuditLogEntry>> {
        self.store.audit_entries(subject, subject_id).await
    }

    async fn enforce_in_tx(
        &self,
        tx: &mut dyn StoreTx,
        record: &ModerationRecord,
        outcome: &ScoreOutcome,
        actor: &Actor,
    ) -> Result<EnforcementSummary> {
        let reason = match outcome.hard_override {
            Some(category) => format!("hard override: {}", category),
            None => match outcome.trigger {
                Some((category, score)) => format!("{} score {}", category.as_str(), score),
                None => "blocked by moderation".to_string(),
            },
        };

        let subject: AuditSubject = record.content_kind.into();
        let item = tx
            .content_for_update(record.content_id)
            .await?
            .filter(|item| item.kind == record.content_kind);

        // One violation per item: re-analysing flagged content must not escalate
        let already_flagged = item
            .as_ref()
            .is_some_and(|item| item.status == ContentStatus::Flagged);
        if already_flagged
            || tx
                .has_audit_action(subject, record.content_id, AuditAction::ContentFlagged)
                .await?
        {
            let trust_score = tx
                .profile_for_update(record.user_id)
                .await?
                .map_or(TrustProfile::MAX_SCORE, |p| p.trust_score);
            return Ok(EnforcementSummary {
                content_flagged: false,
                violation_recorded: false,
                warning_id: None,
                auto_suspended: false,
                trust_score,
            });
        }

        let mut content_flagged = false;
        if let Some(item) = item.filter(|item| !item.status.is_terminal()) {
            tx.set_content_status(item.id, ContentStatus::Flagged).await?;
            content_flagged = true;
        }

        tx.append_audit(
            NewAuditEntry::new(
                subject,
                record.content_id,
                AuditAction::ContentFlagged,
                actor,
            )
            .reason(reason.clone()),
        )
        .await?;

        let (category, score) = outcome.trigger.unwrap_or((ScoreCategory::Spam, 0));
        let violation = Violation {
            user_id: record.user_id,
            category,
            score,
            content_kind: Some(record.content_kind),
            content_id: Some(record.content_id),
            reason: reason.clone(),
        };
        let mut profile = self.violation_in_tx(tx, &violation, actor).await?;

        let mut warning_id = None;
        let mut auto_suspended = false;
        if let Some(category) = outcome.hard_override {
            let warning = hard_override_warning(category, record);
            let warned = self.warn_in_tx(tx, &warning, actor).await?;
            warning_id = Some(warned.warning.id);
            auto_suspended = warned.auto_suspended;
            profile = warned.profile;
        }

        Ok(EnforcementSummary {
            content_flagged,
            violation_recorded: true,
            warning_id,
            auto_suspended,
            trust_score: profile.trust_score,
        })
    }

    /// Warning insert, counter increment, audit entry and auto-suspend check.
    /// The insert comes first; its failure aborts everything after it.
    pub(crate) async fn warn_in_tx(
        &self,
        tx: &mut dyn StoreTx,
        input: &NewWarning,
        actor: &Actor,
    ) -> Result<WarningOutcome> {
        let warning = tx.insert_warning(input, actor.actor_id()).await?;
        let profile = tx.increment_warning_count(input.user_id).await?;

        tx.append_audit(
            NewAuditEntry::new(AuditSubject::User, input.user_id, AuditAction::Warned, actor)
                .reason(input.message.clone()),
        )
        .await?;

        let auto_suspended = self.auto_suspend_in_tx(tx, &profile).await?;

        Ok(WarningOutcome {
            warning,
            profile,
            auto_suspended,
        })
    }

    pub(crate) async fn violation_in_tx(
        &self,
        tx: &mut dyn StoreTx,
        violation: &Violation,
        actor: &Actor,
    ) -> Result<TrustProfile> {
        let profile = tx
            .apply_violation(
                violation.user_id,
                self.policy.trust_decay_per_violation,
                violation.ledger_field(),
                violation.ledger_amount(),
            )
            .await?;

        tx.append_audit(
            NewAuditEntry::new(
                AuditSubject::User,
                violation.user_id,
                AuditAction::ViolationRecorded,
                actor,
            )
            .reason(violation.reason.clone()),
        )
        .await?;

        Ok(profile)
    }

    pub(crate) async fn suspend_in_tx(
        &self,
        tx: &mut dyn StoreTx,
        user_id: i64,
        reason: &str,
        actor: &Actor,
    ) -> Result<bool> {
        let changed = tx.set_suspended(user_id, true).await?;
        if changed {
            tx.append_audit(
                NewAuditEntry::new(AuditSubject::User, user_id, AuditAction::Suspended, actor)
                    .reason(reason),
            )
            .await?;
        }
        Ok(changed)
    }

    /// Decides on the counters returned by the increment itself, and the
    /// flag flip is conditional, so concurrent warnings produce exactly one
    /// suspension entry.
    async fn auto_suspend_in_tx(&self, tx: &mut dyn StoreTx, profile: &TrustProfile) -> Result<bool> {
        if !self.policy.requires_suspension(profile) {
            return Ok(false);
        }

        let reason = format!(
            "auto-suspend: {} warnings, {} violations",
            profile.warning_count, profile.total_violations
        );
        let changed = self
            .suspend_in_tx(tx, profile.user_id, &reason, &Actor::System)
            .await?;
        if changed {
            warn!(
                user_id = profile.user_id,
                warning_count = profile.warning_count,
                total_violations = profile.total_violations,
                "User auto-suspended"
            );
        }
        Ok(changed)
    }
}

fn hard_override_warning(category: TextCategory, record: &ModerationRecord) -> NewWarning {
    let warning_type = match category {
        TextCategory::AdultServices => WarningType::InappropriateContent,
        TextCategory::DrugSale => WarningType::ProhibitedItem,
        TextCategory::Violence => WarningType::Harassment,
        TextCategory::Profanity => WarningType::InappropriateContent,
        TextCategory::SpamKeyword => WarningType::Spam,
    };

    NewWarning::new(
        record.user_id,
        warning_type,
        WarningSeverity::High,
        format!("Your {} was removed: {} content is not allowed", record.content_kind, category),
    )
    .for_content(record.content_kind, record.content_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FailPoint, InMemoryStore};

    fn service(store: &InMemoryStore) -> EnforcementService {
        EnforcementService::new(Arc::new(store.clone()), EnforcementPolicy::default())
    }

    fn spam_warning(user_id: i64) -> NewWarning {
        NewWarning::new(user_id, WarningType::Spam, WarningSeverity::Low, "Stop posting spam")
    }

    fn count(entries: &[AuditLogEntry], action: AuditAction) -> usize {
        entries.iter().filter(|e| e.action == action).count()
    }

    #[tokio::test]
    async fn test_third_warning_suspends_once() {
        let store = InMemoryStore::new();
        let service = service(&store);

        for n in 1..=4 {
            let outcome = service
                .issue_warning(spam_warning(5), Actor::Moderator(9))
                .await
                .unwrap();
            assert_eq!(outcome.profile.warning_count, n);
            assert_eq!(outcome.auto_suspended, n == 3);
        }

        let profile = store.trust_profile(5).await.unwrap().unwrap();
        assert!(profile.is_suspended);

        let audit = store.audit_entries(AuditSubject::User, 5).await.unwrap();
        assert_eq!(count(&audit, AuditAction::Suspended), 1);
        assert_eq!(count(&audit, AuditAction::Warned), 4);

        let suspension = audit
            .iter()
            .find(|e| e.action == AuditAction::Suspended)
            .unwrap();
        assert!(suspension.is_automated);
        assert_eq!(suspension.actor_id, None);
    }

    #[tokio::test]
    async fn test_violation_limit_triggers_suspension_on_next_warning() {
        let store = InMemoryStore::new();
        let service = service(&store);

        for _ in 0..5 {
            service
                .record_violation(
                    Violation {
                        user_id: 3,
                        category: ScoreCategory::Spam,
                        score: 70,
                        content_kind: None,
                        content_id: None,
                        reason: "spam report".to_string(),
                    },
                    Actor::Moderator(1),
                )
                .await
                .unwrap();
        }
        assert!(!store.trust_profile(3).await.unwrap().unwrap().is_suspended);

        let outcome = service
            .issue_warning(spam_warning(3), Actor::Moderator(1))
            .await
            .unwrap();
        assert!(outcome.auto_suspended);
    }

    #[tokio::test]
    async fn test_violation_updates_ledger() {
        let store = InMemoryStore::new();
        let service = service(&store);

        let profile = service
            .record_violation(
                Violation {
                    user_id: 8,
                    category: ScoreCategory::Toxicity,
                    score: 90,
                    content_kind: None,
                    content_id: None,
                    reason: "abusive message".to_string(),
                },
                Actor::Moderator(2),
            )
            .await
            .unwrap();

        assert_eq!(profile.total_violations, 1);
        assert_eq!(profile.trust_score, 90);
        assert_eq!(profile.abuse_score, 45);
        assert_eq!(profile.spam_score, 0);
    }

    #[tokio::test]
    async fn test_warning_insert_failure_fails_closed() {
        let store = InMemoryStore::new();
        let service = service(&store);
        store.fail_on(FailPoint::InsertWarning);

        let result = service.issue_warning(spam_warning(5), Actor::System).await;
        assert!(matches!(result, Err(ModerationError::Persistence(_))));

        assert!(store.trust_profile(5).await.unwrap().is_none());
        assert!(store.user_warnings(5).await.unwrap().is_empty());
        assert!(store.all_audit_entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_audit_failure_rolls_back_warning() {
        let store = InMemoryStore::new();
        let service = service(&store);
        store.fail_on(FailPoint::AppendAudit);

        let result = service.issue_warning(spam_warning(5), Actor::System).await;
        assert!(result.is_err());
        assert!(store.user_warnings(5).await.unwrap().is_empty());
        assert!(store.trust_profile(5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let store = InMemoryStore::new();
        let service = service(&store);

        let result = service
            .issue_warning(
                NewWarning::new(1, WarningType::Other, WarningSeverity::Low, "  "),
                Actor::Moderator(1),
            )
            .await;
        assert!(matches!(result, Err(ModerationError::Validation(_))));
    }

    #[tokio::test]
    async fn test_manual_suspend_is_idempotent() {
        let store = InMemoryStore::new();
        let service = service(&store);

        assert!(service.suspend_user(4, "fraud", Actor::Moderator(7)).await.unwrap());
        assert!(!service.suspend_user(4, "fraud", Actor::Moderator(7)).await.unwrap());

        let audit = store.audit_entries(AuditSubject::User, 4).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert!(!audit[0].is_automated);
        assert_eq!(audit[0].actor_id, Some(7));
    }

    #[tokio::test]
    async fn test_ban() {
        let store = InMemoryStore::new();
        let service = service(&store);

        assert!(service.ban_user(4, "scam ring", Actor::Moderator(7)).await.unwrap());
        assert!(!service.ban_user(4, "scam ring", Actor::Moderator(7)).await.unwrap());

        let profile = service.trust_profile(4).await.unwrap();
        assert!(profile.is_banned);
    }
}
