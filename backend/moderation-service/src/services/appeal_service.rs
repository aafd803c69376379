use super::fail_closed;
use crate::db::{ModerationStore, StoreTx};
use crate::error::{ModerationError, Result};
use crate::metrics;
use crate::models::{
    Actor, Appeal, AppealDecision, AppealResolution, AppealStatus, AppealType, AuditAction,
    AuditSubject, ContentStatus, NewAppeal, NewAuditEntry,
};
use std::sync::Arc;
use tracing::info;

/// Appeal service for handling enforcement appeal workflows
pub struct AppealService {
    store: Arc<dyn ModerationStore>,
}

impl AppealService {
    pub fn new(store: Arc<dyn ModerationStore>) -> Self {
        Self { store }
    }

    /// Submit a new appeal. At most one appeal per target may be open.
    pub async fn submit_appeal(&self, mut input: NewAppeal) -> Result<Appeal> {
        input.reason = input.reason.trim().to_string();
        if input.reason.is_empty() {
            return Err(ModerationError::Validation(
                "appeal reason must not be empty".to_string(),
            ));
        }
        input.evidence = input
            .evidence
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        let actor = Actor::User(input.user_id);
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(fail_closed("submit_appeal"))?;

        if let Some(existing) = tx
            .open_appeal(input.user_id, input.appeal_type, input.related_id)
            .await?
        {
            return Err(ModerationError::DuplicateAppeal(existing.id));
        }

        validate_target(tx.as_mut(), &input).await?;

        let appeal = tx
            .insert_appeal(&input)
            .await
            .map_err(fail_closed("submit_appeal"))?;
        tx.append_audit(
            NewAuditEntry::new(
                AuditSubject::Appeal,
                appeal.id,
                AuditAction::AppealSubmitted,
                &actor,
            )
            .reason(format!("{} {}", appeal.appeal_type.as_str(), appeal.related_id)),
        )
        .await
        .map_err(fail_closed("submit_appeal"))?;
        tx.commit().await.map_err(fail_closed("submit_appeal"))?;

        info!(
            appeal_id = appeal.id,
            user_id = appeal.user_id,
            appeal_type = appeal.appeal_type.as_str(),
            related_id = appeal.related_id,
            "Appeal submitted"
        );
        metrics::APPEALS_TOTAL.with_label_values(&["submitted"]).inc();

        Ok(appeal)
    }

    /// Move a pending appeal into review
    pub async fn start_review(&self, appeal_id: i64, moderator_id: i64) -> Result<Appeal> {
        let actor = Actor::Moderator(moderator_id);
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(fail_closed("start_review"))?;

        let current = tx
            .appeal_for_update(appeal_id)
            .await?
            .ok_or(ModerationError::AppealNotFound(appeal_id))?;
        if current.status != AppealStatus::Pending {
            return Err(ModerationError::Conflict(format!(
                "appeal {} is {}, not pending",
                appeal_id,
                current.status.as_str()
            )));
        }

        let appeal = tx
            .update_appeal_status(
                appeal_id,
                AppealStatus::Pending,
                AppealStatus::Reviewing,
                moderator_id,
                None,
            )
            .await
            .map_err(fail_closed("start_review"))?
            .ok_or_else(|| {
                ModerationError::Conflict(format!("appeal {} changed concurrently", appeal_id))
            })?;
        tx.append_audit(NewAuditEntry::new(
            AuditSubject::Appeal,
            appeal_id,
            AuditAction::AppealReviewStarted,
            &actor,
        ))
        .await
        .map_err(fail_closed("start_review"))?;
        tx.commit().await.map_err(fail_closed("start_review"))?;

        info!(appeal_id, moderator_id, "Appeal review started");
        metrics::APPEALS_TOTAL
            .with_label_values(&["review_started"])
            .inc();

        Ok(appeal)
    }

    /// Resolve an appeal. Approval performs exactly one compensating action;
    /// the status change and the reversal commit together or not at all.
    pub async fn resolve_appeal(
        &self,
        appeal_id: i64,
        moderator_id: i64,
        decision: AppealDecision,
        notes: Option<String>,
    ) -> Result<AppealResolution> {
        let actor = Actor::Moderator(moderator_id);
        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(fail_closed("resolve_appeal"))?;

        let current = tx
            .appeal_for_update(appeal_id)
            .await?
            .ok_or(ModerationError::AppealNotFound(appeal_id))?;
        if !current.status.is_open() {
            return Err(ModerationError::AppealNotResolvable(appeal_id));
        }

        let new_status: AppealStatus = decision.into();
        let appeal = tx
            .update_appeal_status(
                appeal_id,
                current.status,
                new_status,
                moderator_id,
                notes.as_deref(),
            )
            .await
            .map_err(fail_closed("resolve_appeal"))?
            .ok_or(ModerationError::AppealNotResolvable(appeal_id))?;

        let action_reversed = match decision {
            AppealDecision::Approved => reverse_in_tx(tx.as_mut(), &appeal, &actor)
                .await
                .map_err(fail_closed("resolve_appeal"))?,
            AppealDecision::Rejected => false,
        };

        let audit_action = match decision {
            AppealDecision::Approved => AuditAction::AppealApproved,
            AppealDecision::Rejected => AuditAction::AppealRejected,
        };
        let mut entry = NewAuditEntry::new(AuditSubject::Appeal, appeal_id, audit_action, &actor);
        if let Some(notes) = &notes {
            entry = entry.reason(notes.clone());
        }
        tx.append_audit(entry)
            .await
            .map_err(fail_closed("resolve_appeal"))?;
        tx.commit().await.map_err(fail_closed("resolve_appeal"))?;

        info!(
            appeal_id,
            moderator_id,
            decision = new_status.as_str(),
            action_reversed,
            "Appeal resolved"
        );
        metrics::APPEALS_TOTAL
            .with_label_values(&[new_status.as_str()])
            .inc();

        Ok(AppealResolution {
            appeal,
            action_reversed,
        })
    }

    /// Get appeal by ID
    pub async fn get_appeal(&self, appeal_id: i64) -> Result<Appeal> {
        self.store
            .appeal(appeal_id)
            .await?
            .ok_or(ModerationError::AppealNotFound(appeal_id))
    }

    /// List appeals, newest first
    pub async fn list_appeals(
        &self,
        status: Option<AppealStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Appeal>> {
        self.store
            .list_appeals(status, limit.clamp(1, 100), offset.max(0))
            .await
    }
}

/// The appellant may only appeal enforcement that applies to them and is
/// still in effect
async fn validate_target(tx: &mut dyn StoreTx, input: &NewAppeal) -> Result<()> {
    match input.appeal_type {
        AppealType::Warning => {
            let warning = tx
                .warning_for_update(input.related_id)
                .await?
                .filter(|w| w.user_id == input.user_id);
            if warning.is_none() {
                return Err(ModerationError::NotFound(format!(
                    "Warning {} not found",
                    input.related_id
                )));
            }
        }
        AppealType::ContentRemoval => {
            let item = tx
                .content_for_update(input.related_id)
                .await?
                .filter(|c| c.owner_id == input.user_id)
                .ok_or_else(|| {
                    ModerationError::NotFound(format!("Content {} not found", input.related_id))
                })?;
            if !item.status.is_removed() {
                return Err(ModerationError::Validation(format!(
                    "content {} has not been removed",
                    item.id
                )));
            }
        }
        AppealType::Suspension | AppealType::Ban => {
            if input.related_id != input.user_id {
                return Err(ModerationError::Validation(
                    "suspension and ban appeals must reference the appellant".to_string(),
                ));
            }
            let profile = tx.profile_for_update(input.user_id).await?;
            let in_effect = profile.map_or(false, |p| match input.appeal_type {
                AppealType::Suspension => p.is_suspended,
                _ => p.is_banned,
            });
            if !in_effect {
                return Err(ModerationError::Validation(format!(
                    "user {} has no active {}",
                    input.user_id,
                    input.appeal_type.as_str()
                )));
            }
        }
    }
    Ok(())
}

/// The compensating action for an approved appeal. Returns whether any state
/// actually changed.
async fn reverse_in_tx(tx: &mut dyn StoreTx, appeal: &Appeal, actor: &Actor) -> Result<bool> {
    let reason = format!("appeal {} approved", appeal.id);

    match appeal.appeal_type {
        AppealType::Warning => {
            let warning = tx
                .warning_for_update(appeal.related_id)
                .await?
                .ok_or_else(|| {
                    ModerationError::NotFound(format!("Warning {} not found", appeal.related_id))
                })?;
            if !tx.delete_warning(warning.id).await? {
                return Err(ModerationError::NotFound(format!(
                    "Warning {} not found",
                    warning.id
                )));
            }
            tx.decrement_warning_count(warning.user_id).await?;
            tx.append_audit(
                NewAuditEntry::new(
                    AuditSubject::User,
                    warning.user_id,
                    AuditAction::WarningRevoked,
                    actor,
                )
                .reason(reason),
            )
            .await?;
            Ok(true)
        }
        AppealType::Suspension => {
            let changed = tx.set_suspended(appeal.user_id, false).await?;
            if changed {
                tx.append_audit(
                    NewAuditEntry::new(
                        AuditSubject::User,
                        appeal.user_id,
                        AuditAction::Unsuspended,
                        actor,
                    )
                    .reason(reason),
                )
                .await?;
            }
            Ok(changed)
        }
        AppealType::Ban => {
            let changed = tx.set_banned(appeal.user_id, false).await?;
            if changed {
                tx.append_audit(
                    NewAuditEntry::new(AuditSubject::User, appeal.user_id, AuditAction::Unbanned, actor)
                        .reason(reason),
                )
                .await?;
            }
            Ok(changed)
        }
        AppealType::ContentRemoval => {
            let item = tx
                .content_for_update(appeal.related_id)
                .await?
                .ok_or_else(|| {
                    ModerationError::NotFound(format!("Content {} not found", appeal.related_id))
                })?;
            if item.status == ContentStatus::Active {
                return Ok(false);
            }
            tx.set_content_status(item.id, ContentStatus::Active).await?;
            tx.append_audit(
                NewAuditEntry::new(item.kind.into(), item.id, AuditAction::ContentRestored, actor)
                    .reason(reason),
            )
            .await?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FailPoint, InMemoryStore};
    use crate::models::{ContentItem, ContentKind, TrustProfile};

    fn appeal_input(user_id: i64, appeal_type: AppealType, related_id: i64) -> NewAppeal {
        NewAppeal {
            user_id,
            appeal_type,
            related_id,
            reason: "I believe this was a mistake".to_string(),
            evidence: None,
        }
    }

    async fn suspended_user(store: &InMemoryStore, user_id: i64) {
        let mut profile = TrustProfile::new(user_id);
        profile.is_suspended = true;
        store.insert_profile(profile).await;
    }

    #[tokio::test]
    async fn test_duplicate_open_appeal_rejected() {
        let store = InMemoryStore::new();
        suspended_user(&store, 5).await;
        let service = AppealService::new(Arc::new(store.clone()));

        let first = service
            .submit_appeal(appeal_input(5, AppealType::Suspension, 5))
            .await
            .unwrap();
        let second = service
            .submit_appeal(appeal_input(5, AppealType::Suspension, 5))
            .await;

        assert!(matches!(second, Err(ModerationError::DuplicateAppeal(id)) if id == first.id));
        assert_eq!(service.list_appeals(None, 10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_reason_rejected() {
        let store = InMemoryStore::new();
        let service = AppealService::new(Arc::new(store));

        let mut input = appeal_input(5, AppealType::Suspension, 5);
        input.reason = "   ".to_string();
        assert!(matches!(
            service.submit_appeal(input).await,
            Err(ModerationError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_suspension_appeal_requires_active_suspension() {
        let store = InMemoryStore::new();
        let service = AppealService::new(Arc::new(store));

        let result = service
            .submit_appeal(appeal_input(5, AppealType::Suspension, 5))
            .await;
        assert!(matches!(result, Err(ModerationError::Validation(_))));
    }

    #[tokio::test]
    async fn test_content_appeal_requires_removed_content() {
        let store = InMemoryStore::new();
        store
            .insert_content(ContentItem::new(42, ContentKind::Listing, 5, "bike"))
            .await;
        let service = AppealService::new(Arc::new(store));

        let result = service
            .submit_appeal(appeal_input(5, AppealType::ContentRemoval, 42))
            .await;
        assert!(matches!(result, Err(ModerationError::Validation(_))));

        let other_owner = service
            .submit_appeal(appeal_input(6, AppealType::ContentRemoval, 42))
            .await;
        assert!(matches!(other_owner, Err(ModerationError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_approve_suspension_appeal_clears_flag() {
        let store = InMemoryStore::new();
        suspended_user(&store, 5).await;
        let service = AppealService::new(Arc::new(store.clone()));

        let appeal = service
            .submit_appeal(appeal_input(5, AppealType::Suspension, 5))
            .await
            .unwrap();
        service.start_review(appeal.id, 9).await.unwrap();

        let resolution = service
            .resolve_appeal(appeal.id, 9, AppealDecision::Approved, Some("Looks fine".into()))
            .await
            .unwrap();

        assert!(resolution.action_reversed);
        assert_eq!(resolution.appeal.status, AppealStatus::Approved);
        assert_eq!(resolution.appeal.reviewed_by, Some(9));
        assert!(!store.trust_profile(5).await.unwrap().unwrap().is_suspended);
    }

    #[tokio::test]
    async fn test_rejection_changes_nothing_else() {
        let store = InMemoryStore::new();
        suspended_user(&store, 5).await;
        let service = AppealService::new(Arc::new(store.clone()));

        let appeal = service
            .submit_appeal(appeal_input(5, AppealType::Suspension, 5))
            .await
            .unwrap();
        let resolution = service
            .resolve_appeal(appeal.id, 9, AppealDecision::Rejected, None)
            .await
            .unwrap();

        assert!(!resolution.action_reversed);
        assert!(store.trust_profile(5).await.unwrap().unwrap().is_suspended);
    }

    #[tokio::test]
    async fn test_second_resolution_fails() {
        let store = InMemoryStore::new();
        suspended_user(&store, 5).await;
        let service = AppealService::new(Arc::new(store.clone()));

        let appeal = service
            .submit_appeal(appeal_input(5, AppealType::Suspension, 5))
            .await
            .unwrap();
        service
            .resolve_appeal(appeal.id, 9, AppealDecision::Rejected, None)
            .await
            .unwrap();
        let audit_before = store.all_audit_entries().await.len();

        let again = service
            .resolve_appeal(appeal.id, 9, AppealDecision::Approved, None)
            .await;

        assert!(matches!(again, Err(ModerationError::AppealNotResolvable(_))));
        assert!(store.trust_profile(5).await.unwrap().unwrap().is_suspended);
        assert_eq!(store.all_audit_entries().await.len(), audit_before);
    }

    #[tokio::test]
    async fn test_reversal_failure_rolls_back_status() {
        let store = InMemoryStore::new();
        suspended_user(&store, 5).await;
        let service = AppealService::new(Arc::new(store.clone()));

        let appeal = service
            .submit_appeal(appeal_input(5, AppealType::Suspension, 5))
            .await
            .unwrap();

        store.fail_on(FailPoint::SetSuspended);
        let result = service
            .resolve_appeal(appeal.id, 9, AppealDecision::Approved, None)
            .await;
        assert!(matches!(result, Err(ModerationError::Persistence(_))));
        store.clear_fail_points();

        let stored = service.get_appeal(appeal.id).await.unwrap();
        assert_eq!(stored.status, AppealStatus::Pending);
        assert!(store.trust_profile(5).await.unwrap().unwrap().is_suspended);

        // Still resolvable after the failed attempt
        let resolution = service
            .resolve_appeal(appeal.id, 9, AppealDecision::Approved, None)
            .await
            .unwrap();
        assert!(resolution.action_reversed);
    }

    #[tokio::test]
    async fn test_unknown_appeal() {
        let store = InMemoryStore::new();
        let service = AppealService::new(Arc::new(store));

        assert!(matches!(
            service
                .resolve_appeal(404, 9, AppealDecision::Approved, None)
                .await,
            Err(ModerationError::AppealNotFound(404))
        ));
    }
}
