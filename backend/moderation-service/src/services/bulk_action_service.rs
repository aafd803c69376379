//! Bulk moderator actions over many content items.
//!
//! Items are processed one transaction each, so a failing item never undoes
//! or blocks its siblings. The batch record is written once at the end, in
//! its own transaction, whatever the item outcomes were.

use super::enforcement_service::EnforcementService;
use crate::db::{ModerationStore, StoreTx};
use crate::error::{ModerationError, Result};
use crate::metrics;
use crate::models::{
    Actor, AuditAction, BulkActionBatch, BulkActionRequest, BulkActionResult, BulkActionType,
    BulkItemResult, ContentItem, ContentKind, ContentStatus, NewAuditEntry, NewWarning,
    WarningSeverity, WarningType,
};
use chrono::Utc;
use sqlx::types::Json;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

pub struct BulkActionService {
    store: Arc<dyn ModerationStore>,
    enforcement: Arc<EnforcementService>,
}

impl BulkActionService {
    pub fn new(store: Arc<dyn ModerationStore>, enforcement: Arc<EnforcementService>) -> Self {
        Self { store, enforcement }
    }

    /// Apply one action to every listed item and record the batch.
    ///
    /// Duplicate ids are processed once. `processed + failed` equals the
    /// number of distinct ids.
    pub async fn process_bulk_action(&self, request: BulkActionRequest) -> Result<BulkActionResult> {
        if request.item_ids.is_empty() {
            return Err(ModerationError::Validation(
                "item_ids must not be empty".to_string(),
            ));
        }

        let actor = Actor::Moderator(request.moderator_id);
        let mut seen = HashSet::new();
        let item_ids: Vec<i64> = request
            .item_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let mut details = BTreeMap::new();
        for &item_id in &item_ids {
            let outcome = self
                .process_item(
                    request.action,
                    request.content_kind,
                    item_id,
                    &request.reason,
                    &actor,
                )
                .await;

            let result = match outcome {
                Ok(()) => BulkItemResult::ok(),
                Err(e) => {
                    if e.is_persistence() {
                        error!(
                            item_id,
                            action = request.action.as_str(),
                            error = %e,
                            "Bulk item failed"
                        );
                    } else {
                        info!(
                            item_id,
                            action = request.action.as_str(),
                            error = %e,
                            "Bulk item skipped"
                        );
                    }
                    BulkItemResult::failed(&e)
                }
            };
            metrics::BULK_ITEMS_TOTAL
                .with_label_values(&[
                    request.action.as_str(),
                    if result.success { "success" } else { "failure" },
                ])
                .inc();
            details.insert(item_id, result);
        }

        let success_count = details.values().filter(|r| r.success).count();
        let failure_count = details.len() - success_count;

        let batch = BulkActionBatch {
            id: Uuid::new_v4(),
            action_type: request.action,
            content_kind: request.content_kind,
            item_ids,
            reason: request.reason.clone(),
            created_by: request.moderator_id,
            per_item_results: Json(details.clone()),
            success_count: success_count as i32,
            failure_count: failure_count as i32,
            created_at: Utc::now(),
        };

        let batch_recorded = match self.record_batch(&batch).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    batch_id = %batch.id,
                    error = %e,
                    "Failed to write bulk batch record; item outcomes are unaffected"
                );
                metrics::PERSISTENCE_FAILURES_TOTAL
                    .with_label_values(&["record_bulk_batch"])
                    .inc();
                false
            }
        };

        info!(
            batch_id = %batch.id,
            action = request.action.as_str(),
            content_kind = %request.content_kind,
            moderator_id = request.moderator_id,
            processed = success_count,
            failed = failure_count,
            "Bulk action processed"
        );

        Ok(BulkActionResult {
            batch_id: batch.id,
            processed: success_count,
            failed: failure_count,
            details,
            batch_recorded,
        })
    }

    pub async fn batch(&self, batch_id: Uuid) -> Result<BulkActionBatch> {
        self.store
            .bulk_batch(batch_id)
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("Bulk batch {} not found", batch_id)))
    }

    async fn record_batch(&self, batch: &BulkActionBatch) -> Result<()> {
        let mut tx = self.store.begin().await?;
        tx.insert_bulk_batch(batch).await?;
        tx.commit().await
    }

    async fn process_item(
        &self,
        action: BulkActionType,
        kind: ContentKind,
        item_id: i64,
        reason: &str,
        actor: &Actor,
    ) -> Result<()> {
        if !action.supports(kind) {
            return Err(ModerationError::Validation(format!(
                "{} is not supported for {} content",
                action.as_str(),
                kind
            )));
        }

        let mut tx = self.store.begin().await?;
        let item = tx
            .content_for_update(item_id)
            .await?
            .filter(|item| item.kind == kind)
            .ok_or_else(|| ModerationError::NotFound(format!("{} {} not found", kind, item_id)))?;

        match action {
            BulkActionType::Approve | BulkActionType::Reject | BulkActionType::Delete => {
                let target = action.target_status().unwrap_or(ContentStatus::Deleted);
                set_status(tx.as_mut(), &item, target, reason, actor).await?;
            }
            BulkActionType::Warn => {
                let warning = NewWarning::new(
                    item.owner_id,
                    WarningType::Other,
                    WarningSeverity::Medium,
                    reason,
                )
                .for_content(kind, item.id);
                self.enforcement
                    .warn_in_tx(tx.as_mut(), &warning, actor)
                    .await?;
            }
            BulkActionType::Suspend => {
                // Suspending an already suspended owner is a successful no-op
                self.enforcement
                    .suspend_in_tx(tx.as_mut(), item.owner_id, reason, actor)
                    .await?;
            }
        }

        tx.commit().await
    }
}

async fn set_status(
    tx: &mut dyn StoreTx,
    item: &ContentItem,
    target: ContentStatus,
    reason: &str,
    actor: &Actor,
) -> Result<()> {
    if item.status.is_terminal() {
        return Err(ModerationError::Conflict(format!(
            "{} {} is already {}",
            item.kind, item.id, item.status
        )));
    }
    if item.status == target {
        return Err(ModerationError::Conflict(format!(
            "{} {} is already {}",
            item.kind, item.id, target
        )));
    }

    let action = match target {
        ContentStatus::Active => AuditAction::ContentApproved,
        ContentStatus::Rejected => AuditAction::ContentRejected,
        _ => AuditAction::ContentDeleted,
    };

    tx.set_content_status(item.id, target).await?;
    tx.append_audit(NewAuditEntry::new(item.kind.into(), item.id, action, actor).reason(reason))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FailPoint, InMemoryStore};
    use crate::services::enforcement_service::EnforcementPolicy;

    async fn setup() -> (InMemoryStore, BulkActionService) {
        let store = InMemoryStore::new();
        for id in 1..=4 {
            store
                .insert_content(ContentItem::new(id, ContentKind::Listing, 100 + id, "listing"))
                .await;
        }
        store
            .insert_content(ContentItem::new(50, ContentKind::Message, 150, "hi"))
            .await;

        let shared: Arc<dyn ModerationStore> = Arc::new(store.clone());
        let enforcement = Arc::new(EnforcementService::new(
            shared.clone(),
            EnforcementPolicy::default(),
        ));
        (store, BulkActionService::new(shared, enforcement))
    }

    fn request(action: BulkActionType, kind: ContentKind, ids: Vec<i64>) -> BulkActionRequest {
        BulkActionRequest {
            action,
            content_kind: kind,
            item_ids: ids,
            reason: "policy sweep".to_string(),
            moderator_id: 9,
        }
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let (store, service) = setup().await;

        let result = service
            .process_bulk_action(request(BulkActionType::Approve, ContentKind::Listing, vec![]))
            .await;
        assert!(matches!(result, Err(ModerationError::Validation(_))));
        assert!(store.all_bulk_batches().await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure() {
        let (store, service) = setup().await;

        let result = service
            .process_bulk_action(request(
                BulkActionType::Reject,
                ContentKind::Listing,
                vec![1, 2, 999, 50],
            ))
            .await
            .unwrap();

        assert_eq!(result.processed, 2);
        assert_eq!(result.failed, 2);
        assert!(result.details[&1].success);
        assert!(!result.details[&999].success);
        // Id 50 exists but is a message, not a listing
        assert!(!result.details[&50].success);
        assert!(result.batch_recorded);

        let item = store.content_item(1).await.unwrap().unwrap();
        assert_eq!(item.status, ContentStatus::Rejected);

        let batch = service.batch(result.batch_id).await.unwrap();
        assert_eq!(batch.success_count, 2);
        assert_eq!(batch.failure_count, 2);
    }

    #[tokio::test]
    async fn test_unsupported_combination_fails_items_only() {
        let (store, service) = setup().await;

        let result = service
            .process_bulk_action(request(BulkActionType::Approve, ContentKind::Message, vec![50]))
            .await
            .unwrap();

        assert_eq!(result.failed, 1);
        assert!(result.details[&50]
            .error
            .as_deref()
            .unwrap()
            .starts_with("validation"));
        assert_eq!(store.all_bulk_batches().await.len(), 1);
    }

    #[tokio::test]
    async fn test_deleted_item_is_conflict() {
        let (_store, service) = setup().await;

        service
            .process_bulk_action(request(BulkActionType::Delete, ContentKind::Listing, vec![3]))
            .await
            .unwrap();
        let again = service
            .process_bulk_action(request(BulkActionType::Approve, ContentKind::Listing, vec![3]))
            .await
            .unwrap();

        assert_eq!(again.failed, 1);
        assert!(again.details[&3].error.as_deref().unwrap().starts_with("conflict"));
    }

    #[tokio::test]
    async fn test_duplicate_ids_processed_once() {
        let (_store, service) = setup().await;

        let result = service
            .process_bulk_action(request(BulkActionType::Approve, ContentKind::Listing, vec![1, 1, 2]))
            .await
            .unwrap();

        assert_eq!(result.processed + result.failed, 2);
        assert_eq!(result.processed, 2);
    }

    #[tokio::test]
    async fn test_warn_dispatches_to_owner() {
        let (store, service) = setup().await;

        let result = service
            .process_bulk_action(request(BulkActionType::Warn, ContentKind::Message, vec![50]))
            .await
            .unwrap();
        assert_eq!(result.processed, 1);

        let warnings = store.user_warnings(150).await.unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].issued_by, Some(9));
        assert_eq!(warnings[0].related_content_id, Some(50));
    }

    #[tokio::test]
    async fn test_suspend_already_suspended_owner_succeeds() {
        let (store, service) = setup().await;

        let first = service
            .process_bulk_action(request(BulkActionType::Suspend, ContentKind::Listing, vec![1]))
            .await
            .unwrap();
        let second = service
            .process_bulk_action(request(BulkActionType::Suspend, ContentKind::Listing, vec![1]))
            .await
            .unwrap();

        assert_eq!(first.processed, 1);
        assert_eq!(second.processed, 1);
        assert!(store.trust_profile(101).await.unwrap().unwrap().is_suspended);
    }

    #[tokio::test]
    async fn test_batch_record_failure_keeps_item_results() {
        let (store, service) = setup().await;
        store.fail_on(FailPoint::InsertBulkBatch);

        let result = service
            .process_bulk_action(request(BulkActionType::Delete, ContentKind::Listing, vec![4]))
            .await
            .unwrap();

        assert_eq!(result.processed, 1);
        assert!(!result.batch_recorded);
        assert_eq!(
            store.content_item(4).await.unwrap().unwrap().status,
            ContentStatus::Deleted
        );
    }
}
