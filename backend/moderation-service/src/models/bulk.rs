use super::content::{ContentKind, ContentStatus};
use crate::error::ModerationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

/// Moderator action applied to every item of a bulk batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "bulk_action_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BulkActionType {
    Approve,
    Reject,
    Delete,
    Warn,
    Suspend,
}

impl BulkActionType {
    /// Supported (action, content type) combinations
    pub fn supports(&self, kind: ContentKind) -> bool {
        match (self, kind) {
            (BulkActionType::Approve | BulkActionType::Reject, ContentKind::Listing)
            | (BulkActionType::Approve | BulkActionType::Reject, ContentKind::Image) => true,
            (BulkActionType::Approve | BulkActionType::Reject, ContentKind::Message) => false,
            (BulkActionType::Delete, _) => true,
            (BulkActionType::Warn | BulkActionType::Suspend, _) => true,
        }
    }

    /// Status the content moves to, for content mutations
    pub fn target_status(&self) -> Option<ContentStatus> {
        match self {
            BulkActionType::Approve => Some(ContentStatus::Active),
            BulkActionType::Reject => Some(ContentStatus::Rejected),
            BulkActionType::Delete => Some(ContentStatus::Deleted),
            BulkActionType::Warn | BulkActionType::Suspend => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BulkActionType::Approve => "approve",
            BulkActionType::Reject => "reject",
            BulkActionType::Delete => "delete",
            BulkActionType::Warn => "warn",
            BulkActionType::Suspend => "suspend",
        }
    }
}

impl FromStr for BulkActionType {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "approve" => Ok(BulkActionType::Approve),
            "reject" => Ok(BulkActionType::Reject),
            "delete" => Ok(BulkActionType::Delete),
            "warn" => Ok(BulkActionType::Warn),
            "suspend" => Ok(BulkActionType::Suspend),
            other => Err(ModerationError::Validation(format!(
                "unknown bulk action: {}",
                other
            ))),
        }
    }
}

/// Outcome of one item in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BulkItemResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(err: &ModerationError) -> Self {
        Self {
            success: false,
            error: Some(format!("{}: {}", err.kind(), err.public_message())),
        }
    }
}

/// Input of a bulk moderation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkActionRequest {
    pub action: BulkActionType,
    pub content_kind: ContentKind,
    pub item_ids: Vec<i64>,
    pub reason: String,
    pub moderator_id: i64,
}

/// Per-batch result returned to the caller
#[derive(Debug, Clone, Serialize)]
pub struct BulkActionResult {
    pub batch_id: Uuid,
    pub processed: usize,
    pub failed: usize,
    pub details: BTreeMap<i64, BulkItemResult>,
    /// False if the batch record itself could not be written
    pub batch_recorded: bool,
}

/// Batch-level audit record, written once after every item was processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BulkActionBatch {
    pub id: Uuid,
    pub action_type: BulkActionType,
    pub content_kind: ContentKind,
    pub item_ids: Vec<i64>,
    pub reason: String,
    pub created_by: i64,
    pub per_item_results: Json<BTreeMap<i64, BulkItemResult>>,
    pub success_count: i32,
    pub failure_count: i32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_support_matrix() {
        assert!(BulkActionType::Approve.supports(ContentKind::Listing));
        assert!(BulkActionType::Reject.supports(ContentKind::Image));
        assert!(!BulkActionType::Approve.supports(ContentKind::Message));
        assert!(!BulkActionType::Reject.supports(ContentKind::Message));
        assert!(BulkActionType::Delete.supports(ContentKind::Message));
        assert!(BulkActionType::Warn.supports(ContentKind::Message));
    }

    #[test]
    fn test_target_status() {
        assert_eq!(
            BulkActionType::Approve.target_status(),
            Some(ContentStatus::Active)
        );
        assert_eq!(BulkActionType::Suspend.target_status(), None);
    }

    #[test]
    fn test_unknown_action_is_validation_error() {
        assert!(matches!(
            "archive".parse::<BulkActionType>(),
            Err(ModerationError::Validation(_))
        ));
    }
}
