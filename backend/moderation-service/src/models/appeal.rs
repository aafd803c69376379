use crate::error::ModerationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// What an appeal asks to reverse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "appeal_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AppealType {
    Warning,
    Suspension,
    Ban,
    ContentRemoval,
}

impl AppealType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppealType::Warning => "warning",
            AppealType::Suspension => "suspension",
            AppealType::Ban => "ban",
            AppealType::ContentRemoval => "content_removal",
        }
    }
}

impl FromStr for AppealType {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "warning" => Ok(AppealType::Warning),
            "suspension" => Ok(AppealType::Suspension),
            "ban" => Ok(AppealType::Ban),
            "content_removal" => Ok(AppealType::ContentRemoval),
            other => Err(ModerationError::Validation(format!(
                "unknown appeal type: {}",
                other
            ))),
        }
    }
}

/// Appeal status enum with state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "appeal_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AppealStatus {
    Pending,
    Reviewing,
    Approved,
    Rejected,
}

impl AppealStatus {
    /// Validate state transition (pending -> reviewing -> approved/rejected)
    pub fn can_transition_to(&self, new_status: AppealStatus) -> bool {
        matches!(
            (self, new_status),
            (AppealStatus::Pending, AppealStatus::Reviewing)
                | (AppealStatus::Pending, AppealStatus::Approved)
                | (AppealStatus::Pending, AppealStatus::Rejected)
                | (AppealStatus::Reviewing, AppealStatus::Approved)
                | (AppealStatus::Reviewing, AppealStatus::Rejected)
        )
    }

    /// Pending and reviewing appeals block new submissions for the same target
    pub fn is_open(&self) -> bool {
        matches!(self, AppealStatus::Pending | AppealStatus::Reviewing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppealStatus::Pending => "pending",
            AppealStatus::Reviewing => "reviewing",
            AppealStatus::Approved => "approved",
            AppealStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for AppealStatus {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(AppealStatus::Pending),
            "reviewing" => Ok(AppealStatus::Reviewing),
            "approved" => Ok(AppealStatus::Approved),
            "rejected" => Ok(AppealStatus::Rejected),
            other => Err(ModerationError::Validation(format!(
                "unknown appeal status: {}",
                other
            ))),
        }
    }
}

/// Moderator decision on an appeal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppealDecision {
    Approved,
    Rejected,
}

impl From<AppealDecision> for AppealStatus {
    fn from(decision: AppealDecision) -> Self {
        match decision {
            AppealDecision::Approved => AppealStatus::Approved,
            AppealDecision::Rejected => AppealStatus::Rejected,
        }
    }
}

impl FromStr for AppealDecision {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "approved" | "approve" => Ok(AppealDecision::Approved),
            "rejected" | "reject" => Ok(AppealDecision::Rejected),
            other => Err(ModerationError::Validation(format!(
                "invalid decision: {} (expected approved or rejected)",
                other
            ))),
        }
    }
}

/// Appeal record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Appeal {
    pub id: i64,
    pub user_id: i64,
    pub appeal_type: AppealType,
    /// Warning id, content id, or the appellant's user id for suspension/ban appeals
    pub related_id: i64,
    pub reason: String,
    pub evidence: Option<String>,
    pub status: AppealStatus,
    pub reviewed_by: Option<i64>,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Appeal {
    /// Apply a review transition in memory
    pub fn review(
        &mut self,
        moderator_id: i64,
        new_status: AppealStatus,
        notes: Option<String>,
    ) -> Result<(), ModerationError> {
        if !self.status.can_transition_to(new_status) {
            return Err(ModerationError::AppealNotResolvable(self.id));
        }

        self.status = new_status;
        self.reviewed_by = Some(moderator_id);
        if notes.is_some() {
            self.review_notes = notes;
        }
        if !new_status.is_open() {
            self.resolved_at = Some(Utc::now());
        }

        Ok(())
    }
}

/// Input for submitting an appeal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAppeal {
    pub user_id: i64,
    pub appeal_type: AppealType,
    pub related_id: i64,
    pub reason: String,
    pub evidence: Option<String>,
}

/// Outcome of `resolve_appeal`
#[derive(Debug, Clone, Serialize)]
pub struct AppealResolution {
    pub appeal: Appeal,
    pub action_reversed: bool,
}
