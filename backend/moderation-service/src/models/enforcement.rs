//! User enforcement models (trust profile, warnings, standing)

use super::content::ContentKind;
use super::moderation::ScoreCategory;
use crate::error::ModerationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Who performed an action. Threaded explicitly through every mutating call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Actor {
    /// The automated pipeline
    System,
    Moderator(i64),
    /// An end user acting on their own behalf (appeals)
    User(i64),
}

impl Actor {
    pub fn actor_id(&self) -> Option<i64> {
        match self {
            Actor::System => None,
            Actor::Moderator(id) | Actor::User(id) => Some(*id),
        }
    }

    pub fn is_automated(&self) -> bool {
        matches!(self, Actor::System)
    }
}

/// Per-user cumulative behavioural scores and counters.
///
/// `trust_score` stays within 0..=100 and never increases on a violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TrustProfile {
    pub user_id: i64,
    pub spam_score: i32,
    pub abuse_score: i32,
    pub trust_score: i32,
    pub total_violations: i32,
    pub warning_count: i32,
    pub is_suspended: bool,
    pub is_banned: bool,
    pub last_violation_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TrustProfile {
    pub const MAX_SCORE: i32 = 100;

    /// Profile of a user with no history
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            spam_score: 0,
            abuse_score: 0,
            trust_score: Self::MAX_SCORE,
            total_violations: 0,
            warning_count: 0,
            is_suspended: false,
            is_banned: false,
            last_violation_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn standing(&self) -> UserStanding {
        if self.is_banned {
            UserStanding::Banned
        } else if self.is_suspended {
            UserStanding::Suspended
        } else if self.warning_count > 0 {
            UserStanding::Warned(self.warning_count)
        } else {
            UserStanding::Good
        }
    }
}

/// Enforcement state of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "warnings", rename_all = "lowercase")]
pub enum UserStanding {
    Good,
    Warned(i32),
    Suspended,
    Banned,
}

/// Trust-ledger field a violation is charged to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerField {
    Spam,
    Abuse,
}

impl From<ScoreCategory> for LedgerField {
    fn from(category: ScoreCategory) -> Self {
        match category {
            ScoreCategory::Spam => LedgerField::Spam,
            ScoreCategory::Toxicity
            | ScoreCategory::Profanity
            | ScoreCategory::SexualContent
            | ScoreCategory::Nsfw
            | ScoreCategory::Violence
            | ScoreCategory::Drug
            | ScoreCategory::Weapon => LedgerField::Abuse,
        }
    }
}

/// A confirmed violation, from the scoring pipeline or a resolved report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub user_id: i64,
    pub category: ScoreCategory,
    /// Score of the triggering category; half of it is charged to the ledger
    pub score: i32,
    pub content_kind: Option<ContentKind>,
    pub content_id: Option<i64>,
    pub reason: String,
}

impl Violation {
    pub fn ledger_field(&self) -> LedgerField {
        self.category.into()
    }

    pub fn ledger_amount(&self) -> i32 {
        (self.score.clamp(0, TrustProfile::MAX_SCORE)) / 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "warning_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WarningType {
    Spam,
    Harassment,
    InappropriateContent,
    Scam,
    ProhibitedItem,
    Other,
}

impl FromStr for WarningType {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spam" => Ok(WarningType::Spam),
            "harassment" => Ok(WarningType::Harassment),
            "inappropriate_content" => Ok(WarningType::InappropriateContent),
            "scam" => Ok(WarningType::Scam),
            "prohibited_item" => Ok(WarningType::ProhibitedItem),
            "other" => Ok(WarningType::Other),
            other => Err(ModerationError::Validation(format!(
                "unknown warning type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "warning_severity", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WarningSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl FromStr for WarningSeverity {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(WarningSeverity::Low),
            "medium" => Ok(WarningSeverity::Medium),
            "high" => Ok(WarningSeverity::High),
            "critical" => Ok(WarningSeverity::Critical),
            other => Err(ModerationError::Validation(format!(
                "unknown warning severity: {}",
                other
            ))),
        }
    }
}

/// User warning record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Warning {
    pub id: i64,
    pub user_id: i64,
    pub warning_type: WarningType,
    pub severity: WarningSeverity,
    pub related_content_kind: Option<ContentKind>,
    pub related_content_id: Option<i64>,
    pub message: String,
    /// `None` when issued by the automated pipeline
    pub issued_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Input for issuing a new warning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWarning {
    pub user_id: i64,
    pub warning_type: WarningType,
    pub severity: WarningSeverity,
    pub message: String,
    pub related_content_kind: Option<ContentKind>,
    pub related_content_id: Option<i64>,
}

impl NewWarning {
    pub fn new(
        user_id: i64,
        warning_type: WarningType,
        severity: WarningSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            warning_type,
            severity,
            message: message.into(),
            related_content_kind: None,
            related_content_id: None,
        }
    }

    pub fn for_content(mut self, kind: ContentKind, content_id: i64) -> Self {
        self.related_content_kind = Some(kind);
        self.related_content_id = Some(content_id);
        self
    }
}

/// Outcome of a warning issuance
#[derive(Debug, Clone, Serialize)]
pub struct WarningOutcome {
    pub warning: Warning,
    pub profile: TrustProfile,
    /// True only when this issuance moved the user into suspension
    pub auto_suspended: bool,
}

/// What the enforcement engine did about one blocked content item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnforcementSummary {
    pub content_flagged: bool,
    pub violation_recorded: bool,
    pub warning_id: Option<i64>,
    pub auto_suspended: bool,
    pub trust_score: i32,
}
