use super::content::ContentKind;
use super::enforcement::Actor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// What an audit entry refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audit_subject", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AuditSubject {
    Listing,
    Image,
    Message,
    User,
    Appeal,
}

impl From<ContentKind> for AuditSubject {
    fn from(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Listing => AuditSubject::Listing,
            ContentKind::Image => AuditSubject::Image,
            ContentKind::Message => AuditSubject::Message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audit_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ContentFlagged,
    ContentApproved,
    ContentRejected,
    ContentDeleted,
    ContentRestored,
    ViolationRecorded,
    Warned,
    Suspended,
    Banned,
    WarningRevoked,
    Unsuspended,
    Unbanned,
    AppealSubmitted,
    AppealReviewStarted,
    AppealApproved,
    AppealRejected,
}

/// Append-only enforcement log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub content_type: AuditSubject,
    pub content_id: i64,
    pub actor_id: Option<i64>,
    pub action: AuditAction,
    pub reason: Option<String>,
    pub is_automated: bool,
    pub created_at: DateTime<Utc>,
}

/// Audit entry to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub content_type: AuditSubject,
    pub content_id: i64,
    pub actor_id: Option<i64>,
    pub action: AuditAction,
    pub reason: Option<String>,
    pub is_automated: bool,
}

impl NewAuditEntry {
    pub fn new(
        content_type: AuditSubject,
        content_id: i64,
        action: AuditAction,
        actor: &Actor,
    ) -> Self {
        Self {
            content_type,
            content_id,
            actor_id: actor.actor_id(),
            action,
            reason: None,
            is_automated: actor.is_automated(),
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn into_entry(self) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::new_v4(),
            content_type: self.content_type,
            content_id: self.content_id,
            actor_id: self.actor_id,
            action: self.action,
            reason: self.reason,
            is_automated: self.is_automated,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automated_flag_follows_actor() {
        let automated = NewAuditEntry::new(AuditSubject::User, 5, AuditAction::Suspended, &Actor::System);
        assert!(automated.is_automated);
        assert_eq!(automated.actor_id, None);

        let manual = NewAuditEntry::new(
            AuditSubject::Listing,
            10,
            AuditAction::ContentDeleted,
            &Actor::Moderator(77),
        )
        .reason("duplicate listing");
        assert!(!manual.is_automated);
        assert_eq!(manual.actor_id, Some(77));
        assert_eq!(manual.reason.as_deref(), Some("duplicate listing"));
    }
}
