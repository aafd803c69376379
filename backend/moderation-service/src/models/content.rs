use crate::error::ModerationError;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Kind of marketplace content the moderation core understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "content_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Listing,
    Image,
    Message,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Listing => "listing",
            ContentKind::Image => "image",
            ContentKind::Message => "message",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "listing" => Ok(ContentKind::Listing),
            "image" => Ok(ContentKind::Image),
            "message" => Ok(ContentKind::Message),
            other => Err(ModerationError::Validation(format!(
                "unknown content type: {}",
                other
            ))),
        }
    }
}

/// Moderation status of a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "content_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Pending,
    Active,
    Flagged,
    Rejected,
    Deleted,
}

impl ContentStatus {
    /// Deleted content can no longer be moderated, only restored by an appeal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ContentStatus::Deleted)
    }

    /// States a content-removal appeal can restore from.
    pub fn is_removed(&self) -> bool {
        matches!(
            self,
            ContentStatus::Flagged | ContentStatus::Rejected | ContentStatus::Deleted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Pending => "pending",
            ContentStatus::Active => "active",
            ContentStatus::Flagged => "flagged",
            ContentStatus::Rejected => "rejected",
            ContentStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content record owned by the submission flow; the core only reads and
/// updates its status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ContentItem {
    pub id: i64,
    pub kind: ContentKind,
    pub owner_id: i64,
    pub body_or_media_ref: String,
    pub status: ContentStatus,
}

impl ContentItem {
    pub fn new(id: i64, kind: ContentKind, owner_id: i64, body_or_media_ref: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            owner_id,
            body_or_media_ref: body_or_media_ref.into(),
            status: ContentStatus::Pending,
        }
    }

    pub fn with_status(mut self, status: ContentStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_kind_parsing() {
        assert_eq!("Listing".parse::<ContentKind>().unwrap(), ContentKind::Listing);
        assert_eq!(" image ".parse::<ContentKind>().unwrap(), ContentKind::Image);
        assert!("profile".parse::<ContentKind>().is_err());
    }

    #[test]
    fn test_terminal_status() {
        assert!(ContentStatus::Deleted.is_terminal());
        assert!(!ContentStatus::Rejected.is_terminal());
        assert!(ContentStatus::Rejected.is_removed());
        assert!(!ContentStatus::Active.is_removed());
    }
}
