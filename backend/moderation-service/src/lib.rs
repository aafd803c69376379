pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod metrics;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::Config;
pub use db::{InMemoryStore, ModerationStore, PgModerationStore};
pub use error::{ModerationError, Result};
pub use models::{
    Actor, Appeal, AppealDecision, AppealStatus, AppealType, BulkActionRequest, BulkActionResult,
    BulkActionType, ContentKind, ModerationResult, TrustProfile, Warning,
};
pub use services::{
    AppealService, BulkActionService, EnforcementService, ModerationService, ScoreAggregator,
    TextSignalExtractor,
};
