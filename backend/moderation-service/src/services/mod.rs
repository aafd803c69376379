pub mod appeal_service;
pub mod bulk_action_service;
pub mod classifier;
pub mod enforcement_service;
pub mod moderation_service;
pub mod scoring;
pub mod signals;

pub use appeal_service::AppealService;
pub use bulk_action_service::BulkActionService;
pub use classifier::{ClassificationOracle, HttpClassificationOracle, OracleScores};
pub use enforcement_service::{EnforcementPolicy, EnforcementService};
pub use moderation_service::ModerationService;
pub use scoring::{ScoreAggregator, ScoreOutcome, ScoreThresholds};
pub use signals::{BehaviorContext, ImageInspector, ImagePolicy, Lexicon, TextSignalExtractor};

use crate::error::ModerationError;
use crate::metrics;

/// Storage failures abort the surrounding operation with nothing committed.
/// This only adds the log line and the failure counter on the way out.
pub(crate) fn fail_closed(operation: &'static str) -> impl Fn(ModerationError) -> ModerationError {
    move |err| {
        if err.is_persistence() {
            tracing::error!(operation, error = %err, "Storage failure, transaction rolled back");
            metrics::PERSISTENCE_FAILURES_TOTAL
                .with_label_values(&[operation])
                .inc();
        }
        err
    }
}
