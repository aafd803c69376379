//! Analysis pipeline: signals, scoring, record, enforcement.
//!
//! The moderation record is committed on its own before enforcement runs, so
//! a failed enforcement never loses the analysis result.

use super::classifier::{classify_with_timeout, ClassificationOracle};
use super::enforcement_service::EnforcementService;
use super::fail_closed;
use super::scoring::{ScoreAggregator, ScoreOutcome};
use super::signals::{is_duplicate, BehaviorContext, ImageInspector, TextSignalExtractor};
use crate::db::ModerationStore;
use crate::error::{ModerationError, Result};
use crate::metrics;
use crate::models::{
    ContentKind, ImageFingerprint, ModerationRecord, ModerationResult, RecordStatus, SignalSet,
};
use chrono::Utc;
use sqlx::types::Json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

/// How many of the owner's previous items are compared for repeated content
const REPEATED_CONTENT_LOOKBACK: i64 = 10;

const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(3);

pub struct ModerationService {
    store: Arc<dyn ModerationStore>,
    enforcement: Arc<EnforcementService>,
    text: TextSignalExtractor,
    images: ImageInspector,
    aggregator: ScoreAggregator,
    oracle: Option<Arc<dyn ClassificationOracle>>,
    oracle_timeout: Duration,
}

impl ModerationService {
    pub fn new(
        store: Arc<dyn ModerationStore>,
        enforcement: Arc<EnforcementService>,
        text: TextSignalExtractor,
        images: ImageInspector,
        aggregator: ScoreAggregator,
    ) -> Self {
        Self {
            store,
            enforcement,
            text,
            images,
            aggregator,
            oracle: None,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }

    /// Attach an external image classifier
    pub fn with_oracle(mut self, oracle: Arc<dyn ClassificationOracle>, timeout: Duration) -> Self {
        self.oracle = Some(oracle);
        self.oracle_timeout = timeout;
        self
    }

    /// Analyse text content on its own merits
    pub async fn analyze_text(
        &self,
        text: &str,
        kind: ContentKind,
        content_id: i64,
        user_id: i64,
    ) -> Result<ModerationResult> {
        let signals = self.text.extract(text);
        self.finish_text(signals, kind, content_id, user_id).await
    }

    /// Analyse text content together with the author's posting behaviour.
    /// Repeated content is detected against the owner's stored items even if
    /// the caller did not set it.
    pub async fn analyze_text_with_behavior(
        &self,
        text: &str,
        kind: ContentKind,
        content_id: i64,
        user_id: i64,
        mut behavior: BehaviorContext,
    ) -> Result<ModerationResult> {
        if !behavior.has_repeated_content {
            let recent = self
                .store
                .recent_owner_content(user_id, kind, content_id, REPEATED_CONTENT_LOOKBACK)
                .await?;
            behavior.has_repeated_content = is_duplicate(text, &recent);
        }

        let mut signals = self.text.extract(text);
        signals.extend(behavior.signals());
        self.finish_text(signals, kind, content_id, user_id).await
    }

    /// Behaviour context built from the user's stored posting history
    pub async fn behavior_context(&self, user_id: i64) -> Result<BehaviorContext> {
        let stats = self.store.posting_stats(user_id).await?;
        Ok(BehaviorContext::default().with_posting_stats(stats))
    }

    /// Analyse an image file: dimensions, duplicates, and the optional
    /// classifier
    pub async fn analyze_image(
        &self,
        path: impl AsRef<Path>,
        kind: ContentKind,
        content_id: i64,
        user_id: i64,
    ) -> Result<ModerationResult> {
        let metadata = self.images.load(path).await?;

        let since = self.images.duplicate_window_start(Utc::now());
        let recent = self.store.recent_fingerprints(user_id, since).await?;

        let mut signals = self.images.signals(&metadata, content_id, &recent);
        signals.extend(
            classify_with_timeout(self.oracle.as_deref(), &metadata.bytes, self.oracle_timeout)
                .await,
        );

        let outcome = self.aggregator.evaluate_image(&signals);
        let record = build_record(kind, content_id, user_id, &signals, &outcome);
        let fingerprint = ImageFingerprint {
            user_id,
            content_id,
            hash: metadata.hash as i64,
            created_at: record.created_at,
        };

        self.persist(&record, Some(&fingerprint)).await?;
        self.enforce(record, outcome).await
    }

    /// All analysis records for one content item, oldest first
    pub async fn moderation_records(
        &self,
        kind: ContentKind,
        content_id: i64,
    ) -> Result<Vec<ModerationRecord>> {
        self.store.moderation_records(kind, content_id).await
    }

    async fn finish_text(
        &self,
        signals: SignalSet,
        kind: ContentKind,
        content_id: i64,
        user_id: i64,
    ) -> Result<ModerationResult> {
        if kind == ContentKind::Image {
            return Err(ModerationError::Validation(
                "text analysis does not accept image content".to_string(),
            ));
        }

        for signal in &signals.signals {
            debug!(content_id, signal = %signal.label(), "Signal matched");
        }

        let outcome = self.aggregator.evaluate_text(&signals);
        let record = build_record(kind, content_id, user_id, &signals, &outcome);

        self.persist(&record, None).await?;
        self.enforce(record, outcome).await
    }

    async fn persist(
        &self,
        record: &ModerationRecord,
        fingerprint: Option<&ImageFingerprint>,
    ) -> Result<()> {
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(fail_closed("persist_moderation_record"))?;
        tx.insert_moderation_record(record)
            .await
            .map_err(fail_closed("persist_moderation_record"))?;
        if let Some(fingerprint) = fingerprint {
            tx.insert_fingerprint(fingerprint)
                .await
                .map_err(fail_closed("persist_moderation_record"))?;
        }
        tx.commit()
            .await
            .map_err(fail_closed("persist_moderation_record"))
    }

    async fn enforce(
        &self,
        record: ModerationRecord,
        outcome: ScoreOutcome,
    ) -> Result<ModerationResult> {
        let decision = if record.should_block { "blocked" } else { "allowed" };
        metrics::CONTENT_ANALYZED_TOTAL
            .with_label_values(&[record.content_kind.as_str(), decision])
            .inc();

        info!(
            record_id = %record.id,
            content_kind = %record.content_kind,
            content_id = record.content_id,
            user_id = record.user_id,
            should_block = record.should_block,
            evaluation_complete = record.evaluation_complete,
            "Content analysed"
        );

        if !record.should_block {
            return Ok(ModerationResult::from_record(&record, None, None));
        }

        let summary = self
            .enforcement
            .enforce_blocked_content(&record, &outcome)
            .await
            .map_err(|e| {
                error!(
                    record_id = %record.id,
                    content_id = record.content_id,
                    error = %e,
                    "Enforcement failed after analysis was recorded"
                );
                e
            })?;

        Ok(ModerationResult::from_record(
            &record,
            outcome.hard_override,
            Some(summary),
        ))
    }
}

fn build_record(
    kind: ContentKind,
    content_id: i64,
    user_id: i64,
    signals: &SignalSet,
    outcome: &ScoreOutcome,
) -> ModerationRecord {
    ModerationRecord {
        id: Uuid::new_v4(),
        content_kind: kind,
        content_id,
        user_id,
        scores: Json(outcome.scores),
        signals: signals.labels(),
        should_block: outcome.should_block,
        hard_override: outcome.hard_override.is_some(),
        evaluation_complete: signals.evaluation_complete,
        status: if outcome.should_block {
            RecordStatus::Flagged
        } else {
            RecordStatus::Approved
        },
        created_at: Utc::now(),
    }
}
