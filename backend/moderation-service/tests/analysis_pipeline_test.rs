//! Analysis pipeline: scoring decisions, hard overrides and oracle degradation

use async_trait::async_trait;
use image::{ImageBuffer, Rgb};
use moderation_service::db::{InMemoryStore, ModerationStore};
use moderation_service::models::{
    CategoryScores, ContentItem, ContentKind, ContentStatus, ImageScores, RecordStatus, TextScores,
};
use moderation_service::services::classifier::OracleScores;
use moderation_service::services::{
    ClassificationOracle, EnforcementPolicy, EnforcementService, ImageInspector, Lexicon,
    ModerationService, ScoreAggregator, TextSignalExtractor,
};
use moderation_service::{ModerationError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn pipeline(store: &InMemoryStore) -> ModerationService {
    let shared: Arc<dyn ModerationStore> = Arc::new(store.clone());
    let enforcement = Arc::new(EnforcementService::new(
        shared.clone(),
        EnforcementPolicy::default(),
    ));
    ModerationService::new(
        shared,
        enforcement,
        TextSignalExtractor::new(Lexicon::builtin()).unwrap(),
        ImageInspector::default(),
        ScoreAggregator::default(),
    )
}

fn photo(dir: &TempDir, width: u32, height: u32) -> PathBuf {
    let path = dir.path().join(format!("photo_{}x{}.png", width, height));
    ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
    .save(&path)
    .unwrap();
    path
}

struct SlowOracle;

#[async_trait]
impl ClassificationOracle for SlowOracle {
    async fn classify(&self, _image: &[u8]) -> Result<OracleScores> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(HashMap::from([("adult".to_string(), 99.0)]))
    }
}

struct FailingOracle;

#[async_trait]
impl ClassificationOracle for FailingOracle {
    async fn classify(&self, _image: &[u8]) -> Result<OracleScores> {
        Err(ModerationError::DegradedSignal("connection refused".to_string()))
    }
}

struct FixedOracle(f64);

#[async_trait]
impl ClassificationOracle for FixedOracle {
    async fn classify(&self, _image: &[u8]) -> Result<OracleScores> {
        Ok(HashMap::from([("adult".to_string(), self.0)]))
    }
}

#[tokio::test]
async fn test_hard_override_blocks_below_thresholds() {
    let store = InMemoryStore::new();
    let service = pipeline(&store);

    for (content_id, text) in [
        (1, "Escort available downtown"),
        (2, "Got cocaine if anyone needs it"),
    ] {
        let result = service
            .analyze_text(text, ContentKind::Message, content_id, 5)
            .await
            .unwrap();

        assert!(result.should_block, "{} should block", text);
        assert!(result.hard_override.is_some());
        match result.scores {
            CategoryScores::Text(scores) => {
                assert!(scores.sexual_content < 80);
                assert!(scores.toxicity < 70);
            }
            CategoryScores::Image(_) => panic!("expected text scores"),
        }
    }
}

#[test]
fn test_each_threshold_blocks_independently() {
    let aggregator = ScoreAggregator::default();

    let toxic_only = aggregator.decide(
        CategoryScores::Text(TextScores {
            toxicity: 75,
            spam: 5,
            ..TextScores::default()
        }),
        None,
    );
    assert!(toxic_only.should_block);

    let spam_only = aggregator.decide(
        CategoryScores::Text(TextScores {
            spam: 65,
            ..TextScores::default()
        }),
        None,
    );
    assert!(spam_only.should_block);

    let all_low = aggregator.decide(
        CategoryScores::Text(TextScores {
            toxicity: 69,
            spam: 64,
            sexual_content: 79,
            profanity: 100,
        }),
        None,
    );
    assert!(!all_low.should_block);

    let nsfw_image = aggregator.decide(
        CategoryScores::Image(ImageScores {
            nsfw: 75,
            ..ImageScores::default()
        }),
        None,
    );
    assert!(nsfw_image.should_block);
}

#[tokio::test]
async fn test_spam_text_blocks_and_charges_ledger() {
    let store = InMemoryStore::new();
    store
        .insert_content(ContentItem::new(30, ContentKind::Listing, 5, "listing"))
        .await;
    let service = pipeline(&store);

    let text = "CLICK HERE NOW!!! buy now, limited time, act now, free money \
                http://a.example http://b.example http://c.example http://d.example";
    let result = service
        .analyze_text(text, ContentKind::Listing, 30, 5)
        .await
        .unwrap();

    assert!(result.should_block);
    assert!(result.hard_override.is_none());
    assert_eq!(result.status, RecordStatus::Flagged);

    let profile = store.trust_profile(5).await.unwrap().unwrap();
    assert_eq!(profile.total_violations, 1);
    assert_eq!(profile.trust_score, 90);
    assert!(profile.spam_score > 0);
    assert_eq!(profile.warning_count, 0);
    assert_eq!(
        store.content_item(30).await.unwrap().unwrap().status,
        ContentStatus::Flagged
    );
}

#[tokio::test]
async fn test_slow_oracle_degrades_to_incomplete() {
    let store = InMemoryStore::new();
    let dir = TempDir::new().unwrap();
    let path = photo(&dir, 320, 320);
    let service = pipeline(&store).with_oracle(Arc::new(SlowOracle), Duration::from_millis(100));

    let started = std::time::Instant::now();
    let result = service
        .analyze_image(&path, ContentKind::Image, 50, 5)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!result.evaluation_complete);
    assert!(!result.should_block);
}

#[tokio::test]
async fn test_failing_oracle_degrades_to_incomplete() {
    let store = InMemoryStore::new();
    let dir = TempDir::new().unwrap();
    let path = photo(&dir, 320, 320);
    let service = pipeline(&store).with_oracle(Arc::new(FailingOracle), Duration::from_secs(1));

    let result = service
        .analyze_image(&path, ContentKind::Image, 51, 5)
        .await
        .unwrap();

    assert!(!result.evaluation_complete);
    let records = service
        .moderation_records(ContentKind::Image, 51)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].evaluation_complete);
}

#[tokio::test]
async fn test_oracle_score_at_threshold_blocks() {
    let store = InMemoryStore::new();
    let dir = TempDir::new().unwrap();
    let path = photo(&dir, 320, 320);

    let blocked = pipeline(&store)
        .with_oracle(Arc::new(FixedOracle(75.0)), Duration::from_secs(1))
        .analyze_image(&path, ContentKind::Image, 60, 5)
        .await
        .unwrap();
    assert!(blocked.should_block);
    assert!(blocked.evaluation_complete);

    let allowed = pipeline(&store)
        .with_oracle(Arc::new(FixedOracle(74.0)), Duration::from_secs(1))
        .analyze_image(&path, ContentKind::Image, 61, 6)
        .await
        .unwrap();
    assert!(!allowed.should_block);
}

#[tokio::test]
async fn test_small_image_is_spam_signal() {
    let store = InMemoryStore::new();
    let dir = TempDir::new().unwrap();
    let path = photo(&dir, 64, 64);
    let service = pipeline(&store);

    let result = service
        .analyze_image(&path, ContentKind::Image, 70, 5)
        .await
        .unwrap();

    assert!(result
        .signals
        .iter()
        .any(|s| s.starts_with("low_quality_image")));
    match result.scores {
        CategoryScores::Image(scores) => assert_eq!(scores.spam, 30),
        CategoryScores::Text(_) => panic!("expected image scores"),
    }
}

#[tokio::test]
async fn test_corrupt_image_is_an_error() {
    let store = InMemoryStore::new();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.jpg");
    std::fs::write(&path, b"not an image").unwrap();
    let service = pipeline(&store);

    let result = service.analyze_image(&path, ContentKind::Image, 80, 5).await;

    assert!(matches!(result, Err(ModerationError::ImageProcessing(_))));
    assert!(service
        .moderation_records(ContentKind::Image, 80)
        .await
        .unwrap()
        .is_empty());
}
