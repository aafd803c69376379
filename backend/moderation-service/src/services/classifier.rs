//! External image classification oracle.
//!
//! The oracle is optional. Any failure, malformed answer or timeout degrades
//! to a `ClassifierNotEvaluated` signal instead of failing the analysis.

use crate::error::{ModerationError, Result};
use crate::models::{OracleCategory, Signal, SignalSet};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Category scores returned by an oracle, keyed by the oracle's own labels
pub type OracleScores = HashMap<String, f64>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClassificationOracle: Send + Sync {
    async fn classify(&self, image: &[u8]) -> Result<OracleScores>;
}

/// Oracle reached over HTTP: POSTs the raw image, expects a JSON object of
/// `{label: score}` with scores in 0..=100
pub struct HttpClassificationOracle {
    client: Client,
    endpoint: String,
}

impl HttpClassificationOracle {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ClassificationOracle for HttpClassificationOracle {
    async fn classify(&self, image: &[u8]) -> Result<OracleScores> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<OracleScores>().await?)
    }
}

/// Ask the oracle, bounded by `timeout`. Never fails.
pub async fn classify_with_timeout(
    oracle: Option<&dyn ClassificationOracle>,
    image: &[u8],
    timeout: Duration,
) -> SignalSet {
    let mut set = SignalSet::default();

    let Some(oracle) = oracle else {
        set.push(Signal::ClassifierNotEvaluated {
            reason: "no classifier configured".to_string(),
        });
        return set;
    };

    let degraded = match tokio::time::timeout(timeout, oracle.classify(image)).await {
        Ok(Ok(scores)) => {
            // Aliases of one category keep the highest score
            let mut by_category: BTreeMap<OracleCategory, i32> = BTreeMap::new();
            for (label, score) in scores {
                match OracleCategory::parse(&label) {
                    Some(category) => {
                        let score = score.round().clamp(0.0, 100.0) as i32;
                        let entry = by_category.entry(category).or_insert(score);
                        *entry = (*entry).max(score);
                    }
                    None => tracing::debug!(label = %label, "Ignoring unknown classifier label"),
                }
            }
            for (category, score) in by_category {
                set.push(Signal::Classifier { category, score });
            }
            return set;
        }
        Ok(Err(e)) => e,
        Err(_) => ModerationError::DegradedSignal(format!(
            "classifier timed out after {}ms",
            timeout.as_millis()
        )),
    };

    crate::metrics::CLASSIFIER_DEGRADED.inc();
    tracing::warn!(error = %degraded, "Classifier unavailable, continuing without it");
    set.push(Signal::ClassifierNotEvaluated {
        reason: degraded.to_string(),
    });
    set
}
