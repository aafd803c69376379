//! Prometheus metrics for the moderation pipeline

use prometheus::{Encoder, IntCounter, IntCounterVec, TextEncoder};

lazy_static::lazy_static! {
    pub static ref CONTENT_ANALYZED_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        "moderation_content_analyzed_total",
        "Content items analysed, by content kind and decision",
        &["kind", "decision"]
    ).unwrap();

    pub static ref ENFORCEMENT_ACTIONS_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        "moderation_enforcement_actions_total",
        "Enforcement actions applied, by action and origin",
        &["action", "origin"]
    ).unwrap();

    pub static ref BULK_ITEMS_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        "moderation_bulk_items_total",
        "Bulk action items processed, by action and result",
        &["action", "result"]
    ).unwrap();

    pub static ref APPEALS_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        "moderation_appeals_total",
        "Appeal lifecycle events",
        &["event"]
    ).unwrap();

    pub static ref PERSISTENCE_FAILURES_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        "moderation_persistence_failures_total",
        "Failed storage transactions, by operation",
        &["operation"]
    ).unwrap();

    pub static ref CLASSIFIER_DEGRADED: IntCounter = prometheus::register_int_counter!(
        "moderation_classifier_degraded_total",
        "Image analyses completed without the external classifier"
    ).unwrap();
}

pub(crate) fn origin(automated: bool) -> &'static str {
    if automated {
        "automated"
    } else {
        "manual"
    }
}

/// Render the default registry in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
