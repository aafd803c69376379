//! JSON API over the moderation services.
//!
//! Handlers are thin: validate the DTO, call one service operation, wrap the
//! result in the `{success, data}` envelope. Errors render through
//! `ModerationError`'s `ResponseError` impl as `{success: false, error, message}`.

pub mod appeals;
pub mod enforcement;
pub mod moderation;

use crate::db::ModerationStore;
use crate::error::ModerationError;
use crate::metrics;
use crate::services::{AppealService, BulkActionService, EnforcementService, ModerationService};
use actix_web::{web, HttpResponse};
use serde::Serialize;
use std::sync::Arc;
use validator::Validate;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ModerationStore>,
    pub moderation: Arc<ModerationService>,
    pub enforcement: Arc<EnforcementService>,
    pub bulk: Arc<BulkActionService>,
    pub appeals: Arc<AppealService>,
}

/// Success envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> HttpResponse {
        HttpResponse::Ok().json(Self {
            success: true,
            data,
        })
    }

    pub fn created(data: T) -> HttpResponse {
        HttpResponse::Created().json(Self {
            success: true,
            data,
        })
    }
}

pub(crate) fn validate<T: Validate>(input: &T) -> Result<(), ModerationError> {
    input
        .validate()
        .map_err(|e| ModerationError::Validation(e.to_string()))
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

async fn ready(state: web::Data<AppState>) -> HttpResponse {
    match state.store.ping().await {
        Ok(()) => HttpResponse::Ok().body("READY"),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            HttpResponse::ServiceUnavailable().body("NOT READY")
        }
    }
}

async fn metrics_handler() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::render())
}

/// Register every route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/ready", web::get().to(ready))
        .route("/metrics", web::get().to(metrics_handler))
        .service(
            web::scope("/api/v1")
                .configure(moderation::register_routes)
                .configure(enforcement::register_routes)
                .configure(appeals::register_routes),
        );
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::InMemoryStore;
    use crate::services::{
        EnforcementPolicy, ImageInspector, Lexicon, ScoreAggregator, TextSignalExtractor,
    };

    pub fn state(store: &InMemoryStore) -> AppState {
        let shared: Arc<dyn ModerationStore> = Arc::new(store.clone());
        let enforcement = Arc::new(EnforcementService::new(
            shared.clone(),
            EnforcementPolicy::default(),
        ));
        let moderation = Arc::new(ModerationService::new(
            shared.clone(),
            enforcement.clone(),
            TextSignalExtractor::new(Lexicon::builtin()).unwrap(),
            ImageInspector::default(),
            ScoreAggregator::default(),
        ));
        AppState {
            store: shared.clone(),
            moderation,
            enforcement: enforcement.clone(),
            bulk: Arc::new(BulkActionService::new(shared.clone(), enforcement)),
            appeals: Arc::new(AppealService::new(shared)),
        }
    }
}
