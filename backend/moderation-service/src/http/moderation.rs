use super::{validate, ApiResponse, AppState};
use crate::error::ModerationError;
use crate::models::ContentKind;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use validator::Validate;

/// Optional author details that the stored history cannot supply
#[derive(Debug, Clone, Deserialize)]
pub struct BehaviorInput {
    pub account_age_days: Option<u64>,
    pub is_verified: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AnalyzeTextRequest {
    #[validate(length(min = 1, max = 20000))]
    pub text: String,
    pub content_type: ContentKind,
    #[validate(range(min = 1))]
    pub content_id: i64,
    #[validate(range(min = 1))]
    pub user_id: i64,
    /// When present, behavioural spam signals are included
    pub behavior: Option<BehaviorInput>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AnalyzeImageRequest {
    #[validate(length(min = 1))]
    pub path: String,
    pub content_type: ContentKind,
    #[validate(range(min = 1))]
    pub content_id: i64,
    #[validate(range(min = 1))]
    pub user_id: i64,
}

/// POST /api/v1/moderation/text
pub async fn analyze_text(
    state: web::Data<AppState>,
    req: web::Json<AnalyzeTextRequest>,
) -> Result<HttpResponse, ModerationError> {
    validate(&*req)?;
    let req = req.into_inner();

    let result = match req.behavior {
        Some(input) => {
            let mut behavior = state.moderation.behavior_context(req.user_id).await?;
            if let Some(days) = input.account_age_days {
                behavior.account_age_days = days;
            }
            if let Some(verified) = input.is_verified {
                behavior.is_verified = verified;
            }
            state
                .moderation
                .analyze_text_with_behavior(
                    &req.text,
                    req.content_type,
                    req.content_id,
                    req.user_id,
                    behavior,
                )
                .await?
        }
        None => {
            state
                .moderation
                .analyze_text(&req.text, req.content_type, req.content_id, req.user_id)
                .await?
        }
    };

    Ok(ApiResponse::ok(result))
}

/// POST /api/v1/moderation/image
pub async fn analyze_image(
    state: web::Data<AppState>,
    req: web::Json<AnalyzeImageRequest>,
) -> Result<HttpResponse, ModerationError> {
    validate(&*req)?;

    let result = state
        .moderation
        .analyze_image(&req.path, req.content_type, req.content_id, req.user_id)
        .await?;

    Ok(ApiResponse::ok(result))
}

/// GET /api/v1/moderation/{content_type}/{content_id}/records
pub async fn moderation_records(
    state: web::Data<AppState>,
    path: web::Path<(String, i64)>,
) -> Result<HttpResponse, ModerationError> {
    let (kind, content_id) = path.into_inner();
    let kind: ContentKind = kind.parse()?;

    let records = state.moderation.moderation_records(kind, content_id).await?;
    Ok(ApiResponse::ok(records))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/moderation")
            .route("/text", web::post().to(analyze_text))
            .route("/image", web::post().to(analyze_image))
            .route("/{content_type}/{content_id}/records", web::get().to(moderation_records)),
    );
}
