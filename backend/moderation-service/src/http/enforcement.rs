use super::{validate, ApiResponse, AppState};
use crate::error::ModerationError;
use crate::models::{
    Actor, AuditSubject, BulkActionRequest, BulkActionType, ContentKind, NewWarning,
    ScoreCategory, TrustProfile, UserStanding, Violation, WarningSeverity, WarningType,
};
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct IssueWarningRequest {
    #[validate(range(min = 1))]
    pub user_id: i64,
    pub warning_type: WarningType,
    pub severity: WarningSeverity,
    #[validate(length(min = 1, max = 2000))]
    pub message: String,
    pub content_type: Option<ContentKind>,
    pub content_id: Option<i64>,
    #[validate(range(min = 1))]
    pub moderator_id: i64,
}

#[derive(Debug, Serialize)]
pub struct IssueWarningResponse {
    pub warning_id: i64,
    pub warning_count: i32,
    pub auto_suspended: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordViolationRequest {
    #[validate(range(min = 1))]
    pub user_id: i64,
    pub category: ScoreCategory,
    #[validate(range(min = 0, max = 100))]
    pub score: i32,
    pub content_type: Option<ContentKind>,
    pub content_id: Option<i64>,
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
    #[validate(range(min = 1))]
    pub moderator_id: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UserActionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
    #[validate(range(min = 1))]
    pub moderator_id: i64,
}

#[derive(Debug, Serialize)]
pub struct UserActionResponse {
    pub user_id: i64,
    /// False when the flag was already set
    pub changed: bool,
}

#[derive(Debug, Serialize)]
pub struct TrustProfileResponse {
    #[serde(flatten)]
    pub profile: TrustProfile,
    pub standing: UserStanding,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkActionPayload {
    pub action: BulkActionType,
    pub content_type: ContentKind,
    #[validate(length(min = 1, max = 500))]
    pub item_ids: Vec<i64>,
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
    #[validate(range(min = 1))]
    pub moderator_id: i64,
}

/// POST /api/v1/warnings
pub async fn issue_warning(
    state: web::Data<AppState>,
    req: web::Json<IssueWarningRequest>,
) -> Result<HttpResponse, ModerationError> {
    validate(&*req)?;
    let req = req.into_inner();

    let mut input = NewWarning::new(req.user_id, req.warning_type, req.severity, req.message);
    match (req.content_type, req.content_id) {
        (Some(kind), Some(id)) => input = input.for_content(kind, id),
        (None, None) => {}
        _ => {
            return Err(ModerationError::Validation(
                "content_type and content_id must be given together".to_string(),
            ))
        }
    }

    let outcome = state
        .enforcement
        .issue_warning(input, Actor::Moderator(req.moderator_id))
        .await?;

    Ok(ApiResponse::created(IssueWarningResponse {
        warning_id: outcome.warning.id,
        warning_count: outcome.profile.warning_count,
        auto_suspended: outcome.auto_suspended,
    }))
}

/// POST /api/v1/violations
pub async fn record_violation(
    state: web::Data<AppState>,
    req: web::Json<RecordViolationRequest>,
) -> Result<HttpResponse, ModerationError> {
    validate(&*req)?;
    let req = req.into_inner();

    let violation = Violation {
        user_id: req.user_id,
        category: req.category,
        score: req.score,
        content_kind: req.content_type,
        content_id: req.content_id,
        reason: req.reason,
    };
    let profile = state
        .enforcement
        .record_violation(violation, Actor::Moderator(req.moderator_id))
        .await?;

    Ok(ApiResponse::ok(profile))
}

/// POST /api/v1/users/{user_id}/suspend
pub async fn suspend_user(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    req: web::Json<UserActionRequest>,
) -> Result<HttpResponse, ModerationError> {
    validate(&*req)?;
    let user_id = path.into_inner();

    let changed = state
        .enforcement
        .suspend_user(user_id, &req.reason, Actor::Moderator(req.moderator_id))
        .await?;

    Ok(ApiResponse::ok(UserActionResponse { user_id, changed }))
}

/// POST /api/v1/users/{user_id}/ban
pub async fn ban_user(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    req: web::Json<UserActionRequest>,
) -> Result<HttpResponse, ModerationError> {
    validate(&*req)?;
    let user_id = path.into_inner();

    let changed = state
        .enforcement
        .ban_user(user_id, &req.reason, Actor::Moderator(req.moderator_id))
        .await?;

    Ok(ApiResponse::ok(UserActionResponse { user_id, changed }))
}

/// GET /api/v1/users/{user_id}/trust-profile
pub async fn trust_profile(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ModerationError> {
    let profile = state.enforcement.trust_profile(path.into_inner()).await?;
    let standing = profile.standing();

    Ok(ApiResponse::ok(TrustProfileResponse { profile, standing }))
}

/// GET /api/v1/users/{user_id}/warnings
pub async fn user_warnings(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ModerationError> {
    let warnings = state.enforcement.user_warnings(path.into_inner()).await?;
    Ok(ApiResponse::ok(warnings))
}

/// GET /api/v1/audit/{subject}/{subject_id}
pub async fn audit_trail(
    state: web::Data<AppState>,
    path: web::Path<(AuditSubject, i64)>,
) -> Result<HttpResponse, ModerationError> {
    let (subject, subject_id) = path.into_inner();
    let entries = state.enforcement.audit_trail(subject, subject_id).await?;
    Ok(ApiResponse::ok(entries))
}

/// POST /api/v1/bulk-actions
pub async fn process_bulk_action(
    state: web::Data<AppState>,
    req: web::Json<BulkActionPayload>,
) -> Result<HttpResponse, ModerationError> {
    validate(&*req)?;
    let req = req.into_inner();

    let result = state
        .bulk
        .process_bulk_action(BulkActionRequest {
            action: req.action,
            content_kind: req.content_type,
            item_ids: req.item_ids,
            reason: req.reason,
            moderator_id: req.moderator_id,
        })
        .await?;

    Ok(ApiResponse::ok(result))
}

/// GET /api/v1/bulk-actions/{batch_id}
pub async fn bulk_batch(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ModerationError> {
    let batch = state.bulk.batch(path.into_inner()).await?;
    Ok(ApiResponse::ok(batch))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/warnings", web::post().to(issue_warning))
        .route("/violations", web::post().to(record_violation))
        .route("/bulk-actions", web::post().to(process_bulk_action))
        .route("/bulk-actions/{batch_id}", web::get().to(bulk_batch))
        .route("/audit/{subject}/{subject_id}", web::get().to(audit_trail))
        .service(
            web::scope("/users/{user_id}")
                .route("/suspend", web::post().to(suspend_user))
                .route("/ban", web::post().to(ban_user))
                .route("/trust-profile", web::get().to(trust_profile))
                .route("/warnings", web::get().to(user_warnings)),
        );
}
