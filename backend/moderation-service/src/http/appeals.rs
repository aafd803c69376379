use super::{validate, ApiResponse, AppState};
use crate::error::ModerationError;
use crate::models::{AppealDecision, AppealStatus, AppealType, NewAppeal};
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAppealRequest {
    #[validate(range(min = 1))]
    pub user_id: i64,
    pub appeal_type: AppealType,
    #[validate(range(min = 1))]
    pub related_id: i64,
    #[validate(length(min = 1, max = 2000))]
    pub reason: String,
    #[validate(length(max = 5000))]
    pub evidence: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitAppealResponse {
    pub appeal_id: i64,
    pub status: AppealStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StartReviewRequest {
    #[validate(range(min = 1))]
    pub moderator_id: i64,
}

/// The decision arrives as a string so that an unknown value is reported
/// as a validation error rather than a deserialisation failure
#[derive(Debug, Deserialize, Validate)]
pub struct ResolveAppealRequest {
    #[validate(range(min = 1))]
    pub moderator_id: i64,
    pub decision: String,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResolveAppealResponse {
    pub appeal_id: i64,
    pub status: AppealStatus,
    pub action_reversed: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListAppealsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// POST /api/v1/appeals
pub async fn submit_appeal(
    state: web::Data<AppState>,
    req: web::Json<SubmitAppealRequest>,
) -> Result<HttpResponse, ModerationError> {
    validate(&*req)?;
    let req = req.into_inner();

    let appeal = state
        .appeals
        .submit_appeal(NewAppeal {
            user_id: req.user_id,
            appeal_type: req.appeal_type,
            related_id: req.related_id,
            reason: req.reason,
            evidence: req.evidence,
        })
        .await?;

    Ok(ApiResponse::created(SubmitAppealResponse {
        appeal_id: appeal.id,
        status: appeal.status,
    }))
}

/// GET /api/v1/appeals/{appeal_id}
pub async fn get_appeal(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ModerationError> {
    let appeal = state.appeals.get_appeal(path.into_inner()).await?;
    Ok(ApiResponse::ok(appeal))
}

/// GET /api/v1/appeals?status=pending&limit=20&offset=0
pub async fn list_appeals(
    state: web::Data<AppState>,
    query: web::Query<ListAppealsQuery>,
) -> Result<HttpResponse, ModerationError> {
    let status = query
        .status
        .as_deref()
        .map(|s| s.parse::<AppealStatus>())
        .transpose()?;

    let appeals = state
        .appeals
        .list_appeals(status, query.limit.unwrap_or(20), query.offset.unwrap_or(0))
        .await?;
    Ok(ApiResponse::ok(appeals))
}

/// POST /api/v1/appeals/{appeal_id}/review
pub async fn start_review(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    req: web::Json<StartReviewRequest>,
) -> Result<HttpResponse, ModerationError> {
    validate(&*req)?;

    let appeal = state
        .appeals
        .start_review(path.into_inner(), req.moderator_id)
        .await?;
    Ok(ApiResponse::ok(appeal))
}

/// POST /api/v1/appeals/{appeal_id}/resolve
pub async fn resolve_appeal(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    req: web::Json<ResolveAppealRequest>,
) -> Result<HttpResponse, ModerationError> {
    validate(&*req)?;
    let req = req.into_inner();
    let decision: AppealDecision = req.decision.parse()?;

    let resolution = state
        .appeals
        .resolve_appeal(path.into_inner(), req.moderator_id, decision, req.notes)
        .await?;

    Ok(ApiResponse::ok(ResolveAppealResponse {
        appeal_id: resolution.appeal.id,
        status: resolution.appeal.status,
        action_reversed: resolution.action_reversed,
    }))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/appeals")
            .route("", web::post().to(submit_appeal))
            .route("", web::get().to(list_appeals))
            .route("/{appeal_id}", web::get().to(get_appeal))
            .route("/{appeal_id}/review", web::post().to(start_review))
            .route("/{appeal_id}/resolve", web::post().to(resolve_appeal)),
    );
}

#[cfg(test)]
mod tests {
    use super::super::{configure, test_support};
    use crate::db::InMemoryStore;
    use crate::models::TrustProfile;
    use actix_web::{http::StatusCode, test, web, App};
    use serde_json::{json, Value};

    async fn banned_user(store: &InMemoryStore, user_id: i64) {
        let mut profile = TrustProfile::new(user_id);
        profile.is_banned = true;
        store.insert_profile(profile).await;
    }

    #[actix_web::test]
    async fn test_duplicate_appeal_is_conflict() {
        let store = InMemoryStore::new();
        banned_user(&store, 5).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_support::state(&store)))
                .configure(configure),
        )
        .await;

        let payload = json!({
            "user_id": 5,
            "appeal_type": "ban",
            "related_id": 5,
            "reason": "My account was compromised"
        });

        let req = test::TestRequest::post()
            .uri("/api/v1/appeals")
            .set_json(&payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/api/v1/appeals")
            .set_json(&payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "duplicate");
    }

    #[actix_web::test]
    async fn test_resolve_flow() {
        let store = InMemoryStore::new();
        banned_user(&store, 5).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_support::state(&store)))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/appeals")
            .set_json(json!({
                "user_id": 5,
                "appeal_type": "ban",
                "related_id": 5,
                "reason": "My account was compromised"
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let appeal_id = body["data"]["appeal_id"].as_i64().unwrap();

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/appeals/{}/resolve", appeal_id))
            .set_json(json!({"moderator_id": 9, "decision": "maybe"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/appeals/{}/resolve", appeal_id))
            .set_json(json!({"moderator_id": 9, "decision": "approved", "notes": "Verified"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["action_reversed"], true);
        assert_eq!(body["data"]["status"], "approved");

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/appeals/{}/resolve", appeal_id))
            .set_json(json!({"moderator_id": 9, "decision": "rejected"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "not_resolvable");
    }

    #[actix_web::test]
    async fn test_list_by_status() {
        let store = InMemoryStore::new();
        banned_user(&store, 5).await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_support::state(&store)))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/appeals")
            .set_json(json!({
                "user_id": 5,
                "appeal_type": "ban",
                "related_id": 5,
                "reason": "Please reconsider"
            }))
            .to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::get()
            .uri("/api/v1/appeals?status=pending")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let req = test::TestRequest::get()
            .uri("/api/v1/appeals?status=archived")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
