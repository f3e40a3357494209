//! HTTP request handlers

use super::types::{
    CaseHeader, CaseListHeader, ErrorResponse, FinalizeResponse, FollowupRequest,
    FollowupResponse, MessageDto, OrderTestsRequest, OrderTestsResponse, PhysicalRequest,
    PhysicalResponse, RecordTriageResponse, ReplyResponse, SendMessageRequest, SessionDetail,
    SessionListResponse, SessionResponse, StartSessionResponse, TestsViewResponse, TriageResponse,
};
use super::AppState;
use crate::service::ServiceError;
use crate::state_machine::SessionError;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Case generation: one new case, one new session
        .route("/api/cases/next", post(start_session))
        // Dashboard listing
        .route("/api/sessions/my", get(list_sessions))
        // Chat
        .route(
            "/api/sessions/:id/messages",
            get(get_session).post(send_message),
        )
        // Structured operations
        .route(
            "/api/sessions/:id/triage",
            get(get_triage).post(record_triage),
        )
        .route("/api/sessions/:id/physical", post(reveal_section))
        .route(
            "/api/sessions/:id/tests",
            get(get_tests).post(order_tests),
        )
        .route("/api/sessions/:id/followup", post(record_followup))
        // Closing the encounter
        .route("/api/sessions/:id/finalize", post(finalize))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

/// Caller identity comes from the `x-user-id` header placed by the fronting
/// auth proxy. No header, no session.
fn require_user(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or(AppError::Unauthorized)
}

// ============================================================
// Case Generation
// ============================================================

async fn start_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StartSessionResponse>, AppError> {
    let user = require_user(&headers)?;
    let (case, session) = state.service.start_session(&user).await?;

    Ok(Json(StartSessionResponse {
        ok: true,
        session_id: session.id,
        case: CaseHeader {
            id: case.id,
            title: case.title,
            triage: case.triage_label,
        },
    }))
}

// ============================================================
// Session Listing
// ============================================================

async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionListResponse>, AppError> {
    let user = require_user(&headers)?;
    let items = state
        .service
        .list_sessions(&user)?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(SessionListResponse { ok: true, items }))
}

// ============================================================
// Chat
// ============================================================

async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let user = require_user(&headers)?;
    let view = state.service.session_view(&user, &id)?;

    Ok(Json(SessionResponse {
        ok: true,
        session: SessionDetail {
            id: view.session.id,
            status: view.session.status.to_string(),
            phase: view.session.phase.to_string(),
            case: CaseListHeader {
                title: view.case.title,
                triage: view.case.triage_label,
            },
            evaluation: view.evaluation.map(Into::into),
            messages: view.messages.into_iter().map(MessageDto::from).collect(),
        },
    }))
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<ReplyResponse>, AppError> {
    let user = require_user(&headers)?;
    let reply = state.service.send_message(&user, &id, &req.content).await?;
    Ok(Json(ReplyResponse { ok: true, reply }))
}

// ============================================================
// Triage
// ============================================================

async fn get_triage(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<TriageResponse>, AppError> {
    let user = require_user(&headers)?;
    let (session, triage) = state.service.triage_view(&user, &id)?;

    Ok(Json(TriageResponse {
        ok: true,
        phase: session.phase.to_string(),
        triage: triage.unwrap_or(Value::Null),
    }))
}

async fn record_triage(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<RecordTriageResponse>, AppError> {
    let user = require_user(&headers)?;
    let triage = state.service.record_triage(&user, &id)?;
    Ok(Json(RecordTriageResponse {
        ok: true,
        triage: Value::Object(triage),
    }))
}

// ============================================================
// Physical Exam
// ============================================================

async fn reveal_section(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<PhysicalRequest>,
) -> Result<Json<PhysicalResponse>, AppError> {
    let user = require_user(&headers)?;
    let outcome = state.service.reveal_section(&user, &id, &req.section)?;

    Ok(Json(PhysicalResponse {
        ok: true,
        section: outcome.section.as_key().to_string(),
        value: outcome.value,
    }))
}

// ============================================================
// Tests
// ============================================================

async fn get_tests(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<TestsViewResponse>, AppError> {
    let user = require_user(&headers)?;
    let view = state.service.tests_view(&user, &id)?;

    Ok(Json(TestsViewResponse {
        ok: true,
        phase: view.phase.to_string(),
        catalog: view.catalog,
        ordered: view.ordered,
        results: view.results,
    }))
}

async fn order_tests(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<OrderTestsRequest>,
) -> Result<Json<OrderTestsResponse>, AppError> {
    let user = require_user(&headers)?;
    if req.keys.is_empty() {
        return Err(AppError::BadRequest("Informe keys dos exames.".to_string()));
    }
    let outcome = state.service.order_tests(&user, &id, &req.keys)?;

    Ok(Json(OrderTestsResponse {
        ok: true,
        ordered: outcome.ordered,
        newly: outcome.newly,
        dropped: outcome.dropped,
        results: outcome.results,
    }))
}

// ============================================================
// Follow-up
// ============================================================

async fn record_followup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<FollowupRequest>,
) -> Result<Json<FollowupResponse>, AppError> {
    let user = require_user(&headers)?;
    let outcome = state.service.record_followup(&user, &id, &req.outcome)?;

    Ok(Json(FollowupResponse {
        ok: true,
        outcome: outcome.followup.last_outcome.as_key().to_string(),
        text: outcome.narrative,
    }))
}

// ============================================================
// Finalize
// ============================================================

async fn finalize(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<FinalizeResponse>, AppError> {
    let user = require_user(&headers)?;
    let evaluation = state.service.finalize(&user, &id).await?;
    Ok(Json(FinalizeResponse {
        ok: true,
        score: evaluation.score,
    }))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("consilium ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    Unauthorized,
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    UpstreamFailed(String),
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotFound => AppError::NotFound(e.to_string()),
            ServiceError::Session(SessionError::AlreadyEvaluated) => {
                AppError::Conflict(e.to_string())
            }
            ServiceError::Session(_) => AppError::BadRequest(e.to_string()),
            ServiceError::LlmUnconfigured => AppError::Unavailable(e.to_string()),
            ServiceError::CaseGeneration | ServiceError::Llm(_) => {
                AppError::UpstreamFailed(e.to_string())
            }
            ServiceError::Db(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, Some(msg)),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, Some(msg)),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, Some(msg)),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, Some(msg)),
            AppError::UpstreamFailed(msg) => (StatusCode::BAD_GATEWAY, Some(msg)),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, Some(msg)),
        };

        let body = Json(match message {
            Some(msg) => ErrorResponse::new(msg),
            None => ErrorResponse {
                ok: false,
                message: None,
            },
        });
        (status, body).into_response()
    }
}
