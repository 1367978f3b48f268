use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use interview_core::feedback::FeedbackStatus;
use interview_core::{
    Difficulty, EngineError, Hint, InterviewEngine, InterviewKind, Session, SessionId,
    StartedSession, StoreError, Transition, Workspace,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<InterviewEngine>,
}

/// Maps engine errors onto HTTP statuses with a JSON body.
#[derive(Debug)]
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    retryable: bool,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::SessionNotFound(_) | EngineError::Store(StoreError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            EngineError::InvalidState { .. } => StatusCode::CONFLICT,
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            EngineError::GatewayUnavailable(_)
            | EngineError::GatewayTimeout(_)
            | EngineError::Store(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected: {}", self.0);
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub kind: InterviewKind,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnResponse {
    pub reply: String,
}

/// Optional overrides for hint evaluation. Without them the server clock and
/// the stored workspace are used.
#[derive(Debug, Default, Deserialize)]
pub struct HintQuery {
    pub elapsed_minutes: Option<f64>,
    pub total_minutes: Option<f64>,
    pub workspace_excerpt: Option<String>,
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<StartedSession>)> {
    let started = state
        .engine
        .start_session(req.kind, req.difficulty.unwrap_or(Difficulty::Medium))
        .await?;
    Ok((StatusCode::CREATED, Json(started)))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<Session>> {
    state.engine.expire_if_due(session_id).await?;
    Ok(Json(state.engine.session(session_id).await?))
}

async fn send_turn(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(req): Json<TurnRequest>,
) -> ApiResult<Json<TurnResponse>> {
    let reply = state.engine.send_turn(session_id, &req.text).await?;
    Ok(Json(TurnResponse { reply }))
}

async fn update_workspace(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(workspace): Json<Workspace>,
) -> ApiResult<StatusCode> {
    state.engine.update_workspace(session_id, workspace).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn complete_session(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<Transition>> {
    Ok(Json(state.engine.complete_session(session_id).await?))
}

async fn abandon_session(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<Transition>> {
    Ok(Json(state.engine.abandon_session(session_id).await?))
}

/// 200 with the feedback once stored, 202 while it is still pending.
async fn get_feedback(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Response> {
    let status = state.engine.get_feedback(session_id).await?;
    Ok(match status {
        FeedbackStatus::Ready(_) => (StatusCode::OK, Json(status)).into_response(),
        FeedbackStatus::NotReady => (StatusCode::ACCEPTED, Json(status)).into_response(),
    })
}

async fn retry_feedback(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<FeedbackStatus>> {
    state.engine.retry_feedback(session_id).await?;
    Ok(Json(state.engine.get_feedback(session_id).await?))
}

async fn get_hints(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Query(query): Query<HintQuery>,
) -> ApiResult<Json<Vec<Hint>>> {
    let hints = match (query.elapsed_minutes, query.total_minutes) {
        (Some(elapsed), Some(total)) => {
            state
                .engine
                .get_hints(session_id, elapsed, total, query.workspace_excerpt.as_deref())
                .await?
        }
        _ => state.engine.current_hints(session_id).await?,
    };
    Ok(Json(hints))
}

async fn dismiss_hint(
    State(state): State<AppState>,
    Path((session_id, hint_id)): Path<(SessionId, String)>,
) -> ApiResult<StatusCode> {
    state.engine.dismiss_hint(session_id, &hint_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/turns", post(send_turn))
        .route("/sessions/{id}/workspace", put(update_workspace))
        .route("/sessions/{id}/complete", post(complete_session))
        .route("/sessions/{id}/abandon", post(abandon_session))
        .route(
            "/sessions/{id}/feedback",
            get(get_feedback).post(retry_feedback),
        )
        .route("/sessions/{id}/hints", get(get_hints))
        .route(
            "/sessions/{id}/hints/{hint_id}/dismiss",
            post(dismiss_hint),
        )
        .with_state(state)
}
