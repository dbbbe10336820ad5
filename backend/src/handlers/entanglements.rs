use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use super::AppState;
use crate::constants::{MAX_STATUS_BATCH, VIEWER_ID_HEADER};
use crate::db::StoreError;
use crate::models::{ConnectionStatus, ViewerStatus};
use crate::services::{ActionOutcome, Entanglements, Rejection};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("sign in to manage entanglements")]
    Unauthenticated,
    #[error("an action for this user is already in progress")]
    InFlight,
    #[error("entanglement changed since it was loaded: {0}")]
    Outdated(String),
    #[error("connection store error: {0}")]
    Store(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::InFlight | ApiError::Outdated(_) => StatusCode::CONFLICT,
            ApiError::Store(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Viewer identity from the `x-viewer-id` header. Absent means anonymous.
#[derive(Debug, Clone, Copy)]
pub struct Viewer(pub Option<Uuid>);

impl<S: Send + Sync> FromRequestParts<S> for Viewer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(VIEWER_ID_HEADER) else {
            return Ok(Viewer(None));
        };
        let raw = value
            .to_str()
            .map_err(|_| ApiError::BadRequest(format!("{} is not valid text", VIEWER_ID_HEADER)))?;
        let id = Uuid::parse_str(raw.trim()).map_err(|_| {
            ApiError::BadRequest(format!("{} is not a valid user id", VIEWER_ID_HEADER))
        })?;
        Ok(Viewer(Some(id)))
    }
}

#[derive(Debug, Serialize)]
pub struct EntanglementView {
    pub other: Uuid,
    pub connection_id: Uuid,
    pub requester_id: Uuid,
    pub target_id: Uuid,
    pub stored_status: ConnectionStatus,
    pub status: ViewerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub viewer: Option<Uuid>,
    pub stale: bool,
    pub entanglements: Vec<EntanglementView>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub other: Uuid,
    pub status: ViewerStatus,
}

#[derive(Debug, Deserialize)]
pub struct StatusesRequest {
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct StatusesResponse {
    pub statuses: Vec<StatusResponse>,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub outcome: &'static str,
    pub other: Uuid,
    pub status: ViewerStatus,
}

async fn open_session(state: &AppState, viewer: Option<Uuid>) -> Entanglements {
    let mut session = Entanglements::new(state.store.clone(), viewer)
        .with_policy(state.config.decline_policy)
        .with_in_flight(state.in_flight.clone());
    session.load().await;
    session
}

pub async fn list_entanglements(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
) -> Json<ListResponse> {
    let session = open_session(&state, viewer).await;
    let stale = session.has_stale();

    let entanglements = session
        .connections()
        .into_iter()
        .map(|(other, conn, status)| EntanglementView {
            other,
            connection_id: conn.id,
            requester_id: conn.requester_id,
            target_id: conn.target_id,
            stored_status: conn.status,
            status,
            created_at: conn.created_at,
            updated_at: conn.updated_at,
        })
        .collect();

    Json(ListResponse {
        viewer,
        stale,
        entanglements,
    })
}

pub async fn entanglement_status(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(other): Path<Uuid>,
) -> Json<StatusResponse> {
    let session = open_session(&state, viewer).await;
    Json(StatusResponse {
        other,
        status: session.status_for(other),
    })
}

/// Statuses for a page of users, e.g. a member directory.
pub async fn entanglement_statuses(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Json(req): Json<StatusesRequest>,
) -> Result<Json<StatusesResponse>, ApiError> {
    if req.user_ids.len() > MAX_STATUS_BATCH {
        return Err(ApiError::BadRequest(format!(
            "at most {} user ids per request",
            MAX_STATUS_BATCH
        )));
    }

    let session = open_session(&state, viewer).await;
    let statuses = session
        .statuses_for(&req.user_ids)
        .into_iter()
        .map(|(other, status)| StatusResponse { other, status })
        .collect();

    Ok(Json(StatusesResponse { statuses }))
}

pub async fn request_or_accept(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(other): Path<Uuid>,
) -> Result<Json<ActionResponse>, ApiError> {
    let mut session = open_session(&state, viewer).await;
    let outcome = session.request_or_accept(other).await;
    respond(&session, other, outcome)
}

pub async fn decline(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(other): Path<Uuid>,
) -> Result<Json<ActionResponse>, ApiError> {
    let mut session = open_session(&state, viewer).await;
    let outcome = session.decline(other).await;
    respond(&session, other, outcome)
}

pub async fn remove(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(other): Path<Uuid>,
) -> Result<Json<ActionResponse>, ApiError> {
    let mut session = open_session(&state, viewer).await;
    let outcome = session.remove(other).await;
    respond(&session, other, outcome)
}

fn respond(
    session: &Entanglements,
    other: Uuid,
    outcome: ActionOutcome,
) -> Result<Json<ActionResponse>, ApiError> {
    match outcome {
        ActionOutcome::Rejected(Rejection::Unauthenticated) => Err(ApiError::Unauthenticated),
        ActionOutcome::Rejected(Rejection::SelfTarget) => Err(ApiError::BadRequest(
            "cannot entangle with yourself".to_string(),
        )),
        ActionOutcome::Rejected(Rejection::InFlight) => Err(ApiError::InFlight),
        ActionOutcome::Failed(e @ (StoreError::Conflict { .. } | StoreError::NotFound(_))) => {
            Err(ApiError::Outdated(e.to_string()))
        }
        ActionOutcome::Failed(e) => Err(ApiError::Store(e.to_string())),
        outcome => Ok(Json(ActionResponse {
            outcome: outcome.label(),
            other,
            status: session.status_for(other),
        })),
    }
}
