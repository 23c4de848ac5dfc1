//! HTTP handlers.
//!
//! Push and delete answer with a JSON envelope; the scrape endpoint
//! serves the text exposition format.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, warn};

use pushgrid_core::{parse_text, GroupingKey, KeyResult};
use pushgrid_metrics::{merge, render_prometheus, CONTENT_TYPE};
use pushgrid_store::StoreError;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

#[derive(serde::Serialize)]
struct Pushed {
    group: String,
}

#[derive(serde::Serialize)]
struct Deleted {
    group: String,
    existed: bool,
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn store_error_response(e: StoreError) -> Response {
    let status = match &e {
        StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
        StoreError::Timeout | StoreError::ShutDown => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status != StatusCode::BAD_REQUEST {
        warn!(error = %e, "metric store unavailable");
    }
    error_response(&e.to_string(), status).into_response()
}

// ── Push ───────────────────────────────────────────────────────

/// PUT|POST /metrics/job/{job}
pub async fn push_job(
    State(state): State<ApiState>,
    Path(job): Path<String>,
    body: String,
) -> Response {
    push(state, GroupingKey::job(job), &body).await
}

/// PUT|POST /metrics/job/{job}/instance/{instance}
pub async fn push_instance(
    State(state): State<ApiState>,
    Path((job, instance)): Path<(String, String)>,
    body: String,
) -> Response {
    push(state, GroupingKey::job_instance(job, instance), &body).await
}

async fn push(state: ApiState, key: KeyResult<GroupingKey>, body: &str) -> Response {
    let key = match key {
        Ok(key) => key,
        Err(e) => return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response(),
    };
    let families = match parse_text(body) {
        Ok(families) => families,
        Err(e) => {
            debug!(group = %key, error = %e, "unparseable push");
            return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response();
        }
    };

    let group = key.to_string();
    let count = families.len();
    match state.store.push(key, families).await {
        Ok(()) => {
            debug!(%group, families = count, "push accepted");
            (StatusCode::ACCEPTED, ApiResponse::ok(Pushed { group })).into_response()
        }
        Err(e) => store_error_response(e),
    }
}

// ── Delete ─────────────────────────────────────────────────────

/// DELETE /metrics/job/{job}
pub async fn delete_job(State(state): State<ApiState>, Path(job): Path<String>) -> Response {
    delete(state, GroupingKey::job(job)).await
}

/// DELETE /metrics/job/{job}/instance/{instance}
pub async fn delete_instance(
    State(state): State<ApiState>,
    Path((job, instance)): Path<(String, String)>,
) -> Response {
    delete(state, GroupingKey::job_instance(job, instance)).await
}

async fn delete(state: ApiState, key: KeyResult<GroupingKey>) -> Response {
    let key = match key {
        Ok(key) => key,
        Err(e) => return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response(),
    };
    let group = key.to_string();
    match state.store.delete(key).await {
        Ok(existed) => {
            (StatusCode::ACCEPTED, ApiResponse::ok(Deleted { group, existed })).into_response()
        }
        Err(e) => store_error_response(e),
    }
}

// ── Scrape ─────────────────────────────────────────────────────

/// GET /metrics
pub async fn scrape(State(state): State<ApiState>) -> Response {
    let snapshot = match state.store.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => return store_error_response(e),
    };
    let exposition = merge(snapshot.groups());
    let body = render_prometheus(&exposition.families);
    (StatusCode::OK, [("content-type", CONTENT_TYPE)], body).into_response()
}
