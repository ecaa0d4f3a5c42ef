//! Handlers for the `/jobs` resource: the pull/poll view of render
//! progress.
//!
//! The snapshot merges the job row with the progress hub's latest state so
//! the poll endpoint and the WebSocket stream can never disagree about a
//! job's terminal outcome.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use matchcut_core::error::CoreError;
use matchcut_core::types::DbId;
use matchcut_db::models::render_job::{JobListQuery, RenderJob};
use matchcut_db::models::status::RenderJobStatus;
use matchcut_db::repositories::RenderJobRepo;
use matchcut_events::JobSnapshot;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// The poll-fallback view of one job.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: DbId,
    pub export_id: uuid::Uuid,
    pub kind: String,
    pub status: &'static str,
    pub progress: ProgressView,
    pub result_asset_id: Option<DbId>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProgressView {
    pub percent: i16,
    pub phase: Option<String>,
    pub message: Option<String>,
}

/// GET /api/v1/jobs/{id}
///
/// Poll fallback for callers that cannot hold a WebSocket subscription.
/// Terminal semantics are identical to the push channel: a job that
/// completed or failed reports that exactly, with the result asset or the
/// error message.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = RenderJobRepo::find_by_id(&state.pool, job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Render job",
            id: job_id,
        }))?;

    // Prefer the hub's in-memory view while the stream is live; fall back
    // to the persisted row for jobs whose stream has been evicted.
    let snapshot = state.progress.snapshot(job_id).await;
    Ok(Json(DataResponse {
        data: job_view(job, snapshot),
    }))
}

/// GET /api/v1/jobs
///
/// List jobs, newest first. Supports optional `status_id`, `limit`, and
/// `offset` query parameters.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = RenderJobRepo::list(&state.pool, &params).await?;
    let views: Vec<JobStatusResponse> = jobs.into_iter().map(|j| job_view(j, None)).collect();
    Ok(Json(DataResponse { data: views }))
}

fn job_view(job: RenderJob, snapshot: Option<JobSnapshot>) -> JobStatusResponse {
    let status = RenderJobStatus::from_id(job.status_id)
        .map(RenderJobStatus::name)
        .unwrap_or("unknown");

    let progress = match snapshot {
        Some(snap) => ProgressView {
            percent: snap.percent as i16,
            phase: Some(
                serde_json::to_value(snap.phase)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
            ),
            message: snap.message,
        },
        None => ProgressView {
            percent: job.progress_percent,
            phase: job.progress_phase,
            message: job.progress_message,
        },
    };

    JobStatusResponse {
        job_id: job.id,
        export_id: job.export_id,
        kind: job.kind,
        status,
        progress,
        result_asset_id: job.result_asset_id,
        error: job.error_message,
    }
}
