//! Handlers for render requests and export-scoped lookups.

use std::collections::BTreeMap;
use std::path::PathBuf;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use matchcut_core::composer::MultiClipPlan;
use matchcut_core::error::CoreError;
use matchcut_core::types::DbId;
use matchcut_db::repositories::{AssetRepo, RenderJobRepo};

use crate::engine::{OverlayRenderRequest, SingleRenderRequest};
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Acceptance payload for a render request.
#[derive(Debug, Serialize)]
pub struct RenderAccepted {
    pub job_id: DbId,
    pub export_id: Uuid,
}

// ---------------------------------------------------------------------------
// Single clip
// ---------------------------------------------------------------------------

/// POST /api/v1/render
///
/// Single-clip render, server-authoritative: the clip's pending autosave
/// is flushed first and the transform parameters are re-derived from the
/// persisted state, so a stale client timeline can never reach the
/// encoder. Returns 202 with the created job.
pub async fn render_single(
    State(state): State<AppState>,
    Json(req): Json<SingleRenderRequest>,
) -> AppResult<impl IntoResponse> {
    if let Some(fps) = req.fps {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(AppError::BadRequest(format!("fps must be positive, got {fps}")));
        }
    }

    state
        .autosave
        .flush(req.clip_id)
        .await
        .map_err(AppError::InternalError)?;

    let job = state.engine.clone().submit_single(req).await?;

    tracing::info!(job_id = job.id, export_id = %job.export_id, "Single-clip render accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: RenderAccepted {
                job_id: job.id,
                export_id: job.export_id,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Multi clip
// ---------------------------------------------------------------------------

/// POST /api/v1/render/multi-clip
///
/// Multipart body: one `video_{i}` part per clip plus a `plan` JSON part
/// (per-clip segments/crop/trim, global aspect ratio, transition) and an
/// `export_id` part. Video parts are staged to the spool; the plan order
/// defines the output order.
pub async fn render_multi_clip(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let staging = state
        .config
        .storage_root
        .join("spool")
        .join("uploads")
        .join(Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&staging)
        .await
        .map_err(|e| AppError::InternalError(format!("Staging directory: {e}")))?;

    let mut plan: Option<MultiClipPlan> = None;
    let mut export_id: Option<Uuid> = None;
    let mut include_audio = true;
    let mut videos: BTreeMap<usize, PathBuf> = BTreeMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "plan" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Plan part: {e}")))?;
                plan = Some(
                    serde_json::from_str(&text)
                        .map_err(|e| AppError::BadRequest(format!("Malformed plan JSON: {e}")))?,
                );
            }
            "export_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Export id part: {e}")))?;
                export_id = Some(
                    text.parse()
                        .map_err(|e| AppError::BadRequest(format!("Invalid export id: {e}")))?,
                );
            }
            "include_audio" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Audio flag part: {e}")))?;
                include_audio = text.trim() != "false";
            }
            _ => {
                let Some(index) = name.strip_prefix("video_").and_then(|s| s.parse::<usize>().ok())
                else {
                    return Err(AppError::BadRequest(format!("Unexpected part \"{name}\"")));
                };
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Video part {index}: {e}")))?;
                let path = staging.join(format!("video_{index}.mp4"));
                tokio::fs::write(&path, &bytes)
                    .await
                    .map_err(|e| AppError::InternalError(format!("Staging write: {e}")))?;
                videos.insert(index, path);
            }
        }
    }

    let plan = plan.ok_or_else(|| AppError::BadRequest("Missing plan part".into()))?;
    let export_id = export_id.ok_or_else(|| AppError::BadRequest("Missing export_id part".into()))?;

    // Parts may arrive in any order; indices must be exactly 0..n.
    let staged: Vec<PathBuf> = videos.into_iter().map(|(_, p)| p).collect();
    let job = state
        .engine
        .clone()
        .submit_multi(export_id, plan, staged, include_audio)
        .await?;

    tracing::info!(job_id = job.id, export_id = %export_id, "Multi-clip render accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: RenderAccepted {
                job_id: job.id,
                export_id,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Overlay
// ---------------------------------------------------------------------------

/// POST /api/v1/render/overlay
///
/// Highlight-effect second pass over the export's most recent completed
/// render. Returns 202; the result is retrievable via the final-asset
/// endpoint once the job completes.
pub async fn render_overlay(
    State(state): State<AppState>,
    Json(req): Json<OverlayRenderRequest>,
) -> AppResult<impl IntoResponse> {
    state
        .autosave
        .flush(req.clip_id)
        .await
        .map_err(AppError::InternalError)?;

    let job = state.engine.clone().submit_overlay(req).await?;

    tracing::info!(job_id = job.id, export_id = %job.export_id, "Overlay render accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: RenderAccepted {
                job_id: job.id,
                export_id: job.export_id,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Final asset lookup
// ---------------------------------------------------------------------------

/// GET /api/v1/exports/{export_id}/asset
///
/// The output asset of an export's most recent completed render.
pub async fn export_asset(
    State(state): State<AppState>,
    Path(export_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let job = RenderJobRepo::latest_complete_for_export(&state.pool, export_id)
        .await?
        .ok_or_else(|| {
            AppError::SourceNotReady(format!("Export {export_id} has no completed render yet"))
        })?;

    let asset_id = job.result_asset_id.ok_or_else(|| {
        AppError::InternalError(format!("Completed job {} has no result asset", job.id))
    })?;
    let asset = AssetRepo::find_by_id(&state.pool, asset_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Asset",
            id: asset_id,
        }))?;

    Ok(Json(DataResponse { data: asset }))
}
