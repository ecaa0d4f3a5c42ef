//! Handlers for the `/clips` resource: registration over stored assets,
//! debounced transform saves, and detection-seeded highlight keyframes.

use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use matchcut_core::clip::Transform;
use matchcut_core::error::CoreError;
use matchcut_core::ffmpeg;
use matchcut_core::highlight::{seed_from_detections, DetectionBox, HighlightData};
use matchcut_core::timeline::KeyframeTimeline;
use matchcut_core::types::DbId;
use matchcut_db::models::clip::{Clip, CreateClip, NewClip};
use matchcut_db::repositories::{AssetRepo, ClipRepo};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/v1/clips
///
/// Register a working clip over a stored asset. The source is probed for
/// duration/framerate/dimensions and the clip starts with an empty
/// transform (no keyframes, one full-length segment).
pub async fn create_clip(
    State(state): State<AppState>,
    Json(input): Json<CreateClip>,
) -> AppResult<impl IntoResponse> {
    let asset = AssetRepo::find_by_id(&state.pool, input.asset_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Asset",
            id: input.asset_id,
        }))?;

    let source = PathBuf::from(&asset.storage_path);
    let meta = ffmpeg::probe_source_metadata(&source)
        .await
        .map_err(|e| AppError::SourceNotReady(format!("Probe failed: {e}")))?;

    let transform = Transform::new(meta.duration_secs, meta.framerate);
    let clip = ClipRepo::create(
        &state.pool,
        &NewClip {
            asset_id: asset.id,
            name: input.name,
            duration_secs: meta.duration_secs,
            framerate: meta.framerate,
            width: meta.width,
            height: meta.height,
            transform: serde_json::to_value(&transform)
                .map_err(|e| AppError::InternalError(e.to_string()))?,
        },
    )
    .await?;

    tracing::info!(clip_id = clip.id, asset_id = asset.id, "Clip registered");
    Ok((StatusCode::CREATED, Json(DataResponse { data: clip })))
}

// ---------------------------------------------------------------------------
// Get / delete
// ---------------------------------------------------------------------------

/// GET /api/v1/clips/{id}
pub async fn get_clip(
    State(state): State<AppState>,
    Path(clip_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let clip = find_clip(&state, clip_id).await?;
    Ok(Json(DataResponse { data: clip }))
}

/// DELETE /api/v1/clips/{id}
///
/// Remove the clip and release its reference on the source asset.
pub async fn delete_clip(
    State(state): State<AppState>,
    Path(clip_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let clip = find_clip(&state, clip_id).await?;
    ClipRepo::delete(&state.pool, clip_id).await?;

    if let Some(path) = AssetRepo::release(&state.pool, clip.asset_id).await? {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(asset_id = clip.asset_id, error = %e, "Could not remove asset bytes");
        }
    }

    tracing::info!(clip_id, "Clip deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Transform save (write-behind)
// ---------------------------------------------------------------------------

/// PUT /api/v1/clips/{id}/transform
///
/// Accept the editor's current transform state into the debounced
/// write-behind queue. Returns 202: the write lands after the quiet
/// period (or at the explicit flush a render request performs). The body
/// is validated against the domain model before being queued so malformed
/// documents are rejected at the edge, not at flush time.
pub async fn save_transform(
    State(state): State<AppState>,
    Path(clip_id): Path<DbId>,
    Json(body): Json<serde_json::Value>,
) -> AppResult<impl IntoResponse> {
    // Existence check keeps 404 semantics synchronous.
    find_clip(&state, clip_id).await?;

    let _: Transform = serde_json::from_value(body.clone())
        .map_err(|e| AppError::BadRequest(format!("Malformed transform document: {e}")))?;

    state.autosave.save(clip_id, body).await;
    Ok(StatusCode::ACCEPTED)
}

// ---------------------------------------------------------------------------
// Detection seeding
// ---------------------------------------------------------------------------

/// Request payload: bounding boxes from the external detector.
#[derive(Debug, Deserialize)]
pub struct SeedDetectionsRequest {
    pub boxes: Vec<DetectionBox>,
}

/// POST /api/v1/clips/{id}/highlight/detections
///
/// Convert detector bounding boxes into highlight ellipse keyframes on the
/// clip's highlight timeline. Persists immediately (detector output is not
/// an interactive edit stream, so the debounce buys nothing).
pub async fn seed_highlight_detections(
    State(state): State<AppState>,
    Path(clip_id): Path<DbId>,
    Json(input): Json<SeedDetectionsRequest>,
) -> AppResult<impl IntoResponse> {
    let clip = find_clip(&state, clip_id).await?;

    let mut transform: Transform = serde_json::from_value(clip.transform.clone())
        .map_err(|e| AppError::InternalError(format!("Clip {clip_id} transform is corrupt: {e}")))?;

    let frame_count = transform.crop.frame_count();
    let timeline = transform
        .highlight
        .get_or_insert_with(|| KeyframeTimeline::<HighlightData>::new(frame_count));
    let seeded = seed_from_detections(timeline, &input.boxes)?;

    let value = serde_json::to_value(&transform)
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let updated = ClipRepo::update_transform(&state.pool, clip_id, &value).await?;

    tracing::info!(clip_id, seeded, "Highlight keyframes seeded from detections");
    Ok(Json(DataResponse { data: updated }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn find_clip(state: &AppState, clip_id: DbId) -> AppResult<Clip> {
    ClipRepo::find_by_id(&state.pool, clip_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Clip",
            id: clip_id,
        }))
}
