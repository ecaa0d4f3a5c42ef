//! Handlers for the `/assets` resource: content-addressed upload/dedup.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use matchcut_core::error::CoreError;
use matchcut_core::hashing::{content_path, sha256_hex};
use matchcut_core::types::DbId;
use matchcut_db::repositories::AssetRepo;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Response payload for an upload.
#[derive(Debug, Serialize)]
pub struct StoreAssetResponse {
    pub asset_id: DbId,
    pub hash: String,
    pub deduplicated: bool,
}

/// POST /api/v1/assets
///
/// Store raw video bytes content-addressed. Byte-identical uploads return
/// the existing asset with `deduplicated = true` and an incremented
/// reference count; no second copy is written.
pub async fn store_asset(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    if body.is_empty() {
        return Err(AppError::BadRequest("Upload body is empty".into()));
    }

    let hash = sha256_hex(&body);
    let store_path = content_path(&state.config.storage_root.join("store"), &hash, "mp4");

    let stored = AssetRepo::store_dedup(
        &state.pool,
        &hash,
        &store_path.to_string_lossy(),
        body.len() as i64,
    )
    .await?;

    if !stored.deduplicated {
        if let Some(parent) = store_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::InternalError(format!("Store directory: {e}")))?;
        }
        tokio::fs::write(&store_path, &body)
            .await
            .map_err(|e| AppError::InternalError(format!("Store write: {e}")))?;
        tracing::info!(asset_id = stored.asset.id, hash = %hash, size = body.len(), "Asset stored");
    } else {
        tracing::info!(asset_id = stored.asset.id, hash = %hash, "Upload deduplicated");
    }

    let status = if stored.deduplicated {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(DataResponse {
            data: StoreAssetResponse {
                asset_id: stored.asset.id,
                hash,
                deduplicated: stored.deduplicated,
            },
        }),
    ))
}

/// GET /api/v1/assets/{id}
pub async fn get_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let asset = AssetRepo::find_by_id(&state.pool, asset_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Asset",
            id: asset_id,
        }))?;
    Ok(Json(DataResponse { data: asset }))
}

/// DELETE /api/v1/assets/{id}
///
/// Decrement the asset's reference count. Bytes are reclaimed from disk
/// only when the count reaches zero.
pub async fn release_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let reclaimed = AssetRepo::release(&state.pool, asset_id).await?;

    if let Some(path) = reclaimed {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            // The row is already gone; a missing file is not fatal.
            tracing::warn!(asset_id, path = %path, error = %e, "Could not remove asset bytes");
        }
        tracing::info!(asset_id, "Asset reclaimed");
    }

    Ok(StatusCode::NO_CONTENT)
}
