//! Render job entity models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use matchcut_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// A row from the `render_jobs` table.
///
/// Jobs are retained after completion as audit records and never
/// resurrected; a retry creates a new job id.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RenderJob {
    pub id: DbId,
    pub export_id: Uuid,
    /// `"single"`, `"multi_clip"`, or `"overlay"`.
    pub kind: String,
    pub status_id: StatusId,
    pub clip_id: Option<DbId>,
    /// Clip version captured at submission time, so concurrent edits
    /// cannot mutate a render already in flight.
    pub clip_version: Option<i32>,
    pub parameters: serde_json::Value,
    pub progress_percent: i16,
    pub progress_phase: Option<String>,
    pub progress_message: Option<String>,
    pub result_asset_id: Option<DbId>,
    pub error_message: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Internal insert payload for a new render job.
#[derive(Debug, Clone)]
pub struct NewRenderJob {
    pub export_id: Uuid,
    pub kind: String,
    pub clip_id: Option<DbId>,
    pub clip_version: Option<i32>,
    pub parameters: serde_json::Value,
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by status ID (e.g. 1 = pending, 4 = error).
    pub status_id: Option<StatusId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
