//! Working clip models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use matchcut_core::types::{DbId, Timestamp};

/// A row from the `clips` table.
///
/// `transform` is the clip's persisted crop/highlight/segment state as one
/// JSON document (deserializable into `matchcut_core::clip::Transform`).
/// `version` is the copy-on-write snapshot counter: it only moves once the
/// clip has been rendered at least once, so an in-flight render's captured
/// version stays meaningful.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Clip {
    pub id: DbId,
    pub asset_id: DbId,
    pub name: String,
    pub duration_secs: f64,
    pub framerate: f64,
    pub width: i32,
    pub height: i32,
    pub transform: serde_json::Value,
    pub version: i32,
    pub rendered_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering a new clip over a stored asset.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateClip {
    pub asset_id: DbId,
    pub name: String,
}

/// Internal insert payload once the source has been probed.
#[derive(Debug, Clone)]
pub struct NewClip {
    pub asset_id: DbId,
    pub name: String,
    pub duration_secs: f64,
    pub framerate: f64,
    pub width: i32,
    pub height: i32,
    pub transform: serde_json::Value,
}
