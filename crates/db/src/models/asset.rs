//! Content-addressed asset models and DTOs.

use serde::Serialize;
use sqlx::FromRow;

use matchcut_core::types::{DbId, Timestamp};

/// A row from the `assets` table.
///
/// An asset is immutable once stored: byte-identical uploads map to the
/// same row with an incremented `ref_count` instead of a second copy.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Asset {
    pub id: DbId,
    pub content_hash: String,
    pub storage_path: String,
    pub size_bytes: i64,
    pub ref_count: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Result of a dedup store operation.
#[derive(Debug, Clone, Serialize)]
pub struct StoredAsset {
    pub asset: Asset,
    /// `true` when the bytes were already present and only the reference
    /// count changed.
    pub deduplicated: bool,
}
