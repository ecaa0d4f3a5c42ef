//! Repository for the content-addressed `assets` table.
//!
//! The store-or-reference decision runs inside a transaction with a row
//! lock on the existing hash, so two concurrent uploads of the same new
//! content cannot both decide to store bytes.

use sqlx::PgPool;

use matchcut_core::types::DbId;

use crate::models::asset::{Asset, StoredAsset};

/// Column list for `assets` queries.
const COLUMNS: &str =
    "id, content_hash, storage_path, size_bytes, ref_count, created_at, updated_at";

/// Provides CRUD operations for content-addressed assets.
pub struct AssetRepo;

impl AssetRepo {
    /// Register content by hash, deduplicating against existing rows.
    ///
    /// Returns the asset plus whether it was deduplicated. On a hash match
    /// the reference count is incremented and `storage_path`/`size_bytes`
    /// are left untouched -- the caller must NOT write bytes in that case.
    /// On a miss a new row is inserted with `ref_count = 1` and the caller
    /// persists the bytes at `storage_path`.
    pub async fn store_dedup(
        pool: &PgPool,
        content_hash: &str,
        storage_path: &str,
        size_bytes: i64,
    ) -> Result<StoredAsset, sqlx::Error> {
        let mut tx = pool.begin().await?;

        // Lock the existing row (if any) so a concurrent identical upload
        // serializes behind this check instead of double-inserting.
        let query = format!("SELECT {COLUMNS} FROM assets WHERE content_hash = $1 FOR UPDATE");
        let existing = sqlx::query_as::<_, Asset>(&query)
            .bind(content_hash)
            .fetch_optional(&mut *tx)
            .await?;

        let stored = match existing {
            Some(asset) => {
                let query = format!(
                    "UPDATE assets SET ref_count = ref_count + 1, updated_at = NOW() \
                     WHERE id = $1 RETURNING {COLUMNS}"
                );
                let asset = sqlx::query_as::<_, Asset>(&query)
                    .bind(asset.id)
                    .fetch_one(&mut *tx)
                    .await?;
                StoredAsset {
                    asset,
                    deduplicated: true,
                }
            }
            None => {
                let query = format!(
                    "INSERT INTO assets (content_hash, storage_path, size_bytes, ref_count) \
                     VALUES ($1, $2, $3, 1) \
                     RETURNING {COLUMNS}"
                );
                let asset = sqlx::query_as::<_, Asset>(&query)
                    .bind(content_hash)
                    .bind(storage_path)
                    .bind(size_bytes)
                    .fetch_one(&mut *tx)
                    .await?;
                StoredAsset {
                    asset,
                    deduplicated: false,
                }
            }
        };

        tx.commit().await?;
        Ok(stored)
    }

    /// Find an asset by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Asset>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM assets WHERE id = $1");
        sqlx::query_as::<_, Asset>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Decrement an asset's reference count.
    ///
    /// When the count reaches zero the row is deleted and the storage path
    /// is returned so the caller can reclaim the bytes; otherwise `None`.
    pub async fn release(pool: &PgPool, id: DbId) -> Result<Option<String>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!("SELECT {COLUMNS} FROM assets WHERE id = $1 FOR UPDATE");
        let asset = sqlx::query_as::<_, Asset>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        let reclaim = if asset.ref_count <= 1 {
            sqlx::query("DELETE FROM assets WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            Some(asset.storage_path)
        } else {
            sqlx::query(
                "UPDATE assets SET ref_count = ref_count - 1, updated_at = NOW() WHERE id = $1",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
            None
        };

        tx.commit().await?;
        Ok(reclaim)
    }
}
