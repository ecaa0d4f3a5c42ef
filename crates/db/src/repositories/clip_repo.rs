//! Repository for the `clips` table.
//!
//! The copy-on-write versioning rule lives here: `update_transform` bumps
//! `version` only when the clip has been rendered at least once, so any
//! render that captured the previous version can tell its snapshot is
//! stale without the save path having to know about renders.

use sqlx::PgPool;

use matchcut_core::types::DbId;

use crate::models::clip::{Clip, NewClip};

/// Column list for `clips` queries.
const COLUMNS: &str = "\
    id, asset_id, name, duration_secs, framerate, width, height, \
    transform, version, rendered_at, created_at, updated_at";

/// Provides CRUD operations for working clips.
pub struct ClipRepo;

impl ClipRepo {
    /// Register a new clip with its probed source metadata and initial
    /// transform document.
    pub async fn create(pool: &PgPool, input: &NewClip) -> Result<Clip, sqlx::Error> {
        let query = format!(
            "INSERT INTO clips \
                 (asset_id, name, duration_secs, framerate, width, height, transform) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Clip>(&query)
            .bind(input.asset_id)
            .bind(&input.name)
            .bind(input.duration_secs)
            .bind(input.framerate)
            .bind(input.width)
            .bind(input.height)
            .bind(&input.transform)
            .fetch_one(pool)
            .await
    }

    /// Find a clip by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Clip>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM clips WHERE id = $1");
        sqlx::query_as::<_, Clip>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Persist a clip's transform document.
    ///
    /// Bumps `version` only when the clip has already been rendered once
    /// (copy-on-write snapshot rule). Returns the updated row.
    pub async fn update_transform(
        pool: &PgPool,
        id: DbId,
        transform: &serde_json::Value,
    ) -> Result<Clip, sqlx::Error> {
        let query = format!(
            "UPDATE clips \
             SET transform = $2, \
                 version = version + CASE WHEN rendered_at IS NOT NULL THEN 1 ELSE 0 END, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Clip>(&query)
            .bind(id)
            .bind(transform)
            .fetch_one(pool)
            .await
    }

    /// Record that a clip has been rendered. Subsequent transform saves
    /// bump the version.
    pub async fn mark_rendered(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE clips SET rendered_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Delete a clip. The underlying asset's reference count is the
    /// caller's responsibility (`AssetRepo::release`).
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM clips WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::AssetRepo;

    async fn seeded_clip(pool: &PgPool) -> Clip {
        let asset = AssetRepo::store_dedup(pool, "clip-src", "/store/cl/ip/clip-src.mp4", 10)
            .await
            .unwrap();
        ClipRepo::create(
            pool,
            &NewClip {
                asset_id: asset.asset.id,
                name: "first half".into(),
                duration_secs: 30.0,
                framerate: 30.0,
                width: 1920,
                height: 1080,
                transform: serde_json::json!({}),
            },
        )
        .await
        .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn saves_before_first_render_do_not_bump_version(pool: PgPool) {
        let clip = seeded_clip(&pool).await;
        assert_eq!(clip.version, 1);

        let updated = ClipRepo::update_transform(&pool, clip.id, &serde_json::json!({"a": 1}))
            .await
            .unwrap();
        assert_eq!(updated.version, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn saves_after_render_bump_version(pool: PgPool) {
        let clip = seeded_clip(&pool).await;
        ClipRepo::mark_rendered(&pool, clip.id).await.unwrap();

        let updated = ClipRepo::update_transform(&pool, clip.id, &serde_json::json!({"a": 1}))
            .await
            .unwrap();
        assert_eq!(updated.version, 2);

        let updated = ClipRepo::update_transform(&pool, clip.id, &serde_json::json!({"a": 2}))
            .await
            .unwrap();
        assert_eq!(updated.version, 3);
    }
}
