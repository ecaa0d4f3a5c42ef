//! Repository for the `render_jobs` table.
//!
//! Uses `RenderJobStatus` from `models::status` for all status transitions.
//! Jobs are created `Pending` with `progress_percent = 0` so a caller can
//! display an immediate indicator, and terminal rows are never updated
//! again -- a retry is a brand-new job.

use sqlx::PgPool;
use uuid::Uuid;

use matchcut_core::types::DbId;

use crate::models::render_job::{JobListQuery, NewRenderJob, RenderJob};
use crate::models::status::RenderJobStatus;

/// Column list for `render_jobs` queries.
const COLUMNS: &str = "\
    id, export_id, kind, status_id, clip_id, clip_version, parameters, \
    progress_percent, progress_phase, progress_message, \
    result_asset_id, error_message, \
    started_at, completed_at, created_at, updated_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides CRUD operations for render jobs.
pub struct RenderJobRepo;

impl RenderJobRepo {
    /// Create a new pending job with zero progress.
    pub async fn create(pool: &PgPool, input: &NewRenderJob) -> Result<RenderJob, sqlx::Error> {
        let query = format!(
            "INSERT INTO render_jobs \
                 (export_id, kind, status_id, clip_id, clip_version, parameters) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RenderJob>(&query)
            .bind(input.export_id)
            .bind(&input.kind)
            .bind(RenderJobStatus::Pending.id())
            .bind(input.clip_id)
            .bind(input.clip_version)
            .bind(&input.parameters)
            .fetch_one(pool)
            .await
    }

    /// Transition a job to `Processing` and stamp `started_at`.
    pub async fn mark_processing(pool: &PgPool, job_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE render_jobs \
             SET status_id = $2, started_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(RenderJobStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Update progress percentage, phase, and optional message.
    pub async fn update_progress(
        pool: &PgPool,
        job_id: DbId,
        percent: i16,
        phase: &str,
        message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE render_jobs \
             SET progress_percent = $2, progress_phase = $3, progress_message = $4, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(percent)
        .bind(phase)
        .bind(message)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a job complete with its output asset.
    pub async fn complete(
        pool: &PgPool,
        job_id: DbId,
        result_asset_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE render_jobs \
             SET status_id = $2, result_asset_id = $3, progress_percent = 100, \
                 completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(RenderJobStatus::Complete.id())
        .bind(result_asset_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a job failed with a human-readable message.
    ///
    /// No automatic retry exists; the job stays in `Error` as an audit
    /// record and a re-export creates a new job.
    pub async fn fail(pool: &PgPool, job_id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE render_jobs \
             SET status_id = $2, error_message = $3, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(RenderJobStatus::Error.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<RenderJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM render_jobs WHERE id = $1");
        sqlx::query_as::<_, RenderJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The most recent completed job for an export, if any. Drives the
    /// final-asset endpoint and the overlay pass input lookup.
    pub async fn latest_complete_for_export(
        pool: &PgPool,
        export_id: Uuid,
    ) -> Result<Option<RenderJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM render_jobs \
             WHERE export_id = $1 AND status_id = $2 \
             ORDER BY completed_at DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, RenderJob>(&query)
            .bind(export_id)
            .bind(RenderJobStatus::Complete.id())
            .fetch_optional(pool)
            .await
    }

    /// List jobs with optional status filter and pagination.
    pub async fn list(pool: &PgPool, params: &JobListQuery) -> Result<Vec<RenderJob>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        match params.status_id {
            Some(status_id) => {
                let query = format!(
                    "SELECT {COLUMNS} FROM render_jobs \
                     WHERE status_id = $1 \
                     ORDER BY created_at DESC \
                     LIMIT $2 OFFSET $3"
                );
                sqlx::query_as::<_, RenderJob>(&query)
                    .bind(status_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
            }
            None => {
                let query = format!(
                    "SELECT {COLUMNS} FROM render_jobs \
                     ORDER BY created_at DESC \
                     LIMIT $1 OFFSET $2"
                );
                sqlx::query_as::<_, RenderJob>(&query)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "./migrations")]
    async fn new_jobs_start_pending_with_zero_progress(pool: PgPool) {
        let job = RenderJobRepo::create(
            &pool,
            &NewRenderJob {
                export_id: Uuid::new_v4(),
                kind: "single".into(),
                clip_id: None,
                clip_version: None,
                parameters: serde_json::json!({}),
            },
        )
        .await
        .unwrap();

        assert_eq!(job.status_id, RenderJobStatus::Pending.id());
        assert_eq!(job.progress_percent, 0);
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn lifecycle_transitions_stamp_timestamps(pool: PgPool) {
        let export_id = Uuid::new_v4();
        let job = RenderJobRepo::create(
            &pool,
            &NewRenderJob {
                export_id,
                kind: "single".into(),
                clip_id: None,
                clip_version: None,
                parameters: serde_json::json!({}),
            },
        )
        .await
        .unwrap();

        RenderJobRepo::mark_processing(&pool, job.id).await.unwrap();
        RenderJobRepo::update_progress(&pool, job.id, 40, "encode", Some("clip 1"))
            .await
            .unwrap();
        RenderJobRepo::fail(&pool, job.id, "ffmpeg exited with 1").await.unwrap();

        let job = RenderJobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(job.status_id, RenderJobStatus::Error.id());
        assert_eq!(job.error_message.as_deref(), Some("ffmpeg exited with 1"));
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_some());
        assert!(
            RenderJobRepo::latest_complete_for_export(&pool, export_id)
                .await
                .unwrap()
                .is_none(),
            "failed jobs never satisfy the final-asset lookup"
        );
    }
}
