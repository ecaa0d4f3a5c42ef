//! The render engine: request validation, job creation, and the spawned
//! background tasks that drive the external transcoder.
//!
//! Validation failures reject synchronously with no job row; everything
//! after job creation surfaces only through the job's status and progress
//! stream. Jobs run to completion or failure -- there is no cancellation
//! and no automatic retry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use matchcut_core::clip::{Transform, WorkingClip};
use matchcut_core::composer::{resolve, ExportableClip, ExportableHighlight, MultiClipPlan};
use matchcut_core::error::CoreError;
use matchcut_core::hashing::{content_path, sha256_hex};
use matchcut_core::highlight::HighlightEffect;
use matchcut_core::types::DbId;
use matchcut_db::models::clip::Clip;
use matchcut_db::models::render_job::{NewRenderJob, RenderJob};
use matchcut_db::repositories::{AssetRepo, ClipRepo, RenderJobRepo};
use matchcut_encoder::{clip_encode_args, concat_args, overlay_args, ClipEncodeOpts, EncodeSpec, Transcoder};
use matchcut_events::{JobEvent, ProgressHub, RenderPhase};

use crate::engine::cache::{CacheKey, RenderCache};
use crate::engine::progress::{pump_encoder_progress, report};
use crate::error::{AppError, AppResult};

/// Buffer depth for encoder percent channels.
const PROGRESS_CHANNEL_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// `POST /render` -- single clip, server-authoritative.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SingleRenderRequest {
    pub clip_id: DbId,
    pub export_id: Uuid,
    /// Output frame rate; defaults to the clip's own rate.
    pub fps: Option<f64>,
    #[serde(default = "default_true")]
    pub include_audio: bool,
}

/// `POST /render/overlay` -- highlight second pass over an export's
/// already-rendered video.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OverlayRenderRequest {
    pub clip_id: DbId,
    pub export_id: Uuid,
    pub effect_type: HighlightEffect,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Accepts render requests and runs them as background tasks bounded by a
/// worker pool sized to the available encoder subprocess slots.
pub struct RenderEngine {
    pool: PgPool,
    hub: Arc<ProgressHub>,
    transcoder: Arc<dyn Transcoder>,
    cache: RenderCache,
    slots: Arc<Semaphore>,
    storage_root: PathBuf,
    target_fps: f64,
}

impl RenderEngine {
    pub fn new(
        pool: PgPool,
        hub: Arc<ProgressHub>,
        transcoder: Arc<dyn Transcoder>,
        storage_root: PathBuf,
        encoder_slots: usize,
        target_fps: f64,
    ) -> Self {
        Self {
            pool,
            hub,
            transcoder,
            cache: RenderCache::new(),
            slots: Arc::new(Semaphore::new(encoder_slots.max(1))),
            storage_root,
            target_fps,
        }
    }

    pub fn progress_hub(&self) -> Arc<ProgressHub> {
        Arc::clone(&self.hub)
    }

    // -- Submission -----------------------------------------------------------

    /// Validate and accept a single-clip render.
    ///
    /// The transform is re-derived from the clip's persisted state (the
    /// caller flushed the autosave queue first), never trusted from the
    /// client -- that is what makes the render server-authoritative.
    pub async fn submit_single(self: Arc<Self>, req: SingleRenderRequest) -> AppResult<RenderJob> {
        let clip = self.load_clip(req.clip_id).await?;
        let working = working_clip_of(&clip)?;
        let input = self.source_path_of(&clip).await?;

        if working.transform.crop.is_empty() && (clip.width <= 0 || clip.height <= 0) {
            return Err(AppError::IncompleteFraming(format!(
                "Clip {} has no crop keyframes and no source dimensions to frame from",
                clip.id
            )));
        }

        // Full-frame aspect when the clip was never framed.
        let aspect = clip.width as f64 / clip.height as f64;
        let exportable = resolve(&working, aspect);

        let job = RenderJobRepo::create(
            &self.pool,
            &NewRenderJob {
                export_id: req.export_id,
                kind: "single".into(),
                clip_id: Some(clip.id),
                clip_version: Some(clip.version),
                parameters: serde_json::json!({
                    "fps": req.fps,
                    "include_audio": req.include_audio,
                }),
            },
        )
        .await?;
        self.hub.register(job.id).await;

        let engine = Arc::clone(&self);
        let job_id = job.id;
        let fps = req.fps.unwrap_or(working.framerate);
        let include_audio = req.include_audio;
        tokio::spawn(async move {
            engine
                .run_single(job_id, exportable, input, fps, include_audio)
                .await;
        });

        Ok(job)
    }

    /// Validate and accept a multi-clip render. Clip sources were staged
    /// from the multipart upload, one file per plan entry, in plan order.
    pub async fn submit_multi(
        self: Arc<Self>,
        export_id: Uuid,
        plan: MultiClipPlan,
        staged: Vec<PathBuf>,
        include_audio: bool,
    ) -> AppResult<RenderJob> {
        if plan.clips.is_empty() {
            return Err(AppError::BadRequest("Multi-clip plan has no clips".into()));
        }
        if plan.clips.len() != staged.len() {
            return Err(AppError::BadRequest(format!(
                "Plan describes {} clips but {} videos were uploaded",
                plan.clips.len(),
                staged.len()
            )));
        }
        for path in &staged {
            if !path.exists() {
                return Err(AppError::SourceNotReady(format!(
                    "Staged clip source {} is missing",
                    path.display()
                )));
            }
        }

        let job = RenderJobRepo::create(
            &self.pool,
            &NewRenderJob {
                export_id,
                kind: "multi_clip".into(),
                clip_id: None,
                clip_version: None,
                parameters: serde_json::to_value(&plan)
                    .map_err(|e| AppError::InternalError(e.to_string()))?,
            },
        )
        .await?;
        self.hub.register(job.id).await;

        let engine = Arc::clone(&self);
        let job_id = job.id;
        tokio::spawn(async move {
            engine.run_multi(job_id, plan, staged, include_audio).await;
        });

        Ok(job)
    }

    /// Validate and accept a highlight-overlay pass over the export's most
    /// recent completed render.
    pub async fn submit_overlay(self: Arc<Self>, req: OverlayRenderRequest) -> AppResult<RenderJob> {
        let clip = self.load_clip(req.clip_id).await?;
        let working = working_clip_of(&clip)?;

        let prior = RenderJobRepo::latest_complete_for_export(&self.pool, req.export_id)
            .await?
            .ok_or_else(|| {
                AppError::SourceNotReady(format!(
                    "Export {} has no completed render to overlay",
                    req.export_id
                ))
            })?;
        let input_asset_id = prior.result_asset_id.ok_or_else(|| {
            AppError::InternalError(format!("Completed job {} has no result asset", prior.id))
        })?;
        let input = self.asset_path(input_asset_id).await?;

        let aspect = clip.width as f64 / clip.height.max(1) as f64;
        let resolved = resolve(&working, aspect);
        let highlight = resolved.highlight.unwrap_or(ExportableHighlight {
            keyframes: Vec::new(),
            regions: Vec::new(),
            effect: HighlightEffect::Original,
        });
        let expected_secs = resolved.effective_duration;

        let job = RenderJobRepo::create(
            &self.pool,
            &NewRenderJob {
                export_id: req.export_id,
                kind: "overlay".into(),
                clip_id: Some(clip.id),
                clip_version: Some(clip.version),
                parameters: serde_json::json!({ "effect_type": req.effect_type }),
            },
        )
        .await?;
        self.hub.register(job.id).await;

        let engine = Arc::clone(&self);
        let job_id = job.id;
        let effect = req.effect_type;
        tokio::spawn(async move {
            engine
                .run_overlay(job_id, input, effect, highlight, expected_secs)
                .await;
        });

        Ok(job)
    }

    // -- Background runs --------------------------------------------------------

    async fn run_single(
        &self,
        job_id: DbId,
        clip: ExportableClip,
        input: PathBuf,
        fps: f64,
        include_audio: bool,
    ) {
        report(&self.pool, &self.hub, job_id, 0, RenderPhase::Queued, None).await;
        let _permit = self.slots.acquire().await;
        if let Err(e) = RenderJobRepo::mark_processing(&self.pool, job_id).await {
            tracing::error!(job_id, error = %e, "Failed to mark job processing");
        }

        let Some(spool) = self.spool_dir(job_id).await else {
            self.fail(job_id, "Could not create render spool directory".into()).await;
            return;
        };
        let output = spool.join("render.mp4");
        let spec = clip_encode_args(
            &clip,
            &ClipEncodeOpts {
                input,
                output: output.clone(),
                target_fps: fps,
                include_audio,
            },
        );

        if let Err(message) = self.encode(job_id, &spec, RenderPhase::Encode, 5, 90, None).await {
            self.fail(job_id, message).await;
            return;
        }

        report(&self.pool, &self.hub, job_id, 92, RenderPhase::Finalize, None).await;
        match self.register_output(&output).await {
            Ok(asset_id) => {
                if let Err(e) = ClipRepo::mark_rendered(&self.pool, clip.clip_id).await {
                    tracing::error!(job_id, error = %e, "Failed to mark clip rendered");
                }
                self.complete(job_id, asset_id).await;
            }
            Err(message) => self.fail(job_id, message).await,
        }
    }

    async fn run_multi(
        &self,
        job_id: DbId,
        plan: MultiClipPlan,
        staged: Vec<PathBuf>,
        include_audio: bool,
    ) {
        report(&self.pool, &self.hub, job_id, 0, RenderPhase::Queued, None).await;
        let _permit = self.slots.acquire().await;
        if let Err(e) = RenderJobRepo::mark_processing(&self.pool, job_id).await {
            tracing::error!(job_id, error = %e, "Failed to mark job processing");
        }

        let Some(spool) = self.spool_dir(job_id).await else {
            self.fail(job_id, "Could not create render spool directory".into()).await;
            return;
        };

        // Phase 1 (0..70): render each clip, reusing unchanged ones.
        let n = plan.clips.len();
        let mut outputs = Vec::with_capacity(n);
        let mut durations = Vec::with_capacity(n);
        for (i, (clip, input)) in plan.clips.iter().zip(&staged).enumerate() {
            let lo = (70 * i / n) as u8;
            let hi = (70 * (i + 1) / n) as u8;
            let key = CacheKey::for_clip(clip, self.target_fps, include_audio);

            let output = match self.cache.get(&key).await {
                Some(cached) => {
                    report(
                        &self.pool,
                        &self.hub,
                        job_id,
                        hi,
                        RenderPhase::Clips,
                        Some(format!("Clip {} unchanged, reusing prior render", i + 1)),
                    )
                    .await;
                    cached
                }
                None => {
                    let output = spool.join(format!("clip_{i}.mp4"));
                    let spec = clip_encode_args(
                        clip,
                        &ClipEncodeOpts {
                            input: input.clone(),
                            output: output.clone(),
                            target_fps: self.target_fps,
                            include_audio,
                        },
                    );
                    let message = Some(format!("Rendering clip {} of {n}", i + 1));
                    if let Err(msg) = self
                        .encode(job_id, &spec, RenderPhase::Clips, lo, hi, message)
                        .await
                    {
                        self.fail(job_id, msg).await;
                        return;
                    }
                    self.cache.insert(key, output.clone()).await;
                    output
                }
            };
            outputs.push(output);
            durations.push(clip.effective_duration);
        }

        // Phase 2 (70..92): transition assembly. A single clip skips it.
        let stitched = if n == 1 {
            outputs.pop().expect("one clip rendered")
        } else {
            let stitched = spool.join("stitched.mp4");
            let spec = concat_args(&outputs, &durations, &stitched, plan.transition, include_audio);
            if let Err(msg) = self
                .encode(job_id, &spec, RenderPhase::Stitch, 70, 92, None)
                .await
            {
                self.fail(job_id, msg).await;
                return;
            }
            stitched
        };

        // Phase 3: register the output.
        report(&self.pool, &self.hub, job_id, 95, RenderPhase::Finalize, None).await;
        match self.register_output(&stitched).await {
            Ok(asset_id) => self.complete(job_id, asset_id).await,
            Err(message) => self.fail(job_id, message).await,
        }
    }

    async fn run_overlay(
        &self,
        job_id: DbId,
        input: PathBuf,
        effect: HighlightEffect,
        highlight: ExportableHighlight,
        expected_secs: f64,
    ) {
        report(&self.pool, &self.hub, job_id, 0, RenderPhase::Queued, None).await;
        let _permit = self.slots.acquire().await;
        if let Err(e) = RenderJobRepo::mark_processing(&self.pool, job_id).await {
            tracing::error!(job_id, error = %e, "Failed to mark job processing");
        }

        let Some(spool) = self.spool_dir(job_id).await else {
            self.fail(job_id, "Could not create render spool directory".into()).await;
            return;
        };
        let output = spool.join("overlay.mp4");
        let spec = overlay_args(&input, &output, effect, &highlight, expected_secs);

        if let Err(msg) = self.encode(job_id, &spec, RenderPhase::Overlay, 5, 90, None).await {
            self.fail(job_id, msg).await;
            return;
        }

        report(&self.pool, &self.hub, job_id, 92, RenderPhase::Finalize, None).await;
        match self.register_output(&output).await {
            Ok(asset_id) => self.complete(job_id, asset_id).await,
            Err(message) => self.fail(job_id, message).await,
        }
    }

    // -- Shared plumbing ----------------------------------------------------------

    async fn load_clip(&self, clip_id: DbId) -> AppResult<Clip> {
        ClipRepo::find_by_id(&self.pool, clip_id)
            .await?
            .ok_or(AppError::Core(CoreError::NotFound {
                entity: "Clip",
                id: clip_id,
            }))
    }

    /// The on-disk source for a clip, verified present.
    async fn source_path_of(&self, clip: &Clip) -> AppResult<PathBuf> {
        self.asset_path(clip.asset_id).await
    }

    async fn asset_path(&self, asset_id: DbId) -> AppResult<PathBuf> {
        let asset = AssetRepo::find_by_id(&self.pool, asset_id)
            .await?
            .ok_or_else(|| {
                AppError::SourceNotReady(format!("Asset {asset_id} is not registered"))
            })?;
        let path = PathBuf::from(&asset.storage_path);
        if !path.exists() {
            return Err(AppError::SourceNotReady(format!(
                "Asset {asset_id} bytes are missing from storage"
            )));
        }
        Ok(path)
    }

    /// Run one encode with its progress slice; the returned error string is
    /// the job-facing failure message with the encoder diagnostic verbatim.
    async fn encode(
        &self,
        job_id: DbId,
        spec: &EncodeSpec,
        phase: RenderPhase,
        lo: u8,
        hi: u8,
        message: Option<String>,
    ) -> Result<(), String> {
        let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let pump = pump_encoder_progress(
            self.pool.clone(),
            Arc::clone(&self.hub),
            job_id,
            phase,
            lo,
            hi,
            rx,
            message,
        );

        let result = self.transcoder.encode(spec, tx).await;
        // The encoder dropped its sender; let the pump drain fully so a
        // terminal event can never overtake a progress event.
        let _ = pump.await;

        result.map_err(|e| e.to_string())
    }

    /// Move an encode output into the content-addressed store and return
    /// its asset id. Rendered outputs pass through the same dedup layer as
    /// uploads.
    async fn register_output(&self, output: &Path) -> Result<DbId, String> {
        let bytes = tokio::fs::read(output)
            .await
            .map_err(|e| format!("Could not read render output: {e}"))?;
        let hash = sha256_hex(&bytes);
        let store_path = content_path(&self.storage_root.join("store"), &hash, "mp4");

        let stored =
            AssetRepo::store_dedup(&self.pool, &hash, &store_path.to_string_lossy(), bytes.len() as i64)
                .await
                .map_err(|e| format!("Could not register render output: {e}"))?;

        if !stored.deduplicated {
            if let Some(parent) = store_path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| format!("Could not create store directory: {e}"))?;
            }
            tokio::fs::copy(output, &store_path)
                .await
                .map_err(|e| format!("Could not persist render output: {e}"))?;
        }

        Ok(stored.asset.id)
    }

    async fn complete(&self, job_id: DbId, asset_id: DbId) {
        if let Err(e) = RenderJobRepo::complete(&self.pool, job_id, asset_id).await {
            tracing::error!(job_id, error = %e, "Failed to mark job complete");
        }
        self.hub
            .publish(job_id, JobEvent::Complete { result_asset_id: asset_id })
            .await;
        tracing::info!(job_id, asset_id, "Render complete");
    }

    async fn fail(&self, job_id: DbId, message: String) {
        tracing::error!(job_id, error = %message, "Render failed");
        if let Err(e) = RenderJobRepo::fail(&self.pool, job_id, &message).await {
            tracing::error!(job_id, error = %e, "Failed to mark job failed");
        }
        self.hub.publish(job_id, JobEvent::Error { message }).await;
    }

    async fn spool_dir(&self, job_id: DbId) -> Option<PathBuf> {
        let dir = self.storage_root.join("spool").join(format!("job_{job_id}"));
        match tokio::fs::create_dir_all(&dir).await {
            Ok(()) => Some(dir),
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to create spool directory");
                None
            }
        }
    }
}

/// Rehydrate the domain model from a clip row.
fn working_clip_of(clip: &Clip) -> AppResult<WorkingClip> {
    let transform: Transform = serde_json::from_value(clip.transform.clone())
        .map_err(|e| AppError::InternalError(format!("Clip {} transform is corrupt: {e}", clip.id)))?;
    Ok(WorkingClip {
        id: clip.id,
        asset_id: clip.asset_id,
        duration: clip.duration_secs,
        framerate: clip.framerate,
        width: clip.width,
        height: clip.height,
        version: clip.version,
        transform,
    })
}
