//! Render engine lifecycle tests with a scripted transcoder.
//!
//! These exercise the full orchestration path -- request validation, job
//! creation, background execution, progress fan-out, dedup registration of
//! the output -- without an ffmpeg binary: the transcoder is a scripted
//! fake that emits progress and writes (or refuses to write) the output.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use matchcut_api::engine::{RenderEngine, SingleRenderRequest};
use matchcut_api::error::AppError;
use matchcut_core::clip::Transform;
use matchcut_db::models::clip::NewClip;
use matchcut_db::models::status::RenderJobStatus;
use matchcut_db::repositories::{AssetRepo, ClipRepo, RenderJobRepo};
use matchcut_encoder::{EncodeError, EncodeSpec, Transcoder};
use matchcut_events::{JobEvent, ProgressHub};

// ---------------------------------------------------------------------------
// Scripted transcoder
// ---------------------------------------------------------------------------

struct ScriptedTranscoder {
    fail: bool,
}

#[async_trait]
impl Transcoder for ScriptedTranscoder {
    async fn encode(
        &self,
        spec: &EncodeSpec,
        progress: mpsc::Sender<u8>,
    ) -> Result<(), EncodeError> {
        for percent in [10u8, 55, 100] {
            let _ = progress.send(percent).await;
        }
        if self.fail {
            return Err(EncodeError::Failed {
                exit_code: Some(1),
                stderr: "scripted encoder failure".into(),
            });
        }
        let output = spec.args.last().expect("output path is the last arg");
        tokio::fs::write(output, b"rendered bytes")
            .await
            .map_err(EncodeError::Io)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Storage root, a registered source asset, and a clip over it.
async fn seeded_engine(
    pool: &PgPool,
    fail: bool,
) -> (Arc<RenderEngine>, Arc<ProgressHub>, i64, tempfile::TempDir) {
    let root = tempfile::tempdir().expect("tempdir");

    let source = root.path().join("source.mp4");
    tokio::fs::write(&source, b"uploaded source bytes").await.unwrap();

    let asset = AssetRepo::store_dedup(pool, "source-hash", &source.to_string_lossy(), 21)
        .await
        .unwrap();

    let transform = Transform::new(30.0, 30.0);
    let clip = ClipRepo::create(
        pool,
        &NewClip {
            asset_id: asset.asset.id,
            name: "kickoff".into(),
            duration_secs: 30.0,
            framerate: 30.0,
            width: 1920,
            height: 1080,
            transform: serde_json::to_value(&transform).unwrap(),
        },
    )
    .await
    .unwrap();

    let hub = Arc::new(ProgressHub::new());
    let engine = Arc::new(RenderEngine::new(
        pool.clone(),
        Arc::clone(&hub),
        Arc::new(ScriptedTranscoder { fail }),
        root.path().to_path_buf(),
        2,
        30.0,
    ));

    (engine, hub, clip.id, root)
}

/// Collect a job's full event stream until its terminal event.
async fn collect_events(hub: &ProgressHub, job_id: i64) -> Vec<JobEvent> {
    let (replay, mut live) = hub.subscribe(job_id).await.expect("job registered");
    let mut events = replay;
    if events.iter().any(JobEvent::is_terminal) {
        return events;
    }
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), live.recv())
            .await
            .expect("job should reach a terminal event")
            .expect("stream should stay open");
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn single_clip_render_completes_and_registers_output(pool: PgPool) {
    let (engine, hub, clip_id, _root) = seeded_engine(&pool, false).await;

    let job = engine
        .clone()
        .submit_single(SingleRenderRequest {
            clip_id,
            export_id: Uuid::new_v4(),
            fps: None,
            include_audio: true,
        })
        .await
        .unwrap();
    assert_eq!(job.status_id, RenderJobStatus::Pending.id());
    assert_eq!(job.progress_percent, 0);

    let events = collect_events(&hub, job.id).await;

    // Percent is monotonically non-decreasing and ends in one terminal.
    let mut last = 0u8;
    for event in &events {
        if let JobEvent::Progress { percent, .. } = event {
            assert!(*percent >= last, "percent regressed: {last} -> {percent}");
            last = *percent;
        }
    }
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    let JobEvent::Complete { result_asset_id } = events.last().unwrap() else {
        panic!("expected completion, got {:?}", events.last());
    };

    // The job row is the audit record.
    let job = RenderJobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(job.status_id, RenderJobStatus::Complete.id());
    assert_eq!(job.result_asset_id, Some(*result_asset_id));
    assert_eq!(job.progress_percent, 100);

    // The output went through the dedup store.
    let output = AssetRepo::find_by_id(&pool, *result_asset_id)
        .await
        .unwrap()
        .expect("output asset registered");
    assert!(std::path::Path::new(&output.storage_path).exists());

    // First render marks the clip: the next transform save bumps version.
    let clip = ClipRepo::find_by_id(&pool, clip_id).await.unwrap().unwrap();
    assert!(clip.rendered_at.is_some());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn encoder_failure_moves_job_to_error_with_diagnostic(pool: PgPool) {
    let (engine, hub, clip_id, _root) = seeded_engine(&pool, true).await;

    let job = engine
        .clone()
        .submit_single(SingleRenderRequest {
            clip_id,
            export_id: Uuid::new_v4(),
            fps: None,
            include_audio: false,
        })
        .await
        .unwrap();

    let events = collect_events(&hub, job.id).await;
    let JobEvent::Error { message } = events.last().unwrap() else {
        panic!("expected an error event, got {:?}", events.last());
    };
    assert!(
        message.contains("scripted encoder failure"),
        "encoder diagnostic must be attached verbatim: {message}"
    );

    let job = RenderJobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(job.status_id, RenderJobStatus::Error.id());
    assert!(job
        .error_message
        .as_deref()
        .unwrap()
        .contains("scripted encoder failure"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn missing_source_rejects_synchronously_without_a_job(pool: PgPool) {
    let (engine, _hub, clip_id, root) = seeded_engine(&pool, false).await;

    // Remove the source bytes out from under the clip.
    tokio::fs::remove_file(root.path().join("source.mp4")).await.unwrap();

    let result = engine
        .clone()
        .submit_single(SingleRenderRequest {
            clip_id,
            export_id: Uuid::new_v4(),
            fps: None,
            include_audio: true,
        })
        .await;
    assert!(matches!(result, Err(AppError::SourceNotReady(_))));

    // Validation failures must not leave a job row behind.
    let jobs = RenderJobRepo::list(&pool, &Default::default()).await.unwrap();
    assert!(jobs.is_empty());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn unknown_clip_is_not_found(pool: PgPool) {
    let (engine, _hub, _clip_id, _root) = seeded_engine(&pool, false).await;

    let result = engine
        .clone()
        .submit_single(SingleRenderRequest {
            clip_id: 999_999,
            export_id: Uuid::new_v4(),
            fps: None,
            include_audio: true,
        })
        .await;
    assert!(matches!(result, Err(AppError::Core(_))));
}
