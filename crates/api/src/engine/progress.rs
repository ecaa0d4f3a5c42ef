//! Bridges encoder progress into job database updates and the progress hub.
//!
//! Each render stage owns a slice of the job's overall percent range; the
//! encoder's 0-100 is rescaled into that slice so the job-level percent
//! stays monotonic across stages.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::mpsc;

use matchcut_core::types::DbId;
use matchcut_db::repositories::RenderJobRepo;
use matchcut_events::{JobEvent, ProgressHub, RenderPhase};

/// The wire name of a phase, stored on the job row.
pub fn phase_name(phase: RenderPhase) -> &'static str {
    match phase {
        RenderPhase::Queued => "queued",
        RenderPhase::Clips => "clips",
        RenderPhase::Encode => "encode",
        RenderPhase::Stitch => "stitch",
        RenderPhase::Overlay => "overlay",
        RenderPhase::Finalize => "finalize",
    }
}

/// Publish one job-level progress tick to the hub and the job row.
///
/// Database write failures are logged, never propagated: losing one
/// progress update must not fail a render.
pub async fn report(
    pool: &PgPool,
    hub: &ProgressHub,
    job_id: DbId,
    percent: u8,
    phase: RenderPhase,
    message: Option<String>,
) {
    if let Err(e) =
        RenderJobRepo::update_progress(pool, job_id, percent as i16, phase_name(phase), message.as_deref())
            .await
    {
        tracing::error!(job_id, error = %e, "Failed to persist job progress");
    }

    hub.publish(
        job_id,
        JobEvent::Progress {
            percent,
            phase,
            message,
        },
    )
    .await;
}

/// Drain an encoder's percent stream, rescaled into `[lo, hi]` of the
/// job's overall progress.
///
/// Runs until the encoder closes the channel (process exit). Used as a
/// concurrently spawned task alongside the `Transcoder::encode` call.
pub fn pump_encoder_progress(
    pool: PgPool,
    hub: Arc<ProgressHub>,
    job_id: DbId,
    phase: RenderPhase,
    lo: u8,
    hi: u8,
    mut encoder_rx: mpsc::Receiver<u8>,
    message: Option<String>,
) -> tokio::task::JoinHandle<()> {
    debug_assert!(lo <= hi);
    tokio::spawn(async move {
        while let Some(encoder_percent) = encoder_rx.recv().await {
            let span = (hi - lo) as u32;
            let overall = lo as u32 + span * encoder_percent.min(100) as u32 / 100;
            report(
                &pool,
                &hub,
                job_id,
                overall as u8,
                phase,
                message.clone(),
            )
            .await;
        }
    })
}
