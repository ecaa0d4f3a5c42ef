//! Debounced write-behind persistence of editor transform state.
//!
//! Rapid edits to a clip coalesce into a single database write after a
//! short quiet period, keyed by clip id. The explicit [`AutosaveQueue::flush`]
//! is called before a render request so the server never renders against
//! stale state -- that pairing is what keeps the single-clip render
//! server-authoritative.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use matchcut_core::types::DbId;
use matchcut_db::repositories::ClipRepo;

/// How often the worker scans for quiesced entries.
const SWEEP_INTERVAL_MS: u64 = 100;

/// Command channel depth; saves are tiny and the worker drains fast.
const QUEUE_CAPACITY: usize = 256;

type SaveResult = Result<(), String>;
type SaveFuture = Pin<Box<dyn Future<Output = SaveResult> + Send>>;

/// The persistence function the worker calls once an entry quiesces.
/// Abstracted so tests can observe writes without a database.
type Saver = Arc<dyn Fn(DbId, serde_json::Value) -> SaveFuture + Send + Sync>;

enum Command {
    Save {
        clip_id: DbId,
        transform: serde_json::Value,
    },
    Flush {
        clip_id: DbId,
        reply: oneshot::Sender<SaveResult>,
    },
}

/// Handle to the autosave worker task.
#[derive(Clone)]
pub struct AutosaveQueue {
    tx: mpsc::Sender<Command>,
}

impl AutosaveQueue {
    /// Spawn a worker persisting through [`ClipRepo::update_transform`].
    pub fn new(pool: PgPool, debounce: Duration) -> Self {
        let saver: Saver = Arc::new(move |clip_id, transform| {
            let pool = pool.clone();
            Box::pin(async move {
                ClipRepo::update_transform(&pool, clip_id, &transform)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            })
        });
        Self::with_saver(saver, debounce)
    }

    /// Spawn a worker with a custom persistence function (tests).
    pub fn with_saver(saver: Saver, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run_worker(rx, saver, debounce));
        Self { tx }
    }

    /// Enqueue a clip's latest transform. Overwrites any pending save for
    /// the same clip and restarts its quiet period (last write wins).
    pub async fn save(&self, clip_id: DbId, transform: serde_json::Value) {
        if self
            .tx
            .send(Command::Save { clip_id, transform })
            .await
            .is_err()
        {
            tracing::error!(clip_id, "Autosave worker is gone; edit not persisted");
        }
    }

    /// Persist any pending save for `clip_id` immediately.
    ///
    /// Returns once the write has happened (or when there was nothing
    /// pending). Render submission calls this first.
    pub async fn flush(&self, clip_id: DbId) -> SaveResult {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Flush { clip_id, reply }).await.is_err() {
            return Err("Autosave worker is gone".into());
        }
        rx.await.unwrap_or_else(|_| Err("Autosave worker dropped the flush".into()))
    }
}

async fn run_worker(mut rx: mpsc::Receiver<Command>, saver: Saver, debounce: Duration) {
    let mut pending: HashMap<DbId, (serde_json::Value, Instant)> = HashMap::new();
    let mut sweep = tokio::time::interval(Duration::from_millis(SWEEP_INTERVAL_MS));
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                match cmd {
                    Some(Command::Save { clip_id, transform }) => {
                        pending.insert(clip_id, (transform, Instant::now()));
                    }
                    Some(Command::Flush { clip_id, reply }) => {
                        let result = match pending.remove(&clip_id) {
                            Some((transform, _)) => saver(clip_id, transform).await,
                            None => Ok(()),
                        };
                        let _ = reply.send(result);
                    }
                    None => {
                        // Shutdown: drain whatever is still pending.
                        for (clip_id, (transform, _)) in pending.drain() {
                            if let Err(e) = saver(clip_id, transform).await {
                                tracing::error!(clip_id, error = %e, "Autosave drain failed");
                            }
                        }
                        break;
                    }
                }
            }
            _ = sweep.tick() => {
                let now = Instant::now();
                let due: Vec<DbId> = pending
                    .iter()
                    .filter(|(_, (_, since))| now.duration_since(*since) >= debounce)
                    .map(|(id, _)| *id)
                    .collect();
                for clip_id in due {
                    if let Some((transform, _)) = pending.remove(&clip_id) {
                        if let Err(e) = saver(clip_id, transform).await {
                            tracing::error!(clip_id, error = %e, "Autosave write failed");
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    fn recording_saver() -> (Saver, Arc<Mutex<Vec<(DbId, serde_json::Value)>>>) {
        let log: Arc<Mutex<Vec<(DbId, serde_json::Value)>>> = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        let saver: Saver = Arc::new(move |clip_id, transform| {
            let log = Arc::clone(&log_clone);
            Box::pin(async move {
                log.lock().await.push((clip_id, transform));
                Ok(())
            })
        });
        (saver, log)
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_coalesce_into_one_write() {
        let (saver, log) = recording_saver();
        let queue = AutosaveQueue::with_saver(saver, Duration::from_millis(500));

        queue.save(1, serde_json::json!({"rev": 1})).await;
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(200)).await;
        queue.save(1, serde_json::json!({"rev": 2})).await;
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(200)).await;
        queue.save(1, serde_json::json!({"rev": 3})).await;
        tokio::task::yield_now().await;

        // Nothing persisted yet: every save restarted the quiet period.
        assert!(log.lock().await.is_empty());

        tokio::time::advance(Duration::from_millis(700)).await;
        tokio::task::yield_now().await;

        let written = log.lock().await;
        assert_eq!(written.len(), 1, "rapid edits must coalesce");
        assert_eq!(written[0].1["rev"], 3, "last write wins");
    }

    #[tokio::test(start_paused = true)]
    async fn flush_persists_immediately() {
        let (saver, log) = recording_saver();
        let queue = AutosaveQueue::with_saver(saver, Duration::from_secs(60));

        queue.save(7, serde_json::json!({"v": "pending"})).await;
        queue.flush(7).await.unwrap();

        let written = log.lock().await;
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].0, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_with_nothing_pending_is_ok() {
        let (saver, log) = recording_saver();
        let queue = AutosaveQueue::with_saver(saver, Duration::from_secs(60));

        queue.flush(42).await.unwrap();
        assert!(log.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn clips_debounce_independently() {
        let (saver, log) = recording_saver();
        let queue = AutosaveQueue::with_saver(saver, Duration::from_millis(300));

        queue.save(1, serde_json::json!({"clip": 1})).await;
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(200)).await;
        queue.save(2, serde_json::json!({"clip": 2})).await;
        tokio::task::yield_now().await;

        // Clip 1 quiesces first.
        tokio::time::advance(Duration::from_millis(150)).await;
        tokio::task::yield_now().await;
        assert_eq!(log.lock().await.len(), 1);

        tokio::time::advance(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert_eq!(log.lock().await.len(), 2);
    }
}
