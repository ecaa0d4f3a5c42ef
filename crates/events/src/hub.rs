//! Per-job progress hub backed by `tokio::sync::broadcast` fan-out plus a
//! replayable per-job event log.
//!
//! The hub is the single source of truth for job progress: the WebSocket
//! push channel and the `GET /jobs/{id}` poll endpoint are both adapters
//! over the same log, so they can never disagree. Publishing never blocks
//! on encoder work and never waits for subscribers.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};

use matchcut_core::types::DbId;

/// Per-job broadcast buffer. Renders emit at most a few hundred events;
/// a lagging subscriber past this depth only loses intermediate percents.
const JOB_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Which stage of a render a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderPhase {
    /// Job accepted, no work started.
    Queued,
    /// Per-clip renders of a multi-clip job. Cached clips are reported
    /// here too, which is why percent can jump quickly in this phase.
    Clips,
    /// Single-clip (or per-clip) encoding.
    Encode,
    /// Concatenation/transition assembly of a multi-clip job.
    Stitch,
    /// Highlight-effect second pass.
    Overlay,
    /// Output registration and bookkeeping.
    Finalize,
}

/// One event in a job's progress stream.
///
/// Serialized shapes match the wire protocol: a `type` tag of
/// `"progress"`, `"complete"`, or `"error"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Progress {
        percent: u8,
        phase: RenderPhase,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Complete {
        result_asset_id: DbId,
    },
    Error {
        message: String,
    },
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Complete { .. } | JobEvent::Error { .. })
    }
}

/// Latest-state view of a job's stream for the poll adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub percent: u8,
    pub phase: RenderPhase,
    pub message: Option<String>,
    /// The terminal event, once one has been published.
    pub terminal: Option<JobEvent>,
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// Mutable per-job stream state, guarded as one unit so the log order and
/// the broadcast order can never diverge.
struct JobLog {
    events: Vec<JobEvent>,
    last_percent: u8,
    terminal: bool,
}

struct JobChannel {
    sender: broadcast::Sender<JobEvent>,
    log: Mutex<JobLog>,
}

/// Fan-out progress hub for all in-flight (and recently finished) jobs.
///
/// Designed to be wrapped in `Arc` and shared across the application.
pub struct ProgressHub {
    jobs: RwLock<HashMap<DbId, Arc<JobChannel>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a job's stream. Called by the orchestrator at job-creation
    /// time, before any work begins, so subscribers always find the stream.
    pub async fn register(&self, job_id: DbId) {
        let (sender, _) = broadcast::channel(JOB_CHANNEL_CAPACITY);
        let channel = Arc::new(JobChannel {
            sender,
            log: Mutex::new(JobLog {
                events: Vec::new(),
                last_percent: 0,
                terminal: false,
            }),
        });
        self.jobs.write().await.insert(job_id, channel);
    }

    /// Append an event to a job's log and fan it out to live subscribers.
    ///
    /// Percent is clamped monotonically non-decreasing; events published
    /// after the terminal event are dropped (with a warning -- that is an
    /// orchestrator bug, not a caller error). Unknown job ids are ignored.
    pub async fn publish(&self, job_id: DbId, event: JobEvent) {
        let Some(channel) = self.jobs.read().await.get(&job_id).cloned() else {
            tracing::warn!(job_id, "Progress event for unregistered job dropped");
            return;
        };

        let mut log = channel.log.lock().await;
        if log.terminal {
            tracing::warn!(job_id, ?event, "Event after terminal dropped");
            return;
        }

        let event = match event {
            JobEvent::Progress { percent, phase, message } => {
                let clamped = percent.min(100).max(log.last_percent);
                log.last_percent = clamped;
                JobEvent::Progress { percent: clamped, phase, message }
            }
            terminal => {
                log.terminal = true;
                terminal
            }
        };

        log.events.push(event.clone());
        // Zero receivers is normal (nobody is watching); ignore the error.
        let _ = channel.sender.send(event);
    }

    /// Live-subscriber adapter: the log so far (for replay) plus a receiver
    /// for everything published afterward.
    ///
    /// Concurrent subscribers each get the full sequence (fan-out, not
    /// queue-consume). Returns `None` for unknown job ids.
    pub async fn subscribe(
        &self,
        job_id: DbId,
    ) -> Option<(Vec<JobEvent>, broadcast::Receiver<JobEvent>)> {
        let channel = self.jobs.read().await.get(&job_id).cloned()?;
        // Hold the log lock while subscribing so no event lands in both
        // (or neither) the replay and the live stream.
        let log = channel.log.lock().await;
        let receiver = channel.sender.subscribe();
        Some((log.events.clone(), receiver))
    }

    /// Poll adapter: the latest state of a job's stream.
    pub async fn snapshot(&self, job_id: DbId) -> Option<JobSnapshot> {
        let channel = self.jobs.read().await.get(&job_id).cloned()?;
        let log = channel.log.lock().await;

        let mut snapshot = JobSnapshot {
            percent: 0,
            phase: RenderPhase::Queued,
            message: None,
            terminal: None,
        };
        for event in &log.events {
            match event {
                JobEvent::Progress { percent, phase, message } => {
                    snapshot.percent = *percent;
                    snapshot.phase = *phase;
                    snapshot.message = message.clone();
                }
                terminal => {
                    if matches!(terminal, JobEvent::Complete { .. }) {
                        snapshot.percent = 100;
                    }
                    snapshot.terminal = Some(terminal.clone());
                }
            }
        }
        Some(snapshot)
    }

    /// Drop a finished job's stream. The job row remains in the database
    /// as the audit record; only the in-memory log is released.
    pub async fn evict(&self, job_id: DbId) {
        self.jobs.write().await.remove(&job_id);
    }

    /// Number of registered job streams (used by tests and diagnostics).
    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(percent: u8, phase: RenderPhase) -> JobEvent {
        JobEvent::Progress {
            percent,
            phase,
            message: None,
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_events_in_order() {
        let hub = ProgressHub::new();
        hub.register(1).await;
        let (replay, mut rx) = hub.subscribe(1).await.unwrap();
        assert!(replay.is_empty());

        hub.publish(1, progress(10, RenderPhase::Encode)).await;
        hub.publish(1, progress(60, RenderPhase::Encode)).await;
        hub.publish(1, JobEvent::Complete { result_asset_id: 42 }).await;

        assert_eq!(rx.recv().await.unwrap(), progress(10, RenderPhase::Encode));
        assert_eq!(rx.recv().await.unwrap(), progress(60, RenderPhase::Encode));
        assert_eq!(
            rx.recv().await.unwrap(),
            JobEvent::Complete { result_asset_id: 42 }
        );
    }

    #[tokio::test]
    async fn percent_is_clamped_monotonically() {
        let hub = ProgressHub::new();
        hub.register(1).await;
        let (_, mut rx) = hub.subscribe(1).await.unwrap();

        hub.publish(1, progress(50, RenderPhase::Encode)).await;
        hub.publish(1, progress(30, RenderPhase::Encode)).await; // regression
        hub.publish(1, progress(70, RenderPhase::Encode)).await;

        let mut observed = Vec::new();
        for _ in 0..3 {
            if let JobEvent::Progress { percent, .. } = rx.recv().await.unwrap() {
                observed.push(percent);
            }
        }
        assert_eq!(observed, vec![50, 50, 70]);
    }

    #[tokio::test]
    async fn nothing_is_delivered_after_the_terminal_event() {
        let hub = ProgressHub::new();
        hub.register(1).await;
        let (_, mut rx) = hub.subscribe(1).await.unwrap();

        hub.publish(1, JobEvent::Error { message: "encoder exited 1".into() }).await;
        hub.publish(1, progress(99, RenderPhase::Encode)).await;
        hub.publish(1, JobEvent::Complete { result_asset_id: 7 }).await;

        assert_eq!(
            rx.recv().await.unwrap(),
            JobEvent::Error { message: "encoder exited 1".into() }
        );
        // The channel is still open (the hub keeps the sender), so a
        // properly quiesced stream simply has nothing else buffered.
        assert!(rx.try_recv().is_err());

        let snap = hub.snapshot(1).await.unwrap();
        assert_eq!(snap.terminal, Some(JobEvent::Error { message: "encoder exited 1".into() }));
    }

    #[tokio::test]
    async fn concurrent_subscribers_see_the_same_sequence() {
        let hub = ProgressHub::new();
        hub.register(1).await;
        let (_, mut rx1) = hub.subscribe(1).await.unwrap();
        let (_, mut rx2) = hub.subscribe(1).await.unwrap();

        hub.publish(1, progress(25, RenderPhase::Clips)).await;

        assert_eq!(rx1.recv().await.unwrap(), progress(25, RenderPhase::Clips));
        assert_eq!(rx2.recv().await.unwrap(), progress(25, RenderPhase::Clips));
    }

    #[tokio::test]
    async fn late_subscriber_replays_the_log() {
        let hub = ProgressHub::new();
        hub.register(1).await;

        hub.publish(1, progress(40, RenderPhase::Encode)).await;
        hub.publish(1, JobEvent::Complete { result_asset_id: 9 }).await;

        let (replay, _) = hub.subscribe(1).await.unwrap();
        assert_eq!(replay.len(), 2);
        assert!(replay[1].is_terminal());
    }

    #[tokio::test]
    async fn snapshot_reflects_latest_progress_and_terminal() {
        let hub = ProgressHub::new();
        hub.register(1).await;

        hub.publish(1, progress(10, RenderPhase::Clips)).await;
        hub.publish(1, progress(80, RenderPhase::Stitch)).await;
        let snap = hub.snapshot(1).await.unwrap();
        assert_eq!(snap.percent, 80);
        assert_eq!(snap.phase, RenderPhase::Stitch);
        assert!(snap.terminal.is_none());

        hub.publish(1, JobEvent::Complete { result_asset_id: 3 }).await;
        let snap = hub.snapshot(1).await.unwrap();
        assert_eq!(snap.percent, 100);
        assert_eq!(snap.terminal, Some(JobEvent::Complete { result_asset_id: 3 }));
    }

    #[tokio::test]
    async fn unknown_job_ids_are_handled_gracefully() {
        let hub = ProgressHub::new();
        assert!(hub.subscribe(99).await.is_none());
        assert!(hub.snapshot(99).await.is_none());
        // Publishing to an unknown id must not panic.
        hub.publish(99, progress(10, RenderPhase::Encode)).await;
    }

    #[tokio::test]
    async fn evict_releases_the_stream() {
        let hub = ProgressHub::new();
        hub.register(1).await;
        assert_eq!(hub.job_count().await, 1);
        hub.evict(1).await;
        assert_eq!(hub.job_count().await, 0);
        assert!(hub.snapshot(1).await.is_none());
    }

    #[test]
    fn wire_shapes_match_the_protocol() {
        let progress = serde_json::to_value(progress(42, RenderPhase::Clips)).unwrap();
        assert_eq!(progress["type"], "progress");
        assert_eq!(progress["percent"], 42);
        assert_eq!(progress["phase"], "clips");

        let complete = serde_json::to_value(JobEvent::Complete { result_asset_id: 7 }).unwrap();
        assert_eq!(complete["type"], "complete");
        assert_eq!(complete["result_asset_id"], 7);

        let error = serde_json::to_value(JobEvent::Error { message: "boom".into() }).unwrap();
        assert_eq!(error["type"], "error");
        assert_eq!(error["message"], "boom");
    }
}
