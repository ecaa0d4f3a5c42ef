//! Matchcut render-progress event infrastructure.
//!
//! One internal event log per render job with two consumption adapters:
//!
//! - [`ProgressHub::subscribe`] -- live fan-out: replay of the log so far
//!   plus a `tokio::sync::broadcast` stream of everything after it.
//! - [`ProgressHub::snapshot`] -- latest-state pull view for callers that
//!   cannot hold a push subscription.
//!
//! Both adapters observe the same per-job sequence: monotonically
//! non-decreasing percent, exactly one terminal event, nothing after it.

pub mod hub;

pub use hub::{JobEvent, JobSnapshot, ProgressHub, RenderPhase};
