#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! The single writer. `SyncStore` owns the reconciler and the connection
//! tracker; every state change ends in exactly one published `StoreView`.

use crate::config::ReconnectPolicy;
use crate::connection::{ConnectionStatus, ConnectionTracker, ReconnectDecision};
use crate::error::MirrorError;
use crate::query::{StoreHandle, StoreView};
use crate::reconciler::{ApplyOutcome, IngestStats, Reconciler, SnapshotRequest};
use crate::wire::{parse_inbound, Inbound};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

/// Result of ingesting one raw frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub outcome: ApplyOutcome,
    /// Version published for this frame, if any.
    pub published: Option<u64>,
}

impl IngestReport {
    /// Snapshot request the caller must forward to the backend.
    #[must_use]
    pub const fn resync(&self) -> Option<SnapshotRequest> {
        self.outcome.resync()
    }
}

#[derive(Debug)]
pub struct SyncStore {
    reconciler: Reconciler,
    tracker: ConnectionTracker,
    version: u64,
    publisher: watch::Sender<Arc<StoreView>>,
}

impl SyncStore {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> (Self, StoreHandle) {
        let reconciler = Reconciler::new();
        let tracker = ConnectionTracker::new(policy);
        let initial = StoreView::new(
            0,
            reconciler.tables().clone(),
            tracker.status().clone(),
            reconciler.stats(),
            reconciler.last_applied(),
            Utc::now(),
        );
        let (publisher, rx) = watch::channel(Arc::new(initial));
        (
            Self {
                reconciler,
                tracker,
                version: 0,
                publisher,
            },
            StoreHandle::new(rx),
        )
    }

    /// Another independent subscriber.
    #[must_use]
    pub fn handle(&self) -> StoreHandle {
        StoreHandle::new(self.publisher.subscribe())
    }

    #[must_use]
    pub fn current(&self) -> Arc<StoreView> {
        Arc::clone(&self.publisher.borrow())
    }

    #[must_use]
    pub const fn connection(&self) -> &ConnectionStatus {
        self.tracker.status()
    }

    #[must_use]
    pub const fn stats(&self) -> IngestStats {
        self.reconciler.stats()
    }

    #[must_use]
    pub const fn awaiting_snapshot(&self) -> bool {
        self.reconciler.awaiting_snapshot()
    }

    #[must_use]
    pub const fn pending_request(&self) -> Option<u64> {
        self.reconciler.pending_request()
    }

    /// Decodes and applies one text frame, then publishes the new version.
    /// Control frames change nothing readers can see and publish nothing.
    pub fn ingest_text(&mut self, text: &str, now: DateTime<Utc>) -> IngestReport {
        match parse_inbound(text) {
            Ok(frame) => self.ingest(frame, now),
            Err(err) => {
                self.reconciler.record_malformed(&err);
                IngestReport {
                    outcome: ApplyOutcome::Rejected {
                        reason: err.to_string(),
                    },
                    published: Some(self.publish(now)),
                }
            }
        }
    }

    pub fn ingest(&mut self, frame: Inbound, now: DateTime<Utc>) -> IngestReport {
        let outcome = self.reconciler.apply(frame);
        if outcome.is_applied() {
            self.tracker.record_sync(now);
        }
        let published = match outcome {
            ApplyOutcome::Control { .. } => None,
            _ => Some(self.publish(now)),
        };
        IngestReport { outcome, published }
    }

    /// Counts a frame the transport could not deliver as text.
    pub fn record_malformed(&mut self, error: &MirrorError, now: DateTime<Utc>) {
        self.reconciler.record_malformed(error);
        self.publish(now);
    }

    /// Recomputes time-dependent status (lease expiry, in-progress).
    pub fn tick(&mut self, now: DateTime<Utc>) -> u64 {
        self.publish(now)
    }

    pub fn request_snapshot(&mut self) -> SnapshotRequest {
        self.reconciler.request_snapshot()
    }

    pub fn begin_connect(&mut self, now: DateTime<Utc>) {
        self.tracker.begin_connect();
        self.publish(now);
    }

    /// Opens a new connection epoch and returns the snapshot request that
    /// must precede incremental delivery.
    pub fn on_connected(&mut self, now: DateTime<Utc>) -> SnapshotRequest {
        self.tracker.connected();
        self.reconciler.begin_epoch();
        let request = self.reconciler.request_snapshot();
        self.publish(now);
        request
    }

    pub fn on_lost(&mut self, reason: &str, now: DateTime<Utc>) -> ReconnectDecision {
        let decision = self.tracker.lost(reason);
        self.publish(now);
        decision
    }

    pub fn manual_retry(&mut self, now: DateTime<Utc>) {
        self.tracker.manual_retry();
        self.publish(now);
    }

    pub fn teardown(&mut self, now: DateTime<Utc>) {
        self.tracker.teardown();
        self.publish(now);
    }

    fn publish(&mut self, now: DateTime<Utc>) -> u64 {
        self.version = self.version.saturating_add(1);
        let view = StoreView::new(
            self.version,
            self.reconciler.tables().clone(),
            self.tracker.status().clone(),
            self.reconciler.stats(),
            self.reconciler.last_applied(),
            now,
        );
        self.publisher.send_replace(Arc::new(view));
        self.version
    }
}
