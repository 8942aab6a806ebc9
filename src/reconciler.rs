#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Applies inbound frames to the entity tables under the ordering rules:
//! events must arrive with consecutive ids, duplicates are ignored, and any
//! gap is healed by requesting a fresh snapshot rather than by partial repair.

use crate::error::{MirrorError, Result};
use crate::tables::EntityTables;
use crate::types::{
    Agent, AgentId, AgentStatus, Event, EventId, EventKind, Lease, LeaseId, Message, MessageId,
    MessageSeverity, Task, TaskId, TaskStatus, DEFAULT_LEASE_TTL_SECONDS,
};
use crate::wire::{Inbound, ScopeUpdate, SnapshotFrame};
use chrono::Duration;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Token identifying one outstanding snapshot request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnapshotRequest {
    pub request_id: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStats {
    pub snapshots: u64,
    pub events_applied: u64,
    pub duplicates: u64,
    pub dropped_awaiting_snapshot: u64,
    pub gaps: u64,
    pub malformed: u64,
    pub superseded_snapshots: u64,
    pub scope_updates: u64,
    pub unresolved_references: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    SnapshotApplied {
        highest_event_id: EventId,
    },
    SnapshotSuperseded {
        request_id: u64,
    },
    EventApplied {
        id: EventId,
        resync: Option<SnapshotRequest>,
    },
    UpdateApplied {
        scope: &'static str,
        records: usize,
    },
    Duplicate {
        id: EventId,
    },
    AwaitingSnapshot {
        id: EventId,
    },
    GapDetected {
        expected: EventId,
        received: EventId,
        resync: Option<SnapshotRequest>,
    },
    Rejected {
        reason: String,
    },
    Control {
        label: &'static str,
    },
    ServerError {
        message: String,
    },
}

impl ApplyOutcome {
    /// True when the entity tables changed.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(
            self,
            Self::SnapshotApplied { .. } | Self::EventApplied { .. } | Self::UpdateApplied { .. }
        )
    }

    /// The snapshot request the caller must send, if this frame issued one.
    #[must_use]
    pub const fn resync(&self) -> Option<SnapshotRequest> {
        match self {
            Self::EventApplied { resync, .. } | Self::GapDetected { resync, .. } => *resync,
            _ => None,
        }
    }
}

enum Resolution {
    Complete,
    Unresolved(MirrorError),
}

fn unresolved(what: &str) -> Resolution {
    Resolution::Unresolved(MirrorError::ConsistencyError(format!("unknown {what}")))
}

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    tables: EntityTables,
    last_applied: Option<EventId>,
    pending_request: Option<u64>,
    latest_request: u64,
    stats: IngestStats,
}

impl Reconciler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn tables(&self) -> &EntityTables {
        &self.tables
    }

    #[must_use]
    pub const fn stats(&self) -> IngestStats {
        self.stats
    }

    #[must_use]
    pub const fn last_applied(&self) -> Option<EventId> {
        self.last_applied
    }

    /// Events are dropped until a snapshot establishes the cursor.
    #[must_use]
    pub const fn awaiting_snapshot(&self) -> bool {
        self.last_applied.is_none() || self.pending_request.is_some()
    }

    #[must_use]
    pub const fn pending_request(&self) -> Option<u64> {
        self.pending_request
    }

    /// Starts a new connection epoch. Tables are kept so readers still see
    /// the last known state, but event ids from the old epoch no longer count.
    pub fn begin_epoch(&mut self) {
        self.last_applied = None;
        self.pending_request = None;
    }

    /// Issues a new snapshot request, superseding any in flight.
    pub fn request_snapshot(&mut self) -> SnapshotRequest {
        self.latest_request = self.latest_request.saturating_add(1);
        self.pending_request = Some(self.latest_request);
        SnapshotRequest {
            request_id: self.latest_request,
        }
    }

    pub fn apply(&mut self, frame: Inbound) -> ApplyOutcome {
        match frame {
            Inbound::Snapshot(snapshot) => self.apply_snapshot(snapshot),
            Inbound::Event { data } => self.apply_event(data),
            Inbound::Update(update) => self.apply_update(update),
            Inbound::Error { error } => {
                warn!("Backend reported error: {}", error);
                ApplyOutcome::ServerError { message: error }
            }
            control => {
                debug!("Control frame {}", control.label());
                ApplyOutcome::Control {
                    label: control.label(),
                }
            }
        }
    }

    /// Counts a frame that failed to decode.
    pub fn record_malformed(&mut self, error: &MirrorError) {
        self.stats.malformed += 1;
        warn!("Dropped malformed frame: {}", error);
    }

    fn apply_snapshot(&mut self, snapshot: SnapshotFrame) -> ApplyOutcome {
        if let Some(request_id) = snapshot.request_id {
            if request_id < self.latest_request {
                self.stats.superseded_snapshots += 1;
                info!(
                    "Discarding snapshot for request {} superseded by request {}",
                    request_id, self.latest_request
                );
                return ApplyOutcome::SnapshotSuperseded { request_id };
            }
        }

        let highest = snapshot.highest_event_id;
        let mut next = self.tables.replaced_by_snapshot(
            snapshot.agents,
            snapshot.tasks,
            snapshot.leases,
            snapshot.messages,
        );
        for event in snapshot.events.into_iter().filter(|e| e.id <= highest) {
            let _ = next.append_event(event);
        }

        self.tables = next;
        self.last_applied = Some(highest);
        self.pending_request = None;
        self.stats.snapshots += 1;
        info!(
            "Applied snapshot at event {} ({} agents, {} leases)",
            highest,
            self.tables.agent_count(),
            self.tables.leases().count()
        );
        ApplyOutcome::SnapshotApplied {
            highest_event_id: highest,
        }
    }

    /// Replaces one table wholesale. Scope updates carry no event id, so
    /// the cursor is untouched and they apply even while a snapshot is
    /// outstanding. Log entries beyond the cursor are left for incremental
    /// delivery.
    fn apply_update(&mut self, update: ScopeUpdate) -> ApplyOutcome {
        let scope = update.scope();
        let records = update.len();
        let mut next = self.tables.clone();
        match update {
            ScopeUpdate::Agents(agents) => next.replace_agents(agents),
            ScopeUpdate::Tasks(tasks) => next.replace_tasks(tasks),
            ScopeUpdate::Leases(leases) => next.replace_leases(leases),
            ScopeUpdate::Messages(messages) => next.replace_messages(messages),
            ScopeUpdate::Events(events) => {
                for event in events {
                    let beyond_cursor = self.last_applied.is_some_and(|last| event.id > last);
                    if !beyond_cursor {
                        let _ = next.append_event(event);
                    }
                }
            }
        }

        self.tables = next;
        self.stats.scope_updates += 1;
        debug!("Applied {} update with {} records", scope, records);
        ApplyOutcome::UpdateApplied { scope, records }
    }

    fn apply_event(&mut self, event: Event) -> ApplyOutcome {
        let id = event.id;
        let last = match self.last_applied {
            Some(last) if self.pending_request.is_none() => last,
            _ => {
                self.stats.dropped_awaiting_snapshot += 1;
                debug!("Dropping event {} while awaiting snapshot", id);
                return ApplyOutcome::AwaitingSnapshot { id };
            }
        };

        if id <= last {
            self.stats.duplicates += 1;
            debug!("Ignoring duplicate event {} (last applied {})", id, last);
            return ApplyOutcome::Duplicate { id };
        }

        let expected = last.next();
        if id > expected {
            self.stats.gaps += 1;
            let request = self.request_snapshot();
            warn!(
                "Event gap: expected {}, received {}; requesting snapshot {}",
                expected, id, request.request_id
            );
            return ApplyOutcome::GapDetected {
                expected,
                received: id,
                resync: Some(request),
            };
        }

        let mut working = self.tables.clone();
        match apply_effect(&mut working, &event) {
            Ok(resolution) => {
                let _ = working.append_event(event);
                self.tables = working;
                self.last_applied = Some(id);
                self.stats.events_applied += 1;
                let resync = match resolution {
                    Resolution::Complete => None,
                    Resolution::Unresolved(err) => {
                        self.stats.unresolved_references += 1;
                        let request = self.request_snapshot();
                        warn!(
                            "Event {}: {}; requesting snapshot {}",
                            id, err, request.request_id
                        );
                        Some(request)
                    }
                };
                ApplyOutcome::EventApplied { id, resync }
            }
            Err(err) => {
                self.stats.malformed += 1;
                warn!("Rejected event {}: {}", id, err);
                ApplyOutcome::Rejected {
                    reason: err.to_string(),
                }
            }
        }
    }
}

fn require_actor(event: &Event) -> Result<&AgentId> {
    event.actor_agent_id.as_ref().ok_or_else(|| {
        MirrorError::MalformedMessage(format!("{} event {} has no actorAgentId", event.kind, event.id))
    })
}

fn require_task(event: &Event) -> Result<&TaskId> {
    event.task_id.as_ref().ok_or_else(|| {
        MirrorError::MalformedMessage(format!("{} event {} has no taskId", event.kind, event.id))
    })
}

fn apply_effect(tables: &mut EntityTables, event: &Event) -> Result<Resolution> {
    match &event.kind {
        EventKind::AgentJoined => upsert_presence(tables, event, AgentStatus::Online, true),
        EventKind::AgentHeartbeat => upsert_presence(tables, event, AgentStatus::Online, false),
        EventKind::AgentLeft => upsert_presence(tables, event, AgentStatus::Offline, false),
        EventKind::TaskClaimed => claim_task(tables, event),
        EventKind::TaskReleased => {
            let task_id = require_task(event)?;
            let _ = tables.release(task_id);
            Ok(task_resolution(tables, task_id))
        }
        EventKind::TaskDone => set_task_status(tables, event, TaskStatus::Done),
        EventKind::TaskVerified => set_task_status(tables, event, TaskStatus::Verified),
        EventKind::MessageSent => append_message(tables, event),
        EventKind::Unrecognized(raw) => {
            debug!("Event {} has unrecognized type {}", event.id, raw);
            Ok(Resolution::Complete)
        }
    }
}

fn task_resolution(tables: &EntityTables, task_id: &TaskId) -> Resolution {
    if tables.task(task_id).is_some() {
        Resolution::Complete
    } else {
        unresolved(&format!("task {task_id}"))
    }
}

fn upsert_presence(
    tables: &mut EntityTables,
    event: &Event,
    status: AgentStatus,
    joined: bool,
) -> Result<Resolution> {
    let actor = require_actor(event)?;
    let mut agent = tables.agent(actor).map_or_else(
        || Agent::new(actor.clone(), status, event.created_at),
        |existing| Agent::clone(existing).with_presence(status, event.created_at),
    );
    if joined {
        if let Some(name) = event.payload_str("displayName") {
            agent.display_name = Some(name.to_string());
        }
        let capabilities = event.payload_strings("capabilities");
        if !capabilities.is_empty() {
            agent.capabilities = capabilities.into_iter().collect();
        }
    }
    tables.upsert_agent(agent);
    Ok(Resolution::Complete)
}

fn claim_task(tables: &mut EntityTables, event: &Event) -> Result<Resolution> {
    let task_id = require_task(event)?;
    let agent_id = require_actor(event)?;
    let ttl_seconds = event
        .payload_i64("ttlSeconds")
        .unwrap_or(DEFAULT_LEASE_TTL_SECONDS);
    if ttl_seconds <= 0 {
        return Err(MirrorError::MalformedMessage(format!(
            "task.claimed event {} has non-positive ttlSeconds {ttl_seconds}",
            event.id
        )));
    }
    let expires_at = match event.payload_time("expiresAt") {
        Some(at) => at,
        None => Duration::try_seconds(ttl_seconds)
            .and_then(|ttl| event.created_at.checked_add_signed(ttl))
            .ok_or_else(|| {
                MirrorError::MalformedMessage(format!(
                    "task.claimed event {} has out-of-range ttlSeconds {ttl_seconds}",
                    event.id
                ))
            })?,
    };
    let lease_id = event.payload_str("leaseId").map_or_else(
        || LeaseId::new(format!("{task_id}@{}", event.id)),
        LeaseId::new,
    );

    let agent_known = tables.agent(agent_id).is_some();
    let superseded = tables.claim(Lease {
        lease_id,
        task_id: task_id.clone(),
        agent_id: agent_id.clone(),
        created_at: event.created_at,
        ttl_seconds,
        expires_at,
    });
    if let Some(previous) = superseded {
        debug!(
            "Lease {} on task {} superseded by event {}",
            previous.lease_id, task_id, event.id
        );
    }

    Ok(match task_resolution(tables, task_id) {
        Resolution::Complete if !agent_known => unresolved(&format!("agent {agent_id}")),
        resolution => resolution,
    })
}

fn set_task_status(
    tables: &mut EntityTables,
    event: &Event,
    status: TaskStatus,
) -> Result<Resolution> {
    let task_id = require_task(event)?;
    let Some(task) = tables.task(task_id).cloned() else {
        return Ok(unresolved(&format!("task {task_id}")));
    };
    tables.replace_task(Task::clone(&task).with_status(status, event.created_at));
    Ok(Resolution::Complete)
}

fn append_message(tables: &mut EntityTables, event: &Event) -> Result<Resolution> {
    let from = require_actor(event)?.clone();
    let id = event.payload_str("messageId").map_or_else(
        || MessageId::new(format!("evt-{}", event.id)),
        MessageId::new,
    );
    let to = event
        .target_agent_id
        .clone()
        .or_else(|| event.payload_str("to").map(AgentId::new));
    let severity = event
        .payload_str("severity")
        .and_then(|raw| MessageSeverity::try_from(raw).ok());

    tables.append_message(Message {
        id,
        created_at: Some(event.created_at),
        from,
        to,
        body: event.payload_str("body").unwrap_or_default().to_string(),
        task_id: event.task_id.clone(),
        subject: event.payload_str("subject").map(str::to_string),
        severity,
        read_at: None,
    });
    Ok(Resolution::Complete)
}
