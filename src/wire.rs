#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::error::{MirrorError, Result};
use crate::types::{Agent, Event, EventId, Lease, Message, Task};
use serde::{Deserialize, Serialize};

/// Full-state replacement of the mirrored collections.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    pub highest_event_id: EventId,
    pub agents: Vec<Agent>,
    pub tasks: Vec<Task>,
    pub leases: Vec<Lease>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Event>,
}

/// Whole-table refresh for one subscription scope. The `events` scope is a
/// recent slice of the log, not a replacement.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "scope", content = "data", rename_all = "lowercase")]
pub enum ScopeUpdate {
    Agents(Vec<Agent>),
    Tasks(Vec<Task>),
    Leases(Vec<Lease>),
    Messages(Vec<Message>),
    Events(Vec<Event>),
}

impl ScopeUpdate {
    #[must_use]
    pub const fn scope(&self) -> &'static str {
        match self {
            Self::Agents(_) => "agents",
            Self::Tasks(_) => "tasks",
            Self::Leases(_) => "leases",
            Self::Messages(_) => "messages",
            Self::Events(_) => "events",
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Agents(rows) => rows.len(),
            Self::Tasks(rows) => rows.len(),
            Self::Leases(rows) => rows.len(),
            Self::Messages(rows) => rows.len(),
            Self::Events(rows) => rows.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Frames the backend sends over the realtime channel.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Inbound {
    Snapshot(SnapshotFrame),
    Event {
        data: Event,
    },
    Update(ScopeUpdate),
    Connected {
        #[serde(default, alias = "clientId")]
        client_id: Option<String>,
    },
    Subscribed {
        #[serde(default)]
        subscriptions: Vec<String>,
    },
    Unsubscribed {
        #[serde(default)]
        subscriptions: Vec<String>,
    },
    Pong {
        #[serde(default)]
        timestamp: Option<String>,
    },
    Error {
        error: String,
    },
}

impl Inbound {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::Event { .. } => "event",
            Self::Update(_) => "update",
            Self::Connected { .. } => "connected",
            Self::Subscribed { .. } => "subscribed",
            Self::Unsubscribed { .. } => "unsubscribed",
            Self::Pong { .. } => "pong",
            Self::Error { .. } => "error",
        }
    }
}

/// Frames this client sends back to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outbound {
    Subscribe { scopes: Vec<String> },
    Ping,
    Resync {
        #[serde(rename = "requestId")]
        request_id: u64,
    },
}

impl Outbound {
    /// # Errors
    /// Returns `MirrorError::SerializationError` if encoding fails.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(MirrorError::from)
    }
}

/// Decodes one text frame.
///
/// # Errors
/// Returns `MirrorError::MalformedMessage` for invalid JSON, unknown frame
/// types, or records missing required fields.
pub fn parse_inbound(text: &str) -> Result<Inbound> {
    serde_json::from_str(text).map_err(|e| {
        MirrorError::MalformedMessage(format!("{e} (frame: {})", preview(text)))
    })
}

fn preview(text: &str) -> String {
    const MAX: usize = 96;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::{parse_inbound, Inbound, Outbound, ScopeUpdate};
    use crate::error::MirrorError;
    use crate::types::{EventId, EventKind, TaskId};

    #[test]
    fn parses_event_frame_with_nested_event_type() {
        let frame = parse_inbound(
            r#"{"type":"event","data":{"id":1,"createdAt":"2025-01-01T00:00:00Z","type":"task.claimed","taskId":"T1","actorAgentId":"A1"}}"#,
        )
        .unwrap();
        let Inbound::Event { data } = frame else {
            panic!("expected event frame");
        };
        assert_eq!(data.id, EventId::new(1));
        assert_eq!(data.kind, EventKind::TaskClaimed);
        assert_eq!(data.task_id, Some(TaskId::new("T1")));
    }

    #[test]
    fn parses_snapshot_with_optional_collections_absent() {
        let frame = parse_inbound(
            r#"{"type":"snapshot","highestEventId":41,"agents":[],"tasks":[{"id":"T1","status":"ready"}],"leases":[]}"#,
        )
        .unwrap();
        let Inbound::Snapshot(snapshot) = frame else {
            panic!("expected snapshot frame");
        };
        assert_eq!(snapshot.highest_event_id, EventId::new(41));
        assert!(snapshot.messages.is_none());
        assert!(snapshot.request_id.is_none());
        assert_eq!(snapshot.tasks.len(), 1);
    }

    #[test]
    fn server_control_frames_are_recognized() {
        let connected =
            parse_inbound(r#"{"type":"connected","client_id":"WSAB12CD34","subscriptions":[],"timestamp":"x"}"#)
                .unwrap();
        assert_eq!(connected.label(), "connected");
        let pong = parse_inbound(r#"{"type":"pong","timestamp":"2025-01-01T00:00:00"}"#).unwrap();
        assert_eq!(pong.label(), "pong");
    }

    #[test]
    fn scope_update_frames_decode_per_scope() {
        let frame = parse_inbound(
            r#"{"type":"update","scope":"agents","data":[{"id":"A1","status":"online"}],"timestamp":"2025-01-01T00:00:00"}"#,
        )
        .unwrap();
        let Inbound::Update(ScopeUpdate::Agents(agents)) = frame else {
            panic!("expected agents update");
        };
        assert_eq!(agents.len(), 1);

        let leases = parse_inbound(r#"{"type":"update","scope":"leases","data":[]}"#).unwrap();
        assert_eq!(leases.label(), "update");
        let Inbound::Update(update) = leases else {
            panic!("expected update frame");
        };
        assert_eq!(update.scope(), "leases");
        assert!(update.is_empty());

        let unsubscribed = parse_inbound(
            r#"{"type":"unsubscribed","subscriptions":["tasks"],"timestamp":"2025-01-01T00:00:00"}"#,
        )
        .unwrap();
        assert_eq!(unsubscribed.label(), "unsubscribed");
    }

    #[test]
    fn update_with_unknown_scope_or_bad_rows_is_malformed() {
        for raw in [
            r#"{"type":"update","scope":"weather","data":[]}"#,
            r#"{"type":"update","scope":"tasks","data":[{"title":"no id"}]}"#,
            r#"{"type":"update","scope":"agents"}"#,
        ] {
            let err = parse_inbound(raw).unwrap_err();
            assert!(matches!(err, MirrorError::MalformedMessage(_)), "{raw}");
        }
    }

    #[test]
    fn malformed_frames_are_reported_not_panicked() {
        for raw in [
            "not json",
            r#"{"type":"bogus"}"#,
            r#"{"type":"snapshot","highestEventId":1}"#,
            r#"{"type":"event","data":{"id":-3,"createdAt":"2025-01-01T00:00:00Z","type":"x"}}"#,
        ] {
            let err = parse_inbound(raw).unwrap_err();
            assert!(matches!(err, MirrorError::MalformedMessage(_)), "{raw}");
        }
    }

    #[test]
    fn outbound_frames_use_backend_field_names() {
        assert_eq!(
            Outbound::Resync { request_id: 3 }.encode().unwrap(),
            r#"{"type":"resync","requestId":3}"#
        );
        assert_eq!(Outbound::Ping.encode().unwrap(), r#"{"type":"ping"}"#);
        assert_eq!(
            Outbound::Subscribe {
                scopes: vec!["all".to_string()]
            }
            .encode()
            .unwrap(),
            r#"{"type":"subscribe","scopes":["all"]}"#
        );
    }
}
