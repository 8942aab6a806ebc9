use super::identifiers::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Agent liveness as derived by the server from heartbeat recency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Idle,
    #[default]
    Offline,
    #[serde(other)]
    Unknown,
}

impl AgentStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Idle => "idle",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Online)
    }
}

impl TryFrom<&str> for AgentStatus {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "online" => Ok(Self::Online),
            "idle" => Ok(Self::Idle),
            "offline" => Ok(Self::Offline),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Unknown agent status: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub registered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_meta: Option<SessionMeta>,
}

impl Agent {
    #[must_use]
    pub fn new(id: AgentId, status: AgentStatus, seen_at: DateTime<Utc>) -> Self {
        Self {
            id,
            display_name: None,
            capabilities: BTreeSet::new(),
            status,
            registered_at: Some(seen_at),
            last_seen_at: Some(seen_at),
            session_meta: None,
        }
    }

    /// Produces the next version of this agent after a liveness event.
    #[must_use]
    pub fn with_presence(mut self, status: AgentStatus, seen_at: DateTime<Utc>) -> Self {
        self.status = status;
        self.last_seen_at = Some(seen_at);
        self
    }

    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or_else(|| self.id.value())
    }
}

#[cfg(test)]
mod tests {
    use super::{Agent, AgentStatus};
    use crate::types::AgentId;
    use chrono::{TimeZone, Utc};

    #[test]
    fn status_roundtrip_preserves_values() {
        for status in [AgentStatus::Online, AgentStatus::Idle, AgentStatus::Offline] {
            assert_eq!(AgentStatus::try_from(status.as_str()), Ok(status));
        }
        assert!(AgentStatus::try_from("sleeping").is_err());
    }

    #[test]
    fn unrecognized_wire_status_maps_to_unknown() -> Result<(), serde_json::Error> {
        let agent: Agent = serde_json::from_str(r#"{"id":"A1","status":"hibernating"}"#)?;
        assert_eq!(agent.status, AgentStatus::Unknown);
        assert!(!agent.status.is_active());
        Ok(())
    }

    #[test]
    fn presence_update_replaces_status_and_seen_at() {
        let joined = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single();
        let later = Utc.with_ymd_and_hms(2025, 1, 1, 0, 5, 0).single();
        let (Some(joined), Some(later)) = (joined, later) else {
            return;
        };
        let agent = Agent::new(AgentId::new("A1"), AgentStatus::Online, joined)
            .with_presence(AgentStatus::Offline, later);
        assert_eq!(agent.status, AgentStatus::Offline);
        assert_eq!(agent.last_seen_at, Some(later));
        assert_eq!(agent.registered_at, Some(joined));
        assert_eq!(agent.label(), "A1");
    }
}
