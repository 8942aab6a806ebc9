use super::identifiers::{AgentId, MessageId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSeverity {
    Info,
    Warning,
    Handoff,
    Blocker,
}

impl MessageSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Handoff => "handoff",
            Self::Blocker => "blocker",
        }
    }
}

impl TryFrom<&str> for MessageSeverity {
    type Error = String;

    fn try_from(value: &str) -> std::result::Result<Self, String> {
        match value {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "handoff" => Ok(Self::Handoff),
            "blocker" => Ok(Self::Blocker),
            _ => Err(format!("Unknown message severity: {}", value)),
        }
    }
}

/// Addressed inter-agent note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub from: AgentId,
    #[serde(default)]
    pub to: Option<AgentId>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub severity: Option<MessageSeverity>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}
