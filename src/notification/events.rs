use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionStarted,
    SessionLoaded,
    SessionClosed,
    SessionDeleted,
    SessionImported,
    NewInfringement,
    UpdateInfringement,
    DeleteInfringement,
    PenaltyApplied,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStarted => "session_started",
            Self::SessionLoaded => "session_loaded",
            Self::SessionClosed => "session_closed",
            Self::SessionDeleted => "session_deleted",
            Self::SessionImported => "session_imported",
            Self::NewInfringement => "new_infringement",
            Self::UpdateInfringement => "update_infringement",
            Self::DeleteInfringement => "delete_infringement",
            Self::PenaltyApplied => "penalty_applied",
        }
    }

    pub fn is_session_level(&self) -> bool {
        matches!(
            self,
            Self::SessionStarted
                | Self::SessionLoaded
                | Self::SessionClosed
                | Self::SessionDeleted
                | Self::SessionImported
        )
    }
}

/// State change pushed to observers once the underlying write has committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StewardEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default)]
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl StewardEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            session: None,
            data: Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// One-line summary for the event log.
    pub fn summary(&self) -> String {
        match &self.data {
            Value::Null => self.event_type.as_str().to_string(),
            data => format!("{}: {}", self.event_type.as_str(), data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let event = StewardEvent::new(EventType::NewInfringement)
            .with_session("Club Night")
            .with_data(json!({"id": 4, "kart_number": 12}));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "new_infringement");
        assert_eq!(value["session"], "Club Night");
        assert_eq!(value["data"]["kart_number"], 12);
    }

    #[test]
    fn test_serde_name_matches_as_str() {
        for event_type in [
            EventType::SessionStarted,
            EventType::SessionImported,
            EventType::UpdateInfringement,
            EventType::PenaltyApplied,
        ] {
            let serialized = serde_json::to_value(event_type).unwrap();
            assert_eq!(serialized, event_type.as_str());
        }
    }
}
