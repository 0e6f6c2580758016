//! The derived agent record: one logical row per worker identity, mutated
//! in place as worker lifecycle events arrive.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attributes::join_hierarchy;
use crate::event::RouterEvent;
use crate::{truncate_millis, ContractError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentState {
    Active,
    Deleted,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Active => "Active",
            AgentState::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentState {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim() {
            "Active" => Ok(AgentState::Active),
            "Deleted" => Ok(AgentState::Deleted),
            other => Err(format!("Unknown agent state: {other}")),
        }
    }
}

/// Current identity and org placement of one worker. Deleted workers keep
/// their row, flipped to [`AgentState::Deleted`] with `date_left` stamped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRecord {
    pub agent_sid: String,
    /// External agent id carried on the worker attributes, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Roles list joined into one display string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name_in_hierarchy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_name_in_hierarchy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_3: Option<String>,
    pub state: AgentState,
    pub date_joined: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_left: Option<DateTime<Utc>>,
}

impl AgentRecord {
    /// Builds the record a worker event implies. `date_joined` is the event
    /// instant; [`AgentRecord::merged_onto`] restores the original join date
    /// when the record already exists.
    pub fn from_event(
        event: &RouterEvent,
        state: AgentState,
        hierarchy_separator: &str,
    ) -> Result<Self, ContractError> {
        let agent_sid = event
            .worker_sid
            .clone()
            .ok_or_else(|| ContractError::MissingWorkerSid {
                event_id: event.event_id.clone(),
            })?;
        let worker = &event.worker_attributes;
        let stamped = truncate_millis(event.timestamp);
        Ok(AgentRecord {
            agent_sid,
            agent_id: worker.agent_id.clone(),
            email: worker.email.clone(),
            role: worker.role_display(),
            manager: worker.manager.clone(),
            location: worker.location.clone(),
            phone: worker.phone.clone(),
            team_id: worker.team_id.clone(),
            team_name: worker.team_name.clone(),
            team_name_in_hierarchy: worker
                .team_name_in_hierarchy
                .as_ref()
                .and_then(|value| join_hierarchy(value, hierarchy_separator)),
            department_id: worker.department_id.clone(),
            department_name: worker.department_name.clone(),
            department_name_in_hierarchy: worker
                .department_name_in_hierarchy
                .as_ref()
                .and_then(|value| join_hierarchy(value, hierarchy_separator)),
            attribute_1: worker.agent_attribute_1.clone(),
            attribute_2: worker.agent_attribute_2.clone(),
            attribute_3: worker.agent_attribute_3.clone(),
            state,
            date_joined: stamped,
            date_left: match state {
                AgentState::Deleted => Some(stamped),
                AgentState::Active => None,
            },
        })
    }

    /// Applies this record over an existing one. Identity and state are
    /// replaced wholesale; only the original `date_joined` survives. An
    /// ACTIVE update clears a previously stamped `date_left`.
    pub fn merged_onto(mut self, existing: &AgentRecord) -> AgentRecord {
        self.date_joined = existing.date_joined;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use crate::{HIERARCHY_SEPARATOR, TASKROUTER_NAMESPACE};
    use serde_json::{json, Value};

    fn worker_event(event_type: &str, timestamp: &str, attributes: Value) -> RouterEvent {
        let envelope: Envelope = serde_json::from_value(json!({
            "id": "EV2000",
            "type": format!("com.twilio.taskrouter.{event_type}"),
            "data": { "payload": {
                "eventtype": event_type,
                "timestamp": timestamp,
                "worker_sid": "WK1",
                "worker_attributes": attributes.to_string()
            }}
        }))
        .expect("well-formed envelope");
        RouterEvent::from_envelope(&envelope, TASKROUTER_NAMESPACE).expect("projects")
    }

    #[test]
    fn builds_an_active_record_from_worker_attributes() {
        let event = worker_event(
            "worker.created",
            "2026-03-02T08:00:00.400Z",
            json!({
                "email": "ann@example.com",
                "roles": ["agent", "supervisor"],
                "team_id": "T1",
                "team_name_in_hierarchy": ["Sales", "EMEA"],
                "agent_attribute_1": "night-shift"
            }),
        );
        let record = AgentRecord::from_event(&event, AgentState::Active, HIERARCHY_SEPARATOR)
            .expect("record");
        assert_eq!(record.agent_sid, "WK1");
        assert_eq!(record.email.as_deref(), Some("ann@example.com"));
        assert_eq!(record.role.as_deref(), Some("agent, supervisor"));
        assert_eq!(
            record.team_name_in_hierarchy.as_deref(),
            Some("Sales \u{25b8} EMEA")
        );
        assert_eq!(record.attribute_1.as_deref(), Some("night-shift"));
        assert_eq!(record.state, AgentState::Active);
        assert_eq!(record.date_joined.timestamp_subsec_millis(), 0);
        assert_eq!(record.date_left, None);
    }

    #[test]
    fn deletion_stamps_date_left() {
        let event = worker_event("worker.deleted", "2026-03-02T18:00:00Z", json!({}));
        let record = AgentRecord::from_event(&event, AgentState::Deleted, HIERARCHY_SEPARATOR)
            .expect("record");
        assert_eq!(record.state, AgentState::Deleted);
        assert_eq!(record.date_left, Some(record.date_joined));
    }

    #[test]
    fn merging_preserves_the_original_join_date_and_clears_date_left() {
        let created = worker_event(
            "worker.created",
            "2026-03-01T08:00:00Z",
            json!({"email": "ann@example.com"}),
        );
        let first = AgentRecord::from_event(&created, AgentState::Active, HIERARCHY_SEPARATOR)
            .expect("record");

        let deleted = worker_event("worker.deleted", "2026-03-02T18:00:00Z", json!({}));
        let gone = AgentRecord::from_event(&deleted, AgentState::Deleted, HIERARCHY_SEPARATOR)
            .expect("record")
            .merged_onto(&first);
        assert_eq!(gone.date_joined, first.date_joined);
        assert!(gone.date_left.is_some());
        assert_eq!(gone.email, None);

        let revived = worker_event(
            "worker.attributes.update",
            "2026-03-03T08:00:00Z",
            json!({"email": "ann@new.example.com"}),
        );
        let back = AgentRecord::from_event(&revived, AgentState::Active, HIERARCHY_SEPARATOR)
            .expect("record")
            .merged_onto(&gone);
        assert_eq!(back.state, AgentState::Active);
        assert_eq!(back.date_left, None);
        assert_eq!(back.date_joined, first.date_joined);
    }

    #[test]
    fn missing_worker_sid_is_a_contract_error() {
        let envelope: Envelope = serde_json::from_value(json!({
            "id": "EV2001",
            "type": "com.twilio.taskrouter.worker.created",
            "data": { "payload": {
                "eventtype": "worker.created",
                "timestamp": "2026-03-02T08:00:00Z"
            }}
        }))
        .expect("well-formed envelope");
        let event = RouterEvent::from_envelope(&envelope, TASKROUTER_NAMESPACE).expect("projects");
        let err = AgentRecord::from_event(&event, AgentState::Active, HIERARCHY_SEPARATOR)
            .expect_err("no worker sid");
        assert!(matches!(err, ContractError::MissingWorkerSid { .. }));
    }
}
