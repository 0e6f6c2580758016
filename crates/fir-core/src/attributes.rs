//! Typed projections of the free-form attribute bags carried by lifecycle
//! events. Task and worker attributes arrive as JSON-encoded strings inside
//! the payload; they are parsed once here, at the ingestion boundary, and
//! everything downstream works on typed optional fields.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Attributes attached to the routed task. The `conversations` map holds the
/// per-deployment reporting overrides; unknown top-level keys are kept in
/// `extra` so the merged custom-data projection can still see them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskAttributes {
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub conversations: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl TaskAttributes {
    /// Absent or invalid JSON degrades to an empty bag.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|text| serde_json::from_str(text).ok())
            .unwrap_or_default()
    }
}

/// Attributes attached to the worker. Identity fields feed the agent record;
/// the whole bag also overlays the conversation custom data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkerAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub team_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name_in_hierarchy: Option<Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub department_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_name_in_hierarchy: Option<Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub agent_attribute_1: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub agent_attribute_2: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub agent_attribute_3: Option<String>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl WorkerAttributes {
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|text| serde_json::from_str(text).ok())
            .unwrap_or_default()
    }

    /// Roles list joined into one display string; a scalar `role` is used
    /// when no list is present.
    pub fn role_display(&self) -> Option<String> {
        match &self.roles {
            Some(roles) => Some(roles.join(", ")),
            None => self.role.clone(),
        }
    }
}

/// The merged reporting overrides: the task's `conversations` map overlaid
/// by the worker attribute bag (worker values win), projected into typed
/// optional fields. Validated once; junk values fall back to the computed
/// defaults rather than failing the event.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CustomData {
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_id: Option<String>,
    // fact overrides
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub abandon_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub queue_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub ring_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub talk_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub wrapup_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub time_in_seconds: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub agent_talk_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub longest_silence_before_agent: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub longest_talk_by_agent: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub silence_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub cross_talk_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub customer_talk_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub longest_silence_before_customer: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub longest_talk_by_customer: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub hold_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub average_response_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub first_response_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub focus_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub ivr_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub priority: Option<i64>,
    // attribute overrides
    #[serde(default, deserialize_with = "lenient_string")]
    pub abandoned: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub abandoned_phase: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub activity: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub campaign: Option<String>,
    #[serde(default, rename = "case", deserialize_with = "lenient_string")]
    pub case_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_attribute_1: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_attribute_2: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_attribute_3: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_attribute_4: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_attribute_5: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_attribute_6: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_attribute_7: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_attribute_8: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_attribute_9: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_attribute_10: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_label_1: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_label_2: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_label_3: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_label_4: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_label_5: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_label_6: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_label_7: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_label_8: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_label_9: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_label_10: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub destination: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub direction: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub external_contact: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub followed_by: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub department_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub department_name: Option<String>,
    #[serde(default)]
    pub handling_department_name_in_hierarchy: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub team: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub team_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub team_name: Option<String>,
    #[serde(default)]
    pub team_name_in_hierarchy: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub hang_up_by: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub in_business_hours: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub initiated_by: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub initiative: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ivr_path: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub language: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub order: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub outcome: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub preceded_by: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub productive: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub queue: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub segment_link: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub service_level: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source: Option<String>,
    #[serde(default, rename = "virtual", deserialize_with = "lenient_string")]
    pub virtual_: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub workflow: Option<String>,
}

impl CustomData {
    pub fn from_parts(task: &TaskAttributes, worker: &WorkerAttributes) -> Self {
        let mut merged = task.conversations.clone();
        if let Ok(Value::Object(worker_map)) = serde_json::to_value(worker) {
            for (key, value) in worker_map {
                merged.insert(key, value);
            }
        }
        serde_json::from_value(Value::Object(merged)).unwrap_or_default()
    }
}

/// Flattens a hierarchy value (list of path elements, or an already-flat
/// scalar) into one display string.
pub fn join_hierarchy(value: &Value, separator: &str) -> Option<String> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(separator),
        ),
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(Value::Bool(flag)) => Some(flag.to_string()),
        _ => None,
    })
}

pub(crate) fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float.round() as i64)),
        Some(Value::String(text)) => text.trim().parse::<i64>().ok(),
        _ => None,
    })
}
