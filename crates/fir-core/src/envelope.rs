use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One CloudEvents-style item of an event-streams batch, as delivered by the
/// upstream sender after transport authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: EnvelopeData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvelopeData {
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub publisher_metadata: Map<String, Value>,
}

impl Envelope {
    /// Whether the envelope belongs to the given product namespace
    /// (dot-namespaced prefix match, e.g. `com.twilio.taskrouter`).
    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.event_type.starts_with(namespace)
    }
}
