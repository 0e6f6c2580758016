//! Contracts for the Flex Insights reporting pipeline: event envelopes,
//! typed payload projections, and the derived segment/agent record types.

use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod agent;
pub mod attributes;
pub mod envelope;
pub mod event;
pub mod segment;

/// Product namespace of the routing lifecycle events this pipeline derives
/// reporting records from. Envelopes outside it are skipped.
pub const TASKROUTER_NAMESPACE: &str = "com.twilio.taskrouter";

/// Separator used when flattening hierarchy lists (team/department paths)
/// into a single display string.
pub const HIERARCHY_SEPARATOR: &str = " \u{25b8} ";

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("envelope is not a well-formed event object: {0}")]
    MalformedEnvelope(String),
    #[error("malformed payload in envelope {event_id}: {reason}")]
    MalformedPayload { event_id: String, reason: String },
    #[error("unsupported event namespace: {0}")]
    UnsupportedNamespace(String),
    #[error("event {event_id} carries no worker sid")]
    MissingWorkerSid { event_id: String },
}

/// Zeroes the sub-second component of an instant. The downstream reporting
/// model is second-granular, so every stored date/time and every duration
/// endpoint goes through this first.
pub fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts - chrono::Duration::nanoseconds(i64::from(ts.timestamp_subsec_nanos()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn truncate_millis_drops_subsecond_component() {
        let ts = Utc
            .with_ymd_and_hms(2026, 3, 2, 10, 0, 0)
            .single()
            .expect("valid timestamp")
            + chrono::Duration::milliseconds(900);
        let truncated = truncate_millis(ts);
        assert_eq!(truncated.timestamp_subsec_millis(), 0);
        assert_eq!(truncated.timestamp(), ts.timestamp());
    }
}
