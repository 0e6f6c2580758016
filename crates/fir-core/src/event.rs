//! The normalized routing lifecycle event. Envelopes are projected into
//! [`RouterEvent`] once at the ingestion boundary; the attribute strings are
//! parsed here so the derivation code never touches raw JSON again.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attributes::{lenient_seconds, lenient_string, TaskAttributes, WorkerAttributes};
use crate::envelope::Envelope;
use crate::ContractError;

/// The lifecycle event names the derivation reacts to. Events inside the
/// product namespace but outside this set are cached and otherwise ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    TaskQueueEntered,
    TaskTransferInitiated,
    ReservationCreated,
    ReservationAccepted,
    ReservationRejected,
    ReservationTimeout,
    ReservationCanceled,
    ReservationRescinded,
    ReservationWrapup,
    ReservationCompleted,
    TaskCanceled,
    TaskTransferFailed,
    WorkerCreated,
    WorkerDeleted,
    WorkerActivityUpdated,
    WorkerAttributesUpdated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TaskQueueEntered => "task-queue.entered",
            EventType::TaskTransferInitiated => "task.transfer-initiated",
            EventType::ReservationCreated => "reservation.created",
            EventType::ReservationAccepted => "reservation.accepted",
            EventType::ReservationRejected => "reservation.rejected",
            EventType::ReservationTimeout => "reservation.timeout",
            EventType::ReservationCanceled => "reservation.canceled",
            EventType::ReservationRescinded => "reservation.rescinded",
            EventType::ReservationWrapup => "reservation.wrapup",
            EventType::ReservationCompleted => "reservation.completed",
            EventType::TaskCanceled => "task.canceled",
            EventType::TaskTransferFailed => "task.transfer-failed",
            EventType::WorkerCreated => "worker.created",
            EventType::WorkerDeleted => "worker.deleted",
            EventType::WorkerActivityUpdated => "worker.activity.update",
            EventType::WorkerAttributesUpdated => "worker.attributes.update",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim() {
            "task-queue.entered" => Ok(EventType::TaskQueueEntered),
            "task.transfer-initiated" => Ok(EventType::TaskTransferInitiated),
            "reservation.created" => Ok(EventType::ReservationCreated),
            "reservation.accepted" => Ok(EventType::ReservationAccepted),
            "reservation.rejected" => Ok(EventType::ReservationRejected),
            "reservation.timeout" => Ok(EventType::ReservationTimeout),
            "reservation.canceled" => Ok(EventType::ReservationCanceled),
            "reservation.rescinded" => Ok(EventType::ReservationRescinded),
            "reservation.wrapup" => Ok(EventType::ReservationWrapup),
            "reservation.completed" => Ok(EventType::ReservationCompleted),
            "task.canceled" => Ok(EventType::TaskCanceled),
            "task.transfer-failed" => Ok(EventType::TaskTransferFailed),
            "worker.created" => Ok(EventType::WorkerCreated),
            "worker.deleted" => Ok(EventType::WorkerDeleted),
            "worker.activity.update" => Ok(EventType::WorkerActivityUpdated),
            "worker.attributes.update" => Ok(EventType::WorkerAttributesUpdated),
            other => Err(format!("Unknown event type: {other}")),
        }
    }
}

/// Wire shape of the payload object inside an envelope. Field names follow
/// the sender's flat snake_case convention; everything except the event name
/// and its timestamp is optional.
#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(rename = "eventtype")]
    event_type: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    task_sid: Option<String>,
    #[serde(default)]
    reservation_sid: Option<String>,
    #[serde(default)]
    worker_sid: Option<String>,
    #[serde(default)]
    task_channel_unique_name: Option<String>,
    #[serde(default)]
    workflow_name: Option<String>,
    #[serde(default)]
    task_queue_sid: Option<String>,
    #[serde(default)]
    task_queue_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    task_completed_reason: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    task_canceled_reason: Option<String>,
    #[serde(default)]
    worker_activity_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    worker_time_in_previous_activity: Option<i64>,
    #[serde(default)]
    task_attributes: Option<String>,
    #[serde(default)]
    worker_attributes: Option<String>,
}

/// A routing lifecycle event with its attribute bags already parsed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterEvent {
    pub event_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub task_sid: Option<String>,
    pub reservation_sid: Option<String>,
    pub worker_sid: Option<String>,
    pub task_channel_unique_name: Option<String>,
    pub workflow_name: Option<String>,
    pub task_queue_sid: Option<String>,
    pub task_queue_name: Option<String>,
    pub task_completed_reason: Option<String>,
    pub task_canceled_reason: Option<String>,
    pub worker_activity_name: Option<String>,
    pub worker_time_in_previous_activity: Option<i64>,
    pub task_attributes: TaskAttributes,
    pub worker_attributes: WorkerAttributes,
}

impl RouterEvent {
    /// Projects an envelope into a normalized event. Fails when the envelope
    /// sits outside the given namespace or its payload does not parse.
    pub fn from_envelope(envelope: &Envelope, namespace: &str) -> Result<Self, ContractError> {
        if !envelope.in_namespace(namespace) {
            return Err(ContractError::UnsupportedNamespace(
                envelope.event_type.clone(),
            ));
        }
        let payload: EventPayload =
            serde_json::from_value(Value::Object(envelope.data.payload.clone())).map_err(
                |err| ContractError::MalformedPayload {
                    event_id: envelope.id.clone(),
                    reason: err.to_string(),
                },
            )?;
        Ok(RouterEvent {
            event_id: envelope.id.clone(),
            event_type: payload.event_type,
            timestamp: payload.timestamp,
            task_sid: payload.task_sid,
            reservation_sid: payload.reservation_sid,
            worker_sid: payload.worker_sid,
            task_channel_unique_name: payload.task_channel_unique_name,
            workflow_name: payload.workflow_name,
            task_queue_sid: payload.task_queue_sid,
            task_queue_name: payload.task_queue_name,
            task_completed_reason: payload.task_completed_reason,
            task_canceled_reason: payload.task_canceled_reason,
            worker_activity_name: payload.worker_activity_name,
            worker_time_in_previous_activity: payload.worker_time_in_previous_activity,
            task_attributes: TaskAttributes::parse(payload.task_attributes.as_deref()),
            worker_attributes: WorkerAttributes::parse(payload.worker_attributes.as_deref()),
        })
    }

    /// The handled lifecycle kind, when the event name is one of the known
    /// set.
    pub fn kind(&self) -> Option<EventType> {
        self.event_type.parse().ok()
    }
}
