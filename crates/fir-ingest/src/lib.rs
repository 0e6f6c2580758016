//! Batch processor for the routing event stream: classifies each envelope,
//! caches the event, and derives the segment/agent writes it implies. A
//! batch never fails as a whole; every per-item problem is logged and the
//! remaining items still run.

use fir_core::agent::{AgentRecord, AgentState};
use fir_core::attributes::{CustomData, WorkerAttributes};
use fir_core::envelope::Envelope;
use fir_core::event::{EventType, RouterEvent};
use fir_core::segment::{ConversationSegment, SegmentKind};
use fir_core::{ContractError, HIERARCHY_SEPARATOR, TASKROUTER_NAMESPACE};
use fir_storage::{InsightsStore, StorageError, UpdateOutcome};
use serde_json::Value;
use tracing::{debug, error, warn};

pub mod correlate;
pub mod durations;

/// Processor knobs. The defaults match the upstream event stream; tests
/// override the separator to exercise hierarchy joining.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub namespace: String,
    pub hierarchy_separator: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            namespace: TASKROUTER_NAMESPACE.to_string(),
            hierarchy_separator: HIERARCHY_SEPARATOR.to_string(),
        }
    }
}

/// What one batch did. The caller always gets a report; failed items show
/// up in `items_skipped`, not as an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub items: usize,
    pub events_cached: usize,
    pub duplicates_skipped: usize,
    pub segments_inserted: usize,
    pub segments_updated: usize,
    pub agents_upserted: usize,
    pub items_skipped: usize,
    pub unhandled_events: usize,
}

pub struct BatchProcessor {
    config: IngestConfig,
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self::new(IngestConfig::default())
    }
}

impl BatchProcessor {
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    /// Runs one batch in array order. Every item is cached before its
    /// derivation runs, so lookups from later items in the same batch see
    /// earlier ones.
    pub fn process_batch(&self, store: &InsightsStore, items: &[Value]) -> BatchReport {
        let mut report = BatchReport {
            items: items.len(),
            ..BatchReport::default()
        };

        for (index, item) in items.iter().enumerate() {
            let envelope: Envelope = match serde_json::from_value(item.clone()) {
                Ok(envelope) => envelope,
                Err(err) => {
                    let err = ContractError::MalformedEnvelope(err.to_string());
                    warn!(event = "envelope_skipped", index = index, error = %err);
                    report.items_skipped += 1;
                    continue;
                }
            };

            let event = match RouterEvent::from_envelope(&envelope, &self.config.namespace) {
                Ok(event) => event,
                Err(err) => {
                    warn!(event = "envelope_skipped", index = index, envelope_id = %envelope.id, error = %err);
                    report.items_skipped += 1;
                    continue;
                }
            };

            match store.insert_event(&event) {
                Ok(true) => report.events_cached += 1,
                Ok(false) => {
                    // redelivery; the derived records already exist
                    debug!(event = "duplicate_event", event_id = %event.event_id);
                    report.duplicates_skipped += 1;
                    continue;
                }
                Err(err) => {
                    error!(event = "store_error", event_id = %event.event_id, error = %err);
                    report.items_skipped += 1;
                    continue;
                }
            }

            if let Err(err) = self.dispatch(store, &event, &mut report) {
                error!(event = "store_error", event_id = %event.event_id, error = %err);
                report.items_skipped += 1;
            }
        }

        report
    }

    fn dispatch(
        &self,
        store: &InsightsStore,
        event: &RouterEvent,
        report: &mut BatchReport,
    ) -> Result<(), StorageError> {
        let kind = match event.kind() {
            Some(kind) => kind,
            None => {
                warn!(event = "unhandled_event_type", event_type = %event.event_type, event_id = %event.event_id);
                report.unhandled_events += 1;
                return Ok(());
            }
        };

        match kind {
            // correlation anchors; cached above, nothing derived yet
            EventType::TaskQueueEntered
            | EventType::TaskTransferInitiated
            | EventType::ReservationCreated
            | EventType::ReservationWrapup => Ok(()),

            EventType::ReservationAccepted => self.on_reservation_accepted(store, event, report),
            EventType::ReservationRejected => self.on_reservation_ended(
                store,
                event,
                SegmentKind::RejectedConversation,
                report,
            ),
            EventType::ReservationTimeout | EventType::ReservationCanceled => self
                .on_reservation_ended(store, event, SegmentKind::MissedConversation, report),
            EventType::ReservationRescinded => self.on_reservation_ended(
                store,
                event,
                SegmentKind::RevokedConversation,
                report,
            ),
            EventType::ReservationCompleted => self.on_reservation_completed(store, event, report),
            EventType::TaskCanceled | EventType::TaskTransferFailed => {
                self.on_task_abandoned(store, event, report)
            }
            EventType::WorkerCreated => self.on_worker_created(store, event, report),
            EventType::WorkerDeleted => {
                self.upsert_agent(store, event, AgentState::Deleted, report)
            }
            EventType::WorkerAttributesUpdated => {
                self.upsert_agent(store, event, AgentState::Active, report)
            }
            EventType::WorkerActivityUpdated => self.on_worker_activity(store, event, report),
        }
    }

    /// Acceptance closes the queue phase and opens the conversation: one
    /// terminal QUEUE segment back-dated to the queue entry, one open
    /// CONVERSATION IN PROGRESS row keyed by the reservation.
    fn on_reservation_accepted(
        &self,
        store: &InsightsStore,
        event: &RouterEvent,
        report: &mut BatchReport,
    ) -> Result<(), StorageError> {
        let queue = correlate::queue_stats(store, event);
        let ring_time = correlate::ring_time(store, event);

        let mut queue_segment = self.build_segment(SegmentKind::Queue, event);
        if let Some(stats) = queue {
            queue_segment.queue_time = Some(stats.time_in_queue);
            queue_segment.date = stats.entered_at.date_naive();
            queue_segment.time = stats.entered_at.time();
        }
        store.insert_segment(&queue_segment)?;
        report.segments_inserted += 1;

        let mut open = self.build_segment(SegmentKind::ConversationInProgress, event);
        open.queue_time = queue.map(|stats| stats.time_in_queue);
        open.ring_time = ring_time;
        store.insert_segment(&open)?;
        report.segments_inserted += 1;

        Ok(())
    }

    /// A reservation that never reached the agent: one terminal segment of
    /// the given kind carrying the ring time.
    fn on_reservation_ended(
        &self,
        store: &InsightsStore,
        event: &RouterEvent,
        kind: SegmentKind,
        report: &mut BatchReport,
    ) -> Result<(), StorageError> {
        let mut segment = self.build_segment(kind, event);
        segment.ring_time = correlate::ring_time(store, event);
        store.insert_segment(&segment)?;
        report.segments_inserted += 1;
        Ok(())
    }

    /// Completion folds talk and wrap-up time into the open conversation
    /// row and flips it terminal.
    fn on_reservation_completed(
        &self,
        store: &InsightsStore,
        event: &RouterEvent,
        report: &mut BatchReport,
    ) -> Result<(), StorageError> {
        let reservation_sid = match event.reservation_sid.as_deref() {
            Some(reservation_sid) => reservation_sid,
            None => {
                warn!(event = "reservation_sid_missing", event_id = %event.event_id);
                return Ok(());
            }
        };

        let mut open = match store.conversation_in_progress(reservation_sid)? {
            Some(open) => open,
            None => {
                warn!(
                    event = "in_progress_miss",
                    reservation_sid = reservation_sid,
                    event_id = %event.event_id
                );
                return Ok(());
            }
        };

        open.segment_kind = SegmentKind::Conversation;
        if let Some((talk_time, wrapup_time)) = correlate::talk_and_wrapup_time(store, event) {
            open.talk_time = Some(talk_time);
            open.wrapup_time = Some(wrapup_time);
        }
        // the completing event's custom data owns the link, even when unset
        open.segment_link =
            CustomData::from_parts(&event.task_attributes, &WorkerAttributes::default())
                .segment_link;

        match store.update_segment(&open)? {
            UpdateOutcome::Updated => report.segments_updated += 1,
            UpdateOutcome::NotFound => {
                warn!(
                    event = "in_progress_miss",
                    reservation_sid = reservation_sid,
                    event_id = %event.event_id
                );
            }
        }
        Ok(())
    }

    /// A task abandoned while queued: QUEUE and CONVERSATION segments, both
    /// flagged abandoned in the Queue phase.
    fn on_task_abandoned(
        &self,
        store: &InsightsStore,
        event: &RouterEvent,
        report: &mut BatchReport,
    ) -> Result<(), StorageError> {
        let queue = correlate::queue_stats(store, event);

        let mut queue_segment = self.build_segment(SegmentKind::Queue, event);
        queue_segment.abandoned = "Y".to_string();
        queue_segment.abandoned_phase = Some("Queue".to_string());
        if let Some(stats) = queue {
            queue_segment.queue_time = Some(stats.time_in_queue);
            queue_segment.abandon_time = Some(stats.time_in_queue);
            queue_segment.date = stats.entered_at.date_naive();
            queue_segment.time = stats.entered_at.time();
        }
        store.insert_segment(&queue_segment)?;
        report.segments_inserted += 1;

        let mut conversation = self.build_segment(SegmentKind::Conversation, event);
        conversation.abandoned = "Y".to_string();
        conversation.abandoned_phase = Some("Queue".to_string());
        conversation.queue_time = queue.map(|stats| stats.time_in_queue);
        conversation.abandon_time = queue.map(|stats| stats.time_in_queue);
        store.insert_segment(&conversation)?;
        report.segments_inserted += 1;

        Ok(())
    }

    /// A new worker gets an agent record and an open activity row.
    fn on_worker_created(
        &self,
        store: &InsightsStore,
        event: &RouterEvent,
        report: &mut BatchReport,
    ) -> Result<(), StorageError> {
        self.upsert_agent(store, event, AgentState::Active, report)?;

        let open = self.build_segment(SegmentKind::AgentStatusInProgress, event);
        store.insert_segment(&open)?;
        report.segments_inserted += 1;
        Ok(())
    }

    /// An activity change closes the open status row with the prior
    /// activity's duration and opens a new one for the new activity.
    fn on_worker_activity(
        &self,
        store: &InsightsStore,
        event: &RouterEvent,
        report: &mut BatchReport,
    ) -> Result<(), StorageError> {
        self.upsert_agent(store, event, AgentState::Active, report)?;

        let agent_sid = match event.worker_sid.as_deref() {
            Some(agent_sid) => agent_sid,
            None => return Ok(()),
        };

        match store.agent_status_in_progress(agent_sid)? {
            Some(mut open) => {
                open.segment_kind = SegmentKind::AgentStatus;
                open.activity_time = event.worker_time_in_previous_activity;
                match store.update_segment(&open)? {
                    UpdateOutcome::Updated => report.segments_updated += 1,
                    UpdateOutcome::NotFound => {
                        warn!(event = "in_progress_miss", agent_sid = agent_sid, event_id = %event.event_id);
                    }
                }
            }
            None => {
                warn!(event = "in_progress_miss", agent_sid = agent_sid, event_id = %event.event_id);
            }
        }

        let mut open = self.build_segment(SegmentKind::AgentStatusInProgress, event);
        // the new activity has spent no time yet; the payload duration
        // belongs to the activity just closed
        open.activity_time = None;
        store.insert_segment(&open)?;
        report.segments_inserted += 1;

        Ok(())
    }

    /// Writes the agent record a worker event implies: update when the
    /// record exists, insert when it does not. An update racing a missing
    /// row falls back to insert rather than failing.
    fn upsert_agent(
        &self,
        store: &InsightsStore,
        event: &RouterEvent,
        state: AgentState,
        report: &mut BatchReport,
    ) -> Result<(), StorageError> {
        let record =
            match AgentRecord::from_event(event, state, &self.config.hierarchy_separator) {
                Ok(record) => record,
                Err(err) => {
                    warn!(event = "agent_skipped", event_id = %event.event_id, error = %err);
                    return Ok(());
                }
            };

        match store.get_agent(&record.agent_sid)? {
            Some(existing) => {
                let merged = record.merged_onto(&existing);
                if store.update_agent(&merged)? == UpdateOutcome::NotFound {
                    store.insert_agent(&merged)?;
                }
            }
            None => store.insert_agent(&record)?,
        }
        report.agents_upserted += 1;
        Ok(())
    }

    fn build_segment(&self, kind: SegmentKind, event: &RouterEvent) -> ConversationSegment {
        ConversationSegment::from_event(kind, event, &self.config.hierarchy_separator)
    }
}
