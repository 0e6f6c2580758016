//! Temporal correlation: locating the prior event a fact is computed
//! against. A missing anchor is an absent fact, never a failed event; the
//! open session may have started before this store's retention window.

use chrono::{DateTime, Utc};
use fir_core::event::{EventType, RouterEvent};
use fir_core::truncate_millis;
use fir_storage::InsightsStore;
use tracing::{error, warn};

use crate::durations;

/// Queue facts for an exit event: seconds spent in queue and the instant
/// the queue membership opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub time_in_queue: i64,
    pub entered_at: DateTime<Utc>,
}

/// Queue time for the exit event, from the nearest preceding queue-entry
/// event of the same task.
pub fn queue_stats(store: &InsightsStore, event: &RouterEvent) -> Option<QueueStats> {
    let task_sid = event.task_sid.as_deref()?;
    match store.queue_entry_before(task_sid, event.timestamp) {
        Ok(Some(entry)) => Some(QueueStats {
            time_in_queue: durations::duration_seconds(entry.timestamp, event.timestamp),
            entered_at: truncate_millis(entry.timestamp),
        }),
        Ok(None) => {
            warn!(event = "queue_entry_miss", task_sid = task_sid, event_id = %event.event_id);
            None
        }
        Err(err) => {
            error!(event = "store_error", task_sid = task_sid, event_id = %event.event_id, error = %err);
            None
        }
    }
}

/// Ring time for a reservation endpoint event, from the reservation-created
/// event.
pub fn ring_time(store: &InsightsStore, event: &RouterEvent) -> Option<i64> {
    let reservation_sid = event.reservation_sid.as_deref()?;
    match store.latest_reservation_event(reservation_sid, EventType::ReservationCreated) {
        Ok(Some(created)) => Some(durations::duration_seconds(
            created.timestamp,
            event.timestamp,
        )),
        Ok(None) => {
            warn!(
                event = "reservation_created_miss",
                reservation_sid = reservation_sid,
                event_id = %event.event_id
            );
            None
        }
        Err(err) => {
            error!(event = "store_error", reservation_sid = reservation_sid, event_id = %event.event_id, error = %err);
            None
        }
    }
}

/// Talk and wrap-up time for a completion event. Both need the acceptance
/// anchor; the wrap-up anchor is optional and splits the interval when
/// present.
pub fn talk_and_wrapup_time(store: &InsightsStore, event: &RouterEvent) -> Option<(i64, i64)> {
    let reservation_sid = event.reservation_sid.as_deref()?;
    let accepted =
        match store.first_reservation_event(reservation_sid, EventType::ReservationAccepted) {
            Ok(Some(accepted)) => accepted,
            Ok(None) => {
                warn!(
                    event = "reservation_accepted_miss",
                    reservation_sid = reservation_sid,
                    event_id = %event.event_id
                );
                return None;
            }
            Err(err) => {
                error!(event = "store_error", reservation_sid = reservation_sid, event_id = %event.event_id, error = %err);
                return None;
            }
        };
    let wrapup =
        match store.latest_reservation_event(reservation_sid, EventType::ReservationWrapup) {
            Ok(found) => found.map(|wrapup| wrapup.timestamp),
            Err(err) => {
                error!(event = "store_error", reservation_sid = reservation_sid, event_id = %event.event_id, error = %err);
                return None;
            }
        };

    Some((
        durations::talk_time(accepted.timestamp, wrapup, event.timestamp),
        durations::wrapup_time(wrapup, event.timestamp),
    ))
}
