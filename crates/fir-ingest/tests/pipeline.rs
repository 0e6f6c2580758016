use chrono::{DateTime, Duration, TimeZone, Utc};
use fir_core::agent::AgentState;
use fir_core::segment::SegmentKind;
use fir_ingest::{BatchProcessor, IngestConfig};
use fir_storage::InsightsStore;
use serde_json::{json, Value};

fn base_ts() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn ts(offset_seconds: i64) -> String {
    (base_ts() + Duration::seconds(offset_seconds)).to_rfc3339()
}

fn envelope(id: &str, eventtype: &str, offset_seconds: i64, extra: Value) -> Value {
    let mut payload = json!({
        "eventtype": eventtype,
        "timestamp": ts(offset_seconds),
    });
    if let (Some(base), Some(extra)) = (payload.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    json!({
        "id": id,
        "type": format!("com.twilio.taskrouter.{eventtype}"),
        "data": { "payload": payload, "publisher_metadata": {} }
    })
}

fn task_fields() -> Value {
    json!({
        "task_sid": "WT1",
        "reservation_sid": "WR1",
        "worker_sid": "WK1",
        "task_channel_unique_name": "voice",
        "workflow_name": "Assign To Anyone",
        "task_queue_sid": "WQ1",
        "task_queue_name": "Everyone"
    })
}

#[test]
fn acceptance_derives_queue_and_in_progress_segments() {
    let store = InsightsStore::open_in_memory().expect("open db");
    let processor = BatchProcessor::default();

    let report = processor.process_batch(
        &store,
        &[
            envelope("EV1", "task-queue.entered", 0, task_fields()),
            envelope("EV2", "reservation.created", 5, task_fields()),
            envelope("EV3", "reservation.accepted", 35, task_fields()),
        ],
    );

    assert_eq!(report.items, 3);
    assert_eq!(report.events_cached, 3);
    assert_eq!(report.segments_inserted, 2);
    assert_eq!(report.items_skipped, 0);

    let segments = store.all_segments().expect("list");
    assert_eq!(segments.len(), 2);

    let queue = segments
        .iter()
        .find(|segment| segment.segment_kind == SegmentKind::Queue)
        .expect("queue segment");
    assert_eq!(queue.queue_time, Some(35));
    // the queue row is back-dated to the queue entry instant
    assert_eq!(queue.date.to_string(), "2026-03-02");
    assert_eq!(queue.time.to_string(), "10:00:00");
    assert_eq!(queue.channel.as_deref(), Some("Call"));
    assert_eq!(queue.queue.as_deref(), Some("Everyone"));

    let open = segments
        .iter()
        .find(|segment| segment.segment_kind == SegmentKind::ConversationInProgress)
        .expect("in-progress segment");
    assert_eq!(open.queue_time, Some(35));
    assert_eq!(open.ring_time, Some(30));
    assert_eq!(open.time.to_string(), "10:00:35");
    assert_eq!(open.reservation_sid, "WR1");
}

#[test]
fn completion_folds_talk_and_wrapup_into_the_open_row() {
    let store = InsightsStore::open_in_memory().expect("open db");
    let processor = BatchProcessor::default();

    let completed_fields = {
        let mut fields = task_fields();
        fields["task_attributes"] =
            json!("{\"conversations\":{\"segment_link\":\"https://recordings/WR1\"}}");
        fields
    };
    let report = processor.process_batch(
        &store,
        &[
            envelope("EV1", "task-queue.entered", 0, task_fields()),
            envelope("EV2", "reservation.created", 5, task_fields()),
            envelope("EV3", "reservation.accepted", 35, task_fields()),
            envelope("EV4", "reservation.wrapup", 65, task_fields()),
            envelope("EV5", "reservation.completed", 85, completed_fields),
        ],
    );

    assert_eq!(report.segments_inserted, 2);
    assert_eq!(report.segments_updated, 1);

    let segments = store.all_segments().expect("list");
    assert_eq!(segments.len(), 2);

    // exactly one terminal conversation row, carrying facts from both the
    // acceptance and the completion
    let conversation = segments
        .iter()
        .find(|segment| segment.segment_kind == SegmentKind::Conversation)
        .expect("terminal conversation");
    assert_eq!(conversation.queue_time, Some(35));
    assert_eq!(conversation.ring_time, Some(30));
    assert_eq!(conversation.talk_time, Some(30));
    assert_eq!(conversation.wrapup_time, Some(20));
    assert_eq!(
        conversation.segment_link.as_deref(),
        Some("https://recordings/WR1")
    );

    // the open row was consumed, not duplicated
    assert!(store
        .conversation_in_progress("WR1")
        .expect("lookup")
        .is_none());
}

#[test]
fn completion_without_an_open_row_is_logged_and_dropped() {
    let store = InsightsStore::open_in_memory().expect("open db");
    let processor = BatchProcessor::default();

    let report = processor.process_batch(
        &store,
        &[envelope("EV1", "reservation.completed", 85, task_fields())],
    );

    assert_eq!(report.events_cached, 1);
    assert_eq!(report.segments_updated, 0);
    assert_eq!(report.items_skipped, 0);
    assert!(store.all_segments().expect("list").is_empty());
}

#[test]
fn redelivered_envelopes_derive_nothing_new() {
    let store = InsightsStore::open_in_memory().expect("open db");
    let processor = BatchProcessor::default();

    let batch = [
        envelope("EV1", "reservation.created", 5, task_fields()),
        envelope("EV2", "reservation.accepted", 35, task_fields()),
    ];
    processor.process_batch(&store, &batch);
    let replay = processor.process_batch(&store, &batch);

    assert_eq!(replay.duplicates_skipped, 2);
    assert_eq!(replay.events_cached, 0);
    assert_eq!(replay.segments_inserted, 0);
    assert_eq!(store.all_segments().expect("list").len(), 2);
}

#[test]
fn failed_reservations_map_to_their_terminal_kinds() {
    let store = InsightsStore::open_in_memory().expect("open db");
    let processor = BatchProcessor::default();

    let cases = [
        ("WR-a", "reservation.rejected", SegmentKind::RejectedConversation),
        ("WR-b", "reservation.timeout", SegmentKind::MissedConversation),
        ("WR-c", "reservation.canceled", SegmentKind::MissedConversation),
        ("WR-d", "reservation.rescinded", SegmentKind::RevokedConversation),
    ];

    for (index, (reservation_sid, eventtype, expected)) in cases.iter().enumerate() {
        let fields = json!({
            "task_sid": format!("WT-{reservation_sid}"),
            "reservation_sid": reservation_sid,
            "worker_sid": "WK1"
        });
        let offset = index as i64 * 100;
        let report = processor.process_batch(
            &store,
            &[
                envelope(
                    &format!("EV-created-{reservation_sid}"),
                    "reservation.created",
                    offset,
                    fields.clone(),
                ),
                envelope(
                    &format!("EV-end-{reservation_sid}"),
                    eventtype,
                    offset + 15,
                    fields,
                ),
            ],
        );
        assert_eq!(report.segments_inserted, 1);

        let segments = store
            .segments_for_conversation(&format!("WT-{reservation_sid}"))
            .expect("list");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].segment_kind, *expected);
        assert_eq!(segments[0].ring_time, Some(15));
    }
}

#[test]
fn tasks_canceled_in_queue_are_flagged_abandoned() {
    let store = InsightsStore::open_in_memory().expect("open db");
    let processor = BatchProcessor::default();

    let canceled_fields = {
        let mut fields = task_fields();
        fields["task_canceled_reason"] = json!("hangup");
        fields
    };
    let report = processor.process_batch(
        &store,
        &[
            envelope("EV1", "task-queue.entered", 0, task_fields()),
            envelope("EV2", "task.canceled", 40, canceled_fields),
        ],
    );

    assert_eq!(report.segments_inserted, 2);

    let segments = store.all_segments().expect("list");
    assert_eq!(segments.len(), 2);
    for segment in &segments {
        assert_eq!(segment.abandoned, "Y");
        assert_eq!(segment.abandoned_phase.as_deref(), Some("Queue"));
        assert_eq!(segment.queue_time, Some(40));
        assert_eq!(segment.abandon_time, Some(40));
    }
    let conversation = segments
        .iter()
        .find(|segment| segment.segment_kind == SegmentKind::Conversation)
        .expect("abandoned conversation");
    assert_eq!(conversation.outcome.as_deref(), Some("hangup"));
}

#[test]
fn worker_lifecycle_maintains_one_agent_record_and_a_status_timeline() {
    let store = InsightsStore::open_in_memory().expect("open db");
    let processor = BatchProcessor::default();

    let created = envelope(
        "EV1",
        "worker.created",
        0,
        json!({
            "worker_sid": "WK1",
            "worker_activity_name": "Available",
            "worker_attributes": "{\"email\":\"ann@example.com\",\"roles\":[\"agent\"]}"
        }),
    );
    let on_break = envelope(
        "EV2",
        "worker.activity.update",
        3600,
        json!({
            "worker_sid": "WK1",
            "worker_activity_name": "Break",
            "worker_time_in_previous_activity": 3600,
            "worker_attributes": "{\"email\":\"ann@example.com\",\"roles\":[\"agent\"]}"
        }),
    );
    let back_available = envelope(
        "EV3",
        "worker.activity.update",
        5400,
        json!({
            "worker_sid": "WK1",
            "worker_activity_name": "Available",
            "worker_time_in_previous_activity": 1800,
            "worker_attributes": "{\"email\":\"ann@example.com\",\"roles\":[\"agent\"]}"
        }),
    );
    let attributes = envelope(
        "EV4",
        "worker.attributes.update",
        7200,
        json!({
            "worker_sid": "WK1",
            "worker_attributes": "{\"email\":\"ann@new.example.com\",\"roles\":[\"agent\",\"supervisor\"]}"
        }),
    );
    let deleted = envelope("EV5", "worker.deleted", 10800, json!({ "worker_sid": "WK1" }));

    let report = processor.process_batch(
        &store,
        &[created, on_break, back_available, attributes, deleted],
    );
    assert_eq!(report.agents_upserted, 5);
    assert_eq!(report.segments_inserted, 3);
    assert_eq!(report.segments_updated, 2);

    let agents = store.all_agents().expect("list");
    assert_eq!(agents.len(), 1);
    let agent = &agents[0];
    assert_eq!(agent.state, AgentState::Deleted);
    assert_eq!(agent.date_joined, base_ts());
    assert_eq!(agent.date_left, Some(base_ts() + Duration::seconds(10800)));

    let segments = store.segments_for_conversation("WK1").expect("list");
    assert_eq!(segments.len(), 3);

    let closed: Vec<_> = segments
        .iter()
        .filter(|segment| segment.segment_kind == SegmentKind::AgentStatus)
        .collect();
    assert_eq!(closed.len(), 2);
    assert_eq!(closed[0].activity.as_deref(), Some("Available"));
    assert_eq!(closed[0].activity_time, Some(3600));
    assert_eq!(closed[1].activity.as_deref(), Some("Break"));
    assert_eq!(closed[1].activity_time, Some(1800));

    let open = segments
        .iter()
        .find(|segment| segment.segment_kind == SegmentKind::AgentStatusInProgress)
        .expect("open status");
    assert_eq!(open.activity.as_deref(), Some("Available"));
    assert_eq!(open.activity_time, None);
}

#[test]
fn activity_update_for_an_unseen_worker_self_heals() {
    let store = InsightsStore::open_in_memory().expect("open db");
    let processor = BatchProcessor::default();

    let report = processor.process_batch(
        &store,
        &[envelope(
            "EV1",
            "worker.activity.update",
            0,
            json!({
                "worker_sid": "WK9",
                "worker_activity_name": "Available",
                "worker_time_in_previous_activity": 15
            }),
        )],
    );

    assert_eq!(report.agents_upserted, 1);
    assert_eq!(report.items_skipped, 0);

    let agent = store.get_agent("WK9").expect("get").expect("created");
    assert_eq!(agent.state, AgentState::Active);

    // no prior status row to close, but the new activity still opens one
    let segments = store.segments_for_conversation("WK9").expect("list");
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].segment_kind, SegmentKind::AgentStatusInProgress);
    assert_eq!(segments[0].activity.as_deref(), Some("Available"));
}

#[test]
fn bad_items_are_skipped_without_aborting_the_batch() {
    let store = InsightsStore::open_in_memory().expect("open db");
    let processor = BatchProcessor::default();

    let report = processor.process_batch(
        &store,
        &[
            json!({ "unexpected": "shape" }),
            json!({
                "id": "EV-voice",
                "type": "com.twilio.voice.insights.call-summary",
                "data": { "payload": { "eventtype": "call.summary" } }
            }),
            envelope("EV3", "reservation.accepted", 35, task_fields()),
        ],
    );

    assert_eq!(report.items, 3);
    assert_eq!(report.items_skipped, 2);
    assert_eq!(report.events_cached, 1);
    assert_eq!(report.segments_inserted, 2);

    // no anchors were cached, so the correlated facts stay absent
    let segments = store.all_segments().expect("list");
    for segment in &segments {
        assert_eq!(segment.queue_time, None);
        assert_eq!(segment.ring_time, None);
    }
}

#[test]
fn unknown_lifecycle_events_are_cached_but_derive_nothing() {
    let store = InsightsStore::open_in_memory().expect("open db");
    let processor = BatchProcessor::default();

    let report = processor.process_batch(
        &store,
        &[envelope("EV1", "task.updated", 0, task_fields())],
    );

    assert_eq!(report.events_cached, 1);
    assert_eq!(report.unhandled_events, 1);
    assert!(store.all_segments().expect("list").is_empty());
}

#[test]
fn hierarchy_separator_is_configurable() {
    let store = InsightsStore::open_in_memory().expect("open db");
    let processor = BatchProcessor::new(IngestConfig {
        hierarchy_separator: " / ".to_string(),
        ..IngestConfig::default()
    });

    let report = processor.process_batch(
        &store,
        &[envelope(
            "EV1",
            "worker.created",
            0,
            json!({
                "worker_sid": "WK1",
                "worker_activity_name": "Available",
                "worker_attributes": "{\"team_name_in_hierarchy\":[\"Sales\",\"EMEA\"]}"
            }),
        )],
    );
    assert_eq!(report.agents_upserted, 1);

    let agent = store.get_agent("WK1").expect("get").expect("created");
    assert_eq!(
        agent.team_name_in_hierarchy.as_deref(),
        Some("Sales / EMEA")
    );

    let segments = store.segments_for_conversation("WK1").expect("list");
    assert_eq!(
        segments[0].handling_team_name_in_hierarchy.as_deref(),
        Some("Sales / EMEA")
    );
}
