//! SQLite-backed store for the reporting pipeline: the append-only event
//! cache the correlation lookups run against, plus the derived segment and
//! agent tables. Key columns exist for index-backed lookup; the full records
//! travel in JSON body columns.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use fir_core::agent::AgentRecord;
use fir_core::event::{EventType, RouterEvent};
use fir_core::segment::{ConversationSegment, SegmentKind};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

pub const INSIGHTS_SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

/// Result of an update-by-identity. A missing target is an expected state
/// (the in-progress row may predate this store), so it is a value, not an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NotFound,
}

pub struct InsightsStore {
    conn: Connection,
}

impl InsightsStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > INSIGHTS_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: INSIGHTS_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_insights_schema.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
        }

        Ok(())
    }

    /// Caches one lifecycle event. The event id is the primary key, so a
    /// redelivered envelope is a no-op; the return value says whether the
    /// row was new.
    pub fn insert_event(&self, event: &RouterEvent) -> Result<bool, StorageError> {
        let payload_json = serde_json::to_string(event)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        let changes = self.conn.execute(
            "
            INSERT OR IGNORE INTO router_events (
                event_id,
                event_type,
                task_sid,
                reservation_sid,
                worker_sid,
                ts,
                payload_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                event.event_id,
                event.event_type,
                event.task_sid,
                event.reservation_sid,
                event.worker_sid,
                format_ts(event.timestamp),
                payload_json,
            ],
        )?;

        Ok(changes > 0)
    }

    /// The queue-entry event that opened the queue membership a given exit
    /// closes: the latest entered/transfer-initiated event for the task
    /// strictly before the exit instant. Tasks re-enter queues on transfer,
    /// so only the nearest preceding entry is authoritative.
    pub fn queue_entry_before(
        &self,
        task_sid: &str,
        exit_ts: DateTime<Utc>,
    ) -> Result<Option<RouterEvent>, StorageError> {
        let event = self
            .conn
            .query_row(
                "
                SELECT payload_json
                FROM router_events
                WHERE task_sid = ?1
                  AND event_type IN (?2, ?3)
                  AND ts < ?4
                ORDER BY ts DESC
                LIMIT 1
                ",
                params![
                    task_sid,
                    EventType::TaskQueueEntered.as_str(),
                    EventType::TaskTransferInitiated.as_str(),
                    format_ts(exit_ts),
                ],
                row_to_event,
            )
            .optional()?;

        Ok(event)
    }

    /// The most recent event of one type for a reservation. Multiple
    /// matches should not normally occur; descending order resolves them to
    /// the latest.
    pub fn latest_reservation_event(
        &self,
        reservation_sid: &str,
        event_type: EventType,
    ) -> Result<Option<RouterEvent>, StorageError> {
        let event = self
            .conn
            .query_row(
                "
                SELECT payload_json
                FROM router_events
                WHERE reservation_sid = ?1
                  AND event_type = ?2
                ORDER BY ts DESC
                LIMIT 1
                ",
                params![reservation_sid, event_type.as_str()],
                row_to_event,
            )
            .optional()?;

        Ok(event)
    }

    /// Any one event of the given type for a reservation, unsorted.
    pub fn first_reservation_event(
        &self,
        reservation_sid: &str,
        event_type: EventType,
    ) -> Result<Option<RouterEvent>, StorageError> {
        let event = self
            .conn
            .query_row(
                "
                SELECT payload_json
                FROM router_events
                WHERE reservation_sid = ?1
                  AND event_type = ?2
                LIMIT 1
                ",
                params![reservation_sid, event_type.as_str()],
                row_to_event,
            )
            .optional()?;

        Ok(event)
    }

    pub fn insert_segment(&self, segment: &ConversationSegment) -> Result<(), StorageError> {
        let body_json = serde_json::to_string(segment)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        self.conn.execute(
            "
            INSERT INTO conversation_segments (
                segment_uuid,
                conversation_id,
                segment_kind,
                reservation_sid,
                agent_sid,
                ts,
                body_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                segment.segment_uuid.to_string(),
                segment.conversation_id,
                segment.segment_kind.as_str(),
                segment.reservation_sid,
                segment.agent_sid,
                format_ts(segment_ts(segment)),
                body_json,
            ],
        )?;

        Ok(())
    }

    /// Rewrites the row with the segment's identity. A missing row reports
    /// [`UpdateOutcome::NotFound`]; the caller decides what that means.
    pub fn update_segment(
        &self,
        segment: &ConversationSegment,
    ) -> Result<UpdateOutcome, StorageError> {
        let body_json = serde_json::to_string(segment)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        let changes = self.conn.execute(
            "
            UPDATE conversation_segments
            SET conversation_id = ?2,
                segment_kind = ?3,
                reservation_sid = ?4,
                agent_sid = ?5,
                ts = ?6,
                body_json = ?7
            WHERE segment_uuid = ?1
            ",
            params![
                segment.segment_uuid.to_string(),
                segment.conversation_id,
                segment.segment_kind.as_str(),
                segment.reservation_sid,
                segment.agent_sid,
                format_ts(segment_ts(segment)),
                body_json,
            ],
        )?;

        Ok(if changes > 0 {
            UpdateOutcome::Updated
        } else {
            UpdateOutcome::NotFound
        })
    }

    /// The open conversation row for a reservation, if one exists. At most
    /// one row per reservation carries the in-progress kind.
    pub fn conversation_in_progress(
        &self,
        reservation_sid: &str,
    ) -> Result<Option<ConversationSegment>, StorageError> {
        self.segment_by_key_and_kind(
            "reservation_sid",
            reservation_sid,
            SegmentKind::ConversationInProgress,
        )
    }

    /// The open activity row for an agent, if one exists.
    pub fn agent_status_in_progress(
        &self,
        agent_sid: &str,
    ) -> Result<Option<ConversationSegment>, StorageError> {
        self.segment_by_key_and_kind("agent_sid", agent_sid, SegmentKind::AgentStatusInProgress)
    }

    fn segment_by_key_and_kind(
        &self,
        key_column: &str,
        key: &str,
        kind: SegmentKind,
    ) -> Result<Option<ConversationSegment>, StorageError> {
        let sql = format!(
            "
            SELECT body_json
            FROM conversation_segments
            WHERE {key_column} = ?1
              AND segment_kind = ?2
            LIMIT 1
            "
        );
        let segment = self
            .conn
            .query_row(&sql, params![key, kind.as_str()], row_to_segment)
            .optional()?;

        Ok(segment)
    }

    pub fn segments_for_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ConversationSegment>, StorageError> {
        let mut statement = self.conn.prepare(
            "
            SELECT body_json
            FROM conversation_segments
            WHERE conversation_id = ?1
            ORDER BY ts ASC
            ",
        )?;

        let rows = statement.query_map([conversation_id], row_to_segment)?;
        let mut segments = Vec::new();
        for row in rows {
            segments.push(row?);
        }
        Ok(segments)
    }

    pub fn all_segments(&self) -> Result<Vec<ConversationSegment>, StorageError> {
        let mut statement = self.conn.prepare(
            "
            SELECT body_json
            FROM conversation_segments
            ORDER BY ts ASC
            ",
        )?;

        let rows = statement.query_map([], row_to_segment)?;
        let mut segments = Vec::new();
        for row in rows {
            segments.push(row?);
        }
        Ok(segments)
    }

    pub fn insert_agent(&self, agent: &AgentRecord) -> Result<(), StorageError> {
        let body_json = serde_json::to_string(agent)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        self.conn.execute(
            "
            INSERT INTO agents (
                agent_sid,
                state,
                date_joined,
                date_left,
                body_json
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                agent.agent_sid,
                agent.state.as_str(),
                format_ts(agent.date_joined),
                agent.date_left.map(format_ts),
                body_json,
            ],
        )?;

        Ok(())
    }

    pub fn update_agent(&self, agent: &AgentRecord) -> Result<UpdateOutcome, StorageError> {
        let body_json = serde_json::to_string(agent)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        let changes = self.conn.execute(
            "
            UPDATE agents
            SET state = ?2,
                date_joined = ?3,
                date_left = ?4,
                body_json = ?5
            WHERE agent_sid = ?1
            ",
            params![
                agent.agent_sid,
                agent.state.as_str(),
                format_ts(agent.date_joined),
                agent.date_left.map(format_ts),
                body_json,
            ],
        )?;

        Ok(if changes > 0 {
            UpdateOutcome::Updated
        } else {
            UpdateOutcome::NotFound
        })
    }

    pub fn get_agent(&self, agent_sid: &str) -> Result<Option<AgentRecord>, StorageError> {
        let agent = self
            .conn
            .query_row(
                "
                SELECT body_json
                FROM agents
                WHERE agent_sid = ?1
                ",
                [agent_sid],
                row_to_agent,
            )
            .optional()?;

        Ok(agent)
    }

    pub fn all_agents(&self) -> Result<Vec<AgentRecord>, StorageError> {
        let mut statement = self.conn.prepare(
            "
            SELECT body_json
            FROM agents
            ORDER BY agent_sid ASC
            ",
        )?;

        let rows = statement.query_map([], row_to_agent)?;
        let mut agents = Vec::new();
        for row in rows {
            agents.push(row?);
        }
        Ok(agents)
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StorageError> {
        let exists = self
            .conn
            .query_row(
                "
                SELECT 1
                FROM sqlite_master
                WHERE type='table' AND name = ?1
                LIMIT 1
                ",
                [table_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(exists.is_some())
    }
}

/// Fixed-width UTC text so lexicographic `ts` comparisons in SQL match
/// chronological order.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn segment_ts(segment: &ConversationSegment) -> DateTime<Utc> {
    Utc.from_utc_datetime(&segment.date.and_time(segment.time))
}

fn row_to_event(row: &rusqlite::Row<'_>) -> Result<RouterEvent, rusqlite::Error> {
    let payload_json: String = row.get(0)?;
    serde_json::from_str(&payload_json).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
    })
}

fn row_to_segment(row: &rusqlite::Row<'_>) -> Result<ConversationSegment, rusqlite::Error> {
    let body_json: String = row.get(0)?;
    serde_json::from_str(&body_json).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
    })
}

fn row_to_agent(row: &rusqlite::Row<'_>) -> Result<AgentRecord, rusqlite::Error> {
    let body_json: String = row.get(0)?;
    serde_json::from_str(&body_json).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
    })
}
