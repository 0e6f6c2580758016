//! The derived conversation segment: one reporting row per lifecycle phase
//! of a contact or a worker. [`ConversationSegment::from_event`] builds the
//! default row for an event; the dispatcher overlays the per-kind facts on
//! top of it.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attributes::{join_hierarchy, CustomData};
use crate::event::RouterEvent;
use crate::truncate_millis;

/// Reporting kind of a segment. The in-progress kinds are upsert targets
/// for the matching terminal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    #[serde(rename = "QUEUE")]
    Queue,
    #[serde(rename = "CONVERSATION")]
    Conversation,
    #[serde(rename = "CONVERSATION IN PROGRESS")]
    ConversationInProgress,
    #[serde(rename = "REJECTED CONVERSATION")]
    RejectedConversation,
    #[serde(rename = "MISSED CONVERSATION")]
    MissedConversation,
    #[serde(rename = "REVOKED CONVERSATION")]
    RevokedConversation,
    #[serde(rename = "AGENT STATUS")]
    AgentStatus,
    #[serde(rename = "AGENT STATUS IN PROGRESS")]
    AgentStatusInProgress,
}

impl SegmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Queue => "QUEUE",
            SegmentKind::Conversation => "CONVERSATION",
            SegmentKind::ConversationInProgress => "CONVERSATION IN PROGRESS",
            SegmentKind::RejectedConversation => "REJECTED CONVERSATION",
            SegmentKind::MissedConversation => "MISSED CONVERSATION",
            SegmentKind::RevokedConversation => "REVOKED CONVERSATION",
            SegmentKind::AgentStatus => "AGENT STATUS",
            SegmentKind::AgentStatusInProgress => "AGENT STATUS IN PROGRESS",
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SegmentKind {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim() {
            "QUEUE" => Ok(SegmentKind::Queue),
            "CONVERSATION" => Ok(SegmentKind::Conversation),
            "CONVERSATION IN PROGRESS" => Ok(SegmentKind::ConversationInProgress),
            "REJECTED CONVERSATION" => Ok(SegmentKind::RejectedConversation),
            "MISSED CONVERSATION" => Ok(SegmentKind::MissedConversation),
            "REVOKED CONVERSATION" => Ok(SegmentKind::RevokedConversation),
            "AGENT STATUS" => Ok(SegmentKind::AgentStatus),
            "AGENT STATUS IN PROGRESS" => Ok(SegmentKind::AgentStatusInProgress),
            other => Err(format!("Unknown segment kind: {other}")),
        }
    }
}

/// One derived reporting row. Fact fields are integer seconds; attribute
/// fields are the flat strings the reporting model exposes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSegment {
    pub segment_uuid: Uuid,
    pub segment_kind: SegmentKind,
    pub conversation_id: String,
    pub segment_external_id: String,
    /// Correlation key linking an in-progress row to its completion update.
    /// Empty for rows not tied to a reservation.
    pub reservation_sid: String,
    /// Links the row to the agent record. Empty for rows without a worker.
    pub agent_sid: String,

    // facts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abandon_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ring_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub talk_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapup_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_in_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_talk_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longest_silence_before_agent: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longest_talk_by_agent: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silence_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_talk_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_talk_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longest_silence_before_customer: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longest_talk_by_customer: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_response_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_response_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ivr_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,

    // attributes
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub abandoned: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abandoned_phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
    #[serde(default, rename = "case", skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_attribute_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_attribute_2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_attribute_3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_attribute_4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_attribute_5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_attribute_6: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_attribute_7: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_attribute_8: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_attribute_9: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_attribute_10: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_label_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_label_2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_label_3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_label_4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_label_5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_label_6: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_label_7: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_label_8: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_label_9: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_label_10: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub direction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handling_department_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handling_department_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handling_department_name_in_hierarchy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handling_team_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handling_team_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handling_team_name_in_hierarchy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hang_up_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_business_hours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiative: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ivr_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preceded_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub productive: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, rename = "virtual", skip_serializing_if = "Option::is_none")]
    pub virtual_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
}

impl ConversationSegment {
    /// Builds the default segment for an event: fresh identity, merged
    /// custom-data overrides, computed attribute defaults. Per-kind facts
    /// (queue/ring/talk/wrapup/abandon times) are overlaid by the caller.
    pub fn from_event(kind: SegmentKind, event: &RouterEvent, hierarchy_separator: &str) -> Self {
        let custom = CustomData::from_parts(&event.task_attributes, &event.worker_attributes);
        let stamped = truncate_millis(event.timestamp);

        let conversation_id = custom
            .conversation_id
            .clone()
            .or_else(|| event.task_sid.clone())
            .or_else(|| event.worker_sid.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let segment_external_id = event
            .task_sid
            .clone()
            .or_else(|| event.worker_sid.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let channel = custom.channel.clone().or_else(|| {
            match event.task_channel_unique_name.as_deref() {
                Some("voice") => Some("Call".to_string()),
                Some("chat") => Some("Chat".to_string()),
                other => other.map(str::to_string),
            }
        });
        let direction = custom.direction.clone().unwrap_or_else(|| {
            match event.task_attributes.direction.as_deref() {
                Some("internal") => "Internal".to_string(),
                Some("outbound") => "Outbound".to_string(),
                _ => "Inbound".to_string(),
            }
        });
        let external_contact = custom.external_contact.clone().or_else(|| {
            if event.task_attributes.direction.as_deref() == Some("outbound") {
                event.task_attributes.from.clone()
            } else {
                event.task_attributes.to.clone()
            }
        });
        let outcome = custom
            .outcome
            .clone()
            .or_else(|| event.task_attributes.reason.clone())
            .or_else(|| event.task_completed_reason.clone())
            .or_else(|| event.task_canceled_reason.clone());

        ConversationSegment {
            segment_uuid: Uuid::new_v4(),
            segment_kind: kind,
            conversation_id,
            segment_external_id,
            reservation_sid: event.reservation_sid.clone().unwrap_or_default(),
            agent_sid: event.worker_sid.clone().unwrap_or_default(),

            activity_time: event.worker_time_in_previous_activity,
            abandon_time: custom.abandon_time,
            queue_time: custom.queue_time,
            ring_time: custom.ring_time,
            talk_time: custom.talk_time,
            wrapup_time: custom.wrapup_time,
            time_in_seconds: custom.time_in_seconds,
            agent_talk_time: custom.agent_talk_time,
            longest_silence_before_agent: custom.longest_silence_before_agent,
            longest_talk_by_agent: custom.longest_talk_by_agent,
            silence_time: custom.silence_time,
            cross_talk_time: custom.cross_talk_time,
            customer_talk_time: custom.customer_talk_time,
            longest_silence_before_customer: custom.longest_silence_before_customer,
            longest_talk_by_customer: custom.longest_talk_by_customer,
            hold_time: custom.hold_time,
            average_response_time: custom.average_response_time,
            first_response_time: custom.first_response_time,
            focus_time: custom.focus_time,
            ivr_time: custom.ivr_time,
            priority: custom.priority,

            date: stamped.date_naive(),
            time: stamped.time(),
            abandoned: custom.abandoned.clone().unwrap_or_else(|| "N".to_string()),
            abandoned_phase: custom.abandoned_phase.clone(),
            activity: custom
                .activity
                .clone()
                .or_else(|| event.worker_activity_name.clone()),
            campaign: custom.campaign.clone(),
            case_id: custom.case_id.clone(),
            channel,
            content: custom.content.clone(),
            conversation_attribute_1: custom.conversation_attribute_1.clone(),
            conversation_attribute_2: custom.conversation_attribute_2.clone(),
            conversation_attribute_3: custom.conversation_attribute_3.clone(),
            conversation_attribute_4: custom.conversation_attribute_4.clone(),
            conversation_attribute_5: custom.conversation_attribute_5.clone(),
            conversation_attribute_6: custom.conversation_attribute_6.clone(),
            conversation_attribute_7: custom.conversation_attribute_7.clone(),
            conversation_attribute_8: custom.conversation_attribute_8.clone(),
            conversation_attribute_9: custom.conversation_attribute_9.clone(),
            conversation_attribute_10: custom.conversation_attribute_10.clone(),
            conversation_label_1: custom.conversation_label_1.clone(),
            conversation_label_2: custom.conversation_label_2.clone(),
            conversation_label_3: custom.conversation_label_3.clone(),
            conversation_label_4: custom.conversation_label_4.clone(),
            conversation_label_5: custom.conversation_label_5.clone(),
            conversation_label_6: custom.conversation_label_6.clone(),
            conversation_label_7: custom.conversation_label_7.clone(),
            conversation_label_8: custom.conversation_label_8.clone(),
            conversation_label_9: custom.conversation_label_9.clone(),
            conversation_label_10: custom.conversation_label_10.clone(),
            destination: custom.destination.clone(),
            direction,
            external_contact,
            followed_by: custom.followed_by.clone(),
            handling_department_id: custom.department_id.clone(),
            handling_department_name: custom.department_name.clone(),
            handling_department_name_in_hierarchy: custom
                .handling_department_name_in_hierarchy
                .as_ref()
                .and_then(|value| join_hierarchy(value, hierarchy_separator)),
            handling_team_id: custom
                .team_id
                .clone()
                .or_else(|| custom.team.clone())
                .or_else(|| event.task_queue_sid.clone()),
            handling_team_name: custom
                .team_name
                .clone()
                .or_else(|| custom.team.clone())
                .or_else(|| event.task_queue_name.clone()),
            handling_team_name_in_hierarchy: custom
                .team_name_in_hierarchy
                .as_ref()
                .and_then(|value| join_hierarchy(value, hierarchy_separator)),
            hang_up_by: custom.hang_up_by.clone(),
            in_business_hours: custom.in_business_hours.clone(),
            initiated_by: custom.initiated_by.clone(),
            initiative: custom.initiative.clone(),
            ivr_path: custom.ivr_path.clone(),
            language: custom.language.clone(),
            order: custom.order.clone(),
            outcome,
            preceded_by: custom.preceded_by.clone(),
            productive: custom.productive.clone(),
            queue: custom.queue.clone().or_else(|| event.task_queue_name.clone()),
            segment_link: custom.segment_link.clone(),
            service_level: custom.service_level.clone(),
            source: custom.source.clone(),
            virtual_: custom.virtual_.clone(),
            workflow: custom
                .workflow
                .clone()
                .or_else(|| event.workflow_name.clone()),
        }
    }
}
