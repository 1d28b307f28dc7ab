use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ChangeType;

/// A raw clinical change waiting in a patient's FIFO queue.
/// Lives only until the processor drains it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChangeEvent {
    pub event_id: Uuid,
    pub patient_id: String,
    pub tenant_id: String,
    pub change_type: ChangeType,
    /// Opaque payload; interpreted only by `intake::merge`.
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

impl PendingChangeEvent {
    pub fn new(
        patient_id: impl Into<String>,
        tenant_id: impl Into<String>,
        change_type: ChangeType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            patient_id: patient_id.into(),
            tenant_id: tenant_id.into(),
            change_type,
            payload,
            enqueued_at: Utc::now(),
        }
    }
}

/// An event whose cycle failed on a malformed payload, kept for replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedChange {
    pub event: PendingChangeEvent,
    pub error: String,
    pub rejected_at: DateTime<Utc>,
}
