use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AuditAction;

/// Who changed what, from what, to what, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub patient_id: String,
    pub physician_id: String,
    pub tenant_id: String,
    pub previous_value: String,
    pub new_value: String,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        patient_id: &str,
        physician_id: &str,
        tenant_id: &str,
        previous_value: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            patient_id: patient_id.to_string(),
            physician_id: physician_id.to_string(),
            tenant_id: tenant_id.to_string(),
            previous_value: previous_value.into(),
            new_value: new_value.into(),
        }
    }
}
