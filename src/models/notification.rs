use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{NotificationPriority, RiskLevel};

/// Ephemeral message handed to the publish boundary. Never persisted by the
/// engine itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskChangeNotification {
    pub patient_id: String,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
    pub priority: NotificationPriority,
    pub changes: Vec<String>,
    pub new_score: u8,
    pub new_level: RiskLevel,
    pub recommendations: Vec<String>,
    pub disclaimer: String,
}
