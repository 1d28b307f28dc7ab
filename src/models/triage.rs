use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{RiskLevel, TriagePriority};

/// Read-only projection of a patient's current assessment for the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageQueueEntry {
    pub patient_id: String,
    pub priority: TriagePriority,
    pub urgency_score: u8,
    pub computed_at: DateTime<Utc>,
    pub risk_level: RiskLevel,
    pub assessment_version: u32,
    /// Priority comes from a physician override rather than the score.
    pub overridden: bool,
    /// Last recompute failed; the entry reflects older data.
    pub stale: bool,
    pub disclaimer: String,
}

/// A physician's manual priority, sticky until explicitly cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityOverride {
    pub priority: TriagePriority,
    pub physician_id: String,
    pub set_at: DateTime<Utc>,
    /// Effective priority just before the override was applied.
    pub previous_priority: TriagePriority,
}
