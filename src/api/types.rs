//! Shared state and request/response bodies of the API layer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broadcast::TenantBroadcaster;
use crate::engine::RiskEngine;
use crate::models::{ChangeType, TriagePriority, TriageQueueEntry};

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub engine: Arc<RiskEngine>,
    /// Same broadcaster the engine publishes to; the gateway subscribes here.
    pub notifications: Arc<TenantBroadcaster>,
}

impl ApiContext {
    pub fn new(engine: Arc<RiskEngine>, notifications: Arc<TenantBroadcaster>) -> Self {
        Self {
            engine,
            notifications,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Bodies
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct ChangeRequest {
    pub change_type: ChangeType,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangeAccepted {
    pub event_id: Uuid,
    pub patient_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PriorityRequest {
    pub priority: TriagePriority,
    pub physician_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PhysicianQuery {
    pub physician_id: String,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub tenant_id: String,
    pub entries: Vec<TriageQueueEntry>,
    pub generated_at: String,
}
