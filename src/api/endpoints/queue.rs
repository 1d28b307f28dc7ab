//! Triage queue endpoint.

use axum::extract::{Path, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, QueueResponse};

/// `GET /api/tenants/:tenant_id/queue`, most urgent first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Path(tenant_id): Path<String>,
) -> Result<Json<QueueResponse>, ApiError> {
    let entries = ctx.engine.get_patient_queue(&tenant_id)?;
    Ok(Json(QueueResponse {
        tenant_id,
        entries,
        generated_at: chrono::Utc::now().to_rfc3339(),
    }))
}
