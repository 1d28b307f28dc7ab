//! Per-patient endpoints:
//! - `GET    .../assessment`  current assessment
//! - `GET    .../assessments` every persisted version
//! - `PUT    .../priority`    physician override
//! - `DELETE .../priority`    clear override
//! - `GET    .../audit`       override audit trail
//! - `GET    .../rejected`    changes rejected as malformed

use axum::extract::{Path, Query, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, PhysicianQuery, PriorityRequest};
use crate::models::{AuditEntry, RejectedChange, RiskAssessment, TriageQueueEntry};

use super::blocking;

type PatientPath = Path<(String, String)>;

pub async fn assessment(
    State(ctx): State<ApiContext>,
    Path((tenant_id, patient_id)): PatientPath,
) -> Result<Json<RiskAssessment>, ApiError> {
    let current = ctx
        .engine
        .current_assessment(&tenant_id, &patient_id)?
        .ok_or_else(|| ApiError::NotInQueue(patient_id.clone()))?;
    Ok(Json(RiskAssessment::clone(&current)))
}

pub async fn history(
    State(ctx): State<ApiContext>,
    Path((tenant_id, patient_id)): PatientPath,
) -> Result<Json<Vec<RiskAssessment>>, ApiError> {
    let engine = ctx.engine.clone();
    let versions = blocking(move || engine.assessment_history(&tenant_id, &patient_id)).await?;
    Ok(Json(versions))
}

pub async fn set_priority(
    State(ctx): State<ApiContext>,
    Path((tenant_id, patient_id)): PatientPath,
    Json(request): Json<PriorityRequest>,
) -> Result<Json<TriageQueueEntry>, ApiError> {
    let engine = ctx.engine.clone();
    let entry = blocking(move || {
        engine.update_triage_priority(
            &patient_id,
            request.priority,
            &request.physician_id,
            &tenant_id,
        )
    })
    .await?;
    Ok(Json(entry))
}

pub async fn clear_priority(
    State(ctx): State<ApiContext>,
    Path((tenant_id, patient_id)): PatientPath,
    Query(query): Query<PhysicianQuery>,
) -> Result<Json<TriageQueueEntry>, ApiError> {
    let engine = ctx.engine.clone();
    let entry = blocking(move || {
        engine.clear_triage_priority(&patient_id, &query.physician_id, &tenant_id)
    })
    .await?;
    Ok(Json(entry))
}

pub async fn audit(
    State(ctx): State<ApiContext>,
    Path((tenant_id, patient_id)): PatientPath,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let engine = ctx.engine.clone();
    let entries = blocking(move || engine.audit_entries(&tenant_id, &patient_id)).await?;
    Ok(Json(entries))
}

pub async fn rejected(
    State(ctx): State<ApiContext>,
    Path((tenant_id, patient_id)): PatientPath,
) -> Result<Json<Vec<RejectedChange>>, ApiError> {
    Ok(Json(ctx.engine.rejected_changes(&tenant_id, &patient_id)?))
}
