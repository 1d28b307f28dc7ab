//! Change intake endpoint.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ChangeAccepted, ChangeRequest};

/// `POST /api/tenants/:tenant_id/patients/:patient_id/changes`
///
/// Returns 202 as soon as the event is queued; recomputation happens later
/// (or right away on the blocking pool for critical changes).
pub async fn submit(
    State(ctx): State<ApiContext>,
    Path((tenant_id, patient_id)): Path<(String, String)>,
    Json(request): Json<ChangeRequest>,
) -> Result<(StatusCode, Json<ChangeAccepted>), ApiError> {
    let event_id =
        ctx.engine
            .queue_risk_update(&patient_id, &tenant_id, request.change_type, request.payload)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ChangeAccepted {
            event_id,
            patient_id,
        }),
    ))
}
