use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::{PatientClinicalSnapshot, PriorityOverride, RiskAssessment};

use super::{format_ts, parse_ts};

/// Insert an assessment as the patient's newest version.
/// Rejects versions that do not strictly increase.
pub fn insert_assessment(conn: &Connection, a: &RiskAssessment) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let current = current_version(&tx, a.patient_id())?;
    if i64::from(a.version()) <= current {
        return Err(DatabaseError::ConstraintViolation(format!(
            "assessment version {} does not follow stored version {current}",
            a.version()
        )));
    }
    tx.execute(
        "INSERT INTO risk_assessments (patient_id, tenant_id, version, overall_score, overall_level, confidence, model_version, created_at, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            a.patient_id(),
            a.tenant_id(),
            a.version(),
            a.overall_score(),
            a.overall_level().as_str(),
            a.confidence(),
            a.model_version(),
            format_ts(&a.created_at()),
            serde_json::to_string(a)?,
        ],
    )?;
    tx.commit()?;
    Ok(())
}

/// Highest stored version for a patient, 0 when none.
pub fn current_version(conn: &Connection, patient_id: &str) -> Result<i64, DatabaseError> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM risk_assessments WHERE patient_id = ?1",
        params![patient_id],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(version)
}

/// Get the current (newest) assessment for a patient.
pub fn get_current_assessment(
    conn: &Connection,
    patient_id: &str,
) -> Result<Option<RiskAssessment>, DatabaseError> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM risk_assessments WHERE patient_id = ?1 ORDER BY version DESC LIMIT 1",
            params![patient_id],
            |row| row.get(0),
        )
        .optional()?;
    body.map(|b| serde_json::from_str(&b).map_err(DatabaseError::from))
        .transpose()
}

/// Get every stored version for a patient, oldest first.
pub fn get_assessment_history(
    conn: &Connection,
    patient_id: &str,
) -> Result<Vec<RiskAssessment>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT body FROM risk_assessments WHERE patient_id = ?1 ORDER BY version ASC",
    )?;
    let bodies = stmt
        .query_map(params![patient_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    bodies
        .iter()
        .map(|b| serde_json::from_str(b).map_err(DatabaseError::from))
        .collect()
}

/// Get the current assessment of every patient, ordered by patient id.
pub fn list_current_assessments(conn: &Connection) -> Result<Vec<RiskAssessment>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT a.body FROM risk_assessments a
         JOIN (SELECT patient_id, MAX(version) AS version FROM risk_assessments GROUP BY patient_id) latest
           ON latest.patient_id = a.patient_id AND latest.version = a.version
         ORDER BY a.patient_id ASC",
    )?;
    let bodies = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    bodies
        .iter()
        .map(|b| serde_json::from_str(b).map_err(DatabaseError::from))
        .collect()
}

/// Insert or replace the merged snapshot for a patient.
pub fn upsert_snapshot(
    conn: &Connection,
    snapshot: &PatientClinicalSnapshot,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patient_snapshots (patient_id, tenant_id, body, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(patient_id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        params![
            snapshot.patient_id,
            snapshot.tenant_id,
            serde_json::to_string(snapshot)?,
        ],
    )?;
    Ok(())
}

pub fn get_snapshot(
    conn: &Connection,
    patient_id: &str,
) -> Result<Option<PatientClinicalSnapshot>, DatabaseError> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM patient_snapshots WHERE patient_id = ?1",
            params![patient_id],
            |row| row.get(0),
        )
        .optional()?;
    body.map(|b| serde_json::from_str(&b).map_err(DatabaseError::from))
        .transpose()
}

/// Set (`Some`) or clear (`None`) a patient's priority override.
pub fn set_priority_override(
    conn: &Connection,
    patient_id: &str,
    priority_override: Option<&PriorityOverride>,
) -> Result<(), DatabaseError> {
    match priority_override {
        Some(o) => {
            conn.execute(
                "INSERT INTO priority_overrides (patient_id, priority, physician_id, previous_priority, set_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(patient_id) DO UPDATE SET
                    priority = excluded.priority,
                    physician_id = excluded.physician_id,
                    previous_priority = excluded.previous_priority,
                    set_at = excluded.set_at",
                params![
                    patient_id,
                    o.priority.as_str(),
                    o.physician_id,
                    o.previous_priority.as_str(),
                    format_ts(&o.set_at),
                ],
            )?;
        }
        None => {
            conn.execute(
                "DELETE FROM priority_overrides WHERE patient_id = ?1",
                params![patient_id],
            )?;
        }
    }
    Ok(())
}

pub fn get_priority_override(
    conn: &Connection,
    patient_id: &str,
) -> Result<Option<PriorityOverride>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT priority, physician_id, previous_priority, set_at
             FROM priority_overrides WHERE patient_id = ?1",
            params![patient_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;
    row.map(
        |(priority, physician_id, previous, set_at)| -> Result<PriorityOverride, DatabaseError> {
            Ok(PriorityOverride {
                priority: priority.parse()?,
                physician_id,
                previous_priority: previous.parse()?,
                set_at: parse_ts("set_at", &set_at)?,
            })
        },
    )
    .transpose()
}
