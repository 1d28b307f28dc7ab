//! Persistence and audit collaborator contracts.
//!
//! The engine depends only on these traits. `db::SqliteAssessmentStore` and
//! `db::SqliteAuditTrail` are the durable implementations; the in-memory ones
//! here back tests and ephemeral deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use rand::Rng;
use thiserror::Error;

use crate::config::RetryPolicy;
use crate::db::DatabaseError;
use crate::models::{AuditEntry, PatientClinicalSnapshot, PriorityOverride, RiskAssessment};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Version conflict: expected version above {current}, got {attempted}")]
    VersionConflict { current: u32, attempted: u32 },
}

impl StoreError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Database(DatabaseError::Sqlite(e)) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Audit trail unavailable: {0}")]
    Unavailable(String),
}

/// Everything the engine needs to rebuild one patient at startup.
#[derive(Debug, Clone)]
pub struct StoredPatient {
    pub assessment: RiskAssessment,
    pub snapshot: Option<PatientClinicalSnapshot>,
    pub priority_override: Option<PriorityOverride>,
}

/// Durable per-patient assessment history plus the state needed to resume.
pub trait AssessmentStore: Send + Sync {
    /// Append `assessment` as the patient's newest version. Versions must
    /// strictly increase.
    fn store_assessment(&self, patient_id: &str, assessment: &RiskAssessment)
        -> Result<(), StoreError>;

    fn load_previous_assessment(&self, patient_id: &str)
        -> Result<Option<RiskAssessment>, StoreError>;

    /// All stored versions, oldest first.
    fn load_history(&self, patient_id: &str) -> Result<Vec<RiskAssessment>, StoreError>;

    fn store_snapshot(&self, snapshot: &PatientClinicalSnapshot) -> Result<(), StoreError>;

    /// Set or clear (`None`) the patient's sticky override.
    fn store_priority_override(
        &self,
        patient_id: &str,
        priority_override: Option<&PriorityOverride>,
    ) -> Result<(), StoreError>;

    fn load_all_current(&self) -> Result<Vec<StoredPatient>, StoreError>;
}

/// Append-only audit collaborator.
pub trait AuditTrail: Send + Sync {
    fn append_audit_entry(&self, entry: &AuditEntry) -> Result<(), AuditError>;

    /// Entries for one patient, oldest first.
    fn entries_for_patient(
        &self,
        tenant_id: &str,
        patient_id: &str,
    ) -> Result<Vec<AuditEntry>, AuditError>;
}

// ═══════════════════════════════════════════════════════════
// In-memory implementations
// ═══════════════════════════════════════════════════════════

#[derive(Default)]
struct PatientRecord {
    history: Vec<RiskAssessment>,
    snapshot: Option<PatientClinicalSnapshot>,
    priority_override: Option<PriorityOverride>,
}

#[derive(Default)]
pub struct MemoryAssessmentStore {
    records: RwLock<HashMap<String, PatientRecord>>,
}

impl MemoryAssessmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".into())
}

impl AssessmentStore for MemoryAssessmentStore {
    fn store_assessment(
        &self,
        patient_id: &str,
        assessment: &RiskAssessment,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let record = records.entry(patient_id.to_string()).or_default();
        let current = record.history.last().map(|a| a.version()).unwrap_or(0);
        if assessment.version() <= current {
            return Err(StoreError::VersionConflict {
                current,
                attempted: assessment.version(),
            });
        }
        record.history.push(assessment.clone());
        Ok(())
    }

    fn load_previous_assessment(
        &self,
        patient_id: &str,
    ) -> Result<Option<RiskAssessment>, StoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records
            .get(patient_id)
            .and_then(|r| r.history.last().cloned()))
    }

    fn load_history(&self, patient_id: &str) -> Result<Vec<RiskAssessment>, StoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records
            .get(patient_id)
            .map(|r| r.history.clone())
            .unwrap_or_default())
    }

    fn store_snapshot(&self, snapshot: &PatientClinicalSnapshot) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records
            .entry(snapshot.patient_id.clone())
            .or_default()
            .snapshot = Some(snapshot.clone());
        Ok(())
    }

    fn store_priority_override(
        &self,
        patient_id: &str,
        priority_override: Option<&PriorityOverride>,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records
            .entry(patient_id.to_string())
            .or_default()
            .priority_override = priority_override.cloned();
        Ok(())
    }

    fn load_all_current(&self) -> Result<Vec<StoredPatient>, StoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let mut out: Vec<StoredPatient> = records
            .values()
            .filter_map(|r| {
                r.history.last().map(|a| StoredPatient {
                    assessment: a.clone(),
                    snapshot: r.snapshot.clone(),
                    priority_override: r.priority_override.clone(),
                })
            })
            .collect();
        out.sort_by(|a, b| a.assessment.patient_id().cmp(b.assessment.patient_id()));
        Ok(out)
    }
}

#[derive(Default)]
pub struct MemoryAuditTrail {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditTrail for MemoryAuditTrail {
    fn append_audit_entry(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries
            .write()
            .map_err(|_| AuditError::Unavailable("lock poisoned".into()))?
            .push(entry.clone());
        Ok(())
    }

    fn entries_for_patient(
        &self,
        tenant_id: &str,
        patient_id: &str,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| AuditError::Unavailable("lock poisoned".into()))?;
        Ok(entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.patient_id == patient_id)
            .cloned()
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════
// Retry with backoff
// ═══════════════════════════════════════════════════════════

/// Wraps a store and retries transient failures with jittered exponential
/// backoff. Callers run on blocking threads, so the wait is a thread sleep.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: AssessmentStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn retry<T>(
        &self,
        operation: &'static str,
        mut call: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let base = self.policy.delay_for(attempt);
                    let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2);
                    let delay = base + std::time::Duration::from_millis(jitter_ms);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient store failure, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<S: AssessmentStore> AssessmentStore for RetryingStore<S> {
    fn store_assessment(
        &self,
        patient_id: &str,
        assessment: &RiskAssessment,
    ) -> Result<(), StoreError> {
        self.retry("store_assessment", || {
            self.inner.store_assessment(patient_id, assessment)
        })
    }

    fn load_previous_assessment(
        &self,
        patient_id: &str,
    ) -> Result<Option<RiskAssessment>, StoreError> {
        self.retry("load_previous_assessment", || {
            self.inner.load_previous_assessment(patient_id)
        })
    }

    fn load_history(&self, patient_id: &str) -> Result<Vec<RiskAssessment>, StoreError> {
        self.retry("load_history", || self.inner.load_history(patient_id))
    }

    fn store_snapshot(&self, snapshot: &PatientClinicalSnapshot) -> Result<(), StoreError> {
        self.retry("store_snapshot", || self.inner.store_snapshot(snapshot))
    }

    fn store_priority_override(
        &self,
        patient_id: &str,
        priority_override: Option<&PriorityOverride>,
    ) -> Result<(), StoreError> {
        self.retry("store_priority_override", || {
            self.inner.store_priority_override(patient_id, priority_override)
        })
    }

    fn load_all_current(&self) -> Result<Vec<StoredPatient>, StoreError> {
        self.retry("load_all_current", || self.inner.load_all_current())
    }
}
