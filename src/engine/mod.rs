//! Real-time risk recomputation and triage engine.
//!
//! `RiskEngine` owns the patient registry and talks to its collaborators
//! (assessment store, audit trail, broadcaster) only through traits. Change
//! events enter through `queue_risk_update`; cycles run either immediately
//! for critical changes or from the sweep scheduler, always under the
//! patient's cycle guard.

pub mod compare;
pub mod notify;
pub mod processor;
pub mod registry;
pub mod scheduler;
pub mod triage;

use std::sync::Arc;

use thiserror::Error;

use crate::broadcast::NotificationBroadcaster;
use crate::config::EngineConfig;
use crate::intake::MergeFailure;
use crate::models::{AuditEntry, RejectedChange, RiskAssessment};
use crate::persistence::{AssessmentStore, AuditError, AuditTrail, StoreError};

pub use compare::{compare_risk_assessments, AssessmentComparison, Thresholds};
pub use processor::{CycleOutcome, CycleReport};
pub use registry::{PatientRegistry, PatientSlot};
pub use scheduler::{start_sweep_scheduler, sweep_once, SweepReport, SweepSchedulerHandle};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid identifier: {0} must not be empty")]
    InvalidIdentifier(&'static str),

    #[error("Unknown patient: {0}")]
    UnknownPatient(String),

    #[error("Patient {patient_id} does not belong to tenant {requested}")]
    TenantMismatch {
        patient_id: String,
        requested: String,
    },

    #[error("Patient {0} has no assessment in the triage queue")]
    NotInQueue(String),

    #[error("Change could not be merged: {0}")]
    Merge(#[from] MergeFailure),

    #[error("Persistence failed: {0}")]
    Store(#[from] StoreError),

    #[error("Audit write failed: {0}")]
    Audit(#[from] AuditError),

    #[error("Engine lock poisoned")]
    LockPoisoned,
}

pub struct RiskEngine {
    registry: PatientRegistry,
    store: Arc<dyn AssessmentStore>,
    audit: Arc<dyn AuditTrail>,
    broadcaster: Arc<dyn NotificationBroadcaster>,
    config: EngineConfig,
}

impl RiskEngine {
    pub fn new(
        store: Arc<dyn AssessmentStore>,
        audit: Arc<dyn AuditTrail>,
        broadcaster: Arc<dyn NotificationBroadcaster>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry: PatientRegistry::new(),
            store,
            audit,
            broadcaster,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &PatientRegistry {
        &self.registry
    }

    /// Rebuild every stored patient's current assessment, snapshot and
    /// override so the queue is populated before new events arrive.
    pub fn warm_load(&self) -> Result<usize, EngineError> {
        let stored = self.store.load_all_current()?;
        let count = stored.len();
        for patient in stored {
            let slot = self.registry.get_or_create(
                patient.assessment.patient_id(),
                patient.assessment.tenant_id(),
            )?;
            if let Some(snapshot) = patient.snapshot {
                *registry::lock(&slot.snapshot)? = snapshot;
            }
            let mut view = slot.view.write().map_err(|_| EngineError::LockPoisoned)?;
            view.assessment = Some(Arc::new(patient.assessment));
            view.priority_override = patient.priority_override;
        }
        tracing::info!(patients = count, "Warm-loaded current assessments");
        Ok(count)
    }

    /// The published current assessment of one patient.
    pub fn current_assessment(
        &self,
        tenant_id: &str,
        patient_id: &str,
    ) -> Result<Option<Arc<RiskAssessment>>, EngineError> {
        let slot = self.registry.get_in_tenant(tenant_id, patient_id)?;
        Ok(slot.view()?.assessment)
    }

    /// Every persisted version, oldest first.
    pub fn assessment_history(
        &self,
        tenant_id: &str,
        patient_id: &str,
    ) -> Result<Vec<RiskAssessment>, EngineError> {
        self.registry.get_in_tenant(tenant_id, patient_id)?;
        Ok(self.store.load_history(patient_id)?)
    }

    pub fn audit_entries(
        &self,
        tenant_id: &str,
        patient_id: &str,
    ) -> Result<Vec<AuditEntry>, EngineError> {
        self.registry.get_in_tenant(tenant_id, patient_id)?;
        Ok(self.audit.entries_for_patient(tenant_id, patient_id)?)
    }

    /// Events whose cycle failed on a malformed payload, kept for replay.
    pub fn rejected_changes(
        &self,
        tenant_id: &str,
        patient_id: &str,
    ) -> Result<Vec<RejectedChange>, EngineError> {
        self.registry.get_in_tenant(tenant_id, patient_id)?.rejected()
    }

    /// Patients with queued events or a pending retry.
    pub fn patients_with_work(&self) -> Result<Vec<String>, EngineError> {
        Ok(self
            .registry
            .all_slots()?
            .into_iter()
            .filter(|s| s.has_work())
            .map(|s| s.patient_id.clone())
            .collect())
    }
}

pub(crate) fn require(value: &str, name: &'static str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        Err(EngineError::InvalidIdentifier(name))
    } else {
        Ok(())
    }
}
