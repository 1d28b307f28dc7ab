//! Patient registry: an arena of per-patient slots with a patient index and
//! a tenant index. Slots are never removed, so indices stay valid.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::models::{
    PatientClinicalSnapshot, PendingChangeEvent, PriorityOverride, RejectedChange,
    RiskAssessment, TriagePriority,
};

use super::EngineError;

/// Rejected changes kept per patient; the oldest are dropped first.
pub const MAX_REJECTED_PER_PATIENT: usize = 100;

/// What readers of a patient see. Replaced whole under a write lock so
/// nobody observes a half-published assessment.
#[derive(Debug, Clone, Default)]
pub struct SlotView {
    pub assessment: Option<Arc<RiskAssessment>>,
    pub priority_override: Option<PriorityOverride>,
}

impl SlotView {
    /// Override priority if set, otherwise the priority implied by the level.
    pub fn effective_priority(&self) -> Option<TriagePriority> {
        match (&self.priority_override, &self.assessment) {
            (Some(o), _) => Some(o.priority),
            (None, Some(a)) => Some(TriagePriority::from_level(a.overall_level())),
            (None, None) => None,
        }
    }
}

pub struct PatientSlot {
    pub patient_id: String,
    pub tenant_id: String,
    /// Many producers push, only the processor drains.
    queue: Mutex<VecDeque<PendingChangeEvent>>,
    /// Held for the whole drain/score/compare/persist cycle and for overrides.
    pub(crate) cycle: Mutex<()>,
    pub(crate) snapshot: Mutex<PatientClinicalSnapshot>,
    pub(crate) view: RwLock<SlotView>,
    pub(crate) stale: AtomicBool,
    /// Someone asked for a cycle while one was in flight.
    pub(crate) rerun: AtomicBool,
    /// Last cycle failed after merging; recompute even with an empty queue.
    pub(crate) needs_retry: AtomicBool,
    rejected: Mutex<VecDeque<RejectedChange>>,
}

impl PatientSlot {
    fn new(patient_id: &str, tenant_id: &str) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            tenant_id: tenant_id.to_string(),
            queue: Mutex::new(VecDeque::new()),
            cycle: Mutex::new(()),
            snapshot: Mutex::new(PatientClinicalSnapshot::new(patient_id, tenant_id)),
            view: RwLock::new(SlotView::default()),
            stale: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            needs_retry: AtomicBool::new(false),
            rejected: Mutex::new(VecDeque::new()),
        }
    }

    pub fn enqueue(&self, event: PendingChangeEvent) -> Result<usize, EngineError> {
        let mut queue = lock(&self.queue)?;
        queue.push_back(event);
        Ok(queue.len())
    }

    /// Take every queued event in FIFO order.
    pub fn drain(&self) -> Result<Vec<PendingChangeEvent>, EngineError> {
        Ok(lock(&self.queue)?.drain(..).collect())
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn has_work(&self) -> bool {
        self.pending() > 0 || self.needs_retry.load(Ordering::SeqCst)
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    pub fn view(&self) -> Result<SlotView, EngineError> {
        Ok(self
            .view
            .read()
            .map_err(|_| EngineError::LockPoisoned)?
            .clone())
    }

    pub fn rejected(&self) -> Result<Vec<RejectedChange>, EngineError> {
        Ok(lock(&self.rejected)?.iter().cloned().collect())
    }

    /// Append rejected changes, keeping only the most recent
    /// `MAX_REJECTED_PER_PATIENT`.
    pub fn record_rejected(
        &self,
        changes: impl IntoIterator<Item = RejectedChange>,
    ) -> Result<(), EngineError> {
        let mut rejected = lock(&self.rejected)?;
        rejected.extend(changes);
        let excess = rejected.len().saturating_sub(MAX_REJECTED_PER_PATIENT);
        rejected.drain(..excess);
        Ok(())
    }
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, EngineError> {
    m.lock().map_err(|_| EngineError::LockPoisoned)
}

#[derive(Default)]
struct Index {
    slots: Vec<Arc<PatientSlot>>,
    by_patient: HashMap<String, usize>,
    by_tenant: HashMap<String, Vec<usize>>,
}

#[derive(Default)]
pub struct PatientRegistry {
    index: RwLock<Index>,
}

impl PatientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for a patient, created on first sight. A patient id is bound to
    /// the tenant it was first seen with.
    pub fn get_or_create(
        &self,
        patient_id: &str,
        tenant_id: &str,
    ) -> Result<Arc<PatientSlot>, EngineError> {
        if let Some(slot) = self.get(patient_id)? {
            return check_tenant(slot, tenant_id);
        }
        let mut index = self.index.write().map_err(|_| EngineError::LockPoisoned)?;
        if let Some(&i) = index.by_patient.get(patient_id) {
            let slot = Arc::clone(&index.slots[i]);
            return check_tenant(slot, tenant_id);
        }
        let i = index.slots.len();
        index
            .slots
            .push(Arc::new(PatientSlot::new(patient_id, tenant_id)));
        index.by_patient.insert(patient_id.to_string(), i);
        index
            .by_tenant
            .entry(tenant_id.to_string())
            .or_default()
            .push(i);
        Ok(Arc::clone(&index.slots[i]))
    }

    pub fn get(&self, patient_id: &str) -> Result<Option<Arc<PatientSlot>>, EngineError> {
        let index = self.index.read().map_err(|_| EngineError::LockPoisoned)?;
        Ok(index
            .by_patient
            .get(patient_id)
            .map(|&i| Arc::clone(&index.slots[i])))
    }

    /// Slot for a patient that must belong to `tenant_id`.
    pub fn get_in_tenant(
        &self,
        tenant_id: &str,
        patient_id: &str,
    ) -> Result<Arc<PatientSlot>, EngineError> {
        let slot = self
            .get(patient_id)?
            .ok_or_else(|| EngineError::UnknownPatient(patient_id.to_string()))?;
        check_tenant(slot, tenant_id)
    }

    pub fn tenant_slots(&self, tenant_id: &str) -> Result<Vec<Arc<PatientSlot>>, EngineError> {
        let index = self.index.read().map_err(|_| EngineError::LockPoisoned)?;
        Ok(index
            .by_tenant
            .get(tenant_id)
            .map(|ids| ids.iter().map(|&i| Arc::clone(&index.slots[i])).collect())
            .unwrap_or_default())
    }

    pub fn all_slots(&self) -> Result<Vec<Arc<PatientSlot>>, EngineError> {
        let index = self.index.read().map_err(|_| EngineError::LockPoisoned)?;
        Ok(index.slots.clone())
    }

    pub fn len(&self) -> usize {
        self.index.read().map(|i| i.slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_tenant(slot: Arc<PatientSlot>, tenant_id: &str) -> Result<Arc<PatientSlot>, EngineError> {
    if slot.tenant_id == tenant_id {
        Ok(slot)
    } else {
        Err(EngineError::TenantMismatch {
            patient_id: slot.patient_id.clone(),
            requested: tenant_id.to_string(),
        })
    }
}
