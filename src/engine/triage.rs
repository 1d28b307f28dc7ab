//! Triage Priority Queue projection and the Priority Override Coordinator.
//!
//! The queue is derived on every read from each slot's published view, so it
//! always reflects complete assessments. Overrides run under the patient's
//! cycle guard and become visible only after both the override and its audit
//! entry are durable.

use std::cmp::{Ordering, Reverse};
use std::sync::atomic;
use std::sync::{Arc, MutexGuard};

use chrono::Utc;

use crate::models::{
    AuditAction, AuditEntry, PriorityOverride, TriagePriority, TriageQueueEntry, DISCLAIMER,
};

use super::registry::{PatientSlot, SlotView};
use super::{require, EngineError, RiskEngine};

fn project(slot: &PatientSlot, view: &SlotView) -> Option<TriageQueueEntry> {
    let assessment = view.assessment.as_ref()?;
    let priority = view.effective_priority()?;
    Some(TriageQueueEntry {
        patient_id: slot.patient_id.clone(),
        priority,
        urgency_score: assessment.overall_score(),
        computed_at: assessment.created_at(),
        risk_level: assessment.overall_level(),
        assessment_version: assessment.version(),
        overridden: view.priority_override.is_some(),
        stale: slot.is_stale(),
        disclaimer: DISCLAIMER.to_string(),
    })
}

/// Priority rank, then descending urgency, then longest waiting. The patient
/// id breaks any remaining tie so the order is total.
pub fn queue_order(a: &TriageQueueEntry, b: &TriageQueueEntry) -> Ordering {
    (
        a.priority.rank(),
        Reverse(a.urgency_score),
        a.computed_at,
        &a.patient_id,
    )
        .cmp(&(
            b.priority.rank(),
            Reverse(b.urgency_score),
            b.computed_at,
            &b.patient_id,
        ))
}

impl RiskEngine {
    /// Every assessed patient of a tenant, most urgent first.
    pub fn get_patient_queue(&self, tenant_id: &str) -> Result<Vec<TriageQueueEntry>, EngineError> {
        require(tenant_id, "tenant_id")?;
        let mut entries = Vec::new();
        for slot in self.registry.tenant_slots(tenant_id)? {
            if let Some(entry) = project(&slot, &slot.view()?) {
                entries.push(entry);
            }
        }
        entries.sort_by(queue_order);
        Ok(entries)
    }

    /// The queue entry of one patient.
    pub fn queue_entry(&self, tenant_id: &str, patient_id: &str) -> Result<TriageQueueEntry, EngineError> {
        let slot = self.registry.get_in_tenant(tenant_id, patient_id)?;
        project(&slot, &slot.view()?).ok_or_else(|| EngineError::NotInQueue(patient_id.to_string()))
    }

    /// Apply a physician override together with its audit entry.
    ///
    /// If the audit write fails the stored override is rolled back and the
    /// queue keeps showing the previous priority.
    pub fn update_triage_priority(
        &self,
        patient_id: &str,
        new_priority: TriagePriority,
        physician_id: &str,
        tenant_id: &str,
    ) -> Result<TriageQueueEntry, EngineError> {
        require(patient_id, "patient_id")?;
        require(physician_id, "physician_id")?;
        require(tenant_id, "tenant_id")?;
        let slot = self.registry.get_in_tenant(tenant_id, patient_id)?;

        let entry = {
            let _guard = cycle_guard(&slot);
            let view = slot.view()?;
            let previous_priority = view
                .effective_priority()
                .ok_or_else(|| EngineError::NotInQueue(patient_id.to_string()))?;

            let priority_override = PriorityOverride {
                priority: new_priority,
                physician_id: physician_id.to_string(),
                set_at: Utc::now(),
                previous_priority,
            };
            let audit = AuditEntry::new(
                AuditAction::PriorityOverride,
                patient_id,
                physician_id,
                tenant_id,
                previous_priority.as_str(),
                new_priority.as_str(),
            );
            self.commit_override(&slot, &view, Some(priority_override), &audit)?;

            tracing::info!(
                patient_id = %patient_id,
                tenant_id = %tenant_id,
                physician_id = %physician_id,
                audit_id = %audit.id,
                from = previous_priority.as_str(),
                to = new_priority.as_str(),
                "Triage priority overridden"
            );
            project(&slot, &slot.view()?)
                .ok_or_else(|| EngineError::NotInQueue(patient_id.to_string()))?
        };
        self.resume_deferred(&slot);
        Ok(entry)
    }

    /// Remove a physician override, audited like setting one. Clearing a
    /// patient without an override changes nothing and writes no audit entry.
    pub fn clear_triage_priority(
        &self,
        patient_id: &str,
        physician_id: &str,
        tenant_id: &str,
    ) -> Result<TriageQueueEntry, EngineError> {
        require(patient_id, "patient_id")?;
        require(physician_id, "physician_id")?;
        require(tenant_id, "tenant_id")?;
        let slot = self.registry.get_in_tenant(tenant_id, patient_id)?;

        let entry = {
            let _guard = cycle_guard(&slot);
            let view = slot.view()?;
            let assessment = view
                .assessment
                .as_ref()
                .ok_or_else(|| EngineError::NotInQueue(patient_id.to_string()))?;

            if let Some(current) = &view.priority_override {
                let computed = TriagePriority::from_level(assessment.overall_level());
                let audit = AuditEntry::new(
                    AuditAction::PriorityCleared,
                    patient_id,
                    physician_id,
                    tenant_id,
                    current.priority.as_str(),
                    computed.as_str(),
                );
                self.commit_override(&slot, &view, None, &audit)?;
                tracing::info!(
                    patient_id = %patient_id,
                    tenant_id = %tenant_id,
                    physician_id = %physician_id,
                    audit_id = %audit.id,
                    "Triage priority override cleared"
                );
            }
            project(&slot, &slot.view()?)
                .ok_or_else(|| EngineError::NotInQueue(patient_id.to_string()))?
        };
        self.resume_deferred(&slot);
        Ok(entry)
    }

    /// Store the override, append the audit entry, then publish. Caller holds
    /// the cycle guard.
    fn commit_override(
        &self,
        slot: &PatientSlot,
        view: &SlotView,
        next: Option<PriorityOverride>,
        audit: &AuditEntry,
    ) -> Result<(), EngineError> {
        self.store
            .store_priority_override(&slot.patient_id, next.as_ref())?;

        if let Err(e) = self.audit.append_audit_entry(audit) {
            tracing::warn!(
                patient_id = %slot.patient_id,
                tenant_id = %slot.tenant_id,
                audit_id = %audit.id,
                error = %e,
                "Audit write failed, rolling back priority change"
            );
            if let Err(restore) = self
                .store
                .store_priority_override(&slot.patient_id, view.priority_override.as_ref())
            {
                tracing::error!(
                    patient_id = %slot.patient_id,
                    tenant_id = %slot.tenant_id,
                    error = %restore,
                    "Rollback of stored priority override failed"
                );
            }
            return Err(e.into());
        }

        slot.view
            .write()
            .map_err(|_| EngineError::LockPoisoned)?
            .priority_override = next;
        Ok(())
    }

    /// Run a cycle that deferred while an override held the guard.
    fn resume_deferred(&self, slot: &PatientSlot) {
        if !slot.rerun.load(atomic::Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.process_patient_risk_update(&slot.patient_id) {
            tracing::debug!(patient_id = %slot.patient_id, error = %e, "Deferred cycle did not complete");
        }
    }
}

fn cycle_guard(slot: &Arc<PatientSlot>) -> MutexGuard<'_, ()> {
    slot.cycle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::models::{AuditAction, ChangeType, RiskAssessment, RiskLevel};
    use crate::persistence::AssessmentStore;
    use chrono::{DateTime, Duration, TimeZone};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use serde_json::json;
    use std::sync::atomic::Ordering as AtomicOrdering;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    /// Publish an assessment directly, as a completed cycle would.
    fn seed(engine: &RiskEngine, patient_id: &str, tenant_id: &str, score: u8, at: DateTime<Utc>) {
        let slot = engine.registry().get_or_create(patient_id, tenant_id).unwrap();
        let assessment = RiskAssessment::new(patient_id, tenant_id, score, 70, vec![], at);
        slot.view.write().unwrap().assessment = Some(Arc::new(assessment));
    }

    fn ids(queue: &[TriageQueueEntry]) -> Vec<&str> {
        queue.iter().map(|e| e.patient_id.as_str()).collect()
    }

    #[test]
    fn lone_hypertensive_crisis_sorts_above_moderate_patients() {
        let h = harness();
        seed(&h.engine, "moderate", "t-1", 55, base_time());
        h.engine
            .queue_risk_update("crisis", "t-1", ChangeType::Vitals, json!({"blood_pressure": "200/120"}))
            .unwrap();

        let queue = h.engine.get_patient_queue("t-1").unwrap();
        assert_eq!(ids(&queue), vec!["crisis", "moderate"]);
        assert_eq!(queue[0].risk_level, RiskLevel::High);
        assert_ne!(queue[0].priority, TriagePriority::Normal);
    }

    #[test]
    fn critical_level_outranks_higher_score_with_high_priority() {
        let h = harness();
        seed(&h.engine, "a", "t-1", 85, base_time());
        seed(&h.engine, "b", "t-1", 90, base_time());
        h.engine
            .update_triage_priority("b", TriagePriority::High, "dr-1", "t-1")
            .unwrap();

        let queue = h.engine.get_patient_queue("t-1").unwrap();
        assert_eq!(ids(&queue), vec!["a", "b"]);
        assert_eq!(queue[0].priority, TriagePriority::Critical);
        assert_eq!(queue[1].priority, TriagePriority::High);
        assert!(queue.iter().all(|e| e.disclaimer == DISCLAIMER));
    }

    #[test]
    fn equal_priority_sorts_by_score_then_waiting_time() {
        let h = harness();
        seed(&h.engine, "late", "t-1", 65, base_time() + Duration::minutes(5));
        seed(&h.engine, "early", "t-1", 65, base_time());
        seed(&h.engine, "higher", "t-1", 75, base_time() + Duration::minutes(9));
        seed(&h.engine, "normal", "t-1", 20, base_time());

        let queue = h.engine.get_patient_queue("t-1").unwrap();
        assert_eq!(ids(&queue), vec!["higher", "early", "late", "normal"]);
    }

    #[test]
    fn queue_ordering_holds_for_random_tenants() {
        let mut rng = StdRng::seed_from_u64(0x7121_a6e);
        for round in 0..40 {
            let h = harness();
            let n = rng.gen_range(1..=50);
            for i in 0..n {
                let id = format!("p-{round}-{i}");
                let at = base_time() + Duration::seconds(rng.gen_range(0..4));
                seed(&h.engine, &id, "t-1", rng.gen_range(0..=100), at);
                if rng.gen_bool(0.2) {
                    let p = [TriagePriority::Critical, TriagePriority::High, TriagePriority::Normal]
                        [rng.gen_range(0..3)];
                    h.engine.update_triage_priority(&id, p, "dr-1", "t-1").unwrap();
                }
            }

            let queue = h.engine.get_patient_queue("t-1").unwrap();
            assert_eq!(queue.len(), n);
            for pair in queue.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                assert!(a.priority.rank() <= b.priority.rank());
                if a.priority == b.priority {
                    assert!(a.urgency_score >= b.urgency_score);
                    if a.urgency_score == b.urgency_score {
                        assert!(a.computed_at <= b.computed_at);
                    }
                }
            }
            assert_eq!(queue, h.engine.get_patient_queue("t-1").unwrap());
        }
    }

    #[test]
    fn queue_is_scoped_to_tenant_and_skips_unassessed() {
        let h = harness();
        seed(&h.engine, "a", "t-1", 50, base_time());
        seed(&h.engine, "b", "t-2", 90, base_time());
        h.engine
            .queue_risk_update("c", "t-1", ChangeType::Vitals, json!({"heart_rate": 72}))
            .unwrap();

        assert_eq!(ids(&h.engine.get_patient_queue("t-1").unwrap()), vec!["a"]);
        assert_eq!(ids(&h.engine.get_patient_queue("t-2").unwrap()), vec!["b"]);
        assert!(h.engine.get_patient_queue("t-3").unwrap().is_empty());
    }

    #[test]
    fn override_is_audited_and_persisted() {
        let h = harness();
        seed(&h.engine, "a", "t-1", 30, base_time());
        let entry = h
            .engine
            .update_triage_priority("a", TriagePriority::Critical, "dr-7", "t-1")
            .unwrap();
        assert_eq!(entry.priority, TriagePriority::Critical);
        assert!(entry.overridden);
        assert_eq!(entry.risk_level, RiskLevel::Low);

        let audit = h.engine.audit_entries("t-1", "a").unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::PriorityOverride);
        assert_eq!(audit[0].physician_id, "dr-7");
        assert_eq!(audit[0].previous_value, "NORMAL");
        assert_eq!(audit[0].new_value, "CRITICAL");
    }

    #[test]
    fn failed_audit_rolls_back_override() {
        let h = harness();
        h.engine
            .queue_risk_update("a", "t-1", ChangeType::Vitals, json!({"heart_rate": 72}))
            .unwrap();
        h.engine.process_patient_risk_update("a").unwrap();
        h.audit.fail.store(true, AtomicOrdering::SeqCst);

        let err = h
            .engine
            .update_triage_priority("a", TriagePriority::Critical, "dr-1", "t-1")
            .unwrap_err();
        assert!(matches!(err, EngineError::Audit(_)));

        let entry = h.engine.queue_entry("t-1", "a").unwrap();
        assert_eq!(entry.priority, TriagePriority::Normal);
        assert!(!entry.overridden);
        let stored = h.store.inner.load_all_current().unwrap();
        assert!(stored[0].priority_override.is_none());
        assert!(h.engine.audit_entries("t-1", "a").unwrap().is_empty());
    }

    #[test]
    fn failed_override_write_changes_nothing() {
        let h = harness();
        seed(&h.engine, "a", "t-1", 30, base_time());
        h.store.fail_override_writes.store(true, AtomicOrdering::SeqCst);
        let err = h
            .engine
            .update_triage_priority("a", TriagePriority::High, "dr-1", "t-1")
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
        assert!(!h.engine.queue_entry("t-1", "a").unwrap().overridden);
        assert!(h.engine.audit_entries("t-1", "a").unwrap().is_empty());
    }

    #[test]
    fn override_survives_recompute_until_cleared() {
        let h = harness();
        h.engine
            .queue_risk_update("a", "t-1", ChangeType::Vitals, json!({"heart_rate": 72}))
            .unwrap();
        h.engine.process_patient_risk_update("a").unwrap();
        h.engine
            .update_triage_priority("a", TriagePriority::Critical, "dr-1", "t-1")
            .unwrap();

        h.engine
            .queue_risk_update("a", "t-1", ChangeType::Vitals, json!({"heart_rate": 125}))
            .unwrap();
        h.engine.process_patient_risk_update("a").unwrap();
        let entry = h.engine.queue_entry("t-1", "a").unwrap();
        assert_eq!(entry.assessment_version, 2);
        assert_eq!(entry.priority, TriagePriority::Critical);

        let cleared = h.engine.clear_triage_priority("a", "dr-2", "t-1").unwrap();
        assert!(!cleared.overridden);
        assert_eq!(cleared.priority, TriagePriority::from_level(cleared.risk_level));

        let audit = h.engine.audit_entries("t-1", "a").unwrap();
        let actions: Vec<_> = audit.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![AuditAction::PriorityOverride, AuditAction::PriorityCleared]);
        assert_eq!(audit[1].physician_id, "dr-2");
    }

    #[test]
    fn clearing_without_override_is_a_no_op() {
        let h = harness();
        seed(&h.engine, "a", "t-1", 62, base_time());
        let entry = h.engine.clear_triage_priority("a", "dr-1", "t-1").unwrap();
        assert_eq!(entry.priority, TriagePriority::High);
        assert!(h.engine.audit_entries("t-1", "a").unwrap().is_empty());
    }

    #[test]
    fn override_requires_an_assessment() {
        let h = harness();
        h.engine
            .queue_risk_update("a", "t-1", ChangeType::Vitals, json!({"heart_rate": 72}))
            .unwrap();
        assert!(matches!(
            h.engine.update_triage_priority("a", TriagePriority::High, "dr-1", "t-1"),
            Err(EngineError::NotInQueue(_))
        ));
        assert!(matches!(
            h.engine.update_triage_priority("zz", TriagePriority::High, "dr-1", "t-1"),
            Err(EngineError::UnknownPatient(_))
        ));
        assert!(matches!(
            h.engine.update_triage_priority("a", TriagePriority::High, "", "t-1"),
            Err(EngineError::InvalidIdentifier("physician_id"))
        ));
    }

    #[test]
    fn stale_patients_are_flagged_in_queue() {
        let h = harness();
        h.engine
            .queue_risk_update("a", "t-1", ChangeType::Vitals, json!({"heart_rate": 72}))
            .unwrap();
        h.engine.process_patient_risk_update("a").unwrap();
        h.engine
            .queue_risk_update("a", "t-1", ChangeType::History, json!([1, 2]))
            .unwrap();
        assert!(h.engine.process_patient_risk_update("a").is_err());
        assert!(h.engine.queue_entry("t-1", "a").unwrap().stale);
    }

    #[test]
    fn cycle_deferred_by_override_resumes_afterwards() {
        let h = harness();
        seed(&h.engine, "a", "t-1", 30, base_time());
        let slot = h.engine.registry().get("a").unwrap().unwrap();
        h.engine
            .queue_risk_update("a", "t-1", ChangeType::Vitals, json!({"heart_rate": 72}))
            .unwrap();
        slot.rerun.store(true, AtomicOrdering::SeqCst);

        h.engine
            .update_triage_priority("a", TriagePriority::High, "dr-1", "t-1")
            .unwrap();
        assert_eq!(slot.pending(), 0);
    }
}
