//! Real-Time Risk Processor.
//!
//! One cycle per patient at a time: the slot's `cycle` mutex is taken with
//! `try_lock`, so a caller that finds a cycle in flight leaves its events in
//! the queue and raises `rerun`; the holder loops once more before returning.

use std::sync::atomic::Ordering;
use std::sync::{Arc, TryLockError};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::intake::{is_critical_change, merge_events};
use crate::models::{ChangeType, PendingChangeEvent, RejectedChange, RiskLevel};
use crate::persistence::StoreError;
use crate::scoring::calculate_risk_scores;

use super::compare::{compare_risk_assessments, Thresholds};
use super::notify::build_notification;
use super::registry::{lock, PatientSlot};
use super::{require, EngineError, RiskEngine};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub patient_id: String,
    pub events_merged: usize,
    pub score: u8,
    pub level: RiskLevel,
    /// Version written, if the candidate was persisted.
    pub persisted_version: Option<u32>,
    pub notified: bool,
    pub duration_ms: u64,
}

impl CycleReport {
    /// Fold a rerun into this report. Counts and durations add up; the
    /// score, level and version are the latest published ones.
    fn absorb(self, later: CycleReport) -> CycleReport {
        CycleReport {
            patient_id: self.patient_id,
            events_merged: self.events_merged + later.events_merged,
            score: later.score,
            level: later.level,
            persisted_version: later.persisted_version.or(self.persisted_version),
            notified: self.notified || later.notified,
            duration_ms: self.duration_ms + later.duration_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing queued and no retry pending.
    Idle,
    /// Another cycle holds the patient; it will pick the events up.
    Deferred,
    Completed(CycleReport),
}

impl RiskEngine {
    /// Accept a change for a patient and return its event id.
    ///
    /// Never waits on recomputation. A critical change starts a cycle right
    /// away: on the blocking pool when called inside a tokio runtime, inline
    /// otherwise.
    pub fn queue_risk_update(
        self: &Arc<Self>,
        patient_id: &str,
        tenant_id: &str,
        change_type: ChangeType,
        payload: serde_json::Value,
    ) -> Result<Uuid, EngineError> {
        require(patient_id, "patient_id")?;
        require(tenant_id, "tenant_id")?;

        let slot = self.registry.get_or_create(patient_id, tenant_id)?;
        let critical = is_critical_change(change_type, &payload);
        let event = PendingChangeEvent::new(patient_id, tenant_id, change_type, payload);
        let event_id = event.event_id;
        let depth = slot.enqueue(event)?;

        tracing::debug!(
            patient_id = %patient_id,
            tenant_id = %tenant_id,
            event_id = %event_id,
            change_type = change_type.as_str(),
            queue_depth = depth,
            critical,
            "Queued risk update"
        );

        if critical {
            self.dispatch_immediate(patient_id);
        }
        Ok(event_id)
    }

    fn dispatch_immediate(self: &Arc<Self>, patient_id: &str) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let engine = Arc::clone(self);
                let patient_id = patient_id.to_string();
                handle.spawn_blocking(move || engine.run_immediate(&patient_id));
            }
            Err(_) => self.run_immediate(patient_id),
        }
    }

    fn run_immediate(&self, patient_id: &str) {
        if let Err(e) = self.process_patient_risk_update(patient_id) {
            tracing::debug!(patient_id = %patient_id, error = %e, "Immediate cycle did not complete");
        }
    }

    /// Drain, merge, score, compare, then conditionally persist and notify.
    ///
    /// Returns `Deferred` without blocking when another cycle for the same
    /// patient is in flight.
    pub fn process_patient_risk_update(&self, patient_id: &str) -> Result<CycleOutcome, EngineError> {
        let slot = self
            .registry
            .get(patient_id)?
            .ok_or_else(|| EngineError::UnknownPatient(patient_id.to_string()))?;

        let mut outcome = CycleOutcome::Idle;
        loop {
            slot.rerun.store(true, Ordering::SeqCst);
            let guard = match slot.cycle.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => {
                    tracing::debug!(patient_id = %patient_id, "Cycle in flight, deferring");
                    return Ok(match outcome {
                        CycleOutcome::Idle => CycleOutcome::Deferred,
                        done => done,
                    });
                }
                // The guard protects no data; a panicked cycle left nothing half-written in it.
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            };
            slot.rerun.store(false, Ordering::SeqCst);
            let result = self.run_cycle(&slot);
            drop(guard);

            if let CycleOutcome::Completed(report) = result? {
                outcome = match outcome {
                    CycleOutcome::Completed(earlier) => CycleOutcome::Completed(earlier.absorb(report)),
                    _ => CycleOutcome::Completed(report),
                };
            }
            if !slot.rerun.load(Ordering::SeqCst) {
                return Ok(outcome);
            }
        }
    }

    /// One cycle. Caller holds the slot's cycle guard.
    fn run_cycle(&self, slot: &PatientSlot) -> Result<CycleOutcome, EngineError> {
        let started = Instant::now();
        let events = slot.drain()?;
        if events.is_empty() && !slot.needs_retry.load(Ordering::SeqCst) {
            return Ok(CycleOutcome::Idle);
        }
        let events_merged = events.len();

        let base = lock(&slot.snapshot)?.clone();
        let merged = match merge_events(&base, &events) {
            Ok(merged) => merged,
            Err(failure) => {
                let reason = failure.to_string();
                let rejected_at = Utc::now();
                slot.record_rejected(events.into_iter().map(|event| RejectedChange {
                    event,
                    error: reason.clone(),
                    rejected_at,
                }))?;
                slot.stale.store(true, Ordering::SeqCst);
                tracing::warn!(
                    patient_id = %slot.patient_id,
                    tenant_id = %slot.tenant_id,
                    event_id = %failure.event_id,
                    batch_size = events_merged,
                    error = %failure.source,
                    "Risk cycle failed, previous assessment retained"
                );
                return Err(failure.into());
            }
        };
        *lock(&slot.snapshot)? = merged.clone();

        let candidate = calculate_risk_scores(&merged);

        let published = slot.view()?.assessment;
        let previous = match published {
            Some(current) => Some(current),
            None => self
                .store
                .load_previous_assessment(&slot.patient_id)
                .map_err(|e| self.persistence_failed(slot, e))?
                .map(Arc::new),
        };

        let comparison =
            compare_risk_assessments(previous.as_deref(), &candidate, Thresholds::from(&self.config));
        let persist = comparison.significant_change
            || (comparison.priority_changed && self.config.persist_on_level_change);

        self.store
            .store_snapshot(&merged)
            .map_err(|e| self.persistence_failed(slot, e))?;

        let mut persisted_version = None;
        let subject = if persist {
            let version = previous.as_ref().map(|p| p.version() + 1).unwrap_or(1);
            let assessment = candidate.with_version(version);
            self.store
                .store_assessment(&slot.patient_id, &assessment)
                .map_err(|e| self.persistence_failed(slot, e))?;
            let assessment = Arc::new(assessment);
            slot.view
                .write()
                .map_err(|_| EngineError::LockPoisoned)?
                .assessment = Some(Arc::clone(&assessment));
            persisted_version = Some(version);
            assessment
        } else {
            if let Some(previous) = &previous {
                let mut view = slot.view.write().map_err(|_| EngineError::LockPoisoned)?;
                if view.assessment.is_none() {
                    view.assessment = Some(Arc::clone(previous));
                }
            }
            Arc::new(candidate)
        };

        let mut notified = false;
        if comparison.should_notify {
            let notification = build_notification(&subject, &comparison, Utc::now());
            match self.broadcaster.broadcast(&slot.tenant_id, &notification) {
                Ok(()) => notified = true,
                Err(e) => tracing::warn!(
                    patient_id = %slot.patient_id,
                    tenant_id = %slot.tenant_id,
                    error = %e,
                    "Risk notification not delivered"
                ),
            }
        }

        slot.stale.store(false, Ordering::SeqCst);
        slot.needs_retry.store(false, Ordering::SeqCst);

        let report = CycleReport {
            patient_id: slot.patient_id.clone(),
            events_merged,
            score: subject.overall_score(),
            level: subject.overall_level(),
            persisted_version,
            notified,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            patient_id = %slot.patient_id,
            tenant_id = %slot.tenant_id,
            events = report.events_merged,
            score = report.score,
            risk_level = report.level.as_str(),
            version = ?report.persisted_version,
            notified = report.notified,
            duration_ms = report.duration_ms,
            "Risk cycle completed"
        );
        Ok(CycleOutcome::Completed(report))
    }

    /// Keep the merged snapshot, flag the patient, and schedule a retry.
    fn persistence_failed(&self, slot: &PatientSlot, error: StoreError) -> EngineError {
        slot.needs_retry.store(true, Ordering::SeqCst);
        slot.stale.store(true, Ordering::SeqCst);
        tracing::warn!(
            patient_id = %slot.patient_id,
            tenant_id = %slot.tenant_id,
            error = %error,
            "Risk cycle failed at persistence, will retry on next sweep"
        );
        EngineError::Store(error)
    }
}
