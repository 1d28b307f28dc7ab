//! SQLite-backed implementations of the persistence and audit contracts.
//!
//! Both adapters may share one connection; calls are short and run on
//! blocking threads, so a `std::sync::Mutex` serialises them.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::models::{AuditEntry, PatientClinicalSnapshot, PriorityOverride, RiskAssessment};
use crate::persistence::{AssessmentStore, AuditError, AuditTrail, StoreError, StoredPatient};

use super::repository::{self, ChainStatus};
use super::DatabaseError;

pub type SharedConnection = Arc<Mutex<Connection>>;

pub fn share(conn: Connection) -> SharedConnection {
    Arc::new(Mutex::new(conn))
}

pub struct SqliteAssessmentStore {
    conn: SharedConnection,
}

impl SqliteAssessmentStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("database lock poisoned".into()))
    }
}

impl AssessmentStore for SqliteAssessmentStore {
    fn store_assessment(
        &self,
        patient_id: &str,
        assessment: &RiskAssessment,
    ) -> Result<(), StoreError> {
        if assessment.patient_id() != patient_id {
            return Err(DatabaseError::ConstraintViolation(
                "assessment belongs to a different patient".into(),
            )
            .into());
        }
        let conn = self.lock()?;
        match repository::insert_assessment(&conn, assessment) {
            Err(DatabaseError::ConstraintViolation(_)) => Err(StoreError::VersionConflict {
                current: repository::current_version(&conn, patient_id)? as u32,
                attempted: assessment.version(),
            }),
            other => Ok(other?),
        }
    }

    fn load_previous_assessment(
        &self,
        patient_id: &str,
    ) -> Result<Option<RiskAssessment>, StoreError> {
        let conn = self.lock()?;
        Ok(repository::get_current_assessment(&conn, patient_id)?)
    }

    fn load_history(&self, patient_id: &str) -> Result<Vec<RiskAssessment>, StoreError> {
        let conn = self.lock()?;
        Ok(repository::get_assessment_history(&conn, patient_id)?)
    }

    fn store_snapshot(&self, snapshot: &PatientClinicalSnapshot) -> Result<(), StoreError> {
        let conn = self.lock()?;
        Ok(repository::upsert_snapshot(&conn, snapshot)?)
    }

    fn store_priority_override(
        &self,
        patient_id: &str,
        priority_override: Option<&PriorityOverride>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        Ok(repository::set_priority_override(
            &conn,
            patient_id,
            priority_override,
        )?)
    }

    fn load_all_current(&self) -> Result<Vec<StoredPatient>, StoreError> {
        let conn = self.lock()?;
        repository::list_current_assessments(&conn)?
            .into_iter()
            .map(|assessment| -> Result<StoredPatient, StoreError> {
                let patient_id = assessment.patient_id().to_string();
                Ok(StoredPatient {
                    snapshot: repository::get_snapshot(&conn, &patient_id)?,
                    priority_override: repository::get_priority_override(&conn, &patient_id)?,
                    assessment,
                })
            })
            .collect()
    }
}

pub struct SqliteAuditTrail {
    conn: SharedConnection,
}

impl SqliteAuditTrail {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AuditError> {
        self.conn
            .lock()
            .map_err(|_| AuditError::Unavailable("database lock poisoned".into()))
    }

    pub fn verify_chain(&self) -> Result<ChainStatus, AuditError> {
        let conn = self.lock()?;
        Ok(repository::verify_chain(&conn)?)
    }
}

impl AuditTrail for SqliteAuditTrail {
    fn append_audit_entry(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let conn = self.lock()?;
        Ok(repository::append_audit_entry(&conn, entry)?)
    }

    fn entries_for_patient(
        &self,
        tenant_id: &str,
        patient_id: &str,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let conn = self.lock()?;
        Ok(repository::get_audit_entries_for_patient(
            &conn, tenant_id, patient_id,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_database, open_memory_database};
    use crate::models::{AuditAction, RiskCategory, RiskCategoryScore, TriagePriority};
    use chrono::Utc;

    fn assessment(patient: &str, score: u8, version: u32) -> RiskAssessment {
        let cats = RiskCategory::ALL
            .iter()
            .map(|c| RiskCategoryScore::new(*c, score, vec![], vec![], 50))
            .collect();
        RiskAssessment::new(patient, "t-1", score, 50, cats, Utc::now()).with_version(version)
    }

    #[test]
    fn version_conflict_maps_to_store_error() {
        let store = SqliteAssessmentStore::new(share(open_memory_database().unwrap()));
        store.store_assessment("p-1", &assessment("p-1", 40, 1)).unwrap();
        let err = store
            .store_assessment("p-1", &assessment("p-1", 45, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                current: 1,
                attempted: 1
            }
        ));
    }

    #[test]
    fn mismatched_patient_rejected() {
        let store = SqliteAssessmentStore::new(share(open_memory_database().unwrap()));
        assert!(store
            .store_assessment("p-2", &assessment("p-1", 40, 1))
            .is_err());
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("riskwatch.db");
        {
            let conn = share(open_database(&path).unwrap());
            let store = SqliteAssessmentStore::new(conn.clone());
            let audit = SqliteAuditTrail::new(conn);
            store.store_assessment("p-1", &assessment("p-1", 70, 1)).unwrap();
            let mut snapshot = PatientClinicalSnapshot::new("p-1", "t-1");
            snapshot.age = Some(67);
            store.store_snapshot(&snapshot).unwrap();
            let o = PriorityOverride {
                priority: TriagePriority::Critical,
                physician_id: "dr-1".into(),
                set_at: Utc::now(),
                previous_priority: TriagePriority::High,
            };
            store.store_priority_override("p-1", Some(&o)).unwrap();
            audit
                .append_audit_entry(&AuditEntry::new(
                    AuditAction::PriorityOverride,
                    "p-1",
                    "dr-1",
                    "t-1",
                    "HIGH",
                    "CRITICAL",
                ))
                .unwrap();
        }

        let conn = share(open_database(&path).unwrap());
        let store = SqliteAssessmentStore::new(conn.clone());
        let audit = SqliteAuditTrail::new(conn);
        let all = store.load_all_current().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].assessment.overall_score(), 70);
        assert_eq!(all[0].snapshot.as_ref().and_then(|s| s.age), Some(67));
        assert_eq!(
            all[0].priority_override.as_ref().map(|o| o.priority),
            Some(TriagePriority::Critical)
        );
        assert_eq!(audit.entries_for_patient("t-1", "p-1").unwrap().len(), 1);
        assert_eq!(
            audit.verify_chain().unwrap(),
            ChainStatus::Intact { entries: 1 }
        );
    }
}
