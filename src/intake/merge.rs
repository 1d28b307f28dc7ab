//! Snapshot merge policy.
//!
//! Events apply in FIFO order onto a copy of the snapshot. Overlapping scalar
//! fields are last-write-wins, medications and labs are keyed maps on the
//! lowercased name, history is a set. The copy is returned only when every
//! event merged.

use crate::models::{
    BloodPressure, LabResult, Medication, PatientClinicalSnapshot, PendingChangeEvent,
};

use super::payload::{parse_change, ClinicalChange, ListAction, VitalsUpdate};
use super::MergeFailure;

pub fn merge_events(
    base: &PatientClinicalSnapshot,
    events: &[PendingChangeEvent],
) -> Result<PatientClinicalSnapshot, MergeFailure> {
    let mut merged = base.clone();
    for event in events {
        let change = parse_change(event.change_type, &event.payload).map_err(|source| {
            MergeFailure {
                event_id: event.event_id,
                source,
            }
        })?;
        apply_change(&mut merged, change);
        merged.as_of = Some(match merged.as_of {
            Some(prev) if prev > event.enqueued_at => prev,
            _ => event.enqueued_at,
        });
    }
    Ok(merged)
}

pub fn apply_change(snapshot: &mut PatientClinicalSnapshot, change: ClinicalChange) {
    match change {
        ClinicalChange::Vitals(update) => apply_vitals(snapshot, update),
        ClinicalChange::Medications(changes) => {
            for c in changes {
                let key = c.name.to_lowercase();
                let pos = snapshot
                    .medications
                    .iter()
                    .position(|m| m.name.to_lowercase() == key);
                match (c.action, pos) {
                    (ListAction::Remove, Some(i)) => {
                        snapshot.medications.remove(i);
                    }
                    (ListAction::Remove, None) => {}
                    (ListAction::Upsert, Some(i)) => {
                        let existing = &mut snapshot.medications[i];
                        existing.name = c.name;
                        if c.dose.is_some() {
                            existing.dose = c.dose;
                        }
                        if c.frequency.is_some() {
                            existing.frequency = c.frequency;
                        }
                    }
                    (ListAction::Upsert, None) => snapshot.medications.push(Medication {
                        name: c.name,
                        dose: c.dose,
                        frequency: c.frequency,
                    }),
                }
            }
        }
        ClinicalChange::Labs(labs) => {
            for lab in labs {
                upsert_lab(&mut snapshot.lab_results, lab);
            }
        }
        ClinicalChange::History(changes) => {
            for c in changes {
                match c.action {
                    ListAction::Upsert => {
                        snapshot.history.insert(c.condition);
                    }
                    ListAction::Remove => {
                        snapshot.history.remove(&c.condition);
                    }
                }
            }
        }
        ClinicalChange::Demographics { age } => snapshot.age = Some(age),
    }
}

fn apply_vitals(snapshot: &mut PatientClinicalSnapshot, update: VitalsUpdate) {
    let vitals = &mut snapshot.vitals;
    let previous = vitals.blood_pressure;
    let systolic = update.systolic.or(previous.map(|bp| bp.systolic));
    let diastolic = update.diastolic.or(previous.map(|bp| bp.diastolic));
    if let (Some(systolic), Some(diastolic)) = (systolic, diastolic) {
        vitals.blood_pressure = Some(BloodPressure {
            systolic,
            diastolic,
        });
    } else if update.systolic.is_some() || update.diastolic.is_some() {
        tracing::debug!("Holding back half a blood pressure reading until its pair arrives");
    }
    if update.heart_rate.is_some() {
        vitals.heart_rate = update.heart_rate;
    }
    if update.temperature.is_some() {
        vitals.temperature = update.temperature;
    }
    if update.oxygen_saturation.is_some() {
        vitals.oxygen_saturation = update.oxygen_saturation;
    }
    if update.respiratory_rate.is_some() {
        vitals.respiratory_rate = update.respiratory_rate;
    }
}

fn upsert_lab(labs: &mut Vec<LabResult>, lab: LabResult) {
    let key = lab.test_name.to_lowercase();
    match labs.iter_mut().find(|l| l.test_name.to_lowercase() == key) {
        Some(existing) => *existing = lab,
        None => labs.push(lab),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangeType;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn event(change_type: ChangeType, payload: serde_json::Value) -> PendingChangeEvent {
        PendingChangeEvent::new("p-1", "t-1", change_type, payload)
    }

    fn base() -> PatientClinicalSnapshot {
        PatientClinicalSnapshot::new("p-1", "t-1")
    }

    #[test]
    fn later_vitals_overwrite_earlier_in_same_batch() {
        let events = vec![
            event(ChangeType::Vitals, json!({"heart_rate": 90, "temperature": 37.0})),
            event(ChangeType::Vitals, json!({"heart_rate": 125})),
        ];
        let merged = merge_events(&base(), &events).unwrap();
        assert_eq!(merged.vitals.heart_rate, Some(125.0));
        // Independent field from the first event survives.
        assert_eq!(merged.vitals.temperature, Some(37.0));
    }

    #[test]
    fn half_blood_pressure_combines_with_stored_pair() {
        let mut s = base();
        s.vitals.blood_pressure = Some(BloodPressure {
            systolic: 120.0,
            diastolic: 80.0,
        });
        let merged =
            merge_events(&s, &[event(ChangeType::Vitals, json!({"systolic_bp": 185}))]).unwrap();
        assert_eq!(
            merged.vitals.blood_pressure,
            Some(BloodPressure {
                systolic: 185.0,
                diastolic: 80.0
            })
        );

        let lone = merge_events(&base(), &[event(ChangeType::Vitals, json!({"systolic_bp": 185}))])
            .unwrap();
        assert_eq!(lone.vitals.blood_pressure, None);
    }

    #[test]
    fn medications_keyed_by_name_case_insensitively() {
        let events = vec![
            event(ChangeType::Medication, json!({"name": "Warfarin", "dose": "5mg"})),
            event(ChangeType::Medication, json!({"name": "warfarin", "dose": "7.5mg"})),
            event(ChangeType::Medication, json!({"name": "Metformin"})),
            event(ChangeType::Medication, json!({"name": "METFORMIN", "action": "remove"})),
        ];
        let merged = merge_events(&base(), &events).unwrap();
        assert_eq!(merged.medications.len(), 1);
        assert_eq!(merged.medications[0].dose.as_deref(), Some("7.5mg"));
    }

    #[test]
    fn latest_lab_per_test_wins() {
        let events = vec![
            event(ChangeType::Lab, json!({"test_name": "Lactate", "value": 4.5, "abnormal": true})),
            event(ChangeType::Lab, json!({"test_name": "lactate", "value": 1.2, "abnormal": false})),
        ];
        let merged = merge_events(&base(), &events).unwrap();
        assert_eq!(merged.lab_results.len(), 1);
        assert!(!merged.lab_results[0].abnormal);
    }

    #[test]
    fn history_is_a_set() {
        let events = vec![
            event(ChangeType::History, json!({"condition": "COPD"})),
            event(ChangeType::History, json!({"conditions": ["copd", "asthma"]})),
            event(ChangeType::History, json!({"condition": "asthma", "action": "remove"})),
        ];
        let merged = merge_events(&base(), &events).unwrap();
        assert_eq!(merged.history.len(), 1);
        assert!(merged.history.contains("copd"));
    }

    #[test]
    fn one_malformed_event_leaves_base_untouched() {
        let s = base();
        let bad = event(ChangeType::Medication, json!({"dose": "5mg"}));
        let bad_id = bad.event_id;
        let events = vec![event(ChangeType::Vitals, json!({"heart_rate": 140})), bad];
        let failure = merge_events(&s, &events).unwrap_err();
        assert_eq!(failure.event_id, bad_id);
        assert_eq!(s.vitals.heart_rate, None);
    }

    #[test]
    fn as_of_tracks_newest_event() {
        let mut first = event(ChangeType::Demographics, json!({"age": 70}));
        let second = event(ChangeType::Demographics, json!({"age": 71}));
        first.enqueued_at = second.enqueued_at + Duration::seconds(5);
        let merged = merge_events(&base(), &[first.clone(), second]).unwrap();
        assert_eq!(merged.as_of, Some(first.enqueued_at));
        assert_eq!(merged.age, Some(71));
        assert!(merged.as_of.unwrap() <= Utc::now() + Duration::seconds(10));
    }
}
