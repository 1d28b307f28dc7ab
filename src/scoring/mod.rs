//! Risk Scoring Function: a pure, deterministic transform from a patient
//! snapshot to a multi-category risk assessment.
//!
//! No I/O, no clock, no shared state. Identical snapshots yield identical
//! assessments, including factor order and the creation timestamp (taken from
//! `snapshot.as_of`).

pub mod categories;
pub mod reference;

use crate::models::{PatientClinicalSnapshot, RiskAssessment, RiskCategoryScore};

use reference as r;

/// Score every category and aggregate them into one assessment (version 1;
/// the processor re-stamps the version when it publishes).
pub fn calculate_risk_scores(snapshot: &PatientClinicalSnapshot) -> RiskAssessment {
    let categories = vec![
        categories::cardiac(snapshot),
        categories::respiratory(snapshot),
        categories::infection(snapshot),
        categories::medication(snapshot),
    ];

    let mut score = overall_score(&categories);
    if needs_immediate_escalation(snapshot) {
        score = score.max(r::IMMEDIATE_SCORE_FLOOR);
    }

    RiskAssessment::new(
        snapshot.patient_id.clone(),
        snapshot.tenant_id.clone(),
        score,
        overall_confidence(snapshot),
        categories,
        snapshot.as_of.unwrap_or_default(),
    )
}

/// Blend of the worst category and the weighted mean, so one critical
/// category cannot be averaged away.
pub fn overall_score(categories: &[RiskCategoryScore]) -> u8 {
    let peak = categories.iter().map(|c| c.score()).max().unwrap_or(0) as f64;
    let mean: f64 = categories
        .iter()
        .map(|c| c.score() as f64 * r::category_weight(c.category()))
        .sum();
    let blended = r::PEAK_SHARE * peak + (1.0 - r::PEAK_SHARE) * mean;
    blended.round().clamp(0.0, 100.0) as u8
}

/// A vital outside the immediate bounds keeps the patient at High or above,
/// whatever the blend says.
pub fn needs_immediate_escalation(snapshot: &PatientClinicalSnapshot) -> bool {
    let v = &snapshot.vitals;
    r::VitalReadings {
        systolic: v.blood_pressure.map(|bp| bp.systolic),
        diastolic: v.blood_pressure.map(|bp| bp.diastolic),
        heart_rate: v.heart_rate,
        oxygen_saturation: v.oxygen_saturation,
        respiratory_rate: v.respiratory_rate,
        temperature: v.temperature,
    }
    .out_of_immediate_bounds()
}

/// Baseline plus data-group coverage, penalised when the snapshot is sparse.
pub fn overall_confidence(snapshot: &PatientClinicalSnapshot) -> u8 {
    let groups = snapshot.data_groups_present() as i32;
    let vitals = snapshot.vitals.present_count() as i32;
    let mut confidence = r::CONFIDENCE_BASELINE
        + groups * r::CONFIDENCE_PER_GROUP
        + vitals * r::CONFIDENCE_PER_VITAL;
    if groups <= 1 {
        confidence -= r::CONFIDENCE_SPARSE_PENALTY;
    }
    confidence.clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BloodPressure, LabResult, Medication, RiskCategory, RiskLevel};
    use chrono::{TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_snapshot(rng: &mut StdRng) -> PatientClinicalSnapshot {
        const CONDITIONS: &[&str] = &[
            "copd",
            "asthma",
            "heart failure",
            "hypertension",
            "diabetes",
            "hiv",
            "chronic kidney disease",
            "cirrhosis",
            "cancer",
            "migraine",
        ];
        const MEDS: &[&str] = &[
            "warfarin", "insulin", "metformin", "lisinopril", "morphine", "digoxin", "prednisone",
            "aspirin", "lithium", "atorvastatin", "amiodarone", "tacrolimus",
        ];
        const LABS: &[&str] = &[
            "troponin", "potassium", "lactate", "wbc", "inr", "creatinine", "abg", "sodium",
        ];

        let mut s = PatientClinicalSnapshot::new("p-rand", "t-rand");
        let maybe = |rng: &mut StdRng, lo: f64, hi: f64| {
            if rng.gen_bool(0.7) {
                Some(rng.gen_range(lo..hi))
            } else {
                None
            }
        };
        s.vitals.heart_rate = maybe(rng, 0.0, 260.0);
        s.vitals.temperature = maybe(rng, 25.0, 45.0);
        s.vitals.oxygen_saturation = maybe(rng, 40.0, 100.0);
        s.vitals.respiratory_rate = maybe(rng, 0.0, 70.0);
        if rng.gen_bool(0.7) {
            s.vitals.blood_pressure = Some(BloodPressure {
                systolic: rng.gen_range(40.0..300.0),
                diastolic: rng.gen_range(20.0..200.0),
            });
        }
        if rng.gen_bool(0.1) {
            s.vitals.heart_rate = Some(f64::NAN);
        }
        if rng.gen_bool(0.8) {
            s.age = Some(rng.gen_range(0..=130));
        }
        for c in CONDITIONS {
            if rng.gen_bool(0.25) {
                s.history.insert((*c).into());
            }
        }
        for m in MEDS {
            if rng.gen_bool(0.3) {
                s.medications.push(Medication {
                    name: (*m).into(),
                    dose: None,
                    frequency: None,
                });
            }
        }
        for l in LABS {
            if rng.gen_bool(0.3) {
                s.lab_results.push(LabResult {
                    test_name: (*l).into(),
                    value: Some(rng.gen_range(0.0..500.0)),
                    unit: None,
                    abnormal: rng.gen_bool(0.5),
                });
            }
        }
        s
    }

    #[test]
    fn scores_and_confidence_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(0x5eed_0001);
        for _ in 0..500 {
            let s = random_snapshot(&mut rng);
            let a = calculate_risk_scores(&s);
            assert!(a.overall_score() <= 100);
            assert!(a.confidence() <= 100);
            assert_eq!(a.overall_level(), RiskLevel::from_score(a.overall_score()));
            assert_eq!(a.categories().len(), 4);
            for c in a.categories() {
                assert!(c.score() <= 100);
                assert!(c.confidence() <= 100);
                assert_eq!(c.level(), RiskLevel::from_score(c.score()));
            }
        }
    }

    #[test]
    fn scoring_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(0x5eed_0002);
        for _ in 0..200 {
            let mut s = random_snapshot(&mut rng);
            s.as_of = Some(Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap());
            let first = serde_json::to_vec(&calculate_risk_scores(&s)).unwrap();
            let second = serde_json::to_vec(&calculate_risk_scores(&s)).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn empty_snapshot_is_low_with_reduced_confidence() {
        let s = PatientClinicalSnapshot::new("p-1", "t-1");
        let a = calculate_risk_scores(&s);
        assert_eq!(a.overall_score(), 0);
        assert_eq!(a.overall_level(), RiskLevel::Low);
        assert_eq!(a.confidence(), 30);
        assert_eq!(a.disclaimer(), crate::models::DISCLAIMER);
    }

    #[test]
    fn confidence_grows_with_data_groups() {
        let mut s = PatientClinicalSnapshot::new("p-1", "t-1");
        s.vitals.heart_rate = Some(80.0);
        let sparse = overall_confidence(&s);
        s.history.insert("asthma".into());
        s.medications.push(Medication {
            name: "salbutamol".into(),
            dose: None,
            frequency: None,
        });
        let richer = overall_confidence(&s);
        assert!(richer > sparse);
    }

    #[test]
    fn one_critical_category_dominates_overall() {
        let cats = vec![
            RiskCategoryScore::new(RiskCategory::Cardiac, 0, vec![], vec![], 50),
            RiskCategoryScore::new(RiskCategory::Respiratory, 100, vec![], vec![], 50),
            RiskCategoryScore::new(RiskCategory::Infection, 0, vec![], vec![], 50),
            RiskCategoryScore::new(RiskCategory::Medication, 0, vec![], vec![], 50),
        ];
        // 0.6 * 100 + 0.4 * 30 = 72
        assert_eq!(overall_score(&cats), 72);
    }

    #[test]
    fn crisis_blood_pressure_snapshot() {
        let mut s = PatientClinicalSnapshot::new("p-1", "t-1");
        s.vitals.blood_pressure = Some(BloodPressure {
            systolic: 200.0,
            diastolic: 120.0,
        });
        let a = calculate_risk_scores(&s);
        let cardiac = a.category(RiskCategory::Cardiac).unwrap();
        assert_eq!(cardiac.score(), 40);
        // The blend alone is 30 (Low); the crisis lifts it to the High floor.
        assert_eq!(overall_score(a.categories()), 30);
        assert_eq!(a.overall_score(), 60);
        assert_eq!(a.overall_level(), RiskLevel::High);
    }

    #[test]
    fn any_immediate_vital_lands_at_least_high() {
        let readings: [fn(&mut PatientClinicalSnapshot); 4] = [
            |s| s.vitals.oxygen_saturation = Some(85.0),
            |s| s.vitals.heart_rate = Some(35.0),
            |s| s.vitals.respiratory_rate = Some(34.0),
            |s| s.vitals.temperature = Some(34.0),
        ];
        for set in readings {
            let mut s = PatientClinicalSnapshot::new("p-1", "t-1");
            set(&mut s);
            let a = calculate_risk_scores(&s);
            assert!(a.overall_score() >= 60, "{:?}", s.vitals);
            assert!(a.overall_level() >= RiskLevel::High);
        }

        let mut calm = PatientClinicalSnapshot::new("p-1", "t-1");
        calm.vitals.heart_rate = Some(110.0);
        assert!(!needs_immediate_escalation(&calm));
        calm.vitals.heart_rate = Some(f64::NAN);
        assert!(!needs_immediate_escalation(&calm));
    }
}
