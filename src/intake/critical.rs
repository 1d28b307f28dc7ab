//! Classification of changes that bypass the sweep tick.

use serde_json::Value;

use crate::models::ChangeType;
use crate::scoring::reference::{VitalReadings, CRITICAL_LABS, NTI_MEDICATIONS};

use super::payload::{parse_change, ClinicalChange, ListAction, VitalsUpdate};

/// True when the change must be processed at enqueue time rather than on
/// the next tick. A payload that does not parse is never critical; it fails
/// on its scheduled cycle instead.
pub fn is_critical_change(change_type: ChangeType, payload: &Value) -> bool {
    match parse_change(change_type, payload) {
        Ok(ClinicalChange::Vitals(v)) => vitals_out_of_bounds(&v),
        Ok(ClinicalChange::Medications(meds)) => meds.iter().any(|m| {
            m.action == ListAction::Upsert && {
                let name = m.name.to_lowercase();
                NTI_MEDICATIONS.iter().any(|n| name.contains(n))
            }
        }),
        Ok(ClinicalChange::Labs(labs)) => labs.iter().any(|l| {
            l.abnormal && {
                let name = l.test_name.to_lowercase();
                CRITICAL_LABS.iter().any(|n| name.contains(n))
            }
        }),
        Ok(ClinicalChange::History(_)) | Ok(ClinicalChange::Demographics { .. }) => false,
        Err(_) => false,
    }
}

fn vitals_out_of_bounds(v: &VitalsUpdate) -> bool {
    VitalReadings {
        systolic: v.systolic,
        diastolic: v.diastolic,
        heart_rate: v.heart_rate,
        oxygen_saturation: v.oxygen_saturation,
        respiratory_rate: v.respiratory_rate,
        temperature: v.temperature,
    }
    .out_of_immediate_bounds()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn crisis_blood_pressure_is_critical() {
        assert!(is_critical_change(
            ChangeType::Vitals,
            &json!({"blood_pressure": "200/120"})
        ));
        assert!(!is_critical_change(
            ChangeType::Vitals,
            &json!({"blood_pressure": "150/95"})
        ));
    }

    #[test]
    fn vital_bounds() {
        for payload in [
            json!({"heart_rate": 135}),
            json!({"heart_rate": 35}),
            json!({"oxygen_saturation": 85}),
            json!({"respiratory_rate": 34}),
            json!({"respiratory_rate": 6}),
            json!({"temperature": 40.6}),
            json!({"temperature": 34.2}),
            json!({"systolic_bp": 75}),
        ] {
            assert!(is_critical_change(ChangeType::Vitals, &payload), "{payload}");
        }
        assert!(!is_critical_change(
            ChangeType::Vitals,
            &json!({"heart_rate": 88, "oxygen_saturation": 97, "temperature": 37.2})
        ));
    }

    #[test]
    fn adding_nti_medication_is_critical_removing_is_not() {
        assert!(is_critical_change(
            ChangeType::Medication,
            &json!({"name": "Warfarin", "dose": "5mg"})
        ));
        assert!(!is_critical_change(
            ChangeType::Medication,
            &json!({"name": "Warfarin", "action": "remove"})
        ));
        assert!(!is_critical_change(
            ChangeType::Medication,
            &json!({"name": "Atorvastatin"})
        ));
    }

    #[test]
    fn abnormal_flag_on_critical_lab() {
        assert!(is_critical_change(
            ChangeType::Lab,
            &json!({"test_name": "Troponin T", "abnormal": true})
        ));
        assert!(!is_critical_change(
            ChangeType::Lab,
            &json!({"test_name": "Troponin T", "abnormal": false})
        ));
        assert!(!is_critical_change(
            ChangeType::Lab,
            &json!({"test_name": "Cholesterol", "abnormal": true})
        ));
    }

    #[test]
    fn history_and_malformed_are_never_critical() {
        assert!(!is_critical_change(ChangeType::History, &json!({"condition": "sepsis"})));
        assert!(!is_critical_change(ChangeType::Vitals, &json!("200/120")));
    }
}
