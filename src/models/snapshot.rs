use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: f64,
    pub diastolic: f64,
}

/// Current vital-sign readings. Every reading is optional; absence is
/// "no evidence", never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    pub blood_pressure: Option<BloodPressure>,
    pub heart_rate: Option<f64>,
    /// Degrees Celsius.
    pub temperature: Option<f64>,
    /// Percent.
    pub oxygen_saturation: Option<f64>,
    /// Breaths per minute.
    pub respiratory_rate: Option<f64>,
}

impl VitalSigns {
    pub fn present_count(&self) -> usize {
        [
            self.blood_pressure.is_some(),
            self.heart_rate.is_some(),
            self.temperature.is_some(),
            self.oxygen_saturation.is_some(),
            self.respiratory_rate.is_some(),
        ]
        .iter()
        .filter(|p| **p)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.present_count() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    pub dose: Option<String>,
    pub frequency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabResult {
    pub test_name: String,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub abnormal: bool,
}

/// The current known clinical state of one patient.
///
/// Owned by the patient registry and only mutated by merging change events
/// (see `intake::merge`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientClinicalSnapshot {
    pub patient_id: String,
    pub tenant_id: String,
    pub age: Option<u32>,
    pub vitals: VitalSigns,
    /// Lowercased condition names.
    pub history: BTreeSet<String>,
    /// Unique by case-insensitive name, in first-seen order.
    pub medications: Vec<Medication>,
    /// Latest result per case-insensitive test name, in first-seen order.
    pub lab_results: Vec<LabResult>,
    /// Enqueue time of the newest merged event. Used as the assessment timestamp
    /// so scoring stays a pure function of the snapshot.
    pub as_of: Option<DateTime<Utc>>,
}

impl PatientClinicalSnapshot {
    pub fn new(patient_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            tenant_id: tenant_id.into(),
            age: None,
            vitals: VitalSigns::default(),
            history: BTreeSet::new(),
            medications: Vec::new(),
            lab_results: Vec::new(),
            as_of: None,
        }
    }

    /// Number of non-empty data groups (vitals, history, medications, labs).
    pub fn data_groups_present(&self) -> usize {
        [
            !self.vitals.is_empty(),
            !self.history.is_empty(),
            !self.medications.is_empty(),
            !self.lab_results.is_empty(),
        ]
        .iter()
        .filter(|p| **p)
        .count()
    }

    pub fn has_condition(&self, needle: &str) -> bool {
        self.history.iter().any(|c| c.contains(needle))
    }

    pub fn has_medication(&self, needle: &str) -> bool {
        self.medications
            .iter()
            .any(|m| m.name.to_lowercase().contains(needle))
    }

    /// First abnormal lab whose name contains `needle`.
    pub fn abnormal_lab(&self, needle: &str) -> Option<&LabResult> {
        self.lab_results
            .iter()
            .find(|l| l.abnormal && l.test_name.to_lowercase().contains(needle))
    }
}
