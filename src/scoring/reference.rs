//! Reference tables for the weighted-factor model.
//!
//! Every table is matched by case-insensitive substring against the
//! snapshot's condition, medication and lab names. Points are additive and
//! each category is clamped to 0..=100 after accumulation.

use crate::models::{RiskCategory, RiskLevel};

/// A name pattern that contributes points when present.
pub struct Marker {
    pub needles: &'static [&'static str],
    pub points: u32,
    pub factor: &'static str,
}

const fn marker(needles: &'static [&'static str], points: u32, factor: &'static str) -> Marker {
    Marker {
        needles,
        points,
        factor,
    }
}

// ═══════════════════════════════════════════════════════════
// Vital-sign thresholds
// ═══════════════════════════════════════════════════════════

pub const BP_CRISIS_SYSTOLIC: f64 = 180.0;
pub const BP_CRISIS_DIASTOLIC: f64 = 120.0;
pub const BP_STAGE2_SYSTOLIC: f64 = 160.0;
pub const BP_STAGE2_DIASTOLIC: f64 = 100.0;
pub const BP_STAGE1_SYSTOLIC: f64 = 140.0;
pub const BP_STAGE1_DIASTOLIC: f64 = 90.0;
pub const BP_LOW_SYSTOLIC: f64 = 90.0;
pub const BP_LOW_DIASTOLIC: f64 = 60.0;

pub const HR_SEVERE_HIGH: f64 = 130.0;
pub const HR_HIGH: f64 = 120.0;
pub const HR_TACHY: f64 = 100.0;
pub const HR_LOW: f64 = 50.0;
pub const HR_SEVERE_LOW: f64 = 40.0;

pub const SPO2_CRITICAL: f64 = 90.0;
pub const SPO2_LOW: f64 = 94.0;
pub const SPO2_BORDERLINE: f64 = 95.0;

pub const RR_SEVERE_HIGH: f64 = 30.0;
pub const RR_HIGH: f64 = 24.0;
pub const RR_ELEVATED: f64 = 20.0;
pub const RR_LOW: f64 = 12.0;
pub const RR_SEVERE_LOW: f64 = 8.0;

pub const TEMP_HIGH_FEVER: f64 = 39.5;
pub const TEMP_FEVER: f64 = 38.5;
pub const TEMP_LOW_GRADE: f64 = 38.0;
pub const TEMP_SIRS_LOW: f64 = 36.0;
pub const TEMP_HYPOTHERMIA: f64 = 35.0;

/// Heart rate above which a febrile patient meets the SIRS pattern.
pub const HR_SIRS: f64 = 90.0;

// ═══════════════════════════════════════════════════════════
// Immediate-escalation bounds
// ═══════════════════════════════════════════════════════════

pub const IMMEDIATE_SYSTOLIC_HIGH: f64 = 180.0;
pub const IMMEDIATE_DIASTOLIC_HIGH: f64 = 120.0;
pub const IMMEDIATE_SYSTOLIC_LOW: f64 = 80.0;
pub const IMMEDIATE_HR_HIGH: f64 = 130.0;
pub const IMMEDIATE_HR_LOW: f64 = 40.0;
pub const IMMEDIATE_SPO2_LOW: f64 = 90.0;
pub const IMMEDIATE_RR_HIGH: f64 = 30.0;
pub const IMMEDIATE_RR_LOW: f64 = 8.0;
pub const IMMEDIATE_TEMP_HIGH: f64 = 40.0;
pub const IMMEDIATE_TEMP_LOW: f64 = 35.0;

/// Lowest overall score for a snapshot with a vital outside the immediate
/// bounds: the bottom of the High band.
pub const IMMEDIATE_SCORE_FLOOR: u8 = 60;

/// Vital readings checked against the immediate-escalation bounds. Missing
/// and non-finite readings never trip a bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct VitalReadings {
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
    pub heart_rate: Option<f64>,
    pub oxygen_saturation: Option<f64>,
    pub respiratory_rate: Option<f64>,
    pub temperature: Option<f64>,
}

impl VitalReadings {
    pub fn out_of_immediate_bounds(&self) -> bool {
        let above = |x: Option<f64>, t: f64| x.is_some_and(|x| x >= t);
        let over = |x: Option<f64>, t: f64| x.is_some_and(|x| x > t);
        let under = |x: Option<f64>, t: f64| x.is_some_and(|x| x < t);

        above(self.systolic, IMMEDIATE_SYSTOLIC_HIGH)
            || above(self.diastolic, IMMEDIATE_DIASTOLIC_HIGH)
            || under(self.systolic, IMMEDIATE_SYSTOLIC_LOW)
            || over(self.heart_rate, IMMEDIATE_HR_HIGH)
            || under(self.heart_rate, IMMEDIATE_HR_LOW)
            || under(self.oxygen_saturation, IMMEDIATE_SPO2_LOW)
            || over(self.respiratory_rate, IMMEDIATE_RR_HIGH)
            || under(self.respiratory_rate, IMMEDIATE_RR_LOW)
            || over(self.temperature, IMMEDIATE_TEMP_HIGH)
            || under(self.temperature, IMMEDIATE_TEMP_LOW)
    }
}

// ═══════════════════════════════════════════════════════════
// Category tables
// ═══════════════════════════════════════════════════════════

pub const CARDIAC_CONDITIONS: &[Marker] = &[
    marker(
        &["heart disease", "coronary", "heart failure", "myocardial", "cardiomyopathy"],
        20,
        "History of heart disease",
    ),
    marker(&["arrhythmia", "atrial fibrillation"], 10, "History of arrhythmia"),
    marker(&["hypertension"], 10, "History of hypertension"),
    marker(&["stroke"], 10, "History of stroke"),
    marker(&["diabetes"], 5, "Diabetes (cardiovascular risk)"),
];

pub const CARDIAC_MEDICATIONS: &[Marker] = &[
    marker(&["digoxin"], 10, "On digoxin"),
    marker(&["amiodarone"], 10, "On amiodarone"),
    marker(&["nitroglycerin"], 5, "On nitroglycerin"),
];

pub const CARDIAC_LABS: &[Marker] = &[
    marker(&["troponin"], 30, "Abnormal troponin"),
    marker(&["bnp"], 15, "Abnormal BNP"),
    marker(&["potassium"], 15, "Abnormal potassium"),
];

pub const RESPIRATORY_CONDITIONS: &[Marker] = &[
    marker(&["copd", "chronic obstructive"], 20, "History of COPD"),
    marker(&["asthma"], 10, "History of asthma"),
    marker(&["pulmonary fibrosis", "interstitial lung"], 15, "Chronic lung disease"),
    marker(&["sleep apnea"], 5, "Sleep apnea"),
];

pub const RESPIRATORY_MEDICATIONS: &[Marker] = &[
    marker(
        &["morphine", "oxycodone", "hydromorphone", "fentanyl", "methadone"],
        10,
        "Opioid therapy (respiratory depression risk)",
    ),
    marker(
        &["lorazepam", "diazepam", "midazolam", "alprazolam"],
        5,
        "Benzodiazepine therapy",
    ),
];

pub const RESPIRATORY_LABS: &[Marker] = &[
    marker(&["blood gas", "abg", "pco2", "po2"], 20, "Abnormal blood gas"),
];

pub const INFECTION_CONDITIONS: &[Marker] = &[
    marker(
        &["immunocompromised", "hiv", "transplant"],
        15,
        "Immunocompromised state",
    ),
    marker(&["cancer", "leukemia", "lymphoma"], 15, "Active malignancy"),
    marker(&["diabetes"], 5, "Diabetes (infection risk)"),
];

pub const INFECTION_MEDICATIONS: &[Marker] = &[marker(
    &["prednisone", "tacrolimus", "methotrexate", "cyclosporine", "chemotherapy"],
    10,
    "Immunosuppressive therapy",
)];

pub const INFECTION_LABS: &[Marker] = &[
    marker(&["lactate"], 25, "Elevated lactate"),
    marker(&["culture"], 25, "Positive culture"),
    marker(&["procalcitonin"], 20, "Abnormal procalcitonin"),
    marker(&["wbc", "white blood"], 15, "Abnormal white cell count"),
    marker(&["crp", "c-reactive"], 10, "Elevated CRP"),
];

/// Narrow-therapeutic-index drugs. Also drives immediate-processing
/// classification of medication changes.
pub const NTI_MEDICATIONS: &[&str] = &[
    "warfarin",
    "digoxin",
    "lithium",
    "phenytoin",
    "theophylline",
    "insulin",
    "carbamazepine",
    "tacrolimus",
    "cyclosporine",
    "gentamicin",
    "vancomycin",
];

pub const MEDICATION_CONDITIONS: &[Marker] = &[
    marker(&["kidney", "renal"], 15, "Impaired renal clearance"),
    marker(&["liver", "hepatic", "cirrhosis"], 15, "Impaired hepatic clearance"),
];

pub const MEDICATION_LABS: &[Marker] = &[
    marker(&["inr"], 20, "Abnormal INR"),
    marker(&["level"], 20, "Drug level out of range"),
    marker(&["creatinine"], 15, "Abnormal creatinine"),
    marker(&["alt", "ast"], 10, "Abnormal liver enzymes"),
];

pub const POLYPHARMACY_SEVERE: usize = 10;
pub const POLYPHARMACY: usize = 5;

/// Lab names whose abnormal flag makes a lab change critical.
pub const CRITICAL_LABS: &[&str] = &[
    "troponin",
    "potassium",
    "lactate",
    "inr",
    "culture",
    "sodium",
    "glucose",
    "pco2",
    "digoxin",
    "lithium",
];

// ═══════════════════════════════════════════════════════════
// Aggregation
// ═══════════════════════════════════════════════════════════

/// Weight of each category in the weighted-mean half of the overall score.
pub fn category_weight(category: RiskCategory) -> f64 {
    match category {
        RiskCategory::Cardiac => 0.35,
        RiskCategory::Respiratory => 0.30,
        RiskCategory::Infection => 0.20,
        RiskCategory::Medication => 0.15,
    }
}

/// Share of the overall score taken by the single worst category.
pub const PEAK_SHARE: f64 = 0.6;

pub const CONFIDENCE_BASELINE: i32 = 50;
pub const CONFIDENCE_PER_GROUP: i32 = 10;
pub const CONFIDENCE_PER_VITAL: i32 = 2;
pub const CONFIDENCE_SPARSE_PENALTY: i32 = 20;
pub const CATEGORY_CONFIDENCE_BASELINE: i32 = 40;

// ═══════════════════════════════════════════════════════════
// Recommendations
// ═══════════════════════════════════════════════════════════

/// Level-driven recommendations for one category. Low levels carry none.
pub fn recommendations(category: RiskCategory, level: RiskLevel) -> &'static [&'static str] {
    use RiskCategory as C;
    use RiskLevel as L;
    match (category, level) {
        (_, L::Low) => &[],
        (C::Cardiac, L::Moderate) => &["Monitor blood pressure and heart rate every 4 hours"],
        (C::Cardiac, L::High) => &[
            "Obtain 12-lead ECG",
            "Review antihypertensive and cardiac medications",
        ],
        (C::Cardiac, L::Critical) => &[
            "Immediate physician evaluation for cardiovascular instability",
            "Continuous cardiac monitoring",
        ],
        (C::Respiratory, L::Moderate) => &["Monitor oxygen saturation and respiratory rate"],
        (C::Respiratory, L::High) => &[
            "Assess airway and work of breathing",
            "Consider supplemental oxygen",
        ],
        (C::Respiratory, L::Critical) => &[
            "Immediate respiratory assessment",
            "Prepare for escalation of respiratory support",
        ],
        (C::Infection, L::Moderate) => &["Repeat temperature and review infection markers"],
        (C::Infection, L::High) => &[
            "Obtain blood cultures before antibiotics",
            "Screen for sepsis",
        ],
        (C::Infection, L::Critical) => &[
            "Initiate sepsis protocol",
            "Immediate physician evaluation",
        ],
        (C::Medication, L::Moderate) => &["Pharmacist medication reconciliation"],
        (C::Medication, L::High) => &[
            "Review narrow-therapeutic-index drug levels",
            "Adjust dosing for organ function",
        ],
        (C::Medication, L::Critical) => &[
            "Urgent medication safety review",
            "Hold high-risk medications pending physician review",
        ],
    }
}

/// Escalation text appended to notifications on a critical score delta.
pub const CRITICAL_CHANGE_RECOMMENDATION: &str =
    "Rapid deterioration detected: immediate physician review recommended";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one() {
        let total: f64 = RiskCategory::ALL.iter().map(|c| category_weight(*c)).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn low_level_has_no_recommendations() {
        for c in RiskCategory::ALL {
            assert!(recommendations(c, RiskLevel::Low).is_empty());
            assert!(!recommendations(c, RiskLevel::Critical).is_empty());
        }
    }

    #[test]
    fn needles_are_lowercase() {
        let tables = [
            CARDIAC_CONDITIONS,
            CARDIAC_MEDICATIONS,
            CARDIAC_LABS,
            RESPIRATORY_CONDITIONS,
            RESPIRATORY_MEDICATIONS,
            RESPIRATORY_LABS,
            INFECTION_CONDITIONS,
            INFECTION_MEDICATIONS,
            INFECTION_LABS,
            MEDICATION_CONDITIONS,
            MEDICATION_LABS,
        ];
        for table in tables {
            for m in table {
                for n in m.needles {
                    assert_eq!(*n, n.to_lowercase());
                }
            }
        }
    }
}
