//! Per-category scorers. Each reads the snapshot, accumulates points and
//! factor strings in a fixed order, and returns a clamped category score.

use crate::models::{PatientClinicalSnapshot, RiskCategory, RiskCategoryScore, RiskLevel};

use super::reference::{self as r, Marker};

/// Running total for one category.
struct Accumulator {
    category: RiskCategory,
    points: u32,
    factors: Vec<String>,
    evidence: i32,
}

impl Accumulator {
    fn new(category: RiskCategory) -> Self {
        Self {
            category,
            points: 0,
            factors: Vec::new(),
            evidence: 0,
        }
    }

    fn add(&mut self, points: u32, factor: impl Into<String>) {
        self.points = self.points.saturating_add(points);
        self.factors.push(factor.into());
    }

    /// Record that a relevant input was present, whether or not it fired.
    fn saw(&mut self, weight: i32) {
        self.evidence += weight;
    }

    fn conditions(&mut self, snapshot: &PatientClinicalSnapshot, table: &[Marker]) {
        for m in table {
            if m.needles.iter().any(|n| snapshot.has_condition(n)) {
                self.add(m.points, m.factor);
            }
        }
    }

    fn medications(&mut self, snapshot: &PatientClinicalSnapshot, table: &[Marker]) {
        for m in table {
            if m.needles.iter().any(|n| snapshot.has_medication(n)) {
                self.add(m.points, m.factor);
            }
        }
    }

    fn labs(&mut self, snapshot: &PatientClinicalSnapshot, table: &[Marker]) {
        let mut any_relevant = false;
        for m in table {
            let relevant = snapshot.lab_results.iter().any(|l| {
                let name = l.test_name.to_lowercase();
                m.needles.iter().any(|n| name.contains(n))
            });
            any_relevant |= relevant;
            if m.needles.iter().any(|n| snapshot.abnormal_lab(n).is_some()) {
                self.add(m.points, m.factor);
            }
        }
        if any_relevant {
            self.saw(15);
        }
    }

    fn age(&mut self, snapshot: &PatientClinicalSnapshot, elderly: u32, senior: u32) {
        if let Some(age) = snapshot.age {
            self.saw(10);
            if age >= 75 {
                self.add(elderly, "Age 75 or older");
            } else if age >= 65 && senior > 0 {
                self.add(senior, "Age 65 or older");
            }
        }
    }

    fn finish(self) -> RiskCategoryScore {
        let score = self.points.min(100) as u8;
        let level = RiskLevel::from_score(score);
        let recommendations = r::recommendations(self.category, level)
            .iter()
            .map(|s| s.to_string())
            .collect();
        let confidence = (r::CATEGORY_CONFIDENCE_BASELINE + self.evidence).clamp(0, 100) as u8;
        RiskCategoryScore::new(self.category, score, self.factors, recommendations, confidence)
    }
}

/// Only finite readings count as evidence.
fn reading(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

pub fn cardiac(s: &PatientClinicalSnapshot) -> RiskCategoryScore {
    let mut acc = Accumulator::new(RiskCategory::Cardiac);

    if let Some(bp) = s
        .vitals
        .blood_pressure
        .filter(|bp| bp.systolic.is_finite() && bp.diastolic.is_finite())
    {
        acc.saw(15);
        let label = format!("Blood pressure {:.0}/{:.0} mmHg", bp.systolic, bp.diastolic);
        if bp.systolic >= r::BP_CRISIS_SYSTOLIC || bp.diastolic >= r::BP_CRISIS_DIASTOLIC {
            acc.add(40, format!("{label} (hypertensive crisis)"));
        } else if bp.systolic >= r::BP_STAGE2_SYSTOLIC || bp.diastolic >= r::BP_STAGE2_DIASTOLIC {
            acc.add(25, format!("{label} (stage 2 hypertension)"));
        } else if bp.systolic >= r::BP_STAGE1_SYSTOLIC || bp.diastolic >= r::BP_STAGE1_DIASTOLIC {
            acc.add(15, format!("{label} (stage 1 hypertension)"));
        } else if bp.systolic < r::BP_LOW_SYSTOLIC || bp.diastolic < r::BP_LOW_DIASTOLIC {
            acc.add(25, format!("{label} (hypotension)"));
        }
    }

    if let Some(hr) = reading(s.vitals.heart_rate) {
        acc.saw(15);
        if hr > r::HR_SEVERE_HIGH {
            acc.add(30, format!("Heart rate {hr:.0} bpm (severe tachycardia)"));
        } else if hr > r::HR_HIGH {
            acc.add(20, format!("Heart rate {hr:.0} bpm (tachycardia)"));
        } else if hr > r::HR_TACHY {
            acc.add(10, format!("Heart rate {hr:.0} bpm (mild tachycardia)"));
        } else if hr < r::HR_SEVERE_LOW {
            acc.add(30, format!("Heart rate {hr:.0} bpm (severe bradycardia)"));
        } else if hr < r::HR_LOW {
            acc.add(15, format!("Heart rate {hr:.0} bpm (bradycardia)"));
        }
    }

    if !s.history.is_empty() {
        acc.saw(10);
    }
    acc.conditions(s, r::CARDIAC_CONDITIONS);
    if !s.medications.is_empty() {
        acc.saw(10);
    }
    acc.medications(s, r::CARDIAC_MEDICATIONS);
    acc.labs(s, r::CARDIAC_LABS);
    acc.age(s, 10, 5);
    acc.finish()
}

pub fn respiratory(s: &PatientClinicalSnapshot) -> RiskCategoryScore {
    let mut acc = Accumulator::new(RiskCategory::Respiratory);

    if let Some(spo2) = reading(s.vitals.oxygen_saturation) {
        acc.saw(20);
        if spo2 < r::SPO2_CRITICAL {
            acc.add(40, format!("Oxygen saturation {spo2:.0}% (severe hypoxemia)"));
        } else if spo2 < r::SPO2_LOW {
            acc.add(25, format!("Oxygen saturation {spo2:.0}% (hypoxemia)"));
        } else if spo2 < r::SPO2_BORDERLINE {
            acc.add(10, format!("Oxygen saturation {spo2:.0}% (borderline)"));
        }
    }

    if let Some(rr) = reading(s.vitals.respiratory_rate) {
        acc.saw(15);
        if rr > r::RR_SEVERE_HIGH {
            acc.add(30, format!("Respiratory rate {rr:.0}/min (severe tachypnea)"));
        } else if rr > r::RR_HIGH {
            acc.add(20, format!("Respiratory rate {rr:.0}/min (tachypnea)"));
        } else if rr > r::RR_ELEVATED {
            acc.add(10, format!("Respiratory rate {rr:.0}/min (elevated)"));
        } else if rr < r::RR_SEVERE_LOW {
            acc.add(30, format!("Respiratory rate {rr:.0}/min (respiratory depression)"));
        } else if rr < r::RR_LOW {
            acc.add(10, format!("Respiratory rate {rr:.0}/min (bradypnea)"));
        }
    }

    if !s.history.is_empty() {
        acc.saw(10);
    }
    acc.conditions(s, r::RESPIRATORY_CONDITIONS);
    if !s.medications.is_empty() {
        acc.saw(5);
    }
    acc.medications(s, r::RESPIRATORY_MEDICATIONS);
    acc.labs(s, r::RESPIRATORY_LABS);
    acc.age(s, 5, 0);
    acc.finish()
}

pub fn infection(s: &PatientClinicalSnapshot) -> RiskCategoryScore {
    let mut acc = Accumulator::new(RiskCategory::Infection);

    let temp = reading(s.vitals.temperature);
    if let Some(t) = temp {
        acc.saw(20);
        if t > r::TEMP_HIGH_FEVER {
            acc.add(30, format!("Temperature {t:.1}°C (high fever)"));
        } else if t > r::TEMP_FEVER {
            acc.add(20, format!("Temperature {t:.1}°C (fever)"));
        } else if t > r::TEMP_LOW_GRADE {
            acc.add(10, format!("Temperature {t:.1}°C (low-grade fever)"));
        } else if t < r::TEMP_HYPOTHERMIA {
            acc.add(25, format!("Temperature {t:.1}°C (hypothermia)"));
        }
    }

    let abnormal_temp = temp.is_some_and(|t| t > r::TEMP_LOW_GRADE || t < r::TEMP_SIRS_LOW);
    let tachycardic = reading(s.vitals.heart_rate).is_some_and(|hr| hr > r::HR_SIRS);
    if abnormal_temp && tachycardic {
        acc.add(15, "Abnormal temperature with tachycardia (SIRS pattern)");
    }

    if !s.history.is_empty() {
        acc.saw(10);
    }
    acc.conditions(s, r::INFECTION_CONDITIONS);
    if !s.medications.is_empty() {
        acc.saw(5);
    }
    acc.medications(s, r::INFECTION_MEDICATIONS);
    acc.labs(s, r::INFECTION_LABS);
    acc.age(s, 5, 0);
    acc.finish()
}

pub fn medication(s: &PatientClinicalSnapshot) -> RiskCategoryScore {
    let mut acc = Accumulator::new(RiskCategory::Medication);

    let count = s.medications.len();
    if count > 0 {
        acc.saw(25);
    }
    if count >= r::POLYPHARMACY_SEVERE {
        acc.add(30, format!("Polypharmacy ({count} active medications)"));
    } else if count >= r::POLYPHARMACY {
        acc.add(15, format!("Polypharmacy ({count} active medications)"));
    }

    let nti: Vec<&str> = r::NTI_MEDICATIONS
        .iter()
        .copied()
        .filter(|n| s.has_medication(n))
        .collect();
    if !nti.is_empty() {
        let points = (nti.len() as u32 * 10).min(30);
        acc.add(
            points,
            format!("Narrow-therapeutic-index drugs: {}", nti.join(", ")),
        );
    }

    if !s.history.is_empty() {
        acc.saw(10);
    }
    acc.conditions(s, r::MEDICATION_CONDITIONS);
    acc.labs(s, r::MEDICATION_LABS);
    acc.age(s, 10, 5);
    acc.finish()
}
