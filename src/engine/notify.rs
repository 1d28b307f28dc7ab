use chrono::{DateTime, Utc};

use crate::models::{RiskAssessment, RiskChangeNotification};

use super::compare::AssessmentComparison;

/// Package a decided change for the publish boundary.
pub fn build_notification(
    assessment: &RiskAssessment,
    comparison: &AssessmentComparison,
    timestamp: DateTime<Utc>,
) -> RiskChangeNotification {
    RiskChangeNotification {
        patient_id: assessment.patient_id().to_string(),
        tenant_id: assessment.tenant_id().to_string(),
        timestamp,
        priority: comparison.notification_priority,
        changes: comparison.changes.clone(),
        new_score: assessment.overall_score(),
        new_level: assessment.overall_level(),
        recommendations: comparison.recommendations.clone(),
        disclaimer: assessment.disclaimer().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::compare::{compare_risk_assessments, Thresholds};
    use crate::models::{NotificationPriority, DISCLAIMER};

    #[test]
    fn notification_carries_disclaimer_and_scores() {
        let a = RiskAssessment::new("p-1", "t-1", 82, 60, vec![], Utc::now());
        let cmp = compare_risk_assessments(None, &a, Thresholds::default());
        let n = build_notification(&a, &cmp, Utc::now());
        assert_eq!(n.disclaimer, DISCLAIMER);
        assert_eq!(n.new_score, 82);
        assert_eq!(n.priority, NotificationPriority::Critical);
        assert_eq!(n.tenant_id, "t-1");
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["priority"], "CRITICAL");
        assert_eq!(json["new_level"], "critical");
    }
}
