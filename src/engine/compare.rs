//! Old-versus-new assessment comparison: decides persistence, notification
//! and the notification's content.

use serde::Serialize;

use crate::config::EngineConfig;
use crate::models::{NotificationPriority, RiskAssessment, RiskLevel};
use crate::scoring::reference::CRITICAL_CHANGE_RECOMMENDATION;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub significance: u8,
    pub critical: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for Thresholds {
    fn from(config: &EngineConfig) -> Self {
        Self {
            significance: config.significance_threshold,
            critical: config.critical_change_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssessmentComparison {
    /// No previous assessment existed.
    pub initial: bool,
    pub score_difference: u8,
    pub significant_change: bool,
    pub critical_change: bool,
    pub priority_changed: bool,
    pub should_notify: bool,
    pub previous_level: Option<RiskLevel>,
    pub new_score: u8,
    pub new_level: RiskLevel,
    pub notification_priority: NotificationPriority,
    pub changes: Vec<String>,
    pub recommendations: Vec<String>,
}

pub fn compare_risk_assessments(
    previous: Option<&RiskAssessment>,
    candidate: &RiskAssessment,
    thresholds: Thresholds,
) -> AssessmentComparison {
    let new_score = candidate.overall_score();
    let new_level = candidate.overall_level();

    let Some(previous) = previous else {
        let mut changes = vec![format!(
            "Initial risk assessment: overall score {new_score} ({})",
            new_level.label()
        )];
        changes.extend(category_summaries(candidate));
        return AssessmentComparison {
            initial: true,
            score_difference: 0,
            significant_change: true,
            critical_change: false,
            priority_changed: false,
            should_notify: true,
            previous_level: None,
            new_score,
            new_level,
            notification_priority: notification_priority(false, new_level),
            changes,
            recommendations: merged_recommendations(candidate),
        };
    };

    let old_score = previous.overall_score();
    let old_level = previous.overall_level();
    let score_difference = old_score.abs_diff(new_score);
    let significant_change = score_difference >= thresholds.significance;
    let critical_change = score_difference >= thresholds.critical;
    let priority_changed = old_level != new_level;
    let should_notify = significant_change || priority_changed;

    let mut changes = vec![match new_score.cmp(&old_score) {
        std::cmp::Ordering::Greater => {
            format!("Overall risk score increased from {old_score} to {new_score} (+{score_difference})")
        }
        std::cmp::Ordering::Less => {
            format!("Overall risk score decreased from {old_score} to {new_score} (-{score_difference})")
        }
        std::cmp::Ordering::Equal => format!("Overall risk score unchanged at {new_score}"),
    }];
    if priority_changed {
        changes.push(format!(
            "Risk level changed from {} to {}",
            old_level.label(),
            new_level.label()
        ));
    }
    for cat in candidate.categories() {
        let Some(prev) = previous.category(cat.category()) else {
            continue;
        };
        let delta = prev.score().abs_diff(cat.score());
        if delta >= thresholds.significance || prev.level() != cat.level() {
            changes.push(format!(
                "{} risk {} from {} to {} ({} to {})",
                cat.category().label(),
                if cat.score() >= prev.score() { "rose" } else { "fell" },
                prev.score(),
                cat.score(),
                prev.level().label(),
                cat.level().label()
            ));
        }
    }

    let mut recommendations = merged_recommendations(candidate);
    if critical_change {
        push_unique(&mut recommendations, CRITICAL_CHANGE_RECOMMENDATION.to_string());
    }
    if priority_changed {
        push_unique(
            &mut recommendations,
            format!(
                "Risk level changed from {} to {}: reassess triage priority and care plan",
                old_level.label(),
                new_level.label()
            ),
        );
    }

    AssessmentComparison {
        initial: false,
        score_difference,
        significant_change,
        critical_change,
        priority_changed,
        should_notify,
        previous_level: Some(old_level),
        new_score,
        new_level,
        notification_priority: notification_priority(critical_change, new_level),
        changes,
        recommendations,
    }
}

fn notification_priority(critical_change: bool, level: RiskLevel) -> NotificationPriority {
    if critical_change || level == RiskLevel::Critical {
        NotificationPriority::Critical
    } else {
        NotificationPriority::High
    }
}

/// Category recommendations in category order, deduplicated.
fn merged_recommendations(assessment: &RiskAssessment) -> Vec<String> {
    let mut out = Vec::new();
    for cat in assessment.categories() {
        for r in cat.recommendations() {
            push_unique(&mut out, r.clone());
        }
    }
    out
}

fn category_summaries(assessment: &RiskAssessment) -> impl Iterator<Item = String> + '_ {
    assessment
        .categories()
        .iter()
        .filter(|c| c.level() != RiskLevel::Low)
        .map(|c| {
            format!(
                "{} risk {} ({})",
                c.category().label(),
                c.score(),
                c.level().label()
            )
        })
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}
