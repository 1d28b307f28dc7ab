use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{RiskCategory, RiskLevel};

/// Advisory string attached to every assessment, queue entry and notification.
pub const DISCLAIMER: &str = "For physician review only.";

/// Version tag of the deterministic weighted-factor model.
pub const MODEL_VERSION: &str = "riskwatch-rules-1.0";

// ═══════════════════════════════════════════════════════════
// RiskCategoryScore
// ═══════════════════════════════════════════════════════════

/// Score for one risk category. The level is always derived from the score;
/// there is no way to set it independently, including through deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CategoryScoreRecord")]
pub struct RiskCategoryScore {
    category: RiskCategory,
    score: u8,
    level: RiskLevel,
    factors: Vec<String>,
    recommendations: Vec<String>,
    confidence: u8,
}

impl RiskCategoryScore {
    pub fn new(
        category: RiskCategory,
        score: u8,
        factors: Vec<String>,
        recommendations: Vec<String>,
        confidence: u8,
    ) -> Self {
        let score = score.min(100);
        Self {
            category,
            score,
            level: RiskLevel::from_score(score),
            factors,
            recommendations,
            confidence: confidence.min(100),
        }
    }

    pub fn category(&self) -> RiskCategory {
        self.category
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn level(&self) -> RiskLevel {
        self.level
    }

    pub fn factors(&self) -> &[String] {
        &self.factors
    }

    pub fn recommendations(&self) -> &[String] {
        &self.recommendations
    }

    pub fn confidence(&self) -> u8 {
        self.confidence
    }
}

/// Wire/storage form; `level` is accepted but recomputed.
#[derive(Deserialize)]
struct CategoryScoreRecord {
    category: RiskCategory,
    score: u8,
    #[serde(default)]
    factors: Vec<String>,
    #[serde(default)]
    recommendations: Vec<String>,
    confidence: u8,
}

impl From<CategoryScoreRecord> for RiskCategoryScore {
    fn from(r: CategoryScoreRecord) -> Self {
        Self::new(r.category, r.score, r.factors, r.recommendations, r.confidence)
    }
}

// ═══════════════════════════════════════════════════════════
// RiskAssessment
// ═══════════════════════════════════════════════════════════

/// One immutable assessment version for one patient.
///
/// A change never edits an assessment in place: the processor builds a new
/// candidate and, if it is kept, publishes it as the next version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AssessmentRecord")]
pub struct RiskAssessment {
    patient_id: String,
    tenant_id: String,
    version: u32,
    overall_score: u8,
    overall_level: RiskLevel,
    confidence: u8,
    categories: Vec<RiskCategoryScore>,
    created_at: DateTime<Utc>,
    disclaimer: String,
    model_version: String,
}

impl RiskAssessment {
    pub fn new(
        patient_id: impl Into<String>,
        tenant_id: impl Into<String>,
        overall_score: u8,
        confidence: u8,
        categories: Vec<RiskCategoryScore>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let overall_score = overall_score.min(100);
        Self {
            patient_id: patient_id.into(),
            tenant_id: tenant_id.into(),
            version: 1,
            overall_score,
            overall_level: RiskLevel::from_score(overall_score),
            confidence: confidence.min(100),
            categories,
            created_at,
            disclaimer: DISCLAIMER.to_string(),
            model_version: MODEL_VERSION.to_string(),
        }
    }

    /// Re-stamp a candidate as a specific version. Consumes the candidate so
    /// a published version can never be altered.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version.max(1);
        self
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn overall_score(&self) -> u8 {
        self.overall_score
    }

    pub fn overall_level(&self) -> RiskLevel {
        self.overall_level
    }

    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    pub fn categories(&self) -> &[RiskCategoryScore] {
        &self.categories
    }

    pub fn category(&self, category: RiskCategory) -> Option<&RiskCategoryScore> {
        self.categories.iter().find(|c| c.category == category)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn disclaimer(&self) -> &str {
        &self.disclaimer
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }
}

#[derive(Deserialize)]
struct AssessmentRecord {
    patient_id: String,
    tenant_id: String,
    version: u32,
    overall_score: u8,
    confidence: u8,
    categories: Vec<RiskCategoryScore>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    model_version: Option<String>,
}

impl From<AssessmentRecord> for RiskAssessment {
    fn from(r: AssessmentRecord) -> Self {
        let mut assessment = RiskAssessment::new(
            r.patient_id,
            r.tenant_id,
            r.overall_score,
            r.confidence,
            r.categories,
            r.created_at,
        )
        .with_version(r.version);
        if let Some(model_version) = r.model_version {
            assessment.model_version = model_version;
        }
        assessment
    }
}
