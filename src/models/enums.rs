use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string form doubles as the serde representation.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// Declaration order is severity order: Low < Moderate < High < Critical.
str_enum!(RiskLevel {
    Low => "low",
    Moderate => "moderate",
    High => "high",
    Critical => "critical",
});

str_enum!(RiskCategory {
    Cardiac => "cardiac",
    Respiratory => "respiratory",
    Infection => "infection",
    Medication => "medication",
});

// Declaration order is queue rank: CRITICAL surfaces first.
str_enum!(TriagePriority {
    Critical => "CRITICAL",
    High => "HIGH",
    Normal => "NORMAL",
});

str_enum!(NotificationPriority {
    Critical => "CRITICAL",
    High => "HIGH",
});

str_enum!(ChangeType {
    Vitals => "vitals",
    Medication => "medication",
    Lab => "lab",
    History => "history",
    Demographics => "demographics",
});

str_enum!(AuditAction {
    PriorityOverride => "TRIAGE_PRIORITY_OVERRIDE",
    PriorityCleared => "TRIAGE_PRIORITY_CLEARED",
});

impl RiskLevel {
    /// Four-tier bucketing shared by category and overall scores.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=39 => Self::Low,
            40..=59 => Self::Moderate,
            60..=79 => Self::High,
            _ => Self::Critical,
        }
    }

    /// Title-case label used in clinician-facing text.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 4] = [
        RiskCategory::Cardiac,
        RiskCategory::Respiratory,
        RiskCategory::Infection,
        RiskCategory::Medication,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Cardiac => "Cardiac",
            Self::Respiratory => "Respiratory",
            Self::Infection => "Infection",
            Self::Medication => "Medication",
        }
    }
}

impl TriagePriority {
    /// Sort rank: lower surfaces first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Normal => 2,
        }
    }

    /// Priority derived from a computed risk level when no override is active.
    pub fn from_level(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Critical => Self::Critical,
            RiskLevel::High => Self::High,
            RiskLevel::Moderate | RiskLevel::Low => Self::Normal,
        }
    }
}
