use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
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

str_enum!(Role {
    Patient => "patient",
    Clinician => "clinician",
    Admin => "admin",
});

str_enum!(UserStatus {
    Active => "active",
    Pending => "pending",
    Suspended => "suspended",
});

// Declaration order is severity order: `Ord` is relied on when merging risks.
str_enum!(RiskLevel {
    Low => "low",
    Moderate => "moderate",
    High => "high",
    Critical => "critical",
});

str_enum!(AssessmentStatus {
    PendingReview => "pending_review",
    InReview => "in_review",
    Reviewed => "reviewed",
    FollowUp => "follow_up",
});

str_enum!(QuestionKind {
    SingleChoice => "single_choice",
    MultiChoice => "multi_choice",
    Scale => "scale",
});

str_enum!(NotificationKind {
    AssessmentSubmitted => "assessment_submitted",
    HighRiskAlert => "high_risk_alert",
    AssessmentClaimed => "assessment_claimed",
    AssessmentReviewed => "assessment_reviewed",
    AccountApproved => "account_approved",
    System => "system",
});

str_enum!(AnalysisSource {
    Ai => "ai",
    RuleBased => "rule_based",
});

impl RiskLevel {
    /// One level lower, saturating at `Low`.
    pub fn downgraded(self) -> Self {
        match self {
            Self::Critical => Self::High,
            Self::High => Self::Moderate,
            Self::Moderate | Self::Low => Self::Low,
        }
    }

    /// High and critical assessments are escalated to clinicians.
    pub fn is_elevated(self) -> bool {
        self >= Self::High
    }
}

impl AssessmentStatus {
    /// Whether a clinician may still record a review.
    pub fn is_reviewable(self) -> bool {
        !matches!(self, Self::Reviewed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_round_trip() {
        for (variant, s) in [
            (Role::Patient, "patient"),
            (Role::Clinician, "clinician"),
            (Role::Admin, "admin"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(Role::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn assessment_status_round_trip() {
        for (variant, s) in [
            (AssessmentStatus::PendingReview, "pending_review"),
            (AssessmentStatus::InReview, "in_review"),
            (AssessmentStatus::Reviewed, "reviewed"),
            (AssessmentStatus::FollowUp, "follow_up"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(AssessmentStatus::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&NotificationKind::HighRiskAlert).unwrap();
        assert_eq!(json, "\"high_risk_alert\"");
        let parsed: QuestionKind = serde_json::from_str("\"multi_choice\"").unwrap();
        assert_eq!(parsed, QuestionKind::MultiChoice);
    }

    #[test]
    fn risk_levels_are_ordered() {
        assert!(RiskLevel::Low < RiskLevel::Moderate);
        assert!(RiskLevel::Moderate < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert_eq!(RiskLevel::Low.downgraded(), RiskLevel::Low);
        assert_eq!(RiskLevel::Critical.downgraded(), RiskLevel::High);
        assert!(RiskLevel::High.is_elevated());
        assert!(!RiskLevel::Moderate.is_elevated());
    }

    #[test]
    fn reviewed_is_terminal() {
        assert!(!AssessmentStatus::Reviewed.is_reviewable());
        assert!(AssessmentStatus::FollowUp.is_reviewable());
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(Role::from_str("superuser").is_err());
        assert!(RiskLevel::from_str("").is_err());
    }
}
