use spacetimedb::SpacetimeType;

use super::{clamp_score, rounded_percent, ScoringRule, StepOutcome};

/// Points per matching choice; three choices make a 30-point scenario
pub const POINTS_PER_CHOICE: i32 = 10;

pub const CLASSIFICATION_LEVELS: &[&str] = &["public", "internal", "confidential", "restricted"];

pub const ACCESS_SCOPES: &[&str] = &[
    "everyone",
    "all-staff",
    "team-only",
    "named-individuals",
];

pub const SECURITY_CONTROLS: &[&str] = &[
    "no-restriction",
    "standard-share",
    "encrypt-in-transit",
    "encrypt-at-rest",
];

/// The learner's three calls on one data asset. Empty strings mean "not chosen".
#[derive(SpacetimeType, Clone, Debug, Default, PartialEq)]
pub struct ClassificationChoice {
    pub classification: String,
    pub access: String,
    pub security: String,
}

/// A data asset with the correct classification triad
#[derive(Debug)]
pub struct DataCase {
    pub asset: &'static str,
    pub classification: &'static str,
    pub access: &'static str,
    pub security: &'static str,
}

impl DataCase {
    pub const MAX_POINTS: i32 = 3 * POINTS_PER_CHOICE;
}

impl ScoringRule for DataCase {
    type Answer = ClassificationChoice;

    /// `10 * correct_count` points, percentage out of 30
    fn outcome(&self, choice: &ClassificationChoice) -> StepOutcome {
        let correct = [
            choice.classification == self.classification,
            choice.access == self.access,
            choice.security == self.security,
        ]
        .iter()
        .filter(|hit| **hit)
        .count() as i32;

        let points = correct * POINTS_PER_CHOICE;
        StepOutcome {
            points,
            score: clamp_score(rounded_percent(points as i64, Self::MAX_POINTS as i64)),
        }
    }
}
