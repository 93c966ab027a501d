// Step scoring shared by every mini-game.
//
// Each answer key implements `ScoringRule`; clamping, rounding and the
// mission-level aggregation live here and are written once.

use std::collections::HashSet;
use std::time::Duration;

use spacetimedb::SpacetimeType;
use thiserror::Error;

mod bec;
mod classification;
mod email;
mod insider;

pub use bec::{DecisionCase, DialogueStep, EmailAction, OrderPuzzle, PolicyTable};
pub use classification::{
    ClassificationChoice, DataCase, ACCESS_SCOPES, CLASSIFICATION_LEVELS, SECURITY_CONTROLS,
};
pub use email::EmailCase;
pub use insider::{Activity, InsiderCase};

/// Upper bound of every step and mission score
pub const MAX_SCORE: i64 = 100;

/// Countdown for the policy-selection board
pub const POLICY_COUNTDOWN_SECS: u64 = 90;

/// Countdown for each supervisor dialogue step
pub const DIALOGUE_COUNTDOWN_SECS: u64 = 45;

/// Weight of the verification average in the BEC composite
pub const VERIFICATION_WEIGHT: f64 = 0.7;

/// Weight of the terminal flag/process decision in the BEC composite
pub const DECISION_WEIGHT: f64 = 0.3;

// ==================== TYPES ====================

/// Result of scoring one step
/// `points` is the rule's raw tally (may be negative for insider activities),
/// `score` is the clamped 0-100 percentage shown as feedback
#[derive(SpacetimeType, Clone, Debug, PartialEq)]
pub struct StepOutcome {
    pub points: i32,
    pub score: u8,
}

impl StepOutcome {
    /// Outcome for rules whose raw tally already is the percentage
    pub fn from_score(score: u8) -> Self {
        Self {
            points: score as i32,
            score,
        }
    }
}

/// A learner's answer to one step, one variant per mini-game
#[derive(SpacetimeType, Clone, Debug, PartialEq)]
pub enum StepAnswer {
    /// Red flags spotted in an email
    RedFlags(Vec<String>),
    /// Verification steps in the order the learner placed them
    SenderOrder(Vec<String>),
    /// Policies selected on the policy board
    Policies(Vec<String>),
    /// Dialogue options chosen for one supervisor question
    Dialogue(Vec<String>),
    /// Activities flagged as suspicious (everything else counts as "normal")
    Activities(Vec<String>),
    /// Classification / access / security choices for one data asset
    Classification(ClassificationChoice),
    /// Terminal decision on the BEC email
    Decision(EmailAction),
}

impl StepAnswer {
    pub fn kind(&self) -> StepKind {
        match self {
            StepAnswer::RedFlags(_) => StepKind::RedFlags,
            StepAnswer::SenderOrder(_) => StepKind::SenderOrder,
            StepAnswer::Policies(_) => StepKind::Policies,
            StepAnswer::Dialogue(_) => StepKind::Dialogue,
            StepAnswer::Activities(_) => StepKind::Activities,
            StepAnswer::Classification(_) => StepKind::Classification,
            StepAnswer::Decision(_) => StepKind::Decision,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    RedFlags,
    SenderOrder,
    Policies,
    Dialogue,
    Activities,
    Classification,
    Decision,
}

impl StepKind {
    pub fn label(self) -> &'static str {
        match self {
            StepKind::RedFlags => "red_flags",
            StepKind::SenderOrder => "sender_order",
            StepKind::Policies => "policies",
            StepKind::Dialogue => "dialogue",
            StepKind::Activities => "activities",
            StepKind::Classification => "classification",
            StepKind::Decision => "decision",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("step expects a {} answer, got {}", .expected.label(), .got.label())]
pub struct AnswerMismatch {
    pub expected: StepKind,
    pub got: StepKind,
}

/// Scoring strategy: an answer key scores the learner's answer for its step
pub trait ScoringRule {
    type Answer: ?Sized;

    fn outcome(&self, answer: &Self::Answer) -> StepOutcome;
}

/// One step of a mission together with its answer key
#[derive(Debug)]
pub enum StepSpec {
    RedFlags(EmailCase),
    SenderOrder(OrderPuzzle),
    Policies(PolicyTable),
    Dialogue(DialogueStep),
    Activities(InsiderCase),
    Classification(DataCase),
    Decision(DecisionCase),
}

impl StepSpec {
    pub fn kind(&self) -> StepKind {
        match self {
            StepSpec::RedFlags(_) => StepKind::RedFlags,
            StepSpec::SenderOrder(_) => StepKind::SenderOrder,
            StepSpec::Policies(_) => StepKind::Policies,
            StepSpec::Dialogue(_) => StepKind::Dialogue,
            StepSpec::Activities(_) => StepKind::Activities,
            StepSpec::Classification(_) => StepKind::Classification,
            StepSpec::Decision(_) => StepKind::Decision,
        }
    }

    /// Short label for logs
    pub fn title(&self) -> &'static str {
        match self {
            StepSpec::RedFlags(case) => case.subject,
            StepSpec::SenderOrder(_) => "sender verification order",
            StepSpec::Policies(_) => "policy board",
            StepSpec::Dialogue(step) => step.prompt,
            StepSpec::Activities(case) => case.employee,
            StepSpec::Classification(case) => case.asset,
            StepSpec::Decision(_) => "final decision",
        }
    }

    /// Countdown after which the step auto-submits, if it is timed
    pub fn countdown(&self) -> Option<Duration> {
        match self {
            StepSpec::Policies(_) => Some(Duration::from_secs(POLICY_COUNTDOWN_SECS)),
            StepSpec::Dialogue(_) => Some(Duration::from_secs(DIALOGUE_COUNTDOWN_SECS)),
            _ => None,
        }
    }

    /// The "nothing selected" answer used when a countdown fires before any selection.
    /// The terminal decision has no neutral choice.
    pub fn empty_answer(&self) -> Option<StepAnswer> {
        match self {
            StepSpec::RedFlags(_) => Some(StepAnswer::RedFlags(Vec::new())),
            StepSpec::SenderOrder(_) => Some(StepAnswer::SenderOrder(Vec::new())),
            StepSpec::Policies(_) => Some(StepAnswer::Policies(Vec::new())),
            StepSpec::Dialogue(_) => Some(StepAnswer::Dialogue(Vec::new())),
            StepSpec::Activities(_) => Some(StepAnswer::Activities(Vec::new())),
            StepSpec::Classification(_) => {
                Some(StepAnswer::Classification(ClassificationChoice::default()))
            }
            StepSpec::Decision(_) => None,
        }
    }

    /// Check that an answer has the shape this step expects
    pub fn accepts(&self, answer: &StepAnswer) -> Result<(), AnswerMismatch> {
        if self.kind() == answer.kind() {
            Ok(())
        } else {
            Err(AnswerMismatch {
                expected: self.kind(),
                got: answer.kind(),
            })
        }
    }

    /// First selected id the step never offered
    pub fn unknown_choice(&self, answer: &StepAnswer) -> Option<String> {
        let offered: Vec<&str> = match self {
            StepSpec::RedFlags(case) => case.red_flags.iter().chain(case.decoys).copied().collect(),
            StepSpec::SenderOrder(puzzle) => puzzle.canonical.to_vec(),
            StepSpec::Policies(board) => board
                .relevant
                .iter()
                .chain(board.distractors)
                .copied()
                .collect(),
            StepSpec::Dialogue(step) => step
                .correct_options
                .iter()
                .chain(step.other_options)
                .copied()
                .collect(),
            StepSpec::Activities(case) => case.activities.iter().map(|a| a.id).collect(),
            StepSpec::Classification(_) => {
                let StepAnswer::Classification(choice) = answer else {
                    return None;
                };
                let picks = [
                    (choice.classification.as_str(), CLASSIFICATION_LEVELS),
                    (choice.access.as_str(), ACCESS_SCOPES),
                    (choice.security.as_str(), SECURITY_CONTROLS),
                ];
                return picks
                    .iter()
                    .find(|(pick, options)| !pick.is_empty() && !options.contains(pick))
                    .map(|(pick, _)| pick.to_string());
            }
            StepSpec::Decision(_) => return None,
        };

        let selected = match answer {
            StepAnswer::RedFlags(ids)
            | StepAnswer::SenderOrder(ids)
            | StepAnswer::Policies(ids)
            | StepAnswer::Dialogue(ids)
            | StepAnswer::Activities(ids) => ids,
            StepAnswer::Classification(_) | StepAnswer::Decision(_) => return None,
        };
        selected
            .iter()
            .find(|id| !offered.contains(&id.as_str()))
            .cloned()
    }

    /// Descriptions of activities the learner misjudged, shown as feedback
    pub fn misjudged(&self, answer: &StepAnswer) -> Vec<&'static str> {
        match (self, answer) {
            (StepSpec::Activities(case), StepAnswer::Activities(flagged)) => {
                case.misjudged(flagged).map(|a| a.description).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn score(&self, answer: &StepAnswer) -> Result<StepOutcome, AnswerMismatch> {
        let outcome = match (self, answer) {
            (StepSpec::RedFlags(key), StepAnswer::RedFlags(selected)) => key.outcome(selected),
            (StepSpec::SenderOrder(key), StepAnswer::SenderOrder(order)) => key.outcome(order),
            (StepSpec::Policies(key), StepAnswer::Policies(selected)) => key.outcome(selected),
            (StepSpec::Dialogue(key), StepAnswer::Dialogue(selected)) => key.outcome(selected),
            (StepSpec::Activities(key), StepAnswer::Activities(flagged)) => key.outcome(flagged),
            (StepSpec::Classification(key), StepAnswer::Classification(choice)) => {
                key.outcome(choice)
            }
            (StepSpec::Decision(key), StepAnswer::Decision(action)) => key.outcome(action),
            _ => {
                return Err(AnswerMismatch {
                    expected: self.kind(),
                    got: answer.kind(),
                })
            }
        };
        Ok(outcome)
    }
}

/// How a mission folds its step outcomes into one score
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    /// Rounded mean of the step scores
    MeanScore,
    /// `round(sum(points) / (steps * max_per_step) * 100)`
    NormalizedPoints { max_per_step: i32 },
    /// Mean of the verification stages blended with the terminal decision
    VerificationBlend,
}

// ==================== HELPERS ====================

pub fn clamp_score(raw: i64) -> u8 {
    raw.clamp(0, MAX_SCORE) as u8
}

/// `round(part / whole * 100)`, halves rounding up, negative parts counting as zero.
/// An empty `whole` means there was nothing to find, which is full marks.
pub fn rounded_percent(part: i64, whole: i64) -> i64 {
    if whole <= 0 {
        return MAX_SCORE;
    }
    let part = part.max(0);
    (part * 200 + whole) / (whole * 2)
}

/// Correct and incorrect picks of a selection against the relevant set.
/// Duplicate picks count once.
pub(crate) fn tally_selection(selected: &[String], relevant: &[&str]) -> (i64, i64) {
    let unique: HashSet<&str> = selected.iter().map(|s| s.as_str()).collect();
    let correct = unique.iter().filter(|id| relevant.contains(id)).count() as i64;
    let incorrect = unique.len() as i64 - correct;
    (correct, incorrect)
}

/// `round(avg_verification * 0.7 + action_score * 0.3)`
pub fn blend_verification(avg_verification: f64, action_score: u8) -> u8 {
    let blended = avg_verification * VERIFICATION_WEIGHT + action_score as f64 * DECISION_WEIGHT;
    clamp_score(blended.round() as i64)
}

/// Fold the outcomes of a finished mission into its final 0-100 score
pub fn mission_score(aggregation: Aggregation, steps: &[StepSpec], outcomes: &[StepOutcome]) -> u8 {
    if outcomes.is_empty() {
        return 0;
    }

    match aggregation {
        Aggregation::MeanScore => {
            let total: i64 = outcomes.iter().map(|o| o.score as i64).sum();
            let count = outcomes.len() as i64;
            clamp_score((total * 2 + count) / (count * 2))
        }
        Aggregation::NormalizedPoints { max_per_step } => {
            let total: i64 = outcomes.iter().map(|o| o.points as i64).sum();
            let possible = outcomes.len() as i64 * max_per_step as i64;
            clamp_score(rounded_percent(total, possible))
        }
        Aggregation::VerificationBlend => {
            // (kind, summed score, count) per verification stage, in first-seen order
            let mut stages: Vec<(StepKind, u32, u32)> = Vec::new();
            let mut decision: Option<u8> = None;

            for (step, outcome) in steps.iter().zip(outcomes) {
                match step.kind() {
                    StepKind::Decision => decision = Some(outcome.score),
                    kind => match stages.iter_mut().find(|(k, _, _)| *k == kind) {
                        Some(stage) => {
                            stage.1 += outcome.score as u32;
                            stage.2 += 1;
                        }
                        None => stages.push((kind, outcome.score as u32, 1)),
                    },
                }
            }

            let avg_verification = if stages.is_empty() {
                0.0
            } else {
                stages
                    .iter()
                    .map(|(_, sum, count)| *sum as f64 / *count as f64)
                    .sum::<f64>()
                    / stages.len() as f64
            };

            blend_verification(avg_verification, decision.unwrap_or(0))
        }
    }
}
