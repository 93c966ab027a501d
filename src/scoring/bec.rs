use spacetimedb::SpacetimeType;

use super::{clamp_score, rounded_percent, tally_selection, ScoringRule, StepOutcome, MAX_SCORE};

const ORDER_MISMATCH_PENALTY: i64 = 20;
const POLICY_WRONG_PICK_PENALTY: i64 = 10;
const DIALOGUE_WRONG_PICK_PENALTY: i64 = 25;

/// Put the sender-verification steps in the right order
#[derive(Debug)]
pub struct OrderPuzzle {
    pub canonical: &'static [&'static str],
}

impl ScoringRule for OrderPuzzle {
    type Answer = [String];

    /// `100 - 20 * mismatches`, compared position by position.
    /// Missing or surplus positions count as mismatches.
    fn outcome(&self, order: &[String]) -> StepOutcome {
        let positions = self.canonical.len().max(order.len());
        let mismatches = (0..positions)
            .filter(|&i| order.get(i).map(String::as_str) != self.canonical.get(i).copied())
            .count() as i64;
        StepOutcome::from_score(clamp_score(MAX_SCORE - ORDER_MISMATCH_PENALTY * mismatches))
    }
}

/// Policy board: pick every control that applies to a payment-change request
#[derive(Debug)]
pub struct PolicyTable {
    pub relevant: &'static [&'static str],
    pub distractors: &'static [&'static str],
}

impl ScoringRule for PolicyTable {
    type Answer = [String];

    /// `round(correct / relevant * 100) - 10 * incorrect`, clamped
    fn outcome(&self, selected: &[String]) -> StepOutcome {
        let (correct, incorrect) = tally_selection(selected, self.relevant);
        let raw = rounded_percent(correct, self.relevant.len() as i64)
            - POLICY_WRONG_PICK_PENALTY * incorrect;
        StepOutcome::from_score(clamp_score(raw))
    }
}

/// One question in the supervisor conversation
#[derive(Debug)]
pub struct DialogueStep {
    pub prompt: &'static str,
    pub correct_options: &'static [&'static str],
    pub other_options: &'static [&'static str],
}

impl ScoringRule for DialogueStep {
    type Answer = [String];

    /// `round(chosen_correct / total_correct * 100) - 25 * incorrect`, clamped
    fn outcome(&self, selected: &[String]) -> StepOutcome {
        let (correct, incorrect) = tally_selection(selected, self.correct_options);
        let raw = rounded_percent(correct, self.correct_options.len() as i64)
            - DIALOGUE_WRONG_PICK_PENALTY * incorrect;
        StepOutcome::from_score(clamp_score(raw))
    }
}

/// What the learner finally does with the suspicious email
#[derive(SpacetimeType, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmailAction {
    Flag,
    Process,
}

#[derive(Debug)]
pub struct DecisionCase {
    pub fraudulent: bool,
}

impl DecisionCase {
    pub fn expected(&self) -> EmailAction {
        if self.fraudulent {
            EmailAction::Flag
        } else {
            EmailAction::Process
        }
    }
}

impl ScoringRule for DecisionCase {
    type Answer = EmailAction;

    fn outcome(&self, action: &EmailAction) -> StepOutcome {
        let score = if *action == self.expected() { MAX_SCORE } else { 0 };
        StepOutcome::from_score(clamp_score(score))
    }
}
