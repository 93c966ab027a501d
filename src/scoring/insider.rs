use super::{clamp_score, rounded_percent, ScoringRule, StepOutcome};

/// Points for classifying an activity correctly
pub const CORRECT_CALL_POINTS: i32 = 10;

/// Points for a wrong call (flagging normal work or missing a suspicious one)
pub const WRONG_CALL_POINTS: i32 = -5;

/// One logged employee activity
#[derive(Debug)]
pub struct Activity {
    pub id: &'static str,
    pub description: &'static str,
    pub suspicious: bool,
}

/// Investigation case: a handful of activities to flag or clear
#[derive(Debug)]
pub struct InsiderCase {
    pub employee: &'static str,
    pub activities: &'static [Activity],
}

impl InsiderCase {
    /// Best possible tally for this case
    pub fn max_points(&self) -> i32 {
        self.activities.len() as i32 * CORRECT_CALL_POINTS
    }

    /// Activities the learner called the wrong way
    pub fn misjudged<'a>(&'a self, flagged: &'a [String]) -> impl Iterator<Item = &'a Activity> + 'a {
        self.activities
            .iter()
            .filter(move |activity| !called_right(activity, flagged))
    }
}

fn called_right(activity: &Activity, flagged: &[String]) -> bool {
    flagged.iter().any(|id| id == activity.id) == activity.suspicious
}

impl ScoringRule for InsiderCase {
    type Answer = [String];

    /// `+10` per activity whose suspicious/normal call matches the ground truth, `-5` otherwise.
    /// `points` keeps the raw (possibly negative) sum for mission-level normalization.
    fn outcome(&self, flagged: &[String]) -> StepOutcome {
        let points: i32 = self
            .activities
            .iter()
            .map(|activity| {
                if called_right(activity, flagged) {
                    CORRECT_CALL_POINTS
                } else {
                    WRONG_CALL_POINTS
                }
            })
            .sum();

        StepOutcome {
            points,
            score: clamp_score(rounded_percent(points as i64, self.max_points() as i64)),
        }
    }
}
