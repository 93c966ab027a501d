use super::{clamp_score, rounded_percent, tally_selection, ScoringRule, StepOutcome};

/// Phishing email with its answer key
#[derive(Debug)]
pub struct EmailCase {
    pub subject: &'static str,
    /// Clickable hotspots that are genuine warning signs
    pub red_flags: &'static [&'static str],
    /// Clickable hotspots that look suspicious but are harmless
    pub decoys: &'static [&'static str],
}

impl ScoringRule for EmailCase {
    type Answer = [String];

    /// `round(correct / total * 100) - 2 * incorrect`, clamped to 0-100.
    /// False positives are penalized lightly so partial credit survives.
    fn outcome(&self, selected: &[String]) -> StepOutcome {
        let (correct, incorrect) = tally_selection(selected, self.red_flags);
        let raw = rounded_percent(correct, self.red_flags.len() as i64) - 2 * incorrect;
        StepOutcome::from_score(clamp_score(raw))
    }
}
