// Server-side attempt state machine.
//
// Tutorial -> Active -> Feedback -> (Active | Complete)
//
// Transitions are pure functions over a `MissionAttempt` row. Reducers in
// `attempts.rs` load the row, call one transition, persist the result and
// manage the countdown timers the transition asks for.

use spacetimedb::{SpacetimeType, Timestamp};
use thiserror::Error;

use crate::catalog::{mission, MissionDef};
use crate::missions::MissionId;
use crate::scoring::{mission_score, AnswerMismatch, StepAnswer, StepOutcome, StepSpec};
use crate::{MissionAttempt, MissionProgress};

#[derive(SpacetimeType, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    Tutorial, // Intro screen, clock not running
    Active,   // Step on screen, accepting input
    Feedback, // Step scored, input disabled
    Complete, // Terminal, progress already recorded
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("unknown mission '{0}'")]
    UnknownMission(String),
    #[error("mission {mission} is locked until {requires} is completed")]
    Locked {
        mission: &'static str,
        requires: &'static str,
    },
    #[error("no mission attempt in progress")]
    NoAttempt,
    #[error("attempt is {actual:?}, expected {expected:?}")]
    WrongPhase {
        expected: AttemptPhase,
        actual: AttemptPhase,
    },
    #[error(transparent)]
    Answer(#[from] AnswerMismatch),
    #[error("'{0}' is not an option on this step")]
    UnknownChoice(String),
    #[error("this step needs an explicit answer")]
    NoAnswer,
    #[error("mission has no step {0}")]
    MissingStep(u32),
}

/// Where `advance` moved the attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    NextStep(u32),
    Completed { score: u8, time_spent_ms: u64 },
}

fn expect_phase(attempt: &MissionAttempt, expected: AttemptPhase) -> Result<(), SessionError> {
    if attempt.phase == expected {
        Ok(())
    } else {
        Err(SessionError::WrongPhase {
            expected,
            actual: attempt.phase,
        })
    }
}

pub fn definition(attempt: &MissionAttempt) -> Result<&'static MissionDef, SessionError> {
    MissionId::parse(&attempt.mission_id)
        .map(mission)
        .ok_or_else(|| SessionError::UnknownMission(attempt.mission_id.clone()))
}

pub fn current_step(attempt: &MissionAttempt) -> Result<&'static StepSpec, SessionError> {
    definition(attempt)?
        .step(attempt.step_index)
        .ok_or(SessionError::MissingStep(attempt.step_index))
}

/// Put the attempt on a step and arm its countdown, if it has one
fn enter_step(attempt: &mut MissionAttempt, index: u32, now: Timestamp) -> Result<(), SessionError> {
    let step = definition(attempt)?
        .step(index)
        .ok_or(SessionError::MissingStep(index))?;
    attempt.phase = AttemptPhase::Active;
    attempt.step_index = index;
    attempt.draft = None;
    attempt.step_deadline = step.countdown().map(|countdown| now + countdown);
    Ok(())
}

/// Fresh attempt in `Tutorial`. Fails for unknown or still-locked missions.
pub fn start(
    username: &str,
    mission_id: &str,
    completed: &[MissionProgress],
    now: Timestamp,
) -> Result<MissionAttempt, SessionError> {
    let id = MissionId::parse(mission_id)
        .ok_or_else(|| SessionError::UnknownMission(mission_id.trim().to_string()))?;

    if !id.is_unlocked(completed) {
        let requires = id.predecessor().map(MissionId::as_str).unwrap_or_default();
        return Err(SessionError::Locked {
            mission: id.as_str(),
            requires,
        });
    }

    Ok(MissionAttempt {
        username: username.to_string(),
        mission_id: id.as_str().to_string(),
        phase: AttemptPhase::Tutorial,
        step_index: 0,
        draft: None,
        outcomes: Vec::new(),
        final_score: None,
        started_at: now,
        step_deadline: None,
    })
}

/// Leave the tutorial. The clock for `time_spent_ms` starts here.
pub fn begin(attempt: &mut MissionAttempt, now: Timestamp) -> Result<(), SessionError> {
    expect_phase(attempt, AttemptPhase::Tutorial)?;
    attempt.started_at = now;
    enter_step(attempt, 0, now)
}

/// Store the learner's current selection without scoring it
pub fn select(attempt: &mut MissionAttempt, answer: StepAnswer) -> Result<(), SessionError> {
    expect_phase(attempt, AttemptPhase::Active)?;
    let step = current_step(attempt)?;
    step.accepts(&answer)?;
    if let Some(choice) = step.unknown_choice(&answer) {
        return Err(SessionError::UnknownChoice(choice));
    }
    attempt.draft = Some(answer);
    Ok(())
}

/// Score the current step and move to `Feedback`.
///
/// Without an explicit answer the stored draft is submitted, and without a
/// draft the step's empty selection is. Returns the answer that was scored.
pub fn submit(
    attempt: &mut MissionAttempt,
    answer: Option<StepAnswer>,
) -> Result<(StepAnswer, StepOutcome), SessionError> {
    expect_phase(attempt, AttemptPhase::Active)?;
    let step = current_step(attempt)?;

    let answer = answer
        .or_else(|| attempt.draft.clone())
        .or_else(|| step.empty_answer())
        .ok_or(SessionError::NoAnswer)?;
    if let Some(choice) = step.unknown_choice(&answer) {
        return Err(SessionError::UnknownChoice(choice));
    }
    let outcome = step.score(&answer)?;

    attempt.outcomes.push(outcome.clone());
    attempt.phase = AttemptPhase::Feedback;
    attempt.draft = None;
    attempt.step_deadline = None;
    Ok((answer, outcome))
}

/// Countdown for `step_index` ran out.
///
/// Returns `None` when the timer is stale: the step was already submitted,
/// the attempt moved on or was replaced, or the step is untimed.
pub fn expire(
    attempt: &mut MissionAttempt,
    step_index: u32,
    attempt_started_at: Timestamp,
) -> Result<Option<StepOutcome>, SessionError> {
    if attempt.phase != AttemptPhase::Active
        || attempt.step_index != step_index
        || attempt.started_at != attempt_started_at
    {
        return Ok(None);
    }
    if current_step(attempt)?.countdown().is_none() {
        return Ok(None);
    }
    submit(attempt, None).map(|(_, outcome)| Some(outcome))
}

/// Leave `Feedback`: on to the next step, or finish the mission
pub fn advance(attempt: &mut MissionAttempt, now: Timestamp) -> Result<Advance, SessionError> {
    expect_phase(attempt, AttemptPhase::Feedback)?;
    let def = definition(attempt)?;

    let next = attempt.step_index + 1;
    if (next as usize) < def.steps.len() {
        enter_step(attempt, next, now)?;
        return Ok(Advance::NextStep(next));
    }

    let score = mission_score(def.aggregation, def.steps, &attempt.outcomes);
    let elapsed_ms = now
        .duration_since(attempt.started_at)
        .unwrap_or_default()
        .as_millis();
    let time_spent_ms = (elapsed_ms.min(u64::MAX as u128) as u64).max(1);

    attempt.phase = AttemptPhase::Complete;
    attempt.final_score = Some(score);
    attempt.step_deadline = None;
    Ok(Advance::Completed {
        score,
        time_spent_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{ClassificationChoice, EmailAction, StepKind};
    use std::time::Duration;

    fn at(secs: u64) -> Timestamp {
        Timestamp::from_micros_since_unix_epoch(1_760_000_000_000_000) + Duration::from_secs(secs)
    }

    fn done(mission_id: &str) -> MissionProgress {
        MissionProgress {
            mission_id: mission_id.to_string(),
            completed: true,
            score: 80,
            attempts: 1,
            best_time_ms: Some(10_000),
            completed_at: at(0),
        }
    }

    fn active(mission_id: &str, unlocked_by: &[MissionProgress]) -> MissionAttempt {
        let mut attempt = start("bob", mission_id, unlocked_by, at(0)).unwrap();
        begin(&mut attempt, at(10)).unwrap();
        attempt
    }

    #[test]
    fn test_start_checks_unlock_chain() {
        let attempt = start("bob", "email-urgency", &[], at(0)).unwrap();
        assert_eq!(attempt.phase, AttemptPhase::Tutorial);
        assert_eq!(attempt.mission_id, "email-urgency");

        assert_eq!(
            start("bob", "insider-threat", &[], at(0)),
            Err(SessionError::Locked {
                mission: "insider-threat",
                requires: "email-urgency"
            })
        );
        assert!(start("bob", "insider-threat", &[done("email-urgency")], at(0)).is_ok());
        assert_eq!(
            start("bob", "phishing-101", &[], at(0)),
            Err(SessionError::UnknownMission("phishing-101".to_string()))
        );
    }

    #[test]
    fn test_begin_starts_the_clock() {
        let attempt = active("email-urgency", &[]);
        assert_eq!(attempt.phase, AttemptPhase::Active);
        assert_eq!(attempt.step_index, 0);
        assert_eq!(attempt.started_at, at(10));
        // Email steps are untimed
        assert_eq!(attempt.step_deadline, None);
    }

    #[test]
    fn test_begin_twice_is_rejected() {
        let mut attempt = active("email-urgency", &[]);
        assert_eq!(
            begin(&mut attempt, at(20)),
            Err(SessionError::WrongPhase {
                expected: AttemptPhase::Tutorial,
                actual: AttemptPhase::Active
            })
        );
    }

    #[test]
    fn test_select_validates_kind_and_options() {
        let mut attempt = active("email-urgency", &[]);
        let wrong_kind = select(&mut attempt, StepAnswer::Decision(EmailAction::Flag));
        assert!(matches!(wrong_kind, Err(SessionError::Answer(_))));

        let unknown = select(&mut attempt, StepAnswer::RedFlags(vec!["made-up".into()]));
        assert_eq!(unknown, Err(SessionError::UnknownChoice("made-up".into())));

        select(&mut attempt, StepAnswer::RedFlags(vec!["urgent-deadline".into()])).unwrap();
        assert_eq!(
            attempt.draft,
            Some(StepAnswer::RedFlags(vec!["urgent-deadline".into()]))
        );
    }

    #[test]
    fn test_submit_uses_draft_and_disables_input() {
        let mut attempt = active("email-urgency", &[]);
        select(
            &mut attempt,
            StepAnswer::RedFlags(vec![
                "lookalike-domain".into(),
                "urgent-deadline".into(),
                "credential-link".into(),
                "generic-greeting".into(),
            ]),
        )
        .unwrap();

        let (_, outcome) = submit(&mut attempt, None).unwrap();
        assert_eq!(outcome.score, 100);
        assert_eq!(attempt.phase, AttemptPhase::Feedback);
        assert_eq!(attempt.draft, None);

        // Input is disabled once the step is scored
        assert!(matches!(
            submit(&mut attempt, Some(StepAnswer::RedFlags(vec![]))),
            Err(SessionError::WrongPhase { .. })
        ));
        assert!(matches!(
            select(&mut attempt, StepAnswer::RedFlags(vec![])),
            Err(SessionError::WrongPhase { .. })
        ));
        assert_eq!(attempt.outcomes.len(), 1);
    }

    #[test]
    fn test_submit_reports_the_fallback_answer() {
        let mut attempt = active("insider-threat", &[done("email-urgency")]);
        let (answer, outcome) = submit(&mut attempt, None).unwrap();
        assert_eq!(answer, StepAnswer::Activities(vec![]));
        assert_eq!(outcome, StepOutcome { points: 5, score: 25 });

        // Nothing flagged, so the suspicious activity is the misjudged one
        let step = current_step(&attempt).unwrap();
        assert_eq!(
            step.misjudged(&answer),
            vec!["Downloaded 4 GB of customer records at 02:13"]
        );
    }

    #[test]
    fn test_decision_needs_an_explicit_answer() {
        let chain = [done("email-urgency"), done("insider-threat")];
        let mut attempt = active("bec-security", &chain);
        let last = (definition(&attempt).unwrap().steps.len() - 1) as u32;
        attempt.phase = AttemptPhase::Feedback;
        attempt.step_index = last - 1;
        advance(&mut attempt, at(20)).unwrap();
        assert_eq!(current_step(&attempt).unwrap().kind(), StepKind::Decision);

        assert_eq!(submit(&mut attempt, None), Err(SessionError::NoAnswer));
        let (_, outcome) = submit(&mut attempt, Some(StepAnswer::Decision(EmailAction::Flag))).unwrap();
        assert_eq!(outcome.score, 100);
    }

    #[test]
    fn test_countdown_auto_submits_empty_selection() {
        let chain = [done("email-urgency"), done("insider-threat")];
        let mut attempt = active("bec-security", &chain);
        submit(&mut attempt, None).unwrap();
        advance(&mut attempt, at(15)).unwrap();

        // Step 1 is the policy board: 90 s from entering it
        assert_eq!(current_step(&attempt).unwrap().kind(), StepKind::Policies);
        assert_eq!(attempt.step_deadline, Some(at(15) + Duration::from_secs(90)));

        let started = attempt.started_at;
        let outcome = expire(&mut attempt, 1, started).unwrap();
        assert_eq!(outcome, Some(StepOutcome { points: 0, score: 0 }));
        assert_eq!(attempt.phase, AttemptPhase::Feedback);
        assert_eq!(attempt.step_deadline, None);
    }

    #[test]
    fn test_countdown_submits_the_draft() {
        let chain = [done("email-urgency"), done("insider-threat")];
        let mut attempt = active("bec-security", &chain);
        submit(&mut attempt, None).unwrap();
        advance(&mut attempt, at(15)).unwrap();
        select(
            &mut attempt,
            StepAnswer::Policies(vec!["dual-approval".into(), "callback-verification".into()]),
        )
        .unwrap();

        let started = attempt.started_at;
        let outcome = expire(&mut attempt, 1, started).unwrap().unwrap();
        assert_eq!(outcome.score, 50);
    }

    #[test]
    fn test_stale_countdowns_do_nothing() {
        let chain = [done("email-urgency"), done("insider-threat")];
        let mut attempt = active("bec-security", &chain);
        let started = attempt.started_at;

        // Step 0 (sender order) is untimed
        assert_eq!(expire(&mut attempt, 0, started), Ok(None));

        submit(&mut attempt, None).unwrap();
        advance(&mut attempt, at(15)).unwrap();
        // Wrong step index, then a timer left over from an earlier attempt
        assert_eq!(expire(&mut attempt, 2, started), Ok(None));
        assert_eq!(expire(&mut attempt, 1, at(0)), Ok(None));
        assert_eq!(attempt.phase, AttemptPhase::Active);

        submit(&mut attempt, Some(StepAnswer::Policies(vec![]))).unwrap();
        assert_eq!(expire(&mut attempt, 1, started), Ok(None));
        assert_eq!(attempt.outcomes.len(), 2);
    }

    #[test]
    fn test_full_data_security_run_completes_once() {
        let chain = [done("email-urgency"), done("insider-threat"), done("bec-security")];
        let mut attempt = active("data-security", &chain);
        let steps = definition(&attempt).unwrap().steps.len() as u32;

        for index in 0..steps {
            let StepSpec::Classification(case) = current_step(&attempt).unwrap() else {
                panic!("data mission holds only classification steps");
            };
            // Get the classification right and nothing else
            let answer = StepAnswer::Classification(ClassificationChoice {
                classification: case.classification.to_string(),
                ..Default::default()
            });
            submit(&mut attempt, Some(answer)).unwrap();

            let result = advance(&mut attempt, at(70)).unwrap();
            if index + 1 < steps {
                assert_eq!(result, Advance::NextStep(index + 1));
            } else {
                assert_eq!(
                    result,
                    Advance::Completed {
                        score: 33,
                        time_spent_ms: 60_000
                    }
                );
            }
        }

        assert_eq!(attempt.phase, AttemptPhase::Complete);
        assert_eq!(attempt.final_score, Some(33));
        assert!(matches!(
            advance(&mut attempt, at(80)),
            Err(SessionError::WrongPhase { .. })
        ));
    }

    #[test]
    fn test_instant_completion_counts_one_millisecond() {
        let mut attempt = active("email-urgency", &[]);
        let steps = definition(&attempt).unwrap().steps.len();
        let mut last = None;
        for _ in 0..steps {
            submit(&mut attempt, None).unwrap();
            last = Some(advance(&mut attempt, at(10)).unwrap());
        }
        assert_eq!(
            last,
            Some(Advance::Completed {
                score: 0,
                time_spent_ms: 1
            })
        );
    }
}
