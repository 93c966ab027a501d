// Reducers driving the server-side mission flow.
// Each one loads the learner's attempt, applies one transition from
// `session`, persists it and keeps the step countdown in sync.

use spacetimedb::{reducer, ReducerContext, ScheduleAt, Table};

use crate::scoring::StepAnswer;
use crate::session::{self, Advance, SessionError};
use crate::{apply_mission_completion, get_or_create_user, progress};
use crate::{mission_attempt, step_timer, MissionAttempt, StepTimer};

fn load_attempt(ctx: &ReducerContext, username: &str) -> Result<MissionAttempt, String> {
    ctx.db
        .mission_attempt()
        .username()
        .find(&username.to_string())
        .ok_or_else(|| SessionError::NoAttempt.to_string())
}

fn cancel_step_timers(ctx: &ReducerContext, username: &str) {
    let timers: Vec<u64> = ctx
        .db
        .step_timer()
        .username()
        .filter(&username.to_string())
        .map(|t| t.id)
        .collect();
    for id in timers {
        ctx.db.step_timer().id().delete(&id);
    }
}

/// Replace any pending countdown with the one the attempt now needs
fn sync_step_timer(ctx: &ReducerContext, attempt: &MissionAttempt) {
    cancel_step_timers(ctx, &attempt.username);
    if let Some(deadline) = attempt.step_deadline {
        ctx.db.step_timer().insert(StepTimer {
            id: 0,
            username: attempt.username.clone(),
            step_index: attempt.step_index,
            attempt_started_at: attempt.started_at,
            scheduled_at: ScheduleAt::Time(deadline.into()),
        });
        log::info!(
            "[TIMER] armed user:{} mission:{} step:{} deadline:{:?}",
            attempt.username, attempt.mission_id, attempt.step_index, deadline
        );
    }
}

fn save_attempt(ctx: &ReducerContext, attempt: MissionAttempt) {
    sync_step_timer(ctx, &attempt);
    ctx.db.mission_attempt().username().update(attempt);
}

/// Open a mission at its tutorial screen, replacing any earlier attempt
#[reducer]
pub fn start_mission(ctx: &ReducerContext, username: String, mission_id: String) -> Result<(), String> {
    let username = progress::normalize_username(&username).map_err(|e| e.to_string())?;
    let profile = get_or_create_user(ctx, &username);

    let attempt = session::start(&username, &mission_id, &profile.missions, ctx.timestamp).map_err(|e| {
        log::warn!("[ATTEMPT] start rejected user:{} mission:{} reason:{}", username, mission_id, e);
        e.to_string()
    })?;

    cancel_step_timers(ctx, &username);
    if ctx.db.mission_attempt().username().find(&username).is_some() {
        ctx.db.mission_attempt().username().delete(&username);
    }
    let title = session::definition(&attempt).map(|def| def.title).unwrap_or_default();
    log::info!("[ATTEMPT] started user:{} mission:{} title:{:?}", username, attempt.mission_id, title);
    ctx.db.mission_attempt().insert(attempt);
    Ok(())
}

/// Tutorial dismissed: show the first step and start the clock
#[reducer]
pub fn begin_mission(ctx: &ReducerContext, username: String) -> Result<(), String> {
    let mut attempt = load_attempt(ctx, username.trim())?;
    session::begin(&mut attempt, ctx.timestamp).map_err(|e| e.to_string())?;

    log::info!("[ATTEMPT] begin user:{} mission:{}", attempt.username, attempt.mission_id);
    save_attempt(ctx, attempt);
    Ok(())
}

/// Store the current selection; a countdown expiry submits it
#[reducer]
pub fn select_answer(ctx: &ReducerContext, username: String, answer: StepAnswer) -> Result<(), String> {
    let mut attempt = load_attempt(ctx, username.trim())?;
    session::select(&mut attempt, answer).map_err(|e| e.to_string())?;
    ctx.db.mission_attempt().username().update(attempt);
    Ok(())
}

/// Score the current step. `None` submits the stored selection.
#[reducer]
pub fn submit_step(ctx: &ReducerContext, username: String, answer: Option<StepAnswer>) -> Result<(), String> {
    let mut attempt = load_attempt(ctx, username.trim())?;
    let step = session::current_step(&attempt).map_err(|e| e.to_string())?;
    let (submitted, outcome) = session::submit(&mut attempt, answer).map_err(|e| {
        log::warn!("[ATTEMPT] submit rejected user:{} step:{} reason:{}", attempt.username, attempt.step_index, e);
        e.to_string()
    })?;

    log::info!(
        "[ATTEMPT] scored user:{} mission:{} step:{} kind:{} title:{:?} points:{} score:{}",
        attempt.username, attempt.mission_id, attempt.step_index, step.kind().label(),
        step.title(), outcome.points, outcome.score
    );
    for missed in step.misjudged(&submitted) {
        log::info!("[ATTEMPT] feedback user:{} misjudged:{:?}", attempt.username, missed);
    }
    save_attempt(ctx, attempt);
    Ok(())
}

/// Leave the feedback screen. After the last step this records the completion.
#[reducer]
pub fn next_step(ctx: &ReducerContext, username: String) -> Result<(), String> {
    let mut attempt = load_attempt(ctx, username.trim())?;
    let advance = session::advance(&mut attempt, ctx.timestamp).map_err(|e| e.to_string())?;

    match advance {
        Advance::NextStep(index) => {
            log::info!("[ATTEMPT] next user:{} mission:{} step:{}", attempt.username, attempt.mission_id, index);
        }
        Advance::Completed { score, time_spent_ms } => {
            log::info!(
                "[ATTEMPT] complete user:{} mission:{} score:{} time_ms:{}",
                attempt.username, attempt.mission_id, score, time_spent_ms
            );
            // Same transaction: a failed save rolls back the Complete phase too
            apply_mission_completion(ctx, &attempt.username, &attempt.mission_id, score as u32, time_spent_ms)?;
        }
    }

    save_attempt(ctx, attempt);
    Ok(())
}

/// Auto-submit for an expired countdown. Stale timers only clean up after themselves.
pub(crate) fn auto_submit(ctx: &ReducerContext, timer: StepTimer) -> Result<(), String> {
    ctx.db.step_timer().id().delete(&timer.id);

    let Some(mut attempt) = ctx.db.mission_attempt().username().find(&timer.username) else {
        log::info!("[TIMER] fired for user:{} with no attempt, ignoring", timer.username);
        return Ok(());
    };

    match session::expire(&mut attempt, timer.step_index, timer.attempt_started_at) {
        Ok(Some(outcome)) => {
            log::info!(
                "[TIMER] auto-submit user:{} mission:{} step:{} points:{} score:{}",
                attempt.username, attempt.mission_id, timer.step_index, outcome.points, outcome.score
            );
            save_attempt(ctx, attempt);
        }
        Ok(None) => {
            log::info!("[TIMER] stale user:{} step:{}, ignoring", timer.username, timer.step_index);
        }
        Err(e) => {
            log::error!("[TIMER] auto-submit failed user:{} step:{} reason:{}", timer.username, timer.step_index, e);
        }
    }
    Ok(())
}
