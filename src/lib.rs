use spacetimedb::{
    ReducerContext, Identity, Table, Timestamp, ScheduleAt,
    table, reducer, SpacetimeType,
};

mod attempts;
mod catalog;
mod missions;
mod progress;
mod scoring;
mod session;

// Import bulk restore reducer for disaster recovery
mod restore;

use missions::MissionId;
use scoring::{StepAnswer, StepOutcome};
use session::AttemptPhase;

// ==================== CONSTANTS ====================

/// Points every new (or reset) learner starts with
const STARTING_POINTS: u32 = 450;

/// Longest accepted username, in characters
const MAX_USERNAME_LEN: usize = 64;

/// Liveness message written by `ping`
const PING_MESSAGE: &str = "Backend is working!";

/// Singleton key of the service_status row
const SERVICE_STATUS_ID: u32 = 0;

// ==================== TYPES ====================

/// Per-mission record embedded in a user profile
#[derive(SpacetimeType, Clone, Debug, PartialEq)]
pub struct MissionProgress {
    pub mission_id: String,

    /// Set on the first completion and never cleared (except by reset)
    pub completed: bool,

    /// Best score ever achieved (0-100)
    pub score: u8,

    /// Completions submitted, including replays
    pub attempts: u32,

    /// Fastest completion in milliseconds
    pub best_time_ms: Option<u64>,

    /// Most recent completion
    pub completed_at: Timestamp,
}

// ==================== TABLES ====================

/// Learner progress record
/// PUBLIC: clients read their own row with
/// `SELECT * FROM user_profile WHERE username = '<name>'`
#[table(name = user_profile, public)]
#[derive(Clone, Debug, PartialEq)]
pub struct UserProfile {
    #[primary_key]
    pub username: String,

    /// Lifetime points, only lowered by an admin reset
    pub total_points: u32,

    /// Derived from total_points on every write
    pub rank: String,

    /// One entry per mission ever completed, unique by mission_id
    pub missions: Vec<MissionProgress>,

    pub achievements: Vec<String>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Latest completion response per learner
#[table(name = mission_result, public)]
#[derive(Clone, Debug)]
pub struct MissionResult {
    #[primary_key]
    pub username: String,

    pub mission_id: String,
    pub score: u8,
    pub time_spent_ms: u64,
    pub points_earned: u32,

    /// Totals after this completion
    pub total_points: u32,
    pub rank: String,
    pub missions: Vec<MissionProgress>,

    pub recorded_at: Timestamp,
}

/// A learner's current mission run (one per learner, replaced on restart)
#[table(name = mission_attempt, public)]
#[derive(Clone, Debug, PartialEq)]
pub struct MissionAttempt {
    #[primary_key]
    pub username: String,

    pub mission_id: String,
    pub phase: AttemptPhase,

    /// Step on screen (Active) or just scored (Feedback)
    pub step_index: u32,

    /// Selection made so far on the current step, submitted on countdown expiry
    pub draft: Option<StepAnswer>,

    /// One outcome per scored step, in order
    pub outcomes: Vec<StepOutcome>,

    /// Set when the attempt reaches Complete
    pub final_score: Option<u8>,

    /// When the learner left the tutorial
    pub started_at: Timestamp,

    /// Auto-submit time of the current step, if it is timed
    pub step_deadline: Option<Timestamp>,
}

/// Schedule table for step countdowns (policy board, supervisor dialogue)
#[table(name = step_timer, scheduled(step_timer_elapsed))]
pub struct StepTimer {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    #[index(btree)]
    pub username: String,

    /// Which step of the attempt this countdown belongs to
    pub step_index: u32,

    /// Identifies the attempt; a restarted attempt never matches
    pub attempt_started_at: Timestamp,

    /// When the step auto-submits
    pub scheduled_at: ScheduleAt,
}

/// Liveness row written by `ping`
#[table(name = service_status, public)]
pub struct ServiceStatus {
    #[primary_key]
    pub id: u32,
    pub message: String,
    pub checked_at: Timestamp,
}

/// Authorized identities that can call admin reducers
#[table(name = authorized_worker)]
pub struct AuthorizedWorker {
    #[primary_key]
    pub identity: Identity,
}

// ==================== LIFECYCLE ====================

/// Initialize module
#[reducer(init)]
pub fn init(ctx: &ReducerContext) {
    // In init, ctx.sender is the module owner identity
    if ctx.db.authorized_worker().identity().find(&ctx.sender).is_none() {
        ctx.db.authorized_worker().insert(AuthorizedWorker {
            identity: ctx.sender,
        });
    }

    log::info!("Cyber awareness module initialized successfully");
}

// ==================== PROGRESS REDUCERS ====================

/// Fetch-or-create a learner profile. Calling it again changes nothing.
#[reducer]
pub fn create_user(ctx: &ReducerContext, username: String) -> Result<(), String> {
    let username = progress::normalize_username(&username).map_err(|e| e.to_string())?;
    get_or_create_user(ctx, &username);
    Ok(())
}

/// Record a finished mission scored on the client.
/// The response lands in `mission_result` under the same username.
#[reducer]
pub fn complete_mission(
    ctx: &ReducerContext,
    username: String,
    mission_id: String,
    score: u32,
    time_spent_ms: u64,
) -> Result<(), String> {
    let username = progress::normalize_username(&username).map_err(|e| e.to_string())?;
    apply_mission_completion(ctx, &username, &mission_id, score, time_spent_ms)?;
    Ok(())
}

/// Put every learner back to the starting state. Irreversible.
#[reducer]
pub fn reset_all_users(ctx: &ReducerContext) -> Result<(), String> {
    require_authorized(ctx, "reset_all_users")?;

    let users: Vec<UserProfile> = ctx.db.user_profile().iter().collect();
    let count = users.len();
    for mut user in users {
        progress::reset_profile(&mut user, ctx.timestamp);
        ctx.db.user_profile().username().update(user);
    }

    // No engine state may outlive the progress it belongs to
    let results: Vec<String> = ctx.db.mission_result().iter().map(|r| r.username).collect();
    for username in &results {
        ctx.db.mission_result().username().delete(username);
    }
    let attempts: Vec<String> = ctx.db.mission_attempt().iter().map(|a| a.username).collect();
    for username in &attempts {
        ctx.db.mission_attempt().username().delete(username);
    }
    let timers: Vec<u64> = ctx.db.step_timer().iter().map(|t| t.id).collect();
    for id in &timers {
        ctx.db.step_timer().id().delete(id);
    }

    log::info!(
        "[ADMIN] All user progress has been reset users:{} results:{} attempts:{} timers:{} by:{}",
        count, results.len(), attempts.len(), timers.len(), ctx.sender
    );
    Ok(())
}

/// Health check
#[reducer]
pub fn ping(ctx: &ReducerContext) {
    let status = ServiceStatus {
        id: SERVICE_STATUS_ID,
        message: PING_MESSAGE.to_string(),
        checked_at: ctx.timestamp,
    };
    if ctx.db.service_status().id().find(&SERVICE_STATUS_ID).is_some() {
        ctx.db.service_status().id().update(status);
    } else {
        ctx.db.service_status().insert(status);
    }
    log::info!("[PING] {} caller:{}", PING_MESSAGE, ctx.sender);
}

/// Countdown for a timed step ran out (scheduled reducer)
#[reducer]
pub fn step_timer_elapsed(ctx: &ReducerContext, timer: StepTimer) -> Result<(), String> {
    // Only allow scheduler to call this, not clients
    if ctx.sender != ctx.identity() {
        log::warn!("Client {} attempted to call step_timer_elapsed", ctx.sender);
        return Err("step_timer_elapsed is scheduler-only".to_string());
    }
    attempts::auto_submit(ctx, timer)
}

// ==================== HELPER FUNCTIONS ====================

fn require_authorized(ctx: &ReducerContext, action: &str) -> Result<(), String> {
    if ctx.db.authorized_worker().identity().find(&ctx.sender).is_none() {
        log::warn!("[ADMIN] unauthorized {} attempt by {}", action, ctx.sender);
        return Err("Unauthorized".to_string());
    }
    Ok(())
}

/// Existing profile, or a fresh one inserted with the defaults
fn get_or_create_user(ctx: &ReducerContext, username: &str) -> UserProfile {
    let existing = ctx.db.user_profile().username().find(&username.to_string());
    let (profile, created) = progress::existing_or_new(existing, username, ctx.timestamp);
    if !created {
        return profile;
    }

    let profile = ctx.db.user_profile().insert(profile);
    log::info!(
        "[USER] created username:{} points:{} rank:{}",
        profile.username, profile.total_points, profile.rank
    );
    profile
}

/// Apply one completion to a learner's profile and publish the result row.
/// Shared by `complete_mission` and the server-side attempt flow.
fn apply_mission_completion(
    ctx: &ReducerContext,
    username: &str,
    mission_id: &str,
    score: u32,
    time_spent_ms: u64,
) -> Result<MissionResult, String> {
    let mission_id = mission_id.trim();
    if !mission_id.is_empty() && MissionId::parse(mission_id).is_none() {
        log::warn!("[MISSION] unknown mission_id:{} user:{}, recording anyway", mission_id, username);
    }

    let mut profile = get_or_create_user(ctx, username);
    let completion = progress::record_completion(&mut profile, mission_id, score, time_spent_ms, ctx.timestamp)
        .map_err(|e| {
            log::warn!("[MISSION] rejected user:{} mission:{} score:{} time_ms:{} reason:{}",
                username, mission_id, score, time_spent_ms, e);
            e.to_string()
        })?;

    let result = MissionResult {
        username: profile.username.clone(),
        mission_id: mission_id.to_string(),
        score: score as u8,
        time_spent_ms,
        points_earned: completion.points_earned,
        total_points: profile.total_points,
        rank: profile.rank.clone(),
        missions: profile.missions.clone(),
        recorded_at: ctx.timestamp,
    };

    log::info!(
        "[MISSION] complete user:{} mission:{} score:{} time_ms:{} earned:{} total:{} rank:{} first:{} best_score:{} best_time:{}",
        username, mission_id, score, time_spent_ms, completion.points_earned,
        profile.total_points, profile.rank, completion.first_completion,
        completion.new_best_score, completion.new_best_time
    );
    if completion.rank_after != completion.rank_before {
        log::info!(
            "[USER] rank up username:{} {} -> {} next_at:{:?}",
            username, completion.rank_before.label(), completion.rank_after.label(),
            completion.rank_after.next_threshold()
        );
    }

    ctx.db.user_profile().username().update(profile);
    if ctx.db.mission_result().username().find(&result.username).is_some() {
        ctx.db.mission_result().username().update(result.clone());
    } else {
        ctx.db.mission_result().insert(result.clone());
    }
    Ok(result)
}
