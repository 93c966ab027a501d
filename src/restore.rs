// Bulk restore reducer for disaster recovery
// Accepts the JSON array exported from the admin panel (REST user shape)

use chrono::DateTime;
use serde_json::Value;
use spacetimedb::{reducer, ReducerContext, Table, Timestamp};

use crate::progress::{self, Rank};
use crate::{require_authorized, user_profile, MissionProgress, UserProfile};

/// Parse a timestamp as either an RFC 3339 string ("2025-01-15T10:30:00Z")
/// or the SDK JSON format: {"__timestamp_micros_since_unix_epoch__": "123456"}
fn parse_timestamp_json(val: &Value) -> Result<Timestamp, String> {
    if let Some(text) = val.as_str() {
        let parsed = DateTime::parse_from_rfc3339(text)
            .map_err(|e| format!("Invalid RFC 3339 timestamp '{}': {}", text, e))?;
        return Ok(Timestamp::from_micros_since_unix_epoch(parsed.timestamp_micros()));
    }

    let micros_str = val
        .get("__timestamp_micros_since_unix_epoch__")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid timestamp field")?;

    let micros: i64 = micros_str
        .parse()
        .map_err(|e| format!("Invalid timestamp micros: {}", e))?;

    Ok(Timestamp::from_micros_since_unix_epoch(micros))
}

/// Parse one embedded mission record
fn parse_mission(val: &Value, user: usize, i: usize) -> Result<MissionProgress, String> {
    let score = val
        .get("score")
        .and_then(|v| v.as_u64())
        .ok_or(format!("User {} mission {}: missing score", user, i))?;
    if score > 100 {
        return Err(format!("User {} mission {}: score {} is over 100", user, i, score));
    }

    Ok(MissionProgress {
        mission_id: val
            .get("missionId")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or(format!("User {} mission {}: missing missionId", user, i))?
            .trim()
            .to_string(),
        completed: val.get("completed").and_then(|v| v.as_bool()).unwrap_or(true),
        score: score as u8,
        attempts: val
            .get("attempts")
            .and_then(|v| v.as_u64())
            .ok_or(format!("User {} mission {}: missing attempts", user, i))?
            .min(u32::MAX as u64) as u32,
        // Older exports may lack a best time
        best_time_ms: val.get("bestTime").and_then(|v| v.as_u64()),
        completed_at: parse_timestamp_json(
            val.get("completedAt")
                .ok_or(format!("User {} mission {}: missing completedAt", user, i))?,
        )
        .map_err(|e| format!("User {} mission {}: {}", user, i, e))?,
    })
}

/// Parse a full export into profiles ready to insert.
/// Any malformed entry fails the whole batch. Supplied ranks are ignored and
/// re-derived from totalPoints.
pub fn parse_user_records(json_data: &str, now: Timestamp) -> Result<Vec<UserProfile>, String> {
    let data: Value = serde_json::from_str(json_data).map_err(|e| format!("Invalid JSON: {}", e))?;

    let users = data.as_array().ok_or("Expected JSON array of users")?;

    let mut profiles: Vec<UserProfile> = Vec::with_capacity(users.len());
    for (i, u) in users.iter().enumerate() {
        let raw_name = u
            .get("username")
            .and_then(|v| v.as_str())
            .ok_or(format!("User {}: missing username", i))?;
        let username = progress::normalize_username(raw_name).map_err(|e| format!("User {}: {}", i, e))?;
        if profiles.iter().any(|p| p.username == username) {
            return Err(format!("User {}: duplicate username {}", i, username));
        }

        let missions_json = u
            .get("missions")
            .and_then(|v| v.as_array())
            .ok_or(format!("User {}: missing or invalid missions", i))?;
        let missions: Vec<MissionProgress> = missions_json
            .iter()
            .enumerate()
            .map(|(m, mission)| parse_mission(mission, i, m))
            .collect::<Result<Vec<_>, _>>()?;
        for (m, mission) in missions.iter().enumerate() {
            if missions[..m].iter().any(|earlier| earlier.mission_id == mission.mission_id) {
                return Err(format!("User {} mission {}: duplicate missionId {}", i, m, mission.mission_id));
            }
        }

        let achievements: Vec<String> = match u.get("achievements") {
            None | Some(Value::Null) => Vec::new(),
            Some(v) => v
                .as_array()
                .ok_or(format!("User {}: achievements must be an array", i))?
                .iter()
                .map(|a| a.as_str().map(|s| s.to_string()))
                .collect::<Option<Vec<_>>>()
                .ok_or(format!("User {}: achievements must be strings", i))?,
        };

        let total_points = u
            .get("totalPoints")
            .and_then(|v| v.as_u64())
            .ok_or(format!("User {}: missing totalPoints", i))?
            .min(u32::MAX as u64) as u32;

        let created_at = match u.get("createdAt") {
            Some(v) => parse_timestamp_json(v).map_err(|e| format!("User {}: {}", i, e))?,
            None => now,
        };

        let mut profile = UserProfile {
            username,
            total_points,
            rank: String::new(),
            missions,
            achievements,
            created_at,
            updated_at: now,
        };
        progress::sync_rank(&mut profile);
        profiles.push(profile);
    }

    Ok(profiles)
}

/// Bulk restore user_profile table from JSON array, replacing existing users
/// Protected by authorization check - only authorized workers can call this
#[reducer]
pub fn bulk_restore_users(ctx: &ReducerContext, json_data: String) -> Result<(), String> {
    require_authorized(ctx, "bulk_restore_users")?;

    let profiles = parse_user_records(&json_data, ctx.timestamp).map_err(|e| {
        log::warn!("[RESTORE] rejected batch: {}", e);
        e
    })?;

    let mut replaced = 0;
    let mut top_rank = Rank::Rookie;
    for profile in &profiles {
        top_rank = top_rank.max(Rank::for_points(profile.total_points));
        if ctx.db.user_profile().username().find(&profile.username).is_some() {
            ctx.db.user_profile().username().delete(&profile.username);
            replaced += 1;
        }
    }
    let count = profiles.len();
    for profile in profiles {
        ctx.db.user_profile().insert(profile);
    }

    log::info!(
        "[RESTORE] restored {} user records ({} replaced) top_rank:{}",
        count, replaced, top_rank.label()
    );
    Ok(())
}
