// Points accrual, mission record upsert and the rank ladder.
//
// Everything here works on plain `UserProfile` values; reducers load the row,
// call into this module and write the row back in the same transaction.

use spacetimedb::Timestamp;
use thiserror::Error;

use crate::missions::find_progress_mut;
use crate::{MissionProgress, UserProfile, MAX_USERNAME_LEN, STARTING_POINTS};

/// Numerator of the speed bonus: `1000 / time_spent_ms`
const SPEED_BONUS_MS: u64 = 1000;

const MAX_MISSION_SCORE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rank {
    Rookie,
    Trainee,
    Defender,
    SecurityExpert,
    CyberMaster,
}

impl Rank {
    /// Thresholds, evaluated highest first
    const LADDER: [(u32, Rank); 4] = [
        (5000, Rank::CyberMaster),
        (3000, Rank::SecurityExpert),
        (1500, Rank::Defender),
        (500, Rank::Trainee),
    ];

    pub fn for_points(total_points: u32) -> Rank {
        Self::LADDER
            .iter()
            .find(|(threshold, _)| total_points >= *threshold)
            .map(|(_, rank)| *rank)
            .unwrap_or(Rank::Rookie)
    }

    pub fn label(self) -> &'static str {
        match self {
            Rank::Rookie => "Rookie",
            Rank::Trainee => "Trainee",
            Rank::Defender => "Defender",
            Rank::SecurityExpert => "Security Expert",
            Rank::CyberMaster => "Cyber Master",
        }
    }

    /// Points needed for the next rank, None at the top
    pub fn next_threshold(self) -> Option<u32> {
        Self::LADDER
            .iter()
            .rev()
            .find(|(_, rank)| *rank > self)
            .map(|(threshold, _)| *threshold)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgressError {
    #[error("username cannot be empty")]
    EmptyUsername,
    #[error("username is {len} characters, the limit is {max}")]
    UsernameTooLong { len: usize, max: usize },
    #[error("mission id cannot be empty")]
    EmptyMissionId,
    #[error("score {score} is outside 0..=100")]
    ScoreOutOfRange { score: u32 },
    #[error("time spent must be at least 1 ms")]
    ZeroTimeSpent,
}

/// What a completion changed, for logging and the result row
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub points_earned: u32,
    pub first_completion: bool,
    pub new_best_score: bool,
    pub new_best_time: bool,
    pub rank_before: Rank,
    pub rank_after: Rank,
}

pub fn normalize_username(raw: &str) -> Result<String, ProgressError> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(ProgressError::EmptyUsername);
    }
    let len = username.chars().count();
    if len > MAX_USERNAME_LEN {
        return Err(ProgressError::UsernameTooLong {
            len,
            max: MAX_USERNAME_LEN,
        });
    }
    Ok(username.to_string())
}

/// `floor(score + 1000 / time_spent_ms)`.
/// A zero duration is rejected instead of producing an unbounded bonus.
pub fn points_earned(score: u8, time_spent_ms: u64) -> Result<u32, ProgressError> {
    if time_spent_ms == 0 {
        return Err(ProgressError::ZeroTimeSpent);
    }
    // Integer division floors, and score is already whole
    let speed_bonus = (SPEED_BONUS_MS / time_spent_ms).min(u32::MAX as u64) as u32;
    Ok((score as u32).saturating_add(speed_bonus))
}

pub fn new_profile(username: String, now: Timestamp) -> UserProfile {
    UserProfile {
        username,
        total_points: STARTING_POINTS,
        rank: Rank::for_points(STARTING_POINTS).label().to_string(),
        missions: Vec::new(),
        achievements: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

/// The stored profile if there is one, otherwise a fresh default.
/// The flag is true when the profile still has to be inserted.
pub fn existing_or_new(existing: Option<UserProfile>, username: &str, now: Timestamp) -> (UserProfile, bool) {
    match existing {
        Some(profile) => (profile, false),
        None => (new_profile(username.to_string(), now), true),
    }
}

/// Back to the starting state, keeping only identity and creation time
pub fn reset_profile(profile: &mut UserProfile, now: Timestamp) {
    profile.total_points = STARTING_POINTS;
    profile.missions.clear();
    profile.achievements.clear();
    profile.updated_at = now;
    sync_rank(profile);
}

/// Re-derive the rank label from total points
pub fn sync_rank(profile: &mut UserProfile) -> Rank {
    let rank = Rank::for_points(profile.total_points);
    profile.rank = rank.label().to_string();
    rank
}

/// Apply one mission completion to a profile.
///
/// Points always accrue, so replaying a mission keeps adding to the total.
/// That is the incentive structure, not a bug. The mission record keeps its
/// best score and fastest time. Inputs are validated before anything is
/// touched, so an error leaves the profile unchanged.
pub fn record_completion(
    profile: &mut UserProfile,
    mission_id: &str,
    score: u32,
    time_spent_ms: u64,
    now: Timestamp,
) -> Result<Completion, ProgressError> {
    let mission_id = mission_id.trim();
    if mission_id.is_empty() {
        return Err(ProgressError::EmptyMissionId);
    }
    if score > MAX_MISSION_SCORE {
        return Err(ProgressError::ScoreOutOfRange { score });
    }
    let score = score as u8;
    let points = points_earned(score, time_spent_ms)?;

    let rank_before = Rank::for_points(profile.total_points);
    profile.total_points = profile.total_points.saturating_add(points);

    let (first_completion, new_best_score, new_best_time) =
        match find_progress_mut(&mut profile.missions, mission_id) {
            Some(progress) => {
                progress.attempts = progress.attempts.saturating_add(1);
                progress.completed = true;
                progress.completed_at = now;

                let better_score = score > progress.score;
                if better_score {
                    progress.score = score;
                }

                let faster = progress.best_time_ms.map_or(true, |best| time_spent_ms < best);
                if faster {
                    progress.best_time_ms = Some(time_spent_ms);
                }
                (false, better_score, faster)
            }
            None => {
                profile.missions.push(MissionProgress {
                    mission_id: mission_id.to_string(),
                    completed: true,
                    score,
                    attempts: 1,
                    best_time_ms: Some(time_spent_ms),
                    completed_at: now,
                });
                (true, true, true)
            }
        };

    let rank_after = sync_rank(profile);
    profile.updated_at = now;

    Ok(Completion {
        points_earned: points,
        first_completion,
        new_best_score,
        new_best_time,
        rank_before,
        rank_after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_micros_since_unix_epoch(1_760_000_000_000_000 + secs * 1_000_000)
    }

    #[test]
    fn test_rank_thresholds() {
        assert_eq!(Rank::for_points(0), Rank::Rookie);
        assert_eq!(Rank::for_points(450), Rank::Rookie);
        assert_eq!(Rank::for_points(499), Rank::Rookie);
        assert_eq!(Rank::for_points(500), Rank::Trainee);
        assert_eq!(Rank::for_points(1499), Rank::Trainee);
        assert_eq!(Rank::for_points(1500), Rank::Defender);
        assert_eq!(Rank::for_points(3000), Rank::SecurityExpert);
        assert_eq!(Rank::for_points(4999), Rank::SecurityExpert);
        assert_eq!(Rank::for_points(5000), Rank::CyberMaster);
        assert_eq!(Rank::for_points(u32::MAX), Rank::CyberMaster);
    }

    #[test]
    fn test_rank_is_monotonic() {
        let mut previous = Rank::for_points(0);
        for points in (0..6000).step_by(7) {
            let rank = Rank::for_points(points);
            assert!(rank >= previous, "rank dropped at {points}");
            previous = rank;
        }
    }

    #[test]
    fn test_rank_labels_and_next_threshold() {
        assert_eq!(Rank::SecurityExpert.label(), "Security Expert");
        assert_eq!(Rank::CyberMaster.label(), "Cyber Master");
        assert_eq!(Rank::Rookie.next_threshold(), Some(500));
        assert_eq!(Rank::Defender.next_threshold(), Some(3000));
        assert_eq!(Rank::CyberMaster.next_threshold(), None);
    }

    #[test]
    fn test_points_earned() {
        assert_eq!(points_earned(80, 4000), Ok(80));
        assert_eq!(points_earned(80, 1000), Ok(81));
        assert_eq!(points_earned(50, 1), Ok(1050));
        assert_eq!(points_earned(0, 120_000), Ok(0));
        assert_eq!(points_earned(80, 0), Err(ProgressError::ZeroTimeSpent));
    }

    #[test]
    fn test_new_profile_defaults() {
        let profile = new_profile("alice".to_string(), at(0));
        assert_eq!(profile.total_points, 450);
        assert_eq!(profile.rank, "Rookie");
        assert!(profile.missions.is_empty());
        assert!(profile.achievements.is_empty());
    }

    #[test]
    fn test_get_or_create_twice_returns_the_same_record() {
        let (first, created) = existing_or_new(None, "alice", at(0));
        assert!(created);
        assert_eq!(first, new_profile("alice".to_string(), at(0)));

        let (second, created) = existing_or_new(Some(first.clone()), "alice", at(30));
        assert!(!created);
        assert_eq!(second, first);
        assert_eq!(second.updated_at, at(0));
    }

    #[test]
    fn test_bob_first_completion() {
        let mut bob = new_profile("bob".to_string(), at(0));
        let completion = record_completion(&mut bob, "email-urgency", 80, 4000, at(10)).unwrap();

        assert_eq!(completion.points_earned, 80);
        assert!(completion.first_completion);
        assert_eq!(completion.rank_before, Rank::Rookie);
        assert_eq!(completion.rank_after, Rank::Trainee);
        assert_eq!(bob.total_points, 530);
        assert_eq!(bob.rank, "Trainee");

        let mission = &bob.missions[0];
        assert_eq!(mission.mission_id, "email-urgency");
        assert!(mission.completed);
        assert_eq!(mission.score, 80);
        assert_eq!(mission.attempts, 1);
        assert_eq!(mission.best_time_ms, Some(4000));
        assert_eq!(mission.completed_at, at(10));
    }

    #[test]
    fn test_best_score_and_time_never_regress() {
        let mut profile = new_profile("carol".to_string(), at(0));
        record_completion(&mut profile, "insider-threat", 60, 5000, at(1)).unwrap();
        let second = record_completion(&mut profile, "insider-threat", 40, 8000, at(2)).unwrap();

        assert!(!second.new_best_score);
        assert!(!second.new_best_time);
        let mission = &profile.missions[0];
        assert_eq!(mission.score, 60);
        assert_eq!(mission.best_time_ms, Some(5000));
        assert_eq!(mission.attempts, 2);
        assert_eq!(mission.completed_at, at(2));

        let third = record_completion(&mut profile, "insider-threat", 90, 3000, at(3)).unwrap();
        assert!(third.new_best_score);
        assert!(third.new_best_time);
        assert_eq!(profile.missions[0].score, 90);
        assert_eq!(profile.missions[0].best_time_ms, Some(3000));
        assert_eq!(profile.missions.len(), 1);
    }

    #[test]
    fn test_equal_score_is_not_an_improvement() {
        let mut profile = new_profile("dave".to_string(), at(0));
        record_completion(&mut profile, "data-security", 70, 9000, at(1)).unwrap();
        let again = record_completion(&mut profile, "data-security", 70, 9000, at(2)).unwrap();
        assert!(!again.new_best_score);
        assert!(!again.new_best_time);
    }

    #[test]
    fn test_missing_best_time_is_filled() {
        let mut profile = new_profile("erin".to_string(), at(0));
        profile.missions.push(MissionProgress {
            mission_id: "bec-security".to_string(),
            completed: true,
            score: 50,
            attempts: 3,
            best_time_ms: None,
            completed_at: at(0),
        });
        let completion = record_completion(&mut profile, "bec-security", 30, 60_000, at(1)).unwrap();
        assert!(completion.new_best_time);
        assert_eq!(profile.missions[0].best_time_ms, Some(60_000));
        assert_eq!(profile.missions[0].attempts, 4);
    }

    #[test]
    fn test_repeated_attempts_keep_accruing_points() {
        let mut profile = new_profile("frank".to_string(), at(0));
        for attempt in 1..=5u32 {
            record_completion(&mut profile, "email-urgency", 100, 60_000, at(attempt as i64)).unwrap();
            assert_eq!(profile.missions[0].attempts, attempt);
        }
        assert_eq!(profile.total_points, 450 + 5 * 100);
        assert_eq!(profile.rank, "Trainee");
    }

    #[test]
    fn test_invalid_input_leaves_profile_untouched() {
        let mut profile = new_profile("gina".to_string(), at(0));
        let before = profile.clone();

        assert_eq!(
            record_completion(&mut profile, "email-urgency", 80, 0, at(1)),
            Err(ProgressError::ZeroTimeSpent)
        );
        assert_eq!(
            record_completion(&mut profile, "email-urgency", 101, 4000, at(1)),
            Err(ProgressError::ScoreOutOfRange { score: 101 })
        );
        assert_eq!(
            record_completion(&mut profile, "  ", 80, 4000, at(1)),
            Err(ProgressError::EmptyMissionId)
        );
        assert_eq!(profile, before);
    }

    #[test]
    fn test_unknown_mission_ids_are_still_recorded() {
        let mut profile = new_profile("hank".to_string(), at(0));
        record_completion(&mut profile, "legacy-mission", 55, 20_000, at(1)).unwrap();
        assert_eq!(profile.missions[0].mission_id, "legacy-mission");
    }

    #[test]
    fn test_reset_profile() {
        let mut profile = new_profile("ivy".to_string(), at(0));
        record_completion(&mut profile, "email-urgency", 100, 1, at(1)).unwrap();
        profile.achievements.push("first-blood".to_string());
        assert_eq!(profile.rank, "Defender");

        reset_profile(&mut profile, at(5));
        assert_eq!(profile.total_points, 450);
        assert_eq!(profile.rank, "Rookie");
        assert!(profile.missions.is_empty());
        assert!(profile.achievements.is_empty());
        assert_eq!(profile.created_at, at(0));
        assert_eq!(profile.updated_at, at(5));
    }

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username("  testuser "), Ok("testuser".to_string()));
        assert_eq!(normalize_username(""), Err(ProgressError::EmptyUsername));
        assert_eq!(normalize_username("   "), Err(ProgressError::EmptyUsername));
        let long = "x".repeat(MAX_USERNAME_LEN + 1);
        assert_eq!(
            normalize_username(&long),
            Err(ProgressError::UsernameTooLong {
                len: MAX_USERNAME_LEN + 1,
                max: MAX_USERNAME_LEN
            })
        );
    }
}
