use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest allowed join window and voting window.
pub const MAX_WINDOW_DAYS: i64 = 365;

/// Lifecycle stage of a challenge, derived from its two deadlines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChallengePhase {
    /// Users may join, leave and upload results.
    Joining,
    /// Uploads are closed; votes are accepted.
    Voting,
    /// Voting is over; the challenge waits to be resolved and archived.
    Finished,
}

impl ChallengePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joining => "joining",
            Self::Voting => "voting",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for ChallengePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of a challenge at `now`.
pub fn phase_at(
    end_date: DateTime<Utc>,
    vote_period_end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ChallengePhase {
    if now < end_date {
        ChallengePhase::Joining
    } else if now < vote_period_end {
        ChallengePhase::Voting
    } else {
        ChallengePhase::Finished
    }
}

/// Why a proposed schedule was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("end_date must be in the future")]
    EndInPast,
    #[error("vote_period_end must be after end_date")]
    VoteBeforeEnd,
    #[error("end_date must be within {MAX_WINDOW_DAYS} days")]
    JoinWindowTooLong,
    #[error("voting period must be at most {MAX_WINDOW_DAYS} days")]
    VoteWindowTooLong,
}

/// Check a challenge schedule against `now`.
pub fn validate_schedule(
    end_date: DateTime<Utc>,
    vote_period_end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), ScheduleError> {
    if end_date <= now {
        return Err(ScheduleError::EndInPast);
    }
    if vote_period_end <= end_date {
        return Err(ScheduleError::VoteBeforeEnd);
    }
    let max = Duration::days(MAX_WINDOW_DAYS);
    if end_date - now > max {
        return Err(ScheduleError::JoinWindowTooLong);
    }
    if vote_period_end - end_date > max {
        return Err(ScheduleError::VoteWindowTooLong);
    }
    Ok(())
}
