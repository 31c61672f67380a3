use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A user's stance on a quote. `None` is never stored; requesting it clears the vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum VoteValue {
    Down,
    #[default]
    None,
    Up,
}

impl VoteValue {
    pub fn as_i32(self) -> i32 {
        match self {
            VoteValue::Down => -1,
            VoteValue::None => 0,
            VoteValue::Up => 1,
        }
    }
}

impl TryFrom<i32> for VoteValue {
    type Error = AppError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(VoteValue::Down),
            0 => Ok(VoteValue::None),
            1 => Ok(VoteValue::Up),
            other => Err(AppError::Validation(format!(
                "Vote value must be -1, 0 or 1 (got {other})"
            ))),
        }
    }
}

impl From<VoteValue> for i32 {
    fn from(value: VoteValue) -> Self {
        value.as_i32()
    }
}

impl std::fmt::Display for VoteValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

/// Change applied to a quote's `(upvotes, downvotes)` by one vote transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterDelta {
    pub upvotes: i32,
    pub downvotes: i32,
}

impl CounterDelta {
    /// `Δup = [requested = +1] - [previous = +1]`, `Δdown = [requested = -1] - [previous = -1]`.
    pub fn between(previous: VoteValue, requested: VoteValue) -> Self {
        let up = |v: VoteValue| i32::from(v == VoteValue::Up);
        let down = |v: VoteValue| i32::from(v == VoteValue::Down);

        Self {
            upvotes: up(requested) - up(previous),
            downvotes: down(requested) - down(previous),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.upvotes == 0 && self.downvotes == 0
    }
}

/// The counters a caller sees after a vote commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    pub upvotes: i32,
    pub downvotes: i32,
    pub user_vote: VoteValue,
}
