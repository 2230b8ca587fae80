use crate::lane::LaneId;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Manoeuvre the operator intends to make through the junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    TurnLeft,
    GoStraight,
    TurnRight,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl Action {
    pub const ALL: [Action; 3] = [Action::TurnLeft, Action::GoStraight, Action::TurnRight];

    pub fn label(self) -> &'static str {
        match self {
            Action::TurnLeft => "Turn Left",
            Action::GoStraight => "Go Straight",
            Action::TurnRight => "Turn Right",
        }
    }

    pub fn lanes(self) -> &'static [LaneId] {
        match self {
            Action::TurnLeft => &[1],
            Action::GoStraight => &[2, 3],
            Action::TurnRight => &[4],
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Action {
    type Err = UnknownAction;

    /// Accepts only the exact labels, e.g. "Go Straight".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.label() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Lanes recommended for the selected action; empty when nothing or an unknown label is selected.
pub fn recommend(action: Option<&str>) -> BTreeSet<LaneId> {
    action
        .and_then(|label| label.parse::<Action>().ok())
        .map(recommend_action)
        .unwrap_or_default()
}

pub fn recommend_action(action: Action) -> BTreeSet<LaneId> {
    action.lanes().iter().copied().collect()
}
