use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Actions the game accepts.
///
/// The numbered form (`ACTION1`..`ACTION6`) is the game's own wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Action {
    Up,
    Down,
    Left,
    Right,
    Space,
    Click,
    Reset,
}

impl Action {
    pub const PLAYABLE: [Action; 6] = [
        Action::Up,
        Action::Down,
        Action::Left,
        Action::Right,
        Action::Space,
        Action::Click,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Up => "up",
            Action::Down => "down",
            Action::Left => "left",
            Action::Right => "right",
            Action::Space => "space",
            Action::Click => "click",
            Action::Reset => "reset",
        }
    }

    pub fn from_action_str(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "up" | "action1" => Some(Action::Up),
            "down" | "action2" => Some(Action::Down),
            "left" | "action3" => Some(Action::Left),
            "right" | "action4" => Some(Action::Right),
            "space" | "action5" => Some(Action::Space),
            "click" | "action6" => Some(Action::Click),
            "reset" => Some(Action::Reset),
            _ => None,
        }
    }

    /// Numbered wire name; `Reset` has none.
    pub fn wire_index(self) -> Option<u8> {
        match self {
            Action::Up => Some(1),
            Action::Down => Some(2),
            Action::Left => Some(3),
            Action::Right => Some(4),
            Action::Space => Some(5),
            Action::Click => Some(6),
            Action::Reset => None,
        }
    }

    /// Unit `(row, col)` step for directional actions.
    pub fn direction(self) -> Option<(i32, i32)> {
        match self {
            Action::Up => Some((-1, 0)),
            Action::Down => Some((1, 0)),
            Action::Left => Some((0, -1)),
            Action::Right => Some((0, 1)),
            _ => None,
        }
    }

    #[inline]
    pub fn is_directional(self) -> bool {
        self.direction().is_some()
    }

    /// Actions that carry a pointer coordinate.
    #[inline]
    pub fn is_point(self) -> bool {
        matches!(self, Action::Click)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pointer coordinate of a point action: `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pointer {
    pub x: usize,
    pub y: usize,
}

impl Pointer {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Chebyshev proximity of a `(row, col)` cell.
    pub fn is_near(&self, row: usize, col: usize, radius: usize) -> bool {
        row.abs_diff(self.y) <= radius && col.abs_diff(self.x) <= radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActionInput {
    pub action: Action,
    #[cfg_attr(feature = "serde", serde(default))]
    pub pointer: Option<Pointer>,
}

impl ActionInput {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            pointer: None,
        }
    }

    pub fn at(action: Action, pointer: Pointer) -> Self {
        Self {
            action,
            pointer: Some(pointer),
        }
    }

    /// Stable text key used for rules and memory (`"click@12,30"` for point actions).
    pub fn key(&self) -> String {
        match self.pointer {
            Some(p) => format!("{}@{},{}", self.action, p.x, p.y),
            None => self.action.as_str().to_string(),
        }
    }
}
