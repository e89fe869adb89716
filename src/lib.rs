//! # gridmind
//!
//! Adaptive learning core for an agent that plays grid-based puzzle games.
//!
//! Each turn the engine compares the previous frame with the current one,
//! detects objects and what happened to them, evolves hypotheses about the
//! game's rules, updates a small affective state machine and consults a
//! clustered memory of past precedent. It does not pick the final action;
//! it hands rule, affect and memory summaries to a separate decision step.
//!
//! ## Quick Start
//!
//! ```
//! use gridmind::prelude::*;
//!
//! let mut engine = Orchestrator::new(EngineConfig::default());
//!
//! let mut before = Grid::new(8, 8);
//! before.set(1, 1, 3);
//! let mut after = Grid::new(8, 8);
//! after.set(0, 1, 3);
//!
//! engine.step(&Frame::new(before, 0));
//! let report = engine.step(&Frame::new(after, 0).with_action(Action::Up, None));
//!
//! assert_eq!(report.turn, 2);
//! println!("{}", report.reasoning);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): Serialization for configs, frames, snapshots and reports
//!
//! ## Modules
//!
//! - [`action`]: Game actions and pointer coordinates
//! - [`grid`]: Grids, layered-frame normalization and cell diffs
//! - [`objects`]: Connected-component object detection
//! - [`matcher`]: Cross-frame object matching by signature
//! - [`changes`]: Change classification and effect descriptions
//! - [`rules`]: Hypotheses, confirmed rules and their confidence dynamics
//! - [`affect`]: Emotional scalars and the behavioral mode state machine
//! - [`memory`]: Keyword-clustered associative experience memory
//! - [`collaborator`]: Vision-language boundary with labelled local fallback
//! - [`response`]: Staged parsing of decision replies
//! - [`config`]: Tunable thresholds, JSON loading and env overrides
//! - [`orchestrator`]: The per-turn pipeline
//! - [`observer`]: Read-only observation adapters

#[path = "core/error.rs"]
pub mod error;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/action.rs"]
pub mod action;

#[path = "core/grid.rs"]
pub mod grid;

#[path = "core/objects.rs"]
pub mod objects;

#[path = "core/matcher.rs"]
pub mod matcher;

#[path = "core/changes.rs"]
pub mod changes;

#[path = "core/keywords.rs"]
pub mod keywords;

#[path = "core/support.rs"]
pub mod support;

#[path = "core/rules.rs"]
pub mod rules;

#[path = "core/progress.rs"]
pub mod progress;

#[path = "core/affect.rs"]
pub mod affect;

#[path = "core/memory.rs"]
pub mod memory;

#[path = "core/collaborator.rs"]
pub mod collaborator;

#[path = "core/response.rs"]
pub mod response;

#[path = "core/orchestrator.rs"]
pub mod orchestrator;

pub mod observer;

/// Prelude module for convenient imports.
///
/// ```
/// use gridmind::prelude::*;
/// ```
pub mod prelude {
    pub use crate::action::{Action, ActionInput, Pointer};
    pub use crate::affect::{AffectEngine, AffectSnapshot, Mode};
    pub use crate::changes::{ChangeAnalysis, ChangeClassifier};
    pub use crate::collaborator::{InferenceRequest, InferenceResponse, VisionLanguage};
    pub use crate::config::EngineConfig;
    pub use crate::error::{CollaboratorError, ConfigError, GridError};
    pub use crate::grid::{Color, Grid, GridDiffer};
    pub use crate::memory::AssociativeMemory;
    pub use crate::objects::{DetectedObject, ObjectDetector, Region, ShapeClass};
    pub use crate::orchestrator::{Frame, GameState, Orchestrator, TurnReport};
    pub use crate::progress::ProgressType;
    pub use crate::rules::{RuleCategory, RuleEngine, RuleSnapshot};
    pub use crate::support::{EffectClassifier, KeywordClassifier};
}
