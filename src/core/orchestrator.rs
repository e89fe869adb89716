//! The per-turn pipeline.
//!
//! One [`Orchestrator`] per agent. It owns every store explicitly (no
//! process-wide singletons) and runs a fixed order each turn:
//!
//! 1. level-transition check
//! 2. perception (detect, match, classify)
//! 3. interpretation (collaborator or local fallback)
//! 4. rules (consolidate, observe, decay, cross-validate)
//! 5. progress classification
//! 6. affect update
//! 7. memory query
//! 8. memory write
//!
//! The final action is not chosen here; [`TurnReport::reasoning`] is the
//! input for whatever decides it.

use std::fmt::Write as _;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::action::{Action, ActionInput, Pointer};
use crate::affect::{AffectEngine, AffectSnapshot};
use crate::changes::{ChangeAnalysis, ChangeClassifier};
use crate::collaborator::{interpret, InferenceRequest, Interpretation, VisionLanguage};
use crate::config::EngineConfig;
#[cfg(feature = "serde")]
use crate::config::PerceptionConfig;
use crate::grid::Grid;
#[cfg(feature = "serde")]
use crate::grid::RawFrame;
use crate::memory::AssociativeMemory;
use crate::progress::ProgressType;
use crate::rules::{
    CompletionSignal, ConsolidationOutcome, ObservationOutcome, RuleEngine, RuleSnapshot,
};
use crate::support::EffectClassifier;

/// Objects listed when describing a scene for memory.
const SCENE_OBJECTS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum GameState {
    NotStarted,
    #[default]
    InProgress,
    Won,
    GameOver,
}

impl GameState {
    pub fn as_str(self) -> &'static str {
        match self {
            GameState::NotStarted => "not_started",
            GameState::InProgress => "in_progress",
            GameState::Won => "won",
            GameState::GameOver => "game_over",
        }
    }

    pub fn needs_reset(self) -> bool {
        matches!(self, GameState::NotStarted | GameState::GameOver)
    }
}

/// One observation from the game.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Frame {
    pub grid: Grid,
    pub score: u32,
    pub state: GameState,
    /// The action that produced this frame.
    pub last_action: Option<ActionInput>,
    pub level_complete: bool,
}

impl Frame {
    pub fn new(grid: Grid, score: u32) -> Self {
        Self {
            grid,
            score,
            state: GameState::InProgress,
            last_action: None,
            level_complete: false,
        }
    }

    pub fn with_action(mut self, action: Action, pointer: Option<Pointer>) -> Self {
        self.last_action = Some(ActionInput { action, pointer });
        self
    }

    pub fn with_state(mut self, state: GameState) -> Self {
        self.state = state;
        self
    }

    pub fn with_level_complete(mut self, complete: bool) -> Self {
        self.level_complete = complete;
        self
    }
}

/// Serialized frame as recorded from a game session.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame: RawFrame,
    #[serde(default)]
    pub score: u32,
    #[serde(default)]
    pub state: GameState,
    #[serde(default)]
    pub action: Option<ActionInput>,
    #[serde(default)]
    pub level_complete: bool,
}

#[cfg(feature = "serde")]
impl FrameRecord {
    /// Malformed grids degrade to a background grid; see
    /// [`RawFrame::to_grid_or_default`].
    pub fn to_frame(&self, perception: &PerceptionConfig) -> Frame {
        Frame {
            grid: self.frame.to_grid_or_default(perception),
            score: self.score,
            state: self.state,
            last_action: self.action,
            level_complete: self.level_complete,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TurnReport {
    pub turn: u64,
    pub action: Option<ActionInput>,
    pub state: GameState,
    pub level_transition: bool,
    /// `false` for baseline and reset turns.
    pub learned: bool,
    pub effect: String,
    pub analysis: Option<ChangeAnalysis>,
    pub interpretation: Option<Interpretation>,
    pub observation: Option<ObservationOutcome>,
    pub consolidation: Option<ConsolidationOutcome>,
    pub progress: Option<ProgressType>,
    pub rules: RuleSnapshot,
    pub affect: AffectSnapshot,
    pub precedents: Vec<String>,
    pub warnings: Vec<String>,
    pub recommend_reset: bool,
    pub reasoning: String,
}

pub struct Orchestrator {
    cfg: EngineConfig,
    perception: ChangeClassifier,
    rules: RuleEngine,
    affect: AffectEngine,
    memory: AssociativeMemory,
    collaborator: Option<Box<dyn VisionLanguage>>,
    previous: Option<Frame>,
    turn: u64,
    last_report: Option<TurnReport>,
}

impl Orchestrator {
    pub fn new(cfg: EngineConfig) -> Self {
        Self {
            perception: ChangeClassifier::new(&cfg.perception),
            rules: RuleEngine::new(cfg.rules.clone()),
            affect: AffectEngine::new(cfg.affect.clone()),
            memory: AssociativeMemory::new(cfg.memory.clone()),
            collaborator: None,
            previous: None,
            turn: 0,
            last_report: None,
            cfg,
        }
    }

    pub fn with_collaborator(mut self, collaborator: Box<dyn VisionLanguage>) -> Self {
        self.collaborator = Some(collaborator);
        self
    }

    /// Replace the effect classifier. Resets learned rules.
    pub fn with_effect_classifier(mut self, classifier: Box<dyn EffectClassifier>) -> Self {
        self.rules = RuleEngine::with_classifier(self.cfg.rules.clone(), classifier);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn affect(&self) -> &AffectEngine {
        &self.affect
    }

    pub fn memory(&self) -> &AssociativeMemory {
        &self.memory
    }

    pub fn last_report(&self) -> Option<&TurnReport> {
        self.last_report.as_ref()
    }

    fn scene(&self, grid: &Grid) -> String {
        let mut sorted = self.perception.detector().detect(grid);
        if sorted.is_empty() {
            return "empty grid".to_string();
        }
        sorted.sort_by(|a, b| b.size().cmp(&a.size()).then(a.id.cmp(&b.id)));
        sorted
            .iter()
            .take(SCENE_OBJECTS)
            .map(|o| o.describe())
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Process one frame.
    pub fn step(&mut self, frame: &Frame) -> TurnReport {
        self.turn += 1;
        let turn = self.turn;
        self.memory.advance_turn(turn);

        if frame.state.needs_reset() {
            info!(turn, state = frame.state.as_str(), "game needs reset; baseline cleared");
            self.previous = None;
            let report = self.passive_report(
                frame,
                format!("game state {}: reset required", frame.state.as_str()),
                None,
                true,
            );
            self.last_report = Some(report.clone());
            return report;
        }

        let (previous, input) = match (self.previous.take(), frame.last_action) {
            (Some(prev), Some(input)) => (prev, input),
            (prev, _) => {
                // Baseline turn: look, but do not learn.
                let closed_eyes = Grid::background(frame.grid.rows(), frame.grid.cols());
                let before = prev.as_ref().map(|p| &p.grid).unwrap_or(&closed_eyes);
                let analysis = self.perception.analyze(before, &frame.grid, None);
                let effect = analysis.describe();
                debug!(turn, "baseline frame recorded");
                let report = self.passive_report(frame, effect, Some(analysis), false);
                self.previous = Some(frame.clone());
                self.last_report = Some(report.clone());
                return report;
            }
        };

        // 1. Level transition.
        let level_transition = frame.level_complete
            || frame.state == GameState::Won
            || frame.score > previous.score;

        // 2. Perception.
        let analysis = if level_transition {
            ChangeAnalysis::level_transition(Some(input.action))
        } else {
            self.perception
                .analyze(&previous.grid, &frame.grid, Some(&input))
        };
        let effect = analysis.describe();

        // 3. Interpretation.
        let interpretation = if self.cfg.interpretation.enabled
            && !level_transition
            && analysis.has_changes()
        {
            let request = InferenceRequest::for_change(
                &self.cfg.interpretation.system_prompt,
                &analysis,
                &previous.grid,
                &frame.grid,
            );
            Some(interpret(
                self.collaborator.as_deref_mut(),
                &request,
                &effect,
                self.cfg.interpretation.fallback_confidence,
            ))
        } else {
            None
        };

        // 4. Rules. Consolidation runs first so the success-density gate only
        // sees the turns that led up to the transition.
        let consolidation = level_transition.then(|| {
            let signal = if frame.level_complete || frame.state == GameState::Won {
                CompletionSignal::Explicit
            } else {
                CompletionSignal::ScoreIncrease
            };
            self.rules.level_completed(turn, signal)
        });
        let observation = self.rules.observe(turn, input.action, &effect);
        self.rules.decay(turn);

        // 5-6. Progress and affect.
        let progress = ProgressType::classify(&analysis, level_transition, &observation);
        let affect = self.affect.update(progress);

        // 7. Memory query, before this turn is written.
        let now_scene = self.scene(&frame.grid);
        let precedents: Vec<String> = self
            .memory
            .relevant(&now_scene)
            .iter()
            .map(|p| p.line())
            .collect();
        let warnings: Vec<String> = self
            .memory
            .failure_warnings(&now_scene, None)
            .iter()
            .map(|p| format!("avoid repeating: {}", p.line()))
            .collect();

        // 8. Memory write.
        let before_scene = self.scene(&previous.grid);
        let outcome = match &interpretation {
            Some(i) if !i.is_fallback() => format!("{effect}; {}", i.text),
            _ => effect.clone(),
        };
        self.memory
            .remember(&before_scene, &input.key(), &outcome, progress.is_success());
        self.memory.maintenance();

        let rules = self.rules.snapshot();
        let mut report = TurnReport {
            turn,
            action: Some(input),
            state: frame.state,
            level_transition,
            learned: true,
            effect,
            analysis: Some(analysis),
            interpretation,
            observation: Some(observation),
            consolidation,
            progress: Some(progress),
            rules,
            affect,
            precedents,
            warnings,
            recommend_reset: false,
            reasoning: String::new(),
        };
        report.reasoning = compose_reasoning(&report);

        debug!(
            turn,
            action = input.action.as_str(),
            progress = progress.as_str(),
            mode = report.affect.mode.as_str(),
            "turn processed"
        );

        self.previous = Some(frame.clone());
        self.last_report = Some(report.clone());
        report
    }

    fn passive_report(
        &self,
        frame: &Frame,
        effect: String,
        analysis: Option<ChangeAnalysis>,
        recommend_reset: bool,
    ) -> TurnReport {
        let mut report = TurnReport {
            turn: self.turn,
            action: frame.last_action,
            state: frame.state,
            level_transition: false,
            learned: false,
            effect,
            analysis,
            interpretation: None,
            observation: None,
            consolidation: None,
            progress: None,
            rules: self.rules.snapshot(),
            affect: self.affect.snapshot(),
            precedents: Vec::new(),
            warnings: Vec::new(),
            recommend_reset,
            reasoning: String::new(),
        };
        report.reasoning = compose_reasoning(&report);
        report
    }
}

fn compose_reasoning(r: &TurnReport) -> String {
    let mut s = String::new();
    let action = r
        .action
        .map(|a| a.key())
        .unwrap_or_else(|| "none".to_string());
    let _ = writeln!(s, "Turn {} (action {action}): {}", r.turn, r.effect);
    if r.recommend_reset {
        let _ = writeln!(s, "Recommendation: reset the game");
    }
    if let Some(i) = &r.interpretation {
        let _ = writeln!(s, "Interpretation ({:.2}): {}", i.confidence, i.text);
    }
    if let Some(p) = r.progress {
        let _ = writeln!(s, "Progress: {}", p.as_str());
    }
    let _ = writeln!(s, "Affect: {}", r.affect.summary());
    s.push_str(&r.rules.reasoning_summary());
    for p in &r.precedents {
        let _ = writeln!(s, "Precedent: {p}");
    }
    for w in &r.warnings {
        let _ = writeln!(s, "Warning: {w}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affect::Mode;
    use crate::collaborator::{InferenceResponse, TokenUsage};
    use crate::error::CollaboratorError;

    fn block(r0: usize, c0: usize) -> Grid {
        let mut g = Grid::new(16, 16);
        for r in r0..r0 + 2 {
            for c in c0..c0 + 2 {
                g.set(r, c, 8);
            }
        }
        g
    }

    fn engine() -> Orchestrator {
        let mut cfg = EngineConfig::default();
        cfg.interpretation.enabled = false;
        Orchestrator::new(cfg)
    }

    #[test]
    fn first_frame_is_baseline_only() {
        let mut o = engine();
        let r = o.step(&Frame::new(block(2, 2), 0));
        assert_eq!(r.turn, 1);
        assert!(!r.learned);
        assert!(r.progress.is_none());
        assert_eq!(o.rules().observations(), 0);
        assert!(r.effect.contains("appeared"), "{}", r.effect);
    }

    #[test]
    fn moving_block_teaches_a_movement_rule() {
        let mut o = engine();
        o.step(&Frame::new(block(0, 4), 0));
        let mut last = None;
        for i in 1..=6 {
            let f = Frame::new(block(i * 2, 4), 0).with_action(Action::Down, None);
            last = Some(o.step(&f));
        }
        let r = last.unwrap();
        assert!(r.learned);
        assert_eq!(r.progress, Some(ProgressType::MinorProgress));
        assert!(r
            .rules
            .rules
            .iter()
            .any(|rule| rule.action == Action::Down && rule.description.contains("moves")));
        assert!(r.reasoning.contains("down moves objects"), "{}", r.reasoning);
        assert_eq!(o.memory().len(), 6);
    }

    #[test]
    fn repeated_no_effect_frustrates() {
        let mut o = engine();
        let g = block(4, 4);
        o.step(&Frame::new(g.clone(), 0));
        let mut mode = Mode::Exploring;
        for _ in 0..10 {
            let r = o.step(&Frame::new(g.clone(), 0).with_action(Action::Left, None));
            assert_eq!(r.progress, Some(ProgressType::NoEffect));
            mode = r.affect.mode;
        }
        assert_eq!(mode, Mode::Frustrated);
        let blocked = o
            .rules()
            .rules()
            .any(|r| r.action == Action::Left && r.description.contains("blocked"));
        assert!(blocked);
    }

    #[test]
    fn score_increase_is_a_level_transition() {
        let mut o = engine();
        o.step(&Frame::new(block(0, 0), 0));
        let r = o.step(&Frame::new(Grid::new(16, 16), 1).with_action(Action::Space, None));
        assert!(r.level_transition);
        assert_eq!(r.progress, Some(ProgressType::MajorProgress));
        assert!(r.effect.contains("level"));
    }

    #[test]
    fn score_gate_ignores_the_transition_turn() {
        let mut o = engine();
        let g = block(4, 4);
        o.step(&Frame::new(g.clone(), 0));
        for _ in 0..3 {
            o.step(&Frame::new(g.clone(), 0).with_action(Action::Left, None));
        }
        let r = o.step(&Frame::new(g, 1).with_action(Action::Space, None));
        let c = r.consolidation.expect("transition consolidates or is gated");
        assert_eq!(c.success_density, 0.0);
        assert!(!c.consolidated);
    }

    #[test]
    fn productive_turns_then_score_increase_consolidate() {
        let mut o = engine();
        o.step(&Frame::new(block(0, 4), 0));
        for i in 1..=3 {
            o.step(&Frame::new(block(i * 2, 4), 0).with_action(Action::Down, None));
        }
        let r = o.step(&Frame::new(Grid::new(16, 16), 1).with_action(Action::Space, None));
        assert!(r.consolidation.map(|c| c.consolidated).unwrap_or(false));
    }

    #[test]
    fn game_over_resets_baseline() {
        let mut o = engine();
        o.step(&Frame::new(block(0, 0), 0));
        let r = o.step(
            &Frame::new(block(0, 0), 0)
                .with_action(Action::Up, None)
                .with_state(GameState::GameOver),
        );
        assert!(r.recommend_reset);
        assert!(!r.learned);
        // Next frame is a baseline again even though it carries an action.
        let r = o.step(&Frame::new(block(2, 2), 0).with_action(Action::Reset, None));
        assert!(!r.learned);
    }

    struct Down;

    impl VisionLanguage for Down {
        fn generate(
            &mut self,
            _request: &InferenceRequest,
        ) -> Result<InferenceResponse, CollaboratorError> {
            Err(CollaboratorError::Unavailable("offline".into()))
        }
    }

    #[test]
    fn collaborator_failure_is_contained() {
        let mut o = Orchestrator::new(EngineConfig::default()).with_collaborator(Box::new(Down));
        o.step(&Frame::new(block(0, 0), 0));
        let r = o.step(&Frame::new(block(2, 0), 0).with_action(Action::Down, None));
        let i = r.interpretation.expect("interpretation attempted");
        assert!(i.is_fallback());
        assert_eq!(i.confidence, EngineConfig::default().interpretation.fallback_confidence);
        assert!(r.reasoning.contains("[local fallback]"));
    }

    #[test]
    fn collaborator_text_enters_memory() {
        struct Echo;
        impl VisionLanguage for Echo {
            fn generate(
                &mut self,
                _request: &InferenceRequest,
            ) -> Result<InferenceResponse, CollaboratorError> {
                Ok(InferenceResponse {
                    content: "the red square slid".into(),
                    usage: TokenUsage::default(),
                    latency_ms: 1,
                    model: "echo".into(),
                })
            }
        }
        let mut o = Orchestrator::new(EngineConfig::default()).with_collaborator(Box::new(Echo));
        o.step(&Frame::new(block(0, 0), 0));
        let r = o.step(&Frame::new(block(2, 0), 0).with_action(Action::Down, None));
        assert_eq!(
            r.interpretation.as_ref().map(|i| i.text.as_str()),
            Some("the red square slid")
        );
        assert_eq!(o.memory().len(), 1);
    }
}
