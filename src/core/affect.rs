//! Simulated affect: four scalars and a hysteretic behavioral mode.
//!
//! Each turn's [`ProgressType`] nudges confidence, frustration and patience.
//! Updates are damped when recent readings have been volatile and amplified
//! while they keep pointing the same way. The mode only switches after the
//! same ideal mode has been computed `stability_threshold` turns in a row.

use std::collections::VecDeque;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{AffectConfig, AffectDeltas};
use crate::progress::ProgressType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Mode {
    Exploring,
    PatternSeeking,
    HypothesisTesting,
    Optimization,
    Frustrated,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Exploring => "exploring",
            Mode::PatternSeeking => "pattern_seeking",
            Mode::HypothesisTesting => "hypothesis_testing",
            Mode::Optimization => "optimization",
            Mode::Frustrated => "frustrated",
        }
    }

    /// Preferred number of actions to plan per decision.
    pub fn sequence_length(self) -> usize {
        match self {
            Mode::Exploring => 4,
            Mode::PatternSeeking => 3,
            Mode::HypothesisTesting => 2,
            Mode::Optimization => 5,
            Mode::Frustrated => 1,
        }
    }

    pub fn risk_tolerance(self) -> f32 {
        match self {
            Mode::Exploring => 0.7,
            Mode::PatternSeeking => 0.5,
            Mode::HypothesisTesting => 0.4,
            Mode::Optimization => 0.2,
            Mode::Frustrated => 0.9,
        }
    }

    pub fn bias(self) -> &'static str {
        match self {
            Mode::Exploring => "try untested actions and sample every region of the grid",
            Mode::PatternSeeking => "repeat actions that changed something and look for regularities",
            Mode::HypothesisTesting => "run short targeted tests of the leading hypotheses",
            Mode::Optimization => "exploit confirmed rules with longer action sequences",
            Mode::Frustrated => "break the current pattern: try something radically different or reset",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Trend {
    Increasing,
    Stable,
    Decreasing,
}

/// Point-in-time view handed to the decision layer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AffectSnapshot {
    pub mode: Mode,
    pub confidence: f32,
    pub frustration: f32,
    pub curiosity: f32,
    pub patience: f32,
    pub stability: f32,
    pub sequence_length: usize,
    pub risk_tolerance: f32,
    pub bias: String,
    pub success_rate: f32,
    pub confidence_trend: Trend,
    pub turns_in_mode: u32,
    pub turns_without_progress: u32,
    pub pending_mode: Option<Mode>,
}

impl AffectSnapshot {
    pub fn summary(&self) -> String {
        format!(
            "mode {} (confidence {:.2}, frustration {:.2}, curiosity {:.2}, patience {:.2}); \
             plan {} action(s); {}",
            self.mode,
            self.confidence,
            self.frustration,
            self.curiosity,
            self.patience,
            self.sequence_length,
            self.bias
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct LastDeltas {
    confidence: f32,
    frustration: f32,
    patience: f32,
}

#[derive(Debug, Clone)]
pub struct AffectEngine {
    cfg: AffectConfig,
    mode: Mode,
    confidence: f32,
    frustration: f32,
    curiosity: f32,
    patience: f32,

    turn: u64,
    turns_in_mode: u32,
    turns_without_progress: u32,
    success_streak: u32,
    pending: Option<Mode>,
    pending_count: u32,

    confidence_history: VecDeque<f32>,
    frustration_history: VecDeque<f32>,
    outcomes: VecDeque<ProgressType>,
    last: LastDeltas,
}

impl AffectEngine {
    pub fn new(cfg: AffectConfig) -> Self {
        Self {
            mode: Mode::Exploring,
            confidence: cfg.initial_confidence.clamp(0.0, 1.0),
            frustration: cfg.initial_frustration.clamp(0.0, 1.0),
            curiosity: cfg.initial_curiosity.clamp(0.0, 1.0),
            patience: cfg.initial_patience.clamp(0.0, 1.0),
            turn: 0,
            turns_in_mode: 0,
            turns_without_progress: 0,
            success_streak: 0,
            pending: None,
            pending_count: 0,
            confidence_history: VecDeque::new(),
            frustration_history: VecDeque::new(),
            outcomes: VecDeque::new(),
            last: LastDeltas::default(),
            cfg,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn frustration(&self) -> f32 {
        self.frustration
    }

    pub fn curiosity(&self) -> f32 {
        self.curiosity
    }

    pub fn patience(&self) -> f32 {
        self.patience
    }

    fn deltas(&self, progress: ProgressType) -> AffectDeltas {
        match progress {
            ProgressType::MajorProgress => self.cfg.major_progress,
            ProgressType::MinorProgress => self.cfg.minor_progress,
            ProgressType::ValidAction => self.cfg.valid_action,
            ProgressType::NoEffect => self.cfg.no_effect,
        }
    }

    /// `1 - min(1, (var(frustration) + var(confidence)) / 2)` over the recent
    /// window; neutral 0.5 until three readings exist.
    pub fn stability(&self) -> f32 {
        if self.confidence_history.len() < 3 {
            return 0.5;
        }
        let w = self.cfg.stability_window;
        let vf = variance(tail(&self.frustration_history, w));
        let vc = variance(tail(&self.confidence_history, w));
        1.0 - ((vf + vc) / 2.0).min(1.0)
    }

    pub fn success_rate(&self) -> f32 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let hits = self.outcomes.iter().filter(|p| p.is_success()).count();
        hits as f32 / self.outcomes.len() as f32
    }

    pub fn confidence_trend(&self) -> Trend {
        let h: Vec<f32> = self.confidence_history.iter().copied().collect();
        if h.len() < 2 {
            return Trend::Stable;
        }
        let mid = h.len() / 2;
        let early = h[..mid].iter().sum::<f32>() / mid as f32;
        let late = h[mid..].iter().sum::<f32>() / (h.len() - mid) as f32;
        if late - early > 0.05 {
            Trend::Increasing
        } else if early - late > 0.05 {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }

    fn momentum(&self, delta: f32, previous: f32) -> f32 {
        if delta == 0.0 || previous == 0.0 {
            1.0
        } else if delta.signum() == previous.signum() {
            self.cfg.momentum_amplify
        } else {
            self.cfg.momentum_dampen
        }
    }

    /// Apply one turn's progress and return the resulting snapshot.
    pub fn update(&mut self, progress: ProgressType) -> AffectSnapshot {
        let base = self.deltas(progress);
        let damping = 0.5 + 0.5 * self.stability();

        let dc = base.confidence * damping;
        let dc = dc * self.momentum(dc, self.last.confidence);
        let df = base.frustration * damping;
        let df = df * self.momentum(df, self.last.frustration);
        let dp = base.patience * damping;
        let dp = dp * self.momentum(dp, self.last.patience);

        self.confidence = (self.confidence + dc).clamp(0.0, 1.0);
        self.frustration = (self.frustration + df).clamp(0.0, 1.0);
        self.patience = (self.patience + dp).clamp(0.0, 1.0);
        self.curiosity = (self.curiosity - base.curiosity_decay.max(0.0)).clamp(0.0, 1.0);
        self.last = LastDeltas {
            confidence: dc,
            frustration: df,
            patience: dp,
        };

        self.turn += 1;
        if progress.is_success() {
            self.success_streak += 1;
            self.turns_without_progress = 0;
        } else {
            self.success_streak = 0;
            self.turns_without_progress += 1;
        }

        let cap = self.cfg.history_len;
        push_capped(&mut self.confidence_history, self.confidence, cap);
        push_capped(&mut self.frustration_history, self.frustration, cap);
        push_capped(&mut self.outcomes, progress, cap);

        self.advance_mode();
        self.snapshot()
    }

    fn ideal_mode(&self) -> Mode {
        let any_success = self.outcomes.iter().any(|p| p.is_success());
        if self.frustration >= self.cfg.frustrated_threshold
            || self.turns_without_progress >= self.cfg.stagnation_threshold
        {
            Mode::Frustrated
        } else if self.confidence >= self.cfg.optimization_confidence
            && self.success_streak >= self.cfg.optimization_streak
        {
            Mode::Optimization
        } else if self.confidence >= self.cfg.testing_confidence && any_success {
            Mode::HypothesisTesting
        } else if self.curiosity < self.cfg.pattern_seeking_curiosity && any_success {
            Mode::PatternSeeking
        } else {
            Mode::Exploring
        }
    }

    fn advance_mode(&mut self) {
        let ideal = self.ideal_mode();
        if ideal == self.mode {
            self.pending = None;
            self.pending_count = 0;
            self.turns_in_mode += 1;
            return;
        }

        if self.pending == Some(ideal) {
            self.pending_count += 1;
        } else {
            self.pending = Some(ideal);
            self.pending_count = 1;
        }

        if self.pending_count >= self.cfg.stability_threshold {
            info!(
                from = self.mode.as_str(),
                to = ideal.as_str(),
                turn = self.turn,
                "affect mode switch"
            );
            self.mode = ideal;
            self.pending = None;
            self.pending_count = 0;
            self.turns_in_mode = 0;
        } else {
            self.turns_in_mode += 1;
        }
    }

    pub fn snapshot(&self) -> AffectSnapshot {
        AffectSnapshot {
            mode: self.mode,
            confidence: self.confidence,
            frustration: self.frustration,
            curiosity: self.curiosity,
            patience: self.patience,
            stability: self.stability(),
            sequence_length: self.mode.sequence_length(),
            risk_tolerance: self.mode.risk_tolerance(),
            bias: self.mode.bias().to_string(),
            success_rate: self.success_rate(),
            confidence_trend: self.confidence_trend(),
            turns_in_mode: self.turns_in_mode,
            turns_without_progress: self.turns_without_progress,
            pending_mode: self.pending,
        }
    }
}

fn tail(q: &VecDeque<f32>, n: usize) -> impl Iterator<Item = f32> + '_ {
    q.iter().skip(q.len().saturating_sub(n)).copied()
}

fn variance(values: impl Iterator<Item = f32>) -> f32 {
    let v: Vec<f32> = values.collect();
    if v.is_empty() {
        return 0.0;
    }
    let n = v.len() as f32;
    let mean = v.iter().sum::<f32>() / n;
    v.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / n
}

fn push_capped<T>(q: &mut VecDeque<T>, v: T, cap: usize) {
    q.push_back(v);
    while q.len() > cap {
        q.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> AffectEngine {
        AffectEngine::new(AffectConfig::default())
    }

    #[test]
    fn no_effect_streak_builds_frustration_then_switches() {
        let mut a = engine();
        let mut prev = a.frustration();
        let mut switched_at = None;
        for turn in 1..=10 {
            let snap = a.update(ProgressType::NoEffect);
            if turn <= 5 {
                assert!(
                    snap.frustration > prev,
                    "turn {turn}: {} <= {prev}",
                    snap.frustration
                );
            }
            prev = snap.frustration;
            if snap.mode == Mode::Frustrated && switched_at.is_none() {
                switched_at = Some(turn);
            }
        }
        let t = switched_at.expect("never became frustrated");
        assert!((6..=9).contains(&t), "switched at turn {t}");
        assert_eq!(a.snapshot().sequence_length, 1);
    }

    #[test]
    fn mode_needs_consecutive_agreement() {
        let mut a = engine();
        for _ in 0..5 {
            a.update(ProgressType::NoEffect);
        }
        // Frustration high enough now; the switch is pending, not committed.
        let s = a.update(ProgressType::NoEffect);
        assert_eq!(s.mode, Mode::Exploring);
        assert_eq!(s.pending_mode, Some(Mode::Frustrated));
    }

    #[test]
    fn reverting_ideal_abandons_pending_switch() {
        let mut cfg = AffectConfig::default();
        cfg.initial_confidence = 0.49;
        cfg.minor_progress.confidence = 0.02;
        let mut a = AffectEngine::new(cfg);

        let s = a.update(ProgressType::MinorProgress);
        assert_eq!(s.mode, Mode::Exploring);
        assert_eq!(s.pending_mode, Some(Mode::HypothesisTesting));

        // Confidence dips back under the testing threshold.
        let s = a.update(ProgressType::NoEffect);
        assert_eq!(s.mode, Mode::Exploring);
        assert_eq!(s.pending_mode, None);
    }

    #[test]
    fn success_streak_reaches_optimization() {
        let mut a = engine();
        let mut last = a.snapshot();
        for _ in 0..8 {
            last = a.update(ProgressType::MajorProgress);
        }
        assert_eq!(last.mode, Mode::Optimization);
        assert_eq!(last.sequence_length, 5);
        assert_eq!(last.confidence_trend, Trend::Increasing);
        assert_eq!(last.success_rate, 1.0);
        assert_eq!(last.frustration, 0.0);
    }

    #[test]
    fn curiosity_never_increases() {
        let mut a = engine();
        let mut prev = a.curiosity();
        for p in [
            ProgressType::MajorProgress,
            ProgressType::NoEffect,
            ProgressType::MinorProgress,
            ProgressType::ValidAction,
        ]
        .iter()
        .cycle()
        .take(40)
        {
            a.update(*p);
            assert!(a.curiosity() <= prev);
            prev = a.curiosity();
        }
        assert!((0.0..=1.0).contains(&a.curiosity()));
    }

    #[test]
    fn stability_is_neutral_until_three_readings() {
        let mut a = engine();
        assert_eq!(a.stability(), 0.5);
        a.update(ProgressType::ValidAction);
        a.update(ProgressType::ValidAction);
        assert_eq!(a.stability(), 0.5);
        a.update(ProgressType::ValidAction);
        assert!(a.stability() > 0.5);
    }
}
