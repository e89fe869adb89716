//! Hypothesis and rule learning.
//!
//! Every observed `(action, effect)` pair is evidence. Effects the current
//! rule set does not explain spawn hypotheses; hypotheses that gather enough
//! support are promoted to rules. Rules are never deleted: they lose
//! confidence through contradiction, cross-validation and slow decay, and
//! gain a permanent "level-proven" floor when they were active right before
//! a level was completed.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::action::Action;
use crate::config::RuleConfig;
use crate::keywords::tokenize;
use crate::support::{EffectClassifier, KeywordClassifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RuleCategory {
    Movement,
    Interaction,
    StateChange,
    WinCondition,
    Constraint,
    /// Catch-all for effects no other category explains.
    General,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 6] = [
        RuleCategory::Movement,
        RuleCategory::Interaction,
        RuleCategory::StateChange,
        RuleCategory::WinCondition,
        RuleCategory::Constraint,
        RuleCategory::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RuleCategory::Movement => "movement",
            RuleCategory::Interaction => "interaction",
            RuleCategory::StateChange => "state_change",
            RuleCategory::WinCondition => "win_condition",
            RuleCategory::Constraint => "constraint",
            RuleCategory::General => "general",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        RuleCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
    }

    fn describe(self, action: Action, effect: &str) -> String {
        match self {
            RuleCategory::Movement => format!("{action} moves objects"),
            RuleCategory::Interaction => format!("{action} can interact with objects"),
            RuleCategory::StateChange => format!("{action} changes object state"),
            RuleCategory::WinCondition => format!("{action} can complete the level"),
            RuleCategory::Constraint => {
                format!("{action} cannot change the grid; movement is blocked")
            }
            RuleCategory::General => {
                let short: String = effect.chars().take(60).collect();
                format!("{action} causes: {short}")
            }
        }
    }

    fn test_directive(self, action: Action) -> String {
        match self {
            RuleCategory::Movement => {
                format!("repeat {action} and check that objects shift the same way")
            }
            RuleCategory::Interaction => {
                format!("use {action} next to a different object and watch for appearances")
            }
            RuleCategory::StateChange => {
                format!("use {action} again and check whether the change toggles back")
            }
            RuleCategory::WinCondition => {
                format!("reproduce the situation before {action} and try it again")
            }
            RuleCategory::Constraint => {
                format!("try {action} from another position to see if it stays blocked")
            }
            RuleCategory::General => format!("repeat {action} and compare the effect"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Evidence {
    pub turn: u64,
    pub effect: String,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hypothesis {
    pub id: u32,
    pub category: RuleCategory,
    pub action: Action,
    pub description: String,
    pub confidence: f32,
    pub evidence: u32,
    pub contradictions: u32,
    pub created_turn: u64,
    pub last_turn: u64,
    /// What to try next to confirm or refute it.
    pub test: String,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rule {
    pub id: u32,
    pub category: RuleCategory,
    pub action: Action,
    pub description: String,
    pub confidence: f32,
    /// Never decreases.
    pub evidence: u32,
    pub trials: u32,
    pub successes: u32,
    pub created_turn: u64,
    pub last_confirmed_turn: Option<u64>,
    pub supporting: VecDeque<Evidence>,
    pub contradicting: VecDeque<Evidence>,
    pub level_proven: bool,
}

impl Rule {
    pub fn success_rate(&self) -> f32 {
        if self.trials == 0 {
            0.0
        } else {
            self.successes as f32 / self.trials as f32
        }
    }

    fn from_hypothesis(h: Hypothesis, turn: u64) -> Self {
        Self {
            id: h.id,
            category: h.category,
            action: h.action,
            description: h.description,
            confidence: h.confidence.clamp(0.0, 1.0),
            evidence: h.evidence,
            trials: h.evidence + h.contradictions,
            successes: h.evidence,
            created_turn: turn,
            last_confirmed_turn: Some(turn),
            supporting: VecDeque::new(),
            contradicting: VecDeque::new(),
            level_proven: false,
        }
    }
}

/// What a single observation did to the stores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObservationOutcome {
    pub confirmed: Vec<u32>,
    pub contradicted: Vec<u32>,
    pub supported_hypotheses: Vec<u32>,
    pub new_hypotheses: Vec<u32>,
    pub promoted: Vec<u32>,
    pub discarded: usize,
    pub conflicts: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CompletionSignal {
    /// The game reported the level as complete.
    Explicit,
    /// Only the score went up.
    ScoreIncrease,
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConsolidationOutcome {
    pub consolidated: bool,
    pub success_density: f32,
    pub boosted: Vec<u32>,
    pub promoted: Vec<u32>,
}

/// Read-only summary of what the engine believes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RuleSnapshot {
    pub rules: Vec<Rule>,
    pub hypotheses: Vec<Hypothesis>,
    /// Best first.
    pub reliable_actions: Vec<(Action, f32)>,
    pub recommended_tests: Vec<String>,
    pub objective: String,
    pub objective_confidence: f32,
    pub insights: Vec<String>,
    /// Highest priority first.
    pub recommendations: Vec<String>,
}

impl RuleSnapshot {
    pub fn reasoning_summary(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(
            s,
            "Objective: {} (confidence {:.2})",
            self.objective, self.objective_confidence
        );
        if self.rules.is_empty() {
            let _ = writeln!(s, "Rules: none confirmed yet");
        } else {
            let _ = writeln!(s, "Rules:");
            for r in &self.rules {
                let proven = if r.level_proven { " [level-proven]" } else { "" };
                let _ = writeln!(
                    s,
                    "  - {} ({:.2}, {} evidence){proven}",
                    r.description, r.confidence, r.evidence
                );
            }
        }
        if !self.hypotheses.is_empty() {
            let _ = writeln!(s, "Hypotheses:");
            for h in &self.hypotheses {
                let _ = writeln!(s, "  - {} ({:.2}): {}", h.description, h.confidence, h.test);
            }
        }
        if !self.reliable_actions.is_empty() {
            let list: Vec<String> = self
                .reliable_actions
                .iter()
                .map(|(a, score)| format!("{a} {score:.2}"))
                .collect();
            let _ = writeln!(s, "Reliable actions: {}", list.join(", "));
        }
        for i in &self.insights {
            let _ = writeln!(s, "Insight: {i}");
        }
        for (n, r) in self.recommendations.iter().enumerate() {
            let _ = writeln!(s, "Recommendation {}: {r}", n + 1);
        }
        s
    }
}

const POLARITY: [(&str, &str); 5] = [
    ("can", "cannot"),
    ("increase", "decrease"),
    ("opens", "closes"),
    ("appears", "disappears"),
    ("moves", "blocked"),
];

pub struct RuleEngine {
    cfg: RuleConfig,
    classifier: Box<dyn EffectClassifier>,
    rules: BTreeMap<u32, Rule>,
    hypotheses: BTreeMap<u32, Hypothesis>,
    next_id: u32,
    observations: u64,
    recent_success: VecDeque<bool>,
    last_decay_turn: Option<u64>,
}

impl RuleEngine {
    pub fn new(cfg: RuleConfig) -> Self {
        Self::with_classifier(cfg, Box::new(KeywordClassifier::default()))
    }

    pub fn with_classifier(cfg: RuleConfig, classifier: Box<dyn EffectClassifier>) -> Self {
        Self {
            cfg,
            classifier,
            rules: BTreeMap::new(),
            hypotheses: BTreeMap::new(),
            next_id: 1,
            observations: 0,
            recent_success: VecDeque::new(),
            last_decay_turn: None,
        }
    }

    pub fn config(&self) -> &RuleConfig {
        &self.cfg
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    pub fn hypotheses(&self) -> impl Iterator<Item = &Hypothesis> {
        self.hypotheses.values()
    }

    pub fn rule(&self, id: u32) -> Option<&Rule> {
        self.rules.get(&id)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn hypothesis_count(&self) -> usize {
        self.hypotheses.len()
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }

    /// Fraction of recent observations that showed a productive effect.
    pub fn success_density(&self) -> f32 {
        if self.recent_success.is_empty() {
            return 0.0;
        }
        let hits = self.recent_success.iter().filter(|&&b| b).count();
        hits as f32 / self.recent_success.len() as f32
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn tier_increment(&self, confidence: f32) -> f32 {
        let inc = &self.cfg.rule_tier_increments;
        if confidence < 0.5 {
            inc[0]
        } else if confidence < 0.7 {
            inc[1]
        } else if confidence < 0.9 {
            inc[2]
        } else {
            inc[3]
        }
    }

    fn has_rule(&self, category: RuleCategory, action: Action) -> bool {
        self.rules
            .values()
            .any(|r| r.category == category && r.action == action)
    }

    fn has_hypothesis(&self, category: RuleCategory, action: Action) -> bool {
        self.hypotheses
            .values()
            .any(|h| h.category == category && h.action == action)
    }

    /// Learn from one `(action, effect)` observation.
    pub fn observe(&mut self, turn: u64, action: Action, effect: &str) -> ObservationOutcome {
        let mut out = ObservationOutcome::default();
        let categories = self.classifier.categorize(effect);
        let log_len = self.cfg.evidence_log_len;

        // 1. Test confirmed rules for this action.
        let rule_ids: Vec<u32> = self
            .rules
            .values()
            .filter(|r| r.action == action)
            .map(|r| r.id)
            .collect();
        for id in rule_ids {
            let Some(category) = self.rules.get(&id).map(|r| r.category) else {
                continue;
            };
            let supported = self.classifier.supports(category, effect);
            let inc = self
                .rules
                .get(&id)
                .map(|r| self.tier_increment(r.confidence))
                .unwrap_or(0.0);
            let Some(rule) = self.rules.get_mut(&id) else {
                continue;
            };
            rule.trials += 1;
            let entry = Evidence {
                turn,
                effect: effect.to_string(),
            };
            if supported {
                let window = self.cfg.reinforcement_window_turns;
                let bonus = match rule.last_confirmed_turn {
                    Some(last) if turn.saturating_sub(last) <= window => {
                        self.cfg.reinforcement_bonus
                    }
                    _ => 0.0,
                };
                rule.evidence += 1;
                rule.successes += 1;
                rule.confidence = (rule.confidence + inc + bonus).clamp(0.0, 1.0);
                rule.last_confirmed_turn = Some(turn);
                push_capped(&mut rule.supporting, entry, log_len);
                out.confirmed.push(id);
            } else {
                rule.confidence =
                    (rule.confidence - self.cfg.contradiction_penalty).clamp(0.0, 1.0);
                push_capped(&mut rule.contradicting, entry, log_len);
                out.contradicted.push(id);
            }
        }

        // 2. Update hypotheses for this action.
        let mut discard = Vec::new();
        for h in self.hypotheses.values_mut().filter(|h| h.action == action) {
            if self.classifier.supports(h.category, effect) {
                h.confidence = (h.confidence + self.cfg.hypothesis_support_delta).clamp(0.0, 1.0);
                h.evidence += 1;
                out.supported_hypotheses.push(h.id);
            } else {
                h.confidence =
                    (h.confidence - self.cfg.hypothesis_contradiction_delta).clamp(0.0, 1.0);
                h.contradictions += 1;
            }
            h.last_turn = turn;
            if h.confidence < self.cfg.hypothesis_discard_below {
                discard.push(h.id);
            }
        }
        for id in discard {
            self.hypotheses.remove(&id);
            out.discarded += 1;
        }

        // 3. New hypotheses for uncovered (category, action) pairs.
        let mut fresh: Vec<RuleCategory> = categories.clone();
        if fresh.is_empty() && effect.trim().chars().count() >= self.cfg.min_effect_len {
            fresh.push(RuleCategory::General);
        }
        for category in fresh {
            if self.has_rule(category, action) || self.has_hypothesis(category, action) {
                continue;
            }
            let id = self.alloc_id();
            let h = Hypothesis {
                id,
                category,
                action,
                description: category.describe(action, effect),
                confidence: self.cfg.initial_hypothesis_confidence,
                evidence: 1,
                contradictions: 0,
                created_turn: turn,
                last_turn: turn,
                test: category.test_directive(action),
            };
            debug!(id, category = category.as_str(), action = action.as_str(), "new hypothesis");
            self.hypotheses.insert(id, h);
            out.new_hypotheses.push(id);
        }
        out.discarded += self.enforce_hypothesis_limit();

        // 4. Promotion.
        out.promoted = self.promote_ready(turn);

        let productive = categories.iter().any(|c| *c != RuleCategory::Constraint);
        push_capped(
            &mut self.recent_success,
            productive,
            self.cfg.success_density_window,
        );

        self.observations += 1;
        if self.cfg.cross_validation_interval > 0
            && self.observations % self.cfg.cross_validation_interval == 0
        {
            out.conflicts = self.cross_validate();
        }
        out
    }

    fn enforce_hypothesis_limit(&mut self) -> usize {
        let mut dropped = 0;
        while self.hypotheses.len() > self.cfg.max_hypotheses {
            let weakest = self
                .hypotheses
                .values()
                .min_by(|a, b| a.confidence.total_cmp(&b.confidence))
                .map(|h| h.id);
            match weakest {
                Some(id) => {
                    self.hypotheses.remove(&id);
                    dropped += 1;
                }
                None => break,
            }
        }
        dropped
    }

    fn meets_promotion(&self, h: &Hypothesis) -> bool {
        self.cfg
            .promotion_paths
            .iter()
            .any(|p| h.confidence >= p.min_confidence && h.evidence >= p.min_evidence)
    }

    fn promote_ready(&mut self, turn: u64) -> Vec<u32> {
        let ready: Vec<u32> = self
            .hypotheses
            .values()
            .filter(|h| self.meets_promotion(h))
            .map(|h| h.id)
            .collect();
        ready
            .into_iter()
            .filter_map(|id| self.promote(id, turn, false))
            .collect()
    }

    /// Move a hypothesis into the rule store; merges into an existing rule
    /// for the same `(category, action)`. Returns the rule id.
    fn promote(&mut self, id: u32, turn: u64, level_proven: bool) -> Option<u32> {
        let h = self.hypotheses.remove(&id)?;
        if let Some(existing) = self
            .rules
            .values_mut()
            .find(|r| r.category == h.category && r.action == h.action)
        {
            existing.evidence += h.evidence;
            existing.confidence = existing.confidence.max(h.confidence);
            existing.level_proven |= level_proven;
            return Some(existing.id);
        }
        let mut rule = Rule::from_hypothesis(h, turn);
        rule.level_proven = level_proven;
        info!(
            id = rule.id,
            action = rule.action.as_str(),
            confidence = rule.confidence,
            evidence = rule.evidence,
            "promoted hypothesis to rule: {}",
            rule.description
        );
        let rid = rule.id;
        self.rules.insert(rid, rule);
        Some(rid)
    }

    /// Consolidate after a level completion.
    pub fn level_completed(&mut self, turn: u64, signal: CompletionSignal) -> ConsolidationOutcome {
        let density = self.success_density();
        let mut out = ConsolidationOutcome {
            success_density: density,
            ..Default::default()
        };
        if signal == CompletionSignal::ScoreIncrease
            && density < self.cfg.consolidation_min_success_density
        {
            debug!(density, "score increase ignored: too few productive observations");
            return out;
        }
        out.consolidated = true;

        for r in self.rules.values_mut() {
            let recent = r
                .last_confirmed_turn
                .map(|t| turn.saturating_sub(t) <= self.cfg.consolidation_window_turns)
                .unwrap_or(false);
            if recent {
                r.confidence = (r.confidence + self.cfg.consolidation_boost).clamp(0.0, 1.0);
                r.level_proven = true;
                out.boosted.push(r.id);
            }
        }

        let eligible: Vec<u32> = self
            .hypotheses
            .values()
            .filter(|h| {
                h.confidence >= self.cfg.consolidation_hypothesis_min_confidence
                    && h.evidence >= self.cfg.consolidation_hypothesis_min_evidence
            })
            .map(|h| h.id)
            .collect();
        for id in eligible {
            if let Some(rid) = self.promote(id, turn, true) {
                out.promoted.push(rid);
            }
        }

        info!(
            turn,
            ?signal,
            boosted = out.boosted.len(),
            promoted = out.promoted.len(),
            "level consolidated"
        );
        out
    }

    /// Apply one turn of decay. Calling twice for the same turn is a no-op.
    pub fn decay(&mut self, turn: u64) {
        if self.last_decay_turn == Some(turn) {
            return;
        }
        self.last_decay_turn = Some(turn);

        for r in self.rules.values_mut() {
            let since = r.last_confirmed_turn.unwrap_or(r.created_turn);
            if turn.saturating_sub(since) <= self.cfg.decay_grace_turns {
                continue;
            }
            let mut rate = if r.confidence >= 0.8 {
                self.cfg.decay_rate_high
            } else if r.confidence >= 0.5 {
                self.cfg.decay_rate_mid
            } else {
                self.cfg.decay_rate_low
            };
            if r.level_proven {
                rate *= self.cfg.level_proven_decay_factor;
            }
            let rate = rate.min(self.cfg.max_decay_per_turn);
            let floor = if r.level_proven {
                self.cfg.level_proven_floor
            } else {
                self.cfg.decay_floor
            };
            if r.confidence > floor {
                r.confidence = (r.confidence - rate).clamp(floor, 1.0);
            }
        }
    }

    /// Penalize the weaker member of every same-action rule pair whose
    /// descriptions carry opposite polarity words. Returns the conflict count.
    pub fn cross_validate(&mut self) -> usize {
        let words: Vec<(u32, Action, f32, Vec<String>)> = self
            .rules
            .values()
            .map(|r| (r.id, r.action, r.confidence, tokenize(&r.description)))
            .collect();

        let mut penalize = Vec::new();
        for (i, a) in words.iter().enumerate() {
            for b in &words[i + 1..] {
                if a.1 != b.1 || !opposed(&a.3, &b.3) {
                    continue;
                }
                // Ties penalize the newer rule.
                let loser = if a.2 < b.2 { a.0 } else { b.0 };
                penalize.push(loser);
            }
        }

        for id in &penalize {
            if let Some(r) = self.rules.get_mut(id) {
                r.confidence = (r.confidence - self.cfg.cross_validation_penalty).clamp(0.0, 1.0);
            }
        }
        if !penalize.is_empty() {
            debug!(conflicts = penalize.len(), "cross-validation penalized rules");
        }
        penalize.len()
    }

    fn reliable_actions(&self) -> Vec<(Action, f32)> {
        let mut per: BTreeMap<Action, (f32, u32)> = BTreeMap::new();
        for r in self
            .rules
            .values()
            .filter(|r| r.category != RuleCategory::Constraint)
        {
            let e = per.entry(r.action).or_insert((0.0, 0));
            e.0 += r.confidence * r.success_rate().max(0.5);
            e.1 += 1;
        }
        let mut out: Vec<(Action, f32)> = per
            .into_iter()
            .map(|(a, (sum, n))| (a, sum / n.max(1) as f32))
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1));
        out.truncate(3);
        out
    }

    fn objective(&self) -> (String, f32) {
        let best = |cat: RuleCategory| {
            self.rules
                .values()
                .filter(|r| r.category == cat)
                .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        };
        if let Some(r) = best(RuleCategory::WinCondition) {
            return (format!("complete the level using {}", r.action), r.confidence);
        }
        let proven: Vec<&Rule> = self.rules.values().filter(|r| r.level_proven).collect();
        if !proven.is_empty() {
            let mut actions: Vec<&str> = proven.iter().map(|r| r.action.as_str()).collect();
            actions.dedup();
            let avg = proven.iter().map(|r| r.confidence).sum::<f32>() / proven.len() as f32;
            return (
                format!("repeat the level-proven strategy ({})", actions.join(", ")),
                avg,
            );
        }
        if let Some(r) = best(RuleCategory::Movement) {
            return (
                "navigate objects toward a goal".to_string(),
                r.confidence * 0.5,
            );
        }
        if let Some(r) = best(RuleCategory::Interaction) {
            return (
                "interact with objects to trigger changes".to_string(),
                r.confidence * 0.4,
            );
        }
        ("explore to discover the objective".to_string(), 0.1)
    }

    pub fn snapshot(&self) -> RuleSnapshot {
        let rules: Vec<Rule> = self.rules.values().cloned().collect();
        let mut hypotheses: Vec<Hypothesis> = self.hypotheses.values().cloned().collect();
        hypotheses.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let reliable_actions = self.reliable_actions();
        let recommended_tests: Vec<String> =
            hypotheses.iter().take(3).map(|h| h.test.clone()).collect();
        let (objective, objective_confidence) = self.objective();

        let mut insights = Vec::new();
        insights.push(format!(
            "{} rules and {} hypotheses after {} observations",
            rules.len(),
            hypotheses.len(),
            self.observations
        ));
        let proven = rules.iter().filter(|r| r.level_proven).count();
        if proven > 0 {
            insights.push(format!("{proven} rules are level-proven"));
        }
        if let Some(r) = rules
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        {
            insights.push(format!(
                "strongest rule: {} ({:.2})",
                r.description, r.confidence
            ));
        }

        let blocked: Vec<Action> = rules
            .iter()
            .filter(|r| r.category == RuleCategory::Constraint && r.confidence >= 0.5)
            .map(|r| r.action)
            .collect();
        for a in &blocked {
            insights.push(format!("{a} appears ineffective"));
        }

        let mut recommendations = Vec::new();
        if let Some((a, _)) = reliable_actions.first() {
            recommendations.push(format!("prefer {a}: most reliable confirmed effect"));
        }
        if !blocked.is_empty() {
            let names: Vec<&str> = blocked.iter().map(|a| a.as_str()).collect();
            recommendations.push(format!(
                "avoid {} unless the situation changed",
                names.join(", ")
            ));
        }
        if let Some(t) = recommended_tests.first() {
            recommendations.push(format!("test: {t}"));
        }
        let untried: Vec<&str> = Action::PLAYABLE
            .into_iter()
            .filter(|a| {
                !rules.iter().any(|r| r.action == *a) && !hypotheses.iter().any(|h| h.action == *a)
            })
            .map(|a| a.as_str())
            .collect();
        if !untried.is_empty() {
            recommendations.push(format!("explore untried actions: {}", untried.join(", ")));
        }

        RuleSnapshot {
            rules,
            hypotheses,
            reliable_actions,
            recommended_tests,
            objective,
            objective_confidence: objective_confidence.clamp(0.0, 1.0),
            insights,
            recommendations,
        }
    }
}

fn opposed(a: &[String], b: &[String]) -> bool {
    let has = |set: &[String], w: &str| set.iter().any(|x| x == w);
    POLARITY
        .iter()
        .any(|(p, q)| (has(a, p) && has(b, q)) || (has(a, q) && has(b, p)))
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
    use crate::config::EngineConfig;

    const MOVED: &str = "4 red pixels moved 1.0 downward";
    const NOTHING: &str = "no effect: grid unchanged";

    fn engine() -> RuleEngine {
        RuleEngine::new(RuleConfig::default())
    }

    #[test]
    fn repeated_support_promotes_exactly_once() {
        let mut e = engine();
        for t in 1..=4 {
            let out = e.observe(t, Action::Down, MOVED);
            assert!(out.promoted.is_empty(), "promoted too early at turn {t}");
        }
        assert_eq!(e.hypothesis_count(), 1);

        let out = e.observe(5, Action::Down, MOVED);
        assert_eq!(out.promoted.len(), 1);
        assert_eq!(e.hypothesis_count(), 0);
        assert_eq!(e.rule_count(), 1);

        let r = e.rules().next().unwrap();
        assert_eq!(r.category, RuleCategory::Movement);
        assert_eq!(r.evidence, 5);

        // Further support updates the rule, never re-creates a hypothesis.
        e.observe(6, Action::Down, MOVED);
        assert_eq!(e.hypothesis_count(), 0);
        assert_eq!(e.rule_count(), 1);
    }

    #[test]
    fn same_pair_is_never_duplicated() {
        let mut e = engine();
        e.observe(1, Action::Up, MOVED);
        e.observe(2, Action::Up, MOVED);
        assert_eq!(e.hypothesis_count(), 1);
        e.observe(3, Action::Left, MOVED);
        assert_eq!(e.hypothesis_count(), 2);
    }

    #[test]
    fn confirmation_tiers_and_reinforcement() {
        let mut e = engine();
        for t in 1..=5 {
            e.observe(t, Action::Down, MOVED);
        }
        let before = e.rules().next().unwrap().confidence;
        let out = e.observe(6, Action::Down, MOVED);
        assert_eq!(out.confirmed.len(), 1);
        let after = e.rules().next().unwrap().confidence;
        // Mid tier (0.7..0.9) increment plus the quick-reconfirmation bonus.
        let expected = (before + 0.04 + 0.03).min(1.0);
        assert!((after - expected).abs() < 1e-5, "{before} -> {after}");
    }

    #[test]
    fn contradiction_lowers_confidence_but_keeps_evidence() {
        let mut e = engine();
        for t in 1..=5 {
            e.observe(t, Action::Down, MOVED);
        }
        let r0 = e.rules().next().unwrap().clone();
        let out = e.observe(6, Action::Down, NOTHING);
        assert_eq!(out.contradicted, vec![r0.id]);
        let r1 = e.rule(r0.id).unwrap();
        assert!((r1.confidence - (r0.confidence - 0.08)).abs() < 1e-5);
        assert_eq!(r1.evidence, r0.evidence);
        assert_eq!(r1.contradicting.len(), 1);
    }

    #[test]
    fn repeatedly_contradicted_hypothesis_is_discarded() {
        let mut e = engine();
        e.observe(1, Action::Up, MOVED);
        assert_eq!(e.hypothesis_count(), 1);
        e.observe(2, Action::Up, NOTHING);
        e.observe(3, Action::Up, NOTHING);
        e.observe(4, Action::Up, NOTHING);
        assert!(
            !e.hypotheses().any(|h| h.category == RuleCategory::Movement),
            "movement hypothesis should be gone"
        );
        assert!(e.hypotheses().any(|h| h.category == RuleCategory::Constraint));
    }

    #[test]
    fn catch_all_only_for_non_trivial_effects() {
        let mut e = engine();
        let out = e.observe(1, Action::Space, "odd flicker along the border");
        assert_eq!(out.new_hypotheses.len(), 1);
        assert_eq!(
            e.hypotheses().next().unwrap().category,
            RuleCategory::General
        );
        let out = e.observe(2, Action::Click, "blip");
        assert!(out.new_hypotheses.is_empty());
    }

    #[test]
    fn decay_respects_grace_cap_and_floors() {
        let mut e = engine();
        for t in 1..=5 {
            e.observe(t, Action::Down, MOVED);
        }
        let id = e.rules().next().unwrap().id;
        let start = e.rule(id).unwrap().confidence;

        e.decay(10);
        assert_eq!(e.rule(id).unwrap().confidence, start, "inside grace period");

        e.decay(20);
        let once = e.rule(id).unwrap().confidence;
        assert!(once < start && start - once <= 0.05 + 1e-6);
        e.decay(20);
        assert_eq!(e.rule(id).unwrap().confidence, once, "same turn twice");

        for t in 21..400 {
            e.decay(t);
        }
        let r = e.rule(id).unwrap();
        assert!((r.confidence - 0.2).abs() < 1e-6);
        assert_eq!(e.rule_count(), 1, "rules are never deleted");
    }

    #[test]
    fn level_proven_rules_keep_a_higher_floor() {
        let mut e = engine();
        for t in 1..=5 {
            e.observe(t, Action::Down, MOVED);
        }
        let out = e.level_completed(6, CompletionSignal::Explicit);
        assert!(out.consolidated);
        assert_eq!(out.boosted.len(), 1);
        let id = out.boosted[0];
        assert!(e.rule(id).unwrap().level_proven);

        for t in 20..1000 {
            e.decay(t);
        }
        assert!((e.rule(id).unwrap().confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn score_increase_needs_productive_history() {
        let mut e = engine();
        for t in 1..=10 {
            e.observe(t, Action::Up, NOTHING);
        }
        let out = e.level_completed(11, CompletionSignal::ScoreIncrease);
        assert!(!out.consolidated);

        for t in 12..=14 {
            e.observe(t, Action::Down, MOVED);
        }
        let out = e.level_completed(15, CompletionSignal::ScoreIncrease);
        assert!(out.consolidated, "density {}", out.success_density);
    }

    #[test]
    fn consolidation_promotes_eligible_hypotheses() {
        let mut e = engine();
        e.observe(1, Action::Right, MOVED);
        e.observe(2, Action::Right, MOVED);
        e.observe(3, Action::Right, MOVED);
        let out = e.level_completed(4, CompletionSignal::Explicit);
        assert_eq!(out.promoted.len(), 1);
        let r = e.rule(out.promoted[0]).unwrap();
        assert!(r.level_proven);
        assert_eq!(e.hypothesis_count(), 0);
    }

    #[test]
    fn cross_validation_penalizes_weaker_contradictory_rule() {
        let mut e = engine();
        for t in 1..=5 {
            e.observe(t, Action::Up, MOVED);
        }
        for t in 6..=13 {
            e.observe(t, Action::Up, NOTHING);
        }
        let movement = e
            .rules()
            .find(|r| r.category == RuleCategory::Movement)
            .unwrap()
            .clone();
        let constraint = e
            .rules()
            .find(|r| r.category == RuleCategory::Constraint)
            .unwrap()
            .clone();

        assert_eq!(e.cross_validate(), 1);
        let weaker = if movement.confidence < constraint.confidence {
            &movement
        } else {
            &constraint
        };
        let now = e.rule(weaker.id).unwrap().confidence;
        assert!((now - (weaker.confidence - 0.05).max(0.0)).abs() < 1e-5);
    }

    #[test]
    fn snapshot_reports_objective_and_recommendations() {
        let mut e = engine();
        for t in 1..=5 {
            e.observe(t, Action::Down, MOVED);
        }
        let snap = e.snapshot();
        assert_eq!(snap.reliable_actions[0].0, Action::Down);
        assert!(snap.objective.contains("navigate"));
        assert!(snap.recommendations[0].contains("down"));
        assert!(snap
            .recommendations
            .iter()
            .any(|r| r.contains("untried")));
        let text = snap.reasoning_summary();
        assert!(text.contains("down moves objects"), "{text}");
    }

    #[test]
    fn confidences_stay_in_unit_interval() {
        let mut e = engine();
        for t in 1..200 {
            let effect = if t % 3 == 0 { NOTHING } else { MOVED };
            e.observe(t, Action::Down, effect);
            e.decay(t);
            if t % 17 == 0 {
                e.level_completed(t, CompletionSignal::Explicit);
            }
        }
        for r in e.rules() {
            assert!((0.0..=1.0).contains(&r.confidence));
        }
        for h in e.hypotheses() {
            assert!((0.0..=1.0).contains(&h.confidence));
        }
    }

    #[test]
    fn extreme_valid_config_keeps_confidence_in_unit_range() {
        let cfg = RuleConfig {
            hypothesis_support_delta: 1.0,
            hypothesis_contradiction_delta: 1.0,
            rule_tier_increments: [1.0; 4],
            reinforcement_bonus: 1.0,
            contradiction_penalty: 1.0,
            consolidation_boost: 1.0,
            consolidation_min_success_density: 0.0,
            decay_grace_turns: 0,
            decay_rate_high: 1.0,
            decay_rate_mid: 1.0,
            decay_rate_low: 1.0,
            max_decay_per_turn: 1.0,
            cross_validation_penalty: 1.0,
            ..RuleConfig::default()
        };
        assert_eq!(
            EngineConfig {
                rules: cfg.clone(),
                ..EngineConfig::default()
            }
            .validate(),
            Ok(())
        );

        let mut e = RuleEngine::new(cfg);
        let in_range = |e: &RuleEngine| {
            e.rules().all(|r| (0.0..=1.0).contains(&r.confidence))
                && e.hypotheses().all(|h| (0.0..=1.0).contains(&h.confidence))
        };
        for t in 1..=6 {
            e.observe(t, Action::Down, MOVED);
            assert!(in_range(&e), "after observe {t}");
        }
        e.level_completed(7, CompletionSignal::Explicit);
        assert!(in_range(&e), "after consolidation");
        for t in 8..=12 {
            e.observe(t, Action::Down, NOTHING);
            e.decay(t + 20);
            assert!(in_range(&e), "after contradiction and decay at {t}");
        }
        e.cross_validate();
        assert!(in_range(&e), "after cross-validation");
    }
}
