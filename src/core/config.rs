#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "serde")]
use crate::error::ConfigError;

/// Perception (diffing, detection, change classification) settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PerceptionConfig {
    /// Chebyshev radius around a pointer coordinate that counts as "near".
    pub pointer_radius: usize,
    /// Shape of the all-background grid used when a diff cannot be reconciled.
    pub default_rows: usize,
    pub default_cols: usize,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            pointer_radius: 3,
            default_rows: 64,
            default_cols: 64,
        }
    }
}

/// One of the alternative gates a hypothesis can pass to become a rule.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PromotionPath {
    pub min_confidence: f32,
    pub min_evidence: u32,
}

/// Confidence dynamics of hypotheses and rules.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RuleConfig {
    pub initial_hypothesis_confidence: f32,
    pub hypothesis_support_delta: f32,
    pub hypothesis_contradiction_delta: f32,
    /// Hypotheses falling below this confidence are dropped. Rules never are.
    pub hypothesis_discard_below: f32,
    pub max_hypotheses: usize,

    /// Support increments for rules with confidence in
    /// `[0, 0.5)`, `[0.5, 0.7)`, `[0.7, 0.9)` and `[0.9, 1]`.
    pub rule_tier_increments: [f32; 4],
    /// Confirmations this close to the previous one earn `reinforcement_bonus`.
    pub reinforcement_window_turns: u64,
    pub reinforcement_bonus: f32,
    pub contradiction_penalty: f32,

    /// Checked in order; passing any one promotes the hypothesis.
    pub promotion_paths: Vec<PromotionPath>,

    pub consolidation_window_turns: u64,
    pub consolidation_boost: f32,
    /// A score increase only counts as a level completion when at least this
    /// fraction of recent observations supported something.
    pub consolidation_min_success_density: f32,
    pub success_density_window: usize,
    pub consolidation_hypothesis_min_confidence: f32,
    pub consolidation_hypothesis_min_evidence: u32,

    pub decay_grace_turns: u64,
    /// Per-turn decay for rules with confidence `>= 0.8`, `>= 0.5` and below.
    pub decay_rate_high: f32,
    pub decay_rate_mid: f32,
    pub decay_rate_low: f32,
    pub level_proven_decay_factor: f32,
    pub max_decay_per_turn: f32,
    pub decay_floor: f32,
    pub level_proven_floor: f32,

    pub cross_validation_interval: u64,
    pub cross_validation_penalty: f32,

    pub evidence_log_len: usize,
    /// Effects shorter than this (in characters) never spawn catch-all hypotheses.
    pub min_effect_len: usize,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            initial_hypothesis_confidence: 0.3,
            hypothesis_support_delta: 0.1,
            hypothesis_contradiction_delta: 0.1,
            hypothesis_discard_below: 0.05,
            max_hypotheses: 64,

            rule_tier_increments: [0.10, 0.07, 0.04, 0.02],
            reinforcement_window_turns: 3,
            reinforcement_bonus: 0.03,
            contradiction_penalty: 0.08,

            promotion_paths: vec![
                PromotionPath {
                    min_confidence: 0.7,
                    min_evidence: 3,
                },
                PromotionPath {
                    min_confidence: 0.5,
                    min_evidence: 5,
                },
                PromotionPath {
                    min_confidence: 0.4,
                    min_evidence: 8,
                },
            ],

            consolidation_window_turns: 5,
            consolidation_boost: 0.2,
            consolidation_min_success_density: 0.2,
            success_density_window: 10,
            consolidation_hypothesis_min_confidence: 0.5,
            consolidation_hypothesis_min_evidence: 2,

            decay_grace_turns: 10,
            decay_rate_high: 0.01,
            decay_rate_mid: 0.02,
            decay_rate_low: 0.03,
            level_proven_decay_factor: 0.5,
            max_decay_per_turn: 0.05,
            decay_floor: 0.2,
            level_proven_floor: 0.5,

            cross_validation_interval: 5,
            cross_validation_penalty: 0.05,

            evidence_log_len: 10,
            min_effect_len: 12,
        }
    }
}

/// Base deltas applied for one progress type before damping.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AffectDeltas {
    pub confidence: f32,
    pub frustration: f32,
    pub patience: f32,
    /// Always non-negative: curiosity only ever decays.
    pub curiosity_decay: f32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AffectConfig {
    /// Consecutive turns the ideal mode must agree before a switch commits.
    pub stability_threshold: u32,
    pub history_len: usize,
    pub stability_window: usize,
    pub momentum_amplify: f32,
    pub momentum_dampen: f32,

    pub major_progress: AffectDeltas,
    pub minor_progress: AffectDeltas,
    pub valid_action: AffectDeltas,
    pub no_effect: AffectDeltas,

    pub frustrated_threshold: f32,
    pub stagnation_threshold: u32,
    pub optimization_confidence: f32,
    pub optimization_streak: u32,
    pub testing_confidence: f32,
    pub pattern_seeking_curiosity: f32,

    pub initial_confidence: f32,
    pub initial_frustration: f32,
    pub initial_curiosity: f32,
    pub initial_patience: f32,
}

impl Default for AffectConfig {
    fn default() -> Self {
        Self {
            stability_threshold: 3,
            history_len: 10,
            stability_window: 5,
            momentum_amplify: 1.2,
            momentum_dampen: 0.7,

            major_progress: AffectDeltas {
                confidence: 0.15,
                frustration: -0.25,
                patience: 0.10,
                curiosity_decay: 0.01,
            },
            minor_progress: AffectDeltas {
                confidence: 0.08,
                frustration: -0.10,
                patience: 0.05,
                curiosity_decay: 0.02,
            },
            valid_action: AffectDeltas {
                confidence: 0.01,
                frustration: 0.02,
                patience: -0.02,
                curiosity_decay: 0.03,
            },
            no_effect: AffectDeltas {
                confidence: -0.05,
                frustration: 0.12,
                patience: -0.08,
                curiosity_decay: 0.05,
            },

            frustrated_threshold: 0.7,
            stagnation_threshold: 6,
            optimization_confidence: 0.75,
            optimization_streak: 3,
            testing_confidence: 0.5,
            pattern_seeking_curiosity: 0.4,

            initial_confidence: 0.5,
            initial_frustration: 0.0,
            initial_curiosity: 1.0,
            initial_patience: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MemoryConfig {
    pub capacity: usize,
    pub keywords_per_record: usize,
    /// Minimum Jaccard similarity for joining an existing cluster.
    pub cluster_similarity: f32,
    pub cluster_keyword_limit: usize,

    pub contextual_weight: f32,
    pub temporal_weight: f32,
    pub cluster_weight: f32,
    pub time_scale_secs: f64,
    pub turn_scale: f64,

    pub top_n: usize,
    pub min_relevance: f32,
    /// Stricter threshold used for failure warnings.
    pub failure_threshold: f32,

    pub maintenance_interval_secs: f64,
    pub min_keyword_count: u32,
    pub keyword_stale_turns: u64,

    pub age_penalty_per_turn: f32,
    pub age_penalty_per_hour: f32,
    pub usage_bonus: f32,
    pub success_bonus: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 200,
            keywords_per_record: 8,
            cluster_similarity: 0.3,
            cluster_keyword_limit: 12,

            contextual_weight: 0.5,
            temporal_weight: 0.3,
            cluster_weight: 0.2,
            time_scale_secs: 1800.0,
            turn_scale: 50.0,

            top_n: 3,
            min_relevance: 0.15,
            failure_threshold: 0.35,

            maintenance_interval_secs: 300.0,
            min_keyword_count: 2,
            keyword_stale_turns: 50,

            age_penalty_per_turn: 0.01,
            age_penalty_per_hour: 0.1,
            usage_bonus: 0.3,
            success_bonus: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct InterpretationConfig {
    pub enabled: bool,
    /// Confidence reported when the collaborator fails and the local fallback is used.
    pub fallback_confidence: f32,
    pub system_prompt: String,
}

impl Default for InterpretationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fallback_confidence: 0.3,
            system_prompt: "You interpret changes between two puzzle frames. Group pixels into \
                            coherent objects and describe how they moved or transformed."
                .to_string(),
        }
    }
}

/// Top-level engine configuration.
///
/// Every numeric threshold used by the engine lives here; defaults are the
/// tuned values.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    pub perception: PerceptionConfig,
    pub rules: RuleConfig,
    pub affect: AffectConfig,
    pub memory: MemoryConfig,
    pub interpretation: InterpretationConfig,
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON config; missing fields take defaults.
    #[cfg(feature = "serde")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: EngineConfig = serde_json::from_str(s)?;
        cfg.validate().map_err(ConfigError::Invalid)?;
        Ok(cfg)
    }

    /// Apply `GRIDMIND_*` environment overrides.
    ///
    /// - `GRIDMIND_MEMORY_CAPACITY=200`
    /// - `GRIDMIND_STABILITY_THRESHOLD=3`
    /// - `GRIDMIND_POINTER_RADIUS=3`
    /// - `GRIDMIND_INTERPRETER=off|on`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(n) = env_parse::<usize>("GRIDMIND_MEMORY_CAPACITY") {
            self.memory.capacity = n.max(1);
        }
        if let Some(n) = env_parse::<u32>("GRIDMIND_STABILITY_THRESHOLD") {
            self.affect.stability_threshold = n.max(1);
        }
        if let Some(n) = env_parse::<usize>("GRIDMIND_POINTER_RADIUS") {
            self.perception.pointer_radius = n;
        }
        if let Ok(v) = std::env::var("GRIDMIND_INTERPRETER") {
            let vv = v.trim().to_ascii_lowercase();
            self.interpretation.enabled = !(vv == "off" || vv == "0" || vv == "false");
        }
        self
    }

    /// Validate the configuration, returning an error message if invalid.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.perception.default_rows == 0 || self.perception.default_cols == 0 {
            return Err("default grid shape must be non-empty");
        }

        let r = &self.rules;
        if r.promotion_paths.is_empty() {
            return Err("at least one promotion path is required");
        }
        if !unit(r.initial_hypothesis_confidence) {
            return Err("initial_hypothesis_confidence must be in [0, 1]");
        }
        if r.rule_tier_increments.iter().any(|v| !unit(*v)) {
            return Err("rule_tier_increments must be in [0, 1]");
        }
        let deltas = [
            r.hypothesis_support_delta,
            r.hypothesis_contradiction_delta,
            r.hypothesis_discard_below,
            r.reinforcement_bonus,
            r.contradiction_penalty,
            r.consolidation_boost,
            r.decay_rate_high,
            r.decay_rate_mid,
            r.decay_rate_low,
            r.level_proven_decay_factor,
            r.max_decay_per_turn,
            r.cross_validation_penalty,
        ];
        if deltas.iter().any(|v| !unit(*v)) {
            return Err("confidence deltas, penalties and decay rates must be in [0, 1]");
        }
        if r.promotion_paths.iter().any(|p| !unit(p.min_confidence)) {
            return Err("promotion thresholds must be in [0, 1]");
        }
        if !unit(r.decay_floor) || !unit(r.level_proven_floor) {
            return Err("decay floors must be in [0, 1]");
        }
        if r.level_proven_floor < r.decay_floor {
            return Err("level_proven_floor must be >= decay_floor");
        }
        if r.success_density_window == 0 {
            return Err("success_density_window must be > 0");
        }

        let a = &self.affect;
        if a.stability_threshold == 0 {
            return Err("stability_threshold must be > 0");
        }
        if a.stability_window == 0 || a.history_len < a.stability_window {
            return Err("history_len must be >= stability_window > 0");
        }
        for d in [
            &a.major_progress,
            &a.minor_progress,
            &a.valid_action,
            &a.no_effect,
        ] {
            if d.curiosity_decay < 0.0 {
                return Err("curiosity_decay must be non-negative");
            }
        }

        let m = &self.memory;
        if m.capacity == 0 {
            return Err("memory capacity must be > 0");
        }
        if !unit(m.cluster_similarity) {
            return Err("cluster_similarity must be in [0, 1]");
        }
        if m.time_scale_secs <= 0.0 || m.turn_scale <= 0.0 {
            return Err("memory time scales must be positive");
        }

        if !unit(self.interpretation.fallback_confidence) {
            return Err("fallback_confidence must be in [0, 1]");
        }
        Ok(())
    }
}

fn unit(v: f32) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse::<T>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_inverted_floors() {
        let mut cfg = EngineConfig::default();
        cfg.rules.decay_floor = 0.6;
        cfg.rules.level_proven_floor = 0.4;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_negative_boosts_and_penalties() {
        let mut cfg = EngineConfig::default();
        cfg.rules.consolidation_boost = -0.9;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.rules.contradiction_penalty = -0.1;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.rules.decay_rate_low = f32::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_stability_threshold() {
        let mut cfg = EngineConfig::default();
        cfg.affect.stability_threshold = 0;
        assert!(cfg.validate().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = EngineConfig::from_json_str(r#"{"memory": {"capacity": 17}}"#).unwrap();
        assert_eq!(cfg.memory.capacity, 17);
        assert_eq!(cfg.memory.top_n, MemoryConfig::default().top_n);
        assert_eq!(cfg.rules, RuleConfig::default());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn invalid_json_config_is_rejected() {
        let err = EngineConfig::from_json_str(r#"{"memory": {"capacity": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
