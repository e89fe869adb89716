//! Pluggable mapping from effect text to rule categories.
//!
//! The rule engine never inspects effect text itself; it asks an
//! [`EffectClassifier`] which categories an effect belongs to and whether it
//! supports a given category. [`KeywordClassifier`] is the default.

use crate::keywords::tokenize;
use crate::rules::RuleCategory;

pub trait EffectClassifier {
    /// Categories the effect is evidence for, in [`RuleCategory::ALL`] order.
    /// Empty when nothing matched.
    fn categorize(&self, effect: &str) -> Vec<RuleCategory>;

    /// Whether the effect supports a rule of `category`.
    fn supports(&self, category: RuleCategory, effect: &str) -> bool {
        let cats = self.categorize(effect);
        match category {
            RuleCategory::General => {
                !effect.trim().is_empty() && !cats.contains(&RuleCategory::Constraint)
            }
            c => cats.contains(&c),
        }
    }
}

/// Word-list classifier.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    lexicon: Vec<(RuleCategory, Vec<String>)>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        let table: [(RuleCategory, &[&str]); 5] = [
            (
                RuleCategory::Movement,
                &[
                    "moved", "move", "moves", "position", "shifted", "upward", "downward",
                    "leftward", "rightward", "translation", "displaced",
                ],
            ),
            (
                RuleCategory::Interaction,
                &[
                    "appeared", "disappeared", "pointer", "opened", "collected", "activated",
                    "interact", "removed", "picked",
                ],
            ),
            (
                RuleCategory::StateChange,
                &[
                    "changed", "color", "shape", "transformed", "toggled", "recolored",
                    "materialization", "dematerialization",
                ],
            ),
            (
                RuleCategory::WinCondition,
                &["level", "score", "completed", "win", "won", "goal", "transition"],
            ),
            (
                RuleCategory::Constraint,
                &["blocked", "unchanged", "nothing", "wall", "cannot"],
            ),
        ];
        Self {
            lexicon: table
                .into_iter()
                .map(|(c, words)| (c, words.iter().map(|w| w.to_string()).collect()))
                .collect(),
        }
    }
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend a category's word list.
    pub fn with_words(mut self, category: RuleCategory, words: &[&str]) -> Self {
        match self.lexicon.iter_mut().find(|(c, _)| *c == category) {
            Some((_, list)) => list.extend(words.iter().map(|w| w.to_ascii_lowercase())),
            None => self.lexicon.push((
                category,
                words.iter().map(|w| w.to_ascii_lowercase()).collect(),
            )),
        }
        self
    }
}

impl EffectClassifier for KeywordClassifier {
    fn categorize(&self, effect: &str) -> Vec<RuleCategory> {
        let lower = effect.to_ascii_lowercase();
        let words = tokenize(&lower);
        let no_effect = lower.contains("no effect");

        RuleCategory::ALL
            .into_iter()
            .filter(|cat| {
                if *cat == RuleCategory::Constraint && no_effect {
                    return true;
                }
                self.lexicon
                    .iter()
                    .filter(|(c, _)| c == cat)
                    .any(|(_, list)| words.iter().any(|w| list.contains(w)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_text_is_movement() {
        let k = KeywordClassifier::new();
        let cats = k.categorize("4 red pixels moved 2.0 downward");
        assert_eq!(cats, vec![RuleCategory::Movement]);
        assert!(k.supports(RuleCategory::Movement, "object moved to position (3,1)"));
        assert!(!k.supports(RuleCategory::Constraint, "object moved"));
    }

    #[test]
    fn no_effect_is_a_constraint_and_not_general() {
        let k = KeywordClassifier::new();
        assert_eq!(
            k.categorize("no effect: grid unchanged"),
            vec![RuleCategory::Constraint]
        );
        assert!(!k.supports(RuleCategory::General, "no effect: grid unchanged"));
        assert!(k.supports(RuleCategory::General, "something odd happened"));
    }

    #[test]
    fn unmatched_text_has_no_category() {
        assert!(KeywordClassifier::new()
            .categorize("flicker of lights")
            .is_empty());
    }

    #[test]
    fn custom_words_extend_lexicon() {
        let k = KeywordClassifier::new().with_words(RuleCategory::Interaction, &["Flicker"]);
        assert_eq!(
            k.categorize("flicker of lights"),
            vec![RuleCategory::Interaction]
        );
    }
}
