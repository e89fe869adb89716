#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::changes::ChangeAnalysis;
use crate::rules::ObservationOutcome;

/// How much a turn moved the agent forward. Drives the affect update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ProgressType {
    MajorProgress,
    MinorProgress,
    ValidAction,
    NoEffect,
}

impl ProgressType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressType::MajorProgress => "major_progress",
            ProgressType::MinorProgress => "minor_progress",
            ProgressType::ValidAction => "valid_action",
            ProgressType::NoEffect => "no_effect",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ProgressType::MajorProgress | ProgressType::MinorProgress)
    }

    /// Classify a turn. Degraded (reconciled) analyses are ambiguous and get
    /// the weakest positive class.
    pub fn classify(
        analysis: &ChangeAnalysis,
        level_transition: bool,
        outcome: &ObservationOutcome,
    ) -> ProgressType {
        if level_transition || analysis.is_level_transition {
            return ProgressType::MajorProgress;
        }
        if analysis.degraded {
            return ProgressType::ValidAction;
        }
        if !analysis.has_changes() {
            return ProgressType::NoEffect;
        }
        if analysis.has_movement()
            || !outcome.confirmed.is_empty()
            || !outcome.supported_hypotheses.is_empty()
        {
            return ProgressType::MinorProgress;
        }
        ProgressType::ValidAction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionInput};
    use crate::changes::ChangeClassifier;
    use crate::grid::Grid;

    #[test]
    fn classification_ladder() {
        let cc = ChangeClassifier::default();
        let idle = ObservationOutcome::default();
        let blank = Grid::new(8, 8);
        let input = ActionInput::new(Action::Down);

        let same = cc.analyze(&blank, &blank, Some(&input));
        assert_eq!(ProgressType::classify(&same, false, &idle), ProgressType::NoEffect);
        assert_eq!(ProgressType::classify(&same, true, &idle), ProgressType::MajorProgress);

        let mut lit = Grid::new(8, 8);
        lit.set(2, 2, 6);
        let appeared = cc.analyze(&blank, &lit, Some(&input));
        assert_eq!(ProgressType::classify(&appeared, false, &idle), ProgressType::ValidAction);

        let confirmed = ObservationOutcome {
            confirmed: vec![1],
            ..Default::default()
        };
        assert_eq!(
            ProgressType::classify(&appeared, false, &confirmed),
            ProgressType::MinorProgress
        );

        let mut moved = Grid::new(8, 8);
        moved.set(3, 2, 6);
        let shift = cc.analyze(&lit, &moved, Some(&input));
        assert_eq!(ProgressType::classify(&shift, false, &idle), ProgressType::MinorProgress);
    }

    #[test]
    fn degraded_analysis_is_valid_action() {
        let cc = ChangeClassifier::default();
        let a = cc.analyze(&Grid::new(4, 4), &Grid::new(5, 5), None);
        assert!(a.degraded);
        assert_eq!(
            ProgressType::classify(&a, false, &ObservationOutcome::default()),
            ProgressType::ValidAction
        );
    }
}
