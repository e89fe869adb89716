//! Change classification between consecutive frames.
//!
//! [`ChangeClassifier::analyze`] turns a grid diff plus the detected objects
//! of both frames into a [`ChangeAnalysis`]: per-cell change kinds, affected
//! regions, pointer proximity, movement groups, object transformations and a
//! compact effect text ([`ChangeAnalysis::describe`]) that the rule engine
//! learns from.

use std::collections::BTreeMap;
use std::fmt::Write as _;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::{Action, ActionInput};
use crate::config::PerceptionConfig;
use crate::grid::{color_name, Color, Grid, GridDiffer, Reconciliation, BACKGROUND};
use crate::matcher::{MatchResult, ObjectMatcher};
use crate::objects::{DetectedObject, ObjectDetector, Region};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CellChangeKind {
    /// Background became a colour.
    Appearance,
    /// A colour became background.
    Disappearance,
    /// One colour became another.
    Transformation,
}

impl CellChangeKind {
    pub fn classify(before: Color, after: Color) -> CellChangeKind {
        if before == BACKGROUND {
            CellChangeKind::Appearance
        } else if after == BACKGROUND {
            CellChangeKind::Disappearance
        } else {
            CellChangeKind::Transformation
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChangeRecord {
    pub row: usize,
    pub col: usize,
    pub before: Color,
    pub after: Color,
    pub kind: CellChangeKind,
}

/// Same-coloured cells that disappeared in one place and appeared in another.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MovementGroup {
    pub color: Color,
    pub pixels: usize,
    pub row_shift: f32,
    pub col_shift: f32,
}

impl MovementGroup {
    /// e.g. `"2.0 downward, 1.0 leftward"`.
    pub fn direction_text(&self) -> String {
        let mut parts = Vec::with_capacity(2);
        if self.row_shift > 0.0 {
            parts.push(format!("{:.1} downward", self.row_shift.abs()));
        } else if self.row_shift < 0.0 {
            parts.push(format!("{:.1} upward", self.row_shift.abs()));
        }
        if self.col_shift > 0.0 {
            parts.push(format!("{:.1} rightward", self.col_shift.abs()));
        } else if self.col_shift < 0.0 {
            parts.push(format!("{:.1} leftward", self.col_shift.abs()));
        }
        if parts.is_empty() {
            "in place".to_string()
        } else {
            parts.join(", ")
        }
    }

    /// The directional action matching the dominant axis of the shift.
    pub fn dominant_direction(&self) -> Option<Action> {
        if self.row_shift == 0.0 && self.col_shift == 0.0 {
            return None;
        }
        if self.row_shift.abs() >= self.col_shift.abs() {
            Some(if self.row_shift > 0.0 {
                Action::Down
            } else {
                Action::Up
            })
        } else {
            Some(if self.col_shift > 0.0 {
                Action::Right
            } else {
                Action::Left
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DirectionalConsistency {
    /// Changes went the way the action points.
    Consistent(Action),
    InconsistentVertical,
    InconsistentHorizontal,
}

impl DirectionalConsistency {
    pub fn is_consistent(self) -> bool {
        matches!(self, DirectionalConsistency::Consistent(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TransformationKind {
    Translation,
    ColorChange,
    ShapeChange,
    Materialization,
    Dematerialization,
}

impl TransformationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransformationKind::Translation => "translation",
            TransformationKind::ColorChange => "color-change",
            TransformationKind::ShapeChange => "shape-change",
            TransformationKind::Materialization => "materialization",
            TransformationKind::Dematerialization => "dematerialization",
        }
    }
}

/// One inferred object-level transformation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObjectTransformation {
    pub kind: TransformationKind,
    pub from: Option<DetectedObject>,
    pub to: Option<DetectedObject>,
    /// `(rows, cols)` displacement of the bounding box, for translations.
    pub displacement: Option<(i64, i64)>,
}

impl ObjectTransformation {
    pub fn describe(&self) -> String {
        match (self.kind, &self.from, &self.to) {
            (TransformationKind::Translation, Some(a), Some(b)) => {
                let (dr, dc) = self.displacement.unwrap_or((0, 0));
                format!(
                    "{} {} moved by ({dr},{dc}) to position ({},{})",
                    a.color_name(),
                    a.shape,
                    b.bounds.min_row,
                    b.bounds.min_col
                )
            }
            (TransformationKind::ColorChange, Some(a), Some(b)) => format!(
                "{} changed color from {} to {}",
                a.shape,
                a.color_name(),
                b.color_name()
            ),
            (TransformationKind::ShapeChange, Some(a), Some(b)) => format!(
                "{} object changed shape from {} to {}",
                a.color_name(),
                a.shape,
                b.shape
            ),
            (_, _, Some(b)) => format!("{} appeared", b.describe()),
            (_, Some(a), None) => format!("{} disappeared", a.describe()),
            _ => self.kind.as_str().to_string(),
        }
    }
}

/// Everything perceived about one action's effect.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChangeAnalysis {
    pub action: Option<Action>,
    /// Ordinary diffing was skipped because the level changed.
    pub is_level_transition: bool,
    /// The grids needed reconciliation before they could be compared.
    pub degraded: bool,
    pub total_changes: usize,
    pub total_cells: usize,
    pub change_percentage: f32,
    pub appearances: usize,
    pub disappearances: usize,
    pub transformations: usize,
    pub changes: Vec<ChangeRecord>,
    pub regions: Vec<Region>,
    pub near_pointer: bool,
    pub directional: Option<DirectionalConsistency>,
    pub movements: Vec<MovementGroup>,
    pub object_transformations: Vec<ObjectTransformation>,
    pub dominant_transformation: Option<TransformationKind>,
    pub objects: MatchResult,
    pub objects_before: usize,
    pub objects_after: usize,
}

impl ChangeAnalysis {
    fn empty(action: Option<Action>) -> Self {
        Self {
            action,
            is_level_transition: false,
            degraded: false,
            total_changes: 0,
            total_cells: 0,
            change_percentage: 0.0,
            appearances: 0,
            disappearances: 0,
            transformations: 0,
            changes: Vec::new(),
            regions: Vec::new(),
            near_pointer: false,
            directional: None,
            movements: Vec::new(),
            object_transformations: Vec::new(),
            dominant_transformation: None,
            objects: MatchResult::default(),
            objects_before: 0,
            objects_after: 0,
        }
    }

    /// Labelled analysis for a level change; no diffing is done.
    pub fn level_transition(action: Option<Action>) -> Self {
        Self {
            is_level_transition: true,
            ..Self::empty(action)
        }
    }

    pub fn has_changes(&self) -> bool {
        self.is_level_transition || self.total_changes > 0
    }

    pub fn has_movement(&self) -> bool {
        !self.movements.is_empty()
            || self
                .object_transformations
                .iter()
                .any(|t| t.kind == TransformationKind::Translation)
    }

    /// Compact effect text fed to rule learning and memory.
    pub fn describe(&self) -> String {
        if self.is_level_transition {
            return "level transition: level completed and score increased".to_string();
        }
        if self.total_changes == 0 {
            return "no effect: grid unchanged".to_string();
        }

        let mut parts: Vec<String> = Vec::new();
        for m in &self.movements {
            parts.push(format!(
                "{} {} pixels moved {}",
                m.pixels,
                color_name(m.color),
                m.direction_text()
            ));
        }
        for t in &self.object_transformations {
            if t.kind == TransformationKind::Translation {
                parts.push(t.describe());
            }
        }
        if self.movements.is_empty() {
            if self.appearances > 0 {
                parts.push(format!("{} pixels appeared", self.appearances));
            }
            if self.disappearances > 0 {
                parts.push(format!("{} pixels disappeared", self.disappearances));
            }
        }
        if self.transformations > 0 {
            parts.push(format!("{} pixels changed color", self.transformations));
        }
        if let Some(kind) = self.dominant_transformation {
            if kind != TransformationKind::Translation {
                parts.push(format!("mostly {}", kind.as_str()));
            }
        }
        if self.near_pointer {
            parts.push("changes near pointer".to_string());
        }
        match self.regions.len() {
            0 => {}
            1 => parts.push(format!("in {}", self.regions[0])),
            2 | 3 => {
                let names: Vec<&str> = self.regions.iter().map(|r| r.as_str()).collect();
                parts.push(format!("in {}", names.join(", ")));
            }
            n => parts.push(format!("across {n} regions")),
        }
        parts.join("; ")
    }

    /// Multi-line report used as interpretation context.
    pub fn report(&self) -> String {
        let mut s = String::new();
        let action = self.action.map(|a| a.as_str()).unwrap_or("none");
        if self.is_level_transition {
            let _ = writeln!(s, "Action {action}: level transition.");
            return s;
        }

        let _ = write!(s, "Action {action} changed {} cells", self.total_changes);
        if self.change_percentage > 1.0 {
            let _ = write!(s, " ({:.1}% of the grid)", self.change_percentage);
        }
        s.push('\n');
        if self.appearances > 0 {
            let _ = writeln!(s, "Appearances: {} (background -> color)", self.appearances);
        }
        if self.disappearances > 0 {
            let _ = writeln!(
                s,
                "Disappearances: {} (color -> background)",
                self.disappearances
            );
        }
        if self.transformations > 0 {
            let _ = writeln!(s, "Transformations: {} (color change)", self.transformations);
        }
        if !self.regions.is_empty() {
            let names: Vec<&str> = self.regions.iter().map(|r| r.as_str()).collect();
            let _ = writeln!(s, "Regions: {}", names.join(", "));
        }
        if self.near_pointer {
            let _ = writeln!(s, "Changes near the pointer");
        }
        match self.directional {
            Some(DirectionalConsistency::Consistent(a)) => {
                let _ = writeln!(s, "Direction: consistent toward {a}");
            }
            Some(_) => {
                let _ = writeln!(s, "Direction: unexpected for movement");
            }
            None => {}
        }
        for m in &self.movements {
            let _ = writeln!(
                s,
                "Movement: {} {} pixels moved {}",
                m.pixels,
                color_name(m.color),
                m.direction_text()
            );
        }
        for t in &self.object_transformations {
            let _ = writeln!(s, "Object: {}", t.describe());
        }
        let _ = writeln!(
            s,
            "Objects: {} before, {} after, {} changed, {} unchanged",
            self.objects_before,
            self.objects_after,
            self.objects.changed.len(),
            self.objects.unchanged.len()
        );
        s
    }
}

/// Perception pipeline: diff, detect, match, classify.
#[derive(Debug, Clone)]
pub struct ChangeClassifier {
    differ: GridDiffer,
    detector: ObjectDetector,
    matcher: ObjectMatcher,
    pointer_radius: usize,
}

impl Default for ChangeClassifier {
    fn default() -> Self {
        Self::new(&PerceptionConfig::default())
    }
}

impl ChangeClassifier {
    pub fn new(cfg: &PerceptionConfig) -> Self {
        Self {
            differ: GridDiffer::new(cfg),
            detector: ObjectDetector::new(),
            matcher: ObjectMatcher::new(),
            pointer_radius: cfg.pointer_radius,
        }
    }

    pub fn detector(&self) -> &ObjectDetector {
        &self.detector
    }

    pub fn analyze(
        &self,
        before: &Grid,
        after: &Grid,
        input: Option<&ActionInput>,
    ) -> ChangeAnalysis {
        let action = input.map(|i| i.action);
        let diff = self.differ.diff(before, after);

        let objects_before = self.detector.detect(&diff.before);
        let objects_after = self.detector.detect(&diff.after);
        let objects = self.matcher.match_objects(&objects_before, &objects_after);

        let (rows, cols) = diff.after.shape();
        let changes: Vec<ChangeRecord> = diff
            .changed
            .iter()
            .map(|c| ChangeRecord {
                row: c.row,
                col: c.col,
                before: c.before,
                after: c.after,
                kind: CellChangeKind::classify(c.before, c.after),
            })
            .collect();

        let mut analysis = ChangeAnalysis::empty(action);
        analysis.degraded = diff.reconciliation != Reconciliation::Exact;
        analysis.total_changes = changes.len();
        analysis.total_cells = diff.total_cells();
        analysis.change_percentage = if analysis.total_cells > 0 {
            changes.len() as f32 * 100.0 / analysis.total_cells as f32
        } else {
            0.0
        };
        for c in &changes {
            match c.kind {
                CellChangeKind::Appearance => analysis.appearances += 1,
                CellChangeKind::Disappearance => analysis.disappearances += 1,
                CellChangeKind::Transformation => analysis.transformations += 1,
            }
        }

        let mut regions: Vec<Region> = changes
            .iter()
            .map(|c| Region::locate(c.row, c.col, rows, cols))
            .collect();
        regions.sort_unstable();
        regions.dedup();
        analysis.regions = regions;

        analysis.near_pointer = match input.and_then(|i| i.pointer) {
            Some(p) => changes
                .iter()
                .any(|c| p.is_near(c.row, c.col, self.pointer_radius)),
            None => false,
        };

        analysis.movements = movement_groups(&changes);
        analysis.directional =
            directional_consistency(action, &changes, &analysis.movements, rows, cols);

        let transforms = infer_transformations(&objects);
        analysis.dominant_transformation = dominant_kind(&transforms);
        analysis.object_transformations = transforms;

        analysis.objects_before = objects_before.len();
        analysis.objects_after = objects_after.len();
        analysis.objects = objects;
        analysis.changes = changes;

        debug!(
            action = action.map(|a| a.as_str()).unwrap_or("none"),
            changes = analysis.total_changes,
            movements = analysis.movements.len(),
            "analyzed frame change"
        );
        analysis
    }
}

/// Pair disappeared and appeared cells per colour, in scan order, when the
/// counts agree.
fn movement_groups(changes: &[ChangeRecord]) -> Vec<MovementGroup> {
    let mut gone: BTreeMap<Color, Vec<(usize, usize)>> = BTreeMap::new();
    let mut came: BTreeMap<Color, Vec<(usize, usize)>> = BTreeMap::new();
    for c in changes {
        match c.kind {
            CellChangeKind::Disappearance => gone.entry(c.before).or_default().push((c.row, c.col)),
            CellChangeKind::Appearance => came.entry(c.after).or_default().push((c.row, c.col)),
            CellChangeKind::Transformation => {}
        }
    }

    let mut out = Vec::new();
    for (color, from) in &gone {
        let Some(to) = came.get(color) else {
            continue;
        };
        if from.len() != to.len() || from.is_empty() {
            continue;
        }
        let n = from.len() as f32;
        let (dr, dc) = from.iter().zip(to).fold((0i64, 0i64), |(dr, dc), (a, b)| {
            (
                dr + b.0 as i64 - a.0 as i64,
                dc + b.1 as i64 - a.1 as i64,
            )
        });
        out.push(MovementGroup {
            color: *color,
            pixels: from.len(),
            row_shift: dr as f32 / n,
            col_shift: dc as f32 / n,
        });
    }
    out
}

fn directional_consistency(
    action: Option<Action>,
    changes: &[ChangeRecord],
    movements: &[MovementGroup],
    rows: usize,
    cols: usize,
) -> Option<DirectionalConsistency> {
    let action = action.filter(|a| a.is_directional())?;
    if changes.len() < 2 {
        return None;
    }
    let vertical = matches!(action, Action::Up | Action::Down);
    let inconsistent = if vertical {
        DirectionalConsistency::InconsistentVertical
    } else {
        DirectionalConsistency::InconsistentHorizontal
    };

    if let Some(main) = movements.iter().max_by_key(|m| m.pixels) {
        return Some(if main.dominant_direction() == Some(action) {
            DirectionalConsistency::Consistent(action)
        } else {
            inconsistent
        });
    }

    // No paired movement: fall back to where the changes sit relative to the centre.
    let n = changes.len() as f32;
    let center_row = changes.iter().map(|c| c.row as f32).sum::<f32>() / n;
    let center_col = changes.iter().map(|c| c.col as f32).sum::<f32>() / n;
    let mid_row = rows as f32 / 2.0;
    let mid_col = cols as f32 / 2.0;
    let ok = match action {
        Action::Up => center_row < mid_row,
        Action::Down => center_row > mid_row,
        Action::Left => center_col < mid_col,
        Action::Right => center_col > mid_col,
        _ => false,
    };
    Some(if ok {
        DirectionalConsistency::Consistent(action)
    } else {
        inconsistent
    })
}

fn infer_transformations(m: &MatchResult) -> Vec<ObjectTransformation> {
    let vanished: Vec<&DetectedObject> = m.vanished().collect();
    let appeared: Vec<&DetectedObject> = m.appeared().collect();
    let mut used_v = vec![false; vanished.len()];
    let mut used_a = vec![false; appeared.len()];
    let mut out = Vec::new();

    let mut pair = |pred: &dyn Fn(&DetectedObject, &DetectedObject) -> bool,
                    kind: TransformationKind,
                    out: &mut Vec<ObjectTransformation>| {
        for (i, v) in vanished.iter().enumerate() {
            if used_v[i] {
                continue;
            }
            let hit = appeared
                .iter()
                .enumerate()
                .find(|(j, a)| !used_a[*j] && pred(v, a));
            if let Some((j, a)) = hit {
                used_v[i] = true;
                used_a[j] = true;
                let displacement = (kind == TransformationKind::Translation).then(|| {
                    (
                        a.bounds.min_row as i64 - v.bounds.min_row as i64,
                        a.bounds.min_col as i64 - v.bounds.min_col as i64,
                    )
                });
                out.push(ObjectTransformation {
                    kind,
                    from: Some((*v).clone()),
                    to: Some((*a).clone()),
                    displacement,
                });
            }
        }
    };

    pair(
        &|v, a| v.color == a.color && v.shape == a.shape,
        TransformationKind::Translation,
        &mut out,
    );
    pair(
        &|v, a| v.positions == a.positions && v.color != a.color,
        TransformationKind::ColorChange,
        &mut out,
    );
    pair(
        &|v, a| {
            v.color == a.color
                && v.shape != a.shape
                && v.positions.iter().any(|p| a.positions.binary_search(p).is_ok())
        },
        TransformationKind::ShapeChange,
        &mut out,
    );

    for (i, v) in vanished.iter().enumerate() {
        if !used_v[i] {
            out.push(ObjectTransformation {
                kind: TransformationKind::Dematerialization,
                from: Some((*v).clone()),
                to: None,
                displacement: None,
            });
        }
    }
    for (j, a) in appeared.iter().enumerate() {
        if !used_a[j] {
            out.push(ObjectTransformation {
                kind: TransformationKind::Materialization,
                from: None,
                to: Some((*a).clone()),
                displacement: None,
            });
        }
    }
    out
}

fn dominant_kind(ts: &[ObjectTransformation]) -> Option<TransformationKind> {
    let mut counts: BTreeMap<TransformationKind, usize> = BTreeMap::new();
    for t in ts {
        *counts.entry(t.kind).or_default() += 1;
    }
    // Ties go to the earlier kind.
    counts
        .into_iter()
        .fold(None, |best: Option<(TransformationKind, usize)>, (k, n)| match best {
            Some((_, bn)) if bn >= n => best,
            _ => Some((k, n)),
        })
        .map(|(k, _)| k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Pointer;

    fn block(rows: usize, cols: usize, r0: usize, c0: usize, color: Color) -> Grid {
        let mut g = Grid::new(rows, cols);
        for r in r0..r0 + 2 {
            for c in c0..c0 + 2 {
                g.set(r, c, color);
            }
        }
        g
    }

    #[test]
    fn identical_grids_have_no_effect() {
        let g = block(8, 8, 2, 2, 4);
        let a = ChangeClassifier::default().analyze(&g, &g, Some(&ActionInput::new(Action::Up)));
        assert_eq!(a.total_changes, 0);
        assert!(a.objects.changed.is_empty());
        assert!(a.describe().contains("no effect"));
        assert!(!a.has_changes());
    }

    #[test]
    fn block_moving_down_is_a_consistent_translation() {
        let before = block(8, 8, 1, 1, 8);
        let after = block(8, 8, 3, 1, 8);
        let a = ChangeClassifier::default().analyze(
            &before,
            &after,
            Some(&ActionInput::new(Action::Down)),
        );

        assert_eq!(a.appearances, 2 * 2);
        assert_eq!(a.disappearances, 2 * 2);
        assert_eq!(a.movements.len(), 1);
        assert_eq!(a.movements[0].row_shift, 2.0);
        assert_eq!(
            a.directional,
            Some(DirectionalConsistency::Consistent(Action::Down))
        );
        assert_eq!(a.dominant_transformation, Some(TransformationKind::Translation));
        assert_eq!(a.object_transformations[0].displacement, Some((2, 0)));

        let text = a.describe();
        assert!(text.contains("moved"), "{text}");
        assert!(text.contains("downward"), "{text}");
    }

    #[test]
    fn wrong_direction_is_inconsistent() {
        let before = block(8, 8, 3, 3, 8);
        let after = block(8, 8, 3, 5, 8);
        let a = ChangeClassifier::default().analyze(
            &before,
            &after,
            Some(&ActionInput::new(Action::Left)),
        );
        assert_eq!(
            a.directional,
            Some(DirectionalConsistency::InconsistentHorizontal)
        );
    }

    #[test]
    fn recolor_is_a_color_change() {
        let before = block(8, 8, 0, 0, 3);
        let after = block(8, 8, 0, 0, 10);
        let a = ChangeClassifier::default().analyze(&before, &after, None);
        assert_eq!(a.transformations, 4);
        assert_eq!(a.dominant_transformation, Some(TransformationKind::ColorChange));
        assert!(a.describe().contains("changed color"));
    }

    #[test]
    fn appearance_near_click_is_flagged() {
        let before = Grid::new(16, 16);
        let mut after = Grid::new(16, 16);
        after.set(5, 9, 11);
        let input = ActionInput::at(Action::Click, Pointer::new(7, 4));
        let a = ChangeClassifier::default().analyze(&before, &after, Some(&input));
        assert!(a.near_pointer);
        assert_eq!(a.appearances, 1);
        assert_eq!(a.dominant_transformation, Some(TransformationKind::Materialization));
        let text = a.describe();
        assert!(text.contains("appeared"), "{text}");
        assert!(text.contains("near pointer"), "{text}");

        let far = ActionInput::at(Action::Click, Pointer::new(15, 15));
        assert!(!ChangeClassifier::default().analyze(&before, &after, Some(&far)).near_pointer);
    }

    #[test]
    fn mismatched_shapes_degrade_instead_of_failing() {
        let a = ChangeClassifier::default().analyze(&Grid::new(4, 4), &Grid::new(6, 3), None);
        assert!(a.degraded);
        assert_eq!(a.total_cells, 12);
    }

    #[test]
    fn level_transition_skips_diffing() {
        let a = ChangeAnalysis::level_transition(Some(Action::Space));
        assert!(a.has_changes());
        assert!(a.describe().contains("level"));
        assert_eq!(a.total_changes, 0);
    }
}
