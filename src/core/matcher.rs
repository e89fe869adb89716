//! Cross-frame object matching by exact signature.

use hashbrown::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::grid::Color;
use crate::objects::{DetectedObject, ShapeClass};

/// Which frame a changed object was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ObjectSide {
    /// Present before, no identical object after.
    Vanished,
    /// Present after, no identical object before.
    Appeared,
}

impl ObjectSide {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectSide::Vanished => "vanished",
            ObjectSide::Appeared => "appeared",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChangedObject {
    pub side: ObjectSide,
    pub object: DetectedObject,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MatchResult {
    /// Vanished objects first, then appeared ones, each in detection order.
    pub changed: Vec<ChangedObject>,
    /// After-frame versions of objects present unchanged in both frames.
    pub unchanged: Vec<DetectedObject>,
}

impl MatchResult {
    pub fn vanished(&self) -> impl Iterator<Item = &DetectedObject> {
        self.changed
            .iter()
            .filter(|c| c.side == ObjectSide::Vanished)
            .map(|c| &c.object)
    }

    pub fn appeared(&self) -> impl Iterator<Item = &DetectedObject> {
        self.changed
            .iter()
            .filter(|c| c.side == ObjectSide::Appeared)
            .map(|c| &c.object)
    }
}

type Signature<'a> = (Color, ShapeClass, &'a [(usize, usize)]);

fn signature(o: &DetectedObject) -> Signature<'_> {
    (o.color, o.shape, o.positions.as_slice())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectMatcher;

impl ObjectMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Match two object lists by (colour, shape, sorted positions).
    pub fn match_objects(
        &self,
        before: &[DetectedObject],
        after: &[DetectedObject],
    ) -> MatchResult {
        let before_sigs: HashSet<Signature<'_>> = before.iter().map(signature).collect();
        let after_sigs: HashSet<Signature<'_>> = after.iter().map(signature).collect();

        let mut out = MatchResult::default();
        for o in before {
            if !after_sigs.contains(&signature(o)) {
                out.changed.push(ChangedObject {
                    side: ObjectSide::Vanished,
                    object: o.clone(),
                });
            }
        }
        for o in after {
            if before_sigs.contains(&signature(o)) {
                out.unchanged.push(o.clone());
            } else {
                out.changed.push(ChangedObject {
                    side: ObjectSide::Appeared,
                    object: o.clone(),
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::objects::ObjectDetector;

    fn block_at(r0: usize, c0: usize) -> Grid {
        let mut g = Grid::new(4, 4);
        for r in r0..r0 + 2 {
            for c in c0..c0 + 2 {
                g.set(r, c, 3);
            }
        }
        g
    }

    #[test]
    fn moved_block_is_reported_on_both_sides() {
        let det = ObjectDetector::new();
        let before = det.detect(&block_at(0, 0));
        let after = det.detect(&block_at(2, 2));

        assert_eq!(before.len(), 1);
        assert_eq!(before[0].shape.to_string(), "square-2x2");
        assert_eq!(before[0].size(), 4);

        let m = ObjectMatcher::new().match_objects(&before, &after);
        assert_eq!(m.changed.len(), 2);
        assert_eq!(m.vanished().count(), 1);
        assert_eq!(m.appeared().count(), 1);
        assert!(m.unchanged.is_empty());
    }

    #[test]
    fn self_match_has_no_changes() {
        let det = ObjectDetector::new();
        let mut g = block_at(1, 1);
        g.set(0, 3, 7);
        let objs = det.detect(&g);
        let m = ObjectMatcher::new().match_objects(&objs, &objs);
        assert!(m.changed.is_empty());
        assert_eq!(m.unchanged.len(), objs.len());
    }

    #[test]
    fn recolored_object_is_changed() {
        let det = ObjectDetector::new();
        let before = det.detect(&block_at(0, 0));
        let mut g = block_at(0, 0);
        for r in 0..2 {
            for c in 0..2 {
                g.set(r, c, 8);
            }
        }
        let after = det.detect(&g);
        let m = ObjectMatcher::new().match_objects(&before, &after);
        assert_eq!(m.changed.len(), 2);
    }
}
