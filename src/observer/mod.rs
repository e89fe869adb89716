use crate::affect::AffectSnapshot;
use crate::memory::MemoryStats;
use crate::orchestrator::Orchestrator;
use crate::progress::ProgressType;

/// A read-only snapshot of what the engine currently believes.
///
/// Observers cannot mutate or steer the engine. Snapshotting is on demand
/// and allocates; the turn loop is unaffected.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub turn: u64,
    pub observations: u64,
    pub success_density: f32,
    pub affect: AffectSnapshot,
    pub memory: MemoryStats,

    /// `(description, confidence)`, strongest first.
    pub rules: Vec<(String, f32)>,
    pub hypotheses: Vec<(String, f32)>,
    pub last_effect: Option<String>,
    pub last_progress: Option<ProgressType>,
}

impl EngineSnapshot {
    /// One line per field group, for logs and terminals.
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!(
                "turn {} | {} observations | success density {:.2}",
                self.turn, self.observations, self.success_density
            ),
            self.affect.summary(),
            format!(
                "memory: {} records, {} clusters, {} keywords, {} evicted",
                self.memory.records,
                self.memory.clusters,
                self.memory.keywords,
                self.memory.evictions
            ),
        ];
        for (d, c) in &self.rules {
            lines.push(format!("rule {c:.2} {d}"));
        }
        for (d, c) in &self.hypotheses {
            lines.push(format!("hypothesis {c:.2} {d}"));
        }
        if let Some(e) = &self.last_effect {
            lines.push(format!("last effect: {e}"));
        }
        lines.join("\n")
    }
}

pub struct EngineAdapter<'a> {
    engine: &'a Orchestrator,
}

impl<'a> EngineAdapter<'a> {
    pub fn new(engine: &'a Orchestrator) -> Self {
        Self { engine }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let rules = self.engine.rules();
        let last = self.engine.last_report();

        EngineSnapshot {
            turn: self.engine.turn(),
            observations: rules.observations(),
            success_density: rules.success_density(),
            affect: self.engine.affect().snapshot(),
            memory: self.engine.memory().stats(),

            rules: ranked(rules.rules().map(|r| (r.description.clone(), r.confidence))),
            hypotheses: ranked(
                rules
                    .hypotheses()
                    .map(|h| (h.description.clone(), h.confidence)),
            ),
            last_effect: last.map(|r| r.effect.clone()),
            last_progress: last.and_then(|r| r.progress),
        }
    }
}

fn ranked(items: impl Iterator<Item = (String, f32)>) -> Vec<(String, f32)> {
    let mut v: Vec<_> = items.collect();
    v.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::config::EngineConfig;
    use crate::grid::Grid;
    use crate::orchestrator::Frame;

    #[test]
    fn snapshot_tracks_engine_without_mutating_it() {
        let mut cfg = EngineConfig::default();
        cfg.interpretation.enabled = false;
        let mut engine = Orchestrator::new(cfg);

        let empty = EngineAdapter::new(&engine).snapshot();
        assert_eq!(empty.turn, 0);
        assert!(empty.last_effect.is_none());

        let g = Grid::new(8, 8);
        engine.step(&Frame::new(g.clone(), 0));
        engine.step(&Frame::new(g, 0).with_action(Action::Left, None));

        let snap = EngineAdapter::new(&engine).snapshot();
        assert_eq!(snap.turn, 2);
        assert_eq!(snap.observations, 1);
        assert_eq!(snap.last_progress, Some(ProgressType::NoEffect));
        assert_eq!(snap.hypotheses.len(), 1);
        assert_eq!(snap.memory.records, 1);
        assert!(snap.render().contains("no effect"));
        assert_eq!(engine.turn(), 2);
    }
}
