//! Keyword-clustered associative memory of past experiences.
//!
//! Each record is filed into the most similar keyword cluster (or a new one)
//! at insertion time and stays there. Queries score records by keyword
//! overlap weighted toward rare words, recency and the track record of the
//! record's cluster. Capacity is bounded: the record with the lowest
//! retention score is evicted first.
//!
//! Time-dependent operations come in two flavours: the plain ones read a
//! monotonic clock, the `*_at` ones take seconds explicitly.

use std::collections::BTreeMap;
use std::time::Instant;

use hashbrown::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MemoryConfig;
use crate::keywords::{extract, jaccard};

/// Cluster size at which a cluster's confidence saturates.
const CONFIDENT_CLUSTER_SIZE: f32 = 5.0;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExperienceRecord {
    pub id: u64,
    pub context: String,
    pub action: String,
    pub outcome: String,
    pub success: bool,
    /// Seconds on the memory's clock.
    pub timestamp: f64,
    pub turn: u64,
    pub confidence: f32,
    /// Fixed at insertion.
    pub cluster: u32,
    pub keywords: Vec<String>,
    /// Turns in which the record was returned by a query.
    pub access_count: u32,
    pub last_access: f64,
    pub last_access_turn: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExperienceCluster {
    pub id: u32,
    pub keywords: Vec<String>,
    pub members: Vec<u64>,
    pub successes: u32,
}

impl ExperienceCluster {
    pub fn success_rate(&self) -> f32 {
        if self.members.is_empty() {
            0.0
        } else {
            self.successes as f32 / self.members.len() as f32
        }
    }

    pub fn confidence(&self) -> f32 {
        (self.members.len() as f32 / CONFIDENT_CLUSTER_SIZE).min(1.0)
    }

    /// Quality term used in relevance scoring.
    pub fn quality(&self) -> f32 {
        0.5 * self.success_rate() + 0.5 * self.confidence()
    }
}

/// A scored match returned by queries.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Precedent {
    pub record: ExperienceRecord,
    pub relevance: f32,
    pub contextual: f32,
    pub temporal: f32,
    pub cluster_quality: f32,
}

impl Precedent {
    pub fn line(&self) -> String {
        let verdict = if self.record.success {
            "worked"
        } else {
            "failed"
        };
        format!(
            "[{:.2}] {} -> {}: {} ({verdict})",
            self.relevance, self.record.context, self.record.action, self.record.outcome
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActionStats {
    pub attempts: u32,
    pub successes: u32,
    pub last_turn: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct KeywordStat {
    count: u32,
    last_turn: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MemoryStats {
    pub records: usize,
    pub clusters: usize,
    pub keywords: usize,
    pub evictions: u64,
}

#[derive(Debug, Clone)]
pub struct AssociativeMemory {
    cfg: MemoryConfig,
    records: BTreeMap<u64, ExperienceRecord>,
    clusters: BTreeMap<u32, ExperienceCluster>,
    keyword_freq: HashMap<String, KeywordStat>,
    actions: HashMap<String, ActionStats>,
    next_record: u64,
    next_cluster: u32,
    turn: u64,
    last_maintenance: f64,
    evictions: u64,
    clock: Instant,
}

impl AssociativeMemory {
    pub fn new(cfg: MemoryConfig) -> Self {
        Self {
            cfg,
            records: BTreeMap::new(),
            clusters: BTreeMap::new(),
            keyword_freq: HashMap::new(),
            actions: HashMap::new(),
            next_record: 1,
            next_cluster: 1,
            turn: 0,
            last_maintenance: 0.0,
            evictions: 0,
            clock: Instant::now(),
        }
    }

    fn now(&self) -> f64 {
        self.clock.elapsed().as_secs_f64()
    }

    /// Set the current turn used for turn-based aging.
    pub fn advance_turn(&mut self, turn: u64) {
        self.turn = self.turn.max(turn);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn record(&self, id: u64) -> Option<&ExperienceRecord> {
        self.records.get(&id)
    }

    pub fn cluster(&self, id: u32) -> Option<&ExperienceCluster> {
        self.clusters.get(&id)
    }

    pub fn action_stats(&self, action: &str) -> Option<ActionStats> {
        self.actions.get(action).copied()
    }

    pub fn action_success_rate(&self, action: &str) -> Option<f32> {
        self.actions
            .get(action)
            .filter(|s| s.attempts > 0)
            .map(|s| s.successes as f32 / s.attempts as f32)
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            records: self.records.len(),
            clusters: self.clusters.len(),
            keywords: self.keyword_freq.len(),
            evictions: self.evictions,
        }
    }

    pub fn remember(&mut self, context: &str, action: &str, outcome: &str, success: bool) -> u64 {
        let now = self.now();
        self.remember_at(context, action, outcome, success, now)
    }

    /// Store an experience; returns its id.
    pub fn remember_at(
        &mut self,
        context: &str,
        action: &str,
        outcome: &str,
        success: bool,
        now: f64,
    ) -> u64 {
        let keywords = extract(context, self.cfg.keywords_per_record);
        for k in &keywords {
            let stat = self.keyword_freq.entry(k.clone()).or_default();
            stat.count += 1;
            stat.last_turn = self.turn;
        }

        let cluster = self.assign_cluster(&keywords);
        let id = self.next_record;
        self.next_record += 1;

        if let Some(c) = self.clusters.get_mut(&cluster) {
            c.members.push(id);
            if success {
                c.successes += 1;
            }
        }

        let a = self.actions.entry(action.to_string()).or_default();
        a.attempts += 1;
        if success {
            a.successes += 1;
        }
        a.last_turn = self.turn;

        self.records.insert(
            id,
            ExperienceRecord {
                id,
                context: context.to_string(),
                action: action.to_string(),
                outcome: outcome.to_string(),
                success,
                timestamp: now,
                turn: self.turn,
                confidence: if success { 0.7 } else { 0.5 },
                cluster,
                keywords,
                access_count: 0,
                last_access: now,
                last_access_turn: None,
            },
        );

        while self.records.len() > self.cfg.capacity {
            if !self.evict_one(now) {
                break;
            }
        }
        self.maintenance_at(now);
        id
    }

    fn assign_cluster(&mut self, keywords: &[String]) -> u32 {
        let best = self
            .clusters
            .values()
            .map(|c| (c.id, jaccard(keywords, &c.keywords)))
            .filter(|(_, s)| *s >= self.cfg.cluster_similarity)
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)));

        if let Some((id, _)) = best {
            let limit = self.cfg.cluster_keyword_limit;
            if let Some(c) = self.clusters.get_mut(&id) {
                for k in keywords {
                    if c.keywords.len() >= limit {
                        break;
                    }
                    if !c.keywords.contains(k) {
                        c.keywords.push(k.clone());
                    }
                }
            }
            return id;
        }

        let id = self.next_cluster;
        self.next_cluster += 1;
        self.clusters.insert(
            id,
            ExperienceCluster {
                id,
                keywords: keywords.to_vec(),
                members: Vec::new(),
                successes: 0,
            },
        );
        id
    }

    /// Higher is more worth keeping.
    fn retention(&self, r: &ExperienceRecord, now: f64) -> f32 {
        let usage = self.cfg.usage_bonus * (1.0 + r.access_count as f32).ln();
        let success = if r.success { self.cfg.success_bonus } else { 0.0 };
        let hours = ((now - r.timestamp).max(0.0) / 3600.0) as f32;
        let turns = self.turn.saturating_sub(r.turn) as f32;
        let age = self.cfg.age_penalty_per_turn * turns + self.cfg.age_penalty_per_hour * hours;
        usage + success - age
    }

    fn evict_one(&mut self, now: f64) -> bool {
        let victim = self
            .records
            .values()
            .map(|r| (r.id, self.retention(r, now)))
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(id, _)| id);
        let Some(id) = victim else {
            return false;
        };
        let Some(r) = self.records.remove(&id) else {
            return false;
        };
        if let Some(c) = self.clusters.get_mut(&r.cluster) {
            c.members.retain(|m| *m != id);
            if r.success {
                c.successes = c.successes.saturating_sub(1);
            }
        }
        self.evictions += 1;
        debug!(id, context = %r.context, "evicted experience");
        true
    }

    fn score(&self, query: &[String], r: &ExperienceRecord, now: f64) -> Option<Precedent> {
        let overlap = jaccard(query, &r.keywords);
        if overlap <= 0.0 {
            return None;
        }

        // Rare shared words count up to double.
        let shared: Vec<&String> = r.keywords.iter().filter(|k| query.contains(k)).collect();
        let rarity = if shared.is_empty() {
            1.0
        } else {
            shared
                .iter()
                .map(|k| {
                    let freq = self.keyword_freq.get(*k).map(|s| s.count).unwrap_or(1).max(1);
                    1.0 + 1.0 / (1.0 + (freq as f32).ln())
                })
                .sum::<f32>()
                / shared.len() as f32
        };
        let contextual = (overlap * rarity).min(1.0);

        let age_secs = (now - r.timestamp).max(0.0);
        let age_turns = self.turn.saturating_sub(r.turn) as f64;
        let temporal = (0.5 * (-age_secs / self.cfg.time_scale_secs).exp()
            + 0.5 * (-age_turns / self.cfg.turn_scale).exp()) as f32;

        let cluster_quality = self
            .clusters
            .get(&r.cluster)
            .map(|c| c.quality())
            .unwrap_or(0.0);

        let relevance = self.cfg.contextual_weight * contextual
            + self.cfg.temporal_weight * temporal
            + self.cfg.cluster_weight * cluster_quality;

        Some(Precedent {
            record: r.clone(),
            relevance,
            contextual,
            temporal,
            cluster_quality,
        })
    }

    fn query(
        &mut self,
        text: &str,
        now: f64,
        threshold: f32,
        filter: impl Fn(&ExperienceRecord) -> bool,
    ) -> Vec<Precedent> {
        let q = extract(text, self.cfg.keywords_per_record);
        if q.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<Precedent> = self
            .records
            .values()
            .filter(|r| filter(*r))
            .filter_map(|r| self.score(&q, r, now))
            .filter(|p| p.relevance >= threshold)
            .collect();
        hits.sort_by(|a, b| {
            b.relevance
                .total_cmp(&a.relevance)
                .then(a.record.id.cmp(&b.record.id))
        });
        hits.truncate(self.cfg.top_n);

        let turn = self.turn;
        for p in &hits {
            if let Some(r) = self.records.get_mut(&p.record.id) {
                if r.last_access_turn != Some(turn) {
                    r.access_count += 1;
                    r.last_access_turn = Some(turn);
                }
                r.last_access = now;
            }
        }
        hits
    }

    pub fn relevant(&mut self, query: &str) -> Vec<Precedent> {
        let now = self.now();
        self.relevant_at(query, now)
    }

    /// Top matches for `query`, best first.
    pub fn relevant_at(&mut self, query: &str, now: f64) -> Vec<Precedent> {
        self.maintenance_at(now);
        let threshold = self.cfg.min_relevance;
        self.query(query, now, threshold, |_| true)
    }

    pub fn failure_warnings(&mut self, query: &str, action: Option<&str>) -> Vec<Precedent> {
        let now = self.now();
        self.failure_warnings_at(query, action, now)
    }

    /// Past failures that look like `query`, optionally for one action only.
    /// Uses a stricter threshold than [`relevant_at`](Self::relevant_at).
    pub fn failure_warnings_at(
        &mut self,
        query: &str,
        action: Option<&str>,
        now: f64,
    ) -> Vec<Precedent> {
        let threshold = self.cfg.failure_threshold;
        self.query(query, now, threshold, |r| {
            !r.success && action.map(|a| r.action == a).unwrap_or(true)
        })
    }

    pub fn maintenance(&mut self) -> bool {
        let now = self.now();
        self.maintenance_at(now)
    }

    /// Drop empty clusters and stale rare keywords, at most once per
    /// maintenance interval. Returns whether a pass ran.
    pub fn maintenance_at(&mut self, now: f64) -> bool {
        if now - self.last_maintenance < self.cfg.maintenance_interval_secs {
            return false;
        }
        self.last_maintenance = now;

        let before = self.clusters.len();
        self.clusters.retain(|_, c| !c.members.is_empty());

        let turn = self.turn;
        let min = self.cfg.min_keyword_count;
        let stale = self.cfg.keyword_stale_turns;
        let kw_before = self.keyword_freq.len();
        self.keyword_freq
            .retain(|_, s| s.count >= min || turn.saturating_sub(s.last_turn) <= stale);

        debug!(
            clusters_dropped = before - self.clusters.len(),
            keywords_dropped = kw_before - self.keyword_freq.len(),
            "memory maintenance"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> AssociativeMemory {
        AssociativeMemory::new(MemoryConfig::default())
    }

    #[test]
    fn recalls_matching_experience() {
        let mut m = memory();
        let id = m.remember_at("key press near door", "space", "door opened", true, 0.0);
        let hits = m.relevant_at("door key", 1.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, id);
        assert!(hits[0].relevance > 0.5, "relevance {}", hits[0].relevance);
        assert_eq!(m.record(id).unwrap().access_count, 1);
    }

    #[test]
    fn usage_counts_once_per_turn() {
        let mut m = memory();
        m.advance_turn(1);
        let id = m.remember_at("key press near door", "space", "door blocked", false, 0.0);
        m.advance_turn(2);
        assert_eq!(m.relevant_at("door key", 1.0).len(), 1);
        assert_eq!(m.failure_warnings_at("door key", None, 1.5).len(), 1);
        assert_eq!(m.record(id).unwrap().access_count, 1);
        assert_eq!(m.record(id).unwrap().last_access, 1.5);

        m.advance_turn(3);
        m.relevant_at("door key", 2.0);
        assert_eq!(m.record(id).unwrap().access_count, 2);
    }

    #[test]
    fn unrelated_query_finds_nothing() {
        let mut m = memory();
        m.remember_at("key press near door", "space", "door opened", true, 0.0);
        assert!(m.relevant_at("red wall corridor", 1.0).is_empty());
        assert!(m.relevant_at("", 1.0).is_empty());
    }

    #[test]
    fn similar_contexts_share_a_cluster() {
        let mut m = memory();
        let a = m.remember_at("blue block top left corner", "up", "moved", true, 0.0);
        let b = m.remember_at("blue block top corner", "down", "moved", true, 1.0);
        let c = m.remember_at("yellow switch center", "click", "toggled", false, 2.0);
        let ca = m.record(a).unwrap().cluster;
        assert_eq!(ca, m.record(b).unwrap().cluster);
        assert_ne!(ca, m.record(c).unwrap().cluster);
        assert_eq!(m.cluster_count(), 2);
        assert_eq!(m.cluster(ca).unwrap().success_rate(), 1.0);
    }

    #[test]
    fn capacity_evicts_lowest_retention() {
        let mut cfg = MemoryConfig::default();
        cfg.capacity = 3;
        let mut m = AssociativeMemory::new(cfg);
        let failed = m.remember_at("grey maze start", "left", "blocked", false, 0.0);
        let kept = m.remember_at("grey maze exit", "right", "moved", true, 1.0);
        m.remember_at("grey maze middle", "up", "moved", true, 2.0);
        m.remember_at("grey maze corner", "down", "moved", true, 3.0);
        assert_eq!(m.len(), 3);
        assert!(m.record(failed).is_none(), "failed record should go first");
        assert!(m.record(kept).is_some());
        assert_eq!(m.stats().evictions, 1);
    }

    #[test]
    fn failure_warnings_only_return_failures() {
        let mut m = memory();
        m.remember_at("lava tile below player", "down", "game over", false, 0.0);
        m.remember_at("lava tile beside player", "left", "moved safely", true, 0.0);
        let warn = m.failure_warnings_at("player above lava tile", None, 1.0);
        assert_eq!(warn.len(), 1);
        assert!(!warn[0].record.success);

        let other = m.failure_warnings_at("player above lava tile", Some("up"), 1.0);
        assert!(other.is_empty());
    }

    #[test]
    fn recency_raises_relevance() {
        let mut m = memory();
        let old = m.remember_at("green gem pickup", "click", "gem collected", true, 0.0);
        m.advance_turn(40);
        let new = m.remember_at("green gem pickup", "click", "gem collected", true, 3000.0);
        let hits = m.relevant_at("green gem", 3001.0);
        assert_eq!(hits[0].record.id, new);
        assert_eq!(hits[1].record.id, old);
        assert!(hits[0].temporal > hits[1].temporal);
    }

    #[test]
    fn maintenance_is_time_boxed() {
        let mut m = memory();
        m.remember_at("alpha beta gamma", "up", "moved", true, 0.0);
        assert!(!m.maintenance_at(100.0));
        assert!(m.maintenance_at(400.0));
        assert!(!m.maintenance_at(500.0));
    }

    #[test]
    fn per_action_success_history() {
        let mut m = memory();
        m.remember_at("door", "space", "opened", true, 0.0);
        m.remember_at("door closed", "space", "nothing", false, 0.0);
        assert_eq!(m.action_success_rate("space"), Some(0.5));
        assert_eq!(m.action_success_rate("up"), None);
        assert_eq!(m.action_stats("space").unwrap().attempts, 2);
    }
}
