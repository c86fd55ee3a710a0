//! # Candidate Network Generation
//!
//! Enumerates every minimal, non-redundant joining network of tuple sets that
//! covers the query keywords, up to a maximum number of joins.
//!
//! ## Algorithm
//!
//! 1. **Seed**: one single-node network per tuple set containing the scarcest
//!    keyword (fewest tuple sets; ties go to the earlier keyword)
//! 2. **Pop** a network from the [`UniqueNetworkQueue`]
//!    - pruned shape (`R → S ← R`): discard
//!    - covers the required keywords with no free leaf: accept
//!    - otherwise expand: attach every admissible adjacent tuple set at every node
//! 3. **Enqueue** each expansion within the size bound and the free-leaf
//!    budget, unless an equal network was admitted before
//!
//! The loop ends when the worklist is empty. Stopping earlier leaves the
//! accepted list valid for everything generated so far.
//!
//! ## Parallel expansion
//!
//! With `parallel` set, the worklist is drained in waves and each wave is
//! expanded on a rayon pool. Workers admit their expansions through the shared
//! queue; the accepted set equals the sequential one, only order may differ.

mod queue;

pub use queue::UniqueNetworkQueue;

use crate::config::SearchConfig;
use crate::error::{SearchError, SearchResult};
use crate::jnts::{CandidateNetwork, Jnts};
use crate::tuple_set::{Keywords, TupleSet, TupleSetGraph};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// How many of the query keywords an accepted network must contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageMode {
    /// Every keyword (AND semantics)
    #[default]
    All,
    /// At least this many distinct keywords
    AtLeast(usize),
}

impl CoverageMode {
    /// Number of distinct keywords required out of `keyword_count`
    pub fn required(self, keyword_count: usize) -> SearchResult<usize> {
        match self {
            CoverageMode::All => Ok(keyword_count),
            CoverageMode::AtLeast(0) => Err(SearchError::invalid_argument(
                "coverage",
                "at_least must be >= 1",
            )),
            CoverageMode::AtLeast(n) if n > keyword_count => Err(SearchError::invalid_argument(
                "coverage",
                format!("at_least {n} exceeds the {keyword_count} query keywords"),
            )),
            CoverageMode::AtLeast(n) => Ok(n),
        }
    }
}

/// Counters for one generation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    /// Networks popped from the worklist
    pub considered: usize,
    /// Expansions discarded because an equal network was already admitted
    pub duplicates: usize,
    /// Networks discarded by the pruning condition
    pub pruned: usize,
    /// Networks emitted as candidate networks
    pub accepted: usize,
}

impl GeneratorStats {
    pub fn rows(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("networks_considered", self.considered),
            ("networks_duplicate", self.duplicates),
            ("networks_pruned", self.pruned),
            ("networks_accepted", self.accepted),
        ]
    }
}

enum Step {
    Pruned,
    Accepted(Jnts),
    Expanded,
}

/// Per-run limits shared by every expansion
struct Expansion<'a> {
    graph: &'a dyn TupleSetGraph,
    required: usize,
    max_size: usize,
}

impl Expansion<'_> {
    fn is_accepted(&self, jnts: &Jnts) -> bool {
        jnts.covered_keyword_count() >= self.required && jnts.free_leaf_count() == 0
    }

    fn step(&self, jnts: Jnts, queue: &UniqueNetworkQueue) -> Step {
        if jnts.violates_pruning() {
            return Step::Pruned;
        }
        if self.is_accepted(&jnts) {
            return Step::Accepted(jnts);
        }
        if jnts.size() < self.max_size {
            for id in jnts.node_ids() {
                let Some(at) = jnts.node(id).and_then(|n| n.tuple_set()) else {
                    continue;
                };
                for candidate in self.graph.adjacent_tuple_sets(at) {
                    if !jnts.admits(&candidate) {
                        continue;
                    }
                    let next = jnts.expand(id, candidate, self.graph);
                    if next.within_leaf_budget(self.required) {
                        queue.try_enqueue(next);
                    }
                }
            }
        }
        Step::Expanded
    }
}

/// Worklist-driven candidate network enumerator
#[derive(Debug, Clone, Default)]
pub struct CandidateNetworkGenerator {
    coverage: CoverageMode,
    parallel: bool,
    /// Worker threads for parallel expansion, 0 = all cores
    num_threads: usize,
    stats: GeneratorStats,
}

impl CandidateNetworkGenerator {
    /// Sequential generator requiring every keyword
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        CandidateNetworkGenerator {
            coverage: config.coverage,
            parallel: config.parallel_expansion,
            num_threads: config.num_threads,
            stats: GeneratorStats::default(),
        }
    }

    pub fn with_coverage(mut self, coverage: CoverageMode) -> Self {
        self.coverage = coverage;
        self
    }

    pub fn with_parallelism(mut self, num_threads: usize) -> Self {
        self.parallel = true;
        self.num_threads = num_threads;
        self
    }

    pub fn coverage(&self) -> CoverageMode {
        self.coverage
    }

    /// Counters of the last run
    pub fn stats(&self) -> &GeneratorStats {
        &self.stats
    }

    /// Generate every candidate network for `keywords`.
    ///
    /// `tuple_sets` only seeds the search; expansion follows `graph`.
    pub fn generate(
        &mut self,
        tuple_sets: &[Arc<TupleSet>],
        graph: &dyn TupleSetGraph,
        keywords: &Keywords,
        max_network_size: i64,
    ) -> SearchResult<Vec<CandidateNetwork>> {
        self.stats = GeneratorStats::default();

        let max_size = usize::try_from(max_network_size).map_err(|_| {
            SearchError::invalid_argument(
                "max_network_size",
                format!("must be >= 0, got {max_network_size}"),
            )
        })?;
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let required = self.coverage.required(keywords.len())?;

        let queue = UniqueNetworkQueue::new();
        for seed in self.seeds(tuple_sets, keywords) {
            queue.try_enqueue(Jnts::new(seed));
        }
        debug!(
            seeds = queue.len(),
            keywords = keywords.len(),
            required,
            max_size,
            "cn_generation_seeded"
        );

        let expansion = Expansion {
            graph,
            required,
            max_size,
        };
        let accepted = if self.parallel {
            self.run_parallel(&expansion, &queue)?
        } else {
            self.run_sequential(&expansion, &queue)
        };

        self.stats.duplicates = queue.duplicates();
        self.stats.accepted = accepted.len();
        info!(
            considered = self.stats.considered,
            duplicates = self.stats.duplicates,
            pruned = self.stats.pruned,
            accepted = self.stats.accepted,
            parallel = self.parallel,
            "cn_generation_complete"
        );
        Ok(accepted)
    }

    fn seeds(&self, tuple_sets: &[Arc<TupleSet>], keywords: &Keywords) -> Vec<Arc<TupleSet>> {
        match self.coverage {
            CoverageMode::All => {
                let containing = |k: &str| {
                    tuple_sets
                        .iter()
                        .filter(|ts| ts.contains_keyword(k))
                        .count()
                };
                // min_by_key keeps the first of equal minima
                let Some(scarcest) = keywords.iter().min_by_key(|k| containing(k)) else {
                    return Vec::new();
                };
                tuple_sets
                    .iter()
                    .filter(|ts| ts.contains_keyword(scarcest))
                    .cloned()
                    .collect()
            }
            CoverageMode::AtLeast(_) => tuple_sets
                .iter()
                .filter(|ts| ts.keywords().iter().any(|k| keywords.contains(k)))
                .cloned()
                .collect(),
        }
    }

    fn tally(&mut self, step: Step, accepted: &mut Vec<CandidateNetwork>) {
        self.stats.considered += 1;
        match step {
            Step::Pruned => self.stats.pruned += 1,
            Step::Accepted(jnts) => accepted.push(jnts),
            Step::Expanded => {}
        }
    }

    fn run_sequential(&mut self, expansion: &Expansion<'_>, queue: &UniqueNetworkQueue) -> Vec<CandidateNetwork> {
        let mut accepted = Vec::new();
        while let Some(jnts) = queue.pop() {
            let step = expansion.step(jnts, queue);
            self.tally(step, &mut accepted);
        }
        accepted
    }

    fn run_parallel(
        &mut self,
        expansion: &Expansion<'_>,
        queue: &UniqueNetworkQueue,
    ) -> SearchResult<Vec<CandidateNetwork>> {
        let threads = if self.num_threads == 0 {
            num_cpus::get()
        } else {
            self.num_threads
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("kwsearch-expand-{idx}"))
            .build()?;

        let mut accepted = Vec::new();
        let mut wave_index = 0usize;
        loop {
            let wave = queue.drain();
            if wave.is_empty() {
                break;
            }
            debug!(wave = wave_index, networks = wave.len(), "cn_expansion_wave");
            let steps: Vec<Step> = pool.install(|| {
                wave.into_par_iter()
                    .map(|jnts| expansion.step(jnts, queue))
                    .collect()
            });
            for step in steps {
                self.tally(step, &mut accepted);
            }
            wave_index += 1;
        }
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple_set::{ForeignKey, SchemaGraph};

    /// author ← writes → paper
    fn bibliography(keyword_sets: &[(&str, &[&str])]) -> SchemaGraph {
        let mut graph = SchemaGraph::new();
        for r in ["author", "writes", "paper"] {
            graph.add_relation(r);
        }
        graph
            .add_foreign_key(ForeignKey::new("writes", "author_id", "author", "id"))
            .unwrap();
        graph
            .add_foreign_key(ForeignKey::new("writes", "paper_id", "paper", "id"))
            .unwrap();
        for (relation, keywords) in keyword_sets {
            graph
                .add_tuple_set(TupleSet::new(*relation, keywords.iter().copied()))
                .unwrap();
        }
        graph
    }

    fn signatures(cns: &[CandidateNetwork]) -> Vec<String> {
        let mut sigs: Vec<String> = cns.iter().map(|cn| cn.signature().to_string()).collect();
        sigs.sort();
        sigs
    }

    #[test]
    fn test_author_writes_paper() {
        let graph = bibliography(&[("author", &["alice"]), ("paper", &["xml"])]);
        let mut generator = CandidateNetworkGenerator::new();
        let cns = generator
            .generate(
                &graph.keyword_tuple_sets(),
                &graph,
                &Keywords::new(["alice", "xml"]),
                4,
            )
            .unwrap();

        assert_eq!(
            signatures(&cns),
            vec!["writes^{}(author^{alice}|paper^{xml})"]
        );
        assert_eq!(generator.stats().accepted, 1);
    }

    #[test]
    fn test_size_bound_applies() {
        let graph = bibliography(&[("author", &["alice"]), ("paper", &["xml"])]);
        let mut generator = CandidateNetworkGenerator::new();
        let cns = generator
            .generate(
                &graph.keyword_tuple_sets(),
                &graph,
                &Keywords::new(["alice", "xml"]),
                1,
            )
            .unwrap();
        assert!(cns.is_empty());
    }

    #[test]
    fn test_empty_keywords_is_empty_result() {
        let graph = bibliography(&[("author", &["alice"])]);
        let cns = CandidateNetworkGenerator::new()
            .generate(&graph.keyword_tuple_sets(), &graph, &Keywords::default(), 3)
            .unwrap();
        assert!(cns.is_empty());
    }

    #[test]
    fn test_negative_size_rejected() {
        let graph = bibliography(&[("author", &["alice"])]);
        let err = CandidateNetworkGenerator::new()
            .generate(&graph.keyword_tuple_sets(), &graph, &Keywords::new(["alice"]), -1)
            .unwrap_err();
        assert!(matches!(
            err,
            SearchError::InvalidArgument { name: "max_network_size", .. }
        ));
    }

    #[test]
    fn test_negative_size_rejected_before_empty_check() {
        let graph = bibliography(&[]);
        let result =
            CandidateNetworkGenerator::new().generate(&[], &graph, &Keywords::default(), -3);
        assert!(result.is_err());
    }

    #[test]
    fn test_coverage_validation() {
        assert!(CoverageMode::AtLeast(0).required(2).is_err());
        assert!(CoverageMode::AtLeast(3).required(2).is_err());
        assert_eq!(CoverageMode::AtLeast(1).required(2).unwrap(), 1);
        assert_eq!(CoverageMode::All.required(2).unwrap(), 2);
    }

    #[test]
    fn test_at_least_one_accepts_single_tuple_sets() {
        let graph = bibliography(&[("author", &["alice"]), ("paper", &["xml"])]);
        let mut generator =
            CandidateNetworkGenerator::new().with_coverage(CoverageMode::AtLeast(1));
        let cns = generator
            .generate(
                &graph.keyword_tuple_sets(),
                &graph,
                &Keywords::new(["alice", "xml"]),
                4,
            )
            .unwrap();
        assert_eq!(signatures(&cns), vec!["author^{alice}", "paper^{xml}"]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let graph = bibliography(&[
            ("author", &["alice"]),
            ("author", &["bob"]),
            ("paper", &["xml"]),
            ("paper", &["alice"]),
        ]);
        let keywords = Keywords::new(["alice", "xml"]);
        let seeds = graph.keyword_tuple_sets();

        let sequential = CandidateNetworkGenerator::new()
            .generate(&seeds, &graph, &keywords, 4)
            .unwrap();
        let parallel = CandidateNetworkGenerator::new()
            .with_parallelism(2)
            .generate(&seeds, &graph, &keywords, 4)
            .unwrap();
        assert_eq!(signatures(&sequential), signatures(&parallel));
    }

    #[test]
    fn test_stats_rows() {
        let stats = GeneratorStats {
            considered: 5,
            duplicates: 1,
            pruned: 2,
            accepted: 1,
        };
        let rows = stats.rows();
        assert_eq!(rows[0], ("networks_considered", 5));
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn test_coverage_serde() {
        let all: CoverageMode = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(all, CoverageMode::All);
        let at_least: CoverageMode = serde_json::from_str(r#"{"at_least": 2}"#).unwrap();
        assert_eq!(at_least, CoverageMode::AtLeast(2));
    }
}
