//! # Execution Plan Generation
//!
//! Turns a list of candidate networks into an ordered list of assignments,
//! computing join sub-expressions shared by several networks only once.
//!
//! ## Algorithm
//!
//! 1. **Validate**: resolve every join of every network; networks the
//!    [`Joiner`] cannot connect are excluded and reported
//! 2. **Size 0**: single tuple set networks become assignments directly
//! 3. **Rounds**: take the most frequent one-join pair across the remaining
//!    networks ([`SubExpressionOccurrenceMap`]), contract every occurrence,
//!    and emit one assignment for it, tagged so later pairs can reference it
//!    - a network contracted to a single node yields a candidate network
//!      assignment, which then also serves as the shared result
//!    - otherwise the pair becomes an intermediate result assignment
//! 4. **Victimization**: inline intermediate results with a single reader or
//!    a free/free pairing
//!
//! ## Example
//!
//! ```text
//! CN0: author^{alice} - writes^{} - paper^{xml}
//! CN1: author^{alice} - writes^{} - paper^{}  - ...
//!
//! T0 := author^{alice} ⋈ writes^{}         intermediate result
//! T1 := T0 ⋈ paper^{xml}                   candidate network 0
//! ```
//!
//! Substituting every reference in a candidate network assignment by its
//! definition ([`ExecutionPlan::expand`]) rebuilds the original network.

mod occurrence;
mod victimization;

pub use occurrence::SubExpressionOccurrenceMap;

use crate::config::PlannerConfig;
use crate::error::{SearchError, SearchResult};
use crate::expression::{AssignmentId, JoinableExpression, JoinablePair};
use crate::jnts::{CandidateNetwork, Jnts, NodeId};
use crate::joiner::{JoinCondition, Joiner};
use crate::tuple_set::TupleSetGraph;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What an assignment materializes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    /// One final candidate network
    CandidateNetwork,
    /// A pair shared by several networks
    IntermediateResult,
}

impl fmt::Display for AssignmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentKind::CandidateNetwork => write!(f, "CN"),
            AssignmentKind::IntermediateResult => write!(f, "IR"),
        }
    }
}

/// One step of an execution plan
#[derive(Debug, Clone)]
pub struct Assignment {
    id: AssignmentId,
    kind: AssignmentKind,
    expression: JoinableExpression,
    /// Index of the candidate network this assignment produces
    network: Option<usize>,
    joins: Vec<JoinCondition>,
}

impl Assignment {
    pub fn candidate_network(id: AssignmentId, expression: JoinableExpression, network: usize) -> Self {
        Assignment {
            id,
            kind: AssignmentKind::CandidateNetwork,
            expression,
            network: Some(network),
            joins: Vec::new(),
        }
    }

    pub fn intermediate_result(id: AssignmentId, expression: JoinableExpression) -> Self {
        Assignment {
            id,
            kind: AssignmentKind::IntermediateResult,
            expression,
            network: None,
            joins: Vec::new(),
        }
    }

    pub fn id(&self) -> AssignmentId {
        self.id
    }

    pub fn kind(&self) -> AssignmentKind {
        self.kind
    }

    pub fn is_intermediate_result(&self) -> bool {
        self.kind == AssignmentKind::IntermediateResult
    }

    pub fn expression(&self) -> &JoinableExpression {
        &self.expression
    }

    /// Candidate network produced, for candidate network assignments
    pub fn network(&self) -> Option<usize> {
        self.network
    }

    /// Join conditions of the pairs this assignment evaluates itself, innermost first
    pub fn joins(&self) -> &[JoinCondition] {
        &self.joins
    }

    /// The pair this assignment materializes, if its expression is one
    pub fn definition(&self) -> Option<&Arc<JoinablePair>> {
        self.expression
            .as_pair()
            .filter(|p| p.materialized_by() == Some(self.id))
    }

    /// Earlier assignments read by this one
    pub fn references(&self) -> Vec<AssignmentId> {
        match self.definition() {
            Some(pair) => pair.references(),
            None => self.expression.references(),
        }
    }

    /// `T3 := T1 ⋈ author^{bob}`
    pub fn abbreviation(&self) -> String {
        let body = match self.definition() {
            Some(pair) => format!("{} ⋈ {}", pair.left().key(), pair.right().key()),
            None => self.expression.key(),
        };
        format!("{} := {}", self.id, body)
    }

    fn inline_reference(&mut self, id: AssignmentId, definition: &JoinablePair) {
        self.expression = match self.definition() {
            Some(pair) => JoinableExpression::pair(pair.inline_reference(id, definition)),
            None => self.expression.inline_reference(id, definition),
        };
    }

    /// Pairs evaluated by this assignment, stopping at other assignments' results
    fn owned_pairs(&self) -> Vec<Arc<JoinablePair>> {
        fn walk(expression: &JoinableExpression, own: AssignmentId, out: &mut Vec<Arc<JoinablePair>>) {
            let JoinableExpression::Pair(pair) = expression else {
                return;
            };
            if pair.materialized_by().is_some_and(|tag| tag != own) {
                return;
            }
            walk(pair.left(), own, out);
            walk(pair.right(), own, out);
            out.push(Arc::clone(pair));
        }

        let mut out = Vec::new();
        walk(&self.expression, self.id, &mut out);
        out
    }
}

/// A candidate network excluded from the plan
#[derive(Debug)]
pub struct RejectedNetwork {
    pub network: usize,
    pub error: SearchError,
}

/// Counters for one planning run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanStats {
    pub candidate_network_assignments: usize,
    pub intermediate_results: usize,
    /// Intermediate results removed by victimization
    pub victimized: usize,
    pub rejected_networks: usize,
    /// Sharing rounds run
    pub rounds: usize,
}

impl PlanStats {
    pub fn rows(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("candidate_network_assignments", self.candidate_network_assignments),
            ("intermediate_result_assignments", self.intermediate_results),
            ("intermediate_results_victimized", self.victimized),
            ("networks_rejected", self.rejected_networks),
            ("sharing_rounds", self.rounds),
        ]
    }
}

/// Ordered assignments; every reference points to an earlier assignment
#[derive(Debug, Default)]
pub struct ExecutionPlan {
    assignments: Vec<Assignment>,
    networks: Vec<CandidateNetwork>,
    rejected: Vec<RejectedNetwork>,
    stats: PlanStats,
}

impl ExecutionPlan {
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn assignment(&self, id: AssignmentId) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.id == id)
    }

    pub fn candidate_networks(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.iter().filter(|a| !a.is_intermediate_result())
    }

    pub fn intermediate_results(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.iter().filter(|a| a.is_intermediate_result())
    }

    /// The candidate networks the plan was built from, in input order
    pub fn networks(&self) -> &[CandidateNetwork] {
        &self.networks
    }

    pub fn rejected(&self) -> &[RejectedNetwork] {
        &self.rejected
    }

    pub fn stats(&self) -> &PlanStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Expression of assignment `id` with every reference replaced by its
    /// definition, recursively
    pub fn expand(&self, id: AssignmentId) -> Option<JoinableExpression> {
        let assignment = self.assignment(id)?;
        Some(self.substitute(&assignment.expression))
    }

    fn substitute(&self, expression: &JoinableExpression) -> JoinableExpression {
        match expression {
            JoinableExpression::TupleSet(_) => expression.clone(),
            JoinableExpression::Pair(pair) => {
                let body = pair
                    .materialized_by()
                    .and_then(|tag| self.assignment(tag))
                    .and_then(Assignment::definition)
                    .unwrap_or(pair);
                JoinableExpression::pair(JoinablePair::new(
                    self.substitute(body.left()),
                    self.substitute(body.right()),
                    Arc::clone(body.left_anchor()),
                    Arc::clone(body.right_anchor()),
                )
                .with_anchor_occurrences(body.left_occurrence(), body.right_occurrence()))
            }
        }
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for assignment in &self.assignments {
            match assignment.network {
                Some(network) => writeln!(f, "{}    -- CN {}", assignment.abbreviation(), network)?,
                None => writeln!(f, "{}    -- IR", assignment.abbreviation())?,
            }
        }
        Ok(())
    }
}

/// Edges (by child node) touching `node`, plus those below `absorbed`
fn incident_edges(jnts: &Jnts, node: NodeId, absorbed: Option<NodeId>) -> Vec<NodeId> {
    let mut edges = Vec::new();
    if let Some(n) = jnts.node(node) {
        if n.parent().is_some() {
            edges.push(node);
        }
        edges.extend_from_slice(n.children());
    }
    if let Some(n) = absorbed.and_then(|a| jnts.node(a)) {
        edges.extend_from_slice(n.children());
    }
    edges
}

fn find_occurrence(jnts: &Jnts, definition: &str) -> Option<NodeId> {
    jnts.edges()
        .into_iter()
        .map(|(_, child)| child)
        .find(|&child| jnts.pair_at(child).is_some_and(|p| p.definition() == definition))
}

/// Contract `child` into its parent, keeping `occurrences` in step
fn contract_tracked(
    jnts: &mut Jnts,
    child: NodeId,
    tag: AssignmentId,
    slot: usize,
    occurrences: &mut SubExpressionOccurrenceMap,
) -> Option<Arc<JoinablePair>> {
    let parent = jnts.node(child)?.parent()?;
    for edge in incident_edges(jnts, parent, Some(child)) {
        if let Some(pair) = jnts.pair_at(edge) {
            occurrences.remove(pair.definition(), slot);
        }
    }
    let merged = jnts.contract(child, tag)?;
    for edge in incident_edges(jnts, parent, None) {
        if let Some(pair) = jnts.pair_at(edge) {
            occurrences.add(pair.definition(), slot);
        }
    }
    Some(merged)
}

/// Greedy shared sub-expression planner
#[derive(Debug, Clone)]
pub struct PlanGenerator {
    enable_victimization: bool,
    joiner: Joiner,
}

impl Default for PlanGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanGenerator {
    pub fn new() -> Self {
        PlanGenerator {
            enable_victimization: true,
            joiner: Joiner::new(),
        }
    }

    pub fn from_config(config: &PlannerConfig) -> Self {
        PlanGenerator {
            enable_victimization: config.enable_victimization,
            joiner: Joiner::new(),
        }
    }

    pub fn with_victimization(mut self, enabled: bool) -> Self {
        self.enable_victimization = enabled;
        self
    }

    fn validate(&self, network: &CandidateNetwork, graph: &dyn TupleSetGraph) -> SearchResult<()> {
        for (_, child) in network.edges() {
            if let Some(pair) = network.pair_at(child) {
                self.joiner.resolve_pair(&pair, graph)?;
            }
        }
        Ok(())
    }

    /// Build the execution plan for `networks`
    pub fn plan(&self, networks: &[CandidateNetwork], graph: &dyn TupleSetGraph) -> SearchResult<ExecutionPlan> {
        let mut rejected = Vec::new();
        // (input index, working copy)
        let mut working: Vec<(usize, Jnts)> = Vec::new();
        for (index, network) in networks.iter().enumerate() {
            match self.validate(network, graph) {
                Ok(()) => working.push((index, network.clone())),
                Err(error) => {
                    warn!(network = index, cn = %network, error = %error, "cn_rejected_from_plan");
                    rejected.push(RejectedNetwork {
                        network: index,
                        error,
                    });
                }
            }
        }

        let mut assignments = Vec::new();
        let mut next_id = 0usize;
        let mut occurrences = SubExpressionOccurrenceMap::new();

        for (slot, (index, jnts)) in working.iter().enumerate() {
            if jnts.size() == 0 {
                assignments.push(Assignment::candidate_network(
                    AssignmentId(next_id),
                    jnts.root_expression().clone(),
                    *index,
                ));
                next_id += 1;
                continue;
            }
            for (_, child) in jnts.edges() {
                if let Some(pair) = jnts.pair_at(child) {
                    occurrences.add(pair.definition(), slot);
                }
            }
        }

        let mut rounds = 0usize;
        while let Some((definition, count)) = occurrences.most_frequent() {
            let definition = definition.to_string();
            let tag = AssignmentId(next_id);
            next_id += 1;
            rounds += 1;

            let mut shared: Option<Arc<JoinablePair>> = None;
            let mut covered = Vec::new();
            for slot in occurrences.networks(&definition) {
                let jnts = &mut working[slot].1;
                while let Some(child) = find_occurrence(jnts, &definition) {
                    let Some(merged) = contract_tracked(jnts, child, tag, slot, &mut occurrences) else {
                        break;
                    };
                    shared.get_or_insert(merged);
                }
                if jnts.size() == 0 {
                    covered.push(slot);
                }
            }
            let Some(shared) = shared else {
                break;
            };
            debug!(
                assignment = %tag,
                pair = %definition,
                occurrences = count,
                covered = covered.len(),
                "shared_pair_selected"
            );

            if covered.is_empty() {
                assignments.push(Assignment::intermediate_result(
                    tag,
                    JoinableExpression::Pair(shared),
                ));
                continue;
            }
            for (i, slot) in covered.into_iter().enumerate() {
                let id = if i == 0 {
                    tag
                } else {
                    next_id += 1;
                    AssignmentId(next_id - 1)
                };
                let (index, jnts) = &working[slot];
                assignments.push(Assignment::candidate_network(
                    id,
                    jnts.root_expression().clone(),
                    *index,
                ));
            }
        }

        let victimized = if self.enable_victimization {
            victimization::victimize(&mut assignments)
        } else {
            0
        };

        for assignment in &mut assignments {
            assignment.joins = assignment
                .owned_pairs()
                .iter()
                .map(|pair| self.joiner.resolve_pair(pair, graph))
                .collect::<SearchResult<Vec<_>>>()?;
        }

        let intermediate_results = assignments.iter().filter(|a| a.is_intermediate_result()).count();
        let stats = PlanStats {
            candidate_network_assignments: assignments.len() - intermediate_results,
            intermediate_results,
            victimized,
            rejected_networks: rejected.len(),
            rounds,
        };
        info!(
            assignments = assignments.len(),
            candidate_networks = stats.candidate_network_assignments,
            intermediate_results = stats.intermediate_results,
            victimized = stats.victimized,
            rejected = stats.rejected_networks,
            rounds = stats.rounds,
            "execution_plan_complete"
        );

        Ok(ExecutionPlan {
            assignments,
            networks: networks.to_vec(),
            rejected,
            stats,
        })
    }
}
