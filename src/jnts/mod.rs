//! # Joining Networks of Tuple Sets
//!
//! A JNTS is a tree of tuple sets where every parent/child pair is a schema
//! adjacency. Nodes live in an arena and address each other by index, so
//! expanding copies the arena and contracting two nodes only rewires indices.
//!
//! ## Bookkeeping
//!
//! Each tree carries aggregates that are updated on every attach or
//! contraction, never recomputed by walking the tree (except at construction):
//!
//! - `size`: number of edges
//! - `keyword_counts`: keyword -> number of nodes containing it
//! - `leaf_count` / `free_leaf_count`: childless nodes, and those that are free tuple sets
//! - `violates_pruning`: the tree contains `R → S ← R` through the same directed edge
//!
//! ## Canonical signature
//!
//! Equality and hashing use a canonical encoding of the *unrooted* labelled
//! tree: rooted at the tree centre, children encodings sorted. Sibling order
//! and the seed the tree was grown from do not affect it.

use crate::expression::{AssignmentId, JoinableExpression, JoinablePair};
use crate::tuple_set::{TupleSet, TupleSetGraph};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Index of a node in a JNTS arena
pub type NodeId = usize;

/// The schema edge a node was attached through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Tuple set on the parent side
    pub parent: Arc<TupleSet>,
    /// Tuple set on the child side
    pub child: Arc<TupleSet>,
    /// Original nodes at either end; contraction may since have merged them
    pub parent_node: NodeId,
    pub child_node: NodeId,
}

/// Node in a JNTS arena
#[derive(Debug, Clone)]
pub struct Node {
    expression: JoinableExpression,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    link: Option<Link>,
    /// Original nodes merged into this one, in base tuple set order of `expression`
    bases: Vec<NodeId>,
    removed: bool,
}

impl Node {
    fn new(id: NodeId, tuple_set: Arc<TupleSet>, parent: Option<NodeId>, link: Option<Link>) -> Self {
        Node {
            expression: JoinableExpression::TupleSet(tuple_set),
            parent,
            children: Vec::new(),
            link,
            bases: vec![id],
            removed: false,
        }
    }

    pub fn expression(&self) -> &JoinableExpression {
        &self.expression
    }

    pub fn tuple_set(&self) -> Option<&Arc<TupleSet>> {
        self.expression.as_tuple_set()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn link(&self) -> Option<&Link> {
        self.link.as_ref()
    }

    fn is_free_tuple_set(&self) -> bool {
        self.expression.is_free_tuple_set()
    }
}

/// A joining network of tuple sets
#[derive(Debug, Clone)]
pub struct Jnts {
    nodes: Vec<Node>,
    root: NodeId,
    size: usize,
    keyword_counts: BTreeMap<String, usize>,
    leaf_count: usize,
    free_leaf_count: usize,
    violates_pruning: bool,
    signature: String,
    signature_hash: u64,
}

/// An accepted JNTS
pub type CandidateNetwork = Jnts;

impl Jnts {
    /// Single-node network seeded with `seed`
    pub fn new(seed: Arc<TupleSet>) -> Self {
        let mut keyword_counts = BTreeMap::new();
        for keyword in seed.keywords() {
            keyword_counts.insert(keyword.clone(), 1);
        }
        let free_leaf_count = usize::from(seed.is_free());

        let mut jnts = Jnts {
            nodes: vec![Node::new(0, seed, None, None)],
            root: 0,
            size: 0,
            keyword_counts,
            leaf_count: 1,
            free_leaf_count,
            violates_pruning: false,
            signature: String::new(),
            signature_hash: 0,
        };
        jnts.refresh_signature();
        jnts
    }

    /// Rebuild a network from tuple sets and undirected edges, rooted at the first node.
    ///
    /// The pruning flag needs the schema graph and is left unset.
    pub fn from_edges(tuple_sets: Vec<Arc<TupleSet>>, edges: &[(usize, usize)]) -> Option<Self> {
        let first = tuple_sets.first()?;
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); tuple_sets.len()];
        for &(a, b) in edges {
            adjacency.get_mut(a)?.push(b);
            adjacency.get_mut(b)?.push(a);
        }

        let mut jnts = Jnts::new(Arc::clone(first));
        let mut arena_of: Vec<Option<NodeId>> = vec![None; tuple_sets.len()];
        arena_of[0] = Some(jnts.root);
        let mut queue = VecDeque::from([0usize]);

        while let Some(current) = queue.pop_front() {
            let at = arena_of[current]?;
            for &next in &adjacency[current] {
                if arena_of[next].is_some() {
                    continue;
                }
                let id = jnts.push_child(at, Arc::clone(&tuple_sets[next]));
                arena_of[next] = Some(id);
                queue.push_back(next);
            }
        }

        if arena_of.iter().any(Option::is_none) {
            return None;
        }
        jnts.refresh_signature();
        Some(jnts)
    }

    /// Rebuild the network a (possibly nested) expression describes
    pub fn from_expression(expression: &JoinableExpression) -> Option<Self> {
        let mut tuple_sets = Vec::new();
        let mut edges = Vec::new();
        collect_network(expression, &mut tuple_sets, &mut edges)?;
        Self::from_edges(tuple_sets, &edges)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).filter(|n| !n.removed)
    }

    /// Ids of live nodes in arena order
    pub fn node_ids(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&id| !self.nodes[id].removed)
            .collect()
    }

    /// Live `(parent, child)` edges in arena order of the child
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.node_ids()
            .into_iter()
            .filter_map(|id| self.nodes[id].parent.map(|p| (p, id)))
            .collect()
    }

    /// Number of joins
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn keyword_counts(&self) -> &BTreeMap<String, usize> {
        &self.keyword_counts
    }

    /// Number of distinct keywords contained somewhere in the network
    pub fn covered_keyword_count(&self) -> usize {
        self.keyword_counts.values().filter(|&&c| c > 0).count()
    }

    pub fn covers(&self, keyword: &str) -> bool {
        self.keyword_counts.get(keyword).is_some_and(|&c| c > 0)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn free_leaf_count(&self) -> usize {
        self.free_leaf_count
    }

    pub fn violates_pruning(&self) -> bool {
        self.violates_pruning
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn signature_hash(&self) -> u64 {
        self.signature_hash
    }

    /// Expression of the root node
    pub fn root_expression(&self) -> &JoinableExpression {
        &self.nodes[self.root].expression
    }

    /// Tuple sets of all live nodes (empty entries for contracted nodes)
    pub fn tuple_sets(&self) -> Vec<Arc<TupleSet>> {
        self.node_ids()
            .into_iter()
            .filter_map(|id| self.nodes[id].tuple_set().cloned())
            .collect()
    }

    /// Expansion rule for attaching `candidate` anywhere in the tree.
    ///
    /// A free tuple set is always admitted. A keyword tuple set must bring a
    /// keyword not covered yet, and must not make any existing keyword node
    /// redundant (all of its keywords also covered elsewhere).
    pub fn admits(&self, candidate: &TupleSet) -> bool {
        if candidate.is_free() {
            return true;
        }

        let count = |k: &str| self.keyword_counts.get(k).copied().unwrap_or(0);
        if !candidate.keywords().iter().any(|k| count(k) == 0) {
            return false;
        }

        self.node_ids().into_iter().all(|id| {
            let Some(ts) = self.nodes[id].tuple_set() else {
                return true;
            };
            ts.is_free()
                || ts
                    .keywords()
                    .iter()
                    .any(|k| count(k) + usize::from(candidate.contains_keyword(k)) == 1)
        })
    }

    /// Free leaves cannot outnumber the keywords still missing: each one has
    /// to be extended until it reaches a node contributing a new keyword.
    pub fn within_leaf_budget(&self, keyword_count: usize) -> bool {
        self.free_leaf_count <= keyword_count.saturating_sub(self.covered_keyword_count())
    }

    /// Copy of this network with `tuple_set` attached under node `at`
    pub fn expand(&self, at: NodeId, tuple_set: Arc<TupleSet>, graph: &dyn TupleSetGraph) -> Jnts {
        let mut next = self.clone();
        next.attach(at, tuple_set, graph);
        next
    }

    /// Attach `tuple_set` under node `at` in place and update every aggregate.
    ///
    /// Returns the id of the new node.
    pub fn attach(&mut self, at: NodeId, tuple_set: Arc<TupleSet>, graph: &dyn TupleSetGraph) -> NodeId {
        if !self.violates_pruning {
            self.violates_pruning = self.closes_pruned_shape(at, &tuple_set, graph);
        }
        let id = self.push_child(at, tuple_set);
        self.refresh_signature();
        id
    }

    /// `R → at ← R` where `R` is the new tuple set's relation and some other
    /// neighbour of `at` belongs to the same relation
    fn closes_pruned_shape(&self, at: NodeId, incoming: &TupleSet, graph: &dyn TupleSetGraph) -> bool {
        let Some(center) = self.nodes[at].tuple_set() else {
            return false;
        };
        if !graph.directed_connection(incoming, center) {
            return false;
        }

        let node = &self.nodes[at];
        node.parent
            .iter()
            .chain(node.children.iter())
            .filter_map(|&n| self.nodes[n].tuple_set())
            .any(|neighbour| {
                neighbour.relation() == incoming.relation()
                    && graph.directed_connection(neighbour, center)
            })
    }

    fn push_child(&mut self, at: NodeId, tuple_set: Arc<TupleSet>) -> NodeId {
        let parent_was_leaf = self.nodes[at].children.is_empty();
        if parent_was_leaf {
            self.leaf_count -= 1;
            if self.nodes[at].is_free_tuple_set() {
                self.free_leaf_count -= 1;
            }
        }
        self.leaf_count += 1;
        if tuple_set.is_free() {
            self.free_leaf_count += 1;
        }
        for keyword in tuple_set.keywords() {
            *self.keyword_counts.entry(keyword.clone()).or_insert(0) += 1;
        }

        let id = self.nodes.len();
        let link = self.nodes[at].tuple_set().map(|parent| Link {
            parent: Arc::clone(parent),
            child: Arc::clone(&tuple_set),
            parent_node: at,
            child_node: id,
        });
        self.nodes.push(Node::new(id, tuple_set, Some(at), link));
        self.nodes[at].children.push(id);
        self.size += 1;
        id
    }

    /// The one-join sub-expression formed by `child` and its parent
    pub fn pair_at(&self, child: NodeId) -> Option<JoinablePair> {
        let node = self.node(child)?;
        let parent = self.node(node.parent?)?;
        let link = node.link.as_ref()?;
        let left = parent.bases.iter().position(|&b| b == link.parent_node)?;
        let right = node.bases.iter().position(|&b| b == link.child_node)?;
        Some(
            JoinablePair::new(
                parent.expression.clone(),
                node.expression.clone(),
                Arc::clone(&link.parent),
                Arc::clone(&link.child),
            )
            .with_anchor_occurrences(
                parent.expression.anchor_occurrence(left),
                node.expression.anchor_occurrence(right),
            ),
        )
    }

    /// Merge `child` into its parent as one node materialized by `tag`.
    ///
    /// The merged node takes the parent's position; the child's children are
    /// re-parented to it and keep their original links.
    pub fn contract(&mut self, child: NodeId, tag: AssignmentId) -> Option<Arc<JoinablePair>> {
        let parent = self.node(child)?.parent?;
        let pair = Arc::new(self.pair_at(child)?.materialized(tag));

        let grandchildren = std::mem::take(&mut self.nodes[child].children);
        let absorbed = std::mem::take(&mut self.nodes[child].bases);
        let child_was_leaf = grandchildren.is_empty();
        let child_was_free_leaf = child_was_leaf && self.nodes[child].is_free_tuple_set();
        for &g in &grandchildren {
            self.nodes[g].parent = Some(parent);
        }

        let parent_node = &mut self.nodes[parent];
        parent_node.children.retain(|&c| c != child);
        parent_node.children.extend(grandchildren);
        parent_node.expression = JoinableExpression::Pair(Arc::clone(&pair));
        parent_node.bases.extend(absorbed);
        let parent_is_leaf = parent_node.children.is_empty();

        let removed = &mut self.nodes[child];
        removed.removed = true;
        removed.parent = None;

        self.leaf_count = self.leaf_count - usize::from(child_was_leaf) + usize::from(parent_is_leaf);
        self.free_leaf_count -= usize::from(child_was_free_leaf);
        self.size -= 1;
        self.refresh_signature();
        Some(pair)
    }

    fn refresh_signature(&mut self) {
        self.signature = self.canonical_encoding();
        let mut hasher = DefaultHasher::new();
        self.signature.hash(&mut hasher);
        self.signature_hash = hasher.finish();
    }

    fn neighbours(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let node = &self.nodes[id];
        node.parent.into_iter().chain(node.children.iter().copied())
    }

    /// Centre(s) of the live tree, found by peeling leaves
    fn centres(&self) -> Vec<NodeId> {
        let live = self.node_ids();
        if live.len() <= 2 {
            return live;
        }

        let mut degree: Vec<usize> = vec![0; self.nodes.len()];
        for &id in &live {
            degree[id] = self.neighbours(id).count();
        }
        let mut layer: Vec<NodeId> = live.iter().copied().filter(|&id| degree[id] <= 1).collect();
        let mut remaining = live.len();

        while remaining > 2 {
            remaining -= layer.len();
            let mut next = Vec::new();
            for &leaf in &layer {
                degree[leaf] = 0;
                for n in self.neighbours(leaf) {
                    if degree[n] > 0 {
                        degree[n] -= 1;
                        if degree[n] == 1 {
                            next.push(n);
                        }
                    }
                }
            }
            layer = next;
        }
        layer
    }

    fn encode_from(&self, id: NodeId, from: Option<NodeId>) -> String {
        let mut children: Vec<String> = self
            .neighbours(id)
            .filter(|&n| Some(n) != from)
            .map(|n| self.encode_from(n, Some(id)))
            .collect();
        children.sort();

        let label = self.nodes[id].expression.key();
        if children.is_empty() {
            label
        } else {
            format!("{label}({})", children.join("|"))
        }
    }

    fn canonical_encoding(&self) -> String {
        self.centres()
            .into_iter()
            .map(|c| self.encode_from(c, None))
            .min()
            .unwrap_or_default()
    }
}

fn collect_network(
    expression: &JoinableExpression,
    tuple_sets: &mut Vec<Arc<TupleSet>>,
    edges: &mut Vec<(usize, usize)>,
) -> Option<()> {
    match expression {
        JoinableExpression::TupleSet(ts) => {
            tuple_sets.push(Arc::clone(ts));
            Some(())
        }
        JoinableExpression::Pair(pair) => {
            let left_start = tuple_sets.len();
            collect_network(pair.left(), tuple_sets, edges)?;
            let right_start = tuple_sets.len();
            collect_network(pair.right(), tuple_sets, edges)?;

            let l = pair.left().anchor_index(pair.left_anchor(), pair.left_occurrence())?;
            let r = pair.right().anchor_index(pair.right_anchor(), pair.right_occurrence())?;
            edges.push((left_start + l, right_start + r));
            Some(())
        }
    }
}

impl PartialEq for Jnts {
    fn eq(&self, other: &Self) -> bool {
        self.signature == other.signature
    }
}

impl Eq for Jnts {}

impl Hash for Jnts {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.signature_hash.hash(state);
    }
}

impl fmt::Display for Jnts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_node(jnts: &Jnts, id: NodeId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let node = &jnts.nodes[id];
            write!(f, "{}", node.expression)?;
            if !node.children.is_empty() {
                write!(f, " (")?;
                for (i, &child) in node.children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_node(jnts, child, f)?;
                }
                write!(f, ")")?;
            }
            Ok(())
        }
        write_node(self, self.root, f)
    }
}
