//! # Joinable Expressions
//!
//! A joinable expression is either a single tuple set or a one-join pairing of
//! two joinable expressions. Pairings nest, so an expression over `n` tuple
//! sets describes `n - 1` joins.
//!
//! ```text
//! author^{alice}                                  tuple set
//! (author^{alice} ⋈ writes^{})                    pair, not materialized
//! T3                                              pair materialized by assignment T3
//! ```
//!
//! ## Anchors
//!
//! A pair also records, for each side, the tuple set inside that side where
//! the join edge lands. For a bare tuple set side the anchor is the tuple set
//! itself. Anchors keep two pairs apart when the same composite side is
//! joined to the same neighbour through different base tables.
//!
//! A composite side may hold the anchor's tuple set more than once (two
//! `writes^{}` nodes of a co-authorship tree). The anchor then also carries
//! its occurrence: the position among equal tuple sets in the side's
//! canonical base order, which depends on structure alone and not on which
//! sub-pairs happen to be materialized. A non-zero occurrence is written
//! after the anchor, as in `T1[writes^{}#1]`.
//!
//! ## Equality
//!
//! Pair equality is symmetric: `⟨a, b⟩ == ⟨b, a⟩`. A materialized pair is
//! identified by the assignment that materializes it. Both rules are encoded
//! in [`JoinableExpression::key`], which equality and hashing go through.

use crate::tuple_set::TupleSet;
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identifier of an assignment in an execution plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AssignmentId(pub usize);

impl fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// A tuple set or a one-join pairing of two expressions
#[derive(Debug, Clone)]
pub enum JoinableExpression {
    TupleSet(Arc<TupleSet>),
    Pair(Arc<JoinablePair>),
}

/// Unordered pairing of two joinable expressions
#[derive(Debug, Clone)]
pub struct JoinablePair {
    left: JoinableExpression,
    right: JoinableExpression,
    left_anchor: Arc<TupleSet>,
    right_anchor: Arc<TupleSet>,
    left_occurrence: usize,
    right_occurrence: usize,
    /// Assignment that materializes this pair, once selected as shared
    materialized_by: Option<AssignmentId>,
    /// Order-independent textual definition, computed once
    definition: String,
    /// Like `definition`, but looking through materialized sides
    structure: String,
    /// Right side comes first in canonical base order
    swapped: bool,
}

impl JoinablePair {
    pub fn new(
        left: JoinableExpression,
        right: JoinableExpression,
        left_anchor: Arc<TupleSet>,
        right_anchor: Arc<TupleSet>,
    ) -> Self {
        let mut pair = JoinablePair {
            left,
            right,
            left_anchor,
            right_anchor,
            left_occurrence: 0,
            right_occurrence: 0,
            materialized_by: None,
            definition: String::new(),
            structure: String::new(),
            swapped: false,
        };
        pair.rebuild_keys();
        pair
    }

    /// Set which occurrence of each anchor tuple set the join edge lands on
    pub fn with_anchor_occurrences(mut self, left: usize, right: usize) -> Self {
        self.left_occurrence = left;
        self.right_occurrence = right;
        self.rebuild_keys();
        self
    }

    fn rebuild_keys(&mut self) {
        let left = Side::new(&self.left, &self.left_anchor, self.left_occurrence);
        let right = Side::new(&self.right, &self.right_anchor, self.right_occurrence);

        let (structural_left, structural_right) = (left.key(true), right.key(true));
        self.swapped = structural_right < structural_left;
        self.structure = symmetric_join(structural_left, structural_right);
        self.definition = symmetric_join(left.key(false), right.key(false));
    }

    /// Pair two tuple sets directly
    pub fn of_tuple_sets(left: Arc<TupleSet>, right: Arc<TupleSet>) -> Self {
        Self::new(
            JoinableExpression::TupleSet(Arc::clone(&left)),
            JoinableExpression::TupleSet(Arc::clone(&right)),
            left,
            right,
        )
    }

    /// The same pair tagged with the assignment that materializes it
    pub fn materialized(&self, id: AssignmentId) -> Self {
        let mut pair = self.clone();
        pair.materialized_by = Some(id);
        pair
    }

    /// The same pair with its materialization tag removed
    pub fn inlined(&self) -> Self {
        let mut pair = self.clone();
        pair.materialized_by = None;
        pair
    }

    pub fn left(&self) -> &JoinableExpression {
        &self.left
    }

    pub fn right(&self) -> &JoinableExpression {
        &self.right
    }

    pub fn left_anchor(&self) -> &Arc<TupleSet> {
        &self.left_anchor
    }

    pub fn right_anchor(&self) -> &Arc<TupleSet> {
        &self.right_anchor
    }

    pub fn left_occurrence(&self) -> usize {
        self.left_occurrence
    }

    pub fn right_occurrence(&self) -> usize {
        self.right_occurrence
    }

    pub fn materialized_by(&self) -> Option<AssignmentId> {
        self.materialized_by
    }

    /// Symmetric textual definition, e.g. `T1[author^{alice}] ⋈ writes^{}`
    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// Whether both sides are free tuple sets (the pair contributes no keyword)
    pub fn is_free_pairing(&self) -> bool {
        self.left.is_free_tuple_set() && self.right.is_free_tuple_set()
    }

    /// Assignments this pair reads from: materialized pairs reached without
    /// crossing another materialized pair. The pair's own tag is not included.
    pub fn references(&self) -> Vec<AssignmentId> {
        let mut refs = Vec::new();
        self.left.collect_references(&mut refs);
        self.right.collect_references(&mut refs);
        refs
    }

    /// Replace every reference to `id` by `definition`, untagged.
    ///
    /// The definitional string is rebuilt; the pair's own tag is kept.
    pub fn inline_reference(&self, id: AssignmentId, definition: &JoinablePair) -> Self {
        let mut pair = JoinablePair::new(
            self.left.inline_reference(id, definition),
            self.right.inline_reference(id, definition),
            Arc::clone(&self.left_anchor),
            Arc::clone(&self.right_anchor),
        )
        .with_anchor_occurrences(self.left_occurrence, self.right_occurrence);
        pair.materialized_by = self.materialized_by;
        pair
    }
}

/// One side of a pair as it appears in the pair's keys
struct Side<'a> {
    expression: &'a JoinableExpression,
    anchor: &'a TupleSet,
    occurrence: usize,
}

impl<'a> Side<'a> {
    fn new(expression: &'a JoinableExpression, anchor: &'a TupleSet, occurrence: usize) -> Self {
        Side {
            expression,
            anchor,
            occurrence,
        }
    }

    /// `author^{alice}`, `T1[writes^{}]` or `(a ⋈ b)[b^{}#1]`
    fn key(&self, structural: bool) -> String {
        let body = match self.expression {
            JoinableExpression::TupleSet(ts) => return ts.abbreviation(),
            JoinableExpression::Pair(pair) if structural => format!("({})", pair.structure),
            JoinableExpression::Pair(_) => self.expression.key(),
        };
        match self.occurrence {
            0 => format!("{body}[{}]", self.anchor.abbreviation()),
            n => format!("{body}[{}#{n}]", self.anchor.abbreviation()),
        }
    }
}

fn symmetric_join(a: String, b: String) -> String {
    if b < a {
        format!("{b} ⋈ {a}")
    } else {
        format!("{a} ⋈ {b}")
    }
}

impl JoinableExpression {
    pub fn tuple_set(tuple_set: Arc<TupleSet>) -> Self {
        JoinableExpression::TupleSet(tuple_set)
    }

    pub fn pair(pair: JoinablePair) -> Self {
        JoinableExpression::Pair(Arc::new(pair))
    }

    /// Identity key: tuple set abbreviation, assignment name for a
    /// materialized pair, parenthesized definition otherwise
    pub fn key(&self) -> String {
        match self {
            JoinableExpression::TupleSet(ts) => ts.abbreviation(),
            JoinableExpression::Pair(pair) => match pair.materialized_by {
                Some(id) => id.to_string(),
                None => format!("({})", pair.definition),
            },
        }
    }

    pub fn as_tuple_set(&self) -> Option<&Arc<TupleSet>> {
        match self {
            JoinableExpression::TupleSet(ts) => Some(ts),
            JoinableExpression::Pair(_) => None,
        }
    }

    pub fn as_pair(&self) -> Option<&Arc<JoinablePair>> {
        match self {
            JoinableExpression::TupleSet(_) => None,
            JoinableExpression::Pair(pair) => Some(pair),
        }
    }

    pub fn is_free_tuple_set(&self) -> bool {
        matches!(self, JoinableExpression::TupleSet(ts) if ts.is_free())
    }

    /// Assignment materializing this expression, if it is a tagged pair
    pub fn materialized_by(&self) -> Option<AssignmentId> {
        self.as_pair().and_then(|pair| pair.materialized_by)
    }

    /// Every base tuple set, looking through pairs whether materialized or not
    pub fn base_tuple_sets(&self) -> Vec<Arc<TupleSet>> {
        let mut bases = Vec::new();
        self.collect_bases(&mut bases);
        bases
    }

    fn collect_bases(&self, bases: &mut Vec<Arc<TupleSet>>) {
        match self {
            JoinableExpression::TupleSet(ts) => bases.push(Arc::clone(ts)),
            JoinableExpression::Pair(pair) => {
                pair.left.collect_bases(bases);
                pair.right.collect_bases(bases);
            }
        }
    }

    /// Indices into [`Self::base_tuple_sets`] in canonical order: at every
    /// pair the side with the smaller structural key comes first
    fn canonical_order(&self) -> Vec<usize> {
        match self {
            JoinableExpression::TupleSet(_) => vec![0],
            JoinableExpression::Pair(pair) => {
                let left = pair.left.canonical_order();
                let offset = left.len();
                let right = pair.right.canonical_order().into_iter().map(|i| i + offset);
                if pair.swapped {
                    right.chain(left).collect()
                } else {
                    left.into_iter().chain(right).collect()
                }
            }
        }
    }

    /// Occurrence number of base tuple set `index` among equal tuple sets
    pub(crate) fn anchor_occurrence(&self, index: usize) -> usize {
        let bases = self.base_tuple_sets();
        let Some(target) = bases.get(index) else {
            return 0;
        };
        self.canonical_order()
            .into_iter()
            .take_while(|&i| i != index)
            .filter(|&i| bases[i] == *target)
            .count()
    }

    /// Index into [`Self::base_tuple_sets`] of the `occurrence`-th `anchor`
    pub(crate) fn anchor_index(&self, anchor: &TupleSet, occurrence: usize) -> Option<usize> {
        let bases = self.base_tuple_sets();
        self.canonical_order()
            .into_iter()
            .filter(|&i| *bases[i] == *anchor)
            .nth(occurrence)
    }

    /// Number of joins the expression describes
    pub fn join_count(&self) -> usize {
        match self {
            JoinableExpression::TupleSet(_) => 0,
            JoinableExpression::Pair(pair) => 1 + pair.left.join_count() + pair.right.join_count(),
        }
    }

    /// Assignments referenced by this expression, including itself when tagged
    pub fn references(&self) -> Vec<AssignmentId> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references(&self, refs: &mut Vec<AssignmentId>) {
        match self {
            JoinableExpression::TupleSet(_) => {}
            JoinableExpression::Pair(pair) => match pair.materialized_by {
                Some(id) => refs.push(id),
                None => {
                    pair.left.collect_references(refs);
                    pair.right.collect_references(refs);
                }
            },
        }
    }

    pub(crate) fn inline_reference(&self, id: AssignmentId, definition: &JoinablePair) -> Self {
        match self {
            JoinableExpression::TupleSet(_) => self.clone(),
            JoinableExpression::Pair(pair) => match pair.materialized_by {
                Some(tag) if tag == id => JoinableExpression::pair(definition.inlined()),
                Some(_) => self.clone(),
                None => JoinableExpression::pair(pair.inline_reference(id, definition)),
            },
        }
    }

    /// Copy with every materialization tag removed
    pub fn strip_materialization(&self) -> Self {
        match self {
            JoinableExpression::TupleSet(_) => self.clone(),
            JoinableExpression::Pair(pair) => JoinableExpression::pair(JoinablePair::new(
                pair.left.strip_materialization(),
                pair.right.strip_materialization(),
                Arc::clone(&pair.left_anchor),
                Arc::clone(&pair.right_anchor),
            )
            .with_anchor_occurrences(pair.left_occurrence, pair.right_occurrence)),
        }
    }
}

impl PartialEq for JoinableExpression {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JoinableExpression::TupleSet(a), JoinableExpression::TupleSet(b)) => a == b,
            (JoinableExpression::Pair(_), JoinableExpression::Pair(_)) => self.key() == other.key(),
            _ => false,
        }
    }
}

impl Eq for JoinableExpression {}

impl Hash for JoinableExpression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialEq for JoinablePair {
    fn eq(&self, other: &Self) -> bool {
        self.materialized_by == other.materialized_by && self.definition == other.definition
    }
}

impl Eq for JoinablePair {}

impl fmt::Display for JoinableExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl fmt::Display for JoinablePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(relation: &str, keywords: &[&str]) -> Arc<TupleSet> {
        Arc::new(TupleSet::new(relation, keywords.iter().copied()))
    }

    #[test]
    fn test_pair_equality_is_symmetric() {
        let a = ts("author", &["alice"]);
        let w = ts("writes", &[]);
        let ab = JoinablePair::of_tuple_sets(Arc::clone(&a), Arc::clone(&w));
        let ba = JoinablePair::of_tuple_sets(w, a);
        assert_eq!(ab, ba);
        assert_eq!(ab.definition(), "author^{alice} ⋈ writes^{}");
        assert_eq!(JoinableExpression::pair(ab), JoinableExpression::pair(ba));
    }

    #[test]
    fn test_materialized_pair_keyed_by_assignment() {
        let pair = JoinablePair::of_tuple_sets(ts("author", &["alice"]), ts("writes", &[]));
        let tagged = JoinableExpression::pair(pair.materialized(AssignmentId(3)));
        assert_eq!(tagged.key(), "T3");
        assert_eq!(tagged.materialized_by(), Some(AssignmentId(3)));
        assert_ne!(tagged, JoinableExpression::pair(pair));
    }

    #[test]
    fn test_anchor_distinguishes_pairs() {
        let inner = JoinablePair::of_tuple_sets(ts("author", &["alice"]), ts("writes", &[]))
            .materialized(AssignmentId(1));
        let inner = JoinableExpression::pair(inner);
        let paper = ts("paper", &[]);
        let via_writes = JoinablePair::new(
            inner.clone(),
            JoinableExpression::TupleSet(Arc::clone(&paper)),
            ts("writes", &[]),
            Arc::clone(&paper),
        );
        let via_author = JoinablePair::new(
            inner,
            JoinableExpression::TupleSet(Arc::clone(&paper)),
            ts("author", &["alice"]),
            paper,
        );
        assert_ne!(via_writes, via_author);
        assert_eq!(via_writes.definition(), "T1[writes^{}] ⋈ paper^{}");
    }

    #[test]
    fn test_references_stop_at_materialized_pairs() {
        let definition =
            JoinablePair::of_tuple_sets(ts("author", &["alice"]), ts("writes", &[]));
        let inner = JoinableExpression::pair(definition.materialized(AssignmentId(1)));
        let paper = ts("paper", &[]);
        let middle = JoinableExpression::pair(JoinablePair::new(
            inner,
            JoinableExpression::TupleSet(Arc::clone(&paper)),
            ts("writes", &[]),
            paper,
        ));
        let venue = ts("venue", &["vldb"]);
        let outer = JoinablePair::new(
            middle,
            JoinableExpression::TupleSet(Arc::clone(&venue)),
            ts("paper", &[]),
            venue,
        );
        assert_eq!(outer.references(), vec![AssignmentId(1)]);

        let inlined = outer.inline_reference(AssignmentId(1), &definition);
        assert!(inlined.references().is_empty());
        assert_eq!(
            inlined.definition(),
            "((author^{alice} ⋈ writes^{})[writes^{}] ⋈ paper^{})[paper^{}] ⋈ venue^{vldb}"
        );
        assert_eq!(
            JoinableExpression::pair(inlined).base_tuple_sets().len(),
            4
        );
    }

    #[test]
    fn test_free_pairing() {
        let free = JoinablePair::of_tuple_sets(ts("writes", &[]), ts("paper", &[]));
        assert!(free.is_free_pairing());
        let not_free = JoinablePair::of_tuple_sets(ts("writes", &[]), ts("paper", &["xml"]));
        assert!(!not_free.is_free_pairing());
    }

    #[test]
    fn test_join_count_and_strip() {
        let inner = JoinableExpression::pair(
            JoinablePair::of_tuple_sets(ts("a", &["x"]), ts("b", &[])).materialized(AssignmentId(0)),
        );
        let c = ts("c", &["y"]);
        let outer = JoinableExpression::pair(JoinablePair::new(
            inner,
            JoinableExpression::TupleSet(Arc::clone(&c)),
            ts("b", &[]),
            c,
        ));
        assert_eq!(outer.join_count(), 2);
        assert!(outer.strip_materialization().references().is_empty());
    }

    #[test]
    fn test_anchor_occurrence_ignores_materialization() {
        let a = ts("a", &["x"]);
        let b = ts("b", &[]);
        // b^{} - a^{x} - b^{}, built twice with different sides tagged
        let inner = JoinablePair::of_tuple_sets(Arc::clone(&b), Arc::clone(&a));
        let plain = JoinableExpression::pair(JoinablePair::new(
            JoinableExpression::pair(inner.clone()),
            JoinableExpression::TupleSet(Arc::clone(&b)),
            Arc::clone(&a),
            Arc::clone(&b),
        ));
        let tagged = JoinableExpression::pair(JoinablePair::new(
            JoinableExpression::pair(inner.materialized(AssignmentId(7))),
            JoinableExpression::TupleSet(Arc::clone(&b)),
            Arc::clone(&a),
            Arc::clone(&b),
        ));

        for expression in [&plain, &tagged] {
            let first = expression.anchor_index(&b, 0).unwrap();
            let second = expression.anchor_index(&b, 1).unwrap();
            assert_ne!(first, second);
            assert_eq!(expression.anchor_occurrence(first), 0);
            assert_eq!(expression.anchor_occurrence(second), 1);
            assert!(expression.anchor_index(&b, 2).is_none());
        }
        assert_eq!(
            plain.anchor_index(&b, 1),
            tagged.anchor_index(&b, 1)
        );
    }
}
