//! # Joiner
//!
//! Resolves the foreign-key columns that connect the two sides of a join.
//!
//! A side is a tuple set or a pair. A materialized pair stands for a temp
//! table holding several base tables, so its columns are addressed through
//! the assignment that produces it:
//!
//! ```text
//! author.id = writes.author_id          both sides are base tables
//! T2.writes_paper_id = paper.id         left side read through T2
//! ```

use crate::error::{SearchError, SearchResult};
use crate::expression::{AssignmentId, JoinableExpression, JoinablePair};
use crate::tuple_set::{TupleSet, TupleSetGraph};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A column reference, possibly through a materialized intermediate result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SqlColumn {
    pub table: String,
    pub column: String,
    /// Assignment whose result carries the column
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<AssignmentId>,
}

impl SqlColumn {
    pub fn new(table: impl Into<String>, column: impl Into<String>, via: Option<AssignmentId>) -> Self {
        SqlColumn {
            table: table.into(),
            column: column.into(),
            via,
        }
    }
}

impl fmt::Display for SqlColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.via {
            Some(id) => write!(f, "{}.{}_{}", id, self.table, self.column),
            None => write!(f, "{}.{}", self.table, self.column),
        }
    }
}

/// Equality predicate joining two sides
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinCondition {
    pub left: SqlColumn,
    pub right: SqlColumn,
}

impl fmt::Display for JoinCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.left, self.right)
    }
}

/// Base tuple sets of a side, each with the outermost materialized pair
/// that wraps it
fn base_tables(expression: &JoinableExpression) -> Vec<(Arc<TupleSet>, Option<AssignmentId>)> {
    fn walk(
        expression: &JoinableExpression,
        via: Option<AssignmentId>,
        out: &mut Vec<(Arc<TupleSet>, Option<AssignmentId>)>,
    ) {
        match expression {
            JoinableExpression::TupleSet(ts) => out.push((Arc::clone(ts), via)),
            JoinableExpression::Pair(pair) => {
                let via = via.or(pair.materialized_by());
                walk(pair.left(), via, out);
                walk(pair.right(), via, out);
            }
        }
    }

    let mut out = Vec::new();
    walk(expression, None, &mut out);
    out
}

/// Foreign-key column resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct Joiner;

impl Joiner {
    pub fn new() -> Self {
        Joiner
    }

    /// Find a foreign key between any base table of `left` and any base table
    /// of `right`, trying pairs in order until one matches.
    pub fn resolve(
        &self,
        left: &JoinableExpression,
        right: &JoinableExpression,
        graph: &dyn TupleSetGraph,
    ) -> SearchResult<(SqlColumn, SqlColumn)> {
        let right_tables = base_tables(right);
        for (l, l_via) in base_tables(left) {
            for (r, r_via) in &right_tables {
                if let Some((lc, rc)) = graph.join_columns(l.relation(), r.relation()) {
                    return Ok((
                        SqlColumn::new(l.relation(), lc, l_via),
                        SqlColumn::new(r.relation(), rc, *r_via),
                    ));
                }
            }
        }
        Err(SearchError::JoinCandidateNotFound {
            left: left.key(),
            right: right.key(),
        })
    }

    /// Join condition for `pair`, through its anchors when the schema links
    /// them directly, otherwise by exhaustive search.
    pub fn resolve_pair(&self, pair: &JoinablePair, graph: &dyn TupleSetGraph) -> SearchResult<JoinCondition> {
        if let Some(condition) = self.resolve_anchors(pair, graph) {
            return Ok(condition);
        }
        let (left, right) = self.resolve(pair.left(), pair.right(), graph)?;
        Ok(JoinCondition { left, right })
    }

    fn resolve_anchors(&self, pair: &JoinablePair, graph: &dyn TupleSetGraph) -> Option<JoinCondition> {
        let anchored = |side: &JoinableExpression, anchor: &TupleSet, occurrence: usize| {
            let index = side.anchor_index(anchor, occurrence)?;
            base_tables(side).into_iter().nth(index)
        };
        let (l, l_via) = anchored(pair.left(), pair.left_anchor(), pair.left_occurrence())?;
        let (r, r_via) = anchored(pair.right(), pair.right_anchor(), pair.right_occurrence())?;
        let (lc, rc) = graph.join_columns(l.relation(), r.relation())?;
        Some(JoinCondition {
            left: SqlColumn::new(l.relation(), lc, l_via),
            right: SqlColumn::new(r.relation(), rc, r_via),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple_set::{ForeignKey, SchemaGraph};

    fn ts(relation: &str, keywords: &[&str]) -> Arc<TupleSet> {
        Arc::new(TupleSet::new(relation, keywords.iter().copied()))
    }

    /// author ← writes → paper, venue isolated
    fn graph() -> SchemaGraph {
        let mut graph = SchemaGraph::new();
        for r in ["author", "writes", "paper", "venue"] {
            graph.add_relation(r);
        }
        graph
            .add_foreign_key(ForeignKey::new("writes", "author_id", "author", "id"))
            .unwrap();
        graph
            .add_foreign_key(ForeignKey::new("writes", "paper_id", "paper", "id"))
            .unwrap();
        graph
    }

    #[test]
    fn test_resolve_base_tables() {
        let g = graph();
        let (l, r) = Joiner::new()
            .resolve(
                &JoinableExpression::TupleSet(ts("author", &["alice"])),
                &JoinableExpression::TupleSet(ts("writes", &[])),
                &g,
            )
            .unwrap();
        assert_eq!(l.to_string(), "author.id");
        assert_eq!(r.to_string(), "writes.author_id");
    }

    #[test]
    fn test_resolve_through_materialized_pair() {
        let g = graph();
        let inner = JoinableExpression::pair(
            JoinablePair::of_tuple_sets(ts("author", &["alice"]), ts("writes", &[]))
                .materialized(AssignmentId(2)),
        );
        let (l, r) = Joiner::new()
            .resolve(&inner, &JoinableExpression::TupleSet(ts("paper", &["xml"])), &g)
            .unwrap();
        assert_eq!(l.to_string(), "T2.writes_paper_id");
        assert_eq!(r.to_string(), "paper.id");
    }

    #[test]
    fn test_resolve_pair_prefers_anchor() {
        let g = graph();
        let inner = JoinableExpression::pair(JoinablePair::of_tuple_sets(
            ts("author", &["alice"]),
            ts("writes", &[]),
        ));
        let paper = ts("paper", &["xml"]);
        let pair = JoinablePair::new(
            inner,
            JoinableExpression::TupleSet(Arc::clone(&paper)),
            ts("writes", &[]),
            paper,
        );
        let condition = Joiner::new().resolve_pair(&pair, &g).unwrap();
        assert_eq!(condition.to_string(), "writes.paper_id = paper.id");
    }

    #[test]
    fn test_missing_foreign_key_is_error() {
        let g = graph();
        let err = Joiner::new()
            .resolve(
                &JoinableExpression::TupleSet(ts("author", &["alice"])),
                &JoinableExpression::TupleSet(ts("venue", &[])),
                &g,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SearchError::JoinCandidateNotFound { ref left, ref right }
                if left == "author^{alice}" && right == "venue^{}"
        ));
    }
}
