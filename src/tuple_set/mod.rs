//! # Tuple Sets and the Schema Graph
//!
//! A tuple set `R^K` is the set of rows of relation `R` that contain exactly
//! the keyword subset `K`. Tuple sets are produced upstream (full-text lookup
//! and intersection) and are read-only here: the core only cares about their
//! relation, their keyword subset, and an opaque handle to their rows.
//!
//! The [`TupleSetGraph`] trait is the schema oracle the generators consult.
//! [`SchemaGraph`] is an in-memory implementation built from relations and
//! foreign keys.
//!
//! ## Edge direction
//!
//! ```text
//! person ──→ message        message.sender_id REFERENCES person.id
//! ```
//!
//! An edge `R → S` means `S` holds a foreign key referencing `R`, so each row
//! of `S` joins with at most one row of `R` through it.

use crate::error::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Opaque handle to the rows backing a tuple set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RowSetHandle(pub u64);

/// The query keywords: an ordered list of distinct terms
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Keywords {
    terms: Vec<String>,
}

impl Keywords {
    /// Build a keyword list, dropping repeated terms but keeping first-seen order
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        for term in terms {
            let term = term.into();
            if seen.insert(term.clone()) {
                ordered.push(term);
            }
        }
        Keywords { terms: ordered }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.iter().any(|t| t == term)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }
}

/// Rows of one relation containing exactly one keyword subset.
///
/// Two tuple sets are equal iff they have the same relation and the same
/// keyword subset; the row handle does not take part in equality.
#[derive(Debug, Clone)]
pub struct TupleSet {
    relation: String,
    keywords: BTreeSet<String>,
    rows: RowSetHandle,
}

impl TupleSet {
    pub fn new<I, S>(relation: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TupleSet {
            relation: relation.into(),
            keywords: keywords.into_iter().map(Into::into).collect(),
            rows: RowSetHandle::default(),
        }
    }

    /// A free tuple set: the relation with an empty keyword subset
    pub fn free(relation: impl Into<String>) -> Self {
        TupleSet {
            relation: relation.into(),
            keywords: BTreeSet::new(),
            rows: RowSetHandle::default(),
        }
    }

    pub fn with_rows(mut self, rows: RowSetHandle) -> Self {
        self.rows = rows;
        self
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.keywords
    }

    pub fn rows(&self) -> RowSetHandle {
        self.rows
    }

    pub fn is_free(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn contains_keyword(&self, keyword: &str) -> bool {
        self.keywords.contains(keyword)
    }

    /// Stable textual form, e.g. `author^{alice,bob}` or `paper^{}`
    pub fn abbreviation(&self) -> String {
        let keywords: Vec<&str> = self.keywords.iter().map(String::as_str).collect();
        format!("{}^{{{}}}", self.relation, keywords.join(","))
    }
}

impl PartialEq for TupleSet {
    fn eq(&self, other: &Self) -> bool {
        self.relation == other.relation && self.keywords == other.keywords
    }
}

impl Eq for TupleSet {}

impl Hash for TupleSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.relation.hash(state);
        self.keywords.hash(state);
    }
}

impl PartialOrd for TupleSet {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TupleSet {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.relation, &self.keywords).cmp(&(&other.relation, &other.keywords))
    }
}

impl fmt::Display for TupleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Schema oracle over tuple sets.
///
/// Lookups that find nothing return an empty list or `false`.
pub trait TupleSetGraph: Send + Sync {
    /// Tuple sets whose relation shares a foreign key with `tuple_set`'s relation
    fn adjacent_tuple_sets(&self, tuple_set: &TupleSet) -> Vec<Arc<TupleSet>>;

    /// Whether the schema has a directed edge `from → to` (see module docs)
    fn directed_connection(&self, from: &TupleSet, to: &TupleSet) -> bool;

    /// Column pair `(left_column, right_column)` of a foreign key linking the
    /// two relations in either direction
    fn join_columns(&self, left_relation: &str, right_relation: &str) -> Option<(String, String)>;
}

/// A foreign key: `table.column REFERENCES references_table.references_column`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

impl ForeignKey {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        ForeignKey {
            table: table.into(),
            column: column.into(),
            references_table: references_table.into(),
            references_column: references_column.into(),
        }
    }

    fn touches(&self, relation: &str) -> bool {
        self.table == relation || self.references_table == relation
    }

    fn other_side(&self, relation: &str) -> &str {
        if self.table == relation {
            &self.references_table
        } else {
            &self.table
        }
    }
}

/// In-memory schema graph with the tuple sets of one query.
///
/// Registering a relation also registers its free tuple set.
#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    /// Relation name -> tuple sets, in registration order
    tuple_sets: HashMap<String, Vec<Arc<TupleSet>>>,
    /// Registration order of relations
    relations: Vec<String>,
    foreign_keys: Vec<ForeignKey>,
}

impl SchemaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relation (idempotent)
    pub fn add_relation(&mut self, relation: impl Into<String>) {
        let relation = relation.into();
        if self.tuple_sets.contains_key(&relation) {
            return;
        }
        let free = Arc::new(TupleSet::free(relation.clone()));
        self.tuple_sets.insert(relation.clone(), vec![free]);
        self.relations.push(relation);
    }

    pub fn add_foreign_key(&mut self, foreign_key: ForeignKey) -> SearchResult<()> {
        for relation in [&foreign_key.table, &foreign_key.references_table] {
            if !self.tuple_sets.contains_key(relation) {
                return Err(SearchError::UnknownRelation(relation.clone()));
            }
        }
        self.foreign_keys.push(foreign_key);
        Ok(())
    }

    /// Register a non-free tuple set; re-registering an equal one returns the existing entry
    pub fn add_tuple_set(&mut self, tuple_set: TupleSet) -> SearchResult<Arc<TupleSet>> {
        let entries = self
            .tuple_sets
            .get_mut(tuple_set.relation())
            .ok_or_else(|| SearchError::UnknownRelation(tuple_set.relation().to_string()))?;
        if let Some(existing) = entries.iter().find(|ts| ***ts == tuple_set) {
            return Ok(Arc::clone(existing));
        }
        let tuple_set = Arc::new(tuple_set);
        entries.push(Arc::clone(&tuple_set));
        Ok(tuple_set)
    }

    pub fn relations(&self) -> &[String] {
        &self.relations
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    /// Every registered tuple set, free ones included, in registration order
    pub fn tuple_sets(&self) -> Vec<Arc<TupleSet>> {
        self.relations
            .iter()
            .filter_map(|r| self.tuple_sets.get(r))
            .flatten()
            .cloned()
            .collect()
    }

    /// Registered tuple sets that carry at least one keyword
    pub fn keyword_tuple_sets(&self) -> Vec<Arc<TupleSet>> {
        self.tuple_sets()
            .into_iter()
            .filter(|ts| !ts.is_free())
            .collect()
    }
}

impl TupleSetGraph for SchemaGraph {
    fn adjacent_tuple_sets(&self, tuple_set: &TupleSet) -> Vec<Arc<TupleSet>> {
        let relation = tuple_set.relation();
        let mut seen_relations: HashSet<&str> = HashSet::new();
        let mut adjacent = Vec::new();

        for fk in self.foreign_keys.iter().filter(|fk| fk.touches(relation)) {
            let other = fk.other_side(relation);
            if !seen_relations.insert(other) {
                continue;
            }
            if let Some(entries) = self.tuple_sets.get(other) {
                adjacent.extend(entries.iter().cloned());
            }
        }
        adjacent
    }

    fn directed_connection(&self, from: &TupleSet, to: &TupleSet) -> bool {
        self.foreign_keys
            .iter()
            .any(|fk| fk.references_table == from.relation() && fk.table == to.relation())
    }

    fn join_columns(&self, left_relation: &str, right_relation: &str) -> Option<(String, String)> {
        self.foreign_keys.iter().find_map(|fk| {
            if fk.table == left_relation && fk.references_table == right_relation {
                Some((fk.column.clone(), fk.references_column.clone()))
            } else if fk.references_table == left_relation && fk.table == right_relation {
                Some((fk.references_column.clone(), fk.column.clone()))
            } else {
                None
            }
        })
    }
}
