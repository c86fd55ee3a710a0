//! Workload documents
//!
//! A workload bundles everything one search needs as upstream input: the
//! schema, the tuple sets found by full-text lookup, and the query keywords.
//!
//! ```json
//! {
//!   "relations": ["author", "writes", "paper"],
//!   "foreign_keys": [
//!     { "table": "writes", "column": "author_id",
//!       "references_table": "author", "references_column": "id" }
//!   ],
//!   "tuple_sets": [ { "relation": "author", "keywords": ["alice"], "rows": 3 } ],
//!   "keywords": ["alice"]
//! }
//! ```

use crate::error::{SearchError, SearchResult};
use crate::tuple_set::{ForeignKey, Keywords, RowSetHandle, SchemaGraph, TupleSet};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// A non-free tuple set as described in a workload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TupleSetSpec {
    pub relation: String,
    pub keywords: Vec<String>,
    /// Opaque row handle passed through to the tuple set
    #[serde(default)]
    pub rows: u64,
}

/// Input document for one keyword search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workload {
    pub relations: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub tuple_sets: Vec<TupleSetSpec>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// A workload resolved into the generator's inputs
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub graph: SchemaGraph,
    /// Registered keyword tuple sets, in document order
    pub tuple_sets: Vec<Arc<TupleSet>>,
    pub keywords: Keywords,
}

impl Workload {
    pub fn from_json(json: &str) -> SearchResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> SearchResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Build the schema graph and register every tuple set.
    ///
    /// Tuple sets with no keywords are skipped (every relation already has
    /// its free tuple set).
    pub fn prepare(&self) -> SearchResult<PreparedQuery> {
        let mut graph = SchemaGraph::new();
        for relation in &self.relations {
            graph.add_relation(relation.clone());
        }
        for fk in &self.foreign_keys {
            graph.add_foreign_key(fk.clone())?;
        }

        let mut tuple_sets: Vec<Arc<TupleSet>> = Vec::new();
        for spec in &self.tuple_sets {
            if spec.keywords.is_empty() {
                continue;
            }
            if let Some(unknown) = spec.keywords.iter().find(|k| !self.keywords.contains(k)) {
                return Err(SearchError::invalid_argument(
                    "tuple_sets",
                    format!("{} lists keyword '{unknown}' missing from the query", spec.relation),
                ));
            }
            let tuple_set = TupleSet::new(spec.relation.clone(), spec.keywords.iter().cloned())
                .with_rows(RowSetHandle(spec.rows));
            let registered = graph.add_tuple_set(tuple_set)?;
            if !tuple_sets.contains(&registered) {
                tuple_sets.push(registered);
            }
        }

        Ok(PreparedQuery {
            graph,
            tuple_sets,
            keywords: Keywords::new(self.keywords.iter().cloned()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIBLIOGRAPHY: &str = r#"{
        "relations": ["author", "writes", "paper"],
        "foreign_keys": [
            {"table": "writes", "column": "author_id", "references_table": "author", "references_column": "id"},
            {"table": "writes", "column": "paper_id", "references_table": "paper", "references_column": "id"}
        ],
        "tuple_sets": [
            {"relation": "author", "keywords": ["alice"], "rows": 2},
            {"relation": "paper", "keywords": ["xml"]},
            {"relation": "paper", "keywords": []}
        ],
        "keywords": ["alice", "xml"]
    }"#;

    #[test]
    fn test_prepare_registers_tuple_sets() {
        let prepared = Workload::from_json(BIBLIOGRAPHY).unwrap().prepare().unwrap();
        assert_eq!(prepared.tuple_sets.len(), 2);
        assert_eq!(prepared.tuple_sets[0].rows(), RowSetHandle(2));
        assert_eq!(prepared.keywords.len(), 2);
        assert_eq!(prepared.graph.foreign_keys().len(), 2);
        // three free tuple sets plus two keyword ones
        assert_eq!(prepared.graph.tuple_sets().len(), 5);
    }

    #[test]
    fn test_unknown_relation_in_foreign_key() {
        let mut workload = Workload::from_json(BIBLIOGRAPHY).unwrap();
        workload
            .foreign_keys
            .push(ForeignKey::new("cites", "paper_id", "paper", "id"));
        assert!(matches!(
            workload.prepare().unwrap_err(),
            SearchError::UnknownRelation(ref r) if r == "cites"
        ));
    }

    #[test]
    fn test_keyword_outside_query_rejected() {
        let mut workload = Workload::from_json(BIBLIOGRAPHY).unwrap();
        workload.keywords = vec!["alice".to_string()];
        assert!(matches!(
            workload.prepare().unwrap_err(),
            SearchError::InvalidArgument { name: "tuple_sets", .. }
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            Workload::from_json("{\"relations\": 3}").unwrap_err(),
            SearchError::Json(_)
        ));
    }
}
