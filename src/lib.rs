//! # kwsearch
//!
//! Keyword search over relational databases: given query keywords and a
//! schema, enumerate every minimal join tree whose rows can together contain
//! the keywords, then plan their evaluation so join sub-expressions shared by
//! several trees are computed once.
//!
//! ## Pipeline
//!
//! ```text
//! Keywords + tuple sets + schema graph
//!     ↓
//! [CandidateNetworkGenerator]   → accepted JNTS trees (candidate networks)
//!     ↓
//! [PlanGenerator]               → ExecutionPlan (shared pairs + victimization)
//!     ↓
//! [Joiner]                      → join conditions per assignment
//! ```
//!
//! Tokenizing the query, building tuple sets from full-text indexes and
//! running the resulting SQL happen upstream and downstream of this crate.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kwsearch::{CandidateNetworkGenerator, PlanGenerator, Workload};
//!
//! let query = Workload::from_path("bibliography.json")?.prepare()?;
//!
//! let mut generator = CandidateNetworkGenerator::new();
//! let networks = generator.generate(&query.tuple_sets, &query.graph, &query.keywords, 4)?;
//!
//! let plan = PlanGenerator::new().plan(&networks, &query.graph)?;
//! print!("{plan}");
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `tuple_set` | Tuple sets, keywords, schema graph oracle |
//! | `expression` | Tuple set / pair expressions, assignment ids |
//! | `jnts` | Arena-backed join trees with canonical signatures |
//! | `candidate_network` | Worklist generation of candidate networks |
//! | `joiner` | Foreign-key column resolution |
//! | `plan` | Shared sub-expression planning and victimization |
//! | `workload` | JSON input documents |
//! | `config` | Configuration system |

pub mod candidate_network;
pub mod config;
pub mod error;
pub mod expression;
pub mod jnts;
pub mod joiner;
pub mod plan;
pub mod tuple_set;
pub mod workload;

pub use candidate_network::{CandidateNetworkGenerator, CoverageMode, GeneratorStats, UniqueNetworkQueue};
pub use config::Config;
pub use error::{SearchError, SearchResult};
pub use expression::{AssignmentId, JoinableExpression, JoinablePair};
pub use jnts::{CandidateNetwork, Jnts};
pub use joiner::{JoinCondition, Joiner, SqlColumn};
pub use plan::{Assignment, AssignmentKind, ExecutionPlan, PlanGenerator, PlanStats};
pub use tuple_set::{ForeignKey, Keywords, RowSetHandle, SchemaGraph, TupleSet, TupleSetGraph};
pub use workload::{PreparedQuery, Workload};
