//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - kwsearch.toml (default configuration)
//! - kwsearch.local.toml (git-ignored local overrides)
//! - Environment variables (KWSEARCH_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # kwsearch.toml
//! [search]
//! max_network_size = 5
//! coverage = { at_least = 2 }
//! parallel_expansion = true
//!
//! [planner]
//! enable_victimization = false
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! KWSEARCH_SEARCH__MAX_NETWORK_SIZE=3
//! KWSEARCH_LOGGING__FORMAT=json
//! ```

use crate::candidate_network::CoverageMode;
use crate::error::SearchResult;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Candidate network generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum number of joins in a candidate network
    #[serde(default = "default_max_network_size")]
    pub max_network_size: i64,

    /// Keywords an accepted network must contain
    #[serde(default)]
    pub coverage: CoverageMode,

    /// Expand the worklist on a thread pool
    #[serde(default)]
    pub parallel_expansion: bool,

    /// Worker threads for parallel expansion (0 = all cores)
    #[serde(default)]
    pub num_threads: usize,
}

/// Execution plan settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Inline intermediate results with a single reader or a free/free pairing
    #[serde(default = "default_true")]
    pub enable_victimization: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_max_network_size() -> i64 {
    4
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. kwsearch.toml (base configuration)
    /// 2. kwsearch.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (KWSEARCH_* prefix)
    pub fn load() -> SearchResult<Self> {
        Ok(Figment::new()
            .merge(Toml::file("kwsearch.toml"))
            .merge(Toml::file("kwsearch.local.toml"))
            .merge(Env::prefixed("KWSEARCH_").split("__"))
            .extract()?)
    }

    /// Load configuration from specific file path
    pub fn from_file(path: impl AsRef<Path>) -> SearchResult<Self> {
        Ok(Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("KWSEARCH_").split("__"))
            .extract()?)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            max_network_size: default_max_network_size(),
            coverage: CoverageMode::All,
            parallel_expansion: false,
            num_threads: 0,
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            enable_victimization: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
