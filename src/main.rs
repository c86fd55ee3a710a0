//! `kwsearch` Binary
//!
//! Runs candidate network generation and execution planning over a workload
//! document.
//!
//! ## Usage
//!
//! ```bash
//! kwsearch --workload bibliography.json
//! kwsearch --workload bibliography.json --max-size 3 --json
//! KWSEARCH_LOG=debug kwsearch --workload bibliography.json --config kwsearch.toml
//! ```

use anyhow::Context;
use clap::Parser;
use kwsearch::config::LoggingConfig;
use kwsearch::{CandidateNetworkGenerator, Config, ExecutionPlan, PlanGenerator, Workload};
use serde::Serialize;
use std::env;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kwsearch")]
#[command(version)]
#[command(about = "Candidate network generation and execution planning for keyword search")]
struct Args {
    /// Workload document (schema, tuple sets, keywords)
    #[arg(short, long, value_name = "FILE")]
    workload: PathBuf,

    /// Configuration file (defaults to kwsearch.toml / kwsearch.local.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum joins per candidate network, overriding the configuration
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    max_size: Option<i64>,

    /// Print one JSON document instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct AssignmentReport {
    id: String,
    kind: kwsearch::AssignmentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    network: Option<usize>,
    abbreviation: String,
    joins: Vec<String>,
}

#[derive(Serialize)]
struct RejectedReport {
    network: usize,
    error: String,
}

#[derive(Serialize)]
struct Report {
    candidate_networks: Vec<String>,
    assignments: Vec<AssignmentReport>,
    rejected: Vec<RejectedReport>,
    stats: Vec<(&'static str, usize)>,
}

fn init_tracing(logging_config: &LoggingConfig) {
    // KWSEARCH_LOG takes precedence over the configured level
    let level = env::var("KWSEARCH_LOG").unwrap_or_else(|_| logging_config.level.clone());
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let base = || {
        tracing_subscriber::fmt()
            .with_env_filter(filter.clone())
            .with_writer(std::io::stderr)
            .with_thread_names(true)
    };

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if logging_config.format == "json" {
        Box::new(base().json().finish())
    } else {
        Box::new(base().compact().finish())
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn report(plan: &ExecutionPlan, stats: Vec<(&'static str, usize)>) -> Report {
    Report {
        candidate_networks: plan.networks().iter().map(ToString::to_string).collect(),
        assignments: plan
            .assignments()
            .iter()
            .map(|a| AssignmentReport {
                id: a.id().to_string(),
                kind: a.kind(),
                network: a.network(),
                abbreviation: a.abbreviation(),
                joins: a.joins().iter().map(ToString::to_string).collect(),
            })
            .collect(),
        rejected: plan
            .rejected()
            .iter()
            .map(|r| RejectedReport {
                network: r.network,
                error: r.error.to_string(),
            })
            .collect(),
        stats,
    }
}

fn print_text(report: &Report, plan: &ExecutionPlan) {
    println!("Candidate networks ({})", report.candidate_networks.len());
    for (i, cn) in report.candidate_networks.iter().enumerate() {
        println!("  CN {i}: {cn}");
    }
    println!();

    println!("Execution plan ({} assignments)", plan.len());
    for assignment in &report.assignments {
        println!("  {}", assignment.abbreviation);
        for join in &assignment.joins {
            println!("      on {join}");
        }
    }
    for rejected in &report.rejected {
        println!("  rejected CN {}: {}", rejected.network, rejected.error);
    }
    println!();

    println!("Statistics");
    for (name, value) in &report.stats {
        println!("  {name:<34} {value}");
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Warning: Could not load configuration: {e}");
            Config::default()
        }),
    };
    init_tracing(&config.logging);

    let query = Workload::from_path(&args.workload)
        .and_then(|w| w.prepare())
        .with_context(|| format!("reading workload {}", args.workload.display()))?;
    let max_size = args.max_size.unwrap_or(config.search.max_network_size);

    let mut generator = CandidateNetworkGenerator::from_config(&config.search);
    let networks = generator.generate(&query.tuple_sets, &query.graph, &query.keywords, max_size)?;
    let plan = PlanGenerator::from_config(&config.planner).plan(&networks, &query.graph)?;

    let mut stats = generator.stats().rows();
    stats.extend(plan.stats().rows());
    let report = report(&plan, stats);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&report, &plan);
    }
    Ok(())
}
