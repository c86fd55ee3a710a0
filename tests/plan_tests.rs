//! Execution planning: sharing, victimization and reconstruction, end to end.

use kwsearch::{
    AssignmentId, CandidateNetwork, CandidateNetworkGenerator, ExecutionPlan, ForeignKey, Jnts,
    Keywords, PlanGenerator, SchemaGraph, SearchError, TupleSet, Workload,
};
use std::collections::HashMap;
use std::sync::Arc;

fn ts(relation: &str, keywords: &[&str]) -> Arc<TupleSet> {
    Arc::new(TupleSet::new(relation, keywords.iter().copied()))
}

/// One foreign key `child.<parent>_id -> parent.id` per `(parent, child)`
fn schema(edges: &[(&str, &str)]) -> SchemaGraph {
    let mut graph = SchemaGraph::new();
    for (parent, child) in edges {
        graph.add_relation(*parent);
        graph.add_relation(*child);
    }
    for (parent, child) in edges {
        graph
            .add_foreign_key(ForeignKey::new(*child, format!("{parent}_id"), *parent, "id"))
            .unwrap();
    }
    graph
}

fn path(graph: &SchemaGraph, tuple_sets: &[Arc<TupleSet>]) -> Jnts {
    let mut jnts = Jnts::new(Arc::clone(&tuple_sets[0]));
    let mut at = jnts.root();
    for ts in &tuple_sets[1..] {
        at = jnts.attach(at, Arc::clone(ts), graph);
    }
    jnts
}

fn assert_reconstructs(plan: &ExecutionPlan) {
    for assignment in plan.candidate_networks() {
        let expanded = plan.expand(assignment.id()).unwrap();
        assert!(expanded.references().is_empty());
        let rebuilt = Jnts::from_expression(&expanded).unwrap();
        let original = &plan.networks()[assignment.network().unwrap()];
        assert_eq!(&rebuilt, original, "{}", assignment.abbreviation());
    }
}

fn assert_victimized(plan: &ExecutionPlan) {
    let mut readers: HashMap<AssignmentId, usize> = HashMap::new();
    for assignment in plan.assignments() {
        let mut refs = assignment.references();
        refs.sort();
        refs.dedup();
        for id in refs {
            assert!(id < assignment.id(), "{} reads a later assignment", assignment.id());
            *readers.entry(id).or_insert(0) += 1;
        }
    }
    for ir in plan.intermediate_results() {
        assert!(readers.get(&ir.id()).copied().unwrap_or(0) >= 2, "{}", ir.abbreviation());
        assert!(!ir.definition().unwrap().is_free_pairing(), "{}", ir.abbreviation());
    }
}

#[test]
fn test_pair_shared_by_two_networks_planned_first() {
    // ⟨A,B⟩ occurs twice, ⟨B,C⟩ once
    let graph = schema(&[("a", "b"), ("c", "b"), ("x", "b"), ("y", "b")]);
    let (a, b) = (ts("a", &["alice"]), ts("b", &[]));
    let networks = vec![
        path(&graph, &[Arc::clone(&a), Arc::clone(&b), ts("x", &["xml"])]),
        path(&graph, &[Arc::clone(&a), Arc::clone(&b), ts("y", &["yaml"])]),
        path(&graph, &[Arc::clone(&b), ts("c", &["cat"])]),
    ];

    let plan = PlanGenerator::new().plan(&networks, &graph).unwrap();

    let first = &plan.assignments()[0];
    assert!(first.is_intermediate_result());
    assert_eq!(first.abbreviation(), "T0 := a^{alice} ⋈ b^{}");
    assert_eq!(plan.intermediate_results().count(), 1);

    let readers: Vec<_> = plan
        .candidate_networks()
        .filter(|cn| cn.references().contains(&first.id()))
        .collect();
    assert_eq!(readers.len(), 2);

    let bc = plan
        .candidate_networks()
        .find(|cn| cn.network() == Some(2))
        .unwrap();
    assert!(bc.references().is_empty());
    assert_eq!(bc.joins().len(), 1);
    assert_eq!(bc.joins()[0].to_string(), "b.c_id = c.id");

    assert_reconstructs(&plan);
    assert_victimized(&plan);
}

#[test]
fn test_single_reader_result_inlined_without_changing_network() {
    let graph = schema(&[("a", "b"), ("x", "b"), ("x", "y")]);
    let (a, b, x) = (ts("a", &["alice"]), ts("b", &[]), ts("x", &["xml"]));
    let networks = vec![
        path(&graph, &[Arc::clone(&a), Arc::clone(&b), Arc::clone(&x)]),
        path(&graph, &[a, b, x, ts("y", &["yaml"])]),
    ];

    let without = PlanGenerator::new()
        .with_victimization(false)
        .plan(&networks, &graph)
        .unwrap();
    let with = PlanGenerator::new().plan(&networks, &graph).unwrap();

    assert_eq!(without.intermediate_results().count(), 1);
    assert_eq!(with.intermediate_results().count(), 0);
    assert_eq!(with.stats().victimized, 1);

    for id in [AssignmentId(1), AssignmentId(2)] {
        let before = Jnts::from_expression(&without.expand(id).unwrap()).unwrap();
        let after = Jnts::from_expression(&with.expand(id).unwrap()).unwrap();
        assert_eq!(before, after);
    }
    assert_reconstructs(&with);
    assert_victimized(&with);
}

#[test]
fn test_generated_networks_plan_end_to_end() {
    let workload = Workload::from_json(
        r#"{
            "relations": ["author", "writes", "paper", "venue"],
            "foreign_keys": [
                {"table": "writes", "column": "author_id", "references_table": "author", "references_column": "id"},
                {"table": "writes", "column": "paper_id", "references_table": "paper", "references_column": "id"},
                {"table": "paper", "column": "venue_id", "references_table": "venue", "references_column": "id"}
            ],
            "tuple_sets": [
                {"relation": "author", "keywords": ["alice"]},
                {"relation": "author", "keywords": ["bob"]},
                {"relation": "paper", "keywords": ["alice"]},
                {"relation": "paper", "keywords": ["bob"]},
                {"relation": "venue", "keywords": ["bob"]}
            ],
            "keywords": ["alice", "bob"]
        }"#,
    )
    .unwrap();
    let query = workload.prepare().unwrap();

    let networks = CandidateNetworkGenerator::new()
        .generate(&query.tuple_sets, &query.graph, &query.keywords, 4)
        .unwrap();
    assert!(networks.len() > 2);

    let plan = PlanGenerator::new().plan(&networks, &query.graph).unwrap();
    assert!(plan.rejected().is_empty());
    assert_eq!(plan.candidate_networks().count(), networks.len());
    assert_eq!(plan.stats().candidate_network_assignments, networks.len());

    let mut covered: Vec<usize> = plan.candidate_networks().filter_map(|a| a.network()).collect();
    covered.sort_unstable();
    assert_eq!(covered, (0..networks.len()).collect::<Vec<_>>());

    for assignment in plan.assignments() {
        let expected_joins = assignment
            .definition()
            .map_or(0, |_| assignment.joins().len().max(1));
        assert_eq!(assignment.joins().len(), expected_joins);
    }
    assert_reconstructs(&plan);
    assert_victimized(&plan);
}

#[test]
fn test_rejected_network_reported_and_skipped() {
    let full = schema(&[("a", "b"), ("x", "b")]);
    let without_x = schema(&[("a", "b")]);
    let networks: Vec<CandidateNetwork> = vec![
        path(&full, &[ts("a", &["alice"]), ts("b", &[]), ts("x", &["xml"])]),
        path(&full, &[ts("a", &["alice"]), ts("b", &[])]),
    ];

    let plan = PlanGenerator::new().plan(&networks, &without_x).unwrap();
    assert_eq!(plan.rejected().len(), 1);
    let rejected = &plan.rejected()[0];
    assert_eq!(rejected.network, 0);
    assert!(matches!(
        rejected.error,
        SearchError::JoinCandidateNotFound { .. }
    ));
    assert!(plan.candidate_networks().all(|a| a.network() == Some(1)));
}

#[test]
fn test_empty_input_is_empty_plan() {
    let graph = schema(&[("a", "b")]);
    let plan = PlanGenerator::new().plan(&[], &graph).unwrap();
    assert!(plan.is_empty());
    assert_eq!(plan.to_string(), "");
    assert!(plan.stats().rows().iter().all(|(_, v)| *v == 0));
}

#[test]
fn test_empty_keywords_flow_through() {
    let graph = schema(&[("a", "b")]);
    let networks = CandidateNetworkGenerator::new()
        .generate(&[], &graph, &Keywords::default(), 3)
        .unwrap();
    let plan = PlanGenerator::new().plan(&networks, &graph).unwrap();
    assert!(plan.is_empty());
}
