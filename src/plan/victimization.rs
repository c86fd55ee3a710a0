//! Removal of intermediate results that do not pay for themselves
//!
//! An intermediate result is a victim when it is read by at most one other
//! assignment, or when it pairs two free tuple sets. Victims are inlined
//! into their readers and removed. Inlining can drop another result to a
//! single reader, so the pass repeats until nothing changes.

use super::Assignment;
use crate::expression::AssignmentId;
use std::collections::HashMap;
use tracing::debug;

fn reader_counts(assignments: &[Assignment]) -> HashMap<AssignmentId, usize> {
    let mut counts = HashMap::new();
    for assignment in assignments {
        let mut refs = assignment.references();
        refs.sort();
        refs.dedup();
        for id in refs {
            *counts.entry(id).or_insert(0) += 1;
        }
    }
    counts
}

fn is_victim(assignment: &Assignment, readers: usize) -> bool {
    assignment.is_intermediate_result()
        && (readers <= 1 || assignment.definition().is_some_and(|p| p.is_free_pairing()))
}

/// Inline and delete victims until none remain; returns how many were removed
pub(super) fn victimize(assignments: &mut Vec<Assignment>) -> usize {
    let mut removed = 0;
    loop {
        let counts = reader_counts(assignments);
        let Some(position) = assignments
            .iter()
            .position(|a| is_victim(a, counts.get(&a.id()).copied().unwrap_or(0)))
        else {
            break;
        };

        let victim = assignments.remove(position);
        if let Some(definition) = victim.definition() {
            for reader in assignments.iter_mut() {
                if reader.references().contains(&victim.id()) {
                    reader.inline_reference(victim.id(), definition);
                }
            }
        }
        debug!(
            assignment = %victim.id(),
            readers = counts.get(&victim.id()).copied().unwrap_or(0),
            "intermediate_result_victimized"
        );
        removed += 1;
    }
    removed
}
