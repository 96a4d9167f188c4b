//! Fingerprint-based deduplication.
//!
//! Findings sharing a fingerprint collapse into one. Every merge rule is a
//! commutative, associative fold (max, union, or a total-order pick), so the
//! result never depends on which agent finished first.

use std::collections::{BTreeMap, BTreeSet};

use crate::finding::Finding;

#[derive(Debug, Default)]
pub struct Deduplicator;

impl Deduplicator {
    pub fn new() -> Self {
        Self
    }

    /// Merge findings by fingerprint. Output is ordered by fingerprint.
    pub fn dedup(&self, findings: Vec<Finding>) -> Vec<Finding> {
        let before = findings.len();
        let mut groups: BTreeMap<String, Vec<Finding>> = BTreeMap::new();
        for finding in findings {
            groups
                .entry(finding.fingerprint.clone())
                .or_default()
                .push(finding);
        }

        let merged: Vec<Finding> = groups.into_values().filter_map(merge_group).collect();
        tracing::debug!(before, after = merged.len(), "deduplicated findings");
        merged
    }
}

/// Collapse one fingerprint group.
fn merge_group(group: Vec<Finding>) -> Option<Finding> {
    let mut iter = group.into_iter();
    let first = iter.next()?;
    let mut evidences: BTreeSet<String> = BTreeSet::new();
    collect_lines(&mut evidences, first.evidence.as_deref());
    let mut merged = first;

    for other in iter {
        merged.severity = merged.severity.max(other.severity);
        merged.source_agent_ids.extend(other.source_agent_ids);
        merged.rule_refs.extend(other.rule_refs);
        collect_lines(&mut evidences, other.evidence.as_deref());
        merged.message = richest(merged.message, other.message);
        merged.recommendation = match (merged.recommendation, other.recommendation) {
            (Some(a), Some(b)) => Some(richest(a, b)),
            (a, b) => a.or(b),
        };
        merged.location = match (merged.location, other.location) {
            (Some(a), Some(b)) if a.file_path == b.file_path => Some(a.span(&b)),
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }

    merged.evidence = if evidences.is_empty() {
        None
    } else {
        Some(evidences.into_iter().collect::<Vec<_>>().join("\n"))
    };
    Some(merged)
}

/// Merged evidence is newline-joined, so split it back before re-merging.
fn collect_lines(into: &mut BTreeSet<String>, evidence: Option<&str>) {
    if let Some(text) = evidence {
        into.extend(text.lines().filter(|l| !l.trim().is_empty()).map(str::to_string));
    }
}

/// Longer text wins; equal length falls back to lexical order.
fn richest(a: String, b: String) -> String {
    match a.len().cmp(&b.len()) {
        std::cmp::Ordering::Greater => a,
        std::cmp::Ordering::Less => b,
        std::cmp::Ordering::Equal => a.min(b),
    }
}
