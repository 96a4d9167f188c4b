//! Core finding types shared by every stage of a review.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Severity levels for findings.
///
/// Variants are declared from least to most severe so the derived `Ord`
/// can be used directly for gating (`sev >= threshold`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All severities, most severe first.
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Info => "INFO",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "info" => Ok(Severity::Info),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// Where a finding points to. Lines are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file_path: String,
    pub line_start: usize,
    pub line_end: usize,
}

impl Location {
    pub fn new(file_path: impl Into<String>, line_start: usize, line_end: usize) -> Self {
        let line_end = line_end.max(line_start);
        Self {
            file_path: file_path.into(),
            line_start,
            line_end,
        }
    }

    /// Smallest location covering both `self` and `other` (same file assumed).
    pub fn span(&self, other: &Location) -> Location {
        Location {
            file_path: self.file_path.clone(),
            line_start: self.line_start.min(other.line_start),
            line_end: self.line_end.max(other.line_end),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line_start == 0 {
            write!(f, "{}", self.file_path)
        } else if self.line_end > self.line_start {
            write!(f, "{}:{}-{}", self.file_path, self.line_start, self.line_end)
        } else {
            write!(f, "{}:{}", self.file_path, self.line_start)
        }
    }
}

/// Unvalidated finding exactly as an agent emitted it.
pub type RawFinding = serde_json::Value;

/// A validated, fingerprinted issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    /// Every distinct rule reference contributing to this finding.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub rule_refs: BTreeSet<String>,
    pub source_agent_ids: BTreeSet<String>,
    pub fingerprint: String,
}

impl Finding {
    pub fn file_path(&self) -> Option<&str> {
        self.location.as_ref().map(|l| l.file_path.as_str())
    }

    pub fn line_start(&self) -> usize {
        self.location.as_ref().map(|l| l.line_start).unwrap_or(0)
    }

    /// Total order used by the report: severity descending, then file, line, category.
    ///
    /// Remaining fields break ties so identical inputs always sort identically.
    pub fn report_order(a: &Finding, b: &Finding) -> std::cmp::Ordering {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.file_path().unwrap_or("").cmp(b.file_path().unwrap_or("")))
            .then_with(|| a.line_start().cmp(&b.line_start()))
            .then_with(|| a.category.cmp(&b.category))
            .then_with(|| a.fingerprint.cmp(&b.fingerprint))
            .then_with(|| a.message.cmp(&b.message))
    }
}
