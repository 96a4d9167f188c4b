//! Severity gate: threshold filtering, report ordering and the exit code.

use serde::{Deserialize, Serialize};

use crate::cli::{EXIT_FAILED, EXIT_SUCCESS};
use crate::config::EffectiveConfig;
use crate::finding::{Finding, Severity};

/// Finding counts per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveritySummary {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl SeveritySummary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = Self::default();
        for f in findings {
            match f.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
                Severity::Info => summary.info += 1,
            }
        }
        summary
    }

    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.info
    }
}

/// Result of gating one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateResult {
    /// Surviving findings in report order.
    pub findings: Vec<Finding>,
    pub summary: SeveritySummary,
    /// Findings removed by the threshold.
    pub filtered_out: usize,
    /// Surviving findings at or above `fail_on`.
    pub gating: usize,
    pub exit_code: i32,
}

impl GateResult {
    pub fn passed(&self) -> bool {
        self.exit_code == EXIT_SUCCESS
    }
}

pub struct SeverityGate<'a> {
    config: &'a EffectiveConfig,
}

impl<'a> SeverityGate<'a> {
    pub fn new(config: &'a EffectiveConfig) -> Self {
        Self { config }
    }

    pub fn apply(&self, findings: Vec<Finding>) -> GateResult {
        let total = findings.len();
        let mut kept: Vec<Finding> = findings
            .into_iter()
            .filter(|f| f.severity >= self.config.threshold_for_category(&f.category))
            .collect();
        kept.sort_by(Finding::report_order);

        let gating = kept
            .iter()
            .filter(|f| f.severity >= self.config.fail_on)
            .count();
        let exit_code = if gating > 0 { EXIT_FAILED } else { EXIT_SUCCESS };

        tracing::debug!(
            kept = kept.len(),
            filtered = total - kept.len(),
            gating,
            fail_on = %self.config.fail_on,
            "severity gate applied"
        );

        GateResult {
            summary: SeveritySummary::from_findings(&kept),
            filtered_out: total - kept.len(),
            findings: kept,
            gating,
            exit_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::Location;

    fn finding(sev: Severity, category: &str, file: &str, line: usize) -> Finding {
        Finding {
            severity: sev,
            category: category.to_string(),
            location: Some(Location::new(file, line, line)),
            message: "m".to_string(),
            evidence: None,
            recommendation: None,
            rule_refs: Default::default(),
            source_agent_ids: ["a".to_string()].into_iter().collect(),
            fingerprint: format!("{category}{file}{line}"),
        }
    }

    #[test]
    fn test_default_gate_fails_on_high() {
        let config = EffectiveConfig::defaults("/repo");
        let result = SeverityGate::new(&config).apply(vec![
            finding(Severity::Medium, "performance", "a.rs", 1),
            finding(Severity::High, "security", "b.rs", 1),
        ]);
        assert_eq!(result.exit_code, EXIT_FAILED);
        assert_eq!(result.gating, 1);
        assert_eq!(result.findings[0].severity, Severity::High);
    }

    #[test]
    fn test_below_fail_on_passes() {
        let config = EffectiveConfig::defaults("/repo");
        let result = SeverityGate::new(&config).apply(vec![finding(Severity::Medium, "x", "a.rs", 1)]);
        assert!(result.passed());
        assert_eq!(result.summary.medium, 1);
    }

    #[test]
    fn test_empty_passes() {
        let config = EffectiveConfig::defaults("/repo");
        let result = SeverityGate::new(&config).apply(Vec::new());
        assert_eq!(result.exit_code, EXIT_SUCCESS);
        assert_eq!(result.summary.total(), 0);
    }

    #[test]
    fn test_global_and_category_thresholds() {
        let mut config = EffectiveConfig::defaults("/repo");
        config.severity_threshold = Severity::Low;
        config
            .category_thresholds
            .insert("documentation".to_string(), Severity::High);

        let result = SeverityGate::new(&config).apply(vec![
            finding(Severity::Info, "security", "a.rs", 1),
            finding(Severity::Low, "security", "a.rs", 2),
            finding(Severity::Medium, "documentation", "README.md", 1),
            finding(Severity::High, "documentation", "README.md", 9),
        ]);
        assert_eq!(result.findings.len(), 2);
        assert_eq!(result.filtered_out, 2);
    }

    #[test]
    fn test_filtered_findings_do_not_gate() {
        let mut config = EffectiveConfig::defaults("/repo");
        config.severity_threshold = Severity::Critical;
        let result = SeverityGate::new(&config).apply(vec![finding(Severity::High, "x", "a.rs", 1)]);
        assert!(result.passed());
        assert!(result.findings.is_empty());
    }

    #[test]
    fn test_sort_is_total_and_stable() {
        let config = EffectiveConfig::defaults("/repo");
        let input = vec![
            finding(Severity::Low, "b", "z.rs", 3),
            finding(Severity::Critical, "a", "z.rs", 1),
            finding(Severity::Low, "a", "a.rs", 10),
            finding(Severity::Low, "a", "a.rs", 2),
            finding(Severity::Low, "c", "a.rs", 2),
        ];
        let mut reversed = input.clone();
        reversed.reverse();

        let gate = SeverityGate::new(&config);
        let a = gate.apply(input);
        let b = gate.apply(reversed);
        assert_eq!(a, b);

        let keys: Vec<_> = a
            .findings
            .iter()
            .map(|f| (f.file_path().unwrap().to_string(), f.line_start(), f.category.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("z.rs".to_string(), 1, "a".to_string()),
                ("a.rs".to_string(), 2, "a".to_string()),
                ("a.rs".to_string(), 2, "c".to_string()),
                ("a.rs".to_string(), 10, "a".to_string()),
                ("z.rs".to_string(), 3, "b".to_string()),
            ]
        );
    }
}
