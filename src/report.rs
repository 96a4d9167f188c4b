//! Output formatting for review runs.
//!
//! Supports three output formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption
//! - SARIF: Static Analysis Results Interchange Format for IDE/CI integration
//!
//! Renderers are pure: they return the document and never print. Identical
//! runs render byte-identical output.

use colored::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write;

use crate::finding::{Finding, Severity};
use crate::gate::SeveritySummary;
use crate::normalize::DroppedFinding;
use crate::review::ReviewRun;

/// Report schema version.
pub const REPORT_VERSION: &str = "1";

/// Rendering knobs that do not change the run itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions<'a> {
    /// Timestamp stamped into the report; omitted when `None`.
    pub rendered_at: Option<&'a str>,
    /// Pretty only: list each dropped finding with its reason.
    pub show_dropped: bool,
}

// =============================================================================
// JSON Format
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_at: Option<String>,
    pub scope: JsonScope,
    pub agents_run: Vec<String>,
    pub agents_failed: Vec<JsonAgentFailure>,
    pub degraded: bool,
    pub exit_code: i32,
    pub summary: SeveritySummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<DroppedFinding>,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonScope {
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
    pub root: String,
    /// Root-relative paths.
    pub files: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonAgentFailure {
    pub agent: String,
    pub status: String,
    pub reason: String,
}

pub fn build_json(run: &ReviewRun, opts: RenderOptions<'_>) -> JsonReport {
    let arg = match &run.scope.spec {
        crate::scope::ScopeSpec::Diff { base } => base.clone(),
        crate::scope::ScopeSpec::Full => None,
        crate::scope::ScopeSpec::Path(p) => Some(p.clone()),
    };

    JsonReport {
        version: REPORT_VERSION.to_string(),
        rendered_at: opts.rendered_at.map(str::to_string),
        scope: JsonScope {
            mode: run.scope.spec.mode().to_string(),
            arg,
            root: run.scope.root.to_string_lossy().to_string(),
            files: run.scope.files.iter().map(|f| run.scope.relative(f)).collect(),
        },
        agents_run: run.selected_agents.clone(),
        agents_failed: run
            .agents_failed()
            .map(|o| JsonAgentFailure {
                agent: o.agent.clone(),
                status: o.status.label().to_string(),
                reason: o.status.reason(),
            })
            .collect(),
        degraded: run.degraded,
        exit_code: run.exit_code,
        summary: run.summary,
        dropped: run.dropped.clone(),
        findings: run.findings.clone(),
    }
}

pub fn render_json(run: &ReviewRun, opts: RenderOptions<'_>) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&build_json(run, opts))?)
}

// =============================================================================
// SARIF Format
// =============================================================================

const SARIF_VERSION: &str = "2.1.0";
const SARIF_SCHEMA: &str = "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json";
const TOOL_NAME: &str = "revgate";

#[derive(Serialize, Deserialize)]
struct SarifReport {
    version: String,
    #[serde(rename = "$schema")]
    schema: String,
    runs: Vec<SarifRun>,
}

#[derive(Serialize, Deserialize)]
struct SarifRun {
    tool: SarifTool,
    invocations: Vec<SarifInvocation>,
    results: Vec<SarifResult>,
}

#[derive(Serialize, Deserialize)]
struct SarifTool {
    driver: SarifDriver,
}

#[derive(Serialize, Deserialize)]
struct SarifDriver {
    name: String,
    version: String,
    rules: Vec<SarifRule>,
}

#[derive(Serialize, Deserialize)]
struct SarifRule {
    id: String,
    #[serde(rename = "shortDescription")]
    short_description: SarifMessage,
    #[serde(rename = "defaultConfiguration")]
    default_config: SarifRuleConfig,
}

#[derive(Serialize, Deserialize)]
struct SarifRuleConfig {
    level: String,
}

#[derive(Serialize, Deserialize)]
struct SarifInvocation {
    #[serde(rename = "executionSuccessful")]
    execution_successful: bool,
    #[serde(rename = "exitCode")]
    exit_code: i32,
    #[serde(
        rename = "toolExecutionNotifications",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    notifications: Vec<SarifNotification>,
}

#[derive(Serialize, Deserialize)]
struct SarifNotification {
    level: String,
    message: SarifMessage,
}

#[derive(Serialize, Deserialize)]
struct SarifResult {
    #[serde(rename = "ruleId")]
    rule_id: String,
    level: String,
    message: SarifMessage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    locations: Vec<SarifLocation>,
    #[serde(rename = "partialFingerprints")]
    partial_fingerprints: SarifFingerprints,
    properties: SarifResultProperties,
}

#[derive(Serialize, Deserialize)]
struct SarifFingerprints {
    #[serde(rename = "revgate/v1")]
    revgate_v1: String,
}

#[derive(Serialize, Deserialize)]
struct SarifResultProperties {
    category: String,
    severity: Severity,
    #[serde(rename = "sourceAgentIds")]
    source_agent_ids: Vec<String>,
    #[serde(rename = "ruleRefs", default, skip_serializing_if = "Vec::is_empty")]
    rule_refs: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct SarifMessage {
    text: String,
}

#[derive(Serialize, Deserialize)]
struct SarifLocation {
    #[serde(rename = "physicalLocation")]
    physical_location: SarifPhysicalLocation,
}

#[derive(Serialize, Deserialize)]
struct SarifPhysicalLocation {
    #[serde(rename = "artifactLocation")]
    artifact_location: SarifArtifact,
    region: SarifRegion,
}

#[derive(Serialize, Deserialize)]
struct SarifArtifact {
    uri: String,
}

#[derive(Serialize, Deserialize)]
struct SarifRegion {
    #[serde(rename = "startLine")]
    start_line: usize,
    #[serde(rename = "endLine")]
    end_line: usize,
}

fn map_severity_to_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical | Severity::High => "error",
        Severity::Medium => "warning",
        Severity::Low | Severity::Info => "note",
    }
}

/// Primary rule id: first rule reference, else the category.
fn rule_id(f: &Finding) -> String {
    f.rule_refs
        .iter()
        .next()
        .cloned()
        .unwrap_or_else(|| f.category.clone())
}

pub fn render_sarif(run: &ReviewRun, _opts: RenderOptions<'_>) -> anyhow::Result<String> {
    // One rule per distinct id, highest severity seen sets the default level.
    let mut rule_levels: std::collections::BTreeMap<String, Severity> = Default::default();
    for f in &run.findings {
        let ids: BTreeSet<String> = f
            .rule_refs
            .iter()
            .cloned()
            .chain(std::iter::once(rule_id(f)))
            .collect();
        for id in ids {
            let level = rule_levels.entry(id).or_insert(f.severity);
            *level = (*level).max(f.severity);
        }
    }

    let rules: Vec<SarifRule> = rule_levels
        .into_iter()
        .map(|(id, severity)| SarifRule {
            short_description: SarifMessage {
                text: format!("{} check", id),
            },
            id,
            default_config: SarifRuleConfig {
                level: map_severity_to_level(severity).to_string(),
            },
        })
        .collect();

    let results: Vec<SarifResult> = run
        .findings
        .iter()
        .map(|f| SarifResult {
            rule_id: rule_id(f),
            level: map_severity_to_level(f.severity).to_string(),
            message: SarifMessage {
                text: match &f.recommendation {
                    Some(rec) => format!("{} ({})", f.message, rec),
                    None => f.message.clone(),
                },
            },
            locations: f
                .location
                .iter()
                .map(|loc| SarifLocation {
                    physical_location: SarifPhysicalLocation {
                        artifact_location: SarifArtifact {
                            uri: loc.file_path.clone(),
                        },
                        region: SarifRegion {
                            start_line: loc.line_start.max(1),
                            end_line: loc.line_end.max(loc.line_start).max(1),
                        },
                    },
                })
                .collect(),
            partial_fingerprints: SarifFingerprints {
                revgate_v1: f.fingerprint.clone(),
            },
            properties: SarifResultProperties {
                category: f.category.clone(),
                severity: f.severity,
                source_agent_ids: f.source_agent_ids.iter().cloned().collect(),
                rule_refs: f.rule_refs.iter().cloned().collect(),
            },
        })
        .collect();

    let notifications = run
        .agents_failed()
        .map(|o| SarifNotification {
            level: "error".to_string(),
            message: SarifMessage {
                text: format!("agent {} {}: {}", o.agent, o.status.label(), o.status.reason()),
            },
        })
        .collect();

    let report = SarifReport {
        version: SARIF_VERSION.to_string(),
        schema: SARIF_SCHEMA.to_string(),
        runs: vec![SarifRun {
            tool: SarifTool {
                driver: SarifDriver {
                    name: TOOL_NAME.to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    rules,
                },
            },
            invocations: vec![SarifInvocation {
                execution_successful: !run.degraded,
                exit_code: run.exit_code,
                notifications,
            }],
            results,
        }],
    };

    Ok(serde_json::to_string_pretty(&report)?)
}

// =============================================================================
// Pretty Format
// =============================================================================

pub fn render_pretty(run: &ReviewRun, opts: RenderOptions<'_>) -> anyhow::Result<String> {
    let mut out = String::new();

    // Header
    writeln!(out)?;
    writeln!(out, "  {} v{}", TOOL_NAME.cyan().bold(), env!("CARGO_PKG_VERSION"))?;
    writeln!(out)?;

    writeln!(
        out,
        "  {}{} ({} file{})",
        "Scope:   ".dimmed(),
        run.scope.spec.describe(),
        run.scope.files.len(),
        plural(run.scope.files.len())
    )?;
    let agents = if run.selected_agents.is_empty() {
        "none".to_string()
    } else {
        run.selected_agents.join(", ")
    };
    writeln!(out, "  {}{}", "Agents:  ".dimmed(), agents)?;
    if let Some(ts) = opts.rendered_at {
        writeln!(out, "  {}{}", "Rendered: ".dimmed(), ts)?;
    }
    writeln!(out)?;

    if run.degraded {
        write_degraded_banner(&mut out, run)?;
        writeln!(out)?;
    }

    write_result_summary(&mut out, run)?;
    writeln!(out)?;

    if !run.findings.is_empty() {
        write_findings(&mut out, &run.findings)?;
    }

    if !run.dropped.is_empty() {
        write_dropped(&mut out, &run.dropped, opts.show_dropped)?;
        writeln!(out)?;
    }

    write_final_status(&mut out, run)?;
    writeln!(out)?;
    Ok(out)
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

fn write_degraded_banner(out: &mut String, run: &ReviewRun) -> std::fmt::Result {
    let failed: Vec<_> = run.agents_failed().collect();
    writeln!(
        out,
        "  {}  {} agent{} did not finish; results may be incomplete",
        "⚠ DEGRADED".yellow().bold(),
        failed.len(),
        plural(failed.len())
    )?;
    for o in failed {
        writeln!(out, "    {:<16}{}", o.agent.yellow(), o.status.reason())?;
    }
    Ok(())
}

fn write_result_summary(out: &mut String, run: &ReviewRun) -> std::fmt::Result {
    if run.exit_code == crate::cli::EXIT_SUCCESS {
        write!(out, "  {}", "✓ PASS".green())?;
    } else {
        write!(out, "  {}", "✗ FAIL".red())?;
    }

    let total = run.summary.total();
    write!(out, "  {} finding{}", total, plural(total))?;

    let parts: Vec<String> = Severity::ALL
        .iter()
        .filter(|s| run.summary.count(**s) > 0)
        .map(|s| format!("{} {}", run.summary.count(*s), s.as_str().to_lowercase()))
        .collect();
    if !parts.is_empty() {
        write!(out, "  {}", format!("({})", parts.join(", ")).dimmed())?;
    }
    writeln!(out)
}

fn write_findings(out: &mut String, findings: &[Finding]) -> std::fmt::Result {
    writeln!(out, "  {} ({}):", "Findings".bold(), findings.len())?;
    writeln!(out)?;

    for f in findings {
        write!(out, "    {} ", severity_tag(f.severity))?;
        write!(out, "{:<16}", f.category.dimmed())?;
        match &f.location {
            Some(loc) => writeln!(out, "{}", loc.to_string().blue())?,
            None => writeln!(out, "{}", "(no location)".dimmed())?,
        }

        writeln!(out, "             {}", f.message)?;
        if let Some(evidence) = &f.evidence {
            for line in evidence.lines() {
                writeln!(out, "             {}", format!("│ {}", line).dimmed())?;
            }
        }
        if let Some(rec) = &f.recommendation {
            writeln!(out, "             {} {}", "fix:".green(), rec)?;
        }

        let agents: Vec<&str> = f.source_agent_ids.iter().map(String::as_str).collect();
        let mut meta = format!("agents: {}", agents.join(", "));
        if !f.rule_refs.is_empty() {
            let refs: Vec<&str> = f.rule_refs.iter().map(String::as_str).collect();
            meta.push_str(&format!("  [{}]", refs.join(", ")));
        }
        writeln!(out, "             {}", meta.dimmed())?;
        writeln!(out)?;
    }
    Ok(())
}

fn severity_tag(severity: Severity) -> ColoredString {
    match severity {
        Severity::Critical => "CRIT ".red().bold(),
        Severity::High => "HIGH ".red(),
        Severity::Medium => "MED  ".yellow(),
        Severity::Low => "LOW  ".blue(),
        Severity::Info => "INFO ".dimmed(),
    }
}

fn write_dropped(out: &mut String, dropped: &[DroppedFinding], show_details: bool) -> std::fmt::Result {
    writeln!(out, "  {} ({}):", "Dropped".dimmed(), dropped.len())?;

    if !show_details {
        writeln!(out, "    {}", "(use --show-dropped to see details)".dimmed())?;
        return Ok(());
    }

    for d in dropped {
        writeln!(
            out,
            "    {:<16}{} {}",
            d.agent.dimmed(),
            format!("#{}", d.index).dimmed(),
            d.reason
        )?;
    }
    Ok(())
}

fn write_final_status(out: &mut String, run: &ReviewRun) -> std::fmt::Result {
    write!(
        out,
        "  {}",
        format!(
            "Threshold: {}  Fail-on: {}  Exit: {}",
            run.config.severity_threshold, run.config.fail_on, run.exit_code
        )
        .dimmed()
    )?;
    write!(out, "  ")?;

    if run.exit_code == crate::cli::EXIT_SUCCESS {
        write!(out, "{}", "PASSED".green())?;
    } else {
        write!(out, "{}", "FAILED".red())?;
    }
    if run.degraded {
        write!(out, " {}", "(degraded)".yellow())?;
    }
    writeln!(out)
}
