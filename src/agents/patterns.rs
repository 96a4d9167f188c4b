//! Line-pattern checker backing the built-in agents.
//!
//! Each rule is a regex applied line by line to files with matching
//! extensions. Agents also pick up `custom-rules` from their config.

use anyhow::Context;
use async_trait::async_trait;
use rayon::prelude::*;
use regex::Regex;
use serde_json::json;
use std::path::Path;

use super::{Agent, AgentContext};
use crate::config::CustomRule;
use crate::finding::{RawFinding, Severity};
use crate::scope::relative_to;

/// Files larger than this are skipped.
const MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;

/// Static rule definition used to build the built-in rule tables.
#[derive(Debug, Clone, Copy)]
pub struct RuleSpec {
    pub id: &'static str,
    pub pattern: &'static str,
    /// Lines also matching this pattern are not flagged.
    pub unless: Option<&'static str>,
    pub severity: Severity,
    /// Reported category; `None` means the agent's domain.
    pub category: Option<&'static str>,
    pub message: &'static str,
    pub recommendation: &'static str,
    /// Applicable extensions; empty means all files.
    pub extensions: &'static [&'static str],
}

/// Compiled rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub id: String,
    pub regex: Regex,
    pub unless: Option<Regex>,
    pub severity: Severity,
    pub category: Option<String>,
    pub message: String,
    pub recommendation: Option<String>,
    pub extensions: Vec<String>,
}

impl PatternRule {
    pub fn compile(spec: &RuleSpec) -> anyhow::Result<Self> {
        Ok(Self {
            id: spec.id.to_string(),
            regex: Regex::new(spec.pattern)
                .with_context(|| format!("compiling rule {} pattern", spec.id))?,
            unless: spec
                .unless
                .map(Regex::new)
                .transpose()
                .with_context(|| format!("compiling rule {} exclusion", spec.id))?,
            severity: spec.severity,
            category: spec.category.map(str::to_string),
            message: spec.message.to_string(),
            recommendation: Some(spec.recommendation.to_string()),
            extensions: spec.extensions.iter().map(|e| e.to_string()).collect(),
        })
    }

    pub fn from_custom(rule: &CustomRule) -> anyhow::Result<Self> {
        Ok(Self {
            id: rule.id.clone(),
            regex: Regex::new(&rule.pattern)
                .with_context(|| format!("compiling custom rule {} pattern", rule.id))?,
            unless: None,
            severity: rule.severity,
            category: None,
            message: rule.message.clone(),
            recommendation: rule.recommendation.clone(),
            extensions: rule.extensions.clone(),
        })
    }

    fn applies_to(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    fn matches(&self, line: &str) -> bool {
        self.regex.is_match(line) && !self.unless.as_ref().is_some_and(|u| u.is_match(line))
    }
}

/// Agent that scans the scope with a fixed rule table.
pub struct PatternAgent {
    domain: &'static str,
    rules: &'static [RuleSpec],
}

impl PatternAgent {
    pub fn new(domain: &'static str, rules: &'static [RuleSpec]) -> Self {
        Self { domain, rules }
    }

    /// Built-in rules followed by the agent's custom rules.
    fn compiled_rules(&self, ctx: &AgentContext) -> anyhow::Result<Vec<PatternRule>> {
        let mut rules = self
            .rules
            .iter()
            .map(PatternRule::compile)
            .collect::<anyhow::Result<Vec<_>>>()?;

        if let Some(settings) = ctx.config.agent_settings(&ctx.agent_id) {
            for custom in &settings.custom_rules {
                rules.push(PatternRule::from_custom(custom)?);
            }
        }
        Ok(rules)
    }
}

#[async_trait]
impl Agent for PatternAgent {
    async fn run(&self, ctx: &AgentContext) -> anyhow::Result<Vec<RawFinding>> {
        let rules = self.compiled_rules(ctx)?;
        let domain = self.domain;
        let scope = ctx.scope.clone();

        // File scanning is blocking work; keep it off the async workers.
        tokio::task::spawn_blocking(move || {
            let findings: Vec<RawFinding> = scope
                .files
                .par_iter()
                .flat_map_iter(|file| scan_file(&scope.root, file, domain, &rules))
                .collect();
            findings
        })
        .await
        .context("pattern scan task")
    }
}

/// Scan a single file. Unreadable or non-UTF-8 files yield nothing.
fn scan_file(root: &Path, file: &Path, domain: &str, rules: &[PatternRule]) -> Vec<RawFinding> {
    let applicable: Vec<&PatternRule> = rules.iter().filter(|r| r.applies_to(file)).collect();
    if applicable.is_empty() {
        return Vec::new();
    }

    match std::fs::metadata(file) {
        Ok(m) if m.len() <= MAX_FILE_BYTES => {}
        _ => return Vec::new(),
    }
    let content = match std::fs::read_to_string(file) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(file = %file.display(), error = %e, "skipping unreadable file");
            return Vec::new();
        }
    };

    let file_str = relative_to(root, file);
    let mut findings = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line_num = idx + 1;
        for rule in &applicable {
            if !rule.matches(line) {
                continue;
            }
            findings.push(json!({
                "severity": rule.severity.as_str(),
                "category": rule.category.as_deref().unwrap_or(domain),
                "location": {
                    "file_path": file_str,
                    "line_start": line_num,
                    "line_end": line_num,
                },
                "message": rule.message,
                "evidence": truncate(line.trim(), 200),
                "recommendation": rule.recommendation,
                "rule_ref": rule.id,
            }));
        }
    }

    findings
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentSettings, EffectiveConfig};
    use crate::scope::{Scope, ScopeSpec};
    use std::sync::Arc;
    use tempfile::TempDir;

    static RULES: &[RuleSpec] = &[
        RuleSpec {
            id: "T-001",
            pattern: r"\beval\(",
            unless: Some(r"//\s*safe"),
            severity: Severity::High,
            category: None,
            message: "use of eval",
            recommendation: "do not eval",
            extensions: &["js"],
        },
        RuleSpec {
            id: "T-002",
            pattern: r"http://",
            unless: None,
            severity: Severity::Low,
            category: Some("networking"),
            message: "plain http url",
            recommendation: "use https",
            extensions: &[],
        },
    ];

    fn context(temp: &TempDir, files: &[(&str, &str)], config: EffectiveConfig) -> AgentContext {
        let mut paths = Vec::new();
        for (name, content) in files {
            let path = temp.path().join(name);
            std::fs::write(&path, content).unwrap();
            paths.push(path);
        }
        AgentContext {
            agent_id: "test".to_string(),
            scope: Arc::new(Scope::new(ScopeSpec::Full, temp.path().to_path_buf(), paths)),
            config: Arc::new(config),
        }
    }

    #[tokio::test]
    async fn test_scan_respects_extensions_and_unless() {
        let temp = TempDir::new().unwrap();
        let ctx = context(
            &temp,
            &[
                ("a.js", "eval(x)\neval(y) // safe\nfetch('http://x')\n"),
                ("b.py", "eval(x)\n"),
            ],
            EffectiveConfig::defaults(temp.path()),
        );

        let agent = PatternAgent::new("security", RULES);
        let mut findings = agent.run(&ctx).await.unwrap();
        findings.sort_by_key(|f| f["rule_ref"].as_str().unwrap().to_string());

        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0]["rule_ref"], "T-001");
        assert_eq!(findings[0]["category"], "security");
        assert_eq!(findings[0]["location"]["line_start"], 1);
        assert_eq!(findings[0]["location"]["file_path"], "a.js");
        assert_eq!(findings[1]["category"], "networking");
        assert_eq!(findings[1]["location"]["line_start"], 3);
    }

    #[tokio::test]
    async fn test_custom_rules_are_applied() {
        let temp = TempDir::new().unwrap();
        let mut config = EffectiveConfig::defaults(temp.path());
        config.agents.insert(
            "test".to_string(),
            AgentSettings {
                custom_rules: vec![CustomRule {
                    id: "CUSTOM-1".to_string(),
                    pattern: "legacy_api".to_string(),
                    severity: Severity::Medium,
                    message: "legacy api call".to_string(),
                    recommendation: None,
                    extensions: vec![],
                }],
                ..Default::default()
            },
        );
        let ctx = context(&temp, &[("x.rs", "legacy_api();\n")], config);

        let findings = PatternAgent::new("security", &[]).run(&ctx).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0]["rule_ref"], "CUSTOM-1");
        assert_eq!(findings[0]["severity"], "MEDIUM");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }
}
