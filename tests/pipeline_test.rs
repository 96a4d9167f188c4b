//! End-to-end review pipeline tests with stub and built-in agents.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use revgate::agents::{Agent, AgentContext, AgentDescriptor, AgentRegistry};
use revgate::profile::Profile;
use revgate::report::{self, RenderOptions};
use revgate::runner::Cancellation;
use revgate::{ReviewError, ReviewRequest, ReviewRun, Reviewer, ScopeSpec, Severity};

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Clone)]
enum Mode {
    Emit(Vec<Value>),
    Fail,
    Hang,
}

struct StubAgent {
    mode: Mode,
    delay: Duration,
}

#[async_trait]
impl Agent for StubAgent {
    async fn run(&self, _ctx: &AgentContext) -> anyhow::Result<Vec<Value>> {
        tokio::time::sleep(self.delay).await;
        match &self.mode {
            Mode::Emit(findings) => Ok(findings.clone()),
            Mode::Fail => anyhow::bail!("linter crashed"),
            Mode::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

fn always(_: &Profile) -> bool {
    true
}

fn stub(id: &'static str) -> AgentDescriptor {
    AgentDescriptor {
        id,
        domain: id,
        description: "stub agent",
        default_enabled: true,
        applicability: always,
    }
}

fn registry(agents: Vec<(&'static str, Mode, u64)>) -> AgentRegistry {
    agents
        .into_iter()
        .fold(AgentRegistry::empty(), |reg, (id, mode, delay_ms)| {
            reg.with(
                stub(id),
                Arc::new(StubAgent {
                    mode,
                    delay: Duration::from_millis(delay_ms),
                }),
            )
        })
}

fn project(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    for (path, content) in files {
        let full = temp.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }
    let root = temp.path().canonicalize().unwrap();
    (temp, root)
}

fn write_config(root: &Path, yaml: &str) {
    fs::write(root.join(".revgate.yaml"), yaml).unwrap();
}

async fn review(reviewer: &Reviewer, request: ReviewRequest) -> Result<ReviewRun, ReviewError> {
    reviewer.review(&request, Cancellation::never()).await
}

fn full() -> ReviewRequest {
    ReviewRequest::new(ScopeSpec::Full)
}

fn finding(severity: &str, category: &str, file: &str, line: usize, message: &str) -> Value {
    json!({
        "severity": severity,
        "category": category,
        "location": {"file_path": file, "line_start": line, "line_end": line},
        "message": message,
    })
}

fn tls_fixture() -> String {
    let mut source = String::from("package app\n");
    for i in 2..42 {
        source.push_str(&format!("// filler {}\n", i));
    }
    source.push_str("var tr = &http.Transport{TLSClientConfig: &tls.Config{InsecureSkipVerify: true}}\n");
    source
}

// =============================================================================
// Deduplication
// =============================================================================

#[tokio::test]
async fn test_cross_agent_duplicate_collapses() {
    let (_temp, root) = project(&[("app/server.go", "package app\n")]);
    let reg = registry(vec![
        (
            "security",
            Mode::Emit(vec![finding(
                "HIGH",
                "security",
                "app/server.go",
                42,
                "TLS certificate verification disabled",
            )]),
            0,
        ),
        (
            "networking",
            Mode::Emit(vec![finding(
                "MEDIUM",
                "security",
                "app/server.go",
                42,
                "HTTP client skips TLS verification",
            )]),
            0,
        ),
    ]);

    let run = review(&Reviewer::new(&root).with_registry(reg), full())
        .await
        .unwrap();

    assert_eq!(run.findings.len(), 1);
    let merged = &run.findings[0];
    assert_eq!(merged.severity, Severity::High);
    assert_eq!(
        merged.source_agent_ids.iter().cloned().collect::<Vec<_>>(),
        vec!["networking".to_string(), "security".to_string()]
    );
    assert_eq!(run.exit_code, 1);
}

#[tokio::test]
async fn test_builtin_security_and_networking_merge() {
    let source = tls_fixture();
    let (_temp, root) = project(&[("app/server.go", source.as_str())]);
    let mut request = full();
    request.pick = Some(vec!["security".to_string(), "networking".to_string()]);

    let run = review(&Reviewer::new(&root), request).await.unwrap();

    let at_42: Vec<_> = run
        .findings
        .iter()
        .filter(|f| f.file_path() == Some("app/server.go") && f.line_start() == 42)
        .collect();
    assert_eq!(at_42.len(), 1, "findings: {:#?}", run.findings);
    let merged = at_42[0];
    assert_eq!(merged.category, "security");
    assert_eq!(merged.severity, Severity::High);
    assert!(merged.source_agent_ids.contains("security"));
    assert!(merged.source_agent_ids.contains("networking"));
    assert!(merged.rule_refs.contains("SEC-004"));
    assert!(merged.rule_refs.contains("NET-004"));
}

#[tokio::test]
async fn test_severity_never_downgraded() {
    let (_temp, root) = project(&[("a.py", "x = 1\n")]);
    let reg = registry(vec![
        ("one", Mode::Emit(vec![finding("MEDIUM", "security", "a.py", 3, "SQL injection risk")]), 0),
        ("two", Mode::Emit(vec![finding("HIGH", "security", "a.py", 3, "SQL injection through string concatenation")]), 0),
    ]);
    let run = review(&Reviewer::new(&root).with_registry(reg), full())
        .await
        .unwrap();
    assert_eq!(run.findings.len(), 1);
    assert_eq!(run.findings[0].severity, Severity::High);
}

#[tokio::test]
async fn test_completion_order_does_not_change_result() {
    let (_temp, root) = project(&[("a.rs", "fn main() {}\n")]);
    let a = vec![
        finding("LOW", "performance", "a.rs", 10, "clone inside hot loop"),
        finding("HIGH", "security", "a.rs", 1, "hardcoded password"),
    ];
    let b = vec![
        finding("MEDIUM", "performance", "a.rs", 11, "needless clone in loop"),
        finding("INFO", "documentation", "a.rs", 1, "TODO left behind"),
    ];

    let fast_a = registry(vec![("a", Mode::Emit(a.clone()), 0), ("b", Mode::Emit(b.clone()), 80)]);
    let fast_b = registry(vec![("a", Mode::Emit(a), 80), ("b", Mode::Emit(b), 0)]);

    let run1 = review(&Reviewer::new(&root).with_registry(fast_a), full()).await.unwrap();
    let run2 = review(&Reviewer::new(&root).with_registry(fast_b), full()).await.unwrap();

    assert_eq!(run1.findings, run2.findings);
    assert_eq!(run1.exit_code, run2.exit_code);
    assert_eq!(
        report::render_json(&run1, RenderOptions::default()).unwrap(),
        report::render_json(&run2, RenderOptions::default()).unwrap()
    );
}

// =============================================================================
// Selection
// =============================================================================

#[tokio::test]
async fn test_disabled_agent_never_runs() {
    let (_temp, root) = project(&[("web/index.html", "<html>\n<img src=\"logo.png\">\n</html>\n")]);
    write_config(&root, "project:\n  type: web\n");

    let enabled = review(&Reviewer::new(&root), full()).await.unwrap();
    assert!(enabled.selected_agents.contains(&"accessibility".to_string()));
    assert!(enabled.findings.iter().any(|f| f.category == "accessibility"));

    write_config(&root, "project:\n  type: web\nagents:\n  disabled: [accessibility]\n");
    let disabled = review(&Reviewer::new(&root), full()).await.unwrap();
    assert!(!disabled.selected_agents.contains(&"accessibility".to_string()));
    assert!(disabled.findings.iter().all(|f| f.category != "accessibility"));
    assert!(disabled
        .findings
        .iter()
        .all(|f| !f.source_agent_ids.contains("accessibility")));
}

#[tokio::test]
async fn test_pick_of_disabled_agent_is_config_error() {
    let (_temp, root) = project(&[("a.rs", "fn main() {}\n")]);
    write_config(&root, "agents:\n  disabled: [security]\n");
    let mut request = full();
    request.pick = Some(vec!["security".to_string()]);

    let err = review(&Reviewer::new(&root), request).await.unwrap_err();
    assert!(matches!(err, ReviewError::Config(_)));
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_per_agent_threshold_from_config() {
    let (_temp, root) = project(&[("a.rs", "fn main() {}\n")]);
    write_config(&root, "agents:\n  config:\n    lint:\n      severity-threshold: high\n");
    let reg = registry(vec![(
        "lint",
        Mode::Emit(vec![
            finding("LOW", "style", "a.rs", 1, "long line"),
            finding("CRITICAL", "style", "a.rs", 2, "tab indentation mixed with spaces"),
        ]),
        0,
    )]);

    let run = review(&Reviewer::new(&root).with_registry(reg), full())
        .await
        .unwrap();
    assert_eq!(run.findings.len(), 1);
    assert_eq!(run.findings[0].severity, Severity::Critical);
}

// =============================================================================
// Failure isolation
// =============================================================================

#[tokio::test]
async fn test_failed_and_slow_agents_degrade_run() {
    let (_temp, root) = project(&[("a.rs", "fn main() {}\n")]);
    write_config(&root, "timeout-secs: 1\n");
    let reg = registry(vec![
        ("ok", Mode::Emit(vec![finding("MEDIUM", "performance", "a.rs", 1, "blocking sleep")]), 0),
        ("broken", Mode::Fail, 0),
        ("slow", Mode::Hang, 0),
    ]);

    let run = review(&Reviewer::new(&root).with_registry(reg), full())
        .await
        .unwrap();

    assert!(run.degraded);
    assert_eq!(run.findings.len(), 1);
    assert_eq!(run.exit_code, 0);

    let failed: Vec<(&str, &str)> = run
        .agents_failed()
        .map(|o| (o.agent.as_str(), o.status.label()))
        .collect();
    assert_eq!(failed, vec![("broken", "failed"), ("slow", "timed_out")]);

    let json: Value =
        serde_json::from_str(&report::render_json(&run, RenderOptions::default()).unwrap()).unwrap();
    assert_eq!(json["degraded"], true);
    assert_eq!(json["agents_failed"].as_array().unwrap().len(), 2);
    assert!(json["agents_failed"][0]["reason"]
        .as_str()
        .unwrap()
        .contains("linter crashed"));
}

#[tokio::test]
async fn test_malformed_findings_dropped_individually() {
    let (_temp, root) = project(&[("a.rs", "fn main() {}\n")]);
    let reg = registry(vec![(
        "mixed",
        Mode::Emit(vec![
            finding("HIGH", "security", "a.rs", 1, "hardcoded token"),
            json!({"severity": "SEVERE", "category": "security", "message": "bad enum"}),
            json!({"category": "security", "message": "no severity"}),
            finding("LOW", "testing", "a.rs", 5, "ignored test"),
        ]),
        0,
    )]);

    let run = review(&Reviewer::new(&root).with_registry(reg), full())
        .await
        .unwrap();
    assert_eq!(run.findings.len(), 2);
    assert_eq!(run.dropped.len(), 2);
    assert!(!run.degraded);
}

#[tokio::test]
async fn test_cancellation_produces_no_report() {
    let (_temp, root) = project(&[("a.rs", "fn main() {}\n")]);
    let reg = registry(vec![("slow", Mode::Hang, 0), ("ok", Mode::Emit(Vec::new()), 0)]);
    let reviewer = Reviewer::new(&root).with_registry(reg);

    let (handle, cancel) = Cancellation::new();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    let err = reviewer.review(&full(), cancel).await.unwrap_err();
    assert!(matches!(err, ReviewError::Cancelled));
    assert_eq!(err.exit_code(), 3);
}

// =============================================================================
// Gating and scope
// =============================================================================

#[tokio::test]
async fn test_full_scope_clean_run() {
    let (_temp, root) = project(&[
        ("src/lib.rs", "pub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n"),
        ("README.md", "# Adder\n\nAdds numbers.\n"),
    ]);

    let run = review(&Reviewer::new(&root), full()).await.unwrap();
    assert_eq!(run.exit_code, 0);
    assert!(run.findings.is_empty());
    assert!(!run.degraded);
}

fn git(root: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .current_dir(root)
        .args(["-c", "user.name=revgate", "-c", "user.email=revgate@example.com"])
        .args(["-c", "commit.gpgsign=false"])
        .args(args)
        .status()
        .unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

#[tokio::test]
async fn test_clean_diff_is_nothing_to_review() {
    let (_temp, root) = project(&[("app/server.go", "package app\n")]);
    git(&root, &["init", "-q"]);
    git(&root, &["add", "-A"]);
    git(&root, &["commit", "-q", "-m", "initial"]);

    let reg = registry(vec![(
        "security",
        Mode::Emit(vec![finding("CRITICAL", "security", "app/server.go", 1, "hardcoded secret")]),
        0,
    )]);
    let reviewer = Reviewer::new(&root).with_registry(reg);
    let run = review(&reviewer, ReviewRequest::new(ScopeSpec::Diff { base: None }))
        .await
        .unwrap();

    assert!(run.scope.is_empty());
    assert!(run.selected_agents.is_empty());
    assert!(run.agent_outcomes.is_empty());
    assert!(run.findings.is_empty());
    assert!(!run.degraded);
    assert_eq!(run.exit_code, 0);

    // Once the file changes, the same agent runs and gates.
    fs::write(root.join("app/server.go"), "package app\n// edited\n").unwrap();
    let run = review(&reviewer, ReviewRequest::new(ScopeSpec::Diff { base: None }))
        .await
        .unwrap();
    assert_eq!(run.selected_agents, vec!["security".to_string()]);
    assert_eq!(run.exit_code, 1);
}

#[tokio::test]
async fn test_threshold_filters_and_fail_on_gates() {
    let (_temp, root) = project(&[("a.rs", "fn main() {}\n")]);
    let emit = vec![
        finding("LOW", "performance", "a.rs", 1, "small allocation"),
        finding("MEDIUM", "security", "a.rs", 20, "weak hash used"),
    ];

    let reg = || registry(vec![("x", Mode::Emit(emit.clone()), 0)]);

    let run = review(&Reviewer::new(&root).with_registry(reg()), full()).await.unwrap();
    assert_eq!(run.findings.len(), 2);
    assert_eq!(run.exit_code, 0);

    let mut request = full();
    request.overrides.severity_threshold = Some(Severity::Medium);
    request.overrides.fail_on = Some(Severity::Medium);
    let run = review(&Reviewer::new(&root).with_registry(reg()), request).await.unwrap();
    assert_eq!(run.findings.len(), 1);
    assert_eq!(run.exit_code, 1);
}

#[tokio::test]
async fn test_scope_outside_root_is_fatal() {
    let (_temp, root) = project(&[("a.rs", "fn main() {}\n")]);
    let request = ReviewRequest::new(ScopeSpec::Path("../elsewhere/*.rs".to_string()));
    let err = review(&Reviewer::new(&root), request).await.unwrap_err();
    assert!(matches!(err, ReviewError::ScopeResolution(_)));
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_invalid_config_is_fatal() {
    let (_temp, root) = project(&[("a.rs", "fn main() {}\n")]);
    write_config(&root, "severity-threshold: urgent\n");
    let err = review(&Reviewer::new(&root), full()).await.unwrap_err();
    assert!(matches!(err, ReviewError::ConfigParse { .. }));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let source = tls_fixture();
    let (_temp, root) = project(&[
        ("app/server.go", source.as_str()),
        ("app/db.sql", "SELECT * FROM users;\n"),
    ]);

    let first = review(&Reviewer::new(&root), full()).await.unwrap();
    let second = review(&Reviewer::new(&root), full()).await.unwrap();

    let fingerprints = |run: &ReviewRun| run.findings.iter().map(|f| f.fingerprint.clone()).collect::<Vec<_>>();
    assert!(!first.findings.is_empty());
    assert_eq!(fingerprints(&first), fingerprints(&second));
    assert_eq!(first.exit_code, second.exit_code);
}
