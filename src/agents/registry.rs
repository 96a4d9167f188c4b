//! Static agent catalog.

use std::sync::Arc;

use super::patterns::RuleSpec;
use super::{Agent, AgentDescriptor, CommandAgent, PatternAgent};
use crate::config::EffectiveConfig;
use crate::finding::Severity;
use crate::profile::{Characteristic, Profile};

/// A catalog entry together with its implementation.
#[derive(Clone)]
pub struct RegisteredAgent {
    pub descriptor: AgentDescriptor,
    pub agent: Arc<dyn Agent>,
}

/// Catalog of every agent a run may select. Built once, never mutated.
#[derive(Clone)]
pub struct AgentRegistry {
    entries: Vec<RegisteredAgent>,
}

impl AgentRegistry {
    /// Empty registry; use [`AgentRegistry::with`] to add agents.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add or replace an agent. Entries keep their registration order.
    pub fn with(mut self, descriptor: AgentDescriptor, agent: Arc<dyn Agent>) -> Self {
        let entry = RegisteredAgent { descriptor, agent };
        match self
            .entries
            .iter_mut()
            .find(|e| e.descriptor.id == descriptor.id)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        BUILTIN
            .iter()
            .fold(Self::empty(), |registry, (descriptor, rules)| {
                registry.with(
                    *descriptor,
                    Arc::new(PatternAgent::new(descriptor.domain, *rules)),
                )
            })
    }

    pub fn get(&self, id: &str) -> Option<&AgentDescriptor> {
        self.entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .map(|e| &e.descriptor)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.descriptors().map(|d| d.id).collect()
    }

    /// Implementation to run for `id`: the configured command if any,
    /// otherwise the registered one.
    pub fn implementation(&self, id: &str, config: &EffectiveConfig) -> Option<Arc<dyn Agent>> {
        let entry = self.entries.iter().find(|e| e.descriptor.id == id)?;
        match config.agent_settings(id).and_then(|s| s.command.clone()) {
            Some(command) => Some(Arc::new(CommandAgent::new(command))),
            None => Some(entry.agent.clone()),
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// =============================================================================
// Built-in agents
// =============================================================================

const WEB_MARKUP: &[&str] = &["html", "jsx", "tsx", "vue", "svelte"];

fn has_source(p: &Profile) -> bool {
    p.has(Characteristic::Source)
}

fn has_tests(p: &Profile) -> bool {
    p.has(Characteristic::Tests)
}

fn has_docs(p: &Profile) -> bool {
    p.has(Characteristic::Docs)
}

fn has_backend(p: &Profile) -> bool {
    p.has(Characteristic::Backend)
}

fn has_frontend(p: &Profile) -> bool {
    p.has(Characteristic::Frontend)
}

fn has_database(p: &Profile) -> bool {
    p.has(Characteristic::Database)
}

fn has_concurrent(p: &Profile) -> bool {
    p.has(Characteristic::Concurrent)
}

static BUILTIN: &[(AgentDescriptor, &[RuleSpec])] = &[
    (
        AgentDescriptor {
            id: "security",
            domain: "security",
            description: "Injection, hardcoded credentials, unsafe crypto and TLS settings",
            default_enabled: true,
            applicability: has_source,
        },
        SECURITY_RULES,
    ),
    (
        AgentDescriptor {
            id: "performance",
            domain: "performance",
            description: "Blocking calls on hot paths and wasteful allocations",
            default_enabled: true,
            applicability: has_source,
        },
        PERFORMANCE_RULES,
    ),
    (
        AgentDescriptor {
            id: "testing",
            domain: "testing",
            description: "Disabled, focused and tautological tests",
            default_enabled: true,
            applicability: has_tests,
        },
        TESTING_RULES,
    ),
    (
        AgentDescriptor {
            id: "documentation",
            domain: "documentation",
            description: "Unresolved work markers and placeholder text",
            default_enabled: true,
            applicability: has_docs,
        },
        DOCUMENTATION_RULES,
    ),
    (
        AgentDescriptor {
            id: "networking",
            domain: "networking",
            description: "Plaintext transport, missing timeouts, disabled verification",
            default_enabled: true,
            applicability: has_backend,
        },
        NETWORKING_RULES,
    ),
    (
        AgentDescriptor {
            id: "accessibility",
            domain: "accessibility",
            description: "Missing alt text, non-semantic interaction, focus order",
            default_enabled: true,
            applicability: has_frontend,
        },
        ACCESSIBILITY_RULES,
    ),
    (
        AgentDescriptor {
            id: "database",
            domain: "database",
            description: "Unbounded queries and destructive schema changes",
            default_enabled: true,
            applicability: has_database,
        },
        DATABASE_RULES,
    ),
    (
        AgentDescriptor {
            id: "concurrency",
            domain: "concurrency",
            description: "Shared mutable state and unsupervised tasks (opt-in)",
            default_enabled: false,
            applicability: has_concurrent,
        },
        CONCURRENCY_RULES,
    ),
];

static SECURITY_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "SEC-001",
        pattern: r#"(?i)\b(password|passwd|secret|api[_-]?key|access[_-]?token)\b\s*[:=]\s*["'][^"'\s]{6,}["']"#,
        unless: None,
        severity: Severity::High,
        category: None,
        message: "hardcoded credential in source",
        recommendation: "load secrets from the environment or a secret store",
        extensions: &[],
    },
    RuleSpec {
        id: "SEC-002",
        pattern: r#"(?i)\b(select|insert|update|delete)\b[^;]*["']\s*(\+|%\s|\.format\()"#,
        unless: None,
        severity: Severity::High,
        category: None,
        message: "possible SQL injection: query built by string concatenation",
        recommendation: "use parameterized queries",
        extensions: &[],
    },
    RuleSpec {
        id: "SEC-003",
        pattern: r"\beval\s*\(",
        unless: None,
        severity: Severity::High,
        category: None,
        message: "eval of dynamic input",
        recommendation: "parse the input instead of evaluating it",
        extensions: &["js", "mjs", "cjs", "ts", "jsx", "tsx", "py", "php", "rb"],
    },
    RuleSpec {
        id: "SEC-004",
        pattern: r"(InsecureSkipVerify\s*:\s*true|verify\s*=\s*False|danger_accept_invalid_certs\(\s*true\s*\)|rejectUnauthorized\s*:\s*false)",
        unless: None,
        severity: Severity::High,
        category: None,
        message: "TLS certificate verification disabled",
        recommendation: "keep certificate verification on; pin a CA bundle if needed",
        extensions: &[],
    },
    RuleSpec {
        id: "SEC-005",
        pattern: r"(?i)\b(md5|sha1)\s*(\(|::|\.new)",
        unless: None,
        severity: Severity::Medium,
        category: None,
        message: "weak hash algorithm used",
        recommendation: "use SHA-256 or a password hash such as argon2",
        extensions: &[],
    },
];

static PERFORMANCE_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "PERF-001",
        pattern: r"\b(thread::sleep|time\.sleep|Thread\.sleep)\s*\(",
        unless: None,
        severity: Severity::Medium,
        category: None,
        message: "blocking sleep call",
        recommendation: "use a timer or async sleep instead of blocking the thread",
        extensions: &["rs", "py", "java", "kt"],
    },
    RuleSpec {
        id: "PERF-002",
        pattern: r"\b(readFileSync|writeFileSync|execSync)\s*\(",
        unless: None,
        severity: Severity::Medium,
        category: None,
        message: "synchronous filesystem call blocks the event loop",
        recommendation: "use the promise-based fs API",
        extensions: &["js", "mjs", "cjs", "ts"],
    },
    RuleSpec {
        id: "PERF-003",
        pattern: r"\.collect::<Vec<[^>]*>>\(\)\s*\.len\(\)",
        unless: None,
        severity: Severity::Low,
        category: None,
        message: "collecting into a Vec only to count elements",
        recommendation: "use .count() on the iterator",
        extensions: &["rs"],
    },
];

static TESTING_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "TEST-001",
        pattern: r"\b(it|describe|test)\.only\s*\(",
        unless: None,
        severity: Severity::High,
        category: None,
        message: "focused test left in suite; other tests are skipped",
        recommendation: "remove .only before merging",
        extensions: &["js", "ts", "jsx", "tsx", "mjs"],
    },
    RuleSpec {
        id: "TEST-002",
        pattern: r"(#\[ignore\]|@Disabled\b|\bit\.skip\(|\bxit\(|@pytest\.mark\.skip|\bt\.Skip\()",
        unless: None,
        severity: Severity::Low,
        category: None,
        message: "disabled test",
        recommendation: "fix or delete the test instead of skipping it",
        extensions: &[],
    },
    RuleSpec {
        id: "TEST-003",
        pattern: r"(assert!\(\s*true\s*\)|assertTrue\(\s*true\s*\)|\bassert\s+True\b|expect\(\s*true\s*\)\.toBe\(\s*true\s*\))",
        unless: None,
        severity: Severity::Medium,
        category: None,
        message: "tautological assertion",
        recommendation: "assert on the behavior under test",
        extensions: &[],
    },
];

static DOCUMENTATION_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "DOC-001",
        pattern: r"\b(TODO|FIXME|XXX|HACK)\b",
        unless: None,
        severity: Severity::Info,
        category: None,
        message: "unresolved work marker",
        recommendation: "resolve it or link a tracked issue",
        extensions: &[],
    },
    RuleSpec {
        id: "DOC-002",
        pattern: r"(?i)lorem ipsum",
        unless: None,
        severity: Severity::Low,
        category: None,
        message: "placeholder text",
        recommendation: "replace with real content",
        extensions: &[],
    },
];

static NETWORKING_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "NET-001",
        pattern: r"http://[A-Za-z0-9]",
        unless: Some(r"http://(localhost|127\.0\.0\.1|0\.0\.0\.0|\[::1\]|www\.w3\.org)"),
        severity: Severity::Medium,
        category: None,
        message: "plaintext HTTP endpoint",
        recommendation: "use https",
        extensions: &[],
    },
    RuleSpec {
        id: "NET-002",
        pattern: r"\bhttp\.(Get|Post|Head|PostForm)\(",
        unless: None,
        severity: Severity::Medium,
        category: None,
        message: "request through the default HTTP client has no timeout",
        recommendation: "use an http.Client with Timeout set",
        extensions: &["go"],
    },
    RuleSpec {
        id: "NET-003",
        pattern: r"\brequests\.(get|post|put|patch|delete|head)\(",
        unless: Some(r"timeout\s*="),
        severity: Severity::Medium,
        category: None,
        message: "request without a timeout",
        recommendation: "pass timeout= to every request",
        extensions: &["py"],
    },
    RuleSpec {
        id: "NET-004",
        pattern: r"(InsecureSkipVerify\s*:\s*true|verify\s*=\s*False|danger_accept_invalid_certs\(\s*true\s*\)|rejectUnauthorized\s*:\s*false)",
        unless: None,
        severity: Severity::Medium,
        category: Some("security"),
        message: "outbound connection skips TLS verification",
        recommendation: "verify server certificates",
        extensions: &[],
    },
];

static ACCESSIBILITY_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "A11Y-001",
        pattern: r"<img\b",
        unless: Some(r"\balt\s*="),
        severity: Severity::Medium,
        category: None,
        message: "image without alt text",
        recommendation: "add alt text, or alt=\"\" for decorative images",
        extensions: WEB_MARKUP,
    },
    RuleSpec {
        id: "A11Y-002",
        pattern: r"(?i)<(div|span)\b[^>]*\bon(click|Click)\s*=",
        unless: Some(r"\brole\s*="),
        severity: Severity::Medium,
        category: None,
        message: "click handler on a non-interactive element",
        recommendation: "use a <button> or add role and keyboard handling",
        extensions: WEB_MARKUP,
    },
    RuleSpec {
        id: "A11Y-003",
        pattern: r#"tabindex\s*=\s*["'{]?\s*[1-9]"#,
        unless: None,
        severity: Severity::Low,
        category: None,
        message: "positive tabindex overrides natural focus order",
        recommendation: "use tabindex 0 or -1",
        extensions: WEB_MARKUP,
    },
];

static DATABASE_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "DB-001",
        pattern: r"(?i)\bselect\s+\*\s+from\b",
        unless: None,
        severity: Severity::Low,
        category: None,
        message: "SELECT * fetches unused columns",
        recommendation: "list the columns you need",
        extensions: &[],
    },
    RuleSpec {
        id: "DB-002",
        pattern: r"(?i)^\s*delete\s+from\s+[\w.]+\s*;?\s*$",
        unless: None,
        severity: Severity::High,
        category: None,
        message: "DELETE without a WHERE clause",
        recommendation: "add a WHERE clause or use TRUNCATE deliberately",
        extensions: &["sql"],
    },
    RuleSpec {
        id: "DB-003",
        pattern: r"(?i)\bdrop\s+(table|column)\b",
        unless: None,
        severity: Severity::Medium,
        category: None,
        message: "destructive schema change",
        recommendation: "ship a reversible migration and back up data first",
        extensions: &["sql"],
    },
];

static CONCURRENCY_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "CONC-001",
        pattern: r"\bstatic\s+mut\b",
        unless: None,
        severity: Severity::High,
        category: None,
        message: "mutable static shared across threads",
        recommendation: "use an atomic, Mutex or OnceLock",
        extensions: &["rs"],
    },
    RuleSpec {
        id: "CONC-002",
        pattern: r"\.lock\(\)\.unwrap\(\)",
        unless: None,
        severity: Severity::Low,
        category: None,
        message: "mutex poisoning turned into a panic",
        recommendation: "handle the poison error or use a non-poisoning lock",
        extensions: &["rs"],
    },
    RuleSpec {
        id: "CONC-003",
        pattern: r"\bgo\s+func\s*\(",
        unless: None,
        severity: Severity::Info,
        category: None,
        message: "goroutine started without supervision",
        recommendation: "track it with a WaitGroup or errgroup",
        extensions: &["go"],
    },
];
