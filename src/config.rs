//! Configuration loading for revgate.
//!
//! Built-in defaults are layered under an optional project file, and CLI
//! flags are layered over both. Merging is per field: a project file that only
//! sets `agents.disabled` keeps every other default.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agents::AgentRegistry;
use crate::error::{Result, ReviewError};
use crate::finding::Severity;

/// Project config file names, searched in order at the project root.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &[".revgate.yaml", "revgate.yaml", ".revgate.yml"];

/// Commented starter config written by `revgate init`.
pub const CONFIG_TEMPLATE: &str = include_str!("templates/default.yaml");

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LINE_TOLERANCE: usize = 5;

// =============================================================================
// File schema
// =============================================================================

/// Project override file, as written on disk. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ProjectConfig {
    #[serde(default)]
    pub project: Option<ProjectSection>,
    #[serde(default, alias = "severity_threshold", deserialize_with = "severity_opt")]
    pub severity_threshold: Option<Severity>,
    #[serde(default, alias = "fail_on", deserialize_with = "severity_opt")]
    pub fail_on: Option<Severity>,
    #[serde(default, alias = "category_thresholds", deserialize_with = "severity_map")]
    pub category_thresholds: BTreeMap<String, Severity>,
    #[serde(default, alias = "timeout_secs")]
    pub timeout_secs: Option<u64>,
    #[serde(default, alias = "max_concurrency")]
    pub max_concurrency: Option<usize>,
    #[serde(default, alias = "line_tolerance")]
    pub line_tolerance: Option<usize>,
    /// Glob patterns for paths to drop from every scope (e.g. "**/vendor/**").
    #[serde(default)]
    pub exclude: Option<Vec<String>>,
    #[serde(default)]
    pub agents: Option<AgentsSection>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectSection {
    /// Declared project type; skips detection when set.
    #[serde(default, rename = "type")]
    pub project_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentsSection {
    #[serde(default)]
    pub always: Option<Vec<String>>,
    #[serde(default)]
    pub disabled: Option<Vec<String>>,
    #[serde(default)]
    pub config: BTreeMap<String, AgentOverride>,
}

/// Per-agent settings under `agents.config.<agent-id>`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct AgentOverride {
    #[serde(default, alias = "severity_threshold", deserialize_with = "severity_opt")]
    pub severity_threshold: Option<Severity>,
    #[serde(default, alias = "timeout_secs")]
    pub timeout_secs: Option<u64>,
    /// Run this command instead of the built-in implementation.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default, alias = "custom_rules")]
    pub custom_rules: Vec<CustomRule>,
}

/// An extra line pattern an agent should flag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CustomRule {
    pub id: String,
    pub pattern: String,
    #[serde(default = "default_rule_severity", deserialize_with = "severity")]
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub recommendation: Option<String>,
    /// File extensions the rule applies to; empty means all files.
    #[serde(default)]
    pub extensions: Vec<String>,
}

fn default_rule_severity() -> Severity {
    Severity::Medium
}

fn severity<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Severity, D::Error> {
    let s = String::deserialize(d)?;
    s.parse().map_err(serde::de::Error::custom)
}

fn severity_opt<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<Severity>, D::Error> {
    match Option::<String>::deserialize(d)? {
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

fn severity_map<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<BTreeMap<String, Severity>, D::Error> {
    let raw = BTreeMap::<String, String>::deserialize(d)?;
    raw.into_iter()
        .map(|(k, v)| v.parse().map(|s| (k, s)).map_err(serde::de::Error::custom))
        .collect()
}

impl ProjectConfig {
    /// Parse a project config from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ReviewError::config_parse(path.display().to_string(), e))?;
        Self::parse_str(&content).map_err(|e| match e {
            ReviewError::ConfigParse { detail, .. } => {
                ReviewError::config_parse(path.display().to_string(), detail)
            }
            other => other,
        })
    }

    pub fn parse_str(content: &str) -> Result<Self> {
        // An empty file is a valid "no overrides" document.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| ReviewError::config_parse("<input>", e))
    }
}

// =============================================================================
// Effective config
// =============================================================================

/// Settings resolved for one agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentSettings {
    pub severity_threshold: Option<Severity>,
    pub timeout: Option<Duration>,
    pub command: Option<Vec<String>>,
    pub custom_rules: Vec<CustomRule>,
}

/// Merged, immutable configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    /// Project root every relative path is resolved against.
    pub root: PathBuf,
    /// Project file that contributed to this config, if any.
    pub source: Option<PathBuf>,
    pub project_type: Option<String>,
    pub always: Vec<String>,
    pub disabled: Vec<String>,
    pub severity_threshold: Severity,
    pub category_thresholds: BTreeMap<String, Severity>,
    pub fail_on: Severity,
    pub timeout: Duration,
    pub max_concurrency: usize,
    pub line_tolerance: usize,
    pub exclude: Vec<String>,
    pub agents: BTreeMap<String, AgentSettings>,
}

impl EffectiveConfig {
    /// Built-in defaults rooted at `root`.
    pub fn defaults<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            source: None,
            project_type: None,
            always: Vec::new(),
            disabled: Vec::new(),
            severity_threshold: Severity::Info,
            category_thresholds: BTreeMap::new(),
            fail_on: Severity::High,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_concurrency: default_concurrency(),
            line_tolerance: DEFAULT_LINE_TOLERANCE,
            exclude: Vec::new(),
            agents: BTreeMap::new(),
        }
    }

    /// Layer a project file over this config, field by field.
    pub fn apply_project(&mut self, file: ProjectConfig) {
        if let Some(t) = file.project.and_then(|p| p.project_type) {
            self.project_type = Some(t);
        }
        if let Some(s) = file.severity_threshold {
            self.severity_threshold = s;
        }
        if let Some(s) = file.fail_on {
            self.fail_on = s;
        }
        self.category_thresholds.extend(file.category_thresholds);
        if let Some(t) = file.timeout_secs {
            self.timeout = Duration::from_secs(t);
        }
        if let Some(n) = file.max_concurrency {
            self.max_concurrency = n;
        }
        if let Some(n) = file.line_tolerance {
            self.line_tolerance = n;
        }
        if let Some(ex) = file.exclude {
            self.exclude = ex;
        }
        if let Some(agents) = file.agents {
            if let Some(always) = agents.always {
                self.always = always;
            }
            if let Some(disabled) = agents.disabled {
                self.disabled = disabled;
            }
            for (id, ov) in agents.config {
                let entry = self.agents.entry(id).or_default();
                if ov.severity_threshold.is_some() {
                    entry.severity_threshold = ov.severity_threshold;
                }
                if let Some(t) = ov.timeout_secs {
                    entry.timeout = Some(Duration::from_secs(t));
                }
                if ov.command.is_some() {
                    entry.command = ov.command;
                }
                if !ov.custom_rules.is_empty() {
                    entry.custom_rules = ov.custom_rules;
                }
            }
        }
    }

    /// Layer CLI flags over this config.
    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(s) = cli.severity_threshold {
            self.severity_threshold = s;
        }
        if let Some(s) = cli.fail_on {
            self.fail_on = s;
        }
        if let Some(t) = cli.timeout_secs {
            self.timeout = Duration::from_secs(t);
        }
        if let Some(n) = cli.max_concurrency {
            self.max_concurrency = n;
        }
    }

    pub fn agent_settings(&self, agent_id: &str) -> Option<&AgentSettings> {
        self.agents.get(agent_id)
    }

    /// Time budget for one agent (per-agent override, else global).
    pub fn agent_timeout(&self, agent_id: &str) -> Duration {
        self.agent_settings(agent_id)
            .and_then(|s| s.timeout)
            .unwrap_or(self.timeout)
    }

    /// Minimum severity an agent's own findings must reach to be kept.
    pub fn agent_threshold(&self, agent_id: &str) -> Option<Severity> {
        self.agent_settings(agent_id).and_then(|s| s.severity_threshold)
    }

    /// Gate threshold for a category (per-category override, else global).
    pub fn threshold_for_category(&self, category: &str) -> Severity {
        self.category_thresholds
            .get(category)
            .copied()
            .unwrap_or(self.severity_threshold)
    }

    pub fn is_disabled(&self, agent_id: &str) -> bool {
        self.disabled.iter().any(|d| d == agent_id)
    }

    /// Compile the `exclude` globs into one matcher for root-relative paths.
    pub fn exclude_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude {
            let glob = Glob::new(pattern).map_err(|e| {
                ReviewError::config_parse(
                    self.source_name(),
                    format!("invalid exclude pattern {:?}: {}", pattern, e),
                )
            })?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| ReviewError::config_parse(self.source_name(), e))
    }

    fn source_name(&self) -> String {
        self.source
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<defaults>".to_string())
    }

    /// Validate the merged config against the agent catalog.
    pub fn validate(&self, registry: &AgentRegistry) -> Result<()> {
        let fail = |detail: String| Err(ReviewError::config_parse(self.source_name(), detail));

        let lists = [("agents.always", &self.always), ("agents.disabled", &self.disabled)];
        for (key, ids) in lists {
            for id in ids.iter() {
                if registry.get(id).is_none() {
                    return fail(format!("unknown agent {:?} in {}", id, key));
                }
            }
        }

        for (id, settings) in &self.agents {
            if registry.get(id).is_none() {
                return fail(format!("unknown agent {:?} in agents.config", id));
            }
            if let Some(cmd) = &settings.command {
                if cmd.is_empty() {
                    return fail(format!("agents.config.{}.command is empty", id));
                }
            }
            for rule in &settings.custom_rules {
                if let Err(e) = regex::Regex::new(&rule.pattern) {
                    return fail(format!(
                        "invalid pattern {:?} in agents.config.{}.custom-rules: {}",
                        rule.pattern, id, e
                    ));
                }
            }
        }

        self.exclude_set()?;

        if self.max_concurrency == 0 {
            return fail("max-concurrency must be at least 1".to_string());
        }
        if self.timeout.is_zero() {
            return fail("timeout-secs must be at least 1".to_string());
        }

        Ok(())
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Config values supplied on the command line. They win over everything else.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub severity_threshold: Option<Severity>,
    pub fail_on: Option<Severity>,
    pub timeout_secs: Option<u64>,
    pub max_concurrency: Option<usize>,
}

// =============================================================================
// Loader
// =============================================================================

/// Builds an [`EffectiveConfig`] from defaults, a project file and CLI flags.
pub struct ConfigLoader {
    root: PathBuf,
    explicit: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            explicit: None,
        }
    }

    /// Use this file instead of discovering one at the root.
    pub fn with_file(mut self, path: Option<PathBuf>) -> Self {
        self.explicit = path;
        self
    }

    /// Find the project config file, if any.
    pub fn discover(&self) -> Result<Option<PathBuf>> {
        if let Some(path) = &self.explicit {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                self.root.join(path)
            };
            if !path.is_file() {
                return Err(ReviewError::config_parse(
                    path.display().to_string(),
                    "file does not exist",
                ));
            }
            return Ok(Some(path));
        }

        Ok(DEFAULT_CONFIG_NAMES
            .iter()
            .map(|name| self.root.join(name))
            .find(|p| p.is_file()))
    }

    /// Load and merge. A malformed project file aborts the run.
    pub fn load(&self, cli: &CliOverrides) -> Result<EffectiveConfig> {
        let mut config = EffectiveConfig::defaults(&self.root);

        if let Some(path) = self.discover()? {
            tracing::debug!(path = %path.display(), "loading project config");
            let file = ProjectConfig::parse_file(&path)?;
            config.apply_project(file);
            config.source = Some(path);
        }

        config.apply_cli(cli);
        Ok(config)
    }
}
