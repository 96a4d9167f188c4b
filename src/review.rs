//! One review invocation, end to end.
//!
//! ```text
//! config ─► scope ─► profile ─► select ─► run agents ─► normalize ─► dedup ─► gate
//! ```
//!
//! Only the agent phase is concurrent. Everything else runs sequentially on
//! immutable inputs, so a [`ReviewRun`] is fully determined by the scope, the
//! config and what the agents returned.

use std::path::PathBuf;
use std::sync::Arc;

use crate::agents::{self, AgentRegistry};
use crate::config::{CliOverrides, ConfigLoader, EffectiveConfig};
use crate::dedup::Deduplicator;
use crate::error::Result;
use crate::finding::Finding;
use crate::gate::{SeverityGate, SeveritySummary};
use crate::normalize::{DroppedFinding, FindingNormalizer, MessageSignature};
use crate::profile::{self, Profile};
use crate::runner::{AgentOutcome, AgentRunner, Cancellation};
use crate::scope::{Scope, ScopeResolver, ScopeSpec};

/// The aggregate for one invocation, fully populated before rendering.
#[derive(Debug, Clone)]
pub struct ReviewRun {
    pub scope: Scope,
    pub config: EffectiveConfig,
    pub profile: Profile,
    pub selected_agents: Vec<String>,
    pub agent_outcomes: Vec<AgentOutcome>,
    /// Deduplicated, gated findings in report order.
    pub findings: Vec<Finding>,
    pub summary: SeveritySummary,
    pub dropped: Vec<DroppedFinding>,
    pub degraded: bool,
    pub exit_code: i32,
}

impl ReviewRun {
    /// Agents that failed or timed out.
    pub fn agents_failed(&self) -> impl Iterator<Item = &AgentOutcome> {
        self.agent_outcomes.iter().filter(|o| !o.status.is_success())
    }
}

/// What to review and how.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub scope: ScopeSpec,
    /// Explicit agent list; replaces auto-detection.
    pub pick: Option<Vec<String>>,
    pub config_file: Option<PathBuf>,
    pub overrides: CliOverrides,
}

impl ReviewRequest {
    pub fn new(scope: ScopeSpec) -> Self {
        Self {
            scope,
            pick: None,
            config_file: None,
            overrides: CliOverrides::default(),
        }
    }
}

/// Drives the review pipeline for one project root.
pub struct Reviewer {
    root: PathBuf,
    registry: AgentRegistry,
    signature: Option<Arc<dyn MessageSignature>>,
    progress: bool,
}

impl Reviewer {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            registry: AgentRegistry::builtin(),
            signature: None,
            progress: false,
        }
    }

    pub fn with_registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_signature(mut self, signature: Arc<dyn MessageSignature>) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Show an agent progress bar on stderr.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Load, merge and validate the effective config. Fails fast.
    pub fn load_config(&self, file: Option<PathBuf>, overrides: &CliOverrides) -> Result<EffectiveConfig> {
        let config = ConfigLoader::new(&self.root).with_file(file).load(overrides)?;
        config.validate(&self.registry)?;
        Ok(config)
    }

    pub async fn review(&self, request: &ReviewRequest, cancel: Cancellation) -> Result<ReviewRun> {
        let config = self.load_config(request.config_file.clone(), &request.overrides)?;
        self.review_with_config(config, request, cancel).await
    }

    /// Run the pipeline with an already validated config.
    pub async fn review_with_config(
        &self,
        config: EffectiveConfig,
        request: &ReviewRequest,
        cancel: Cancellation,
    ) -> Result<ReviewRun> {
        let scope = ScopeResolver::new(&config).resolve(&request.scope)?;
        let profile = profile::profile(&scope.files, config.project_type.as_deref());
        tracing::info!(
            scope = %scope.spec.describe(),
            files = scope.files.len(),
            languages = ?profile.languages,
            "resolved scope"
        );

        let mut selected = agents::select(&self.registry, &profile, &config, request.pick.as_deref())?;
        if scope.is_empty() {
            tracing::info!("nothing to review");
            selected.clear();
        }
        tracing::info!(agents = ?selected, "selected agents");

        let scope = Arc::new(scope);
        let config = Arc::new(config);
        let runner_output = AgentRunner::new(&self.registry)
            .with_progress(self.progress_bar(selected.len()))
            .run(&selected, Arc::clone(&scope), Arc::clone(&config), cancel)
            .await?;

        let normalizer = FindingNormalizer::new(&config);
        let normalizer = match &self.signature {
            Some(signature) => normalizer.with_signature(Box::new(SharedSignature(Arc::clone(signature)))),
            None => normalizer,
        };
        let normalized = normalizer.normalize(&runner_output.outputs);
        let merged = Deduplicator::new().dedup(normalized.findings);
        let gated = SeverityGate::new(&config).apply(merged);

        let degraded = runner_output.degraded();
        if degraded {
            tracing::warn!("run is degraded: at least one agent did not finish");
        }

        Ok(ReviewRun {
            scope: Arc::unwrap_or_clone(scope),
            config: Arc::unwrap_or_clone(config),
            profile,
            selected_agents: selected.iter().map(|s| s.to_string()).collect(),
            agent_outcomes: runner_output.outcomes,
            findings: gated.findings,
            summary: gated.summary,
            dropped: normalized.dropped,
            degraded,
            exit_code: gated.exit_code,
        })
    }

    fn progress_bar(&self, agents: usize) -> Option<indicatif::ProgressBar> {
        if !self.progress || agents == 0 {
            return None;
        }
        let pb = indicatif::ProgressBar::new(agents as u64);
        if let Ok(style) =
            indicatif::ProgressStyle::with_template("{spinner:.cyan} reviewing [{pos}/{len}] {msg}")
        {
            pb.set_style(style);
        }
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        Some(pb)
    }
}

/// Adapter so a shared strategy can be boxed per run.
struct SharedSignature(Arc<dyn MessageSignature>);

impl MessageSignature for SharedSignature {
    fn signature(&self, category: &str, message: &str) -> String {
        self.0.signature(category, message)
    }
}
