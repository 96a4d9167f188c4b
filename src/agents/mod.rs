//! Review agents: the pluggable checkers a run fans out to.
//!
//! An agent is opaque to the engine. Given a scope and the effective config,
//! it returns raw finding objects; the engine never inspects how it decided.

mod command;
mod patterns;
mod registry;
mod selector;

pub use command::CommandAgent;
pub use patterns::{PatternAgent, PatternRule};
pub use registry::{AgentRegistry, RegisteredAgent};
pub use selector::select;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::EffectiveConfig;
use crate::finding::RawFinding;
use crate::profile::Profile;
use crate::scope::Scope;

/// Read-only view handed to each agent task.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub agent_id: String,
    pub scope: Arc<Scope>,
    pub config: Arc<EffectiveConfig>,
}

/// A domain checker.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Inspect the scope and return candidate findings.
    ///
    /// Returning an error marks this agent as failed for the run; it does not
    /// affect other agents.
    async fn run(&self, ctx: &AgentContext) -> anyhow::Result<Vec<RawFinding>>;
}

/// Immutable catalog entry describing an agent.
#[derive(Clone, Copy)]
pub struct AgentDescriptor {
    pub id: &'static str,
    pub domain: &'static str,
    pub description: &'static str,
    /// Whether auto-detection may select this agent at all.
    pub default_enabled: bool,
    pub applicability: fn(&Profile) -> bool,
}

impl std::fmt::Debug for AgentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDescriptor")
            .field("id", &self.id)
            .field("domain", &self.domain)
            .field("default_enabled", &self.default_enabled)
            .finish()
    }
}

impl AgentDescriptor {
    /// True when profiling alone would select this agent.
    pub fn auto_selects(&self, profile: &Profile) -> bool {
        self.default_enabled && (self.applicability)(profile)
    }
}
