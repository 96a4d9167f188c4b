//! Revgate - multi-agent code review gate.
//!
//! A review run takes a scope (changed files, the whole project, or a
//! path/glob), picks the domain agents that fit the project, runs them
//! concurrently with per-agent timeouts, and merges what they report into a
//! single deduplicated, severity-ranked list with a CI exit code.
//!
//! # Architecture
//!
//! - `config`: YAML project config and the merged `EffectiveConfig`
//! - `scope`: scope argument to file list (git diff, walk, glob)
//! - `profile`: languages and project characteristics of a scope
//! - `agents`: the `Agent` trait, the registry of built-in agents and selection
//! - `runner`: bounded, isolated, cancellable agent execution
//! - `normalize`: schema validation and fingerprinting of raw findings
//! - `dedup`: fingerprint-based merging across agents
//! - `gate`: threshold filtering, ordering and the exit code
//! - `review`: the pipeline tying the stages together
//! - `report`: pretty, JSON and SARIF renderers
//!
//! # Adding an Agent
//!
//! Implement [`agents::Agent`] and register it with an
//! [`agents::AgentDescriptor`] via [`agents::AgentRegistry::with`]. Any agent
//! can also be backed by an external command from the project config.

pub mod agents;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod error;
pub mod finding;
pub mod gate;
pub mod logging;
pub mod normalize;
pub mod profile;
pub mod report;
pub mod review;
pub mod runner;
pub mod scope;

pub use agents::{Agent, AgentContext, AgentDescriptor, AgentRegistry};
pub use config::{ConfigLoader, EffectiveConfig};
pub use error::{ReviewError, Result};
pub use finding::{Finding, Location, RawFinding, Severity};
pub use normalize::{KeywordSignature, MessageSignature};
pub use review::{ReviewRequest, ReviewRun, Reviewer};
pub use runner::{AgentStatus, Cancellation};
pub use scope::{Scope, ScopeSpec};
