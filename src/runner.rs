//! Agent runner: executes the selected agents concurrently.
//!
//! Each agent runs as its own task against a shared read-only scope and
//! config, bounded by a semaphore and a per-agent timeout. Failures, panics
//! and timeouts are recorded per agent and never touch sibling tasks. The
//! runner returns once every task reached a terminal state, or as soon as the
//! run is cancelled.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::agents::{AgentContext, AgentRegistry};
use crate::config::EffectiveConfig;
use crate::error::{Result, ReviewError};
use crate::finding::RawFinding;
use crate::scope::Scope;

/// Terminal state of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentStatus {
    Succeeded { findings: usize },
    Failed { reason: String },
    TimedOut { after_ms: u64 },
}

impl AgentStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, AgentStatus::Succeeded { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgentStatus::Succeeded { .. } => "succeeded",
            AgentStatus::Failed { .. } => "failed",
            AgentStatus::TimedOut { .. } => "timed_out",
        }
    }

    /// Human-readable failure reason; empty for successes.
    pub fn reason(&self) -> String {
        match self {
            AgentStatus::Succeeded { .. } => String::new(),
            AgentStatus::Failed { reason } => reason.clone(),
            AgentStatus::TimedOut { after_ms } => {
                format!("timed out after {:?}", Duration::from_millis(*after_ms))
            }
        }
    }
}

/// What happened to one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub agent: String,
    #[serde(flatten)]
    pub status: AgentStatus,
}

impl AgentOutcome {
    /// Failure outcome as an [`ReviewError::AgentExecution`], for logging.
    pub fn error(&self) -> Option<ReviewError> {
        (!self.status.is_success()).then(|| ReviewError::AgentExecution {
            agent: self.agent.clone(),
            detail: self.status.reason(),
        })
    }
}

/// Raw output of one successful agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutput {
    pub agent: String,
    pub findings: Vec<RawFinding>,
}

/// Everything the runner collected, in selection order.
#[derive(Debug, Clone, Default)]
pub struct RunnerOutput {
    pub outcomes: Vec<AgentOutcome>,
    pub outputs: Vec<AgentOutput>,
}

impl RunnerOutput {
    pub fn degraded(&self) -> bool {
        self.outcomes.iter().any(|o| !o.status.is_success())
    }
}

// =============================================================================
// Cancellation
// =============================================================================

/// Sending half of a run-wide cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving half, cloned into everything that must stop on cancel.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    pub fn new() -> (CancelHandle, Cancellation) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx: Arc::new(tx) }, Cancellation { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Cancellation {
        Self::new().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation was requested.
    pub async fn cancelled(&mut self) {
        // A dropped sender can never cancel; park forever.
        if self.rx.wait_for(|c| *c).await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// Runner
// =============================================================================

/// Executes agents with isolation, per-agent timeouts and a bounded pool.
pub struct AgentRunner<'a> {
    registry: &'a AgentRegistry,
    progress: Option<indicatif::ProgressBar>,
}

impl<'a> AgentRunner<'a> {
    pub fn new(registry: &'a AgentRegistry) -> Self {
        Self {
            registry,
            progress: None,
        }
    }

    /// Tick this progress bar as agents finish.
    pub fn with_progress(mut self, progress: Option<indicatif::ProgressBar>) -> Self {
        self.progress = progress;
        self
    }

    /// Run `selected` agents and wait for all of them.
    ///
    /// Returns [`ReviewError::Cancelled`] if `cancel` fires first; every
    /// in-flight task is aborted in that case.
    pub async fn run(
        &self,
        selected: &[&str],
        scope: Arc<Scope>,
        config: Arc<EffectiveConfig>,
        mut cancel: Cancellation,
    ) -> Result<RunnerOutput> {
        if cancel.is_cancelled() {
            return Err(ReviewError::Cancelled);
        }

        let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        let mut join_set = JoinSet::new();
        let mut slots: Vec<Option<(AgentStatus, Vec<RawFinding>)>> = vec![None; selected.len()];

        for (idx, id) in selected.iter().enumerate() {
            let Some(agent) = self.registry.implementation(id, &config) else {
                slots[idx] = Some((
                    AgentStatus::Failed {
                        reason: "agent is not registered".to_string(),
                    },
                    Vec::new(),
                ));
                continue;
            };

            let ctx = AgentContext {
                agent_id: id.to_string(),
                scope: Arc::clone(&scope),
                config: Arc::clone(&config),
            };
            let budget = config.agent_timeout(id);
            let permits = Arc::clone(&permits);
            let span = tracing::info_span!("agent", agent = %id);

            join_set.spawn(
                async move {
                    // The semaphore is never closed, so acquire cannot fail.
                    let _permit = permits.acquire_owned().await.ok();
                    let started = Instant::now();
                    let result = run_isolated(agent.run(&ctx), budget).await;
                    tracing::debug!(
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        status = result.0.label(),
                        "agent finished"
                    );
                    (idx, result)
                }
                .instrument(span),
            );
        }

        // Barrier: wait for every task, unless the run is cancelled.
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!("cancellation requested, aborting {} agent task(s)", join_set.len());
                    join_set.abort_all();
                    while join_set.join_next().await.is_some() {}
                    if let Some(pb) = &self.progress {
                        pb.abandon_with_message("cancelled");
                    }
                    return Err(ReviewError::Cancelled);
                }
                joined = join_set.join_next() => {
                    match joined {
                        None => break,
                        Some(Ok((idx, result))) => {
                            if let Some(pb) = &self.progress {
                                pb.set_message(selected[idx].to_string());
                                pb.inc(1);
                            }
                            slots[idx] = Some(result);
                        }
                        Some(Err(e)) => {
                            // Panics are caught inside the task; this is an abort.
                            tracing::warn!(error = %e, "agent task did not complete");
                        }
                    }
                }
            }
        }

        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }

        let mut output = RunnerOutput::default();
        for (id, slot) in selected.iter().zip(slots) {
            let (status, findings) = slot.unwrap_or_else(|| {
                (
                    AgentStatus::Failed {
                        reason: "agent task aborted".to_string(),
                    },
                    Vec::new(),
                )
            });
            if status.is_success() {
                output.outputs.push(AgentOutput {
                    agent: id.to_string(),
                    findings,
                });
            } else {
                tracing::warn!(agent = %id, reason = %status.reason(), "agent did not succeed");
            }
            output.outcomes.push(AgentOutcome {
                agent: id.to_string(),
                status,
            });
        }

        Ok(output)
    }
}

/// Drive one agent future with a time budget, converting panics into failures.
async fn run_isolated<F>(fut: F, budget: Duration) -> (AgentStatus, Vec<RawFinding>)
where
    F: std::future::Future<Output = anyhow::Result<Vec<RawFinding>>>,
{
    match tokio::time::timeout(budget, AssertUnwindSafe(fut).catch_unwind()).await {
        Err(_) => (
            AgentStatus::TimedOut {
                after_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
            },
            Vec::new(),
        ),
        Ok(Err(panic)) => (
            AgentStatus::Failed {
                reason: format!("agent panicked: {}", panic_message(panic.as_ref())),
            },
            Vec::new(),
        ),
        Ok(Ok(Err(e))) => (
            AgentStatus::Failed {
                reason: format!("{:#}", e),
            },
            Vec::new(),
        ),
        Ok(Ok(Ok(findings))) => (
            AgentStatus::Succeeded {
                findings: findings.len(),
            },
            findings,
        ),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
