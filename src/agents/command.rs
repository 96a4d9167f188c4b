//! Agent backed by an external command.
//!
//! The command gets the scope on stdin (one absolute path per line) and must
//! print its findings as JSON on stdout, either a bare array or an object
//! with a `findings` array.

use anyhow::Context;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{Agent, AgentContext};
use crate::finding::RawFinding;

pub struct CommandAgent {
    command: Vec<String>,
}

impl CommandAgent {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Agent for CommandAgent {
    async fn run(&self, ctx: &AgentContext) -> anyhow::Result<Vec<RawFinding>> {
        let (exe, args) = self
            .command
            .split_first()
            .context("agent command is empty")?;

        // kill_on_drop makes a timed-out or cancelled task take the child with it.
        let mut child = Command::new(exe)
            .args(args)
            .current_dir(&ctx.scope.root)
            .env("REVGATE_AGENT", &ctx.agent_id)
            .env("REVGATE_ROOT", &ctx.scope.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {}", exe))?;

        // Feed stdin from its own task so a command that writes while it
        // reads cannot fill stdout and stall against us.
        let writer = child.stdin.take().map(|mut stdin| {
            let mut input = String::new();
            for file in &ctx.scope.files {
                input.push_str(&file.to_string_lossy());
                input.push('\n');
            }
            let agent_id = ctx.agent_id.clone();
            tokio::spawn(async move {
                // A command that ignores stdin may close it early; that is fine.
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    tracing::debug!(agent = %agent_id, error = %e, "agent closed stdin");
                }
            })
        });

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("waiting for {}", exe))?;

        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                tracing::debug!(agent = %ctx.agent_id, error = %e, "stdin writer did not finish");
            }
        }

        if !output.status.success() {
            anyhow::bail!(
                "{} exited with {}: {}",
                exe,
                output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        parse_output(&output.stdout).with_context(|| format!("parsing output of {}", exe))
    }
}

/// Accept `[...]` or `{"findings": [...]}`.
fn parse_output(stdout: &[u8]) -> anyhow::Result<Vec<RawFinding>> {
    let text = String::from_utf8_lossy(stdout);
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value = serde_json::from_str(text.trim())?;
    match value {
        serde_json::Value::Array(items) => Ok(items),
        serde_json::Value::Object(mut obj) => match obj.remove("findings") {
            Some(serde_json::Value::Array(items)) => Ok(items),
            _ => anyhow::bail!("expected a \"findings\" array"),
        },
        _ => anyhow::bail!("expected a JSON array of findings"),
    }
}
