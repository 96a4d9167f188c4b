//! Finding normalization and fingerprinting.
//!
//! Raw agent output is validated field by field. A malformed entry is dropped
//! on its own with a logged reason; the rest of that agent's output survives.
//! Every accepted finding gets a fingerprint built from its category, a
//! bucketed location and a message signature.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use crate::config::EffectiveConfig;
use crate::error::ReviewError;
use crate::finding::{Finding, Location, RawFinding, Severity};
use crate::runner::AgentOutput;
use crate::scope::relative_to;

/// Hex characters kept from the sha256 digest.
const FINGERPRINT_LEN: usize = 16;

/// Content tokens used when no vocabulary keyword matches.
const FALLBACK_TOKENS: usize = 4;

// =============================================================================
// Message signatures
// =============================================================================

/// Reduces a message to the part that identifies the underlying issue.
///
/// Two agents describing the same problem in different words should map to
/// the same signature. Implementations must be pure.
pub trait MessageSignature: Send + Sync {
    fn signature(&self, category: &str, message: &str) -> String;
}

/// Keywords that identify an issue within a category.
fn vocabulary(category: &str) -> &'static [&'static str] {
    match category {
        "security" => &[
            "injection", "sql", "xss", "csrf", "secret", "credential", "password", "token",
            "eval", "tls", "hash", "crypto", "deserialization", "traversal", "redirect", "cors",
        ],
        "performance" => &[
            "query", "loop", "allocation", "clone", "copy", "blocking", "sleep", "regex",
            "cache", "quadratic", "n+1",
        ],
        "testing" => &["assertion", "skipped", "ignored", "focused", "sleep", "flaky", "mock"],
        "documentation" => &["undocumented", "docstring", "readme", "todo", "fixme", "changelog"],
        "networking" => &["timeout", "retry", "http", "socket", "dns", "proxy", "keepalive"],
        "accessibility" => &["alt", "label", "aria", "contrast", "tabindex", "focus", "heading"],
        "database" => &["select", "transaction", "index", "migration", "query", "lock", "cursor"],
        "concurrency" => &["mutex", "lock", "deadlock", "race", "atomic", "thread", "await", "channel"],
        _ => &[],
    }
}

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "with", "from", "this", "that", "not", "are", "was", "use", "used",
        "uses", "using", "may", "can", "could", "should", "into", "its", "has", "have", "been",
        "without", "found", "detected", "possible", "potential", "issue",
    ]
    .into_iter()
    .collect()
});

/// Default signature: category vocabulary keywords found in the message.
///
/// When none match, the first few content tokens are used instead. Both
/// variants are sorted so word order does not matter.
#[derive(Debug, Clone)]
pub struct KeywordSignature {
    fallback_tokens: usize,
}

impl Default for KeywordSignature {
    fn default() -> Self {
        Self {
            fallback_tokens: FALLBACK_TOKENS,
        }
    }
}

impl KeywordSignature {
    pub fn with_fallback_tokens(fallback_tokens: usize) -> Self {
        Self {
            fallback_tokens: fallback_tokens.max(1),
        }
    }
}

impl MessageSignature for KeywordSignature {
    fn signature(&self, category: &str, message: &str) -> String {
        let lowered = message.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '+'))
            .filter(|t| !t.is_empty())
            .collect();

        let vocab = vocabulary(category);
        let hits: BTreeSet<&str> = tokens
            .iter()
            .copied()
            .filter(|t| vocab.iter().any(|v| v == t))
            .collect();
        if !hits.is_empty() {
            return hits.into_iter().collect::<Vec<_>>().join(" ");
        }

        let mut content: Vec<&str> = tokens
            .into_iter()
            .filter(|t| t.len() >= 3 && !STOPWORDS.contains(*t))
            .take(self.fallback_tokens)
            .collect();
        content.sort_unstable();
        content.dedup();
        content.join(" ")
    }
}

/// Stable identity for a finding.
///
/// `line_tolerance` is the bucket width: lines `0..tolerance` share a bucket,
/// then `tolerance..2*tolerance`, and so on. Only `line_start` picks the
/// bucket; `line_end` is ignored. Two reports either side of a bucket edge
/// (44 and 45 at width 5) stay separate, and so does a range that starts in
/// an earlier bucket than a line it covers. The fingerprint depends on one
/// finding alone, which keeps grouping independent of agent order.
pub fn fingerprint(
    category: &str,
    location: Option<&Location>,
    signature: &str,
    line_tolerance: usize,
) -> String {
    let (file, bucket) = match location {
        Some(loc) if loc.line_start > 0 => (
            loc.file_path.as_str(),
            (loc.line_start / line_tolerance.max(1)).to_string(),
        ),
        Some(loc) => (loc.file_path.as_str(), "-".to_string()),
        None => ("", "-".to_string()),
    };

    let mut hasher = Sha256::new();
    for part in [category, file, bucket.as_str(), signature] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(FINGERPRINT_LEN);
    hex
}

// =============================================================================
// Normalizer
// =============================================================================

/// A raw finding rejected by schema validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedFinding {
    pub agent: String,
    pub index: usize,
    pub reason: String,
}

impl DroppedFinding {
    pub fn error(&self) -> ReviewError {
        ReviewError::SchemaValidation {
            agent: self.agent.clone(),
            index: self.index,
            detail: self.reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub findings: Vec<Finding>,
    pub dropped: Vec<DroppedFinding>,
    /// Valid findings discarded by a per-agent severity threshold.
    pub below_agent_threshold: usize,
}

pub struct FindingNormalizer<'a> {
    config: &'a EffectiveConfig,
    signature: Box<dyn MessageSignature>,
}

impl<'a> FindingNormalizer<'a> {
    pub fn new(config: &'a EffectiveConfig) -> Self {
        Self {
            config,
            signature: Box::new(KeywordSignature::default()),
        }
    }

    /// Swap the message signature strategy.
    pub fn with_signature(mut self, signature: Box<dyn MessageSignature>) -> Self {
        self.signature = signature;
        self
    }

    pub fn normalize(&self, outputs: &[AgentOutput]) -> Normalized {
        let mut result = Normalized::default();

        for output in outputs {
            let threshold = self.config.agent_threshold(&output.agent);
            for (index, raw) in output.findings.iter().enumerate() {
                match self.normalize_one(&output.agent, raw) {
                    Ok(finding) => {
                        if threshold.is_some_and(|t| finding.severity < t) {
                            result.below_agent_threshold += 1;
                            continue;
                        }
                        result.findings.push(finding);
                    }
                    Err(reason) => {
                        let dropped = DroppedFinding {
                            agent: output.agent.clone(),
                            index,
                            reason,
                        };
                        tracing::warn!(
                            agent = %dropped.agent,
                            index = dropped.index,
                            "{}",
                            dropped.error()
                        );
                        result.dropped.push(dropped);
                    }
                }
            }
        }

        tracing::debug!(
            accepted = result.findings.len(),
            dropped = result.dropped.len(),
            filtered = result.below_agent_threshold,
            "normalized agent output"
        );
        result
    }

    /// Validate one raw finding. The error is the drop reason.
    pub fn normalize_one(&self, agent: &str, raw: &RawFinding) -> Result<Finding, String> {
        let obj = raw
            .as_object()
            .ok_or_else(|| format!("expected an object, got {}", type_name(raw)))?;

        let severity = match obj.get("severity") {
            Some(Value::String(s)) => s.parse::<Severity>()?,
            Some(other) => return Err(format!("severity must be a string, got {}", type_name(other))),
            None => return Err("missing required field \"severity\"".to_string()),
        };
        let category = required_str(obj, "category")?.to_lowercase();
        let message = required_str(obj, "message")?;
        let location = self.location(obj.get("location"))?;
        let evidence = optional_str(obj, "evidence")?;
        let recommendation = optional_str(obj, "recommendation")?;
        let rule_refs = rule_refs(obj)?;

        let signature = self.signature.signature(&category, &message);
        let fingerprint = fingerprint(
            &category,
            location.as_ref(),
            &signature,
            self.config.line_tolerance,
        );

        Ok(Finding {
            severity,
            category,
            location,
            message,
            evidence,
            recommendation,
            rule_refs,
            source_agent_ids: [agent.to_string()].into_iter().collect(),
            fingerprint,
        })
    }

    /// Accepts `{file_path, line_start?, line_end?}` (with `file`/`line`
    /// aliases) or a `"path:line"` string.
    fn location(&self, value: Option<&Value>) -> Result<Option<Location>, String> {
        let (file, start, end) = match value {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(s)) => {
                let (file, line) = match s.rsplit_once(':') {
                    Some((f, l)) if l.parse::<usize>().is_ok() => (f, l.parse().unwrap_or(0)),
                    _ => (s.as_str(), 0),
                };
                (file.to_string(), line, line)
            }
            Some(Value::Object(loc)) => {
                let file = match loc.get("file_path").or_else(|| loc.get("file")) {
                    Some(Value::String(f)) => f.clone(),
                    _ => return Err("location.file_path must be a string".to_string()),
                };
                let start = line_field(loc, &["line_start", "line"])?.unwrap_or(0);
                let end = line_field(loc, &["line_end"])?.unwrap_or(start);
                (file, start, end)
            }
            Some(other) => {
                return Err(format!(
                    "location must be an object or string, got {}",
                    type_name(other)
                ))
            }
        };

        if file.trim().is_empty() {
            return Err("location.file_path is empty".to_string());
        }
        Ok(Some(Location::new(self.normalize_path(&file), start, end)))
    }

    /// Root-relative, forward slashes, no leading `./`.
    fn normalize_path(&self, file: &str) -> String {
        let relative = relative_to(&self.config.root, Path::new(file)).replace('\\', "/");
        relative.trim_start_matches("./").to_string()
    }
}

fn required_str(obj: &Map<String, Value>, key: &str) -> Result<String, String> {
    match obj.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) => Err(format!("required field \"{}\" is empty", key)),
        Some(other) => Err(format!("{} must be a string, got {}", key, type_name(other))),
        None => Err(format!("missing required field \"{}\"", key)),
    }
}

fn optional_str(obj: &Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => Err(format!("{} must be a string, got {}", key, type_name(other))),
    }
}

fn line_field(obj: &Map<String, Value>, keys: &[&str]) -> Result<Option<usize>, String> {
    for key in keys {
        match obj.get(*key) {
            None | Some(Value::Null) => continue,
            Some(v) => {
                return v
                    .as_u64()
                    .map(|n| Some(n as usize))
                    .ok_or_else(|| format!("location.{} must be a non-negative integer", key))
            }
        }
    }
    Ok(None)
}

/// `rule_ref` may be a string or a list of strings; `rule_refs` is a list.
fn rule_refs(obj: &Map<String, Value>) -> Result<BTreeSet<String>, String> {
    let mut refs = BTreeSet::new();
    for key in ["rule_ref", "rule_refs"] {
        match obj.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => {
                if !s.trim().is_empty() {
                    refs.insert(s.trim().to_string());
                }
            }
            Some(Value::Array(items)) => {
                for item in items {
                    let s = item
                        .as_str()
                        .ok_or_else(|| format!("{} entries must be strings", key))?;
                    refs.insert(s.trim().to_string());
                }
            }
            Some(other) => return Err(format!("{} must be a string, got {}", key, type_name(other))),
        }
    }
    Ok(refs)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
