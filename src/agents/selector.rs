//! Agent selection.
//!
//! ```text
//! selected = auto-detected ∪ agents.always − agents.disabled
//! ```
//!
//! `--pick` replaces auto-detection and `always` with its literal list. Picking
//! a disabled agent is a config error, never a silent drop.

use std::collections::BTreeSet;

use super::AgentRegistry;
use crate::config::EffectiveConfig;
use crate::error::{Result, ReviewError};
use crate::profile::Profile;

/// Compute the ordered agent set for a run. Output follows registry order.
pub fn select(
    registry: &AgentRegistry,
    profile: &Profile,
    config: &EffectiveConfig,
    pick: Option<&[String]>,
) -> Result<Vec<&'static str>> {
    let wanted: BTreeSet<&str> = match pick {
        Some(pick) => {
            if pick.is_empty() {
                return Err(ReviewError::Config("--pick needs at least one agent id".to_string()));
            }
            for id in pick {
                if registry.get(id).is_none() {
                    return Err(ReviewError::Config(format!(
                        "unknown agent {:?} (available: {})",
                        id,
                        registry.ids().join(", ")
                    )));
                }
                if config.is_disabled(id) {
                    return Err(ReviewError::Config(format!(
                        "agent {:?} is disabled by project config; remove it from agents.disabled to run it",
                        id
                    )));
                }
            }
            pick.iter().map(String::as_str).collect()
        }
        None => {
            let mut wanted: BTreeSet<&str> = registry
                .descriptors()
                .filter(|d| d.auto_selects(profile))
                .map(|d| d.id)
                .collect();
            wanted.extend(config.always.iter().map(String::as_str));
            for id in &config.disabled {
                wanted.remove(id.as_str());
            }
            wanted
        }
    };

    Ok(registry
        .descriptors()
        .filter(|d| wanted.contains(d.id))
        .map(|d| d.id)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EffectiveConfig {
        EffectiveConfig::defaults("/repo")
    }

    #[test]
    fn test_auto_selection_follows_profile() {
        let registry = AgentRegistry::builtin();
        let selected = select(&registry, &Profile::from_project_type("web"), &config(), None).unwrap();
        assert!(selected.contains(&"accessibility"));
        assert!(selected.contains(&"security"));
        assert!(!selected.contains(&"database"));
        assert!(!selected.contains(&"concurrency"));
    }

    #[test]
    fn test_always_adds() {
        let registry = AgentRegistry::builtin();
        let mut cfg = config();
        cfg.always = vec!["concurrency".to_string()];
        let selected = select(&registry, &Profile::from_project_type("web"), &cfg, None).unwrap();
        assert!(selected.contains(&"concurrency"));
    }

    #[test]
    fn test_disabled_beats_always_and_detection() {
        let registry = AgentRegistry::builtin();
        let mut cfg = config();
        cfg.always = vec!["accessibility".to_string()];
        cfg.disabled = vec!["accessibility".to_string()];
        let selected = select(&registry, &Profile::from_project_type("web"), &cfg, None).unwrap();
        assert!(!selected.contains(&"accessibility"));
    }

    #[test]
    fn test_pick_replaces_detection() {
        let registry = AgentRegistry::builtin();
        let pick = vec!["database".to_string(), "security".to_string()];
        let selected = select(
            &registry,
            &Profile::from_project_type("web"),
            &config(),
            Some(&pick),
        )
        .unwrap();
        assert_eq!(selected, vec!["security", "database"]);
    }

    #[test]
    fn test_pick_disabled_is_error() {
        let registry = AgentRegistry::builtin();
        let mut cfg = config();
        cfg.disabled = vec!["security".to_string()];
        let pick = vec!["security".to_string()];
        let err = select(&registry, &Profile::default(), &cfg, Some(&pick)).unwrap_err();
        assert!(matches!(err, ReviewError::Config(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_pick_unknown_is_error() {
        let registry = AgentRegistry::builtin();
        let pick = vec!["astrology".to_string()];
        assert!(select(&registry, &Profile::default(), &config(), Some(&pick)).is_err());
    }

    #[test]
    fn test_selection_is_deterministic() {
        let registry = AgentRegistry::builtin();
        let profile = Profile::from_project_type("fullstack");
        let first = select(&registry, &profile, &config(), None).unwrap();
        for _ in 0..5 {
            assert_eq!(select(&registry, &profile, &config(), None).unwrap(), first);
        }
    }
}
