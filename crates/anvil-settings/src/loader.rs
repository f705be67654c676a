//! Layered settings loading.
//!
//! Every layer is applied to one JSON tree before it is decoded, so the
//! user file and `ANVIL_*` variables go through the same serde checks as
//! the compiled defaults:
//!
//! 1. [`RuntimeSettings::default()`]
//! 2. `~/.anvil/settings.json`, overlaid per key
//! 3. `ANVIL_*` environment variables

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{ConsentPolicy, RuntimeSettings};

/// How an environment variable's text becomes a JSON value.
#[derive(Clone, Copy, Debug)]
enum EnvKind {
    Text,
    Bounded { min: u64, max: u64 },
    Policy,
}

/// One `ANVIL_*` variable and the settings field it replaces.
#[derive(Clone, Copy, Debug)]
struct EnvOverride {
    var: &'static str,
    pointer: &'static str,
    kind: EnvKind,
}

const ENV_OVERRIDES: &[EnvOverride] = &[
    EnvOverride {
        var: "ANVIL_LOG_LEVEL",
        pointer: "/logging/level",
        kind: EnvKind::Text,
    },
    EnvOverride {
        var: "ANVIL_MAX_STEPS",
        pointer: "/agent/maxSteps",
        kind: EnvKind::Bounded { min: 1, max: 10_000 },
    },
    EnvOverride {
        var: "ANVIL_DEFAULT_CONCURRENCY",
        pointer: "/concurrency/defaultConcurrency",
        kind: EnvKind::Bounded { min: 1, max: 1_000 },
    },
    EnvOverride {
        var: "ANVIL_STALE_TIMEOUT_MS",
        pointer: "/concurrency/staleTimeoutMs",
        kind: EnvKind::Bounded {
            min: 1_000,
            max: 86_400_000,
        },
    },
    EnvOverride {
        var: "ANVIL_CONSENT_POLICY",
        pointer: "/tools/consentPolicy",
        kind: EnvKind::Policy,
    },
];

/// `~/.anvil/settings.json`, or `.anvil/settings.json` when `HOME` is unset.
pub fn settings_path() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(PathBuf::new, PathBuf::from)
        .join(".anvil")
        .join("settings.json")
}

/// Load from [`settings_path`] and the process environment.
pub fn load_settings() -> Result<RuntimeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` and the process environment.
///
/// A missing file contributes nothing. Unreadable or malformed files are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<RuntimeSettings> {
    load_with_env(path, |var| std::env::var(var).ok())
}

/// Load from `path`, reading variables through `lookup`.
pub fn load_with_env<F>(path: &Path, lookup: F) -> Result<RuntimeSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut tree = serde_json::to_value(RuntimeSettings::default())?;

    match std::fs::read_to_string(path) {
        Ok(text) => {
            debug!(?path, "overlaying settings file");
            overlay(&mut tree, serde_json::from_str(&text)?);
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(?path, "no settings file");
        }
        Err(e) => return Err(e.into()),
    }

    apply_env_layer(&mut tree, lookup);

    let settings: RuntimeSettings = serde_json::from_value(tree)?;
    validate(&settings)?;
    Ok(settings)
}

/// Overlay `layer` onto `base` in place.
///
/// Objects are combined key by key. Any other value in `layer` replaces the
/// one in `base`. `null` entries in `layer` leave `base` as it was.
pub fn overlay(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base_map), Value::Object(layer_map)) => {
            for (key, value) in layer_map {
                if value.is_null() {
                    continue;
                }
                match base_map.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        let _ = base_map.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

fn apply_env_layer<F>(tree: &mut Value, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for entry in ENV_OVERRIDES {
        let Some(raw) = lookup(entry.var).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        let Some(value) = env_value(entry.kind, &raw) else {
            warn!(key = entry.var, value = %raw, "ignoring invalid env override");
            continue;
        };
        match tree.pointer_mut(entry.pointer) {
            Some(slot) => {
                debug!(key = entry.var, "env override applied");
                *slot = value;
            }
            None => warn!(key = entry.var, pointer = entry.pointer, "env override has no target"),
        }
    }
}

fn env_value(kind: EnvKind, raw: &str) -> Option<Value> {
    match kind {
        EnvKind::Text => Some(Value::String(raw.trim().to_owned())),
        EnvKind::Bounded { min, max } => {
            let n: u64 = raw.trim().parse().ok()?;
            (min..=max).contains(&n).then_some(Value::from(n))
        }
        EnvKind::Policy => {
            let policy: ConsentPolicy = raw.parse().ok()?;
            Some(Value::String(policy.to_string()))
        }
    }
}

fn validate(settings: &RuntimeSettings) -> Result<()> {
    if settings.agent.max_steps == 0 {
        return Err(SettingsError::InvalidValue(
            "agent.maxSteps must be at least 1".into(),
        ));
    }
    if settings.concurrency.default_concurrency == 0 {
        return Err(SettingsError::InvalidValue(
            "concurrency.defaultConcurrency must be at least 1".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |var: &str| map.get(var).cloned()
    }

    fn write_settings(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, body).unwrap();
        (dir, path)
    }

    #[test]
    fn overlay_combines_nested_objects() {
        let mut base = json!({"concurrency": {"defaultConcurrency": 8, "acquireTimeoutMs": 30000}});
        overlay(&mut base, json!({"concurrency": {"defaultConcurrency": 2}}));
        assert_eq!(base, json!({"concurrency": {"defaultConcurrency": 2, "acquireTimeoutMs": 30000}}));
    }

    #[test]
    fn overlay_replaces_arrays_and_scalars() {
        let mut base = json!({"disabled": ["a", "b"], "a": {"nested": true}});
        overlay(&mut base, json!({"disabled": ["c"], "a": 42}));
        assert_eq!(base, json!({"disabled": ["c"], "a": 42}));
    }

    #[test]
    fn overlay_skips_nulls() {
        let mut base = json!({"a": 1});
        overlay(&mut base, json!({"a": null, "b": 2}));
        assert_eq!(base, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let settings =
            load_with_env(Path::new("/nonexistent/anvil/settings.json"), no_env).unwrap();
        assert_eq!(settings, RuntimeSettings::default());
    }

    #[test]
    fn file_overrides_single_provider() {
        let (_dir, path) = write_settings(
            r#"{"concurrency": {"providerConcurrency": {"anthropic": 1}}, "hooks": {"disabled": ["ralph-loop"]}}"#,
        );
        let settings = load_with_env(&path, no_env).unwrap();
        assert_eq!(settings.concurrency.provider_concurrency["anthropic"], 1);
        assert_eq!(settings.concurrency.provider_concurrency["openai"], 5);
        assert_eq!(settings.hooks.disabled, vec!["ralph-loop".to_string()]);
        assert_eq!(settings.concurrency.stale_timeout_ms, 180_000);
    }

    #[test]
    fn file_sets_consent_policy() {
        let (_dir, path) = write_settings(r#"{"tools": {"consentPolicy": "automated"}}"#);
        let settings = load_with_env(&path, no_env).unwrap();
        assert_eq!(settings.tools.consent_policy, ConsentPolicy::Automated);
        assert_eq!(settings.tools.consent_timeout_ms, 60_000);
    }

    #[test]
    fn env_beats_file() {
        let (_dir, path) = write_settings(r#"{"agent": {"maxSteps": 7}, "logging": {"level": "info"}}"#);
        let lookup = env(&[
            ("ANVIL_MAX_STEPS", "12"),
            ("ANVIL_LOG_LEVEL", " debug "),
            ("ANVIL_CONSENT_POLICY", "Automated"),
            ("ANVIL_STALE_TIMEOUT_MS", "5000"),
        ]);
        let settings = load_with_env(&path, lookup).unwrap();
        assert_eq!(settings.agent.max_steps, 12);
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.tools.consent_policy, ConsentPolicy::Automated);
        assert_eq!(settings.concurrency.stale_timeout_ms, 5_000);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let lookup = env(&[
            ("ANVIL_MAX_STEPS", "0"),
            ("ANVIL_DEFAULT_CONCURRENCY", "lots"),
            ("ANVIL_CONSENT_POLICY", "sometimes"),
            ("ANVIL_LOG_LEVEL", "  "),
        ]);
        let settings = load_with_env(Path::new("/nonexistent/settings.json"), lookup).unwrap();
        assert_eq!(settings, RuntimeSettings::default());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let (_dir, path) = write_settings("not json");
        assert_matches!(load_with_env(&path, no_env), Err(SettingsError::Json(_)));
    }

    #[test]
    fn wrong_type_is_an_error() {
        let (_dir, path) = write_settings(r#"{"agent": {"maxSteps": "many"}}"#);
        assert_matches!(load_with_env(&path, no_env), Err(SettingsError::Json(_)));
    }

    #[test]
    fn zero_limits_are_rejected() {
        let (_dir, path) = write_settings(r#"{"concurrency": {"defaultConcurrency": 0}}"#);
        assert_matches!(
            load_with_env(&path, no_env),
            Err(SettingsError::InvalidValue(msg)) if msg.contains("defaultConcurrency")
        );
    }
}
