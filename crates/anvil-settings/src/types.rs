//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a partial `settings.json` fills in the rest from [`Default`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// Root settings for the runtime.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeSettings {
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Agent step loop settings.
    pub agent: AgentSettings,
    /// Background task concurrency and lifecycle settings.
    pub concurrency: ConcurrencySettings,
    /// Tool consent settings.
    pub tools: ToolSettings,
    /// Hook registry settings.
    pub hooks: HookSettings,
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter directive.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Agent step loop settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    /// Upper bound on model steps per run.
    pub max_steps: u32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self { max_steps: 100 }
    }
}

/// Concurrency limits and background task lifecycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConcurrencySettings {
    /// Global cap on concurrently running background tasks.
    pub default_concurrency: usize,
    /// Per-provider caps, keyed by provider id.
    pub provider_concurrency: HashMap<String, usize>,
    /// Per-model caps, keyed by model id.
    pub model_concurrency: HashMap<String, usize>,
    /// How long a background spawn waits for a slot.
    pub acquire_timeout_ms: u64,
    /// Age after which tasks are pruned.
    pub stale_timeout_ms: u64,
    /// Period of the background pruner.
    pub prune_interval_ms: u64,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        let provider_concurrency = [("anthropic", 3), ("openai", 5), ("google", 3), ("xai", 3)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self {
            default_concurrency: 8,
            provider_concurrency,
            model_concurrency: HashMap::new(),
            acquire_timeout_ms: 30_000,
            stale_timeout_ms: 180_000,
            prune_interval_ms: 60_000,
        }
    }
}

/// Who answers consent prompts for dangerous tools.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentPolicy {
    /// A user is present; dangerous tools prompt for consent.
    #[default]
    Interactive,
    /// No user is present; every tool is pre-authorized.
    Automated,
}

impl fmt::Display for ConsentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interactive => write!(f, "interactive"),
            Self::Automated => write!(f, "automated"),
        }
    }
}

impl FromStr for ConsentPolicy {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interactive" => Ok(Self::Interactive),
            "automated" => Ok(Self::Automated),
            other => Err(SettingsError::InvalidValue(format!(
                "unknown consent policy: {other}"
            ))),
        }
    }
}

/// Tool consent settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolSettings {
    /// Consent policy for interactive runs.
    pub consent_policy: ConsentPolicy,
    /// How long a consent prompt may stay unanswered.
    pub consent_timeout_ms: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            consent_policy: ConsentPolicy::Interactive,
            consent_timeout_ms: 60_000,
        }
    }
}

/// Hook registry settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HookSettings {
    /// Hook names disabled when the registry is built.
    pub disabled: Vec<String>,
}
