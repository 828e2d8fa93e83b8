// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_provider_name() -> String {
    "deepseek".into()
}
fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}
/// 30 minutes.  Terminal agents idle for longer than this are evicted by the
/// registry's background sweep.
fn default_idle_ttl_secs() -> u64 {
    1800
}

/// Everything the orchestration core reads at construction time.
///
/// Anything beyond this (dotenv loading, CLI parsing, settings persistence)
/// is the embedding application's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Named provider configurations.
    ///
    /// The names `deepseek` and `zhipu` come with built-in endpoint and model
    /// defaults; any other name must set `base_url` explicitly.
    ///
    /// ```yaml
    /// providers:
    ///   deepseek:
    ///     api_key_env: DEEPSEEK_API_KEY
    ///   zhipu:
    ///     api_key_env: ZHIPU_API_KEY
    ///     model: glm-4-plus
    /// ```
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Provider used when no override applies.
    #[serde(default = "default_provider_name")]
    pub default_provider: String,

    /// Provider that serves the `fast` model tier.  When unset, a provider
    /// literally named `deepseek` is preferred if configured.
    #[serde(default)]
    pub fast_provider: Option<String>,

    /// Agent type name to provider name overrides, consulted after the fast
    /// tier but before the session default.
    #[serde(default)]
    pub agent_overrides: HashMap<String, String>,

    /// Working directory reported to sub-agents in their system prompt.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Idle TTL in seconds for registry eviction of terminal agents.
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider_name(),
            fast_provider: None,
            agent_overrides: HashMap::new(),
            work_dir: default_work_dir(),
            idle_ttl_secs: default_idle_ttl_secs(),
        }
    }
}

impl RuntimeConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    /// Resolve the provider that serves the `fast` tier, if any.
    ///
    /// An explicit `fast_provider` wins; otherwise a configured provider
    /// named `deepseek` is used.  Returns `None` when neither is configured,
    /// in which case the caller falls through to the normal precedence.
    pub fn fast_provider(&self) -> Option<&str> {
        if let Some(name) = self.fast_provider.as_deref() {
            if self.providers.contains_key(name) {
                return Some(name);
            }
        }
        if self.providers.contains_key("deepseek") {
            return Some("deepseek");
        }
        None
    }

    /// Per-agent-type provider override, when one is configured AND the
    /// named provider actually exists.
    pub fn provider_for_agent(&self, agent_type: &str) -> Option<&str> {
        self.agent_overrides
            .get(agent_type)
            .map(String::as_str)
            .filter(|name| self.providers.contains_key(*name))
    }
}

/// One model provider endpoint.  All configured providers speak the
/// OpenAI-compatible `/chat/completions` wire format with
/// `Authorization: Bearer {key}` auth.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API base ending before `/chat/completions`.  Optional for the known
    /// provider names (`deepseek`, `zhipu`), required for anything else.
    pub base_url: Option<String>,
    /// Model identifier forwarded to the API.  Optional for the known
    /// provider names.
    pub model: Option<String>,
    /// Explicit API key; prefer `api_key_env` in version-controlled files.
    pub api_key: Option<String>,
    /// Environment variable that holds the API key (read at runtime).
    pub api_key_env: Option<String>,
}

impl ProviderConfig {
    /// Explicit key first, then the named environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            return Some(key.clone());
        }
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
    }

    pub fn resolved_base_url(&self, provider: &str) -> Option<String> {
        self.base_url
            .clone()
            .or_else(|| default_base_url(provider).map(str::to_string))
    }

    pub fn resolved_model(&self, provider: &str) -> Option<String> {
        self.model
            .clone()
            .or_else(|| default_model(provider).map(str::to_string))
    }
}

/// Built-in endpoint defaults for the known OpenAI-compatible gateways.
pub fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "deepseek" => Some("https://api.deepseek.com/v1"),
        "zhipu" => Some("https://open.bigmodel.cn/api/paas/v4"),
        _ => None,
    }
}

/// Default model identifier for the known providers.
pub fn default_model(provider: &str) -> Option<&'static str> {
    match provider {
        "deepseek" => Some("deepseek-chat"),
        "zhipu" => Some("glm-4-plus"),
        _ => None,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_providers(names: &[&str]) -> RuntimeConfig {
        let mut cfg = RuntimeConfig::default();
        for n in names {
            cfg.providers.insert(n.to_string(), ProviderConfig::default());
        }
        cfg
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn default_idle_ttl_is_thirty_minutes() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.idle_ttl(), Duration::from_secs(30 * 60));
    }

    #[test]
    fn known_provider_defaults() {
        assert_eq!(default_base_url("deepseek"), Some("https://api.deepseek.com/v1"));
        assert_eq!(default_base_url("zhipu"), Some("https://open.bigmodel.cn/api/paas/v4"));
        assert_eq!(default_model("deepseek"), Some("deepseek-chat"));
        assert_eq!(default_model("zhipu"), Some("glm-4-plus"));
        assert_eq!(default_base_url("other"), None);
    }

    #[test]
    fn provider_config_resolves_defaults_by_name() {
        let pc = ProviderConfig::default();
        assert_eq!(pc.resolved_model("zhipu").as_deref(), Some("glm-4-plus"));
        assert!(pc.resolved_base_url("unknown").is_none());
    }

    #[test]
    fn explicit_base_url_wins_over_default() {
        let pc = ProviderConfig {
            base_url: Some("http://localhost:8080/v1".into()),
            ..Default::default()
        };
        assert_eq!(
            pc.resolved_base_url("deepseek").as_deref(),
            Some("http://localhost:8080/v1")
        );
    }

    // ── Fast tier resolution ──────────────────────────────────────────────────

    #[test]
    fn fast_tier_prefers_explicit_fast_provider() {
        let mut cfg = config_with_providers(&["deepseek", "zhipu"]);
        cfg.fast_provider = Some("zhipu".into());
        assert_eq!(cfg.fast_provider(), Some("zhipu"));
    }

    #[test]
    fn fast_tier_falls_back_to_deepseek_when_configured() {
        let cfg = config_with_providers(&["deepseek", "zhipu"]);
        assert_eq!(cfg.fast_provider(), Some("deepseek"));
    }

    #[test]
    fn fast_tier_none_without_candidates() {
        let cfg = config_with_providers(&["zhipu"]);
        assert_eq!(cfg.fast_provider(), None);
    }

    #[test]
    fn fast_provider_pointing_at_missing_entry_is_ignored() {
        let mut cfg = config_with_providers(&["zhipu"]);
        cfg.fast_provider = Some("nope".into());
        assert_eq!(cfg.fast_provider(), None);
    }

    // ── Agent overrides ───────────────────────────────────────────────────────

    #[test]
    fn agent_override_resolves_when_provider_exists() {
        let mut cfg = config_with_providers(&["zhipu"]);
        cfg.agent_overrides.insert("plan".into(), "zhipu".into());
        assert_eq!(cfg.provider_for_agent("plan"), Some("zhipu"));
        assert_eq!(cfg.provider_for_agent("code"), None);
    }

    #[test]
    fn agent_override_to_unconfigured_provider_is_ignored() {
        let mut cfg = config_with_providers(&["zhipu"]);
        cfg.agent_overrides.insert("plan".into(), "missing".into());
        assert_eq!(cfg.provider_for_agent("plan"), None);
    }

    // ── API key resolution ────────────────────────────────────────────────────

    #[test]
    fn explicit_api_key_wins() {
        let pc = ProviderConfig {
            api_key: Some("sk-explicit".into()),
            api_key_env: Some("CREW_TEST_KEY_UNSET".into()),
            ..Default::default()
        };
        assert_eq!(pc.resolve_api_key().as_deref(), Some("sk-explicit"));
    }

    #[test]
    fn api_key_env_resolves_from_environment() {
        std::env::set_var("CREW_TEST_KEY_SCHEMA", "sk-from-env");
        let pc = ProviderConfig {
            api_key_env: Some("CREW_TEST_KEY_SCHEMA".into()),
            ..Default::default()
        };
        assert_eq!(pc.resolve_api_key().as_deref(), Some("sk-from-env"));
        std::env::remove_var("CREW_TEST_KEY_SCHEMA");
    }

    #[test]
    fn missing_key_resolves_to_none() {
        assert!(ProviderConfig::default().resolve_api_key().is_none());
    }
}
