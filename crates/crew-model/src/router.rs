// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::bail;

use crew_config::RuntimeConfig;

use crate::openai_compat::OpenAiCompatPortal;
use crate::portal::ModelPortal;

struct PortalEntry {
    portal: Arc<dyn ModelPortal>,
    default_model: String,
}

/// The portal and model id selected for one agent.
#[derive(Clone)]
pub struct RoutedPortal {
    pub provider: String,
    pub model_id: String,
    pub portal: Arc<dyn ModelPortal>,
}

/// Owns one portal per configured provider and the precedence that picks
/// among them: fast tier first, then per-agent-type overrides, then the
/// session default.
pub struct PortalRouter {
    portals: HashMap<String, PortalEntry>,
    default_provider: String,
    fast_provider: Option<String>,
    agent_overrides: HashMap<String, String>,
}

impl PortalRouter {
    /// Build one OpenAI-compatible portal per configured provider.
    pub fn from_config(cfg: &RuntimeConfig) -> anyhow::Result<Self> {
        let mut portals = HashMap::new();
        for (name, provider_cfg) in &cfg.providers {
            let Some(default_model) = provider_cfg.resolved_model(name) else {
                bail!("provider '{name}' has no model and no built-in default");
            };
            let portal = OpenAiCompatPortal::from_config(name, provider_cfg)?;
            portals.insert(
                name.clone(),
                PortalEntry {
                    portal: Arc::new(portal),
                    default_model,
                },
            );
        }
        Ok(Self {
            portals,
            default_provider: cfg.default_provider.clone(),
            fast_provider: cfg.fast_provider().map(str::to_string),
            agent_overrides: cfg.agent_overrides.clone(),
        })
    }

    /// A router with a single provider serving as the default.  Intended for
    /// tests and embedding applications that bring their own portal.
    pub fn single(
        provider: impl Into<String>,
        default_model: impl Into<String>,
        portal: Arc<dyn ModelPortal>,
    ) -> Self {
        let provider = provider.into();
        let mut portals = HashMap::new();
        portals.insert(
            provider.clone(),
            PortalEntry {
                portal,
                default_model: default_model.into(),
            },
        );
        Self {
            portals,
            default_provider: provider,
            fast_provider: None,
            agent_overrides: HashMap::new(),
        }
    }

    pub fn insert(
        &mut self,
        provider: impl Into<String>,
        default_model: impl Into<String>,
        portal: Arc<dyn ModelPortal>,
    ) {
        self.portals.insert(
            provider.into(),
            PortalEntry {
                portal,
                default_model: default_model.into(),
            },
        );
    }

    pub fn set_fast(&mut self, provider: impl Into<String>) {
        self.fast_provider = Some(provider.into());
    }

    pub fn set_override(&mut self, agent_type: impl Into<String>, provider: impl Into<String>) {
        self.agent_overrides
            .insert(agent_type.into(), provider.into());
    }

    /// Portal for a specific provider name.  Used when resuming an agent
    /// that was bound to a provider on creation.
    pub fn portal(&self, provider: &str) -> Option<Arc<dyn ModelPortal>> {
        self.portals.get(provider).map(|e| Arc::clone(&e.portal))
    }

    /// Select the portal and model id for an agent.
    ///
    /// Precedence: the fast provider when `fast` is set and one is
    /// configured, then the agent-type override, then the session default.
    /// An explicit model id replaces the provider's default model.
    pub fn route(
        &self,
        agent_type: &str,
        fast: bool,
        explicit_model: Option<&str>,
    ) -> anyhow::Result<RoutedPortal> {
        let provider = if fast {
            self.fast_provider
                .as_deref()
                .filter(|p| self.portals.contains_key(*p))
        } else {
            None
        };
        let provider = provider.or_else(|| {
            self.agent_overrides
                .get(agent_type)
                .map(String::as_str)
                .filter(|p| self.portals.contains_key(*p))
        });
        let provider = provider.unwrap_or(&self.default_provider);

        let Some(entry) = self.portals.get(provider) else {
            bail!("no provider configured for '{provider}'");
        };
        Ok(RoutedPortal {
            provider: provider.to_string(),
            model_id: explicit_model
                .map(str::to_string)
                .unwrap_or_else(|| entry.default_model.clone()),
            portal: Arc::clone(&entry.portal),
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
