// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crew_model::{AgentBinding, Message};

use crate::task::{AgentKind, ModelTier};

/// How often the background eviction pass runs.
pub const EVICTION_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Agent lifecycle states.
///
/// `Suspended` is the terminal-but-resumable state: a finished agent keeps
/// its history in the registry and can be resumed until the TTL evicts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Pending,
    Running,
    Suspended,
    Failed,
    Cancelled,
}

impl AgentStatus {
    /// The legal transition table.  Everything else is a programmer error.
    pub fn can_transition(self, to: AgentStatus) -> bool {
        use AgentStatus::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Running, Suspended)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Suspended, Running)
        )
    }

    /// Terminal states are eligible for TTL eviction.  `Running` never is.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AgentStatus::Suspended | AgentStatus::Failed | AgentStatus::Cancelled
        )
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Pending => "pending",
            AgentStatus::Running => "running",
            AgentStatus::Suspended => "suspended",
            AgentStatus::Failed => "failed",
            AgentStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Identity and bookkeeping for one agent instance.
#[derive(Debug, Clone)]
pub struct AgentInfo {
    /// Opaque 12-character id, unique within the process.
    pub id: String,
    pub kind: AgentKind,
    pub description: String,
    pub read_only: bool,
    pub model_tier: ModelTier,
    /// Provider this agent was bound to; resumptions route back to it.
    pub provider: String,
    pub status: AgentStatus,
    pub created_at: Instant,
    pub last_activity_at: Instant,
    pub tool_call_count: u64,
}

impl AgentInfo {
    pub fn new(
        id: impl Into<String>,
        kind: AgentKind,
        description: impl Into<String>,
        read_only: bool,
        model_tier: ModelTier,
        provider: impl Into<String>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: id.into(),
            kind,
            description: description.into(),
            read_only,
            model_tier,
            provider: provider.into(),
            status: AgentStatus::Running,
            created_at: now,
            last_activity_at: now,
            tool_call_count: 0,
        }
    }
}

struct AgentEntry {
    info: AgentInfo,
    history: Vec<Message>,
    binding: AgentBinding,
}

/// A consistent copy of one registry entry, handed to the runner for the
/// duration of a single invocation.  The entry itself stays owned by the
/// registry.
#[derive(Clone)]
pub struct AgentSnapshot {
    pub info: AgentInfo,
    pub history: Vec<Message>,
    pub binding: AgentBinding,
}

/// Programmer errors.  These indicate a bug in the caller, never expected
/// state, and are the only errors allowed to escape a public entry point.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate agent id: {0}")]
    DuplicateId(String),
    #[error("illegal status transition for {id}: {from} -> {to}")]
    IllegalTransition {
        id: String,
        from: AgentStatus,
        to: AgentStatus,
    },
}

/// Authoritative in-memory store of all agent identity and state.
///
/// All mutations are serialized behind one lock, held only for the duration
/// of a single field update and never across an await point.  List
/// operations return copies so readers never block writers.
pub struct AgentRegistry {
    entries: Mutex<HashMap<String, AgentEntry>>,
    idle_ttl: Duration,
}

impl AgentRegistry {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            idle_ttl,
        }
    }

    /// Allocate a fresh 12-character agent id, unique within this registry.
    pub fn allocate_id(&self) -> String {
        let entries = self.entries.lock().unwrap();
        loop {
            let id: String = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
            if !entries.contains_key(&id) {
                return id;
            }
        }
    }

    /// Add a new entry.  A duplicate id is a programmer error.
    pub fn register(
        &self,
        info: AgentInfo,
        history: Vec<Message>,
        binding: AgentBinding,
    ) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(&info.id) {
            return Err(RegistryError::DuplicateId(info.id));
        }
        debug!(agent_id = %info.id, kind = %info.kind, "registering agent");
        entries.insert(
            info.id.clone(),
            AgentEntry {
                info,
                history,
                binding,
            },
        );
        Ok(())
    }

    /// Fetch a consistent copy of an entry, touching its activity clock.
    pub fn try_get(&self, id: &str) -> Option<AgentSnapshot> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.get_mut(id)?;
        entry.info.last_activity_at = Instant::now();
        Some(AgentSnapshot {
            info: entry.info.clone(),
            history: entry.history.clone(),
            binding: entry.binding.clone(),
        })
    }

    /// Transition an agent's status.  Missing ids are silently ignored so a
    /// late callback from a removed agent is harmless; an illegal transition
    /// is a programmer error.
    pub fn update_status(&self, id: &str, status: AgentStatus) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(id) else {
            return Ok(());
        };
        if !entry.info.status.can_transition(status) {
            return Err(RegistryError::IllegalTransition {
                id: id.to_string(),
                from: entry.info.status,
                to: status,
            });
        }
        debug!(agent_id = %id, from = %entry.info.status, to = %status, "status transition");
        entry.info.status = status;
        entry.info.last_activity_at = Instant::now();
        Ok(())
    }

    /// Atomic counter increment plus activity touch.  Missing ids no-op.
    pub fn increment_tool_calls(&self, id: &str) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(id) {
            entry.info.tool_call_count += 1;
            entry.info.last_activity_at = Instant::now();
        }
    }

    /// Replace an entry's history after a run.  Missing ids no-op: the agent
    /// may have been removed while its runner was still finishing.
    pub fn commit_history(&self, id: &str, history: Vec<Message>) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(id) {
            entry.history = history;
            entry.info.last_activity_at = Instant::now();
        }
    }

    pub fn list_running(&self) -> Vec<AgentInfo> {
        let entries = self.entries.lock().unwrap();
        entries
            .values()
            .filter(|e| e.info.status == AgentStatus::Running)
            .map(|e| e.info.clone())
            .collect()
    }

    pub fn list_all(&self) -> Vec<AgentInfo> {
        let entries = self.entries.lock().unwrap();
        entries.values().map(|e| e.info.clone()).collect()
    }

    /// Explicit removal, idempotent.
    pub fn remove(&self, id: &str) {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(id);
    }

    /// One eviction pass: drop every terminal entry whose last activity is
    /// older than the idle TTL.  Running entries are never touched.
    /// Eviction is silent: no observer events are emitted.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|id, entry| {
            let idle = now.duration_since(entry.info.last_activity_at);
            let evict = entry.info.status.is_terminal() && idle >= self.idle_ttl;
            if evict {
                debug!(agent_id = %id, status = %entry.info.status, "evicting idle agent");
            }
            !evict
        });
    }

    /// Run the eviction pass every [`EVICTION_SWEEP_INTERVAL`] until the
    /// returned handle is aborted.
    pub fn spawn_eviction(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(EVICTION_SWEEP_INTERVAL);
            // The first tick fires immediately; skip it so a freshly
            // constructed registry is not swept before any agent ran.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                registry.sweep();
            }
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
