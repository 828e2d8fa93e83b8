// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::runner::SubAgentRunner;
use crate::task::{AgentResult, AgentTask};

/// Concurrency bound used when callers do not pick their own.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Fans a task list out to the runner with bounded concurrency.
///
/// Results come back in input order regardless of completion order, and a
/// failing sub-agent becomes an error-flagged entry without cancelling its
/// peers.  Cancelling the batch token cancels every in-flight sub-agent.
pub struct ParallelExecutor {
    runner: Arc<SubAgentRunner>,
}

impl ParallelExecutor {
    pub fn new(runner: Arc<SubAgentRunner>) -> Self {
        Self { runner }
    }

    pub async fn run_parallel(
        &self,
        tasks: Vec<AgentTask>,
        max_concurrency: usize,
        cancel: &CancellationToken,
    ) -> Vec<AgentResult> {
        if tasks.is_empty() {
            return Vec::new();
        }
        // A single task needs no semaphore and no spawn.
        if tasks.len() == 1 {
            return vec![self.runner.run(&tasks[0], cancel).await];
        }

        debug!(
            task_count = tasks.len(),
            max_concurrency, "fanning out sub-agent tasks"
        );
        let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let runner = Arc::clone(&self.runner);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.child_token();
            handles.push(tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                if permit.is_none() {
                    // Cancelled while queued behind the semaphore.
                    return AgentResult::failure(String::new(), "cancelled", 0, Duration::ZERO);
                }
                // The permit is held for the full run, bounding concurrency.
                runner.run(&task, &cancel).await
            }));
        }

        // Awaiting in spawn order preserves the input order of results.
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => AgentResult::failure(
                    String::new(),
                    format!("sub-agent task panicked: {e}"),
                    0,
                    Duration::ZERO,
                ),
            };
            results.push(result);
        }
        results
    }
}
