/*
 * SPDX-FileCopyrightText: Copyright (c) 2021-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinSet;

use crate::cfg::FlavorVerifyWorkerConfig;
use crate::db::FlavorVerifyQueue;
use crate::host_verifier::HostVerifier;
use crate::model::keys::QueueEntryId;
use crate::HvsResult;

/// Outcome of one worker iteration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IterationSummary {
    pub completed: usize,
    pub failed: usize,
}

/// `FlavorVerifyWorker` drains the flavor-verify queue, verifying up to
/// `max_concurrency` hosts at a time. Entries left RUNNING by a crashed
/// process are handed out again once `running_lease` has passed.
pub struct FlavorVerifyWorker {
    queue: Arc<dyn FlavorVerifyQueue>,
    verifier: Arc<HostVerifier>,
    config: FlavorVerifyWorkerConfig,
}

impl FlavorVerifyWorker {
    pub fn new(
        queue: Arc<dyn FlavorVerifyQueue>,
        verifier: Arc<HostVerifier>,
        config: FlavorVerifyWorkerConfig,
    ) -> Self {
        Self {
            queue,
            verifier,
            config,
        }
    }

    /// Start the FlavorVerifyWorker and return a [sending channel](tokio::sync::oneshot::Sender) that will stop it when dropped.
    pub fn start(self) -> eyre::Result<oneshot::Sender<i32>> {
        let (stop_sender, stop_receiver) = oneshot::channel();

        if self.config.enabled {
            tokio::spawn(async move { self.run(stop_receiver).await });
        }

        Ok(stop_sender)
    }

    async fn run(&self, mut stop_receiver: oneshot::Receiver<i32>) {
        loop {
            if let Err(e) = self.run_single_iteration().await {
                tracing::warn!("FlavorVerifyWorker error: {}", e);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.run_interval) => {},
                _ = &mut stop_receiver => {
                    tracing::info!("FlavorVerifyWorker stop was requested");
                    return;
                }
            }
        }
    }

    pub async fn run_single_iteration(&self) -> HvsResult<IterationSummary> {
        let stale_before = Utc::now() - self.config.running_lease;
        let reclaimed = self.queue.reclaim_stale(stale_before).await?;
        if !reclaimed.is_empty() {
            tracing::warn!(
                count = reclaimed.len(),
                "Requeued flavor-verify entries that stayed RUNNING past their lease"
            );
        }

        let entries = self.queue.dequeue_next(self.config.max_concurrency).await?;
        let mut summary = IterationSummary::default();
        if entries.is_empty() {
            return Ok(summary);
        }

        // Every dequeued entry must leave RUNNING before this returns, so the
        // ids stay here until their task reports back.
        let mut unfinished: HashSet<QueueEntryId> = entries.iter().map(|entry| entry.id).collect();
        let mut tasks: JoinSet<(QueueEntryId, bool)> = JoinSet::new();
        for entry in entries {
            let verifier = self.verifier.clone();
            tasks.spawn(async move {
                let host_id = entry.host_id();
                let result = verifier
                    .verify_host(host_id, entry.parameters.force_update)
                    .await;
                if let Err(e) = &result {
                    tracing::warn!(
                        queue_entry_id = %entry.id,
                        host_id = %host_id,
                        error = %e,
                        "Flavor verification failed"
                    );
                }
                (entry.id, result.is_ok())
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, success)) => {
                    unfinished.remove(&id);
                    outcomes.push((id, success));
                }
                Err(join_error) => {
                    tracing::error!(error = %join_error, "Flavor verification task panicked");
                }
            }
        }
        // Whatever is left belongs to tasks that never reported back.
        outcomes.extend(unfinished.into_iter().map(|id| (id, false)));

        for (id, success) in outcomes {
            if let Err(e) = self.queue.complete(id, success).await {
                tracing::error!(
                    queue_entry_id = %id,
                    error = %e,
                    "Failed to complete flavor-verify entry"
                );
            }
            if success {
                summary.completed += 1;
            } else {
                summary.failed += 1;
            }
        }

        tracing::debug!(
            completed = summary.completed,
            failed = summary.failed,
            "FlavorVerifyWorker iteration done"
        );
        Ok(summary)
    }
}
