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

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::cfg::ReportRefreshConfig;
use crate::db::{FlavorVerifyQueue, ReportStore};
use crate::model::keys::HostId;
use crate::HvsResult;

mod state;
pub use state::HostTrustCacheState;

/// `ReportRefreshScheduler` queues a verification for every host whose
/// latest report is about to expire, in periodic intervals
pub struct ReportRefreshScheduler {
    reports: Arc<dyn ReportStore>,
    queue: Arc<dyn FlavorVerifyQueue>,
    config: ReportRefreshConfig,
}

impl ReportRefreshScheduler {
    pub fn new(
        reports: Arc<dyn ReportStore>,
        queue: Arc<dyn FlavorVerifyQueue>,
        config: ReportRefreshConfig,
    ) -> Self {
        Self {
            reports,
            queue,
            config,
        }
    }

    /// Start the ReportRefreshScheduler and return a [sending channel](tokio::sync::oneshot::Sender) that will stop it when dropped.
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
                tracing::warn!("ReportRefreshScheduler error: {}", e);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.run_interval) => {},
                _ = &mut stop_receiver => {
                    tracing::info!("ReportRefreshScheduler stop was requested");
                    return;
                }
            }
        }
    }

    pub async fn run_single_iteration(&self) -> HvsResult<Vec<HostId>> {
        self.sweep(Utc::now()).await
    }

    /// sweep derives the [HostTrustCacheState] of every host whose latest
    /// report expires before `now + expiry_threshold`, enqueues a
    /// non-forced verification for those that need one, and returns all
    /// the expiring hosts.
    pub async fn sweep(&self, now: DateTime<Utc>) -> HvsResult<Vec<HostId>> {
        let threshold = now + self.config.expiry_threshold;
        let expiring = self.reports.find_expiring_before(threshold).await?;
        if expiring.is_empty() {
            tracing::trace!("No reports expiring before {}", threshold);
            return Ok(Vec::new());
        }

        let host_ids: Vec<HostId> = expiring.iter().map(|report| report.host_id).collect();
        let in_flight = self.queue.in_flight(&host_ids).await?;

        let mut needs_verify = Vec::new();
        let mut in_queue = 0;
        for report in expiring.iter() {
            let state = HostTrustCacheState::derive(
                report.host_id,
                Some(report),
                &in_flight,
                now,
                self.config.expiry_threshold,
            );
            tracing::trace!(host_id = %report.host_id, %state, "Host trust cache state");
            match state {
                HostTrustCacheState::NeedsVerify => needs_verify.push(report.host_id),
                HostTrustCacheState::InQueue => in_queue += 1,
                HostTrustCacheState::Verified => {}
            }
        }

        let queued = self.queue.enqueue_many(&needs_verify, false).await?;

        tracing::info!(
            expiring = expiring.len(),
            in_queue,
            queued = queued.len(),
            "Requested verification of hosts with expiring reports"
        );
        Ok(host_ids)
    }
}
