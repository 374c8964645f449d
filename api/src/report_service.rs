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

use chrono::Utc;

use crate::db::{FlavorVerifyQueue, HostStore, ReportStore};
use crate::host_verifier::HostVerifier;
use crate::model::keys::{HostId, ReportId};
use crate::model::report::Report;
use crate::{HvsError, HvsResult};

/// ReportService is what the REST layer talks to. Reads never block on a
/// host: an expired report is returned as is and a refresh is queued.
pub struct ReportService {
    reports: Arc<dyn ReportStore>,
    hosts: Arc<dyn HostStore>,
    queue: Arc<dyn FlavorVerifyQueue>,
    verifier: Arc<HostVerifier>,
}

impl ReportService {
    pub fn new(
        reports: Arc<dyn ReportStore>,
        hosts: Arc<dyn HostStore>,
        queue: Arc<dyn FlavorVerifyQueue>,
        verifier: Arc<HostVerifier>,
    ) -> Self {
        Self {
            reports,
            hosts,
            queue,
            verifier,
        }
    }

    pub async fn get(&self, id: ReportId) -> HvsResult<Report> {
        let report = self
            .reports
            .find_by_id(id)
            .await?
            .ok_or_else(|| HvsError::not_found("Report", id))?;
        self.refresh_if_expired(&report).await?;
        Ok(report)
    }

    pub async fn latest_for_host(&self, host_id: HostId) -> HvsResult<Report> {
        if self.hosts.find_host(host_id).await?.is_none() {
            return Err(HvsError::not_found("Host", host_id));
        }
        match self.reports.find_latest_for_host(host_id).await? {
            Some(report) => {
                self.refresh_if_expired(&report).await?;
                Ok(report)
            }
            None => {
                // Nothing to serve yet; make sure one gets produced.
                self.queue.enqueue(host_id, false).await?;
                Err(HvsError::not_found("Report", host_id))
            }
        }
    }

    /// create verifies the host now. With `force_update` unset a still
    /// valid report is returned instead.
    pub async fn create(&self, host_id: HostId, force_update: bool) -> HvsResult<Report> {
        self.verifier.verify_host(host_id, force_update).await
    }

    pub async fn delete(&self, id: ReportId) -> HvsResult<()> {
        if self.reports.delete(id).await? {
            tracing::info!(report_id = %id, "Deleted report");
            Ok(())
        } else {
            Err(HvsError::not_found("Report", id))
        }
    }

    async fn refresh_if_expired(&self, report: &Report) -> HvsResult<()> {
        if report.is_expired(Utc::now()) {
            let queued = self.queue.enqueue(report.host_id, false).await?;
            tracing::info!(
                host_id = %report.host_id,
                report_id = %report.id,
                queued = queued.is_some(),
                "Serving expired report, verification requested"
            );
        }
        Ok(())
    }
}
