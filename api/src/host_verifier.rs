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

use chrono::{Duration, Utc};

use crate::db::{FlavorQuery, FlavorStore, HostStore, ReportStore};
use crate::manifest_source::ManifestSource;
use crate::model::flavor::{Flavor, FlavorPart};
use crate::model::host::{Host, HostState, HostStatus};
use crate::model::host_manifest::HostManifest;
use crate::model::keys::HostId;
use crate::model::report::Report;
use crate::saml::SamlIssuer;
use crate::verifier::{self, RuleRegistry, TrustReport};
use crate::{HvsError, HvsResult};

/// Timing knobs of the verification pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostVerifierConfig {
    /// How long a freshly created report stays valid.
    pub report_validity: Duration,
    /// A cached report that expires within this window is not served for a
    /// non-forced verification; the refresh scheduler relies on this to
    /// replace reports before they lapse.
    pub refresh_threshold: Duration,
}

impl Default for HostVerifierConfig {
    fn default() -> Self {
        Self {
            report_validity: Duration::hours(24),
            refresh_threshold: Duration::minutes(5),
        }
    }
}

/// HostVerifier runs one verification cycle for one host: fetch the
/// manifest, evaluate it against every linked flavorgroup, sign and persist
/// the resulting report.
pub struct HostVerifier {
    hosts: Arc<dyn HostStore>,
    flavors: Arc<dyn FlavorStore>,
    reports: Arc<dyn ReportStore>,
    manifest_source: Arc<dyn ManifestSource>,
    saml: Arc<SamlIssuer>,
    registry: Arc<RuleRegistry>,
    config: HostVerifierConfig,
}

impl HostVerifier {
    pub fn new(
        hosts: Arc<dyn HostStore>,
        flavors: Arc<dyn FlavorStore>,
        reports: Arc<dyn ReportStore>,
        manifest_source: Arc<dyn ManifestSource>,
        saml: Arc<SamlIssuer>,
        registry: Arc<RuleRegistry>,
        config: HostVerifierConfig,
    ) -> Self {
        Self {
            hosts,
            flavors,
            reports,
            manifest_source,
            saml,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &HostVerifierConfig {
        &self.config
    }

    #[tracing::instrument(skip(self), fields(host_id = %host_id))]
    pub async fn verify_host(&self, host_id: HostId, force_update: bool) -> HvsResult<Report> {
        let host = self
            .hosts
            .find_host(host_id)
            .await?
            .ok_or_else(|| HvsError::not_found("Host", host_id))?;

        if !force_update {
            if let Some(report) = self.reports.find_latest_for_host(host_id).await? {
                if !report.expires_within(Utc::now(), self.config.refresh_threshold) {
                    tracing::debug!(report_id = %report.id, "Serving cached report");
                    return Ok(report);
                }
            }
        }

        let credential = self.hosts.find_credential(host_id).await?;
        let manifest = match self
            .manifest_source
            .fetch_manifest(&host.connection_string, credential.as_ref())
            .await
        {
            Ok(manifest) => manifest,
            Err(fault) => {
                tracing::warn!(state = %fault.state, error = %fault.message, "Failed to fetch host manifest");
                self.hosts
                    .append_status(&HostStatus::new(host_id, fault.state, None))
                    .await?;
                return Err(HvsError::HostConnection {
                    host_id,
                    state: fault.state,
                });
            }
        };

        if let Err(e) = manifest.validate() {
            tracing::warn!(error = %e, "Host returned an invalid manifest");
            self.hosts
                .append_status(&HostStatus::new(host_id, HostState::InvalidManifest, None))
                .await?;
            return Err(e);
        }

        self.hosts
            .append_status(&HostStatus::new(
                host_id,
                HostState::Connected,
                Some(manifest.clone()),
            ))
            .await?;

        let trust_report = self.evaluate_host(&host, &manifest).await?;

        let now = Utc::now();
        let saml = self.saml.render(
            &trust_report,
            &manifest.host_info,
            now,
            self.config.report_validity,
        )?;
        let report = Report::new(host_id, trust_report, saml, now, self.config.report_validity);
        self.reports.persist(&report).await?;

        tracing::info!(
            report_id = %report.id,
            trusted = report.trusted(),
            expiration = %report.expiration,
            "Created trust report"
        );
        Ok(report)
    }

    /// evaluate_host builds the merged TrustReport of `manifest` over all
    /// flavorgroups linked to `host`. Groups without a match policy are
    /// skipped.
    pub async fn evaluate_host(&self, host: &Host, manifest: &HostManifest) -> HvsResult<TrustReport> {
        let mut merged: Option<TrustReport> = None;

        for flavorgroup_id in host.flavorgroup_ids.iter() {
            let Some(policy) = self.flavors.find_match_policy(*flavorgroup_id).await? else {
                tracing::debug!(flavorgroup_id = %flavorgroup_id, "Flavorgroup has no match policy");
                continue;
            };

            let (host_specific, shared): (Vec<FlavorPart>, Vec<FlavorPart>) = policy
                .parts()
                .into_iter()
                .partition(FlavorPart::is_host_specific);

            let mut flavors: Vec<Flavor> = Vec::new();
            if !shared.is_empty() {
                flavors.extend(
                    self.flavors
                        .find_flavors(&FlavorQuery::for_flavorgroup(*flavorgroup_id, &shared))
                        .await?,
                );
            }
            if let (false, Some(hardware_uuid)) =
                (host_specific.is_empty(), manifest.hardware_uuid())
            {
                flavors.extend(
                    self.flavors
                        .find_flavors(&FlavorQuery::for_hardware_uuid(
                            hardware_uuid,
                            &host_specific,
                        ))
                        .await?,
                );
            }

            tracing::debug!(
                flavorgroup_id = %flavorgroup_id,
                candidates = flavors.len(),
                "Evaluating flavorgroup"
            );
            let report = verifier::evaluate(manifest, &policy, &flavors, &self.registry);
            merged = Some(match merged {
                Some(existing) => existing.merge(report),
                None => report,
            });
        }

        Ok(merged.unwrap_or_default())
    }
}
