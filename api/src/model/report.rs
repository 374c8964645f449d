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

/*!
 *  A Report is the persisted outcome of one verification cycle for one
 *  host. Reports are append-only: a newer verification produces a new
 *  row, and "the" report of a host is simply its latest one.
*/

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::keys::{HostId, ReportId};
use crate::verifier::trust_report::TrustReport;

/// Default report validity, 24 hours.
pub const DEFAULT_REPORT_VALIDITY_SECS: i64 = 86400;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub host_id: HostId,
    pub trust_report: TrustReport,
    /// The signed SAML assertion rendered for trust_report.
    pub saml: String,
    pub created: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
}

impl Report {
    /// new builds a report whose expiration is `created + validity`.
    pub fn new(
        host_id: HostId,
        trust_report: TrustReport,
        saml: String,
        created: DateTime<Utc>,
        validity: Duration,
    ) -> Self {
        Self {
            id: ReportId::new(),
            host_id,
            trust_report,
            saml,
            created,
            expiration: created + validity,
        }
    }

    pub fn trusted(&self) -> bool {
        self.trust_report.overall
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }

    /// expires_within is true if the report is already expired, or will
    /// be by `now + threshold`.
    pub fn expires_within(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.expiration <= now + threshold
    }
}
