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

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::keys::HostId;
use crate::model::queue::QueueEntry;
use crate::model::report::Report;

///////////////////////////////////////////////////////////////////////////////
/// HostTrustCacheState is where a host sits in the report refresh cycle.
///
/// NEEDS_VERIFY -> IN_QUEUE   a flavor-verify entry was enqueued
/// IN_QUEUE     -> VERIFIED   the worker persisted a fresh report
/// VERIFIED     -> NEEDS_VERIFY   the report got within the threshold of
///                                its expiration, or expired
///
/// The refresh sweep enqueues only the hosts that are in NEEDS_VERIFY.
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostTrustCacheState {
    NeedsVerify,
    InQueue,
    Verified,
}

impl HostTrustCacheState {
    /// derive computes the state of `host_id` from its latest report and
    /// the queue entries currently in flight.
    pub fn derive(
        host_id: HostId,
        latest_report: Option<&Report>,
        queue: &[QueueEntry],
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Self {
        if queue
            .iter()
            .any(|entry| entry.host_id() == host_id && entry.state.in_flight())
        {
            return HostTrustCacheState::InQueue;
        }
        match latest_report {
            Some(report) if !report.expires_within(now, threshold) => HostTrustCacheState::Verified,
            _ => HostTrustCacheState::NeedsVerify,
        }
    }
}

impl fmt::Display for HostTrustCacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostTrustCacheState::NeedsVerify => "NEEDS_VERIFY",
            HostTrustCacheState::InQueue => "IN_QUEUE",
            HostTrustCacheState::Verified => "VERIFIED",
        };
        write!(f, "{name}")
    }
}
