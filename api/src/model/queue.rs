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
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::keys::{HostId, QueueEntryId};

pub const FLAVOR_VERIFY_ACTION: &str = "flavor-verify";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueState {
    New,
    Running,
    Completed,
    Error,
}

impl QueueState {
    /// in_flight is true for entries that are queued or executing.
    pub fn in_flight(&self) -> bool {
        matches!(self, QueueState::New | QueueState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::New => "NEW",
            QueueState::Running => "RUNNING",
            QueueState::Completed => "COMPLETED",
            QueueState::Error => "ERROR",
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown queue state: {0}")]
pub struct QueueStateParseError(pub String);

impl FromStr for QueueState {
    type Err = QueueStateParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "NEW" => Ok(QueueState::New),
            "RUNNING" => Ok(QueueState::Running),
            "COMPLETED" => Ok(QueueState::Completed),
            "ERROR" => Ok(QueueState::Error),
            other => Err(QueueStateParseError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorVerifyParams {
    pub host_id: HostId,
    pub force_update: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: QueueEntryId,
    pub action: String,
    pub parameters: FlavorVerifyParams,
    pub state: QueueState,
    pub created: DateTime<Utc>,
    /// Time of the last state change.
    pub updated: DateTime<Utc>,
}

impl QueueEntry {
    pub fn flavor_verify(host_id: HostId, force_update: bool) -> Self {
        let now = Utc::now();
        Self {
            id: QueueEntryId::new(),
            action: FLAVOR_VERIFY_ACTION.to_string(),
            parameters: FlavorVerifyParams {
                host_id,
                force_update,
            },
            state: QueueState::New,
            created: now,
            updated: now,
        }
    }

    pub fn host_id(&self) -> HostId {
        self.parameters.host_id
    }

    pub fn force_level(&self) -> u8 {
        force_level(self.parameters.force_update)
    }

    pub fn set_state(&mut self, state: QueueState, now: DateTime<Utc>) {
        self.state = state;
        self.updated = now;
    }

    /// is_stale is true for a RUNNING entry that has not changed state
    /// since before `stale_before`.
    pub fn is_stale(&self, stale_before: DateTime<Utc>) -> bool {
        self.state == QueueState::Running && self.updated < stale_before
    }
}

pub fn force_level(force_update: bool) -> u8 {
    if force_update {
        1
    } else {
        0
    }
}

///////////////////////////////////////////////////////////////////////////////
/// enqueue_required decides whether a new flavor-verify entry for `host_id`
/// must be inserted, given the entries currently in the queue. An in-flight
/// entry for the same host blocks the insert when its force level is equal
/// to or higher than the requested one, so a forced request can still be
/// queued behind a pending non-forced one, but never the other way round.
///////////////////////////////////////////////////////////////////////////////

pub fn enqueue_required(existing: &[QueueEntry], host_id: HostId, force_update: bool) -> bool {
    let requested = force_level(force_update);
    !existing.iter().any(|entry| {
        entry.action == FLAVOR_VERIFY_ACTION
            && entry.host_id() == host_id
            && entry.state.in_flight()
            && entry.force_level() >= requested
    })
}
