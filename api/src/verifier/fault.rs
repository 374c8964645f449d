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

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FaultKind {
    PcrValueMissing,
    PcrValueMismatch,
    PcrEventLogMissing,
    PcrEventLogMissingExpectedEntries,
    PcrEventLogContainsUnexpectedEntries,
    PcrEventLogInvalid,
    HostInfoMismatch,
    FeatureMismatch,
    AssetTagMissing,
    AssetTagMismatch,
    XmlMeasurementsMissing,
    XmlMeasurementValueMismatch,
    XmlMeasurementLogMissingExpectedEntries,
    XmlMeasurementLogContainsUnexpectedEntries,
    XmlMeasurementLogValueMismatch,
    XmlMeasurementLogInvalid,
    FlavorNotDefined,
    FlavorDefinesNoRules,
}

///////////////////////////////////////////////////////////////////////////////
/// Fault is a single reason a rule (or a flavor part) is not trusted. Faults
/// are data carried inside the trust report, never errors.
///
/// `entries` lists the offending items when the fault is about a set, e.g.
/// the event log entries that were expected but not observed.
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    #[serde(rename = "fault_name")]
    pub kind: FaultKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<String>,
}

impl Fault {
    pub fn new(kind: FaultKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            entries: Vec::new(),
        }
    }

    pub fn with_entries(mut self, entries: Vec<String>) -> Self {
        self.entries = entries;
        self
    }

    pub fn flavor_not_defined() -> Self {
        Self::new(FaultKind::FlavorNotDefined, "no flavor defined")
    }

    pub fn flavor_defines_no_rules(label: &str) -> Self {
        Self::new(
            FaultKind::FlavorDefinesNoRules,
            format!("flavor {label} defines no rules"),
        )
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.description)?;
        if !self.entries.is_empty() {
            write!(f, " [{}]", self.entries.join(", "))?;
        }
        Ok(())
    }
}
