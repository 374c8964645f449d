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
 *  Flavors are named, immutable measurement baselines. Each flavor is
 *  classified into exactly one FlavorPart and carries the expectations
 *  (PCR values, event log entries, attributes, software measurements)
 *  that the rule registry turns into rules.
*/

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::host_manifest::{EventLogEntry, FileMeasurement, PcrBank};
use crate::model::keys::FlavorId;
use crate::{HvsError, HvsResult};

///////////////////////////////////////////////////////////////////////////////
/// FlavorPart is the classification of a flavor. The deprecated BIOS part
/// is still accepted on input and folded into PLATFORM.
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlavorPart {
    #[serde(alias = "BIOS")]
    Platform,
    Os,
    AssetTag,
    HostUnique,
    Software,
}

impl FlavorPart {
    pub const ALL: [FlavorPart; 5] = [
        FlavorPart::Platform,
        FlavorPart::Os,
        FlavorPart::AssetTag,
        FlavorPart::HostUnique,
        FlavorPart::Software,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlavorPart::Platform => "PLATFORM",
            FlavorPart::Os => "OS",
            FlavorPart::AssetTag => "ASSET_TAG",
            FlavorPart::HostUnique => "HOST_UNIQUE",
            FlavorPart::Software => "SOFTWARE",
        }
    }

    /// is_host_specific is true for parts whose flavors are tied 1:1 to a
    /// host by hardware UUID rather than shared through a flavorgroup.
    pub fn is_host_specific(&self) -> bool {
        matches!(self, FlavorPart::AssetTag | FlavorPart::HostUnique)
    }
}

impl fmt::Display for FlavorPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown flavor part: {0}")]
pub struct FlavorPartParseError(pub String);

impl FromStr for FlavorPart {
    type Err = FlavorPartParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_uppercase().as_str() {
            "PLATFORM" | "BIOS" => Ok(FlavorPart::Platform),
            "OS" => Ok(FlavorPart::Os),
            "ASSET_TAG" => Ok(FlavorPart::AssetTag),
            "HOST_UNIQUE" => Ok(FlavorPart::HostUnique),
            "SOFTWARE" => Ok(FlavorPart::Software),
            _ => Err(FlavorPartParseError(input.to_string())),
        }
    }
}

/// FlavorDescription is the descriptive metadata of a flavor. Any
/// populated name/version field is expected to match the host info.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bios_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bios_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vmm_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vmm_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpm_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_uuid: Option<uuid::Uuid>,
}

impl FlavorDescription {
    /// expected_attributes lists the host-info attributes this description
    /// pins, in a fixed order. The hardware UUID is not part of this list;
    /// it selects candidates instead of being compared by a rule.
    pub fn expected_attributes(&self) -> Vec<(&'static str, String)> {
        [
            ("bios_name", &self.bios_name),
            ("bios_version", &self.bios_version),
            ("os_name", &self.os_name),
            ("os_version", &self.os_version),
            ("vmm_name", &self.vmm_name),
            ("vmm_version", &self.vmm_version),
            ("tpm_version", &self.tpm_version),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_ref().map(|v| (name, v.clone())))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorMeta {
    pub id: FlavorId,
    pub label: String,
    pub flavor_part: FlavorPart,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub description: FlavorDescription,
}

///////////////////////////////////////////////////////////////////////////////
/// EventLogExpectation describes how the observed event log of a PCR is
/// checked: either the expected entries must all be present (extra observed
/// entries are fine), or the observed log must contain exactly the expected
/// entries, ignoring any entry whose label is excluded.
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum EventLogExpectation {
    Includes {
        entries: Vec<EventLogEntry>,
    },
    Equals {
        entries: Vec<EventLogEntry>,
        #[serde(default)]
        excluding_labels: Vec<String>,
    },
}

impl EventLogExpectation {
    pub fn entries(&self) -> &[EventLogEntry] {
        match self {
            EventLogExpectation::Includes { entries } => entries,
            EventLogExpectation::Equals { entries, .. } => entries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorPcr {
    pub index: u8,
    pub bank: PcrBank,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_log: Option<EventLogExpectation>,
    /// When set, the observed event log must replay to the observed PCR value.
    #[serde(default)]
    pub verify_event_log_integrity: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareExpectation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpm_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txt_enabled: Option<bool>,
    #[serde(default)]
    pub features: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareExpectation {
    pub cumulative_hash: String,
    #[serde(default)]
    pub measurements: Vec<FileMeasurement>,
    /// When set, the observed cumulative hash must be reproducible from the
    /// observed file digests.
    #[serde(default)]
    pub verify_integrity: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavor {
    pub meta: FlavorMeta,
    #[serde(default)]
    pub pcrs: Vec<FlavorPcr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware: Option<HardwareExpectation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_tag_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software: Option<SoftwareExpectation>,
}

impl Flavor {
    pub fn new(label: &str, flavor_part: FlavorPart, created: DateTime<Utc>) -> Self {
        Self {
            meta: FlavorMeta {
                id: FlavorId::new(),
                label: label.to_string(),
                flavor_part,
                created,
                description: FlavorDescription::default(),
            },
            pcrs: Vec::new(),
            hardware: None,
            asset_tag_digest: None,
            software: None,
        }
    }

    pub fn id(&self) -> FlavorId {
        self.meta.id
    }

    pub fn part(&self) -> FlavorPart {
        self.meta.flavor_part
    }

    pub fn label(&self) -> &str {
        &self.meta.label
    }

    pub fn hardware_uuid(&self) -> Option<uuid::Uuid> {
        self.meta.description.hardware_uuid
    }

    /// validate rejects a flavor that pins nothing about the host. Such a
    /// flavor expands into no rules and would match any host.
    pub fn validate(&self) -> HvsResult<()> {
        let pins_hardware = self.hardware.as_ref().is_some_and(|hardware| {
            hardware.tpm_enabled.is_some()
                || hardware.txt_enabled.is_some()
                || !hardware.features.is_empty()
        });
        let pins_something = !self.pcrs.is_empty()
            || pins_hardware
            || self.asset_tag_digest.is_some()
            || self.software.is_some()
            || !self.meta.description.expected_attributes().is_empty();
        if !pins_something {
            return Err(HvsError::InvalidArgument(format!(
                "flavor {} defines nothing to verify",
                self.label()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bios_part_is_folded_into_platform() {
        let part: FlavorPart = serde_json::from_str("\"BIOS\"").unwrap();
        assert_eq!(part, FlavorPart::Platform);
        assert_eq!("bios".parse::<FlavorPart>().unwrap(), FlavorPart::Platform);
        assert_eq!(
            serde_json::to_string(&FlavorPart::HostUnique).unwrap(),
            "\"HOST_UNIQUE\""
        );
    }

    #[test]
    fn test_expected_attributes_skip_unset() {
        let description = FlavorDescription {
            os_name: Some("RedHatEnterpriseServer".to_string()),
            os_version: Some("7.4".to_string()),
            hardware_uuid: Some(uuid::Uuid::new_v4()),
            ..Default::default()
        };
        assert_eq!(
            description.expected_attributes(),
            vec![
                ("os_name", "RedHatEnterpriseServer".to_string()),
                ("os_version", "7.4".to_string())
            ]
        );
    }

    #[test]
    fn test_flavor_without_expectations_is_invalid() {
        let mut flavor = Flavor::new("empty", FlavorPart::Os, Utc::now());
        assert!(matches!(
            flavor.validate(),
            Err(HvsError::InvalidArgument(_))
        ));

        // An empty hardware section still pins nothing.
        flavor.hardware = Some(HardwareExpectation::default());
        assert!(flavor.validate().is_err());

        flavor.meta.description.os_name = Some("RedHatEnterpriseServer".to_string());
        assert!(flavor.validate().is_ok());
    }

    #[test]
    fn test_event_log_expectation_serde() {
        let json = r#"{"match":"equals","entries":[{"label":"shim","digest":"aa"}],"excluding_labels":["initrd"]}"#;
        let expectation: EventLogExpectation = serde_json::from_str(json).unwrap();
        assert_eq!(expectation.entries().len(), 1);
        assert!(matches!(expectation, EventLogExpectation::Equals { .. }));
    }
}
