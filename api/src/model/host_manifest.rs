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
 *  The observed state of a host, as collected from its attestation agent
 *  during a single attestation attempt. A HostManifest is never mutated
 *  after it has been fetched; a new attempt produces a new manifest.
*/

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::{HvsError, HvsResult};

/// Highest PCR register index on a TPM 2.0 device.
pub const MAX_PCR_INDEX: u8 = 23;

/// PcrBank is the hash algorithm of a PCR bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PcrBank {
    Sha1,
    Sha256,
    Sha384,
}

impl PcrBank {
    pub fn digest_len(&self) -> usize {
        match self {
            PcrBank::Sha1 => 20,
            PcrBank::Sha256 => 32,
            PcrBank::Sha384 => 48,
        }
    }

    /// extend performs a single TPM extend operation in this bank:
    /// H(current || digest).
    pub fn extend(&self, current: &[u8], digest: &[u8]) -> Vec<u8> {
        match self {
            PcrBank::Sha1 => {
                let mut hasher = sha1::Sha1::new();
                hasher.update(current);
                hasher.update(digest);
                hasher.finalize().to_vec()
            }
            PcrBank::Sha256 => {
                let mut hasher = sha2::Sha256::new();
                hasher.update(current);
                hasher.update(digest);
                hasher.finalize().to_vec()
            }
            PcrBank::Sha384 => {
                let mut hasher = sha2::Sha384::new();
                hasher.update(current);
                hasher.update(digest);
                hasher.finalize().to_vec()
            }
        }
    }
}

impl fmt::Display for PcrBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PcrBank::Sha1 => write!(f, "SHA1"),
            PcrBank::Sha256 => write!(f, "SHA256"),
            PcrBank::Sha384 => write!(f, "SHA384"),
        }
    }
}

/// is_hex_digest returns true when `value` is lowercase or uppercase hex
/// and decodes to exactly `len` bytes.
pub fn is_hex_digest(value: &str, len: usize) -> bool {
    value.len() == len * 2 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Pcr is a single observed PCR register value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pcr {
    pub index: u8,
    pub bank: PcrBank,
    pub value: String,
}

/// EventLogEntry is one measured event extended into a PCR.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub label: String,
    pub digest: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub info: BTreeMap<String, String>,
}

impl EventLogEntry {
    pub fn new(label: &str, digest: &str) -> Self {
        Self {
            label: label.to_string(),
            digest: digest.to_lowercase(),
            info: BTreeMap::new(),
        }
    }

    /// key is the identity of an entry for comparison purposes. The
    /// free-form info map is descriptive only and does not take part.
    pub fn key(&self) -> (String, String) {
        (self.label.clone(), self.digest.to_lowercase())
    }
}

impl fmt::Display for EventLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.label, self.digest)
    }
}

/// PcrEventLog is the ordered event log for one (bank, index) register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcrEventLog {
    pub index: u8,
    pub bank: PcrBank,
    pub entries: Vec<EventLogEntry>,
}

/// HostInfo carries the descriptive platform attributes reported by the
/// host's attestation agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    #[serde(default)]
    pub host_name: String,
    #[serde(default)]
    pub os_name: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub bios_name: String,
    #[serde(default)]
    pub bios_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vmm_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vmm_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_uuid: Option<uuid::Uuid>,
    #[serde(default)]
    pub tpm_version: String,
    #[serde(default)]
    pub tpm_enabled: bool,
    #[serde(default)]
    pub txt_enabled: bool,
    #[serde(default)]
    pub hardware_features: BTreeMap<String, String>,
}

impl HostInfo {
    /// attribute looks up a named host-info attribute, as referenced by
    /// flavor descriptions and SAML attribute statements.
    pub fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "host_name" => Some(self.host_name.clone()),
            "os_name" => Some(self.os_name.clone()),
            "os_version" => Some(self.os_version.clone()),
            "bios_name" => Some(self.bios_name.clone()),
            "bios_version" => Some(self.bios_version.clone()),
            "vmm_name" => self.vmm_name.clone(),
            "vmm_version" => self.vmm_version.clone(),
            "hardware_uuid" => self.hardware_uuid.map(|u| u.to_string()),
            "tpm_version" => Some(self.tpm_version.clone()),
            "tpm_enabled" => Some(self.tpm_enabled.to_string()),
            "txt_enabled" => Some(self.txt_enabled.to_string()),
            _ => None,
        }
    }

    /// flatten returns every populated attribute, with hardware features
    /// prefixed by `feature_`. Ordering is stable (BTreeMap).
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let mut flat = BTreeMap::new();
        for name in [
            "host_name",
            "os_name",
            "os_version",
            "bios_name",
            "bios_version",
            "vmm_name",
            "vmm_version",
            "hardware_uuid",
            "tpm_version",
            "tpm_enabled",
            "txt_enabled",
        ] {
            if let Some(value) = self.attribute(name) {
                if !value.is_empty() {
                    flat.insert(name.to_string(), value);
                }
            }
        }
        for (feature, value) in self.hardware_features.iter() {
            flat.insert(format!("feature_{feature}"), value.clone());
        }
        flat
    }
}

/// FileMeasurement is a single file/directory digest inside a software
/// measurement document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileMeasurement {
    pub path: String,
    pub digest: String,
}

/// SoftwareMeasurement is the parsed form of one measurement document
/// produced by the host's application integrity agent. `label` ties it
/// to the SOFTWARE flavor of the same label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareMeasurement {
    pub label: String,
    pub cumulative_hash: String,
    #[serde(default)]
    pub measurements: Vec<FileMeasurement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostManifest {
    pub host_info: HostInfo,
    #[serde(default)]
    pub pcrs: Vec<Pcr>,
    #[serde(default)]
    pub event_logs: Vec<PcrEventLog>,
    #[serde(default)]
    pub software_measurements: Vec<SoftwareMeasurement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_tag_digest: Option<String>,
}

impl HostManifest {
    pub fn pcr(&self, bank: PcrBank, index: u8) -> Option<&Pcr> {
        self.pcrs
            .iter()
            .find(|pcr| pcr.bank == bank && pcr.index == index)
    }

    pub fn event_log(&self, bank: PcrBank, index: u8) -> Option<&PcrEventLog> {
        self.event_logs
            .iter()
            .find(|log| log.bank == bank && log.index == index)
    }

    pub fn software_measurement(&self, label: &str) -> Option<&SoftwareMeasurement> {
        self.software_measurements
            .iter()
            .find(|measurement| measurement.label == label)
    }

    pub fn measurement_labels(&self) -> HashSet<&str> {
        self.software_measurements
            .iter()
            .map(|measurement| measurement.label.as_str())
            .collect()
    }

    pub fn hardware_uuid(&self) -> Option<uuid::Uuid> {
        self.host_info.hardware_uuid
    }

    ////////////////////////////////////////////////////////////
    /// validate makes sure a freshly fetched manifest is
    /// well-formed before it is evaluated. Anything rejected
    /// here is an input problem, not a trust verdict.
    ////////////////////////////////////////////////////////////

    pub fn validate(&self) -> HvsResult<()> {
        if self.host_info.hardware_uuid.is_none() {
            return Err(HvsError::InvalidManifest(
                "host info is missing hardware_uuid".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for pcr in self.pcrs.iter() {
            if pcr.index > MAX_PCR_INDEX {
                return Err(HvsError::InvalidManifest(format!(
                    "pcr index {} out of range",
                    pcr.index
                )));
            }
            if !is_hex_digest(&pcr.value, pcr.bank.digest_len()) {
                return Err(HvsError::InvalidManifest(format!(
                    "pcr {} ({}) value is not a {} byte hex digest",
                    pcr.index,
                    pcr.bank,
                    pcr.bank.digest_len()
                )));
            }
            if !seen.insert((pcr.bank, pcr.index)) {
                return Err(HvsError::InvalidManifest(format!(
                    "duplicate pcr {} ({})",
                    pcr.index, pcr.bank
                )));
            }
        }

        for log in self.event_logs.iter() {
            if log.index > MAX_PCR_INDEX {
                return Err(HvsError::InvalidManifest(format!(
                    "event log pcr index {} out of range",
                    log.index
                )));
            }
            if let Some(entry) = log
                .entries
                .iter()
                .find(|entry| !is_hex_digest(&entry.digest, log.bank.digest_len()))
            {
                return Err(HvsError::InvalidManifest(format!(
                    "event log entry '{}' for pcr {} ({}) has a malformed digest",
                    entry.label, log.index, log.bank
                )));
            }
        }

        if let Some(tag) = self.asset_tag_digest.as_ref() {
            if !tag.chars().all(|c| c.is_ascii_hexdigit()) || tag.is_empty() {
                return Err(HvsError::InvalidManifest(
                    "asset tag digest is not hex".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> HostManifest {
        HostManifest {
            host_info: HostInfo {
                host_name: "host-a".to_string(),
                hardware_uuid: Some(uuid::Uuid::new_v4()),
                ..Default::default()
            },
            pcrs: vec![Pcr {
                index: 0,
                bank: PcrBank::Sha256,
                value: "ab".repeat(32),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(manifest().validate().is_ok());
    }

    #[test]
    fn test_validate_missing_hardware_uuid() {
        let mut m = manifest();
        m.host_info.hardware_uuid = None;
        assert!(matches!(m.validate(), Err(HvsError::InvalidManifest(_))));
    }

    #[test]
    fn test_validate_rejects_bad_digest_len_and_duplicates() {
        let mut m = manifest();
        m.pcrs[0].value = "ab".repeat(20);
        assert!(m.validate().is_err());

        let mut m = manifest();
        m.pcrs.push(m.pcrs[0].clone());
        assert!(m.validate().is_err());

        let mut m = manifest();
        m.pcrs[0].index = 24;
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_extend_matches_manual_sha256() {
        let zero = vec![0u8; 32];
        let digest = vec![1u8; 32];
        let mut hasher = sha2::Sha256::new();
        hasher.update(&zero);
        hasher.update(&digest);
        assert_eq!(
            PcrBank::Sha256.extend(&zero, &digest),
            hasher.finalize().to_vec()
        );
        assert_eq!(PcrBank::Sha1.extend(&[0u8; 20], &[2u8; 20]).len(), 20);
    }

    #[test]
    fn test_flatten_includes_features() {
        let mut info = manifest().host_info;
        info.os_name = "RedHatEnterpriseServer".to_string();
        info.hardware_features
            .insert("TXT".to_string(), "true".to_string());
        let flat = info.flatten();
        assert_eq!(flat.get("os_name").unwrap(), "RedHatEnterpriseServer");
        assert_eq!(flat.get("feature_TXT").unwrap(), "true");
        assert!(!flat.contains_key("os_version"));
    }
}
