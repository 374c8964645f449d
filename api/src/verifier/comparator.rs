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
 *  Primitive measurement comparisons. Every function here is pure and
 *  total: a difference between what a flavor expects and what a host
 *  reported comes back as Comparison::Mismatch carrying a Fault, never as
 *  an error.
*/

use std::collections::{BTreeMap, BTreeSet};

use crate::model::host_manifest::{
    EventLogEntry, FileMeasurement, HostInfo, Pcr, PcrBank, PcrEventLog, SoftwareMeasurement,
};
use crate::verifier::fault::{Fault, FaultKind};

/// Software measurement documents are always extended with SHA384.
pub const MEASUREMENT_BANK: PcrBank = PcrBank::Sha384;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Match,
    Mismatch(Fault),
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        matches!(self, Comparison::Match)
    }

    pub fn into_fault(self) -> Option<Fault> {
        match self {
            Comparison::Match => None,
            Comparison::Mismatch(fault) => Some(fault),
        }
    }
}

/// compare_pcr checks that the observed register for (bank, index) holds
/// exactly the expected value. Hex case is not significant.
pub fn compare_pcr(index: u8, bank: PcrBank, expected: &str, observed: Option<&Pcr>) -> Comparison {
    let Some(pcr) = observed else {
        return Comparison::Mismatch(Fault::new(
            FaultKind::PcrValueMissing,
            format!("pcr {index} ({bank}) is missing from the host manifest"),
        ));
    };
    if pcr.bank != bank || pcr.index != index {
        return Comparison::Mismatch(Fault::new(
            FaultKind::PcrValueMissing,
            format!(
                "expected pcr {index} ({bank}), host reported pcr {} ({})",
                pcr.index, pcr.bank
            ),
        ));
    }
    if !pcr.value.eq_ignore_ascii_case(expected) {
        return Comparison::Mismatch(Fault::new(
            FaultKind::PcrValueMismatch,
            format!(
                "pcr {index} ({bank}) expected {} but was {}",
                expected.to_lowercase(),
                pcr.value.to_lowercase()
            ),
        ));
    }
    Comparison::Match
}

fn entry_keys(entries: &[EventLogEntry]) -> BTreeSet<(String, String)> {
    entries.iter().map(EventLogEntry::key).collect()
}

fn describe(keys: impl IntoIterator<Item = (String, String)>) -> Vec<String> {
    keys.into_iter()
        .map(|(label, digest)| format!("{label}:{digest}"))
        .collect()
}

fn event_log_missing(index: u8, bank: PcrBank) -> Comparison {
    Comparison::Mismatch(Fault::new(
        FaultKind::PcrEventLogMissing,
        format!("event log for pcr {index} ({bank}) is missing from the host manifest"),
    ))
}

/// compare_event_log_includes is an order-insensitive subset check by
/// (label, digest). Extra observed entries are not a fault.
pub fn compare_event_log_includes(
    index: u8,
    bank: PcrBank,
    expected: &[EventLogEntry],
    observed: Option<&PcrEventLog>,
) -> Comparison {
    let expected_keys = entry_keys(expected);
    let Some(log) = observed else {
        if expected_keys.is_empty() {
            return Comparison::Match;
        }
        return event_log_missing(index, bank);
    };

    let observed_keys = entry_keys(&log.entries);
    let missing: Vec<_> = expected_keys.difference(&observed_keys).cloned().collect();
    if missing.is_empty() {
        return Comparison::Match;
    }
    Comparison::Mismatch(
        Fault::new(
            FaultKind::PcrEventLogMissingExpectedEntries,
            format!(
                "event log for pcr {index} ({bank}) is missing {} expected entries",
                missing.len()
            ),
        )
        .with_entries(describe(missing)),
    )
}

/// compare_event_log_equals requires the observed log to contain exactly
/// the expected entries, once entries whose label is in `excluding_labels`
/// are dropped from both sides. Missing and unexpected entries are
/// reported as separate faults.
pub fn compare_event_log_equals(
    index: u8,
    bank: PcrBank,
    expected: &[EventLogEntry],
    excluding_labels: &[String],
    observed: Option<&PcrEventLog>,
) -> Vec<Comparison> {
    let keep = |entries: &[EventLogEntry]| -> BTreeSet<(String, String)> {
        entry_keys(entries)
            .into_iter()
            .filter(|(label, _)| !excluding_labels.contains(label))
            .collect()
    };

    let expected_keys = keep(expected);
    let Some(log) = observed else {
        if expected_keys.is_empty() {
            return vec![Comparison::Match];
        }
        return vec![event_log_missing(index, bank)];
    };
    let observed_keys = keep(&log.entries);

    let mut comparisons = Vec::new();
    let missing: Vec<_> = expected_keys.difference(&observed_keys).cloned().collect();
    if !missing.is_empty() {
        comparisons.push(Comparison::Mismatch(
            Fault::new(
                FaultKind::PcrEventLogMissingExpectedEntries,
                format!(
                    "event log for pcr {index} ({bank}) is missing {} expected entries",
                    missing.len()
                ),
            )
            .with_entries(describe(missing)),
        ));
    }
    let unexpected: Vec<_> = observed_keys.difference(&expected_keys).cloned().collect();
    if !unexpected.is_empty() {
        comparisons.push(Comparison::Mismatch(
            Fault::new(
                FaultKind::PcrEventLogContainsUnexpectedEntries,
                format!(
                    "event log for pcr {index} ({bank}) contains {} unexpected entries",
                    unexpected.len()
                ),
            )
            .with_entries(describe(unexpected)),
        ));
    }
    if comparisons.is_empty() {
        comparisons.push(Comparison::Match);
    }
    comparisons
}

/// replay extends a zeroed register of `bank` with every digest in order.
/// Returns None if a digest is not valid hex of the bank's length.
pub fn replay<'a>(bank: PcrBank, digests: impl IntoIterator<Item = &'a str>) -> Option<Vec<u8>> {
    let mut register = vec![0u8; bank.digest_len()];
    for digest in digests {
        let bytes = hex::decode(digest).ok()?;
        if bytes.len() != bank.digest_len() {
            return None;
        }
        register = bank.extend(&register, &bytes);
    }
    Some(register)
}

/// compare_event_log_replay checks that replaying the observed event log
/// reproduces the observed PCR value.
pub fn compare_event_log_replay(
    index: u8,
    bank: PcrBank,
    log: Option<&PcrEventLog>,
    pcr: Option<&Pcr>,
) -> Comparison {
    let Some(log) = log else {
        return event_log_missing(index, bank);
    };
    let Some(pcr) = pcr else {
        return compare_pcr(index, bank, "", None);
    };

    let digests = log.entries.iter().map(|entry| entry.digest.as_str());
    match replay(bank, digests) {
        Some(register) if hex::encode(&register).eq_ignore_ascii_case(&pcr.value) => {
            Comparison::Match
        }
        Some(register) => Comparison::Mismatch(Fault::new(
            FaultKind::PcrEventLogInvalid,
            format!(
                "event log for pcr {index} ({bank}) replays to {} but pcr value is {}",
                hex::encode(register),
                pcr.value.to_lowercase()
            ),
        )),
        None => Comparison::Mismatch(Fault::new(
            FaultKind::PcrEventLogInvalid,
            format!("event log for pcr {index} ({bank}) contains malformed digests"),
        )),
    }
}

pub fn compare_host_attribute(name: &str, expected: &str, host_info: &HostInfo) -> Comparison {
    match host_info.attribute(name) {
        Some(value) if value == expected => Comparison::Match,
        Some(value) => Comparison::Mismatch(Fault::new(
            FaultKind::HostInfoMismatch,
            format!("host info {name} expected '{expected}' but was '{value}'"),
        )),
        None => Comparison::Mismatch(Fault::new(
            FaultKind::HostInfoMismatch,
            format!("host info {name} expected '{expected}' but was not reported"),
        )),
    }
}

/// compare_feature compares a hardware feature flag. Values are compared
/// case-insensitively so that "true" and "TRUE" agree.
pub fn compare_feature(name: &str, expected: &str, observed: Option<&str>) -> Comparison {
    match observed {
        Some(value) if value.eq_ignore_ascii_case(expected) => Comparison::Match,
        Some(value) => Comparison::Mismatch(Fault::new(
            FaultKind::FeatureMismatch,
            format!("hardware feature {name} expected '{expected}' but was '{value}'"),
        )),
        None => Comparison::Mismatch(Fault::new(
            FaultKind::FeatureMismatch,
            format!("hardware feature {name} expected '{expected}' but was not reported"),
        )),
    }
}

pub fn compare_asset_tag(expected: &str, observed: Option<&str>) -> Comparison {
    match observed {
        Some(value) if value.eq_ignore_ascii_case(expected) => Comparison::Match,
        Some(_) => Comparison::Mismatch(Fault::new(
            FaultKind::AssetTagMismatch,
            "asset tag digest does not match the provisioned tag",
        )),
        None => Comparison::Mismatch(Fault::new(
            FaultKind::AssetTagMissing,
            "host did not report an asset tag digest",
        )),
    }
}

fn measurement_missing(label: &str) -> Comparison {
    Comparison::Mismatch(Fault::new(
        FaultKind::XmlMeasurementsMissing,
        format!("software measurement '{label}' is missing from the host manifest"),
    ))
}

pub fn compare_measurement_digest(
    label: &str,
    expected: &str,
    observed: Option<&SoftwareMeasurement>,
) -> Comparison {
    let Some(measurement) = observed else {
        return measurement_missing(label);
    };
    if measurement.cumulative_hash.eq_ignore_ascii_case(expected) {
        Comparison::Match
    } else {
        Comparison::Mismatch(Fault::new(
            FaultKind::XmlMeasurementValueMismatch,
            format!(
                "software measurement '{label}' cumulative hash expected {} but was {}",
                expected.to_lowercase(),
                measurement.cumulative_hash.to_lowercase()
            ),
        ))
    }
}

/// compare_measurement_log compares the file entries of a software
/// measurement by path: missing paths, unexpected paths and paths whose
/// digest differs each produce one fault.
pub fn compare_measurement_log(
    label: &str,
    expected: &[FileMeasurement],
    observed: Option<&SoftwareMeasurement>,
) -> Vec<Comparison> {
    let Some(measurement) = observed else {
        return vec![measurement_missing(label)];
    };

    let by_path = |entries: &[FileMeasurement]| -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|m| (m.path.clone(), m.digest.to_lowercase()))
            .collect()
    };
    let expected = by_path(expected);
    let observed = by_path(&measurement.measurements);

    let missing: Vec<String> = expected
        .keys()
        .filter(|path| !observed.contains_key(*path))
        .cloned()
        .collect();
    let unexpected: Vec<String> = observed
        .keys()
        .filter(|path| !expected.contains_key(*path))
        .cloned()
        .collect();
    let changed: Vec<String> = expected
        .iter()
        .filter_map(|(path, digest)| match observed.get(path) {
            Some(other) if other != digest => Some(path.clone()),
            _ => None,
        })
        .collect();

    let mut comparisons = Vec::new();
    if !missing.is_empty() {
        comparisons.push(Comparison::Mismatch(
            Fault::new(
                FaultKind::XmlMeasurementLogMissingExpectedEntries,
                format!("software measurement '{label}' is missing expected entries"),
            )
            .with_entries(missing),
        ));
    }
    if !unexpected.is_empty() {
        comparisons.push(Comparison::Mismatch(
            Fault::new(
                FaultKind::XmlMeasurementLogContainsUnexpectedEntries,
                format!("software measurement '{label}' contains unexpected entries"),
            )
            .with_entries(unexpected),
        ));
    }
    if !changed.is_empty() {
        comparisons.push(Comparison::Mismatch(
            Fault::new(
                FaultKind::XmlMeasurementLogValueMismatch,
                format!("software measurement '{label}' has entries with unexpected digests"),
            )
            .with_entries(changed),
        ));
    }
    if comparisons.is_empty() {
        comparisons.push(Comparison::Match);
    }
    comparisons
}

/// compare_measurement_replay checks that the observed cumulative hash is
/// the SHA384 extend chain of the observed file digests.
pub fn compare_measurement_replay(label: &str, observed: Option<&SoftwareMeasurement>) -> Comparison {
    let Some(measurement) = observed else {
        return measurement_missing(label);
    };
    let digests = measurement.measurements.iter().map(|m| m.digest.as_str());
    match replay(MEASUREMENT_BANK, digests) {
        Some(register) if hex::encode(&register).eq_ignore_ascii_case(&measurement.cumulative_hash) => {
            Comparison::Match
        }
        _ => Comparison::Mismatch(Fault::new(
            FaultKind::XmlMeasurementLogInvalid,
            format!(
                "software measurement '{label}' entries do not reproduce its cumulative hash"
            ),
        )),
    }
}
