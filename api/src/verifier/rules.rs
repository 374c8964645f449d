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
 *  Rules are the unit of trust evaluation. A RuleBuilder derives zero or
 *  more rules from a flavor; the RuleRegistry holds an ordered list of
 *  builders, so the set of rules a flavor expands into is stable and
 *  new rule kinds can be registered without touching the matcher.
*/

use serde::{Deserialize, Serialize};

use crate::model::flavor::{EventLogExpectation, Flavor, FlavorPart};
use crate::model::host_manifest::{EventLogEntry, FileMeasurement, HostManifest, PcrBank};
use crate::verifier::comparator::{self, Comparison};
use crate::verifier::fault::Fault;

/// RuleResult is the outcome of applying one rule to one manifest. It is
/// kept verbatim inside the trust report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_name: String,
    pub markers: Vec<FlavorPart>,
    pub trusted: bool,
    #[serde(default)]
    pub faults: Vec<Fault>,
}

impl RuleResult {
    /// from_comparisons folds a rule's comparisons into a result. The rule
    /// is trusted iff no comparison produced a fault.
    pub fn from_comparisons(
        rule: &dyn Rule,
        comparisons: impl IntoIterator<Item = Comparison>,
    ) -> Self {
        let faults: Vec<Fault> = comparisons
            .into_iter()
            .filter_map(Comparison::into_fault)
            .collect();
        Self {
            rule_name: rule.name().to_string(),
            markers: rule.markers().to_vec(),
            trusted: faults.is_empty(),
            faults,
        }
    }
}

pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;

    /// markers are the flavor parts this rule reports against.
    fn markers(&self) -> &[FlavorPart];

    fn apply(&self, manifest: &HostManifest) -> RuleResult;
}

pub trait RuleBuilder: Send + Sync {
    fn build(&self, flavor: &Flavor) -> Vec<Box<dyn Rule>>;
}

///////////////////////////////////////////////////////////////////////////////
/// RuleRegistry
///////////////////////////////////////////////////////////////////////////////

pub struct RuleRegistry {
    builders: Vec<Box<dyn RuleBuilder>>,
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self {
            builders: vec![
                Box::new(HostInfoRuleBuilder),
                Box::new(PcrConstantRuleBuilder),
                Box::new(PcrEventLogRuleBuilder),
                Box::new(PcrEventLogIntegrityRuleBuilder),
                Box::new(HardwareFeatureRuleBuilder),
                Box::new(AssetTagRuleBuilder),
                Box::new(SoftwareRuleBuilder),
            ],
        }
    }
}

impl RuleRegistry {
    pub fn empty() -> Self {
        Self {
            builders: Vec::new(),
        }
    }

    /// register appends a builder. Its rules are applied after those of
    /// every builder registered before it.
    pub fn register(&mut self, builder: Box<dyn RuleBuilder>) {
        self.builders.push(builder);
    }

    pub fn rules_for(&self, flavor: &Flavor) -> Vec<Box<dyn Rule>> {
        self.builders
            .iter()
            .flat_map(|builder| builder.build(flavor))
            .collect()
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("builders", &self.builders.len())
            .finish()
    }
}

///////////////////////////////////////////////////////////////////////////////
/// Built-in rules
///////////////////////////////////////////////////////////////////////////////

pub struct HostInfoMatches {
    pub attributes: Vec<(&'static str, String)>,
    pub markers: Vec<FlavorPart>,
}

impl Rule for HostInfoMatches {
    fn name(&self) -> &'static str {
        "HostInfoMatches"
    }

    fn markers(&self) -> &[FlavorPart] {
        &self.markers
    }

    fn apply(&self, manifest: &HostManifest) -> RuleResult {
        let comparisons = self.attributes.iter().map(|(name, expected)| {
            comparator::compare_host_attribute(name, expected, &manifest.host_info)
        });
        RuleResult::from_comparisons(self, comparisons)
    }
}

pub struct PcrMatchesConstant {
    pub index: u8,
    pub bank: PcrBank,
    pub value: String,
    pub markers: Vec<FlavorPart>,
}

impl Rule for PcrMatchesConstant {
    fn name(&self) -> &'static str {
        "PcrMatchesConstant"
    }

    fn markers(&self) -> &[FlavorPart] {
        &self.markers
    }

    fn apply(&self, manifest: &HostManifest) -> RuleResult {
        let comparison = comparator::compare_pcr(
            self.index,
            self.bank,
            &self.value,
            manifest.pcr(self.bank, self.index),
        );
        RuleResult::from_comparisons(self, [comparison])
    }
}

pub struct PcrEventLogIncludes {
    pub index: u8,
    pub bank: PcrBank,
    pub entries: Vec<EventLogEntry>,
    pub markers: Vec<FlavorPart>,
}

impl Rule for PcrEventLogIncludes {
    fn name(&self) -> &'static str {
        "PcrEventLogIncludes"
    }

    fn markers(&self) -> &[FlavorPart] {
        &self.markers
    }

    fn apply(&self, manifest: &HostManifest) -> RuleResult {
        let comparison = comparator::compare_event_log_includes(
            self.index,
            self.bank,
            &self.entries,
            manifest.event_log(self.bank, self.index),
        );
        RuleResult::from_comparisons(self, [comparison])
    }
}

pub struct PcrEventLogEqualsExcluding {
    pub index: u8,
    pub bank: PcrBank,
    pub entries: Vec<EventLogEntry>,
    pub excluding_labels: Vec<String>,
    pub markers: Vec<FlavorPart>,
}

impl Rule for PcrEventLogEqualsExcluding {
    fn name(&self) -> &'static str {
        "PcrEventLogEqualsExcluding"
    }

    fn markers(&self) -> &[FlavorPart] {
        &self.markers
    }

    fn apply(&self, manifest: &HostManifest) -> RuleResult {
        let comparisons = comparator::compare_event_log_equals(
            self.index,
            self.bank,
            &self.entries,
            &self.excluding_labels,
            manifest.event_log(self.bank, self.index),
        );
        RuleResult::from_comparisons(self, comparisons)
    }
}

pub struct PcrEventLogIntegrity {
    pub index: u8,
    pub bank: PcrBank,
    pub markers: Vec<FlavorPart>,
}

impl Rule for PcrEventLogIntegrity {
    fn name(&self) -> &'static str {
        "PcrEventLogIntegrity"
    }

    fn markers(&self) -> &[FlavorPart] {
        &self.markers
    }

    fn apply(&self, manifest: &HostManifest) -> RuleResult {
        let comparison = comparator::compare_event_log_replay(
            self.index,
            self.bank,
            manifest.event_log(self.bank, self.index),
            manifest.pcr(self.bank, self.index),
        );
        RuleResult::from_comparisons(self, [comparison])
    }
}

pub struct HardwareFeatureMatches {
    pub feature: String,
    pub expected: String,
    pub markers: Vec<FlavorPart>,
}

impl HardwareFeatureMatches {
    fn observed(&self, manifest: &HostManifest) -> Option<String> {
        let info = &manifest.host_info;
        match self.feature.as_str() {
            "TPM" => Some(info.tpm_enabled.to_string()),
            "TXT" => Some(info.txt_enabled.to_string()),
            other => info.hardware_features.get(other).cloned(),
        }
    }
}

impl Rule for HardwareFeatureMatches {
    fn name(&self) -> &'static str {
        "HardwareFeatureMatches"
    }

    fn markers(&self) -> &[FlavorPart] {
        &self.markers
    }

    fn apply(&self, manifest: &HostManifest) -> RuleResult {
        let observed = self.observed(manifest);
        let comparison =
            comparator::compare_feature(&self.feature, &self.expected, observed.as_deref());
        RuleResult::from_comparisons(self, [comparison])
    }
}

pub struct AssetTagMatches {
    pub digest: String,
    pub markers: Vec<FlavorPart>,
}

impl Rule for AssetTagMatches {
    fn name(&self) -> &'static str {
        "AssetTagMatches"
    }

    fn markers(&self) -> &[FlavorPart] {
        &self.markers
    }

    fn apply(&self, manifest: &HostManifest) -> RuleResult {
        let comparison =
            comparator::compare_asset_tag(&self.digest, manifest.asset_tag_digest.as_deref());
        RuleResult::from_comparisons(self, [comparison])
    }
}

pub struct XmlMeasurementsDigestEquals {
    pub label: String,
    pub cumulative_hash: String,
    pub markers: Vec<FlavorPart>,
}

impl Rule for XmlMeasurementsDigestEquals {
    fn name(&self) -> &'static str {
        "XmlMeasurementsDigestEquals"
    }

    fn markers(&self) -> &[FlavorPart] {
        &self.markers
    }

    fn apply(&self, manifest: &HostManifest) -> RuleResult {
        let comparison = comparator::compare_measurement_digest(
            &self.label,
            &self.cumulative_hash,
            manifest.software_measurement(&self.label),
        );
        RuleResult::from_comparisons(self, [comparison])
    }
}

pub struct XmlMeasurementLogEquals {
    pub label: String,
    pub measurements: Vec<FileMeasurement>,
    pub markers: Vec<FlavorPart>,
}

impl Rule for XmlMeasurementLogEquals {
    fn name(&self) -> &'static str {
        "XmlMeasurementLogEquals"
    }

    fn markers(&self) -> &[FlavorPart] {
        &self.markers
    }

    fn apply(&self, manifest: &HostManifest) -> RuleResult {
        let comparisons = comparator::compare_measurement_log(
            &self.label,
            &self.measurements,
            manifest.software_measurement(&self.label),
        );
        RuleResult::from_comparisons(self, comparisons)
    }
}

pub struct XmlMeasurementLogIntegrity {
    pub label: String,
    pub markers: Vec<FlavorPart>,
}

impl Rule for XmlMeasurementLogIntegrity {
    fn name(&self) -> &'static str {
        "XmlMeasurementLogIntegrity"
    }

    fn markers(&self) -> &[FlavorPart] {
        &self.markers
    }

    fn apply(&self, manifest: &HostManifest) -> RuleResult {
        let comparison = comparator::compare_measurement_replay(
            &self.label,
            manifest.software_measurement(&self.label),
        );
        RuleResult::from_comparisons(self, [comparison])
    }
}

///////////////////////////////////////////////////////////////////////////////
/// Built-in builders
///////////////////////////////////////////////////////////////////////////////

fn markers_of(flavor: &Flavor) -> Vec<FlavorPart> {
    vec![flavor.part()]
}

pub struct HostInfoRuleBuilder;

impl RuleBuilder for HostInfoRuleBuilder {
    fn build(&self, flavor: &Flavor) -> Vec<Box<dyn Rule>> {
        let attributes = flavor.meta.description.expected_attributes();
        if attributes.is_empty() {
            return Vec::new();
        }
        vec![Box::new(HostInfoMatches {
            attributes,
            markers: markers_of(flavor),
        })]
    }
}

pub struct PcrConstantRuleBuilder;

impl RuleBuilder for PcrConstantRuleBuilder {
    fn build(&self, flavor: &Flavor) -> Vec<Box<dyn Rule>> {
        flavor
            .pcrs
            .iter()
            .map(|pcr| {
                Box::new(PcrMatchesConstant {
                    index: pcr.index,
                    bank: pcr.bank,
                    value: pcr.value.clone(),
                    markers: markers_of(flavor),
                }) as Box<dyn Rule>
            })
            .collect()
    }
}

pub struct PcrEventLogRuleBuilder;

impl RuleBuilder for PcrEventLogRuleBuilder {
    fn build(&self, flavor: &Flavor) -> Vec<Box<dyn Rule>> {
        flavor
            .pcrs
            .iter()
            .filter_map(|pcr| {
                let rule: Box<dyn Rule> = match pcr.event_log.as_ref()? {
                    EventLogExpectation::Includes { entries } => Box::new(PcrEventLogIncludes {
                        index: pcr.index,
                        bank: pcr.bank,
                        entries: entries.clone(),
                        markers: markers_of(flavor),
                    }),
                    EventLogExpectation::Equals {
                        entries,
                        excluding_labels,
                    } => Box::new(PcrEventLogEqualsExcluding {
                        index: pcr.index,
                        bank: pcr.bank,
                        entries: entries.clone(),
                        excluding_labels: excluding_labels.clone(),
                        markers: markers_of(flavor),
                    }),
                };
                Some(rule)
            })
            .collect()
    }
}

pub struct PcrEventLogIntegrityRuleBuilder;

impl RuleBuilder for PcrEventLogIntegrityRuleBuilder {
    fn build(&self, flavor: &Flavor) -> Vec<Box<dyn Rule>> {
        flavor
            .pcrs
            .iter()
            .filter(|pcr| pcr.verify_event_log_integrity)
            .map(|pcr| {
                Box::new(PcrEventLogIntegrity {
                    index: pcr.index,
                    bank: pcr.bank,
                    markers: markers_of(flavor),
                }) as Box<dyn Rule>
            })
            .collect()
    }
}

pub struct HardwareFeatureRuleBuilder;

impl RuleBuilder for HardwareFeatureRuleBuilder {
    fn build(&self, flavor: &Flavor) -> Vec<Box<dyn Rule>> {
        let Some(hardware) = flavor.hardware.as_ref() else {
            return Vec::new();
        };
        let mut expectations: Vec<(String, String)> = Vec::new();
        if let Some(enabled) = hardware.tpm_enabled {
            expectations.push(("TPM".to_string(), enabled.to_string()));
        }
        if let Some(enabled) = hardware.txt_enabled {
            expectations.push(("TXT".to_string(), enabled.to_string()));
        }
        expectations.extend(
            hardware
                .features
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        expectations
            .into_iter()
            .map(|(feature, expected)| {
                Box::new(HardwareFeatureMatches {
                    feature,
                    expected,
                    markers: markers_of(flavor),
                }) as Box<dyn Rule>
            })
            .collect()
    }
}

pub struct AssetTagRuleBuilder;

impl RuleBuilder for AssetTagRuleBuilder {
    fn build(&self, flavor: &Flavor) -> Vec<Box<dyn Rule>> {
        match flavor.asset_tag_digest.as_ref() {
            Some(digest) => vec![Box::new(AssetTagMatches {
                digest: digest.clone(),
                markers: markers_of(flavor),
            })],
            None => Vec::new(),
        }
    }
}

pub struct SoftwareRuleBuilder;

impl RuleBuilder for SoftwareRuleBuilder {
    fn build(&self, flavor: &Flavor) -> Vec<Box<dyn Rule>> {
        let Some(software) = flavor.software.as_ref() else {
            return Vec::new();
        };
        let label = flavor.label().to_string();
        let mut rules: Vec<Box<dyn Rule>> = vec![Box::new(XmlMeasurementsDigestEquals {
            label: label.clone(),
            cumulative_hash: software.cumulative_hash.clone(),
            markers: markers_of(flavor),
        })];
        if !software.measurements.is_empty() {
            rules.push(Box::new(XmlMeasurementLogEquals {
                label: label.clone(),
                measurements: software.measurements.clone(),
                markers: markers_of(flavor),
            }));
        }
        if software.verify_integrity {
            rules.push(Box::new(XmlMeasurementLogIntegrity {
                label,
                markers: markers_of(flavor),
            }));
        }
        rules
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::flavor::{FlavorPcr, HardwareExpectation, SoftwareExpectation};

    fn os_flavor() -> Flavor {
        let mut flavor = Flavor::new("rhel-7.4", FlavorPart::Os, Utc::now());
        flavor.meta.description.os_name = Some("RedHatEnterpriseServer".to_string());
        flavor.pcrs.push(FlavorPcr {
            index: 17,
            bank: PcrBank::Sha256,
            value: "ab".repeat(32),
            event_log: Some(EventLogExpectation::Includes {
                entries: vec![EventLogEntry::new("vmlinuz", &"11".repeat(32))],
            }),
            verify_event_log_integrity: true,
        });
        flavor
    }

    #[test]
    fn test_default_registry_rule_order() {
        let registry = RuleRegistry::default();
        let names: Vec<_> = registry
            .rules_for(&os_flavor())
            .iter()
            .map(|rule| rule.name())
            .collect();
        assert_eq!(
            names,
            vec![
                "HostInfoMatches",
                "PcrMatchesConstant",
                "PcrEventLogIncludes",
                "PcrEventLogIntegrity"
            ]
        );
    }

    #[test]
    fn test_hardware_and_software_rules() {
        let mut flavor = Flavor::new("app", FlavorPart::Software, Utc::now());
        flavor.hardware = Some(HardwareExpectation {
            tpm_enabled: Some(true),
            txt_enabled: None,
            features: [("SUEFI".to_string(), "true".to_string())].into(),
        });
        flavor.software = Some(SoftwareExpectation {
            cumulative_hash: "00".repeat(48),
            measurements: Vec::new(),
            verify_integrity: true,
        });
        let names: Vec<_> = RuleRegistry::default()
            .rules_for(&flavor)
            .iter()
            .map(|rule| rule.name())
            .collect();
        assert_eq!(
            names,
            vec![
                "HardwareFeatureMatches",
                "HardwareFeatureMatches",
                "XmlMeasurementsDigestEquals",
                "XmlMeasurementLogIntegrity"
            ]
        );
    }

    struct AlwaysUntrusted;

    impl Rule for AlwaysUntrusted {
        fn name(&self) -> &'static str {
            "AlwaysUntrusted"
        }

        fn markers(&self) -> &[FlavorPart] {
            &[FlavorPart::Os]
        }

        fn apply(&self, _manifest: &HostManifest) -> RuleResult {
            RuleResult::from_comparisons(
                self,
                [Comparison::Mismatch(Fault::new(
                    crate::verifier::fault::FaultKind::HostInfoMismatch,
                    "never trusted",
                ))],
            )
        }
    }

    struct AlwaysUntrustedBuilder;

    impl RuleBuilder for AlwaysUntrustedBuilder {
        fn build(&self, _flavor: &Flavor) -> Vec<Box<dyn Rule>> {
            vec![Box::new(AlwaysUntrusted)]
        }
    }

    #[test]
    fn test_registered_builder_runs_last() {
        let mut registry = RuleRegistry::empty();
        registry.register(Box::new(AlwaysUntrustedBuilder));
        let rules = registry.rules_for(&os_flavor());
        assert_eq!(rules.len(), 1);
        let result = rules[0].apply(&HostManifest::default());
        assert!(!result.trusted);
        assert_eq!(result.markers, vec![FlavorPart::Os]);
    }
}
