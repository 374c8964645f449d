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

use serde::{Deserialize, Serialize};

use crate::model::flavor::{Flavor, FlavorPart};
use crate::model::host_manifest::HostManifest;
use crate::model::keys::FlavorId;
use crate::verifier::fault::Fault;
use crate::verifier::rules::{RuleRegistry, RuleResult};

const NO_RULES: &str = "FlavorDefinesRules";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorTrustStatus {
    pub flavor_id: FlavorId,
    pub label: String,
    pub flavor_part: FlavorPart,
    pub trusted: bool,
    pub rule_results: Vec<RuleResult>,
}

impl FlavorTrustStatus {
    pub fn faults(&self) -> impl Iterator<Item = &Fault> {
        self.rule_results.iter().flat_map(|result| result.faults.iter())
    }
}

/// evaluate_flavor applies every rule the registry derives from `flavor`.
/// Rules never short-circuit, so the status lists all faults. The flavor is
/// trusted iff it expands into at least one rule and each of its rules is.
pub fn evaluate_flavor(
    flavor: &Flavor,
    manifest: &HostManifest,
    registry: &RuleRegistry,
) -> FlavorTrustStatus {
    let rules = registry.rules_for(flavor);
    let rule_results: Vec<RuleResult> = if rules.is_empty() {
        tracing::warn!(
            flavor_id = %flavor.id(),
            label = flavor.label(),
            "Flavor expands into no rules"
        );
        vec![RuleResult {
            rule_name: NO_RULES.to_string(),
            markers: vec![flavor.part()],
            trusted: false,
            faults: vec![Fault::flavor_defines_no_rules(flavor.label())],
        }]
    } else {
        rules.iter().map(|rule| rule.apply(manifest)).collect()
    };
    let trusted = rule_results.iter().all(|result| result.trusted);

    tracing::debug!(
        flavor_id = %flavor.id(),
        label = flavor.label(),
        part = %flavor.part(),
        rules = rule_results.len(),
        trusted,
        "Evaluated flavor"
    );

    FlavorTrustStatus {
        flavor_id: flavor.id(),
        label: flavor.label().to_string(),
        flavor_part: flavor.part(),
        trusted,
        rule_results,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::flavor::FlavorPcr;
    use crate::model::host_manifest::{HostInfo, Pcr, PcrBank};
    use crate::verifier::fault::FaultKind;

    fn manifest() -> HostManifest {
        HostManifest {
            host_info: HostInfo {
                os_name: "RedHatEnterpriseServer".to_string(),
                ..Default::default()
            },
            pcrs: vec![Pcr {
                index: 0,
                bank: PcrBank::Sha256,
                value: "aa".repeat(32),
            }],
            ..Default::default()
        }
    }

    fn flavor(pcrs: &[(u8, &str)]) -> Flavor {
        let mut flavor = Flavor::new("platform", FlavorPart::Platform, Utc::now());
        for (index, value) in pcrs {
            flavor.pcrs.push(FlavorPcr {
                index: *index,
                bank: PcrBank::Sha256,
                value: value.repeat(32),
                event_log: None,
                verify_event_log_integrity: false,
            });
        }
        flavor
    }

    #[test]
    fn test_trusted_iff_all_rules_trusted() {
        let registry = RuleRegistry::default();
        let status = evaluate_flavor(&flavor(&[(0, "aa")]), &manifest(), &registry);
        assert!(status.trusted);

        // One failing rule out of three, in every position.
        for pcrs in [
            [(0, "aa"), (0, "aa"), (0, "bb")],
            [(0, "aa"), (0, "bb"), (0, "aa")],
            [(0, "bb"), (0, "aa"), (0, "aa")],
        ] {
            let status = evaluate_flavor(&flavor(&pcrs), &manifest(), &registry);
            assert!(!status.trusted);
            assert_eq!(status.rule_results.len(), 3);
            assert_eq!(status.faults().count(), 1);
        }
    }

    #[test]
    fn test_flavor_without_rules_is_untrusted() {
        let empty = Flavor::new("empty", FlavorPart::Os, Utc::now());
        let status = evaluate_flavor(&empty, &manifest(), &RuleRegistry::default());
        assert!(!status.trusted);
        assert_eq!(status.rule_results.len(), 1);
        let faults: Vec<_> = status.faults().map(|fault| fault.kind).collect();
        assert_eq!(faults, vec![FaultKind::FlavorDefinesNoRules]);
    }

    #[test]
    fn test_no_short_circuit() {
        let status = evaluate_flavor(
            &flavor(&[(0, "bb"), (1, "aa")]),
            &manifest(),
            &RuleRegistry::default(),
        );
        assert!(!status.trusted);
        assert_eq!(status.faults().count(), 2);
    }
}
