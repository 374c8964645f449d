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

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::flavor::{Flavor, FlavorPart};
use crate::model::flavorgroup::{FlavorMatchPolicyCollection, MatchPolicy};
use crate::model::host_manifest::HostManifest;
use crate::verifier::fault::Fault;
use crate::verifier::flavor_matcher::FlavorTrustStatus;
use crate::verifier::policy::{resolve_part, PartVerdict};
use crate::verifier::rules::{RuleRegistry, RuleResult};

/// PartTrust is the verdict for one flavor part inside a TrustReport.
/// When several flavorgroups evaluated the same part, it holds the
/// combined verdict and every group's match policy and flavors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartTrust {
    pub trusted: bool,
    pub counted: bool,
    pub match_policies: Vec<MatchPolicy>,
    pub flavors: Vec<FlavorTrustStatus>,
    #[serde(default)]
    pub faults: Vec<Fault>,
}

impl PartTrust {
    pub fn rules(&self) -> impl Iterator<Item = &RuleResult> {
        self.flavors
            .iter()
            .flat_map(|status| status.rule_results.iter())
    }

    fn merge(self, other: PartTrust) -> PartTrust {
        let trusted_a = !self.counted || self.trusted;
        let trusted_b = !other.counted || other.trusted;
        let mut match_policies = self.match_policies;
        for policy in other.match_policies {
            if !match_policies.contains(&policy) {
                match_policies.push(policy);
            }
        }
        let mut flavors = self.flavors;
        flavors.extend(other.flavors);
        let mut faults = self.faults;
        faults.extend(other.faults);
        PartTrust {
            trusted: trusted_a && trusted_b,
            counted: self.counted || other.counted,
            match_policies,
            flavors,
            faults,
        }
    }
}

impl From<PartVerdict> for PartTrust {
    fn from(verdict: PartVerdict) -> Self {
        PartTrust {
            trusted: verdict.trusted,
            counted: verdict.counted,
            match_policies: vec![verdict.match_policy],
            flavors: verdict.flavors,
            faults: verdict.faults,
        }
    }
}

///////////////////////////////////////////////////////////////////////////////
/// TrustReport is the structured verdict for one host. Parts are kept in a
/// BTreeMap and carry no timestamps, so the same inputs always serialize to
/// the same bytes.
///
/// overall is the AND of `trusted` over the counted parts. A report where
/// no part is counted is not trusted: a host must match at least one
/// flavor to be trusted.
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustReport {
    pub parts: BTreeMap<FlavorPart, PartTrust>,
    pub overall: bool,
}

impl TrustReport {
    pub fn from_parts(parts: BTreeMap<FlavorPart, PartTrust>) -> Self {
        let overall = compute_overall(&parts);
        Self { parts, overall }
    }

    pub fn is_trusted_for(&self, part: FlavorPart) -> Option<bool> {
        self.parts.get(&part).map(|trust| trust.trusted)
    }

    pub fn faults(&self) -> impl Iterator<Item = &Fault> {
        self.parts.values().flat_map(|part| {
            part.faults
                .iter()
                .chain(part.rules().flat_map(|rule| rule.faults.iter()))
        })
    }

    /// merge folds the report of another flavorgroup of the same host
    /// into this one. A shared part is trusted only if it is trusted in
    /// every group where it counted.
    pub fn merge(self, other: TrustReport) -> TrustReport {
        let mut parts = self.parts;
        for (part, trust) in other.parts {
            let merged = match parts.remove(&part) {
                Some(existing) => existing.merge(trust),
                None => trust,
            };
            parts.insert(part, merged);
        }
        TrustReport::from_parts(parts)
    }
}

fn compute_overall(parts: &BTreeMap<FlavorPart, PartTrust>) -> bool {
    let mut counted = parts.values().filter(|part| part.counted).peekable();
    counted.peek().is_some() && counted.all(|part| part.trusted)
}

/// evaluate builds the TrustReport of `manifest` against one flavorgroup's
/// policy. Parts absent from the policy are not evaluated.
pub fn evaluate(
    manifest: &HostManifest,
    policy: &FlavorMatchPolicyCollection,
    flavors: &[Flavor],
    registry: &RuleRegistry,
) -> TrustReport {
    let parts = policy
        .flavor_match_policies
        .iter()
        .map(|entry| {
            let verdict = resolve_part(
                entry.flavor_part,
                entry.match_policy,
                flavors,
                manifest,
                registry,
            );
            (entry.flavor_part, PartTrust::from(verdict))
        })
        .collect();
    TrustReport::from_parts(parts)
}
