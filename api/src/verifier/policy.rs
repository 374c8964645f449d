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
 *  Resolution of one flavor part under one match policy: which candidate
 *  flavors apply to this host, which of them are evaluated, and how their
 *  statuses combine into the part's verdict.
*/

use serde::{Deserialize, Serialize};

use crate::model::flavor::{Flavor, FlavorPart};
use crate::model::flavorgroup::{MatchPolicy, MatchType, RequiredType};
use crate::model::host_manifest::HostManifest;
use crate::verifier::fault::Fault;
use crate::verifier::flavor_matcher::{evaluate_flavor, FlavorTrustStatus};
use crate::verifier::rules::RuleRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartVerdict {
    pub part: FlavorPart,
    pub match_policy: MatchPolicy,
    pub trusted: bool,
    /// counted is false when the part was vacuously trusted
    /// (REQUIRED_IF_DEFINED with no candidates) and must not take part in
    /// the overall verdict.
    pub counted: bool,
    pub flavors: Vec<FlavorTrustStatus>,
    pub faults: Vec<Fault>,
}

///////////////////////////////////////////////////////////////////////////////
/// select_candidates keeps the flavors of `part` that apply to this host.
///
/// HOST_UNIQUE and ASSET_TAG flavors apply only to the host whose hardware
/// UUID they were captured from. SOFTWARE flavors apply only when the host
/// reported a measurement document of the same label. Flavors that do not
/// apply are dropped, not faulted.
///////////////////////////////////////////////////////////////////////////////

pub fn select_candidates<'a>(
    part: FlavorPart,
    flavors: &'a [Flavor],
    manifest: &HostManifest,
) -> Vec<&'a Flavor> {
    let hardware_uuid = manifest.hardware_uuid();
    let labels = manifest.measurement_labels();
    flavors
        .iter()
        .filter(|flavor| flavor.part() == part)
        .filter(|flavor| match part {
            FlavorPart::HostUnique | FlavorPart::AssetTag => {
                hardware_uuid.is_some() && flavor.hardware_uuid() == hardware_uuid
            }
            FlavorPart::Software => labels.contains(flavor.label()),
            FlavorPart::Platform | FlavorPart::Os => true,
        })
        .collect()
}

/// latest picks the newest flavor by creation time. Equal timestamps are
/// broken by the greater flavor id so the choice is deterministic.
fn latest<'a>(candidates: &[&'a Flavor]) -> Option<&'a Flavor> {
    candidates
        .iter()
        .copied()
        .max_by(|a, b| {
            a.meta
                .created
                .cmp(&b.meta.created)
                .then_with(|| a.id().cmp(&b.id()))
        })
}

pub fn resolve_part(
    part: FlavorPart,
    match_policy: MatchPolicy,
    flavors: &[Flavor],
    manifest: &HostManifest,
    registry: &RuleRegistry,
) -> PartVerdict {
    let candidates = select_candidates(part, flavors, manifest);

    if candidates.is_empty() {
        return match match_policy.required {
            RequiredType::Required => PartVerdict {
                part,
                match_policy,
                trusted: false,
                counted: true,
                flavors: Vec::new(),
                faults: vec![Fault::flavor_not_defined()],
            },
            RequiredType::RequiredIfDefined => PartVerdict {
                part,
                match_policy,
                trusted: true,
                counted: false,
                flavors: Vec::new(),
                faults: Vec::new(),
            },
        };
    }

    let evaluated: Vec<&Flavor> = match match_policy.match_type {
        MatchType::AnyOf | MatchType::AllOf => candidates,
        MatchType::Latest => latest(&candidates).into_iter().collect(),
    };
    let statuses: Vec<FlavorTrustStatus> = evaluated
        .into_iter()
        .map(|flavor| evaluate_flavor(flavor, manifest, registry))
        .collect();

    let trusted = match match_policy.match_type {
        MatchType::AnyOf => statuses.iter().any(|status| status.trusted),
        MatchType::AllOf | MatchType::Latest => statuses.iter().all(|status| status.trusted),
    };

    PartVerdict {
        part,
        match_policy,
        trusted,
        counted: true,
        flavors: statuses,
        faults: Vec::new(),
    }
}
