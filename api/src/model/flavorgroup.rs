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

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::flavor::FlavorPart;
use crate::model::keys::FlavorgroupId;
use crate::{HvsError, HvsResult};

pub const AUTOMATIC_FLAVORGROUP: &str = "automatic";
pub const HOST_UNIQUE_FLAVORGROUP: &str = "host_unique";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    AnyOf,
    AllOf,
    Latest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequiredType {
    Required,
    RequiredIfDefined,
}

/// MatchPolicy governs how the candidate flavors of one flavor part
/// combine into that part's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchPolicy {
    pub match_type: MatchType,
    pub required: RequiredType,
}

impl MatchPolicy {
    pub const fn new(match_type: MatchType, required: RequiredType) -> Self {
        Self {
            match_type,
            required,
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.match_type, self.required)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorMatchPolicy {
    pub flavor_part: FlavorPart,
    pub match_policy: MatchPolicy,
}

///////////////////////////////////////////////////////////////////////////////
/// FlavorMatchPolicyCollection holds at most one MatchPolicy per flavor part.
/// Parts that are absent from the collection are not evaluated at all for
/// the owning flavorgroup.
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorMatchPolicyCollection {
    pub flavor_match_policies: Vec<FlavorMatchPolicy>,
}

impl FlavorMatchPolicyCollection {
    /// The policy of the reserved "automatic" flavorgroup.
    pub fn automatic() -> Self {
        Self {
            flavor_match_policies: vec![
                FlavorMatchPolicy {
                    flavor_part: FlavorPart::Platform,
                    match_policy: MatchPolicy::new(MatchType::AnyOf, RequiredType::Required),
                },
                FlavorMatchPolicy {
                    flavor_part: FlavorPart::Os,
                    match_policy: MatchPolicy::new(MatchType::AnyOf, RequiredType::Required),
                },
                FlavorMatchPolicy {
                    flavor_part: FlavorPart::AssetTag,
                    match_policy: MatchPolicy::new(
                        MatchType::Latest,
                        RequiredType::RequiredIfDefined,
                    ),
                },
                FlavorMatchPolicy {
                    flavor_part: FlavorPart::HostUnique,
                    match_policy: MatchPolicy::new(
                        MatchType::Latest,
                        RequiredType::RequiredIfDefined,
                    ),
                },
            ],
        }
    }

    pub fn get(&self, part: FlavorPart) -> Option<MatchPolicy> {
        self.flavor_match_policies
            .iter()
            .find(|policy| policy.flavor_part == part)
            .map(|policy| policy.match_policy)
    }

    pub fn parts(&self) -> Vec<FlavorPart> {
        self.flavor_match_policies
            .iter()
            .map(|policy| policy.flavor_part)
            .collect()
    }

    pub fn with(mut self, part: FlavorPart, policy: MatchPolicy) -> Self {
        self.flavor_match_policies
            .retain(|existing| existing.flavor_part != part);
        self.flavor_match_policies.push(FlavorMatchPolicy {
            flavor_part: part,
            match_policy: policy,
        });
        self
    }

    pub fn validate(&self) -> HvsResult<()> {
        let mut seen = HashSet::new();
        for policy in self.flavor_match_policies.iter() {
            if !seen.insert(policy.flavor_part) {
                return Err(HvsError::InvalidArgument(format!(
                    "flavor part {} has more than one match policy",
                    policy.flavor_part
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavorgroup {
    pub id: FlavorgroupId,
    pub name: String,
    /// None for the reserved host_unique group, whose flavors are reached
    /// through the HOST_UNIQUE / ASSET_TAG policies of other groups.
    pub match_policy: Option<FlavorMatchPolicyCollection>,
}

impl Flavorgroup {
    pub fn new(name: &str, match_policy: FlavorMatchPolicyCollection) -> Self {
        Self {
            id: FlavorgroupId::new(),
            name: name.to_string(),
            match_policy: Some(match_policy),
        }
    }

    pub fn automatic() -> Self {
        Self::new(AUTOMATIC_FLAVORGROUP, FlavorMatchPolicyCollection::automatic())
    }

    pub fn host_unique() -> Self {
        Self {
            id: FlavorgroupId::new(),
            name: HOST_UNIQUE_FLAVORGROUP.to_string(),
            match_policy: None,
        }
    }

    /// reserved returns fresh instances of the flavorgroups every store
    /// carries from the start.
    pub fn reserved() -> [Flavorgroup; 2] {
        [Self::automatic(), Self::host_unique()]
    }

    pub fn is_reserved(&self) -> bool {
        self.name == AUTOMATIC_FLAVORGROUP || self.name == HOST_UNIQUE_FLAVORGROUP
    }

    /// validate checks a flavorgroup that is about to be created. Reserved
    /// names are taken and every other group needs a match policy.
    pub fn validate(&self) -> HvsResult<()> {
        if self.is_reserved() {
            return Err(HvsError::InvalidArgument(format!(
                "flavorgroup name {} is reserved",
                self.name
            )));
        }
        match self.match_policy.as_ref() {
            Some(policy) => policy.validate(),
            None => Err(HvsError::InvalidArgument(format!(
                "flavorgroup {} has no match policy",
                self.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automatic_policy() {
        let policy = FlavorMatchPolicyCollection::automatic();
        assert_eq!(
            policy.get(FlavorPart::Platform),
            Some(MatchPolicy::new(MatchType::AnyOf, RequiredType::Required))
        );
        assert_eq!(
            policy.get(FlavorPart::HostUnique),
            Some(MatchPolicy::new(
                MatchType::Latest,
                RequiredType::RequiredIfDefined
            ))
        );
        assert_eq!(policy.get(FlavorPart::Software), None);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_with_replaces_existing_part() {
        let policy = FlavorMatchPolicyCollection::automatic().with(
            FlavorPart::Os,
            MatchPolicy::new(MatchType::AllOf, RequiredType::Required),
        );
        assert_eq!(policy.flavor_match_policies.len(), 4);
        assert_eq!(
            policy.get(FlavorPart::Os).unwrap().match_type,
            MatchType::AllOf
        );
    }

    #[test]
    fn test_duplicate_part_is_rejected() {
        let mut policy = FlavorMatchPolicyCollection::automatic();
        policy
            .flavor_match_policies
            .push(policy.flavor_match_policies[0].clone());
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_policy_wire_names() {
        let json = serde_json::to_string(&MatchPolicy::new(
            MatchType::AnyOf,
            RequiredType::RequiredIfDefined,
        ))
        .unwrap();
        assert_eq!(
            json,
            r#"{"match_type":"ANY_OF","required":"REQUIRED_IF_DEFINED"}"#
        );
        assert!(Flavorgroup::host_unique().match_policy.is_none());
        assert!(Flavorgroup::automatic().is_reserved());
    }

    #[test]
    fn test_reserved_names_are_rejected() {
        for reserved in Flavorgroup::reserved() {
            assert!(matches!(
                reserved.validate(),
                Err(HvsError::InvalidArgument(_))
            ));
            let lookalike = Flavorgroup::new(
                &reserved.name,
                FlavorMatchPolicyCollection::automatic(),
            );
            assert!(lookalike.validate().is_err());
        }
        let custom = Flavorgroup::new("rhel-7.4", FlavorMatchPolicyCollection::automatic());
        assert!(custom.validate().is_ok());
    }
}
