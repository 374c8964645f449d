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

use sqlx::{Postgres, QueryBuilder};

use crate::model::flavor::{Flavor, FlavorPart};
use crate::model::keys::FlavorgroupId;

///////////////////////////////////////////////////////////////////////////////
/// FlavorQuery is the typed filter used to look up candidate flavors. Every
/// populated field narrows the result; an empty query matches every flavor.
/// The same filter is applied in memory (`matches`) and rendered into SQL
/// with bound parameters (`push_sql`).
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlavorQuery {
    pub flavorgroup_id: Option<FlavorgroupId>,
    pub hardware_uuid: Option<uuid::Uuid>,
    pub parts: Vec<FlavorPart>,
    pub labels: Vec<String>,
}

impl FlavorQuery {
    /// Flavors of `parts` linked into a flavorgroup.
    pub fn for_flavorgroup(flavorgroup_id: FlavorgroupId, parts: &[FlavorPart]) -> Self {
        Self {
            flavorgroup_id: Some(flavorgroup_id),
            parts: parts.to_vec(),
            ..Default::default()
        }
    }

    /// Host-unique flavors captured from the host with `hardware_uuid`.
    pub fn for_hardware_uuid(hardware_uuid: uuid::Uuid, parts: &[FlavorPart]) -> Self {
        Self {
            hardware_uuid: Some(hardware_uuid),
            parts: parts.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// matches applies the filter to a flavor whose flavorgroup links are
    /// `linked_groups`.
    pub fn matches(&self, flavor: &Flavor, linked_groups: &[FlavorgroupId]) -> bool {
        if let Some(id) = self.flavorgroup_id {
            if !linked_groups.contains(&id) {
                return false;
            }
        }
        if let Some(hardware_uuid) = self.hardware_uuid {
            if flavor.hardware_uuid() != Some(hardware_uuid) {
                return false;
            }
        }
        if !self.parts.is_empty() && !self.parts.contains(&flavor.part()) {
            return false;
        }
        if !self.labels.is_empty() && !self.labels.iter().any(|l| l == flavor.label()) {
            return false;
        }
        true
    }

    /// push_sql appends the SELECT for this filter to `builder`. Results
    /// are ordered by creation time so callers see a stable order.
    pub fn push_sql(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push("SELECT f.content FROM flavors f");
        if self.flavorgroup_id.is_some() {
            builder.push(" JOIN flavorgroup_flavors fgf ON fgf.flavor_id = f.id");
        }
        builder.push(" WHERE TRUE");
        if let Some(id) = self.flavorgroup_id {
            builder.push(" AND fgf.flavorgroup_id = ");
            builder.push_bind(uuid::Uuid::from(id));
        }
        if let Some(hardware_uuid) = self.hardware_uuid {
            builder.push(" AND f.hardware_uuid = ");
            builder.push_bind(hardware_uuid);
        }
        if !self.parts.is_empty() {
            let parts: Vec<String> = self.parts.iter().map(|p| p.as_str().to_string()).collect();
            builder.push(" AND f.flavor_part = ANY(");
            builder.push_bind(parts);
            builder.push(")");
        }
        if !self.labels.is_empty() {
            builder.push(" AND f.label = ANY(");
            builder.push_bind(self.labels.clone());
            builder.push(")");
        }
        builder.push(" ORDER BY f.created, f.id");
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn test_push_sql_binds_every_filter() {
        let query = FlavorQuery::for_flavorgroup(FlavorgroupId::new(), &[FlavorPart::Software])
            .with_labels(vec!["app".to_string()]);
        let mut builder = QueryBuilder::new("");
        query.push_sql(&mut builder);
        assert_eq!(
            builder.sql(),
            "SELECT f.content FROM flavors f JOIN flavorgroup_flavors fgf ON fgf.flavor_id = f.id \
             WHERE TRUE AND fgf.flavorgroup_id = $1 AND f.flavor_part = ANY($2) \
             AND f.label = ANY($3) ORDER BY f.created, f.id"
        );
    }

    #[test]
    fn test_push_sql_hardware_uuid() {
        let query = FlavorQuery::for_hardware_uuid(uuid::Uuid::new_v4(), &[]);
        let mut builder = QueryBuilder::new("");
        query.push_sql(&mut builder);
        assert_eq!(
            builder.sql(),
            "SELECT f.content FROM flavors f WHERE TRUE AND f.hardware_uuid = $1 ORDER BY f.created, f.id"
        );
    }

    #[test]
    fn test_matches() {
        let group = FlavorgroupId::new();
        let hardware_uuid = uuid::Uuid::new_v4();
        let mut host_unique = Flavor::new("hu", FlavorPart::HostUnique, Utc::now());
        host_unique.meta.description.hardware_uuid = Some(hardware_uuid);
        let os = Flavor::new("os", FlavorPart::Os, Utc::now());

        let by_group = FlavorQuery::for_flavorgroup(group, &[FlavorPart::Os]);
        assert!(by_group.matches(&os, &[group]));
        assert!(!by_group.matches(&os, &[]));
        assert!(!by_group.matches(&host_unique, &[group]));

        let by_uuid = FlavorQuery::for_hardware_uuid(hardware_uuid, &[FlavorPart::HostUnique]);
        assert!(by_uuid.matches(&host_unique, &[]));
        assert!(!by_uuid.matches(&os, &[]));
    }
}
