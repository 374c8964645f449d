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

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{FlavorQuery, FlavorStore, FlavorVerifyQueue, HostStore, ReportStore};
use crate::model::flavor::Flavor;
use crate::model::flavorgroup::{FlavorMatchPolicyCollection, Flavorgroup};
use crate::model::host::{Host, HostCredential, HostStatus};
use crate::model::keys::{FlavorgroupId, HostId, QueueEntryId, ReportId};
use crate::model::queue::{enqueue_required, QueueEntry, QueueState};
use crate::model::report::Report;
use crate::{HvsError, HvsResult};

#[derive(Default)]
struct State {
    flavorgroups: HashMap<FlavorgroupId, Flavorgroup>,
    // Insertion order is kept so lookups are stable.
    flavors: Vec<(Flavor, Vec<FlavorgroupId>)>,
    hosts: HashMap<HostId, Host>,
    credentials: HashMap<HostId, HostCredential>,
    statuses: Vec<HostStatus>,
    reports: Vec<Report>,
    queue: Vec<QueueEntry>,
}

impl State {
    fn enqueue(&mut self, host_id: HostId, force_update: bool) -> Option<QueueEntryId> {
        if !enqueue_required(&self.queue, host_id, force_update) {
            return None;
        }
        let entry = QueueEntry::flavor_verify(host_id, force_update);
        let id = entry.id;
        self.queue.push(entry);
        Some(id)
    }

    fn latest_report(&self, host_id: HostId) -> Option<&Report> {
        self.reports
            .iter()
            .filter(|report| report.host_id == host_id)
            .max_by_key(|report| report.created)
    }
}

impl State {
    fn insert_flavorgroup(&mut self, flavorgroup: &Flavorgroup) -> HvsResult<()> {
        if self
            .flavorgroups
            .values()
            .any(|existing| existing.name == flavorgroup.name)
        {
            return Err(HvsError::InvalidArgument(format!(
                "flavorgroup {} already exists",
                flavorgroup.name
            )));
        }
        self.flavorgroups.insert(flavorgroup.id, flavorgroup.clone());
        Ok(())
    }

    fn ensure_reserved_flavorgroups(&mut self) {
        for reserved in Flavorgroup::reserved() {
            if !self
                .flavorgroups
                .values()
                .any(|existing| existing.name == reserved.name)
            {
                self.flavorgroups.insert(reserved.id, reserved);
            }
        }
    }
}

/// MemoryStore keeps every repository in process memory behind one lock.
/// It backs the unit and scenario tests.
pub struct MemoryStore {
    state: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let mut state = State::default();
        state.ensure_reserved_flavorgroups();
        Self {
            state: Mutex::new(state),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reports(&self) -> Vec<Report> {
        self.state.lock().await.reports.clone()
    }

    pub async fn statuses(&self) -> Vec<HostStatus> {
        self.state.lock().await.statuses.clone()
    }

    pub async fn queue(&self) -> Vec<QueueEntry> {
        self.state.lock().await.queue.clone()
    }
}

#[async_trait]
impl FlavorStore for MemoryStore {
    async fn create_flavorgroup(&self, flavorgroup: &Flavorgroup) -> HvsResult<()> {
        flavorgroup.validate()?;
        self.state.lock().await.insert_flavorgroup(flavorgroup)
    }

    async fn ensure_reserved_flavorgroups(&self) -> HvsResult<()> {
        self.state.lock().await.ensure_reserved_flavorgroups();
        Ok(())
    }

    async fn create_flavor(
        &self,
        flavor: &Flavor,
        flavorgroup_id: Option<FlavorgroupId>,
    ) -> HvsResult<()> {
        flavor.validate()?;
        let mut state = self.state.lock().await;
        if let Some(id) = flavorgroup_id {
            if !state.flavorgroups.contains_key(&id) {
                return Err(HvsError::not_found("Flavorgroup", id));
            }
        }
        match state.flavors.iter_mut().find(|(f, _)| f.id() == flavor.id()) {
            // Linking an existing flavor into another group.
            Some((_, groups)) => groups.extend(flavorgroup_id),
            None => state
                .flavors
                .push((flavor.clone(), flavorgroup_id.into_iter().collect())),
        }
        Ok(())
    }

    async fn find_flavors(&self, query: &FlavorQuery) -> HvsResult<Vec<Flavor>> {
        let state = self.state.lock().await;
        Ok(state
            .flavors
            .iter()
            .filter(|(flavor, groups)| query.matches(flavor, groups))
            .map(|(flavor, _)| flavor.clone())
            .collect())
    }

    async fn find_flavorgroup(&self, id: FlavorgroupId) -> HvsResult<Option<Flavorgroup>> {
        Ok(self.state.lock().await.flavorgroups.get(&id).cloned())
    }

    async fn find_flavorgroup_by_name(&self, name: &str) -> HvsResult<Option<Flavorgroup>> {
        Ok(self
            .state
            .lock()
            .await
            .flavorgroups
            .values()
            .find(|group| group.name == name)
            .cloned())
    }

    async fn find_match_policy(
        &self,
        id: FlavorgroupId,
    ) -> HvsResult<Option<FlavorMatchPolicyCollection>> {
        Ok(self
            .state
            .lock()
            .await
            .flavorgroups
            .get(&id)
            .and_then(|group| group.match_policy.clone()))
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn persist(&self, report: &Report) -> HvsResult<()> {
        self.state.lock().await.reports.push(report.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ReportId) -> HvsResult<Option<Report>> {
        Ok(self
            .state
            .lock()
            .await
            .reports
            .iter()
            .find(|report| report.id == id)
            .cloned())
    }

    async fn find_latest_for_host(&self, host_id: HostId) -> HvsResult<Option<Report>> {
        Ok(self.state.lock().await.latest_report(host_id).cloned())
    }

    async fn find_expiring_before(&self, threshold: DateTime<Utc>) -> HvsResult<Vec<Report>> {
        let state = self.state.lock().await;
        let mut latest: HashMap<HostId, &Report> = HashMap::new();
        for report in state.reports.iter() {
            latest
                .entry(report.host_id)
                .and_modify(|current| {
                    if report.created > current.created {
                        *current = report;
                    }
                })
                .or_insert(report);
        }
        let mut expiring: Vec<Report> = latest
            .into_values()
            .filter(|report| report.expiration < threshold)
            .cloned()
            .collect();
        expiring.sort_by_key(|report| report.host_id);
        Ok(expiring)
    }

    async fn delete(&self, id: ReportId) -> HvsResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.reports.len();
        state.reports.retain(|report| report.id != id);
        Ok(state.reports.len() != before)
    }
}

#[async_trait]
impl HostStore for MemoryStore {
    async fn create_host(&self, host: &Host, credential: Option<&HostCredential>) -> HvsResult<()> {
        let mut state = self.state.lock().await;
        state.hosts.insert(host.id, host.clone());
        if let Some(credential) = credential {
            state.credentials.insert(host.id, credential.clone());
        }
        Ok(())
    }

    async fn find_host(&self, id: HostId) -> HvsResult<Option<Host>> {
        Ok(self.state.lock().await.hosts.get(&id).cloned())
    }

    async fn find_credential(&self, id: HostId) -> HvsResult<Option<HostCredential>> {
        Ok(self.state.lock().await.credentials.get(&id).cloned())
    }

    async fn append_status(&self, status: &HostStatus) -> HvsResult<()> {
        self.state.lock().await.statuses.push(status.clone());
        Ok(())
    }

    async fn append_statuses(&self, statuses: &[HostStatus]) -> HvsResult<()> {
        self.state
            .lock()
            .await
            .statuses
            .extend(statuses.iter().cloned());
        Ok(())
    }

    async fn latest_status(&self, id: HostId) -> HvsResult<Option<HostStatus>> {
        Ok(self
            .state
            .lock()
            .await
            .statuses
            .iter()
            .rev()
            .find(|status| status.host_id == id)
            .cloned())
    }
}

#[async_trait]
impl FlavorVerifyQueue for MemoryStore {
    async fn enqueue(
        &self,
        host_id: HostId,
        force_update: bool,
    ) -> HvsResult<Option<QueueEntryId>> {
        Ok(self.state.lock().await.enqueue(host_id, force_update))
    }

    async fn enqueue_many(
        &self,
        host_ids: &[HostId],
        force_update: bool,
    ) -> HvsResult<Vec<QueueEntryId>> {
        let mut state = self.state.lock().await;
        Ok(host_ids
            .iter()
            .filter_map(|host_id| state.enqueue(*host_id, force_update))
            .collect())
    }

    async fn in_flight(&self, host_ids: &[HostId]) -> HvsResult<Vec<QueueEntry>> {
        Ok(self
            .state
            .lock()
            .await
            .queue
            .iter()
            .filter(|entry| host_ids.contains(&entry.host_id()) && entry.state.in_flight())
            .cloned()
            .collect())
    }

    async fn dequeue_next(&self, limit: usize) -> HvsResult<Vec<QueueEntry>> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let mut taken = Vec::new();
        for entry in state
            .queue
            .iter_mut()
            .filter(|entry| entry.state == QueueState::New)
            .take(limit)
        {
            entry.set_state(QueueState::Running, now);
            taken.push(entry.clone());
        }
        Ok(taken)
    }

    async fn reclaim_stale(&self, stale_before: DateTime<Utc>) -> HvsResult<Vec<QueueEntryId>> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let mut reclaimed = Vec::new();
        for entry in state
            .queue
            .iter_mut()
            .filter(|entry| entry.is_stale(stale_before))
        {
            entry.set_state(QueueState::New, now);
            reclaimed.push(entry.id);
        }
        Ok(reclaimed)
    }

    async fn complete(&self, id: QueueEntryId, success: bool) -> HvsResult<()> {
        let mut state = self.state.lock().await;
        let entry = state
            .queue
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| HvsError::not_found("QueueEntry", id))?;
        let next = if success {
            QueueState::Completed
        } else {
            QueueState::Error
        };
        entry.set_state(next, Utc::now());
        Ok(())
    }
}
