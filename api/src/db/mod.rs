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
 *  Repository traits for everything the verifier reads and writes, plus
 *  two implementations: MemoryStore (tests, offline evaluation) and
 *  PgStore (sqlx + PostgreSQL). Lookups that may legitimately find
 *  nothing return Option; only infrastructure failures are errors.
*/

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::flavor::Flavor;
use crate::model::flavorgroup::{FlavorMatchPolicyCollection, Flavorgroup};
use crate::model::host::{Host, HostCredential, HostStatus};
use crate::model::keys::{FlavorgroupId, HostId, QueueEntryId, ReportId};
use crate::model::queue::QueueEntry;
use crate::model::report::Report;
use crate::HvsResult;

pub mod flavor_query;
pub mod memory;
pub mod migrations;
pub mod postgres;

pub use flavor_query::FlavorQuery;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Number of queue entries written per transaction.
pub const QUEUE_BATCH_SIZE: usize = 25;
/// Number of host status rows written per transaction.
pub const HOST_STATUS_BATCH_SIZE: usize = 100;

/// DatabaseError wraps a sqlx error with the query that caused it and the
/// location it was issued from.
#[derive(thiserror::Error, Debug)]
#[error("Database Error: {source} file={file} line={line} query={query}.")]
pub struct DatabaseError {
    file: &'static str,
    line: u32,
    query: String,
    #[source]
    pub source: sqlx::Error,
}

impl DatabaseError {
    pub fn new(file: &'static str, line: u32, query: &str, source: sqlx::Error) -> DatabaseError {
        DatabaseError {
            file,
            line,
            query: query.to_string(),
            source,
        }
    }
}

#[async_trait]
pub trait FlavorStore: Send + Sync {
    /// create_flavorgroup rejects reserved and duplicate names.
    async fn create_flavorgroup(&self, flavorgroup: &Flavorgroup) -> HvsResult<()>;

    /// ensure_reserved_flavorgroups creates the "automatic" and
    /// "host_unique" flavorgroups unless they already exist.
    async fn ensure_reserved_flavorgroups(&self) -> HvsResult<()>;

    /// create_flavor stores a flavor and, when given, links it into a
    /// flavorgroup. Host-unique flavors are stored unlinked. Flavors that
    /// pin nothing are rejected.
    async fn create_flavor(
        &self,
        flavor: &Flavor,
        flavorgroup_id: Option<FlavorgroupId>,
    ) -> HvsResult<()>;

    async fn find_flavors(&self, query: &FlavorQuery) -> HvsResult<Vec<Flavor>>;

    async fn find_flavorgroup(&self, id: FlavorgroupId) -> HvsResult<Option<Flavorgroup>>;

    async fn find_flavorgroup_by_name(&self, name: &str) -> HvsResult<Option<Flavorgroup>>;

    async fn find_match_policy(
        &self,
        id: FlavorgroupId,
    ) -> HvsResult<Option<FlavorMatchPolicyCollection>>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn persist(&self, report: &Report) -> HvsResult<()>;

    async fn find_by_id(&self, id: ReportId) -> HvsResult<Option<Report>>;

    async fn find_latest_for_host(&self, host_id: HostId) -> HvsResult<Option<Report>>;

    /// find_expiring_before returns the latest report of every host whose
    /// latest report expires before `threshold`, ordered by host id.
    async fn find_expiring_before(&self, threshold: DateTime<Utc>) -> HvsResult<Vec<Report>>;

    /// delete returns false if no report had this id.
    async fn delete(&self, id: ReportId) -> HvsResult<bool>;
}

#[async_trait]
pub trait HostStore: Send + Sync {
    async fn create_host(&self, host: &Host, credential: Option<&HostCredential>) -> HvsResult<()>;

    async fn find_host(&self, id: HostId) -> HvsResult<Option<Host>>;

    async fn find_credential(&self, id: HostId) -> HvsResult<Option<HostCredential>>;

    async fn append_status(&self, status: &HostStatus) -> HvsResult<()>;

    /// append_statuses commits in batches of HOST_STATUS_BATCH_SIZE. A
    /// failing batch does not undo the batches committed before it.
    async fn append_statuses(&self, statuses: &[HostStatus]) -> HvsResult<()>;

    async fn latest_status(&self, id: HostId) -> HvsResult<Option<HostStatus>>;
}

#[async_trait]
pub trait FlavorVerifyQueue: Send + Sync {
    /// enqueue inserts a flavor-verify entry unless an in-flight entry for
    /// the host already covers the requested force level. Returns the new
    /// entry's id, or None if the request was absorbed.
    async fn enqueue(&self, host_id: HostId, force_update: bool)
        -> HvsResult<Option<QueueEntryId>>;

    /// enqueue_many applies the enqueue rule to each host and commits in
    /// batches of QUEUE_BATCH_SIZE.
    async fn enqueue_many(
        &self,
        host_ids: &[HostId],
        force_update: bool,
    ) -> HvsResult<Vec<QueueEntryId>>;

    /// in_flight returns the NEW and RUNNING entries of the given hosts.
    async fn in_flight(&self, host_ids: &[HostId]) -> HvsResult<Vec<QueueEntry>>;

    /// dequeue_next moves up to `limit` of the oldest NEW entries to
    /// RUNNING and returns them.
    async fn dequeue_next(&self, limit: usize) -> HvsResult<Vec<QueueEntry>>;

    /// reclaim_stale moves RUNNING entries last updated before
    /// `stale_before` back to NEW. Returns the ids of the moved entries.
    async fn reclaim_stale(&self, stale_before: DateTime<Utc>) -> HvsResult<Vec<QueueEntryId>>;

    /// complete moves an entry to COMPLETED (success) or ERROR.
    async fn complete(&self, id: QueueEntryId, success: bool) -> HvsResult<()>;
}
