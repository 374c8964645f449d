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

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row, Transaction};

use super::{
    DatabaseError, FlavorQuery, FlavorStore, FlavorVerifyQueue, HostStore, ReportStore,
    HOST_STATUS_BATCH_SIZE, QUEUE_BATCH_SIZE,
};
use crate::model::flavor::Flavor;
use crate::model::flavorgroup::{FlavorMatchPolicyCollection, Flavorgroup};
use crate::model::host::{ConnectionString, Host, HostCredential, HostStatus};
use crate::model::host_manifest::HostManifest;
use crate::model::keys::{FlavorgroupId, HostId, QueueEntryId, ReportId};
use crate::model::queue::{enqueue_required, FlavorVerifyParams, QueueEntry, QueueState};
use crate::model::report::Report;
use crate::verifier::TrustReport;
use crate::{HvsError, HvsResult};

const REPORT_COLUMNS: &str = "id, host_id, trust_report, saml, created, expiration";
const QUEUE_COLUMNS: &str = "id, action, host_id, force_update, state, created, updated";
const FLAVORGROUP_COLUMNS: &str = "id, name, match_policy";

fn decode_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(e))
}

impl<'r> FromRow<'r, PgRow> for Report {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let trust_report: Json<TrustReport> = row.try_get("trust_report")?;
        Ok(Report {
            id: row.try_get("id")?,
            host_id: row.try_get("host_id")?,
            trust_report: trust_report.0,
            saml: row.try_get("saml")?,
            created: row.try_get("created")?,
            expiration: row.try_get("expiration")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for HostStatus {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let state: &str = row.try_get("state")?;
        let manifest: Option<Json<HostManifest>> = row.try_get("manifest")?;
        Ok(HostStatus {
            host_id: row.try_get("host_id")?,
            state: state.parse().map_err(decode_error)?,
            manifest: manifest.map(|m| m.0),
            created: row.try_get("created")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for QueueEntry {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let state: &str = row.try_get("state")?;
        Ok(QueueEntry {
            id: row.try_get("id")?,
            action: row.try_get("action")?,
            parameters: FlavorVerifyParams {
                host_id: row.try_get("host_id")?,
                force_update: row.try_get("force_update")?,
            },
            state: state.parse().map_err(decode_error)?,
            created: row.try_get("created")?,
            updated: row.try_get("updated")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for Flavorgroup {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let match_policy: Option<Json<FlavorMatchPolicyCollection>> =
            row.try_get("match_policy")?;
        Ok(Flavorgroup {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            match_policy: match_policy.map(|p| p.0),
        })
    }
}

/// PgStore implements every repository on top of one PostgreSQL pool.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self, context: &str) -> Result<Transaction<'_, Postgres>, DatabaseError> {
        self.pool
            .begin()
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), context, e))
    }

    async fn in_flight_entries(
        txn: &mut Transaction<'_, Postgres>,
        host_ids: &[HostId],
    ) -> Result<Vec<QueueEntry>, DatabaseError> {
        let query = format!(
            "SELECT {QUEUE_COLUMNS} FROM flavor_verify_queue
            WHERE host_id = ANY($1) AND state IN ('NEW', 'RUNNING')"
        );
        sqlx::query_as::<_, QueueEntry>(&query)
            .bind(host_ids)
            .fetch_all(&mut **txn)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), &query, e))
    }

    async fn insert_queue_entries(
        txn: &mut Transaction<'_, Postgres>,
        entries: &[QueueEntry],
    ) -> Result<(), DatabaseError> {
        if entries.is_empty() {
            return Ok(());
        }
        let query = "INSERT INTO flavor_verify_queue (id, action, host_id, force_update, state, created, updated) ";
        let mut builder = QueryBuilder::new(query);
        builder.push_values(entries.iter(), |mut b, entry| {
            b.push_bind(entry.id)
                .push_bind(&entry.action)
                .push_bind(entry.host_id())
                .push_bind(entry.parameters.force_update)
                .push_bind(entry.state.as_str())
                .push_bind(entry.created)
                .push_bind(entry.updated);
        });
        builder
            .build()
            .execute(&mut **txn)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), query, e))?;
        Ok(())
    }
}

#[async_trait]
impl FlavorStore for PgStore {
    async fn create_flavorgroup(&self, flavorgroup: &Flavorgroup) -> HvsResult<()> {
        flavorgroup.validate()?;
        let query = "INSERT INTO flavorgroups (id, name, match_policy) VALUES ($1, $2, $3)";
        sqlx::query(query)
            .bind(flavorgroup.id)
            .bind(&flavorgroup.name)
            .bind(flavorgroup.match_policy.as_ref().map(Json))
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), query, e))?;
        Ok(())
    }

    async fn ensure_reserved_flavorgroups(&self) -> HvsResult<()> {
        let mut txn = self.begin("begin ensure_reserved_flavorgroups").await?;
        let query = "INSERT INTO flavorgroups (id, name, match_policy) VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING";
        for reserved in Flavorgroup::reserved() {
            let result = sqlx::query(query)
                .bind(reserved.id)
                .bind(&reserved.name)
                .bind(reserved.match_policy.as_ref().map(Json))
                .execute(&mut *txn)
                .await
                .map_err(|e| DatabaseError::new(file!(), line!(), query, e))?;
            if result.rows_affected() > 0 {
                tracing::info!(name = %reserved.name, "Created reserved flavorgroup");
            }
        }
        txn.commit().await.map_err(|e| {
            DatabaseError::new(file!(), line!(), "commit ensure_reserved_flavorgroups", e)
        })?;
        Ok(())
    }

    async fn create_flavor(
        &self,
        flavor: &Flavor,
        flavorgroup_id: Option<FlavorgroupId>,
    ) -> HvsResult<()> {
        flavor.validate()?;
        let mut txn = self.begin("begin create_flavor").await?;

        let query = "INSERT INTO flavors (id, label, flavor_part, hardware_uuid, created, content)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING";
        sqlx::query(query)
            .bind(flavor.id())
            .bind(flavor.label())
            .bind(flavor.part().as_str())
            .bind(flavor.hardware_uuid())
            .bind(flavor.meta.created)
            .bind(Json(flavor))
            .execute(&mut *txn)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), query, e))?;

        if let Some(flavorgroup_id) = flavorgroup_id {
            let query = "INSERT INTO flavorgroup_flavors (flavorgroup_id, flavor_id) VALUES ($1, $2)
                ON CONFLICT DO NOTHING";
            sqlx::query(query)
                .bind(flavorgroup_id)
                .bind(flavor.id())
                .execute(&mut *txn)
                .await
                .map_err(|e| DatabaseError::new(file!(), line!(), query, e))?;
        }

        txn.commit()
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), "commit create_flavor", e))?;
        Ok(())
    }

    async fn find_flavors(&self, query: &FlavorQuery) -> HvsResult<Vec<Flavor>> {
        let mut builder = QueryBuilder::new("");
        query.push_sql(&mut builder);
        let sql = builder.sql().to_string();
        let rows: Vec<(Json<Flavor>,)> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), &sql, e))?;
        Ok(rows.into_iter().map(|(flavor,)| flavor.0).collect())
    }

    async fn find_flavorgroup(&self, id: FlavorgroupId) -> HvsResult<Option<Flavorgroup>> {
        let query = format!("SELECT {FLAVORGROUP_COLUMNS} FROM flavorgroups WHERE id = $1");
        Ok(sqlx::query_as::<_, Flavorgroup>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), &query, e))?)
    }

    async fn find_flavorgroup_by_name(&self, name: &str) -> HvsResult<Option<Flavorgroup>> {
        let query = format!("SELECT {FLAVORGROUP_COLUMNS} FROM flavorgroups WHERE name = $1");
        Ok(sqlx::query_as::<_, Flavorgroup>(&query)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), &query, e))?)
    }

    async fn find_match_policy(
        &self,
        id: FlavorgroupId,
    ) -> HvsResult<Option<FlavorMatchPolicyCollection>> {
        Ok(self
            .find_flavorgroup(id)
            .await?
            .and_then(|group| group.match_policy))
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn persist(&self, report: &Report) -> HvsResult<()> {
        let query = format!(
            "INSERT INTO reports ({REPORT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        );
        sqlx::query(&query)
            .bind(report.id)
            .bind(report.host_id)
            .bind(Json(&report.trust_report))
            .bind(&report.saml)
            .bind(report.created)
            .bind(report.expiration)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), &query, e))?;
        Ok(())
    }

    async fn find_by_id(&self, id: ReportId) -> HvsResult<Option<Report>> {
        let query = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1");
        Ok(sqlx::query_as::<_, Report>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), &query, e))?)
    }

    async fn find_latest_for_host(&self, host_id: HostId) -> HvsResult<Option<Report>> {
        let query = format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE host_id = $1
            ORDER BY created DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, Report>(&query)
            .bind(host_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), &query, e))?)
    }

    async fn find_expiring_before(&self, threshold: DateTime<Utc>) -> HvsResult<Vec<Report>> {
        let query = format!(
            "SELECT {REPORT_COLUMNS} FROM (
                SELECT DISTINCT ON (host_id) {REPORT_COLUMNS}
                FROM reports
                ORDER BY host_id, created DESC
            ) latest
            WHERE expiration < $1
            ORDER BY host_id"
        );
        Ok(sqlx::query_as::<_, Report>(&query)
            .bind(threshold)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), &query, e))?)
    }

    async fn delete(&self, id: ReportId) -> HvsResult<bool> {
        let query = "DELETE FROM reports WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), query, e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl HostStore for PgStore {
    async fn create_host(&self, host: &Host, credential: Option<&HostCredential>) -> HvsResult<()> {
        let mut txn = self.begin("begin create_host").await?;

        let query = "INSERT INTO hosts (id, name, connection_string, hardware_uuid)
            VALUES ($1, $2, $3, $4)";
        sqlx::query(query)
            .bind(host.id)
            .bind(&host.name)
            .bind(host.connection_string.to_string())
            .bind(host.hardware_uuid)
            .execute(&mut *txn)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), query, e))?;

        if let Some(credential) = credential {
            let query =
                "INSERT INTO host_credentials (host_id, username, password) VALUES ($1, $2, $3)";
            sqlx::query(query)
                .bind(host.id)
                .bind(&credential.username)
                .bind(&credential.password)
                .execute(&mut *txn)
                .await
                .map_err(|e| DatabaseError::new(file!(), line!(), query, e))?;
        }

        if !host.flavorgroup_ids.is_empty() {
            let query = "INSERT INTO host_flavorgroups (host_id, flavorgroup_id, ordinal) ";
            let mut builder = QueryBuilder::new(query);
            builder.push_values(
                host.flavorgroup_ids.iter().enumerate(),
                |mut b, (ordinal, flavorgroup_id)| {
                    b.push_bind(host.id)
                        .push_bind(*flavorgroup_id)
                        .push_bind(ordinal as i32);
                },
            );
            builder
                .build()
                .execute(&mut *txn)
                .await
                .map_err(|e| DatabaseError::new(file!(), line!(), query, e))?;
        }

        txn.commit()
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), "commit create_host", e))?;
        Ok(())
    }

    async fn find_host(&self, id: HostId) -> HvsResult<Option<Host>> {
        let query = "SELECT id, name, connection_string, hardware_uuid FROM hosts WHERE id = $1";
        let row: Option<(HostId, String, String, Option<uuid::Uuid>)> = sqlx::query_as(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), query, e))?;
        let Some((id, name, connection_string, hardware_uuid)) = row else {
            return Ok(None);
        };
        let connection_string: ConnectionString = connection_string.parse().map_err(|e| {
            HvsError::internal(format!("host {id} has an invalid connection string: {e}"))
        })?;

        let query = "SELECT flavorgroup_id FROM host_flavorgroups WHERE host_id = $1 ORDER BY ordinal";
        let flavorgroup_ids: Vec<(FlavorgroupId,)> = sqlx::query_as(query)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), query, e))?;

        Ok(Some(Host {
            id,
            name,
            connection_string,
            hardware_uuid,
            flavorgroup_ids: flavorgroup_ids.into_iter().map(|(id,)| id).collect(),
        }))
    }

    async fn find_credential(&self, id: HostId) -> HvsResult<Option<HostCredential>> {
        let query = "SELECT username, password FROM host_credentials WHERE host_id = $1";
        let row: Option<(String, String)> = sqlx::query_as(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), query, e))?;
        Ok(row.map(|(username, password)| HostCredential { username, password }))
    }

    async fn append_status(&self, status: &HostStatus) -> HvsResult<()> {
        self.append_statuses(std::slice::from_ref(status)).await
    }

    async fn append_statuses(&self, statuses: &[HostStatus]) -> HvsResult<()> {
        let query = "INSERT INTO host_status (host_id, state, manifest, created) ";
        for (batch, chunk) in statuses.chunks(HOST_STATUS_BATCH_SIZE).enumerate() {
            let mut txn = self.begin("begin append_statuses").await?;
            let mut builder = QueryBuilder::new(query);
            builder.push_values(chunk.iter(), |mut b, status| {
                b.push_bind(status.host_id)
                    .push_bind(status.state.to_string())
                    .push_bind(status.manifest.as_ref().map(Json))
                    .push_bind(status.created);
            });
            let result = builder.build().execute(&mut *txn).await;
            if let Err(e) = result {
                tracing::error!(
                    batch,
                    rows = chunk.len(),
                    error = %e,
                    "Failed to write host status batch, rolling back this batch only"
                );
                // Dropping the transaction rolls it back.
                return Err(DatabaseError::new(file!(), line!(), query, e).into());
            }
            txn.commit().await.map_err(|e| {
                DatabaseError::new(file!(), line!(), "commit append_statuses", e)
            })?;
        }
        Ok(())
    }

    async fn latest_status(&self, id: HostId) -> HvsResult<Option<HostStatus>> {
        let query = "SELECT host_id, state, manifest, created FROM host_status
            WHERE host_id = $1 ORDER BY created DESC, id DESC LIMIT 1";
        Ok(sqlx::query_as::<_, HostStatus>(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), query, e))?)
    }
}

#[async_trait]
impl FlavorVerifyQueue for PgStore {
    async fn enqueue(
        &self,
        host_id: HostId,
        force_update: bool,
    ) -> HvsResult<Option<QueueEntryId>> {
        Ok(self
            .enqueue_many(&[host_id], force_update)
            .await?
            .into_iter()
            .next())
    }

    async fn enqueue_many(
        &self,
        host_ids: &[HostId],
        force_update: bool,
    ) -> HvsResult<Vec<QueueEntryId>> {
        let mut inserted = Vec::new();
        for chunk in host_ids.chunks(QUEUE_BATCH_SIZE) {
            let mut txn = self.begin("begin enqueue_many").await?;
            let mut existing = Self::in_flight_entries(&mut txn, chunk).await?;

            let mut entries = Vec::new();
            for host_id in chunk {
                if enqueue_required(&existing, *host_id, force_update) {
                    let entry = QueueEntry::flavor_verify(*host_id, force_update);
                    existing.push(entry.clone());
                    entries.push(entry);
                }
            }

            if let Err(e) = Self::insert_queue_entries(&mut txn, &entries).await {
                tracing::error!(
                    rows = entries.len(),
                    error = %e,
                    "Failed to write flavor-verify batch, rolling back this batch only"
                );
                return Err(e.into());
            }
            txn.commit().await.map_err(|e| {
                DatabaseError::new(file!(), line!(), "commit enqueue_many", e)
            })?;
            inserted.extend(entries.iter().map(|entry| entry.id));
        }
        Ok(inserted)
    }

    async fn in_flight(&self, host_ids: &[HostId]) -> HvsResult<Vec<QueueEntry>> {
        let mut txn = self.begin("begin in_flight").await?;
        let entries = Self::in_flight_entries(&mut txn, host_ids).await?;
        txn.commit()
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), "commit in_flight", e))?;
        Ok(entries)
    }

    async fn dequeue_next(&self, limit: usize) -> HvsResult<Vec<QueueEntry>> {
        let query = format!(
            "UPDATE flavor_verify_queue SET state = 'RUNNING', updated = NOW()
            WHERE id IN (
                SELECT id FROM flavor_verify_queue WHERE state = 'NEW'
                ORDER BY created LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {QUEUE_COLUMNS}"
        );
        let mut entries = sqlx::query_as::<_, QueueEntry>(&query)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), &query, e))?;
        entries.sort_by_key(|entry| entry.created);
        Ok(entries)
    }

    async fn reclaim_stale(&self, stale_before: DateTime<Utc>) -> HvsResult<Vec<QueueEntryId>> {
        let query = "UPDATE flavor_verify_queue SET state = 'NEW', updated = NOW()
            WHERE state = 'RUNNING' AND updated < $1
            RETURNING id";
        let rows: Vec<(QueueEntryId,)> = sqlx::query_as(query)
            .bind(stale_before)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), query, e))?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn complete(&self, id: QueueEntryId, success: bool) -> HvsResult<()> {
        let state = if success {
            QueueState::Completed
        } else {
            QueueState::Error
        };
        let query = "UPDATE flavor_verify_queue SET state = $2, updated = NOW() WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .bind(state.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::new(file!(), line!(), query, e))?;
        if result.rows_affected() == 0 {
            return Err(HvsError::not_found("QueueEntry", id));
        }
        Ok(())
    }
}
