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
use std::path::Path;
use std::sync::Arc;

use eyre::WrapErr;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::cfg::HvsConfig;
use crate::db::{FlavorStore, FlavorVerifyQueue, HostStore, PgStore, ReportStore};
use crate::flavor_verify::FlavorVerifyWorker;
use crate::host_verifier::HostVerifier;
use crate::manifest_source::HttpManifestSource;
use crate::report_refresh::ReportRefreshScheduler;
use crate::report_service::ReportService;
use crate::saml::signing_key::FileSigningKeyProvider;
use crate::saml::SamlIssuer;
use crate::verifier::RuleRegistry;

pub const ENV_PREFIX: &str = "HVS_API_";

pub fn parse_hvs_config(config_str: &str) -> eyre::Result<Arc<HvsConfig>> {
    let config: HvsConfig = Figment::new()
        .merge(Toml::string(config_str))
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()
        .wrap_err("Failed to load configuration files")?;
    Ok(Arc::new(config))
}

pub fn load_hvs_config(path: &Path) -> eyre::Result<Arc<HvsConfig>> {
    let config_str = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read config file {}", path.display()))?;
    parse_hvs_config(&config_str)
}

pub async fn create_pool(config: &HvsConfig) -> eyre::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_database_connections)
        .connect(&config.database_url)
        .await
        .wrap_err("Failed to connect to the database")
}

/// Everything `run` needs, wired against PostgreSQL.
pub struct Services {
    pub report_service: Arc<ReportService>,
    pub worker: FlavorVerifyWorker,
    pub scheduler: ReportRefreshScheduler,
}

pub async fn create_services(config: &HvsConfig, pool: PgPool) -> eyre::Result<Services> {
    let store = Arc::new(PgStore::new(pool));
    let hosts: Arc<dyn HostStore> = store.clone();
    let flavors: Arc<dyn FlavorStore> = store.clone();
    let reports: Arc<dyn ReportStore> = store.clone();
    let queue: Arc<dyn FlavorVerifyQueue> = store;

    flavors
        .ensure_reserved_flavorgroups()
        .await
        .wrap_err("Failed to create the reserved flavorgroups")?;

    let key_provider = FileSigningKeyProvider::load(
        &config.saml.key_path,
        &config.saml.certificate_path,
    )
    .wrap_err("Failed to load the SAML signing key")?;
    let saml = Arc::new(SamlIssuer::new(
        config.saml.issuer.clone(),
        Arc::new(key_provider),
    ));
    let manifest_source = Arc::new(HttpManifestSource::new(config.agent.request_timeout)?);

    let verifier = Arc::new(HostVerifier::new(
        hosts.clone(),
        flavors,
        reports.clone(),
        manifest_source,
        saml,
        Arc::new(RuleRegistry::default()),
        config.host_verifier(),
    ));

    Ok(Services {
        report_service: Arc::new(ReportService::new(
            reports.clone(),
            hosts,
            queue.clone(),
            verifier.clone(),
        )),
        worker: FlavorVerifyWorker::new(
            queue.clone(),
            verifier,
            config.flavor_verify_worker.clone(),
        ),
        scheduler: ReportRefreshScheduler::new(reports, queue, config.report_refresh.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hvs_config_env_override() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("HVS_API_LISTEN", "127.0.0.1:1443");
            let config = parse_hvs_config(
                r#"
                database_url = "postgres://localhost/hvs"
                [saml]
                key_path = "/k"
                certificate_path = "/c"
                "#,
            )
            .unwrap();
            assert_eq!(config.listen, "127.0.0.1:1443".parse().unwrap());
            assert_eq!(config.database_url, "postgres://localhost/hvs");
            Ok(())
        });
    }

    #[test]
    fn test_missing_database_url_is_an_error() {
        figment::Jail::expect_with(|_jail| {
            assert!(parse_hvs_config("").is_err());
            Ok(())
        });
    }
}
