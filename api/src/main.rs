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

use eyre::WrapErr;
use hvs::cfg::{Command, Evaluate, Options};
use hvs::model::flavor::Flavor;
use hvs::model::flavorgroup::FlavorMatchPolicyCollection;
use hvs::model::host_manifest::HostManifest;
use hvs::verifier::{self, RuleRegistry};
use hvs::{db, logging, setup, web};
use serde::de::DeserializeOwned;

fn read_json<T: DeserializeOwned>(path: &Path) -> eyre::Result<T> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).wrap_err_with(|| format!("Failed to parse {}", path.display()))
}

fn evaluate(args: &Evaluate) -> eyre::Result<()> {
    let manifest: HostManifest = read_json(&args.manifest)?;
    manifest.validate().wrap_err("Invalid host manifest")?;
    let flavors: Vec<Flavor> = read_json(&args.flavors)?;
    let policy = match args.policy.as_ref() {
        Some(path) => read_json::<FlavorMatchPolicyCollection>(path)?,
        None => FlavorMatchPolicyCollection::automatic(),
    };
    policy.validate().wrap_err("Invalid flavor match policy")?;

    let report = verifier::evaluate(&manifest, &policy, &flavors, &RuleRegistry::default());
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let options = Options::load();
    logging::setup::setup_logging(options.debug)?;

    let sub_cmd = match &options.sub_cmd {
        None => {
            tracing::error!("error: 'hvs-api' requires a subcommand but one was not provided. Re-run with '--help'.");
            return Ok(());
        }
        Some(s) => s,
    };
    match sub_cmd {
        Command::Evaluate(args) => evaluate(args)?,
        Command::Migrate => {
            let config = setup::load_hvs_config(&options.config)?;
            tracing::info!("Running migrations");
            let pool = setup::create_pool(&config).await?;
            db::migrations::migrate(&pool).await?;
        }
        Command::Run => {
            let config = setup::load_hvs_config(&options.config)?;
            tracing::info!(config = ?config.redacted(), "Loaded configuration");

            let pool = setup::create_pool(&config).await?;
            let services = setup::create_services(&config, pool).await?;

            // Dropping these stops the background loops.
            let _worker_stop = services.worker.start()?;
            let _scheduler_stop = services.scheduler.start()?;

            let listener = tokio::net::TcpListener::bind(config.listen)
                .await
                .wrap_err_with(|| format!("Failed to bind {}", config.listen))?;
            tracing::info!("Start hvs-api on {}", config.listen);
            axum::serve(listener, web::routes(services.report_service))
                .with_graceful_shutdown(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for shutdown signal: {}", e);
                    }
                })
                .await?;
        }
    }
    Ok(())
}
