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

use std::env;

use tracing_subscriber::{
    filter::EnvFilter, filter::LevelFilter, fmt, prelude::*, util::SubscriberInitExt,
};

/// build_filter returns the global filter: RUST_LOG (default INFO), raised
/// by `-d` / `-dd`, with chatty dependencies capped.
pub fn build_filter(debug: u8) -> eyre::Result<EnvFilter> {
    let mut global_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    if debug != 0 {
        global_filter = global_filter.add_directive(
            match debug {
                1 => {
                    // command line overrides RUST_LOG
                    LevelFilter::DEBUG
                }
                _ => LevelFilter::TRACE,
            }
            .into(),
        );
    }

    Ok(global_filter
        .add_directive("sqlx::query=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("h2::codec=warn".parse()?))
}

pub fn setup_logging(debug: u8) -> eyre::Result<()> {
    if debug != 0 {
        env::set_var("RUST_BACKTRACE", "1");
    }

    let stdout_formatter = fmt::Layer::default()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(build_filter(debug)?)
        .with(stdout_formatter)
        .try_init()?;
    Ok(())
}
