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

use std::path::PathBuf;

use clap::{ArgAction, Parser};

static DEFAULT_CONFIG_PATH: &str = "/etc/hvs/hvs-api.toml";

#[derive(Parser)]
#[clap(name = env!("CARGO_PKG_NAME"))]
pub struct Options {
    #[clap(short, long, action = ArgAction::Count, help = "Increase debug level")]
    pub debug: u8,

    #[clap(long, default_value = DEFAULT_CONFIG_PATH, help = "Path to the configuration file")]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub sub_cmd: Option<Command>,
}

#[derive(Parser)]
pub enum Command {
    #[clap(about = "Performs database migrations")]
    Migrate,

    #[clap(about = "Run the HVS REST API and background workers")]
    Run,

    #[clap(about = "Evaluate a host manifest against flavors offline and print the trust report")]
    Evaluate(Evaluate),
}

#[derive(Parser)]
pub struct Evaluate {
    #[clap(long, help = "Host manifest JSON file")]
    pub manifest: PathBuf,

    #[clap(long, help = "JSON file holding an array of flavors")]
    pub flavors: PathBuf,

    #[clap(
        long,
        help = "Flavor match policy JSON file; the automatic policy is used if omitted"
    )]
    pub policy: Option<PathBuf>,
}

impl Options {
    pub fn load() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_evaluate() {
        let options = Options::try_parse_from([
            "hvs-api",
            "-dd",
            "evaluate",
            "--manifest",
            "m.json",
            "--flavors",
            "f.json",
        ])
        .unwrap();
        assert_eq!(options.debug, 2);
        assert_eq!(options.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        match options.sub_cmd {
            Some(Command::Evaluate(evaluate)) => {
                assert_eq!(evaluate.manifest, PathBuf::from("m.json"));
                assert!(evaluate.policy.is_none());
            }
            _ => panic!("expected evaluate"),
        }
    }

    #[test]
    fn test_parse_run_with_config() {
        let options =
            Options::try_parse_from(["hvs-api", "--config", "/tmp/hvs.toml", "run"]).unwrap();
        assert_eq!(options.debug, 0);
        assert_eq!(options.config, PathBuf::from("/tmp/hvs.toml"));
        assert!(matches!(options.sub_cmd, Some(Command::Run)));
    }
}
