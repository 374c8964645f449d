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

/*
///////////////////////////////////////////////////////////////////////////////
/// keys.rs
/// Primary/foreign keys used by the verification service.
///
/// The idea here is to make it very obvious which type of UUID is being
/// worked with, since it would be otherwise easy to pass a flavor ID where
/// a flavorgroup ID was expected. Typing each ID catches that at compile
/// time instead of at query time.
///
/// Every key derives sqlx::Type with #[sqlx(transparent)] so it binds
/// directly as a postgres UUID.
///////////////////////////////////////////////////////////////////////////////
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

///////////////////////////////////////////////////////////////////////////////
/// IdParseError is an error used for reporting back failures
/// to parse a UUID string back into one of the typed keys.
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to parse UUID input '{from}' to {to}: {msg}")]
pub struct IdParseError {
    // from is the input string.
    pub from: String,
    // to is the intended type (e.g. FlavorId).
    pub to: &'static str,
    // msg is the underlying parser message.
    pub msg: String,
}

macro_rules! uuid_key {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
            sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(id: uuid::Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(input: &str) -> Result<Self, IdParseError> {
                let parsed = uuid::Uuid::parse_str(input).map_err(|e| IdParseError {
                    from: input.to_string(),
                    to: stringify!($name),
                    msg: e.to_string(),
                })?;
                Ok(Self(parsed))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_key!(
    /// HostId is the primary key of a registered host.
    HostId
);

uuid_key!(
    /// FlavorId is the primary key of a flavor. Flavors are immutable,
    /// so a FlavorId always refers to the same set of measurements.
    FlavorId
);

uuid_key!(
    /// FlavorgroupId is the primary key of a flavorgroup (policy set).
    FlavorgroupId
);

uuid_key!(
    /// ReportId is the primary key of a single persisted report. Reports
    /// are append-only, so each verification cycle gets a new ReportId.
    ReportId
);

uuid_key!(QueueEntryId);
