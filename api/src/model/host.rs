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

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::host_manifest::HostManifest;
use crate::model::keys::{FlavorgroupId, HostId};

///////////////////////////////////////////////////////////////////////////////
/// HostState is the connectivity state of a host as last observed by the
/// verifier. Everything other than CONNECTED means no fresh report could be
/// produced during the attempt that recorded it.
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostState {
    Connected,
    Queue,
    ConnectionFailure,
    Unauthorized,
    AikNotProvisioned,
    EcNotPresent,
    MeasuredLaunchFailure,
    TpmOwnershipFailure,
    TpmNotPresent,
    UnsupportedTpm,
    InvalidManifest,
    Unknown,
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the serde names so logs match the API.
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{self:?}"));
        write!(f, "{name}")
    }
}

impl FromStr for HostState {
    type Err = serde_json::Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(input.to_string()))
    }
}

/// HostStatus is one append-only observation of a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostStatus {
    pub host_id: HostId,
    pub state: HostState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<HostManifest>,
    pub created: DateTime<Utc>,
}

impl HostStatus {
    pub fn new(host_id: HostId, state: HostState, manifest: Option<HostManifest>) -> Self {
        Self {
            host_id,
            state,
            manifest,
            created: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Intel,
    Microsoft,
    Vmware,
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vendor::Intel => write!(f, "intel"),
            Vendor::Microsoft => write!(f, "microsoft"),
            Vendor::Vmware => write!(f, "vmware"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionStringError {
    #[error("connection string is missing a vendor prefix: {0}")]
    MissingVendor(String),
    #[error("unsupported vendor: {0}")]
    UnsupportedVendor(String),
    #[error("connection string has an invalid agent URL '{0}': {1}")]
    InvalidUrl(String, String),
    #[error("malformed connection string option: {0}")]
    MalformedOption(String),
}

/// HostCredential is the secret part of a connection string. It is kept
/// apart from the host record and never rendered back into the string.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCredential {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for HostCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

///////////////////////////////////////////////////////////////////////////////
/// ConnectionString is `<vendor>:<agent url>[;key=value]*`. The `u` and `p`
/// options (username and password) are split off into a HostCredential when
/// parsing; the remaining options are kept in order.
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub vendor: Vendor,
    pub url: reqwest::Url,
    pub options: Vec<(String, String)>,
}

impl ConnectionString {
    /// parse_with_credential parses a connection string that may still
    /// carry credentials, returning the stripped string and the credential.
    pub fn parse_with_credential(
        input: &str,
    ) -> Result<(Self, Option<HostCredential>), ConnectionStringError> {
        let (vendor, rest) = input
            .split_once(':')
            .ok_or_else(|| ConnectionStringError::MissingVendor(input.to_string()))?;
        let vendor = match vendor.to_ascii_lowercase().as_str() {
            "intel" => Vendor::Intel,
            "microsoft" => Vendor::Microsoft,
            "vmware" => Vendor::Vmware,
            "http" | "https" => return Err(ConnectionStringError::MissingVendor(input.to_string())),
            other => return Err(ConnectionStringError::UnsupportedVendor(other.to_string())),
        };

        let mut parts = rest.split(';');
        let raw_url = parts.next().unwrap_or_default().trim();
        let url = reqwest::Url::parse(raw_url)
            .map_err(|e| ConnectionStringError::InvalidUrl(raw_url.to_string(), e.to_string()))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConnectionStringError::InvalidUrl(
                raw_url.to_string(),
                "scheme must be http or https".to_string(),
            ));
        }

        let mut username = None;
        let mut password = None;
        let mut options = Vec::new();
        for part in parts.filter(|p| !p.trim().is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| ConnectionStringError::MalformedOption(part.to_string()))?;
            match key.trim() {
                "u" | "username" => username = Some(value.to_string()),
                "p" | "password" => password = Some(value.to_string()),
                other => options.push((other.to_string(), value.to_string())),
            }
        }

        let credential = match (username, password) {
            (None, None) => None,
            (username, password) => Some(HostCredential {
                username: username.unwrap_or_default(),
                password: password.unwrap_or_default(),
            }),
        };

        Ok((
            Self {
                vendor,
                url,
                options,
            },
            credential,
        ))
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl FromStr for ConnectionString {
    type Err = ConnectionStringError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse_with_credential(input).map(|(conn, _)| conn)
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = self.url.as_str().trim_end_matches('/');
        write!(f, "{}:{}", self.vendor, url)?;
        for (key, value) in self.options.iter() {
            write!(f, ";{key}={value}")?;
        }
        Ok(())
    }
}

impl Serialize for ConnectionString {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ConnectionString {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Host is a registered verification target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub name: String,
    pub connection_string: ConnectionString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_uuid: Option<uuid::Uuid>,
    #[serde(default)]
    pub flavorgroup_ids: Vec<FlavorgroupId>,
}
