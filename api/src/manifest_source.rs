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

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::host::{ConnectionString, HostCredential, HostState};
use crate::model::host_manifest::HostManifest;
use crate::{HvsError, HvsResult};

pub const HOST_MANIFEST_PATH: &str = "v2/host-manifest";

/// ConnectionFault is why a manifest could not be obtained from a host,
/// expressed as the host state to record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{state}: {message}")]
pub struct ConnectionFault {
    pub state: HostState,
    pub message: String,
}

impl ConnectionFault {
    pub fn new(state: HostState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }
}

/// ManifestSource retrieves the current measurements of a host.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch_manifest(
        &self,
        connection_string: &ConnectionString,
        credential: Option<&HostCredential>,
    ) -> Result<HostManifest, ConnectionFault>;
}

/// Error body returned by trust agents that could reach the host but not
/// produce a manifest.
#[derive(Debug, Deserialize)]
struct AgentErrorBody {
    host_state: HostState,
    #[serde(default)]
    message: Option<String>,
}

/// HttpManifestSource talks to the trust agent over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpManifestSource {
    client: reqwest::Client,
}

impl HttpManifestSource {
    pub fn new(timeout: Duration) -> HvsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HvsError::internal(format!("failed to build agent client: {e}")))?;
        Ok(Self { client })
    }

    pub fn manifest_url(connection_string: &ConnectionString) -> String {
        format!(
            "{}/{HOST_MANIFEST_PATH}",
            connection_string.url.as_str().trim_end_matches('/')
        )
    }
}

/// classify_error_response maps a non-success agent response to the host
/// state it implies.
pub fn classify_error_response(status: reqwest::StatusCode, body: &str) -> ConnectionFault {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return ConnectionFault::new(HostState::Unauthorized, format!("agent returned {status}"));
    }
    match serde_json::from_str::<AgentErrorBody>(body) {
        Ok(agent_error) => ConnectionFault::new(
            agent_error.host_state,
            agent_error
                .message
                .unwrap_or_else(|| format!("agent returned {status}")),
        ),
        Err(_) => ConnectionFault::new(HostState::Unknown, format!("agent returned {status}")),
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch_manifest(
        &self,
        connection_string: &ConnectionString,
        credential: Option<&HostCredential>,
    ) -> Result<HostManifest, ConnectionFault> {
        let url = Self::manifest_url(connection_string);
        let mut request = self.client.get(&url);
        if let Some(credential) = credential {
            request = request.basic_auth(&credential.username, Some(&credential.password));
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(url, error = %e, "Failed to reach trust agent");
            ConnectionFault::new(HostState::ConnectionFailure, e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ConnectionFault::new(HostState::ConnectionFailure, e.to_string()))?;
        if !status.is_success() {
            return Err(classify_error_response(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            ConnectionFault::new(
                HostState::Unknown,
                format!("agent returned an unreadable manifest: {e}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_url() {
        let conn: ConnectionString = "intel:https://10.1.2.3:1443/".parse().unwrap();
        assert_eq!(
            HttpManifestSource::manifest_url(&conn),
            "https://10.1.2.3:1443/v2/host-manifest"
        );
    }

    #[test]
    fn test_classify_error_response() {
        assert_eq!(
            classify_error_response(reqwest::StatusCode::UNAUTHORIZED, "").state,
            HostState::Unauthorized
        );
        assert_eq!(
            classify_error_response(reqwest::StatusCode::FORBIDDEN, "{}").state,
            HostState::Unauthorized
        );
        assert_eq!(
            classify_error_response(
                reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"host_state": "AIK_NOT_PROVISIONED"}"#
            )
            .state,
            HostState::AikNotProvisioned
        );
        assert_eq!(
            classify_error_response(reqwest::StatusCode::BAD_GATEWAY, "<html/>").state,
            HostState::Unknown
        );
    }

    #[tokio::test]
    async fn test_unreachable_agent_is_connection_failure() {
        let source = HttpManifestSource::new(Duration::from_millis(500)).unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let conn: ConnectionString = format!("intel:http://127.0.0.1:{port}").parse().unwrap();
        let fault = source.fetch_manifest(&conn, None).await.unwrap_err();
        assert_eq!(fault.state, HostState::ConnectionFailure);
    }
}
