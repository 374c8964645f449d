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

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use http::StatusCode;
use serde::Serialize;

use crate::model::report::Report;
use crate::verifier::{Fault, PartTrust};

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_YAML: &str = "application/yaml";
pub const APPLICATION_XML: &str = "application/xml";
pub const APPLICATION_SAML: &str = "application/samlassertion+xml";

/// ReportFormat is a representation of a Report a client can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Yaml,
    Xml,
    Saml,
}

impl ReportFormat {
    fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            APPLICATION_JSON | "*/*" | "application/*" => Some(ReportFormat::Json),
            APPLICATION_YAML | "application/x-yaml" | "text/yaml" => Some(ReportFormat::Yaml),
            APPLICATION_XML | "text/xml" => Some(ReportFormat::Xml),
            APPLICATION_SAML => Some(ReportFormat::Saml),
            _ => None,
        }
    }

    /// negotiate picks the first supported media range of the Accept
    /// header, in the order the client listed them. No Accept header means
    /// JSON. None means nothing the client accepts can be produced.
    pub fn negotiate(headers: &HeaderMap) -> Option<Self> {
        let Some(accept) = headers.get(ACCEPT) else {
            return Some(ReportFormat::Json);
        };
        let accept = accept.to_str().ok()?;
        if accept.trim().is_empty() {
            return Some(ReportFormat::Json);
        }
        accept
            .split(',')
            .filter_map(|range| range.split(';').next())
            .map(|media_type| media_type.trim().to_ascii_lowercase())
            .find_map(|media_type| Self::from_media_type(&media_type))
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Json => APPLICATION_JSON,
            ReportFormat::Yaml => APPLICATION_YAML,
            ReportFormat::Xml => APPLICATION_XML,
            ReportFormat::Saml => APPLICATION_SAML,
        }
    }

    pub fn render(&self, status: StatusCode, report: &Report) -> Response {
        let body = match self {
            ReportFormat::Json => return (status, Json(report)).into_response(),
            ReportFormat::Yaml => serde_yaml::to_string(report).map_err(|e| e.to_string()),
            ReportFormat::Xml => {
                quick_xml::se::to_string(&ReportXml::from(report)).map_err(|e| e.to_string())
            }
            ReportFormat::Saml => Ok(report.saml.clone()),
        };
        match body {
            Ok(body) => (
                status,
                [(CONTENT_TYPE, HeaderValue::from_static(self.content_type()))],
                body,
            )
                .into_response(),
            Err(err) => {
                tracing::error!(%err, format = ?self, "Failed to render report");
                (StatusCode::INTERNAL_SERVER_ERROR, "Error rendering report").into_response()
            }
        }
    }
}

// The XML view keeps to attributes and text nodes so the document shape
// does not depend on how serde maps enums and nested maps.

#[derive(Debug, Serialize)]
#[serde(rename = "hostReport")]
pub struct ReportXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@hostId")]
    host_id: String,
    #[serde(rename = "@trusted")]
    trusted: bool,
    #[serde(rename = "@created")]
    created: String,
    #[serde(rename = "@expiration")]
    expiration: String,
    #[serde(rename = "part")]
    parts: Vec<PartXml>,
}

#[derive(Debug, Serialize)]
struct PartXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@trusted")]
    trusted: bool,
    #[serde(rename = "@counted")]
    counted: bool,
    #[serde(rename = "flavor")]
    flavors: Vec<FlavorXml>,
    #[serde(rename = "fault")]
    faults: Vec<FaultXml>,
}

#[derive(Debug, Serialize)]
struct FlavorXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@label")]
    label: String,
    #[serde(rename = "@trusted")]
    trusted: bool,
    #[serde(rename = "rule")]
    rules: Vec<RuleXml>,
}

#[derive(Debug, Serialize)]
struct RuleXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@trusted")]
    trusted: bool,
    #[serde(rename = "fault")]
    faults: Vec<FaultXml>,
}

#[derive(Debug, Serialize)]
struct FaultXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "$text")]
    description: String,
}

impl From<&Fault> for FaultXml {
    fn from(fault: &Fault) -> Self {
        let description = if fault.entries.is_empty() {
            fault.description.clone()
        } else {
            format!("{} [{}]", fault.description, fault.entries.join(", "))
        };
        Self {
            name: format!("{:?}", fault.kind),
            description,
        }
    }
}

fn part_xml(name: String, trust: &PartTrust) -> PartXml {
    PartXml {
        name,
        trusted: trust.trusted,
        counted: trust.counted,
        flavors: trust
            .flavors
            .iter()
            .map(|flavor| FlavorXml {
                id: flavor.flavor_id.to_string(),
                label: flavor.label.clone(),
                trusted: flavor.trusted,
                rules: flavor
                    .rule_results
                    .iter()
                    .map(|rule| RuleXml {
                        name: rule.rule_name.clone(),
                        trusted: rule.trusted,
                        faults: rule.faults.iter().map(FaultXml::from).collect(),
                    })
                    .collect(),
            })
            .collect(),
        faults: trust.faults.iter().map(FaultXml::from).collect(),
    }
}

impl From<&Report> for ReportXml {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id.to_string(),
            host_id: report.host_id.to_string(),
            trusted: report.trusted(),
            created: report.created.to_rfc3339(),
            expiration: report.expiration.to_rfc3339(),
            parts: report
                .trust_report
                .parts
                .iter()
                .map(|(part, trust)| part_xml(part.to_string(), trust))
                .collect(),
        }
    }
}
