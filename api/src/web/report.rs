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

use std::sync::Arc;

use axum::extract::{Path as AxumPath, State as AxumState};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{HeaderMap, StatusCode};
use serde::Deserialize;

use super::{error_response, ReportFormat};
use crate::model::keys::{HostId, ReportId};
use crate::report_service::ReportService;
use crate::HvsError;

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub host_id: HostId,
    #[serde(default)]
    pub force_update: bool,
}

fn not_acceptable() -> Response {
    (
        StatusCode::NOT_ACCEPTABLE,
        "Supported types: application/json, application/yaml, application/xml, application/samlassertion+xml",
    )
        .into_response()
}

/// Verify a host and return the resulting report
pub async fn create(
    AxumState(service): AxumState<Arc<ReportService>>,
    headers: HeaderMap,
    Json(request): Json<CreateReportRequest>,
) -> Response {
    let Some(format) = ReportFormat::negotiate(&headers) else {
        return not_acceptable();
    };
    match service.create(request.host_id, request.force_update).await {
        Ok(report) => format.render(StatusCode::CREATED, &report),
        Err(err) => error_response(err),
    }
}

/// View a report
pub async fn detail(
    AxumState(service): AxumState<Arc<ReportService>>,
    AxumPath(report_id): AxumPath<String>,
    headers: HeaderMap,
) -> Response {
    let Some(format) = ReportFormat::negotiate(&headers) else {
        return not_acceptable();
    };
    let report_id: ReportId = match report_id.parse() {
        Ok(id) => id,
        Err(e) => return error_response(HvsError::from(e)),
    };
    match service.get(report_id).await {
        Ok(report) => format.render(StatusCode::OK, &report),
        Err(err) => error_response(err),
    }
}

/// View the latest report of a host
pub async fn latest_for_host(
    AxumState(service): AxumState<Arc<ReportService>>,
    AxumPath(host_id): AxumPath<String>,
    headers: HeaderMap,
) -> Response {
    let Some(format) = ReportFormat::negotiate(&headers) else {
        return not_acceptable();
    };
    let host_id: HostId = match host_id.parse() {
        Ok(id) => id,
        Err(e) => return error_response(HvsError::from(e)),
    };
    match service.latest_for_host(host_id).await {
        Ok(report) => format.render(StatusCode::OK, &report),
        Err(err) => error_response(err),
    }
}

pub async fn delete(
    AxumState(service): AxumState<Arc<ReportService>>,
    AxumPath(report_id): AxumPath<String>,
) -> Response {
    let report_id: ReportId = match report_id.parse() {
        Ok(id) => id,
        Err(e) => return error_response(HvsError::from(e)),
    };
    match service.delete(report_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}
