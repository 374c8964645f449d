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

use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, Router};
use axum::Json;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::report_service::ReportService;
use crate::HvsError;

mod negotiate;
mod report;

pub use negotiate::ReportFormat;

/// All the REST routes of the service.
pub fn routes(service: Arc<ReportService>) -> Router {
    Router::new()
        .route("/v2/reports", post(report::create))
        .route(
            "/v2/reports/:report_id",
            get(report::detail).delete(report::delete),
        )
        .route("/v2/hosts/:host_id/report", get(report::latest_for_host))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Creates the response for a failed request
pub(crate) fn error_response(err: HvsError) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        tracing::error!(%err, "Request failed");
    } else {
        tracing::debug!(%err, "Request rejected");
    }
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
        .into_response()
}
