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
use axum::http::StatusCode;

use crate::db;
use crate::model::host::HostState;
use crate::model::keys::{HostId, IdParseError};

/// Represents various Errors that can occur throughout the service.
///
/// HvsError is a way to represent and enrich lower-level errors with specific business logic
/// that can be handled. Trust faults found while evaluating a manifest are not errors; they
/// are recorded in the TrustReport instead.
///
/// It uses `thiserror` to adapt lower-level errors to this type.
#[derive(thiserror::Error, Debug)]
pub enum HvsError {
    #[error("Generic error from report: {0}")]
    GenericErrorFromReport(#[from] eyre::ErrReport),

    #[error("{kind} not found: {id}")]
    NotFoundError {
        /// The type of the resource that was not found (e.g. Host)
        kind: &'static str,
        /// The ID of the resource that was not found
        id: String,
    },

    #[error("Argument is invalid: {0}")]
    InvalidArgument(String),

    #[error("Invalid host manifest: {0}")]
    InvalidManifest(String),

    #[error("Unable to fetch manifest from host {host_id}: {state}")]
    HostConnection { host_id: HostId, state: HostState },

    #[error("{0}")]
    DBError(#[from] db::DatabaseError),

    #[error("Database migration error: {0}")]
    DatabaseMigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("SAML assertion error: {0}")]
    SamlError(String),

    #[error("Signing key error: {0}")]
    SigningKeyError(String),

    #[error("JSON Parse failure - {0}")]
    JSONParseError(#[from] serde_json::Error),

    #[error("Invalid identifier: {0}")]
    IdParseError(#[from] IdParseError),

    #[error("XML write error: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl HvsError {
    /// Creates a `Internal` error with the given error message
    pub fn internal(message: String) -> Self {
        HvsError::Internal { message }
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        HvsError::NotFoundError {
            kind,
            id: id.to_string(),
        }
    }

    /// status_code is the HTTP status this error maps to on the REST surface.
    pub fn status_code(&self) -> StatusCode {
        match self {
            HvsError::NotFoundError { .. } => StatusCode::NOT_FOUND,
            HvsError::InvalidArgument(_)
            | HvsError::IdParseError(_)
            | HvsError::JSONParseError(_) => StatusCode::BAD_REQUEST,
            HvsError::InvalidManifest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            HvsError::HostConnection { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type for the return type of HVS functions
///
/// Wraps `HvsError` into `HvsResult<T>`
pub type HvsResult<T> = Result<T, HvsError>;
