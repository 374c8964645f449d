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

pub mod cfg;
pub mod db;
pub mod errors;
pub mod flavor_verify;
pub mod host_verifier;
pub mod logging;
pub mod manifest_source;
pub mod model;
pub mod report_refresh;
pub mod report_service;
pub mod saml;
pub mod setup;
pub mod verifier;
pub mod web;

#[cfg(test)]
mod tests;

pub use errors::{HvsError, HvsResult};
