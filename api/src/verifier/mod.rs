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

/*!
 *  The trust evaluation engine: comparator -> rules -> flavor matcher ->
 *  part policy -> trust report. Everything in here is synchronous and
 *  free of I/O.
*/

pub mod comparator;
pub mod fault;
pub mod flavor_matcher;
pub mod policy;
pub mod rules;
pub mod trust_report;

pub use fault::{Fault, FaultKind};
pub use flavor_matcher::{evaluate_flavor, FlavorTrustStatus};
pub use rules::{Rule, RuleBuilder, RuleRegistry, RuleResult};
pub use trust_report::{evaluate, PartTrust, TrustReport};
