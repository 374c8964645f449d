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

use sqlx::PgPool;

use crate::db::{FlavorStore, PgStore};
use crate::HvsResult;

/// migrate applies pending schema migrations, then creates the reserved
/// flavorgroups if they are missing.
#[tracing::instrument(skip(pool))]
pub async fn migrate(pool: &PgPool) -> HvsResult<()> {
    sqlx::migrate!().run(pool).await?;
    PgStore::new(pool.clone())
        .ensure_reserved_flavorgroups()
        .await
}
