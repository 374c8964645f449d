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

use chrono::Duration;

use crate::db::{FlavorStore, HostStore, ReportStore};
use crate::model::flavor::FlavorPart;
use crate::model::host::HostState;
use crate::model::keys::HostId;
use crate::tests::common::{self, create_test_env, host_unique_flavor, rhel_manifest};
use crate::verifier::fault::FaultKind;
use crate::HvsError;

#[tokio::test]
async fn test_rhel_host_is_trusted() -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env();
    let flavorgroup_id = env.create_os_flavorgroup("rhel-7.4").await;
    env.store
        .create_flavor(&common::rhel_os_flavor(), Some(flavorgroup_id))
        .await?;
    let host = env.create_host("rhel-host", vec![flavorgroup_id]).await;
    env.manifest_source.respond(&host, Ok(rhel_manifest(&host)));

    let report = env.verifier.verify_host(host.id, false).await?;
    assert!(report.trusted());
    assert_eq!(report.expiration - report.created, Duration::hours(24));

    let os = &report.trust_report.parts[&FlavorPart::Os];
    assert!(os.trusted);
    assert!(os.counted);
    assert_eq!(os.flavors.len(), 1);
    assert_eq!(report.trust_report.faults().count(), 0);

    assert!(report.saml.contains(
        "<saml2:Attribute Name=\"TRUST_OS\"><saml2:AttributeValue>true</saml2:AttributeValue></saml2:Attribute>"
    ));
    assert!(report.saml.contains(
        "<saml2:Attribute Name=\"TRUST_OVERALL\"><saml2:AttributeValue>true</saml2:AttributeValue></saml2:Attribute>"
    ));

    let status = env.store.latest_status(host.id).await?.unwrap();
    assert_eq!(status.state, HostState::Connected);
    assert_eq!(status.manifest, Some(rhel_manifest(&host)));
    assert_eq!(env.store.reports().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_os_version_mismatch_is_untrusted() -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env();
    let flavorgroup_id = env.create_os_flavorgroup("rhel-7.4").await;
    env.store
        .create_flavor(&common::rhel_os_flavor(), Some(flavorgroup_id))
        .await?;
    let host = env.create_host("upgraded-host", vec![flavorgroup_id]).await;
    let mut manifest = rhel_manifest(&host);
    manifest.host_info.os_version = "7.5".to_string();
    env.manifest_source.respond(&host, Ok(manifest));

    let report = env.verifier.verify_host(host.id, false).await?;
    assert!(!report.trusted());
    assert_eq!(
        report.trust_report.is_trusted_for(FlavorPart::Os),
        Some(false)
    );
    let kinds: Vec<FaultKind> = report
        .trust_report
        .faults()
        .map(|fault| fault.kind)
        .collect();
    assert_eq!(kinds, vec![FaultKind::HostInfoMismatch]);
    assert!(report.saml.contains(
        "<saml2:Attribute Name=\"TRUST_OS\"><saml2:AttributeValue>false</saml2:AttributeValue></saml2:Attribute>"
    ));
    Ok(())
}

#[tokio::test]
async fn test_host_unique_flavor_of_other_host_is_ignored() -> Result<(), Box<dyn std::error::Error>>
{
    let env = create_test_env();
    let flavorgroup_id = env.create_os_flavorgroup("rhel-7.4").await;
    env.store
        .create_flavor(&common::rhel_os_flavor(), Some(flavorgroup_id))
        .await?;
    let host = env.create_host("rhel-host", vec![flavorgroup_id]).await;
    env.manifest_source.respond(&host, Ok(rhel_manifest(&host)));

    // Captured from another machine; its PCR would not match.
    env.store
        .create_flavor(
            &host_unique_flavor(uuid::Uuid::new_v4(), &"00".repeat(32)),
            None,
        )
        .await?;

    let report = env.verifier.verify_host(host.id, false).await?;
    let host_unique = &report.trust_report.parts[&FlavorPart::HostUnique];
    assert!(host_unique.trusted);
    assert!(!host_unique.counted);
    assert!(host_unique.flavors.is_empty());
    assert!(report.trusted());

    // Once a flavor for this machine exists it is enforced.
    let hardware_uuid = host.hardware_uuid.unwrap();
    env.store
        .create_flavor(&host_unique_flavor(hardware_uuid, &"00".repeat(32)), None)
        .await?;

    let report = env.verifier.verify_host(host.id, true).await?;
    let host_unique = &report.trust_report.parts[&FlavorPart::HostUnique];
    assert!(!host_unique.trusted);
    assert!(host_unique.counted);
    assert_eq!(host_unique.flavors.len(), 1);
    assert!(!report.trusted());
    assert!(report
        .trust_report
        .faults()
        .any(|fault| fault.kind == FaultKind::PcrValueMismatch));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_host_records_status() -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env();
    let flavorgroup_id = env.create_os_flavorgroup("rhel-7.4").await;
    let host = env.create_host("offline-host", vec![flavorgroup_id]).await;

    let err = env.verifier.verify_host(host.id, true).await.unwrap_err();
    assert!(matches!(
        err,
        HvsError::HostConnection {
            state: HostState::ConnectionFailure,
            ..
        }
    ));

    let status = env.store.latest_status(host.id).await?.unwrap();
    assert_eq!(status.state, HostState::ConnectionFailure);
    assert!(status.manifest.is_none());
    assert!(env.store.reports().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_invalid_manifest_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env();
    let flavorgroup_id = env.create_os_flavorgroup("rhel-7.4").await;
    let host = env.create_host("broken-host", vec![flavorgroup_id]).await;
    let mut manifest = rhel_manifest(&host);
    manifest.host_info.hardware_uuid = None;
    env.manifest_source.respond(&host, Ok(manifest));

    let err = env.verifier.verify_host(host.id, true).await.unwrap_err();
    assert!(matches!(err, HvsError::InvalidManifest(_)));

    let status = env.store.latest_status(host.id).await?.unwrap();
    assert_eq!(status.state, HostState::InvalidManifest);
    assert!(env.store.reports().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cached_report_is_served_unless_forced() -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env();
    let flavorgroup_id = env.create_os_flavorgroup("rhel-7.4").await;
    env.store
        .create_flavor(&common::rhel_os_flavor(), Some(flavorgroup_id))
        .await?;
    let host = env.create_host("rhel-host", vec![flavorgroup_id]).await;
    env.manifest_source.respond(&host, Ok(rhel_manifest(&host)));

    let first = env.verifier.verify_host(host.id, false).await?;
    let cached = env.verifier.verify_host(host.id, false).await?;
    assert_eq!(cached.id, first.id);
    assert_eq!(env.manifest_source.calls(), 1);

    let forced = env.verifier.verify_host(host.id, true).await?;
    assert_ne!(forced.id, first.id);
    assert_eq!(env.manifest_source.calls(), 2);
    assert_eq!(env.store.reports().await.len(), 2);
    assert_eq!(
        env.store
            .find_latest_for_host(host.id)
            .await?
            .map(|report| report.id),
        Some(forced.id)
    );
    Ok(())
}

#[tokio::test]
async fn test_unknown_host() {
    let env = create_test_env();
    let err = env
        .verifier
        .verify_host(HostId::new(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, HvsError::NotFoundError { kind: "Host", .. }));
    assert_eq!(env.manifest_source.calls(), 0);
}

#[tokio::test]
async fn test_host_without_flavorgroups_is_untrusted() -> Result<(), Box<dyn std::error::Error>> {
    let env = create_test_env();
    let host = env.create_host("lonely-host", Vec::new()).await;
    env.manifest_source.respond(&host, Ok(rhel_manifest(&host)));

    let report = env.verifier.verify_host(host.id, false).await?;
    assert!(report.trust_report.parts.is_empty());
    assert!(!report.trusted());
    Ok(())
}
