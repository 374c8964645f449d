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

//! Fixtures shared by the scenario tests: an in-memory store, a scripted
//! trust agent and builders for the manifests and flavors they exchange.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rsa::RsaPrivateKey;

use crate::db::memory::MemoryStore;
use crate::db::{FlavorStore, HostStore};
use crate::host_verifier::{HostVerifier, HostVerifierConfig};
use crate::manifest_source::{ConnectionFault, ManifestSource};
use crate::model::flavor::{EventLogExpectation, Flavor, FlavorPart, FlavorPcr};
use crate::model::flavorgroup::{
    FlavorMatchPolicyCollection, Flavorgroup, MatchPolicy, MatchType, RequiredType,
};
use crate::model::host::{ConnectionString, Host, HostCredential, HostState};
use crate::model::host_manifest::{
    EventLogEntry, HostInfo, HostManifest, Pcr, PcrBank, PcrEventLog,
};
use crate::model::keys::{FlavorgroupId, HostId};
use crate::report_service::ReportService;
use crate::saml::{SamlIssuer, SigningKey};
use crate::verifier::RuleRegistry;

pub const OS_PCR_VALUE: &str = "7a7d5ec7f3e4a2fb1e1a3c0e9d8b6a5f4e3d2c1b0a99887766554433221100ff";
pub const TBOOT_DIGEST: &str = "1f2e3d4c5b6a79881f2e3d4c5b6a79881f2e3d4c5b6a79881f2e3d4c5b6a7988";

/// ScriptedManifestSource answers manifest requests from a table keyed by
/// connection string. Hosts without an entry are unreachable. Hosts marked
/// with `panic_for` make the fetch panic.
#[derive(Default)]
pub struct ScriptedManifestSource {
    responses: Mutex<HashMap<String, Result<HostManifest, ConnectionFault>>>,
    panicking: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl ScriptedManifestSource {
    pub fn respond(&self, host: &Host, response: Result<HostManifest, ConnectionFault>) {
        self.responses
            .lock()
            .unwrap()
            .insert(host.connection_string.to_string(), response);
    }

    pub fn panic_for(&self, host: &Host) {
        self.panicking
            .lock()
            .unwrap()
            .insert(host.connection_string.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManifestSource for ScriptedManifestSource {
    async fn fetch_manifest(
        &self,
        connection_string: &ConnectionString,
        _credential: Option<&HostCredential>,
    ) -> Result<HostManifest, ConnectionFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = connection_string.to_string();
        let panicking = self.panicking.lock().unwrap().contains(&key);
        if panicking {
            panic!("trust agent client crashed for {key}");
        }
        self.responses
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| {
                Err(ConnectionFault::new(
                    HostState::ConnectionFailure,
                    "connection refused",
                ))
            })
    }
}

pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub manifest_source: Arc<ScriptedManifestSource>,
    pub verifier: Arc<HostVerifier>,
    pub report_service: Arc<ReportService>,
}

pub fn create_test_env() -> TestEnv {
    let store = Arc::new(MemoryStore::new());
    let manifest_source = Arc::new(ScriptedManifestSource::default());

    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    let saml = Arc::new(SamlIssuer::new(
        "https://hvs.test:8443".to_string(),
        Arc::new(SigningKey::new(private_key, vec![1, 2, 3])),
    ));

    let verifier = Arc::new(HostVerifier::new(
        store.clone(),
        store.clone(),
        store.clone(),
        manifest_source.clone(),
        saml,
        Arc::new(RuleRegistry::default()),
        HostVerifierConfig::default(),
    ));
    let report_service = Arc::new(ReportService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        verifier.clone(),
    ));

    TestEnv {
        store,
        manifest_source,
        verifier,
        report_service,
    }
}

impl TestEnv {
    /// Creates a flavorgroup that only requires an OS flavor, with
    /// host-unique flavors checked when present.
    pub async fn create_os_flavorgroup(&self, name: &str) -> FlavorgroupId {
        let policy = FlavorMatchPolicyCollection::default()
            .with(
                FlavorPart::Os,
                MatchPolicy::new(MatchType::AnyOf, RequiredType::Required),
            )
            .with(
                FlavorPart::HostUnique,
                MatchPolicy::new(MatchType::Latest, RequiredType::RequiredIfDefined),
            );
        let flavorgroup = Flavorgroup::new(name, policy);
        self.store.create_flavorgroup(&flavorgroup).await.unwrap();
        flavorgroup.id
    }

    pub async fn create_host(&self, name: &str, flavorgroup_ids: Vec<FlavorgroupId>) -> Host {
        let host = Host {
            id: HostId::new(),
            name: name.to_string(),
            connection_string: format!("intel:https://{name}.example.com:1443")
                .parse()
                .unwrap(),
            hardware_uuid: Some(uuid::Uuid::new_v4()),
            flavorgroup_ids,
        };
        let credential = HostCredential {
            username: "admin".to_string(),
            password: "password".to_string(),
        };
        self.store
            .create_host(&host, Some(&credential))
            .await
            .unwrap();
        host
    }
}

/// A RHEL 7.4 host as a trust agent would report it.
pub fn rhel_manifest(host: &Host) -> HostManifest {
    HostManifest {
        host_info: HostInfo {
            host_name: host.name.clone(),
            os_name: "RedHatEnterpriseServer".to_string(),
            os_version: "7.4".to_string(),
            bios_name: "Intel Corporation".to_string(),
            bios_version: "SE5C620.86B.00.01.0014.070920180847".to_string(),
            hardware_uuid: host.hardware_uuid,
            tpm_version: "2.0".to_string(),
            tpm_enabled: true,
            txt_enabled: true,
            ..Default::default()
        },
        pcrs: vec![Pcr {
            index: 17,
            bank: PcrBank::Sha256,
            value: OS_PCR_VALUE.to_string(),
        }],
        event_logs: vec![PcrEventLog {
            index: 17,
            bank: PcrBank::Sha256,
            entries: vec![
                EventLogEntry::new("tb_policy", &"ab".repeat(32)),
                EventLogEntry::new("vmlinuz", TBOOT_DIGEST),
            ],
        }],
        software_measurements: Vec::new(),
        asset_tag_digest: None,
    }
}

/// An OS flavor matching `rhel_manifest`.
pub fn rhel_os_flavor() -> Flavor {
    let mut flavor = Flavor::new("RHEL_7.4_OS", FlavorPart::Os, Utc::now());
    flavor.meta.description.os_name = Some("RedHatEnterpriseServer".to_string());
    flavor.meta.description.os_version = Some("7.4".to_string());
    flavor.pcrs.push(FlavorPcr {
        index: 17,
        bank: PcrBank::Sha256,
        value: OS_PCR_VALUE.to_string(),
        event_log: Some(EventLogExpectation::Includes {
            entries: vec![EventLogEntry::new("vmlinuz", TBOOT_DIGEST)],
        }),
        verify_event_log_integrity: false,
    });
    flavor
}

/// A host-unique flavor captured from the host with `hardware_uuid`.
pub fn host_unique_flavor(hardware_uuid: uuid::Uuid, pcr_value: &str) -> Flavor {
    let mut flavor = Flavor::new("HOST_UNIQUE", FlavorPart::HostUnique, Utc::now());
    flavor.meta.description.hardware_uuid = Some(hardware_uuid);
    flavor.pcrs.push(FlavorPcr {
        index: 17,
        bank: PcrBank::Sha256,
        value: pcr_value.to_string(),
        event_log: None,
        verify_event_log_integrity: false,
    });
    flavor
}
