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

use std::path::{Path, PathBuf};

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::{HvsError, HvsResult};

const PKCS8_TAG: &str = "PRIVATE KEY";
const PKCS1_TAG: &str = "RSA PRIVATE KEY";
const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// SigningKey is the RSA key and X.509 certificate (DER) used to sign
/// SAML assertions.
#[derive(Clone)]
pub struct SigningKey {
    private_key: RsaPrivateKey,
    certificate_der: Vec<u8>,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("certificate_len", &self.certificate_der.len())
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    pub fn new(private_key: RsaPrivateKey, certificate_der: Vec<u8>) -> Self {
        Self {
            private_key,
            certificate_der,
        }
    }

    /// from_pem accepts a PKCS#8 ("PRIVATE KEY") or PKCS#1
    /// ("RSA PRIVATE KEY") key and a PEM certificate.
    pub fn from_pem(key_pem: &str, certificate_pem: &str) -> HvsResult<Self> {
        let key = pem::parse(key_pem)
            .map_err(|e| HvsError::SigningKeyError(format!("unable to parse key PEM: {e}")))?;
        let private_key = match key.tag() {
            PKCS8_TAG => RsaPrivateKey::from_pkcs8_der(key.contents()).map_err(|e| {
                HvsError::SigningKeyError(format!("invalid PKCS#8 RSA key: {e}"))
            })?,
            PKCS1_TAG => RsaPrivateKey::from_pkcs1_der(key.contents()).map_err(|e| {
                HvsError::SigningKeyError(format!("invalid PKCS#1 RSA key: {e}"))
            })?,
            other => {
                return Err(HvsError::SigningKeyError(format!(
                    "unsupported key PEM block: {other}"
                )))
            }
        };

        let certificate = pem::parse(certificate_pem).map_err(|e| {
            HvsError::SigningKeyError(format!("unable to parse certificate PEM: {e}"))
        })?;
        if certificate.tag() != CERTIFICATE_TAG {
            return Err(HvsError::SigningKeyError(format!(
                "expected a {CERTIFICATE_TAG} PEM block, found {}",
                certificate.tag()
            )));
        }

        Ok(Self::new(private_key, certificate.contents().to_vec()))
    }

    pub fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey::from(&self.private_key)
    }

    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    /// sign returns the RSASSA-PKCS1-v1_5 SHA-256 signature of `message`.
    pub fn sign(&self, message: &[u8]) -> HvsResult<Vec<u8>> {
        let hashed = Sha256::digest(message);
        self.private_key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &hashed)
            .map_err(|e| HvsError::SamlError(format!("unable to sign assertion: {e}")))
    }
}

pub trait SigningKeyProvider: Send + Sync {
    fn signing_key(&self) -> HvsResult<&SigningKey>;
}

impl SigningKeyProvider for SigningKey {
    fn signing_key(&self) -> HvsResult<&SigningKey> {
        Ok(self)
    }
}

/// FileSigningKeyProvider reads the key and certificate once, at startup.
#[derive(Debug)]
pub struct FileSigningKeyProvider {
    pub key_path: PathBuf,
    pub certificate_path: PathBuf,
    key: SigningKey,
}

impl FileSigningKeyProvider {
    pub fn load(key_path: &Path, certificate_path: &Path) -> HvsResult<Self> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|e| {
                HvsError::SigningKeyError(format!("unable to read {}: {e}", path.display()))
            })
        };
        let key = SigningKey::from_pem(&read(key_path)?, &read(certificate_path)?)?;
        tracing::info!(
            key_path = %key_path.display(),
            certificate_path = %certificate_path.display(),
            "Loaded SAML signing key"
        );
        Ok(Self {
            key_path: key_path.to_path_buf(),
            certificate_path: certificate_path.to_path_buf(),
            key,
        })
    }
}

impl SigningKeyProvider for FileSigningKeyProvider {
    fn signing_key(&self) -> HvsResult<&SigningKey> {
        Ok(&self.key)
    }
}
