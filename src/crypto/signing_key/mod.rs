//
// Copyright 2026 The Notation Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Signing key capability
//!
//! The core never handles private keys itself. It talks to a [`SigningKey`],
//! which describes the key (identifier, algorithm, certificate chain) and
//! turns signing input into raw signature bytes.
//!
//! [`LocalSigner`] is the implementation backed by a private key held in
//! memory, a [`LocalSigningKey`]:
//! * [`LocalSigningKey::Rsa`]: RSASSA-PSS, the digest is picked from the modulus size
//! * [`LocalSigningKey::P256`]: ECDSA on P-256 with SHA-256
//! * [`LocalSigningKey::P384`]: ECDSA on P-384 with SHA-384
//! * [`LocalSigningKey::P521`]: ECDSA on P-521 with SHA-512
//!
//! ECDSA signatures are produced in the `r || s` form both envelopes expect.

use std::path::Path;

use async_trait::async_trait;
use const_oid::db::rfc5912::{ID_EC_PUBLIC_KEY, RSA_ENCRYPTION};
use pkcs8::{DecodePrivateKey, PrivateKeyInfo};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pss::BlindedSigningKey;
use rsa::traits::PublicKeyParts;
use signature::{RandomizedSigner, SignatureEncoding, Signer};
use x509_cert::der::Decode;
use x509_cert::Certificate;

use super::certificate::{fingerprint_sha256, read_certificate_file};
use super::{Curve, KeySpec, SignatureAlgorithm};
use crate::errors::{IoError, NotationError, Result, SignerError};

/// The label for pem of PKCS#8 private keys.
pub const PRIVATE_KEY_PEM_LABEL: &str = "PRIVATE KEY";

/// The label for pem of PKCS#1 RSA private keys.
pub const RSA_PRIVATE_KEY_PEM_LABEL: &str = "RSA PRIVATE KEY";

/// The label for pem of SEC1 EC private keys.
pub const EC_PRIVATE_KEY_PEM_LABEL: &str = "EC PRIVATE KEY";

/// What a signing key capability tells about itself.
#[derive(Debug, Clone)]
pub struct KeyDescription {
    /// Opaque identifier of the key
    pub key_id: String,
    /// Algorithm of the signatures the key produces
    pub algorithm: SignatureAlgorithm,
    /// Certificate chain of the key, leaf first
    pub certificate_chain: Vec<Certificate>,
}

/// A capability able to sign on behalf of a certificate.
///
/// Implementations report [`SignerError::KeyUnavailable`],
/// [`SignerError::Refused`] or [`SignerError::PluginFailed`].
#[async_trait]
pub trait SigningKey: Send + Sync {
    /// Describe the key and its certificate chain.
    async fn describe(&self) -> Result<KeyDescription>;

    /// Sign `payload`, returning the raw signature bytes.
    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// A private key held in memory.
#[derive(Clone)]
pub enum LocalSigningKey {
    Rsa(rsa::RsaPrivateKey),
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
    P521(p521::ecdsa::SigningKey),
}

impl std::fmt::Debug for LocalSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LocalSigningKey({:?})", self.key_spec())
    }
}

impl LocalSigningKey {
    /// Builds a `LocalSigningKey` from a PKCS#8 DER-encoded private key.
    pub fn from_pkcs8_der(der: &[u8]) -> std::result::Result<Self, SignerError> {
        let invalid = |e: pkcs8::Error| SignerError::KeyUnavailable(format!("invalid private key: {e}"));
        let info = PrivateKeyInfo::from_der(der)
            .map_err(|e| SignerError::KeyUnavailable(format!("invalid PKCS#8 document: {e}")))?;

        match info.algorithm.oid {
            RSA_ENCRYPTION => Ok(LocalSigningKey::Rsa(
                rsa::RsaPrivateKey::from_pkcs8_der(der).map_err(invalid)?,
            )),
            ID_EC_PUBLIC_KEY => {
                let curve = info
                    .algorithm
                    .parameters_oid()
                    .ok()
                    .and_then(|oid| Curve::from_oid(&oid))
                    .ok_or_else(|| {
                        SignerError::AlgorithmUnsupported("EC key on an unsupported curve".into())
                    })?;
                match curve {
                    Curve::P256 => Ok(LocalSigningKey::P256(
                        p256::SecretKey::from_pkcs8_der(der).map_err(invalid)?.into(),
                    )),
                    Curve::P384 => Ok(LocalSigningKey::P384(
                        p384::SecretKey::from_pkcs8_der(der).map_err(invalid)?.into(),
                    )),
                    Curve::P521 => {
                        let secret = p521::SecretKey::from_pkcs8_der(der).map_err(invalid)?;
                        let key = p521::ecdsa::SigningKey::from_slice(&secret.to_bytes())
                            .map_err(|e| SignerError::KeyUnavailable(e.to_string()))?;
                        Ok(LocalSigningKey::P521(key))
                    }
                }
            }
            other => Err(SignerError::AlgorithmUnsupported(format!(
                "private key with algorithm OID {other} is not supported"
            ))),
        }
    }

    /// Builds a `LocalSigningKey` from a PEM-encoded private key: PKCS#8,
    /// PKCS#1 for RSA or SEC1 for EC keys.
    pub fn from_pem(data: &[u8]) -> std::result::Result<Self, SignerError> {
        let block = pem::parse(data)
            .map_err(|e| SignerError::KeyUnavailable(format!("invalid PEM private key: {e}")))?;
        let unavailable = |e: String| SignerError::KeyUnavailable(e);
        match block.tag() {
            PRIVATE_KEY_PEM_LABEL => Self::from_pkcs8_der(block.contents()),
            RSA_PRIVATE_KEY_PEM_LABEL => Ok(LocalSigningKey::Rsa(
                rsa::RsaPrivateKey::from_pkcs1_der(block.contents())
                    .map_err(|e| unavailable(e.to_string()))?,
            )),
            EC_PRIVATE_KEY_PEM_LABEL => {
                if let Ok(key) = p256::SecretKey::from_sec1_der(block.contents()) {
                    Ok(LocalSigningKey::P256(key.into()))
                } else if let Ok(key) = p384::SecretKey::from_sec1_der(block.contents()) {
                    Ok(LocalSigningKey::P384(key.into()))
                } else {
                    let secret = p521::SecretKey::from_sec1_der(block.contents())
                        .map_err(|e| unavailable(e.to_string()))?;
                    Ok(LocalSigningKey::P521(
                        p521::ecdsa::SigningKey::from_slice(&secret.to_bytes())
                            .map_err(|e| unavailable(e.to_string()))?,
                    ))
                }
            }
            other => Err(unavailable(format!("unsupported PEM block {other:?}"))),
        }
    }

    pub fn key_spec(&self) -> KeySpec {
        match self {
            LocalSigningKey::Rsa(key) => KeySpec::Rsa(key.n().bits()),
            LocalSigningKey::P256(_) => KeySpec::Ec(Curve::P256),
            LocalSigningKey::P384(_) => KeySpec::Ec(Curve::P384),
            LocalSigningKey::P521(_) => KeySpec::Ec(Curve::P521),
        }
    }

    /// The signature algorithm bound to this key.
    pub fn algorithm(&self) -> std::result::Result<SignatureAlgorithm, SignerError> {
        self.key_spec()
            .signature_algorithm()
            .map_err(|e| SignerError::AlgorithmUnsupported(e.to_string()))
    }

    /// Sign `message` with the algorithm bound to this key.
    pub fn sign_bytes(&self, message: &[u8]) -> std::result::Result<Vec<u8>, SignerError> {
        let refused = |e: signature::Error| SignerError::Refused(e.to_string());
        let mut rng = rand::thread_rng();
        match (self, self.algorithm()?) {
            (LocalSigningKey::Rsa(key), SignatureAlgorithm::RSASSA_PSS_SHA256) => {
                Ok(BlindedSigningKey::<sha2::Sha256>::new(key.clone())
                    .try_sign_with_rng(&mut rng, message)
                    .map_err(refused)?
                    .to_vec())
            }
            (LocalSigningKey::Rsa(key), SignatureAlgorithm::RSASSA_PSS_SHA384) => {
                Ok(BlindedSigningKey::<sha2::Sha384>::new(key.clone())
                    .try_sign_with_rng(&mut rng, message)
                    .map_err(refused)?
                    .to_vec())
            }
            (LocalSigningKey::Rsa(key), _) => {
                Ok(BlindedSigningKey::<sha2::Sha512>::new(key.clone())
                    .try_sign_with_rng(&mut rng, message)
                    .map_err(refused)?
                    .to_vec())
            }
            (LocalSigningKey::P256(key), _) => {
                let sig: p256::ecdsa::Signature = key.try_sign(message).map_err(refused)?;
                Ok(sig.to_bytes().to_vec())
            }
            (LocalSigningKey::P384(key), _) => {
                let sig: p384::ecdsa::Signature = key.try_sign(message).map_err(refused)?;
                Ok(sig.to_bytes().to_vec())
            }
            (LocalSigningKey::P521(key), _) => {
                let sig: p521::ecdsa::Signature = key.try_sign(message).map_err(refused)?;
                Ok(sig.to_bytes().to_vec())
            }
        }
    }
}

/// A [`SigningKey`] backed by a [`LocalSigningKey`] and its certificate chain.
#[derive(Debug, Clone)]
pub struct LocalSigner {
    key: LocalSigningKey,
    certificate_chain: Vec<Certificate>,
}

impl LocalSigner {
    /// Couple a key with its certificate chain, leaf first.
    ///
    /// The leaf public key must be of the same type and size as the key.
    pub fn new(
        key: LocalSigningKey,
        certificate_chain: Vec<Certificate>,
    ) -> std::result::Result<Self, SignerError> {
        let leaf = certificate_chain.first().ok_or_else(|| {
            SignerError::KeyUnavailable("the certificate chain is empty".to_string())
        })?;
        let leaf_spec = KeySpec::from_spki(&leaf.tbs_certificate.subject_public_key_info)
            .map_err(|e| SignerError::AlgorithmUnsupported(e.to_string()))?;
        if leaf_spec != key.key_spec() {
            return Err(SignerError::KeyUnavailable(format!(
                "the private key ({:?}) does not match the leaf certificate ({leaf_spec:?})",
                key.key_spec()
            )));
        }
        key.algorithm()?;
        Ok(LocalSigner {
            key,
            certificate_chain,
        })
    }

    /// Load a PEM private key and a certificate chain file.
    pub fn from_files(key_path: &Path, certificate_path: &Path) -> Result<Self> {
        let key_pem = std::fs::read(key_path).map_err(|e| {
            NotationError::from(IoError::from_io(&e, &key_path.display().to_string()))
        })?;
        let key = LocalSigningKey::from_pem(&key_pem)?;
        let chain = read_certificate_file(certificate_path)?;
        Ok(LocalSigner::new(key, chain)?)
    }

    pub fn certificate_chain(&self) -> &[Certificate] {
        &self.certificate_chain
    }
}

#[async_trait]
impl SigningKey for LocalSigner {
    async fn describe(&self) -> Result<KeyDescription> {
        Ok(KeyDescription {
            key_id: self
                .certificate_chain
                .first()
                .map(fingerprint_sha256)
                .unwrap_or_default(),
            algorithm: self.key.algorithm()?,
            certificate_chain: self.certificate_chain.clone(),
        })
    }

    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(self.key.sign_bytes(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::tests::*;
    use crate::crypto::VerificationKey;
    use openssl::nid::Nid;

    #[tokio::test]
    async fn local_signer_describes_its_chain() {
        let (root, leaf) = generate_chain();
        let signer =
            LocalSigner::new(leaf.signing_key(), vec![leaf.x509(), root.x509()]).unwrap();

        let description = signer.describe().await.unwrap();
        assert_eq!(description.algorithm, SignatureAlgorithm::ECDSA_SHA256);
        assert_eq!(description.certificate_chain.len(), 2);
        assert_eq!(description.key_id, fingerprint_sha256(&leaf.x509()));

        let signature = signer.sign(b"payload").await.unwrap();
        let key = VerificationKey::from_certificate(&leaf.x509()).unwrap();
        assert!(key
            .verify(description.algorithm, b"payload", &signature)
            .is_ok());
    }

    #[test]
    fn key_must_match_leaf() {
        let (_, leaf) = generate_chain();
        let (other_key, _) = generate_ecdsa_keypair(Nid::SECP384R1);
        let key =
            LocalSigningKey::from_pkcs8_der(&other_key.private_key_to_pkcs8().unwrap()).unwrap();
        assert!(matches!(
            LocalSigner::new(key, vec![leaf.x509()]),
            Err(SignerError::KeyUnavailable(_))
        ));
    }

    #[test]
    fn empty_chain_is_rejected() {
        let (_, leaf) = generate_chain();
        assert!(LocalSigner::new(leaf.signing_key(), vec![]).is_err());
    }

    #[test]
    fn pem_formats() {
        let (private_key, _) = generate_rsa_keypair(2048);
        let pkcs1 = private_key.rsa().unwrap().private_key_to_pem().unwrap();
        assert!(matches!(
            LocalSigningKey::from_pem(&pkcs1).unwrap(),
            LocalSigningKey::Rsa(_)
        ));

        let (private_key, _) = generate_ecdsa_keypair(Nid::SECP384R1);
        let sec1 = private_key.ec_key().unwrap().private_key_to_pem().unwrap();
        assert!(matches!(
            LocalSigningKey::from_pem(&sec1).unwrap(),
            LocalSigningKey::P384(_)
        ));

        let pkcs8 = private_key.private_key_to_pem_pkcs8().unwrap();
        assert!(matches!(
            LocalSigningKey::from_pem(&pkcs8).unwrap(),
            LocalSigningKey::P384(_)
        ));
    }

    #[test]
    fn from_files() {
        let (root, leaf) = generate_chain();
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("leaf.key");
        let cert_path = dir.path().join("leaf.crt");
        std::fs::write(
            &key_path,
            leaf.private_key.private_key_to_pem_pkcs8().unwrap(),
        )
        .unwrap();
        let mut chain = leaf.cert.to_pem().unwrap();
        chain.extend(root.cert.to_pem().unwrap());
        std::fs::write(&cert_path, chain).unwrap();

        let signer = LocalSigner::from_files(&key_path, &cert_path).unwrap();
        assert_eq!(signer.certificate_chain().len(), 2);

        let missing = LocalSigner::from_files(&dir.path().join("nope"), &cert_path);
        assert!(matches!(
            missing,
            Err(NotationError::Io(IoError::NotFound(_)))
        ));
    }
}
