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

//! Structures and constants required to perform cryptographic operations.

use const_oid::db::rfc5912::{
    ID_EC_PUBLIC_KEY, RSA_ENCRYPTION, SECP_256_R_1, SECP_384_R_1, SECP_521_R_1,
};
use const_oid::ObjectIdentifier;
use rsa::traits::PublicKeyParts;
use x509_cert::der::referenced::OwnedToRef;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::errors::EnvelopeError;

pub mod certificate;
pub mod certificate_pool;
pub mod signing_key;
pub mod verification_key;

pub use certificate_pool::{CertificatePool, ChainPurpose};
pub use signing_key::{KeyDescription, LocalSigner, LocalSigningKey, SigningKey};
pub use verification_key::VerificationKey;

/// Smallest RSA modulus accepted for signing and verification.
pub const MIN_RSA_KEY_SIZE: usize = 2048;

/// Signature algorithms registered by the Notary Project signature
/// specification.
///
/// * `RSASSA_PSS_SHA256`: RSASSA-PSS with SHA-256 and a salt as long as the digest.
/// * `RSASSA_PSS_SHA384`: RSASSA-PSS with SHA-384.
/// * `RSASSA_PSS_SHA512`: RSASSA-PSS with SHA-512.
/// * `ECDSA_SHA256`: ECDSA on P-256 with SHA-256, `r || s` encoded.
/// * `ECDSA_SHA384`: ECDSA on P-384 with SHA-384.
/// * `ECDSA_SHA512`: ECDSA on P-521 with SHA-512.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum SignatureAlgorithm {
    RSASSA_PSS_SHA256,
    RSASSA_PSS_SHA384,
    RSASSA_PSS_SHA512,
    ECDSA_SHA256,
    ECDSA_SHA384,
    ECDSA_SHA512,
}

impl std::fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureAlgorithm::RSASSA_PSS_SHA256 => write!(f, "RSASSA-PSS-SHA-256"),
            SignatureAlgorithm::RSASSA_PSS_SHA384 => write!(f, "RSASSA-PSS-SHA-384"),
            SignatureAlgorithm::RSASSA_PSS_SHA512 => write!(f, "RSASSA-PSS-SHA-512"),
            SignatureAlgorithm::ECDSA_SHA256 => write!(f, "ECDSA-SHA-256"),
            SignatureAlgorithm::ECDSA_SHA384 => write!(f, "ECDSA-SHA-384"),
            SignatureAlgorithm::ECDSA_SHA512 => write!(f, "ECDSA-SHA-512"),
        }
    }
}

impl SignatureAlgorithm {
    /// The JWA name of the algorithm.
    pub fn jws_name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::RSASSA_PSS_SHA256 => "PS256",
            SignatureAlgorithm::RSASSA_PSS_SHA384 => "PS384",
            SignatureAlgorithm::RSASSA_PSS_SHA512 => "PS512",
            SignatureAlgorithm::ECDSA_SHA256 => "ES256",
            SignatureAlgorithm::ECDSA_SHA384 => "ES384",
            SignatureAlgorithm::ECDSA_SHA512 => "ES512",
        }
    }

    /// Resolve a JWA name.
    pub fn from_jws_name(name: &str) -> Result<Self, EnvelopeError> {
        match name {
            "PS256" => Ok(SignatureAlgorithm::RSASSA_PSS_SHA256),
            "PS384" => Ok(SignatureAlgorithm::RSASSA_PSS_SHA384),
            "PS512" => Ok(SignatureAlgorithm::RSASSA_PSS_SHA512),
            "ES256" => Ok(SignatureAlgorithm::ECDSA_SHA256),
            "ES384" => Ok(SignatureAlgorithm::ECDSA_SHA384),
            "ES512" => Ok(SignatureAlgorithm::ECDSA_SHA512),
            unknown => Err(EnvelopeError::UnsupportedAlgorithm(unknown.to_string())),
        }
    }

    /// The COSE algorithm identifier.
    pub fn cose_algorithm(&self) -> coset::iana::Algorithm {
        use coset::iana::Algorithm;
        match self {
            SignatureAlgorithm::RSASSA_PSS_SHA256 => Algorithm::PS256,
            SignatureAlgorithm::RSASSA_PSS_SHA384 => Algorithm::PS384,
            SignatureAlgorithm::RSASSA_PSS_SHA512 => Algorithm::PS512,
            SignatureAlgorithm::ECDSA_SHA256 => Algorithm::ES256,
            SignatureAlgorithm::ECDSA_SHA384 => Algorithm::ES384,
            SignatureAlgorithm::ECDSA_SHA512 => Algorithm::ES512,
        }
    }

    /// Resolve a COSE algorithm identifier.
    pub fn from_cose_algorithm(alg: coset::iana::Algorithm) -> Result<Self, EnvelopeError> {
        use coset::iana::Algorithm;
        match alg {
            Algorithm::PS256 => Ok(SignatureAlgorithm::RSASSA_PSS_SHA256),
            Algorithm::PS384 => Ok(SignatureAlgorithm::RSASSA_PSS_SHA384),
            Algorithm::PS512 => Ok(SignatureAlgorithm::RSASSA_PSS_SHA512),
            Algorithm::ES256 => Ok(SignatureAlgorithm::ECDSA_SHA256),
            Algorithm::ES384 => Ok(SignatureAlgorithm::ECDSA_SHA384),
            Algorithm::ES512 => Ok(SignatureAlgorithm::ECDSA_SHA512),
            other => Err(EnvelopeError::UnsupportedAlgorithm(format!("{other:?}"))),
        }
    }

    /// The digest algorithm the signature is computed with.
    pub fn hash(&self) -> HashAlgorithm {
        match self {
            SignatureAlgorithm::RSASSA_PSS_SHA256 | SignatureAlgorithm::ECDSA_SHA256 => {
                HashAlgorithm::Sha256
            }
            SignatureAlgorithm::RSASSA_PSS_SHA384 | SignatureAlgorithm::ECDSA_SHA384 => {
                HashAlgorithm::Sha384
            }
            SignatureAlgorithm::RSASSA_PSS_SHA512 | SignatureAlgorithm::ECDSA_SHA512 => {
                HashAlgorithm::Sha512
            }
        }
    }
}

/// Digest algorithms used across signatures, timestamps and OCSP.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        use sha2::Digest;
        match self {
            HashAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }

    pub fn oid(&self) -> ObjectIdentifier {
        use const_oid::db::rfc5912::{ID_SHA_256, ID_SHA_384, ID_SHA_512};
        match self {
            HashAlgorithm::Sha256 => ID_SHA_256,
            HashAlgorithm::Sha384 => ID_SHA_384,
            HashAlgorithm::Sha512 => ID_SHA_512,
        }
    }

    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        use const_oid::db::rfc5912::{ID_SHA_256, ID_SHA_384, ID_SHA_512};
        match *oid {
            ID_SHA_256 => Some(HashAlgorithm::Sha256),
            ID_SHA_384 => Some(HashAlgorithm::Sha384),
            ID_SHA_512 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }
}

/// Elliptic curves accepted for signing keys.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Curve {
    P256,
    P384,
    P521,
}

impl Curve {
    pub(crate) fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        match *oid {
            SECP_256_R_1 => Some(Curve::P256),
            SECP_384_R_1 => Some(Curve::P384),
            SECP_521_R_1 => Some(Curve::P521),
            _ => None,
        }
    }
}

/// Type and size of a public key, which fixes the signature algorithm.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum KeySpec {
    Rsa(usize),
    Ec(Curve),
}

impl KeySpec {
    /// Inspect a subject public key info.
    pub fn from_spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self, EnvelopeError> {
        match spki.algorithm.oid {
            RSA_ENCRYPTION => {
                let key = rsa::RsaPublicKey::try_from(spki.owned_to_ref()).map_err(|e| {
                    EnvelopeError::UnsupportedAlgorithm(format!("invalid RSA public key: {e}"))
                })?;
                Ok(KeySpec::Rsa(key.n().bits()))
            }
            ID_EC_PUBLIC_KEY => {
                let curve = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .and_then(|p| p.decode_as::<ObjectIdentifier>().ok())
                    .and_then(|oid| Curve::from_oid(&oid))
                    .ok_or_else(|| {
                        EnvelopeError::UnsupportedAlgorithm(
                            "EC key on an unsupported curve".to_string(),
                        )
                    })?;
                Ok(KeySpec::Ec(curve))
            }
            other => Err(EnvelopeError::UnsupportedAlgorithm(format!(
                "key with algorithm OID {other} is not supported"
            ))),
        }
    }

    /// The signature algorithm a key of this type signs with.
    ///
    /// RSA keys of at least 4096 bits use PS512, at least 3072 bits PS384,
    /// anything smaller PS256. EC keys use the hash matching their curve.
    pub fn signature_algorithm(&self) -> Result<SignatureAlgorithm, EnvelopeError> {
        match self {
            KeySpec::Rsa(bits) if *bits < MIN_RSA_KEY_SIZE => Err(
                EnvelopeError::UnsupportedAlgorithm(format!("RSA key size {bits} is too small")),
            ),
            KeySpec::Rsa(bits) if *bits >= 4096 => Ok(SignatureAlgorithm::RSASSA_PSS_SHA512),
            KeySpec::Rsa(bits) if *bits >= 3072 => Ok(SignatureAlgorithm::RSASSA_PSS_SHA384),
            KeySpec::Rsa(_) => Ok(SignatureAlgorithm::RSASSA_PSS_SHA256),
            KeySpec::Ec(Curve::P256) => Ok(SignatureAlgorithm::ECDSA_SHA256),
            KeySpec::Ec(Curve::P384) => Ok(SignatureAlgorithm::ECDSA_SHA384),
            KeySpec::Ec(Curve::P521) => Ok(SignatureAlgorithm::ECDSA_SHA512),
        }
    }
}
