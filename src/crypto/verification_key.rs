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

use const_oid::db::rfc5912::{
    ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, ECDSA_WITH_SHA_512, ID_EC_PUBLIC_KEY, ID_RSASSA_PSS,
    RSA_ENCRYPTION, SHA_256_WITH_RSA_ENCRYPTION, SHA_384_WITH_RSA_ENCRYPTION,
    SHA_512_WITH_RSA_ENCRYPTION,
};
use rsa::{pkcs1::RsaPssParams, pkcs1v15, pss};
use signature::{hazmat::PrehashVerifier, Verifier};
use x509_cert::der::{referenced::OwnedToRef, Decode, Encode};
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::Certificate;

use super::{Curve, HashAlgorithm, SignatureAlgorithm};
use crate::errors::{ChainError, EnvelopeError};

/// A public key able to check notary signatures and X.509 structure
/// signatures.
///
/// Currently the following key types are supported:
///
///   * RSA keys, PSS padding for notary signatures, PKCS#1 v1.5 or PSS for X.509
///   * ECDSA keys on the P-256, P-384 and P-521 curves
#[derive(Clone)]
pub enum VerificationKey {
    Rsa(rsa::RsaPublicKey),
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
    P521(p521::ecdsa::VerifyingKey),
}

// `p521::ecdsa::VerifyingKey` does not implement `Debug`, so it cannot be
// derived; the P-521 key is rendered through its SEC1 encoded point.
impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationKey::Rsa(key) => f.debug_tuple("Rsa").field(key).finish(),
            VerificationKey::P256(key) => f.debug_tuple("P256").field(key).finish(),
            VerificationKey::P384(key) => f.debug_tuple("P384").field(key).finish(),
            VerificationKey::P521(key) => f
                .debug_tuple("P521")
                .field(&key.to_encoded_point(false))
                .finish(),
        }
    }
}

impl TryFrom<&SubjectPublicKeyInfoOwned> for VerificationKey {
    type Error = EnvelopeError;

    fn try_from(spki: &SubjectPublicKeyInfoOwned) -> Result<Self, Self::Error> {
        let unsupported = |what: String| EnvelopeError::UnsupportedAlgorithm(what);
        match spki.algorithm.oid {
            RSA_ENCRYPTION => {
                let key = rsa::RsaPublicKey::try_from(spki.owned_to_ref())
                    .map_err(|e| unsupported(format!("invalid RSA public key: {e}")))?;
                Ok(VerificationKey::Rsa(key))
            }
            ID_EC_PUBLIC_KEY => {
                let curve = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .and_then(|p| p.decode_as::<const_oid::ObjectIdentifier>().ok())
                    .and_then(|oid| Curve::from_oid(&oid))
                    .ok_or_else(|| unsupported("EC key on an unsupported curve".to_string()))?;
                let point = spki.subject_public_key.raw_bytes();
                let invalid = |e: signature::Error| unsupported(format!("invalid EC public key: {e}"));
                Ok(match curve {
                    Curve::P256 => VerificationKey::P256(
                        p256::ecdsa::VerifyingKey::from_sec1_bytes(point).map_err(invalid)?,
                    ),
                    Curve::P384 => VerificationKey::P384(
                        p384::ecdsa::VerifyingKey::from_sec1_bytes(point).map_err(invalid)?,
                    ),
                    Curve::P521 => VerificationKey::P521(
                        p521::ecdsa::VerifyingKey::from_sec1_bytes(point).map_err(invalid)?,
                    ),
                })
            }
            other => Err(unsupported(format!(
                "key with algorithm OID {other} is not supported"
            ))),
        }
    }
}

impl VerificationKey {
    /// The public key of a certificate.
    pub fn from_certificate(cert: &Certificate) -> Result<Self, EnvelopeError> {
        VerificationKey::try_from(&cert.tbs_certificate.subject_public_key_info)
    }

    /// Verify a notary envelope signature: RSASSA-PSS with a salt as long as
    /// the digest, or ECDSA with `r || s` encoding.
    ///
    /// The algorithm must be the one bound to the key type.
    pub fn verify(
        &self,
        algorithm: SignatureAlgorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), EnvelopeError> {
        let failed = |e: signature::Error| EnvelopeError::IntegrityFailed(e.to_string());
        match (self, algorithm) {
            (VerificationKey::Rsa(key), SignatureAlgorithm::RSASSA_PSS_SHA256) => {
                let sig = pss::Signature::try_from(signature).map_err(failed)?;
                pss::VerifyingKey::<sha2::Sha256>::new(key.clone())
                    .verify(message, &sig)
                    .map_err(failed)
            }
            (VerificationKey::Rsa(key), SignatureAlgorithm::RSASSA_PSS_SHA384) => {
                let sig = pss::Signature::try_from(signature).map_err(failed)?;
                pss::VerifyingKey::<sha2::Sha384>::new(key.clone())
                    .verify(message, &sig)
                    .map_err(failed)
            }
            (VerificationKey::Rsa(key), SignatureAlgorithm::RSASSA_PSS_SHA512) => {
                let sig = pss::Signature::try_from(signature).map_err(failed)?;
                pss::VerifyingKey::<sha2::Sha512>::new(key.clone())
                    .verify(message, &sig)
                    .map_err(failed)
            }
            (VerificationKey::P256(key), SignatureAlgorithm::ECDSA_SHA256) => {
                let sig = p256::ecdsa::Signature::from_slice(signature).map_err(failed)?;
                key.verify(message, &sig).map_err(failed)
            }
            (VerificationKey::P384(key), SignatureAlgorithm::ECDSA_SHA384) => {
                let sig = p384::ecdsa::Signature::from_slice(signature).map_err(failed)?;
                key.verify(message, &sig).map_err(failed)
            }
            (VerificationKey::P521(key), SignatureAlgorithm::ECDSA_SHA512) => {
                let sig = p521::ecdsa::Signature::from_slice(signature).map_err(failed)?;
                key.verify(message, &sig).map_err(failed)
            }
            (_, algorithm) => Err(EnvelopeError::UnsupportedAlgorithm(format!(
                "{algorithm} does not match the {} signing key",
                self.describe()
            ))),
        }
    }

    /// Verify the signature of an X.509 structure (certificate, CRL, OCSP
    /// response, CMS signer info) made with `algorithm`.
    pub fn verify_x509(
        &self,
        algorithm: &AlgorithmIdentifierOwned,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), ChainError> {
        let bad_signature = |e: signature::Error| {
            ChainError::Unbuildable(format!("invalid {} signature: {e}", algorithm.oid))
        };

        match (self, algorithm.oid) {
            (VerificationKey::Rsa(key), SHA_256_WITH_RSA_ENCRYPTION) => {
                let sig = pkcs1v15::Signature::try_from(signature).map_err(bad_signature)?;
                pkcs1v15::VerifyingKey::<sha2::Sha256>::new(key.clone())
                    .verify(message, &sig)
                    .map_err(bad_signature)
            }
            (VerificationKey::Rsa(key), SHA_384_WITH_RSA_ENCRYPTION) => {
                let sig = pkcs1v15::Signature::try_from(signature).map_err(bad_signature)?;
                pkcs1v15::VerifyingKey::<sha2::Sha384>::new(key.clone())
                    .verify(message, &sig)
                    .map_err(bad_signature)
            }
            (VerificationKey::Rsa(key), SHA_512_WITH_RSA_ENCRYPTION) => {
                let sig = pkcs1v15::Signature::try_from(signature).map_err(bad_signature)?;
                pkcs1v15::VerifyingKey::<sha2::Sha512>::new(key.clone())
                    .verify(message, &sig)
                    .map_err(bad_signature)
            }
            (VerificationKey::Rsa(key), ID_RSASSA_PSS) => {
                let params_der = algorithm
                    .parameters
                    .as_ref()
                    .ok_or_else(|| ChainError::Malformed("RSASSA-PSS without parameters".into()))?
                    .to_der()
                    .map_err(|e| ChainError::Malformed(e.to_string()))?;
                let params = RsaPssParams::from_der(&params_der)
                    .map_err(|e| ChainError::Malformed(format!("invalid RSASSA-PSS parameters: {e}")))?;
                let salt_len = params.salt_len as usize;
                let sig = pss::Signature::try_from(signature).map_err(bad_signature)?;
                match HashAlgorithm::from_oid(&params.hash.oid) {
                    Some(HashAlgorithm::Sha256) => {
                        pss::VerifyingKey::<sha2::Sha256>::new_with_salt_len(key.clone(), salt_len)
                            .verify(message, &sig)
                    }
                    Some(HashAlgorithm::Sha384) => {
                        pss::VerifyingKey::<sha2::Sha384>::new_with_salt_len(key.clone(), salt_len)
                            .verify(message, &sig)
                    }
                    Some(HashAlgorithm::Sha512) => {
                        pss::VerifyingKey::<sha2::Sha512>::new_with_salt_len(key.clone(), salt_len)
                            .verify(message, &sig)
                    }
                    None => {
                        return Err(ChainError::Malformed(format!(
                            "RSASSA-PSS with hash {} is not supported",
                            params.hash.oid
                        )))
                    }
                }
                .map_err(bad_signature)
            }
            (VerificationKey::P256(key), oid) if ecdsa_hash(oid).is_some() => {
                let sig = p256::ecdsa::Signature::from_der(signature).map_err(bad_signature)?;
                key.verify_prehash(&ecdsa_prehash(oid, message), &sig)
                    .map_err(bad_signature)
            }
            (VerificationKey::P384(key), oid) if ecdsa_hash(oid).is_some() => {
                let sig = p384::ecdsa::Signature::from_der(signature).map_err(bad_signature)?;
                key.verify_prehash(&ecdsa_prehash(oid, message), &sig)
                    .map_err(bad_signature)
            }
            (VerificationKey::P521(key), oid) if ecdsa_hash(oid).is_some() => {
                let sig = p521::ecdsa::Signature::from_der(signature).map_err(bad_signature)?;
                key.verify_prehash(&ecdsa_prehash(oid, message), &sig)
                    .map_err(bad_signature)
            }
            (_, oid) => Err(ChainError::Unbuildable(format!(
                "signature algorithm {oid} cannot be verified with a {} key",
                self.describe()
            ))),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            VerificationKey::Rsa(_) => "RSA",
            VerificationKey::P256(_) => "P-256",
            VerificationKey::P384(_) => "P-384",
            VerificationKey::P521(_) => "P-521",
        }
    }
}

fn ecdsa_hash(oid: const_oid::ObjectIdentifier) -> Option<HashAlgorithm> {
    match oid {
        ECDSA_WITH_SHA_256 => Some(HashAlgorithm::Sha256),
        ECDSA_WITH_SHA_384 => Some(HashAlgorithm::Sha384),
        ECDSA_WITH_SHA_512 => Some(HashAlgorithm::Sha512),
        _ => None,
    }
}

fn ecdsa_prehash(oid: const_oid::ObjectIdentifier, message: &[u8]) -> Vec<u8> {
    ecdsa_hash(oid)
        .unwrap_or(HashAlgorithm::Sha256)
        .digest(message)
}

/// Verify that `issuer` signed `cert`.
pub(crate) fn verify_certificate_signature(
    cert: &Certificate,
    issuer: &Certificate,
) -> Result<(), ChainError> {
    let key = VerificationKey::from_certificate(issuer)
        .map_err(|e| ChainError::Unbuildable(e.to_string()))?;
    let tbs = cert
        .tbs_certificate
        .to_der()
        .map_err(|e| ChainError::Malformed(e.to_string()))?;
    let signature = cert
        .signature
        .as_bytes()
        .ok_or_else(|| ChainError::Malformed("certificate signature is not octet aligned".into()))?;
    key.verify_x509(&cert.signature_algorithm, &tbs, signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::tests::*;
    use openssl::nid::Nid;
    use rstest::rstest;

    #[rstest]
    #[case(generate_ecdsa_keypair(Nid::X9_62_PRIME256V1))]
    #[case(generate_ecdsa_keypair(Nid::SECP384R1))]
    #[case(generate_ecdsa_keypair(Nid::SECP521R1))]
    #[case(generate_rsa_keypair(2048))]
    fn notary_signature_round_trip(
        #[case] keys: (
            openssl::pkey::PKey<openssl::pkey::Private>,
            openssl::pkey::PKey<openssl::pkey::Public>,
        ),
    ) {
        let cert =
            generate_certificate(None, CertGenerationOptions::default().with_keypair(keys)).unwrap();
        let signer = cert.signing_key();
        let algorithm = signer.algorithm().unwrap();
        let signature = signer.sign_bytes(b"signing input").unwrap();

        let key = VerificationKey::from_certificate(&cert.x509()).unwrap();
        assert!(key.verify(algorithm, b"signing input", &signature).is_ok());
        assert!(matches!(
            key.verify(algorithm, b"tampered input", &signature),
            Err(EnvelopeError::IntegrityFailed(_))
        ));
    }

    #[test]
    fn algorithm_must_match_key() {
        let (_, leaf) = generate_chain();
        let key = VerificationKey::from_certificate(&leaf.x509()).unwrap();
        assert!(matches!(
            key.verify(SignatureAlgorithm::ECDSA_SHA384, b"x", &[0u8; 96]),
            Err(EnvelopeError::UnsupportedAlgorithm(_))
        ));
    }

    #[rstest]
    #[case(generate_ecdsa_keypair(Nid::X9_62_PRIME256V1))]
    #[case(generate_ecdsa_keypair(Nid::SECP384R1))]
    #[case(generate_rsa_keypair(2048))]
    fn certificate_signatures(
        #[case] keys: (
            openssl::pkey::PKey<openssl::pkey::Private>,
            openssl::pkey::PKey<openssl::pkey::Public>,
        ),
    ) {
        let root = generate_certificate(None, CertGenerationOptions::ca("Root").with_keypair(keys))
            .unwrap();
        let leaf = generate_certificate(Some(&root), CertGenerationOptions::default()).unwrap();
        let other = generate_certificate(None, CertGenerationOptions::ca("Other")).unwrap();

        assert!(verify_certificate_signature(&leaf.x509(), &root.x509()).is_ok());
        assert!(verify_certificate_signature(&root.x509(), &root.x509()).is_ok());
        assert!(verify_certificate_signature(&leaf.x509(), &other.x509()).is_err());
    }
}
