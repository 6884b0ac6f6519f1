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

//! RFC 3161 timestamp tokens: parsing and verification.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use const_oid::db::rfc5912::{
    ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, ECDSA_WITH_SHA_512, ID_EC_PUBLIC_KEY, RSA_ENCRYPTION,
    SHA_256_WITH_RSA_ENCRYPTION, SHA_384_WITH_RSA_ENCRYPTION, SHA_512_WITH_RSA_ENCRYPTION,
};
use const_oid::ObjectIdentifier;
use der::asn1::{GeneralizedTime, Int, OctetStringRef, SetOfVec};
use der::{Decode, Encode, Sequence};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::SubjectKeyIdentifier;
use x509_cert::ext::Extensions;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::Certificate;
use x509_tsp::MessageImprint;

use crate::crypto::certificate_pool::{CertificatePool, ChainPurpose};
use crate::crypto::verification_key::VerificationKey;
use crate::crypto::HashAlgorithm;
use crate::errors::TimestampError;

const ID_SIGNED_DATA: ObjectIdentifier = const_oid::db::rfc5911::ID_SIGNED_DATA;
const ID_MESSAGE_DIGEST: ObjectIdentifier = const_oid::db::rfc6268::ID_MESSAGE_DIGEST;
const ID_SUBJECT_KEY_IDENTIFIER: ObjectIdentifier =
    const_oid::db::rfc5280::ID_CE_SUBJECT_KEY_IDENTIFIER;

/// id-ct-TSTInfo
pub(crate) const ID_CT_TST_INFO: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.4");

/// Accuracy of `genTime`, RFC 3161 section 2.4.2.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct Accuracy {
    #[asn1(optional = "true")]
    pub seconds: Option<u64>,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub millis: Option<u16>,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub micros: Option<u16>,
}

/// TSTInfo, RFC 3161 section 2.4.2.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct TstInfo {
    pub version: u8,
    pub policy: ObjectIdentifier,
    pub message_imprint: MessageImprint,
    pub serial_number: Int,
    pub gen_time: GeneralizedTime,
    #[asn1(optional = "true")]
    pub accuracy: Option<Accuracy>,
    #[asn1(default = "default_false")]
    pub ordering: bool,
    #[asn1(optional = "true")]
    pub nonce: Option<Int>,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub tsa: Option<GeneralName>,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub extensions: Option<Extensions>,
}

fn default_false() -> bool {
    false
}

/// A parsed RFC 3161 timestamp token (a CMS `SignedData` over a `TSTInfo`).
#[derive(Debug, Clone)]
pub struct TimestampToken {
    signed_data: SignedData,
    tst_info: TstInfo,
    tst_info_der: Vec<u8>,
    certificates: Vec<Certificate>,
}

impl TimestampToken {
    /// Parse a DER encoded token.
    pub fn parse(der: &[u8]) -> Result<Self, TimestampError> {
        let parse_error =
            |what: &str, e: der::Error| TimestampError::ParseError(format!("{what}: {e}"));

        let content_info =
            ContentInfo::from_der(der).map_err(|e| parse_error("invalid ContentInfo", e))?;
        if content_info.content_type != ID_SIGNED_DATA {
            return Err(TimestampError::ParseError(format!(
                "content type {} is not SignedData",
                content_info.content_type
            )));
        }
        let signed_data_der = content_info
            .content
            .to_der()
            .map_err(|e| parse_error("invalid SignedData", e))?;
        let signed_data = SignedData::from_der(&signed_data_der)
            .map_err(|e| parse_error("invalid SignedData", e))?;

        let encap = &signed_data.encap_content_info;
        if encap.econtent_type != ID_CT_TST_INFO {
            return Err(TimestampError::ParseError(format!(
                "encapsulated content type {} is not TSTInfo",
                encap.econtent_type
            )));
        }
        // eContent is an OCTET STRING holding the DER of the TSTInfo
        let tst_info_der = encap
            .econtent
            .as_ref()
            .ok_or_else(|| TimestampError::ParseError("missing TSTInfo content".to_string()))?
            .value()
            .to_vec();
        let tst_info =
            TstInfo::from_der(&tst_info_der).map_err(|e| parse_error("invalid TSTInfo", e))?;
        if tst_info.version != 1 {
            return Err(TimestampError::ParseError(format!(
                "unsupported TSTInfo version {}",
                tst_info.version
            )));
        }

        let certificates = signed_data
            .certificates
            .as_ref()
            .map(|set| {
                set.0
                    .iter()
                    .filter_map(|choice| match choice {
                        CertificateChoices::Certificate(cert) => Some(cert.clone()),
                        CertificateChoices::Other(_) => {
                            tracing::debug!("Skipping non-standard certificate format");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let token = TimestampToken {
            signed_data,
            tst_info,
            tst_info_der,
            certificates,
        };
        token.validity()?;
        Ok(token)
    }

    /// The time asserted by the timestamp authority.
    pub fn gen_time(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.tst_info.gen_time.to_system_time())
    }

    /// The accuracy of [`gen_time`](Self::gen_time), when the authority states one.
    pub fn accuracy(&self) -> Result<Option<TimeDelta>, TimestampError> {
        let Some(accuracy) = self.tst_info.accuracy.as_ref() else {
            return Ok(None);
        };
        let micros = i64::try_from(accuracy.seconds.unwrap_or(0))
            .ok()
            .and_then(|seconds| seconds.checked_mul(1_000_000))
            .and_then(|micros| micros.checked_add(i64::from(accuracy.millis.unwrap_or(0)) * 1_000))
            .and_then(|micros| micros.checked_add(i64::from(accuracy.micros.unwrap_or(0))))
            .ok_or_else(|| {
                TimestampError::ParseError(format!("accuracy {accuracy:?} is out of range"))
            })?;
        Ok(Some(TimeDelta::microseconds(micros)))
    }

    /// The interval `genTime` stands for, widened by the accuracy.
    pub fn validity(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), TimestampError> {
        let accuracy = self.accuracy()?.unwrap_or_default();
        let gen_time = self.gen_time();
        gen_time
            .checked_sub_signed(accuracy)
            .zip(gen_time.checked_add_signed(accuracy))
            .ok_or_else(|| {
                TimestampError::ParseError(format!(
                    "genTime {gen_time} widened by {accuracy} is out of range"
                ))
            })
    }

    /// Certificates embedded in the token.
    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// Verify that the token covers `signature` and is signed by a timestamp
    /// authority chaining to `trusted_roots`. Returns the authority chain,
    /// leaf first.
    pub fn verify(
        &self,
        signature: &[u8],
        trusted_roots: &CertificatePool,
    ) -> Result<Vec<Certificate>, TimestampError> {
        self.verify_message_imprint(signature)?;

        let signer_info = self.signed_data.signer_infos.0.iter().next().ok_or_else(|| {
            TimestampError::SignatureVerificationError("no signer info found".to_string())
        })?;
        let signer = self.find_signer_certificate(&signer_info.sid)?;
        self.verify_signer_info(signer_info, signer)?;

        let mut chain = vec![signer.clone()];
        chain.extend(self.certificates.iter().filter(|c| *c != signer).cloned());
        let path = trusted_roots
            .verify_chain(&chain, ChainPurpose::Timestamping, Some(self.gen_time()))
            .map_err(|e| TimestampError::InvalidChain(e.to_string()))?;
        tracing::debug!(gen_time = %self.gen_time(), "timestamp token verified");
        Ok(path)
    }

    /// Reject a token whose `genTime` is further than `skew` from `local`.
    ///
    /// A missing bound is an error, tokens are never accepted unchecked.
    pub fn check_skew(
        &self,
        local: DateTime<Utc>,
        skew: Option<Duration>,
    ) -> Result<(), TimestampError> {
        let skew = skew.ok_or(TimestampError::SkewUnset)?;
        let distance = (self.gen_time() - local)
            .abs()
            .to_std()
            .unwrap_or(Duration::MAX);
        if distance > skew {
            return Err(TimestampError::ClockSkew {
                gen_time: self.gen_time().to_rfc3339(),
                local_time: local.to_rfc3339(),
                skew_secs: skew.as_secs(),
            });
        }
        Ok(())
    }

    fn verify_message_imprint(&self, signature: &[u8]) -> Result<(), TimestampError> {
        let imprint = &self.tst_info.message_imprint;
        let hash = HashAlgorithm::from_oid(&imprint.hash_algorithm.oid).ok_or_else(|| {
            TimestampError::ParseError(format!(
                "unsupported message imprint hash algorithm {}",
                imprint.hash_algorithm.oid
            ))
        })?;
        let actual = hash.digest(signature);
        let expected = imprint.hashed_message.as_bytes();
        if actual != expected {
            return Err(TimestampError::HashMismatch {
                expected: hex::encode(expected),
                actual: hex::encode(actual),
            });
        }
        Ok(())
    }

    fn find_signer_certificate(
        &self,
        sid: &SignerIdentifier,
    ) -> Result<&Certificate, TimestampError> {
        let found = match sid {
            SignerIdentifier::IssuerAndSerialNumber(id) => self.certificates.iter().find(|cert| {
                cert.tbs_certificate.issuer == id.issuer
                    && cert.tbs_certificate.serial_number == id.serial_number
            }),
            SignerIdentifier::SubjectKeyIdentifier(ski) => self
                .certificates
                .iter()
                .find(|cert| subject_key_identifier(cert).as_ref() == Some(ski)),
        };
        found.ok_or_else(|| {
            TimestampError::SignatureVerificationError(
                "the signer certificate is not embedded in the token".to_string(),
            )
        })
    }

    fn verify_signer_info(
        &self,
        signer_info: &SignerInfo,
        signer: &Certificate,
    ) -> Result<(), TimestampError> {
        let fail = |reason: String| TimestampError::SignatureVerificationError(reason);

        let hash = HashAlgorithm::from_oid(&signer_info.digest_alg.oid)
            .ok_or_else(|| fail(format!("unsupported digest {}", signer_info.digest_alg.oid)))?;
        let signed_attrs = signer_info
            .signed_attrs
            .as_ref()
            .ok_or_else(|| fail("no signed attributes found".to_string()))?;

        let message_digest_der = signed_attrs
            .iter()
            .find(|attr| attr.oid == ID_MESSAGE_DIGEST)
            .and_then(|attr| attr.values.get(0))
            .ok_or_else(|| fail("message-digest attribute not found".to_string()))?
            .to_der()
            .map_err(|e| fail(format!("invalid message-digest attribute: {e}")))?;
        let message_digest = OctetStringRef::from_der(&message_digest_der)
            .map_err(|e| fail(format!("invalid message-digest attribute: {e}")))?;
        let content_hash = hash.digest(&self.tst_info_der);
        if message_digest.as_bytes() != content_hash.as_slice() {
            return Err(TimestampError::HashMismatch {
                expected: hex::encode(message_digest.as_bytes()),
                actual: hex::encode(content_hash),
            });
        }

        // The [0] IMPLICIT tag is replaced by the universal SET tag before
        // verification (RFC 5652 section 5.4).
        let attrs = SetOfVec::try_from(signed_attrs.iter().cloned().collect::<Vec<_>>())
            .map_err(|e| fail(format!("invalid signed attributes: {e}")))?;
        let attrs_der = attrs
            .to_der()
            .map_err(|e| fail(format!("failed to encode signed attributes: {e}")))?;

        let key = VerificationKey::from_certificate(signer).map_err(|e| fail(e.to_string()))?;
        let algorithm = signature_algorithm(&signer_info.signature_algorithm, hash);
        key.verify_x509(&algorithm, &attrs_der, signer_info.signature.as_bytes())
            .map_err(|e| fail(e.to_string()))
    }
}

/// Authorities often name the key algorithm instead of the signature
/// algorithm; the digest algorithm completes it.
fn signature_algorithm(
    algorithm: &AlgorithmIdentifierOwned,
    hash: HashAlgorithm,
) -> AlgorithmIdentifierOwned {
    let oid = match (algorithm.oid, hash) {
        (RSA_ENCRYPTION, HashAlgorithm::Sha256) => SHA_256_WITH_RSA_ENCRYPTION,
        (RSA_ENCRYPTION, HashAlgorithm::Sha384) => SHA_384_WITH_RSA_ENCRYPTION,
        (RSA_ENCRYPTION, HashAlgorithm::Sha512) => SHA_512_WITH_RSA_ENCRYPTION,
        (ID_EC_PUBLIC_KEY, HashAlgorithm::Sha256) => ECDSA_WITH_SHA_256,
        (ID_EC_PUBLIC_KEY, HashAlgorithm::Sha384) => ECDSA_WITH_SHA_384,
        (ID_EC_PUBLIC_KEY, HashAlgorithm::Sha512) => ECDSA_WITH_SHA_512,
        _ => return algorithm.clone(),
    };
    AlgorithmIdentifierOwned {
        oid,
        parameters: None,
    }
}

fn subject_key_identifier(cert: &Certificate) -> Option<SubjectKeyIdentifier> {
    cert.tbs_certificate
        .extensions
        .as_ref()?
        .iter()
        .find(|ext| ext.extn_id == ID_SUBJECT_KEY_IDENTIFIER)
        .and_then(|ext| SubjectKeyIdentifier::from_der(ext.extn_value.as_bytes()).ok())
}
