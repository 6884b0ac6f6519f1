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

//! Signature envelopes.
//!
//! Two wire formats carry the same content: a payload and the
//! [`SignerInfo`] describing who signed it, when, and with which
//! certificate chain.
//!
//! * [`jws`]: flattened JWS JSON serialization, `application/jose+json`
//! * [`cose`]: tagged `COSE_Sign1`, `application/cose`
//!
//! Producing an envelope takes two steps so that the signing key never sees
//! anything but the signing input:
//!
//! ```rust,ignore
//! let unsigned = UnsignedEnvelope::new(EnvelopeFormat::Jws, request)?;
//! let signature = key.sign(&unsigned.signing_input()).await?;
//! let bytes = unsigned.seal(signature, chain, UnsignedAttributes::default())?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use x509_cert::Certificate;

use crate::crypto::certificate::{
    fingerprint_sha256, issuer_string, not_after, subject_string, verify_code_signing_leaf,
};
use crate::crypto::{KeySpec, SignatureAlgorithm, VerificationKey};
use crate::descriptor::{Descriptor, Digest, Payload};
use crate::errors::EnvelopeError;
use crate::timestamp::TimestampToken;

pub mod cose;
pub mod jws;

/// Media type of JWS envelopes.
pub const MEDIA_TYPE_JWS: &str = "application/jose+json";

/// Media type of COSE envelopes.
pub const MEDIA_TYPE_COSE: &str = "application/cose";

pub(crate) const HEADER_SIGNING_SCHEME: &str = "io.cncf.notary.signingScheme";
pub(crate) const HEADER_SIGNING_TIME: &str = "io.cncf.notary.signingTime";
pub(crate) const HEADER_AUTHENTIC_SIGNING_TIME: &str = "io.cncf.notary.authenticSigningTime";
pub(crate) const HEADER_EXPIRY: &str = "io.cncf.notary.expiry";
pub(crate) const HEADER_SIGNING_AGENT: &str = "io.cncf.notary.signingAgent";
pub(crate) const HEADER_TIMESTAMP_SIGNATURE: &str = "io.cncf.notary.timestampSignature";

/// Envelope wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EnvelopeFormat {
    #[default]
    Jws,
    Cose,
}

impl EnvelopeFormat {
    pub fn media_type(&self) -> &'static str {
        match self {
            EnvelopeFormat::Jws => MEDIA_TYPE_JWS,
            EnvelopeFormat::Cose => MEDIA_TYPE_COSE,
        }
    }

    pub fn from_media_type(media_type: &str) -> Result<Self, EnvelopeError> {
        match media_type {
            MEDIA_TYPE_JWS => Ok(EnvelopeFormat::Jws),
            MEDIA_TYPE_COSE => Ok(EnvelopeFormat::Cose),
            other => Err(EnvelopeError::UnsupportedMediaType(other.to_string())),
        }
    }
}

impl FromStr for EnvelopeFormat {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jws" => Ok(EnvelopeFormat::Jws),
            "cose" => Ok(EnvelopeFormat::Cose),
            other => Err(EnvelopeError::UnsupportedMediaType(format!(
                "signature format {other:?} is not supported, use \"jws\" or \"cose\""
            ))),
        }
    }
}

impl fmt::Display for EnvelopeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeFormat::Jws => write!(f, "jws"),
            EnvelopeFormat::Cose => write!(f, "cose"),
        }
    }
}

/// Who vouches for the signing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SigningScheme {
    /// The signer states the signing time.
    #[default]
    X509,
    /// A signing authority states the signing time.
    X509SigningAuthority,
}

impl SigningScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningScheme::X509 => "notary.x509",
            SigningScheme::X509SigningAuthority => "notary.x509.signingAuthority",
        }
    }

    /// The protected header carrying the signing time under this scheme.
    pub(crate) fn signing_time_header(&self) -> &'static str {
        match self {
            SigningScheme::X509 => HEADER_SIGNING_TIME,
            SigningScheme::X509SigningAuthority => HEADER_AUTHENTIC_SIGNING_TIME,
        }
    }
}

impl FromStr for SigningScheme {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notary.x509" => Ok(SigningScheme::X509),
            "notary.x509.signingAuthority" => Ok(SigningScheme::X509SigningAuthority),
            other => Err(EnvelopeError::Malformed(format!(
                "signing scheme {other:?} is not supported"
            ))),
        }
    }
}

impl fmt::Display for SigningScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user defined signed attribute. Critical attributes are listed in the
/// `crit` header and must be understood by verifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedAttribute {
    pub key: String,
    pub value: serde_json::Value,
    pub critical: bool,
}

/// Attributes covered by the signature.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedAttributes {
    pub signing_scheme: SigningScheme,
    pub signing_time: DateTime<Utc>,
    pub expiry: Option<DateTime<Utc>>,
    pub extended_attributes: Vec<ExtendedAttribute>,
}

/// Attributes added next to the signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsignedAttributes {
    /// DER RFC 3161 timestamp token over the signature
    pub timestamp_signature: Option<Vec<u8>>,
    pub signing_agent: Option<String>,
}

/// Everything known about a signature.
#[derive(Debug, Clone)]
pub struct SignerInfo {
    pub signed_attributes: SignedAttributes,
    pub unsigned_attributes: UnsignedAttributes,
    pub signature_algorithm: SignatureAlgorithm,
    /// Leaf first
    pub certificate_chain: Vec<Certificate>,
    pub signature: Vec<u8>,
}

impl SignerInfo {
    pub fn leaf(&self) -> Option<&Certificate> {
        self.certificate_chain.first()
    }
}

/// The signed payload and its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopePayload {
    pub content_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct EnvelopeContent {
    pub payload: EnvelopePayload,
    pub signer_info: SignerInfo,
}

/// What the signer asks to be signed.
#[derive(Debug, Clone)]
pub struct SignRequest {
    pub payload: EnvelopePayload,
    pub signature_algorithm: SignatureAlgorithm,
    pub signing_scheme: SigningScheme,
    pub signing_time: DateTime<Utc>,
    pub expiry: Option<DateTime<Utc>>,
    pub extended_attributes: Vec<ExtendedAttribute>,
}

impl SignRequest {
    pub(crate) fn validate(&self) -> Result<(), EnvelopeError> {
        if self.payload.content_type.is_empty() {
            return Err(EnvelopeError::Malformed(
                "payload content type is empty".to_string(),
            ));
        }
        if self.payload.content.is_empty() {
            return Err(EnvelopeError::Malformed("payload is empty".to_string()));
        }
        if let Some(expiry) = self.expiry {
            if expiry <= self.signing_time {
                return Err(EnvelopeError::Malformed(format!(
                    "expiry {expiry} is not after the signing time {}",
                    self.signing_time
                )));
            }
        }
        for attribute in &self.extended_attributes {
            if attribute.key.is_empty() || is_reserved_header(&attribute.key) {
                return Err(EnvelopeError::Malformed(format!(
                    "extended attribute {:?} is reserved",
                    attribute.key
                )));
            }
        }
        Ok(())
    }

    /// Signing and expiry times have a one second resolution on the wire.
    pub(crate) fn signed_attributes(&self) -> SignedAttributes {
        SignedAttributes {
            signing_scheme: self.signing_scheme,
            signing_time: self.signing_time.trunc_subsecs(0),
            expiry: self.expiry.map(|e| e.trunc_subsecs(0)),
            extended_attributes: self.extended_attributes.clone(),
        }
    }
}

fn is_reserved_header(key: &str) -> bool {
    matches!(
        key,
        "alg" | "cty" | "crit" | "x5c" | "typ" | "kid" | "jku" | "jwk" | "x5u" | "x5t"
    ) || key.starts_with("io.cncf.notary.")
}

/// Protected headers this implementation understands.
pub(crate) fn is_known_critical(key: &str) -> bool {
    matches!(
        key,
        HEADER_SIGNING_SCHEME | HEADER_EXPIRY | HEADER_AUTHENTIC_SIGNING_TIME
    )
}

/// Check the `crit` list: it names the signing scheme, the expiry and the
/// authentic signing time when present, and only headers that are present.
pub(crate) fn validate_critical(
    crit: &[String],
    attributes: &SignedAttributes,
    present: &dyn Fn(&str) -> bool,
) -> Result<(), EnvelopeError> {
    let mut required = vec![HEADER_SIGNING_SCHEME];
    if attributes.expiry.is_some() {
        required.push(HEADER_EXPIRY);
    }
    if attributes.signing_scheme == SigningScheme::X509SigningAuthority {
        required.push(HEADER_AUTHENTIC_SIGNING_TIME);
    }
    for header in required {
        if !crit.iter().any(|c| c == header) {
            return Err(EnvelopeError::InvalidCritical(format!(
                "{header} is missing from the critical headers"
            )));
        }
    }
    for header in crit {
        if !present(header) {
            return Err(EnvelopeError::InvalidCritical(header.clone()));
        }
        let extended = attributes
            .extended_attributes
            .iter()
            .any(|a| &a.key == header && a.critical);
        if !is_known_critical(header) && !extended {
            return Err(EnvelopeError::InvalidCritical(header.clone()));
        }
    }
    Ok(())
}

/// An envelope waiting for its signature.
#[derive(Debug, Clone)]
pub enum UnsignedEnvelope {
    Jws(jws::UnsignedJws),
    Cose(cose::UnsignedCose),
}

impl UnsignedEnvelope {
    pub fn new(format: EnvelopeFormat, request: SignRequest) -> Result<Self, EnvelopeError> {
        request.validate()?;
        Ok(match format {
            EnvelopeFormat::Jws => UnsignedEnvelope::Jws(jws::UnsignedJws::new(&request)?),
            EnvelopeFormat::Cose => UnsignedEnvelope::Cose(cose::UnsignedCose::new(&request)?),
        })
    }

    pub fn format(&self) -> EnvelopeFormat {
        match self {
            UnsignedEnvelope::Jws(_) => EnvelopeFormat::Jws,
            UnsignedEnvelope::Cose(_) => EnvelopeFormat::Cose,
        }
    }

    /// The bytes the signing key must sign.
    pub fn signing_input(&self) -> Result<Vec<u8>, EnvelopeError> {
        match self {
            UnsignedEnvelope::Jws(jws) => Ok(jws.signing_input()),
            UnsignedEnvelope::Cose(cose) => cose.signing_input(),
        }
    }

    /// Serialize the envelope with its signature and certificate chain.
    pub fn seal(
        self,
        signature: Vec<u8>,
        certificate_chain: &[Certificate],
        unsigned: UnsignedAttributes,
    ) -> Result<Vec<u8>, EnvelopeError> {
        if certificate_chain.is_empty() {
            return Err(EnvelopeError::MissingCertChain);
        }
        if signature.is_empty() {
            return Err(EnvelopeError::Malformed("signature is empty".to_string()));
        }
        match self {
            UnsignedEnvelope::Jws(jws) => jws.seal(&signature, certificate_chain, &unsigned),
            UnsignedEnvelope::Cose(cose) => cose.seal(signature, certificate_chain, &unsigned),
        }
    }
}

/// A parsed envelope.
#[derive(Debug, Clone)]
pub struct Envelope {
    format: EnvelopeFormat,
    raw: Vec<u8>,
    content: EnvelopeContent,
    signing_input: Vec<u8>,
}

impl Envelope {
    /// Parse envelope bytes of the given media type.
    pub fn parse(media_type: &str, raw: &[u8]) -> Result<Self, EnvelopeError> {
        Self::parse_format(EnvelopeFormat::from_media_type(media_type)?, raw)
    }

    pub fn parse_format(format: EnvelopeFormat, raw: &[u8]) -> Result<Self, EnvelopeError> {
        let (content, signing_input) = match format {
            EnvelopeFormat::Jws => jws::parse(raw)?,
            EnvelopeFormat::Cose => cose::parse(raw)?,
        };
        if content.signer_info.certificate_chain.is_empty() {
            return Err(EnvelopeError::MissingCertChain);
        }
        if let Some(expiry) = content.signer_info.signed_attributes.expiry {
            if expiry <= content.signer_info.signed_attributes.signing_time {
                return Err(EnvelopeError::Malformed(
                    "expiry is not after the signing time".to_string(),
                ));
            }
        }
        Ok(Envelope {
            format,
            raw: raw.to_vec(),
            content,
            signing_input,
        })
    }

    pub fn format(&self) -> EnvelopeFormat {
        self.format
    }

    pub fn media_type(&self) -> &'static str {
        self.format.media_type()
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The content, without any integrity guarantee.
    pub fn content(&self) -> &EnvelopeContent {
        &self.content
    }

    /// Verify the signature with the leaf certificate and return the
    /// content it protects.
    ///
    /// The algorithm must be the one the leaf key type dictates and the
    /// leaf must be a code signing certificate.
    pub fn verify(&self) -> Result<&EnvelopeContent, EnvelopeError> {
        let signer_info = &self.content.signer_info;
        let leaf = signer_info.leaf().ok_or(EnvelopeError::MissingCertChain)?;

        let expected = KeySpec::from_spki(&leaf.tbs_certificate.subject_public_key_info)?
            .signature_algorithm()?;
        if expected != signer_info.signature_algorithm {
            return Err(EnvelopeError::UnsupportedAlgorithm(format!(
                "envelope algorithm {} does not match the {expected} algorithm of the signing certificate",
                signer_info.signature_algorithm
            )));
        }

        VerificationKey::from_certificate(leaf)?.verify(
            signer_info.signature_algorithm,
            &self.signing_input,
            &signer_info.signature,
        )?;

        verify_code_signing_leaf(leaf)
            .map_err(|e| EnvelopeError::Malformed(format!("invalid signing certificate: {e}")))?;
        Ok(&self.content)
    }

    /// Describe the envelope for inspection. The signature is not verified.
    pub fn summary(&self) -> Result<EnvelopeSummary, EnvelopeError> {
        let signer_info = &self.content.signer_info;
        let attributes = &signer_info.signed_attributes;
        let payload = Payload::from_signed_content(
            &self.content.payload.content_type,
            &self.content.payload.content,
        )
        .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

        let mut signed_attributes = BTreeMap::new();
        signed_attributes.insert(
            "signingScheme".to_string(),
            attributes.signing_scheme.to_string(),
        );
        signed_attributes.insert(
            "signingTime".to_string(),
            attributes.signing_time.to_rfc3339(),
        );
        if let Some(expiry) = attributes.expiry {
            signed_attributes.insert("expiry".to_string(), expiry.to_rfc3339());
        }
        for attribute in &attributes.extended_attributes {
            let value = match &attribute.value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            signed_attributes.insert(attribute.key.clone(), value);
        }

        let mut unsigned_attributes = BTreeMap::new();
        if let Some(agent) = &signer_info.unsigned_attributes.signing_agent {
            unsigned_attributes.insert("signingAgent".to_string(), agent.clone());
        }

        let timestamp = match &signer_info.unsigned_attributes.timestamp_signature {
            Some(token) => Some(
                TimestampToken::parse(token)
                    .and_then(|token| {
                        Ok(TimestampSummary {
                            timestamp: token.gen_time().to_rfc3339(),
                            accuracy_millis: token.accuracy()?.map(|a| a.num_milliseconds()),
                            certificates: token.certificates().iter().map(CertificateSummary::from).collect(),
                        })
                    })
                    .map_err(|e| EnvelopeError::Malformed(e.to_string()))?,
            ),
            None => None,
        };

        Ok(EnvelopeSummary {
            media_type: self.media_type().to_string(),
            digest: Digest::sha256_of(&self.raw).to_string(),
            signature_algorithm: signer_info.signature_algorithm.to_string(),
            signed_attributes,
            user_defined_attributes: payload.user_metadata(),
            unsigned_attributes,
            certificates: signer_info
                .certificate_chain
                .iter()
                .map(CertificateSummary::from)
                .collect(),
            signed_artifact: payload.target_artifact,
            timestamp,
        })
    }
}

/// Human oriented description of an envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeSummary {
    pub media_type: String,
    pub digest: String,
    pub signature_algorithm: String,
    pub signed_attributes: BTreeMap<String, String>,
    pub user_defined_attributes: BTreeMap<String, String>,
    pub unsigned_attributes: BTreeMap<String, String>,
    pub certificates: Vec<CertificateSummary>,
    pub signed_artifact: Descriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificateSummary {
    #[serde(rename = "SHA256Fingerprint")]
    pub sha256_fingerprint: String,
    #[serde(rename = "issuedTo")]
    pub issued_to: String,
    #[serde(rename = "issuedBy")]
    pub issued_by: String,
    pub expiry: String,
}

impl From<&Certificate> for CertificateSummary {
    fn from(cert: &Certificate) -> Self {
        CertificateSummary {
            sha256_fingerprint: fingerprint_sha256(cert),
            issued_to: subject_string(cert),
            issued_by: issuer_string(cert),
            expiry: not_after(cert).to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampSummary {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_millis: Option<i64>,
    pub certificates: Vec<CertificateSummary>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crypto::tests::*;
    use crate::descriptor::MEDIA_TYPE_PAYLOAD_V1;
    use chrono::TimeDelta;
    use rstest::rstest;

    pub(crate) fn sample_payload() -> EnvelopePayload {
        let payload = Payload::new(Descriptor::new(
            "application/x.test",
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
                .parse()
                .unwrap(),
            0,
        ));
        EnvelopePayload {
            content_type: MEDIA_TYPE_PAYLOAD_V1.to_string(),
            content: payload.to_canonical_json().unwrap(),
        }
    }

    pub(crate) fn sample_request(algorithm: SignatureAlgorithm) -> SignRequest {
        SignRequest {
            payload: sample_payload(),
            signature_algorithm: algorithm,
            signing_scheme: SigningScheme::X509,
            signing_time: Utc::now(),
            expiry: None,
            extended_attributes: vec![],
        }
    }

    /// Sign `request` with the leaf of `chain`.
    pub(crate) fn sign_envelope(
        format: EnvelopeFormat,
        request: SignRequest,
        leaf: &CertData,
        chain: &[Certificate],
        unsigned: UnsignedAttributes,
    ) -> Vec<u8> {
        let unsigned_envelope = UnsignedEnvelope::new(format, request).unwrap();
        let signature = leaf
            .signing_key()
            .sign_bytes(&unsigned_envelope.signing_input().unwrap())
            .unwrap();
        unsigned_envelope.seal(signature, chain, unsigned).unwrap()
    }

    #[rstest]
    #[case(EnvelopeFormat::Jws)]
    #[case(EnvelopeFormat::Cose)]
    fn sign_parse_verify(#[case] format: EnvelopeFormat) {
        let (root, leaf) = generate_chain();
        let chain = vec![leaf.x509(), root.x509()];
        let mut request = sample_request(SignatureAlgorithm::ECDSA_SHA256);
        request.expiry = Some(request.signing_time + TimeDelta::try_hours(1).unwrap());
        request.extended_attributes = vec![ExtendedAttribute {
            key: "buildId".to_string(),
            value: serde_json::json!("42"),
            critical: true,
        }];
        let unsigned = UnsignedAttributes {
            timestamp_signature: None,
            signing_agent: Some("notation-rs/0.1.0".to_string()),
        };
        let bytes = sign_envelope(format, request.clone(), &leaf, &chain, unsigned.clone());

        let envelope = Envelope::parse(format.media_type(), &bytes).unwrap();
        let content = envelope.verify().unwrap();
        assert_eq!(content.payload, request.payload);
        assert_eq!(content.signer_info.certificate_chain, chain);
        assert_eq!(content.signer_info.unsigned_attributes, unsigned);
        assert_eq!(
            content.signer_info.signed_attributes,
            request.signed_attributes()
        );
    }

    #[rstest]
    #[case(EnvelopeFormat::Jws)]
    #[case(EnvelopeFormat::Cose)]
    fn wrong_key_fails_integrity(#[case] format: EnvelopeFormat) {
        let (root, leaf) = generate_chain();
        let other = generate_certificate(Some(&root), CertGenerationOptions::default()).unwrap();
        // signed by `other` but carrying the chain of `leaf`
        let bytes = sign_envelope(
            format,
            sample_request(SignatureAlgorithm::ECDSA_SHA256),
            &other,
            &[leaf.x509(), root.x509()],
            UnsignedAttributes::default(),
        );
        let envelope = Envelope::parse(format.media_type(), &bytes).unwrap();
        assert!(matches!(
            envelope.verify(),
            Err(EnvelopeError::IntegrityFailed(_))
        ));
    }

    #[rstest]
    #[case(EnvelopeFormat::Jws)]
    #[case(EnvelopeFormat::Cose)]
    fn algorithm_must_follow_the_leaf_key(#[case] format: EnvelopeFormat) {
        let (root, leaf) = generate_chain();
        let unsigned_envelope =
            UnsignedEnvelope::new(format, sample_request(SignatureAlgorithm::ECDSA_SHA384))
                .unwrap();
        let bytes = unsigned_envelope
            .seal(vec![1; 96], &[leaf.x509(), root.x509()], UnsignedAttributes::default())
            .unwrap();
        let envelope = Envelope::parse(format.media_type(), &bytes).unwrap();
        assert!(matches!(
            envelope.verify(),
            Err(EnvelopeError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn seal_requires_a_chain() {
        let unsigned_envelope = UnsignedEnvelope::new(
            EnvelopeFormat::Jws,
            sample_request(SignatureAlgorithm::ECDSA_SHA256),
        )
        .unwrap();
        assert_eq!(
            unsigned_envelope
                .seal(vec![1; 64], &[], UnsignedAttributes::default())
                .unwrap_err(),
            EnvelopeError::MissingCertChain
        );
    }

    #[test]
    fn expiry_must_follow_signing_time() {
        let mut request = sample_request(SignatureAlgorithm::ECDSA_SHA256);
        request.expiry = Some(request.signing_time - TimeDelta::try_seconds(1).unwrap());
        assert!(UnsignedEnvelope::new(EnvelopeFormat::Jws, request).is_err());
    }

    #[test]
    fn reserved_extended_attributes() {
        let mut request = sample_request(SignatureAlgorithm::ECDSA_SHA256);
        request.extended_attributes = vec![ExtendedAttribute {
            key: HEADER_EXPIRY.to_string(),
            value: serde_json::json!("x"),
            critical: false,
        }];
        assert!(UnsignedEnvelope::new(EnvelopeFormat::Cose, request).is_err());
    }

    #[rstest]
    #[case("jws", Ok(EnvelopeFormat::Jws))]
    #[case("cose", Ok(EnvelopeFormat::Cose))]
    #[case("JWS", Err(()))]
    #[case("pgp", Err(()))]
    fn format_names(#[case] name: &str, #[case] expected: Result<EnvelopeFormat, ()>) {
        assert_eq!(name.parse::<EnvelopeFormat>().map_err(|_| ()), expected);
    }

    #[test]
    fn unknown_media_type() {
        assert!(matches!(
            Envelope::parse("application/pgp-signature", b"x"),
            Err(EnvelopeError::UnsupportedMediaType(_))
        ));
    }

    #[test]
    fn summary() {
        let (root, leaf) = generate_chain();
        let bytes = sign_envelope(
            EnvelopeFormat::Jws,
            sample_request(SignatureAlgorithm::ECDSA_SHA256),
            &leaf,
            &[leaf.x509(), root.x509()],
            UnsignedAttributes {
                timestamp_signature: None,
                signing_agent: Some("agent".to_string()),
            },
        );
        let envelope = Envelope::parse(MEDIA_TYPE_JWS, &bytes).unwrap();
        let summary = envelope.summary().unwrap();
        assert_eq!(summary.media_type, MEDIA_TYPE_JWS);
        assert_eq!(summary.signature_algorithm, "ECDSA-SHA-256");
        assert_eq!(summary.certificates.len(), 2);
        assert_eq!(summary.certificates[0].issued_to, subject_string(&leaf.x509()));
        assert_eq!(summary.signed_artifact.media_type, "application/x.test");
        assert_eq!(summary.unsigned_attributes["signingAgent"], "agent");
        assert_eq!(summary.signed_attributes["signingScheme"], "notary.x509");
        assert!(summary.timestamp.is_none());
        assert_eq!(summary.digest, Digest::sha256_of(&bytes).to_string());
    }
}
