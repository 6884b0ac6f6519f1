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

//! Flattened JWS JSON serialization.
//!
//! ```json
//! {
//!   "payload": "<base64url payload>",
//!   "protected": "<base64url protected header>",
//!   "header": {
//!     "x5c": ["<base64 DER leaf>", "..."],
//!     "io.cncf.notary.signingAgent": "...",
//!     "io.cncf.notary.timestampSignature": "<base64 DER token>"
//!   },
//!   "signature": "<base64url signature>"
//! }
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

use super::{
    validate_critical, EnvelopeContent, EnvelopePayload, ExtendedAttribute, SignRequest,
    SignedAttributes, SignerInfo, SigningScheme, UnsignedAttributes, HEADER_AUTHENTIC_SIGNING_TIME,
    HEADER_EXPIRY, HEADER_SIGNING_SCHEME, HEADER_SIGNING_TIME,
};
use crate::crypto::SignatureAlgorithm;
use crate::errors::EnvelopeError;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProtectedHeader {
    alg: String,
    cty: String,
    #[serde(default)]
    crit: Vec<String>,
    #[serde(rename = "io.cncf.notary.signingScheme")]
    signing_scheme: String,
    #[serde(
        rename = "io.cncf.notary.signingTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    signing_time: Option<DateTime<Utc>>,
    #[serde(
        rename = "io.cncf.notary.authenticSigningTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    authentic_signing_time: Option<DateTime<Utc>>,
    #[serde(
        rename = "io.cncf.notary.expiry",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    expiry: Option<DateTime<Utc>>,
    #[serde(flatten)]
    extended: serde_json::Map<String, serde_json::Value>,
}

impl ProtectedHeader {
    fn has(&self, key: &str) -> bool {
        match key {
            HEADER_SIGNING_SCHEME => true,
            HEADER_SIGNING_TIME => self.signing_time.is_some(),
            HEADER_AUTHENTIC_SIGNING_TIME => self.authentic_signing_time.is_some(),
            HEADER_EXPIRY => self.expiry.is_some(),
            other => self.extended.contains_key(other),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UnprotectedHeader {
    #[serde_as(as = "Vec<Base64>")]
    #[serde(default)]
    x5c: Vec<Vec<u8>>,
    #[serde(
        rename = "io.cncf.notary.signingAgent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    signing_agent: Option<String>,
    #[serde_as(as = "Option<Base64>")]
    #[serde(
        rename = "io.cncf.notary.timestampSignature",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    timestamp_signature: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JwsEnvelope {
    payload: String,
    protected: String,
    header: UnprotectedHeader,
    signature: String,
}

/// A JWS envelope waiting for its signature.
#[derive(Debug, Clone)]
pub struct UnsignedJws {
    protected: String,
    payload: String,
}

impl UnsignedJws {
    pub(super) fn new(request: &SignRequest) -> Result<Self, EnvelopeError> {
        let attributes = request.signed_attributes();
        let mut crit = vec![HEADER_SIGNING_SCHEME.to_string()];
        if attributes.signing_scheme == SigningScheme::X509SigningAuthority {
            crit.push(HEADER_AUTHENTIC_SIGNING_TIME.to_string());
        }
        if attributes.expiry.is_some() {
            crit.push(HEADER_EXPIRY.to_string());
        }

        let mut extended = serde_json::Map::new();
        for attribute in &attributes.extended_attributes {
            if attribute.critical {
                crit.push(attribute.key.clone());
            }
            extended.insert(attribute.key.clone(), attribute.value.clone());
        }

        let (signing_time, authentic_signing_time) = match attributes.signing_scheme {
            SigningScheme::X509 => (Some(attributes.signing_time), None),
            SigningScheme::X509SigningAuthority => (None, Some(attributes.signing_time)),
        };
        let header = ProtectedHeader {
            alg: request.signature_algorithm.jws_name().to_string(),
            cty: request.payload.content_type.clone(),
            crit,
            signing_scheme: attributes.signing_scheme.to_string(),
            signing_time,
            authentic_signing_time,
            expiry: attributes.expiry,
            extended,
        };
        let header_json = serde_json::to_vec(&header)
            .map_err(|e| EnvelopeError::SerializationFailed(e.to_string()))?;

        Ok(UnsignedJws {
            protected: BASE64_URL.encode(header_json),
            payload: BASE64_URL.encode(&request.payload.content),
        })
    }

    pub(super) fn signing_input(&self) -> Vec<u8> {
        format!("{}.{}", self.protected, self.payload).into_bytes()
    }

    pub(super) fn seal(
        self,
        signature: &[u8],
        certificate_chain: &[Certificate],
        unsigned: &UnsignedAttributes,
    ) -> Result<Vec<u8>, EnvelopeError> {
        let x5c = certificate_chain
            .iter()
            .map(|cert| cert.to_der())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EnvelopeError::SerializationFailed(e.to_string()))?;
        let envelope = JwsEnvelope {
            payload: self.payload,
            protected: self.protected,
            header: UnprotectedHeader {
                x5c,
                signing_agent: unsigned.signing_agent.clone(),
                timestamp_signature: unsigned.timestamp_signature.clone(),
            },
            signature: BASE64_URL.encode(signature),
        };
        serde_json::to_vec(&envelope).map_err(|e| EnvelopeError::SerializationFailed(e.to_string()))
    }
}

fn decode_b64url(field: &str, value: &str) -> Result<Vec<u8>, EnvelopeError> {
    BASE64_URL
        .decode(value)
        .map_err(|e| EnvelopeError::Malformed(format!("{field} is not base64url encoded: {e}")))
}

/// Parse a JWS envelope, returning its content and the signing input.
pub(super) fn parse(raw: &[u8]) -> Result<(EnvelopeContent, Vec<u8>), EnvelopeError> {
    let envelope: JwsEnvelope = serde_json::from_slice(raw)
        .map_err(|e| EnvelopeError::Malformed(format!("invalid JWS envelope: {e}")))?;

    let header: ProtectedHeader = serde_json::from_slice(&decode_b64url(
        "protected header",
        &envelope.protected,
    )?)
    .map_err(|e| EnvelopeError::Malformed(format!("invalid protected header: {e}")))?;
    let payload = decode_b64url("payload", &envelope.payload)?;
    let signature = decode_b64url("signature", &envelope.signature)?;

    let signature_algorithm = SignatureAlgorithm::from_jws_name(&header.alg)?;
    let signing_scheme: SigningScheme = header.signing_scheme.parse()?;
    let signing_time = match signing_scheme {
        SigningScheme::X509 => header.signing_time,
        SigningScheme::X509SigningAuthority => header.authentic_signing_time,
    }
    .ok_or_else(|| {
        EnvelopeError::Malformed(format!(
            "{} header is missing",
            signing_scheme.signing_time_header()
        ))
    })?;

    let extended_attributes = header
        .extended
        .iter()
        .map(|(key, value)| ExtendedAttribute {
            key: key.clone(),
            value: value.clone(),
            critical: header.crit.contains(key),
        })
        .collect();
    let signed_attributes = SignedAttributes {
        signing_scheme,
        signing_time,
        expiry: header.expiry,
        extended_attributes,
    };
    validate_critical(&header.crit, &signed_attributes, &|key| header.has(key))?;

    let certificate_chain = envelope
        .header
        .x5c
        .iter()
        .map(|der| Certificate::from_der(der))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| EnvelopeError::Malformed(format!("invalid x5c certificate: {e}")))?;

    let signing_input = format!("{}.{}", envelope.protected, envelope.payload).into_bytes();
    Ok((
        EnvelopeContent {
            payload: EnvelopePayload {
                content_type: header.cty,
                content: payload,
            },
            signer_info: SignerInfo {
                signed_attributes,
                unsigned_attributes: UnsignedAttributes {
                    timestamp_signature: envelope.header.timestamp_signature,
                    signing_agent: envelope.header.signing_agent,
                },
                signature_algorithm,
                certificate_chain,
                signature,
            },
        },
        signing_input,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::tests::*;
    use crate::envelope::tests::{sample_request, sign_envelope};
    use crate::envelope::{Envelope, EnvelopeFormat};
    use assert_json_diff::assert_json_include;
    use serde_json::json;

    fn protected_of(bytes: &[u8]) -> serde_json::Value {
        let envelope: serde_json::Value = serde_json::from_slice(bytes).unwrap();
        let protected = BASE64_URL
            .decode(envelope["protected"].as_str().unwrap())
            .unwrap();
        serde_json::from_slice(&protected).unwrap()
    }

    fn reseal(bytes: &[u8], protected: &serde_json::Value) -> Vec<u8> {
        let mut envelope: serde_json::Value = serde_json::from_slice(bytes).unwrap();
        envelope["protected"] = json!(BASE64_URL.encode(serde_json::to_vec(protected).unwrap()));
        serde_json::to_vec(&envelope).unwrap()
    }

    #[test]
    fn wire_layout() {
        let (root, leaf) = generate_chain();
        let request = sample_request(SignatureAlgorithm::ECDSA_SHA256);
        let bytes = sign_envelope(
            EnvelopeFormat::Jws,
            request.clone(),
            &leaf,
            &[leaf.x509(), root.x509()],
            UnsignedAttributes {
                timestamp_signature: Some(vec![1, 2, 3]),
                signing_agent: Some("agent".into()),
            },
        );

        let envelope: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_json_include!(
            actual: envelope["header"].clone(),
            expected: json!({
                "io.cncf.notary.signingAgent": "agent",
                "io.cncf.notary.timestampSignature": "AQID",
            })
        );
        assert_eq!(envelope["header"]["x5c"].as_array().unwrap().len(), 2);
        assert_eq!(
            BASE64_URL
                .decode(envelope["payload"].as_str().unwrap())
                .unwrap(),
            request.payload.content
        );
        // r || s for P-256
        assert_eq!(
            BASE64_URL
                .decode(envelope["signature"].as_str().unwrap())
                .unwrap()
                .len(),
            64
        );

        assert_json_include!(
            actual: protected_of(&bytes),
            expected: json!({
                "alg": "ES256",
                "cty": "application/vnd.cncf.notary.payload.v1+json",
                "crit": ["io.cncf.notary.signingScheme"],
                "io.cncf.notary.signingScheme": "notary.x509",
            })
        );
        assert!(protected_of(&bytes)["io.cncf.notary.signingTime"].is_string());
    }

    #[test]
    fn signing_authority_uses_authentic_signing_time() {
        let (root, leaf) = generate_chain();
        let mut request = sample_request(SignatureAlgorithm::ECDSA_SHA256);
        request.signing_scheme = SigningScheme::X509SigningAuthority;
        let bytes = sign_envelope(
            EnvelopeFormat::Jws,
            request,
            &leaf,
            &[leaf.x509(), root.x509()],
            UnsignedAttributes::default(),
        );
        let protected = protected_of(&bytes);
        assert!(protected.get("io.cncf.notary.signingTime").is_none());
        assert!(protected["io.cncf.notary.authenticSigningTime"].is_string());
        assert_eq!(
            protected["crit"],
            json!([
                "io.cncf.notary.signingScheme",
                "io.cncf.notary.authenticSigningTime"
            ])
        );
        assert!(Envelope::parse_format(EnvelopeFormat::Jws, &bytes).is_ok());
    }

    #[test]
    fn unknown_critical_header() {
        let (root, leaf) = generate_chain();
        let bytes = sign_envelope(
            EnvelopeFormat::Jws,
            sample_request(SignatureAlgorithm::ECDSA_SHA256),
            &leaf,
            &[leaf.x509(), root.x509()],
            UnsignedAttributes::default(),
        );

        let mut protected = protected_of(&bytes);
        protected["crit"] = json!(["io.cncf.notary.signingScheme", "io.example.unknown"]);
        let tampered = reseal(&bytes, &protected);
        assert_eq!(
            Envelope::parse_format(EnvelopeFormat::Jws, &tampered).unwrap_err(),
            EnvelopeError::InvalidCritical("io.example.unknown".to_string())
        );

        protected["crit"] = json!([]);
        let tampered = reseal(&bytes, &protected);
        assert!(matches!(
            Envelope::parse_format(EnvelopeFormat::Jws, &tampered),
            Err(EnvelopeError::InvalidCritical(_))
        ));
    }

    #[test]
    fn tampered_protected_header_breaks_integrity() {
        let (root, leaf) = generate_chain();
        let bytes = sign_envelope(
            EnvelopeFormat::Jws,
            sample_request(SignatureAlgorithm::ECDSA_SHA256),
            &leaf,
            &[leaf.x509(), root.x509()],
            UnsignedAttributes::default(),
        );
        let mut protected = protected_of(&bytes);
        protected["io.cncf.notary.signingTime"] = json!("2001-01-01T00:00:00Z");
        let tampered = reseal(&bytes, &protected);
        let envelope = Envelope::parse_format(EnvelopeFormat::Jws, &tampered).unwrap();
        assert!(matches!(
            envelope.verify(),
            Err(EnvelopeError::IntegrityFailed(_))
        ));
    }

    #[test]
    fn malformed_input() {
        assert!(matches!(
            Envelope::parse_format(EnvelopeFormat::Jws, b"{}"),
            Err(EnvelopeError::Malformed(_))
        ));
        assert!(matches!(
            Envelope::parse_format(
                EnvelopeFormat::Jws,
                br#"{"payload":"e30","protected":"!!","header":{},"signature":"AA"}"#
            ),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn unsupported_algorithm() {
        let (root, leaf) = generate_chain();
        let bytes = sign_envelope(
            EnvelopeFormat::Jws,
            sample_request(SignatureAlgorithm::ECDSA_SHA256),
            &leaf,
            &[leaf.x509(), root.x509()],
            UnsignedAttributes::default(),
        );
        let mut protected = protected_of(&bytes);
        protected["alg"] = json!("RS256");
        let tampered = reseal(&bytes, &protected);
        assert_eq!(
            Envelope::parse_format(EnvelopeFormat::Jws, &tampered).unwrap_err(),
            EnvelopeError::UnsupportedAlgorithm("RS256".to_string())
        );
    }

    #[test]
    fn empty_chain() {
        let (root, leaf) = generate_chain();
        let bytes = sign_envelope(
            EnvelopeFormat::Jws,
            sample_request(SignatureAlgorithm::ECDSA_SHA256),
            &leaf,
            &[leaf.x509(), root.x509()],
            UnsignedAttributes::default(),
        );
        let mut envelope: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        envelope["header"]["x5c"] = json!([]);
        assert_eq!(
            Envelope::parse_format(EnvelopeFormat::Jws, &serde_json::to_vec(&envelope).unwrap())
                .unwrap_err(),
            EnvelopeError::MissingCertChain
        );
    }
}
