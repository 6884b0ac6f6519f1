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

//! Tagged `COSE_Sign1` envelopes (RFC 9052).
//!
//! Times are CBOR tag 1 epoch seconds. The certificate chain is the
//! `x5chain` (33) unprotected header.

use chrono::{DateTime, TimeZone, Utc};
use ciborium::Value;
use coset::{
    CoseSign1, CoseSign1Builder, Header, HeaderBuilder, Label, RegisteredLabel,
    RegisteredLabelWithPrivate, TaggedCborSerializable,
};
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

use super::{
    validate_critical, EnvelopeContent, EnvelopePayload, ExtendedAttribute,
    SignRequest, SignedAttributes, SignerInfo, SigningScheme, UnsignedAttributes,
    HEADER_AUTHENTIC_SIGNING_TIME, HEADER_EXPIRY, HEADER_SIGNING_AGENT, HEADER_SIGNING_SCHEME,
    HEADER_SIGNING_TIME, HEADER_TIMESTAMP_SIGNATURE,
};
use crate::crypto::SignatureAlgorithm;
use crate::errors::EnvelopeError;

/// `x5chain` header label.
const LABEL_X5CHAIN: i64 = 33;

/// CBOR tag of epoch based date/time.
const TAG_EPOCH_DATETIME: u64 = 1;

fn epoch_time(time: DateTime<Utc>) -> Value {
    Value::Tag(
        TAG_EPOCH_DATETIME,
        Box::new(Value::Integer(time.timestamp().into())),
    )
}

fn parse_epoch_time(header: &str, value: &Value) -> Result<DateTime<Utc>, EnvelopeError> {
    let invalid = || EnvelopeError::Malformed(format!("{header} is not an epoch date/time"));
    let seconds = match value {
        Value::Tag(TAG_EPOCH_DATETIME, inner) => match inner.as_ref() {
            Value::Integer(i) => i64::try_from(*i).map_err(|_| invalid())?,
            Value::Float(f) => f.trunc() as i64,
            _ => return Err(invalid()),
        },
        _ => return Err(invalid()),
    };
    Utc.timestamp_opt(seconds, 0).single().ok_or_else(invalid)
}

fn text_label(key: &str) -> RegisteredLabel<coset::iana::HeaderParameter> {
    RegisteredLabel::Text(key.to_string())
}

/// A COSE envelope waiting for its signature.
#[derive(Debug, Clone)]
pub struct UnsignedCose {
    protected: Header,
    payload: Vec<u8>,
}

impl UnsignedCose {
    pub(super) fn new(request: &SignRequest) -> Result<Self, EnvelopeError> {
        let attributes = request.signed_attributes();
        let mut builder = HeaderBuilder::new()
            .algorithm(request.signature_algorithm.cose_algorithm())
            .content_type(request.payload.content_type.clone())
            .add_critical_label(text_label(HEADER_SIGNING_SCHEME))
            .text_value(
                HEADER_SIGNING_SCHEME.to_string(),
                Value::Text(attributes.signing_scheme.to_string()),
            )
            .text_value(
                attributes.signing_scheme.signing_time_header().to_string(),
                epoch_time(attributes.signing_time),
            );
        if attributes.signing_scheme == SigningScheme::X509SigningAuthority {
            builder = builder.add_critical_label(text_label(HEADER_AUTHENTIC_SIGNING_TIME));
        }
        if let Some(expiry) = attributes.expiry {
            builder = builder
                .add_critical_label(text_label(HEADER_EXPIRY))
                .text_value(HEADER_EXPIRY.to_string(), epoch_time(expiry));
        }
        for attribute in &attributes.extended_attributes {
            let value = Value::serialized(&attribute.value)
                .map_err(|e| EnvelopeError::SerializationFailed(e.to_string()))?;
            if attribute.critical {
                builder = builder.add_critical_label(text_label(&attribute.key));
            }
            builder = builder.text_value(attribute.key.clone(), value);
        }

        Ok(UnsignedCose {
            protected: builder.build(),
            payload: request.payload.content.clone(),
        })
    }

    fn builder(&self) -> CoseSign1Builder {
        CoseSign1Builder::new()
            .protected(self.protected.clone())
            .payload(self.payload.clone())
    }

    pub(super) fn signing_input(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(self.builder().build().tbs_data(&[]))
    }

    pub(super) fn seal(
        self,
        signature: Vec<u8>,
        certificate_chain: &[Certificate],
        unsigned: &UnsignedAttributes,
    ) -> Result<Vec<u8>, EnvelopeError> {
        let chain = certificate_chain
            .iter()
            .map(|cert| cert.to_der().map(Value::Bytes))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EnvelopeError::SerializationFailed(e.to_string()))?;

        let mut unprotected = HeaderBuilder::new().value(LABEL_X5CHAIN, Value::Array(chain));
        if let Some(agent) = &unsigned.signing_agent {
            unprotected =
                unprotected.text_value(HEADER_SIGNING_AGENT.to_string(), Value::Text(agent.clone()));
        }
        if let Some(token) = &unsigned.timestamp_signature {
            unprotected = unprotected.text_value(
                HEADER_TIMESTAMP_SIGNATURE.to_string(),
                Value::Bytes(token.clone()),
            );
        }

        self.builder()
            .unprotected(unprotected.build())
            .signature(signature)
            .build()
            .to_tagged_vec()
            .map_err(|e| EnvelopeError::SerializationFailed(e.to_string()))
    }
}

fn find_text<'a>(header: &'a Header, key: &str) -> Option<&'a Value> {
    header.rest.iter().find_map(|(label, value)| match label {
        Label::Text(text) if text == key => Some(value),
        _ => None,
    })
}

fn find_int(header: &Header, key: i64) -> Option<&Value> {
    header.rest.iter().find_map(|(label, value)| match label {
        Label::Int(int) if *int == key => Some(value),
        _ => None,
    })
}

/// Parse a tagged `COSE_Sign1`, returning its content and the signing input.
pub(super) fn parse(raw: &[u8]) -> Result<(EnvelopeContent, Vec<u8>), EnvelopeError> {
    let sign1 = CoseSign1::from_tagged_slice(raw)
        .map_err(|e| EnvelopeError::Malformed(format!("invalid COSE_Sign1: {e}")))?;
    let protected = &sign1.protected.header;

    let signature_algorithm = match &protected.alg {
        Some(RegisteredLabelWithPrivate::Assigned(alg)) => {
            SignatureAlgorithm::from_cose_algorithm(*alg)?
        }
        Some(other) => {
            return Err(EnvelopeError::UnsupportedAlgorithm(format!("{other:?}")));
        }
        None => return Err(EnvelopeError::Malformed("algorithm header is missing".into())),
    };

    let content_type = match &protected.content_type {
        Some(RegisteredLabel::Text(text)) => text.clone(),
        Some(other) => {
            return Err(EnvelopeError::Malformed(format!(
                "content type {other:?} is not a media type"
            )))
        }
        None => return Err(EnvelopeError::Malformed("content type header is missing".into())),
    };

    let signing_scheme: SigningScheme = match find_text(protected, HEADER_SIGNING_SCHEME) {
        Some(Value::Text(scheme)) => scheme.parse()?,
        _ => {
            return Err(EnvelopeError::Malformed(format!(
                "{HEADER_SIGNING_SCHEME} header is missing"
            )))
        }
    };
    let time_header = signing_scheme.signing_time_header();
    let signing_time = find_text(protected, time_header)
        .ok_or_else(|| EnvelopeError::Malformed(format!("{time_header} header is missing")))
        .and_then(|value| parse_epoch_time(time_header, value))?;
    let expiry = find_text(protected, HEADER_EXPIRY)
        .map(|value| parse_epoch_time(HEADER_EXPIRY, value))
        .transpose()?;

    let mut crit = Vec::with_capacity(protected.crit.len());
    for label in &protected.crit {
        match label {
            RegisteredLabel::Text(text) => crit.push(text.clone()),
            other => return Err(EnvelopeError::InvalidCritical(format!("{other:?}"))),
        }
    }

    let mut extended_attributes = Vec::new();
    for (label, value) in &protected.rest {
        let Label::Text(key) = label else {
            continue;
        };
        if matches!(
            key.as_str(),
            HEADER_SIGNING_SCHEME | HEADER_SIGNING_TIME | HEADER_AUTHENTIC_SIGNING_TIME | HEADER_EXPIRY
        ) {
            continue;
        }
        let value = value
            .deserialized::<serde_json::Value>()
            .map_err(|e| EnvelopeError::Malformed(format!("invalid attribute {key:?}: {e}")))?;
        extended_attributes.push(ExtendedAttribute {
            key: key.clone(),
            value,
            critical: crit.contains(key),
        });
    }

    let signed_attributes = SignedAttributes {
        signing_scheme,
        signing_time,
        expiry,
        extended_attributes,
    };
    validate_critical(&crit, &signed_attributes, &|key| {
        find_text(protected, key).is_some()
    })?;

    let unprotected = &sign1.unprotected;
    let certificate_chain = match find_int(unprotected, LABEL_X5CHAIN) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Bytes(der) => Certificate::from_der(der)
                    .map_err(|e| EnvelopeError::Malformed(format!("invalid x5chain certificate: {e}"))),
                _ => Err(EnvelopeError::Malformed("x5chain entry is not a byte string".into())),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(Value::Bytes(der)) => vec![Certificate::from_der(der)
            .map_err(|e| EnvelopeError::Malformed(format!("invalid x5chain certificate: {e}")))?],
        Some(_) => return Err(EnvelopeError::Malformed("x5chain has an invalid type".into())),
        None => Vec::new(),
    };
    let signing_agent = match find_text(unprotected, HEADER_SIGNING_AGENT) {
        Some(Value::Text(agent)) => Some(agent.clone()),
        Some(_) => return Err(EnvelopeError::Malformed("signing agent is not a string".into())),
        None => None,
    };
    let timestamp_signature = match find_text(unprotected, HEADER_TIMESTAMP_SIGNATURE) {
        Some(Value::Bytes(token)) => Some(token.clone()),
        Some(_) => {
            return Err(EnvelopeError::Malformed(
                "timestamp signature is not a byte string".into(),
            ))
        }
        None => None,
    };

    let payload = sign1
        .payload
        .clone()
        .ok_or_else(|| EnvelopeError::Malformed("COSE_Sign1 payload is detached".into()))?;
    let signing_input = sign1.tbs_data(&[]);
    Ok((
        EnvelopeContent {
            payload: EnvelopePayload {
                content_type,
                content: payload,
            },
            signer_info: SignerInfo {
                signed_attributes,
                unsigned_attributes: UnsignedAttributes {
                    timestamp_signature,
                    signing_agent,
                },
                signature_algorithm,
                certificate_chain,
                signature: sign1.signature,
            },
        },
        signing_input,
    ))
}
