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

//! Reading X.509 certificates and checking the properties signing and
//! timestamping certificates must have.

use std::path::Path;

use chrono::{DateTime, Utc};
use const_oid::db::rfc5280::{ID_KP_CODE_SIGNING, ID_KP_TIME_STAMPING};
use const_oid::ObjectIdentifier;
use sha2::{Digest, Sha256};
use x509_cert::der::{Decode, Encode, Tag, Tagged};
use x509_cert::ext::pkix::{constraints::BasicConstraints, ExtendedKeyUsage, KeyUsage};
use x509_cert::name::Name;
use x509_cert::time::Time;
use x509_cert::Certificate;

use crate::errors::{ChainError, IoError, NotationError, Result};

const PEM_CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Parse PEM (one or more concatenated blocks) or DER certificates.
///
/// Empty input, PEM blocks of another type and trailing garbage are rejected.
pub fn read_certificates(data: &[u8]) -> std::result::Result<Vec<Certificate>, ChainError> {
    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ChainError::Malformed("no certificate found".to_string()));
    }

    let looks_like_pem = data
        .windows(b"-----BEGIN".len())
        .any(|w| w == b"-----BEGIN");
    if !looks_like_pem {
        let cert = Certificate::from_der(data)
            .map_err(|e| ChainError::Malformed(format!("invalid DER certificate: {e}")))?;
        return Ok(vec![cert]);
    }

    let blocks = pem::parse_many(data)
        .map_err(|e| ChainError::Malformed(format!("invalid PEM data: {e}")))?;
    if blocks.is_empty() {
        return Err(ChainError::Malformed("no certificate found".to_string()));
    }
    blocks
        .iter()
        .map(|block| {
            if block.tag() != PEM_CERTIFICATE_LABEL {
                return Err(ChainError::Malformed(format!(
                    "unexpected PEM block {:?}",
                    block.tag()
                )));
            }
            Certificate::from_der(block.contents())
                .map_err(|e| ChainError::Malformed(format!("invalid certificate: {e}")))
        })
        .collect()
}

/// Read every certificate stored in `path`.
pub fn read_certificate_file(path: &Path) -> Result<Vec<Certificate>> {
    let data = std::fs::read(path)
        .map_err(|e| NotationError::from(IoError::from_io(&e, &path.display().to_string())))?;
    read_certificates(&data).map_err(|e| match e {
        ChainError::Malformed(reason) => {
            ChainError::Malformed(format!("{}: {reason}", path.display())).into()
        }
        other => other.into(),
    })
}

/// PEM encoding of a certificate.
pub fn to_pem(cert: &Certificate) -> std::result::Result<String, ChainError> {
    let der = cert
        .to_der()
        .map_err(|e| ChainError::Malformed(e.to_string()))?;
    Ok(pem::encode(&pem::Pem::new(PEM_CERTIFICATE_LABEL, der)))
}

/// Lowercase hex SHA-256 of the DER encoding.
pub fn fingerprint_sha256(cert: &Certificate) -> String {
    let der = cert.to_der().unwrap_or_default();
    hex::encode(Sha256::digest(der))
}

pub fn to_datetime(time: &Time) -> DateTime<Utc> {
    time.to_system_time().into()
}

pub fn not_before(cert: &Certificate) -> DateTime<Utc> {
    to_datetime(&cert.tbs_certificate.validity.not_before)
}

pub fn not_after(cert: &Certificate) -> DateTime<Utc> {
    to_datetime(&cert.tbs_certificate.validity.not_after)
}

/// Check `notBefore <= at <= notAfter`.
pub fn verify_validity_at(
    cert: &Certificate,
    at: DateTime<Utc>,
) -> std::result::Result<(), ChainError> {
    let not_before = not_before(cert);
    if at < not_before {
        return Err(ChainError::NotYetValid {
            subject: subject_string(cert),
            not_before: not_before.to_rfc3339(),
        });
    }
    let not_after = not_after(cert);
    if at > not_after {
        return Err(ChainError::Expired {
            subject: subject_string(cert),
            not_after: not_after.to_rfc3339(),
        });
    }
    Ok(())
}

/// Short names of the attribute types rendered by [`name_to_string`].
fn attribute_short_name(oid: &ObjectIdentifier) -> Option<&'static str> {
    use const_oid::db::rfc4519::{
        C, CN, DC, L, O, OU, SERIAL_NUMBER, ST, STREET, UID,
    };
    use const_oid::db::rfc3280::EMAIL_ADDRESS as ID_EMAIL_ADDRESS;
    Some(match *oid {
        CN => "CN",
        C => "C",
        L => "L",
        ST => "ST",
        O => "O",
        OU => "OU",
        STREET => "STREET",
        DC => "DC",
        UID => "UID",
        SERIAL_NUMBER => "SERIALNUMBER",
        ID_EMAIL_ADDRESS => "E",
        _ => return None,
    })
}

/// The attributes of a name, in the order they are encoded.
///
/// Multi-valued RDNs are flattened.
pub fn name_attributes(name: &Name) -> Vec<(String, String)> {
    let mut attributes = Vec::new();
    for rdn in name.0.iter() {
        for atv in rdn.0.iter() {
            let key = attribute_short_name(&atv.oid)
                .map(str::to_string)
                .unwrap_or_else(|| atv.oid.to_string());
            attributes.push((key, attribute_value_string(&atv.value)));
        }
    }
    attributes
}

fn attribute_value_string(value: &x509_cert::der::Any) -> String {
    match value.tag() {
        Tag::Utf8String
        | Tag::PrintableString
        | Tag::Ia5String
        | Tag::TeletexString
        | Tag::VisibleString => String::from_utf8_lossy(value.value()).into_owned(),
        Tag::BmpString => {
            let units: Vec<u16> = value
                .value()
                .chunks(2)
                .map(|c| u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => format!("#{}", hex::encode(value.to_der().unwrap_or_default())),
    }
}

/// RFC 4514 string form of a name: last RDN first, special characters
/// escaped.
pub fn name_to_string(name: &Name) -> String {
    name.0
        .iter()
        .rev()
        .map(|rdn| {
            rdn.0
                .iter()
                .map(|atv| {
                    let key = attribute_short_name(&atv.oid)
                        .map(str::to_string)
                        .unwrap_or_else(|| atv.oid.to_string());
                    format!("{key}={}", escape_attribute_value(&attribute_value_string(&atv.value)))
                })
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn escape_attribute_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        let needs_escape = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (i == 0 && (c == '#' || c == ' '))
            || (i == last && c == ' ');
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn subject_string(cert: &Certificate) -> String {
    name_to_string(&cert.tbs_certificate.subject)
}

pub fn issuer_string(cert: &Certificate) -> String {
    name_to_string(&cert.tbs_certificate.issuer)
}

/// Hex serial number.
pub fn serial_string(cert: &Certificate) -> String {
    hex::encode(cert.tbs_certificate.serial_number.as_bytes())
}

pub fn is_self_issued(cert: &Certificate) -> bool {
    cert.tbs_certificate.subject == cert.tbs_certificate.issuer
}

/// Checks if the given `certificate` is a CA certificate.
///
/// This does **not** indicate trustworthiness of the given `certificate`, only if it has the
/// appropriate interior state.
pub(crate) fn is_ca(certificate: &Certificate) -> std::result::Result<bool, ChainError> {
    let tbs = &certificate.tbs_certificate;

    if tbs.version != x509_cert::Version::V3 {
        return Err(ChainError::Malformed(format!(
            "certificate {:?} is not a version 3 certificate",
            subject_string(certificate)
        )));
    }

    let ca = match tbs
        .get::<BasicConstraints>()
        .map_err(|e| ChainError::Malformed(e.to_string()))?
    {
        None => return Ok(false),
        Some((_, v)) => v.ca,
    };

    if !ca {
        return Ok(false);
    }

    // A CA that declares key usages must be allowed to sign certificates.
    if let Some((_, usage)) = tbs
        .get::<KeyUsage>()
        .map_err(|e| ChainError::Malformed(e.to_string()))?
    {
        if !usage.key_cert_sign() {
            return Err(ChainError::BadKeyUsage {
                subject: subject_string(certificate),
                reason: "CA certificate without keyCertSign usage".to_string(),
            });
        }
    }
    Ok(true)
}

/// The path length constraint of a CA certificate, if any.
pub(crate) fn path_len_constraint(
    certificate: &Certificate,
) -> std::result::Result<Option<u8>, ChainError> {
    Ok(certificate
        .tbs_certificate
        .get::<BasicConstraints>()
        .map_err(|e| ChainError::Malformed(e.to_string()))?
        .and_then(|(_, v)| v.path_len_constraint))
}

fn verify_leaf_usage(
    certificate: &Certificate,
    eku: ObjectIdentifier,
    eku_name: &str,
) -> std::result::Result<(), ChainError> {
    let tbs = &certificate.tbs_certificate;
    let bad = |reason: String| ChainError::BadKeyUsage {
        subject: subject_string(certificate),
        reason,
    };

    if is_ca(certificate)? {
        return Err(bad("the certificate is a CA certificate".to_string()));
    }

    let digital_signature = match tbs
        .get::<KeyUsage>()
        .map_err(|e| ChainError::Malformed(e.to_string()))?
    {
        None => return Err(bad("missing KeyUsage".to_string())),
        Some((_, key_usage)) => key_usage.digital_signature(),
    };
    if !digital_signature {
        return Err(bad("missing digital signature usage".to_string()));
    }

    let extended_key_usage = match tbs
        .get::<ExtendedKeyUsage>()
        .map_err(|e| ChainError::Malformed(e.to_string()))?
    {
        None => return Err(bad("missing ExtendedKeyUsage".to_string())),
        Some((_, extended_key_usage)) => extended_key_usage,
    };
    if !extended_key_usage.0.contains(&eku) {
        return Err(bad(format!("missing {eku_name} ExtendedKeyUsage")));
    }

    Ok(())
}

/// A signing leaf must have digital signature usage and the code signing
/// extended key usage.
pub fn verify_code_signing_leaf(certificate: &Certificate) -> std::result::Result<(), ChainError> {
    verify_leaf_usage(certificate, ID_KP_CODE_SIGNING, "CODE_SIGNING")
}

/// A timestamping leaf must have digital signature usage and the time
/// stamping extended key usage.
pub fn verify_timestamping_leaf(
    certificate: &Certificate,
) -> std::result::Result<(), ChainError> {
    verify_leaf_usage(certificate, ID_KP_TIME_STAMPING, "TIME_STAMPING")
}
