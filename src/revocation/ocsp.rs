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

//! OCSP requests and responses, RFC 6960.

use base64::{engine::general_purpose::STANDARD as BASE64_STD_ENGINE, Engine as _};
use chrono::{DateTime, TimeDelta, Utc};
use const_oid::db::rfc5280::{ID_AD_OCSP, ID_KP_OCSP_SIGNING, ID_PE_AUTHORITY_INFO_ACCESS};
use const_oid::ObjectIdentifier;
use der::asn1::{BitString, GeneralizedTime, Null, OctetString};
use der::{Any, Choice, Decode, Encode, Enumerated, Sequence};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{AccessDescription, ExtendedKeyUsage};
use x509_cert::ext::Extensions;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::Certificate;

use super::RevocationReason;
use crate::crypto::certificate::{subject_string, verify_validity_at};
use crate::crypto::verification_key::{verify_certificate_signature, VerificationKey};
use crate::crypto::HashAlgorithm;
use crate::errors::RevocationError;

/// id-pkix-ocsp-basic
pub(crate) const ID_PKIX_OCSP_BASIC: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1.1");

/// Media type of POSTed requests.
pub const OCSP_REQUEST_MEDIA_TYPE: &str = "application/ocsp-request";

/// Requests whose GET URL would be longer are POSTed.
const MAX_GET_URL_LENGTH: usize = 255;

/// Tolerated clock difference with responders on `thisUpdate`.
fn this_update_tolerance() -> TimeDelta {
    TimeDelta::minutes(5)
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct CertId {
    pub hash_algorithm: AlgorithmIdentifierOwned,
    pub issuer_name_hash: OctetString,
    pub issuer_key_hash: OctetString,
    pub serial_number: SerialNumber,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct Request {
    pub req_cert: CertId,
    #[asn1(context_specific = "0", optional = "true")]
    pub single_request_extensions: Option<Extensions>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct TbsRequest {
    #[asn1(context_specific = "0", default = "Default::default")]
    pub version: u8,
    #[asn1(context_specific = "1", optional = "true")]
    pub requestor_name: Option<GeneralName>,
    pub request_list: Vec<Request>,
    #[asn1(context_specific = "2", optional = "true")]
    pub request_extensions: Option<Extensions>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct OcspRequest {
    pub tbs_request: TbsRequest,
    #[asn1(context_specific = "0", optional = "true")]
    pub optional_signature: Option<Any>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Enumerated)]
#[repr(u32)]
pub(crate) enum OcspResponseStatus {
    Successful = 0,
    MalformedRequest = 1,
    InternalError = 2,
    TryLater = 3,
    SigRequired = 5,
    Unauthorized = 6,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct ResponseBytes {
    pub response_type: ObjectIdentifier,
    pub response: OctetString,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct OcspResponse {
    pub response_status: OcspResponseStatus,
    #[asn1(context_specific = "0", optional = "true")]
    pub response_bytes: Option<ResponseBytes>,
}

#[derive(Clone, Debug, Eq, PartialEq, Choice)]
pub(crate) enum ResponderId {
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", constructed = "true")]
    ByName(Name),
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", constructed = "true")]
    ByKey(OctetString),
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct RevokedInfo {
    pub revocation_time: GeneralizedTime,
    #[asn1(context_specific = "0", optional = "true")]
    pub revocation_reason: Option<RevocationReason>,
}

#[derive(Clone, Debug, Eq, PartialEq, Choice)]
pub(crate) enum CertStatus {
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT")]
    Good(Null),
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", constructed = "true")]
    Revoked(RevokedInfo),
    #[asn1(context_specific = "2", tag_mode = "IMPLICIT")]
    Unknown(Null),
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct SingleResponse {
    pub cert_id: CertId,
    pub cert_status: CertStatus,
    pub this_update: GeneralizedTime,
    #[asn1(context_specific = "0", optional = "true")]
    pub next_update: Option<GeneralizedTime>,
    #[asn1(context_specific = "1", optional = "true")]
    pub single_extensions: Option<Extensions>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct ResponseData {
    #[asn1(context_specific = "0", default = "Default::default")]
    pub version: u8,
    pub responder_id: ResponderId,
    pub produced_at: GeneralizedTime,
    pub responses: Vec<SingleResponse>,
    #[asn1(context_specific = "1", optional = "true")]
    pub response_extensions: Option<Extensions>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct BasicOcspResponse {
    pub tbs_response_data: ResponseData,
    pub signature_algorithm: AlgorithmIdentifierOwned,
    pub signature: BitString,
    #[asn1(context_specific = "0", optional = "true")]
    pub certs: Option<Vec<Certificate>>,
}

/// The status a responder gave for a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcspStatus {
    Good,
    Revoked {
        time: DateTime<Utc>,
        reason: Option<RevocationReason>,
    },
    Unknown,
}

/// A verified answer about one certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcspAnswer {
    pub status: OcspStatus,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
}

pub(crate) fn generalized_time(time: &GeneralizedTime) -> DateTime<Utc> {
    time.to_system_time().into()
}

fn parse_failed(what: &str, e: impl std::fmt::Display) -> RevocationError {
    RevocationError::ParseFailed(format!("{what}: {e}"))
}

/// OCSP responder URLs of the Authority Information Access extension.
pub fn ocsp_urls(cert: &Certificate) -> Result<Vec<String>, RevocationError> {
    let Some(extensions) = &cert.tbs_certificate.extensions else {
        return Ok(Vec::new());
    };
    let mut urls = Vec::new();
    for extension in extensions
        .iter()
        .filter(|e| e.extn_id == ID_PE_AUTHORITY_INFO_ACCESS)
    {
        let access = Vec::<AccessDescription>::from_der(extension.extn_value.as_bytes())
            .map_err(|e| parse_failed("invalid authority information access", e))?;
        for description in access.iter().filter(|d| d.access_method == ID_AD_OCSP) {
            if let GeneralName::UniformResourceIdentifier(uri) = &description.access_location {
                urls.push(uri.to_string());
            }
        }
    }
    Ok(urls)
}

/// The CertID of `cert` computed with `hash`.
pub(crate) fn cert_id(
    cert: &Certificate,
    issuer: &Certificate,
    hash: HashAlgorithm,
) -> Result<CertId, RevocationError> {
    let issuer_name = issuer
        .tbs_certificate
        .subject
        .to_der()
        .map_err(|e| parse_failed("cannot encode issuer name", e))?;
    let issuer_key = issuer
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .raw_bytes();
    Ok(CertId {
        hash_algorithm: AlgorithmIdentifierOwned {
            oid: hash.oid(),
            parameters: None,
        },
        issuer_name_hash: OctetString::new(hash.digest(&issuer_name))
            .map_err(|e| parse_failed("cannot encode CertID", e))?,
        issuer_key_hash: OctetString::new(hash.digest(issuer_key))
            .map_err(|e| parse_failed("cannot encode CertID", e))?,
        serial_number: cert.tbs_certificate.serial_number.clone(),
    })
}

/// DER of an unsigned, nonce-less request about `cert`.
pub fn build_request(cert: &Certificate, issuer: &Certificate) -> Result<Vec<u8>, RevocationError> {
    OcspRequest {
        tbs_request: TbsRequest {
            version: 0,
            requestor_name: None,
            request_list: vec![Request {
                req_cert: cert_id(cert, issuer, HashAlgorithm::Sha256)?,
                single_request_extensions: None,
            }],
            request_extensions: None,
        },
        optional_signature: None,
    }
    .to_der()
    .map_err(|e| parse_failed("cannot encode OCSP request", e))
}

/// The GET URL for `request` sent to `responder`, or `None` when the
/// request is too long and must be POSTed.
pub fn get_url(responder: &str, request: &[u8]) -> Option<String> {
    let encoded: String =
        url::form_urlencoded::byte_serialize(BASE64_STD_ENGINE.encode(request).as_bytes())
            .collect();
    let url = if responder.ends_with('/') {
        format!("{responder}{encoded}")
    } else {
        format!("{responder}/{encoded}")
    };
    (url.len() <= MAX_GET_URL_LENGTH).then_some(url)
}

fn is_delegated_responder(
    candidate: &Certificate,
    issuer: &Certificate,
    now: DateTime<Utc>,
) -> bool {
    let authorized = candidate
        .tbs_certificate
        .get::<ExtendedKeyUsage>()
        .ok()
        .flatten()
        .is_some_and(|(_, eku)| eku.0.contains(&ID_KP_OCSP_SIGNING));
    authorized
        && candidate.tbs_certificate.issuer == issuer.tbs_certificate.subject
        && verify_certificate_signature(candidate, issuer).is_ok()
        && verify_validity_at(candidate, now).is_ok()
}

/// Check that the issuer, or a responder it delegated to, signed `basic`.
fn verify_signature(
    basic: &BasicOcspResponse,
    issuer: &Certificate,
    now: DateTime<Utc>,
) -> Result<(), RevocationError> {
    let tbs = basic
        .tbs_response_data
        .to_der()
        .map_err(|e| parse_failed("cannot encode response data", e))?;
    let signature = basic
        .signature
        .as_bytes()
        .ok_or_else(|| RevocationError::ParseFailed("OCSP signature is not octet aligned".into()))?;
    let signed_by = |cert: &Certificate| {
        VerificationKey::from_certificate(cert)
            .ok()
            .is_some_and(|key| {
                key.verify_x509(&basic.signature_algorithm, &tbs, signature)
                    .is_ok()
            })
    };

    if signed_by(issuer) {
        return Ok(());
    }
    let delegated = basic
        .certs
        .iter()
        .flatten()
        .filter(|cert| is_delegated_responder(cert, issuer, now))
        .any(|cert| signed_by(cert));
    if delegated {
        Ok(())
    } else {
        Err(RevocationError::ParseFailed(format!(
            "OCSP response is not signed by {:?} or a responder it authorized",
            subject_string(issuer)
        )))
    }
}

fn matches_cert(
    id: &CertId,
    cert: &Certificate,
    issuer: &Certificate,
) -> Result<bool, RevocationError> {
    if id.serial_number != cert.tbs_certificate.serial_number {
        return Ok(false);
    }
    let Some(hash) = HashAlgorithm::from_oid(&id.hash_algorithm.oid) else {
        return Err(RevocationError::ParseFailed(format!(
            "OCSP CertID hash algorithm {} is not supported",
            id.hash_algorithm.oid
        )));
    };
    let expected = cert_id(cert, issuer, hash)?;
    Ok(expected.issuer_name_hash == id.issuer_name_hash
        && expected.issuer_key_hash == id.issuer_key_hash)
}

/// Parse and verify `response` about `cert`, as of `now`.
pub fn evaluate_response(
    response: &[u8],
    cert: &Certificate,
    issuer: &Certificate,
    now: DateTime<Utc>,
) -> Result<OcspAnswer, RevocationError> {
    let response =
        OcspResponse::from_der(response).map_err(|e| parse_failed("invalid OCSP response", e))?;
    if response.response_status != OcspResponseStatus::Successful {
        return Err(RevocationError::ParseFailed(format!(
            "OCSP responder answered {:?}",
            response.response_status
        )));
    }
    let bytes = response
        .response_bytes
        .ok_or_else(|| RevocationError::ParseFailed("OCSP response without content".into()))?;
    if bytes.response_type != ID_PKIX_OCSP_BASIC {
        return Err(RevocationError::ParseFailed(format!(
            "OCSP response type {} is not supported",
            bytes.response_type
        )));
    }
    let basic = BasicOcspResponse::from_der(bytes.response.as_bytes())
        .map_err(|e| parse_failed("invalid basic OCSP response", e))?;
    verify_signature(&basic, issuer, now)?;

    let mut single = None;
    for candidate in &basic.tbs_response_data.responses {
        if matches_cert(&candidate.cert_id, cert, issuer)? {
            single = Some(candidate);
            break;
        }
    }
    let single = single.ok_or_else(|| {
        RevocationError::ParseFailed(format!(
            "OCSP response does not cover certificate {:?}",
            subject_string(cert)
        ))
    })?;

    let this_update = generalized_time(&single.this_update);
    if this_update > now + this_update_tolerance() {
        return Err(RevocationError::ParseFailed(format!(
            "OCSP response is not valid before {}",
            this_update.to_rfc3339()
        )));
    }
    let next_update = single.next_update.as_ref().map(generalized_time);
    if let Some(next_update) = next_update {
        if now > next_update {
            return Err(RevocationError::ParseFailed(format!(
                "OCSP response expired at {}",
                next_update.to_rfc3339()
            )));
        }
    }

    let status = match &single.cert_status {
        CertStatus::Good(_) => OcspStatus::Good,
        CertStatus::Revoked(info) => OcspStatus::Revoked {
            time: generalized_time(&info.revocation_time),
            reason: info.revocation_reason,
        },
        CertStatus::Unknown(_) => OcspStatus::Unknown,
    };
    Ok(OcspAnswer {
        status,
        this_update,
        next_update,
    })
}
