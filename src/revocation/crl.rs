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

//! Certificate revocation lists, RFC 5280 section 5.

use chrono::{DateTime, Utc};
use const_oid::db::rfc5280::{
    ID_CE_CRL_DISTRIBUTION_POINTS, ID_CE_CRL_NUMBER, ID_CE_CRL_REASONS,
    ID_CE_DELTA_CRL_INDICATOR, ID_CE_FRESHEST_CRL,
};
use const_oid::ObjectIdentifier;
use der::asn1::Uint;
use der::{Decode, Encode};
use x509_cert::crl::CertificateList;
use x509_cert::ext::pkix::crl::dp::DistributionPoint;
use x509_cert::ext::pkix::name::{DistributionPointName, GeneralName};
use x509_cert::ext::pkix::KeyUsage;
use x509_cert::ext::Extensions;
use x509_cert::Certificate;

use super::RevocationReason;
use crate::crypto::certificate::{subject_string, to_datetime};
use crate::crypto::verification_key::VerificationKey;
use crate::errors::RevocationError;

fn parse_failed(what: &str, e: impl std::fmt::Display) -> RevocationError {
    RevocationError::ParseFailed(format!("{what}: {e}"))
}

fn find_extension<'a>(
    extensions: Option<&'a Extensions>,
    oid: ObjectIdentifier,
) -> Option<&'a [u8]> {
    extensions?
        .iter()
        .find(|e| e.extn_id == oid)
        .map(|e| e.extn_value.as_bytes())
}

fn uris(points: &[DistributionPoint]) -> Vec<String> {
    points
        .iter()
        .filter_map(|point| match &point.distribution_point {
            Some(DistributionPointName::FullName(names)) => Some(names),
            _ => None,
        })
        .flatten()
        .filter_map(|name| match name {
            GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
            _ => None,
        })
        .collect()
}

/// URLs of the CRL distribution points of `cert`.
pub fn crl_urls(cert: &Certificate) -> Result<Vec<String>, RevocationError> {
    match find_extension(
        cert.tbs_certificate.extensions.as_ref(),
        ID_CE_CRL_DISTRIBUTION_POINTS,
    ) {
        None => Ok(Vec::new()),
        Some(value) => {
            let points = Vec::<DistributionPoint>::from_der(value)
                .map_err(|e| parse_failed("invalid CRL distribution points", e))?;
            Ok(uris(&points))
        }
    }
}

/// Compare two big-endian unsigned integers.
fn uint_cmp(a: &Uint, b: &Uint) -> std::cmp::Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// A parsed CRL whose signature has been checked.
#[derive(Debug, Clone)]
pub struct Crl {
    list: CertificateList,
}

impl Crl {
    /// Parse `der` and check it was issued and signed by `issuer`, the
    /// issuer of `cert`.
    pub fn verify(
        der: &[u8],
        cert: &Certificate,
        issuer: &Certificate,
    ) -> Result<Self, RevocationError> {
        let list = CertificateList::from_der(der).map_err(|e| parse_failed("invalid CRL", e))?;
        if list.tbs_cert_list.issuer != cert.tbs_certificate.issuer {
            return Err(RevocationError::IssuerMismatch {
                subject: subject_string(cert),
                what: "the CRL".to_string(),
            });
        }
        if let Some((_, usage)) = issuer
            .tbs_certificate
            .get::<KeyUsage>()
            .map_err(|e| parse_failed("invalid key usage", e))?
        {
            if !usage.crl_sign() {
                return Err(RevocationError::ParseFailed(format!(
                    "issuer {:?} is not allowed to sign CRLs",
                    subject_string(issuer)
                )));
            }
        }

        let key = VerificationKey::from_certificate(issuer)
            .map_err(|e| parse_failed("unsupported CRL issuer key", e))?;
        let tbs = list
            .tbs_cert_list
            .to_der()
            .map_err(|e| parse_failed("cannot encode CRL", e))?;
        let signature = list
            .signature
            .as_bytes()
            .ok_or_else(|| RevocationError::ParseFailed("CRL signature is not octet aligned".into()))?;
        key.verify_x509(&list.signature_algorithm, &tbs, signature)
            .map_err(|e| parse_failed("invalid CRL signature", e))?;
        Ok(Crl { list })
    }

    pub fn this_update(&self) -> DateTime<Utc> {
        to_datetime(&self.list.tbs_cert_list.this_update)
    }

    pub fn next_update(&self) -> Option<DateTime<Utc>> {
        self.list.tbs_cert_list.next_update.as_ref().map(to_datetime)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.next_update().is_some_and(|next| now > next)
    }

    fn extensions(&self) -> Option<&Extensions> {
        self.list.tbs_cert_list.crl_extensions.as_ref()
    }

    fn uint_extension(&self, oid: ObjectIdentifier) -> Result<Option<Uint>, RevocationError> {
        find_extension(self.extensions(), oid)
            .map(|value| Uint::from_der(value).map_err(|e| parse_failed("invalid CRL number", e)))
            .transpose()
    }

    /// The CRL number, when present.
    pub fn number(&self) -> Result<Option<Uint>, RevocationError> {
        self.uint_extension(ID_CE_CRL_NUMBER)
    }

    /// The number of the base CRL, for delta CRLs.
    pub fn delta_base(&self) -> Result<Option<Uint>, RevocationError> {
        self.uint_extension(ID_CE_DELTA_CRL_INDICATOR)
    }

    /// Where the delta CRLs of this CRL are published.
    pub fn freshest_crl_urls(&self) -> Result<Vec<String>, RevocationError> {
        match find_extension(self.extensions(), ID_CE_FRESHEST_CRL) {
            None => Ok(Vec::new()),
            Some(value) => {
                let points = Vec::<DistributionPoint>::from_der(value)
                    .map_err(|e| parse_failed("invalid freshest CRL extension", e))?;
                Ok(uris(&points))
            }
        }
    }

    /// Check that `delta` can complete this base CRL.
    pub fn check_delta(&self, delta: &Crl) -> Result<(), RevocationError> {
        let base = delta.delta_base()?.ok_or_else(|| {
            RevocationError::ParseFailed("the freshest CRL is not a delta CRL".into())
        })?;
        let number = self.number()?.ok_or_else(|| {
            RevocationError::ParseFailed("a CRL with delta CRLs must carry a CRL number".into())
        })?;
        if uint_cmp(&base, &number) == std::cmp::Ordering::Greater {
            return Err(RevocationError::ParseFailed(
                "the delta CRL is based on a newer CRL than the one fetched".into(),
            ));
        }
        Ok(())
    }

    /// The revocation entry of `cert`, with its time and reason.
    pub fn entry(
        &self,
        cert: &Certificate,
    ) -> Result<Option<(DateTime<Utc>, Option<RevocationReason>)>, RevocationError> {
        let Some(revoked) = &self.list.tbs_cert_list.revoked_certificates else {
            return Ok(None);
        };
        let Some(entry) = revoked
            .iter()
            .find(|entry| entry.serial_number == cert.tbs_certificate.serial_number)
        else {
            return Ok(None);
        };
        let reason = find_extension(entry.crl_entry_extensions.as_ref(), ID_CE_CRL_REASONS)
            .map(|value| {
                RevocationReason::from_der(value)
                    .map_err(|e| parse_failed("invalid revocation reason", e))
            })
            .transpose()?;
        Ok(Some((to_datetime(&entry.revocation_date), reason)))
    }
}

/// The revocation entry of `cert` in a base CRL completed by `delta`.
/// A `removeFromCRL` entry in the delta CRL cancels the base one.
pub fn lookup(
    base: &Crl,
    delta: Option<&Crl>,
    cert: &Certificate,
) -> Result<Option<(DateTime<Utc>, Option<RevocationReason>)>, RevocationError> {
    if let Some(delta) = delta {
        match delta.entry(cert)? {
            Some((_, Some(RevocationReason::RemoveFromCrl))) => return Ok(None),
            Some(entry) => return Ok(Some(entry)),
            None => {}
        }
    }
    match base.entry(cert)? {
        Some((_, Some(RevocationReason::RemoveFromCrl))) => Ok(None),
        entry => Ok(entry),
    }
}
