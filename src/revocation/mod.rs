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

//! Revocation checking of certificate chains.
//!
//! Every certificate but the root is checked with OCSP first, then with the
//! CRLs of its distribution points when OCSP gives no definitive answer.
//! Responses are fetched through a [`Fetcher`] and kept in a [`Cache`]
//! until their `nextUpdate`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use der::Enumerated;
use x509_cert::Certificate;

use crate::config::{Config, Context};
use crate::crypto::certificate::{serial_string, subject_string};
use crate::errors::{IoError, NotationError, Result, RevocationError};

pub mod cache;
pub mod crl;
pub mod fetcher;
pub mod ocsp;

pub use cache::{open_cache, Cache, CacheEntry, FileCache, MemoryCache};
pub use crl::Crl;
pub use fetcher::{Fetcher, HttpFetcher};
pub use ocsp::{OcspAnswer, OcspStatus};

/// CRLReason, RFC 5280 section 5.3.1.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Enumerated)]
#[repr(u32)]
pub enum RevocationReason {
    Unspecified = 0,
    KeyCompromise = 1,
    CaCompromise = 2,
    AffiliationChanged = 3,
    Superseded = 4,
    CessationOfOperation = 5,
    CertificateHold = 6,
    RemoveFromCrl = 8,
    PrivilegeWithdrawn = 9,
    AaCompromise = 10,
}

/// Decides whether a certificate chain is revoked.
#[async_trait]
pub trait RevocationValidator: Send + Sync {
    /// `chain` is ordered from the leaf to the root. `signing_time` is the
    /// authentic signing time, when known.
    async fn check_chain(
        &self,
        ctx: &Context,
        chain: &[Certificate],
        signing_time: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

/// Checks certificate chains against OCSP responders and CRLs.
pub struct RevocationChecker {
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<dyn Cache>,
    ocsp_timeout: Duration,
    crl_timeout: Duration,
}

fn unavailable(cert: &Certificate, reason: impl Into<String>) -> RevocationError {
    RevocationError::Unavailable {
        subject: subject_string(cert),
        reason: reason.into(),
    }
}

/// Transport failures become an unavailable revocation status of `cert`.
fn into_revocation(err: NotationError, cert: &Certificate) -> NotationError {
    match err {
        NotationError::Io(e) => unavailable(cert, e.to_string()).into(),
        other => other,
    }
}

type RevocationEntry = Option<(DateTime<Utc>, Option<RevocationReason>)>;

impl RevocationChecker {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: Arc<dyn Cache>) -> Self {
        let defaults = Config::default();
        RevocationChecker {
            fetcher,
            cache,
            ocsp_timeout: defaults.ocsp_timeout,
            crl_timeout: defaults.crl_timeout,
        }
    }

    /// A checker using the cache and timeouts of `config`.
    pub fn from_config(config: &Config, fetcher: Arc<dyn Fetcher>) -> Self {
        RevocationChecker {
            fetcher,
            cache: open_cache(config.revocation_cache_root.as_deref()),
            ocsp_timeout: config.ocsp_timeout,
            crl_timeout: config.crl_timeout,
        }
    }

    pub fn with_timeouts(mut self, ocsp_timeout: Duration, crl_timeout: Duration) -> Self {
        self.ocsp_timeout = ocsp_timeout;
        self.crl_timeout = crl_timeout;
        self
    }

    /// Check every certificate of `chain` but the last one, `chain` being
    /// ordered from the leaf to the root.
    ///
    /// Every certificate is checked before the results are merged: a revoked
    /// certificate wins over an unavailable status. A certificate revoked
    /// after `signing_time`, the authentic signing time when there is one,
    /// still counts as valid.
    pub async fn check_chain(
        &self,
        ctx: &Context,
        chain: &[Certificate],
        signing_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut failures: Vec<RevocationError> = Vec::new();
        for pair in chain.windows(2) {
            ctx.check_cancelled()?;
            let (cert, issuer) = (&pair[0], &pair[1]);
            match self.check_certificate(ctx, cert, issuer, signing_time).await {
                Ok(()) => {}
                Err(NotationError::Revocation(e)) => {
                    tracing::debug!(subject = subject_string(cert), error = %e, "revocation check failed");
                    failures.push(e);
                }
                Err(e) => return Err(e),
            }
        }

        let revoked = failures
            .iter()
            .position(|e| matches!(e, RevocationError::Revoked { .. }));
        match revoked {
            Some(index) => Err(failures.swap_remove(index).into()),
            None => match failures.into_iter().next() {
                Some(failure) => Err(failure.into()),
                None => Ok(()),
            },
        }
    }

    async fn check_certificate(
        &self,
        ctx: &Context,
        cert: &Certificate,
        issuer: &Certificate,
        signing_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let ocsp_urls = ocsp::ocsp_urls(cert)?;
        let crl_urls = crl::crl_urls(cert)?;
        if ocsp_urls.is_empty() && crl_urls.is_empty() {
            tracing::debug!(
                subject = subject_string(cert),
                "certificate carries no revocation information"
            );
            return Ok(());
        }

        let mut ocsp_failure = None;
        if !ocsp_urls.is_empty() {
            match self.check_ocsp(ctx, cert, issuer, &ocsp_urls).await {
                Ok(OcspStatus::Revoked { time, reason }) => {
                    return decide(cert, Some((time, reason)), signing_time).map_err(Into::into)
                }
                Ok(_) => return Ok(()),
                Err(NotationError::Revocation(e)) => {
                    tracing::debug!(
                        subject = subject_string(cert),
                        error = %e,
                        "OCSP gave no definitive answer, trying CRLs"
                    );
                    ocsp_failure = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        if crl_urls.is_empty() {
            return Err(ocsp_failure
                .unwrap_or_else(|| unavailable(cert, "no revocation method succeeded"))
                .into());
        }
        let entry = self.check_crl(ctx, cert, issuer, &crl_urls).await?;
        decide(cert, entry, signing_time).map_err(Into::into)
    }

    /// Fetch `url`, POSTing `body` when there is one, within `timeout`.
    async fn fetch(
        &self,
        ctx: &Context,
        url: &str,
        timeout: Duration,
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        ctx.check_cancelled()?;
        let request = async {
            let fetch = async {
                match body {
                    None => self.fetcher.get(url, timeout).await,
                    Some(body) => {
                        self.fetcher
                            .post(url, ocsp::OCSP_REQUEST_MEDIA_TYPE, body, timeout)
                            .await
                    }
                }
            };
            tokio::time::timeout(timeout, fetch)
                .await
                .unwrap_or_else(|_| Err(IoError::Timeout(url.to_string())))
        };
        match ctx.cancellation().run_until_cancelled(request).await {
            None => Err(NotationError::Cancelled),
            Some(response) => Ok(response?),
        }
    }

    async fn check_ocsp(
        &self,
        ctx: &Context,
        cert: &Certificate,
        issuer: &Certificate,
        responders: &[String],
    ) -> Result<OcspStatus> {
        let request = ocsp::build_request(cert, issuer)?;
        let mut last_error = None;
        for responder in responders {
            match self.ocsp_answer(ctx, cert, issuer, responder, &request).await {
                Ok(answer) if answer.status != OcspStatus::Unknown => return Ok(answer.status),
                Ok(_) => {
                    last_error = Some(unavailable(
                        cert,
                        format!("OCSP responder {responder} does not know the certificate"),
                    ))
                }
                Err(NotationError::Revocation(e)) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_error
            .unwrap_or_else(|| unavailable(cert, "no OCSP responder"))
            .into())
    }

    async fn ocsp_answer(
        &self,
        ctx: &Context,
        cert: &Certificate,
        issuer: &Certificate,
        responder: &str,
        request: &[u8],
    ) -> Result<OcspAnswer> {
        let now = Utc::now();
        // only GET responses are cached, their URL identifies the request
        let get_url = ocsp::get_url(responder, request);
        if let Some(url) = &get_url {
            if let Some(entry) = self.cache.get(url) {
                if entry.is_expired(now) {
                    tracing::debug!(url, "cached OCSP response expired, fetching it again");
                } else {
                    match ocsp::evaluate_response(&entry.bundle, cert, issuer, now) {
                        Ok(answer) => return Ok(answer),
                        Err(e) => tracing::debug!(url, error = %e, "ignoring cached OCSP response"),
                    }
                }
            }
        }

        let response = match &get_url {
            Some(url) => self.fetch(ctx, url, self.ocsp_timeout, None).await,
            None => {
                self.fetch(ctx, responder, self.ocsp_timeout, Some(request.to_vec()))
                    .await
            }
        }
        .map_err(|e| into_revocation(e, cert))?;
        let answer = ocsp::evaluate_response(&response, cert, issuer, now)?;
        if let Some(url) = get_url {
            self.cache.set(CacheEntry {
                url,
                bundle: response,
                this_update: answer.this_update,
                next_update: answer.next_update,
            });
        }
        Ok(answer)
    }

    async fn check_crl(
        &self,
        ctx: &Context,
        cert: &Certificate,
        issuer: &Certificate,
        urls: &[String],
    ) -> Result<RevocationEntry> {
        let mut last_error = None;
        for url in urls {
            let outcome = async {
                let base = self.fetch_crl(ctx, url, cert, issuer).await?;
                if base.delta_base()?.is_some() {
                    return Err(RevocationError::ParseFailed(format!(
                        "{url} serves a delta CRL where a full CRL is expected"
                    ))
                    .into());
                }
                let delta = self.fetch_delta(ctx, &base, cert, issuer).await?;
                Ok(crl::lookup(&base, delta.as_ref(), cert)?)
            }
            .await;
            match outcome {
                Ok(entry) => return Ok(entry),
                Err(NotationError::Revocation(e)) => {
                    tracing::debug!(url, error = %e, "CRL distribution point failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error
            .unwrap_or_else(|| unavailable(cert, "no CRL distribution point"))
            .into())
    }

    /// A verified, unexpired CRL from `url`, from the cache when it holds a
    /// fresh copy.
    async fn fetch_crl(
        &self,
        ctx: &Context,
        url: &str,
        cert: &Certificate,
        issuer: &Certificate,
    ) -> Result<Crl> {
        let now = Utc::now();
        if let Some(entry) = self.cache.get(url) {
            if entry.is_expired(now) {
                tracing::debug!(url, "cached CRL expired, fetching it again");
            } else {
                match Crl::verify(&entry.bundle, cert, issuer) {
                    Ok(crl) => return Ok(crl),
                    Err(e) => tracing::debug!(url, error = %e, "ignoring cached CRL"),
                }
            }
        }

        let bundle = self
            .fetch(ctx, url, self.crl_timeout, None)
            .await
            .map_err(|e| into_revocation(e, cert))?;
        let crl = Crl::verify(&bundle, cert, issuer)?;
        if crl.is_expired(now) {
            return Err(unavailable(
                cert,
                format!(
                    "the CRL at {url} expired at {}",
                    crl.next_update()
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default()
                ),
            )
            .into());
        }
        self.cache.set(CacheEntry {
            url: url.to_string(),
            bundle,
            this_update: crl.this_update(),
            next_update: crl.next_update(),
        });
        Ok(crl)
    }

    async fn fetch_delta(
        &self,
        ctx: &Context,
        base: &Crl,
        cert: &Certificate,
        issuer: &Certificate,
    ) -> Result<Option<Crl>> {
        let urls = base.freshest_crl_urls()?;
        if urls.is_empty() {
            return Ok(None);
        }
        let mut last_error = None;
        for url in &urls {
            match self.fetch_crl(ctx, url, cert, issuer).await {
                Ok(delta) => {
                    base.check_delta(&delta)?;
                    return Ok(Some(delta));
                }
                Err(NotationError::Revocation(e)) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_error
            .unwrap_or_else(|| unavailable(cert, "no delta CRL"))
            .into())
    }
}

#[async_trait]
impl RevocationValidator for RevocationChecker {
    async fn check_chain(
        &self,
        ctx: &Context,
        chain: &[Certificate],
        signing_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        RevocationChecker::check_chain(self, ctx, chain, signing_time).await
    }
}

fn decide(
    cert: &Certificate,
    entry: RevocationEntry,
    signing_time: Option<DateTime<Utc>>,
) -> std::result::Result<(), RevocationError> {
    let Some((revoked_at, reason)) = entry else {
        return Ok(());
    };
    if signing_time.is_some_and(|signed_at| signed_at < revoked_at) {
        tracing::debug!(
            subject = subject_string(cert),
            revoked_at = revoked_at.to_rfc3339(),
            "certificate was revoked after the signing time"
        );
        return Ok(());
    }
    tracing::debug!(subject = subject_string(cert), ?reason, "certificate is revoked");
    Err(RevocationError::Revoked {
        subject: subject_string(cert),
        serial: serial_string(cert),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::TimeDelta;
    use const_oid::db::rfc5280::{
        ID_CE_CRL_NUMBER, ID_CE_CRL_REASONS, ID_CE_DELTA_CRL_INDICATOR, ID_CE_FRESHEST_CRL,
    };
    use const_oid::db::rfc5912::ECDSA_WITH_SHA_256;
    use der::asn1::{BitString, GeneralizedTime, Ia5String, Null, OctetString};
    use der::Encode;
    use openssl::hash::MessageDigest;
    use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};
    use x509_cert::ext::pkix::crl::dp::DistributionPoint;
    use x509_cert::ext::pkix::name::{DistributionPointName, GeneralName};
    use x509_cert::ext::Extension;
    use x509_cert::spki::AlgorithmIdentifierOwned;
    use x509_cert::time::Time;

    use super::ocsp::{
        cert_id, BasicOcspResponse, CertStatus, OcspResponse, OcspResponseStatus, ResponderId,
        ResponseBytes, ResponseData, RevokedInfo, SingleResponse, ID_PKIX_OCSP_BASIC,
    };
    use super::*;
    use crate::crypto::tests::*;
    use crate::crypto::HashAlgorithm;

    fn generalized(time: DateTime<Utc>) -> GeneralizedTime {
        GeneralizedTime::from_unix_duration(Duration::from_secs(time.timestamp() as u64)).unwrap()
    }

    fn sign_p256(signer: &CertData, message: &[u8]) -> BitString {
        let mut signer =
            openssl::sign::Signer::new(MessageDigest::sha256(), &signer.private_key).unwrap();
        BitString::from_bytes(&signer.sign_oneshot_to_vec(message).unwrap()).unwrap()
    }

    fn ecdsa_sha256() -> AlgorithmIdentifierOwned {
        AlgorithmIdentifierOwned {
            oid: ECDSA_WITH_SHA_256,
            parameters: None,
        }
    }

    fn extension(oid: const_oid::ObjectIdentifier, value: Vec<u8>) -> Extension {
        Extension {
            extn_id: oid,
            critical: false,
            extn_value: OctetString::new(value).unwrap(),
        }
    }

    /// A root CA and a code signing leaf listing `url` as CRL distribution
    /// point.
    pub(crate) fn crl_chain(url: &str) -> (CertData, CertData) {
        let root = generate_certificate(None, CertGenerationOptions::ca("Notary Root")).unwrap();
        let leaf = generate_certificate(
            Some(&root),
            CertGenerationOptions {
                crl_url: Some(url.to_string()),
                ..CertGenerationOptions::default()
            },
        )
        .unwrap();
        (root, leaf)
    }

    /// A root CA and a code signing leaf listing `url` as OCSP responder.
    pub(crate) fn ocsp_chain(url: &str) -> (CertData, CertData) {
        let root = generate_certificate(None, CertGenerationOptions::ca("Notary Root")).unwrap();
        let leaf = generate_certificate(
            Some(&root),
            CertGenerationOptions {
                ocsp_url: Some(url.to_string()),
                ..CertGenerationOptions::default()
            },
        )
        .unwrap();
        (root, leaf)
    }

    pub(crate) struct CrlOptions {
        pub number: u32,
        pub this_update: DateTime<Utc>,
        pub next_update: DateTime<Utc>,
        pub revoked: Vec<(Certificate, Option<RevocationReason>)>,
        pub revoked_at: DateTime<Utc>,
        /// Issue a delta CRL of this base CRL number
        pub delta_base: Option<u32>,
        /// Delta CRL location
        pub freshest: Option<String>,
    }

    impl CrlOptions {
        pub(crate) fn new(number: u32) -> Self {
            CrlOptions {
                number,
                this_update: Utc::now() - TimeDelta::hours(1),
                next_update: Utc::now() + TimeDelta::days(1),
                revoked: Vec::new(),
                revoked_at: Utc::now() - TimeDelta::hours(2),
                delta_base: None,
                freshest: None,
            }
        }
    }

    /// A CRL signed by `issuer`, which must hold a P-256 key.
    pub(crate) fn issue_crl(issuer: &CertData, options: CrlOptions) -> Vec<u8> {
        let revoked: Vec<RevokedCert> = options
            .revoked
            .iter()
            .map(|(cert, reason)| RevokedCert {
                serial_number: cert.tbs_certificate.serial_number.clone(),
                revocation_date: Time::GeneralTime(generalized(options.revoked_at)),
                crl_entry_extensions: reason
                    .map(|reason| vec![extension(ID_CE_CRL_REASONS, reason.to_der().unwrap())]),
            })
            .collect();

        let mut extensions = vec![extension(ID_CE_CRL_NUMBER, options.number.to_der().unwrap())];
        if let Some(base) = options.delta_base {
            extensions.push(extension(ID_CE_DELTA_CRL_INDICATOR, base.to_der().unwrap()));
        }
        if let Some(url) = &options.freshest {
            let points = vec![DistributionPoint {
                distribution_point: Some(DistributionPointName::FullName(vec![
                    GeneralName::UniformResourceIdentifier(Ia5String::new(url).unwrap()),
                ])),
                reasons: None,
                crl_issuer: None,
            }];
            extensions.push(extension(ID_CE_FRESHEST_CRL, points.to_der().unwrap()));
        }

        let tbs_cert_list = TbsCertList {
            version: x509_cert::Version::V2,
            signature: ecdsa_sha256(),
            issuer: issuer.x509().tbs_certificate.subject,
            this_update: Time::GeneralTime(generalized(options.this_update)),
            next_update: Some(Time::GeneralTime(generalized(options.next_update))),
            revoked_certificates: (!revoked.is_empty()).then_some(revoked),
            crl_extensions: Some(extensions),
        };
        let signature = sign_p256(issuer, &tbs_cert_list.to_der().unwrap());
        CertificateList {
            tbs_cert_list,
            signature_algorithm: ecdsa_sha256(),
            signature,
        }
        .to_der()
        .unwrap()
    }

    pub(crate) struct OcspOptions {
        pub status: CertStatus,
        pub this_update: DateTime<Utc>,
        pub next_update: Option<DateTime<Utc>>,
        pub certs: Vec<Certificate>,
    }

    impl OcspOptions {
        pub(crate) fn good() -> Self {
            OcspOptions {
                status: CertStatus::Good(Null),
                this_update: Utc::now() - TimeDelta::minutes(10),
                next_update: Some(Utc::now() + TimeDelta::hours(12)),
                certs: Vec::new(),
            }
        }

        pub(crate) fn revoked(time: DateTime<Utc>, reason: Option<RevocationReason>) -> Self {
            OcspOptions {
                status: CertStatus::Revoked(RevokedInfo {
                    revocation_time: generalized(time),
                    revocation_reason: reason,
                }),
                ..Self::good()
            }
        }

        pub(crate) fn unknown() -> Self {
            OcspOptions {
                status: CertStatus::Unknown(Null),
                ..Self::good()
            }
        }
    }

    /// An OCSP response about `cert` issued by `issuer`, signed by `signer`
    /// which must hold a P-256 key.
    pub(crate) fn issue_ocsp_response(
        signer: &CertData,
        issuer: &Certificate,
        cert: &Certificate,
        options: OcspOptions,
    ) -> Vec<u8> {
        let single = SingleResponse {
            cert_id: cert_id(cert, issuer, HashAlgorithm::Sha256).unwrap(),
            cert_status: options.status,
            this_update: generalized(options.this_update),
            next_update: options.next_update.map(generalized),
            single_extensions: None,
        };
        let data = ResponseData {
            version: 0,
            responder_id: ResponderId::ByName(signer.x509().tbs_certificate.subject),
            produced_at: generalized(Utc::now()),
            responses: vec![single],
            response_extensions: None,
        };
        let signature = sign_p256(signer, &data.to_der().unwrap());
        let basic = BasicOcspResponse {
            tbs_response_data: data,
            signature_algorithm: ecdsa_sha256(),
            signature,
            certs: (!options.certs.is_empty()).then_some(options.certs),
        };
        OcspResponse {
            response_status: OcspResponseStatus::Successful,
            response_bytes: Some(ResponseBytes {
                response_type: ID_PKIX_OCSP_BASIC,
                response: OctetString::new(basic.to_der().unwrap()).unwrap(),
            }),
        }
        .to_der()
        .unwrap()
    }

    /// Serves canned responses by URL prefix and counts requests.
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        responses: Mutex<Vec<(String, Vec<u8>)>>,
        calls: AtomicUsize,
        offline: AtomicBool,
    }

    impl FakeFetcher {
        pub(crate) fn serve(&self, prefix: &str, body: Vec<u8>) {
            let mut responses = self.responses.lock().unwrap();
            responses.retain(|(p, _)| p != prefix);
            responses.push((prefix.to_string(), body));
        }

        pub(crate) fn go_offline(&self) {
            self.offline.store(true, Ordering::SeqCst);
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn get(&self, url: &str, _timeout: Duration) -> std::result::Result<Vec<u8>, IoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(IoError::TransportFailed(format!("{url}: network is down")));
            }
            self.responses
                .lock()
                .unwrap()
                .iter()
                .find(|(prefix, _)| url.starts_with(prefix.as_str()))
                .map(|(_, body)| body.clone())
                .ok_or_else(|| IoError::NotFound(url.to_string()))
        }
    }

    fn checker(fetcher: &Arc<FakeFetcher>) -> RevocationChecker {
        RevocationChecker::new(fetcher.clone(), Arc::new(MemoryCache::new()))
    }

    fn chain(leaf: &CertData, root: &CertData) -> Vec<Certificate> {
        vec![leaf.x509(), root.x509()]
    }

    #[tokio::test]
    async fn no_revocation_information() {
        let fetcher = Arc::new(FakeFetcher::default());
        let (root, leaf) = generate_chain();
        checker(&fetcher)
            .check_chain(&Context::default(), &chain(&leaf, &root), None)
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 0);

        // a self-signed leaf has no issuer to ask
        checker(&fetcher)
            .check_chain(&Context::default(), &[root.x509()], None)
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn revoked_by_crl_then_served_from_cache() {
        let url = "http://crl.example/root.crl";
        let (root, leaf) = crl_chain(url);
        let mut options = CrlOptions::new(1);
        options.revoked = vec![(leaf.x509(), None)];
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.serve(url, issue_crl(&root, options));

        let dir = tempfile::tempdir().unwrap();
        let cache: Arc<dyn Cache> = Arc::new(FileCache::new(dir.path()).unwrap());
        let checker = RevocationChecker::new(fetcher.clone(), cache.clone());

        let err = checker
            .check_chain(&Context::default(), &chain(&leaf, &root), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotationError::Revocation(RevocationError::Revoked { .. })
        ));
        assert_eq!(fetcher.calls(), 1);

        fetcher.go_offline();
        let checker = RevocationChecker::new(fetcher.clone(), cache);
        let err = checker
            .check_chain(&Context::default(), &chain(&leaf, &root), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotationError::Revocation(RevocationError::Revoked { .. })
        ));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn expired_cache_entry_is_fetched_again() {
        let url = "http://crl.example/root.crl";
        let (root, leaf) = crl_chain(url);
        let mut options = CrlOptions::new(1);
        options.this_update = Utc::now() - TimeDelta::days(2);
        options.next_update = Utc::now() - TimeDelta::seconds(1);
        let cache = Arc::new(MemoryCache::new());
        cache.set(CacheEntry {
            url: url.to_string(),
            bundle: issue_crl(&root, options),
            this_update: Utc::now() - TimeDelta::days(2),
            next_update: Some(Utc::now() - TimeDelta::seconds(1)),
        });

        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.go_offline();
        let checker = RevocationChecker::new(fetcher.clone(), cache.clone());
        let err = checker
            .check_chain(&Context::default(), &chain(&leaf, &root), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotationError::Revocation(RevocationError::Unavailable { .. })
        ));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn expired_crl_is_unavailable() {
        let url = "http://crl.example/root.crl";
        let (root, leaf) = crl_chain(url);
        let mut options = CrlOptions::new(1);
        options.this_update = Utc::now() - TimeDelta::days(2);
        options.next_update = Utc::now() - TimeDelta::seconds(1);
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.serve(url, issue_crl(&root, options));

        let err = checker(&fetcher)
            .check_chain(&Context::default(), &chain(&leaf, &root), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotationError::Revocation(RevocationError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn ocsp_good() {
        let url = "http://ocsp.example";
        let (root, leaf) = ocsp_chain(url);
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.serve(
            url,
            issue_ocsp_response(&root, &root.x509(), &leaf.x509(), OcspOptions::good()),
        );
        let checker = checker(&fetcher);
        checker
            .check_chain(&Context::default(), &chain(&leaf, &root), None)
            .await
            .unwrap();
        checker
            .check_chain(&Context::default(), &chain(&leaf, &root), None)
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn ocsp_revoked_after_signing_time() {
        let url = "http://ocsp.example";
        let (root, leaf) = ocsp_chain(url);
        let revoked_at = Utc::now() - TimeDelta::hours(1);
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.serve(
            url,
            issue_ocsp_response(
                &root,
                &root.x509(),
                &leaf.x509(),
                OcspOptions::revoked(revoked_at, Some(RevocationReason::Superseded)),
            ),
        );
        let checker = checker(&fetcher);

        let err = checker
            .check_chain(&Context::default(), &chain(&leaf, &root), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotationError::Revocation(RevocationError::Revoked { .. })
        ));

        checker
            .check_chain(
                &Context::default(),
                &chain(&leaf, &root),
                Some(revoked_at - TimeDelta::hours(1)),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ocsp_unknown_falls_back_to_crl() {
        let root = generate_certificate(None, CertGenerationOptions::ca("Notary Root")).unwrap();
        let leaf = generate_certificate(
            Some(&root),
            CertGenerationOptions {
                ocsp_url: Some("http://ocsp.example".to_string()),
                crl_url: Some("http://crl.example/root.crl".to_string()),
                ..CertGenerationOptions::default()
            },
        )
        .unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.serve(
            "http://ocsp.example",
            issue_ocsp_response(&root, &root.x509(), &leaf.x509(), OcspOptions::unknown()),
        );
        let mut options = CrlOptions::new(1);
        options.revoked = vec![(leaf.x509(), Some(RevocationReason::KeyCompromise))];
        fetcher.serve("http://crl.example/root.crl", issue_crl(&root, options));

        let err = checker(&fetcher)
            .check_chain(&Context::default(), &chain(&leaf, &root), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotationError::Revocation(RevocationError::Revoked { .. })
        ));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn unreachable_responder_without_crl() {
        let (root, leaf) = ocsp_chain("http://ocsp.example");
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.go_offline();
        let err = checker(&fetcher)
            .check_chain(&Context::default(), &chain(&leaf, &root), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotationError::Revocation(RevocationError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn revoked_wins_over_unavailable() {
        let url = "http://crl.example/root.crl";
        let root = generate_certificate(None, CertGenerationOptions::ca("Notary Root")).unwrap();
        let intermediate = generate_certificate(
            Some(&root),
            CertGenerationOptions {
                ocsp_url: Some("http://ocsp.example".to_string()),
                ..CertGenerationOptions::ca("Notary Intermediate")
            },
        )
        .unwrap();
        let leaf = generate_certificate(
            Some(&intermediate),
            CertGenerationOptions {
                crl_url: Some(url.to_string()),
                ..CertGenerationOptions::default()
            },
        )
        .unwrap();
        let mut options = CrlOptions::new(1);
        options.revoked = vec![(leaf.x509(), None)];
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.serve(url, issue_crl(&intermediate, options));

        let err = checker(&fetcher)
            .check_chain(
                &Context::default(),
                &[leaf.x509(), intermediate.x509(), root.x509()],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotationError::Revocation(RevocationError::Revoked { .. })
        ));
        // the intermediate was checked too
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn cancellation_stops_the_check() {
        let (root, leaf) = crl_chain("http://crl.example/root.crl");
        let fetcher = Arc::new(FakeFetcher::default());
        let ctx = Context::default();
        ctx.cancellation().cancel();
        let err = checker(&fetcher)
            .check_chain(&ctx, &chain(&leaf, &root), None)
            .await
            .unwrap_err();
        assert!(matches!(err, NotationError::Cancelled));
        assert_eq!(fetcher.calls(), 0);
    }
}
