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

//! Fixtures shared by the integration tests: certificates generated with
//! openssl, CRLs, a scripted revocation fetcher and policy documents.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use const_oid::db::rfc5280::ID_CE_CRL_NUMBER;
use const_oid::db::rfc5912::ECDSA_WITH_SHA_256;
use der::asn1::{BitString, GeneralizedTime, OctetString};
use der::{Decode, Encode};
use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::conf::{Conf, ConfMethod};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509Extension, X509NameBuilder, X509};
use serde_json::{json, Value};
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};
use x509_cert::ext::Extension;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::time::Time;
use x509_cert::Certificate;

use notation::crypto::{LocalSigner, LocalSigningKey};
use notation::errors::IoError;
use notation::revocation::Fetcher;
use notation::sign::Signer;
use notation::truststore::{InMemoryTrustStore, StoreKind};

pub const SUBJECT: &[(&str, &str)] = &[("C", "US"), ("ST", "W"), ("O", "N"), ("CN", "t")];

/// A certificate together with its private key.
pub struct Identity {
    pub cert: X509,
    pub key: PKey<Private>,
}

impl Identity {
    pub fn x509(&self) -> Certificate {
        Certificate::from_der(&self.cert.to_der().unwrap()).unwrap()
    }

    pub fn signing_key(&self) -> LocalSigningKey {
        LocalSigningKey::from_pkcs8_der(&self.key.private_key_to_pkcs8().unwrap()).unwrap()
    }

    /// A signer presenting `chain`, leaf first.
    pub fn signer(&self, chain: &[&Identity]) -> Signer {
        let chain = chain.iter().map(|identity| identity.x509()).collect();
        Signer::new(Arc::new(LocalSigner::new(self.signing_key(), chain).unwrap()))
    }
}

pub enum Usage {
    Ca,
    CodeSigning { crl_url: Option<String> },
}

pub fn generate(issuer: Option<&Identity>, subject: &[(&str, &str)], usage: Usage) -> Identity {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    for (attr, value) in subject {
        name.append_entry_by_text(attr, value).unwrap();
    }
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    let mut serial = BigNum::new().unwrap();
    serial.rand(152, MsbOption::MAYBE_ZERO, false).unwrap();
    builder
        .set_serial_number(&Asn1Integer::from_bn(&serial).unwrap())
        .unwrap();
    let now = chrono::Utc::now().timestamp();
    builder
        .set_not_before(&Asn1Time::from_unix(now - 86_400).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(now + 86_400).unwrap())
        .unwrap();
    match issuer {
        Some(issuer) => builder.set_issuer_name(issuer.cert.subject_name()),
        None => builder.set_issuer_name(&name),
    }
    .unwrap();

    let mut extensions = Vec::new();
    {
        let conf = Conf::new(ConfMethod::default()).unwrap();
        let context = builder.x509v3_context(issuer.map(|i| &*i.cert), Some(&conf));
        extensions.push(SubjectKeyIdentifier::new().build(&context).unwrap());
        if issuer.is_some() {
            extensions.push(AuthorityKeyIdentifier::new().keyid(true).build(&context).unwrap());
        }
        if let Usage::CodeSigning {
            crl_url: Some(url), ..
        } = &usage
        {
            #[allow(deprecated)]
            extensions.push(
                X509Extension::new_nid(
                    Some(&conf),
                    Some(&context),
                    Nid::CRL_DISTRIBUTION_POINTS,
                    &format!("URI:{url}"),
                )
                .unwrap(),
            );
        }
    }
    match usage {
        Usage::Ca => {
            extensions.push(BasicConstraints::new().critical().ca().build().unwrap());
            extensions.push(
                KeyUsage::new()
                    .critical()
                    .key_cert_sign()
                    .crl_sign()
                    .build()
                    .unwrap(),
            );
        }
        Usage::CodeSigning { .. } => {
            extensions.push(BasicConstraints::new().critical().build().unwrap());
            extensions.push(KeyUsage::new().critical().digital_signature().build().unwrap());
            extensions.push(ExtendedKeyUsage::new().code_signing().build().unwrap());
        }
    }
    for extension in extensions {
        builder.append_extension(extension).unwrap();
    }

    let signing_key = issuer.map(|i| &i.key).unwrap_or(&key);
    builder.sign(signing_key, MessageDigest::sha256()).unwrap();
    Identity {
        cert: builder.build(),
        key,
    }
}

/// A self-signed code signing certificate `CN=t,O=N,ST=W,C=US`.
pub fn self_signed() -> Identity {
    generate(None, SUBJECT, Usage::CodeSigning { crl_url: None })
}

/// A root CA and a leaf it issued, listing `crl_url` as CRL distribution
/// point.
pub fn crl_chain(crl_url: &str) -> (Identity, Identity) {
    let root = generate(
        None,
        &[("C", "US"), ("ST", "W"), ("O", "N"), ("CN", "root")],
        Usage::Ca,
    );
    let leaf = generate(
        Some(&root),
        SUBJECT,
        Usage::CodeSigning {
            crl_url: Some(crl_url.to_string()),
        },
    );
    (root, leaf)
}

fn generalized(unix: i64) -> Time {
    Time::GeneralTime(GeneralizedTime::from_unix_duration(Duration::from_secs(unix as u64)).unwrap())
}

/// A CRL signed by `issuer` listing `revoked`, valid for a day.
pub fn issue_crl(issuer: &Identity, revoked: &[Certificate]) -> Vec<u8> {
    let now = chrono::Utc::now().timestamp();
    let algorithm = AlgorithmIdentifierOwned {
        oid: ECDSA_WITH_SHA_256,
        parameters: None,
    };
    let entries: Vec<RevokedCert> = revoked
        .iter()
        .map(|cert| RevokedCert {
            serial_number: cert.tbs_certificate.serial_number.clone(),
            revocation_date: generalized(now - 7_200),
            crl_entry_extensions: None,
        })
        .collect();
    let tbs_cert_list = TbsCertList {
        version: x509_cert::Version::V2,
        signature: algorithm.clone(),
        issuer: issuer.x509().tbs_certificate.subject,
        this_update: generalized(now - 3_600),
        next_update: Some(generalized(now + 86_400)),
        revoked_certificates: (!entries.is_empty()).then_some(entries),
        crl_extensions: Some(vec![Extension {
            extn_id: ID_CE_CRL_NUMBER,
            critical: false,
            extn_value: OctetString::new(1u32.to_der().unwrap()).unwrap(),
        }]),
    };
    let mut signer = openssl::sign::Signer::new(MessageDigest::sha256(), &issuer.key).unwrap();
    let signature = signer
        .sign_oneshot_to_vec(&tbs_cert_list.to_der().unwrap())
        .unwrap();
    CertificateList {
        tbs_cert_list,
        signature_algorithm: algorithm,
        signature: BitString::from_bytes(&signature).unwrap(),
    }
    .to_der()
    .unwrap()
}

/// Serves canned responses by URL prefix, counting requests.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<Vec<(String, Vec<u8>)>>,
    calls: AtomicUsize,
    offline: AtomicBool,
}

impl ScriptedFetcher {
    pub fn serve(&self, prefix: &str, body: Vec<u8>) {
        self.responses
            .lock()
            .unwrap()
            .push((prefix.to_string(), body));
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, IoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(IoError::TransportFailed(format!("{url}: offline")));
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

/// A trust store holding `cert` as the CA store `t`.
pub fn trust_store(cert: &Identity) -> Arc<InMemoryTrustStore> {
    Arc::new(InMemoryTrustStore::new().with(StoreKind::Ca, "t", [cert.x509()]))
}

/// An OCI trust policy document with a single statement on every
/// repository.
pub fn oci_policy(signature_verification: Value) -> Vec<u8> {
    json!({
        "version": "1.0",
        "trustPolicies": [{
            "name": "everything",
            "registryScopes": ["*"],
            "signatureVerification": signature_verification,
            "trustStores": ["ca:t"],
            "trustedIdentities": ["x509.subject:CN=t,O=N,ST=W,C=US"],
        }]
    })
    .to_string()
    .into_bytes()
}
