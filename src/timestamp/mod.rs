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

//! RFC 3161 timestamping.
//!
//! Signers ask a [`Timestamper`] to countersign the signature bytes, the
//! returned token travels in the envelope unsigned attributes. Verifiers
//! parse it back as a [`TimestampToken`] and use its `genTime` as the
//! authoritative signing time.

mod client;
mod token;

pub use client::{HttpTimestamper, Timestamper};
pub use token::TimestampToken;

#[cfg(test)]
pub(crate) mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
    use cms::content_info::{CmsVersion, ContentInfo};
    use cms::signed_data::{
        CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo,
        SignerInfos,
    };
    use const_oid::ObjectIdentifier;
    use der::asn1::{GeneralizedTime, Int, OctetString, SetOfVec};
    use der::{Any, Encode, Tag};
    use openssl::hash::MessageDigest;
    use sha2::{Digest, Sha256};
    use x509_cert::attr::Attribute;
    use x509_cert::spki::AlgorithmIdentifierOwned;
    use x509_tsp::MessageImprint;

    use super::token::{Accuracy, TstInfo, ID_CT_TST_INFO};
    use super::*;
    use crate::crypto::tests::CertData;
    use crate::errors::TimestampError;

    pub(crate) struct TokenOptions {
        pub gen_time: DateTime<Utc>,
        /// Sign a message-digest attribute that does not match the TSTInfo
        pub corrupt_message_digest: bool,
        pub accuracy: Accuracy,
    }

    impl TokenOptions {
        pub(crate) fn at(gen_time: DateTime<Utc>) -> Self {
            TokenOptions {
                gen_time,
                corrupt_message_digest: false,
                accuracy: Accuracy {
                    seconds: Some(1),
                    millis: Some(500),
                    micros: None,
                },
            }
        }
    }

    /// Issue a token over `message` signed by `tsa`, embedding `tsa` and
    /// `intermediates`. `tsa` must hold a P-256 key.
    pub(crate) fn issue_token(
        tsa: &CertData,
        intermediates: &[&CertData],
        message: &[u8],
        options: TokenOptions,
    ) -> Vec<u8> {
        let sha256 = AlgorithmIdentifierOwned {
            oid: const_oid::db::rfc5912::ID_SHA_256,
            parameters: None,
        };
        let tst_info = TstInfo {
            version: 1,
            policy: ObjectIdentifier::new_unwrap("1.3.6.1.4.1.4146.2.3"),
            message_imprint: MessageImprint {
                hash_algorithm: sha256.clone(),
                hashed_message: OctetString::new(Sha256::digest(message).to_vec()).unwrap(),
            },
            serial_number: Int::new(&[0x01, 0x02]).unwrap(),
            gen_time: GeneralizedTime::from_unix_duration(std::time::Duration::from_secs(
                options.gen_time.timestamp() as u64,
            ))
            .unwrap(),
            accuracy: Some(options.accuracy.clone()),
            ordering: false,
            nonce: None,
            tsa: None,
            extensions: None,
        };
        let tst_info_der = tst_info.to_der().unwrap();

        let mut digest = Sha256::digest(&tst_info_der).to_vec();
        if options.corrupt_message_digest {
            digest[0] ^= 0xff;
        }
        let content_type = Attribute {
            oid: const_oid::db::rfc6268::ID_CONTENT_TYPE,
            values: SetOfVec::try_from(vec![Any::encode_from(&ID_CT_TST_INFO).unwrap()]).unwrap(),
        };
        let message_digest = Attribute {
            oid: const_oid::db::rfc6268::ID_MESSAGE_DIGEST,
            values: SetOfVec::try_from(vec![Any::new(Tag::OctetString, digest).unwrap()]).unwrap(),
        };
        let signed_attrs = SetOfVec::try_from(vec![content_type, message_digest]).unwrap();

        let mut signer =
            openssl::sign::Signer::new(MessageDigest::sha256(), &tsa.private_key).unwrap();
        let signature = signer
            .sign_oneshot_to_vec(&signed_attrs.to_der().unwrap())
            .unwrap();

        let tsa_cert = tsa.x509();
        let signer_info = SignerInfo {
            version: CmsVersion::V1,
            sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
                issuer: tsa_cert.tbs_certificate.issuer.clone(),
                serial_number: tsa_cert.tbs_certificate.serial_number.clone(),
            }),
            digest_alg: sha256.clone(),
            signed_attrs: Some(signed_attrs),
            signature_algorithm: AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
                parameters: None,
            },
            signature: OctetString::new(signature).unwrap(),
            unsigned_attrs: None,
        };

        let mut certificates = vec![CertificateChoices::Certificate(tsa_cert)];
        certificates.extend(
            intermediates
                .iter()
                .map(|cert| CertificateChoices::Certificate(cert.x509())),
        );
        let signed_data = SignedData {
            version: CmsVersion::V3,
            digest_algorithms: SetOfVec::try_from(vec![sha256]).unwrap(),
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: ID_CT_TST_INFO,
                econtent: Some(Any::new(Tag::OctetString, tst_info_der).unwrap()),
            },
            certificates: Some(CertificateSet(SetOfVec::try_from(certificates).unwrap())),
            crls: None,
            signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info]).unwrap()),
        };

        ContentInfo {
            content_type: const_oid::db::rfc5911::ID_SIGNED_DATA,
            content: Any::encode_from(&signed_data).unwrap(),
        }
        .to_der()
        .unwrap()
    }

    /// In-process timestamp authority.
    pub(crate) struct LocalTimestamper {
        pub tsa: CertData,
        pub gen_time: Option<DateTime<Utc>>,
    }

    #[async_trait]
    impl Timestamper for LocalTimestamper {
        async fn timestamp(&self, signature: &[u8]) -> Result<Vec<u8>, TimestampError> {
            let gen_time = self.gen_time.unwrap_or_else(Utc::now);
            Ok(issue_token(
                &self.tsa,
                &[],
                signature,
                TokenOptions::at(gen_time),
            ))
        }
    }
}
